//! 접근 결정
//!
//! 평가기의 출력입니다. 호출마다 새로 생성되며 캐시되지 않습니다.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// 한 건의 데이터 행 (JSON object)
pub type Row = serde_json::Map<String, Value>;

/// 행 스코핑 조건으로 주입할 필터 파라미터
///
/// 값은 요청 파라미터와 같은 원시 문자열 표기입니다. 콤마로 구분된
/// 다중 값은 컴파일러의 식별자 규칙에 따라 `IN`으로 변환됩니다.
pub type FilterMap = BTreeMap<String, String>;

/// 접근 결정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccessDecision {
    /// 허용 여부
    pub permitted: bool,

    /// 전역 와일드카드 보유 여부
    pub superuser: bool,

    /// 스탬핑/스크럽이 적용된 쓰기 페이로드
    #[serde(default)]
    pub data: Vec<Row>,

    /// 주입할 행 스코핑 필터
    #[serde(default)]
    pub params: FilterMap,

    /// 허용 필드 목록 (비어 있으면 전체 허용, id는 항상 포함)
    #[serde(default)]
    pub fields: Vec<String>,

    /// 거부 사유 (permitted=false인 경우)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl AccessDecision {
    /// 허용 결정 생성
    pub fn permit() -> Self {
        Self {
            permitted: true,
            ..Default::default()
        }
    }

    /// 거부 결정 생성
    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            permitted: false,
            reason: Some(reason.into()),
            ..Default::default()
        }
    }

    /// superuser 표시
    pub fn as_superuser(mut self) -> Self {
        self.superuser = true;
        self
    }

    /// 스코핑 파라미터 추가
    pub fn with_param(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(field.into(), value.into());
        self
    }

    /// 허용 필드 설정
    pub fn with_fields(mut self, fields: Vec<String>) -> Self {
        self.fields = fields;
        self
    }

    /// 페이로드 설정
    pub fn with_data(mut self, data: Vec<Row>) -> Self {
        self.data = data;
        self
    }

    /// 거부라면 `PermissionDenied` 에러로 변환
    ///
    /// 호출자가 403 매핑에 사용합니다. 평가기 자체는 거부를 에러가
    /// 아닌 결정으로 반환합니다.
    pub fn ensure_permitted(&self) -> Result<()> {
        if self.permitted {
            return Ok(());
        }
        Err(Error::PermissionDenied {
            reason: self
                .reason
                .clone()
                .unwrap_or_else(|| "access denied".to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permit_and_deny() {
        let decision = AccessDecision::permit().with_param("branch_id", "2");
        assert!(decision.permitted);
        assert!(decision.ensure_permitted().is_ok());
        assert_eq!(decision.params.get("branch_id").map(|s| s.as_str()), Some("2"));

        let decision = AccessDecision::deny("no matching grant");
        assert!(!decision.permitted);
        let err = decision.ensure_permitted().unwrap_err();
        assert_eq!(err.status_code(), 403);
    }
}
