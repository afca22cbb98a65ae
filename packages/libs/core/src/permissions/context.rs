//! 평가 사용자 컨텍스트
//!
//! 권한 평가에 필요한 요청 주체 정보를 담습니다.
//! 스코핑 필드(created_by, branch_id 등)는 항상 이 컨텍스트에서
//! 파생되며 클라이언트 페이로드를 신뢰하지 않습니다.

use serde::{Deserialize, Serialize};

/// 인증 주체 타입
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PrincipalType {
    #[default]
    EndUser,
    Service,
}

/// 사용자 컨텍스트
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserContext {
    /// 사용자 ID
    pub id: String,

    /// Role ID (없으면 즉시 거부)
    pub role_id: Option<String>,

    /// 소속 지점 ID
    pub branch_id: Option<String>,

    /// 소속 그룹 ID 목록
    #[serde(default)]
    pub group_ids: Vec<String>,

    /// 인증 주체 타입
    #[serde(default)]
    pub principal_type: PrincipalType,
}

impl UserContext {
    /// 새 컨텍스트 생성
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    /// Role 설정
    pub fn with_role(mut self, role_id: impl Into<String>) -> Self {
        self.role_id = Some(role_id.into());
        self
    }

    /// 지점 설정
    pub fn with_branch(mut self, branch_id: impl Into<String>) -> Self {
        self.branch_id = Some(branch_id.into());
        self
    }

    /// 그룹 설정
    pub fn with_groups(mut self, group_ids: Vec<String>) -> Self {
        self.group_ids = group_ids;
        self
    }

    /// 특정 그룹 소속 여부
    pub fn has_group(&self, group_id: &str) -> bool {
        self.group_ids.iter().any(|g| g == group_id)
    }
}
