//! 지점/그룹 소속 해석기
//!
//! 행의 유효 지점(branch) 또는 그룹 멤버십을 해석합니다. 엔티티 자신이
//! 스코핑 필드를 갖지 않으면 부모 체인을 따라 올라가 소유 엔티티에서
//! 읽습니다. 앵커(부모 ID, 행 ID)가 전혀 없으면 항상 거부 쪽으로
//! 판정합니다.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::schema::SchemaRegistry;

use super::decision::{FilterMap, Row};

/// Role의 권한 코드 조회 인터페이스
///
/// 평가 호출당 한 번 조회되며 결과는 호출 동안 스냅샷으로 취급됩니다.
#[async_trait]
pub trait GrantStore: Send + Sync {
    async fn fetch_grants(&self, role_id: &str) -> Result<Vec<String>>;
}

/// 행 조회 인터페이스
///
/// 지점/그룹 해석과 필드 스코프 행 검사에 사용됩니다.
/// 필터는 equality(다중 값은 IN) 매칭으로 해석됩니다.
#[async_trait]
pub trait RowStore: Send + Sync {
    async fn lookup(&self, entity: &str, filter: &FilterMap) -> Result<Vec<Row>>;
}

/// 지점/그룹 해석기
pub struct ScopeResolver<'a> {
    registry: &'a SchemaRegistry,
    rows: &'a dyn RowStore,
}

impl<'a> ScopeResolver<'a> {
    pub fn new(registry: &'a SchemaRegistry, rows: &'a dyn RowStore) -> Self {
        Self { registry, rows }
    }

    /// 행의 유효 지점 ID 해석
    ///
    /// `parent_id`가 주어지면 직계 부모 행에서 시작하고, 아니면
    /// `row_id`로 자신의 행에서 시작합니다. `branch_id`를 선언한
    /// 엔티티를 만날 때까지 부모 체인을 따라 올라갑니다.
    pub async fn resolve_branch(
        &self,
        parent_id: Option<&str>,
        entity: &str,
        row_id: Option<&str>,
    ) -> Result<Option<String>> {
        let schema = self.registry.lookup(entity)?;

        let (mut current_entity, mut current_id) = match (parent_id, row_id) {
            (Some(pid), _) => match &schema.parent {
                Some(parent) => (parent.clone(), pid.to_string()),
                None => return Ok(None),
            },
            (None, Some(rid)) => (entity.to_string(), rid.to_string()),
            (None, None) => return Ok(None),
        };

        loop {
            let schema = self.registry.lookup(&current_entity)?;

            let mut filter = FilterMap::new();
            filter.insert("id".to_string(), current_id.clone());
            let rows = self.rows.lookup(&current_entity, &filter).await?;
            let Some(row) = rows.first() else {
                return Ok(None);
            };

            if schema.has_field("branch_id") {
                return Ok(row.get("branch_id").and_then(value_as_id));
            }

            let Some(parent) = schema.parent.clone() else {
                return Ok(None);
            };
            let Some(fk) = schema.parent_fk_field() else {
                return Ok(None);
            };
            let Some(next_id) = row.get(&fk).and_then(value_as_id) else {
                return Ok(None);
            };

            current_entity = parent;
            current_id = next_id;
        }
    }

    /// 사용자 지점과 행의 유효 지점 비교
    ///
    /// 앵커가 하나도 없으면 `false`입니다. 부재는 허용이 아니라
    /// 거부의 안전 기본값입니다.
    pub async fn check_branch(
        &self,
        user_branch_id: Option<&str>,
        parent_id: Option<&str>,
        entity: &str,
        row_id: Option<&str>,
    ) -> Result<bool> {
        let Some(user_branch) = user_branch_id else {
            return Ok(false);
        };
        if parent_id.is_none() && row_id.is_none() {
            return Ok(false);
        }

        let resolved = self.resolve_branch(parent_id, entity, row_id).await?;
        Ok(resolved.as_deref() == Some(user_branch))
    }

    /// 행의 그룹 ID 목록 조회
    ///
    /// `group_ids` 배열 또는 단일 `group_id` 필드를 읽습니다.
    pub async fn fetch_group_ids(&self, entity: &str, row_id: &str) -> Result<Vec<String>> {
        let mut filter = FilterMap::new();
        filter.insert("id".to_string(), row_id.to_string());
        let rows = self.rows.lookup(entity, &filter).await?;

        let Some(row) = rows.first() else {
            return Ok(Vec::new());
        };

        if let Some(value) = row.get("group_ids") {
            return Ok(value_as_id_list(value));
        }
        if let Some(value) = row.get("group_id") {
            return Ok(value_as_id(value).into_iter().collect());
        }
        Ok(Vec::new())
    }
}

/// 두 그룹 집합의 교집합 존재 여부
pub fn check_group(user_group_ids: &[String], resource_group_ids: &[String]) -> bool {
    user_group_ids
        .iter()
        .any(|g| resource_group_ids.iter().any(|r| r == g))
}

/// Row 값을 ID 문자열로 변환
pub(crate) fn value_as_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Row 값을 ID 목록으로 변환 (배열 또는 콤마 구분 문자열)
fn value_as_id_list(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.iter().filter_map(value_as_id).collect(),
        Value::String(s) => s
            .split(',')
            .map(|p| p.trim())
            .filter(|p| !p.is_empty())
            .map(|p| p.to_string())
            .collect(),
        Value::Number(n) => vec![n.to_string()],
        _ => Vec::new(),
    }
}
