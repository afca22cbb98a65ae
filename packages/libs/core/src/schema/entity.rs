//! 엔티티 정의 및 접근 규칙

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::field::FieldSpec;
use super::SOFT_DELETE_FIELD;

/// 엔티티별 접근 규칙
///
/// 어떤 스코핑 알고리즘이 적용될지 결정합니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessRule {
    /// 모든 사용자 조회 가능, 쓰기는 명시적 grant 필요
    AllUsers,

    /// 소유자(created_by) 단위 스코핑
    Owner,

    /// 지점(branch) 단위 스코핑
    Branch,

    /// 그룹 멤버십 단위 스코핑
    Group,

    /// 전역 와일드카드 또는 명시적 grant만 허용
    Superuser,
}

impl AccessRule {
    /// 문자열에서 파싱
    ///
    /// `user`는 Owner의 레거시 표기입니다.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "all_users" | "allusers" => Some(AccessRule::AllUsers),
            "owner" | "user" => Some(AccessRule::Owner),
            "branch" => Some(AccessRule::Branch),
            "group" => Some(AccessRule::Group),
            "superuser" => Some(AccessRule::Superuser),
            _ => None,
        }
    }

    /// 문자열로 변환
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessRule::AllUsers => "all_users",
            AccessRule::Owner => "owner",
            AccessRule::Branch => "branch",
            AccessRule::Group => "group",
            AccessRule::Superuser => "superuser",
        }
    }
}

/// 엔티티 스키마
///
/// 로드 이후 불변입니다. 레지스트리가 소유합니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntitySchema {
    /// 엔티티 이름 (테이블 이름과 동일)
    pub name: String,

    /// 접근 규칙
    pub access_rule: AccessRule,

    /// 부모 엔티티 (branch/group 스코핑 상속용)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,

    /// 미인증 조회 허용 여부
    #[serde(default)]
    pub public: bool,

    /// 필드 맵
    pub fields: BTreeMap<String, FieldSpec>,
}

impl EntitySchema {
    /// 필드 조회
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.get(name)
    }

    /// 필드 존재 여부
    pub fn has_field(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// 필드 이름 목록
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(|s| s.as_str())
    }

    /// soft delete 필드 이름 (선언된 경우)
    pub fn soft_delete_field(&self) -> Option<&str> {
        self.has_field(SOFT_DELETE_FIELD).then_some(SOFT_DELETE_FIELD)
    }

    /// 쓰기 금지 필드 이름 목록
    pub fn immutable_fields(&self) -> impl Iterator<Item = &str> {
        self.fields
            .iter()
            .filter(|(_, spec)| spec.immutable)
            .map(|(name, _)| name.as_str())
    }

    /// 부모 FK 필드 이름 (`<parent>_id`, 단수형 변환 포함)
    ///
    /// `projects` → `project_id`처럼 복수형 엔티티 이름의 꼬리 `s`를
    /// 제거한 FK 표기를 먼저 찾고, 없으면 엔티티 이름 그대로 붙입니다.
    pub fn parent_fk_field(&self) -> Option<String> {
        let parent = self.parent.as_deref()?;
        let singular = parent.strip_suffix('s').unwrap_or(parent);
        let candidate = format!("{}_id", singular);
        if self.has_field(&candidate) {
            return Some(candidate);
        }
        let raw = format!("{}_id", parent);
        self.has_field(&raw).then_some(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::field::FieldType;

    fn sample_entity() -> EntitySchema {
        let mut fields = BTreeMap::new();
        fields.insert(
            "id".to_string(),
            FieldSpec::new(FieldType::Number).mark_identifier("id"),
        );
        fields.insert(
            "project_id".to_string(),
            FieldSpec::new(FieldType::Number).mark_identifier("project_id"),
        );
        fields.insert(
            "deleted_at".to_string(),
            FieldSpec::new(FieldType::Date),
        );
        fields.insert(
            "created_by".to_string(),
            FieldSpec::new(FieldType::Number).immutable().mark_identifier("created_by"),
        );
        EntitySchema {
            name: "tickets".to_string(),
            access_rule: AccessRule::Branch,
            parent: Some("projects".to_string()),
            public: false,
            fields,
        }
    }

    #[test]
    fn test_access_rule_parsing() {
        assert_eq!(AccessRule::from_str("branch"), Some(AccessRule::Branch));
        assert_eq!(AccessRule::from_str("allUsers"), Some(AccessRule::AllUsers));
        assert_eq!(AccessRule::from_str("user"), Some(AccessRule::Owner));
        assert_eq!(AccessRule::from_str("nope"), None);
    }

    #[test]
    fn test_soft_delete_field() {
        let entity = sample_entity();
        assert_eq!(entity.soft_delete_field(), Some("deleted_at"));
    }

    #[test]
    fn test_parent_fk_field() {
        let entity = sample_entity();
        assert_eq!(entity.parent_fk_field(), Some("project_id".to_string()));
    }

    #[test]
    fn test_immutable_fields() {
        let entity = sample_entity();
        let immutable: Vec<&str> = entity.immutable_fields().collect();
        assert_eq!(immutable, vec!["created_by"]);
    }
}
