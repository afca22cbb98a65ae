//! 권한 코드 파싱
//!
//! `"action:entity:scope:field"` 형식의 권한 코드를 구조화된 `Grant`로
//! 변환합니다. 파싱은 평가 호출당 한 번이며, 형식이 깨진 코드는 어떤
//! 요청과도 매칭되지 않습니다.

use serde::{Deserialize, Serialize};

/// 전역 와일드카드 코드
pub const UNIVERSAL_GRANT: &str = "*:*:*:*";

/// 데이터 작업 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Add,
    View,
    Edit,
    Delete,
}

impl Action {
    /// 문자열에서 파싱
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "add" => Some(Action::Add),
            "view" => Some(Action::View),
            "edit" => Some(Action::Edit),
            "delete" => Some(Action::Delete),
            _ => None,
        }
    }

    /// 문자열로 변환
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Add => "add",
            Action::View => "view",
            Action::Edit => "edit",
            Action::Delete => "delete",
        }
    }

    /// 쓰기 작업 여부
    pub fn is_write(&self) -> bool {
        !matches!(self, Action::View)
    }
}

/// Grant의 행 스코프
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantScope {
    /// 모든 행 (`*`)
    Any,

    /// 본인 소유 행 (`self`)
    SelfOnly,

    /// 같은 지점 (`branch`)
    Branch,

    /// 같은 그룹 (`group`)
    Group,

    /// 스코프 미지정 (빈 문자열)
    Unscoped,
}

impl GrantScope {
    fn from_str(s: &str) -> Option<Self> {
        match s {
            "*" => Some(GrantScope::Any),
            "self" => Some(GrantScope::SelfOnly),
            "branch" => Some(GrantScope::Branch),
            "group" => Some(GrantScope::Group),
            "" => Some(GrantScope::Unscoped),
            _ => None,
        }
    }
}

/// 파싱된 권한 코드 하나
///
/// `action`/`entity`/`field`의 `None`은 와일드카드(또는 빈 필드)를
/// 의미합니다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grant {
    pub action: Option<Action>,
    pub entity: Option<String>,
    pub scope: GrantScope,
    pub field: Option<String>,
}

impl Grant {
    /// 코드 문자열 파싱
    ///
    /// 네 부분이 아니거나 action/scope가 알 수 없는 값이면 `None`입니다.
    pub fn parse(code: &str) -> Option<Self> {
        let parts: Vec<&str> = code.split(':').collect();
        if parts.len() != 4 {
            return None;
        }

        let action = match parts[0] {
            "*" => None,
            s => Some(Action::from_str(s)?),
        };
        let entity = match parts[1] {
            "*" => None,
            s => Some(s.to_string()),
        };
        let scope = GrantScope::from_str(parts[2])?;
        let field = match parts[3] {
            "*" | "" => None,
            s => Some(s.to_string()),
        };

        Some(Grant {
            action,
            entity,
            scope,
            field,
        })
    }

    /// action/entity 매칭 여부 (와일드카드 포함)
    pub fn matches(&self, action: Action, entity: &str) -> bool {
        let action_ok = self.action.is_none() || self.action == Some(action);
        let entity_ok = self.entity.is_none() || self.entity.as_deref() == Some(entity);
        action_ok && entity_ok
    }

    /// 필드 제한 grant 여부 (`action:entity:*:<field>`)
    pub fn is_field_restricted(&self) -> bool {
        self.field.is_some()
    }
}

/// 평가 호출당 한 번 스냅샷되는 grant 집합
///
/// 호출 동안 불변이며 중복 코드는 허용됩니다.
#[derive(Debug, Clone)]
pub struct GrantSet {
    grants: Vec<Grant>,
    universal: bool,
}

impl GrantSet {
    /// 코드 목록에서 생성
    ///
    /// 형식이 깨진 코드는 무시됩니다.
    pub fn from_codes<S: AsRef<str>>(codes: &[S]) -> Self {
        let universal = codes.iter().any(|c| c.as_ref() == UNIVERSAL_GRANT);
        let grants = codes
            .iter()
            .filter_map(|c| {
                let parsed = Grant::parse(c.as_ref());
                if parsed.is_none() {
                    tracing::warn!(code = c.as_ref(), "ignoring malformed grant code");
                }
                parsed
            })
            .collect();
        Self { grants, universal }
    }

    pub fn is_empty(&self) -> bool {
        self.grants.is_empty()
    }

    /// 전역 와일드카드 보유 여부
    pub fn has_universal(&self) -> bool {
        self.universal
    }

    /// `action:entity:*:*` 계열 grant 보유 여부 (가장 넓은 tier)
    pub fn has_any_scope(&self, action: Action, entity: &str) -> bool {
        self.grants.iter().any(|g| {
            g.matches(action, entity) && g.scope == GrantScope::Any && g.field.is_none()
        })
    }

    /// `action:entity:self:*` 계열 grant 보유 여부
    pub fn has_self_scope(&self, action: Action, entity: &str) -> bool {
        self.grants.iter().any(|g| {
            g.matches(action, entity) && g.scope == GrantScope::SelfOnly && g.field.is_none()
        })
    }

    /// 필드 제한 grant들이 허용하는 필드 합집합 (`action:entity:*:<field>`)
    pub fn granted_fields(&self, action: Action, entity: &str) -> Vec<String> {
        let mut fields = Vec::new();
        for grant in &self.grants {
            if !grant.matches(action, entity) || grant.scope != GrantScope::Any {
                continue;
            }
            if let Some(field) = &grant.field {
                if !fields.contains(field) {
                    fields.push(field.clone());
                }
            }
        }
        fields
    }

    /// 해당 action/entity에 대한 grant가 하나라도 있는지 (tier 무관)
    pub fn has_any_grant(&self, action: Action, entity: &str) -> bool {
        self.grants.iter().any(|g| g.matches(action, entity))
    }
}
