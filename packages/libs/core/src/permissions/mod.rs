//! 권한 코드 파싱 및 접근 평가
//!
//! # 개요
//!
//! Role에 부여된 `"action:entity:scope:field"` 권한 코드를 파싱하고,
//! 엔티티의 접근 규칙(access_rule)에 따라 요청을 평가하여
//! `AccessDecision`을 산출합니다. 스코핑 필드는 항상 서버 측
//! 사용자 컨텍스트에서 파생됩니다.
//!
//! # 모듈 구조
//!
//! - `grant`: 권한 코드 파싱 및 GrantSet
//! - `context`: 평가 사용자 컨텍스트
//! - `decision`: 평가 출력 (AccessDecision)
//! - `resolver`: 지점/그룹 소속 해석
//! - `evaluator`: 접근 평가기 본체

mod context;
mod decision;
mod evaluator;
mod grant;
mod resolver;

pub use context::{PrincipalType, UserContext};
pub use decision::{AccessDecision, FilterMap, Row};
pub use evaluator::PermissionEvaluator;
pub use grant::{Action, Grant, GrantScope, GrantSet, UNIVERSAL_GRANT};
pub use resolver::{check_group, GrantStore, RowStore, ScopeResolver};
