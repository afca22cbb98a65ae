//! 권한 평가기
//!
//! 요청 하나에 대해 grant, 접근 규칙, 지점/그룹 해석 결과를 조합하여
//! 접근 결정을 만듭니다.
//!
//! 거부는 에러가 아니라 `permitted=false` 결정으로 반환됩니다. `Err`는
//! 스키마 조회 실패, 해석기 I/O 실패, 취소에만 사용됩니다. 호출자는
//! 인프라 장애를 권한 거부로 오인하면 안 됩니다.
//!
//! Tier 순서는 넓은 grant가 항상 이깁니다:
//! `action:entity:*:*` > `action:entity:self:*` > `action:entity:*:<field>`.
//! 첫 매칭에서 즉시 확정하며 여러 grant의 제약을 누적하지 않습니다.

use std::time::Duration;

use serde_json::Value;

use crate::error::{Error, Result};
use crate::schema::{AccessRule, EntitySchema, SchemaRegistry};

use super::context::UserContext;
use super::decision::{AccessDecision, FilterMap, Row};
use super::grant::{Action, GrantSet};
use super::resolver::{check_group, GrantStore, RowStore, ScopeResolver};

/// 권한 평가기
///
/// 읽기 전용 레지스트리 외에는 호출 간 공유 상태가 없습니다.
pub struct PermissionEvaluator<'a> {
    registry: &'a SchemaRegistry,
    grants: &'a dyn GrantStore,
    rows: &'a dyn RowStore,
    deadline: Option<Duration>,
}

impl<'a> PermissionEvaluator<'a> {
    /// 새 평가기 생성
    pub fn new(
        registry: &'a SchemaRegistry,
        grants: &'a dyn GrantStore,
        rows: &'a dyn RowStore,
    ) -> Self {
        Self {
            registry,
            grants,
            rows,
            deadline: None,
        }
    }

    /// 스토어 왕복마다 적용할 데드라인 설정
    ///
    /// 초과 시 `Error::Cancelled`를 반환합니다. 거부 결정과 구분됩니다.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// 접근 결정 평가
    ///
    /// # Arguments
    /// * `user` - 요청 주체
    /// * `action` - 작업 종류 (add, view, edit, delete)
    /// * `entity` - 대상 엔티티 이름
    /// * `payload` - add/edit 페이로드 행 목록
    /// * `params` - 요청 필터 파라미터 (행/부모 앵커 추출에 사용)
    pub async fn evaluate(
        &self,
        user: &UserContext,
        action: Action,
        entity: &str,
        payload: Vec<Row>,
        params: &FilterMap,
    ) -> Result<AccessDecision> {
        // Role 없음 → grant 조회 없이 즉시 거부
        let Some(role_id) = user.role_id.as_deref() else {
            return Ok(AccessDecision::deny("no role assigned"));
        };

        // 호출당 한 번의 grant 스냅샷
        let codes = self.timed(self.grants.fetch_grants(role_id)).await?;
        let grant_set = GrantSet::from_codes(&codes);
        if grant_set.is_empty() {
            return Ok(AccessDecision::deny("role has no grants"));
        }

        let schema = self.registry.lookup(entity)?;

        // 전역 와일드카드 → 행/필드 제한 없이 허용, add 스탬핑은 동일 적용
        if grant_set.has_universal() {
            tracing::debug!(entity, action = action.as_str(), "universal grant match");
            let data = self.prepare_payload(schema, user, action, payload, params, &[]);
            return Ok(AccessDecision::permit().as_superuser().with_data(data));
        }

        let mut decision = match schema.access_rule {
            AccessRule::AllUsers => self.eval_all_users(user, action, entity, &grant_set),
            AccessRule::Owner => self.eval_owner(user, action, entity, schema, &grant_set),
            AccessRule::Branch => {
                self.eval_branch(user, action, entity, schema, &grant_set, params)
                    .await?
            }
            AccessRule::Group => {
                self.eval_group(user, action, entity, schema, &grant_set, params, &payload)
                    .await?
            }
            AccessRule::Superuser => self.eval_superuser_entity(action, entity, &grant_set),
        };

        if !decision.permitted {
            tracing::debug!(
                entity,
                action = action.as_str(),
                reason = decision.reason.as_deref().unwrap_or(""),
                "access denied"
            );
            return Ok(decision);
        }

        let fields = decision.fields.clone();
        decision.data = self.prepare_payload(schema, user, action, payload, params, &fields);
        Ok(decision)
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // 규칙별 핸들러
    // ─────────────────────────────────────────────────────────────────────────────

    /// AllUsers: view는 항상 허용, 나머지는 명시적 grant 필요
    fn eval_all_users(
        &self,
        user: &UserContext,
        action: Action,
        entity: &str,
        grant_set: &GrantSet,
    ) -> AccessDecision {
        if action == Action::View {
            return AccessDecision::permit();
        }
        if grant_set.has_any_scope(action, entity) {
            return AccessDecision::permit();
        }
        if grant_set.has_self_scope(action, entity) {
            if action == Action::Delete {
                return AccessDecision::deny("self scope cannot delete");
            }
            let decision = AccessDecision::permit();
            return if action == Action::Add {
                decision
            } else {
                decision.with_param("created_by", user.id.clone())
            };
        }
        AccessDecision::deny("no matching grant")
    }

    /// Owner: 본인 소유 행은 무조건, add는 grant 또는 public 엔티티만
    fn eval_owner(
        &self,
        user: &UserContext,
        action: Action,
        entity: &str,
        schema: &EntitySchema,
        grant_set: &GrantSet,
    ) -> AccessDecision {
        if action == Action::Add {
            if grant_set.has_any_grant(action, entity) || schema.public {
                return AccessDecision::permit();
            }
            return AccessDecision::deny("add requires an explicit grant");
        }

        // 소유 필터는 서버가 계산합니다. 클라이언트 값은 무시됩니다.
        AccessDecision::permit().with_param("created_by", user.id.clone())
    }

    /// Branch: tier 순서대로 첫 매칭 확정
    async fn eval_branch(
        &self,
        user: &UserContext,
        action: Action,
        entity: &str,
        schema: &EntitySchema,
        grant_set: &GrantSet,
        params: &FilterMap,
    ) -> Result<AccessDecision> {
        // tier a: action:entity:*:*
        if grant_set.has_any_scope(action, entity) {
            return self
                .branch_scoped(user, entity, schema, params, Vec::new())
                .await;
        }

        // tier b: action:entity:self:*
        if grant_set.has_self_scope(action, entity) {
            if action == Action::Delete {
                return Ok(AccessDecision::deny("self scope cannot delete"));
            }

            let mut decision = self
                .branch_scoped(user, entity, schema, params, Vec::new())
                .await?;
            if !decision.permitted {
                return Ok(decision);
            }

            if action == Action::Edit {
                if let Some(row_id) = params.get("id") {
                    if !self.is_row_owner(entity, row_id, &user.id).await? {
                        return Ok(AccessDecision::deny("not resource owner"));
                    }
                }
            }
            if action != Action::Add {
                decision = decision.with_param("created_by", user.id.clone());
            }
            return Ok(decision);
        }

        // tier c: action:entity:*:<field> (view/edit 전용)
        let fields = grant_set.granted_fields(action, entity);
        if !fields.is_empty() && matches!(action, Action::View | Action::Edit) {
            return self
                .branch_scoped(user, entity, schema, params, fields)
                .await;
        }

        Ok(AccessDecision::deny("no matching grant"))
    }

    /// Group: Branch와 동형, 멤버십 교집합으로 판정
    #[allow(clippy::too_many_arguments)]
    async fn eval_group(
        &self,
        user: &UserContext,
        action: Action,
        entity: &str,
        schema: &EntitySchema,
        grant_set: &GrantSet,
        params: &FilterMap,
        payload: &[Row],
    ) -> Result<AccessDecision> {
        if grant_set.has_any_scope(action, entity) {
            return self
                .group_scoped(user, action, entity, schema, params, payload, Vec::new())
                .await;
        }

        if grant_set.has_self_scope(action, entity) {
            if action == Action::Delete {
                return Ok(AccessDecision::deny("self scope cannot delete"));
            }

            let mut decision = self
                .group_scoped(user, action, entity, schema, params, payload, Vec::new())
                .await?;
            if !decision.permitted {
                return Ok(decision);
            }

            if action == Action::Edit {
                if let Some(row_id) = params.get("id") {
                    if !self.is_row_owner(entity, row_id, &user.id).await? {
                        return Ok(AccessDecision::deny("not resource owner"));
                    }
                }
            }
            if action != Action::Add {
                decision = decision.with_param("created_by", user.id.clone());
            }
            return Ok(decision);
        }

        let fields = grant_set.granted_fields(action, entity);
        if !fields.is_empty() && matches!(action, Action::View | Action::Edit) {
            return self
                .group_scoped(user, action, entity, schema, params, payload, fields)
                .await;
        }

        Ok(AccessDecision::deny("no matching grant"))
    }

    /// Superuser 엔티티: 전역 와일드카드 외에는 정확한 grant만
    fn eval_superuser_entity(
        &self,
        action: Action,
        entity: &str,
        grant_set: &GrantSet,
    ) -> AccessDecision {
        if grant_set.has_any_scope(action, entity) {
            return AccessDecision::permit();
        }
        AccessDecision::deny("entity requires an explicit grant")
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // 스코핑 헬퍼
    // ─────────────────────────────────────────────────────────────────────────────

    /// Branch 스코핑: branch_id 필드가 있으면 필터 주입, 없으면 체인 해석
    async fn branch_scoped(
        &self,
        user: &UserContext,
        entity: &str,
        schema: &EntitySchema,
        params: &FilterMap,
        fields: Vec<String>,
    ) -> Result<AccessDecision> {
        if schema.has_field("branch_id") {
            let Some(branch_id) = user.branch_id.as_deref() else {
                return Ok(AccessDecision::deny("user has no branch"));
            };
            let mut decision = AccessDecision::permit().with_param("branch_id", branch_id);
            decision.fields = fields;
            return Ok(decision);
        }

        let row_id = params.get("id").map(String::as_str);
        let parent_id = schema
            .parent_fk_field()
            .and_then(|fk| params.get(&fk).cloned());

        let resolver = ScopeResolver::new(self.registry, self.rows);
        let same_branch = self
            .timed(resolver.check_branch(
                user.branch_id.as_deref(),
                parent_id.as_deref(),
                entity,
                row_id,
            ))
            .await?;

        if same_branch {
            let mut decision = AccessDecision::permit();
            decision.fields = fields;
            Ok(decision)
        } else {
            Ok(AccessDecision::deny("resource outside user branch"))
        }
    }

    /// Group 스코핑: group_id 필드 주입 또는 행 멤버십 교집합 검사
    #[allow(clippy::too_many_arguments)]
    async fn group_scoped(
        &self,
        user: &UserContext,
        action: Action,
        entity: &str,
        schema: &EntitySchema,
        params: &FilterMap,
        payload: &[Row],
        fields: Vec<String>,
    ) -> Result<AccessDecision> {
        if user.group_ids.is_empty() {
            return Ok(AccessDecision::deny("user has no groups"));
        }

        match action {
            Action::View => {
                if schema.has_field("group_id") {
                    let mut decision = AccessDecision::permit()
                        .with_param("group_id", user.group_ids.join(","));
                    decision.fields = fields;
                    return Ok(decision);
                }
                let Some(row_id) = params.get("id") else {
                    return Ok(AccessDecision::deny("resource outside user groups"));
                };
                self.group_membership_permit(user, entity, row_id, fields).await
            }
            Action::Add => {
                // 페이로드가 고른 그룹은 사용자 멤버십 안이어야 합니다.
                if schema.has_field("group_id") {
                    for row in payload {
                        if let Some(gid) = row.get("group_id").and_then(value_as_id) {
                            if !user.has_group(&gid) {
                                return Ok(AccessDecision::deny("group outside membership"));
                            }
                        }
                    }
                }
                let mut decision = AccessDecision::permit();
                decision.fields = fields;
                Ok(decision)
            }
            Action::Edit | Action::Delete => {
                let Some(row_id) = params.get("id") else {
                    return Ok(AccessDecision::deny("resource outside user groups"));
                };
                self.group_membership_permit(user, entity, row_id, fields).await
            }
        }
    }

    async fn group_membership_permit(
        &self,
        user: &UserContext,
        entity: &str,
        row_id: &str,
        fields: Vec<String>,
    ) -> Result<AccessDecision> {
        let resolver = ScopeResolver::new(self.registry, self.rows);
        let resource_groups = self
            .timed(resolver.fetch_group_ids(entity, row_id))
            .await?;

        if check_group(&user.group_ids, &resource_groups) {
            let mut decision = AccessDecision::permit();
            decision.fields = fields;
            Ok(decision)
        } else {
            Ok(AccessDecision::deny("resource outside user groups"))
        }
    }

    /// 행 소유자 확인 (created_by == user id)
    async fn is_row_owner(&self, entity: &str, row_id: &str, user_id: &str) -> Result<bool> {
        let mut filter = FilterMap::new();
        filter.insert("id".to_string(), row_id.to_string());
        let rows = self.timed(self.rows.lookup(entity, &filter)).await?;

        let Some(row) = rows.first() else {
            return Ok(false);
        };
        Ok(row
            .get("created_by")
            .and_then(value_as_id)
            .as_deref()
            == Some(user_id))
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // 페이로드 스탬핑/스크럽
    // ─────────────────────────────────────────────────────────────────────────────

    /// 쓰기 페이로드 정리
    ///
    /// immutable 필드는 grant와 무관하게 제거됩니다. 필드 제한이 있으면
    /// 목록 밖 필드를 제거합니다(id는 유지). add 행은 소유/스코핑 필드를
    /// `UserContext`와 검증된 부모 ID로 덮어씁니다.
    fn prepare_payload(
        &self,
        schema: &EntitySchema,
        user: &UserContext,
        action: Action,
        payload: Vec<Row>,
        params: &FilterMap,
        allowed_fields: &[String],
    ) -> Vec<Row> {
        let immutable: Vec<String> = schema.immutable_fields().map(str::to_string).collect();
        let parent_fk = schema.parent_fk_field();

        let mut rows = payload;
        for row in &mut rows {
            for field in &immutable {
                row.remove(field);
            }

            if !allowed_fields.is_empty() {
                let keep: Vec<String> = row
                    .keys()
                    .filter(|k| *k == "id" || allowed_fields.iter().any(|f| f == *k))
                    .cloned()
                    .collect();
                let mut projected = Row::new();
                for key in keep {
                    if let Some(value) = row.remove(&key) {
                        projected.insert(key, value);
                    }
                }
                *row = projected;
            }

            if action == Action::Add {
                row.insert("created_by".to_string(), Value::String(user.id.clone()));

                if schema.has_field("branch_id") {
                    if let Some(branch_id) = user.branch_id.as_deref() {
                        row.insert(
                            "branch_id".to_string(),
                            Value::String(branch_id.to_string()),
                        );
                    }
                }

                if let Some(fk) = parent_fk.as_deref() {
                    if let Some(parent_id) = params.get(fk) {
                        row.insert(fk.to_string(), Value::String(parent_id.clone()));
                    }
                }

                if schema.parent.as_deref() == Some("users") && schema.has_field("user_id") {
                    row.insert("user_id".to_string(), Value::String(user.id.clone()));
                }
            }
        }
        rows
    }

    /// 데드라인 적용 스토어 호출
    async fn timed<T, F>(&self, fut: F) -> Result<T>
    where
        F: std::future::Future<Output = Result<T>>,
    {
        match self.deadline {
            Some(limit) => match tokio::time::timeout(limit, fut).await {
                Ok(result) => result,
                Err(_) => Err(Error::Cancelled),
            },
            None => fut.await,
        }
    }
}

fn value_as_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
