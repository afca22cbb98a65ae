//! 조건 컴파일러
//!
//! 검증된 필터를 파라미터 바인딩 SQL로 컴파일합니다. SeaQuery를
//! 사용하며 값은 전부 바인딩 파라미터입니다. 신뢰할 수 없는 문자열이
//! SQL 텍스트로 합쳐지는 경로는 없습니다.
//!
//! soft delete 필드(`deleted_at`)가 선언된 엔티티는 호출자가 끌 수
//! 없는 `IS NULL` (또는 `include_deleted`일 때 `IS NOT NULL`) 조건이
//! 항상 주입됩니다.

use sea_query::{
    Expr, Iden, JoinType, Order, PostgresQueryBuilder, Query, SelectStatement, SimpleExpr,
    Value as SqlValue, Values,
};
use serde_json::Value;

use mgn_core::error::{Error, Result};
use mgn_core::permissions::{FilterMap, Row};
use mgn_core::schema::{EntitySchema, FieldSpec, FieldType, SchemaRegistry};

use crate::filter::{FilterExpr, FilterOperator};
use crate::pagination::Pagination;
use crate::validate;

/// 동적 테이블/컬럼 식별자
#[derive(Debug, Clone)]
pub(crate) struct DynIden(pub(crate) String);

impl Iden for DynIden {
    fn unquoted(&self, s: &mut dyn std::fmt::Write) {
        write!(s, "{}", self.0).unwrap();
    }
}

/// 부모 조인 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
}

/// 부모 조인 요청
///
/// 대상 엔티티가 `parent`를 선언한 경우에만 유효합니다.
/// `FROM parent JOIN child` 형태로 빌드되며 자식 컬럼은
/// `<자식>_<필드>`로 별칭됩니다.
#[derive(Debug, Clone)]
pub struct ParentJoin {
    pub kind: JoinKind,

    /// 조부모까지 한 단계 더 올라갈지 여부
    pub grandparent: bool,
}

impl ParentJoin {
    pub fn inner() -> Self {
        Self {
            kind: JoinKind::Inner,
            grandparent: false,
        }
    }

    pub fn left() -> Self {
        Self {
            kind: JoinKind::Left,
            grandparent: false,
        }
    }

    pub fn right() -> Self {
        Self {
            kind: JoinKind::Right,
            grandparent: false,
        }
    }

    pub fn with_grandparent(mut self) -> Self {
        self.grandparent = true;
        self
    }
}

/// 조건 컴파일러
///
/// 레지스트리 참조 외의 상태를 갖지 않으며 호출 간 공유가 자유롭습니다.
pub struct ConditionCompiler<'a> {
    registry: &'a SchemaRegistry,
}

impl<'a> ConditionCompiler<'a> {
    pub fn new(registry: &'a SchemaRegistry) -> Self {
        Self { registry }
    }

    /// SELECT 컴파일
    ///
    /// 목록 조회용으로 `COUNT(*) OVER () AS total`이 선택 목록에
    /// 포함됩니다. 페이지네이션 파라미터는 필터 파라미터 뒤에
    /// 바인딩됩니다.
    pub fn select(
        &self,
        entity: &str,
        filters: &FilterMap,
        pagination: Option<&Pagination>,
        join: Option<&ParentJoin>,
        include_deleted: bool,
    ) -> Result<(String, Values)> {
        let schema = self.registry.lookup(entity)?;

        let (sql, values) = match join {
            None => self.select_plain(schema, filters, pagination, include_deleted)?,
            Some(join) => self.select_joined(schema, join, filters, pagination, include_deleted)?,
        };

        tracing::debug!(entity, sql = %sql, "compiled select");
        Ok((sql, values))
    }

    fn select_plain(
        &self,
        schema: &EntitySchema,
        filters: &FilterMap,
        pagination: Option<&Pagination>,
        include_deleted: bool,
    ) -> Result<(String, Values)> {
        let exprs = validate::parse_filters(schema, filters)?;
        let table = DynIden(schema.name.clone());

        let mut query = Query::select();
        query.from(table.clone());
        for field in schema.field_names() {
            query.column((table.clone(), DynIden(field.to_string())));
        }
        query.expr_as(Expr::cust("COUNT(*) OVER ()"), DynIden("total".to_string()));

        if let Some(cond) = soft_delete_condition(schema, include_deleted) {
            query.and_where(cond);
        }
        for expr in &exprs {
            query.and_where(self.condition(schema, expr)?);
        }

        if let Some(pagination) = pagination {
            let order_field = pagination.resolve_order_field(schema);
            query.order_by(
                (table.clone(), DynIden(order_field.to_string())),
                sort_order(pagination),
            );
            query.limit(pagination.limit);
            query.offset(pagination.offset);
        }

        Ok(query.build(PostgresQueryBuilder))
    }

    fn select_joined(
        &self,
        schema: &EntitySchema,
        join: &ParentJoin,
        filters: &FilterMap,
        pagination: Option<&Pagination>,
        include_deleted: bool,
    ) -> Result<(String, Values)> {
        let parent_name = schema.parent.as_deref().ok_or_else(|| Error::SchemaParse {
            message: format!("entity '{}' declares no parent to join", schema.name),
        })?;
        let parent = self.registry.lookup(parent_name)?;
        let fk = schema.parent_fk_field().ok_or_else(|| Error::SchemaParse {
            message: format!(
                "entity '{}' has no foreign key field for parent '{}'",
                schema.name, parent_name
            ),
        })?;

        let parent_iden = DynIden(parent.name.clone());
        let child_iden = DynIden(schema.name.clone());
        let join_type = match join.kind {
            JoinKind::Inner => JoinType::InnerJoin,
            JoinKind::Left => JoinType::LeftJoin,
            JoinKind::Right => JoinType::RightJoin,
        };

        let mut query = Query::select();
        query.from(parent_iden.clone());
        query.join(
            join_type,
            child_iden.clone(),
            Expr::col((parent_iden.clone(), DynIden("id".to_string())))
                .equals((child_iden.clone(), DynIden(fk))),
        );

        let grandparent = if join.grandparent {
            self.join_grandparent(&mut query, parent, join_type)?
        } else {
            None
        };

        // 부모(주 테이블)는 별칭 없이, 자식/조부모는 <테이블>_<필드>로 별칭
        for field in parent.field_names() {
            query.column((parent_iden.clone(), DynIden(field.to_string())));
        }
        for field in schema.field_names() {
            query.expr_as(
                Expr::col((child_iden.clone(), DynIden(field.to_string()))),
                DynIden(format!("{}_{}", schema.name, field)),
            );
        }
        if let Some(gp) = grandparent {
            for field in gp.field_names() {
                query.expr_as(
                    Expr::col((DynIden(gp.name.clone()), DynIden(field.to_string()))),
                    DynIden(format!("{}_{}", gp.name, field)),
                );
            }
        }
        query.expr_as(Expr::cust("COUNT(*) OVER ()"), DynIden("total".to_string()));

        // 필터 분배 우선순위. 같은 필드를 양쪽이 선언하면 inner/right는
        // 자식, left는 조상 쪽이 이기고 진 쪽 사본은 적용되지 않습니다.
        let precedence: Vec<&EntitySchema> = match join.kind {
            JoinKind::Inner | JoinKind::Right => {
                let mut tables = vec![schema, parent];
                if let Some(gp) = grandparent {
                    tables.push(gp);
                }
                tables
            }
            JoinKind::Left => {
                let mut tables = Vec::new();
                if let Some(gp) = grandparent {
                    tables.push(gp);
                }
                tables.push(parent);
                tables.push(schema);
                tables
            }
        };

        for (field, raw) in filters {
            let owner = precedence
                .iter()
                .find(|table| table.has_field(field))
                .copied()
                .ok_or_else(|| Error::UnknownField {
                    entity: format!("{}+{}", parent.name, schema.name),
                    field: field.clone(),
                })?;
            let expr = validate::parse_filter(owner, field, raw)?;
            query.and_where(self.condition(owner, &expr)?);
        }

        // soft delete는 선언한 테이블마다 주입
        let mut soft_tables = precedence.clone();
        soft_tables.sort_by(|a, b| a.name.cmp(&b.name));
        for table in &soft_tables {
            if let Some(cond) = soft_delete_condition(table, include_deleted) {
                query.and_where(cond);
            }
        }

        if let Some(pagination) = pagination {
            let (order_table, order_field) = match pagination.order_field.as_deref() {
                Some(requested) => precedence
                    .iter()
                    .find(|table| table.has_field(requested))
                    .map(|table| (table.name.clone(), requested.to_string()))
                    .unwrap_or_else(|| fallback_order(parent)),
                None => fallback_order(parent),
            };
            query.order_by(
                (DynIden(order_table), DynIden(order_field)),
                sort_order(pagination),
            );
            query.limit(pagination.limit);
            query.offset(pagination.offset);
        }

        Ok(query.build(PostgresQueryBuilder))
    }

    fn join_grandparent(
        &self,
        query: &mut SelectStatement,
        parent: &EntitySchema,
        join_type: JoinType,
    ) -> Result<Option<&'a EntitySchema>> {
        let Some(gp_name) = parent.parent.as_deref() else {
            return Ok(None);
        };
        let gp = self.registry.lookup(gp_name)?;
        let gp_fk = parent.parent_fk_field().ok_or_else(|| Error::SchemaParse {
            message: format!(
                "entity '{}' has no foreign key field for parent '{}'",
                parent.name, gp_name
            ),
        })?;

        query.join(
            join_type,
            DynIden(gp.name.clone()),
            Expr::col((DynIden(parent.name.clone()), DynIden(gp_fk)))
                .equals((DynIden(gp.name.clone()), DynIden("id".to_string()))),
        );
        Ok(Some(gp))
    }

    /// INSERT 컴파일 (다중 행, RETURNING id)
    ///
    /// 배치 검증과 페이로드 타입 검사를 먼저 수행합니다. 행마다
    /// 누락된 컬럼은 NULL로 바인딩됩니다.
    pub fn insert(&self, entity: &str, rows: &[Row]) -> Result<(String, Values)> {
        let schema = self.registry.lookup(entity)?;
        validate::validate_payload(schema, rows)?;

        let mut columns: Vec<&str> = Vec::new();
        for row in rows {
            for field in row.keys() {
                if !columns.contains(&field.as_str()) {
                    columns.push(field);
                }
            }
        }

        let mut query = Query::insert();
        query.into_table(DynIden(schema.name.clone()));
        query.columns(
            columns
                .iter()
                .map(|c| DynIden(ToString::to_string(c)))
                .collect::<Vec<_>>(),
        );
        for row in rows {
            let row_values: Vec<SqlValue> = columns
                .iter()
                .map(|column| {
                    row.get(*column)
                        .map(json_to_sql)
                        .unwrap_or(SqlValue::String(None))
                })
                .collect();
            query.values_panic(row_values.into_iter().map(SimpleExpr::from));
        }
        query.returning(Query::returning().column(DynIden("id".to_string())));

        let (sql, values) = query.build(PostgresQueryBuilder);
        tracing::debug!(entity, rows = rows.len(), "compiled insert");
        Ok((sql, values))
    }

    /// UPDATE 컴파일
    ///
    /// 쓰기 금지 필드와 `id`는 grant와 무관하게 SET 목록에서
    /// 제외됩니다. 필터가 비어 있으면 거부합니다.
    pub fn update(&self, entity: &str, data: &Row, filters: &FilterMap) -> Result<(String, Values)> {
        let schema = self.registry.lookup(entity)?;
        if filters.is_empty() {
            return Err(Error::MissingWriteFilter);
        }
        let exprs = validate::parse_filters(schema, filters)?;

        let mut scrubbed = validate::strip_immutable(schema, data);
        scrubbed.remove("id");
        if scrubbed.is_empty() {
            return Err(Error::EmptyOrOversizedBatch {
                max: validate::MAX_BATCH_ROWS,
                actual: 0,
            });
        }
        validate::validate_payload(schema, std::slice::from_ref(&scrubbed))?;

        let mut query = Query::update();
        query.table(DynIden(schema.name.clone()));
        for (field, value) in &scrubbed {
            query.value(DynIden(field.clone()), json_to_sql(value));
        }

        if let Some(cond) = soft_delete_condition(schema, false) {
            query.and_where(cond);
        }
        for expr in &exprs {
            query.and_where(self.condition(schema, expr)?);
        }
        query.returning(Query::returning().column(DynIden("id".to_string())));

        let (sql, values) = query.build(PostgresQueryBuilder);
        tracing::debug!(entity, sql = %sql, "compiled update");
        Ok((sql, values))
    }

    /// DELETE 컴파일
    ///
    /// `deleted_at`이 선언된 엔티티는 soft delete(UPDATE)로, 아니면
    /// 물리 삭제로 컴파일됩니다.
    pub fn delete(&self, entity: &str, filters: &FilterMap) -> Result<(String, Values)> {
        let schema = self.registry.lookup(entity)?;
        if filters.is_empty() {
            return Err(Error::MissingWriteFilter);
        }

        let Some(soft_field) = schema.soft_delete_field() else {
            return self.hard_delete(entity, filters);
        };
        let exprs = validate::parse_filters(schema, filters)?;

        let mut query = Query::update();
        query.table(DynIden(schema.name.clone()));
        query.value(
            DynIden(soft_field.to_string()),
            SqlValue::from(chrono::Utc::now().to_rfc3339()),
        );
        if let Some(cond) = soft_delete_condition(schema, false) {
            query.and_where(cond);
        }
        for expr in &exprs {
            query.and_where(self.condition(schema, expr)?);
        }
        query.returning(Query::returning().column(DynIden("id".to_string())));

        let (sql, values) = query.build(PostgresQueryBuilder);
        tracing::debug!(entity, sql = %sql, "compiled soft delete");
        Ok((sql, values))
    }

    /// 물리 삭제 컴파일
    pub fn hard_delete(&self, entity: &str, filters: &FilterMap) -> Result<(String, Values)> {
        let schema = self.registry.lookup(entity)?;
        if filters.is_empty() {
            return Err(Error::MissingWriteFilter);
        }
        let exprs = validate::parse_filters(schema, filters)?;

        let mut query = Query::delete();
        query.from_table(DynIden(schema.name.clone()));
        for expr in &exprs {
            query.and_where(self.condition(schema, expr)?);
        }
        query.returning(Query::returning().column(DynIden("id".to_string())));

        let (sql, values) = query.build(PostgresQueryBuilder);
        tracing::debug!(entity, sql = %sql, "compiled hard delete");
        Ok((sql, values))
    }

    /// FilterExpr 하나를 바인딩 조건으로 변환
    fn condition(&self, schema: &EntitySchema, expr: &FilterExpr) -> Result<SimpleExpr> {
        let spec = schema.field(&expr.field).ok_or_else(|| Error::UnknownField {
            entity: schema.name.clone(),
            field: expr.field.clone(),
        })?;

        let col = Expr::col((
            DynIden(schema.name.clone()),
            DynIden(expr.field.clone()),
        ));
        let first = expr.values.first().map(String::as_str).unwrap_or_default();

        Ok(match expr.operator {
            FilterOperator::Eq => col.eq(bind_scalar(spec, first)),
            FilterOperator::Neq => col.ne(bind_scalar(spec, first)),
            FilterOperator::Gt => col.gt(bind_scalar(spec, first)),
            FilterOperator::Lt => col.lt(bind_scalar(spec, first)),
            FilterOperator::Like => col.like(first),
            FilterOperator::In => {
                col.is_in(expr.values.iter().map(|value| bind_scalar(spec, value)))
            }
            FilterOperator::Between => {
                let high = expr.values.get(1).map(String::as_str).unwrap_or_default();
                col.between(bind_scalar(spec, first), bind_scalar(spec, high))
            }
            FilterOperator::IsNull => col.is_null(),
            FilterOperator::IsNotNull => col.is_not_null(),
        })
    }
}

fn sort_order(pagination: &Pagination) -> Order {
    match pagination.direction {
        crate::pagination::SortOrder::Asc => Order::Asc,
        crate::pagination::SortOrder::Desc => Order::Desc,
    }
}

fn fallback_order(schema: &EntitySchema) -> (String, String) {
    if schema.has_field("created_at") {
        (schema.name.clone(), "created_at".to_string())
    } else {
        (schema.name.clone(), "id".to_string())
    }
}

fn soft_delete_condition(schema: &EntitySchema, include_deleted: bool) -> Option<SimpleExpr> {
    let field = schema.soft_delete_field()?;
    let col = Expr::col((
        DynIden(schema.name.clone()),
        DynIden(field.to_string()),
    ));
    Some(if include_deleted {
        col.is_not_null()
    } else {
        col.is_null()
    })
}

/// 필드 타입에 맞는 바인딩 값 생성
fn bind_scalar(spec: &FieldSpec, raw: &str) -> SqlValue {
    match &spec.field_type {
        FieldType::Number => {
            if let Ok(int) = raw.parse::<i64>() {
                int.into()
            } else if let Ok(float) = raw.parse::<f64>() {
                float.into()
            } else {
                raw.to_string().into()
            }
        }
        FieldType::Boolean => match raw {
            "true" | "1" => true.into(),
            "false" | "0" => false.into(),
            _ => raw.to_string().into(),
        },
        _ => raw.to_string().into(),
    }
}

/// JSON 페이로드 값을 바인딩 값으로 변환
///
/// 배열/객체는 JSON 문자열로 직렬화해 바인딩합니다.
fn json_to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::String(None),
        Value::Bool(b) => (*b).into(),
        Value::Number(n) => {
            if let Some(int) = n.as_i64() {
                int.into()
            } else if let Some(float) = n.as_f64() {
                float.into()
            } else {
                n.to_string().into()
            }
        }
        Value::String(s) => s.clone().into(),
        Value::Array(_) | Value::Object(_) => value.to_string().into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pagination::SortOrder;
    use mgn_core::schema::SchemaParser;
    use serde_json::json;

    fn sample_registry() -> SchemaRegistry {
        SchemaParser::parse_yaml(
            r#"
entities:
  branches:
    access_rule: superuser
    fields:
      id: { type: number }
      name: { type: string }

  projects:
    access_rule: branch
    parent: branches
    fields:
      id: { type: number }
      branch_id: { type: number, immutable: true }
      name: { type: string }
      created_at: { type: date }
      deleted_at: { type: date }

  tickets:
    access_rule: branch
    parent: projects
    fields:
      id: { type: number }
      project_id: { type: number }
      title: { type: string }
      status: { type: enum, values: [open, closed] }
      created_by: { type: number, immutable: true }
      created_at: { type: date }
      deleted_at: { type: date }

  members:
    access_rule: owner
    fields:
      id: { type: number }
      name: { type: string, max_len: 50 }
      age: { type: number }
      active: { type: boolean }
      created_at: { type: date }
      deleted_at: { type: date }
"#,
        )
        .unwrap()
    }

    fn filters(pairs: &[(&str, &str)]) -> FilterMap {
        pairs
            .iter()
            .map(|(k, v)| (ToString::to_string(k), ToString::to_string(v)))
            .collect()
    }

    fn row(value: Value) -> Row {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_number_eq_single_param() {
        let registry = sample_registry();
        let compiler = ConditionCompiler::new(&registry);

        let (sql, values) = compiler
            .select("members", &filters(&[("age", "30")]), None, None, false)
            .unwrap();

        assert!(sql.contains(r#""members"."age" = $1"#));
        assert_eq!(values.0, vec![SqlValue::from(30i64)]);
    }

    #[test]
    fn test_number_between_param_order() {
        let registry = sample_registry();
        let compiler = ConditionCompiler::new(&registry);

        let (sql, values) = compiler
            .select("members", &filters(&[("age", "30,40")]), None, None, false)
            .unwrap();

        assert!(sql.contains("BETWEEN $1 AND $2"));
        assert_eq!(
            values.0,
            vec![SqlValue::from(30i64), SqlValue::from(40i64)]
        );
    }

    #[test]
    fn test_soft_delete_always_injected() {
        let registry = sample_registry();
        let compiler = ConditionCompiler::new(&registry);

        let (sql, _) = compiler
            .select("members", &FilterMap::new(), None, None, false)
            .unwrap();
        assert!(sql.contains(r#""deleted_at" IS NULL"#));
        assert!(!sql.contains("IS NOT NULL"));

        let (sql, _) = compiler
            .select("members", &FilterMap::new(), None, None, true)
            .unwrap();
        assert!(sql.contains(r#""deleted_at" IS NOT NULL"#));
        assert!(!sql.contains(r#""deleted_at" IS NULL"#));
    }

    #[test]
    fn test_no_soft_delete_field_no_clause() {
        let registry = sample_registry();
        let compiler = ConditionCompiler::new(&registry);

        let (sql, _) = compiler
            .select("branches", &FilterMap::new(), None, None, false)
            .unwrap();
        assert!(!sql.contains("deleted_at"));
    }

    #[test]
    fn test_identifier_compiles_to_in() {
        let registry = sample_registry();
        let compiler = ConditionCompiler::new(&registry);

        let (sql, values) = compiler
            .select("members", &filters(&[("id", "1,2,3")]), None, None, false)
            .unwrap();

        assert!(sql.contains(r#""members"."id" IN ($1, $2, $3)"#));
        assert_eq!(values.0.len(), 3);
    }

    #[test]
    fn test_string_like_wrapped_param() {
        let registry = sample_registry();
        let compiler = ConditionCompiler::new(&registry);

        let (sql, values) = compiler
            .select("members", &filters(&[("name", "kim")]), None, None, false)
            .unwrap();

        assert!(sql.contains(r#""members"."name" LIKE $1"#));
        assert_eq!(values.0, vec![SqlValue::from("%kim%")]);
    }

    #[test]
    fn test_pagination_defaults_and_param_order() {
        let registry = sample_registry();
        let compiler = ConditionCompiler::new(&registry);

        let pagination = Pagination::default();
        let (sql, values) = compiler
            .select(
                "members",
                &filters(&[("age", "30")]),
                Some(&pagination),
                None,
                false,
            )
            .unwrap();

        assert!(sql.contains(r#"ORDER BY "members"."created_at" DESC"#));
        assert!(sql.contains("LIMIT $2"));
        assert!(sql.contains("OFFSET $3"));
        // 필터 파라미터가 먼저, 페이지네이션 파라미터가 마지막
        assert_eq!(
            values.0,
            vec![
                SqlValue::from(30i64),
                SqlValue::from(20u64),
                SqlValue::from(0u64)
            ]
        );
    }

    #[test]
    fn test_pagination_explicit_order() {
        let registry = sample_registry();
        let compiler = ConditionCompiler::new(&registry);

        let pagination = Pagination::from_page(2, 10).order_by("age", SortOrder::Asc);
        let (sql, values) = compiler
            .select("members", &FilterMap::new(), Some(&pagination), None, false)
            .unwrap();

        assert!(sql.contains(r#"ORDER BY "members"."age" ASC"#));
        assert_eq!(
            values.0,
            vec![SqlValue::from(10u64), SqlValue::from(10u64)]
        );
    }

    #[test]
    fn test_count_over_in_select_list() {
        let registry = sample_registry();
        let compiler = ConditionCompiler::new(&registry);

        let (sql, _) = compiler
            .select("members", &FilterMap::new(), None, None, false)
            .unwrap();
        assert!(sql.contains(r#"COUNT(*) OVER () AS "total""#));
    }

    #[test]
    fn test_join_inner_shape() {
        let registry = sample_registry();
        let compiler = ConditionCompiler::new(&registry);

        let (sql, _) = compiler
            .select(
                "tickets",
                &filters(&[("title", "bug")]),
                None,
                Some(&ParentJoin::inner()),
                false,
            )
            .unwrap();

        assert!(sql.contains(r#"FROM "projects""#));
        assert!(sql.contains(
            r#"INNER JOIN "tickets" ON "projects"."id" = "tickets"."project_id""#
        ));
        assert!(sql.contains(r#"AS "tickets_title""#));
    }

    #[test]
    fn test_join_filter_partition_inner_child_wins() {
        let registry = sample_registry();
        let compiler = ConditionCompiler::new(&registry);

        // created_at은 양쪽 모두 선언. inner join은 자식이 이깁니다.
        let (sql, _) = compiler
            .select(
                "tickets",
                &filters(&[("created_at", ">::2026-01-01")]),
                None,
                Some(&ParentJoin::inner()),
                false,
            )
            .unwrap();

        let where_part = sql.split("WHERE").nth(1).unwrap();
        assert!(where_part.contains(r#""tickets"."created_at" > $1"#));
        assert!(!where_part.contains(r#""projects"."created_at" > "#));
    }

    #[test]
    fn test_join_filter_partition_left_parent_wins() {
        let registry = sample_registry();
        let compiler = ConditionCompiler::new(&registry);

        let (sql, _) = compiler
            .select(
                "tickets",
                &filters(&[("created_at", ">::2026-01-01")]),
                None,
                Some(&ParentJoin::left()),
                false,
            )
            .unwrap();

        assert!(sql.contains("LEFT JOIN"));
        let where_part = sql.split("WHERE").nth(1).unwrap();
        assert!(where_part.contains(r#""projects"."created_at" > $1"#));
        assert!(!where_part.contains(r#""tickets"."created_at" > "#));
    }

    #[test]
    fn test_join_filter_partition_right_child_wins() {
        let registry = sample_registry();
        let compiler = ConditionCompiler::new(&registry);

        let (sql, _) = compiler
            .select(
                "tickets",
                &filters(&[("created_at", ">::2026-01-01")]),
                None,
                Some(&ParentJoin::right()),
                false,
            )
            .unwrap();

        assert!(sql.contains("RIGHT JOIN"));
        let where_part = sql.split("WHERE").nth(1).unwrap();
        assert!(where_part.contains(r#""tickets"."created_at" > $1"#));
        assert!(!where_part.contains(r#""projects"."created_at" > "#));
    }

    #[test]
    fn test_join_grandparent_walk() {
        let registry = sample_registry();
        let compiler = ConditionCompiler::new(&registry);

        let (sql, _) = compiler
            .select(
                "tickets",
                &FilterMap::new(),
                None,
                Some(&ParentJoin::inner().with_grandparent()),
                false,
            )
            .unwrap();

        assert!(sql.contains(
            r#"INNER JOIN "branches" ON "projects"."branch_id" = "branches"."id""#
        ));
        assert!(sql.contains(r#"AS "branches_name""#));
    }

    #[test]
    fn test_insert_multi_row() {
        let registry = sample_registry();
        let compiler = ConditionCompiler::new(&registry);

        let rows = vec![
            row(json!({"name": "kim", "age": 30})),
            row(json!({"name": "lee", "age": 40})),
        ];
        let (sql, values) = compiler.insert("members", &rows).unwrap();

        assert!(sql.starts_with(r#"INSERT INTO "members""#));
        assert!(sql.contains(r#"RETURNING "id""#));
        assert_eq!(values.0.len(), 4);
    }

    #[test]
    fn test_insert_batch_guard() {
        let registry = sample_registry();
        let compiler = ConditionCompiler::new(&registry);

        let err = compiler.insert("members", &[]).unwrap_err();
        assert_eq!(err.code(), "EMPTY_OR_OVERSIZED_BATCH");

        let rows: Vec<Row> = (0..101).map(|i| row(json!({"age": i}))).collect();
        let err = compiler.insert("members", &rows).unwrap_err();
        assert_eq!(err.code(), "EMPTY_OR_OVERSIZED_BATCH");
    }

    #[test]
    fn test_update_strips_immutable_from_set() {
        let registry = sample_registry();
        let compiler = ConditionCompiler::new(&registry);

        let data = row(json!({"title": "fixed", "created_by": 999, "id": 7}));
        let (sql, _) = compiler
            .update("tickets", &data, &filters(&[("id", "7")]))
            .unwrap();

        let set_part = sql.split("WHERE").next().unwrap();
        assert!(set_part.contains(r#""title" = $1"#));
        assert!(!set_part.contains("created_by"));
        assert!(!set_part.contains(r#""id" = "#));
        assert!(sql.contains(r#""deleted_at" IS NULL"#));
        assert!(sql.contains(r#"RETURNING "id""#));
    }

    #[test]
    fn test_update_rejects_empty_set_after_scrub() {
        let registry = sample_registry();
        let compiler = ConditionCompiler::new(&registry);

        let data = row(json!({"created_by": 999, "id": 7}));
        let err = compiler
            .update("tickets", &data, &filters(&[("id", "7")]))
            .unwrap_err();
        assert_eq!(err.code(), "EMPTY_OR_OVERSIZED_BATCH");
    }

    #[test]
    fn test_update_requires_filter() {
        let registry = sample_registry();
        let compiler = ConditionCompiler::new(&registry);

        let data = row(json!({"title": "x"}));
        let err = compiler.update("tickets", &data, &FilterMap::new()).unwrap_err();
        assert_eq!(err.code(), "MISSING_WRITE_FILTER");
    }

    #[test]
    fn test_soft_delete_compiles_to_update() {
        let registry = sample_registry();
        let compiler = ConditionCompiler::new(&registry);

        let (sql, _) = compiler.delete("tickets", &filters(&[("id", "7")])).unwrap();
        assert!(sql.starts_with(r#"UPDATE "tickets""#));
        assert!(sql.contains(r#""deleted_at" = $1"#));
        assert!(sql.contains(r#""deleted_at" IS NULL"#));
    }

    #[test]
    fn test_hard_delete_without_soft_field() {
        let registry = sample_registry();
        let compiler = ConditionCompiler::new(&registry);

        let (sql, _) = compiler.delete("branches", &filters(&[("id", "1")])).unwrap();
        assert!(sql.starts_with(r#"DELETE FROM "branches""#));
        assert!(sql.contains(r#"RETURNING "id""#));
    }

    #[test]
    fn test_unknown_entity_and_field() {
        let registry = sample_registry();
        let compiler = ConditionCompiler::new(&registry);

        let err = compiler
            .select("ghosts", &FilterMap::new(), None, None, false)
            .unwrap_err();
        assert_eq!(err.code(), "UNKNOWN_ENTITY");

        let err = compiler
            .select("members", &filters(&[("ghost", "1")]), None, None, false)
            .unwrap_err();
        assert_eq!(err.code(), "UNKNOWN_FIELD");
    }
}
