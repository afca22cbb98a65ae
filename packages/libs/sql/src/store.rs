//! Postgres 저장소 어댑터
//!
//! 권한 평가기가 요구하는 `GrantStore` / `RowStore`의 Postgres 구현과,
//! 컴파일된 쿼리를 실행할 때 쓰는 바인딩 / 행 변환 헬퍼를 제공합니다.
//! SQL은 전부 SeaQuery로 조립되고 값은 바인딩 파라미터로만 전달됩니다.

use async_trait::async_trait;
use sea_query::{Asterisk, Expr, PostgresQueryBuilder, Query, Value as SqlValue, Values};
use serde_json::Value;
use sqlx::postgres::{PgArguments, PgPool, PgRow};
use sqlx::{Column, Row as SqlxRow, TypeInfo};

use mgn_core::error::{Error, Result};
use mgn_core::permissions::{FilterMap, GrantStore, Row, RowStore};

use crate::compiler::DynIden;

/// Role 권한 코드 테이블 조회
///
/// 기본 레이아웃은 `role_grants(role_id, code)`이며 `with_*` 빌더로
/// 테이블/컬럼 이름을 바꿀 수 있습니다.
pub struct PgGrantStore {
    pool: PgPool,
    table: String,
    role_column: String,
    code_column: String,
}

impl PgGrantStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            table: "role_grants".to_string(),
            role_column: "role_id".to_string(),
            code_column: "code".to_string(),
        }
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    pub fn with_role_column(mut self, column: impl Into<String>) -> Self {
        self.role_column = column.into();
        self
    }

    pub fn with_code_column(mut self, column: impl Into<String>) -> Self {
        self.code_column = column.into();
        self
    }
}

#[async_trait]
impl GrantStore for PgGrantStore {
    async fn fetch_grants(&self, role_id: &str) -> Result<Vec<String>> {
        let (sql, values) = Query::select()
            .column(DynIden(self.code_column.clone()))
            .from(DynIden(self.table.clone()))
            .and_where(Expr::col(DynIden(self.role_column.clone())).eq(id_value(role_id)))
            .build(PostgresQueryBuilder);

        let rows = bind_compiled(sqlx::query(&sql), values)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Error::Resolver {
                message: format!("grant fetch failed: {}", e),
            })?;

        Ok(rows
            .into_iter()
            .filter_map(|row| row.try_get::<String, _>(0).ok())
            .collect())
    }
}

/// 엔티티 행 조회
///
/// 필터는 equality 매칭이며 콤마 구분 다중 값은 IN으로 해석됩니다.
/// 지점/그룹 해석처럼 ID 앵커로 행 몇 개를 읽는 용도입니다.
pub struct PgRowStore {
    pool: PgPool,
}

impl PgRowStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RowStore for PgRowStore {
    async fn lookup(&self, entity: &str, filter: &FilterMap) -> Result<Vec<Row>> {
        let (sql, values) = {
            let mut query = Query::select();
            query.column(Asterisk).from(DynIden(entity.to_string()));

            for (field, raw) in filter {
                let col = Expr::col(DynIden(field.clone()));
                let parts: Vec<&str> = raw
                    .split(',')
                    .map(|p| p.trim())
                    .filter(|p| !p.is_empty())
                    .collect();
                match parts.as_slice() {
                    [] => {}
                    [single] => {
                        query.and_where(col.eq(id_value(single)));
                    }
                    many => {
                        query.and_where(col.is_in(many.iter().map(|p| id_value(p))));
                    }
                }
            }

            query.build(PostgresQueryBuilder)
        };
        let rows = bind_compiled(sqlx::query(&sql), values)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Error::Resolver {
                message: format!("row lookup failed: {}", e),
            })?;

        Ok(rows.into_iter().map(row_to_map).collect())
    }
}

/// 컴파일된 쿼리 실행 후 행을 JSON 맵으로 조회
pub async fn fetch_compiled(pool: &PgPool, sql: &str, values: Values) -> Result<Vec<Row>> {
    let rows = bind_compiled(sqlx::query(sql), values)
        .fetch_all(pool)
        .await
        .map_err(|e| Error::Resolver {
            message: format!("query failed: {}", e),
        })?;
    Ok(rows.into_iter().map(row_to_map).collect())
}

/// ID 문자열을 바인딩 값으로 변환
///
/// Postgres는 텍스트 파라미터를 숫자 컬럼과 비교하지 못하므로
/// 정수로 파싱되면 정수로 바인딩합니다.
fn id_value(raw: &str) -> SqlValue {
    match raw.parse::<i64>() {
        Ok(n) => n.into(),
        Err(_) => raw.into(),
    }
}

/// SeaQuery 값 목록을 sqlx 쿼리에 바인딩
pub fn bind_compiled(
    mut query: sqlx::query::Query<'_, sqlx::Postgres, PgArguments>,
    values: Values,
) -> sqlx::query::Query<'_, sqlx::Postgres, PgArguments> {
    for value in values.0 {
        match value {
            SqlValue::Bool(v) => query = query.bind(v),
            SqlValue::TinyInt(v) => query = query.bind(v.map(i16::from)),
            SqlValue::SmallInt(v) => query = query.bind(v),
            SqlValue::Int(v) => query = query.bind(v),
            SqlValue::BigInt(v) => query = query.bind(v),
            SqlValue::TinyUnsigned(v) => query = query.bind(v.map(i16::from)),
            SqlValue::SmallUnsigned(v) => query = query.bind(v.map(i32::from)),
            SqlValue::Unsigned(v) => query = query.bind(v.map(i64::from)),
            SqlValue::BigUnsigned(v) => query = query.bind(v.map(|n| n as i64)),
            SqlValue::Float(v) => query = query.bind(v),
            SqlValue::Double(v) => query = query.bind(v),
            SqlValue::String(v) => query = query.bind(v.map(|s| *s)),
            SqlValue::Char(v) => query = query.bind(v.map(|c| c.to_string())),
            SqlValue::Bytes(v) => query = query.bind(v.map(|b| *b)),
        }
    }
    query
}

/// PgRow를 JSON 맵으로 변환
///
/// 컬럼 타입 이름으로 분기하며 읽기 실패는 NULL로 취급합니다.
pub fn row_to_map(row: PgRow) -> Row {
    let mut obj = serde_json::Map::new();
    for column in row.columns() {
        let name = column.name();
        let type_name = column.type_info().name().to_ascii_uppercase();
        let value = match type_name.as_str() {
            "INT2" | "INT4" | "INT8" | "INTEGER" | "BIGINT" => row
                .try_get::<Option<i64>, _>(name)
                .ok()
                .flatten()
                .map(|v| Value::Number(v.into())),
            "FLOAT4" | "FLOAT8" | "DOUBLE PRECISION" => row
                .try_get::<Option<f64>, _>(name)
                .ok()
                .flatten()
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number),
            "BOOL" | "BOOLEAN" => row
                .try_get::<Option<bool>, _>(name)
                .ok()
                .flatten()
                .map(Value::Bool),
            "JSON" | "JSONB" => row
                .try_get::<Option<serde_json::Value>, _>(name)
                .ok()
                .flatten(),
            "TIMESTAMPTZ" | "TIMESTAMP" => row
                .try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(name)
                .ok()
                .flatten()
                .map(|v| Value::String(v.to_rfc3339())),
            _ => row
                .try_get::<Option<String>, _>(name)
                .ok()
                .flatten()
                .map(Value::String),
        }
        .unwrap_or(Value::Null);

        obj.insert(name.to_string(), value);
    }
    obj
}
