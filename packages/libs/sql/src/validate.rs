//! 값 검증기
//!
//! 필터/페이로드 값을 스키마의 필드 타입과 대조합니다. 검증을 통과한
//! 입력만이 컴파일러로 전달되며, 이후 단계는 값을 바인딩 파라미터로만
//! 취급합니다.
//!
//! `id`와 `deleted_at`은 존재 확인 외의 타입 검사에서 제외됩니다.

use chrono::{DateTime, NaiveDate};
use serde_json::Value;

use mgn_core::error::{Error, Result};
use mgn_core::permissions::{FilterMap, Row};
use mgn_core::schema::{EntitySchema, FieldSpec, FieldType, SchemaRegistry, SOFT_DELETE_FIELD};

use crate::filter::{FilterExpr, FilterOperator};

/// 쓰기 배치 최대 행 수
pub const MAX_BATCH_ROWS: usize = 100;

/// 필터 맵 파싱 및 검증
///
/// 각 항목을 `FilterExpr`로 파싱하고 값 요소를 타입 검사합니다.
/// 알 수 없는 필드는 거부됩니다.
pub fn parse_filters(schema: &EntitySchema, filters: &FilterMap) -> Result<Vec<FilterExpr>> {
    let mut exprs = Vec::with_capacity(filters.len());
    for (field, raw) in filters {
        exprs.push(parse_filter(schema, field, raw)?);
    }
    Ok(exprs)
}

/// 필터 항목 한 개 파싱 및 검증
pub fn parse_filter(schema: &EntitySchema, field: &str, raw: &str) -> Result<FilterExpr> {
    let spec = schema.field(field).ok_or_else(|| Error::UnknownField {
        entity: schema.name.clone(),
        field: field.to_string(),
    })?;

    let expr = FilterExpr::parse(field, spec, raw)?;
    check_filter_values(schema, field, spec, &expr)?;
    Ok(expr)
}

/// 파싱된 필터의 값 요소 검사
fn check_filter_values(
    schema: &EntitySchema,
    field: &str,
    spec: &FieldSpec,
    expr: &FilterExpr,
) -> Result<()> {
    if field == "id" || field == SOFT_DELETE_FIELD {
        return Ok(());
    }
    // LIKE 패턴은 와일드카드가 섞이므로 타입/길이 검사 대상이 아님
    if matches!(
        expr.operator,
        FilterOperator::Like | FilterOperator::IsNull | FilterOperator::IsNotNull
    ) {
        return Ok(());
    }

    for value in &expr.values {
        check_scalar_str(&schema.name, field, spec, value)?;
    }
    Ok(())
}

/// 전역 필드 이름 검증
///
/// 어떤 엔티티에도 선언되지 않은 필드 이름을 요청 파라미터에서
/// 걸러냅니다. 엔티티별 검증 전의 1차 방어선입니다.
pub fn check_known_field_names<'a, I>(registry: &SchemaRegistry, names: I) -> Result<()>
where
    I: IntoIterator<Item = &'a str>,
{
    let known = registry.all_field_names();
    for name in names {
        if !known.contains(name) {
            return Err(Error::UnknownField {
                entity: "*".to_string(),
                field: name.to_string(),
            });
        }
    }
    Ok(())
}

/// 쓰기 배치 크기 검사
pub fn check_batch_size(rows: &[Row]) -> Result<()> {
    if rows.is_empty() || rows.len() > MAX_BATCH_ROWS {
        return Err(Error::EmptyOrOversizedBatch {
            max: MAX_BATCH_ROWS,
            actual: rows.len(),
        });
    }
    Ok(())
}

/// 쓰기 페이로드 검증
///
/// 배치 크기 검사 후 각 행의 모든 필드를 타입 검사합니다.
pub fn validate_payload(schema: &EntitySchema, rows: &[Row]) -> Result<()> {
    check_batch_size(rows)?;
    for row in rows {
        for (field, value) in row {
            let spec = schema.field(field).ok_or_else(|| Error::UnknownField {
                entity: schema.name.clone(),
                field: field.clone(),
            })?;
            if field == "id" || field == SOFT_DELETE_FIELD {
                continue;
            }
            check_value(&schema.name, field, spec, value)?;
        }
    }
    Ok(())
}

/// JSON 값 한 개의 타입 검사
///
/// `Null`은 모든 타입에서 허용됩니다 (nullable 여부는 스토어 몫).
pub fn check_value(entity: &str, field: &str, spec: &FieldSpec, value: &Value) -> Result<()> {
    if value.is_null() {
        return Ok(());
    }

    match (&spec.field_type, value) {
        (FieldType::Number, Value::Number(_)) => Ok(()),
        (FieldType::Number, Value::String(s)) if s.parse::<f64>().is_ok() => Ok(()),

        (FieldType::Date, Value::String(s)) if is_date(s) => Ok(()),

        (FieldType::Boolean, Value::Bool(_)) => Ok(()),
        (FieldType::Boolean, Value::String(s)) if is_bool(s) => Ok(()),

        (FieldType::Enum { values }, Value::String(s)) if values.iter().any(|v| v == s) => Ok(()),

        (FieldType::String { max_len }, Value::String(s)) => {
            if s.chars().count() as u32 > *max_len {
                Err(Error::ValueTooLong {
                    field: field.to_string(),
                    max: *max_len,
                })
            } else {
                Ok(())
            }
        }
        (FieldType::String { .. }, Value::Number(_)) => Ok(()),

        (FieldType::Buffer, _) => Ok(()),

        (field_type, other) => Err(Error::TypeMismatch {
            field: format!("{}.{}", entity, field),
            expected: field_type.type_name().to_string(),
            value: scalar_repr(other),
        }),
    }
}

/// 필터 문자열 요소의 타입 검사
fn check_scalar_str(entity: &str, field: &str, spec: &FieldSpec, value: &str) -> Result<()> {
    let ok = match &spec.field_type {
        FieldType::Number => value.parse::<f64>().is_ok(),
        FieldType::Date => is_date(value),
        FieldType::Boolean => is_bool(value),
        FieldType::Enum { values } => values.iter().any(|v| v == value),
        FieldType::String { max_len } => {
            if value.chars().count() as u32 > *max_len {
                return Err(Error::ValueTooLong {
                    field: field.to_string(),
                    max: *max_len,
                });
            }
            true
        }
        FieldType::Buffer => true,
    };

    if ok {
        Ok(())
    } else {
        Err(Error::TypeMismatch {
            field: format!("{}.{}", entity, field),
            expected: spec.field_type.type_name().to_string(),
            value: value.to_string(),
        })
    }
}

/// 쓰기 금지 필드 제거
///
/// grant가 해당 필드를 명시하더라도 무조건 제거됩니다.
pub fn strip_immutable(schema: &EntitySchema, row: &Row) -> Row {
    row.iter()
        .filter(|(field, _)| {
            schema
                .field(field)
                .map(|spec| !spec.immutable)
                .unwrap_or(true)
        })
        .map(|(field, value)| (field.clone(), value.clone()))
        .collect()
}

/// 허용 필드 투영
///
/// `allowed`가 비어 있으면 전체 허용입니다. `id`는 항상 유지됩니다.
pub fn project_fields(allowed: &[String], row: &Row) -> Row {
    if allowed.is_empty() {
        return row.clone();
    }
    row.iter()
        .filter(|(field, _)| field.as_str() == "id" || allowed.iter().any(|a| a == *field))
        .map(|(field, value)| (field.clone(), value.clone()))
        .collect()
}

fn is_date(s: &str) -> bool {
    DateTime::parse_from_rfc3339(s).is_ok() || NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()
}

fn is_bool(s: &str) -> bool {
    matches!(s, "true" | "false" | "1" | "0")
}

fn scalar_repr(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
