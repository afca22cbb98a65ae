//! 필터 표현식 파싱
//!
//! 요청 파라미터의 원시 문자열 값을 구조화된 `FilterExpr`로 변환합니다.
//! 파싱은 검증 경계에서 한 번만 일어나며, 컴파일러는 파싱된 표현식을
//! 그대로 소비합니다. 연산자가 명시되지 않으면 필드 타입에 따라
//! 암묵적으로 선택됩니다.

use serde::{Deserialize, Serialize};

use mgn_core::error::{Error, Result};
use mgn_core::schema::{FieldSpec, FieldType};

/// 필터 연산자
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOperator {
    Eq,
    Neq,
    Gt,
    Lt,
    Like,
    In,
    IsNull,
    IsNotNull,
    Between,
}

/// 파싱된 필터 조건 하나
///
/// `values`는 바인딩 파라미터가 될 원시 문자열입니다. SQL 텍스트로
/// 재조립되지 않습니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterExpr {
    pub field: String,
    pub operator: FilterOperator,
    pub values: Vec<String>,
}

impl FilterExpr {
    /// 원시 값 문자열 파싱
    ///
    /// 처리 순서:
    /// 1. HTML 엔티티 디코드 (`&lt;` → `<`). 브라우저 폼 인코딩이
    ///    비교 연산자를 변형시킨 경우를 복원합니다.
    /// 2. `NULL` / `NOT NULL` 리터럴은 타입과 무관하게 IS (NOT) NULL.
    /// 3. `"operator::value"` 명시 표기 (IS, =, !=, >, <, IN, LIKE).
    ///    알 수 없는 연산자는 `BadOperator`입니다.
    /// 4. 연산자 미지정 시 필드 타입 기반 선택:
    ///    식별자/enum → IN, number/date 1개 → =, 2개 → BETWEEN,
    ///    boolean → =, string → LIKE(`%값%`).
    pub fn parse(field: &str, spec: &FieldSpec, raw: &str) -> Result<Self> {
        let decoded = decode_entities(raw);
        let trimmed = decoded.trim();

        if trimmed.eq_ignore_ascii_case("NULL") {
            return Ok(Self::unary(field, FilterOperator::IsNull));
        }
        if trimmed.eq_ignore_ascii_case("NOT NULL") {
            return Ok(Self::unary(field, FilterOperator::IsNotNull));
        }

        if let Some((token, value)) = trimmed.split_once("::") {
            return Self::parse_explicit(field, token.trim(), value.trim());
        }

        Ok(Self::implicit(field, spec, trimmed))
    }

    fn parse_explicit(field: &str, token: &str, value: &str) -> Result<Self> {
        match token.to_uppercase().as_str() {
            "IS" => match value.to_uppercase().as_str() {
                "NULL" => Ok(Self::unary(field, FilterOperator::IsNull)),
                "NOT NULL" => Ok(Self::unary(field, FilterOperator::IsNotNull)),
                _ => Err(Error::BadOperator {
                    op: format!("IS::{}", value),
                }),
            },
            "=" => Ok(Self::single(field, FilterOperator::Eq, value)),
            "!=" => Ok(Self::single(field, FilterOperator::Neq, value)),
            ">" => Ok(Self::single(field, FilterOperator::Gt, value)),
            "<" => Ok(Self::single(field, FilterOperator::Lt, value)),
            "IN" => Ok(Self {
                field: field.to_string(),
                operator: FilterOperator::In,
                values: split_values(value),
            }),
            "LIKE" => Ok(Self::single(field, FilterOperator::Like, value)),
            other => Err(Error::BadOperator {
                op: other.to_string(),
            }),
        }
    }

    /// 타입 기반 암묵적 연산자 선택
    ///
    /// `identifier` 플래그는 스키마 로드 시점에 계산된 값을 사용하며
    /// 여기서 필드 이름을 다시 검사하지 않습니다.
    fn implicit(field: &str, spec: &FieldSpec, value: &str) -> Self {
        if spec.identifier || matches!(spec.field_type, FieldType::Enum { .. }) {
            return Self {
                field: field.to_string(),
                operator: FilterOperator::In,
                values: split_values(value),
            };
        }

        match spec.field_type {
            FieldType::Number | FieldType::Date => {
                let values = split_values(value);
                let operator = match values.len() {
                    1 => FilterOperator::Eq,
                    2 => FilterOperator::Between,
                    _ => FilterOperator::In,
                };
                Self {
                    field: field.to_string(),
                    operator,
                    values,
                }
            }
            FieldType::Boolean | FieldType::Buffer | FieldType::Enum { .. } => {
                Self::single(field, FilterOperator::Eq, value)
            }
            FieldType::String { .. } => Self {
                field: field.to_string(),
                operator: FilterOperator::Like,
                values: vec![format!("%{}%", value)],
            },
        }
    }

    fn unary(field: &str, operator: FilterOperator) -> Self {
        Self {
            field: field.to_string(),
            operator,
            values: Vec::new(),
        }
    }

    fn single(field: &str, operator: FilterOperator, value: &str) -> Self {
        Self {
            field: field.to_string(),
            operator,
            values: vec![value.to_string()],
        }
    }
}

/// HTML 엔티티 복원
///
/// `&amp;`는 마지막에 치환해 이중 디코드를 피합니다.
fn decode_entities(raw: &str) -> String {
    if !raw.contains('&') {
        return raw.to_string();
    }
    raw.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

/// 콤마 구분 다중 값 분리
fn split_values(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(|v| v.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn number_spec() -> FieldSpec {
        FieldSpec::new(FieldType::Number)
    }

    fn string_spec() -> FieldSpec {
        FieldSpec::new(FieldType::String { max_len: 250 })
    }

    #[test]
    fn test_explicit_operators() {
        let expr = FilterExpr::parse("age", &number_spec(), ">::30").unwrap();
        assert_eq!(expr.operator, FilterOperator::Gt);
        assert_eq!(expr.values, vec!["30"]);

        let expr = FilterExpr::parse("age", &number_spec(), "!=::30").unwrap();
        assert_eq!(expr.operator, FilterOperator::Neq);

        let expr = FilterExpr::parse("name", &string_spec(), "LIKE::kim%").unwrap();
        assert_eq!(expr.operator, FilterOperator::Like);
        assert_eq!(expr.values, vec!["kim%"]);

        let expr = FilterExpr::parse("age", &number_spec(), "IN::1, 2,3").unwrap();
        assert_eq!(expr.operator, FilterOperator::In);
        assert_eq!(expr.values, vec!["1", "2", "3"]);
    }

    #[test]
    fn test_html_entity_decode() {
        let expr = FilterExpr::parse("age", &number_spec(), "&lt;::5").unwrap();
        assert_eq!(expr.operator, FilterOperator::Lt);
        assert_eq!(expr.values, vec!["5"]);

        let expr = FilterExpr::parse("age", &number_spec(), "&gt;::5").unwrap();
        assert_eq!(expr.operator, FilterOperator::Gt);
    }

    #[test]
    fn test_null_literals() {
        let expr = FilterExpr::parse("age", &number_spec(), "NULL").unwrap();
        assert_eq!(expr.operator, FilterOperator::IsNull);
        assert!(expr.values.is_empty());

        let expr = FilterExpr::parse("age", &number_spec(), "NOT NULL").unwrap();
        assert_eq!(expr.operator, FilterOperator::IsNotNull);

        let expr = FilterExpr::parse("age", &number_spec(), "IS::NULL").unwrap();
        assert_eq!(expr.operator, FilterOperator::IsNull);
    }

    #[test]
    fn test_bad_operator() {
        let err = FilterExpr::parse("age", &number_spec(), "~::5").unwrap_err();
        assert_eq!(err.code(), "BAD_OPERATOR");

        let err = FilterExpr::parse("age", &number_spec(), "IS::MAYBE").unwrap_err();
        assert_eq!(err.code(), "BAD_OPERATOR");
    }

    #[test]
    fn test_implicit_number() {
        let expr = FilterExpr::parse("age", &number_spec(), "30").unwrap();
        assert_eq!(expr.operator, FilterOperator::Eq);
        assert_eq!(expr.values, vec!["30"]);

        let expr = FilterExpr::parse("age", &number_spec(), "30,40").unwrap();
        assert_eq!(expr.operator, FilterOperator::Between);
        assert_eq!(expr.values, vec!["30", "40"]);

        let expr = FilterExpr::parse("age", &number_spec(), "1,2,3").unwrap();
        assert_eq!(expr.operator, FilterOperator::In);
    }

    #[test]
    fn test_implicit_identifier() {
        let spec = FieldSpec::new(FieldType::Number).mark_identifier("branch_id");
        let expr = FilterExpr::parse("branch_id", &spec, "2").unwrap();
        assert_eq!(expr.operator, FilterOperator::In);
        assert_eq!(expr.values, vec!["2"]);
    }

    #[test]
    fn test_implicit_enum() {
        let spec = FieldSpec::new(FieldType::Enum {
            values: vec!["open".to_string(), "closed".to_string()],
        });
        let expr = FilterExpr::parse("status", &spec, "open,closed").unwrap();
        assert_eq!(expr.operator, FilterOperator::In);
        assert_eq!(expr.values, vec!["open", "closed"]);
    }

    #[test]
    fn test_implicit_string_like_wrap() {
        let expr = FilterExpr::parse("title", &string_spec(), "hello").unwrap();
        assert_eq!(expr.operator, FilterOperator::Like);
        assert_eq!(expr.values, vec!["%hello%"]);
    }

    #[test]
    fn test_implicit_boolean() {
        let spec = FieldSpec::new(FieldType::Boolean);
        let expr = FilterExpr::parse("active", &spec, "true").unwrap();
        assert_eq!(expr.operator, FilterOperator::Eq);
        assert_eq!(expr.values, vec!["true"]);
    }
}
