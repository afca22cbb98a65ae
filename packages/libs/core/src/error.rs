//! 공통 에러 타입
//!
//! Mungan 전체에서 사용되는 에러 타입을 정의합니다.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Mungan 공통 에러
#[derive(Debug, Error)]
pub enum Error {
    // ─────────────────────────────────────────────────────────────────────────────
    // Schema Errors
    // ─────────────────────────────────────────────────────────────────────────────
    #[error("schema parse error: {message}")]
    SchemaParse { message: String },

    #[error("unknown entity: {entity}")]
    UnknownEntity { entity: String },

    #[error("unknown field: entity '{entity}' has no field '{field}'")]
    UnknownField { entity: String, field: String },

    #[error("duplicate entity name: {name}")]
    DuplicateEntity { name: String },

    #[error("invalid field type: {type_name}")]
    InvalidFieldType { type_name: String },

    #[error("invalid access rule: {rule}")]
    InvalidAccessRule { rule: String },

    #[error("invalid parent: entity '{entity}' declares non-existent parent '{parent}'")]
    InvalidParent { entity: String, parent: String },

    #[error("parent cycle detected at entity '{entity}'")]
    ParentCycle { entity: String },

    // ─────────────────────────────────────────────────────────────────────────────
    // Validation Errors
    // ─────────────────────────────────────────────────────────────────────────────
    #[error("bad filter operator: {op}")]
    BadOperator { op: String },

    #[error("type mismatch for field '{field}': expected {expected}, got '{value}'")]
    TypeMismatch {
        field: String,
        expected: String,
        value: String,
    },

    #[error("value too long for field '{field}': max {max} characters")]
    ValueTooLong { field: String, max: u32 },

    #[error("empty or oversized batch: {actual} rows (max {max})")]
    EmptyOrOversizedBatch { max: usize, actual: usize },

    #[error("write statement requires at least one filter condition")]
    MissingWriteFilter,

    // ─────────────────────────────────────────────────────────────────────────────
    // Permission Errors
    // ─────────────────────────────────────────────────────────────────────────────
    #[error("permission denied: {reason}")]
    PermissionDenied { reason: String },

    // ─────────────────────────────────────────────────────────────────────────────
    // Resolver Errors
    // ─────────────────────────────────────────────────────────────────────────────
    #[error("resolver error: {message}")]
    Resolver { message: String },

    #[error("evaluation cancelled")]
    Cancelled,

    // ─────────────────────────────────────────────────────────────────────────────
    // IO/Serialization Errors
    // ─────────────────────────────────────────────────────────────────────────────
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// HTTP 상태 코드로 변환
    pub fn status_code(&self) -> u16 {
        match self {
            // 400 Bad Request
            Error::SchemaParse { .. }
            | Error::UnknownEntity { .. }
            | Error::UnknownField { .. }
            | Error::InvalidFieldType { .. }
            | Error::InvalidAccessRule { .. }
            | Error::BadOperator { .. }
            | Error::TypeMismatch { .. }
            | Error::ValueTooLong { .. }
            | Error::EmptyOrOversizedBatch { .. }
            | Error::MissingWriteFilter
            | Error::Yaml(_)
            | Error::Json(_) => 400,

            // 403 Forbidden
            Error::PermissionDenied { .. } => 403,

            // 499 Client Closed Request
            Error::Cancelled => 499,

            // 500 Internal Server Error
            _ => 500,
        }
    }

    /// 에러 코드 (클라이언트용)
    pub fn code(&self) -> &'static str {
        match self {
            Error::SchemaParse { .. } => "SCHEMA_PARSE_ERROR",
            Error::UnknownEntity { .. } => "UNKNOWN_ENTITY",
            Error::UnknownField { .. } => "UNKNOWN_FIELD",
            Error::DuplicateEntity { .. } => "DUPLICATE_ENTITY",
            Error::InvalidFieldType { .. } => "INVALID_FIELD_TYPE",
            Error::InvalidAccessRule { .. } => "INVALID_ACCESS_RULE",
            Error::InvalidParent { .. } => "INVALID_PARENT",
            Error::ParentCycle { .. } => "PARENT_CYCLE",
            Error::BadOperator { .. } => "BAD_OPERATOR",
            Error::TypeMismatch { .. } => "TYPE_MISMATCH",
            Error::ValueTooLong { .. } => "VALUE_TOO_LONG",
            Error::EmptyOrOversizedBatch { .. } => "EMPTY_OR_OVERSIZED_BATCH",
            Error::MissingWriteFilter => "MISSING_WRITE_FILTER",
            Error::PermissionDenied { .. } => "PERMISSION_DENIED",
            Error::Resolver { .. } => "RESOLVER_ERROR",
            Error::Cancelled => "CANCELLED",
            Error::Yaml(_) => "YAML_ERROR",
            Error::Json(_) => "JSON_ERROR",
        }
    }
}
