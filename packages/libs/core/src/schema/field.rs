//! 필드 타입 정의
//!
//! 엔티티 필드의 논리적 타입을 정의합니다.
//! 값 검증기(Value Validator)가 이 타입 정보를 기준으로 입력을 검사합니다.

use serde::{Deserialize, Serialize};

/// 문자열 필드 기본 최대 길이
pub const DEFAULT_STRING_MAX_LEN: u32 = 250;

/// 필드의 논리적 타입
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FieldType {
    /// 정수/실수
    Number,

    /// 날짜/시각 (RFC3339 또는 `YYYY-MM-DD`)
    Date,

    /// 불리언
    Boolean,

    /// 바이너리 (업로드 페이로드 등)
    Buffer,

    /// 고정 값 목록
    Enum { values: Vec<String> },

    /// 가변 길이 문자열
    String {
        #[serde(default = "default_string_max_len")]
        max_len: u32,
    },
}

fn default_string_max_len() -> u32 {
    DEFAULT_STRING_MAX_LEN
}

impl FieldType {
    /// 단순 문자열 표기에서 타입 생성
    ///
    /// `enum`은 값 목록이 필요하므로 단순 표기로는 생성할 수 없습니다.
    pub fn from_simple_str(s: &str) -> Option<Self> {
        match s {
            "number" => Some(FieldType::Number),
            "date" => Some(FieldType::Date),
            "boolean" => Some(FieldType::Boolean),
            "buffer" => Some(FieldType::Buffer),
            "string" => Some(FieldType::String {
                max_len: DEFAULT_STRING_MAX_LEN,
            }),
            _ => None,
        }
    }

    /// 타입 이름 (에러 메시지용)
    pub fn type_name(&self) -> &'static str {
        match self {
            FieldType::Number => "number",
            FieldType::Date => "date",
            FieldType::Boolean => "boolean",
            FieldType::Buffer => "buffer",
            FieldType::Enum { .. } => "enum",
            FieldType::String { .. } => "string",
        }
    }
}

/// 필드 스펙
///
/// `identifier`는 스키마 로드 시점에 한 번 계산됩니다.
/// 평가/컴파일 단계에서는 필드 이름 휴리스틱을 다시 적용하지 않습니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    #[serde(flatten)]
    pub field_type: FieldType,

    /// 쓰기 페이로드로 절대 설정할 수 없는 필드
    #[serde(default)]
    pub immutable: bool,

    /// 식별자 성격 필드 (id, *_id, created_by)
    #[serde(default)]
    pub identifier: bool,
}

impl FieldSpec {
    pub fn new(field_type: FieldType) -> Self {
        Self {
            field_type,
            immutable: false,
            identifier: false,
        }
    }

    pub fn immutable(mut self) -> Self {
        self.immutable = true;
        self
    }

    /// 필드 이름으로 식별자 여부 판정
    ///
    /// 로드 시점 한 번만 호출됩니다.
    pub fn mark_identifier(mut self, name: &str) -> Self {
        self.identifier = name == "id" || name.ends_with("_id") || name == "created_by";
        self
    }
}
