//! 페이지네이션
//!
//! 정렬 필드/방향과 LIMIT/OFFSET을 표현합니다. 정렬 필드가 선언되지
//! 않은 이름이면 `created_at`, 그것도 없으면 `id`로 대체됩니다.

use serde::{Deserialize, Serialize};

use mgn_core::schema::EntitySchema;

/// 기본 페이지 크기
pub const DEFAULT_PAGE_SIZE: u64 = 20;

/// 정렬 순서
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

/// 페이지네이션 파라미터
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pagination {
    /// 정렬 필드 (미지정 시 created_at 폴백)
    #[serde(default)]
    pub order_field: Option<String>,

    /// 정렬 방향
    #[serde(default)]
    pub direction: SortOrder,

    /// 페이지 크기
    #[serde(default = "default_limit")]
    pub limit: u64,

    /// 시작 오프셋
    #[serde(default)]
    pub offset: u64,
}

fn default_limit() -> u64 {
    DEFAULT_PAGE_SIZE
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            order_field: None,
            direction: SortOrder::Desc,
            limit: DEFAULT_PAGE_SIZE,
            offset: 0,
        }
    }
}

impl Pagination {
    /// 1부터 시작하는 페이지 번호로 생성
    ///
    /// 페이지 1이 오프셋 0입니다. 0은 1로 취급합니다.
    pub fn from_page(page: u64, per_page: u64) -> Self {
        let page = page.max(1);
        Self {
            limit: per_page,
            offset: (page - 1) * per_page,
            ..Default::default()
        }
    }

    /// 정렬 필드 지정
    pub fn order_by(mut self, field: impl Into<String>, direction: SortOrder) -> Self {
        self.order_field = Some(field.into());
        self.direction = direction;
        self
    }

    /// 스키마 기준 실제 정렬 필드 결정
    pub fn resolve_order_field<'a>(&'a self, schema: &'a EntitySchema) -> &'a str {
        if let Some(field) = self.order_field.as_deref() {
            if schema.has_field(field) {
                return field;
            }
        }
        if schema.has_field("created_at") {
            return "created_at";
        }
        "id"
    }
}
