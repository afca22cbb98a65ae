//! mgn-sql: 동적 SQL 컴파일 라이브러리
//!
//! 스키마 선언을 기반으로 요청 필터를 검증하고 파라미터 바인딩 SQL로
//! 컴파일합니다. SeaQuery를 사용하여 SQL Injection을 원천 차단합니다.
//!
//! # 모듈 구조
//!
//! - `filter`: 필터 표현식 파싱 (연산자 추론 포함)
//! - `validate`: 필터/페이로드 타입 검증, 배치 한도
//! - `pagination`: 정렬/LIMIT/OFFSET 파라미터
//! - `compiler`: 조건 컴파일러 (SELECT/INSERT/UPDATE/DELETE)
//! - `store`: Postgres 저장소 어댑터 (GrantStore/RowStore 구현)

pub mod compiler;
pub mod filter;
pub mod pagination;
pub mod store;
pub mod validate;

pub use compiler::{ConditionCompiler, JoinKind, ParentJoin};
pub use filter::{FilterExpr, FilterOperator};
pub use pagination::{Pagination, SortOrder, DEFAULT_PAGE_SIZE};
pub use store::{PgGrantStore, PgRowStore};
pub use validate::MAX_BATCH_ROWS;
