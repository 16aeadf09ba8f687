//! 구문 모델
//!
//! 백엔드에 전달되는 타입 있는 구문과 그 결과

use super::value::{Row, Value};

// ============================================================================
// SelectStatement - 조회 구문
// ============================================================================

/// 정렬 방향 (`id` 기준)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    /// 오름차순
    #[default]
    Ascending,
    /// 내림차순
    Descending,
}

/// 조회 구문
#[derive(Debug, Clone, PartialEq)]
pub struct SelectStatement {
    /// 테이블
    pub table: String,
    /// 동등 조건 (AND)
    pub filters: Vec<(String, Value)>,
    /// 정렬
    pub order: SortOrder,
    /// 최대 행 수
    pub limit: Option<usize>,
}

impl SelectStatement {
    /// 새 조회 구문
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            filters: Vec::new(),
            order: SortOrder::default(),
            limit: None,
        }
    }

    /// 동등 조건 추가
    pub fn where_eq(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push((column.into(), value.into()));
        self
    }

    /// 내림차순 정렬
    pub fn newest_first(mut self) -> Self {
        self.order = SortOrder::Descending;
        self
    }

    /// 최대 행 수
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// 행이 조건에 맞는지
    pub fn matches(&self, row: &Row) -> bool {
        self.filters
            .iter()
            .all(|(column, value)| row.get(column) == Some(value))
    }
}

// ============================================================================
// Statement - 구문
// ============================================================================

/// 구문
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// 삽입 (`id`는 백엔드가 부여)
    Insert { table: String, row: Row },
    /// 조회
    Select(SelectStatement),
    /// 개수 조회
    Count(SelectStatement),
}

impl Statement {
    /// 삽입 구문
    pub fn insert(table: impl Into<String>, row: Row) -> Self {
        Self::Insert {
            table: table.into(),
            row,
        }
    }
}

impl From<SelectStatement> for Statement {
    fn from(select: SelectStatement) -> Self {
        Self::Select(select)
    }
}

// ============================================================================
// StatementResult - 구문 결과
// ============================================================================

/// 구문 결과
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatementResult {
    /// 조회된 행
    pub rows: Vec<Row>,
    /// 마지막으로 부여된 `id`
    pub last_insert_id: Option<i64>,
    /// `Count` 결과
    pub count: Option<u64>,
}

impl StatementResult {
    /// 삽입 결과
    pub fn inserted(id: i64) -> Self {
        Self {
            last_insert_id: Some(id),
            ..Default::default()
        }
    }

    /// 조회 결과
    pub fn rows(rows: Vec<Row>) -> Self {
        Self {
            rows,
            ..Default::default()
        }
    }

    /// 개수 결과
    pub fn counted(count: u64) -> Self {
        Self {
            count: Some(count),
            ..Default::default()
        }
    }
}
