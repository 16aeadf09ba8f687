//! Backend Types
//!
//! 백엔드와 주고받는 값/행 타입

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};

use crate::routing::{RoutingError, RoutingResult};

// ============================================================================
// Value - 컬럼 값
// ============================================================================

/// 컬럼 값
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Null
    Null,
    /// Boolean
    Boolean(bool),
    /// Integer (i64)
    Integer(i64),
    /// Float (f64)
    Float(f64),
    /// String
    String(String),
    /// Timestamp (UTC)
    Timestamp(DateTime<Utc>),
}

impl Value {
    /// Null 여부
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Boolean으로 변환
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Integer로 변환
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Float로 변환
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// String으로 변환
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Timestamp로 변환
    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Value::Timestamp(ts) => Some(*ts),
            _ => None,
        }
    }

    /// 타입 이름
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "NULL",
            Value::Boolean(_) => "BOOLEAN",
            Value::Integer(_) => "INTEGER",
            Value::Float(_) => "FLOAT",
            Value::String(_) => "STRING",
            Value::Timestamp(_) => "TIMESTAMP",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::String(s) => write!(f, "'{}'", s),
            Value::Timestamp(ts) => write!(f, "{}", ts.to_rfc3339()),
        }
    }
}

// ============================================================================
// From 구현
// ============================================================================

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Integer(i as i64)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<u32> for Value {
    fn from(i: u32) -> Self {
        Value::Integer(i as i64)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(ts: DateTime<Utc>) -> Self {
        Value::Timestamp(ts)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        match opt {
            Some(v) => v.into(),
            None => Value::Null,
        }
    }
}

// ============================================================================
// Row - 행
// ============================================================================

/// 테이블 행 (컬럼 이름 → 값)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    columns: BTreeMap<String, Value>,
}

impl Row {
    /// 빈 행 생성
    pub fn new() -> Self {
        Self::default()
    }

    /// 컬럼 추가 (빌더)
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(column, value);
        self
    }

    /// 컬럼 설정
    pub fn set(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        self.columns.insert(column.into(), value.into());
    }

    /// 컬럼 값
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns.get(column)
    }

    /// 컬럼 존재 여부
    pub fn contains(&self, column: &str) -> bool {
        self.columns.contains_key(column)
    }

    /// 컬럼 이름 목록
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    /// 컬럼 수
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// 빈 행 여부
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// 필수 컬럼 조회
    fn require(&self, column: &str) -> RoutingResult<&Value> {
        self.get(column)
            .ok_or_else(|| RoutingError::type_conversion(format!("Missing column: {}", column)))
    }

    /// Integer 컬럼
    pub fn get_int(&self, column: &str) -> RoutingResult<i64> {
        let value = self.require(column)?;
        value.as_int().ok_or_else(|| mismatch(column, "INTEGER", value))
    }

    /// String 컬럼
    pub fn get_str(&self, column: &str) -> RoutingResult<&str> {
        let value = self.require(column)?;
        value.as_str().ok_or_else(|| mismatch(column, "STRING", value))
    }

    /// Timestamp 컬럼 (Null 허용)
    pub fn get_timestamp(&self, column: &str) -> RoutingResult<Option<DateTime<Utc>>> {
        match self.require(column)? {
            Value::Null => Ok(None),
            value => value
                .as_timestamp()
                .map(Some)
                .ok_or_else(|| mismatch(column, "TIMESTAMP", value)),
        }
    }
}

fn mismatch(column: &str, expected: &str, actual: &Value) -> RoutingError {
    RoutingError::type_conversion(format!(
        "Column {} expected {}, got {}",
        column,
        expected,
        actual.type_name()
    ))
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Row {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut row = Row::new();
        for (k, v) in iter {
            row.set(k, v);
        }
        row
    }
}
