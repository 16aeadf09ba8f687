//! 엔드포인트
//!
//! 두 개의 독립된 데이터베이스 대상 (Primary / Replica)

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::{RoutingError, RoutingResult};

/// 데이터베이스 엔드포인트
///
/// 설정 이후 변하지 않는 안정적인 키(`"source"`, `"replica"`)로 식별됩니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Endpoint {
    /// 쓰기 대상 (source)
    #[serde(rename = "source")]
    Primary,
    /// 읽기 대상 (replica)
    Replica,
}

impl Endpoint {
    /// Primary 키
    pub const PRIMARY_KEY: &'static str = "source";
    /// Replica 키
    pub const REPLICA_KEY: &'static str = "replica";

    /// 모든 엔드포인트
    pub const ALL: [Endpoint; 2] = [Endpoint::Primary, Endpoint::Replica];

    /// 안정적인 식별 키
    pub fn key(&self) -> &'static str {
        match self {
            Self::Primary => Self::PRIMARY_KEY,
            Self::Replica => Self::REPLICA_KEY,
        }
    }

    /// 진단용 표시 이름
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Primary => "SOURCE DB",
            Self::Replica => "REPLICA DB",
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for Endpoint {
    type Err = RoutingError;

    fn from_str(s: &str) -> RoutingResult<Self> {
        match s.to_ascii_lowercase().as_str() {
            "source" | "primary" => Ok(Self::Primary),
            "replica" => Ok(Self::Replica),
            other => Err(RoutingError::configuration(format!(
                "unknown endpoint key: {}",
                other
            ))),
        }
    }
}
