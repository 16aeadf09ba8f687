//! 복제 토큰
//!
//! Primary가 쓰기 트랜잭션마다 발급하는 복제 위치 식별자 (GTID 형태)

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::error::{RoutingError, RoutingResult};

/// 복제 토큰
///
/// `"<source_id>:<sequence>"` 형식으로 표시됩니다.
/// 같은 source 안에서는 `sequence` 순서로 정렬됩니다.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ReplicationToken {
    source_id: String,
    sequence: u64,
}

impl ReplicationToken {
    /// 새 토큰 생성
    pub fn new(source_id: impl Into<String>, sequence: u64) -> Self {
        Self {
            source_id: source_id.into(),
            sequence,
        }
    }

    /// 발급한 서버 식별자
    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    /// 트랜잭션 순번
    pub fn sequence(&self) -> u64 {
        self.sequence
    }
}

impl fmt::Display for ReplicationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.source_id, self.sequence)
    }
}

impl FromStr for ReplicationToken {
    type Err = RoutingError;

    fn from_str(s: &str) -> RoutingResult<Self> {
        let (source_id, sequence) = s
            .rsplit_once(':')
            .ok_or_else(|| RoutingError::validation(format!("Malformed replication token: {}", s)))?;

        if source_id.is_empty() {
            return Err(RoutingError::validation(format!(
                "Replication token has no source id: {}",
                s
            )));
        }

        let sequence = sequence.parse().map_err(|_| {
            RoutingError::validation(format!("Replication token sequence is not a number: {}", s))
        })?;

        Ok(Self::new(source_id, sequence))
    }
}

impl Serialize for ReplicationToken {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ReplicationToken {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_display_and_parse() {
        let token = ReplicationToken::new("3e11fa47-71ca-11e1-9e33-c80aa9429562", 23);
        let text = token.to_string();
        assert_eq!(text, "3e11fa47-71ca-11e1-9e33-c80aa9429562:23");
        assert_eq!(text.parse::<ReplicationToken>().unwrap(), token);
    }

    #[test]
    fn test_token_parse_errors() {
        assert!("no-sequence".parse::<ReplicationToken>().is_err());
        assert!(":12".parse::<ReplicationToken>().is_err());
        assert!("source:abc".parse::<ReplicationToken>().is_err());
    }

    #[test]
    fn test_token_ordering() {
        let a = ReplicationToken::new("source", 2);
        let b = ReplicationToken::new("source", 10);
        assert!(a < b);
    }

    #[test]
    fn test_token_serde_as_string() {
        let token = ReplicationToken::new("source", 7);
        let json = serde_json::to_string(&token).unwrap();
        assert_eq!(json, "\"source:7\"");
        let back: ReplicationToken = serde_json::from_str(&json).unwrap();
        assert_eq!(back, token);
    }
}
