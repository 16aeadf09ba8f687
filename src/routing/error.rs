//! Routing Error Types
//!
//! 라우팅/복제 추적 에러 정의

use thiserror::Error;

use super::endpoint::Endpoint;

// ============================================================================
// RoutingError - 라우팅 에러
// ============================================================================

/// 라우팅 에러
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RoutingError {
    /// 엔드포인트 연결 불가 또는 풀 고갈
    #[error("Connectivity failure on {endpoint}: {message}")]
    Connectivity { endpoint: Endpoint, message: String },

    /// 쓰기 실패 (작업 단위 전체 롤백 대상)
    #[error("Write failure on {target}: {message}")]
    Write { target: String, message: String },

    /// 작업 단위 상태 에러
    #[error("Unit of work error: {0}")]
    UnitOfWork(String),

    /// 구문 실행 에러
    #[error("Statement error: {0}")]
    Statement(String),

    /// 설정 에러
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// 입력값 검증 에러
    #[error("Validation error: {0}")]
    Validation(String),

    /// 타입 변환 에러
    #[error("Type conversion error: {0}")]
    TypeConversion(String),

    /// 내부 에러
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RoutingError {
    /// 연결 에러 생성
    pub fn connectivity(endpoint: Endpoint, msg: impl Into<String>) -> Self {
        Self::Connectivity {
            endpoint,
            message: msg.into(),
        }
    }

    /// 쓰기 에러 생성
    pub fn write(target: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Write {
            target: target.into(),
            message: msg.into(),
        }
    }

    /// 작업 단위 에러 생성
    pub fn unit_of_work(msg: impl Into<String>) -> Self {
        Self::UnitOfWork(msg.into())
    }

    /// 구문 에러 생성
    pub fn statement(msg: impl Into<String>) -> Self {
        Self::Statement(msg.into())
    }

    /// 설정 에러 생성
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// 검증 에러 생성
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// 타입 변환 에러 생성
    pub fn type_conversion(msg: impl Into<String>) -> Self {
        Self::TypeConversion(msg.into())
    }

    /// 내부 에러 생성
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// 연결 실패 여부
    pub fn is_connectivity_failure(&self) -> bool {
        matches!(self, Self::Connectivity { .. })
    }

    /// 실패한 엔드포인트
    pub fn endpoint(&self) -> Option<Endpoint> {
        match self {
            Self::Connectivity { endpoint, .. } => Some(*endpoint),
            _ => None,
        }
    }

    /// 재시도 가능 여부
    ///
    /// 재시도는 호출자의 몫이다. 같은 엔드포인트로만 재시도해야 하며
    /// 다른 엔드포인트로 우회하지 않는다.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connectivity { .. })
    }

    /// 클라이언트 에러 여부
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Configuration(_) | Self::Validation(_) | Self::TypeConversion(_)
        )
    }
}

// ============================================================================
// Result Type
// ============================================================================

/// 라우팅 결과 타입
pub type RoutingResult<T> = Result<T, RoutingError>;

// ============================================================================
// Tests
// ============================================================================
