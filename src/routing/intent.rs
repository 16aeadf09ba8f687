//! 작업 단위 의도 (Intent Context)
//!
//! 작업 단위가 읽기 전용인지 읽기/쓰기인지를 기록합니다.
//! 의도는 작업 단위마다 독립된 핸들에 저장되며, 프로세스 전역 상태를 쓰지 않습니다.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

// ============================================================================
// UnitOfWorkIntent - 작업 단위 의도
// ============================================================================

/// 작업 단위의 읽기/쓰기 의도
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnitOfWorkIntent {
    /// 읽기 전용 (Replica로 라우팅)
    ReadOnly,
    /// 읽기/쓰기 (Primary로 라우팅)
    ReadWrite,
}

impl UnitOfWorkIntent {
    /// bool 플래그에서 생성
    pub fn from_read_only(read_only: bool) -> Self {
        if read_only {
            Self::ReadOnly
        } else {
            Self::ReadWrite
        }
    }

    /// 읽기 전용 여부
    pub fn is_read_only(&self) -> bool {
        matches!(self, Self::ReadOnly)
    }
}

impl fmt::Display for UnitOfWorkIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadOnly => f.write_str("read-only"),
            Self::ReadWrite => f.write_str("read-write"),
        }
    }
}

// ============================================================================
// IntentContext - 의도 컨텍스트
// ============================================================================

/// 작업 단위 범위의 의도 핸들
///
/// 복제본(`clone`)은 같은 작업 단위 안에서만 공유됩니다 (작업 단위와 그 지연 바인딩).
/// 새 작업 단위는 항상 [`IntentContext::new`]로 별도 컨텍스트를 만듭니다.
#[derive(Clone, Default)]
pub struct IntentContext {
    intent: Arc<RwLock<Option<UnitOfWorkIntent>>>,
}

impl IntentContext {
    /// 의도가 없는 컨텍스트
    pub fn new() -> Self {
        Self::default()
    }

    /// 의도를 선언한 컨텍스트
    pub fn with_intent(intent: UnitOfWorkIntent) -> Self {
        Self {
            intent: Arc::new(RwLock::new(Some(intent))),
        }
    }

    /// 의도 선언 (덮어쓰기)
    pub fn declare(&self, intent: UnitOfWorkIntent) {
        *self.intent.write() = Some(intent);
    }

    /// 의도 제거 (작업 단위 종료 시)
    pub fn clear(&self) {
        *self.intent.write() = None;
    }

    /// 현재 의도
    pub fn current(&self) -> Option<UnitOfWorkIntent> {
        *self.intent.read()
    }

    /// 읽기 전용으로 선언되었는지
    pub fn is_read_only(&self) -> bool {
        self.current().is_some_and(|intent| intent.is_read_only())
    }
}

impl fmt::Debug for IntentContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IntentContext")
            .field("intent", &self.current())
            .finish()
    }
}
