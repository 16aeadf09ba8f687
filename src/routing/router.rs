//! 라우터
//!
//! 작업 단위의 선언된 의도로 Primary / Replica를 결정합니다.
//! 구문(SQL) 내용은 보지 않습니다.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::endpoint::Endpoint;
use super::intent::UnitOfWorkIntent;

// ============================================================================
// RoutingDecision - 라우팅 결정
// ============================================================================

/// 라우팅 결정
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoutingDecision {
    /// 선택된 엔드포인트
    pub endpoint: Endpoint,
    /// 결정 시점의 의도 (없으면 None)
    pub intent: Option<UnitOfWorkIntent>,
}

impl RoutingDecision {
    /// 의도가 없어 기본값(Primary)이 적용되었는지
    pub fn is_defaulted(&self) -> bool {
        self.intent.is_none()
    }

    /// 읽기 전용 의도 여부
    pub fn is_read_only(&self) -> bool {
        self.intent.is_some_and(|intent| intent.is_read_only())
    }
}

// ============================================================================
// RoutingObserver - 관측 훅
// ============================================================================

/// 라우팅 결정 관측자
///
/// 결정이 내려진 뒤에 호출되며 결정 자체에는 영향을 주지 않습니다.
pub trait RoutingObserver: Send + Sync {
    /// 결정 통지
    fn on_decision(&self, decision: &RoutingDecision);
}

/// `tracing`으로 결정을 기록하는 기본 관측자
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl RoutingObserver for TracingObserver {
    fn on_decision(&self, decision: &RoutingDecision) {
        match decision.intent {
            Some(intent) => tracing::debug!(
                endpoint = %decision.endpoint,
                read_only = intent.is_read_only(),
                "[Router] readOnly={} -> {}",
                intent.is_read_only(),
                decision.endpoint.display_name()
            ),
            None => tracing::debug!(
                endpoint = %decision.endpoint,
                "[Router] no unit-of-work intent -> {} (default)",
                decision.endpoint.display_name()
            ),
        }
    }
}

// ============================================================================
// RoutingStats - 라우팅 통계
// ============================================================================

/// 라우팅 통계 스냅샷
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RoutingStats {
    /// Primary로 결정된 횟수
    pub primary: u64,
    /// Replica로 결정된 횟수
    pub replica: u64,
    /// 의도 없이 기본값이 적용된 횟수
    pub defaulted: u64,
}

impl RoutingStats {
    /// 총 결정 횟수
    pub fn total(&self) -> u64 {
        self.primary + self.replica
    }
}

// ============================================================================
// Router - 라우터
// ============================================================================

/// 의도 기반 라우터
pub struct Router {
    /// 관측자 목록
    observers: Vec<Arc<dyn RoutingObserver>>,
    primary: AtomicU64,
    replica: AtomicU64,
    defaulted: AtomicU64,
}

impl Router {
    /// 기본 관측자(`TracingObserver`)를 가진 라우터
    pub fn new() -> Self {
        Self::with_observers(vec![Arc::new(TracingObserver)])
    }

    /// 관측자를 지정한 라우터
    pub fn with_observers(observers: Vec<Arc<dyn RoutingObserver>>) -> Self {
        Self {
            observers,
            primary: AtomicU64::new(0),
            replica: AtomicU64::new(0),
            defaulted: AtomicU64::new(0),
        }
    }

    /// 관측자 추가
    pub fn add_observer(&mut self, observer: Arc<dyn RoutingObserver>) {
        self.observers.push(observer);
    }

    /// 의도에 해당하는 엔드포인트 (통계/관측 없음)
    ///
    /// - `ReadOnly` → Replica
    /// - `ReadWrite` 또는 의도 없음 → Primary
    pub fn endpoint_for(intent: Option<UnitOfWorkIntent>) -> Endpoint {
        match intent {
            Some(UnitOfWorkIntent::ReadOnly) => Endpoint::Replica,
            Some(UnitOfWorkIntent::ReadWrite) | None => Endpoint::Primary,
        }
    }

    /// 엔드포인트 결정 후 통계와 관측자에 반영
    pub fn resolve(&self, intent: Option<UnitOfWorkIntent>) -> RoutingDecision {
        let decision = RoutingDecision {
            endpoint: Self::endpoint_for(intent),
            intent,
        };

        match decision.endpoint {
            Endpoint::Primary => self.primary.fetch_add(1, Ordering::Relaxed),
            Endpoint::Replica => self.replica.fetch_add(1, Ordering::Relaxed),
        };
        if decision.is_defaulted() {
            self.defaulted.fetch_add(1, Ordering::Relaxed);
        }

        for observer in &self.observers {
            observer.on_decision(&decision);
        }

        decision
    }

    /// 통계 조회
    pub fn stats(&self) -> RoutingStats {
        RoutingStats {
            primary: self.primary.load(Ordering::Relaxed),
            replica: self.replica.load(Ordering::Relaxed),
            defaulted: self.defaulted.load(Ordering::Relaxed),
        }
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("observers", &self.observers.len())
            .field("stats", &self.stats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;

    use super::*;

    #[derive(Default)]
    struct RecordingObserver {
        decisions: Mutex<Vec<RoutingDecision>>,
    }

    impl RoutingObserver for RecordingObserver {
        fn on_decision(&self, decision: &RoutingDecision) {
            self.decisions.lock().push(*decision);
        }
    }

    #[test]
    fn test_read_only_routes_to_replica() {
        let router = Router::new();
        let decision = router.resolve(Some(UnitOfWorkIntent::ReadOnly));
        assert_eq!(decision.endpoint, Endpoint::Replica);
        assert!(decision.is_read_only());
        assert!(!decision.is_defaulted());
    }

    #[test]
    fn test_read_write_routes_to_primary() {
        let router = Router::new();
        let decision = router.resolve(Some(UnitOfWorkIntent::ReadWrite));
        assert_eq!(decision.endpoint, Endpoint::Primary);
        assert!(!decision.is_defaulted());
    }

    #[test]
    fn test_absent_intent_defaults_to_primary() {
        let router = Router::new();
        let decision = router.resolve(None);
        assert_eq!(decision.endpoint, Endpoint::Primary);
        assert!(decision.is_defaulted());
    }

    #[test]
    fn test_endpoint_for_leaves_stats_untouched() {
        let router = Router::new();
        assert_eq!(Router::endpoint_for(Some(UnitOfWorkIntent::ReadOnly)), Endpoint::Replica);
        assert_eq!(Router::endpoint_for(None), Endpoint::Primary);
        assert_eq!(router.stats().total(), 0);
    }

    #[test]
    fn test_observers_see_every_decision() {
        let recorder = Arc::new(RecordingObserver::default());
        let router = Router::with_observers(vec![recorder.clone()]);

        router.resolve(Some(UnitOfWorkIntent::ReadOnly));
        router.resolve(None);

        let decisions = recorder.decisions.lock();
        assert_eq!(decisions.len(), 2);
        assert_eq!(decisions[0].endpoint, Endpoint::Replica);
        assert!(decisions[1].is_defaulted());
    }

    #[test]
    fn test_stats() {
        let router = Router::with_observers(Vec::new());
        router.resolve(Some(UnitOfWorkIntent::ReadOnly));
        router.resolve(Some(UnitOfWorkIntent::ReadOnly));
        router.resolve(Some(UnitOfWorkIntent::ReadWrite));
        router.resolve(None);

        let stats = router.stats();
        assert_eq!(stats.replica, 2);
        assert_eq!(stats.primary, 2);
        assert_eq!(stats.defaulted, 1);
        assert_eq!(stats.total(), 4);
    }
}
