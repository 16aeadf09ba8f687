//! Unit of Work
//!
//! 선언된 의도와 지연 바인딩 연결을 가진 논리적 트랜잭션.
//! 커밋/롤백은 함께 이루어지며, 부분 커밋은 없습니다.

use std::fmt;
use std::sync::Arc;

use super::deferred::{DeferredConnection, Resolver};
use super::endpoint::Endpoint;
use super::error::{RoutingError, RoutingResult};
use super::intent::{IntentContext, UnitOfWorkIntent};
use super::pool::EndpointPool;
use super::router::{Router, RoutingDecision};
use super::token::ReplicationToken;
use crate::backend::{Statement, StatementResult};

// ============================================================================
// UnitOfWorkState - 상태
// ============================================================================

/// 유닛 오브 워크 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitOfWorkState {
    /// 활성 상태
    Active,
    /// 커밋됨
    Committed,
    /// 롤백됨
    RolledBack,
    /// 실패 (커밋 불가, 롤백만 가능)
    Failed,
}

impl UnitOfWorkState {
    /// 완료 상태 여부
    pub fn is_terminated(&self) -> bool {
        matches!(self, Self::Committed | Self::RolledBack)
    }
}

// ============================================================================
// UnitOfWork
// ============================================================================

/// 유닛 오브 워크
///
/// 의도는 이 유닛 오브 워크에만 속하며, 첫 연산이 실행되는 순간 라우터가 읽습니다.
/// drop될 때 커밋되지 않은 변경은 버려집니다.
pub struct UnitOfWork {
    id: u64,
    intent: IntentContext,
    connection: DeferredConnection,
    state: UnitOfWorkState,
    replication_recorded: bool,
}

impl UnitOfWork {
    pub(crate) fn new(id: u64, intent: IntentContext, pools: Arc<EndpointPool>, router: Arc<Router>) -> Self {
        let context = intent.clone();
        let resolver: Resolver = Box::new(move || router.resolve(context.current()));

        Self {
            id,
            intent,
            connection: DeferredConnection::new(pools, resolver),
            state: UnitOfWorkState::Active,
            replication_recorded: false,
        }
    }

    /// ID
    pub fn id(&self) -> u64 {
        self.id
    }

    /// 상태
    pub fn state(&self) -> UnitOfWorkState {
        self.state
    }

    /// 현재 의도
    pub fn intent(&self) -> Option<UnitOfWorkIntent> {
        self.intent.current()
    }

    /// 의도 선언
    ///
    /// 연결이 바인딩된 뒤의 선언은 기록되지만 바인딩된 엔드포인트를 바꾸지 않습니다.
    pub fn declare(&self, intent: UnitOfWorkIntent) {
        if let Some(decision) = self.connection.decision() {
            tracing::debug!(
                unit_of_work = self.id,
                bound = %decision.endpoint,
                declared = %intent,
                "intent declared after binding; endpoint unchanged"
            );
        }
        self.intent.declare(intent);
    }

    /// 연결이 바인딩되었는지
    pub fn is_bound(&self) -> bool {
        self.connection.is_bound()
    }

    /// 바인딩된 엔드포인트
    pub fn endpoint(&self) -> Option<Endpoint> {
        self.connection.endpoint()
    }

    /// 고정된 라우팅 결정
    pub fn decision(&self) -> Option<RoutingDecision> {
        self.connection.decision()
    }

    /// 연산이 향하는 엔드포인트
    ///
    /// 결정이 고정되었으면 그 엔드포인트, 아니면 현재 의도로 결정될 엔드포인트.
    /// 연결을 획득하지 않으며 라우팅 통계에도 남지 않습니다.
    pub fn target_endpoint(&self) -> Endpoint {
        match self.connection.decision() {
            Some(decision) => decision.endpoint,
            None => Router::endpoint_for(self.intent.current()),
        }
    }

    /// 이 유닛 오브 워크에서 복제 로그 항목이 이미 기록되었는지
    pub fn has_replication_record(&self) -> bool {
        self.replication_recorded
    }

    pub(crate) fn mark_replication_recorded(&mut self) {
        self.replication_recorded = true;
    }

    /// 구문 실행
    ///
    /// 실패하면 유닛 오브 워크는 `Failed`가 되고 커밋할 수 없습니다.
    pub async fn execute(&mut self, statement: Statement) -> RoutingResult<StatementResult> {
        self.ensure_active()?;

        let result = match self.connection.get().await {
            Ok(conn) => conn.execute(statement).await,
            Err(e) => Err(e),
        };
        if let Err(e) = &result {
            tracing::debug!(unit_of_work = self.id, error = %e, "statement failed");
            self.state = UnitOfWorkState::Failed;
        }
        result
    }

    /// 이 유닛 오브 워크가 커밋될 복제 위치
    pub async fn replication_position(&mut self) -> RoutingResult<ReplicationToken> {
        self.ensure_active()?;

        let result = match self.connection.get().await {
            Ok(conn) => conn.replication_position().await,
            Err(e) => Err(e),
        };
        if result.is_err() {
            self.state = UnitOfWorkState::Failed;
        }
        result
    }

    /// 커밋
    ///
    /// 실패한 유닛 오브 워크는 롤백된 뒤 에러를 반환합니다.
    pub async fn commit(mut self) -> RoutingResult<()> {
        match self.state {
            UnitOfWorkState::Active => {}
            UnitOfWorkState::Failed => {
                self.finish_rollback().await?;
                return Err(RoutingError::unit_of_work(
                    "Unit of work failed and was rolled back",
                ));
            }
            _ => return Err(self.terminated_error()),
        }

        let result = self.connection.commit().await;
        self.intent.clear();

        match result {
            Ok(()) => {
                self.state = UnitOfWorkState::Committed;
                tracing::trace!(unit_of_work = self.id, "committed");
                Ok(())
            }
            Err(e) => {
                self.state = UnitOfWorkState::Failed;
                Err(e)
            }
        }
    }

    /// 롤백
    pub async fn rollback(mut self) -> RoutingResult<()> {
        if self.state.is_terminated() {
            return Ok(());
        }
        self.finish_rollback().await
    }

    /// 결과에 따라 완료: `Ok`면 커밋, `Err`면 롤백 후 원래 에러 반환
    pub async fn complete<T>(self, result: RoutingResult<T>) -> RoutingResult<T> {
        match result {
            Ok(value) => {
                self.commit().await?;
                Ok(value)
            }
            Err(e) => {
                let id = self.id;
                if let Err(rollback_error) = self.rollback().await {
                    tracing::warn!(unit_of_work = id, error = %rollback_error, "rollback failed");
                }
                Err(e)
            }
        }
    }

    async fn finish_rollback(&mut self) -> RoutingResult<()> {
        let result = self.connection.rollback().await;
        self.intent.clear();
        self.state = UnitOfWorkState::RolledBack;
        result
    }

    fn ensure_active(&self) -> RoutingResult<()> {
        match self.state {
            UnitOfWorkState::Active => Ok(()),
            UnitOfWorkState::Failed => Err(RoutingError::unit_of_work("Unit of work in failed state")),
            _ => Err(self.terminated_error()),
        }
    }

    fn terminated_error(&self) -> RoutingError {
        match self.state {
            UnitOfWorkState::Committed => RoutingError::unit_of_work("Unit of work already committed"),
            _ => RoutingError::unit_of_work("Unit of work already rolled back"),
        }
    }
}

impl fmt::Debug for UnitOfWork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnitOfWork")
            .field("id", &self.id)
            .field("intent", &self.intent.current())
            .field("state", &self.state)
            .field("endpoint", &self.endpoint())
            .finish()
    }
}

impl Drop for UnitOfWork {
    fn drop(&mut self) {
        if !self.state.is_terminated() {
            if self.connection.is_bound() {
                tracing::warn!(
                    unit_of_work = self.id,
                    "unit of work dropped without commit; changes discarded"
                );
            }
            self.intent.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::backend::memory::MemoryCluster;
    use crate::backend::{Row, SelectStatement};
    use crate::routing::config::RoutingConfig;

    fn setup() -> (MemoryCluster, Arc<EndpointPool>, Arc<Router>) {
        let cluster = MemoryCluster::start(Duration::ZERO).unwrap();
        let pools = Arc::new(EndpointPool::new(&RoutingConfig::default(), Arc::new(cluster.clone())));
        (cluster, pools, Arc::new(Router::new()))
    }

    fn insert_order() -> Statement {
        Statement::insert("orders", Row::new().with("user_id", 1i64))
    }

    #[tokio::test]
    async fn test_intent_read_at_first_use() {
        let (_cluster, pools, router) = setup();
        let mut uow = UnitOfWork::new(1, IntentContext::new(), pools, router);

        uow.declare(UnitOfWorkIntent::ReadOnly);
        uow.execute(SelectStatement::new("orders").into()).await.unwrap();

        assert_eq!(uow.endpoint(), Some(Endpoint::Replica));
        uow.commit().await.unwrap();
    }

    #[tokio::test]
    async fn test_binding_fixed_after_intent_change() {
        let (_cluster, pools, router) = setup();
        let mut uow = UnitOfWork::new(
            1,
            IntentContext::with_intent(UnitOfWorkIntent::ReadWrite),
            pools,
            router.clone(),
        );

        uow.execute(insert_order()).await.unwrap();
        uow.declare(UnitOfWorkIntent::ReadOnly);
        uow.execute(SelectStatement::new("orders").into()).await.unwrap();

        assert_eq!(uow.endpoint(), Some(Endpoint::Primary));
        assert_eq!(router.stats().total(), 1);
        uow.commit().await.unwrap();
    }

    #[tokio::test]
    async fn test_commit_and_rollback() {
        let (cluster, pools, router) = setup();

        let mut uow = UnitOfWork::new(1, IntentContext::new(), pools.clone(), router.clone());
        uow.execute(insert_order()).await.unwrap();
        uow.commit().await.unwrap();
        assert_eq!(cluster.row_count(Endpoint::Primary, "orders"), 1);

        let mut uow = UnitOfWork::new(2, IntentContext::new(), pools, router);
        uow.execute(insert_order()).await.unwrap();
        uow.rollback().await.unwrap();
        assert_eq!(cluster.row_count(Endpoint::Primary, "orders"), 1);
    }

    #[tokio::test]
    async fn test_failed_unit_of_work_cannot_commit() {
        let (cluster, pools, router) = setup();
        cluster.fail_writes_to("order_items");

        let mut uow = UnitOfWork::new(1, IntentContext::new(), pools, router);
        uow.execute(insert_order()).await.unwrap();
        let err = uow
            .execute(Statement::insert("order_items", Row::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, RoutingError::Write { .. }));
        assert_eq!(uow.state(), UnitOfWorkState::Failed);

        assert!(uow.execute(insert_order()).await.is_err());
        let err = uow.commit().await.unwrap_err();
        assert!(matches!(err, RoutingError::UnitOfWork(_)));
        assert_eq!(cluster.row_count(Endpoint::Primary, "orders"), 0);
    }

    #[tokio::test]
    async fn test_complete_follows_result() {
        let (cluster, pools, router) = setup();

        let mut uow = UnitOfWork::new(1, IntentContext::new(), pools.clone(), router.clone());
        let result = uow.execute(insert_order()).await.map(|r| r.last_insert_id);
        assert_eq!(uow.complete(result).await.unwrap(), Some(1));

        let mut uow = UnitOfWork::new(2, IntentContext::new(), pools, router);
        uow.execute(insert_order()).await.unwrap();
        let err = uow
            .complete::<()>(Err(RoutingError::validation("rejected")))
            .await
            .unwrap_err();
        assert_eq!(err, RoutingError::validation("rejected"));
        assert_eq!(cluster.row_count(Endpoint::Primary, "orders"), 1);
    }

    #[tokio::test]
    async fn test_intent_cleared_on_completion() {
        let (_cluster, pools, router) = setup();
        let context = IntentContext::with_intent(UnitOfWorkIntent::ReadOnly);

        let uow = UnitOfWork::new(1, context.clone(), pools, router);
        assert_eq!(context.current(), Some(UnitOfWorkIntent::ReadOnly));
        uow.commit().await.unwrap();
        assert_eq!(context.current(), None);
    }

    #[tokio::test]
    async fn test_target_endpoint_follows_intent_until_bound() {
        let (_cluster, pools, router) = setup();
        let mut uow = UnitOfWork::new(1, IntentContext::new(), pools, router.clone());

        assert_eq!(uow.target_endpoint(), Endpoint::Primary);
        uow.declare(UnitOfWorkIntent::ReadOnly);
        assert_eq!(uow.target_endpoint(), Endpoint::Replica);
        assert_eq!(router.stats().total(), 0);

        uow.execute(SelectStatement::new("orders").into()).await.unwrap();
        uow.declare(UnitOfWorkIntent::ReadWrite);
        assert_eq!(uow.target_endpoint(), Endpoint::Replica);
        uow.commit().await.unwrap();
    }

    #[tokio::test]
    async fn test_unbound_commit_claims_nothing() {
        let (cluster, pools, router) = setup();
        let uow = UnitOfWork::new(1, IntentContext::new(), pools.clone(), router.clone());
        assert!(!uow.is_bound());
        uow.commit().await.unwrap();

        assert_eq!(router.stats().total(), 0);
        assert_eq!(cluster.connections_opened(Endpoint::Primary), 0);
        assert_eq!(cluster.connections_opened(Endpoint::Replica), 0);
    }
}
