//! Routing Data Source
//!
//! 두 엔드포인트 풀과 라우터를 묶은 진입점. 유닛 오브 워크를 만들고,
//! 트랜잭션 함수(`read_only` / `read_write`)를 실행합니다.
//!
//! ```ignore
//! let data_source = RoutingDataSource::new(config, connector)?;
//!
//! let orders = data_source
//!     .read_only(move |uow| Box::pin(async move {
//!         uow.execute(SelectStatement::new("orders").into()).await
//!     }))
//!     .await?;
//! ```

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;

use super::config::RoutingConfig;
use super::endpoint::Endpoint;
use super::error::{RoutingError, RoutingResult};
use super::intent::{IntentContext, UnitOfWorkIntent};
use super::pool::{EndpointPool, PoolMetrics};
use super::router::{Router, RoutingStats};
use super::unit_of_work::UnitOfWork;
use crate::backend::Connector;

/// 라우팅 데이터 소스
pub struct RoutingDataSource {
    config: RoutingConfig,
    pools: Arc<EndpointPool>,
    router: Arc<Router>,
    next_id: AtomicU64,
    open: AtomicBool,
}

impl RoutingDataSource {
    /// 기본 라우터(`TracingObserver` 등록)로 생성
    pub fn new(config: RoutingConfig, connector: Arc<dyn Connector>) -> RoutingResult<Self> {
        Self::with_router(config, connector, Router::new())
    }

    /// 지정한 라우터로 생성
    pub fn with_router(
        config: RoutingConfig,
        connector: Arc<dyn Connector>,
        router: Router,
    ) -> RoutingResult<Self> {
        config.validate()?;
        let pools = Arc::new(EndpointPool::new(&config, connector));

        tracing::info!(
            primary = %config.primary.address,
            replica = %config.replica.address,
            "routing data source created"
        );

        Ok(Self {
            config,
            pools,
            router: Arc::new(router),
            next_id: AtomicU64::new(1),
            open: AtomicBool::new(true),
        })
    }

    /// 의도 없이 유닛 오브 워크 시작 (선언하지 않으면 Primary)
    ///
    /// 연결은 첫 연산 때 획득합니다.
    pub fn begin(&self) -> UnitOfWork {
        self.start(IntentContext::new())
    }

    /// 의도를 선언하고 유닛 오브 워크 시작
    pub fn begin_with(&self, intent: UnitOfWorkIntent) -> UnitOfWork {
        self.start(IntentContext::with_intent(intent))
    }

    fn start(&self, context: IntentContext) -> UnitOfWork {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        UnitOfWork::new(id, context, self.pools.clone(), self.router.clone())
    }

    /// 읽기 전용 트랜잭션 함수 (Replica)
    pub async fn read_only<F, T>(&self, work: F) -> RoutingResult<T>
    where
        F: for<'u> FnOnce(&'u mut UnitOfWork) -> BoxFuture<'u, RoutingResult<T>>,
    {
        self.execute_transaction(UnitOfWorkIntent::ReadOnly, work).await
    }

    /// 읽기/쓰기 트랜잭션 함수 (Primary)
    pub async fn read_write<F, T>(&self, work: F) -> RoutingResult<T>
    where
        F: for<'u> FnOnce(&'u mut UnitOfWork) -> BoxFuture<'u, RoutingResult<T>>,
    {
        self.execute_transaction(UnitOfWorkIntent::ReadWrite, work).await
    }

    /// 트랜잭션 함수 실행: 성공하면 커밋, 실패하면 롤백 (재시도 없음)
    async fn execute_transaction<F, T>(&self, intent: UnitOfWorkIntent, work: F) -> RoutingResult<T>
    where
        F: for<'u> FnOnce(&'u mut UnitOfWork) -> BoxFuture<'u, RoutingResult<T>>,
    {
        self.ensure_open()?;

        let mut uow = self.begin_with(intent);
        let result = work(&mut uow).await;
        uow.complete(result).await
    }

    /// 두 엔드포인트에 직접 연결을 확인 (라우팅 없음)
    pub async fn verify_connectivity(&self) -> RoutingResult<()> {
        self.ensure_open()?;
        for endpoint in Endpoint::ALL {
            self.pools.pool(endpoint).verify_connectivity().await?;
            tracing::debug!(endpoint = %endpoint, "connectivity verified");
        }
        Ok(())
    }

    /// 엔드포인트 풀 메트릭
    pub fn metrics(&self, endpoint: Endpoint) -> PoolMetrics {
        self.pools.metrics(endpoint)
    }

    /// 라우팅 통계
    pub fn stats(&self) -> RoutingStats {
        self.router.stats()
    }

    /// 라우터
    pub fn router(&self) -> &Router {
        &self.router
    }

    /// 설정
    pub fn config(&self) -> &RoutingConfig {
        &self.config
    }

    /// 열려 있는지
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// 닫기: 유휴 연결을 정리하고 이후 획득을 거부
    pub fn close(&self) {
        if self.open.swap(false, Ordering::SeqCst) {
            self.pools.close();
            tracing::info!("routing data source closed");
        }
    }

    fn ensure_open(&self) -> RoutingResult<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(RoutingError::configuration("Routing data source is closed"))
        }
    }
}

impl fmt::Debug for RoutingDataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoutingDataSource")
            .field("primary", &self.config.primary.address)
            .field("replica", &self.config.replica.address)
            .field("open", &self.is_open())
            .finish()
    }
}
