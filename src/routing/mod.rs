//! Routing Module
//!
//! 의도 기반 Primary / Replica 라우팅과 복제 도달 확인
//!
//! # Components
//!
//! - 엔드포인트 풀 (EndpointPool, ConnectionPool, PoolConfig)
//! - 의도 컨텍스트 (IntentContext, UnitOfWorkIntent)
//! - 라우터 (Router, RoutingDecision, RoutingObserver)
//! - 지연 획득 (DeferredConnection)
//! - 유닛 오브 워크 (UnitOfWork, RoutingDataSource)
//! - 복제 진행 추적 (ReplicationTracker, ReplicationRecord, ReplicationToken)
//!
//! # Example
//!
//! ```ignore
//! use replica_router::routing::{RoutingConfig, RoutingDataSource, ReplicationTracker, EventKind};
//!
//! let data_source = RoutingDataSource::new(RoutingConfig::from_env()?, connector)?;
//! let tracker = ReplicationTracker::new();
//!
//! // 쓰기: 의도 없음 → Primary
//! let mut uow = data_source.begin();
//! uow.execute(Statement::insert("orders", row)).await?;
//! let record = tracker.issue_and_record(&mut uow, EventKind::Insert, "orders").await?;
//! uow.commit().await?;
//!
//! // 확인: 읽기 전용 → Replica
//! let reached = tracker.has_reached(&data_source, &record.token).await?;
//! ```

mod config;
mod data_source;
mod deferred;
mod endpoint;
mod error;
mod intent;
mod pool;
mod router;
mod token;
mod tracker;
mod unit_of_work;

// Re-exports
pub use config::{Credentials, EndpointConfig, EndpointConfigBuilder, RoutingConfig, ServerAddress};
pub use data_source::RoutingDataSource;
pub use deferred::{DeferredConnection, Resolver};
pub use endpoint::Endpoint;
pub use error::{RoutingError, RoutingResult};
pub use intent::{IntentContext, UnitOfWorkIntent};
pub use pool::{
    ConnectionPool, ConnectionState, EndpointPool, PoolConfig, PoolConfigBuilder, PoolMetrics,
    PooledConnection,
};
pub use router::{Router, RoutingDecision, RoutingObserver, RoutingStats, TracingObserver};
pub use token::ReplicationToken;
pub use tracker::{EventKind, ReplicationRecord, ReplicationTracker, REPLICATION_LOG_TABLE};
pub use unit_of_work::{UnitOfWork, UnitOfWorkState};
