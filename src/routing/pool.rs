//! Endpoint Pool
//!
//! 엔드포인트별 연결 풀. 라우팅 로직은 없습니다.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use super::config::{EndpointConfig, RoutingConfig};
use super::endpoint::Endpoint;
use super::error::{RoutingError, RoutingResult};
use crate::backend::{Connection, Connector};

// ============================================================================
// PoolConfig - 풀 설정
// ============================================================================

/// 연결 풀 설정
///
/// | 필드 | 기본값 | 설명 |
/// |------|--------|------|
/// | `max_size` | 10 | 동시에 사용 중일 수 있는 최대 연결 수 |
/// | `max_lifetime` | 30분 | 연결 최대 수명 |
/// | `idle_timeout` | 10분 | 유휴 타임아웃 |
/// | `connection_timeout` | 30초 | 연결 획득 타임아웃 |
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// 최대 연결 수
    pub max_size: usize,
    /// 연결 최대 수명
    pub max_lifetime: Duration,
    /// 유휴 타임아웃
    pub idle_timeout: Duration,
    /// 연결 획득 타임아웃
    pub connection_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_size: 10,
            max_lifetime: Duration::from_secs(1800),
            idle_timeout: Duration::from_secs(600),
            connection_timeout: Duration::from_secs(30),
        }
    }
}

impl PoolConfig {
    /// 빌더 패턴으로 풀 설정 생성
    pub fn builder() -> PoolConfigBuilder {
        PoolConfigBuilder::default()
    }
}

/// 풀 설정 빌더
#[derive(Debug, Clone, Default)]
pub struct PoolConfigBuilder {
    config: PoolConfig,
}

impl PoolConfigBuilder {
    /// 최대 연결 수 설정
    pub fn max_size(mut self, size: usize) -> Self {
        self.config.max_size = size;
        self
    }

    /// 연결 최대 수명 설정
    pub fn max_lifetime(mut self, duration: Duration) -> Self {
        self.config.max_lifetime = duration;
        self
    }

    /// 유휴 타임아웃 설정
    pub fn idle_timeout(mut self, duration: Duration) -> Self {
        self.config.idle_timeout = duration;
        self
    }

    /// 연결 획득 타임아웃 설정
    pub fn connection_timeout(mut self, duration: Duration) -> Self {
        self.config.connection_timeout = duration;
        self
    }

    /// 설정 빌드
    pub fn build(self) -> PoolConfig {
        self.config
    }
}

// ============================================================================
// ConnectionState - 연결 상태
// ============================================================================

/// 연결 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// 유휴 상태
    Idle,
    /// 사용 중
    InUse,
    /// 닫힘
    Closed,
}

// ============================================================================
// PooledConnection - 풀링된 연결
// ============================================================================

/// 풀에서 빌린 연결
///
/// [`PooledConnection::release`]로 반환하지 않고 drop되면 물리 연결은 버려집니다.
pub struct PooledConnection {
    id: u64,
    endpoint: Endpoint,
    created_at: Instant,
    last_used: Instant,
    state: ConnectionState,
    pool: Option<Arc<ConnectionPool>>,
    permit: Option<OwnedSemaphorePermit>,
    connection: Option<Box<dyn Connection>>,
}

impl PooledConnection {
    fn new(id: u64, endpoint: Endpoint, connection: Box<dyn Connection>) -> Self {
        let now = Instant::now();
        Self {
            id,
            endpoint,
            created_at: now,
            last_used: now,
            state: ConnectionState::Idle,
            pool: None,
            permit: None,
            connection: Some(connection),
        }
    }

    /// 연결 ID
    pub fn id(&self) -> u64 {
        self.id
    }

    /// 연결된 엔드포인트
    pub fn endpoint(&self) -> Endpoint {
        self.endpoint
    }

    /// 연결 상태
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// 물리 연결
    pub fn connection(&mut self) -> RoutingResult<&mut (dyn Connection + 'static)> {
        let endpoint = self.endpoint;
        self.last_used = Instant::now();
        self.connection
            .as_deref_mut()
            .ok_or_else(|| RoutingError::connectivity(endpoint, "connection already closed"))
    }

    /// 유효성 확인
    fn is_valid(&self, config: &PoolConfig) -> bool {
        if self.state == ConnectionState::Closed || self.connection.is_none() {
            return false;
        }
        if self.created_at.elapsed() > config.max_lifetime {
            return false;
        }
        if self.state == ConnectionState::Idle && self.last_used.elapsed() > config.idle_timeout {
            return false;
        }
        true
    }

    fn mark_in_use(&mut self) {
        self.state = ConnectionState::InUse;
        self.last_used = Instant::now();
    }

    fn mark_idle(&mut self) {
        self.state = ConnectionState::Idle;
        self.last_used = Instant::now();
    }

    fn mark_closed(&mut self) {
        self.state = ConnectionState::Closed;
        self.connection = None;
    }

    /// 풀로 반환
    pub fn release(mut self) {
        if let Some(pool) = self.pool.take() {
            pool.return_connection(self);
        }
    }
}

impl fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("id", &self.id)
            .field("endpoint", &self.endpoint)
            .field("state", &self.state)
            .field("age", &self.created_at.elapsed())
            .finish()
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        // 반환되지 않은 연결은 트랜잭션 상태를 알 수 없으므로 버린다
        if let Some(pool) = self.pool.take() {
            self.mark_closed();
            pool.discard();
        }
    }
}

// ============================================================================
// PoolMetrics - 풀 메트릭
// ============================================================================

/// 풀 메트릭
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolMetrics {
    /// 현재 크기
    pub size: usize,
    /// 유휴 연결 수
    pub idle: usize,
    /// 사용 중인 연결 수
    pub in_use: usize,
    /// 총 획득 횟수
    pub total_acquisitions: u64,
    /// 총 생성 횟수
    pub total_created: u64,
    /// 총 닫힌 연결 수
    pub total_closed: u64,
    /// 총 타임아웃 횟수
    pub total_timeouts: u64,
}

// ============================================================================
// ConnectionPool - 연결 풀
// ============================================================================

/// 단일 엔드포인트 연결 풀
pub struct ConnectionPool {
    endpoint: Endpoint,
    config: EndpointConfig,
    connector: Arc<dyn Connector>,
    idle_connections: Mutex<VecDeque<PooledConnection>>,
    semaphore: Arc<Semaphore>,
    size: AtomicUsize,
    in_use: AtomicUsize,
    total_created: AtomicU64,
    total_acquisitions: AtomicU64,
    total_closed: AtomicU64,
    total_timeouts: AtomicU64,
    next_id: AtomicU64,
    open: RwLock<bool>,
}

impl ConnectionPool {
    /// 새 연결 풀 생성
    pub fn new(endpoint: Endpoint, config: EndpointConfig, connector: Arc<dyn Connector>) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.pool.max_size));

        Self {
            endpoint,
            config,
            connector,
            idle_connections: Mutex::new(VecDeque::new()),
            semaphore,
            size: AtomicUsize::new(0),
            in_use: AtomicUsize::new(0),
            total_created: AtomicU64::new(0),
            total_acquisitions: AtomicU64::new(0),
            total_closed: AtomicU64::new(0),
            total_timeouts: AtomicU64::new(0),
            next_id: AtomicU64::new(1),
            open: RwLock::new(true),
        }
    }

    /// 풀의 엔드포인트
    pub fn endpoint(&self) -> Endpoint {
        self.endpoint
    }

    /// 연결 획득
    ///
    /// 풀이 고갈되면 `connection_timeout` 동안 기다린 뒤 연결 실패를 반환합니다.
    pub async fn acquire(self: &Arc<Self>) -> RoutingResult<PooledConnection> {
        self.ensure_open()?;

        let timeout = self.config.pool.connection_timeout;
        let permit = match tokio::time::timeout(timeout, self.semaphore.clone().acquire_owned()).await {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => {
                return Err(RoutingError::connectivity(self.endpoint, "pool is closed"));
            }
            Err(_) => {
                self.total_timeouts.fetch_add(1, Ordering::Relaxed);
                return Err(RoutingError::connectivity(
                    self.endpoint,
                    format!("pool exhausted: no connection available within {:?}", timeout),
                ));
            }
        };

        let mut conn = match self.get_idle_connection() {
            Some(conn) => conn,
            None => self.create_connection().await?,
        };

        conn.mark_in_use();
        conn.permit = Some(permit);
        conn.pool = Some(self.clone());

        self.total_acquisitions.fetch_add(1, Ordering::Relaxed);
        self.in_use.fetch_add(1, Ordering::Relaxed);

        tracing::trace!(endpoint = %self.endpoint, connection = conn.id, "connection acquired");
        Ok(conn)
    }

    /// 유휴 연결 가져오기
    fn get_idle_connection(&self) -> Option<PooledConnection> {
        let mut idle = self.idle_connections.lock();

        while let Some(mut conn) = idle.pop_front() {
            if conn.is_valid(&self.config.pool) {
                return Some(conn);
            }
            conn.mark_closed();
            self.size.fetch_sub(1, Ordering::Relaxed);
            self.total_closed.fetch_add(1, Ordering::Relaxed);
        }

        None
    }

    /// 새 연결 생성
    async fn create_connection(&self) -> RoutingResult<PooledConnection> {
        let timeout = self.config.pool.connection_timeout;
        let connection = tokio::time::timeout(timeout, self.connector.connect(self.endpoint, &self.config))
            .await
            .map_err(|_| {
                RoutingError::connectivity(
                    self.endpoint,
                    format!("connect to {} timed out after {:?}", self.config.address, timeout),
                )
            })??;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.size.fetch_add(1, Ordering::Relaxed);
        self.total_created.fetch_add(1, Ordering::Relaxed);

        tracing::debug!(endpoint = %self.endpoint, connection = id, address = %self.config.address, "connection opened");
        Ok(PooledConnection::new(id, self.endpoint, connection))
    }

    /// 연결 반환
    fn return_connection(&self, mut conn: PooledConnection) {
        conn.permit = None;
        self.in_use.fetch_sub(1, Ordering::Relaxed);

        let reusable = *self.open.read()
            && conn.is_valid(&self.config.pool)
            && conn.connection.as_ref().is_some_and(|c| !c.in_transaction());

        if reusable {
            conn.mark_idle();
            self.idle_connections.lock().push_back(conn);
        } else {
            conn.mark_closed();
            self.size.fetch_sub(1, Ordering::Relaxed);
            self.total_closed.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// 반환되지 않은 연결 정리
    fn discard(&self) {
        self.in_use.fetch_sub(1, Ordering::Relaxed);
        self.size.fetch_sub(1, Ordering::Relaxed);
        self.total_closed.fetch_add(1, Ordering::Relaxed);
    }

    /// 풀 닫기
    pub fn close(&self) {
        *self.open.write() = false;

        let mut idle = self.idle_connections.lock();
        while let Some(mut conn) = idle.pop_front() {
            conn.mark_closed();
            self.size.fetch_sub(1, Ordering::Relaxed);
            self.total_closed.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// 연결 확인
    pub async fn verify_connectivity(self: &Arc<Self>) -> RoutingResult<()> {
        let mut conn = self.acquire().await?;
        conn.connection()?.ping().await?;
        conn.release();
        Ok(())
    }

    /// 메트릭 조회
    pub fn metrics(&self) -> PoolMetrics {
        PoolMetrics {
            size: self.size.load(Ordering::Relaxed),
            idle: self.idle_count(),
            in_use: self.in_use.load(Ordering::Relaxed),
            total_acquisitions: self.total_acquisitions.load(Ordering::Relaxed),
            total_created: self.total_created.load(Ordering::Relaxed),
            total_closed: self.total_closed.load(Ordering::Relaxed),
            total_timeouts: self.total_timeouts.load(Ordering::Relaxed),
        }
    }

    /// 유휴 연결 수
    pub fn idle_count(&self) -> usize {
        self.idle_connections.lock().len()
    }

    /// 사용 중인 연결 수
    pub fn in_use_count(&self) -> usize {
        self.in_use.load(Ordering::Relaxed)
    }

    fn ensure_open(&self) -> RoutingResult<()> {
        if *self.open.read() {
            Ok(())
        } else {
            Err(RoutingError::connectivity(self.endpoint, "pool is closed"))
        }
    }
}

impl fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("endpoint", &self.endpoint)
            .field("address", &self.config.address)
            .field("idle", &self.idle_count())
            .field("in_use", &self.in_use_count())
            .finish()
    }
}

// ============================================================================
// EndpointPool - Primary / Replica 풀 묶음
// ============================================================================

/// Primary / Replica 두 풀
#[derive(Debug)]
pub struct EndpointPool {
    primary: Arc<ConnectionPool>,
    replica: Arc<ConnectionPool>,
}

impl EndpointPool {
    /// 설정으로 생성
    pub fn new(config: &RoutingConfig, connector: Arc<dyn Connector>) -> Self {
        Self {
            primary: Arc::new(ConnectionPool::new(
                Endpoint::Primary,
                config.primary.clone(),
                connector.clone(),
            )),
            replica: Arc::new(ConnectionPool::new(
                Endpoint::Replica,
                config.replica.clone(),
                connector,
            )),
        }
    }

    /// 엔드포인트의 풀
    pub fn pool(&self, endpoint: Endpoint) -> &Arc<ConnectionPool> {
        match endpoint {
            Endpoint::Primary => &self.primary,
            Endpoint::Replica => &self.replica,
        }
    }

    /// 지정한 엔드포인트에서 연결 획득 (다른 엔드포인트로 대체하지 않음)
    pub async fn acquire(&self, endpoint: Endpoint) -> RoutingResult<PooledConnection> {
        self.pool(endpoint).acquire().await
    }

    /// 엔드포인트 메트릭
    pub fn metrics(&self, endpoint: Endpoint) -> PoolMetrics {
        self.pool(endpoint).metrics()
    }

    /// 두 풀 닫기
    pub fn close(&self) {
        self.primary.close();
        self.replica.close();
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::MemoryCluster;

    fn create_test_pool(cluster: &MemoryCluster, endpoint: Endpoint, max_size: usize) -> Arc<ConnectionPool> {
        let mut config = EndpointConfig::default();
        config.pool = PoolConfig::builder()
            .max_size(max_size)
            .connection_timeout(Duration::from_millis(50))
            .build();
        Arc::new(ConnectionPool::new(endpoint, config, Arc::new(cluster.clone())))
    }

    #[test]
    fn test_pool_config_default() {
        let config = PoolConfig::default();
        assert_eq!(config.max_size, 10);
        assert_eq!(config.connection_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_pool_config_builder() {
        let config = PoolConfig::builder()
            .max_size(50)
            .connection_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(60))
            .build();

        assert_eq!(config.max_size, 50);
        assert_eq!(config.connection_timeout, Duration::from_secs(10));
        assert_eq!(config.idle_timeout, Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_pool_acquire_and_reuse() {
        let cluster = MemoryCluster::start(Duration::ZERO).unwrap();
        let pool = create_test_pool(&cluster, Endpoint::Primary, 4);

        let conn = pool.acquire().await.unwrap();
        let id = conn.id();
        assert_eq!(conn.endpoint(), Endpoint::Primary);
        assert_eq!(conn.state(), ConnectionState::InUse);
        assert_eq!(pool.in_use_count(), 1);
        conn.release();

        assert_eq!(pool.in_use_count(), 0);
        assert_eq!(pool.idle_count(), 1);

        let conn = pool.acquire().await.unwrap();
        assert_eq!(conn.id(), id);
        conn.release();

        let metrics = pool.metrics();
        assert_eq!(metrics.total_created, 1);
        assert_eq!(metrics.total_acquisitions, 2);
        assert_eq!(cluster.connections_opened(Endpoint::Primary), 1);
    }

    #[tokio::test]
    async fn test_pool_exhaustion_is_connectivity_failure() {
        let cluster = MemoryCluster::start(Duration::ZERO).unwrap();
        let pool = create_test_pool(&cluster, Endpoint::Replica, 1);

        let held = pool.acquire().await.unwrap();
        let err = pool.acquire().await.unwrap_err();
        assert!(err.is_connectivity_failure());
        assert_eq!(err.endpoint(), Some(Endpoint::Replica));
        assert_eq!(pool.metrics().total_timeouts, 1);

        held.release();
        pool.acquire().await.unwrap().release();
    }

    #[tokio::test]
    async fn test_pool_endpoint_down() {
        let cluster = MemoryCluster::start(Duration::ZERO).unwrap();
        cluster.set_available(Endpoint::Replica, false);
        let pool = create_test_pool(&cluster, Endpoint::Replica, 2);

        let err = pool.acquire().await.unwrap_err();
        assert!(err.is_connectivity_failure());
        assert_eq!(pool.in_use_count(), 0);
    }

    #[tokio::test]
    async fn test_dropped_connection_is_discarded() {
        let cluster = MemoryCluster::start(Duration::ZERO).unwrap();
        let pool = create_test_pool(&cluster, Endpoint::Primary, 2);

        let conn = pool.acquire().await.unwrap();
        drop(conn);

        let metrics = pool.metrics();
        assert_eq!(metrics.in_use, 0);
        assert_eq!(metrics.size, 0);
        assert_eq!(metrics.total_closed, 1);
    }

    #[tokio::test]
    async fn test_connection_in_transaction_not_reused() {
        let cluster = MemoryCluster::start(Duration::ZERO).unwrap();
        let pool = create_test_pool(&cluster, Endpoint::Primary, 2);

        let mut conn = pool.acquire().await.unwrap();
        conn.connection().unwrap().begin(false).await.unwrap();
        conn.release();

        assert_eq!(pool.idle_count(), 0);
        assert_eq!(pool.metrics().total_closed, 1);
    }

    #[tokio::test]
    async fn test_pool_close() {
        let cluster = MemoryCluster::start(Duration::ZERO).unwrap();
        let pool = create_test_pool(&cluster, Endpoint::Primary, 2);

        pool.acquire().await.unwrap().release();
        assert_eq!(pool.idle_count(), 1);

        pool.close();
        assert_eq!(pool.idle_count(), 0);
        assert!(pool.acquire().await.is_err());
    }

    #[tokio::test]
    async fn test_verify_connectivity() {
        let cluster = MemoryCluster::start(Duration::ZERO).unwrap();
        let pool = create_test_pool(&cluster, Endpoint::Primary, 2);
        pool.verify_connectivity().await.unwrap();

        cluster.set_available(Endpoint::Primary, false);
        let err = pool.verify_connectivity().await.unwrap_err();
        assert!(err.is_connectivity_failure());
    }

    #[tokio::test]
    async fn test_endpoint_pool_routes_to_named_endpoint() {
        let cluster = MemoryCluster::start(Duration::ZERO).unwrap();
        let pools = EndpointPool::new(&RoutingConfig::default(), Arc::new(cluster.clone()));

        let conn = pools.acquire(Endpoint::Replica).await.unwrap();
        assert_eq!(conn.endpoint(), Endpoint::Replica);
        conn.release();

        assert_eq!(pools.metrics(Endpoint::Replica).total_acquisitions, 1);
        assert_eq!(pools.metrics(Endpoint::Primary).total_acquisitions, 0);
    }
}
