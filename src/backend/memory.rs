//! 인-메모리 Primary / Replica
//!
//! Primary에 커밋된 쓰기 트랜잭션은 복제 토큰과 함께 이벤트로 발행되고,
//! 백그라운드 적용기가 `lag` 만큼 지난 뒤 Replica에 행 그대로 반영합니다.
//! 로그 전송 자체를 구현하지는 않으며 "비동기 복제 채널"만 흉내 냅니다.
//!
//! 장애 주입:
//! - [`MemoryCluster::set_available`] - 엔드포인트 다운
//! - [`MemoryCluster::fail_writes_to`] - 특정 테이블 쓰기 실패
//! - [`MemoryCluster::pause_replication`] - 복제 정지

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::statement::{SelectStatement, SortOrder, Statement, StatementResult};
use super::value::Row;
use super::{Connection, Connector};
use crate::routing::{Endpoint, EndpointConfig, ReplicationToken, RoutingError, RoutingResult};

/// 기본 source 식별자
pub const DEFAULT_SOURCE_ID: &str = "3e11fa47-71ca-11e1-9e33-c80aa9429562";

/// 자동 부여 키 컬럼
pub const ID_COLUMN: &str = "id";

// ============================================================================
// Store - 테이블 저장소
// ============================================================================

#[derive(Debug, Default)]
struct Table {
    auto_increment: i64,
    rows: BTreeMap<i64, Row>,
}

#[derive(Debug, Clone)]
struct Change {
    table: String,
    id: i64,
    row: Row,
}

#[derive(Debug, Default)]
struct Store {
    tables: HashMap<String, Table>,
    executed: BTreeSet<ReplicationToken>,
}

impl Store {
    fn allocate_id(&mut self, table: &str) -> i64 {
        let table = self.tables.entry(table.to_string()).or_default();
        table.auto_increment += 1;
        table.auto_increment
    }

    fn apply(&mut self, token: &ReplicationToken, changes: &[Change]) {
        for change in changes {
            let table = self.tables.entry(change.table.clone()).or_default();
            table.auto_increment = table.auto_increment.max(change.id);
            table.rows.insert(change.id, change.row.clone());
        }
        self.executed.insert(token.clone());
    }

    fn select(&self, select: &SelectStatement, pending: &[Change]) -> Vec<Row> {
        let mut rows: BTreeMap<i64, &Row> = BTreeMap::new();

        if let Some(table) = self.tables.get(&select.table) {
            for (id, row) in &table.rows {
                if select.matches(row) {
                    rows.insert(*id, row);
                }
            }
        }

        // 같은 트랜잭션에서 쓴 행은 보인다
        for change in pending.iter().filter(|c| c.table == select.table) {
            if select.matches(&change.row) {
                rows.insert(change.id, &change.row);
            }
        }

        let mut ordered: Vec<Row> = rows.into_values().cloned().collect();
        if select.order == SortOrder::Descending {
            ordered.reverse();
        }
        if let Some(limit) = select.limit {
            ordered.truncate(limit);
        }
        ordered
    }

    fn row_count(&self, table: &str) -> usize {
        self.tables.get(table).map(|t| t.rows.len()).unwrap_or(0)
    }
}

// ============================================================================
// ReplicationEvent - 복제 이벤트
// ============================================================================

#[derive(Debug)]
struct ReplicationEvent {
    token: ReplicationToken,
    changes: Vec<Change>,
    committed_at: Instant,
}

// ============================================================================
// MemoryCluster - 인-메모리 클러스터
// ============================================================================

struct ClusterState {
    source_id: String,
    primary: Mutex<Store>,
    replica: Arc<Mutex<Store>>,
    next_sequence: AtomicU64,
    events: mpsc::UnboundedSender<ReplicationEvent>,
    in_flight: Arc<AtomicUsize>,
    lag: Arc<Mutex<Duration>>,
    paused: watch::Sender<bool>,
    primary_up: AtomicBool,
    replica_up: AtomicBool,
    failing_tables: Mutex<HashSet<String>>,
    primary_connections: AtomicU64,
    replica_connections: AtomicU64,
    shutdown: CancellationToken,
}

impl ClusterState {
    fn is_up(&self, endpoint: Endpoint) -> bool {
        match endpoint {
            Endpoint::Primary => self.primary_up.load(Ordering::SeqCst),
            Endpoint::Replica => self.replica_up.load(Ordering::SeqCst),
        }
    }

    fn store(&self, endpoint: Endpoint) -> &Mutex<Store> {
        match endpoint {
            Endpoint::Primary => &self.primary,
            Endpoint::Replica => &self.replica,
        }
    }

    fn issue_token(&self) -> ReplicationToken {
        let sequence = self.next_sequence.fetch_add(1, Ordering::SeqCst) + 1;
        ReplicationToken::new(self.source_id.clone(), sequence)
    }
}

impl Drop for ClusterState {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// 인-메모리 Primary / Replica 쌍
///
/// 복제본(`clone`)은 같은 클러스터를 가리킵니다.
#[derive(Clone)]
pub struct MemoryCluster {
    state: Arc<ClusterState>,
}

impl MemoryCluster {
    /// 복제 지연 `lag`로 클러스터 시작
    ///
    /// 적용기 태스크를 띄우므로 tokio 런타임 안에서 호출해야 합니다.
    pub fn start(lag: Duration) -> RoutingResult<Self> {
        Self::with_source_id(DEFAULT_SOURCE_ID, lag)
    }

    /// source 식별자를 지정해 시작
    pub fn with_source_id(source_id: impl Into<String>, lag: Duration) -> RoutingResult<Self> {
        let handle = tokio::runtime::Handle::try_current().map_err(|_| {
            RoutingError::configuration("MemoryCluster must be started inside a tokio runtime")
        })?;

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (paused_tx, paused_rx) = watch::channel(false);
        let replica = Arc::new(Mutex::new(Store::default()));
        let in_flight = Arc::new(AtomicUsize::new(0));
        let lag = Arc::new(Mutex::new(lag));
        let shutdown = CancellationToken::new();

        handle.spawn(apply_events(
            events_rx,
            replica.clone(),
            lag.clone(),
            paused_rx,
            in_flight.clone(),
            shutdown.clone(),
        ));

        let state = ClusterState {
            source_id: source_id.into(),
            primary: Mutex::new(Store::default()),
            replica,
            next_sequence: AtomicU64::new(0),
            events: events_tx,
            in_flight,
            lag,
            paused: paused_tx,
            primary_up: AtomicBool::new(true),
            replica_up: AtomicBool::new(true),
            failing_tables: Mutex::new(HashSet::new()),
            primary_connections: AtomicU64::new(0),
            replica_connections: AtomicU64::new(0),
            shutdown,
        };

        tracing::info!(source_id = %state.source_id, "memory cluster started");
        Ok(Self {
            state: Arc::new(state),
        })
    }

    /// source 식별자
    pub fn source_id(&self) -> &str {
        &self.state.source_id
    }

    /// 복제 지연 변경 (이후 커밋부터 적용)
    pub fn set_lag(&self, lag: Duration) {
        *self.state.lag.lock() = lag;
    }

    /// 현재 복제 지연
    pub fn lag(&self) -> Duration {
        *self.state.lag.lock()
    }

    /// 복제 정지
    pub fn pause_replication(&self) {
        self.state.paused.send_replace(true);
    }

    /// 복제 재개
    pub fn resume_replication(&self) {
        self.state.paused.send_replace(false);
    }

    /// 엔드포인트 가용성 설정
    pub fn set_available(&self, endpoint: Endpoint, available: bool) {
        match endpoint {
            Endpoint::Primary => self.state.primary_up.store(available, Ordering::SeqCst),
            Endpoint::Replica => self.state.replica_up.store(available, Ordering::SeqCst),
        }
    }

    /// 테이블 쓰기 실패 주입
    pub fn fail_writes_to(&self, table: impl Into<String>) {
        self.state.failing_tables.lock().insert(table.into());
    }

    /// 쓰기 실패 주입 해제
    pub fn clear_write_failures(&self) {
        self.state.failing_tables.lock().clear();
    }

    /// 엔드포인트별로 열린 물리 연결 수
    pub fn connections_opened(&self, endpoint: Endpoint) -> u64 {
        match endpoint {
            Endpoint::Primary => self.state.primary_connections.load(Ordering::SeqCst),
            Endpoint::Replica => self.state.replica_connections.load(Ordering::SeqCst),
        }
    }

    /// 테이블 행 수 (라우팅 없이 직접 조회)
    pub fn row_count(&self, endpoint: Endpoint, table: &str) -> usize {
        self.state.store(endpoint).lock().row_count(table)
    }

    /// 해당 토큰이 Replica에 적용되었는지
    pub fn is_applied_on_replica(&self, token: &ReplicationToken) -> bool {
        self.state.replica.lock().executed.contains(token)
    }

    /// 아직 Replica에 적용되지 않은 이벤트 수
    pub fn pending_events(&self) -> usize {
        self.state.in_flight.load(Ordering::SeqCst)
    }

    /// 적용기 종료
    pub fn shutdown(&self) {
        self.state.shutdown.cancel();
    }
}

impl fmt::Debug for MemoryCluster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryCluster")
            .field("source_id", &self.state.source_id)
            .field("lag", &self.lag())
            .field("pending_events", &self.pending_events())
            .finish()
    }
}

impl Connector for MemoryCluster {
    fn connect<'a>(
        &'a self,
        endpoint: Endpoint,
        config: &'a EndpointConfig,
    ) -> BoxFuture<'a, RoutingResult<Box<dyn Connection>>> {
        Box::pin(async move {
            if !self.state.is_up(endpoint) {
                return Err(RoutingError::connectivity(
                    endpoint,
                    format!("{} refused connection", config.address),
                ));
            }

            match endpoint {
                Endpoint::Primary => self.state.primary_connections.fetch_add(1, Ordering::SeqCst),
                Endpoint::Replica => self.state.replica_connections.fetch_add(1, Ordering::SeqCst),
            };

            Ok(Box::new(MemoryConnection {
                state: self.state.clone(),
                endpoint,
                tx: None,
            }) as Box<dyn Connection>)
        })
    }
}

/// 복제 이벤트 적용 루프
async fn apply_events(
    mut events: mpsc::UnboundedReceiver<ReplicationEvent>,
    replica: Arc<Mutex<Store>>,
    lag: Arc<Mutex<Duration>>,
    mut paused: watch::Receiver<bool>,
    in_flight: Arc<AtomicUsize>,
    shutdown: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            _ = shutdown.cancelled() => break,
            event = events.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };

        let due = event.committed_at + *lag.lock();
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep_until(due) => {}
        }

        loop {
            let is_paused = *paused.borrow();
            if !is_paused {
                break;
            }
            tokio::select! {
                _ = shutdown.cancelled() => return,
                changed = paused.changed() => {
                    if changed.is_err() {
                        return;
                    }
                }
            }
        }

        replica.lock().apply(&event.token, &event.changes);
        in_flight.fetch_sub(1, Ordering::SeqCst);
        tracing::debug!(token = %event.token, rows = event.changes.len(), "applied on replica");
    }

    tracing::debug!("replication applier stopped");
}

// ============================================================================
// MemoryConnection - 인-메모리 연결
// ============================================================================

struct PendingTransaction {
    read_only: bool,
    changes: Vec<Change>,
    token: Option<ReplicationToken>,
}

/// 인-메모리 물리 연결
pub struct MemoryConnection {
    state: Arc<ClusterState>,
    endpoint: Endpoint,
    tx: Option<PendingTransaction>,
}

impl MemoryConnection {
    fn ensure_up(&self) -> RoutingResult<()> {
        if self.state.is_up(self.endpoint) {
            Ok(())
        } else {
            Err(RoutingError::connectivity(
                self.endpoint,
                "connection lost",
            ))
        }
    }

    fn transaction(&mut self) -> RoutingResult<&mut PendingTransaction> {
        self.tx
            .as_mut()
            .ok_or_else(|| RoutingError::statement("No active transaction"))
    }

    fn insert(&mut self, table: String, mut row: Row) -> RoutingResult<StatementResult> {
        if self.endpoint == Endpoint::Replica {
            return Err(RoutingError::write(
                table,
                "replica is running with --super-read-only",
            ));
        }
        if self.transaction()?.read_only {
            return Err(RoutingError::write(
                table,
                "cannot execute statement in a READ ONLY transaction",
            ));
        }
        if self.state.failing_tables.lock().contains(&table) {
            return Err(RoutingError::write(table, "injected write failure"));
        }

        let id = self.state.primary.lock().allocate_id(&table);
        row.set(ID_COLUMN, id);
        self.transaction()?.changes.push(Change { table, id, row });

        Ok(StatementResult::inserted(id))
    }

    fn select(&self, select: &SelectStatement) -> Vec<Row> {
        let pending = self.tx.as_ref().map(|tx| tx.changes.as_slice()).unwrap_or(&[]);
        self.state.store(self.endpoint).lock().select(select, pending)
    }
}

impl Connection for MemoryConnection {
    fn begin(&mut self, read_only: bool) -> BoxFuture<'_, RoutingResult<()>> {
        Box::pin(async move {
            self.ensure_up()?;
            if self.tx.is_some() {
                return Err(RoutingError::statement("Transaction already active"));
            }
            self.tx = Some(PendingTransaction {
                read_only,
                changes: Vec::new(),
                token: None,
            });
            Ok(())
        })
    }

    fn execute(&mut self, statement: Statement) -> BoxFuture<'_, RoutingResult<StatementResult>> {
        Box::pin(async move {
            self.ensure_up()?;
            self.transaction()?;

            match statement {
                Statement::Insert { table, row } => self.insert(table, row),
                Statement::Select(select) => Ok(StatementResult::rows(self.select(&select))),
                Statement::Count(select) => {
                    Ok(StatementResult::counted(self.select(&select).len() as u64))
                }
            }
        })
    }

    fn replication_position(&mut self) -> BoxFuture<'_, RoutingResult<ReplicationToken>> {
        Box::pin(async move {
            self.ensure_up()?;
            if self.endpoint == Endpoint::Replica {
                return Err(RoutingError::statement(
                    "Replication positions are issued by the source only",
                ));
            }

            let state = self.state.clone();
            let tx = self.transaction()?;
            if tx.read_only {
                return Err(RoutingError::statement(
                    "Replication position requested in a READ ONLY transaction",
                ));
            }

            Ok(tx.token.get_or_insert_with(|| state.issue_token()).clone())
        })
    }

    fn commit(&mut self) -> BoxFuture<'_, RoutingResult<()>> {
        Box::pin(async move {
            self.ensure_up()?;
            let tx = self
                .tx
                .take()
                .ok_or_else(|| RoutingError::statement("No active transaction"))?;

            if tx.changes.is_empty() {
                return Ok(());
            }

            let token = tx.token.unwrap_or_else(|| self.state.issue_token());
            self.state.primary.lock().apply(&token, &tx.changes);

            self.state.in_flight.fetch_add(1, Ordering::SeqCst);
            let event = ReplicationEvent {
                token: token.clone(),
                changes: tx.changes,
                committed_at: Instant::now(),
            };
            if self.state.events.send(event).is_err() {
                self.state.in_flight.fetch_sub(1, Ordering::SeqCst);
                tracing::warn!(token = %token, "replication channel closed; event dropped");
            }

            Ok(())
        })
    }

    fn rollback(&mut self) -> BoxFuture<'_, RoutingResult<()>> {
        Box::pin(async move {
            self.tx = None;
            Ok(())
        })
    }

    fn ping(&mut self) -> BoxFuture<'_, RoutingResult<()>> {
        Box::pin(async move { self.ensure_up() })
    }

    fn in_transaction(&self) -> bool {
        self.tx.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn connect(cluster: &MemoryCluster, endpoint: Endpoint) -> Box<dyn Connection> {
        cluster
            .connect(endpoint, &EndpointConfig::default())
            .await
            .unwrap()
    }

    async fn insert_order(conn: &mut Box<dyn Connection>, user_id: i64) -> ReplicationToken {
        conn.begin(false).await.unwrap();
        conn.execute(Statement::insert("orders", Row::new().with("user_id", user_id)))
            .await
            .unwrap();
        let token = conn.replication_position().await.unwrap();
        conn.commit().await.unwrap();
        token
    }

    #[tokio::test(start_paused = true)]
    async fn test_commit_replicates_after_lag() {
        let cluster = MemoryCluster::start(Duration::from_millis(100)).unwrap();
        let mut primary = connect(&cluster, Endpoint::Primary).await;

        let token = insert_order(&mut primary, 1).await;
        assert_eq!(cluster.row_count(Endpoint::Primary, "orders"), 1);
        assert_eq!(cluster.row_count(Endpoint::Replica, "orders"), 0);
        assert!(!cluster.is_applied_on_replica(&token));

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(cluster.row_count(Endpoint::Replica, "orders"), 1);
        assert!(cluster.is_applied_on_replica(&token));
        assert_eq!(cluster.pending_events(), 0);
    }

    #[tokio::test]
    async fn test_token_stable_within_transaction() {
        let cluster = MemoryCluster::start(Duration::ZERO).unwrap();
        let mut primary = connect(&cluster, Endpoint::Primary).await;

        primary.begin(false).await.unwrap();
        let first = primary.replication_position().await.unwrap();
        let second = primary.replication_position().await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.source_id(), DEFAULT_SOURCE_ID);
        primary.rollback().await.unwrap();

        let next = insert_order(&mut primary, 1).await;
        assert!(next > first);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokens_reserved_before_commit_order() {
        let cluster = MemoryCluster::start(Duration::from_millis(10)).unwrap();
        let mut first = connect(&cluster, Endpoint::Primary).await;
        let mut second = connect(&cluster, Endpoint::Primary).await;

        first.begin(false).await.unwrap();
        first
            .execute(Statement::insert("orders", Row::new().with("user_id", 1i64)))
            .await
            .unwrap();
        let early = first.replication_position().await.unwrap();

        let late = insert_order(&mut second, 2).await;
        assert!(late > early);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(cluster.is_applied_on_replica(&late));
        assert!(!cluster.is_applied_on_replica(&early));

        first.commit().await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(cluster.is_applied_on_replica(&early));
    }

    #[tokio::test]
    async fn test_rollback_discards_changes() {
        let cluster = MemoryCluster::start(Duration::ZERO).unwrap();
        let mut primary = connect(&cluster, Endpoint::Primary).await;

        primary.begin(false).await.unwrap();
        primary
            .execute(Statement::insert("orders", Row::new().with("user_id", 1i64)))
            .await
            .unwrap();
        primary.rollback().await.unwrap();

        assert_eq!(cluster.row_count(Endpoint::Primary, "orders"), 0);
        assert_eq!(cluster.pending_events(), 0);
        assert!(!primary.in_transaction());
    }

    #[tokio::test]
    async fn test_read_your_writes_inside_transaction() {
        let cluster = MemoryCluster::start(Duration::ZERO).unwrap();
        let mut primary = connect(&cluster, Endpoint::Primary).await;

        primary.begin(false).await.unwrap();
        primary
            .execute(Statement::insert("orders", Row::new().with("user_id", 9i64)))
            .await
            .unwrap();
        let result = primary
            .execute(SelectStatement::new("orders").where_eq("user_id", 9i64).into())
            .await
            .unwrap();
        assert_eq!(result.rows.len(), 1);
        assert_eq!(result.rows[0].get_int(ID_COLUMN).unwrap(), 1);
        primary.rollback().await.unwrap();
    }

    #[tokio::test]
    async fn test_replica_rejects_writes_and_positions() {
        let cluster = MemoryCluster::start(Duration::ZERO).unwrap();
        let mut replica = connect(&cluster, Endpoint::Replica).await;

        replica.begin(true).await.unwrap();
        let err = replica
            .execute(Statement::insert("orders", Row::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, RoutingError::Write { .. }));
        assert!(replica.replication_position().await.is_err());
    }

    #[tokio::test]
    async fn test_read_only_transaction_rejects_writes() {
        let cluster = MemoryCluster::start(Duration::ZERO).unwrap();
        let mut primary = connect(&cluster, Endpoint::Primary).await;

        primary.begin(true).await.unwrap();
        let err = primary
            .execute(Statement::insert("orders", Row::new()))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("READ ONLY"));
    }

    #[tokio::test]
    async fn test_unavailable_endpoint_refuses_connections() {
        let cluster = MemoryCluster::start(Duration::ZERO).unwrap();
        cluster.set_available(Endpoint::Replica, false);

        let err = cluster
            .connect(Endpoint::Replica, &EndpointConfig::default())
            .await
            .err()
            .unwrap();
        assert_eq!(err.endpoint(), Some(Endpoint::Replica));
        assert_eq!(cluster.connections_opened(Endpoint::Replica), 0);

        // Primary는 영향 없음
        connect(&cluster, Endpoint::Primary).await;
        assert_eq!(cluster.connections_opened(Endpoint::Primary), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_holds_replication() {
        let cluster = MemoryCluster::start(Duration::from_millis(10)).unwrap();
        let mut primary = connect(&cluster, Endpoint::Primary).await;

        cluster.pause_replication();
        let token = insert_order(&mut primary, 1).await;
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(!cluster.is_applied_on_replica(&token));
        assert_eq!(cluster.pending_events(), 1);

        cluster.resume_replication();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(cluster.is_applied_on_replica(&token));
    }

    #[tokio::test]
    async fn test_select_newest_first_with_limit() {
        let cluster = MemoryCluster::start(Duration::ZERO).unwrap();
        let mut primary = connect(&cluster, Endpoint::Primary).await;
        for user in 1..=3 {
            insert_order(&mut primary, user).await;
        }

        primary.begin(true).await.unwrap();
        let result = primary
            .execute(SelectStatement::new("orders").newest_first().limit(2).into())
            .await
            .unwrap();
        let ids: Vec<i64> = result.rows.iter().map(|r| r.get_int(ID_COLUMN).unwrap()).collect();
        assert_eq!(ids, vec![3, 2]);
        primary.commit().await.unwrap();
    }
}
