//! 주문 서비스
//!
//! - `place_order`: 읽기/쓰기 유닛 오브 워크 → Primary. 주문, 항목, 복제 로그를 한 번에 커밋
//! - `get_order_history`: 읽기 전용 유닛 오브 워크 → Replica. 복제 지연만큼 뒤처질 수 있음
//! - `check_replication`: 토큰이 Replica에 도달했는지 한 번 확인

use std::sync::Arc;
use std::time::Duration;

use crate::routing::{
    Endpoint, EventKind, ReplicationRecord, ReplicationToken, ReplicationTracker, RoutingDataSource,
    RoutingError, RoutingResult, UnitOfWork, UnitOfWorkIntent,
};

use super::model::Order;
use super::repository::{OrderRepository, ORDERS_TABLE};

/// 저장된 주문과 그 복제 로그 항목
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacedOrder {
    pub order: Order,
    pub record: ReplicationRecord,
    /// 쓰기가 실행된 엔드포인트
    pub routed_to: Endpoint,
}

/// 사용자 주문 내역
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderHistory {
    pub user_id: i64,
    pub orders: Vec<Order>,
    /// 조회가 실행된 엔드포인트
    pub routed_to: Endpoint,
}

/// 주문 서비스
#[derive(Debug, Clone)]
pub struct OrderService {
    data_source: Arc<RoutingDataSource>,
    repository: OrderRepository,
    tracker: ReplicationTracker,
}

impl OrderService {
    pub fn new(data_source: Arc<RoutingDataSource>) -> Self {
        Self {
            data_source,
            repository: OrderRepository::new(),
            tracker: ReplicationTracker::new(),
        }
    }

    pub fn data_source(&self) -> &RoutingDataSource {
        &self.data_source
    }

    /// 주문 생성
    ///
    /// 주문 + 항목 + 복제 로그가 하나의 유닛 오브 워크(하나의 복제 토큰)로 커밋됩니다.
    /// 어느 쓰기든 실패하면 전부 롤백됩니다.
    pub async fn place_order(&self, order: Order) -> RoutingResult<PlacedOrder> {
        let mut uow = self.data_source.begin_with(UnitOfWorkIntent::ReadWrite);
        let result = self.place_order_in(&mut uow, order).await;
        let placed = uow.complete(result).await?;

        tracing::info!(
            order_id = ?placed.order.id,
            token = %placed.record.token,
            endpoint = %placed.routed_to,
            "order placed"
        );
        Ok(placed)
    }

    async fn place_order_in(&self, uow: &mut UnitOfWork, order: Order) -> RoutingResult<PlacedOrder> {
        let order = self.repository.save(uow, order).await?;
        let record = self
            .tracker
            .issue_and_record(uow, EventKind::Insert, ORDERS_TABLE)
            .await?;

        Ok(PlacedOrder {
            order,
            record,
            routed_to: bound_endpoint(uow)?,
        })
    }

    /// 주문 내역 (Replica에 현재 보이는 것만)
    pub async fn get_order_history(&self, user_id: i64) -> RoutingResult<OrderHistory> {
        let mut uow = self.data_source.begin_with(UnitOfWorkIntent::ReadOnly);
        let result = match self.repository.find_by_user(&mut uow, user_id).await {
            Ok(orders) => bound_endpoint(&uow).map(|routed_to| OrderHistory {
                user_id,
                orders,
                routed_to,
            }),
            Err(e) => Err(e),
        };
        uow.complete(result).await
    }

    /// 토큰이 Replica에 도달했는지
    pub async fn check_replication(&self, token: &ReplicationToken) -> RoutingResult<bool> {
        self.tracker.has_reached(&self.data_source, token).await
    }

    /// 토큰이 Replica에 도달할 때까지 `interval` 간격으로 확인
    ///
    /// `timeout` 안에 도달하지 않으면 `false`를 반환합니다.
    pub async fn wait_for_replication(
        &self,
        token: &ReplicationToken,
        timeout: Duration,
        interval: Duration,
    ) -> RoutingResult<bool> {
        if interval.is_zero() {
            return Err(RoutingError::validation("Polling interval must be positive"));
        }

        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.check_replication(token).await? {
                return Ok(true);
            }

            let now = tokio::time::Instant::now();
            if now >= deadline {
                tracing::debug!(token = %token, ?timeout, "replica did not reach token in time");
                return Ok(false);
            }
            tokio::time::sleep(interval.min(deadline - now)).await;
        }
    }

    /// 최근 복제 로그 (최신순)
    pub async fn recent_replication_records(&self, limit: usize) -> RoutingResult<Vec<ReplicationRecord>> {
        self.tracker.recent_records(&self.data_source, limit).await
    }
}

fn bound_endpoint(uow: &UnitOfWork) -> RoutingResult<Endpoint> {
    uow.endpoint()
        .ok_or_else(|| RoutingError::internal("unit of work finished without a bound endpoint"))
}
