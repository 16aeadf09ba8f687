//! 주문 API 경계
//!
//! 요청/응답 DTO와 입력 검증. 전송 계층(HTTP 등)은 이 크레이트 밖의 일입니다.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::routing::{Endpoint, ReplicationToken, RoutingError, RoutingResult};

use super::model::{Money, Order, OrderLine, OrderStatus};
use super::service::OrderService;

// ============================================================================
// Requests
// ============================================================================

/// 주문 생성 요청
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceOrderRequest {
    pub user_id: i64,
    pub items: Vec<OrderItemRequest>,
}

/// 주문 항목 요청
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemRequest {
    pub product_name: String,
    pub quantity: u32,
    pub price: Money,
}

impl PlaceOrderRequest {
    /// 검증 후 주문으로 변환
    pub fn into_order(self) -> RoutingResult<Order> {
        if self.user_id <= 0 {
            return Err(RoutingError::validation("userId must be positive"));
        }
        if self.items.is_empty() {
            return Err(RoutingError::validation("An order needs at least one item"));
        }

        let lines = self
            .items
            .into_iter()
            .map(|item| {
                if item.product_name.trim().is_empty() {
                    return Err(RoutingError::validation("productName must not be blank"));
                }
                if item.quantity == 0 {
                    return Err(RoutingError::validation(format!(
                        "quantity must be positive for {}",
                        item.product_name
                    )));
                }
                if item.price.is_negative() {
                    return Err(RoutingError::validation(format!(
                        "price must not be negative for {}",
                        item.product_name
                    )));
                }
                Ok(OrderLine::new(item.product_name, item.quantity, item.price))
            })
            .collect::<RoutingResult<Vec<_>>>()?;

        Order::new(self.user_id, lines)
    }
}

// ============================================================================
// Responses
// ============================================================================

/// 주문 생성 응답
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceOrderResponse {
    pub message: String,
    pub order_id: i64,
    pub total_amount: Money,
    pub replication_id: ReplicationToken,
    pub routed_to: String,
}

/// 주문 요약
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderSummary {
    pub id: i64,
    pub status: OrderStatus,
    pub total_amount: Money,
    pub created_at: Option<DateTime<Utc>>,
}

/// 주문 내역 응답
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderHistoryResponse {
    pub user_id: i64,
    pub order_count: usize,
    pub orders: Vec<OrderSummary>,
    pub routed_to: String,
}

/// 복제 확인 응답
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplicationCheckResponse {
    pub replication_id: ReplicationToken,
    pub reached: bool,
    pub message: String,
}

// ============================================================================
// OrderApi
// ============================================================================

/// 주문 API
#[derive(Debug, Clone)]
pub struct OrderApi {
    service: OrderService,
}

impl OrderApi {
    pub fn new(service: OrderService) -> Self {
        Self { service }
    }

    pub fn service(&self) -> &OrderService {
        &self.service
    }

    /// PlaceOrder(userId, lines[]) → {orderId, totalAmount, replicationId}
    pub async fn place_order(&self, request: PlaceOrderRequest) -> RoutingResult<PlaceOrderResponse> {
        let order = request.into_order()?;
        let placed = self.service.place_order(order).await?;

        let order_id = placed
            .order
            .id
            .ok_or_else(|| RoutingError::internal("saved order has no id"))?;

        Ok(PlaceOrderResponse {
            message: "Order saved on the source; it will be replicated to the replica".to_string(),
            order_id,
            total_amount: placed.order.total_amount,
            replication_id: placed.record.token,
            routed_to: self.describe(placed.routed_to),
        })
    }

    /// GetOrderHistory(userId) → {orders[]}
    pub async fn get_order_history(&self, user_id: i64) -> RoutingResult<OrderHistoryResponse> {
        let history = self.service.get_order_history(user_id).await?;

        let orders = history
            .orders
            .iter()
            .map(|order| {
                Ok(OrderSummary {
                    id: order
                        .id
                        .ok_or_else(|| RoutingError::internal("stored order has no id"))?,
                    status: order.status,
                    total_amount: order.total_amount,
                    created_at: order.created_at,
                })
            })
            .collect::<RoutingResult<Vec<_>>>()?;

        Ok(OrderHistoryResponse {
            user_id: history.user_id,
            order_count: orders.len(),
            orders,
            routed_to: self.describe(history.routed_to),
        })
    }

    /// CheckReplication(replicationId) → {reached}
    pub async fn check_replication(&self, replication_id: &str) -> RoutingResult<ReplicationCheckResponse> {
        let token: ReplicationToken = replication_id.parse()?;
        let reached = self.service.check_replication(&token).await?;

        let message = if reached {
            "Replicated to the replica"
        } else {
            "Not yet on the replica (replication lag)"
        };

        Ok(ReplicationCheckResponse {
            replication_id: token,
            reached,
            message: message.to_string(),
        })
    }

    /// "SOURCE DB (host:port)" 형식
    fn describe(&self, endpoint: Endpoint) -> String {
        let config = self.service.data_source().config().endpoint(endpoint);
        format!("{} ({})", endpoint.display_name(), config.address)
    }
}
