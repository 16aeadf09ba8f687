//! Order Workflow
//!
//! 라우팅 코어를 사용하는 주문 업무 로직
//!
//! - 쓰기: `place_order` → Primary, 주문 + 항목 + 복제 로그를 하나의 유닛 오브 워크로 커밋
//! - 읽기: `get_order_history` → Replica
//! - 확인: `check_replication` → Replica에 토큰이 보이는지

pub mod api;
mod model;
mod repository;
mod service;

pub use api::{
    OrderApi, OrderHistoryResponse, OrderItemRequest, OrderSummary, PlaceOrderRequest,
    PlaceOrderResponse, ReplicationCheckResponse,
};
pub use model::{Money, Order, OrderLine, OrderStatus};
pub use repository::{OrderRepository, ORDERS_TABLE, ORDER_ITEMS_TABLE};
pub use service::{OrderHistory, OrderService, PlacedOrder};
