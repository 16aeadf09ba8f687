//! 주문 저장소
//!
//! 호출자가 연 유닛 오브 워크 안에서만 동작합니다. 라우팅은 유닛 오브 워크의 의도가 정합니다.

use crate::backend::{Row, SelectStatement, Statement};
use crate::routing::{RoutingError, RoutingResult, UnitOfWork};

use super::model::{Money, Order, OrderLine, OrderStatus};

/// 주문 테이블
pub const ORDERS_TABLE: &str = "orders";
/// 주문 항목 테이블
pub const ORDER_ITEMS_TABLE: &str = "order_items";

/// 주문 저장소
#[derive(Debug, Clone, Copy, Default)]
pub struct OrderRepository;

impl OrderRepository {
    pub fn new() -> Self {
        Self
    }

    /// 주문과 항목 저장
    ///
    /// 주문 ID를 먼저 받은 뒤 그 ID로 항목의 외래 키를 채웁니다.
    pub async fn save(&self, uow: &mut UnitOfWork, mut order: Order) -> RoutingResult<Order> {
        let created_at = chrono::Utc::now();
        let row = Row::new()
            .with("user_id", order.user_id)
            .with("status", order.status.as_str())
            .with("total_amount", order.total_amount.minor())
            .with("created_at", created_at);

        let order_id = inserted_id(uow.execute(Statement::insert(ORDERS_TABLE, row)).await?.last_insert_id)?;
        order.id = Some(order_id);
        order.created_at = Some(created_at);

        for line in &mut order.lines {
            let row = Row::new()
                .with("order_id", order_id)
                .with("product_name", line.product_name.as_str())
                .with("quantity", line.quantity)
                .with("price", line.price.minor());

            let line_id = inserted_id(uow.execute(Statement::insert(ORDER_ITEMS_TABLE, row)).await?.last_insert_id)?;
            line.id = Some(line_id);
            line.order_id = Some(order_id);
        }

        tracing::debug!(order_id, lines = order.lines.len(), endpoint = ?uow.endpoint(), "order saved");
        Ok(order)
    }

    /// 사용자의 주문 (ID 순)
    pub async fn find_by_user(&self, uow: &mut UnitOfWork, user_id: i64) -> RoutingResult<Vec<Order>> {
        let rows = uow
            .execute(SelectStatement::new(ORDERS_TABLE).where_eq("user_id", user_id).into())
            .await?
            .rows;

        let mut orders = Vec::with_capacity(rows.len());
        for row in &rows {
            let order_id = row.get_int("id")?;
            let lines = uow
                .execute(SelectStatement::new(ORDER_ITEMS_TABLE).where_eq("order_id", order_id).into())
                .await?
                .rows
                .iter()
                .map(line_from_row)
                .collect::<RoutingResult<Vec<_>>>()?;

            orders.push(Order {
                id: Some(order_id),
                user_id: row.get_int("user_id")?,
                status: row.get_str("status")?.parse::<OrderStatus>()?,
                total_amount: Money::from_minor(row.get_int("total_amount")?),
                created_at: row.get_timestamp("created_at")?,
                lines,
            });
        }
        Ok(orders)
    }
}

fn line_from_row(row: &Row) -> RoutingResult<OrderLine> {
    let quantity = row.get_int("quantity")?;
    Ok(OrderLine {
        id: Some(row.get_int("id")?),
        order_id: Some(row.get_int("order_id")?),
        product_name: row.get_str("product_name")?.to_string(),
        quantity: u32::try_from(quantity)
            .map_err(|_| RoutingError::type_conversion(format!("Invalid quantity: {}", quantity)))?,
        price: Money::from_minor(row.get_int("price")?),
    })
}

fn inserted_id(id: Option<i64>) -> RoutingResult<i64> {
    id.ok_or_else(|| RoutingError::internal("insert returned no generated id"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use crate::backend::memory::MemoryCluster;
    use crate::routing::{Endpoint, RoutingConfig, RoutingDataSource, UnitOfWorkIntent};

    fn widget_order(user_id: i64) -> Order {
        Order::new(user_id, vec![OrderLine::new("widget", 2, Money::from_minor(999))]).unwrap()
    }

    #[tokio::test]
    async fn test_save_assigns_ids_and_foreign_keys() {
        let cluster = MemoryCluster::start(Duration::ZERO).unwrap();
        let data_source = RoutingDataSource::new(RoutingConfig::default(), Arc::new(cluster.clone())).unwrap();
        let repository = OrderRepository::new();

        let mut uow = data_source.begin_with(UnitOfWorkIntent::ReadWrite);
        let saved = repository.save(&mut uow, widget_order(1)).await.unwrap();
        uow.commit().await.unwrap();

        let order_id = saved.id.unwrap();
        assert!(saved.created_at.is_some());
        assert_eq!(saved.lines[0].order_id, Some(order_id));
        assert!(saved.lines[0].id.is_some());
        assert_eq!(cluster.row_count(Endpoint::Primary, ORDER_ITEMS_TABLE), 1);
    }

    #[tokio::test]
    async fn test_find_by_user_reads_own_writes() {
        let cluster = MemoryCluster::start(Duration::from_secs(60)).unwrap();
        let data_source = RoutingDataSource::new(RoutingConfig::default(), Arc::new(cluster)).unwrap();
        let repository = OrderRepository::new();

        let mut uow = data_source.begin_with(UnitOfWorkIntent::ReadWrite);
        let saved = repository.save(&mut uow, widget_order(7)).await.unwrap();
        repository.save(&mut uow, widget_order(8)).await.unwrap();

        let found = repository.find_by_user(&mut uow, 7).await.unwrap();
        assert_eq!(found, vec![saved]);
        uow.rollback().await.unwrap();
    }
}
