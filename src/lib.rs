//! # Replica Router
//!
//! Intent-based routing between a primary (source) database and a read replica,
//! with a replication-progress check that tells callers when a write has become
//! visible on the replica.
//!
//! ## Features
//!
//! - **Intent routing** - read-only units of work go to the replica, everything else to the primary
//! - **Deferred acquisition** - the connection is claimed on first use, after intent is final
//! - **Replication tokens** - every write unit of work logs one token, checked later against the replica
//! - **Connection pooling** - one bounded pool per endpoint, no fallback between endpoints
//! - **Async/Await** - built on Tokio
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use replica_router::backend::memory::MemoryCluster;
//! use replica_router::orders::{OrderApi, OrderItemRequest, OrderService, PlaceOrderRequest};
//! use replica_router::routing::{RoutingConfig, RoutingDataSource};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // In-process primary + replica with 200ms replication lag
//!     let cluster = MemoryCluster::start(Duration::from_millis(200))?;
//!     let data_source = RoutingDataSource::new(RoutingConfig::default(), Arc::new(cluster))?;
//!     let api = OrderApi::new(OrderService::new(Arc::new(data_source)));
//!
//!     // Write path -> primary
//!     let placed = api
//!         .place_order(PlaceOrderRequest {
//!             user_id: 1,
//!             items: vec![OrderItemRequest {
//!                 product_name: "widget".to_string(),
//!                 quantity: 2,
//!                 price: "9.99".parse()?,
//!             }],
//!         })
//!         .await?;
//!
//!     // Replication check -> replica
//!     let check = api.check_replication(&placed.replication_id.to_string()).await?;
//!     println!("{}: {}", check.replication_id, check.message);
//!
//!     // Read path -> replica
//!     let history = api.get_order_history(1).await?;
//!     println!("{} orders via {}", history.order_count, history.routed_to);
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Units of Work
//!
//! ```ignore
//! let mut uow = data_source.begin();            // no connection yet
//! uow.declare(UnitOfWorkIntent::ReadOnly);      // intent may still change
//! uow.execute(select.into()).await?;            // routed to the replica and bound
//! uow.commit().await?;
//! ```
//!
//! ## Modules
//!
//! - [`routing`] - Router, intent context, pools, units of work, replication tracker
//! - [`backend`] - Connection traits, statement model, in-memory primary/replica pair
//! - [`orders`] - Order workflow built on the routing core
//!

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod backend;
pub mod orders;
pub mod routing;

// Re-exports for convenience
pub use routing::{
    Endpoint, EndpointConfig, EventKind, ReplicationRecord, ReplicationToken, ReplicationTracker,
    Router, RoutingConfig, RoutingDataSource, RoutingDecision, RoutingError, RoutingResult,
    UnitOfWork, UnitOfWorkIntent,
};
