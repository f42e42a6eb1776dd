//! REST backend seam
//!
//! The sync channel only talks to the backend through [`OrderApi`], so it can
//! run against [`crate::HttpClient`] in production and a fake in tests.

use async_trait::async_trait;
use shared::{NewOrder, Order, OrderId, OrderStatus};
use std::sync::Arc;

use crate::error::ClientResult;

#[async_trait]
pub trait OrderApi: Send + Sync + 'static {
    /// Full order collection
    async fn list_orders(&self) -> ClientResult<Vec<Order>>;

    /// Single order
    async fn get_order(&self, id: OrderId) -> ClientResult<Order>;

    /// Change an order's status; returns the order as stored by the backend
    async fn update_status(&self, id: OrderId, status: OrderStatus) -> ClientResult<Order>;

    /// Create an order (starts as PENDING)
    async fn create_order(&self, order: &NewOrder) -> ClientResult<Order>;
}

#[async_trait]
impl<T: OrderApi + ?Sized> OrderApi for Arc<T> {
    async fn list_orders(&self) -> ClientResult<Vec<Order>> {
        (**self).list_orders().await
    }

    async fn get_order(&self, id: OrderId) -> ClientResult<Order> {
        (**self).get_order(id).await
    }

    async fn update_status(&self, id: OrderId, status: OrderStatus) -> ClientResult<Order> {
        (**self).update_status(id, status).await
    }

    async fn create_order(&self, order: &NewOrder) -> ClientResult<Order> {
        (**self).create_order(order).await
    }
}
