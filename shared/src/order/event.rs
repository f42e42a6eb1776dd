//! Push notifications delivered by the backend's order channel
//!
//! Events only say *what* changed; clients refetch to learn the new state.

use super::types::OrderId;
use serde::{Deserialize, Serialize};

/// Push topic
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum PushTopic {
    /// Kitchen marked an order ready; servers should pick it up
    #[serde(rename = "order.ready_for_service")]
    ReadyForService,
    /// Lines or totals of a bill changed
    #[serde(rename = "order.bill_updated")]
    BillUpdated,
    #[serde(rename = "order.created")]
    OrderCreated,
    #[serde(rename = "order.status_changed")]
    StatusChanged,
    /// Topic this client does not know; still means "something changed"
    #[serde(other)]
    Other,
}

impl std::fmt::Display for PushTopic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PushTopic::ReadyForService => "order.ready_for_service",
            PushTopic::BillUpdated => "order.bill_updated",
            PushTopic::OrderCreated => "order.created",
            PushTopic::StatusChanged => "order.status_changed",
            PushTopic::Other => "other",
        };
        f.write_str(name)
    }
}

/// One push frame
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OrderPushEvent {
    pub topic: PushTopic,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_id: Option<OrderId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_number: Option<i32>,
    /// Server timestamp (Unix milliseconds)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sent_at: Option<i64>,
}

impl OrderPushEvent {
    pub fn new(topic: PushTopic) -> Self {
        Self {
            topic,
            order_id: None,
            table_number: None,
            sent_at: None,
        }
    }

    pub fn ready_for_service(order_id: OrderId) -> Self {
        Self::new(PushTopic::ReadyForService).with_order(order_id)
    }

    pub fn bill_updated(order_id: OrderId) -> Self {
        Self::new(PushTopic::BillUpdated).with_order(order_id)
    }

    pub fn with_order(mut self, order_id: OrderId) -> Self {
        self.order_id = Some(order_id);
        self
    }

    pub fn with_table(mut self, table_number: i32) -> Self {
        self.table_number = Some(table_number);
        self
    }

    pub fn with_sent_at(mut self, sent_at: i64) -> Self {
        self.sent_at = Some(sent_at);
        self
    }
}
