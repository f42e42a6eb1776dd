//! Role views
//!
//! Kitchen, server and cashier boards are read-only projections over the
//! shared collection. They change orders only through
//! [`RoleView::advance_status`], which enforces the role's permissions.

use serde::Serialize;
use shared::{Order, OrderId, OrderStatus, StaffRole, StatusDisplay};
use std::sync::Arc;

use crate::error::CommandError;
use crate::sync::{OrderView, Subscription, SyncChannel};

#[derive(Debug, Clone)]
pub struct RoleView {
    channel: SyncChannel,
    role: StaffRole,
}

impl RoleView {
    pub(crate) fn new(channel: SyncChannel, role: StaffRole) -> Self {
        Self { channel, role }
    }

    pub fn role(&self) -> StaffRole {
        self.role
    }

    /// Subscribe to the statuses this role's board shows
    pub fn subscribe(&self) -> Subscription {
        let role = self.role;
        self.channel
            .subscribe_with(Arc::new(move |o: &Order| role.visible_statuses().contains(&o.status)))
    }

    /// Move an order, if this role is allowed to
    pub async fn advance_status(
        &self,
        order_id: OrderId,
        next: OrderStatus,
    ) -> Result<Order, CommandError> {
        self.channel.advance_status_as(self.role, order_id, next).await
    }

    /// Transitions this role can offer for `order` (its action buttons)
    pub fn actions(&self, order: &Order) -> Vec<OrderStatus> {
        order
            .status
            .allowed_transitions()
            .iter()
            .copied()
            .filter(|next| self.role.may_transition(order.status, *next))
            .collect()
    }

    pub fn display(&self, status: OrderStatus) -> StatusDisplay {
        status.display(self.role)
    }

    /// Render-ready cards, urgent ones first, then oldest first
    pub fn cards(&self, view: &OrderView) -> Vec<BoardCard> {
        let mut cards: Vec<BoardCard> = view
            .orders
            .iter()
            .map(|order| BoardCard {
                order_id: order.id,
                table_number: order.table_number,
                status: order.status,
                display: self.display(order.status),
                actions: self.actions(order),
                item_count: order.item_count(),
                total: order.total(),
                created_at: order.created_at,
            })
            .collect();
        cards.sort_by_key(|c| (!c.display.urgent, c.created_at, c.order_id));
        cards
    }

    pub fn channel(&self) -> &SyncChannel {
        &self.channel
    }
}

/// One order as a board shows it
#[derive(Debug, Clone, Serialize)]
pub struct BoardCard {
    pub order_id: OrderId,
    pub table_number: Option<i32>,
    pub status: OrderStatus,
    pub display: StatusDisplay,
    pub actions: Vec<OrderStatus>,
    pub item_count: u32,
    pub total: f64,
    pub created_at: i64,
}
