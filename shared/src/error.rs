//! Domain errors for order values
//!
//! These are raised locally, before any network effect.

use crate::order::{OrderStatus, StaffRole};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
    /// Requested status is not reachable from the current one
    #[error("invalid transition: {from} -> {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    /// Transition exists but this role may not perform it
    #[error("role {role} may not move an order from {from} to {to}")]
    RoleNotPermitted {
        role: StaffRole,
        from: OrderStatus,
        to: OrderStatus,
    },

    /// Order line failed validation
    #[error("invalid order line: {0}")]
    InvalidLine(String),

    #[error("unknown order status: {0}")]
    UnknownStatus(String),

    #[error("unknown staff role: {0}")]
    UnknownRole(String),
}

impl OrderError {
    /// Both table and role rejections count as an invalid transition for views
    pub fn is_invalid_transition(&self) -> bool {
        matches!(
            self,
            OrderError::InvalidTransition { .. } | OrderError::RoleNotPermitted { .. }
        )
    }
}
