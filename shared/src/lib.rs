//! Shared types for the order sync workspace
//!
//! Order entity, status lifecycle, push events and REST DTOs. No I/O.

pub mod client;
pub mod error;
pub mod order;
pub mod util;

// Re-exports
pub use error::OrderError;
pub use order::{
    NewOrder, Order, OrderId, OrderLine, OrderPushEvent, OrderStatus, PushTopic, StaffRole,
    StatusDisplay,
};
