//! Order domain
//!
//! - Entity: [`Order`] and its lines, immutable-by-default
//! - Status: the transition table and per-role display metadata
//! - Event: push notifications from the backend

pub mod event;
pub mod status;
pub mod types;

// Re-exports
pub use event::{OrderPushEvent, PushTopic};
pub use status::{OrderStatus, StaffRole, StatusDisplay};
pub use types::{NewOrder, Order, OrderId, OrderLine};
