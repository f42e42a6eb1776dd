//! Order Sync - shared order collection for POS role views
//!
//! Reconciles periodic REST pulls and WebSocket push events into one
//! consistent, monotonically fresher collection of orders, and funnels every
//! status change through the transition table before it reaches the backend.

pub mod api;
pub mod config;
pub mod error;
pub mod http;
pub mod logger;
pub mod push;
pub mod session;
pub mod sync;
pub mod views;

pub use api::OrderApi;
pub use config::SyncConfig;
pub use error::{ClientError, ClientResult, CommandError};
pub use http::HttpClient;
pub use push::{MemoryPushConnector, PushConnector, PushSignal, WsPushConnector};
pub use session::Session;
pub use sync::{
    OrderView, Staleness, Subscription, SyncChannel, SyncChannelBuilder, SyncHealth, SyncSnapshot,
};
pub use views::{BoardCard, RoleView};

// Re-export shared types for convenience
pub use shared::{
    NewOrder, Order, OrderError, OrderId, OrderLine, OrderPushEvent, OrderStatus, PushTopic,
    StaffRole, StatusDisplay,
};
