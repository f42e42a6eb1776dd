//! What views observe

use chrono::{DateTime, Utc};
use shared::{Order, OrderId};
use std::sync::Arc;

/// Health of background synchronization
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncHealth {
    /// Pull failures since the last successful pull
    pub consecutive_failures: u32,
    pub last_error: Option<String>,
    pub push_connected: bool,
    /// Backend answered 401/403; background sync is paused until renewal
    pub session_expired: bool,
}

/// Immutable view of the synchronized collection
///
/// Published as a whole; readers never see a partial update.
#[derive(Debug, Clone, Default)]
pub struct SyncSnapshot {
    /// Bumped whenever the order collection changes
    pub revision: u64,
    /// Last pull cycle applied
    pub cycle: u64,
    /// Sorted by creation time, then id
    pub orders: Arc<Vec<Order>>,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub health: SyncHealth,
}

impl SyncSnapshot {
    pub fn get(&self, id: OrderId) -> Option<&Order> {
        self.orders.iter().find(|o| o.id == id)
    }

    pub fn staleness(&self) -> Staleness {
        Staleness {
            last_synced_at: self.last_synced_at,
            consecutive_failures: self.health.consecutive_failures,
            last_error: self.health.last_error.clone(),
            push_connected: self.health.push_connected,
            session_expired: self.health.session_expired,
        }
    }
}

/// Staleness indicator exposed to views
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Staleness {
    /// Completion time of the last successful pull
    pub last_synced_at: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
    pub last_error: Option<String>,
    pub push_connected: bool,
    pub session_expired: bool,
}

impl Staleness {
    /// Time since the last successful pull; grows while pulls keep failing
    pub fn age(&self) -> Option<chrono::Duration> {
        self.last_synced_at.map(|at| Utc::now() - at)
    }

    /// Never synced, or older than `threshold`
    pub fn is_stale(&self, threshold: chrono::Duration) -> bool {
        self.age().is_none_or(|age| age > threshold)
    }

    pub fn is_degraded(&self) -> bool {
        self.session_expired || self.consecutive_failures > 0
    }
}
