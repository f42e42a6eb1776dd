//! Filtered, live view of the synchronized collection

use chrono::{DateTime, Utc};
use shared::Order;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use super::channel::Inner;
use super::snapshot::{Staleness, SyncHealth, SyncSnapshot};
use super::worker::Command;

pub(crate) type OrderFilter = Arc<dyn Fn(&Order) -> bool + Send + Sync>;

/// Projection handed to a view
#[derive(Debug, Clone)]
pub struct OrderView {
    pub orders: Vec<Order>,
    pub revision: u64,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub health: SyncHealth,
}

impl OrderView {
    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }
}

/// A view's handle on the channel; unsubscribes on drop
pub struct Subscription {
    inner: Arc<Inner>,
    rx: tokio::sync::watch::Receiver<Arc<SyncSnapshot>>,
    filter: OrderFilter,
}

impl Subscription {
    pub(crate) fn new(inner: Arc<Inner>, filter: OrderFilter) -> Self {
        let mut rx = inner.snapshots.clone();
        rx.mark_changed();
        Self { inner, rx, filter }
    }

    /// Current filtered orders
    pub fn current(&self) -> OrderView {
        let snapshot = self.rx.borrow().clone();
        self.project(&snapshot)
    }

    /// Wait for the next published snapshot.
    ///
    /// Resolves immediately the first time. Returns None once the channel
    /// has shut down.
    pub async fn changed(&mut self) -> Option<OrderView> {
        self.rx.changed().await.ok()?;
        let snapshot = self.rx.borrow_and_update().clone();
        Some(self.project(&snapshot))
    }

    pub fn staleness(&self) -> Staleness {
        self.rx.borrow().staleness()
    }

    /// Explicit form of dropping the subscription
    pub fn unsubscribe(self) {}

    fn project(&self, snapshot: &SyncSnapshot) -> OrderView {
        OrderView {
            orders: snapshot
                .orders
                .iter()
                .filter(|o| (self.filter)(o))
                .cloned()
                .collect(),
            revision: snapshot.revision,
            last_synced_at: snapshot.last_synced_at,
            health: snapshot.health.clone(),
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("revision", &self.rx.borrow().revision)
            .finish_non_exhaustive()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if self.inner.subscribers.fetch_sub(1, Ordering::SeqCst) == 1 {
            let _ = self.inner.commands.send(Command::Reconcile);
        }
    }
}
