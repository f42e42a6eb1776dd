//! Order collection owned by the sync worker
//!
//! Pure state, no I/O. Every pull is numbered by [`OrderStore::begin_pull`];
//! a result is applied only if its cycle is newer than anything applied so
//! far and not older than the last local write barrier. That keeps the
//! published collection from ever going back in time when a slow pull
//! resolves after fresher data.

use chrono::{DateTime, Utc};
use shared::{Order, OrderId};
use std::collections::BTreeMap;
use std::sync::Arc;

use super::snapshot::{SyncHealth, SyncSnapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullOutcome {
    /// Applied; `changed` is false when the backend returned what we had
    Applied { changed: bool },
    /// Older than data already shown
    Discarded,
}

#[derive(Debug, Default)]
pub struct OrderStore {
    orders: BTreeMap<OrderId, Order>,
    sorted: Arc<Vec<Order>>,
    /// Last cycle handed out by `begin_pull`
    issued_cycle: u64,
    /// Last cycle applied
    applied_cycle: u64,
    /// Pulls numbered below this started before a local write
    min_valid_cycle: u64,
    revision: u64,
    /// Optimistic values awaiting the backend; pulls do not override them
    pinned: BTreeMap<OrderId, Order>,
    last_synced_at: Option<DateTime<Utc>>,
    health: SyncHealth,
}

impl OrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number the next pull
    pub fn begin_pull(&mut self) -> u64 {
        self.issued_cycle += 1;
        self.issued_cycle
    }

    /// Invalidate every pull issued so far.
    ///
    /// Called after a confirmed local write: those pulls may have read the
    /// backend before the write landed.
    pub fn write_barrier(&mut self) {
        self.min_valid_cycle = self.issued_cycle + 1;
    }

    pub fn issued_cycle(&self) -> u64 {
        self.issued_cycle
    }

    pub fn apply_pull(&mut self, cycle: u64, orders: Vec<Order>, at: DateTime<Utc>) -> PullOutcome {
        if cycle <= self.applied_cycle || cycle < self.min_valid_cycle {
            return PullOutcome::Discarded;
        }

        self.applied_cycle = cycle;
        self.last_synced_at = Some(self.last_synced_at.map_or(at, |prev| prev.max(at)));
        self.health.consecutive_failures = 0;
        self.health.last_error = None;

        let mut fresh: BTreeMap<OrderId, Order> = orders.into_iter().map(|o| (o.id, o)).collect();
        for (id, pinned) in &self.pinned {
            if let Some(slot) = fresh.get_mut(id) {
                *slot = pinned.clone();
            }
        }
        if fresh == self.orders {
            return PullOutcome::Applied { changed: false };
        }
        self.orders = fresh;
        self.bump();
        PullOutcome::Applied { changed: true }
    }

    /// Record a failed pull; the collection is left untouched
    pub fn record_failure(&mut self, error: impl std::fmt::Display) {
        self.health.consecutive_failures = self.health.consecutive_failures.saturating_add(1);
        self.health.last_error = Some(error.to_string());
    }

    /// Replace (or insert) one order; returns whether anything changed
    pub fn upsert(&mut self, order: Order) -> bool {
        if self.orders.get(&order.id) == Some(&order) {
            return false;
        }
        self.orders.insert(order.id, order);
        self.bump();
        true
    }

    /// Show `order` before the backend confirms it
    ///
    /// Pulls issued so far are invalidated, and later pulls keep the pinned
    /// value until [`OrderStore::settle_optimistic`].
    pub fn apply_optimistic(&mut self, order: Order) -> bool {
        self.write_barrier();
        self.pinned.insert(order.id, order.clone());
        self.upsert(order)
    }

    /// The command behind an optimistic value completed; unpin it
    pub fn settle_optimistic(&mut self, id: OrderId) -> Option<Order> {
        self.pinned.remove(&id)
    }

    /// Apply a backend-confirmed write sent when `sent_cycle` was the last issued pull.
    ///
    /// If a pull issued after the command went out has already been applied,
    /// the shown value may be fresher than the reply. The reply then wins only
    /// if its `updated_at` is not older than the shown one. Returns whether
    /// the collection changed.
    pub fn confirm(&mut self, order: Order, sent_cycle: u64) -> bool {
        self.write_barrier();
        if self.applied_cycle > sent_cycle {
            let shown = self.orders.get(&order.id).and_then(|o| o.updated_at);
            let newer = match (order.updated_at, shown) {
                (Some(reply), Some(shown)) => reply >= shown,
                (Some(_), None) => true,
                (None, _) => false,
            };
            if !newer {
                return false;
            }
        }
        self.upsert(order)
    }

    /// Undo an optimistic write, unless something fresher already replaced it
    pub fn rollback(&mut self, applied: &Order, prior: Order) -> bool {
        if self.orders.get(&applied.id) != Some(applied) {
            return false;
        }
        self.upsert(prior)
    }

    pub fn get(&self, id: OrderId) -> Option<&Order> {
        self.orders.get(&id)
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    pub fn applied_cycle(&self) -> u64 {
        self.applied_cycle
    }

    pub fn set_push_connected(&mut self, connected: bool) {
        self.health.push_connected = connected;
    }

    pub fn set_session_expired(&mut self, expired: bool) {
        self.health.session_expired = expired;
    }

    pub fn session_expired(&self) -> bool {
        self.health.session_expired
    }

    pub fn snapshot(&self) -> SyncSnapshot {
        SyncSnapshot {
            revision: self.revision,
            cycle: self.applied_cycle,
            orders: Arc::clone(&self.sorted),
            last_synced_at: self.last_synced_at,
            health: self.health.clone(),
        }
    }

    fn bump(&mut self) {
        self.revision += 1;
        let mut sorted: Vec<Order> = self.orders.values().cloned().collect();
        sorted.sort_by_key(|o| (o.created_at, o.id));
        self.sorted = Arc::new(sorted);
    }
}
