//! SyncWorker: the single writer of the order collection
//!
//! 1. Scheduled pull every `poll_interval` while at least one view is subscribed
//! 2. Push session (reconnect with backoff), each event requests a pull
//! 3. At most one pull in flight; triggers during a pull collapse into one follow-up
//! 4. Commands validated against the transition table before any network call
//! 5. Local state changes only after the backend confirms (or optimistic + rollback)
//!
//! Network calls run in spawned tasks and report back through `internal`, so
//! the loop never awaits I/O and every write is applied here, in order.

use chrono::Utc;
use shared::{NewOrder, Order, OrderId, OrderStatus, StaffRole};
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::snapshot::SyncSnapshot;
use super::store::{OrderStore, PullOutcome};
use crate::api::OrderApi;
use crate::config::SyncConfig;
use crate::error::{ClientError, ClientResult, CommandError};
use crate::push::{Backoff, PushConnector, PushSignal, run_push_loop};

pub(crate) type Reply<T> = oneshot::Sender<Result<T, CommandError>>;

/// Requests from channel handles
pub(crate) enum Command {
    Advance {
        order_id: OrderId,
        next: OrderStatus,
        role: Option<StaffRole>,
        reply: Reply<Order>,
    },
    Create {
        order: NewOrder,
        reply: Reply<Order>,
    },
    Refresh,
    /// Subscriber count changed; start or stop background activity
    Reconcile,
    /// Token was replaced after an auth failure
    SessionRenewed,
}

/// Results of spawned network calls
enum Internal {
    PullDone {
        cycle: u64,
        result: ClientResult<Vec<Order>>,
    },
    StatusDone {
        order_id: OrderId,
        /// Last pull cycle issued when the command went out
        sent_cycle: u64,
        prior: Order,
        optimistic: Option<Order>,
        result: ClientResult<Order>,
        reply: Reply<Order>,
    },
    Created {
        sent_cycle: u64,
        result: ClientResult<Order>,
        reply: Reply<Order>,
    },
}

pub(crate) struct SyncWorker {
    api: Arc<dyn OrderApi>,
    push: Option<Arc<dyn PushConnector>>,
    config: SyncConfig,
    store: OrderStore,
    snapshots: watch::Sender<Arc<SyncSnapshot>>,
    commands: mpsc::UnboundedReceiver<Command>,
    internal_tx: mpsc::UnboundedSender<Internal>,
    internal_rx: mpsc::UnboundedReceiver<Internal>,
    subscribers: Arc<AtomicUsize>,
    shutdown: CancellationToken,

    // Background activity, present while subscribed
    ticker: Option<Interval>,
    push_rx: Option<mpsc::UnboundedReceiver<PushSignal>>,
    push_cancel: Option<CancellationToken>,

    pull_in_flight: bool,
    follow_up: bool,
    /// Orders with a status command awaiting the backend
    busy: HashSet<OrderId>,
}

impl SyncWorker {
    pub(crate) fn new(
        api: Arc<dyn OrderApi>,
        push: Option<Arc<dyn PushConnector>>,
        config: SyncConfig,
        snapshots: watch::Sender<Arc<SyncSnapshot>>,
        commands: mpsc::UnboundedReceiver<Command>,
        subscribers: Arc<AtomicUsize>,
        shutdown: CancellationToken,
    ) -> Self {
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        Self {
            api,
            push,
            config,
            store: OrderStore::new(),
            snapshots,
            commands,
            internal_tx,
            internal_rx,
            subscribers,
            shutdown,
            ticker: None,
            push_rx: None,
            push_cancel: None,
            pull_in_flight: false,
            follow_up: false,
            busy: HashSet::new(),
        }
    }

    /// Main loop; returns when every channel handle is dropped or on shutdown
    pub(crate) async fn run(mut self) {
        tracing::debug!("SyncWorker started");

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,

                cmd = self.commands.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd),
                    None => break,
                },

                Some(msg) = self.internal_rx.recv() => self.handle_internal(msg),

                _ = next_tick(&mut self.ticker) => self.request_pull("scheduled"),

                signal = next_signal(&mut self.push_rx) => match signal {
                    Some(signal) => self.handle_push(signal),
                    None => {
                        // push loop exited (auth rejection)
                        self.push_rx = None;
                        self.push_cancel = None;
                    }
                },
            }
        }

        self.deactivate();
        tracing::debug!("SyncWorker stopped");
    }

    // ========== Commands ==========

    fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Advance {
                order_id,
                next,
                role,
                reply,
            } => self.advance_status(order_id, next, role, reply),
            Command::Create { order, reply } => self.create_order(order, reply),
            Command::Refresh => self.request_pull("refresh"),
            Command::Reconcile => self.reconcile(),
            Command::SessionRenewed => self.renew_session(),
        }
    }

    fn advance_status(
        &mut self,
        order_id: OrderId,
        next: OrderStatus,
        role: Option<StaffRole>,
        reply: Reply<Order>,
    ) {
        let Some(prior) = self.store.get(order_id).cloned() else {
            let _ = reply.send(Err(CommandError::UnknownOrder(order_id)));
            return;
        };

        let validation = match role {
            Some(role) => role.validate_transition(prior.status, next),
            None => prior.status.validate_transition(next),
        };
        if let Err(e) = validation {
            tracing::debug!(order_id, from = %prior.status, to = %next, "Transition rejected locally");
            let _ = reply.send(Err(e.into()));
            return;
        }

        if !self.busy.insert(order_id) {
            let _ = reply.send(Err(CommandError::Busy(order_id)));
            return;
        }

        let optimistic = if self.config.optimistic_updates {
            let updated = Order {
                status: next,
                ..prior.clone()
            };
            self.store.apply_optimistic(updated.clone());
            if self.pull_in_flight {
                self.follow_up = true;
            }
            self.publish();
            Some(updated)
        } else {
            None
        };

        tracing::info!(order_id, from = %prior.status, to = %next, "Advancing order status");
        let sent_cycle = self.store.issued_cycle();
        let api = Arc::clone(&self.api);
        let internal = self.internal_tx.clone();
        let timeout = self.config.request_timeout;
        tokio::spawn(async move {
            let result = with_timeout(timeout, api.update_status(order_id, next)).await;
            let _ = internal.send(Internal::StatusDone {
                order_id,
                sent_cycle,
                prior,
                optimistic,
                result,
                reply,
            });
        });
    }

    fn create_order(&mut self, order: NewOrder, reply: Reply<Order>) {
        if let Err(e) = order.validate() {
            let _ = reply.send(Err(e.into()));
            return;
        }

        let sent_cycle = self.store.issued_cycle();
        let api = Arc::clone(&self.api);
        let internal = self.internal_tx.clone();
        let timeout = self.config.request_timeout;
        tokio::spawn(async move {
            let result = with_timeout(timeout, api.create_order(&order)).await;
            let _ = internal.send(Internal::Created {
                sent_cycle,
                result,
                reply,
            });
        });
    }

    fn reconcile(&mut self) {
        let subscribed = self.subscribers.load(Ordering::SeqCst) > 0;
        let active = self.ticker.is_some();
        if subscribed && !active {
            self.activate();
        } else if !subscribed && active {
            self.deactivate();
        }
    }

    fn renew_session(&mut self) {
        if !self.store.session_expired() {
            return;
        }
        tracing::info!("Session renewed, resuming synchronization");
        self.store.set_session_expired(false);
        self.publish();

        if self.ticker.is_some() {
            self.start_push();
            self.request_pull("session renewed");
        }
    }

    // ========== Activity ==========

    fn activate(&mut self) {
        tracing::info!(
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            "Sync activated"
        );
        // first tick fires immediately: initial pull
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.ticker = Some(ticker);

        if !self.store.session_expired() {
            self.start_push();
        }
    }

    fn deactivate(&mut self) {
        if self.ticker.take().is_some() {
            tracing::info!("Sync deactivated, no subscribers left");
        }
        self.stop_push();
        self.follow_up = false;
        self.publish();
    }

    fn start_push(&mut self) {
        self.stop_push();
        let Some(connector) = self.push.clone() else {
            return;
        };

        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = self.shutdown.child_token();
        tokio::spawn(run_push_loop(
            connector,
            tx,
            Backoff::new(self.config.reconnect_delay, self.config.max_reconnect_delay),
            cancel.clone(),
        ));
        self.push_rx = Some(rx);
        self.push_cancel = Some(cancel);
    }

    fn stop_push(&mut self) {
        if let Some(cancel) = self.push_cancel.take() {
            cancel.cancel();
        }
        self.push_rx = None;
        self.store.set_push_connected(false);
    }

    // ========== Pull ==========

    fn request_pull(&mut self, reason: &'static str) {
        if self.store.session_expired() {
            tracing::debug!(reason, "Pull skipped, session expired");
            return;
        }
        if self.pull_in_flight {
            tracing::trace!(reason, "Pull in flight, follow-up scheduled");
            self.follow_up = true;
            return;
        }
        self.start_pull(reason);
    }

    fn start_pull(&mut self, reason: &'static str) {
        let cycle = self.store.begin_pull();
        self.pull_in_flight = true;
        tracing::debug!(cycle, reason, "Pull started");

        let api = Arc::clone(&self.api);
        let internal = self.internal_tx.clone();
        let timeout = self.config.request_timeout;
        tokio::spawn(async move {
            let result = with_timeout(timeout, api.list_orders()).await;
            let _ = internal.send(Internal::PullDone { cycle, result });
        });
    }

    fn on_pull_done(&mut self, cycle: u64, result: ClientResult<Vec<Order>>) {
        self.pull_in_flight = false;

        match result {
            Ok(orders) => {
                let count = orders.len();
                match self.store.apply_pull(cycle, orders, Utc::now()) {
                    PullOutcome::Applied { changed } => {
                        tracing::debug!(cycle, count, changed, "Pull applied");
                    }
                    PullOutcome::Discarded => {
                        tracing::debug!(cycle, "Pull result older than shown data, discarded");
                    }
                }
            }
            Err(e) if e.is_auth() => self.expire_session(&e),
            Err(e) => {
                self.store.record_failure(&e);
                tracing::warn!(cycle, "Pull failed, keeping last known orders: {e}");
            }
        }
        self.publish();

        if self.follow_up && !self.store.session_expired() {
            self.follow_up = false;
            self.start_pull("follow-up");
        }
    }

    fn expire_session(&mut self, error: &ClientError) {
        self.follow_up = false;
        if self.store.session_expired() {
            return;
        }
        tracing::error!("Session expired, background sync paused: {error}");
        self.store.set_session_expired(true);
        self.store.record_failure(error);
        self.stop_push();
    }

    // ========== Internal results ==========

    fn handle_internal(&mut self, msg: Internal) {
        match msg {
            Internal::PullDone { cycle, result } => self.on_pull_done(cycle, result),
            Internal::StatusDone {
                order_id,
                sent_cycle,
                prior,
                optimistic,
                result,
                reply,
            } => {
                self.busy.remove(&order_id);
                if optimistic.is_some() {
                    self.store.settle_optimistic(order_id);
                }
                match result {
                    Ok(order) => {
                        tracing::info!(order_id, status = %order.status, "Order status confirmed");
                        self.confirm_write(order.clone(), sent_cycle);
                        let _ = reply.send(Ok(order));
                    }
                    Err(e) => {
                        tracing::warn!(order_id, "Order status change failed: {e}");
                        if let Some(applied) = optimistic
                            && self.store.rollback(&applied, prior)
                        {
                            self.publish();
                        }
                        if e.is_auth() {
                            self.expire_session(&e);
                            self.publish();
                        }
                        let _ = reply.send(Err(e.into()));
                    }
                }
            }
            Internal::Created {
                sent_cycle,
                result,
                reply,
            } => match result {
                Ok(order) => {
                    tracing::info!(order_id = order.id, table = ?order.table_number, "Order created");
                    self.confirm_write(order.clone(), sent_cycle);
                    let _ = reply.send(Ok(order));
                }
                Err(e) => {
                    tracing::warn!("Order creation failed: {e}");
                    if e.is_auth() {
                        self.expire_session(&e);
                        self.publish();
                    }
                    let _ = reply.send(Err(e.into()));
                }
            },
        }
    }

    /// Apply a backend-confirmed order, then pull to settle any race with
    /// writes from other terminals
    fn confirm_write(&mut self, order: Order, sent_cycle: u64) {
        let order_id = order.id;
        if !self.store.confirm(order, sent_cycle) {
            tracing::debug!(order_id, sent_cycle, "Confirmation left shown data unchanged");
        }
        self.publish();
        self.request_pull("confirmed write");
    }

    // ========== Push ==========

    fn handle_push(&mut self, signal: PushSignal) {
        match signal {
            PushSignal::Connected => {
                self.store.set_push_connected(true);
                self.publish();
                self.request_pull("push connected");
            }
            PushSignal::Event(event) => {
                tracing::debug!(
                    topic = %event.topic,
                    order_id = ?event.order_id,
                    table = ?event.table_number,
                    known = event.order_id.is_some_and(|id| self.store.get(id).is_some()),
                    "Push event"
                );
                self.request_pull("push event");
            }
            PushSignal::Disconnected { reason } => {
                tracing::info!(%reason, "Push channel disconnected, reconnecting");
                self.store.set_push_connected(false);
                self.publish();
            }
            PushSignal::AuthRejected(e) => {
                self.expire_session(&e);
                self.publish();
            }
        }
    }

    fn publish(&self) {
        self.snapshots.send_replace(Arc::new(self.store.snapshot()));
    }
}

async fn with_timeout<T>(
    timeout: std::time::Duration,
    fut: impl std::future::Future<Output = ClientResult<T>>,
) -> ClientResult<T> {
    tokio::time::timeout(timeout, fut)
        .await
        .unwrap_or(Err(ClientError::Timeout))
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn next_signal(rx: &mut Option<mpsc::UnboundedReceiver<PushSignal>>) -> Option<PushSignal> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
