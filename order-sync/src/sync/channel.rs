//! SyncChannel: the handle role views hold
//!
//! Cheap to clone. Background pull/push runs while at least one
//! [`Subscription`] is alive; the worker itself lives until the last handle
//! (channel or subscription) is dropped.

use shared::{NewOrder, Order, OrderId, OrderStatus, StaffRole};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;

use super::snapshot::{Staleness, SyncSnapshot};
use super::subscription::{OrderFilter, Subscription};
use super::worker::{Command, SyncWorker};
use crate::api::OrderApi;
use crate::config::SyncConfig;
use crate::error::{ClientResult, CommandError};
use crate::http::HttpClient;
use crate::push::{PushConnector, WsPushConnector};
use crate::session::Session;
use crate::views::RoleView;

pub(crate) struct Inner {
    pub(crate) commands: mpsc::UnboundedSender<Command>,
    pub(crate) snapshots: watch::Receiver<Arc<SyncSnapshot>>,
    pub(crate) subscribers: Arc<AtomicUsize>,
    session: Session,
    shutdown: CancellationToken,
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Shared, serialized view of the active orders
#[derive(Clone)]
pub struct SyncChannel {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for SyncChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncChannel")
            .field("subscribers", &self.subscriber_count())
            .field("revision", &self.snapshot().revision)
            .finish()
    }
}

impl SyncChannel {
    /// Start building a channel over `api`
    pub fn builder(api: impl OrderApi) -> SyncChannelBuilder {
        SyncChannelBuilder {
            api: Arc::new(api),
            push: None,
            config: SyncConfig::default(),
            session: None,
        }
    }

    /// HTTP + WebSocket channel from configuration; must run inside a tokio runtime
    pub fn connect(config: &SyncConfig) -> ClientResult<Self> {
        let session = Session::new(config.token.clone());
        let http = HttpClient::with_session(config, session.clone())?;
        let push = WsPushConnector::new(config.resolved_push_url(), session.clone());
        Ok(Self::builder(http)
            .push(push)
            .config(config.clone())
            .session(session)
            .spawn())
    }

    /// Subscribe to the orders matching `filter`.
    ///
    /// The first subscription starts background sync; dropping the last one
    /// stops it.
    pub fn subscribe<F>(&self, filter: F) -> Subscription
    where
        F: Fn(&Order) -> bool + Send + Sync + 'static,
    {
        self.subscribe_with(Arc::new(filter))
    }

    /// Subscribe to every order
    pub fn subscribe_all(&self) -> Subscription {
        self.subscribe(|_| true)
    }

    pub(crate) fn subscribe_with(&self, filter: OrderFilter) -> Subscription {
        if self.inner.subscribers.fetch_add(1, Ordering::SeqCst) == 0 {
            let _ = self.inner.commands.send(Command::Reconcile);
        }
        Subscription::new(Arc::clone(&self.inner), filter)
    }

    /// Role-scoped projection and commands
    pub fn role_view(&self, role: StaffRole) -> RoleView {
        RoleView::new(self.clone(), role)
    }

    /// Move an order to `next`.
    ///
    /// Validated against the transition table before any network call; the
    /// local collection changes only once the backend confirms.
    pub async fn advance_status(
        &self,
        order_id: OrderId,
        next: OrderStatus,
    ) -> Result<Order, CommandError> {
        self.send_advance(order_id, next, None).await
    }

    /// Same as [`advance_status`](Self::advance_status), also checking `role`'s permission
    pub async fn advance_status_as(
        &self,
        role: StaffRole,
        order_id: OrderId,
        next: OrderStatus,
    ) -> Result<Order, CommandError> {
        self.send_advance(order_id, next, Some(role)).await
    }

    async fn send_advance(
        &self,
        order_id: OrderId,
        next: OrderStatus,
        role: Option<StaffRole>,
    ) -> Result<Order, CommandError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Advance {
            order_id,
            next,
            role,
            reply,
        })?;
        rx.await.map_err(|_| CommandError::Closed)?
    }

    /// Create an order (POS); it joins the collection once the backend confirms
    pub async fn create_order(&self, order: NewOrder) -> Result<Order, CommandError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Create { order, reply })?;
        rx.await.map_err(|_| CommandError::Closed)?
    }

    /// Request an immediate pull (collapses with one already in flight)
    pub fn refresh(&self) {
        let _ = self.inner.commands.send(Command::Refresh);
    }

    /// Replace the token after a session expiry and resume background sync
    pub fn renew_session(&self, token: impl Into<String>) {
        self.inner.session.set_token(token);
        let _ = self.inner.commands.send(Command::SessionRenewed);
    }

    pub fn session(&self) -> &Session {
        &self.inner.session
    }

    /// Latest published snapshot
    pub fn snapshot(&self) -> Arc<SyncSnapshot> {
        self.inner.snapshots.borrow().clone()
    }

    /// Staleness indicator: last successful sync and current health
    pub fn staleness(&self) -> Staleness {
        self.inner.snapshots.borrow().staleness()
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.load(Ordering::SeqCst)
    }

    /// Stop the worker; pending commands resolve to `CommandError::Closed`
    pub fn shutdown(&self) {
        self.inner.shutdown.cancel();
    }

    fn send(&self, cmd: Command) -> Result<(), CommandError> {
        self.inner
            .commands
            .send(cmd)
            .map_err(|_| CommandError::Closed)
    }
}

/// Builder for [`SyncChannel`]
pub struct SyncChannelBuilder {
    api: Arc<dyn OrderApi>,
    push: Option<Arc<dyn PushConnector>>,
    config: SyncConfig,
    session: Option<Session>,
}

impl SyncChannelBuilder {
    /// Attach a push connector; without one the channel only polls
    pub fn push(mut self, connector: impl PushConnector) -> Self {
        self.push = Some(Arc::new(connector));
        self
    }

    pub fn config(mut self, config: SyncConfig) -> Self {
        self.config = config;
        self
    }

    /// Session shared with the API and push connector, for `renew_session`
    pub fn session(mut self, session: Session) -> Self {
        self.session = Some(session);
        self
    }

    /// Spawn the worker on the current tokio runtime
    pub fn spawn(self) -> SyncChannel {
        let session = self
            .session
            .unwrap_or_else(|| Session::new(self.config.token.clone()));
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (snapshots_tx, snapshots_rx) = watch::channel(Arc::new(SyncSnapshot::default()));
        let subscribers = Arc::new(AtomicUsize::new(0));
        let shutdown = CancellationToken::new();

        let worker = SyncWorker::new(
            self.api,
            self.push,
            self.config,
            snapshots_tx,
            commands_rx,
            Arc::clone(&subscribers),
            shutdown.clone(),
        );
        tokio::spawn(worker.run());

        SyncChannel {
            inner: Arc::new(Inner {
                commands: commands_tx,
                snapshots: snapshots_rx,
                subscribers,
                session,
                shutdown,
            }),
        }
    }
}
