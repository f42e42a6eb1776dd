//! SyncChannel behaviour against a scripted backend
//!
//! The fake backend counts calls, can hold requests behind a gate and can be
//! switched into failing, hanging or 401 modes.

use async_trait::async_trait;
use order_sync::{
    ClientError, ClientResult, CommandError, MemoryPushConnector, NewOrder, Order, OrderApi,
    OrderError, OrderId, OrderLine, OrderPushEvent, OrderStatus, PushTopic, StaffRole,
    SyncChannel, SyncConfig,
};
use parking_lot::Mutex;
use shared::util::now_millis;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::sleep;

// ========== Fake backend ==========

#[derive(Debug, Clone, Copy, PartialEq)]
enum Mode {
    Ok,
    Fail,
    Hang,
    Unauthorized,
}

/// Holds requests until released
#[derive(Default)]
struct Gate(Mutex<Option<Arc<Semaphore>>>);

impl Gate {
    fn hold(&self) {
        *self.0.lock() = Some(Arc::new(Semaphore::new(0)));
    }

    fn open(&self) {
        if let Some(sem) = self.0.lock().take() {
            sem.close();
        }
    }

    async fn pass(&self) {
        let sem = self.0.lock().clone();
        if let Some(sem) = sem
            && let Ok(permit) = sem.acquire().await
        {
            permit.forget();
        }
    }
}

struct FakeBackend {
    orders: Mutex<BTreeMap<OrderId, Order>>,
    next_id: AtomicI64,
    list_calls: AtomicUsize,
    update_calls: AtomicUsize,
    create_calls: AtomicUsize,
    list_mode: Mutex<Mode>,
    update_mode: Mutex<Mode>,
    list_gate: Gate,
    update_gate: Gate,
    /// Holds status replies after the change is committed
    reply_gate: Gate,
}

impl FakeBackend {
    fn new(orders: Vec<Order>) -> Arc<Self> {
        let next_id = orders.iter().map(|o| o.id).max().unwrap_or(0) + 1;
        Arc::new(Self {
            orders: Mutex::new(orders.into_iter().map(|o| (o.id, o)).collect()),
            next_id: AtomicI64::new(next_id),
            list_calls: AtomicUsize::new(0),
            update_calls: AtomicUsize::new(0),
            create_calls: AtomicUsize::new(0),
            list_mode: Mutex::new(Mode::Ok),
            update_mode: Mutex::new(Mode::Ok),
            list_gate: Gate::default(),
            update_gate: Gate::default(),
            reply_gate: Gate::default(),
        })
    }

    fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    fn update_calls(&self) -> usize {
        self.update_calls.load(Ordering::SeqCst)
    }

    fn set_list_mode(&self, mode: Mode) {
        *self.list_mode.lock() = mode;
    }

    fn set_update_mode(&self, mode: Mode) {
        *self.update_mode.lock() = mode;
    }

    /// Another terminal wrote to the backend
    fn insert(&self, order: Order) {
        self.orders.lock().insert(order.id, order);
    }

    /// Another terminal moved an order on
    fn move_elsewhere(&self, id: OrderId, status: OrderStatus) {
        if let Some(order) = self.orders.lock().get_mut(&id) {
            order.status = status;
            order.updated_at = Some(order.updated_at.map_or_else(now_millis, |t| t + 1));
        }
    }

    fn status_of(&self, id: OrderId) -> Option<OrderStatus> {
        self.orders.lock().get(&id).map(|o| o.status)
    }
}

async fn outcome(mode: Mode) -> ClientResult<()> {
    match mode {
        Mode::Ok => Ok(()),
        Mode::Fail => Err(ClientError::Server {
            status: 503,
            body: "unavailable".into(),
        }),
        Mode::Hang => std::future::pending().await,
        Mode::Unauthorized => Err(ClientError::Unauthorized),
    }
}

#[async_trait]
impl OrderApi for FakeBackend {
    async fn list_orders(&self) -> ClientResult<Vec<Order>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        // read before waiting: a held pull returns what the backend had when it started
        let orders: Vec<Order> = self.orders.lock().values().cloned().collect();
        self.list_gate.pass().await;
        let mode = *self.list_mode.lock();
        outcome(mode).await?;
        Ok(orders)
    }

    async fn get_order(&self, id: OrderId) -> ClientResult<Order> {
        self.orders
            .lock()
            .get(&id)
            .cloned()
            .ok_or_else(|| ClientError::NotFound(format!("order {id}")))
    }

    async fn update_status(&self, id: OrderId, status: OrderStatus) -> ClientResult<Order> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        self.update_gate.pass().await;
        let mode = *self.update_mode.lock();
        outcome(mode).await?;

        let committed = {
            let mut orders = self.orders.lock();
            let order = orders
                .get_mut(&id)
                .ok_or_else(|| ClientError::NotFound(format!("order {id}")))?;
            if !order.status.can_transition_to(status) {
                return Err(ClientError::Validation(format!(
                    "{} -> {} not allowed",
                    order.status, status
                )));
            }
            order.status = status;
            order.updated_at = Some(now_millis());
            order.clone()
        };
        self.reply_gate.pass().await;
        Ok(committed)
    }

    async fn create_order(&self, order: &NewOrder) -> ClientResult<Order> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        let created = Order {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            table_number: order.table_number,
            lines: order.lines.clone(),
            status: OrderStatus::Pending,
            created_at: now_millis(),
            total_amount: None,
            updated_at: None,
        };
        self.insert(created.clone());
        Ok(created)
    }
}

// ========== Helpers ==========

fn order(id: OrderId, table: i32, status: OrderStatus) -> Order {
    Order {
        id,
        table_number: Some(table),
        lines: vec![OrderLine::new(1, "Steak frites", 1, 18.5)],
        status,
        created_at: 1_700_000_000_000 + id,
        total_amount: None,
        updated_at: None,
    }
}

fn config() -> SyncConfig {
    SyncConfig::new("http://backend.invalid")
        .with_poll_interval(Duration::from_secs(3600))
        .with_request_timeout(Duration::from_secs(2))
        .with_reconnect_backoff(Duration::from_millis(10), Duration::from_millis(50))
}

fn spawn(backend: &Arc<FakeBackend>, config: SyncConfig) -> SyncChannel {
    SyncChannel::builder(Arc::clone(backend))
        .config(config)
        .spawn()
}

fn spawn_with_push(
    backend: &Arc<FakeBackend>,
    push: &MemoryPushConnector,
    config: SyncConfig,
) -> SyncChannel {
    SyncChannel::builder(Arc::clone(backend))
        .push(push.clone())
        .config(config)
        .spawn()
}

async fn wait_until(what: &str, mut cond: impl FnMut() -> bool) {
    for _ in 0..400 {
        if cond() {
            return;
        }
        sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for {what}");
}

fn status_in(channel: &SyncChannel, id: OrderId) -> Option<OrderStatus> {
    channel.snapshot().get(id).map(|o| o.status)
}

// ========== Pull / push ==========

#[tokio::test]
async fn test_first_subscription_pulls_and_notifies() {
    let backend = FakeBackend::new(vec![
        order(1, 4, OrderStatus::Pending),
        order(2, 7, OrderStatus::Ready),
    ]);
    let channel = spawn(&backend, config());
    assert_eq!(backend.list_calls(), 0, "no activity without subscribers");

    let mut sub = channel.subscribe_all();
    let mut view = sub.changed().await.expect("channel open");
    while view.len() < 2 {
        view = sub.changed().await.expect("channel open");
    }

    assert_eq!(view.orders[0].id, 1);
    assert_eq!(view.orders[1].id, 2);
    assert!(view.last_synced_at.is_some());
    assert_eq!(backend.list_calls(), 1);
}

#[tokio::test]
async fn test_push_burst_during_pull_collapses_into_one_follow_up() {
    let backend = FakeBackend::new(vec![order(1, 4, OrderStatus::Pending)]);
    let push = MemoryPushConnector::new();
    let channel = spawn_with_push(&backend, &push, config());

    backend.list_gate.hold();
    let _sub = channel.subscribe_all();
    wait_until("initial pull in flight", || backend.list_calls() == 1).await;
    wait_until("push session", || push.session_count() == 1).await;

    for _ in 0..5 {
        assert_eq!(push.publish(OrderPushEvent::ready_for_service(1)), 1);
    }
    sleep(Duration::from_millis(100)).await;
    assert_eq!(backend.list_calls(), 1, "no second pull while one is in flight");

    backend.list_gate.open();
    wait_until("follow-up pull", || backend.list_calls() == 2).await;
    sleep(Duration::from_millis(100)).await;
    assert_eq!(backend.list_calls(), 2, "exactly one follow-up");
    assert!(channel.staleness().push_connected);
}

#[tokio::test]
async fn test_push_for_unknown_order_adds_it() {
    let backend = FakeBackend::new(vec![order(1, 4, OrderStatus::Pending)]);
    let push = MemoryPushConnector::new();
    let channel = spawn_with_push(&backend, &push, config());

    let _sub = channel.subscribe_all();
    wait_until("initial pull", || channel.snapshot().get(1).is_some()).await;
    wait_until("push session", || push.session_count() == 1).await;

    backend.insert(order(99, 12, OrderStatus::Pending));
    push.publish(
        OrderPushEvent::new(PushTopic::OrderCreated)
            .with_order(99)
            .with_table(12),
    );

    wait_until("order 99 pulled", || channel.snapshot().get(99).is_some()).await;
    assert_eq!(channel.snapshot().orders.len(), 2);
}

#[tokio::test]
async fn test_repeated_push_for_unchanged_order_keeps_revision() {
    let backend = FakeBackend::new(vec![order(1, 4, OrderStatus::Ready)]);
    let push = MemoryPushConnector::new();
    let channel = spawn_with_push(&backend, &push, config());

    let _sub = channel.subscribe_all();
    wait_until("push connected", || channel.staleness().push_connected).await;
    wait_until("initial pull", || channel.snapshot().get(1).is_some()).await;
    // connect-triggered pull may still be running
    sleep(Duration::from_millis(50)).await;
    let before = channel.snapshot();
    let calls = backend.list_calls();

    push.publish(OrderPushEvent::ready_for_service(1));
    wait_until("pull after push", || backend.list_calls() > calls).await;
    sleep(Duration::from_millis(50)).await;
    push.publish(OrderPushEvent::ready_for_service(1));
    wait_until("pull after second push", || backend.list_calls() > calls + 1).await;
    sleep(Duration::from_millis(50)).await;

    let after = channel.snapshot();
    assert_eq!(after.revision, before.revision);
    assert_eq!(after.orders, before.orders);
    assert!(after.cycle > before.cycle);
}

#[tokio::test]
async fn test_push_reconnect_triggers_pull() {
    let backend = FakeBackend::new(vec![order(1, 4, OrderStatus::Pending)]);
    let push = MemoryPushConnector::new();
    let channel = spawn_with_push(&backend, &push, config());

    let _sub = channel.subscribe_all();
    wait_until("push connected", || channel.staleness().push_connected).await;
    sleep(Duration::from_millis(50)).await;
    let calls = backend.list_calls();

    // an event lost while disconnected is recovered by the reconnect pull
    backend.insert(order(2, 5, OrderStatus::Pending));
    push.disconnect_all();

    wait_until("reconnected", || push.connect_count() == 2).await;
    wait_until("reconnect pull", || channel.snapshot().get(2).is_some()).await;
    assert!(backend.list_calls() > calls);
}

// ========== Monotonic freshness ==========

#[tokio::test]
async fn test_pull_started_before_confirmed_write_never_reverts_it() {
    let backend = FakeBackend::new(vec![order(1, 4, OrderStatus::Pending)]);
    let channel = spawn(&backend, config());

    let mut sub = channel.subscribe_all();
    wait_until("initial pull", || channel.snapshot().get(1).is_some()).await;

    // pull reads PENDING, then stalls
    backend.list_gate.hold();
    channel.refresh();
    wait_until("stale pull in flight", || backend.list_calls() == 2).await;

    let updated = channel
        .advance_status(1, OrderStatus::Preparing)
        .await
        .expect("backend accepts");
    assert_eq!(updated.status, OrderStatus::Preparing);
    assert_eq!(status_in(&channel, 1), Some(OrderStatus::Preparing));

    // drain the view up to the confirmed write
    loop {
        let view = sub.changed().await.expect("channel open");
        if view.orders[0].status == OrderStatus::Preparing {
            break;
        }
    }

    backend.list_gate.open();
    wait_until("follow-up pull", || backend.list_calls() == 3).await;
    sleep(Duration::from_millis(50)).await;

    assert_eq!(status_in(&channel, 1), Some(OrderStatus::Preparing));
    while let Ok(Some(view)) =
        tokio::time::timeout(Duration::from_millis(20), sub.changed()).await
    {
        assert_eq!(view.orders[0].status, OrderStatus::Preparing);
    }
}

#[tokio::test]
async fn test_late_confirmation_does_not_revert_fresher_pull() {
    let backend = FakeBackend::new(vec![order(1, 4, OrderStatus::Pending)]);
    let channel = spawn(&backend, config());
    let _sub = channel.subscribe_all();
    wait_until("initial pull", || channel.snapshot().get(1).is_some()).await;

    backend.reply_gate.hold();
    let pending = {
        let channel = channel.clone();
        tokio::spawn(async move { channel.advance_status(1, OrderStatus::Preparing).await })
    };
    wait_until("backend committed", || {
        backend.status_of(1) == Some(OrderStatus::Preparing)
    })
    .await;

    // the kitchen finishes on another terminal before our reply arrives
    backend.move_elsewhere(1, OrderStatus::Ready);
    channel.refresh();
    wait_until("pull shows READY", || status_in(&channel, 1) == Some(OrderStatus::Ready)).await;
    let calls = backend.list_calls();

    backend.reply_gate.open();
    let confirmed = pending.await.unwrap().expect("backend accepted");
    assert_eq!(confirmed.status, OrderStatus::Preparing);

    wait_until("pull after confirmation", || backend.list_calls() > calls).await;
    sleep(Duration::from_millis(50)).await;
    assert_eq!(status_in(&channel, 1), Some(OrderStatus::Ready));
}

#[tokio::test]
async fn test_optimistic_value_not_reverted_by_pull_while_in_flight() {
    let backend = FakeBackend::new(vec![order(1, 4, OrderStatus::Pending)]);
    let channel = spawn(&backend, config().with_optimistic_updates(true));
    let mut sub = channel.subscribe_all();
    wait_until("initial pull", || channel.snapshot().get(1).is_some()).await;

    // pull reads PENDING, then stalls
    backend.list_gate.hold();
    channel.refresh();
    wait_until("stale pull in flight", || backend.list_calls() == 2).await;

    backend.update_gate.hold();
    let pending = {
        let channel = channel.clone();
        tokio::spawn(async move { channel.advance_status(1, OrderStatus::Preparing).await })
    };
    loop {
        let view = sub.changed().await.expect("channel open");
        if view.orders[0].status == OrderStatus::Preparing {
            break;
        }
    }

    // stale pull lands, then a follow-up that still reads the uncommitted backend
    backend.list_gate.open();
    wait_until("follow-up pull", || backend.list_calls() == 3).await;
    sleep(Duration::from_millis(50)).await;
    while let Ok(Some(view)) =
        tokio::time::timeout(Duration::from_millis(20), sub.changed()).await
    {
        assert_eq!(view.orders[0].status, OrderStatus::Preparing);
    }
    assert_eq!(status_in(&channel, 1), Some(OrderStatus::Preparing));

    backend.update_gate.open();
    let confirmed = pending.await.unwrap().expect("backend accepted");
    assert_eq!(confirmed.status, OrderStatus::Preparing);
    wait_until("settled", || backend.list_calls() == 4).await;
    assert_eq!(status_in(&channel, 1), Some(OrderStatus::Preparing));
}

// ========== Commands ==========

#[tokio::test]
async fn test_kitchen_advances_then_server_jump_is_rejected() {
    let backend = FakeBackend::new(vec![order(1, 4, OrderStatus::Pending)]);
    let channel = spawn(&backend, config());
    let _sub = channel.subscribe_all();
    wait_until("initial pull", || channel.snapshot().get(1).is_some()).await;

    let kitchen = channel.role_view(StaffRole::Kitchen);
    let server = channel.role_view(StaffRole::Server);

    let updated = kitchen
        .advance_status(1, OrderStatus::Preparing)
        .await
        .expect("PENDING -> PREPARING is allowed");
    assert_eq!(updated.status, OrderStatus::Preparing);
    assert_eq!(backend.update_calls(), 1);

    let err = server
        .advance_status(1, OrderStatus::Paid)
        .await
        .expect_err("PREPARING -> PAID is not allowed");
    match err {
        CommandError::InvalidTransition(OrderError::InvalidTransition { from, to }) => {
            assert_eq!(from, OrderStatus::Preparing);
            assert_eq!(to, OrderStatus::Paid);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(backend.update_calls(), 1, "no network call for a rejected transition");
    assert_eq!(status_in(&channel, 1), Some(OrderStatus::Preparing));
}

#[tokio::test]
async fn test_advance_unknown_order() {
    let backend = FakeBackend::new(vec![]);
    let channel = spawn(&backend, config());
    let _sub = channel.subscribe_all();
    wait_until("initial pull", || backend.list_calls() == 1).await;

    let err = channel
        .advance_status(404, OrderStatus::Preparing)
        .await
        .expect_err("order is not known");
    assert!(matches!(err, CommandError::UnknownOrder(404)));
    assert_eq!(backend.update_calls(), 0);
}

#[tokio::test]
async fn test_rejected_write_leaves_state_untouched() {
    let backend = FakeBackend::new(vec![order(1, 4, OrderStatus::Ready)]);
    let channel = spawn(&backend, config());
    let _sub = channel.subscribe_all();
    wait_until("initial pull", || channel.snapshot().get(1).is_some()).await;
    let revision = channel.snapshot().revision;

    backend.set_update_mode(Mode::Fail);
    let err = channel
        .advance_status(1, OrderStatus::Served)
        .await
        .expect_err("backend unavailable");
    assert!(matches!(err, CommandError::Network(_)));
    assert_eq!(status_in(&channel, 1), Some(OrderStatus::Ready));
    assert_eq!(channel.snapshot().revision, revision);
}

#[tokio::test]
async fn test_optimistic_update_rolls_back_and_blocks_concurrent_command() {
    let backend = FakeBackend::new(vec![order(1, 4, OrderStatus::Pending)]);
    let channel = spawn(&backend, config().with_optimistic_updates(true));
    let _sub = channel.subscribe_all();
    wait_until("initial pull", || channel.snapshot().get(1).is_some()).await;

    backend.update_gate.hold();
    backend.set_update_mode(Mode::Fail);
    let pending = {
        let channel = channel.clone();
        tokio::spawn(async move { channel.advance_status(1, OrderStatus::Preparing).await })
    };

    wait_until("optimistic status shown", || {
        status_in(&channel, 1) == Some(OrderStatus::Preparing)
    })
    .await;

    let busy = channel
        .advance_status(1, OrderStatus::Ready)
        .await
        .expect_err("command already in flight");
    assert!(matches!(busy, CommandError::Busy(1)));

    backend.update_gate.open();
    let result = pending.await.unwrap();
    assert!(matches!(result, Err(CommandError::Network(_))));
    assert_eq!(status_in(&channel, 1), Some(OrderStatus::Pending));
    assert_eq!(backend.status_of(1), Some(OrderStatus::Pending));
}

#[tokio::test]
async fn test_create_order_joins_collection() {
    let backend = FakeBackend::new(vec![order(1, 4, OrderStatus::Pending)]);
    let channel = spawn(&backend, config());
    let _sub = channel.subscribe_all();
    wait_until("initial pull", || channel.snapshot().get(1).is_some()).await;

    let created = channel
        .create_order(
            NewOrder::for_table(9)
                .with_line(OrderLine::new(3, "Soupe à l'oignon", 2, 6.5))
                .with_line(OrderLine::new(8, "Crème brûlée", 1, 7.25)),
        )
        .await
        .expect("created");
    assert_eq!(created.status, OrderStatus::Pending);
    assert_eq!(created.table_number, Some(9));
    assert_eq!(created.computed_total(), 20.25);

    // visible as soon as the backend confirms
    let snapshot = channel.snapshot();
    assert_eq!(snapshot.get(created.id).map(|o| o.status), Some(OrderStatus::Pending));

    let err = channel
        .create_order(NewOrder::takeaway())
        .await
        .expect_err("no lines");
    assert!(matches!(err, CommandError::InvalidOrder(_)));
    assert_eq!(backend.create_calls.load(Ordering::SeqCst), 1);
}

// ========== Failures ==========

#[tokio::test]
async fn test_timeouts_keep_last_known_good() {
    let backend = FakeBackend::new(vec![
        order(1, 4, OrderStatus::Pending),
        order(2, 6, OrderStatus::Served),
    ]);
    let config = config()
        .with_poll_interval(Duration::from_millis(40))
        .with_request_timeout(Duration::from_millis(30));
    let channel = spawn(&backend, config);
    let _sub = channel.subscribe_all();
    wait_until("initial pull", || channel.snapshot().orders.len() == 2).await;
    let synced_at = channel.staleness().last_synced_at;

    backend.set_list_mode(Mode::Hang);
    wait_until("three failed pulls", || {
        channel.staleness().consecutive_failures >= 3
    })
    .await;

    let staleness = channel.staleness();
    assert_eq!(channel.snapshot().orders.len(), 2);
    assert_eq!(staleness.last_synced_at, synced_at);
    assert!(staleness.is_degraded());
    assert!(staleness.last_error.as_deref().unwrap_or_default().contains("timed out"));

    let age = staleness.age().expect("synced once");
    sleep(Duration::from_millis(30)).await;
    assert!(channel.staleness().age().expect("synced once") > age);

    backend.set_list_mode(Mode::Ok);
    wait_until("recovered", || channel.staleness().consecutive_failures == 0).await;
    assert!(channel.staleness().last_synced_at > synced_at);
}

#[tokio::test]
async fn test_session_expiry_pauses_until_renewed() {
    let backend = FakeBackend::new(vec![order(1, 4, OrderStatus::Pending)]);
    let push = MemoryPushConnector::new();
    let config = config()
        .with_token("stale-token")
        .with_poll_interval(Duration::from_millis(20));
    let channel = spawn_with_push(&backend, &push, config);
    let _sub = channel.subscribe_all();
    wait_until("initial pull", || channel.snapshot().get(1).is_some()).await;

    backend.set_list_mode(Mode::Unauthorized);
    wait_until("session expired", || channel.staleness().session_expired).await;
    wait_until("push stopped", || push.session_count() == 0).await;

    let calls = backend.list_calls();
    channel.refresh();
    sleep(Duration::from_millis(100)).await;
    assert_eq!(backend.list_calls(), calls, "no pulls while expired");
    assert_eq!(channel.snapshot().orders.len(), 1, "last known orders kept");

    // commands still reach the backend and report its answer
    let advanced = channel.advance_status(1, OrderStatus::Preparing).await;
    assert!(advanced.is_ok());

    backend.set_list_mode(Mode::Ok);
    channel.renew_session("fresh-token");
    assert_eq!(channel.session().token().as_deref(), Some("fresh-token"));

    wait_until("resumed", || {
        let s = channel.staleness();
        !s.session_expired && s.consecutive_failures == 0
    })
    .await;
    wait_until("push back", || push.session_count() == 1).await;
    assert!(backend.list_calls() > calls);
}

#[tokio::test]
async fn test_unauthorized_command_expires_session() {
    let backend = FakeBackend::new(vec![order(1, 4, OrderStatus::Pending)]);
    let channel = spawn(&backend, config());
    let _sub = channel.subscribe_all();
    wait_until("initial pull", || channel.snapshot().get(1).is_some()).await;

    backend.set_update_mode(Mode::Unauthorized);
    let err = channel
        .advance_status(1, OrderStatus::Preparing)
        .await
        .expect_err("token rejected");
    assert!(matches!(err, CommandError::Auth(ClientError::Unauthorized)));
    assert!(channel.staleness().session_expired);
}

// ========== Lifecycle ==========

#[tokio::test]
async fn test_background_sync_follows_subscriber_count() {
    let backend = FakeBackend::new(vec![order(1, 4, OrderStatus::Pending)]);
    let push = MemoryPushConnector::new();
    let config = config().with_poll_interval(Duration::from_millis(20));
    let channel = spawn_with_push(&backend, &push, config);

    let first = channel.subscribe_all();
    let second = channel.subscribe(|o| o.status == OrderStatus::Pending);
    assert_eq!(channel.subscriber_count(), 2);
    wait_until("push session", || push.session_count() == 1).await;

    drop(first);
    sleep(Duration::from_millis(50)).await;
    assert_eq!(push.session_count(), 1, "one view still subscribed");

    second.unsubscribe();
    assert_eq!(channel.subscriber_count(), 0);
    wait_until("push closed", || push.session_count() == 0).await;
    assert!(!channel.staleness().push_connected);

    sleep(Duration::from_millis(30)).await;
    let calls = backend.list_calls();
    sleep(Duration::from_millis(100)).await;
    assert_eq!(backend.list_calls(), calls, "no polling without subscribers");

    let _again = channel.subscribe_all();
    wait_until("push reopened", || push.session_count() == 1).await;
    wait_until("polling resumed", || backend.list_calls() > calls).await;
}

#[tokio::test]
async fn test_subscription_ends_when_channel_dropped() {
    let backend = FakeBackend::new(vec![]);
    let channel = spawn(&backend, config());
    let mut sub = channel.subscribe_all();
    assert!(sub.changed().await.is_some());

    channel.shutdown();
    drop(channel);
    let ended = tokio::time::timeout(Duration::from_secs(1), async {
        while sub.changed().await.is_some() {}
    })
    .await;
    assert!(ended.is_ok());
}

// ========== Role views ==========

#[tokio::test]
async fn test_role_views_filter_and_enforce_permissions() {
    let backend = FakeBackend::new(vec![
        order(1, 4, OrderStatus::Pending),
        order(2, 5, OrderStatus::Preparing),
        order(3, 6, OrderStatus::Ready),
        order(4, 7, OrderStatus::Served),
    ]);
    let channel = spawn(&backend, config());

    let kitchen = channel.role_view(StaffRole::Kitchen);
    let mut kitchen_sub = kitchen.subscribe();
    let mut view = kitchen_sub.changed().await.expect("open");
    while view.is_empty() {
        view = kitchen_sub.changed().await.expect("open");
    }
    let ids: Vec<OrderId> = view.orders.iter().map(|o| o.id).collect();
    assert_eq!(ids, vec![1, 2]);

    let cards = kitchen.cards(&view);
    assert_eq!(cards[0].order_id, 1, "new orders are urgent for the kitchen");
    assert!(cards[0].display.urgent);
    assert_eq!(cards[0].actions, vec![OrderStatus::Preparing]);
    assert_eq!(cards[1].actions, vec![OrderStatus::Ready]);

    let err = kitchen
        .advance_status(3, OrderStatus::Served)
        .await
        .expect_err("kitchen does not serve");
    assert!(matches!(
        err,
        CommandError::InvalidTransition(OrderError::RoleNotPermitted { .. })
    ));
    assert_eq!(backend.update_calls(), 0);

    let cashier = channel.role_view(StaffRole::Cashier);
    let cashier_view = cashier.subscribe().current();
    assert_eq!(cashier_view.len(), 1);
    assert_eq!(cashier.display(OrderStatus::Served).label, "Awaiting payment");

    let paid = cashier
        .advance_status(4, OrderStatus::Paid)
        .await
        .expect("cashier takes payment");
    assert_eq!(paid.status, OrderStatus::Paid);
    assert_eq!(backend.status_of(4), Some(OrderStatus::Paid));
}
