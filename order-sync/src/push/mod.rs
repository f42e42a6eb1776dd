//! Push channel: a persistent subscription to backend order events
//!
//! A [`PushConnector`] opens one session and yields events until it drops.
//! [`run_push_loop`] keeps a session alive, reconnecting with exponential
//! backoff, and forwards everything to the sync worker as [`PushSignal`]s.

mod memory;
mod ws;

pub use memory::MemoryPushConnector;
pub use ws::WsPushConnector;

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use shared::OrderPushEvent;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::{ClientError, ClientResult};

/// Events from one push session; ends when the session drops
pub type PushStream = BoxStream<'static, ClientResult<OrderPushEvent>>;

/// Opens push sessions
#[async_trait]
pub trait PushConnector: Send + Sync + 'static {
    async fn connect(&self) -> ClientResult<PushStream>;
}

/// What the push loop reports to the sync worker
#[derive(Debug)]
pub enum PushSignal {
    /// Session (re)established; local state may have missed events
    Connected,
    Event(OrderPushEvent),
    Disconnected { reason: String },
    /// Upgrade refused with 401/403; the loop has stopped
    AuthRejected(ClientError),
}

/// Reconnect delay range
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    pub initial: Duration,
    pub max: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max: max.max(initial),
        }
    }

    fn next(&self, current: Duration) -> Duration {
        (current * 2).min(self.max)
    }
}

/// Keep a push session alive until `shutdown` or an auth rejection
pub async fn run_push_loop(
    connector: Arc<dyn PushConnector>,
    signals: mpsc::UnboundedSender<PushSignal>,
    backoff: Backoff,
    shutdown: CancellationToken,
) {
    tracing::debug!("Push loop started");
    let mut delay = backoff.initial;

    loop {
        if shutdown.is_cancelled() {
            break;
        }

        let connected = tokio::select! {
            _ = shutdown.cancelled() => break,
            result = connector.connect() => result,
        };

        match connected {
            Ok(mut stream) => {
                delay = backoff.initial;
                tracing::info!("Push channel connected");
                if signals.send(PushSignal::Connected).is_err() {
                    break;
                }

                let reason = loop {
                    tokio::select! {
                        _ = shutdown.cancelled() => {
                            tracing::debug!("Push loop stopped");
                            return;
                        }
                        item = stream.next() => match item {
                            Some(Ok(event)) => {
                                if signals.send(PushSignal::Event(event)).is_err() {
                                    return;
                                }
                            }
                            Some(Err(e)) => {
                                tracing::warn!("Push channel error: {e}");
                                break e.to_string();
                            }
                            None => {
                                tracing::info!("Push channel closed by server");
                                break "closed by server".to_string();
                            }
                        }
                    }
                };

                if signals.send(PushSignal::Disconnected { reason }).is_err() {
                    break;
                }
            }
            Err(e) if e.is_auth() => {
                tracing::error!("Push channel refused credentials, not reconnecting: {e}");
                let _ = signals.send(PushSignal::AuthRejected(e));
                break;
            }
            Err(e) => {
                tracing::warn!(
                    delay_ms = delay.as_millis() as u64,
                    "Push channel connection failed, retrying: {e}"
                );
            }
        }

        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(delay) => {},
        }
        delay = backoff.next(delay);
    }

    tracing::debug!("Push loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_to_ceiling() {
        let backoff = Backoff::new(Duration::from_millis(500), Duration::from_secs(3));
        let mut d = backoff.initial;
        let mut seen = vec![];
        for _ in 0..5 {
            d = backoff.next(d);
            seen.push(d.as_millis());
        }
        assert_eq!(seen, vec![1000, 2000, 3000, 3000, 3000]);
    }

    #[tokio::test]
    async fn test_loop_reconnects_after_drop() {
        let connector = Arc::new(MemoryPushConnector::new());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(run_push_loop(
            connector.clone(),
            tx,
            Backoff::new(Duration::from_millis(5), Duration::from_millis(20)),
            shutdown.clone(),
        ));

        assert!(matches!(rx.recv().await, Some(PushSignal::Connected)));
        connector.publish(OrderPushEvent::ready_for_service(9));
        match rx.recv().await {
            Some(PushSignal::Event(ev)) => assert_eq!(ev.order_id, Some(9)),
            other => panic!("unexpected signal: {other:?}"),
        }

        connector.disconnect_all();
        assert!(matches!(rx.recv().await, Some(PushSignal::Disconnected { .. })));
        assert!(matches!(rx.recv().await, Some(PushSignal::Connected)));
        assert_eq!(connector.connect_count(), 2);

        shutdown.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_loop_stops_on_auth_rejection() {
        let connector = Arc::new(MemoryPushConnector::new());
        connector.refuse_auth(true);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_push_loop(
            connector.clone(),
            tx,
            Backoff::new(Duration::from_millis(1), Duration::from_millis(2)),
            CancellationToken::new(),
        ));

        assert!(matches!(rx.recv().await, Some(PushSignal::AuthRejected(_))));
        task.await.unwrap();
        assert_eq!(connector.connect_count(), 1);
    }
}
