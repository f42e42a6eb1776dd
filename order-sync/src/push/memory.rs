//! In-process push connector
//!
//! Backed by a tokio broadcast channel. Used when the backend lives in the
//! same process and by the test suite to script push sessions.

use async_trait::async_trait;
use futures::StreamExt;
use shared::{OrderPushEvent, PushTopic};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::broadcast;

use super::{PushConnector, PushStream};
use crate::error::{ClientError, ClientResult};

#[derive(Debug, Clone)]
enum Frame {
    Event(OrderPushEvent),
    Drop,
}

#[derive(Debug, Clone)]
pub struct MemoryPushConnector {
    tx: broadcast::Sender<Frame>,
    connects: Arc<AtomicUsize>,
    unreachable: Arc<AtomicBool>,
    auth_refused: Arc<AtomicBool>,
}

impl MemoryPushConnector {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(256);
        Self {
            tx,
            connects: Arc::new(AtomicUsize::new(0)),
            unreachable: Arc::new(AtomicBool::new(false)),
            auth_refused: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Deliver an event to every open session; returns how many received it
    pub fn publish(&self, event: OrderPushEvent) -> usize {
        self.tx.send(Frame::Event(event)).unwrap_or(0)
    }

    /// End every open session as if the server went away
    pub fn disconnect_all(&self) {
        let _ = self.tx.send(Frame::Drop);
    }

    /// Make new connection attempts fail with a connection error
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// Make new connection attempts fail with 401
    pub fn refuse_auth(&self, refused: bool) {
        self.auth_refused.store(refused, Ordering::SeqCst);
    }

    /// Number of connection attempts so far
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Number of open sessions
    pub fn session_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for MemoryPushConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PushConnector for MemoryPushConnector {
    async fn connect(&self) -> ClientResult<PushStream> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.auth_refused.load(Ordering::SeqCst) {
            return Err(ClientError::Unauthorized);
        }
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(ClientError::Connection("push endpoint unreachable".to_string()));
        }

        let rx = self.tx.subscribe();
        let stream = futures::stream::unfold(rx, |mut rx| async move {
            match rx.recv().await {
                Ok(Frame::Event(event)) => Some((Ok(event), rx)),
                Ok(Frame::Drop) | Err(broadcast::error::RecvError::Closed) => None,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    // Missed events: surface one generic change so the worker refetches
                    tracing::warn!("Memory push session lagged {n} events");
                    Some((Ok(OrderPushEvent::new(PushTopic::Other)), rx))
                }
            }
        });
        Ok(stream.boxed())
    }
}
