//! WebSocket push connector
//!
//! One text frame = one JSON [`OrderPushEvent`]. Pings are answered, malformed
//! frames are skipped, close/EOF ends the session.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use shared::OrderPushEvent;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use super::{PushConnector, PushStream};
use crate::error::{ClientError, ClientResult};
use crate::session::Session;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Clone)]
pub struct WsPushConnector {
    url: String,
    session: Session,
}

impl WsPushConnector {
    pub fn new(url: impl Into<String>, session: Session) -> Self {
        Self {
            url: url.into(),
            session,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl PushConnector for WsPushConnector {
    async fn connect(&self) -> ClientResult<PushStream> {
        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| ClientError::Connection(format!("Invalid push URL {}: {e}", self.url)))?;

        if let Some(bearer) = self.session.bearer() {
            let value = HeaderValue::from_str(&bearer)
                .map_err(|e| ClientError::Connection(format!("Invalid token header: {e}")))?;
            request.headers_mut().insert("Authorization", value);
        }

        let (ws, _response) = tokio_tungstenite::connect_async(request).await?;
        tracing::debug!(url = %self.url, "WebSocket handshake completed");
        Ok(event_stream(ws))
    }
}

fn event_stream(ws: WsStream) -> PushStream {
    futures::stream::unfold(Some(ws), |state| async move {
        let mut ws = state?;
        loop {
            match ws.next().await {
                Some(Ok(Message::Text(text))) => {
                    match serde_json::from_str::<OrderPushEvent>(text.as_str()) {
                        Ok(event) => return Some((Ok(event), Some(ws))),
                        Err(e) => tracing::warn!("Invalid push frame, skipping: {e}"),
                    }
                }
                Some(Ok(Message::Ping(data))) => {
                    if let Err(e) = ws.send(Message::Pong(data)).await {
                        return Some((Err(e.into()), None));
                    }
                }
                Some(Ok(Message::Close(_))) | None => return None,
                Some(Err(e)) => return Some((Err(e.into()), None)),
                _ => {} // binary/pong: ignored
            }
        }
    })
    .boxed()
}
