//! HTTP client for the order REST API

use crate::api::OrderApi;
use crate::session::Session;
use crate::{ClientError, ClientResult, SyncConfig};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use shared::client::{LoginRequest, LoginResponse, UpdateStatusRequest};
use shared::{NewOrder, Order, OrderId, OrderStatus};

/// HTTP client for the order backend
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    base_url: String,
    session: Session,
}

impl HttpClient {
    /// Create a new HTTP client from configuration
    pub fn new(config: &SyncConfig) -> ClientResult<Self> {
        Self::with_session(config, Session::new(config.token.clone()))
    }

    /// Create a client that reads its token from `session`
    pub fn with_session(config: &SyncConfig, session: Session) -> ClientResult<Self> {
        let client = Client::builder().timeout(config.request_timeout).build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            session,
        })
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match self.session.bearer() {
            Some(auth) => request.header(reqwest::header::AUTHORIZATION, auth),
            None => request,
        }
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> ClientResult<T> {
        let response = self.authorize(request).send().await.map_err(|e| {
            if e.is_timeout() {
                ClientError::Timeout
            } else {
                ClientError::Http(e)
            }
        })?;
        Self::handle_response(response).await
    }

    /// Make a GET request
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> ClientResult<T> {
        self.send(self.client.get(self.url(path))).await
    }

    /// Make a POST request with JSON body
    pub async fn post<T: DeserializeOwned, B: serde::Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> ClientResult<T> {
        self.send(self.client.post(self.url(path)).json(body)).await
    }

    /// Make a PATCH request with JSON body
    pub async fn patch<T: DeserializeOwned, B: serde::Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> ClientResult<T> {
        self.send(self.client.patch(self.url(path)).json(body)).await
    }

    /// Handle the HTTP response
    async fn handle_response<T: DeserializeOwned>(response: reqwest::Response) -> ClientResult<T> {
        let status = response.status();

        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(match status {
                StatusCode::UNAUTHORIZED => ClientError::Unauthorized,
                StatusCode::FORBIDDEN => ClientError::Forbidden(text),
                StatusCode::NOT_FOUND => ClientError::NotFound(text),
                StatusCode::BAD_REQUEST
                | StatusCode::CONFLICT
                | StatusCode::UNPROCESSABLE_ENTITY => ClientError::Validation(text),
                _ => ClientError::Server {
                    status: status.as_u16(),
                    body: text,
                },
            });
        }

        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| {
            ClientError::InvalidResponse(format!("{e} (status {})", status.as_u16()))
        })
    }

    // ========== Auth API ==========

    /// Login and store the returned token in the session
    pub async fn login(&self, username: &str, password: &str) -> ClientResult<LoginResponse> {
        let request = LoginRequest {
            username: username.to_string(),
            password: password.to_string(),
        };

        let response: LoginResponse = self.post("/api/auth/login", &request).await?;
        self.session.set_token(response.token.clone());
        tracing::info!(user = %response.user.username, role = %response.user.role, "Logged in");
        Ok(response)
    }

    /// Drop the local token
    pub fn logout(&self) {
        self.session.clear();
    }
}

#[async_trait]
impl OrderApi for HttpClient {
    async fn list_orders(&self) -> ClientResult<Vec<Order>> {
        self.get("/api/orders").await
    }

    async fn get_order(&self, id: OrderId) -> ClientResult<Order> {
        self.get(&format!("/api/orders/{id}")).await
    }

    async fn update_status(&self, id: OrderId, status: OrderStatus) -> ClientResult<Order> {
        self.patch(
            &format!("/api/orders/{id}/status"),
            &UpdateStatusRequest { status },
        )
        .await
    }

    async fn create_order(&self, order: &NewOrder) -> ClientResult<Order> {
        self.post("/api/orders", order).await
    }
}
