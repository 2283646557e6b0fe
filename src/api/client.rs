//! HTTP access to the Relief backend
//!
//! All endpoints are JSON-over-POST. [`ChatBackend`] is the seam between the
//! protocol logic in [`crate::core`] and the network; the quota tracker and
//! purchase reconciler only ever see this trait, so tests can substitute an
//! in-memory backend.

use std::error::Error as StdError;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::api::{
    AccountRequest, BasicResponse, ChatReply, ChatRequest, HistoryListResponse,
    HistoryMessagesResponse, HistoryRequest, LoginRequest, LoginResponse, PurchaseRequest,
    PurchaseResponse, QuotaResponse, RegisterRequest, RegisterResponse,
};
use crate::utils::url::construct_api_url;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(40);

type BoxedSource = Box<dyn StdError + Send + Sync>;

/// Errors produced while talking to the backend.
#[derive(Debug)]
pub enum ApiError {
    /// The request never produced a usable HTTP response.
    Transport {
        endpoint: &'static str,
        source: BoxedSource,
    },

    /// The backend answered with a non-success HTTP status.
    Status {
        endpoint: &'static str,
        status: u16,
        body: String,
    },

    /// The response body was not the JSON shape we expect.
    Decode {
        endpoint: &'static str,
        source: BoxedSource,
    },
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::Transport { endpoint, source } => {
                write!(f, "Request to {endpoint} failed: {source}")
            }
            ApiError::Status {
                endpoint,
                status,
                body,
            } => {
                if body.is_empty() {
                    write!(f, "{endpoint} returned HTTP {status}")
                } else {
                    write!(f, "{endpoint} returned HTTP {status}: {body}")
                }
            }
            ApiError::Decode { endpoint, source } => {
                write!(f, "Could not parse {endpoint} response: {source}")
            }
        }
    }
}

impl StdError for ApiError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            ApiError::Transport { source, .. } => Some(source.as_ref()),
            ApiError::Decode { source, .. } => Some(source.as_ref()),
            ApiError::Status { .. } => None,
        }
    }
}

impl ApiError {
    /// True when the backend itself answered, as opposed to the network
    /// failing before a response arrived.
    pub fn is_status(&self) -> bool {
        matches!(self, ApiError::Status { .. })
    }
}

/// The Relief backend surface consumed by this client.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn register(&self, req: &RegisterRequest) -> Result<RegisterResponse, ApiError>;
    async fn login(&self, req: &LoginRequest) -> Result<LoginResponse, ApiError>;
    async fn chat(&self, req: &ChatRequest) -> Result<ChatReply, ApiError>;
    async fn remaining_chats(&self, req: &AccountRequest) -> Result<QuotaResponse, ApiError>;
    async fn verify_purchase(&self, req: &PurchaseRequest) -> Result<PurchaseResponse, ApiError>;
    async fn history_list(&self, req: &AccountRequest) -> Result<HistoryListResponse, ApiError>;
    async fn history_messages(
        &self,
        req: &HistoryRequest,
    ) -> Result<HistoryMessagesResponse, ApiError>;
    async fn hide_history(&self, req: &AccountRequest) -> Result<BasicResponse, ApiError>;
}

/// `reqwest`-backed [`ChatBackend`] implementation.
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(base_url: &str) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|source| ApiError::Transport {
                endpoint: "client",
                source: Box::new(source),
            })?;

        Ok(HttpBackend {
            client,
            base_url: base_url.to_string(),
        })
    }

    async fn post<Req, Resp>(&self, endpoint: &'static str, req: &Req) -> Result<Resp, ApiError>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let url = construct_api_url(&self.base_url, endpoint);
        debug!("POST {url}");

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(req)
            .send()
            .await
            .map_err(|source| ApiError::Transport {
                endpoint,
                source: Box::new(source),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            debug!("{endpoint} -> HTTP {status}");
            return Err(ApiError::Status {
                endpoint,
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<Resp>()
            .await
            .map_err(|source| ApiError::Decode {
                endpoint,
                source: Box::new(source),
            })
    }
}

#[async_trait]
impl ChatBackend for HttpBackend {
    async fn register(&self, req: &RegisterRequest) -> Result<RegisterResponse, ApiError> {
        self.post("auth/register", req).await
    }

    async fn login(&self, req: &LoginRequest) -> Result<LoginResponse, ApiError> {
        self.post("auth/login", req).await
    }

    async fn chat(&self, req: &ChatRequest) -> Result<ChatReply, ApiError> {
        self.post("chat", req).await
    }

    async fn remaining_chats(&self, req: &AccountRequest) -> Result<QuotaResponse, ApiError> {
        self.post("user/chats", req).await
    }

    async fn verify_purchase(&self, req: &PurchaseRequest) -> Result<PurchaseResponse, ApiError> {
        self.post("purchase/verify", req).await
    }

    async fn history_list(&self, req: &AccountRequest) -> Result<HistoryListResponse, ApiError> {
        self.post("chat/history/list", req).await
    }

    async fn history_messages(
        &self,
        req: &HistoryRequest,
    ) -> Result<HistoryMessagesResponse, ApiError> {
        self.post("chat/history/get", req).await
    }

    async fn hide_history(&self, req: &AccountRequest) -> Result<BasicResponse, ApiError> {
        self.post("user/history/hide", req).await
    }
}
