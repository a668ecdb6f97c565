//! Client side of the API: an HTTP client, local persistence and the offline
//! sale queue used when the connection drops mid-shift.

pub mod api_client;
pub mod offline_queue;
pub mod storage;

pub use api_client::ApiClient;
pub use offline_queue::{
    DashboardCache, DrainReport, OfflineQueue, PendingSale, PendingStatus, QueueConfig,
    SaleOutcome, SalesClient,
};
pub use storage::{FileStore, LocalStore, MemoryStore};

use crate::{entities::product, errors::ServiceError, services::sales::SaleRecorder};
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("network error: {0}")]
    Transport(String),
    #[error("request timed out")]
    Timeout,
    #[error("server returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error("could not decode server response: {0}")]
    Decode(String),
    #[error("local storage error: {0}")]
    Storage(String),
}

impl ClientError {
    /// Whether the same request may succeed if sent again later.
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Transport(_) | ClientError::Timeout => true,
            ClientError::Api { status, .. } => *status >= 500 || *status == 408 || *status == 429,
            ClientError::Decode(_) | ClientError::Storage(_) => false,
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ClientError::Timeout
        } else if err.is_decode() {
            ClientError::Decode(err.to_string())
        } else {
            ClientError::Transport(err.to_string())
        }
    }
}

impl From<ServiceError> for ClientError {
    fn from(err: ServiceError) -> Self {
        ClientError::Api {
            status: err.status_code().as_u16(),
            message: err.response_message(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    pub token: Option<String>,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            token: None,
        }
    }
}

/// Anything that can record one sale and hand back the updated product.
#[async_trait]
pub trait SaleSubmitter: Send + Sync {
    async fn submit_sale(
        &self,
        product_id: Uuid,
        sale_price: Decimal,
    ) -> Result<product::Model, ClientError>;
}

#[async_trait]
impl SaleSubmitter for ApiClient {
    async fn submit_sale(
        &self,
        product_id: Uuid,
        sale_price: Decimal,
    ) -> Result<product::Model, ClientError> {
        self.sell(product_id, sale_price).await
    }
}

/// In-process submission, for tools running next to the database.
#[async_trait]
impl SaleSubmitter for SaleRecorder {
    async fn submit_sale(
        &self,
        product_id: Uuid,
        sale_price: Decimal,
    ) -> Result<product::Model, ClientError> {
        let receipt = self.record_sale(product_id, sale_price).await?;
        Ok(receipt.product)
    }
}
