use super::{ClientConfig, ClientError};
use crate::{
    auth::{LoginRequest, SessionToken},
    entities::product,
    errors::ErrorResponse,
    handlers::products::{BundleCreatedResponse, DeleteProductResponse},
    services::{
        bundles::BundleRequest,
        products::{CreateProductRequest, DashboardStats},
    },
};
use reqwest::{RequestBuilder, StatusCode};
use rust_decimal::Decimal;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::json;
use std::time::Duration;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

/// Typed HTTP client for the product API. Every call carries the configured timeout.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
        })
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ClientError> {
        let response = self.authorize(request).send().await?;
        let status = response.status();
        if status.is_success() {
            return response
                .json::<T>()
                .await
                .map_err(|e| ClientError::Decode(e.to_string()));
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorResponse>(&body)
            .map(|e| e.message)
            .unwrap_or_else(|_| {
                status
                    .canonical_reason()
                    .unwrap_or("unexpected response")
                    .to_string()
            });
        warn!(status = status.as_u16(), %message, "request rejected");
        Err(ClientError::Api {
            status: status.as_u16(),
            message,
        })
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ClientError> {
        self.send(self.http.post(self.url(path)).json(body)).await
    }

    #[instrument(skip(self, password))]
    pub async fn login(&self, password: &str) -> Result<SessionToken, ClientError> {
        let body = LoginRequest {
            password: password.to_string(),
        };
        self.post("/auth/login", &body).await
    }

    pub async fn logout(&self) -> Result<(), ClientError> {
        let response = self
            .authorize(self.http.post(self.url("/auth/logout")))
            .send()
            .await?;
        match response.status() {
            StatusCode::NO_CONTENT | StatusCode::OK => Ok(()),
            status => Err(ClientError::Api {
                status: status.as_u16(),
                message: "logout failed".to_string(),
            }),
        }
    }

    /// Records one sale and returns the product as the server now sees it.
    #[instrument(skip(self))]
    pub async fn sell(
        &self,
        product_id: Uuid,
        sale_price: Decimal,
    ) -> Result<product::Model, ClientError> {
        let body = json!({ "productId": product_id, "salePrice": sale_price });
        let product: product::Model = self.post("/api/v1/products/sell", &body).await?;
        debug!(product_id = %product.id, stock = product.stock_count, "sale confirmed");
        Ok(product)
    }

    pub async fn create_product(
        &self,
        request: &CreateProductRequest,
    ) -> Result<product::Model, ClientError> {
        self.post("/api/v1/products", request).await
    }

    pub async fn create_bundle(
        &self,
        request: &BundleRequest,
    ) -> Result<BundleCreatedResponse, ClientError> {
        self.post("/api/v1/products/bulk", request).await
    }

    pub async fn list_products(
        &self,
        in_stock: Option<bool>,
        bundle_id: Option<Uuid>,
    ) -> Result<Vec<product::Model>, ClientError> {
        let mut query: Vec<(&str, String)> = Vec::new();
        if let Some(in_stock) = in_stock {
            query.push(("inStock", in_stock.to_string()));
        }
        if let Some(bundle_id) = bundle_id {
            query.push(("bundleId", bundle_id.to_string()));
        }
        self.send(self.http.get(self.url("/api/v1/products")).query(&query))
            .await
    }

    pub async fn get_product(&self, id: Uuid) -> Result<product::Model, ClientError> {
        self.send(self.http.get(self.url(&format!("/api/v1/products/{id}"))))
            .await
    }

    pub async fn delete_product(&self, id: Uuid) -> Result<DeleteProductResponse, ClientError> {
        self.send(self.http.delete(self.url(&format!("/api/v1/products/{id}"))))
            .await
    }

    pub async fn stats(&self) -> Result<DashboardStats, ClientError> {
        self.send(self.http.get(self.url("/api/v1/products/stats")))
            .await
    }
}
