use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Method, Request},
    Router,
};
use rust_decimal::Decimal;
use serde_json::Value;
use shoetrack_api::{
    config::AppConfig,
    db,
    entities::product,
    events::{self, EventSender},
    services::products::CreateProductRequest,
    AppState,
};
use tokio::sync::mpsc;
use tower::ServiceExt;

/// Helper harness for spinning up the application backed by an in-memory SQLite database.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    _event_task: tokio::task::JoinHandle<()>,
}

#[allow(dead_code)]
impl TestApp {
    /// Construct a new test application with fresh database state and an open access gate.
    pub async fn new() -> Self {
        Self::with_config(test_config()).await
    }

    /// Same as [`TestApp::new`] with the shared-password gate enabled.
    pub async fn with_password(password: &str) -> Self {
        let mut cfg = test_config();
        cfg.access_password = Some(password.to_string());
        Self::with_config(cfg).await
    }

    /// Backed by a SQLite file with a multi-connection pool, so transactions
    /// really overlap. Keep the returned directory alive for the test.
    pub async fn with_file_db(max_connections: u32) -> (Self, tempfile::TempDir) {
        let dir = tempfile::tempdir().expect("temp dir for test database");
        let mut cfg = test_config();
        cfg.database_url = format!(
            "sqlite://{}?mode=rwc",
            dir.path().join("shoetrack.db").display()
        );
        cfg.db_max_connections = max_connections;
        cfg.db_min_connections = 1;
        (Self::with_config(cfg).await, dir)
    }

    pub async fn with_config(cfg: AppConfig) -> Self {
        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let (event_tx, event_rx) = mpsc::channel(256);
        let event_task = tokio::spawn(events::process_events(event_rx));
        let state = AppState::new(Arc::new(pool), cfg, EventSender::new(event_tx));
        let router = shoetrack_api::app_router(state.clone());

        Self {
            router,
            state,
            _event_task: event_task,
        }
    }

    /// Send a request against the router with an optional bearer token.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> axum::response::Response {
        let mut builder = Request::builder().method(method).uri(uri);

        if let Some(tok) = token {
            builder = builder.header("authorization", format!("Bearer {}", tok));
        }

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    pub async fn get(&self, uri: &str) -> axum::response::Response {
        self.request(Method::GET, uri, None, None).await
    }

    pub async fn post(&self, uri: &str, body: Value) -> axum::response::Response {
        self.request(Method::POST, uri, Some(body), None).await
    }

    /// Insert a standalone product straight through the product store.
    pub async fn seed_product(
        &self,
        name: &str,
        price: Decimal,
        selling_price: Decimal,
        stock: i32,
    ) -> product::Model {
        self.state
            .product_store
            .create(CreateProductRequest {
                name: Some(name.to_string()),
                price: Some(price),
                selling_price: Some(selling_price),
                stock_count: Some(stock),
                image_file: Some("seed.jpg".to_string()),
                ..Default::default()
            })
            .await
            .expect("seed product for tests")
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self._event_task.abort();
    }
}

pub fn test_config() -> AppConfig {
    let mut cfg = AppConfig::new(
        "sqlite::memory:".to_string(),
        "127.0.0.1".to_string(),
        18_080,
        "test".to_string(),
    );
    // One connection: every pooled handle must see the same in-memory database.
    cfg.db_max_connections = 1;
    cfg.db_min_connections = 1;
    cfg
}

#[allow(dead_code)]
pub async fn response_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("failed to read response body");
    serde_json::from_slice(&bytes).expect("response body is not JSON")
}

/// Parses a money field, which the API renders as a decimal string.
#[allow(dead_code)]
pub fn money(value: &Value) -> Decimal {
    match value {
        Value::String(s) => s.parse().expect("decimal string"),
        Value::Number(n) => n.to_string().parse().expect("decimal number"),
        other => panic!("not a money value: {other}"),
    }
}
