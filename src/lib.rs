//! shoetrack-api
//!
//! Inventory and sales tracking for a small shoe resale business: product
//! intake (single items and size/color bundles), atomic sale recording with
//! profit accounting, and a client with an offline sale queue.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod auth;
pub mod client;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod middleware_helpers;
pub mod migrator;
pub mod openapi;
pub mod services;
pub mod tracing;

use axum::{
    extract::{DefaultBodyLimit, State},
    http::{HeaderValue, StatusCode},
    response::Json,
    routing::get,
    Router,
};
use chrono::Utc;
use sea_orm::DatabaseConnection;
use serde_json::{json, Value};
use std::{sync::Arc, time::Duration};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
};
use utoipa::OpenApi;

use crate::{
    auth::SessionGate,
    services::{bundles::BundleExpander, products::ProductStore, sales::SaleRecorder},
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub event_sender: Arc<events::EventSender>,
    pub product_store: Arc<ProductStore>,
    pub bundle_expander: Arc<BundleExpander>,
    pub sale_recorder: Arc<SaleRecorder>,
    pub session_gate: Arc<SessionGate>,
}

impl AppState {
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: config::AppConfig,
        event_sender: events::EventSender,
    ) -> Self {
        let event_sender = Arc::new(event_sender);
        let session_gate = match config.access_password() {
            Some(password) => SessionGate::new(Some(password), config.session_ttl_secs),
            None => SessionGate::open(),
        };

        Self {
            product_store: Arc::new(ProductStore::new(db.clone(), event_sender.clone())),
            bundle_expander: Arc::new(BundleExpander::new(
                db.clone(),
                event_sender.clone(),
                config.shoe_code_prefix.clone(),
            )),
            sale_recorder: Arc::new(SaleRecorder::new(db.clone(), event_sender.clone())),
            session_gate: Arc::new(session_gate),
            db,
            config,
            event_sender,
        }
    }
}

/// Routes mounted under `/api/v1`. Product routes sit behind the session gate.
pub fn api_v1_routes(session_gate: Arc<SessionGate>) -> Router<AppState> {
    handlers::products::products_router().route_layer(axum::middleware::from_fn_with_state(
        session_gate,
        auth::session_middleware,
    ))
}

/// The complete application router with its middleware stack.
pub fn app_router(state: AppState) -> Router {
    let cors_layer = cors_layer(&state.config);

    Router::new()
        .route("/health", get(health_check))
        .route("/api-docs/openapi.json", get(openapi_json))
        .merge(handlers::auth::auth_router())
        .nest("/api/v1", api_v1_routes(state.session_gate.clone()))
        .layer(DefaultBodyLimit::max(state.config.max_body_size))
        .layer(crate::tracing::configure_http_tracing())
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(CompressionLayer::new())
        .layer(cors_layer)
        .layer(axum::middleware::from_fn(
            middleware_helpers::request_id_middleware,
        ))
        .with_state(state)
}

fn cors_layer(cfg: &config::AppConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = cfg
        .cors_origins()
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect();

    if origins.is_empty() {
        if !cfg.is_development() {
            ::tracing::warn!("no CORS origins configured; cross-origin requests are refused");
            return CorsLayer::new();
        }
        return CorsLayer::permissive();
    }

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(Any)
        .allow_headers(Any)
}

async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let database = match db::check_connection(&state.db).await {
        Ok(()) => "healthy",
        Err(e) => {
            ::tracing::warn!(error = %e, "health check: database unreachable");
            "unhealthy"
        }
    };
    let status = if database == "healthy" {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(json!({
            "status": database,
            "version": env!("CARGO_PKG_VERSION"),
            "checks": { "database": database },
            "timestamp": Utc::now().to_rfc3339(),
        })),
    )
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(openapi::ApiDocV1::openapi())
}
