use crate::{
    entities::{product, sale},
    errors::ServiceError,
    handlers::AppJson,
    services::{
        bundles::BundleRequest,
        products::{CreateProductRequest, DashboardStats, LedgerReport, ProductFilter},
        sales::SellRequest,
    },
    AppState,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Reply to a successful bundle expansion.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BundleCreatedResponse {
    pub success: bool,
    pub message: String,
    pub count: usize,
    pub bundle_id: Uuid,
    pub product_ids: Vec<Uuid>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeleteProductResponse {
    pub success: bool,
    pub message: String,
    pub deleted_id: Uuid,
}

fn parse_id(raw: &str) -> Result<Uuid, ServiceError> {
    Uuid::parse_str(raw.trim()).map_err(|_| ServiceError::NotFound("Product not found".to_string()))
}

/// Product routes, mounted under `/api/v1`.
pub fn products_router() -> Router<AppState> {
    Router::new()
        .route("/products", get(list_products).post(create_product))
        .route("/products/bulk", post(create_bundle))
        .route("/products/sell", post(sell_product))
        .route("/products/stats", get(dashboard_stats))
        .route(
            "/products/:id",
            get(get_product).delete(delete_product),
        )
        .route("/products/:id/sales", get(product_sales))
        .route("/products/:id/ledger", get(product_ledger))
}

/// Add a single product
#[utoipa::path(
    post,
    path = "/api/v1/products",
    request_body = CreateProductRequest,
    responses(
        (status = 201, description = "Product created", body = product::Model),
        (status = 400, description = "Invalid product", body = crate::errors::ErrorResponse),
        (status = 409, description = "Shoe code already in use", body = crate::errors::ErrorResponse),
        (status = 500, description = "Store unavailable", body = crate::errors::ErrorResponse)
    ),
    tag = "products"
)]
pub async fn create_product(
    State(state): State<AppState>,
    AppJson(payload): AppJson<CreateProductRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let created = state.product_store.create(payload).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// Expand a bundle into one product per size/color pair
#[utoipa::path(
    post,
    path = "/api/v1/products/bulk",
    request_body = BundleRequest,
    responses(
        (status = 201, description = "Bundle created", body = BundleCreatedResponse),
        (status = 400, description = "Invalid bundle", body = crate::errors::ErrorResponse),
        (status = 409, description = "Shoe code collision", body = crate::errors::ErrorResponse),
        (status = 500, description = "Store unavailable", body = crate::errors::ErrorResponse)
    ),
    tag = "products"
)]
pub async fn create_bundle(
    State(state): State<AppState>,
    AppJson(payload): AppJson<BundleRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let outcome = state.bundle_expander.expand(payload).await?;
    let response = BundleCreatedResponse {
        success: true,
        message: format!("Created {} products successfully", outcome.count()),
        count: outcome.count(),
        bundle_id: outcome.bundle_id,
        product_ids: outcome.product_ids(),
    };
    Ok((StatusCode::CREATED, Json(response)))
}

/// Record the sale of one unit
#[utoipa::path(
    post,
    path = "/api/v1/products/sell",
    request_body = SellRequest,
    responses(
        (status = 200, description = "Sale recorded; returns the updated product", body = product::Model),
        (status = 400, description = "Invalid sale or out of stock", body = crate::errors::ErrorResponse),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse),
        (status = 500, description = "Store unavailable", body = crate::errors::ErrorResponse)
    ),
    tag = "sales"
)]
pub async fn sell_product(
    State(state): State<AppState>,
    AppJson(payload): AppJson<SellRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let receipt = state.sale_recorder.sell(payload).await?;
    Ok(Json(receipt.product))
}

/// List products, newest first
#[utoipa::path(
    get,
    path = "/api/v1/products",
    params(ProductFilter),
    responses(
        (status = 200, description = "Products", body = [product::Model]),
        (status = 500, description = "Store unavailable", body = crate::errors::ErrorResponse)
    ),
    tag = "products"
)]
pub async fn list_products(
    State(state): State<AppState>,
    Query(filter): Query<ProductFilter>,
) -> Result<impl IntoResponse, ServiceError> {
    let products = state.product_store.list(filter).await?;
    Ok(Json(products))
}

#[utoipa::path(
    get,
    path = "/api/v1/products/{id}",
    params(("id" = String, Path, description = "Product id")),
    responses(
        (status = 200, description = "Product", body = product::Model),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse)
    ),
    tag = "products"
)]
pub async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ServiceError> {
    let product = state.product_store.get(parse_id(&id)?).await?;
    Ok(Json(product))
}

/// Delete a product that has never been sold
#[utoipa::path(
    delete,
    path = "/api/v1/products/{id}",
    params(("id" = String, Path, description = "Product id")),
    responses(
        (status = 200, description = "Product deleted", body = DeleteProductResponse),
        (status = 400, description = "Product has sales history", body = crate::errors::ErrorResponse),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse)
    ),
    tag = "products"
)]
pub async fn delete_product(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ServiceError> {
    let id = parse_id(&id)?;
    state.product_store.delete(id).await?;
    Ok(Json(DeleteProductResponse {
        success: true,
        message: "Product deleted".to_string(),
        deleted_id: id,
    }))
}

/// Sale history of one product, oldest first
#[utoipa::path(
    get,
    path = "/api/v1/products/{id}/sales",
    params(("id" = String, Path, description = "Product id")),
    responses(
        (status = 200, description = "Sales", body = [sale::Model]),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse)
    ),
    tag = "sales"
)]
pub async fn product_sales(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ServiceError> {
    let sales = state.sale_recorder.history(parse_id(&id)?).await?;
    Ok(Json(sales))
}

/// Check a product's counters against its sale rows
#[utoipa::path(
    get,
    path = "/api/v1/products/{id}/ledger",
    params(("id" = String, Path, description = "Product id")),
    responses(
        (status = 200, description = "Reconciliation report", body = LedgerReport),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse)
    ),
    tag = "sales"
)]
pub async fn product_ledger(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ServiceError> {
    let report = state.product_store.ledger(parse_id(&id)?).await?;
    Ok(Json(report))
}

#[utoipa::path(
    get,
    path = "/api/v1/products/stats",
    responses(
        (status = 200, description = "Dashboard aggregates", body = DashboardStats),
        (status = 500, description = "Store unavailable", body = crate::errors::ErrorResponse)
    ),
    tag = "dashboard"
)]
pub async fn dashboard_stats(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ServiceError> {
    let stats = state.product_store.stats().await?;
    Ok(Json(stats))
}
