use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "shoetrack API",
        version = "1.0.0",
        description = r#"
Inventory and sales tracking for a small shoe resale business.

- **Products**: single items or bundles expanded into one product per size/color pair
- **Sales**: one unit per call; stock never goes negative and profit is booked per sale
- **Dashboard**: stock, profit and sell-through aggregates

When the server has an access password configured, exchange it at `POST /auth/login`
and send the token on every product call:

```
Authorization: Bearer <token>
```

Errors share one body: `{error, message, details?, requestId?, timestamp}`.
        "#,
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    servers((url = "http://localhost:8080", description = "Local development")),
    modifiers(&SessionAuth),
    tags(
        (name = "products", description = "Product intake and lookup"),
        (name = "sales", description = "Sale recording and history"),
        (name = "dashboard", description = "Aggregates for the dashboard"),
        (name = "auth", description = "Shared-password sessions")
    ),
    paths(
        crate::handlers::products::create_product,
        crate::handlers::products::create_bundle,
        crate::handlers::products::sell_product,
        crate::handlers::products::list_products,
        crate::handlers::products::get_product,
        crate::handlers::products::delete_product,
        crate::handlers::products::product_sales,
        crate::handlers::products::product_ledger,
        crate::handlers::products::dashboard_stats,
        crate::handlers::auth::login,
        crate::handlers::auth::logout,
    ),
    components(
        schemas(
            crate::entities::product::Model,
            crate::entities::sale::Model,
            crate::entities::GenderCategory,
            crate::entities::AgeGroup,
            crate::entities::Condition,
            crate::services::products::CreateProductRequest,
            crate::services::products::DashboardStats,
            crate::services::products::LedgerReport,
            crate::services::bundles::BundleRequest,
            crate::services::bundles::ShoePair,
            crate::services::sales::SellRequest,
            crate::handlers::products::BundleCreatedResponse,
            crate::handlers::products::DeleteProductResponse,
            crate::auth::LoginRequest,
            crate::auth::SessionToken,
            crate::errors::ErrorResponse
        )
    )
)]
pub struct ApiDocV1;

struct SessionAuth;

impl Modify for SessionAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "session_token",
            SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
        );
    }
}
