use crate::{
    db::DbPool,
    entities::{
        product::{self, AgeGroup, Condition, Entity as Product, GenderCategory},
        sale::{self, Entity as Sale},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::lenient_string,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, SqlErr,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

/// Body of `POST /products`.
#[derive(Debug, Clone, Default, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateProductRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub shoe_code: Option<String>,
    #[serde(default)]
    #[schema(value_type = Option<f64>)]
    pub price: Option<Decimal>,
    #[serde(default)]
    #[schema(value_type = Option<f64>)]
    pub selling_price: Option<Decimal>,
    #[serde(default)]
    pub stock_count: Option<i32>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default, deserialize_with = "lenient_string::option")]
    #[schema(value_type = Option<String>)]
    pub size: Option<String>,
    #[serde(default, deserialize_with = "lenient_string::vec")]
    pub sizes: Vec<String>,
    #[serde(default)]
    pub gender_category: Option<GenderCategory>,
    #[serde(default)]
    pub age_group: Option<AgeGroup>,
    #[serde(default)]
    pub condition: Option<Condition>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub image_file: Option<String>,
}

/// Filters for `GET /products`.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct ProductFilter {
    /// Only products generated by this bundle
    pub bundle_id: Option<Uuid>,
    /// `true` for products with stock left, `false` for sold-out ones
    pub in_stock: Option<bool>,
}

/// Aggregates shown on the dashboard. Simple sums only.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total_products: u64,
    pub total_stock: i64,
    pub total_original_stock: i64,
    /// Profit still expected from unsold stock
    #[schema(value_type = f64)]
    pub total_expected_profit: Decimal,
    #[schema(value_type = f64)]
    pub total_actual_profit: Decimal,
    pub total_sales: i64,
    pub today_sales: u64,
    #[schema(value_type = f64)]
    pub today_profit: Decimal,
    /// Percent of original stock sold
    #[schema(value_type = f64)]
    pub sell_through_rate: Decimal,
    #[schema(value_type = f64)]
    pub average_sales_per_product: Decimal,
}

/// Result of checking a product's counters against its sale history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LedgerReport {
    pub product_id: Uuid,
    pub stock_count: i32,
    pub original_stock: i32,
    pub total_sales: i32,
    pub recorded_sales: u64,
    #[schema(value_type = f64)]
    pub actual_profit: Decimal,
    #[schema(value_type = f64)]
    pub recorded_profit: Decimal,
    pub consistent: bool,
}

fn sales_history_message() -> String {
    "Cannot delete a product with sales history".to_string()
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn percent(part: i64, whole: i64) -> Decimal {
    if whole <= 0 {
        return Decimal::ZERO;
    }
    (Decimal::from(part) * Decimal::ONE_HUNDRED / Decimal::from(whole)).round_dp(1)
}

/// Folds products and today's sales into dashboard numbers.
pub fn summarize(
    products: &[product::Model],
    todays_sales: &[sale::Model],
) -> DashboardStats {
    let mut stats = DashboardStats {
        total_products: products.len() as u64,
        ..Default::default()
    };

    for p in products {
        stats.total_stock += i64::from(p.stock_count);
        stats.total_original_stock += i64::from(p.original_stock);
        stats.total_actual_profit += p.actual_profit;
        stats.total_sales += i64::from(p.total_sales);
        if !p.is_sold {
            stats.total_expected_profit += p.expected_profit * Decimal::from(p.stock_count);
        }
    }

    stats.today_sales = todays_sales.len() as u64;
    stats.today_profit = todays_sales.iter().map(|s| s.profit).sum();
    stats.sell_through_rate = percent(stats.total_sales, stats.total_original_stock);
    if !products.is_empty() {
        stats.average_sales_per_product =
            (Decimal::from(stats.total_sales) / Decimal::from(products.len() as u64)).round_dp(1);
    }
    stats
}

fn start_of_day(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|midnight| midnight.and_utc())
        .unwrap_or(now)
}

/// Product CRUD, dashboard reads and ledger checks.
pub struct ProductStore {
    db_pool: Arc<DbPool>,
    event_sender: Arc<EventSender>,
}

impl ProductStore {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Arc<EventSender>) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    fn build_single(request: &CreateProductRequest) -> Result<product::Model, ServiceError> {
        let name = non_blank(&request.name)
            .ok_or_else(|| ServiceError::ValidationError("Product name is required".to_string()))?;

        let price = request
            .price
            .filter(|p| *p > Decimal::ZERO)
            .ok_or_else(|| ServiceError::ValidationError("Valid purchase price is required".to_string()))?;

        let selling_price = request
            .selling_price
            .filter(|p| *p > Decimal::ZERO)
            .ok_or_else(|| ServiceError::ValidationError("Valid selling price is required".to_string()))?;

        let stock_count = request.stock_count.filter(|s| *s >= 1).ok_or_else(|| {
            ServiceError::ValidationError("Valid stock count is required (minimum 1)".to_string())
        })?;

        let size = non_blank(&request.size).map(str::to_string);
        let mut sizes: Vec<String> = request
            .sizes
            .iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if sizes.is_empty() {
            sizes.extend(size.clone());
        }

        let model = product::Model {
            id: Uuid::new_v4(),
            shoe_code: non_blank(&request.shoe_code).map(str::to_string),
            bundle_id: None,
            base_name: None,
            name: name.to_string(),
            description: non_blank(&request.description)
                .unwrap_or_default()
                .to_string(),
            color: non_blank(&request.color).map(str::to_string),
            size,
            sizes: serde_json::to_value(&sizes)?,
            gender_category: request.gender_category.unwrap_or_default(),
            age_group: request.age_group.unwrap_or(AgeGroup::Neutral),
            condition: request.condition.unwrap_or_default(),
            location: non_blank(&request.location).map(str::to_string),
            image_file: non_blank(&request.image_file)
                .unwrap_or_default()
                .to_string(),
            price,
            selling_price,
            expected_profit: selling_price - price,
            stock_count,
            original_stock: stock_count,
            is_sold: false,
            total_sales: 0,
            actual_profit: Decimal::ZERO,
            last_sale_date: None,
            last_sale_price: None,
            date_added: Utc::now(),
            date_sold: None,
        };
        model.validate()?;
        Ok(model)
    }

    /// Adds a single product outside any bundle.
    #[instrument(skip(self, request))]
    pub async fn create(
        &self,
        request: CreateProductRequest,
    ) -> Result<product::Model, ServiceError> {
        let model = Self::build_single(&request)?;
        let db = self.db_pool.as_ref();

        if let Some(code) = model.shoe_code.clone() {
            let taken = Product::find()
                .filter(product::Column::ShoeCode.eq(code.clone()))
                .count(db)
                .await?;
            if taken > 0 {
                return Err(ServiceError::Conflict(format!(
                    "Shoe code {} is already in use",
                    code
                )));
            }
        }

        let code = model.shoe_code.clone().unwrap_or_default();
        let created = product::ActiveModel::from(model)
            .insert(db)
            .await
            .map_err(|e| {
                ServiceError::from_db(e, || format!("Shoe code {} is already in use", code))
            })?;

        info!(product_id = %created.id, name = %created.name, "Product created");
        self.event_sender
            .send_or_log(Event::ProductCreated(created.id))
            .await;

        Ok(created)
    }

    #[instrument(skip(self))]
    pub async fn get(&self, id: Uuid) -> Result<product::Model, ServiceError> {
        Product::find_by_id(id)
            .one(self.db_pool.as_ref())
            .await?
            .ok_or_else(|| ServiceError::NotFound("Product not found".to_string()))
    }

    /// Products newest first, optionally narrowed by bundle or stock state.
    #[instrument(skip(self))]
    pub async fn list(&self, filter: ProductFilter) -> Result<Vec<product::Model>, ServiceError> {
        let mut query = Product::find();

        if let Some(bundle_id) = filter.bundle_id {
            query = query.filter(product::Column::BundleId.eq(bundle_id));
        }
        match filter.in_stock {
            Some(true) => query = query.filter(product::Column::StockCount.gt(0)),
            Some(false) => query = query.filter(product::Column::StockCount.eq(0)),
            None => {}
        }

        let products = query
            .order_by_desc(product::Column::DateAdded)
            .order_by_asc(product::Column::Name)
            .order_by_asc(product::Column::Size)
            .all(self.db_pool.as_ref())
            .await?;
        Ok(products)
    }

    /// Deletes a product that has never been sold.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: Uuid) -> Result<(), ServiceError> {
        self.db_pool
            .transaction::<_, (), ServiceError>(|txn| {
                Box::pin(async move {
                    // Guarded delete first; a sale committed after this point
                    // finds no product instead of orphaning a Sale row.
                    let deleted = Product::delete_many()
                        .filter(product::Column::Id.eq(id))
                        .filter(product::Column::TotalSales.eq(0))
                        .exec(txn)
                        .await
                        .map_err(|e| match e.sql_err() {
                            Some(SqlErr::ForeignKeyConstraintViolation(_)) => {
                                ServiceError::HasSalesHistory(sales_history_message())
                            }
                            _ => ServiceError::DatabaseError(e),
                        })?;

                    let recorded = Sale::find()
                        .filter(sale::Column::ProductId.eq(id))
                        .count(txn)
                        .await?;

                    if deleted.rows_affected == 0 {
                        return match Product::find_by_id(id).one(txn).await? {
                            Some(_) => Err(ServiceError::HasSalesHistory(sales_history_message())),
                            None => Err(ServiceError::NotFound("Product not found".to_string())),
                        };
                    }
                    if recorded > 0 {
                        warn!(product_id = %id, recorded, "delete blocked by orphaned sale rows");
                        return Err(ServiceError::HasSalesHistory(sales_history_message()));
                    }
                    Ok(())
                })
            })
            .await
            .map_err(|e| {
                let err = ServiceError::from(e);
                if matches!(err, ServiceError::HasSalesHistory(_)) {
                    warn!(product_id = %id, "delete blocked by sale history");
                }
                err
            })?;

        info!(product_id = %id, "Product deleted");
        self.event_sender
            .send_or_log(Event::ProductDeleted(id))
            .await;
        Ok(())
    }

    /// Dashboard aggregates over every product and today's (UTC) sales.
    #[instrument(skip(self))]
    pub async fn stats(&self) -> Result<DashboardStats, ServiceError> {
        let db = self.db_pool.as_ref();
        let products = Product::find().all(db).await?;
        let todays_sales = Sale::find()
            .filter(sale::Column::SaleDate.gte(start_of_day(Utc::now())))
            .all(db)
            .await?;
        Ok(summarize(&products, &todays_sales))
    }

    /// Recomputes a product's sale counters from its sale rows.
    #[instrument(skip(self))]
    pub async fn ledger(&self, id: Uuid) -> Result<LedgerReport, ServiceError> {
        let product = self.get(id).await?;
        let sales = Sale::find()
            .filter(sale::Column::ProductId.eq(id))
            .all(self.db_pool.as_ref())
            .await?;

        let recorded_sales = sales.len() as u64;
        let recorded_profit: Decimal = sales.iter().map(|s| s.profit).sum();
        let consistent = product.total_sales as u64 == recorded_sales
            && product.actual_profit.round_dp(4) == recorded_profit.round_dp(4)
            && product.stock_count >= 0
            && product.stock_count <= product.original_stock
            && product.original_stock - product.stock_count == product.total_sales;

        if !consistent {
            warn!(product_id = %id, "product counters disagree with sale history");
        }

        Ok(LedgerReport {
            product_id: id,
            stock_count: product.stock_count,
            original_stock: product.original_stock,
            total_sales: product.total_sales,
            recorded_sales,
            actual_profit: product.actual_profit,
            recorded_profit,
            consistent,
        })
    }
}
