use crate::{
    db::DbPool,
    entities::{
        product::{self, Entity as Product},
        sale::{self, Entity as Sale},
    },
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::Utc;
use metrics::counter;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

/// Body of `POST /products/sell`.
#[derive(Debug, Clone, Default, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SellRequest {
    #[serde(default)]
    pub product_id: Option<String>,
    #[serde(default)]
    #[schema(value_type = Option<f64>)]
    pub sale_price: Option<Decimal>,
}

/// The product after the sale together with the appended sale record.
#[derive(Debug, Clone)]
pub struct SaleReceipt {
    pub product: product::Model,
    pub sale: sale::Model,
}

impl SaleReceipt {
    pub fn sold_out(&self) -> bool {
        self.product.stock_count == 0
    }
}

/// Records sales: one unit per call, guarded against overselling.
pub struct SaleRecorder {
    db_pool: Arc<DbPool>,
    event_sender: Arc<EventSender>,
}

impl SaleRecorder {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Arc<EventSender>) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    /// Validates a raw sell request and records it.
    pub async fn sell(&self, request: SellRequest) -> Result<SaleReceipt, ServiceError> {
        let raw_id = request
            .product_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ServiceError::ValidationError("Product ID is required".to_string()))?;
        let sale_price = request
            .sale_price
            .filter(|p| *p > Decimal::ZERO)
            .ok_or_else(|| ServiceError::ValidationError("Valid sale price is required".to_string()))?;
        // An id that cannot parse cannot resolve either.
        let product_id = Uuid::parse_str(raw_id)
            .map_err(|_| ServiceError::NotFound("Product not found".to_string()))?;

        self.record_sale(product_id, sale_price).await
    }

    /// Sells one unit of `product_id` at `sale_price`.
    ///
    /// The stock decrement is a single conditional update, so concurrent
    /// sales of the last unit cannot both succeed.
    #[instrument(skip(self), fields(product_id = %product_id, sale_price = %sale_price))]
    pub async fn record_sale(
        &self,
        product_id: Uuid,
        sale_price: Decimal,
    ) -> Result<SaleReceipt, ServiceError> {
        if sale_price <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "Valid sale price is required".to_string(),
            ));
        }

        let result = self
            .db_pool
            .transaction::<_, SaleReceipt, ServiceError>(|txn| {
                Box::pin(async move {
                    let now = Utc::now();

                    // The guarded decrement is the first statement, so the
                    // transaction takes the write lock before reading anything.
                    let decremented = Product::update_many()
                        .col_expr(
                            product::Column::StockCount,
                            Expr::col(product::Column::StockCount).sub(1),
                        )
                        .col_expr(
                            product::Column::TotalSales,
                            Expr::col(product::Column::TotalSales).add(1),
                        )
                        .col_expr(
                            product::Column::ActualProfit,
                            Expr::col(product::Column::ActualProfit)
                                .add(Expr::val(sale_price).sub(Expr::col(product::Column::Price))),
                        )
                        .col_expr(product::Column::LastSaleDate, Expr::value(now))
                        .col_expr(product::Column::LastSalePrice, Expr::value(sale_price))
                        .filter(product::Column::Id.eq(product_id))
                        .filter(product::Column::StockCount.gt(0))
                        .exec(txn)
                        .await?;

                    if decremented.rows_affected == 0 {
                        let exists = Product::find_by_id(product_id).one(txn).await?.is_some();
                        return Err(if exists {
                            ServiceError::OutOfStock("Product is out of stock".to_string())
                        } else {
                            ServiceError::NotFound("Product not found".to_string())
                        });
                    }

                    // Sold-out is stamped once, by whichever sale takes the last unit.
                    Product::update_many()
                        .col_expr(product::Column::IsSold, Expr::value(true))
                        .col_expr(product::Column::DateSold, Expr::value(now))
                        .filter(product::Column::Id.eq(product_id))
                        .filter(product::Column::StockCount.eq(0))
                        .filter(product::Column::DateSold.is_null())
                        .exec(txn)
                        .await?;

                    let product = Product::find_by_id(product_id)
                        .one(txn)
                        .await?
                        .ok_or_else(|| {
                            ServiceError::InternalError(format!(
                                "product {} vanished during sale",
                                product_id
                            ))
                        })?;

                    let cost_price = product.price;
                    let sale = sale::ActiveModel {
                        id: Set(Uuid::new_v4()),
                        product_id: Set(product_id),
                        product_name: Set(product.name.clone()),
                        sale_price: Set(sale_price),
                        cost_price: Set(cost_price),
                        profit: Set(sale_price - cost_price),
                        quantity: Set(1),
                        sale_date: Set(now),
                        timestamp: Set(now.timestamp_millis()),
                    }
                    .insert(txn)
                    .await?;

                    Ok(SaleReceipt { product, sale })
                })
            })
            .await
            .map_err(ServiceError::from);

        let receipt = match result {
            Ok(receipt) => receipt,
            Err(err) => {
                if matches!(err, ServiceError::OutOfStock(_)) {
                    counter!("shoetrack_sales.out_of_stock", 1);
                }
                warn!(error = %err, "sale rejected");
                return Err(err);
            }
        };

        counter!("shoetrack_sales.recorded", 1);
        info!(
            sale_id = %receipt.sale.id,
            profit = %receipt.sale.profit,
            remaining_stock = receipt.product.stock_count,
            "Sale recorded"
        );

        self.event_sender
            .send_or_log(Event::SaleRecorded {
                sale_id: receipt.sale.id,
                product_id,
                sale_price,
                profit: receipt.sale.profit,
                remaining_stock: receipt.product.stock_count,
            })
            .await;
        if receipt.sold_out() {
            self.event_sender
                .send_or_log(Event::ProductSoldOut(product_id))
                .await;
        }

        Ok(receipt)
    }

    /// Sale history for one product, oldest first.
    #[instrument(skip(self))]
    pub async fn history(&self, product_id: Uuid) -> Result<Vec<sale::Model>, ServiceError> {
        let db = self.db_pool.as_ref();

        if Product::find_by_id(product_id).one(db).await?.is_none() {
            return Err(ServiceError::NotFound("Product not found".to_string()));
        }

        let sales = Sale::find()
            .filter(sale::Column::ProductId.eq(product_id))
            .order_by_asc(sale::Column::SaleDate)
            .order_by_asc(sale::Column::Timestamp)
            .all(db)
            .await?;
        Ok(sales)
    }
}
