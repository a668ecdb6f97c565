use crate::{
    db::DbPool,
    entities::product::{self, AgeGroup, Condition, Entity as Product, GenderCategory},
    errors::ServiceError,
    events::{Event, EventSender},
    services::lenient_string,
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, TransactionTrait};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// One size/color combination inside a bundle request.
#[derive(Debug, Clone, Default, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ShoePair {
    #[serde(default, deserialize_with = "lenient_string::option")]
    #[schema(value_type = Option<String>, example = "40")]
    pub size: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    /// Explicit code for this pair; overrides prefix generation
    #[serde(default)]
    pub shoe_code: Option<String>,
}

/// Request to create one product per size/color pair under a shared bundle id.
#[derive(Debug, Clone, Default, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BundleRequest {
    #[serde(default)]
    pub base_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Cost price shared by every pair
    #[serde(default)]
    #[schema(value_type = Option<f64>)]
    pub price: Option<Decimal>,
    #[serde(default)]
    #[schema(value_type = Option<f64>)]
    pub selling_price: Option<Decimal>,
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
    #[serde(default)]
    pub stock_per_item: Option<i32>,
    #[serde(default, alias = "bundleCodePrefix")]
    pub code_prefix: Option<String>,
    #[serde(default)]
    pub shoe_pairs: Vec<ShoePair>,
}

/// What a successful expansion produced.
#[derive(Debug, Clone)]
pub struct BundleOutcome {
    pub bundle_id: Uuid,
    pub products: Vec<product::Model>,
}

impl BundleOutcome {
    pub fn count(&self) -> usize {
        self.products.len()
    }

    pub fn product_ids(&self) -> Vec<Uuid> {
        self.products.iter().map(|p| p.id).collect()
    }
}

/// Builds a shoe code like `ML-SH-40-BLU-001` from a prefix, size, color and
/// the pair's 0-based position in the bundle.
pub fn generate_shoe_code(prefix: &str, size: &str, color: &str, index: usize) -> String {
    let color_code: String = color.trim().chars().take(3).collect::<String>().to_uppercase();
    format!(
        "{}-{:0>2}-{}-{:03}",
        prefix.trim(),
        size.trim(),
        color_code,
        index + 1
    )
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Fully validated bundle input, ready to expand.
struct ValidBundle<'a> {
    base_name: &'a str,
    price: Decimal,
    selling_price: Decimal,
    image_file: &'a str,
    stock_per_item: i32,
    pairs: Vec<(&'a str, &'a str)>,
}

/// Checks the request in a fixed order so callers always see the first problem.
fn validate_request(request: &BundleRequest) -> Result<ValidBundle<'_>, ServiceError> {
    let base_name = non_blank(&request.base_name).ok_or_else(|| {
        ServiceError::ValidationError("Bundle design name is required".to_string())
    })?;

    let price = request
        .price
        .filter(|p| *p > Decimal::ZERO)
        .ok_or_else(|| ServiceError::ValidationError("Valid purchase price is required".to_string()))?;

    let selling_price = request
        .selling_price
        .filter(|p| *p > Decimal::ZERO)
        .ok_or_else(|| ServiceError::ValidationError("Valid selling price is required".to_string()))?;

    if request.shoe_pairs.is_empty() {
        return Err(ServiceError::ValidationError(
            "At least one shoe pair is required".to_string(),
        ));
    }

    let image_file = non_blank(&request.image_file).ok_or_else(|| {
        ServiceError::ValidationError("Bundle image filename is required".to_string())
    })?;

    let mut pairs = Vec::with_capacity(request.shoe_pairs.len());
    for (index, pair) in request.shoe_pairs.iter().enumerate() {
        match (non_blank(&pair.size), non_blank(&pair.color)) {
            (Some(size), Some(color)) => pairs.push((size, color)),
            _ => {
                return Err(ServiceError::ValidationError(format!(
                    "Each shoe must have both size and color (pair {} is incomplete)",
                    index + 1
                )))
            }
        }
    }

    let stock_per_item = request.stock_per_item.unwrap_or(1);
    if stock_per_item < 1 {
        return Err(ServiceError::ValidationError(
            "Stock per item must be a positive integer".to_string(),
        ));
    }

    Ok(ValidBundle {
        base_name,
        price,
        selling_price,
        image_file,
        stock_per_item,
        pairs,
    })
}

/// Rejects explicit codes that repeat inside one batch.
fn ensure_unique_within_batch(codes: &[Option<String>]) -> Result<(), ServiceError> {
    let mut seen: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (index, code) in codes.iter().enumerate() {
        if let Some(code) = code {
            seen.entry(code.as_str()).or_default().push(index + 1);
        }
    }

    let duplicates: Vec<String> = seen
        .into_iter()
        .filter(|(_, positions)| positions.len() > 1)
        .map(|(code, positions)| {
            let positions: Vec<String> = positions.iter().map(usize::to_string).collect();
            format!("{} (pairs {})", code, positions.join(", "))
        })
        .collect();

    if duplicates.is_empty() {
        Ok(())
    } else {
        Err(ServiceError::Conflict(format!(
            "Duplicate shoe codes in bundle: {}",
            duplicates.join("; ")
        )))
    }
}

/// Expands bundle requests into concrete products.
pub struct BundleExpander {
    db_pool: Arc<DbPool>,
    event_sender: Arc<EventSender>,
    default_code_prefix: Option<String>,
}

impl BundleExpander {
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        default_code_prefix: Option<String>,
    ) -> Self {
        Self {
            db_pool,
            event_sender,
            default_code_prefix,
        }
    }

    /// Builds the product rows for a request without touching the store.
    pub fn plan(&self, request: &BundleRequest) -> Result<BundleOutcome, ServiceError> {
        let valid = validate_request(request)?;

        let prefix = non_blank(&request.code_prefix)
            .or_else(|| non_blank(&self.default_code_prefix))
            .map(str::to_string);

        let codes: Vec<Option<String>> = request
            .shoe_pairs
            .iter()
            .zip(&valid.pairs)
            .enumerate()
            .map(|(index, (pair, (size, color)))| {
                non_blank(&pair.shoe_code)
                    .map(str::to_string)
                    .or_else(|| {
                        prefix
                            .as_deref()
                            .map(|p| generate_shoe_code(p, size, color, index))
                    })
            })
            .collect();
        ensure_unique_within_batch(&codes)?;

        let bundle_id = Uuid::new_v4();
        let now = Utc::now();
        let description = non_blank(&request.description);
        let location = non_blank(&request.location).map(str::to_string);

        let mut products = Vec::with_capacity(valid.pairs.len());
        for ((size, color), shoe_code) in valid.pairs.iter().zip(codes) {
            let model = product::Model {
                id: Uuid::new_v4(),
                shoe_code,
                bundle_id: Some(bundle_id),
                base_name: Some(valid.base_name.to_string()),
                name: format!("{} - {}", valid.base_name, color),
                description: description
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("{} {}", color, valid.base_name)),
                color: Some(color.to_string()),
                size: Some(size.to_string()),
                sizes: serde_json::json!([size]),
                gender_category: request.gender_category.unwrap_or_default(),
                age_group: request.age_group.unwrap_or(AgeGroup::Adult),
                condition: request.condition.unwrap_or_default(),
                location: location.clone(),
                image_file: valid.image_file.to_string(),
                price: valid.price,
                selling_price: valid.selling_price,
                expected_profit: valid.selling_price - valid.price,
                stock_count: valid.stock_per_item,
                original_stock: valid.stock_per_item,
                is_sold: false,
                total_sales: 0,
                actual_profit: Decimal::ZERO,
                last_sale_date: None,
                last_sale_price: None,
                date_added: now,
                date_sold: None,
            };
            model.validate()?;
            products.push(model);
        }

        Ok(BundleOutcome {
            bundle_id,
            products,
        })
    }

    /// Validates, expands and inserts a bundle. Either every product is
    /// written or none is.
    #[instrument(skip(self, request), fields(pairs = request.shoe_pairs.len()))]
    pub async fn expand(&self, request: BundleRequest) -> Result<BundleOutcome, ServiceError> {
        let outcome = self.plan(&request)?;

        let rows: Vec<product::ActiveModel> = outcome
            .products
            .iter()
            .cloned()
            .map(product::ActiveModel::from)
            .collect();
        let codes: Vec<String> = outcome
            .products
            .iter()
            .filter_map(|p| p.shoe_code.clone())
            .collect();

        self.db_pool
            .transaction::<_, (), ServiceError>(|txn| {
                Box::pin(async move {
                    if !codes.is_empty() {
                        let taken: Vec<String> = Product::find()
                            .filter(product::Column::ShoeCode.is_in(codes.clone()))
                            .all(txn)
                            .await?
                            .into_iter()
                            .filter_map(|p| p.shoe_code)
                            .collect();
                        if !taken.is_empty() {
                            return Err(ServiceError::Conflict(format!(
                                "Shoe codes already in use: {}",
                                taken.join(", ")
                            )));
                        }
                    }

                    Product::insert_many(rows)
                        .exec_without_returning(txn)
                        .await
                        .map_err(|e| {
                            ServiceError::from_db(e, || {
                                "A shoe code in this bundle is already in use".to_string()
                            })
                        })?;
                    Ok(())
                })
            })
            .await
            .map_err(|e| {
                let err = ServiceError::from(e);
                warn!(error = %err, "bundle rejected");
                err
            })?;

        info!(
            bundle_id = %outcome.bundle_id,
            count = outcome.count(),
            "Bundle expanded"
        );

        self.event_sender
            .send_or_log(Event::BundleCreated {
                bundle_id: outcome.bundle_id,
                count: outcome.count(),
            })
            .await;

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use rust_decimal_macros::dec;
    use sea_orm::{Database, DatabaseConnection};
    use tokio::sync::mpsc;

    fn pair(size: &str, color: &str) -> ShoePair {
        ShoePair {
            size: Some(size.to_string()),
            color: Some(color.to_string()),
            shoe_code: None,
        }
    }

    fn classic() -> BundleRequest {
        BundleRequest {
            base_name: Some("Classic".into()),
            price: Some(dec!(40)),
            selling_price: Some(dec!(80)),
            image_file: Some("classic.jpg".into()),
            stock_per_item: Some(2),
            shoe_pairs: vec![pair("40", "Black"), pair("41", "Black")],
            ..Default::default()
        }
    }

    fn expander(prefix: Option<&str>) -> BundleExpander {
        let (tx, _rx) = mpsc::channel(8);
        BundleExpander::new(
            Arc::new(DatabaseConnection::Disconnected),
            Arc::new(EventSender::new(tx)),
            prefix.map(str::to_string),
        )
    }

    fn message(err: ServiceError) -> String {
        err.response_message()
    }

    #[test]
    fn shoe_code_format() {
        assert_eq!(generate_shoe_code("ML-SH", "40", "Blue", 0), "ML-SH-40-BLU-001");
        assert_eq!(generate_shoe_code("ML-SH", "9", "re", 11), "ML-SH-09-RE-012");
    }

    #[test]
    fn plan_shares_attributes_across_pairs() {
        let outcome = expander(None).plan(&classic()).unwrap();
        assert_eq!(outcome.count(), 2);
        for product in &outcome.products {
            assert_eq!(product.bundle_id, Some(outcome.bundle_id));
            assert_eq!(product.price, dec!(40));
            assert_eq!(product.expected_profit, dec!(40));
            assert_eq!(product.stock_count, 2);
            assert_eq!(product.original_stock, 2);
            assert_eq!(product.name, "Classic - Black");
            assert_eq!(product.description, "Black Classic");
            assert_eq!(product.age_group, AgeGroup::Adult);
            assert!(product.shoe_code.is_none());
        }
    }

    #[test]
    fn validation_order_is_stable() {
        let empty = BundleRequest::default();
        assert_eq!(
            message(expander(None).plan(&empty).unwrap_err()),
            "Bundle design name is required"
        );

        let mut req = classic();
        req.price = Some(dec!(0));
        req.selling_price = None;
        assert_eq!(
            message(expander(None).plan(&req).unwrap_err()),
            "Valid purchase price is required"
        );

        let mut req = classic();
        req.selling_price = None;
        req.shoe_pairs.clear();
        assert_eq!(
            message(expander(None).plan(&req).unwrap_err()),
            "Valid selling price is required"
        );

        let mut req = classic();
        req.shoe_pairs.clear();
        req.image_file = None;
        assert_eq!(
            message(expander(None).plan(&req).unwrap_err()),
            "At least one shoe pair is required"
        );

        let mut req = classic();
        req.image_file = Some("  ".into());
        req.shoe_pairs[1].color = None;
        assert_eq!(
            message(expander(None).plan(&req).unwrap_err()),
            "Bundle image filename is required"
        );

        let mut req = classic();
        req.shoe_pairs[1].color = None;
        assert!(message(expander(None).plan(&req).unwrap_err())
            .starts_with("Each shoe must have both size and color"));
    }

    #[test]
    fn non_positive_stock_rejected() {
        let mut req = classic();
        req.stock_per_item = Some(0);
        assert_matches!(
            expander(None).plan(&req),
            Err(ServiceError::ValidationError(_))
        );
    }

    #[test]
    fn prefix_generates_codes_and_explicit_code_wins() {
        let mut req = classic();
        req.shoe_pairs[1].shoe_code = Some("CUSTOM-1".into());
        let outcome = expander(Some("ML-SH")).plan(&req).unwrap();
        assert_eq!(
            outcome.products[0].shoe_code.as_deref(),
            Some("ML-SH-40-BLA-001")
        );
        assert_eq!(outcome.products[1].shoe_code.as_deref(), Some("CUSTOM-1"));
    }

    #[test]
    fn repeated_explicit_codes_conflict() {
        let mut req = classic();
        req.shoe_pairs[0].shoe_code = Some("DUP".into());
        req.shoe_pairs[1].shoe_code = Some("DUP".into());
        let err = expander(None).plan(&req).unwrap_err();
        assert_matches!(err, ServiceError::Conflict(ref m) if m.contains("DUP (pairs 1, 2)"));
    }

    #[tokio::test]
    async fn expand_inserts_everything_or_nothing() {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        crate::db::run_migrations(&db).await.unwrap();
        let db = Arc::new(db);
        let (tx, _rx) = mpsc::channel(8);
        let expander = BundleExpander::new(
            db.clone(),
            Arc::new(EventSender::new(tx)),
            Some("ML-SH".into()),
        );

        let first = expander.expand(classic()).await.unwrap();
        assert_eq!(first.count(), 2);

        // Same prefix, same pairs: codes collide with the first bundle.
        let err = expander.expand(classic()).await.unwrap_err();
        assert_matches!(err, ServiceError::Conflict(_));

        let stored = Product::find().all(db.as_ref()).await.unwrap();
        assert_eq!(stored.len(), 2);
    }
}
