use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveModelBehavior, ConnectionTrait};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationError};

/// Who the shoe is cut for.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, EnumIter, DeriveActiveEnum, Serialize, Deserialize, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "lowercase")]
pub enum GenderCategory {
    #[sea_orm(string_value = "male")]
    Male,
    #[sea_orm(string_value = "female")]
    Female,
    #[default]
    #[sea_orm(string_value = "neutral")]
    Neutral,
}

/// Age bracket. Older clients sent `adults`/`children`, which still parse.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "lowercase")]
pub enum AgeGroup {
    #[serde(alias = "adults")]
    #[sea_orm(string_value = "adult")]
    Adult,
    #[serde(alias = "children", alias = "kids")]
    #[sea_orm(string_value = "child")]
    Child,
    #[sea_orm(string_value = "boys")]
    Boys,
    #[sea_orm(string_value = "girls")]
    Girls,
    #[sea_orm(string_value = "neutral")]
    Neutral,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, EnumIter, DeriveActiveEnum, Serialize, Deserialize, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "lowercase")]
pub enum Condition {
    #[default]
    #[sea_orm(string_value = "new")]
    New,
    #[sea_orm(string_value = "used")]
    Used,
    #[sea_orm(string_value = "refurbished")]
    Refurbished,
    #[sea_orm(string_value = "washed")]
    Washed,
}

/// A sellable shoe product, either added on its own or generated from a bundle.
#[derive(
    Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize, Validate, ToSchema,
)]
#[sea_orm(table_name = "products")]
#[serde(rename_all = "camelCase")]
#[schema(as = Product)]
#[validate(schema(function = "validate_stock_bounds", skip_on_field_errors = false))]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Unique stock code, e.g. `ML-SH-40-BLU-001`
    #[sea_orm(unique)]
    #[validate(length(min = 1, max = 64, message = "Shoe code must be between 1 and 64 characters"))]
    pub shoe_code: Option<String>,

    /// Shared by every product generated from the same bundle
    pub bundle_id: Option<Uuid>,

    pub base_name: Option<String>,

    #[validate(length(
        min = 1,
        max = 255,
        message = "Product name must be between 1 and 255 characters"
    ))]
    pub name: String,

    #[sea_orm(column_type = "Text")]
    #[validate(length(max = 2000, message = "Description cannot exceed 2000 characters"))]
    pub description: String,

    pub color: Option<String>,

    pub size: Option<String>,

    /// JSON array of size labels
    #[schema(value_type = Vec<String>)]
    pub sizes: Json,

    pub gender_category: GenderCategory,

    pub age_group: AgeGroup,

    pub condition: Condition,

    pub location: Option<String>,

    pub image_file: String,

    /// Cost price
    pub price: Decimal,

    pub selling_price: Decimal,

    /// `selling_price - price`, fixed at creation
    pub expected_profit: Decimal,

    pub stock_count: i32,

    pub original_stock: i32,

    pub is_sold: bool,

    pub total_sales: i32,

    pub actual_profit: Decimal,

    pub last_sale_date: Option<DateTime<Utc>>,

    pub last_sale_price: Option<Decimal>,

    pub date_added: DateTime<Utc>,

    /// Set once, when stock first reaches zero
    pub date_sold: Option<DateTime<Utc>>,
}

fn validate_stock_bounds(model: &Model) -> Result<(), ValidationError> {
    if model.original_stock < 1 {
        let mut err = ValidationError::new("original_stock");
        err.message = Some("Original stock must be at least 1".into());
        return Err(err);
    }
    if model.stock_count < 0 || model.stock_count > model.original_stock {
        let mut err = ValidationError::new("stock_count");
        err.message = Some("Stock count must stay between 0 and the original stock".into());
        return Err(err);
    }
    Ok(())
}

impl Model {
    /// Size labels decoded from the `sizes` column
    pub fn size_list(&self) -> Vec<String> {
        serde_json::from_value(self.sizes.clone()).unwrap_or_default()
    }

    pub fn in_stock(&self) -> bool {
        self.stock_count > 0
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::sale::Entity")]
    Sales,
}

impl Related<super::sale::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Sales.def()
    }
}

#[async_trait::async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C>(self, _db: &C, _insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        let model: Model = self.clone().try_into().map_err(|_| {
            DbErr::Custom("Failed to convert ActiveModel to Model for validation".to_string())
        })?;

        if let Err(err) = model.validate() {
            return Err(DbErr::Custom(format!("Validation error: {}", err)));
        }

        Ok(self)
    }
}
