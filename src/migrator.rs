#![allow(elided_lifetimes_in_paths)]

use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250301_000001_create_products_table::Migration),
            Box::new(m20250301_000002_create_sales_table::Migration),
        ]
    }
}

mod m20250301_000001_create_products_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20250301_000001_create_products_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Products::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Products::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Products::ShoeCode).string().null())
                        .col(ColumnDef::new(Products::BundleId).uuid().null())
                        .col(ColumnDef::new(Products::BaseName).string().null())
                        .col(ColumnDef::new(Products::Name).string().not_null())
                        .col(
                            ColumnDef::new(Products::Description)
                                .text()
                                .not_null()
                                .default(""),
                        )
                        .col(ColumnDef::new(Products::Color).string().null())
                        .col(ColumnDef::new(Products::Size).string().null())
                        .col(ColumnDef::new(Products::Sizes).json().not_null())
                        .col(
                            ColumnDef::new(Products::GenderCategory)
                                .string_len(32)
                                .not_null()
                                .default("neutral"),
                        )
                        .col(
                            ColumnDef::new(Products::AgeGroup)
                                .string_len(32)
                                .not_null()
                                .default("adult"),
                        )
                        .col(
                            ColumnDef::new(Products::Condition)
                                .string_len(32)
                                .not_null()
                                .default("new"),
                        )
                        .col(ColumnDef::new(Products::Location).string().null())
                        .col(
                            ColumnDef::new(Products::ImageFile)
                                .string()
                                .not_null()
                                .default(""),
                        )
                        .col(ColumnDef::new(Products::Price).decimal().not_null())
                        .col(ColumnDef::new(Products::SellingPrice).decimal().not_null())
                        .col(
                            ColumnDef::new(Products::ExpectedProfit)
                                .decimal()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Products::StockCount).integer().not_null())
                        .col(
                            ColumnDef::new(Products::OriginalStock)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Products::IsSold)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(Products::TotalSales)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Products::ActualProfit)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Products::LastSaleDate)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(ColumnDef::new(Products::LastSalePrice).decimal().null())
                        .col(
                            ColumnDef::new(Products::DateAdded)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Products::DateSold)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_products_shoe_code")
                        .table(Products::Table)
                        .col(Products::ShoeCode)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_products_bundle_id")
                        .table(Products::Table)
                        .col(Products::BundleId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_products_date_added")
                        .table(Products::Table)
                        .col(Products::DateAdded)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Products::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum Products {
        Table,
        Id,
        ShoeCode,
        BundleId,
        BaseName,
        Name,
        Description,
        Color,
        Size,
        Sizes,
        GenderCategory,
        AgeGroup,
        Condition,
        Location,
        ImageFile,
        Price,
        SellingPrice,
        ExpectedProfit,
        StockCount,
        OriginalStock,
        IsSold,
        TotalSales,
        ActualProfit,
        LastSaleDate,
        LastSalePrice,
        DateAdded,
        DateSold,
    }
}

mod m20250301_000002_create_sales_table {
    use super::m20250301_000001_create_products_table::Products;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20250301_000002_create_sales_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Sales::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Sales::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Sales::ProductId).uuid().not_null())
                        .col(ColumnDef::new(Sales::ProductName).string().not_null())
                        .col(ColumnDef::new(Sales::SalePrice).decimal().not_null())
                        .col(ColumnDef::new(Sales::CostPrice).decimal().not_null())
                        .col(ColumnDef::new(Sales::Profit).decimal().not_null())
                        .col(
                            ColumnDef::new(Sales::Quantity)
                                .integer()
                                .not_null()
                                .default(1),
                        )
                        .col(
                            ColumnDef::new(Sales::SaleDate)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Sales::Timestamp).big_integer().not_null())
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_sales_product_id")
                                .from(Sales::Table, Sales::ProductId)
                                .to(Products::Table, Products::Id)
                                .on_delete(ForeignKeyAction::Restrict),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_sales_product_id")
                        .table(Sales::Table)
                        .col(Sales::ProductId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_sales_sale_date")
                        .table(Sales::Table)
                        .col(Sales::SaleDate)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Sales::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Sales {
        Table,
        Id,
        ProductId,
        ProductName,
        SalePrice,
        CostPrice,
        Profit,
        Quantity,
        SaleDate,
        Timestamp,
    }
}
