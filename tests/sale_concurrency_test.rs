mod common;

use chrono::Utc;
use common::TestApp;
use rust_decimal_macros::dec;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, Set};
use shoetrack_api::{entities::sale, errors::ServiceError};
use uuid::Uuid;

#[tokio::test]
async fn two_sales_of_the_last_unit_only_one_wins() {
    let app = TestApp::new().await;
    let product = app.seed_product("Contested", dec!(40), dec!(80), 1).await;

    let first = {
        let recorder = app.state.sale_recorder.clone();
        tokio::spawn(async move { recorder.record_sale(product.id, dec!(80)).await })
    };
    let second = {
        let recorder = app.state.sale_recorder.clone();
        tokio::spawn(async move { recorder.record_sale(product.id, dec!(75)).await })
    };

    let results = [first.await.unwrap(), second.await.unwrap()];
    let wins = results.iter().filter(|r| r.is_ok()).count();
    let out_of_stock = results
        .iter()
        .filter(|r| matches!(r, Err(ServiceError::OutOfStock(_))))
        .count();
    assert_eq!(wins, 1);
    assert_eq!(out_of_stock, 1);

    let after = app.state.product_store.get(product.id).await.unwrap();
    assert_eq!(after.stock_count, 0);
    assert_eq!(after.total_sales, 1);
    assert!(after.is_sold);
    assert_eq!(app.state.sale_recorder.history(product.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn burst_of_sales_never_oversells() {
    let app = TestApp::new().await;
    let product = app.seed_product("Burst", dec!(10), dec!(25), 3).await;

    let mut tasks = Vec::new();
    for _ in 0..12 {
        let recorder = app.state.sale_recorder.clone();
        tasks.push(tokio::spawn(async move {
            recorder.record_sale(product.id, dec!(25)).await.is_ok()
        }));
    }
    let mut successes = 0;
    for task in tasks {
        if task.await.unwrap_or(false) {
            successes += 1;
        }
    }
    assert_eq!(successes, 3, "exactly the stocked units can be sold");

    let ledger = app.state.product_store.ledger(product.id).await.unwrap();
    assert!(ledger.consistent);
    assert_eq!(ledger.stock_count, 0);
    assert_eq!(ledger.recorded_sales, 3);
    assert_eq!(ledger.recorded_profit, dec!(45));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn overlapping_sales_on_a_pooled_file_database() {
    let (app, _dir) = TestApp::with_file_db(8).await;
    let mut products = Vec::new();
    for i in 0..20 {
        products.push(app.seed_product(&format!("Pair {i}"), dec!(30), dec!(60), 2).await);
    }

    let mut tasks = Vec::new();
    for product in &products {
        for _ in 0..4 {
            let recorder = app.state.sale_recorder.clone();
            let id = product.id;
            tasks.push(tokio::spawn(async move { recorder.record_sale(id, dec!(60)).await }));
        }
    }

    let (mut sold, mut out_of_stock) = (0, 0);
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => sold += 1,
            Err(ServiceError::OutOfStock(_)) => out_of_stock += 1,
            Err(other) => panic!("unexpected sale error: {other}"),
        }
    }
    assert_eq!(sold, 40);
    assert_eq!(out_of_stock, 40);

    for product in &products {
        let ledger = app.state.product_store.ledger(product.id).await.unwrap();
        assert!(ledger.consistent, "{}", product.name);
        assert_eq!(ledger.stock_count, 0);
        assert_eq!(ledger.recorded_sales, 2);
        assert_eq!(ledger.recorded_profit, dec!(60));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn delete_racing_a_sale_never_orphans_history() {
    let (app, _dir) = TestApp::with_file_db(8).await;
    let mut products = Vec::new();
    for i in 0..10 {
        products.push(app.seed_product(&format!("Raced {i}"), dec!(10), dec!(20), 1).await);
    }

    let mut races = Vec::new();
    for product in &products {
        let id = product.id;
        let store = app.state.product_store.clone();
        let recorder = app.state.sale_recorder.clone();
        let delete = tokio::spawn(async move { store.delete(id).await });
        let sell = tokio::spawn(async move { recorder.record_sale(id, dec!(20)).await });
        races.push((id, delete, sell));
    }

    for (id, delete, sell) in races {
        let deleted = delete.await.unwrap();
        let sold = sell.await.unwrap();
        let rows = sale::Entity::find()
            .filter(sale::Column::ProductId.eq(id))
            .count(app.state.db.as_ref())
            .await
            .unwrap();

        match (&deleted, &sold) {
            (Ok(()), Err(ServiceError::NotFound(_))) => assert_eq!(rows, 0),
            (Err(ServiceError::HasSalesHistory(_)), Ok(_)) => {
                assert_eq!(rows, 1);
                let ledger = app.state.product_store.ledger(id).await.unwrap();
                assert!(ledger.consistent);
            }
            other => panic!("unexpected outcome for {id}: {other:?}"),
        }
    }
}

#[tokio::test]
async fn delete_refuses_when_sale_rows_exist_without_counters() {
    let app = TestApp::new().await;
    let product = app.seed_product("Orphaned", dec!(10), dec!(20), 1).await;

    sale::ActiveModel {
        id: Set(Uuid::new_v4()),
        product_id: Set(product.id),
        product_name: Set(product.name.clone()),
        sale_price: Set(dec!(20)),
        cost_price: Set(dec!(10)),
        profit: Set(dec!(10)),
        quantity: Set(1),
        sale_date: Set(Utc::now()),
        timestamp: Set(Utc::now().timestamp_millis()),
    }
    .insert(app.state.db.as_ref())
    .await
    .unwrap();
    let before = app.state.product_store.get(product.id).await.unwrap();

    let err = app.state.product_store.delete(product.id).await.unwrap_err();
    assert!(matches!(err, ServiceError::HasSalesHistory(_)));

    let after = app.state.product_store.get(product.id).await.unwrap();
    assert_eq!(after, before);
}
