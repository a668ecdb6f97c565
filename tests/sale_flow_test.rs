mod common;

use assert_matches::assert_matches;
use axum::http::StatusCode;
use common::{money, response_json, TestApp};
use rust_decimal_macros::dec;
use serde_json::json;
use shoetrack_api::errors::ServiceError;
use uuid::Uuid;

#[tokio::test]
async fn sale_updates_counters_and_appends_a_record() {
    let app = TestApp::new().await;
    let product = app.seed_product("Runner", dec!(40), dec!(90), 2).await;

    let response = app
        .post(
            "/api/v1/products/sell",
            json!({ "productId": product.id, "salePrice": 80 }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["stockCount"], 1);
    assert_eq!(body["totalSales"], 1);
    assert_eq!(body["isSold"], false);
    assert_eq!(money(&body["actualProfit"]), dec!(40));
    assert_eq!(money(&body["lastSalePrice"]), dec!(80));

    let sales = app.state.sale_recorder.history(product.id).await.unwrap();
    assert_eq!(sales.len(), 1);
    assert_eq!(sales[0].profit, dec!(40));
    assert_eq!(sales[0].cost_price, dec!(40));
    assert_eq!(sales[0].sale_price, dec!(80));
    assert_eq!(sales[0].product_name, "Runner");
}

#[tokio::test]
async fn last_unit_marks_product_sold_once() {
    let app = TestApp::new().await;
    let product = app.seed_product("Last pair", dec!(30), dec!(60), 1).await;

    let receipt = app
        .state
        .sale_recorder
        .record_sale(product.id, dec!(55))
        .await
        .unwrap();
    assert!(receipt.sold_out());
    assert!(receipt.product.is_sold);
    let date_sold = receipt.product.date_sold.expect("date sold set");

    let again = app
        .state
        .sale_recorder
        .record_sale(product.id, dec!(55))
        .await;
    assert_matches!(again, Err(ServiceError::OutOfStock(_)));

    let after = app.state.product_store.get(product.id).await.unwrap();
    assert_eq!(after.stock_count, 0);
    assert_eq!(after.total_sales, 1);
    assert_eq!(after.date_sold, Some(date_sold));
}

#[tokio::test]
async fn selling_at_zero_stock_changes_nothing() {
    let app = TestApp::new().await;
    let product = app.seed_product("Gone", dec!(10), dec!(20), 1).await;
    app.state
        .sale_recorder
        .record_sale(product.id, dec!(20))
        .await
        .unwrap();
    let before = app.state.product_store.get(product.id).await.unwrap();

    let response = app
        .post(
            "/api/v1/products/sell",
            json!({ "productId": product.id, "salePrice": 20 }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(response_json(response).await["message"], "Product is out of stock");

    let after = app.state.product_store.get(product.id).await.unwrap();
    assert_eq!(before, after);
    assert_eq!(app.state.sale_recorder.history(product.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn sale_input_is_checked_before_the_store() {
    let app = TestApp::new().await;
    let product = app.seed_product("Checked", dec!(10), dec!(20), 3).await;

    let missing_id = app.post("/api/v1/products/sell", json!({ "salePrice": 20 })).await;
    assert_eq!(missing_id.status(), StatusCode::BAD_REQUEST);
    assert_eq!(response_json(missing_id).await["message"], "Product ID is required");

    for price in [json!(0), json!(-5), json!(null)] {
        let response = app
            .post(
                "/api/v1/products/sell",
                json!({ "productId": product.id, "salePrice": price }),
            )
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(response_json(response).await["message"], "Valid sale price is required");
    }

    let unknown = app
        .post(
            "/api/v1/products/sell",
            json!({ "productId": Uuid::new_v4(), "salePrice": 20 }),
        )
        .await;
    assert_eq!(unknown.status(), StatusCode::NOT_FOUND);

    let garbage = app
        .post("/api/v1/products/sell", json!({ "productId": "not-a-uuid", "salePrice": 20 }))
        .await;
    assert_eq!(garbage.status(), StatusCode::NOT_FOUND);

    // A bad price is reported even when the id would not parse.
    let both_bad = app
        .post("/api/v1/products/sell", json!({ "productId": "not-a-uuid", "salePrice": 0 }))
        .await;
    assert_eq!(both_bad.status(), StatusCode::BAD_REQUEST);
    assert_eq!(response_json(both_bad).await["message"], "Valid sale price is required");

    let untouched = app.state.product_store.get(product.id).await.unwrap();
    assert_eq!(untouched.stock_count, 3);
}

#[tokio::test]
async fn loss_making_sales_book_negative_profit() {
    let app = TestApp::new().await;
    let product = app.seed_product("Clearance", dec!(50), dec!(70), 2).await;

    let receipt = app
        .state
        .sale_recorder
        .record_sale(product.id, dec!(35.50))
        .await
        .unwrap();
    assert_eq!(receipt.sale.profit, dec!(-14.50));
    assert_eq!(receipt.product.actual_profit, dec!(-14.50));
}

#[tokio::test]
async fn ledger_matches_sale_history() {
    let app = TestApp::new().await;
    let product = app.seed_product("Ledger", dec!(20), dec!(45), 4).await;
    for price in [dec!(45), dec!(40), dec!(50.25)] {
        app.state
            .sale_recorder
            .record_sale(product.id, price)
            .await
            .unwrap();
    }

    let response = app.get(&format!("/api/v1/products/{}/ledger", product.id)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let report = response_json(response).await;
    assert_eq!(report["consistent"], true);
    assert_eq!(report["totalSales"], 3);
    assert_eq!(report["recordedSales"], 3);
    assert_eq!(report["stockCount"], 1);
    assert_eq!(money(&report["recordedProfit"]), dec!(75.25));
    assert_eq!(money(&report["actualProfit"]), dec!(75.25));

    let history = response_json(app.get(&format!("/api/v1/products/{}/sales", product.id)).await).await;
    let prices: Vec<_> = history
        .as_array()
        .unwrap()
        .iter()
        .map(|s| money(&s["salePrice"]))
        .collect();
    assert_eq!(prices, vec![dec!(45), dec!(40), dec!(50.25)]);
}

#[tokio::test]
async fn dashboard_reflects_sales() {
    let app = TestApp::new().await;
    let a = app.seed_product("A", dec!(10), dec!(30), 2).await;
    app.seed_product("B", dec!(5), dec!(15), 2).await;
    app.state.sale_recorder.record_sale(a.id, dec!(25)).await.unwrap();

    let stats = response_json(app.get("/api/v1/products/stats").await).await;
    assert_eq!(stats["totalProducts"], 2);
    assert_eq!(stats["totalStock"], 3);
    assert_eq!(stats["totalOriginalStock"], 4);
    assert_eq!(stats["totalSales"], 1);
    assert_eq!(stats["todaySales"], 1);
    assert_eq!(money(&stats["todayProfit"]), dec!(15));
    assert_eq!(money(&stats["totalActualProfit"]), dec!(15));
    // A: 20 x 1 left, B: 10 x 2 left
    assert_eq!(money(&stats["totalExpectedProfit"]), dec!(40));
    assert_eq!(money(&stats["sellThroughRate"]), dec!(25));
}
