//! Payment application integration tests for invoicing-service.

mod common;

use axum::http::{Method, StatusCode};
use common::{decimal, worked_example, TestApp};
use rust_decimal_macros::dec;
use serde_json::{json, Value};

async fn invoice_uri(app: &TestApp) -> String {
    let invoice = app.create_invoice(worked_example("ap@globex.test")).await;
    format!("/invoices/{}", invoice["invoice_id"].as_str().unwrap())
}

async fn pay(app: &TestApp, uri: &str, body: Value) -> (StatusCode, Value) {
    app.request(Method::PATCH, uri, Some(body)).await
}

#[tokio::test]
async fn partial_payment_reduces_balance() {
    let app = TestApp::spawn().await;
    let uri = invoice_uri(&app).await;

    let (status, invoice) = pay(&app, &uri, json!({ "amount": "40", "kind": "partial" })).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(decimal(&invoice["amount_paid"]), dec!(40));
    assert_eq!(decimal(&invoice["balance_due"]), dec!(64));
    assert_eq!(invoice["status"], "PARTIALLY_PAID");
    assert_eq!(invoice["version"], 2);
}

#[tokio::test]
async fn partial_payments_accumulate_until_settled() {
    let app = TestApp::spawn().await;
    let uri = invoice_uri(&app).await;

    pay(&app, &uri, json!({ "amount": 50 })).await;
    let (_, invoice) = pay(&app, &uri, json!({ "amount": 30 })).await;
    assert_eq!(decimal(&invoice["amount_paid"]), dec!(80));
    assert_eq!(decimal(&invoice["balance_due"]), dec!(24));

    let (status, settled) = pay(&app, &uri, json!({ "kind": "full" })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(decimal(&settled["amount_paid"]), dec!(104));
    assert_eq!(decimal(&settled["balance_due"]), dec!(0));
    assert_eq!(settled["status"], "PAID");
}

#[tokio::test]
async fn partial_payment_outside_bounds_is_rejected() {
    let app = TestApp::spawn().await;
    let uri = invoice_uri(&app).await;

    for amount in [json!(0), json!(-5), json!(104), json!("150.00")] {
        let (status, error) = pay(&app, &uri, json!({ "amount": amount, "kind": "partial" })).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY, "amount {} accepted", amount);
        assert_eq!(error["error"], "Validation error");
        assert!(error["details"]
            .as_str()
            .unwrap()
            .contains("less than balance due"));
    }

    let (_, invoice) = app.request(Method::GET, &uri, None).await;
    assert_eq!(decimal(&invoice["amount_paid"]), dec!(0));
    assert_eq!(invoice["version"], 1);
}

#[tokio::test]
async fn full_payment_of_settled_invoice_is_rejected() {
    let app = TestApp::spawn().await;
    let uri = invoice_uri(&app).await;
    pay(&app, &uri, json!({})).await;

    let (status, _) = pay(&app, &uri, json!({ "kind": "full" })).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn payment_clears_cached_document() {
    let app = TestApp::spawn().await;
    let uri = invoice_uri(&app).await;
    let (status, artifact) = app
        .request(
            Method::POST,
            &format!("{}/artifacts", uri),
            Some(json!({ "format": "pdf" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let (_, before) = app.request(Method::GET, &uri, None).await;
    assert_eq!(before["pdf_url"], artifact["url"]);

    let (_, paid) = pay(&app, &uri, json!({ "amount": 10 })).await;

    assert!(paid["pdf_url"].is_null());
}

#[tokio::test]
async fn paying_unknown_invoice_is_not_found() {
    let app = TestApp::spawn().await;

    let (status, _) = pay(
        &app,
        &format!("/invoices/{}", uuid::Uuid::new_v4()),
        json!({ "amount": 10 }),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}
