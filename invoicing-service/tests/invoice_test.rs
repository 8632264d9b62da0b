//! Invoice create, edit and delete integration tests for invoicing-service.

mod common;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use common::{decimal, worked_example, TestApp};
use rust_decimal_macros::dec;
use serde_json::json;

#[tokio::test]
async fn create_invoice_recomputes_worked_example() {
    let app = TestApp::spawn().await;

    let invoice = app.create_invoice(worked_example("ap@globex.test")).await;

    assert_eq!(decimal(&invoice["subtotal"]), dec!(100));
    assert_eq!(decimal(&invoice["discount_amount"]), dec!(10));
    assert_eq!(decimal(&invoice["tax_amount"]), dec!(9));
    assert_eq!(decimal(&invoice["total"]), dec!(104));
    assert_eq!(decimal(&invoice["balance_due"]), dec!(104));
    assert_eq!(invoice["status"], "PENDING");
    assert_eq!(invoice["invoice_number"], "INV-0001");
    assert_eq!(invoice["version"], 1);
    assert_eq!(invoice["line_items"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn client_supplied_totals_are_ignored() {
    let app = TestApp::spawn().await;
    let mut body = worked_example("ap@globex.test");
    body["total"] = json!("1.00");
    body["subtotal"] = json!("1.00");

    let invoice = app.create_invoice(body).await;

    assert_eq!(decimal(&invoice["total"]), dec!(104));
}

#[tokio::test]
async fn invoice_numbers_are_allocated_in_sequence() {
    let app = TestApp::spawn().await;

    let first = app.create_invoice(worked_example("a@globex.test")).await;
    let second = app.create_invoice(worked_example("b@globex.test")).await;

    assert_eq!(first["invoice_number"], "INV-0001");
    assert_eq!(second["invoice_number"], "INV-0002");
}

#[tokio::test]
async fn duplicate_invoice_number_is_conflict() {
    let app = TestApp::spawn().await;
    let mut body = worked_example("a@globex.test");
    body["invoice_number"] = json!("ACME-7");
    app.create_invoice(body).await;

    let mut again = worked_example("b@globex.test");
    again["invoice_number"] = json!("ACME-7");
    let (status, _) = app.request(Method::POST, "/invoices", Some(again)).await;

    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn duplicate_client_email_is_conflict() {
    let app = TestApp::spawn().await;
    app.create_invoice(worked_example("ap@globex.test")).await;

    let (status, _) = app
        .request(
            Method::POST,
            "/invoices",
            Some(worked_example("AP@globex.test")),
        )
        .await;

    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn existing_client_can_be_reused() {
    let app = TestApp::spawn().await;
    let first = app.create_invoice(worked_example("ap@globex.test")).await;

    let second = app
        .create_invoice(json!({
            "client_id": first["client_id"],
            "line_items": [{ "description": "Hosting", "quantity": 1, "rate": "20" }]
        }))
        .await;

    assert_eq!(second["client_id"], first["client_id"]);
    assert_eq!(decimal(&second["total"]), dec!(20));
}

#[tokio::test]
async fn client_reference_must_be_exactly_one() {
    let app = TestApp::spawn().await;
    let first = app.create_invoice(worked_example("ap@globex.test")).await;

    let mut both = worked_example("other@globex.test");
    both["client_id"] = first["client_id"].clone();
    let (status, _) = app.request(Method::POST, "/invoices", Some(both)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .request(
            Method::POST,
            "/invoices",
            Some(json!({
                "line_items": [{ "description": "Hosting", "quantity": 1, "rate": 20 }]
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn negative_inputs_are_rejected() {
    let app = TestApp::spawn().await;
    let mut body = worked_example("ap@globex.test");
    body["line_items"][0]["rate"] = json!(-50);

    let (status, error) = app.request(Method::POST, "/invoices", Some(body)).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(error["error"], "Validation error");
}

#[tokio::test]
async fn preview_treats_non_numeric_inputs_as_zero() {
    let app = TestApp::spawn().await;

    let (status, preview) = app
        .request(
            Method::POST,
            "/invoices/preview",
            Some(json!({
                "line_items": [
                    { "quantity": 2, "rate": "50" },
                    { "quantity": "abc", "rate": 10 }
                ],
                "discount_type": "FIXED",
                "discount_value": "500",
                "shipping_cost": "4.5",
                "tax_rate": ""
            })),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(decimal(&preview["line_amounts"][1]), dec!(0));
    assert_eq!(decimal(&preview["subtotal"]), dec!(100));
    assert_eq!(decimal(&preview["discount_amount"]), dec!(100));
    assert_eq!(decimal(&preview["total"]), dec!(4.5));
}

#[tokio::test]
async fn preview_with_overflowing_amounts_is_unprocessable() {
    let app = TestApp::spawn().await;

    let (status, error) = app
        .request(
            Method::POST,
            "/invoices/preview",
            Some(json!({
                "line_items": [{ "quantity": "1e20", "rate": "1e20" }]
            })),
        )
        .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(error["error"], "Validation error");
}

#[tokio::test]
async fn oversized_amounts_are_rejected_on_create_and_update() {
    let app = TestApp::spawn().await;

    let mut body = worked_example("ap@globex.test");
    body["line_items"][0]["quantity"] = json!("1e20");
    body["line_items"][0]["rate"] = json!("1e20");
    let (status, error) = app.request(Method::POST, "/invoices", Some(body)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(error["error"], "Validation error");

    // Each input fits its column but the line amount does not.
    let invoice = app.create_invoice(worked_example("ap@globex.test")).await;
    let body = json!({
        "client_id": invoice["client_id"],
        "line_items": [
            { "description": "Retainer", "quantity": "9999999999", "rate": "9999999999" }
        ]
    });
    let (status, _) = app
        .request(
            Method::PUT,
            &format!("/invoices/{}", invoice["invoice_id"].as_str().unwrap()),
            Some(body),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn requests_without_identity_are_unauthorized() {
    let app = TestApp::spawn().await;
    let request = Request::builder()
        .method(Method::GET)
        .uri("/invoices")
        .body(Body::empty())
        .unwrap();

    let (status, _) = app.send(request).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn invoices_are_scoped_to_their_owner() {
    let app = TestApp::spawn().await;
    let invoice = app.create_invoice(worked_example("ap@globex.test")).await;
    let stranger = app.add_account("Initech");

    let uri = format!("/invoices/{}", invoice["invoice_id"].as_str().unwrap());
    let (status, _) = app.request_as(stranger, Method::GET, &uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, fetched) = app.request(Method::GET, &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["invoice_id"], invoice["invoice_id"]);
}

#[tokio::test]
async fn full_edit_recomputes_and_regenerates_pdf() {
    let app = TestApp::spawn().await;
    let invoice = app.create_invoice(worked_example("ap@globex.test")).await;
    let uri = format!("/invoices/{}", invoice["invoice_id"].as_str().unwrap());

    let (status, updated) = app
        .request(
            Method::PUT,
            &uri,
            Some(json!({
                "client_id": invoice["client_id"],
                "invoice_number": "INV-0001",
                "tax_rate": 0,
                "line_items": [
                    { "description": "Design work", "quantity": 3, "rate": 50 },
                    { "description": "Hosting", "quantity": 1, "rate": "12.50" }
                ]
            })),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert!(updated.get("render_error").is_none());
    let saved = &updated["invoice"];
    assert_eq!(decimal(&saved["total"]), dec!(162.50));
    assert_eq!(saved["version"], 2);
    assert_eq!(saved["line_items"].as_array().unwrap().len(), 2);
    assert!(saved["pdf_url"]
        .as_str()
        .unwrap()
        .starts_with("http://files.test/artifacts/"));
    assert_eq!(app.browser.launches(), 1);
    assert_eq!(app.browser.closes(), 1);
}

#[tokio::test]
async fn edit_that_fails_to_render_still_persists() {
    let app = TestApp::spawn().await;
    let invoice = app.create_invoice(worked_example("ap@globex.test")).await;
    let uri = format!("/invoices/{}", invoice["invoice_id"].as_str().unwrap());
    app.browser.set_failing(true);

    let (status, updated) = app
        .request(
            Method::PUT,
            &uri,
            Some(json!({
                "client_id": invoice["client_id"],
                "line_items": [{ "description": "Design work", "quantity": 1, "rate": 80 }]
            })),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert!(updated["render_error"].as_str().is_some());
    assert!(updated["invoice"]["pdf_url"].is_null());
    assert_eq!(app.browser.closes(), 1);

    let (_, fetched) = app.request(Method::GET, &uri, None).await;
    assert_eq!(decimal(&fetched["subtotal"]), dec!(80));
}

#[tokio::test]
async fn invoice_number_cannot_be_changed_on_edit() {
    let app = TestApp::spawn().await;
    let invoice = app.create_invoice(worked_example("ap@globex.test")).await;
    let uri = format!("/invoices/{}", invoice["invoice_id"].as_str().unwrap());

    let (status, _) = app
        .request(
            Method::PUT,
            &uri,
            Some(json!({
                "client_id": invoice["client_id"],
                "invoice_number": "INV-9999",
                "line_items": [{ "description": "Design work", "quantity": 1, "rate": 80 }]
            })),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn delete_removes_invoice() {
    let app = TestApp::spawn().await;
    let invoice = app.create_invoice(worked_example("ap@globex.test")).await;
    let uri = format!("/invoices/{}", invoice["invoice_id"].as_str().unwrap());

    let (status, _) = app.request(Method::DELETE, &uri, None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = app.request(Method::GET, &uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app.request(Method::DELETE, &uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn suggestions_return_latest_rate_by_prefix() {
    let app = TestApp::spawn().await;
    app.create_invoice(worked_example("ap@globex.test")).await;

    let (status, suggestions) = app
        .request(Method::GET, "/line-items/suggestions?q=des", None)
        .await;

    assert_eq!(status, StatusCode::OK);
    let suggestions = suggestions.as_array().unwrap();
    assert_eq!(suggestions.len(), 1);
    assert_eq!(suggestions[0]["description"], "Design work");
    assert_eq!(decimal(&suggestions[0]["rate"]), dec!(50));

    let (_, empty) = app
        .request(Method::GET, "/line-items/suggestions?q=", None)
        .await;
    assert!(empty.as_array().unwrap().is_empty());
}
