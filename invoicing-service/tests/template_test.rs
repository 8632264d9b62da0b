//! Template catalogue and settings integration tests for invoicing-service.

mod common;

use axum::http::{Method, StatusCode};
use common::{worked_example, TestApp, ELEGANT_KEY};
use serde_json::json;

#[tokio::test]
async fn catalog_lists_built_ins_and_default_active() {
    let app = TestApp::spawn().await;

    let (status, catalog) = app.request(Method::GET, "/templates", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(catalog["built_in"], json!(["classic", "modern", "minimal"]));
    assert_eq!(catalog["unlocked"], json!([]));
    assert_eq!(catalog["active"], "classic");
}

#[tokio::test]
async fn registration_key_unlocks_template_once() {
    let app = TestApp::spawn().await;

    let (status, unlocked) = app
        .request(Method::POST, "/templates/unlock", Some(json!({ "key": ELEGANT_KEY })))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(unlocked["template"], "elegant");

    let (status, _) = app
        .request(Method::POST, "/templates/unlock", Some(json!({ "key": ELEGANT_KEY })))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, catalog) = app.request(Method::GET, "/templates", None).await;
    assert_eq!(catalog["unlocked"], json!(["elegant"]));
}

#[tokio::test]
async fn unknown_registration_key_is_rejected() {
    let app = TestApp::spawn().await;

    let (status, _) = app
        .request(Method::POST, "/templates/unlock", Some(json!({ "key": "NOPE" })))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn only_available_templates_can_be_activated() {
    let app = TestApp::spawn().await;

    let (status, _) = app
        .request(Method::PUT, "/templates/active", Some(json!({ "template": "corporate" })))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .request(Method::PUT, "/templates/active", Some(json!({ "template": "baroque" })))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, profile) = app
        .request(Method::PUT, "/templates/active", Some(json!({ "template": "Modern" })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(profile["settings"]["active_template"], "modern");
}

#[tokio::test]
async fn active_template_drives_regenerated_documents() {
    let app = TestApp::spawn().await;
    app.request(Method::POST, "/templates/unlock", Some(json!({ "key": ELEGANT_KEY })))
        .await;
    app.request(Method::PUT, "/templates/active", Some(json!({ "template": "elegant" })))
        .await;
    let invoice = app.create_invoice(worked_example("ap@globex.test")).await;

    let (status, artifact) = app
        .request(
            Method::POST,
            &format!("/invoices/{}/artifacts", invoice["invoice_id"].as_str().unwrap()),
            Some(json!({})),
        )
        .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(artifact["template"], "elegant");
}

#[tokio::test]
async fn active_template_cannot_be_removed() {
    let app = TestApp::spawn().await;
    app.request(Method::POST, "/templates/unlock", Some(json!({ "key": ELEGANT_KEY })))
        .await;
    app.request(Method::PUT, "/templates/active", Some(json!({ "template": "elegant" })))
        .await;

    let (status, _) = app.request(Method::DELETE, "/templates/elegant", None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    app.request(Method::PUT, "/templates/active", Some(json!({ "template": "classic" })))
        .await;
    let (status, _) = app.request(Method::DELETE, "/templates/elegant", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = app.request(Method::DELETE, "/templates/elegant", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn built_in_templates_cannot_be_removed() {
    let app = TestApp::spawn().await;

    let (status, _) = app.request(Method::DELETE, "/templates/modern", None).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn settings_update_changes_numbering_and_defaults() {
    let app = TestApp::spawn().await;

    let (status, profile) = app
        .request(
            Method::PUT,
            "/settings",
            Some(json!({
                "invoice_prefix": "ACME-",
                "currency": "eur",
                "default_notes": "Thanks!",
                "due_days": 14
            })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(profile["settings"]["currency"], "EUR");
    assert_eq!(profile["business"]["name"], "Acme Studio");

    let mut body = worked_example("ap@globex.test");
    body["invoice_date"] = json!("2026-03-01");
    let invoice = app.create_invoice(body).await;
    assert_eq!(invoice["invoice_number"], "ACME-0001");
    assert_eq!(invoice["notes"], "Thanks!");
    assert_eq!(invoice["due_date"], "2026-03-15");
}

#[tokio::test]
async fn invalid_settings_are_rejected() {
    let app = TestApp::spawn().await;

    let (status, _) = app
        .request(
            Method::PUT,
            "/settings",
            Some(json!({ "currency": "EURO", "email": "not-an-email" })),
        )
        .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}
