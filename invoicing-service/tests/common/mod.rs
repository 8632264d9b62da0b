#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use invoicing_service::models::{Business, BusinessProfile, InvoiceSettings, User};
use invoicing_service::rendering::{
    BrowserSession, DocumentFormat, DocumentRenderer, HeadlessBrowser, RenderError, TemplateKind,
    TemplateRegistry,
};
use invoicing_service::services::{ArtifactPublisher, LocalStorage, MemoryStore, Storage};
use invoicing_service::startup::{build_router, AppState};
use rust_decimal::Decimal;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;
use uuid::Uuid;

pub const PUBLIC_BASE_URL: &str = "http://files.test";
pub const ELEGANT_KEY: &str = "ELEGANT-2026";

/// Headless browser stand-in that echoes the HTML it was given.
#[derive(Default)]
pub struct FakeBrowser {
    pub launches: AtomicUsize,
    pub closes: Arc<AtomicUsize>,
    pub fail: AtomicBool,
}

struct FakeSession {
    closes: Arc<AtomicUsize>,
    fail: bool,
}

#[async_trait]
impl HeadlessBrowser for FakeBrowser {
    async fn launch(&self) -> Result<Box<dyn BrowserSession>, RenderError> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeSession {
            closes: self.closes.clone(),
            fail: self.fail.load(Ordering::SeqCst),
        }))
    }
}

#[async_trait]
impl BrowserSession for FakeSession {
    async fn render(&mut self, html: &str, format: DocumentFormat) -> Result<Vec<u8>, RenderError> {
        if self.fail {
            return Err(RenderError::Browser("page crashed".to_string()));
        }
        Ok(format!("{}\n{}", format.as_str(), html).into_bytes())
    }

    async fn close(self: Box<Self>) -> Result<(), RenderError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl FakeBrowser {
    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

pub struct TestApp {
    pub router: Router,
    pub store: Arc<MemoryStore>,
    pub browser: Arc<FakeBrowser>,
    pub storage_dir: TempDir,
    pub user_id: Uuid,
}

impl TestApp {
    pub async fn spawn() -> Self {
        let store = Arc::new(MemoryStore::new());
        let user_id = seed_account(&store, "Acme Studio");

        let storage_dir = tempfile::tempdir().expect("Failed to create storage dir");
        let storage: Arc<dyn Storage> = Arc::new(
            LocalStorage::new(storage_dir.path())
                .await
                .expect("Failed to create storage"),
        );

        let browser = Arc::new(FakeBrowser::default());
        let registry = TemplateRegistry::new(
            TemplateKind::Classic,
            HashMap::from([(ELEGANT_KEY.to_string(), TemplateKind::Elegant)]),
        );
        let renderer = DocumentRenderer::new(browser.clone(), registry, "https://fonts.test/inter.css");
        let publisher = ArtifactPublisher::new(storage, PUBLIC_BASE_URL);

        let state = AppState::new(
            store.clone(),
            renderer,
            publisher,
            Some(storage_dir.path().to_path_buf()),
        );

        TestApp {
            router: build_router(state),
            store,
            browser,
            storage_dir,
            user_id,
        }
    }

    /// Register another account on the same store.
    pub fn add_account(&self, business_name: &str) -> Uuid {
        seed_account(&self.store, business_name)
    }

    pub async fn request(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        self.request_as(self.user_id, method, uri, body).await
    }

    pub async fn request_as(
        &self,
        user_id: Uuid,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("X-User-ID", user_id.to_string());
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string())),
            None => builder.body(Body::empty()),
        }
        .unwrap();

        let (status, bytes) = self.send(request).await;
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, bytes.to_vec())
    }

    pub async fn create_invoice(&self, body: Value) -> Value {
        let (status, invoice) = self.request(Method::POST, "/invoices", Some(body)).await;
        assert_eq!(status, StatusCode::CREATED, "create failed: {}", invoice);
        invoice
    }
}

fn seed_account(store: &MemoryStore, business_name: &str) -> Uuid {
    let user_id = Uuid::new_v4();
    let business_id = Uuid::new_v4();
    store
        .insert_profile(
            User {
                user_id,
                name: "Jordan Lee".to_string(),
                email: format!("{}@acme.test", user_id.simple()),
            },
            BusinessProfile {
                business: Business {
                    business_id,
                    user_id,
                    name: business_name.to_string(),
                    address: Some("1 Main St\nSpringfield".to_string()),
                    email: Some("billing@acme.test".to_string()),
                    phone: None,
                    logo_url: None,
                    tax_id: None,
                },
                settings: InvoiceSettings {
                    business_id,
                    due_days: 30,
                    default_tax_rate: Decimal::ZERO,
                    currency: "USD".to_string(),
                    invoice_prefix: "INV-".to_string(),
                    next_sequence: 1,
                    default_notes: None,
                    default_terms: None,
                    payment_info: Some("Bank transfer to 0001".to_string()),
                    payment_qr_url: None,
                    active_template: "classic".to_string(),
                },
            },
        )
        .expect("Failed to seed account");
    user_id
}

/// 2 × 50 with 10% discount, 10% tax and 5 shipping: total 104.
pub fn worked_example(new_client_email: &str) -> Value {
    serde_json::json!({
        "new_client": {
            "name": "Globex",
            "email": new_client_email
        },
        "discount_type": "PERCENTAGE",
        "discount_value": 10,
        "tax_rate": 10,
        "shipping_cost": 5,
        "line_items": [
            { "description": "Design work", "quantity": 2, "rate": 50 }
        ]
    })
}

pub fn decimal(value: &Value) -> Decimal {
    value
        .as_str()
        .and_then(|s| s.parse().ok())
        .or_else(|| value.as_f64().and_then(|f| Decimal::try_from(f).ok()))
        .unwrap_or_else(|| panic!("not a decimal: {}", value))
}
