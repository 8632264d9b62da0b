use crate::rendering::browser::HeadlessBrowser;
use crate::rendering::registry::{TemplateKind, TemplateRegistry};
use crate::rendering::templates::render_html;
use crate::rendering::view::{InvoiceView, RenderSource};
use crate::rendering::DocumentFormat;
use crate::services::metrics::{RENDERS_TOTAL, RENDER_DURATION};
use service_core::error::AppError;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, instrument, warn};

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Invoice document is missing {0} data")]
    MissingData(&'static str),

    #[error("Template error: {0}")]
    Template(#[from] askama::Error),

    #[error("Failed to launch browser: {0}")]
    Launch(String),

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Render timed out after {0} seconds")]
    Timeout(u64),

    #[error("Render I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<RenderError> for AppError {
    fn from(err: RenderError) -> Self {
        match err {
            RenderError::MissingData(_) => AppError::MissingData(anyhow::anyhow!(err.to_string())),
            other => AppError::RenderFailed(anyhow::anyhow!(other.to_string())),
        }
    }
}

/// Turns invoice data into a PDF or PNG document.
#[derive(Clone)]
pub struct DocumentRenderer {
    browser: Arc<dyn HeadlessBrowser>,
    registry: TemplateRegistry,
    font_url: String,
}

impl DocumentRenderer {
    pub fn new(
        browser: Arc<dyn HeadlessBrowser>,
        registry: TemplateRegistry,
        font_url: impl Into<String>,
    ) -> Self {
        Self {
            browser,
            registry,
            font_url: font_url.into(),
        }
    }

    pub fn registry(&self) -> &TemplateRegistry {
        &self.registry
    }

    /// Render with an already resolved template.
    ///
    /// The view model is assembled before the browser is touched, so
    /// missing data never costs a launch. The session is closed whether
    /// the capture succeeds or fails.
    #[instrument(
        skip(self, source),
        fields(
            invoice_id = %source.invoice.invoice_id,
            template = kind.as_str(),
            format = format.as_str()
        )
    )]
    pub async fn render(
        &self,
        source: &RenderSource,
        kind: TemplateKind,
        format: DocumentFormat,
    ) -> Result<Vec<u8>, RenderError> {
        let view = InvoiceView::build(source)?;
        let html = render_html(kind, &view, &self.font_url, format)?;

        let timer = RENDER_DURATION
            .with_label_values(&[format.as_str()])
            .start_timer();

        let result = self.capture(&html, format).await;

        timer.observe_duration();

        let outcome = if result.is_ok() { "success" } else { "failure" };
        RENDERS_TOTAL
            .with_label_values(&[format.as_str(), outcome])
            .inc();

        match &result {
            Ok(bytes) => info!(template = kind.as_str(), size = bytes.len(), "Document rendered"),
            Err(e) => warn!(template = kind.as_str(), error = %e, "Document render failed"),
        }

        result
    }

    async fn capture(&self, html: &str, format: DocumentFormat) -> Result<Vec<u8>, RenderError> {
        let mut session = self.browser.launch().await?;
        let rendered = session.render(html, format).await;

        if let Err(e) = session.close().await {
            warn!(error = %e, "Failed to close browser session");
        }

        rendered
    }

    /// Template `template_name` resolves to for an account that has unlocked
    /// `unlocked`.
    pub fn resolve_template(&self, template_name: &str, unlocked: &[String]) -> TemplateKind {
        self.registry.resolve(template_name, unlocked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        Business, BusinessProfile, Client, DiscountType, Invoice, InvoiceSettings, InvoiceStatus,
        User,
    };
    use crate::rendering::browser::BrowserSession;
    use async_trait::async_trait;
    use chrono::{NaiveDate, Utc};
    use rust_decimal::Decimal;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    #[derive(Default)]
    struct CountingBrowser {
        launches: AtomicUsize,
        closes: Arc<AtomicUsize>,
        fail_render: bool,
    }

    struct CountingSession {
        closes: Arc<AtomicUsize>,
        fail_render: bool,
    }

    #[async_trait]
    impl HeadlessBrowser for CountingBrowser {
        async fn launch(&self) -> Result<Box<dyn BrowserSession>, RenderError> {
            self.launches.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(CountingSession {
                closes: self.closes.clone(),
                fail_render: self.fail_render,
            }))
        }
    }

    #[async_trait]
    impl BrowserSession for CountingSession {
        async fn render(
            &mut self,
            html: &str,
            _format: DocumentFormat,
        ) -> Result<Vec<u8>, RenderError> {
            if self.fail_render {
                return Err(RenderError::Browser("crashed".to_string()));
            }
            Ok(html.as_bytes().to_vec())
        }

        async fn close(self: Box<Self>) -> Result<(), RenderError> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn source() -> RenderSource {
        let user_id = Uuid::new_v4();
        let business_id = Uuid::new_v4();
        let client_id = Uuid::new_v4();
        let today = NaiveDate::from_ymd_opt(2026, 1, 10).unwrap();
        RenderSource {
            invoice: Invoice {
                invoice_id: Uuid::new_v4(),
                user_id,
                client_id,
                invoice_number: "INV-0001".to_string(),
                invoice_date: today,
                due_date: None,
                status: InvoiceStatus::Pending,
                notes: None,
                terms: None,
                discount_type: DiscountType::Percentage,
                discount_value: Decimal::ZERO,
                tax_rate: Decimal::ZERO,
                shipping_cost: Decimal::ZERO,
                subtotal: Decimal::ONE_HUNDRED,
                discount_amount: Decimal::ZERO,
                tax_amount: Decimal::ZERO,
                total: Decimal::ONE_HUNDRED,
                amount_paid: Decimal::ZERO,
                balance_due: Decimal::ONE_HUNDRED,
                pdf_url: None,
                version: 1,
                line_items: Vec::new(),
                created_utc: Utc::now(),
                updated_utc: Utc::now(),
            },
            client: Some(Client {
                client_id,
                user_id,
                name: "Globex".to_string(),
                email: None,
                phone: None,
                address: None,
                created_utc: Utc::now(),
            }),
            profile: Some(BusinessProfile {
                business: Business {
                    business_id,
                    user_id,
                    name: "Acme".to_string(),
                    address: None,
                    email: None,
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
                    next_sequence: 2,
                    default_notes: None,
                    default_terms: None,
                    payment_info: None,
                    payment_qr_url: None,
                    active_template: "classic".to_string(),
                },
            }),
            user: Some(User {
                user_id,
                name: "Jordan".to_string(),
                email: "jordan@acme.test".to_string(),
            }),
        }
    }

    fn renderer(browser: Arc<CountingBrowser>) -> DocumentRenderer {
        DocumentRenderer::new(browser, TemplateRegistry::default(), "")
    }

    #[tokio::test]
    async fn missing_client_fails_before_browser_launch() {
        let browser = Arc::new(CountingBrowser::default());
        let mut source = source();
        source.client = None;

        let result = renderer(browser.clone())
            .render(&source, TemplateKind::Classic, DocumentFormat::Pdf)
            .await;

        assert!(matches!(result, Err(RenderError::MissingData("client"))));
        assert_eq!(browser.launches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn session_is_closed_after_success() {
        let browser = Arc::new(CountingBrowser::default());

        let bytes = renderer(browser.clone())
            .render(&source(), TemplateKind::Modern, DocumentFormat::Png)
            .await
            .unwrap();

        assert!(String::from_utf8(bytes).unwrap().contains("INV-0001"));
        assert_eq!(browser.launches.load(Ordering::SeqCst), 1);
        assert_eq!(browser.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn session_is_closed_after_failure() {
        let browser = Arc::new(CountingBrowser {
            fail_render: true,
            ..Default::default()
        });

        let result = renderer(browser.clone())
            .render(&source(), TemplateKind::Classic, DocumentFormat::Pdf)
            .await;

        assert!(matches!(result, Err(RenderError::Browser(_))));
        assert_eq!(browser.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn given_template_is_rendered_without_re_resolving() {
        let browser = Arc::new(CountingBrowser::default());
        let renderer = renderer(browser.clone());

        // Corporate is locked for an account with no unlocks.
        assert_eq!(
            renderer.resolve_template("corporate", &[]),
            TemplateKind::Classic
        );

        let corporate = renderer
            .render(&source(), TemplateKind::Corporate, DocumentFormat::Pdf)
            .await
            .unwrap();
        let classic = renderer
            .render(&source(), TemplateKind::Classic, DocumentFormat::Pdf)
            .await
            .unwrap();

        assert_ne!(corporate, classic);
    }

    #[test]
    fn missing_data_maps_to_its_own_error_class() {
        assert!(matches!(
            AppError::from(RenderError::MissingData("business")),
            AppError::MissingData(_)
        ));
        assert!(matches!(
            AppError::from(RenderError::Timeout(30)),
            AppError::RenderFailed(_)
        ));
    }
}
