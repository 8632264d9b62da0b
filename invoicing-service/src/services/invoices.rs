//! Invoice workflows: authoritative recomputation on save, payments, bulk
//! actions, the overdue sweep and document publishing.

use crate::dtos::{
    ArtifactRequest, ArtifactResponse, BulkRequest, BulkResponse, InvoiceListParams,
    InvoiceListResponse, InvoiceRequest, PaymentRequest, PreviewRequest, PreviewResponse,
    SuggestionParams, UpdateInvoiceResponse,
};
use crate::models::{
    BusinessProfile, CreateClient, CreateInvoice, Invoice, InvoiceFinancials, InvoiceStatus,
    ListInvoicesFilter, NewLineItem, RateSuggestion, ReplaceInvoice,
};
use crate::rendering::{DocumentFormat, DocumentRenderer, RenderSource};
use crate::dtos::invoices::bound_error;
use crate::services::calculator::{
    compute_totals, fits_numeric, line_amount, to_money, LineInput, TotalsInput,
};
use crate::services::metrics::{
    INVOICES_TOTAL, INVOICE_AMOUNT_TOTAL, OVERDUE_SWEPT_TOTAL, PAYMENTS_TOTAL,
    PAYMENT_AMOUNT_TOTAL,
};
use crate::services::payments::apply_payment;
use crate::services::publisher::ArtifactPublisher;
use crate::services::repository::InvoiceRepository;
use crate::services::status::resolve_status;
use chrono::{Days, NaiveDate, Utc};
use rust_decimal::prelude::ToPrimitive;
use service_core::error::AppError;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::{Validate, ValidationErrors};

pub const DEFAULT_PAGE_SIZE: i32 = 20;
pub const MAX_PAGE_SIZE: i32 = 100;
pub const DEFAULT_SUGGESTION_LIMIT: i64 = 5;
pub const MAX_SUGGESTION_LIMIT: i64 = 20;

#[derive(Clone)]
pub struct InvoiceService {
    repo: Arc<dyn InvoiceRepository>,
    renderer: DocumentRenderer,
    publisher: ArtifactPublisher,
}

/// Request fields after defaults are applied and totals recomputed.
struct PreparedInvoice {
    client_id: Uuid,
    invoice_date: NaiveDate,
    due_date: Option<NaiveDate>,
    notes: Option<String>,
    terms: Option<String>,
    financials: InvoiceFinancials,
    line_items: Vec<NewLineItem>,
    status: InvoiceStatus,
}

impl InvoiceService {
    pub fn new(
        repo: Arc<dyn InvoiceRepository>,
        renderer: DocumentRenderer,
        publisher: ArtifactPublisher,
    ) -> Self {
        Self {
            repo,
            renderer,
            publisher,
        }
    }

    /// Advisory totals for an unsaved draft. Never persisted; fails only when
    /// the figures overflow.
    pub fn preview(&self, req: &PreviewRequest) -> Result<PreviewResponse, AppError> {
        let items: Vec<LineInput> = req
            .line_items
            .iter()
            .map(|line| LineInput {
                quantity: line.quantity,
                rate: line.rate,
            })
            .collect();

        Ok(PreviewResponse {
            line_amounts: items
                .iter()
                .map(|item| line_amount(item.quantity, item.rate))
                .collect::<Result<_, _>>()?,
            totals: compute_totals(&TotalsInput {
                items,
                discount_type: req.discount_type,
                discount_value: req.discount_value,
                tax_rate: req.tax_rate,
                shipping_cost: req.shipping_cost,
                amount_paid: req.amount_paid,
            })?,
        })
    }

    #[instrument(skip(self, req), fields(user_id = %user_id))]
    pub async fn create(&self, user_id: Uuid, req: InvoiceRequest) -> Result<Invoice, AppError> {
        req.check()?;

        let profile = self.profile(user_id).await?;
        let client_id = self.resolve_client(user_id, &req).await?;
        let today = Utc::now().date_naive();
        let prepared = prepare(&req, client_id, &profile, None, today)?;

        let invoice = self
            .repo
            .create_invoice(&CreateInvoice {
                user_id,
                client_id: prepared.client_id,
                invoice_number: req.invoice_number.as_ref().map(|n| n.trim().to_string()),
                invoice_date: prepared.invoice_date,
                due_date: prepared.due_date,
                status: prepared.status,
                notes: prepared.notes,
                terms: prepared.terms,
                financials: prepared.financials,
                line_items: prepared.line_items,
            })
            .await?;

        INVOICES_TOTAL
            .with_label_values(&[invoice.status.as_str()])
            .inc();
        if let Some(amount) = invoice.total.to_f64() {
            INVOICE_AMOUNT_TOTAL
                .with_label_values(&[profile.settings.currency.as_str()])
                .inc_by(amount);
        }

        info!(
            invoice_id = %invoice.invoice_id,
            invoice_number = %invoice.invoice_number,
            total = %invoice.total,
            status = invoice.status.as_str(),
            "Invoice created"
        );

        Ok(invoice)
    }

    #[instrument(skip(self), fields(user_id = %user_id, invoice_id = %invoice_id))]
    pub async fn get(&self, user_id: Uuid, invoice_id: Uuid) -> Result<Invoice, AppError> {
        self.repo
            .get_invoice(user_id, invoice_id)
            .await?
            .ok_or_else(|| not_found(invoice_id))
    }

    /// List one page of invoices. Pending invoices past due are flipped to
    /// overdue first so the page reflects today's state.
    #[instrument(skip(self, params), fields(user_id = %user_id))]
    pub async fn list(
        &self,
        user_id: Uuid,
        params: InvoiceListParams,
    ) -> Result<InvoiceListResponse, AppError> {
        let swept = self
            .repo
            .mark_overdue(user_id, Utc::now().date_naive())
            .await?;
        if swept > 0 {
            OVERDUE_SWEPT_TOTAL
                .with_label_values(&["list"])
                .inc_by(swept as f64);
            info!(swept = swept, "Marked invoices overdue");
        }

        let page_size = params
            .page_size
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE);
        let invoices = self
            .repo
            .list_invoices(
                user_id,
                &ListInvoicesFilter {
                    status: params.status,
                    client_id: params.client_id,
                    page_size,
                    page_token: params.page_token,
                },
            )
            .await?;

        let next_page_token = if invoices.len() == page_size as usize {
            invoices.last().map(|invoice| invoice.invoice_id)
        } else {
            None
        };

        Ok(InvoiceListResponse {
            invoices,
            next_page_token,
        })
    }

    /// Replace an invoice and regenerate its PDF with the active template.
    ///
    /// The edit is committed before rendering. A render or upload failure is
    /// reported in `render_error` and leaves the invoice without a cached
    /// document.
    #[instrument(skip(self, req), fields(user_id = %user_id, invoice_id = %invoice_id))]
    pub async fn update(
        &self,
        user_id: Uuid,
        invoice_id: Uuid,
        req: InvoiceRequest,
    ) -> Result<UpdateInvoiceResponse, AppError> {
        req.check()?;

        let existing = self.get(user_id, invoice_id).await?;
        if let Some(number) = &req.invoice_number {
            if number.trim() != existing.invoice_number {
                return Err(AppError::BadRequest(anyhow::anyhow!(
                    "Invoice number cannot be changed"
                )));
            }
        }

        let profile = self.profile(user_id).await?;
        let client_id = self.resolve_client(user_id, &req).await?;
        let today = Utc::now().date_naive();
        let prepared = prepare(&req, client_id, &profile, Some(&existing), today)?;

        let invoice = self
            .repo
            .replace_invoice(
                user_id,
                invoice_id,
                &ReplaceInvoice {
                    client_id: prepared.client_id,
                    invoice_date: prepared.invoice_date,
                    due_date: prepared.due_date,
                    status: prepared.status,
                    notes: prepared.notes,
                    terms: prepared.terms,
                    financials: prepared.financials,
                    line_items: prepared.line_items,
                },
            )
            .await?
            .ok_or_else(|| not_found(invoice_id))?;

        info!(total = %invoice.total, status = invoice.status.as_str(), "Invoice updated");

        let active = profile.settings.active_template.clone();
        match self
            .publish(user_id, &invoice, &active, DocumentFormat::Pdf)
            .await
        {
            Ok((url, _)) => {
                let invoice = self
                    .repo
                    .set_pdf_url(user_id, invoice_id, &url)
                    .await?
                    .ok_or_else(|| not_found(invoice_id))?;
                Ok(UpdateInvoiceResponse {
                    invoice,
                    render_error: None,
                })
            }
            Err(e) => {
                warn!(error = %e, "Invoice saved but document regeneration failed");
                Ok(UpdateInvoiceResponse {
                    invoice,
                    render_error: Some(e.to_string()),
                })
            }
        }
    }

    #[instrument(skip(self, req), fields(user_id = %user_id, invoice_id = %invoice_id))]
    pub async fn pay(
        &self,
        user_id: Uuid,
        invoice_id: Uuid,
        req: PaymentRequest,
    ) -> Result<Invoice, AppError> {
        let kind = req.kind();
        let existing = self.get(user_id, invoice_id).await?;
        let applied = apply_payment(&existing, req.amount, kind, Utc::now().date_naive())?;

        let invoice = self
            .repo
            .save_payment(user_id, invoice_id, &applied.update)
            .await?
            .ok_or_else(|| not_found(invoice_id))?;

        PAYMENTS_TOTAL.with_label_values(&[kind.as_str()]).inc();
        if let Some(amount) = applied.amount.to_f64() {
            let currency = match self.repo.get_business_profile(user_id).await? {
                Some(profile) => profile.settings.currency,
                None => "unknown".to_string(),
            };
            PAYMENT_AMOUNT_TOTAL
                .with_label_values(&[currency.as_str()])
                .inc_by(amount);
        }

        info!(
            amount = %applied.amount,
            kind = kind.as_str(),
            balance_due = %invoice.balance_due,
            status = invoice.status.as_str(),
            "Payment recorded"
        );

        Ok(invoice)
    }

    #[instrument(skip(self), fields(user_id = %user_id, invoice_id = %invoice_id))]
    pub async fn delete(&self, user_id: Uuid, invoice_id: Uuid) -> Result<(), AppError> {
        if !self.repo.delete_invoice(user_id, invoice_id).await? {
            return Err(not_found(invoice_id));
        }
        info!("Invoice deleted");
        Ok(())
    }

    /// Apply one action to every selected invoice, or to none of them.
    #[instrument(skip(self, req), fields(user_id = %user_id, action = req.action.as_str()))]
    pub async fn bulk(&self, user_id: Uuid, req: BulkRequest) -> Result<BulkResponse, AppError> {
        req.validate()?;

        let mut seen = HashSet::new();
        let ids: Vec<Uuid> = req
            .invoice_ids
            .iter()
            .copied()
            .filter(|id| seen.insert(*id))
            .collect();

        let affected = self.repo.apply_bulk(user_id, &ids, req.action).await?;
        info!(affected = affected, "Bulk action applied");

        Ok(BulkResponse {
            action: req.action,
            affected,
        })
    }

    /// Render the invoice, publish the artifact and return its URL. A PDF
    /// also becomes the invoice's cached document.
    #[instrument(skip(self, req), fields(user_id = %user_id, invoice_id = %invoice_id))]
    pub async fn render_artifact(
        &self,
        user_id: Uuid,
        invoice_id: Uuid,
        req: ArtifactRequest,
    ) -> Result<ArtifactResponse, AppError> {
        let invoice = self.get(user_id, invoice_id).await?;
        let template = match req.template {
            Some(name) => name,
            None => self.profile(user_id).await?.settings.active_template,
        };

        let (url, resolved) = self
            .publish(user_id, &invoice, &template, req.format)
            .await?;

        if req.format == DocumentFormat::Pdf {
            self.repo.set_pdf_url(user_id, invoice_id, &url).await?;
        }

        Ok(ArtifactResponse {
            url,
            format: req.format,
            template: resolved,
        })
    }

    /// Previously billed descriptions starting with `q`, newest rate first.
    #[instrument(skip(self, params), fields(user_id = %user_id))]
    pub async fn suggestions(
        &self,
        user_id: Uuid,
        params: SuggestionParams,
    ) -> Result<Vec<RateSuggestion>, AppError> {
        let prefix = params.q.trim();
        if prefix.is_empty() {
            return Ok(Vec::new());
        }
        let limit = params
            .limit
            .unwrap_or(DEFAULT_SUGGESTION_LIMIT)
            .clamp(1, MAX_SUGGESTION_LIMIT);
        self.repo.suggest_rates(user_id, prefix, limit).await
    }

    /// Render with `template` and upload. Returns the URL and the name of the
    /// template actually used.
    async fn publish(
        &self,
        user_id: Uuid,
        invoice: &Invoice,
        template: &str,
        format: DocumentFormat,
    ) -> Result<(String, String), AppError> {
        let source = self.render_source(user_id, invoice.clone()).await?;
        let unlocked = self.unlocked_templates(user_id).await?;
        let kind = self.renderer.resolve_template(template, &unlocked);

        let bytes = self
            .renderer
            .render(&source, kind, format)
            .await?;
        let url = self
            .publisher
            .publish(user_id, bytes, &invoice.invoice_number, format)
            .await?;

        Ok((url, kind.as_str().to_string()))
    }

    /// Gather everything a document needs. Missing branches are left empty
    /// for the renderer to reject.
    async fn render_source(&self, user_id: Uuid, invoice: Invoice) -> Result<RenderSource, AppError> {
        let client = self.repo.get_client(user_id, invoice.client_id).await?;
        let profile = self.repo.get_business_profile(user_id).await?;
        let user = self.repo.get_user(user_id).await?;
        Ok(RenderSource {
            invoice,
            client,
            profile,
            user,
        })
    }

    async fn unlocked_templates(&self, user_id: Uuid) -> Result<Vec<String>, AppError> {
        Ok(self
            .repo
            .list_template_assignments(user_id)
            .await?
            .into_iter()
            .map(|assignment| assignment.template_name)
            .collect())
    }

    async fn profile(&self, user_id: Uuid) -> Result<BusinessProfile, AppError> {
        self.repo
            .get_business_profile(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Business profile not found")))
    }

    /// Exactly one of an existing client or inline new-client fields.
    async fn resolve_client(&self, user_id: Uuid, req: &InvoiceRequest) -> Result<Uuid, AppError> {
        match (req.client_id, &req.new_client) {
            (Some(_), Some(_)) => Err(AppError::BadRequest(anyhow::anyhow!(
                "Provide either client_id or new_client, not both"
            ))),
            (None, None) => Err(AppError::BadRequest(anyhow::anyhow!(
                "A client is required"
            ))),
            (Some(client_id), None) => {
                let client = self
                    .repo
                    .get_client(user_id, client_id)
                    .await?
                    .ok_or_else(|| {
                        AppError::NotFound(anyhow::anyhow!("Client {} not found", client_id))
                    })?;
                Ok(client.client_id)
            }
            (None, Some(new_client)) => {
                let client = self
                    .repo
                    .create_client(&CreateClient {
                        user_id,
                        name: new_client.name.trim().to_string(),
                        email: non_blank(&new_client.email),
                        phone: non_blank(&new_client.phone),
                        address: non_blank(&new_client.address),
                    })
                    .await?;
                info!(client_id = %client.client_id, "Client created with invoice");
                Ok(client.client_id)
            }
        }
    }
}

/// Apply defaults and derive every figure from the raw request. Client-side
/// totals never reach this point.
fn prepare(
    req: &InvoiceRequest,
    client_id: Uuid,
    profile: &BusinessProfile,
    existing: Option<&Invoice>,
    today: NaiveDate,
) -> Result<PreparedInvoice, AppError> {
    let settings = &profile.settings;

    let invoice_date = req
        .invoice_date
        .or(existing.map(|invoice| invoice.invoice_date))
        .unwrap_or(today);
    let due_date = req.due_date.or_else(|| {
        u64::try_from(settings.due_days)
            .ok()
            .and_then(|days| invoice_date.checked_add_days(Days::new(days)))
    });
    let tax_rate = req
        .tax_rate
        .or(existing.map(|invoice| invoice.tax_rate))
        .unwrap_or(settings.default_tax_rate);
    let notes = req.notes.clone().or_else(|| match existing {
        Some(_) => None,
        None => settings.default_notes.clone(),
    });
    let terms = req.terms.clone().or_else(|| match existing {
        Some(_) => None,
        None => settings.default_terms.clone(),
    });

    let line_items = req
        .line_items
        .iter()
        .enumerate()
        .map(|(index, item)| -> Result<NewLineItem, AppError> {
            Ok(NewLineItem {
                line_item_id: Uuid::new_v4(),
                description: item.description.trim().to_string(),
                quantity: item.quantity,
                rate: item.rate,
                amount: line_amount(item.quantity, item.rate)?,
                sort_order: index as i32,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let amount_paid = to_money(
        req.amount_paid
            .or(existing.map(|invoice| invoice.amount_paid))
            .unwrap_or_default(),
    );
    let totals = compute_totals(&TotalsInput {
        items: line_items
            .iter()
            .map(|item| LineInput {
                quantity: item.quantity,
                rate: item.rate,
            })
            .collect(),
        discount_type: req.discount_type,
        discount_value: req.discount_value,
        tax_rate,
        shipping_cost: req.shipping_cost,
        amount_paid,
    })?;

    // Derived amounts land in NUMERIC(14,2) columns.
    let stored = [
        totals.subtotal,
        totals.discount_amount,
        totals.tax_amount,
        totals.total,
        totals.balance_due,
    ];
    if line_items
        .iter()
        .map(|item| item.amount)
        .chain(stored)
        .any(|amount| !fits_numeric(amount, 14, 2))
    {
        let mut errors = ValidationErrors::new();
        errors.add("line_items", bound_error("Invoice amounts cannot exceed 12 digits"));
        return Err(errors.into());
    }

    let status = resolve_status(req.status, amount_paid, totals.balance_due, due_date, today);

    Ok(PreparedInvoice {
        client_id,
        invoice_date,
        due_date,
        notes,
        terms,
        financials: InvoiceFinancials {
            discount_type: req.discount_type,
            discount_value: req.discount_value,
            tax_rate,
            shipping_cost: req.shipping_cost,
            amount_paid,
            totals,
        },
        line_items,
        status,
    })
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn not_found(invoice_id: Uuid) -> AppError {
    AppError::NotFound(anyhow::anyhow!("Invoice {} not found", invoice_id))
}
