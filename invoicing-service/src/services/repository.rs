//! Persistence boundary for invoicing-service.
//!
//! Every read and write is scoped by the owning user. Implementations must
//! apply multi-row changes (line-item replacement, bulk actions, number
//! allocation) atomically.

use crate::models::{
    BulkAction, BusinessProfile, Client, CreateClient, CreateInvoice, Invoice, ListInvoicesFilter,
    PaymentUpdate, RateSuggestion, ReplaceInvoice, TemplateAssignment, UpdateSettings, User,
};
use async_trait::async_trait;
use chrono::NaiveDate;
use service_core::error::AppError;
use uuid::Uuid;

#[async_trait]
pub trait InvoiceRepository: Send + Sync {
    async fn health_check(&self) -> Result<(), AppError>;

    // Owner profile

    async fn get_user(&self, user_id: Uuid) -> Result<Option<User>, AppError>;

    async fn get_business_profile(&self, user_id: Uuid)
        -> Result<Option<BusinessProfile>, AppError>;

    async fn update_settings(
        &self,
        user_id: Uuid,
        input: &UpdateSettings,
    ) -> Result<Option<BusinessProfile>, AppError>;

    async fn set_active_template(
        &self,
        user_id: Uuid,
        template_name: &str,
    ) -> Result<Option<BusinessProfile>, AppError>;

    // Clients

    async fn get_client(&self, user_id: Uuid, client_id: Uuid) -> Result<Option<Client>, AppError>;

    /// Fails with `Conflict` when the owner already has a client with the
    /// same email or phone.
    async fn create_client(&self, input: &CreateClient) -> Result<Client, AppError>;

    // Invoices

    /// Insert an invoice and its line items. Allocates the next number from
    /// the owner's settings when none is given. Fails with `Conflict` on a
    /// duplicate number.
    async fn create_invoice(&self, input: &CreateInvoice) -> Result<Invoice, AppError>;

    async fn get_invoice(&self, user_id: Uuid, invoice_id: Uuid)
        -> Result<Option<Invoice>, AppError>;

    async fn list_invoices(
        &self,
        user_id: Uuid,
        filter: &ListInvoicesFilter,
    ) -> Result<Vec<Invoice>, AppError>;

    /// Replace all line items and editable fields in one transaction. Clears
    /// the cached artifact URL.
    async fn replace_invoice(
        &self,
        user_id: Uuid,
        invoice_id: Uuid,
        input: &ReplaceInvoice,
    ) -> Result<Option<Invoice>, AppError>;

    /// Persist a payment outcome. Fails with `Conflict` when the invoice
    /// changed since `expected_version` was read.
    async fn save_payment(
        &self,
        user_id: Uuid,
        invoice_id: Uuid,
        update: &PaymentUpdate,
    ) -> Result<Option<Invoice>, AppError>;

    async fn set_pdf_url(
        &self,
        user_id: Uuid,
        invoice_id: Uuid,
        pdf_url: &str,
    ) -> Result<Option<Invoice>, AppError>;

    async fn delete_invoice(&self, user_id: Uuid, invoice_id: Uuid) -> Result<bool, AppError>;

    /// Apply one action to every id, or to none. Fails with `Forbidden` when
    /// any id is not owned by `user_id`.
    async fn apply_bulk(
        &self,
        user_id: Uuid,
        invoice_ids: &[Uuid],
        action: BulkAction,
    ) -> Result<u64, AppError>;

    /// Flip pending invoices due before `today` to overdue.
    async fn mark_overdue(&self, user_id: Uuid, today: NaiveDate) -> Result<u64, AppError>;

    /// Most recent rate billed for descriptions starting with `prefix`.
    async fn suggest_rates(
        &self,
        user_id: Uuid,
        prefix: &str,
        limit: i64,
    ) -> Result<Vec<RateSuggestion>, AppError>;

    // Template assignments

    async fn list_template_assignments(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<TemplateAssignment>, AppError>;

    /// Fails with `Conflict` when already assigned.
    async fn add_template_assignment(
        &self,
        user_id: Uuid,
        template_name: &str,
    ) -> Result<TemplateAssignment, AppError>;

    /// Fails with `Conflict` when the template is the active one. Returns
    /// `false` when it was not assigned.
    async fn remove_template_assignment(
        &self,
        user_id: Uuid,
        template_name: &str,
    ) -> Result<bool, AppError>;
}

pub(crate) fn duplicate_invoice_number(number: &str) -> AppError {
    AppError::Conflict(anyhow::anyhow!(
        "Invoice number '{}' already exists",
        number
    ))
}

pub(crate) fn duplicate_client() -> AppError {
    AppError::Conflict(anyhow::anyhow!(
        "A client with this email or phone already exists"
    ))
}

pub(crate) fn template_already_assigned(name: &str) -> AppError {
    AppError::Conflict(anyhow::anyhow!("Template '{}' is already assigned", name))
}

pub(crate) fn active_template_removal(name: &str) -> AppError {
    AppError::Conflict(anyhow::anyhow!(
        "Template '{}' is active and cannot be removed",
        name
    ))
}

pub(crate) fn bulk_not_owned() -> AppError {
    AppError::Forbidden(anyhow::anyhow!(
        "One or more invoices are not accessible to this account"
    ))
}

pub(crate) fn stale_invoice() -> AppError {
    AppError::Conflict(anyhow::anyhow!(
        "Invoice was modified by another request; reload and retry"
    ))
}
