//! In-process repository with the same semantics as the PostgreSQL store.
//!
//! Used for `STORE_BACKEND=memory` (local runs without a database) and by the
//! integration tests. A single mutex makes every operation atomic.

use crate::models::{
    BulkAction, BusinessProfile, Client, CreateClient, CreateInvoice, Invoice, InvoiceStatus,
    LineItem, ListInvoicesFilter, PaymentUpdate, RateSuggestion, ReplaceInvoice,
    TemplateAssignment, UpdateSettings, User,
};
use crate::services::repository::{
    active_template_removal, bulk_not_owned, duplicate_client, duplicate_invoice_number,
    stale_invoice, template_already_assigned, InvoiceRepository,
};
use crate::services::status::is_overdue_candidate;
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use service_core::error::AppError;
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

#[derive(Default)]
struct MemoryState {
    users: HashMap<Uuid, User>,
    profiles: HashMap<Uuid, BusinessProfile>,
    clients: HashMap<Uuid, Client>,
    invoices: HashMap<Uuid, Invoice>,
    assignments: Vec<TemplateAssignment>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, AppError> {
        self.state
            .lock()
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Memory store poisoned: {}", e)))
    }

    /// Register an account with its business profile. Onboarding lives
    /// outside this service, so the store is seeded directly.
    pub fn insert_profile(&self, user: User, profile: BusinessProfile) -> Result<(), AppError> {
        let mut state = self.lock()?;
        state.profiles.insert(user.user_id, profile);
        state.users.insert(user.user_id, user);
        Ok(())
    }
}

fn owned<'a>(state: &'a MemoryState, user_id: Uuid, invoice_id: Uuid) -> Option<&'a Invoice> {
    state
        .invoices
        .get(&invoice_id)
        .filter(|invoice| invoice.user_id == user_id)
}

fn same_contact(existing: &Option<String>, candidate: &Option<String>) -> bool {
    match (existing, candidate) {
        (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
        _ => false,
    }
}

#[async_trait]
impl InvoiceRepository for MemoryStore {
    async fn health_check(&self) -> Result<(), AppError> {
        self.lock().map(|_| ())
    }

    async fn get_user(&self, user_id: Uuid) -> Result<Option<User>, AppError> {
        Ok(self.lock()?.users.get(&user_id).cloned())
    }

    async fn get_business_profile(
        &self,
        user_id: Uuid,
    ) -> Result<Option<BusinessProfile>, AppError> {
        Ok(self.lock()?.profiles.get(&user_id).cloned())
    }

    async fn update_settings(
        &self,
        user_id: Uuid,
        input: &UpdateSettings,
    ) -> Result<Option<BusinessProfile>, AppError> {
        let mut state = self.lock()?;
        let Some(profile) = state.profiles.get_mut(&user_id) else {
            return Ok(None);
        };

        let business = &mut profile.business;
        if let Some(name) = &input.name {
            business.name = name.clone();
        }
        if input.address.is_some() {
            business.address = input.address.clone();
        }
        if input.email.is_some() {
            business.email = input.email.clone();
        }
        if input.phone.is_some() {
            business.phone = input.phone.clone();
        }
        if input.logo_url.is_some() {
            business.logo_url = input.logo_url.clone();
        }
        if input.tax_id.is_some() {
            business.tax_id = input.tax_id.clone();
        }

        let settings = &mut profile.settings;
        if let Some(due_days) = input.due_days {
            settings.due_days = due_days;
        }
        if let Some(rate) = input.default_tax_rate {
            settings.default_tax_rate = rate;
        }
        if let Some(currency) = &input.currency {
            settings.currency = currency.clone();
        }
        if let Some(prefix) = &input.invoice_prefix {
            settings.invoice_prefix = prefix.clone();
        }
        if input.default_notes.is_some() {
            settings.default_notes = input.default_notes.clone();
        }
        if input.default_terms.is_some() {
            settings.default_terms = input.default_terms.clone();
        }
        if input.payment_info.is_some() {
            settings.payment_info = input.payment_info.clone();
        }
        if input.payment_qr_url.is_some() {
            settings.payment_qr_url = input.payment_qr_url.clone();
        }

        Ok(Some(profile.clone()))
    }

    async fn set_active_template(
        &self,
        user_id: Uuid,
        template_name: &str,
    ) -> Result<Option<BusinessProfile>, AppError> {
        let mut state = self.lock()?;
        Ok(state.profiles.get_mut(&user_id).map(|profile| {
            profile.settings.active_template = template_name.to_string();
            profile.clone()
        }))
    }

    async fn get_client(&self, user_id: Uuid, client_id: Uuid) -> Result<Option<Client>, AppError> {
        Ok(self
            .lock()?
            .clients
            .get(&client_id)
            .filter(|client| client.user_id == user_id)
            .cloned())
    }

    async fn create_client(&self, input: &CreateClient) -> Result<Client, AppError> {
        let mut state = self.lock()?;
        let duplicate = state.clients.values().any(|client| {
            client.user_id == input.user_id
                && (same_contact(&client.email, &input.email)
                    || same_contact(&client.phone, &input.phone))
        });
        if duplicate {
            return Err(duplicate_client());
        }

        let client = Client {
            client_id: Uuid::new_v4(),
            user_id: input.user_id,
            name: input.name.clone(),
            email: input.email.clone(),
            phone: input.phone.clone(),
            address: input.address.clone(),
            created_utc: Utc::now(),
        };
        state.clients.insert(client.client_id, client.clone());
        Ok(client)
    }

    async fn create_invoice(&self, input: &CreateInvoice) -> Result<Invoice, AppError> {
        let mut state = self.lock()?;

        let (invoice_number, allocated) = match &input.invoice_number {
            Some(number) => (number.clone(), false),
            None => {
                let profile = state.profiles.get(&input.user_id).ok_or_else(|| {
                    AppError::NotFound(anyhow::anyhow!("Business profile not found"))
                })?;
                let settings = &profile.settings;
                (settings.format_number(settings.next_sequence), true)
            }
        };

        let taken = state
            .invoices
            .values()
            .any(|existing| existing.user_id == input.user_id && existing.invoice_number == invoice_number);
        if taken {
            return Err(duplicate_invoice_number(&invoice_number));
        }
        if allocated {
            if let Some(profile) = state.profiles.get_mut(&input.user_id) {
                profile.settings.next_sequence += 1;
            }
        }

        let now = Utc::now();
        let financials = &input.financials;
        let invoice = Invoice {
            invoice_id: Uuid::new_v4(),
            user_id: input.user_id,
            client_id: input.client_id,
            invoice_number,
            invoice_date: input.invoice_date,
            due_date: input.due_date,
            status: input.status,
            notes: input.notes.clone(),
            terms: input.terms.clone(),
            discount_type: financials.discount_type,
            discount_value: financials.discount_value,
            tax_rate: financials.tax_rate,
            shipping_cost: financials.shipping_cost,
            subtotal: financials.totals.subtotal,
            discount_amount: financials.totals.discount_amount,
            tax_amount: financials.totals.tax_amount,
            total: financials.totals.total,
            amount_paid: financials.amount_paid,
            balance_due: financials.totals.balance_due,
            pdf_url: None,
            version: 1,
            line_items: input.line_items.iter().cloned().map(LineItem::from).collect(),
            created_utc: now,
            updated_utc: now,
        };
        state.invoices.insert(invoice.invoice_id, invoice.clone());
        Ok(invoice)
    }

    async fn get_invoice(
        &self,
        user_id: Uuid,
        invoice_id: Uuid,
    ) -> Result<Option<Invoice>, AppError> {
        Ok(owned(&*self.lock()?, user_id, invoice_id).cloned())
    }

    async fn list_invoices(
        &self,
        user_id: Uuid,
        filter: &ListInvoicesFilter,
    ) -> Result<Vec<Invoice>, AppError> {
        let limit = filter.page_size.clamp(1, 100) as usize;
        let state = self.lock()?;

        let mut invoices: Vec<Invoice> = state
            .invoices
            .values()
            .filter(|invoice| invoice.user_id == user_id)
            .filter(|invoice| filter.status.map_or(true, |s| invoice.status == s))
            .filter(|invoice| filter.client_id.map_or(true, |c| invoice.client_id == c))
            .filter(|invoice| filter.page_token.map_or(true, |cursor| invoice.invoice_id > cursor))
            .cloned()
            .collect();
        invoices.sort_by_key(|invoice| invoice.invoice_id);
        invoices.truncate(limit);
        Ok(invoices)
    }

    async fn replace_invoice(
        &self,
        user_id: Uuid,
        invoice_id: Uuid,
        input: &ReplaceInvoice,
    ) -> Result<Option<Invoice>, AppError> {
        let mut state = self.lock()?;
        let Some(invoice) = state
            .invoices
            .get_mut(&invoice_id)
            .filter(|invoice| invoice.user_id == user_id)
        else {
            return Ok(None);
        };

        let financials = &input.financials;
        invoice.client_id = input.client_id;
        invoice.invoice_date = input.invoice_date;
        invoice.due_date = input.due_date;
        invoice.status = input.status;
        invoice.notes = input.notes.clone();
        invoice.terms = input.terms.clone();
        invoice.discount_type = financials.discount_type;
        invoice.discount_value = financials.discount_value;
        invoice.tax_rate = financials.tax_rate;
        invoice.shipping_cost = financials.shipping_cost;
        invoice.subtotal = financials.totals.subtotal;
        invoice.discount_amount = financials.totals.discount_amount;
        invoice.tax_amount = financials.totals.tax_amount;
        invoice.total = financials.totals.total;
        invoice.amount_paid = financials.amount_paid;
        invoice.balance_due = financials.totals.balance_due;
        invoice.line_items = input.line_items.iter().cloned().map(LineItem::from).collect();
        invoice.pdf_url = None;
        invoice.version += 1;
        invoice.updated_utc = Utc::now();

        Ok(Some(invoice.clone()))
    }

    async fn save_payment(
        &self,
        user_id: Uuid,
        invoice_id: Uuid,
        update: &PaymentUpdate,
    ) -> Result<Option<Invoice>, AppError> {
        let mut state = self.lock()?;
        let Some(invoice) = state
            .invoices
            .get_mut(&invoice_id)
            .filter(|invoice| invoice.user_id == user_id)
        else {
            return Ok(None);
        };
        if invoice.version != update.expected_version {
            return Err(stale_invoice());
        }

        invoice.amount_paid = update.amount_paid;
        invoice.balance_due = update.balance_due;
        invoice.status = update.status;
        invoice.pdf_url = None;
        invoice.version += 1;
        invoice.updated_utc = Utc::now();

        Ok(Some(invoice.clone()))
    }

    async fn set_pdf_url(
        &self,
        user_id: Uuid,
        invoice_id: Uuid,
        pdf_url: &str,
    ) -> Result<Option<Invoice>, AppError> {
        let mut state = self.lock()?;
        Ok(state
            .invoices
            .get_mut(&invoice_id)
            .filter(|invoice| invoice.user_id == user_id)
            .map(|invoice| {
                invoice.pdf_url = Some(pdf_url.to_string());
                invoice.clone()
            }))
    }

    async fn delete_invoice(&self, user_id: Uuid, invoice_id: Uuid) -> Result<bool, AppError> {
        let mut state = self.lock()?;
        if owned(&state, user_id, invoice_id).is_none() {
            return Ok(false);
        }
        Ok(state.invoices.remove(&invoice_id).is_some())
    }

    async fn apply_bulk(
        &self,
        user_id: Uuid,
        invoice_ids: &[Uuid],
        action: BulkAction,
    ) -> Result<u64, AppError> {
        let mut state = self.lock()?;
        let ids: HashSet<Uuid> = invoice_ids.iter().copied().collect();

        if ids.iter().any(|id| owned(&state, user_id, *id).is_none()) {
            return Err(bulk_not_owned());
        }

        let now = Utc::now();
        for id in &ids {
            match action {
                BulkAction::Delete => {
                    state.invoices.remove(id);
                }
                BulkAction::MarkPaid | BulkAction::MarkPending => {
                    if let Some(invoice) = state.invoices.get_mut(id) {
                        if action == BulkAction::MarkPaid {
                            invoice.amount_paid = invoice.total;
                            invoice.balance_due = Decimal::ZERO;
                            invoice.status = InvoiceStatus::Paid;
                        } else {
                            invoice.amount_paid = Decimal::ZERO;
                            invoice.balance_due = invoice.total;
                            invoice.status = InvoiceStatus::Pending;
                        }
                        invoice.pdf_url = None;
                        invoice.version += 1;
                        invoice.updated_utc = now;
                    }
                }
            }
        }

        Ok(ids.len() as u64)
    }

    async fn mark_overdue(&self, user_id: Uuid, today: NaiveDate) -> Result<u64, AppError> {
        let mut state = self.lock()?;
        let now = Utc::now();
        let mut flipped = 0;
        for invoice in state.invoices.values_mut() {
            if invoice.user_id == user_id
                && is_overdue_candidate(invoice.status, invoice.due_date, today)
            {
                invoice.status = InvoiceStatus::Overdue;
                invoice.updated_utc = now;
                flipped += 1;
            }
        }
        Ok(flipped)
    }

    async fn suggest_rates(
        &self,
        user_id: Uuid,
        prefix: &str,
        limit: i64,
    ) -> Result<Vec<RateSuggestion>, AppError> {
        let state = self.lock()?;
        let needle = prefix.to_lowercase();

        let mut invoices: Vec<&Invoice> = state
            .invoices
            .values()
            .filter(|invoice| invoice.user_id == user_id)
            .collect();
        invoices.sort_by(|a, b| b.updated_utc.cmp(&a.updated_utc));

        let mut seen = HashSet::new();
        let suggestions = invoices
            .into_iter()
            .flat_map(|invoice| invoice.line_items.iter())
            .filter(|item| item.description.to_lowercase().starts_with(&needle))
            .filter(|item| seen.insert(item.description.to_lowercase()))
            .take(limit.max(0) as usize)
            .map(|item| RateSuggestion {
                description: item.description.clone(),
                rate: item.rate,
            })
            .collect();
        Ok(suggestions)
    }

    async fn list_template_assignments(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<TemplateAssignment>, AppError> {
        Ok(self
            .lock()?
            .assignments
            .iter()
            .filter(|assignment| assignment.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn add_template_assignment(
        &self,
        user_id: Uuid,
        template_name: &str,
    ) -> Result<TemplateAssignment, AppError> {
        let mut state = self.lock()?;
        let exists = state
            .assignments
            .iter()
            .any(|a| a.user_id == user_id && a.template_name == template_name);
        if exists {
            return Err(template_already_assigned(template_name));
        }

        let assignment = TemplateAssignment {
            user_id,
            template_name: template_name.to_string(),
            created_utc: Utc::now(),
        };
        state.assignments.push(assignment.clone());
        Ok(assignment)
    }

    async fn remove_template_assignment(
        &self,
        user_id: Uuid,
        template_name: &str,
    ) -> Result<bool, AppError> {
        let mut state = self.lock()?;
        let is_active = state
            .profiles
            .get(&user_id)
            .is_some_and(|profile| profile.settings.active_template == template_name);
        if is_active {
            return Err(active_template_removal(template_name));
        }

        let before = state.assignments.len();
        state
            .assignments
            .retain(|a| !(a.user_id == user_id && a.template_name == template_name));
        Ok(state.assignments.len() < before)
    }
}
