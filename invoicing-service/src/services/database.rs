//! PostgreSQL store for invoicing-service.

use crate::models::{
    format_invoice_number, BulkAction, Business, BusinessProfile, Client, CreateClient,
    CreateInvoice, DiscountType, Invoice, InvoiceSettings, InvoiceStatus, LineItem,
    ListInvoicesFilter, NewLineItem, PaymentUpdate, RateSuggestion, ReplaceInvoice,
    TemplateAssignment, UpdateSettings, User,
};
use crate::services::metrics::DB_QUERY_DURATION;
use crate::services::repository::{
    active_template_removal, bulk_not_owned, duplicate_client, duplicate_invoice_number,
    stale_invoice, template_already_assigned, InvoiceRepository,
};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use service_core::error::AppError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{FromRow, Postgres, Transaction};
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

const INVOICE_COLUMNS: &str = r#"
    invoice_id, user_id, client_id, invoice_number, invoice_date, due_date, status,
    notes, terms, discount_type, discount_value, tax_rate, shipping_cost,
    subtotal, discount_amount, tax_amount, total, amount_paid, balance_due,
    pdf_url, version, created_utc, updated_utc
"#;

const PROFILE_QUERY: &str = r#"
    SELECT b.business_id, b.user_id, b.name, b.address, b.email, b.phone, b.logo_url, b.tax_id,
        s.due_days, s.default_tax_rate, s.currency, s.invoice_prefix, s.next_sequence,
        s.default_notes, s.default_terms, s.payment_info, s.payment_qr_url, s.active_template
    FROM businesses b
    JOIN invoice_settings s ON s.business_id = b.business_id
    WHERE b.user_id = $1
"#;

#[derive(FromRow)]
struct InvoiceRow {
    invoice_id: Uuid,
    user_id: Uuid,
    client_id: Uuid,
    invoice_number: String,
    invoice_date: NaiveDate,
    due_date: Option<NaiveDate>,
    status: String,
    notes: Option<String>,
    terms: Option<String>,
    discount_type: String,
    discount_value: Decimal,
    tax_rate: Decimal,
    shipping_cost: Decimal,
    subtotal: Decimal,
    discount_amount: Decimal,
    tax_amount: Decimal,
    total: Decimal,
    amount_paid: Decimal,
    balance_due: Decimal,
    pdf_url: Option<String>,
    version: i32,
    created_utc: DateTime<Utc>,
    updated_utc: DateTime<Utc>,
}

impl InvoiceRow {
    fn into_invoice(self, line_items: Vec<LineItem>) -> Invoice {
        Invoice {
            invoice_id: self.invoice_id,
            user_id: self.user_id,
            client_id: self.client_id,
            invoice_number: self.invoice_number,
            invoice_date: self.invoice_date,
            due_date: self.due_date,
            status: InvoiceStatus::from_string(&self.status),
            notes: self.notes,
            terms: self.terms,
            discount_type: DiscountType::from_string(&self.discount_type),
            discount_value: self.discount_value,
            tax_rate: self.tax_rate,
            shipping_cost: self.shipping_cost,
            subtotal: self.subtotal,
            discount_amount: self.discount_amount,
            tax_amount: self.tax_amount,
            total: self.total,
            amount_paid: self.amount_paid,
            balance_due: self.balance_due,
            pdf_url: self.pdf_url,
            version: self.version,
            line_items,
            created_utc: self.created_utc,
            updated_utc: self.updated_utc,
        }
    }
}

#[derive(FromRow)]
struct LineItemRow {
    invoice_id: Uuid,
    line_item_id: Uuid,
    description: String,
    quantity: Decimal,
    rate: Decimal,
    amount: Decimal,
    sort_order: i32,
}

impl From<LineItemRow> for LineItem {
    fn from(row: LineItemRow) -> Self {
        Self {
            line_item_id: row.line_item_id,
            description: row.description,
            quantity: row.quantity,
            rate: row.rate,
            amount: row.amount,
            sort_order: row.sort_order,
        }
    }
}

#[derive(FromRow)]
struct ProfileRow {
    business_id: Uuid,
    user_id: Uuid,
    name: String,
    address: Option<String>,
    email: Option<String>,
    phone: Option<String>,
    logo_url: Option<String>,
    tax_id: Option<String>,
    due_days: i32,
    default_tax_rate: Decimal,
    currency: String,
    invoice_prefix: String,
    next_sequence: i64,
    default_notes: Option<String>,
    default_terms: Option<String>,
    payment_info: Option<String>,
    payment_qr_url: Option<String>,
    active_template: String,
}

impl From<ProfileRow> for BusinessProfile {
    fn from(row: ProfileRow) -> Self {
        Self {
            business: Business {
                business_id: row.business_id,
                user_id: row.user_id,
                name: row.name,
                address: row.address,
                email: row.email,
                phone: row.phone,
                logo_url: row.logo_url,
                tax_id: row.tax_id,
            },
            settings: InvoiceSettings {
                business_id: row.business_id,
                due_days: row.due_days,
                default_tax_rate: row.default_tax_rate,
                currency: row.currency,
                invoice_prefix: row.invoice_prefix,
                next_sequence: row.next_sequence,
                default_notes: row.default_notes,
                default_terms: row.default_terms,
                payment_info: row.payment_info,
                payment_qr_url: row.payment_qr_url,
                active_template: row.active_template,
            },
        }
    }
}

fn db_error(context: &'static str) -> impl FnOnce(sqlx::Error) -> AppError {
    move |e| AppError::DatabaseError(anyhow::anyhow!("{}: {}", context, e))
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db_err) if db_err.is_unique_violation())
}

/// Escape LIKE metacharacters so user input only matches literally.
fn like_prefix(prefix: &str) -> String {
    let mut escaped = String::with_capacity(prefix.len() + 1);
    for c in prefix.to_lowercase().chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    #[instrument(skip(database_url), fields(service = "invoicing-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }

    async fn begin(&self) -> Result<Transaction<'_, Postgres>, AppError> {
        self.pool
            .begin()
            .await
            .map_err(db_error("Failed to begin transaction"))
    }

    async fn load_line_items(
        &self,
        invoice_ids: &[Uuid],
    ) -> Result<HashMap<Uuid, Vec<LineItem>>, AppError> {
        let rows = sqlx::query_as::<_, LineItemRow>(
            r#"
            SELECT invoice_id, line_item_id, description, quantity, rate, amount, sort_order
            FROM line_items
            WHERE invoice_id = ANY($1)
            ORDER BY invoice_id, sort_order
            "#,
        )
        .bind(invoice_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("Failed to load line items"))?;

        let mut grouped: HashMap<Uuid, Vec<LineItem>> = HashMap::new();
        for row in rows {
            grouped.entry(row.invoice_id).or_default().push(row.into());
        }
        Ok(grouped)
    }

    async fn with_line_items(&self, row: InvoiceRow) -> Result<Invoice, AppError> {
        let mut items = self.load_line_items(&[row.invoice_id]).await?;
        let line_items = items.remove(&row.invoice_id).unwrap_or_default();
        Ok(row.into_invoice(line_items))
    }

    async fn insert_line_items(
        tx: &mut Transaction<'_, Postgres>,
        invoice_id: Uuid,
        items: &[NewLineItem],
    ) -> Result<(), AppError> {
        for item in items {
            sqlx::query(
                r#"
                INSERT INTO line_items (line_item_id, invoice_id, description, quantity, rate, amount, sort_order)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(item.line_item_id)
            .bind(invoice_id)
            .bind(&item.description)
            .bind(item.quantity)
            .bind(item.rate)
            .bind(item.amount)
            .bind(item.sort_order)
            .execute(&mut **tx)
            .await
            .map_err(db_error("Failed to insert line item"))?;
        }
        Ok(())
    }
}

#[async_trait]
impl InvoiceRepository for Database {
    #[instrument(skip(self))]
    async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Owner Profile
    // -------------------------------------------------------------------------

    #[instrument(skip(self), fields(user_id = %user_id))]
    async fn get_user(&self, user_id: Uuid) -> Result<Option<User>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_user"])
            .start_timer();

        let user = sqlx::query_as::<_, User>(
            "SELECT user_id, name, email FROM users WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("Failed to get user"))?;

        timer.observe_duration();

        Ok(user)
    }

    #[instrument(skip(self), fields(user_id = %user_id))]
    async fn get_business_profile(
        &self,
        user_id: Uuid,
    ) -> Result<Option<BusinessProfile>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_business_profile"])
            .start_timer();

        let profile = sqlx::query_as::<_, ProfileRow>(PROFILE_QUERY)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("Failed to get business profile"))?;

        timer.observe_duration();

        Ok(profile.map(BusinessProfile::from))
    }

    #[instrument(skip(self, input), fields(user_id = %user_id))]
    async fn update_settings(
        &self,
        user_id: Uuid,
        input: &UpdateSettings,
    ) -> Result<Option<BusinessProfile>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_settings"])
            .start_timer();

        let mut tx = self.begin().await?;

        let business_id = sqlx::query_scalar::<_, Uuid>(
            r#"
            UPDATE businesses
            SET name = COALESCE($2, name),
                address = COALESCE($3, address),
                email = COALESCE($4, email),
                phone = COALESCE($5, phone),
                logo_url = COALESCE($6, logo_url),
                tax_id = COALESCE($7, tax_id)
            WHERE user_id = $1
            RETURNING business_id
            "#,
        )
        .bind(user_id)
        .bind(&input.name)
        .bind(&input.address)
        .bind(&input.email)
        .bind(&input.phone)
        .bind(&input.logo_url)
        .bind(&input.tax_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_error("Failed to update business"))?;

        let Some(business_id) = business_id else {
            tx.rollback().await.ok();
            return Ok(None);
        };

        sqlx::query(
            r#"
            UPDATE invoice_settings
            SET due_days = COALESCE($2, due_days),
                default_tax_rate = COALESCE($3, default_tax_rate),
                currency = COALESCE($4, currency),
                invoice_prefix = COALESCE($5, invoice_prefix),
                default_notes = COALESCE($6, default_notes),
                default_terms = COALESCE($7, default_terms),
                payment_info = COALESCE($8, payment_info),
                payment_qr_url = COALESCE($9, payment_qr_url)
            WHERE business_id = $1
            "#,
        )
        .bind(business_id)
        .bind(input.due_days)
        .bind(input.default_tax_rate)
        .bind(&input.currency)
        .bind(&input.invoice_prefix)
        .bind(&input.default_notes)
        .bind(&input.default_terms)
        .bind(&input.payment_info)
        .bind(&input.payment_qr_url)
        .execute(&mut *tx)
        .await
        .map_err(db_error("Failed to update invoice settings"))?;

        tx.commit()
            .await
            .map_err(db_error("Failed to commit settings update"))?;

        timer.observe_duration();

        self.get_business_profile(user_id).await
    }

    #[instrument(skip(self), fields(user_id = %user_id, template = %template_name))]
    async fn set_active_template(
        &self,
        user_id: Uuid,
        template_name: &str,
    ) -> Result<Option<BusinessProfile>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["set_active_template"])
            .start_timer();

        let result = sqlx::query(
            r#"
            UPDATE invoice_settings s
            SET active_template = $2
            FROM businesses b
            WHERE b.business_id = s.business_id AND b.user_id = $1
            "#,
        )
        .bind(user_id)
        .bind(template_name)
        .execute(&self.pool)
        .await
        .map_err(db_error("Failed to set active template"))?;

        timer.observe_duration();

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_business_profile(user_id).await
    }

    // -------------------------------------------------------------------------
    // Client Operations
    // -------------------------------------------------------------------------

    #[instrument(skip(self), fields(user_id = %user_id, client_id = %client_id))]
    async fn get_client(&self, user_id: Uuid, client_id: Uuid) -> Result<Option<Client>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_client"])
            .start_timer();

        let client = sqlx::query_as::<_, Client>(
            r#"
            SELECT client_id, user_id, name, email, phone, address, created_utc
            FROM clients
            WHERE user_id = $1 AND client_id = $2
            "#,
        )
        .bind(user_id)
        .bind(client_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("Failed to get client"))?;

        timer.observe_duration();

        Ok(client)
    }

    #[instrument(skip(self, input), fields(user_id = %input.user_id))]
    async fn create_client(&self, input: &CreateClient) -> Result<Client, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_client"])
            .start_timer();

        let client = sqlx::query_as::<_, Client>(
            r#"
            INSERT INTO clients (client_id, user_id, name, email, phone, address)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING client_id, user_id, name, email, phone, address, created_utc
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(input.user_id)
        .bind(&input.name)
        .bind(&input.email)
        .bind(&input.phone)
        .bind(&input.address)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                duplicate_client()
            } else {
                AppError::DatabaseError(anyhow::anyhow!("Failed to create client: {}", e))
            }
        })?;

        timer.observe_duration();

        info!(client_id = %client.client_id, "Client created");

        Ok(client)
    }

    // -------------------------------------------------------------------------
    // Invoice Operations
    // -------------------------------------------------------------------------

    #[instrument(skip(self, input), fields(user_id = %input.user_id))]
    async fn create_invoice(&self, input: &CreateInvoice) -> Result<Invoice, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_invoice"])
            .start_timer();

        let mut tx = self.begin().await?;

        let invoice_number = match &input.invoice_number {
            Some(number) => number.clone(),
            None => {
                let allocated = sqlx::query_as::<_, (String, i64)>(
                    r#"
                    UPDATE invoice_settings s
                    SET next_sequence = s.next_sequence + 1
                    FROM businesses b
                    WHERE b.business_id = s.business_id AND b.user_id = $1
                    RETURNING s.invoice_prefix, s.next_sequence - 1
                    "#,
                )
                .bind(input.user_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(db_error("Failed to allocate invoice number"))?;

                let Some((prefix, sequence)) = allocated else {
                    tx.rollback().await.ok();
                    return Err(AppError::NotFound(anyhow::anyhow!(
                        "Business profile not found"
                    )));
                };
                format_invoice_number(&prefix, sequence)
            }
        };

        let financials = &input.financials;
        let sql = format!(
            r#"
            INSERT INTO invoices (
                invoice_id, user_id, client_id, invoice_number, invoice_date, due_date, status,
                notes, terms, discount_type, discount_value, tax_rate, shipping_cost,
                subtotal, discount_amount, tax_amount, total, amount_paid, balance_due
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19)
            RETURNING {INVOICE_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, InvoiceRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(input.user_id)
            .bind(input.client_id)
            .bind(&invoice_number)
            .bind(input.invoice_date)
            .bind(input.due_date)
            .bind(input.status.as_str())
            .bind(&input.notes)
            .bind(&input.terms)
            .bind(financials.discount_type.as_str())
            .bind(financials.discount_value)
            .bind(financials.tax_rate)
            .bind(financials.shipping_cost)
            .bind(financials.totals.subtotal)
            .bind(financials.totals.discount_amount)
            .bind(financials.totals.tax_amount)
            .bind(financials.totals.total)
            .bind(financials.amount_paid)
            .bind(financials.totals.balance_due)
            .fetch_one(&mut *tx)
            .await;

        let row = match row {
            Ok(row) => row,
            Err(e) if is_unique_violation(&e) => {
                tx.rollback().await.ok();
                return Err(duplicate_invoice_number(&invoice_number));
            }
            Err(e) => {
                return Err(AppError::DatabaseError(anyhow::anyhow!(
                    "Failed to create invoice: {}",
                    e
                )));
            }
        };

        Self::insert_line_items(&mut tx, row.invoice_id, &input.line_items).await?;

        tx.commit()
            .await
            .map_err(db_error("Failed to commit invoice"))?;

        timer.observe_duration();

        info!(
            invoice_id = %row.invoice_id,
            invoice_number = %row.invoice_number,
            line_items = input.line_items.len(),
            "Invoice created"
        );

        let line_items = input.line_items.iter().cloned().map(LineItem::from).collect();
        Ok(row.into_invoice(line_items))
    }

    #[instrument(skip(self), fields(user_id = %user_id, invoice_id = %invoice_id))]
    async fn get_invoice(
        &self,
        user_id: Uuid,
        invoice_id: Uuid,
    ) -> Result<Option<Invoice>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_invoice"])
            .start_timer();

        let sql = format!(
            "SELECT {INVOICE_COLUMNS} FROM invoices WHERE user_id = $1 AND invoice_id = $2"
        );
        let row = sqlx::query_as::<_, InvoiceRow>(&sql)
            .bind(user_id)
            .bind(invoice_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("Failed to get invoice"))?;

        let invoice = match row {
            Some(row) => Some(self.with_line_items(row).await?),
            None => None,
        };

        timer.observe_duration();

        Ok(invoice)
    }

    #[instrument(skip(self, filter), fields(user_id = %user_id))]
    async fn list_invoices(
        &self,
        user_id: Uuid,
        filter: &ListInvoicesFilter,
    ) -> Result<Vec<Invoice>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_invoices"])
            .start_timer();

        let limit = filter.page_size.clamp(1, 100) as i64;
        let status_str = filter.status.map(|s| s.as_str().to_string());

        let sql = format!(
            r#"
            SELECT {INVOICE_COLUMNS}
            FROM invoices
            WHERE user_id = $1
              AND ($2::varchar IS NULL OR status = $2)
              AND ($3::uuid IS NULL OR client_id = $3)
              AND ($4::uuid IS NULL OR invoice_id > $4)
            ORDER BY invoice_id
            LIMIT $5
            "#
        );
        let rows = sqlx::query_as::<_, InvoiceRow>(&sql)
            .bind(user_id)
            .bind(&status_str)
            .bind(filter.client_id)
            .bind(filter.page_token)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(db_error("Failed to list invoices"))?;

        let ids: Vec<Uuid> = rows.iter().map(|row| row.invoice_id).collect();
        let mut items = self.load_line_items(&ids).await?;
        let invoices = rows
            .into_iter()
            .map(|row| {
                let line_items = items.remove(&row.invoice_id).unwrap_or_default();
                row.into_invoice(line_items)
            })
            .collect();

        timer.observe_duration();

        Ok(invoices)
    }

    #[instrument(skip(self, input), fields(user_id = %user_id, invoice_id = %invoice_id))]
    async fn replace_invoice(
        &self,
        user_id: Uuid,
        invoice_id: Uuid,
        input: &ReplaceInvoice,
    ) -> Result<Option<Invoice>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["replace_invoice"])
            .start_timer();

        let mut tx = self.begin().await?;

        let financials = &input.financials;
        let sql = format!(
            r#"
            UPDATE invoices
            SET client_id = $3,
                invoice_date = $4,
                due_date = $5,
                status = $6,
                notes = $7,
                terms = $8,
                discount_type = $9,
                discount_value = $10,
                tax_rate = $11,
                shipping_cost = $12,
                subtotal = $13,
                discount_amount = $14,
                tax_amount = $15,
                total = $16,
                amount_paid = $17,
                balance_due = $18,
                pdf_url = NULL,
                version = version + 1,
                updated_utc = NOW()
            WHERE user_id = $1 AND invoice_id = $2
            RETURNING {INVOICE_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, InvoiceRow>(&sql)
            .bind(user_id)
            .bind(invoice_id)
            .bind(input.client_id)
            .bind(input.invoice_date)
            .bind(input.due_date)
            .bind(input.status.as_str())
            .bind(&input.notes)
            .bind(&input.terms)
            .bind(financials.discount_type.as_str())
            .bind(financials.discount_value)
            .bind(financials.tax_rate)
            .bind(financials.shipping_cost)
            .bind(financials.totals.subtotal)
            .bind(financials.totals.discount_amount)
            .bind(financials.totals.tax_amount)
            .bind(financials.totals.total)
            .bind(financials.amount_paid)
            .bind(financials.totals.balance_due)
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_error("Failed to update invoice"))?;

        let Some(row) = row else {
            tx.rollback().await.ok();
            return Ok(None);
        };

        sqlx::query("DELETE FROM line_items WHERE invoice_id = $1")
            .bind(invoice_id)
            .execute(&mut *tx)
            .await
            .map_err(db_error("Failed to clear line items"))?;

        Self::insert_line_items(&mut tx, invoice_id, &input.line_items).await?;

        tx.commit()
            .await
            .map_err(db_error("Failed to commit invoice update"))?;

        timer.observe_duration();

        info!(invoice_id = %invoice_id, version = row.version, "Invoice replaced");

        let line_items = input.line_items.iter().cloned().map(LineItem::from).collect();
        Ok(Some(row.into_invoice(line_items)))
    }

    #[instrument(skip(self, update), fields(user_id = %user_id, invoice_id = %invoice_id))]
    async fn save_payment(
        &self,
        user_id: Uuid,
        invoice_id: Uuid,
        update: &PaymentUpdate,
    ) -> Result<Option<Invoice>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["save_payment"])
            .start_timer();

        let sql = format!(
            r#"
            UPDATE invoices
            SET amount_paid = $3,
                balance_due = $4,
                status = $5,
                pdf_url = NULL,
                version = version + 1,
                updated_utc = NOW()
            WHERE user_id = $1 AND invoice_id = $2 AND version = $6
            RETURNING {INVOICE_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, InvoiceRow>(&sql)
            .bind(user_id)
            .bind(invoice_id)
            .bind(update.amount_paid)
            .bind(update.balance_due)
            .bind(update.status.as_str())
            .bind(update.expected_version)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("Failed to save payment"))?;

        let Some(row) = row else {
            let exists = sqlx::query_scalar::<_, bool>(
                "SELECT EXISTS(SELECT 1 FROM invoices WHERE user_id = $1 AND invoice_id = $2)",
            )
            .bind(user_id)
            .bind(invoice_id)
            .fetch_one(&self.pool)
            .await
            .map_err(db_error("Failed to check invoice"))?;

            return if exists { Err(stale_invoice()) } else { Ok(None) };
        };

        let invoice = self.with_line_items(row).await?;

        timer.observe_duration();

        Ok(Some(invoice))
    }

    #[instrument(skip(self, pdf_url), fields(user_id = %user_id, invoice_id = %invoice_id))]
    async fn set_pdf_url(
        &self,
        user_id: Uuid,
        invoice_id: Uuid,
        pdf_url: &str,
    ) -> Result<Option<Invoice>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["set_pdf_url"])
            .start_timer();

        let sql = format!(
            r#"
            UPDATE invoices
            SET pdf_url = $3
            WHERE user_id = $1 AND invoice_id = $2
            RETURNING {INVOICE_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, InvoiceRow>(&sql)
            .bind(user_id)
            .bind(invoice_id)
            .bind(pdf_url)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("Failed to set artifact url"))?;

        let invoice = match row {
            Some(row) => Some(self.with_line_items(row).await?),
            None => None,
        };

        timer.observe_duration();

        Ok(invoice)
    }

    #[instrument(skip(self), fields(user_id = %user_id, invoice_id = %invoice_id))]
    async fn delete_invoice(&self, user_id: Uuid, invoice_id: Uuid) -> Result<bool, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["delete_invoice"])
            .start_timer();

        let result = sqlx::query("DELETE FROM invoices WHERE user_id = $1 AND invoice_id = $2")
            .bind(user_id)
            .bind(invoice_id)
            .execute(&self.pool)
            .await
            .map_err(db_error("Failed to delete invoice"))?;

        timer.observe_duration();

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, invoice_ids), fields(user_id = %user_id, action = action.as_str()))]
    async fn apply_bulk(
        &self,
        user_id: Uuid,
        invoice_ids: &[Uuid],
        action: BulkAction,
    ) -> Result<u64, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["apply_bulk"])
            .start_timer();

        let ids: Vec<Uuid> = invoice_ids
            .iter()
            .copied()
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();

        let mut tx = self.begin().await?;

        let locked = sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT invoice_id FROM invoices
            WHERE user_id = $1 AND invoice_id = ANY($2)
            FOR UPDATE
            "#,
        )
        .bind(user_id)
        .bind(&ids)
        .fetch_all(&mut *tx)
        .await
        .map_err(db_error("Failed to lock invoices"))?;

        if locked.len() != ids.len() {
            tx.rollback().await.ok();
            return Err(bulk_not_owned());
        }

        let statement = match action {
            BulkAction::Delete => "DELETE FROM invoices WHERE user_id = $1 AND invoice_id = ANY($2)",
            BulkAction::MarkPaid => {
                r#"
                UPDATE invoices
                SET amount_paid = total, balance_due = 0, status = 'paid',
                    pdf_url = NULL, version = version + 1, updated_utc = NOW()
                WHERE user_id = $1 AND invoice_id = ANY($2)
                "#
            }
            BulkAction::MarkPending => {
                r#"
                UPDATE invoices
                SET amount_paid = 0, balance_due = total, status = 'pending',
                    pdf_url = NULL, version = version + 1, updated_utc = NOW()
                WHERE user_id = $1 AND invoice_id = ANY($2)
                "#
            }
        };

        let result = sqlx::query(statement)
            .bind(user_id)
            .bind(&ids)
            .execute(&mut *tx)
            .await
            .map_err(db_error("Failed to apply bulk action"))?;

        tx.commit()
            .await
            .map_err(db_error("Failed to commit bulk action"))?;

        timer.observe_duration();

        info!(affected = result.rows_affected(), "Bulk action applied");

        Ok(result.rows_affected())
    }

    #[instrument(skip(self), fields(user_id = %user_id))]
    async fn mark_overdue(&self, user_id: Uuid, today: NaiveDate) -> Result<u64, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["mark_overdue"])
            .start_timer();

        let result = sqlx::query(
            r#"
            UPDATE invoices
            SET status = 'overdue', updated_utc = NOW()
            WHERE user_id = $1 AND status = 'pending' AND due_date < $2
            "#,
        )
        .bind(user_id)
        .bind(today)
        .execute(&self.pool)
        .await
        .map_err(db_error("Failed to mark overdue invoices"))?;

        timer.observe_duration();

        Ok(result.rows_affected())
    }

    #[instrument(skip(self), fields(user_id = %user_id))]
    async fn suggest_rates(
        &self,
        user_id: Uuid,
        prefix: &str,
        limit: i64,
    ) -> Result<Vec<RateSuggestion>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["suggest_rates"])
            .start_timer();

        let suggestions = sqlx::query_as::<_, (String, Decimal)>(
            r#"
            SELECT description, rate FROM (
                SELECT DISTINCT ON (lower(li.description)) li.description, li.rate, i.updated_utc
                FROM line_items li
                JOIN invoices i ON i.invoice_id = li.invoice_id
                WHERE i.user_id = $1 AND lower(li.description) LIKE $2
                ORDER BY lower(li.description), i.updated_utc DESC
            ) latest
            ORDER BY updated_utc DESC
            LIMIT $3
            "#,
        )
        .bind(user_id)
        .bind(like_prefix(prefix))
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("Failed to suggest rates"))?;

        timer.observe_duration();

        Ok(suggestions
            .into_iter()
            .map(|(description, rate)| RateSuggestion { description, rate })
            .collect())
    }

    // -------------------------------------------------------------------------
    // Template Assignments
    // -------------------------------------------------------------------------

    #[instrument(skip(self), fields(user_id = %user_id))]
    async fn list_template_assignments(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<TemplateAssignment>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_template_assignments"])
            .start_timer();

        let assignments = sqlx::query_as::<_, TemplateAssignment>(
            r#"
            SELECT user_id, template_name, created_utc
            FROM template_assignments
            WHERE user_id = $1
            ORDER BY created_utc
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("Failed to list template assignments"))?;

        timer.observe_duration();

        Ok(assignments)
    }

    #[instrument(skip(self), fields(user_id = %user_id, template = %template_name))]
    async fn add_template_assignment(
        &self,
        user_id: Uuid,
        template_name: &str,
    ) -> Result<TemplateAssignment, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["add_template_assignment"])
            .start_timer();

        let assignment = sqlx::query_as::<_, TemplateAssignment>(
            r#"
            INSERT INTO template_assignments (user_id, template_name)
            VALUES ($1, $2)
            RETURNING user_id, template_name, created_utc
            "#,
        )
        .bind(user_id)
        .bind(template_name)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                template_already_assigned(template_name)
            } else {
                AppError::DatabaseError(anyhow::anyhow!("Failed to assign template: {}", e))
            }
        })?;

        timer.observe_duration();

        Ok(assignment)
    }

    #[instrument(skip(self), fields(user_id = %user_id, template = %template_name))]
    async fn remove_template_assignment(
        &self,
        user_id: Uuid,
        template_name: &str,
    ) -> Result<bool, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["remove_template_assignment"])
            .start_timer();

        let active = sqlx::query_scalar::<_, String>(
            r#"
            SELECT s.active_template
            FROM invoice_settings s
            JOIN businesses b ON b.business_id = s.business_id
            WHERE b.user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("Failed to read active template"))?;

        if active.as_deref() == Some(template_name) {
            return Err(active_template_removal(template_name));
        }

        let result = sqlx::query(
            "DELETE FROM template_assignments WHERE user_id = $1 AND template_name = $2",
        )
        .bind(user_id)
        .bind(template_name)
        .execute(&self.pool)
        .await
        .map_err(db_error("Failed to remove template assignment"))?;

        timer.observe_duration();

        Ok(result.rows_affected() > 0)
    }
}
