use crate::models::UpdateSettings;
use crate::rendering::TemplateKind;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Partial update of business details and invoice settings. Omitted fields
/// keep their stored value.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateSettingsRequest {
    #[validate(length(min = 1, max = 255, message = "Business name cannot be blank"))]
    pub name: Option<String>,
    pub address: Option<String>,
    #[validate(email(message = "Invalid business email"))]
    pub email: Option<String>,
    pub phone: Option<String>,
    #[validate(url(message = "Invalid logo URL"))]
    pub logo_url: Option<String>,
    pub tax_id: Option<String>,
    #[validate(range(min = 0, max = 365, message = "Due days must be between 0 and 365"))]
    pub due_days: Option<i32>,
    pub default_tax_rate: Option<Decimal>,
    #[validate(length(equal = 3, message = "Currency must be a 3-letter ISO code"))]
    pub currency: Option<String>,
    #[validate(length(max = 16, message = "Invoice prefix is too long"))]
    pub invoice_prefix: Option<String>,
    pub default_notes: Option<String>,
    pub default_terms: Option<String>,
    pub payment_info: Option<String>,
    #[validate(url(message = "Invalid payment QR URL"))]
    pub payment_qr_url: Option<String>,
}

impl From<UpdateSettingsRequest> for UpdateSettings {
    fn from(req: UpdateSettingsRequest) -> Self {
        Self {
            name: req.name,
            address: req.address,
            email: req.email,
            phone: req.phone,
            logo_url: req.logo_url,
            tax_id: req.tax_id,
            due_days: req.due_days,
            default_tax_rate: req.default_tax_rate,
            currency: req.currency.map(|c| c.trim().to_ascii_uppercase()),
            invoice_prefix: req.invoice_prefix,
            default_notes: req.default_notes,
            default_terms: req.default_terms,
            payment_info: req.payment_info,
            payment_qr_url: req.payment_qr_url,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct UnlockTemplateRequest {
    #[validate(length(min = 1, max = 128, message = "Registration key is required"))]
    pub key: String,
}

#[derive(Debug, Serialize)]
pub struct UnlockTemplateResponse {
    pub template: TemplateKind,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ActiveTemplateRequest {
    #[validate(length(min = 1, max = 64, message = "Template name is required"))]
    pub template: String,
}

#[derive(Debug, Serialize)]
pub struct TemplateCatalogResponse {
    pub built_in: Vec<TemplateKind>,
    pub unlocked: Vec<TemplateKind>,
    pub active: String,
}
