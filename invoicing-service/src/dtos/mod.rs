pub mod account;
pub mod invoices;
pub mod lenient;

pub use account::{
    ActiveTemplateRequest, TemplateCatalogResponse, UnlockTemplateRequest, UnlockTemplateResponse,
    UpdateSettingsRequest,
};
pub use invoices::{
    ArtifactRequest, ArtifactResponse, BulkRequest, BulkResponse, InvoiceListParams,
    InvoiceListResponse, InvoiceRequest, LineItemRequest, NewClientRequest, PaymentRequest,
    PreviewLine, PreviewRequest, PreviewResponse, SuggestionParams, UpdateInvoiceResponse,
};
