//! Askama bindings for the invoice document templates.
//!
//! Each template extends `invoices/base.html`, which carries the page size,
//! the web-font link and the shared table styles. `print` switches on the A4
//! page rule for PDF output.

use crate::rendering::registry::TemplateKind;
use crate::rendering::view::InvoiceView;
use crate::rendering::DocumentFormat;
use askama::Template;

#[derive(Template)]
#[template(path = "invoices/classic.html")]
pub struct ClassicTemplate<'a> {
    pub view: &'a InvoiceView,
    pub font_url: &'a str,
    pub print: bool,
}

#[derive(Template)]
#[template(path = "invoices/modern.html")]
pub struct ModernTemplate<'a> {
    pub view: &'a InvoiceView,
    pub font_url: &'a str,
    pub print: bool,
}

#[derive(Template)]
#[template(path = "invoices/minimal.html")]
pub struct MinimalTemplate<'a> {
    pub view: &'a InvoiceView,
    pub font_url: &'a str,
    pub print: bool,
}

#[derive(Template)]
#[template(path = "invoices/elegant.html")]
pub struct ElegantTemplate<'a> {
    pub view: &'a InvoiceView,
    pub font_url: &'a str,
    pub print: bool,
}

#[derive(Template)]
#[template(path = "invoices/corporate.html")]
pub struct CorporateTemplate<'a> {
    pub view: &'a InvoiceView,
    pub font_url: &'a str,
    pub print: bool,
}

/// Produce the self-contained HTML document for `kind`.
pub fn render_html(
    kind: TemplateKind,
    view: &InvoiceView,
    font_url: &str,
    format: DocumentFormat,
) -> Result<String, askama::Error> {
    let print = format == DocumentFormat::Pdf;
    match kind {
        TemplateKind::Classic => ClassicTemplate { view, font_url, print }.render(),
        TemplateKind::Modern => ModernTemplate { view, font_url, print }.render(),
        TemplateKind::Minimal => MinimalTemplate { view, font_url, print }.render(),
        TemplateKind::Elegant => ElegantTemplate { view, font_url, print }.render(),
        TemplateKind::Corporate => CorporateTemplate { view, font_url, print }.render(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rendering::view::{LineView, PartyView};

    fn view() -> InvoiceView {
        InvoiceView {
            invoice_number: "INV-0042".to_string(),
            invoice_date: "March 5, 2026".to_string(),
            due_date: Some("April 4, 2026".to_string()),
            status: "Pending".to_string(),
            is_paid: false,
            notes: Some("Thanks for your business".to_string()),
            terms: None,
            business: PartyView {
                name: "Acme <Studio>".to_string(),
                address_lines: vec!["1 Main St".to_string()],
                email: Some("hello@acme.test".to_string()),
                phone: None,
            },
            logo_url: None,
            tax_id: Some("GST-991".to_string()),
            client: PartyView {
                name: "Globex".to_string(),
                address_lines: Vec::new(),
                email: None,
                phone: Some("+1 555 0100".to_string()),
            },
            prepared_by: "Jordan".to_string(),
            items: vec![LineView {
                description: "Design work".to_string(),
                quantity: "2".to_string(),
                rate: "$50.00".to_string(),
                amount: "$100.00".to_string(),
            }],
            subtotal: "$100.00".to_string(),
            discount_label: "Discount (10%)".to_string(),
            discount_amount: Some("$10.00".to_string()),
            tax_label: "Tax (10%)".to_string(),
            tax_amount: Some("$9.00".to_string()),
            shipping: Some("$5.00".to_string()),
            total: "$104.00".to_string(),
            amount_paid: None,
            balance_due: "$104.00".to_string(),
            payment_info: Some("Bank: 0001".to_string()),
            payment_qr_url: Some("https://cdn.test/qr.png".to_string()),
        }
    }

    #[test]
    fn every_template_renders_invoice_figures() {
        let view = view();
        for kind in [
            TemplateKind::Classic,
            TemplateKind::Modern,
            TemplateKind::Minimal,
            TemplateKind::Elegant,
            TemplateKind::Corporate,
        ] {
            let html = render_html(kind, &view, "https://fonts.test/inter.css", DocumentFormat::Pdf)
                .unwrap();
            assert!(html.contains("INV-0042"), "{} lacks number", kind.as_str());
            assert!(html.contains("$104.00"), "{} lacks total", kind.as_str());
            assert!(html.contains("Design work"), "{} lacks items", kind.as_str());
            assert!(html.contains("Bank: 0001"), "{} lacks payment info", kind.as_str());
            assert!(html.contains("https://fonts.test/inter.css"));
        }
    }

    #[test]
    fn pdf_output_declares_a4_page_and_png_does_not() {
        let view = view();
        let pdf = render_html(TemplateKind::Classic, &view, "", DocumentFormat::Pdf).unwrap();
        let png = render_html(TemplateKind::Classic, &view, "", DocumentFormat::Png).unwrap();
        assert!(pdf.contains("size: A4"));
        assert!(!png.contains("size: A4"));
    }

    #[test]
    fn user_content_is_escaped() {
        let html = render_html(TemplateKind::Minimal, &view(), "", DocumentFormat::Png).unwrap();
        assert!(html.contains("Acme &lt;Studio&gt;"));
        assert!(!html.contains("Acme <Studio>"));
    }
}
