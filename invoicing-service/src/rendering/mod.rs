//! Document rendering: template registry, view model, HTML templates and the
//! headless browser that turns them into PDF or PNG artifacts.

pub mod browser;
pub mod registry;
pub mod renderer;
pub mod templates;
pub mod view;

use serde::{Deserialize, Serialize};

pub use browser::{BrowserSession, ChromeBrowser, HeadlessBrowser};
pub use registry::{TemplateKind, TemplateRegistry};
pub use renderer::{DocumentRenderer, RenderError};
pub use view::{InvoiceView, RenderSource};

/// Output format of a rendered document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    #[default]
    Pdf,
    Png,
}

impl DocumentFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentFormat::Pdf => "pdf",
            DocumentFormat::Png => "png",
        }
    }

    pub fn extension(&self) -> &'static str {
        self.as_str()
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            DocumentFormat::Pdf => "application/pdf",
            DocumentFormat::Png => "image/png",
        }
    }
}
