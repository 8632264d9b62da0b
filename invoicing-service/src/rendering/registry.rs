//! Template catalogue and per-account template resolution.

use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use std::collections::HashMap;
use tracing::warn;

/// Every template the service can render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemplateKind {
    Classic,
    Modern,
    Minimal,
    Elegant,
    Corporate,
}

impl TemplateKind {
    pub const BUILT_IN: [TemplateKind; 3] =
        [TemplateKind::Classic, TemplateKind::Modern, TemplateKind::Minimal];

    pub fn as_str(&self) -> &'static str {
        match self {
            TemplateKind::Classic => "classic",
            TemplateKind::Modern => "modern",
            TemplateKind::Minimal => "minimal",
            TemplateKind::Elegant => "elegant",
            TemplateKind::Corporate => "corporate",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "classic" => Some(TemplateKind::Classic),
            "modern" => Some(TemplateKind::Modern),
            "minimal" => Some(TemplateKind::Minimal),
            "elegant" => Some(TemplateKind::Elegant),
            "corporate" => Some(TemplateKind::Corporate),
            _ => None,
        }
    }

    /// Built-ins are available to every account without unlocking.
    pub fn is_built_in(&self) -> bool {
        Self::BUILT_IN.contains(self)
    }
}

/// Resolves template names for an account. Unknown or locked names fall
/// back to the default instead of failing.
#[derive(Debug, Clone)]
pub struct TemplateRegistry {
    default: TemplateKind,
    unlock_keys: HashMap<String, TemplateKind>,
}

impl TemplateRegistry {
    pub fn new(default: TemplateKind, unlock_keys: HashMap<String, TemplateKind>) -> Self {
        Self {
            default,
            unlock_keys,
        }
    }

    pub fn default_kind(&self) -> TemplateKind {
        self.default
    }

    /// Parse `KEY:name,KEY2:name`. Only unlockable templates may be named.
    pub fn parse_unlock_keys(raw: &str) -> Result<HashMap<String, TemplateKind>, AppError> {
        let mut keys = HashMap::new();
        for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let (key, name) = entry.split_once(':').ok_or_else(|| {
                AppError::ConfigError(anyhow::anyhow!(
                    "Invalid template unlock entry '{}', expected KEY:name",
                    entry
                ))
            })?;
            let kind = TemplateKind::from_name(name)
                .filter(|kind| !kind.is_built_in())
                .ok_or_else(|| {
                    AppError::ConfigError(anyhow::anyhow!(
                        "Unlock key '{}' names unknown or built-in template '{}'",
                        key.trim(),
                        name.trim()
                    ))
                })?;
            keys.insert(key.trim().to_string(), kind);
        }
        Ok(keys)
    }

    /// Exchange an opaque registration key for the template it unlocks.
    pub fn redeem(&self, key: &str) -> Option<TemplateKind> {
        self.unlock_keys.get(key.trim()).copied()
    }

    /// The template `name` refers to if the account may use it.
    pub fn available(&self, name: &str, unlocked: &[String]) -> Option<TemplateKind> {
        let kind = TemplateKind::from_name(name)?;
        let usable = kind.is_built_in() || unlocked.iter().any(|u| u == kind.as_str());
        usable.then_some(kind)
    }

    /// Template to render `name` with. Never fails.
    pub fn resolve(&self, name: &str, unlocked: &[String]) -> TemplateKind {
        match self.available(name, unlocked) {
            Some(kind) => kind,
            None => {
                warn!(
                    requested = %name,
                    fallback = self.default.as_str(),
                    "Template not available, using default"
                );
                self.default
            }
        }
    }
}

impl Default for TemplateRegistry {
    fn default() -> Self {
        Self::new(TemplateKind::Classic, HashMap::new())
    }
}
