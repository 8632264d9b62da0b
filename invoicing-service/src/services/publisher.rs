//! Stores rendered artifacts and hands back their public URL.

use crate::rendering::DocumentFormat;
use crate::services::storage::Storage;
use chrono::{DateTime, Utc};
use service_core::error::AppError;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// Prefix under which every artifact key lives. Also the URL path segment
/// the HTTP layer serves them from.
pub const ARTIFACT_PREFIX: &str = "artifacts";

#[derive(Clone)]
pub struct ArtifactPublisher {
    storage: Arc<dyn Storage>,
    public_base_url: String,
}

impl ArtifactPublisher {
    pub fn new(storage: Arc<dyn Storage>, public_base_url: impl Into<String>) -> Self {
        Self {
            storage,
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Upload `bytes` under a fresh key and return its URL. Earlier artifacts
    /// for the same invoice are left in place.
    #[instrument(skip(self, bytes), fields(owner = %owner, size = bytes.len()))]
    pub async fn publish(
        &self,
        owner: Uuid,
        bytes: Vec<u8>,
        suggested_name: &str,
        format: DocumentFormat,
    ) -> Result<String, AppError> {
        let key = artifact_key(owner, suggested_name, format, Utc::now(), Uuid::new_v4());
        self.storage
            .upload(&key, bytes, format.content_type())
            .await?;

        let url = format!("{}/{}", self.public_base_url, key);
        info!(key = %key, "Artifact published");
        Ok(url)
    }
}

/// `artifacts/<owner>/<slug>-<yyyymmddHHMMSS>-<8 hex>.<ext>`
pub fn artifact_key(
    owner: Uuid,
    suggested_name: &str,
    format: DocumentFormat,
    at: DateTime<Utc>,
    nonce: Uuid,
) -> String {
    let suffix = nonce.simple().to_string();
    format!(
        "{}/{}/{}-{}-{}.{}",
        ARTIFACT_PREFIX,
        owner,
        slugify(suggested_name),
        at.format("%Y%m%d%H%M%S"),
        &suffix[..8],
        format.extension()
    )
}

fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let slug = slug.trim_matches('-');
    if slug.is_empty() {
        "document".to_string()
    } else {
        slug.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::storage::LocalStorage;
    use chrono::TimeZone;

    #[test]
    fn key_has_owner_slug_timestamp_and_suffix() {
        let owner = Uuid::nil();
        let at = Utc.with_ymd_and_hms(2026, 4, 9, 13, 5, 7).unwrap();
        let nonce = Uuid::parse_str("a1b2c3d4-0000-4000-8000-000000000000").unwrap();

        let key = artifact_key(owner, "Invoice INV-0007", DocumentFormat::Pdf, at, nonce);

        assert_eq!(
            key,
            format!("artifacts/{}/invoice-inv-0007-20260409130507-a1b2c3d4.pdf", owner)
        );
    }

    #[test]
    fn slug_falls_back_when_name_has_no_usable_characters() {
        assert_eq!(slugify("  //  "), "document");
        assert_eq!(slugify("Acme & Sons__Q1"), "acme-sons-q1");
    }

    #[tokio::test]
    async fn publishing_twice_yields_distinct_urls() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(LocalStorage::new(dir.path()).await.unwrap());
        let publisher = ArtifactPublisher::new(storage, "http://localhost:8080/");
        let owner = Uuid::new_v4();

        let first = publisher
            .publish(owner, vec![1, 2, 3], "INV-0001", DocumentFormat::Png)
            .await
            .unwrap();
        let second = publisher
            .publish(owner, vec![4, 5, 6], "INV-0001", DocumentFormat::Png)
            .await
            .unwrap();

        assert_ne!(first, second);
        assert!(first.starts_with("http://localhost:8080/artifacts/"));
        assert!(first.ends_with(".png"));
    }
}
