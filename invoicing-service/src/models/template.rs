//! Template assignment model for invoicing-service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A document template unlocked by an account. Unique per (user, name).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TemplateAssignment {
    pub user_id: Uuid,
    pub template_name: String,
    pub created_utc: DateTime<Utc>,
}
