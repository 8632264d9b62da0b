//! Business settings and the per-account template catalogue.

use crate::dtos::{
    ActiveTemplateRequest, TemplateCatalogResponse, UnlockTemplateRequest, UnlockTemplateResponse,
    UpdateSettingsRequest,
};
use crate::models::{BusinessProfile, UpdateSettings};
use crate::rendering::{TemplateKind, TemplateRegistry};
use crate::services::repository::InvoiceRepository;
use service_core::error::AppError;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

#[derive(Clone)]
pub struct AccountService {
    repo: Arc<dyn InvoiceRepository>,
    registry: TemplateRegistry,
}

impl AccountService {
    pub fn new(repo: Arc<dyn InvoiceRepository>, registry: TemplateRegistry) -> Self {
        Self { repo, registry }
    }

    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn settings(&self, user_id: Uuid) -> Result<BusinessProfile, AppError> {
        self.repo
            .get_business_profile(user_id)
            .await?
            .ok_or_else(profile_not_found)
    }

    #[instrument(skip(self, req), fields(user_id = %user_id))]
    pub async fn update_settings(
        &self,
        user_id: Uuid,
        req: UpdateSettingsRequest,
    ) -> Result<BusinessProfile, AppError> {
        req.validate()?;
        if req.default_tax_rate.is_some_and(|rate| rate.is_sign_negative()) {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Default tax rate cannot be negative"
            )));
        }

        let profile = self
            .repo
            .update_settings(user_id, &UpdateSettings::from(req))
            .await?
            .ok_or_else(profile_not_found)?;

        info!("Settings updated");
        Ok(profile)
    }

    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn catalog(&self, user_id: Uuid) -> Result<TemplateCatalogResponse, AppError> {
        let profile = self.settings(user_id).await?;
        let unlocked = self
            .repo
            .list_template_assignments(user_id)
            .await?
            .iter()
            .filter_map(|assignment| TemplateKind::from_name(&assignment.template_name))
            .collect();

        Ok(TemplateCatalogResponse {
            built_in: TemplateKind::BUILT_IN.to_vec(),
            unlocked,
            active: profile.settings.active_template,
        })
    }

    /// Redeem a registration key for the template it unlocks.
    #[instrument(skip(self, req), fields(user_id = %user_id))]
    pub async fn unlock(
        &self,
        user_id: Uuid,
        req: UnlockTemplateRequest,
    ) -> Result<UnlockTemplateResponse, AppError> {
        req.validate()?;

        let Some(kind) = self.registry.redeem(&req.key) else {
            warn!("Unknown template registration key");
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Invalid template registration key"
            )));
        };

        self.repo
            .add_template_assignment(user_id, kind.as_str())
            .await?;

        info!(template = kind.as_str(), "Template unlocked");
        Ok(UnlockTemplateResponse { template: kind })
    }

    /// Make `req.template` the account's active template. Only built-ins and
    /// templates the account has unlocked may be chosen.
    #[instrument(skip(self, req), fields(user_id = %user_id))]
    pub async fn set_active(
        &self,
        user_id: Uuid,
        req: ActiveTemplateRequest,
    ) -> Result<BusinessProfile, AppError> {
        req.validate()?;

        let kind = known_template(&req.template)?;
        let unlocked = self.unlocked(user_id).await?;
        if self.registry.available(kind.as_str(), &unlocked).is_none() {
            return Err(AppError::Forbidden(anyhow::anyhow!(
                "Template '{}' has not been unlocked",
                kind.as_str()
            )));
        }

        let profile = self
            .repo
            .set_active_template(user_id, kind.as_str())
            .await?
            .ok_or_else(profile_not_found)?;

        info!(template = kind.as_str(), "Active template changed");
        Ok(profile)
    }

    /// Drop an unlocked template. The active template cannot be removed.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn remove(&self, user_id: Uuid, template_name: &str) -> Result<(), AppError> {
        let kind = known_template(template_name)?;
        if kind.is_built_in() {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Built-in template '{}' cannot be removed",
                kind.as_str()
            )));
        }

        if !self
            .repo
            .remove_template_assignment(user_id, kind.as_str())
            .await?
        {
            return Err(AppError::NotFound(anyhow::anyhow!(
                "Template '{}' is not assigned to this account",
                kind.as_str()
            )));
        }

        info!(template = kind.as_str(), "Template removed");
        Ok(())
    }

    async fn unlocked(&self, user_id: Uuid) -> Result<Vec<String>, AppError> {
        Ok(self
            .repo
            .list_template_assignments(user_id)
            .await?
            .into_iter()
            .map(|assignment| assignment.template_name)
            .collect())
    }
}

fn known_template(name: &str) -> Result<TemplateKind, AppError> {
    TemplateKind::from_name(name)
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Unknown template '{}'", name.trim())))
}

fn profile_not_found() -> AppError {
    AppError::NotFound(anyhow::anyhow!("Business profile not found"))
}
