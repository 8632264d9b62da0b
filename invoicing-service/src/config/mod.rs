use crate::rendering::{TemplateKind, TemplateRegistry};
use service_core::config as core_config;
use service_core::error::AppError;
use std::collections::HashMap;
use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct InvoicingConfig {
    pub common: core_config::Config,
    pub environment: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub store: StoreConfig,
    pub storage: StorageConfig,
    pub renderer: RendererConfig,
    pub templates: TemplateConfig,
}

#[derive(Debug, Clone)]
pub enum StoreConfig {
    Postgres(DatabaseConfig),
    Memory,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub local_path: String,
    pub s3_bucket: Option<String>,
    pub s3_region: Option<String>,
    /// S3-compatible endpoint such as MinIO. Unset means AWS.
    pub s3_endpoint: Option<String>,
    pub public_base_url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Local,
    S3,
}

impl std::str::FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "local" => Ok(StorageBackend::Local),
            "s3" => Ok(StorageBackend::S3),
            _ => Err(format!("Invalid storage backend: {}", s)),
        }
    }
}

impl StorageConfig {
    /// Bucket to upload to when the backend is S3.
    pub fn require_bucket(&self) -> Result<&str, AppError> {
        self.s3_bucket
            .as_deref()
            .map(str::trim)
            .filter(|b| !b.is_empty())
            .ok_or_else(|| {
                AppError::ConfigError(anyhow::anyhow!(
                    "STORAGE_S3_BUCKET is required when STORAGE_BACKEND=s3"
                ))
            })
    }
}

#[derive(Debug, Clone)]
pub struct RendererConfig {
    pub chrome_path: String,
    pub timeout: Duration,
    pub settle: Duration,
    pub font_url: String,
}

#[derive(Debug, Clone)]
pub struct TemplateConfig {
    pub default: TemplateKind,
    pub unlock_keys: HashMap<String, TemplateKind>,
}

impl TemplateConfig {
    pub fn registry(&self) -> TemplateRegistry {
        TemplateRegistry::new(self.default, self.unlock_keys.clone())
    }
}

const DEFAULT_FONT_URL: &str =
    "https://fonts.googleapis.com/css2?family=Inter:wght@400;600;700&display=swap";

impl InvoicingConfig {
    pub fn load() -> Result<Self, AppError> {
        // Load common config (handles .env and APP__ prefix)
        let common = core_config::Config::load()?;

        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        let is_prod = environment == "prod";

        let store = match get_env("STORE_BACKEND", Some("postgres"), false)?
            .to_lowercase()
            .as_str()
        {
            "postgres" => StoreConfig::Postgres(DatabaseConfig {
                url: get_env("DATABASE_URL", None, is_prod)?,
                max_connections: parse_env("DATABASE_MAX_CONNECTIONS", 10)?,
                min_connections: parse_env("DATABASE_MIN_CONNECTIONS", 1)?,
            }),
            "memory" if !is_prod => StoreConfig::Memory,
            other => {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "Invalid store backend for {}: {}",
                    environment,
                    other
                )));
            }
        };

        let port = common.port;
        let backend: StorageBackend = get_env("STORAGE_BACKEND", Some("local"), false)?
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;
        let storage = StorageConfig {
            backend,
            local_path: get_env(
                "STORAGE_LOCAL_PATH",
                Some("storage"),
                is_prod && backend == StorageBackend::Local,
            )?,
            s3_bucket: env::var("STORAGE_S3_BUCKET").ok(),
            s3_region: env::var("STORAGE_S3_REGION").ok().filter(|v| !v.is_empty()),
            s3_endpoint: env::var("STORAGE_S3_ENDPOINT").ok().filter(|v| !v.is_empty()),
            public_base_url: get_env(
                "STORAGE_PUBLIC_BASE_URL",
                Some(&format!("http://localhost:{}", port)),
                is_prod,
            )?,
        };
        if storage.backend == StorageBackend::S3 {
            storage.require_bucket()?;
        }

        let renderer = RendererConfig {
            chrome_path: get_env("RENDERER_CHROME_PATH", Some("chromium"), is_prod)?,
            timeout: Duration::from_secs(parse_env("RENDERER_TIMEOUT_SECS", 30)?),
            settle: Duration::from_millis(parse_env("RENDERER_SETTLE_MS", 2000)?),
            font_url: env::var("RENDERER_FONT_URL").unwrap_or_else(|_| DEFAULT_FONT_URL.into()),
        };

        let default_name = get_env("TEMPLATE_DEFAULT", Some("classic"), false)?;
        let default = TemplateKind::from_name(&default_name)
            .filter(TemplateKind::is_built_in)
            .ok_or_else(|| {
                AppError::ConfigError(anyhow::anyhow!(
                    "TEMPLATE_DEFAULT must name a built-in template, got '{}'",
                    default_name
                ))
            })?;
        let unlock_keys = TemplateRegistry::parse_unlock_keys(
            &env::var("TEMPLATE_UNLOCK_KEYS").unwrap_or_default(),
        )?;

        Ok(Self {
            common,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok().filter(|v| !v.is_empty()),
            environment,
            store,
            storage,
            renderer,
            templates: TemplateConfig {
                default,
                unlock_keys,
            },
        })
    }
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required in production but not set",
                    key
                ))))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required but not set",
                    key
                ))))
            }
        }
    }
}

fn parse_env<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(val) => val.trim().parse().map_err(|e: T::Err| {
            AppError::ConfigError(anyhow::anyhow!("{} is not valid: {}", key, e))
        }),
        Err(_) => Ok(default),
    }
}
