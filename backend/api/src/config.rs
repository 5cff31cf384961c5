//! Application configuration loaded from environment variables.

use tracing::{info, warn};

use crate::errors::{ApiError, Result};

const DEFAULT_PORT: u16 = 5000;

/// Browser origins allowed to call the API when `CORS_ORIGINS` is unset.
const DEFAULT_CORS_ORIGINS: &[&str] = &[
    "http://localhost:5173",
    "http://localhost:4173",
    "http://localhost:3000",
    "http://127.0.0.1:5173",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    fn parse(raw: Option<&str>) -> Self {
        match raw {
            Some(v) if v.eq_ignore_ascii_case("production") => Self::Production,
            _ => Self::Development,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

/// Hosted inference provider the chat and enrichment services talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AiProvider {
    HuggingFace,
    OpenRouter,
}

impl AiProvider {
    fn default_models(&self) -> (&'static str, &'static str) {
        match self {
            Self::HuggingFace => (
                "mistralai/Mistral-7B-Instruct-v0.2",
                "HuggingFaceH4/zephyr-7b-beta",
            ),
            Self::OpenRouter => (
                "mistralai/mistral-7b-instruct:free",
                "meta-llama/llama-3.2-3b-instruct:free",
            ),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HuggingFace => "huggingface",
            Self::OpenRouter => "openrouter",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CloudinaryConfig {
    pub cloud_name: Option<String>,
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
    /// Preset applied when an upload request does not name one.
    pub upload_preset: Option<String>,
}

impl CloudinaryConfig {
    pub fn is_complete(&self) -> bool {
        self.cloud_name.is_some() && self.api_key.is_some() && self.api_secret.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct AiConfig {
    pub provider: Option<AiProvider>,
    pub hugging_face_api_key: Option<String>,
    pub openrouter_api_key: Option<String>,
    pub primary_model: String,
    pub fallback_model: String,
}

impl AiConfig {
    /// API key for the selected provider, if any.
    pub fn api_key(&self) -> Option<&str> {
        match self.provider? {
            AiProvider::HuggingFace => self.hugging_face_api_key.as_deref(),
            AiProvider::OpenRouter => self.openrouter_api_key.as_deref(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Port for the HTTP server
    pub port: u16,
    pub environment: Environment,
    pub stripe_secret_key: Option<String>,
    pub cloudinary: CloudinaryConfig,
    pub ai: AiConfig,
    /// Exact origins accepted by the CORS layer
    pub cors_origins: Vec<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from an arbitrary key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let environment = Environment::parse(var("NODE_ENV").as_deref());
        let port = match var("PORT") {
            Some(raw) => raw
                .parse()
                .map_err(|_| ApiError::Config(format!("Invalid PORT: {raw}")))?,
            None => DEFAULT_PORT,
        };

        let cloudinary = CloudinaryConfig {
            cloud_name: var("CLOUDINARY_CLOUD_NAME"),
            api_key: var("CLOUDINARY_API_KEY"),
            api_secret: var("CLOUDINARY_API_SECRET"),
            upload_preset: var("CLOUDINARY_UPLOAD_PRESET"),
        };

        let hugging_face_api_key = var("VITE_HUGGING_FACE_API_KEY");
        let openrouter_api_key = var("VITE_OPENROUTER_API_KEY");
        let provider = match (&hugging_face_api_key, &openrouter_api_key) {
            (Some(_), _) => Some(AiProvider::HuggingFace),
            (None, Some(_)) => Some(AiProvider::OpenRouter),
            (None, None) => None,
        };
        let (primary, fallback) = provider
            .unwrap_or(AiProvider::HuggingFace)
            .default_models();
        let ai = AiConfig {
            provider,
            hugging_face_api_key,
            openrouter_api_key,
            primary_model: var("AI_PRIMARY_MODEL").unwrap_or_else(|| primary.to_string()),
            fallback_model: var("AI_FALLBACK_MODEL").unwrap_or_else(|| fallback.to_string()),
        };

        let cors_origins: Vec<String> = match var("CORS_ORIGINS") {
            Some(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(String::from)
                .collect(),
            None => DEFAULT_CORS_ORIGINS.iter().map(|o| o.to_string()).collect(),
        };
        // Credentialed CORS cannot be combined with a wildcard origin.
        if cors_origins.iter().any(|o| o == "*") {
            return Err(ApiError::Config(
                "CORS_ORIGINS must list explicit origins".into(),
            ));
        }

        let config = Config {
            port,
            environment,
            stripe_secret_key: var("STRIPE_SECRET_KEY"),
            cloudinary,
            ai,
            cors_origins,
        };
        config.validate()?;
        Ok(config)
    }

    /// Names of vendor secrets that are not configured.
    pub fn missing_secrets(&self) -> Vec<&'static str> {
        let checks = [
            ("STRIPE_SECRET_KEY", self.stripe_secret_key.is_some()),
            ("CLOUDINARY_CLOUD_NAME", self.cloudinary.cloud_name.is_some()),
            ("CLOUDINARY_API_KEY", self.cloudinary.api_key.is_some()),
            ("CLOUDINARY_API_SECRET", self.cloudinary.api_secret.is_some()),
        ];
        checks
            .into_iter()
            .filter(|(_, present)| !present)
            .map(|(name, _)| name)
            .collect()
    }

    fn validate(&self) -> Result<()> {
        let missing = self.missing_secrets();
        if missing.is_empty() {
            return Ok(());
        }
        if self.environment.is_production() {
            return Err(ApiError::Config(format!(
                "missing required environment variables: {}",
                missing.join(", ")
            )));
        }
        warn!(
            "Running without {}; dependent endpoints will fail",
            missing.join(", ")
        );
        Ok(())
    }

    /// Log the effective configuration with every secret redacted.
    pub fn log_summary(&self) {
        info!(
            environment = self.environment.as_str(),
            port = self.port,
            stripe_secret_key = redact(&self.stripe_secret_key),
            cloudinary_cloud_name = self.cloudinary.cloud_name.as_deref().unwrap_or("missing"),
            cloudinary_api_key = redact(&self.cloudinary.api_key),
            cloudinary_api_secret = redact(&self.cloudinary.api_secret),
            cloudinary_upload_preset = self.cloudinary.upload_preset.as_deref().unwrap_or("missing"),
            ai_provider = self.ai.provider.map(|p| p.as_str()).unwrap_or("none"),
            ai_api_key = redact(&self.ai.api_key().map(String::from)),
            primary_model = %self.ai.primary_model,
            fallback_model = %self.ai.fallback_model,
            cors_origins = ?self.cors_origins,
            "Configuration loaded"
        );
    }
}

/// Render a secret as `set` / `missing`, never its value.
pub fn redact(secret: &Option<String>) -> &'static str {
    if secret.is_some() {
        "set"
    } else {
        "missing"
    }
}
