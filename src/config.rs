//! Configuration types, read from the environment at startup.

use std::path::PathBuf;
use std::str::FromStr;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::onboarding::matcher::MIN_CANDIDATES;

/// Crops offered to farmers when no override is configured.
pub const DEFAULT_SUPPORTED_CROPS: &[&str] =
    &["Avocado", "Cacao", "Cassava", "Coffee", "Maize", "Rice", "Tea"];

/// Top-level application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub llm: LlmConfig,
    pub matcher: MatcherConfig,
    pub onboarding: OnboardingConfig,
    pub server: ServerConfig,
    /// Optional JSON file used to seed the administrative hierarchy.
    pub admin_seed_path: Option<PathBuf>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            database: DatabaseConfig::from_env(),
            llm: LlmConfig::from_env(),
            matcher: MatcherConfig::from_env()?,
            onboarding: OnboardingConfig::from_env(),
            server: ServerConfig::from_env()?,
            admin_seed_path: std::env::var("AGRI_ASSIST_ADMIN_SEED").ok().map(PathBuf::from),
        })
    }
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

impl DatabaseConfig {
    pub fn from_env() -> Self {
        let path = std::env::var("AGRI_ASSIST_DB_PATH")
            .unwrap_or_else(|_| "./data/agri-assist.db".to_string());
        Self {
            path: PathBuf::from(path),
        }
    }
}

/// Configuration for the OpenAI-compatible extraction backend.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// `None` leaves the backend unconfigured; extraction then degrades to
    /// "no match" on every call.
    pub api_key: Option<SecretString>,
    pub model: String,
    pub base_url: String,
}

impl LlmConfig {
    pub fn from_env() -> Self {
        Self {
            api_key: std::env::var("OPENAI_API_KEY")
                .ok()
                .filter(|k| !k.trim().is_empty())
                .map(SecretString::from),
            model: std::env::var("AGRI_ASSIST_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            base_url: std::env::var("OPENAI_BASE_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
        }
    }
}

/// Thresholds for hierarchical location matching.
#[derive(Debug, Clone, PartialEq)]
pub struct MatcherConfig {
    /// Minimum weighted score (0–100) for a ward to be kept as a candidate.
    pub match_threshold: f64,
    /// Top-two score gap at or below which a match is ambiguous.
    pub ambiguity_threshold: f64,
    /// Maximum number of candidates presented for disambiguation. At least
    /// two.
    pub max_candidates: usize,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            match_threshold: 60.0,
            ambiguity_threshold: 15.0,
            max_candidates: 5,
        }
    }
}

impl MatcherConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let config = Self {
            match_threshold: env_parse("AGRI_ASSIST_MATCH_THRESHOLD", defaults.match_threshold)?,
            ambiguity_threshold: env_parse(
                "AGRI_ASSIST_AMBIGUITY_THRESHOLD",
                defaults.ambiguity_threshold,
            )?,
            max_candidates: env_parse("AGRI_ASSIST_MAX_CANDIDATES", defaults.max_candidates)?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_candidates < MIN_CANDIDATES {
            return Err(ConfigError::InvalidValue {
                key: "AGRI_ASSIST_MAX_CANDIDATES".to_string(),
                message: format!(
                    "must be at least {MIN_CANDIDATES}, got {}",
                    self.max_candidates
                ),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct OnboardingConfig {
    /// Canonical crop names, in the order they are shown to farmers.
    pub supported_crops: Vec<String>,
}

impl Default for OnboardingConfig {
    fn default() -> Self {
        Self {
            supported_crops: DEFAULT_SUPPORTED_CROPS.iter().map(|c| c.to_string()).collect(),
        }
    }
}

impl OnboardingConfig {
    pub fn from_env() -> Self {
        match std::env::var("AGRI_ASSIST_SUPPORTED_CROPS") {
            Ok(raw) => {
                let crops = parse_list(&raw);
                if crops.is_empty() {
                    Self::default()
                } else {
                    Self {
                        supported_crops: crops,
                    }
                }
            }
            Err(_) => Self::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub http_port: u16,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            http_port: env_parse("AGRI_ASSIST_HTTP_PORT", 8080)?,
        })
    }
}

/// Split a comma-separated list, dropping blanks.
fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn env_parse<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse::<T>().map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        }),
        Err(_) => Ok(default),
    }
}
