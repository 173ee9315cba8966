#[cfg(feature = "cli")]
pub mod cli;
pub mod toml_config;

#[cfg(feature = "cli")]
pub use cli::CliConfig;
pub use toml_config::PortalConfig;

use crate::core::ConfigProvider;
use crate::utils::error::Result;
use crate::utils::validation::{validate_path, validate_range, validate_url, Validate};

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8080";
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 30;
pub const MAX_TIMEOUT_SECONDS: u64 = 300;

/// Effective settings after merging command-line flags over the TOML file.
#[derive(Debug, Clone, PartialEq)]
pub struct PortalSettings {
    pub api_base_url: String,
    pub access_token: Option<String>,
    pub timeout_seconds: u64,
    pub draft_dir: String,
    pub log_level: Option<String>,
    pub json_logs: bool,
}

impl Default for PortalSettings {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            access_token: None,
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
            draft_dir: ".".to_string(),
            log_level: None,
            json_logs: false,
        }
    }
}

impl PortalSettings {
    pub fn from_portal_config(config: &PortalConfig) -> Self {
        let defaults = Self::default();
        Self {
            api_base_url: config.base_url().to_string(),
            access_token: config.access_token().map(str::to_string),
            timeout_seconds: config.timeout_seconds().unwrap_or(defaults.timeout_seconds),
            draft_dir: config
                .draft_directory()
                .map(str::to_string)
                .unwrap_or(defaults.draft_dir),
            log_level: config.log_level().map(str::to_string),
            json_logs: config.json_logs(),
        }
    }
}

impl ConfigProvider for PortalSettings {
    fn api_base_url(&self) -> &str {
        &self.api_base_url
    }

    fn access_token(&self) -> Option<&str> {
        self.access_token.as_deref()
    }

    fn timeout_seconds(&self) -> u64 {
        self.timeout_seconds
    }
}

impl ConfigProvider for PortalConfig {
    fn api_base_url(&self) -> &str {
        self.base_url()
    }

    fn access_token(&self) -> Option<&str> {
        PortalConfig::access_token(self)
    }

    fn timeout_seconds(&self) -> u64 {
        PortalConfig::timeout_seconds(self).unwrap_or(DEFAULT_TIMEOUT_SECONDS)
    }
}

impl Validate for PortalSettings {
    fn validate(&self) -> Result<()> {
        validate_url("api_base_url", &self.api_base_url)?;
        validate_range("timeout_seconds", self.timeout_seconds, 1, MAX_TIMEOUT_SECONDS)?;
        validate_path("draft_dir", &self.draft_dir)?;
        Ok(())
    }
}
