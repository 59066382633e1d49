//! Application configuration from file and environment variables
//!
//! Configuration is loaded with the following priority (highest to lowest):
//! 1. Environment variables (prefixed with BBOARD_)
//! 2. Config file (config.toml)
//! 3. Default values
//!
//! Secrets like SMTP passwords and API keys should be kept in environment
//! variables, not in the config file.

use config::{Config, ConfigError, Environment, File};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::sync::RwLock;

/// Global application configuration
pub static APP_CONFIG: Lazy<RwLock<AppConfig>> = Lazy::new(|| {
    RwLock::new(AppConfig::load().unwrap_or_else(|e| {
        log::warn!("Failed to load config file, using defaults: {}", e);
        AppConfig::default()
    }))
});

/// Site configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    pub name: String,
    pub description: String,
    pub base_url: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            name: "Bboard".to_string(),
            description: "A classifieds board built in Rust".to_string(),
            base_url: "http://localhost:8080".to_string(),
        }
    }
}

/// CAPTCHA configuration, used to challenge guest commenters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptchaConfig {
    /// Provider: "hcaptcha", "turnstile", or empty to disable
    pub provider: String,
    /// Public site key (can be in config file)
    pub site_key: String,
    /// Secret key (should be in env var BBOARD_CAPTCHA_SECRET_KEY)
    #[serde(default)]
    pub secret_key: String,
}

impl Default for CaptchaConfig {
    fn default() -> Self {
        Self {
            provider: String::new(),
            site_key: String::new(),
            secret_key: String::new(),
        }
    }
}

/// Security configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Maximum failed login attempts before account lockout
    pub max_failed_logins: u32,
    /// Account lockout duration in minutes
    pub lockout_duration_minutes: u32,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_failed_logins: 5,
            lockout_duration_minutes: 15,
        }
    }
}

/// Rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Login attempts per window per IP
    pub login_max_attempts: u32,
    /// Login rate limit window in seconds
    pub login_window_seconds: u32,
    /// Registration attempts per hour per IP
    pub registration_per_hour: u32,
    /// Comments per minute per client
    pub comments_per_minute: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            login_max_attempts: 5,
            login_window_seconds: 300,
            registration_per_hour: 3,
            comments_per_minute: 6,
        }
    }
}

/// Content limits configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum upload size per image in MB
    pub max_upload_size_mb: usize,
    /// Maximum listing content length
    pub max_listing_length: usize,
    /// Maximum comment length
    pub max_comment_length: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_upload_size_mb: 10,
            max_listing_length: 50000,
            max_comment_length: 5000,
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Storage backend: "local" or "s3"
    pub backend: String,
    /// Local storage path (used when backend = "local")
    pub local_path: String,
    /// S3 endpoint URL (used when backend = "s3")
    pub s3_endpoint: String,
    /// S3 region (used when backend = "s3")
    pub s3_region: String,
    /// S3 bucket name (used when backend = "s3")
    pub s3_bucket: String,
    /// S3 access key (should be in env var BBOARD_STORAGE_S3_ACCESS_KEY)
    #[serde(default)]
    pub s3_access_key: String,
    /// S3 secret key (should be in env var BBOARD_STORAGE_S3_SECRET_KEY)
    #[serde(default)]
    pub s3_secret_key: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: "local".to_string(),
            local_path: "./media".to_string(),
            s3_endpoint: "http://localhost:9000".to_string(),
            s3_region: "us-east-1".to_string(),
            s3_bucket: "bboard".to_string(),
            s3_access_key: String::new(),
            s3_secret_key: String::new(),
        }
    }
}

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub site: SiteConfig,
    pub captcha: CaptchaConfig,
    pub security: SecurityConfig,
    pub rate_limit: RateLimitConfig,
    pub limits: LimitsConfig,
    pub storage: StorageConfig,
}

impl AppConfig {
    /// Load configuration from file and environment variables
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_path("config.toml")
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &str) -> Result<Self, ConfigError> {
        use config::FileFormat;

        let config = Config::builder()
            // Start with defaults
            .add_source(config::Config::try_from(&AppConfig::default())?)
            // Add config file (optional) - use from_file for full path support
            .add_source(File::new(path, FileFormat::Toml).required(false))
            // Override with environment variables (BBOARD_ prefix)
            // e.g., BBOARD_CAPTCHA_PROVIDER, BBOARD_SITE_NAME
            .add_source(
                Environment::with_prefix("BBOARD")
                    .separator("_")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}

/// Initialize application configuration
///
/// This triggers the lazy loading of the config file and logs the result.
/// Should be called early in application startup.
pub fn init() {
    let config = APP_CONFIG.read().unwrap();
    log::info!("Configuration loaded: site.name = {}", config.site.name);
}

// Convenience functions for accessing global config

/// Get the current application configuration
pub fn get_config() -> AppConfig {
    APP_CONFIG.read().map(|c| c.clone()).unwrap_or_default()
}

pub fn site() -> SiteConfig {
    get_config().site
}

pub fn captcha() -> CaptchaConfig {
    get_config().captcha
}

pub fn security() -> SecurityConfig {
    get_config().security
}

pub fn rate_limit() -> RateLimitConfig {
    get_config().rate_limit
}

pub fn limits() -> LimitsConfig {
    get_config().limits
}

pub fn storage() -> StorageConfig {
    get_config().storage
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.site.name, "Bboard");
        assert_eq!(config.security.max_failed_logins, 5);
        assert_eq!(config.storage.backend, "local");
    }

    #[test]
    fn test_captcha_disabled_by_default() {
        let config = AppConfig::default();
        assert!(config.captcha.provider.is_empty());
    }

    #[test]
    fn test_load_from_toml_file() {
        // Create a temporary config file
        let mut temp_file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            temp_file,
            r#"
[site]
name = "Test Board"
description = "A test board"
base_url = "https://test.example.com"

[captcha]
provider = "turnstile"
site_key = "test_site_key"

[security]
max_failed_logins = 10
lockout_duration_minutes = 30

[limits]
max_upload_size_mb = 4
"#
        )
        .unwrap();

        let config = AppConfig::load_from_path(temp_file.path().to_str().unwrap()).unwrap();

        assert_eq!(config.site.name, "Test Board");
        assert_eq!(config.site.base_url, "https://test.example.com");
        assert_eq!(config.captcha.provider, "turnstile");
        assert_eq!(config.captcha.site_key, "test_site_key");
        assert_eq!(config.security.max_failed_logins, 10);
        assert_eq!(config.security.lockout_duration_minutes, 30);
        assert_eq!(config.limits.max_upload_size_mb, 4);
        // Defaults should still apply for unspecified values
        assert_eq!(config.limits.max_comment_length, 5000);
    }

    #[test]
    fn test_missing_config_file_uses_defaults() {
        let config = AppConfig::load_from_path("/nonexistent/config.toml").unwrap();
        assert_eq!(config.site.name, "Bboard");
        assert_eq!(config.rate_limit.registration_per_hour, 3);
    }
}
