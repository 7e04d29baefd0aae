//! Configuration management

use anyhow::{Context, Result, anyhow};
use std::path::PathBuf;
use std::time::Duration;

/// Production Messaging API base
pub const PRODUCTION_API_BASE: &str = "https://api.line.me/v2/bot";

/// Staging (beta) Messaging API base
pub const BETA_API_BASE: &str = "https://api.line-beta.me/v2/bot";

/// Bot configuration
#[derive(Debug, Clone)]
pub struct BotConfig {
    // =========================================================================
    // Channel credentials
    // =========================================================================
    /// Bearer credential for outbound API calls
    pub channel_access_token: String,

    /// HMAC key for inbound signature verification
    pub channel_secret: String,

    /// Accept requests without checking `X-Line-Signature`
    pub skip_signature_verification: bool,

    /// Talk to the production API instead of the beta one
    pub use_real_environment: bool,

    /// Messaging API base, derived from `use_real_environment`
    pub api_base_url: String,

    // =========================================================================
    // Server
    // =========================================================================
    /// Listen port
    pub port: u16,

    /// Public origin used to build media URLs embedded in replies
    pub public_base_url: String,

    // =========================================================================
    // Media
    // =========================================================================
    /// Directory holding downloaded media and previews, served under `/images`
    pub media_dir: PathBuf,

    /// Maximum number of files kept in `media_dir`
    pub max_media_files: usize,

    // =========================================================================
    // Timeouts
    // =========================================================================
    /// Per-call timeout of the outbound HTTP client
    pub http_timeout_secs: u64,

    /// Upper bound for dispatching one inbound batch
    pub request_timeout_secs: u64,
}

fn default_port() -> u16 {
    12345
}

fn default_media_dir() -> PathBuf {
    PathBuf::from("images")
}

fn default_max_media_files() -> usize {
    crate::media_cache::DEFAULT_MAX_FILES
}

fn default_http_timeout() -> u64 {
    10
}

fn default_request_timeout() -> u64 {
    25
}

/// Parse an environment-style boolean (`1`, `true`, `yes`, `on`)
pub fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn env_bool(key: &str) -> bool {
    std::env::var(key).map(|v| parse_bool(&v)).unwrap_or(false)
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

fn non_empty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

impl BotConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let use_real_environment = env_bool("USE_REAL_ENVIRONMENT");
        let skip_signature_verification = env_bool("SKIP_SIGNATURE_VERIFICATION");

        // The beta credential set falls back to the production one
        let (token_key, secret_key) = if use_real_environment {
            ("CHANNEL_ACCESS_TOKEN", "CHANNEL_SECRET")
        } else {
            ("BETA_CHANNEL_ACCESS_TOKEN", "BETA_CHANNEL_SECRET")
        };

        let channel_access_token = non_empty(token_key)
            .or_else(|| non_empty("CHANNEL_ACCESS_TOKEN"))
            .context("CHANNEL_ACCESS_TOKEN is required")?;

        let channel_secret = match non_empty(secret_key).or_else(|| non_empty("CHANNEL_SECRET")) {
            Some(secret) => secret,
            None if skip_signature_verification => String::new(),
            None => return Err(anyhow!("CHANNEL_SECRET is required")),
        };

        let port = env_parse("PORT").unwrap_or_else(default_port);

        let config = Self {
            channel_access_token,
            channel_secret,
            skip_signature_verification,
            use_real_environment,
            api_base_url: api_base_for(use_real_environment).to_string(),
            port,
            public_base_url: non_empty("PUBLIC_BASE_URL")
                .unwrap_or_else(|| format!("http://localhost:{}", port)),
            media_dir: non_empty("MEDIA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(default_media_dir),
            max_media_files: env_parse("MAX_MEDIA_FILES").unwrap_or_else(default_max_media_files),
            http_timeout_secs: env_parse("HTTP_TIMEOUT_SECS").unwrap_or_else(default_http_timeout),
            request_timeout_secs: env_parse("REQUEST_TIMEOUT_SECS")
                .unwrap_or_else(default_request_timeout),
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.max_media_files < crate::media_cache::MIN_MAX_FILES {
            return Err(anyhow!(
                "MAX_MEDIA_FILES must be at least {} (an image and its preview)",
                crate::media_cache::MIN_MAX_FILES
            ));
        }
        if !self.public_base_url.starts_with("http://") && !self.public_base_url.starts_with("https://") {
            return Err(anyhow!(
                "PUBLIC_BASE_URL must be an http(s) URL, got '{}'",
                self.public_base_url
            ));
        }
        Ok(())
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Base URL for files served from the media directory
    pub fn media_base_url(&self) -> String {
        format!("{}/images", self.public_base_url.trim_end_matches('/'))
    }
}

/// Select the API base for the given environment flag
pub fn api_base_for(use_real_environment: bool) -> &'static str {
    if use_real_environment {
        PRODUCTION_API_BASE
    } else {
        BETA_API_BASE
    }
}

#[cfg(test)]
pub(crate) fn test_config(api_base_url: &str, media_dir: impl Into<PathBuf>) -> BotConfig {
    BotConfig {
        channel_access_token: "test-access-token".to_string(),
        channel_secret: "test-channel-secret".to_string(),
        skip_signature_verification: false,
        use_real_environment: false,
        api_base_url: api_base_url.to_string(),
        port: default_port(),
        public_base_url: "https://bot.example.com".to_string(),
        media_dir: media_dir.into(),
        max_media_files: default_max_media_files(),
        http_timeout_secs: 5,
        request_timeout_secs: 10,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bool() {
        for value in ["1", "true", "TRUE", " yes ", "On"] {
            assert!(parse_bool(value), "{value} should be true");
        }
        for value in ["0", "false", "", "nope"] {
            assert!(!parse_bool(value), "{value} should be false");
        }
    }

    #[test]
    fn test_api_base_selection() {
        assert_eq!(api_base_for(true), PRODUCTION_API_BASE);
        assert_eq!(api_base_for(false), BETA_API_BASE);
    }

    #[test]
    fn test_media_base_url_trims_slash() {
        let mut config = test_config(BETA_API_BASE, "images");
        config.public_base_url = "https://bot.example.com/".to_string();
        assert_eq!(config.media_base_url(), "https://bot.example.com/images");
    }

    #[test]
    fn test_validate_rejects_zero_cap() {
        let mut config = test_config(BETA_API_BASE, "images");
        assert!(config.validate().is_ok());
        config.max_media_files = 0;
        assert!(config.validate().is_err());
        config.max_media_files = 1;
        assert!(config.validate().is_err());
        config.max_media_files = 2;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_public_url() {
        let mut config = test_config(BETA_API_BASE, "images");
        config.public_base_url = "bot.example.com".to_string();
        assert!(config.validate().is_err());
    }
}
