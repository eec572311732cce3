use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::env;
use std::fmt;
use std::sync::Arc;

pub const DEFAULT_SERVER_HOST: &str = "https://ppp-test.safecharge.com/ppp/api/v1/";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub gateway: Arc<GatewayConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub environment: String,
}

/// Everything a payment session reads from configuration. Loaded once and
/// shared read-only by every session.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub merchant: MerchantConfig,
    pub urls: CallbackUrls,
    pub policy: FlowPolicy,
}

#[derive(Clone, Deserialize)]
pub struct MerchantConfig {
    pub merchant_id: String,
    pub merchant_site_id: String,
    pub merchant_key: String,
    pub server_host: String,
    pub timeout_secs: u64,
}

impl fmt::Debug for MerchantConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MerchantConfig")
            .field("merchant_id", &self.merchant_id)
            .field("merchant_site_id", &self.merchant_site_id)
            .field("merchant_key", &"<redacted>")
            .field("server_host", &self.server_host)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl MerchantConfig {
    /// Sandbox hosts carry "test" in their name.
    pub fn is_staging(&self) -> bool {
        self.server_host.to_ascii_lowercase().contains("test")
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallbackUrls {
    /// Public base URL of this service; per-session callback URLs hang off it.
    pub public_base_url: Option<String>,
    pub success_url: Option<String>,
    pub failure_url: Option<String>,
    pub pending_url: Option<String>,
    pub merchant_url: Option<String>,
    pub acs_prefix_url: Option<String>,
}

impl CallbackUrls {
    pub fn challenge_url(&self, session_id: &str) -> Option<String> {
        self.callback_url("challenge", session_id)
    }

    pub fn notification_url(&self, session_id: &str) -> Option<String> {
        self.callback_url("notification", session_id)
    }

    fn callback_url(&self, kind: &str, session_id: &str) -> Option<String> {
        let base = self.public_base_url.as_deref()?.trim().trim_end_matches('/');
        if base.is_empty() {
            return None;
        }
        Some(format!("{}/callbacks/{}/{}", base, kind, session_id))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FlowPolicy {
    /// Treat sandbox 3DS processing errors as approvals. Honoured only
    /// against a staging host.
    pub allow_staging_3ds_bypass: bool,
    /// Refund or void an approval that covered less than the requested amount.
    pub reverse_partial_approval: bool,
    /// Accept 3DS status `A` (attempted authentication) as approved.
    pub accept_attempted_authentication: bool,
    pub device_ip: String,
}

impl Default for FlowPolicy {
    fn default() -> Self {
        Self {
            allow_staging_3ds_bypass: false,
            reverse_partial_approval: true,
            accept_attempted_authentication: true,
            device_ip: "192.168.0.1".to_string(),
        }
    }
}

fn optional_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn flag_var(name: &str, default: bool) -> Result<bool> {
    match optional_var(name) {
        None => Ok(default),
        Some(value) => match value.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            other => Err(anyhow!("{} must be a boolean, got {}", name, other)),
        },
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let server = ServerConfig {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("PORT")
                .context("PORT not set")?
                .parse()
                .context("PORT must be a valid number")?,
            environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
        };

        let merchant = MerchantConfig {
            merchant_id: env::var("NUVEI_MERCHANT_ID").context("NUVEI_MERCHANT_ID not set")?,
            merchant_site_id: env::var("NUVEI_MERCHANT_SITE_ID")
                .context("NUVEI_MERCHANT_SITE_ID not set")?,
            merchant_key: env::var("NUVEI_MERCHANT_KEY").context("NUVEI_MERCHANT_KEY not set")?,
            server_host: optional_var("NUVEI_SERVER_HOST")
                .unwrap_or_else(|| DEFAULT_SERVER_HOST.to_string()),
            timeout_secs: optional_var("NUVEI_TIMEOUT_SECS")
                .map(|v| v.parse())
                .transpose()
                .context("NUVEI_TIMEOUT_SECS must be a valid number")?
                .unwrap_or(DEFAULT_TIMEOUT_SECS),
        };

        let urls = CallbackUrls {
            public_base_url: optional_var("CALLBACK_BASE_URL"),
            success_url: optional_var("SUCCESS_URL"),
            failure_url: optional_var("FAILURE_URL"),
            pending_url: optional_var("PENDING_URL"),
            merchant_url: optional_var("MERCHANT_URL"),
            acs_prefix_url: optional_var("ACS_PREFIX_URL"),
        };

        let defaults = FlowPolicy::default();
        let policy = FlowPolicy {
            allow_staging_3ds_bypass: flag_var(
                "ALLOW_STAGING_3DS_BYPASS",
                defaults.allow_staging_3ds_bypass,
            )?,
            reverse_partial_approval: flag_var(
                "REVERSE_PARTIAL_APPROVAL",
                defaults.reverse_partial_approval,
            )?,
            accept_attempted_authentication: flag_var(
                "ACCEPT_ATTEMPTED_AUTHENTICATION",
                defaults.accept_attempted_authentication,
            )?,
            device_ip: optional_var("DEVICE_IP").unwrap_or(defaults.device_ip),
        };

        let config = Config {
            server,
            gateway: Arc::new(GatewayConfig {
                merchant,
                urls,
                policy,
            }),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.port < 1024 {
            return Err(anyhow!(
                "Port must be at least 1024, got {}",
                self.server.port
            ));
        }

        let valid_environments = ["development", "staging", "production"];
        if !valid_environments.contains(&self.server.environment.as_str()) {
            return Err(anyhow!(
                "Environment must be one of: {:?}, got {}",
                valid_environments,
                self.server.environment
            ));
        }

        self.gateway.validate()?;

        if self.server.environment == "production" && self.gateway.merchant.is_staging() {
            return Err(anyhow!(
                "NUVEI_SERVER_HOST points at a test host in production: {}",
                self.gateway.merchant.server_host
            ));
        }

        Ok(())
    }
}

impl GatewayConfig {
    pub fn validate(&self) -> Result<()> {
        let merchant = &self.merchant;
        if merchant.merchant_id.trim().is_empty() {
            return Err(anyhow!("NUVEI_MERCHANT_ID cannot be empty"));
        }

        if merchant.merchant_site_id.trim().is_empty() {
            return Err(anyhow!("NUVEI_MERCHANT_SITE_ID cannot be empty"));
        }

        if merchant.merchant_key.trim().is_empty() {
            return Err(anyhow!("NUVEI_MERCHANT_KEY cannot be empty"));
        }

        if !merchant.server_host.starts_with("http") {
            return Err(anyhow!(
                "NUVEI_SERVER_HOST must be an http(s) URL, got {}",
                merchant.server_host
            ));
        }

        if merchant.timeout_secs == 0 {
            return Err(anyhow!("NUVEI_TIMEOUT_SECS must be greater than 0"));
        }

        if self.policy.allow_staging_3ds_bypass && !merchant.is_staging() {
            return Err(anyhow!(
                "ALLOW_STAGING_3DS_BYPASS is only valid against a test host"
            ));
        }

        Ok(())
    }
}
