use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use tracing::info;

/// Placeholder session secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &["change-me-to-a-random-string", "dev-secret-change-me"];

pub struct Config {
    pub db_path: PathBuf,
    pub session_secret: String,
    pub base_url: String,
    pub resend_api_key: String,
    pub mail_from: String,
    /// Secure cookies on when true.
    pub production: bool,
    pub host: String,
    pub port: u16,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Every required key is checked up front; a missing one stops startup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let required = |key: &str| -> Result<String> {
            match lookup(key).map(|v| v.trim().to_string()) {
                Some(v) if !v.is_empty() => Ok(v),
                _ => bail!("{key} must be set"),
            }
        };

        let session_secret = required("FORMDROP_SESSION_SECRET")?;
        if PLACEHOLDER_SECRETS.contains(&session_secret.as_str()) {
            bail!("FORMDROP_SESSION_SECRET is still a placeholder");
        }

        let environment = required("FORMDROP_ENV")?;
        let host = lookup("FORMDROP_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port = match lookup("FORMDROP_PORT") {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("FORMDROP_PORT is not a port number: {raw}"))?,
            None => 3000,
        };

        let config = Self {
            db_path: required("FORMDROP_DB_PATH")?.into(),
            session_secret,
            base_url: required("FORMDROP_BASE_URL")?.trim_end_matches('/').to_string(),
            resend_api_key: required("RESEND_API_KEY")?,
            mail_from: required("FORMDROP_MAIL_FROM")?,
            production: environment.eq_ignore_ascii_case("production"),
            host,
            port,
        };

        info!(
            "Config loaded (env={}, base_url={}, db={})",
            environment,
            config.base_url,
            config.db_path.display()
        );
        Ok(config)
    }
}
