use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, bail};

use playground_api::generation::{DEFAULT_BASE_URL, DEFAULT_MODEL};

const DEV_SECRET: &str = "dev-secret";

/// Placeholder JWT secrets that must not sign tokens outside development.
const PLACEHOLDER_SECRETS: &[&str] = &[DEV_SECRET, "change-me", "dev-secret-change-me"];

#[derive(Debug, Clone)]
pub struct Config {
    pub jwt_secret: String,
    pub db_path: PathBuf,
    pub addr: SocketAddr,
    pub development: bool,
    pub openai_api_key: String,
    pub openai_base_url: String,
    pub model: String,
    pub generation_timeout: Duration,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let env = var("PLAYGROUND_ENV").unwrap_or_else(|| "development".into());
        let development = env.eq_ignore_ascii_case("development");

        let jwt_secret = var("PLAYGROUND_JWT_SECRET").unwrap_or_else(|| DEV_SECRET.into());
        if !development && PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("PLAYGROUND_JWT_SECRET is unset or still a placeholder (PLAYGROUND_ENV={})", env);
        }

        let openai_api_key = var("OPENAI_API_KEY").unwrap_or_default();
        if !development && openai_api_key.is_empty() {
            bail!("OPENAI_API_KEY is required when PLAYGROUND_ENV={}", env);
        }

        let db_url = var("DATABASE_URL").unwrap_or_else(|| "playground.db".into());
        let db_path = PathBuf::from(db_url.strip_prefix("sqlite://").unwrap_or(&db_url));

        let host = var("PLAYGROUND_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port: u16 = var("PLAYGROUND_PORT")
            .unwrap_or_else(|| "3000".into())
            .parse()
            .context("PLAYGROUND_PORT must be a port number")?;
        let addr: SocketAddr = format!("{}:{}", host, port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", host, port))?;

        let timeout_secs: u64 = match var("PLAYGROUND_GENERATION_TIMEOUT_SECS") {
            Some(v) => v.parse().context("PLAYGROUND_GENERATION_TIMEOUT_SECS must be whole seconds")?,
            None => 30,
        };

        Ok(Self {
            jwt_secret,
            db_path,
            addr,
            development,
            openai_api_key,
            openai_base_url: var("OPENAI_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.into()),
            model: var("PLAYGROUND_MODEL").unwrap_or_else(|| DEFAULT_MODEL.into()),
            generation_timeout: Duration::from_secs(timeout_secs),
        })
    }
}
