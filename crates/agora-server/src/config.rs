use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use agora_gateway::GatewaySettings;
use anyhow::{Context, Result, bail};

/// Values that must never reach production as the identity secret.
const PLACEHOLDER_SECRETS: &[&str] = &["", "changeme", "secret", "change-me-to-a-random-string", "dev-secret-change-me"];

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub identity_secret: String,
    pub gateway: GatewaySettings,
}

impl ServerConfig {
    /// Read the process environment, after loading `.env` if present.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let identity_secret = lookup("AGORA_IDENTITY_SECRET").unwrap_or_default();
        if PLACEHOLDER_SECRETS.contains(&identity_secret.trim()) {
            bail!("AGORA_IDENTITY_SECRET is unset or a placeholder; refusing to start");
        }

        let port = var("AGORA_PORT", "5000")
            .parse()
            .context("AGORA_PORT must be a port number")?;
        let identity_timeout: u64 = var("AGORA_IDENTITY_TIMEOUT_SECS", "10")
            .parse()
            .context("AGORA_IDENTITY_TIMEOUT_SECS must be a whole number of seconds")?;
        let heartbeat: u64 = var("AGORA_HEARTBEAT_SECS", "15")
            .parse()
            .context("AGORA_HEARTBEAT_SECS must be a whole number of seconds")?;
        if identity_timeout == 0 || heartbeat == 0 {
            bail!("gateway timeouts must be greater than zero");
        }

        Ok(Self {
            host: var("AGORA_HOST", "0.0.0.0"),
            port,
            db_path: PathBuf::from(var("AGORA_DB_PATH", "agora.db")),
            identity_secret,
            gateway: GatewaySettings {
                identity_timeout: Duration::from_secs(identity_timeout),
                heartbeat_interval: Duration::from_secs(heartbeat),
            },
        })
    }

    pub fn addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid bind address {}:{}", self.host, self.port))
    }
}
