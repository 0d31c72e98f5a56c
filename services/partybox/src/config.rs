use anyhow::{Context, Result, bail};
use partybox_common::MAX_HISTORY_ITEMS;
use serde::Deserialize;
use std::fs;
use std::net::SocketAddr;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
pub const DEFAULT_METRICS_BIND: &str = "0.0.0.0:9090";
pub const DEFAULT_SESSION_TTL_SECS: u64 = 60 * 60 * 24;
pub const DEFAULT_PG_MAX_CONNECTIONS: u32 = 10;
pub const DEFAULT_PG_CONNECT_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_PG_ACQUIRE_TIMEOUT_MS: u64 = 5_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Memory,
    Postgres,
}

impl StorageBackend {
    fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "postgres" | "postgresql" => Ok(Self::Postgres),
            other => bail!("unknown storage backend: {other}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PostgresConfig {
    pub url: String,
    pub max_connections: u32,
    pub connect_timeout_ms: u64,
    pub acquire_timeout_ms: u64,
}

/// Credentials and token settings for the single administrator account.
#[derive(Clone)]
pub struct AdminConfig {
    pub username: String,
    pub password: String,
    pub session_secret: String,
    pub session_ttl_secs: u64,
}

// Keep secrets out of logs and panics.
impl std::fmt::Debug for AdminConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminConfig")
            .field("username", &self.username)
            .field("session_ttl_secs", &self.session_ttl_secs)
            .finish_non_exhaustive()
    }
}

// Service configuration sourced from environment variables.
#[derive(Debug, Clone)]
pub struct PartyboxConfig {
    pub bind_addr: SocketAddr,
    pub metrics_bind: SocketAddr,
    pub storage: StorageBackend,
    pub postgres: Option<PostgresConfig>,
    pub admin: AdminConfig,
    pub history_limit: usize,
}

#[derive(Debug, Deserialize)]
struct PartyboxConfigOverride {
    bind_addr: Option<String>,
    metrics_bind: Option<String>,
    storage: Option<String>,
    postgres_url: Option<String>,
    postgres_max_connections: Option<u32>,
    admin_username: Option<String>,
    admin_password: Option<String>,
    session_secret: Option<String>,
    session_ttl_secs: Option<u64>,
    history_limit: Option<usize>,
}

impl PartyboxConfig {
    pub fn from_env() -> Result<Self> {
        let bind_addr = env_or("PARTYBOX_BIND", DEFAULT_BIND_ADDR)
            .parse()
            .with_context(|| "parse PARTYBOX_BIND")?;
        let metrics_bind = env_or("PARTYBOX_METRICS_BIND", DEFAULT_METRICS_BIND)
            .parse()
            .with_context(|| "parse PARTYBOX_METRICS_BIND")?;
        let storage = StorageBackend::parse(&env_or("PARTYBOX_STORAGE_BACKEND", "memory"))
            .with_context(|| "parse PARTYBOX_STORAGE_BACKEND")?;
        let postgres = match std::env::var("PARTYBOX_DATABASE_URL") {
            Ok(url) => Some(PostgresConfig {
                url,
                max_connections: env_parse(
                    "PARTYBOX_PG_MAX_CONNECTIONS",
                    DEFAULT_PG_MAX_CONNECTIONS,
                )?,
                connect_timeout_ms: env_parse(
                    "PARTYBOX_PG_CONNECT_TIMEOUT_MS",
                    DEFAULT_PG_CONNECT_TIMEOUT_MS,
                )?,
                acquire_timeout_ms: env_parse(
                    "PARTYBOX_PG_ACQUIRE_TIMEOUT_MS",
                    DEFAULT_PG_ACQUIRE_TIMEOUT_MS,
                )?,
            }),
            Err(_) => None,
        };
        let admin = AdminConfig {
            username: env_or("PARTYBOX_ADMIN_USER", "admin"),
            password: env_or("PARTYBOX_ADMIN_PASSWORD", "adminpw"),
            session_secret: env_or("PARTYBOX_SESSION_SECRET", "partybox-dev-secret"),
            session_ttl_secs: env_parse("PARTYBOX_SESSION_TTL_SECS", DEFAULT_SESSION_TTL_SECS)?,
        };
        let history_limit = env_parse("PARTYBOX_HISTORY_LIMIT", MAX_HISTORY_ITEMS)?;
        let config = Self {
            bind_addr,
            metrics_bind,
            storage,
            postgres,
            admin,
            history_limit,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_env_or_yaml() -> Result<Self> {
        let mut config = Self::from_env()?;
        if let Ok(path) = std::env::var("PARTYBOX_CONFIG") {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("read PARTYBOX_CONFIG: {path}"))?;
            config.apply_yaml(&contents)?;
        }
        Ok(config)
    }

    fn apply_yaml(&mut self, contents: &str) -> Result<()> {
        let override_cfg: PartyboxConfigOverride =
            serde_yaml::from_str(contents).with_context(|| "parse partybox config yaml")?;
        if let Some(value) = override_cfg.bind_addr {
            self.bind_addr = value.parse().with_context(|| "parse bind_addr")?;
        }
        if let Some(value) = override_cfg.metrics_bind {
            self.metrics_bind = value.parse().with_context(|| "parse metrics_bind")?;
        }
        if let Some(value) = override_cfg.storage {
            self.storage = StorageBackend::parse(&value).with_context(|| "parse storage")?;
        }
        if let Some(url) = override_cfg.postgres_url {
            let pg = self.postgres.get_or_insert_with(|| PostgresConfig {
                url: String::new(),
                max_connections: DEFAULT_PG_MAX_CONNECTIONS,
                connect_timeout_ms: DEFAULT_PG_CONNECT_TIMEOUT_MS,
                acquire_timeout_ms: DEFAULT_PG_ACQUIRE_TIMEOUT_MS,
            });
            pg.url = url;
        }
        if let (Some(value), Some(pg)) = (override_cfg.postgres_max_connections, &mut self.postgres)
        {
            pg.max_connections = value;
        }
        if let Some(value) = override_cfg.admin_username {
            self.admin.username = value;
        }
        if let Some(value) = override_cfg.admin_password {
            self.admin.password = value;
        }
        if let Some(value) = override_cfg.session_secret {
            self.admin.session_secret = value;
        }
        if let Some(value) = override_cfg.session_ttl_secs {
            self.admin.session_ttl_secs = value;
        }
        if let Some(value) = override_cfg.history_limit {
            self.history_limit = value;
        }
        self.validate()
    }

    fn validate(&self) -> Result<()> {
        if self.history_limit == 0 {
            bail!("history limit must be at least 1");
        }
        if self.admin.session_secret.is_empty() {
            bail!("session secret must not be empty");
        }
        Ok(())
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(value) => value.parse().with_context(|| format!("parse {key}")),
        Err(_) => Ok(default),
    }
}
