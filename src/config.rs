use std::env;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{anyhow, bail};
use rand::{thread_rng, Rng};

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "postgres" => Ok(StoreBackend::Postgres),
            "memory" => Ok(StoreBackend::Memory),
            other => bail!("unknown store backend `{}`", other),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub store_backend: StoreBackend,
    pub database_url: String,
    pub token_secret: Vec<u8>,
    pub token_ttl_minutes: i64,
    pub static_dir: PathBuf,
    pub default_import_password: String,
    pub cors_origins: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            store_backend: StoreBackend::Postgres,
            database_url: "postgres://localhost/unirepo".to_string(),
            token_secret: thread_rng().gen::<[u8; 32]>().to_vec(),
            token_ttl_minutes: 60,
            static_dir: PathBuf::from("static"),
            default_import_password: "unistudent".to_string(),
            cors_origins: Vec::new(),
        }
    }
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let defaults = Config::default();
        let token_secret = match var("TOKEN_SECRET") {
            Some(secret) if !secret.is_empty() => secret.into_bytes(),
            _ => {
                log::warn!("TOKEN_SECRET not set, issued tokens will not survive a restart");
                defaults.token_secret
            }
        };
        let cors_origins = var("BACKEND_CORS_ORIGINS")
            .map(|origins| {
                origins
                    .split(',')
                    .map(str::trim)
                    .filter(|origin| !origin.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            host: try_load("APP_HOST", defaults.host)?,
            port: try_load("APP_PORT", defaults.port)?,
            store_backend: try_load("STORE_BACKEND", defaults.store_backend)?,
            database_url: try_load("DATABASE_URL", defaults.database_url)?,
            token_secret,
            token_ttl_minutes: try_load("ACCESS_TOKEN_EXPIRE_MINUTES", defaults.token_ttl_minutes)?,
            static_dir: try_load("STATIC_DIR", defaults.static_dir)?,
            default_import_password: try_load(
                "DEFAULT_IMPORT_PASSWORD",
                defaults.default_import_password,
            )?,
            cors_origins,
        })
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn var(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn try_load<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr + std::fmt::Debug,
    T::Err: Display,
{
    match var(key) {
        Some(raw) => raw
            .parse()
            .map_err(|e| anyhow!("Invalid {key} value `{raw}`: {e}")),
        None => {
            log::info!("{key} not set, using default: {default:?}");
            Ok(default)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_backend_parses_case_insensitively() {
        assert_eq!("Memory".parse::<StoreBackend>().unwrap(), StoreBackend::Memory);
        assert_eq!("postgres".parse::<StoreBackend>().unwrap(), StoreBackend::Postgres);
        assert!("mongo".parse::<StoreBackend>().is_err());
    }

    #[test]
    fn defaults_are_usable() {
        let config = Config::default();
        assert_eq!(config.address(), "0.0.0.0:8000");
        assert_eq!(config.token_secret.len(), 32);
        assert_eq!(config.default_import_password, "unistudent");
    }
}
