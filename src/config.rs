use std::time::Duration;

use anyhow::Context;

use crate::cache::EvictionKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub capacity: usize,
    pub ttl: Duration,
    pub eviction: EvictionKind,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 32,
            ttl: Duration::from_secs(300),
            eviction: EvictionKind::Lru,
        }
    }
}

/// Settings read from the environment (after `.env` is loaded).
///
/// | Env Var                    | Default  |
/// |----------------------------|----------|
/// | `DATABASE_URL`             | none     |
/// | `DB_MAX_CONNECTIONS`       | `5`      |
/// | `REFERENCE_CACHE_CAPACITY` | `32`     |
/// | `REFERENCE_CACHE_TTL_SECS` | `300`    |
/// | `REFERENCE_CACHE_EVICTION` | `lru`    |
/// | `LOG_FORMAT`               | `pretty` |
#[derive(Debug, Clone)]
pub struct EvaluatorConfig {
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub cache: CacheConfig,
    pub log_format: LogFormat,
}

impl EvaluatorConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let defaults = CacheConfig::default();

        let max_connections = parse_or(&lookup, "DB_MAX_CONNECTIONS", 5u32)?;
        let capacity = parse_or(&lookup, "REFERENCE_CACHE_CAPACITY", defaults.capacity)?;
        let ttl_secs = parse_or(&lookup, "REFERENCE_CACHE_TTL_SECS", defaults.ttl.as_secs())?;

        let eviction = match lookup("REFERENCE_CACHE_EVICTION") {
            Some(value) => value
                .parse::<EvictionKind>()
                .map_err(anyhow::Error::msg)
                .context("REFERENCE_CACHE_EVICTION must be lru or fifo")?,
            None => defaults.eviction,
        };

        let log_format = match lookup("LOG_FORMAT").as_deref().map(str::trim) {
            None | Some("") | Some("pretty") => LogFormat::Pretty,
            Some("json") => LogFormat::Json,
            Some(other) => anyhow::bail!("LOG_FORMAT must be pretty or json, got '{other}'"),
        };

        if capacity == 0 {
            anyhow::bail!("REFERENCE_CACHE_CAPACITY must be at least 1");
        }

        Ok(Self {
            database_url: lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()),
            max_connections,
            cache: CacheConfig {
                capacity,
                ttl: Duration::from_secs(ttl_secs),
                eviction,
            },
            log_format,
        })
    }

    pub fn require_database_url(&self) -> anyhow::Result<&str> {
        self.database_url
            .as_deref()
            .context("DATABASE_URL must be set to a production Postgres instance")
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(name) {
        Some(value) => value
            .trim()
            .parse()
            .with_context(|| format!("{name} must be a valid number, got '{value}'")),
        None => Ok(default),
    }
}
