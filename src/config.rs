//! Runtime configuration
//!
//! | Variable | Default | Meaning |
//! |---|---|---|
//! | `PORT` | 8083 | HTTP port |
//! | `DATABASE_URL` | unset | PostgreSQL url; unset selects the in-memory repository |
//! | `DATABASE_MAX_CONNECTIONS` | 10 | pool size |
//! | `NATS_URL` | unset | event publishing |
//! | `LOCK_TIMEOUT_MS` | 2000 | lock wait before a request fails as retryable |
//! | `STORE_UTC_OFFSET_HOURS` | -6 | store local time used in order ids |
//! | `LOYALTY_PROGRAM_FILE` | unset | JSON loyalty program used when storage has none |

use chrono::{FixedOffset, Offset, Utc};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

use crate::domain::services::LoyaltyProgram;
use crate::{Result, ShopError};

pub const DEFAULT_PORT: u16 = 8083;
pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;
pub const DEFAULT_LOCK_TIMEOUT_MS: u64 = 2000;
pub const DEFAULT_UTC_OFFSET_HOURS: i32 = -6;
pub const EVENT_SUBJECT_PREFIX: &str = "storefront";

#[derive(Debug, Clone)]
pub struct ShopConfig {
    pub port: u16,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub nats_url: Option<String>,
    pub lock_timeout_ms: u64,
    pub store_utc_offset_hours: i32,
    pub loyalty_program_file: Option<PathBuf>,
}

/// The part of the configuration the service layer needs.
#[derive(Debug, Clone, Copy)]
pub struct ServiceSettings {
    pub lock_timeout: Duration,
    pub store_offset: FixedOffset,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_millis(DEFAULT_LOCK_TIMEOUT_MS),
            store_offset: offset_from_hours(DEFAULT_UTC_OFFSET_HOURS),
        }
    }
}

impl ShopConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key lookup. Malformed values fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let text = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        Self {
            port: parsed(&lookup, "PORT", DEFAULT_PORT),
            database_url: text("DATABASE_URL"),
            database_max_connections: parsed(&lookup, "DATABASE_MAX_CONNECTIONS", DEFAULT_MAX_CONNECTIONS),
            nats_url: text("NATS_URL"),
            lock_timeout_ms: parsed(&lookup, "LOCK_TIMEOUT_MS", DEFAULT_LOCK_TIMEOUT_MS),
            store_utc_offset_hours: parsed(&lookup, "STORE_UTC_OFFSET_HOURS", DEFAULT_UTC_OFFSET_HOURS),
            loyalty_program_file: text("LOYALTY_PROGRAM_FILE").map(PathBuf::from),
        }
    }

    pub fn service_settings(&self) -> ServiceSettings {
        ServiceSettings {
            lock_timeout: Duration::from_millis(self.lock_timeout_ms),
            store_offset: offset_from_hours(self.store_utc_offset_hours),
        }
    }

    /// The program seeded when storage holds none: the configured file, else the default one.
    pub fn seed_program(&self) -> Result<LoyaltyProgram> {
        match &self.loyalty_program_file {
            Some(path) => load_program_file(path),
            None => Ok(LoyaltyProgram::default()),
        }
    }
}

impl Default for ShopConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

pub fn load_program_file(path: &std::path::Path) -> Result<LoyaltyProgram> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| ShopError::InvalidProgram(format!("{}: {e}", path.display())))?;
    let program: LoyaltyProgram =
        serde_json::from_str(&raw).map_err(|e| ShopError::InvalidProgram(format!("{}: {e}", path.display())))?;
    program.validate()?;
    Ok(program)
}

fn parsed<T: FromStr + Copy + std::fmt::Display>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    match lookup(key) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!(key, value = %raw, default = %default, "Ignoring malformed configuration value");
            default
        }),
    }
}

fn offset_from_hours(hours: i32) -> FixedOffset {
    hours
        .checked_mul(3600)
        .and_then(FixedOffset::east_opt)
        .or_else(|| FixedOffset::east_opt(DEFAULT_UTC_OFFSET_HOURS * 3600))
        .unwrap_or_else(|| Utc.fix())
}
