use std::env;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerBackend {
    Memory,
    Supabase,
}

impl FromStr for LedgerBackend {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(LedgerBackend::Memory),
            "supabase" | "postgres" => Ok(LedgerBackend::Supabase),
            other => Err(format!("unknown ledger backend: {}", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server_port: u16,
    pub ledger_backend: LedgerBackend,
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_service_key: String,
    pub lock_timeout_ms: u64,
    pub max_busy_retries: u32,
    pub retry_backoff_ms: u64,
    pub booking_webhook_url: Option<String>,
    pub booking_webhook_mention_all: bool,
    pub admin_api_key: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server_port: 3000,
            ledger_backend: LedgerBackend::Memory,
            supabase_url: String::new(),
            supabase_anon_key: String::new(),
            supabase_service_key: String::new(),
            lock_timeout_ms: 5000,
            max_busy_retries: 3,
            retry_backoff_ms: 100,
            booking_webhook_url: None,
            booking_webhook_mention_all: true,
            admin_api_key: None,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let config = Self {
            server_port: parse_var("SERVER_PORT", defaults.server_port),
            ledger_backend: parse_var("LEDGER_BACKEND", defaults.ledger_backend),
            supabase_url: env::var("SUPABASE_URL")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_URL not set, using empty value");
                    String::new()
                }),
            supabase_anon_key: env::var("SUPABASE_ANON_PUBLIC_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_ANON_PUBLIC_KEY not set, using empty value");
                    String::new()
                }),
            supabase_service_key: env::var("SUPABASE_SERVICE_ROLE_KEY")
                .unwrap_or_default(),
            lock_timeout_ms: parse_var("LEDGER_LOCK_TIMEOUT_MS", defaults.lock_timeout_ms),
            max_busy_retries: parse_var("LEDGER_MAX_RETRIES", defaults.max_busy_retries),
            retry_backoff_ms: parse_var("LEDGER_RETRY_BACKOFF_MS", defaults.retry_backoff_ms),
            booking_webhook_url: non_empty_var("BOOKING_WEBHOOK_URL"),
            booking_webhook_mention_all: parse_var(
                "BOOKING_WEBHOOK_MENTION_ALL",
                defaults.booking_webhook_mention_all,
            ),
            admin_api_key: non_empty_var("ADMIN_API_KEY"),
        };

        if config.ledger_backend == LedgerBackend::Supabase && !config.is_supabase_configured() {
            warn!("LEDGER_BACKEND=supabase but Supabase is not fully configured");
        }
        if config.booking_webhook_url.is_none() {
            warn!("BOOKING_WEBHOOK_URL not set, booking notifications disabled");
        }
        if config.admin_api_key.is_none() {
            warn!("ADMIN_API_KEY not set, admin routes are unprotected");
        }

        config
    }

    pub fn is_supabase_configured(&self) -> bool {
        !self.supabase_url.is_empty() && !self.supabase_anon_key.is_empty()
    }

    /// Key sent as the PostgREST bearer token; the service role key when present.
    pub fn supabase_api_key(&self) -> &str {
        if self.supabase_service_key.is_empty() {
            &self.supabase_anon_key
        } else {
            &self.supabase_service_key
        }
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_var<T>(key: &str, default: T) -> T
where
    T: FromStr + std::fmt::Debug,
{
    match env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!("{} has invalid value {:?}, using default {:?}", key, raw, default);
            default
        }),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_parses_known_names() {
        assert_eq!("memory".parse::<LedgerBackend>(), Ok(LedgerBackend::Memory));
        assert_eq!(" Supabase ".parse::<LedgerBackend>(), Ok(LedgerBackend::Supabase));
        assert_eq!("postgres".parse::<LedgerBackend>(), Ok(LedgerBackend::Supabase));
        assert!("sqlite".parse::<LedgerBackend>().is_err());
    }

    #[test]
    fn service_key_takes_precedence() {
        let mut config = AppConfig {
            supabase_anon_key: "anon".to_string(),
            ..AppConfig::default()
        };
        assert_eq!(config.supabase_api_key(), "anon");

        config.supabase_service_key = "service".to_string();
        assert_eq!(config.supabase_api_key(), "service");
    }
}
