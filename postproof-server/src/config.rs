//! Server configuration module
//!
//! Handles loading configuration from environment variables with sensible defaults.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use postproof_core::chain::ledger::DEFAULT_REQUIRED_CONFIRMATIONS;
use postproof_core::chain::{CalendarConfig, LedgerConfig};
use postproof_core::scheduler::DEFAULT_SWEEP_CONCURRENCY;
use postproof_core::{Backend, LifecycleConfig, RegistryConfig};

/// Server configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Server port (default: 3000)
    pub port: u16,
    /// Server host (default: 127.0.0.1)
    pub host: [u8; 4],
    /// Allowed CORS origins, comma-separated (default: allow all in dev)
    pub allowed_origins: Option<Vec<String>>,
    /// Request body limit in KB (default: 256)
    pub body_limit_kb: usize,
    /// Request timeout in seconds (default: 90)
    pub timeout_secs: u64,
    /// Enable rate limiting (default: false for tests, true when loaded from env)
    pub rate_limit_enabled: bool,
    /// Rate limit: requests per second (default: 10)
    pub rate_limit_per_sec: u64,
    /// Rate limit: burst size (default: 20)
    pub rate_limit_burst: u32,
    /// Postgres connection string; records stay in memory when unset
    pub database_url: Option<String>,
    /// Database connection pool maximum connections (default: 20)
    pub database_max_connections: u32,
    /// Database connection pool minimum connections (default: 2)
    pub database_min_connections: u32,
    /// Calendar servers; empty disables the calendar backend
    pub calendar_urls: Vec<String>,
    pub calendar_min_acceptances: usize,
    pub calendar_timeout_secs: u64,
    pub esplora_url: String,
    /// Solana cluster ("mainnet" or "devnet"); unset disables the ledger backend
    pub solana_cluster: Option<Backend>,
    pub solana_rpc_url: Option<String>,
    pub solana_keypair_path: Option<PathBuf>,
    pub ledger_required_confirmations: u64,
    /// Report ledger submissions confirmed at once (dev clusters only)
    pub ledger_instant_finality: bool,
    /// Base URL of the post-fetch collaborator
    pub post_fetch_url: Option<String>,
    /// Shared secret for the maturation sweep trigger
    pub cron_secret: Option<String>,
    pub sweep_concurrency: usize,
    /// Run the sweep in-process at this interval
    pub sweep_interval_secs: Option<u64>,
    pub submission_deadline_secs: u64,
    pub maturation_deadline_secs: u64,
    pub lease_ttl_secs: u64,
    /// Register in-process mock backends (default: false, enable with ALLOW_MOCK_BACKENDS=true)
    pub allow_mock_backends: bool,
}

impl Default for Config {
    fn default() -> Self {
        let lifecycle = LifecycleConfig::default();
        Self {
            port: 3000,
            host: [127, 0, 0, 1],
            allowed_origins: None, // None = allow all (dev mode)
            body_limit_kb: 256,
            timeout_secs: 90,
            rate_limit_enabled: false, // Disabled by default (for tests)
            rate_limit_per_sec: 10,
            rate_limit_burst: 20,
            database_url: None,
            database_max_connections: 20,
            database_min_connections: 2,
            calendar_urls: Vec::new(),
            calendar_min_acceptances: 1,
            calendar_timeout_secs: 10,
            esplora_url: postproof_core::chain::calendar::DEFAULT_ESPLORA_URL.to_string(),
            solana_cluster: None,
            solana_rpc_url: None,
            solana_keypair_path: None,
            ledger_required_confirmations: DEFAULT_REQUIRED_CONFIRMATIONS,
            ledger_instant_finality: false,
            post_fetch_url: None,
            cron_secret: None,
            sweep_concurrency: DEFAULT_SWEEP_CONCURRENCY,
            sweep_interval_secs: None,
            submission_deadline_secs: lifecycle.submission_deadline.as_secs(),
            maturation_deadline_secs: lifecycle.maturation_deadline.as_secs(),
            lease_ttl_secs: lifecycle.lease_ttl.as_secs(),
            allow_mock_backends: true, // Enabled by default for tests; from_env() defaults to false
        }
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

fn env_flag(key: &str, default: bool) -> bool {
    std::env::var(key)
        .map(|v| v.eq_ignore_ascii_case("true"))
        .unwrap_or(default)
}

fn env_list(key: &str) -> Option<Vec<String>> {
    std::env::var(key).ok().map(|list| {
        list.split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    })
}

fn parse_cluster(value: &str) -> Option<Backend> {
    match value.trim().to_ascii_lowercase().as_str() {
        "mainnet" | "mainnet-beta" | "solana-mainnet" => Some(Backend::SolanaMainnet),
        "devnet" | "solana-devnet" => Some(Backend::SolanaDevnet),
        _ => None,
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let host = std::env::var("HOST")
            .ok()
            .map(|h| {
                if h == "0.0.0.0" {
                    [0, 0, 0, 0]
                } else {
                    [127, 0, 0, 1]
                }
            })
            .unwrap_or(defaults.host);

        let calendar_urls = env_list("CALENDAR_URLS").unwrap_or_else(|| {
            postproof_core::chain::calendar::DEFAULT_CALENDARS
                .iter()
                .map(|s| s.to_string())
                .collect()
        });

        let solana_cluster = std::env::var("SOLANA_CLUSTER").ok().and_then(|v| {
            let cluster = parse_cluster(&v);
            if cluster.is_none() {
                tracing::warn!(value = %v, "Ignoring unknown SOLANA_CLUSTER");
            }
            cluster
        });

        // Rate limiting enabled by default in production, can be disabled with RATE_LIMIT_ENABLED=false
        let rate_limit_enabled = std::env::var("RATE_LIMIT_ENABLED")
            .map(|v| v.to_lowercase() != "false")
            .unwrap_or(true);

        Self {
            port: env_parse("PORT").unwrap_or(defaults.port),
            host,
            allowed_origins: env_list("ALLOWED_ORIGINS"),
            body_limit_kb: env_parse("BODY_LIMIT_KB").unwrap_or(defaults.body_limit_kb),
            timeout_secs: env_parse("REQUEST_TIMEOUT_SECS").unwrap_or(defaults.timeout_secs),
            rate_limit_enabled,
            rate_limit_per_sec: env_parse("RATE_LIMIT_PER_SEC")
                .unwrap_or(defaults.rate_limit_per_sec),
            rate_limit_burst: env_parse("RATE_LIMIT_BURST").unwrap_or(defaults.rate_limit_burst),
            database_url: std::env::var("DATABASE_URL").ok().filter(|v| !v.is_empty()),
            database_max_connections: env_parse("DATABASE_MAX_CONNECTIONS")
                .unwrap_or(defaults.database_max_connections),
            database_min_connections: env_parse("DATABASE_MIN_CONNECTIONS")
                .unwrap_or(defaults.database_min_connections),
            calendar_urls,
            calendar_min_acceptances: env_parse("CALENDAR_MIN_ACCEPTANCES")
                .unwrap_or(defaults.calendar_min_acceptances),
            calendar_timeout_secs: env_parse("CALENDAR_TIMEOUT_SECS")
                .unwrap_or(defaults.calendar_timeout_secs),
            esplora_url: std::env::var("ESPLORA_URL").unwrap_or(defaults.esplora_url),
            solana_cluster,
            solana_rpc_url: std::env::var("SOLANA_RPC_URL").ok(),
            solana_keypair_path: std::env::var("SOLANA_KEYPAIR_PATH").ok().map(PathBuf::from),
            ledger_required_confirmations: env_parse("LEDGER_REQUIRED_CONFIRMATIONS")
                .unwrap_or(defaults.ledger_required_confirmations),
            ledger_instant_finality: env_flag("LEDGER_INSTANT_FINALITY", false),
            post_fetch_url: std::env::var("POST_FETCH_URL").ok(),
            cron_secret: std::env::var("CRON_SECRET").ok().filter(|v| !v.is_empty()),
            sweep_concurrency: env_parse("SWEEP_CONCURRENCY")
                .unwrap_or(defaults.sweep_concurrency),
            sweep_interval_secs: env_parse("SWEEP_INTERVAL_SECS").filter(|secs: &u64| *secs > 0),
            submission_deadline_secs: env_parse("SUBMISSION_DEADLINE_SECS")
                .unwrap_or(defaults.submission_deadline_secs),
            maturation_deadline_secs: env_parse("MATURATION_DEADLINE_SECS")
                .unwrap_or(defaults.maturation_deadline_secs),
            lease_ttl_secs: env_parse("LEASE_TTL_SECS").unwrap_or(defaults.lease_ttl_secs),
            allow_mock_backends: env_flag("ALLOW_MOCK_BACKENDS", false),
        }
    }

    /// Get socket address from config
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::from((self.host, self.port))
    }

    /// Backend wiring for [`postproof_core::AdapterRegistry::from_config`].
    pub fn registry_config(&self) -> RegistryConfig {
        let calendar = (!self.calendar_urls.is_empty()).then(|| CalendarConfig {
            calendar_urls: self.calendar_urls.clone(),
            min_acceptances: self.calendar_min_acceptances,
            request_timeout: Duration::from_secs(self.calendar_timeout_secs),
            esplora_url: self.esplora_url.clone(),
            ..CalendarConfig::default()
        });

        let ledgers = self
            .solana_cluster
            .map(|backend| {
                let mut ledger = LedgerConfig::for_backend(backend);
                if let Some(url) = &self.solana_rpc_url {
                    ledger.rpc_url = url.clone();
                }
                ledger.keypair_path = self.solana_keypair_path.clone();
                ledger.required_confirmations = self.ledger_required_confirmations;
                ledger.instant_finality = self.ledger_instant_finality;
                ledger
            })
            .into_iter()
            .collect();

        RegistryConfig {
            calendar,
            ledgers,
            mock: self.allow_mock_backends,
        }
    }

    pub fn lifecycle_config(&self) -> LifecycleConfig {
        LifecycleConfig {
            submission_deadline: Duration::from_secs(self.submission_deadline_secs),
            maturation_deadline: Duration::from_secs(self.maturation_deadline_secs),
            lease_ttl: Duration::from_secs(self.lease_ttl_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.port, 3000);
        assert!(config.allow_mock_backends);
        assert!(config.cron_secret.is_none());
        assert!(config.database_url.is_none());
    }

    #[test]
    fn test_default_registry_is_mock_only() {
        let registry = Config::default().registry_config();
        assert!(registry.calendar.is_none());
        assert!(registry.ledgers.is_empty());
        assert!(registry.mock);
    }

    #[test]
    fn test_registry_config_carries_ledger_settings() {
        let config = Config {
            calendar_urls: vec!["https://cal.example".into()],
            calendar_min_acceptances: 2,
            solana_cluster: Some(Backend::SolanaDevnet),
            solana_rpc_url: Some("http://localhost:8899".into()),
            ledger_required_confirmations: 1,
            ledger_instant_finality: true,
            allow_mock_backends: false,
            ..Default::default()
        };
        let registry = config.registry_config();

        let calendar = registry.calendar.unwrap();
        assert_eq!(calendar.calendar_urls, vec!["https://cal.example".to_string()]);
        assert_eq!(calendar.min_acceptances, 2);

        assert_eq!(registry.ledgers.len(), 1);
        let ledger = &registry.ledgers[0];
        assert_eq!(ledger.backend, Backend::SolanaDevnet);
        assert_eq!(ledger.rpc_url, "http://localhost:8899");
        assert_eq!(ledger.required_confirmations, 1);
        assert!(ledger.instant_finality);
        assert!(!registry.mock);
    }

    #[test]
    fn test_parse_cluster() {
        assert_eq!(parse_cluster("mainnet-beta"), Some(Backend::SolanaMainnet));
        assert_eq!(parse_cluster("Devnet"), Some(Backend::SolanaDevnet));
        assert_eq!(parse_cluster("testnet"), None);
    }

    #[test]
    fn test_lifecycle_config_from_seconds() {
        let config = Config {
            maturation_deadline_secs: 5,
            lease_ttl_secs: 30,
            ..Default::default()
        };
        let lifecycle = config.lifecycle_config();
        assert_eq!(lifecycle.maturation_deadline, Duration::from_secs(5));
        assert_eq!(lifecycle.lease_ttl, Duration::from_secs(30));
    }
}
