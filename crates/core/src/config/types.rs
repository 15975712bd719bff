use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub resolver: ResolverConfig,
}

/// Remote record store client configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoreConfig {
    /// Store base URL (e.g., "http://localhost:8000")
    #[serde(default = "default_store_url")]
    pub url: String,
    /// Request timeout in seconds. No timeout when absent.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: default_store_url(),
            timeout_secs: None,
        }
    }
}

fn default_store_url() -> String {
    "http://localhost:8000".to_string()
}

/// Cross-topic search configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SearchConfig {
    /// How long search matches stay highlighted
    #[serde(default = "default_highlight_secs")]
    pub highlight_secs: u64,
    /// Upper bound on concurrent topic fetches
    #[serde(default = "default_max_concurrent_fetches")]
    pub max_concurrent_fetches: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            highlight_secs: default_highlight_secs(),
            max_concurrent_fetches: default_max_concurrent_fetches(),
        }
    }
}

fn default_highlight_secs() -> u64 {
    30
}

fn default_max_concurrent_fetches() -> usize {
    4
}

/// Client-local session persistence
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SessionConfig {
    #[serde(default = "default_session_path")]
    pub path: PathBuf,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            path: default_session_path(),
        }
    }
}

fn default_session_path() -> PathBuf {
    PathBuf::from("session.json")
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_port() -> u16 {
    8000
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("topicshelf.db")
}

/// DOI resolver configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ResolverConfig {
    /// Resolver base URL (e.g., "https://doi.org")
    #[serde(default = "default_resolver_url")]
    pub base_url: String,
    /// Request timeout in seconds (default: 30)
    #[serde(default = "default_resolver_timeout")]
    pub timeout_secs: u64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            base_url: default_resolver_url(),
            timeout_secs: default_resolver_timeout(),
        }
    }
}

fn default_resolver_url() -> String {
    "https://doi.org".to_string()
}

fn default_resolver_timeout() -> u64 {
    30
}
