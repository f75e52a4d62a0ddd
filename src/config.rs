//! Process-wide settings, resolved once from the environment with a
//! documented default for every knob so the crate runs unconfigured in
//! tests and development.

use std::time::Duration;

use tracing::warn;

const DEFAULT_BRIDGE_BIND_ADDR: &str = "0.0.0.0";
const DEFAULT_BRIDGE_BIND_PORT: u16 = 8765;
const DEFAULT_BRIDGE_REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_CATALOG_API_BASE: &str =
    "https://api.github.com/repos/queengooborg/Bambu-Lab-RFID-Library/git/trees/main?recursive=1";
const DEFAULT_CATALOG_RAW_BASE: &str =
    "https://raw.githubusercontent.com/queengooborg/Bambu-Lab-RFID-Library/main/";
const DEFAULT_CATALOG_CACHE_DIR: &str = "library_cache";

/// Environment-tunable settings for the bridge and catalog.
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the bridge listens on for an incoming reader connection.
    pub bridge_bind_addr: String,
    /// Port the bridge listens on.
    pub bridge_bind_port: u16,
    /// Fallback bound for bridge requests that do not specify their own.
    pub bridge_request_timeout: Duration,
    /// Tree-listing endpoint for the community catalog.
    pub catalog_api_base: String,
    /// Raw-content base URL dump paths are resolved against.
    pub catalog_raw_base: String,
    /// Root of the on-disk catalog snapshot and per-UID dump cache.
    pub catalog_cache_dir: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bridge_bind_addr: DEFAULT_BRIDGE_BIND_ADDR.to_string(),
            bridge_bind_port: DEFAULT_BRIDGE_BIND_PORT,
            bridge_request_timeout: Duration::from_secs(DEFAULT_BRIDGE_REQUEST_TIMEOUT_SECS),
            catalog_api_base: DEFAULT_CATALOG_API_BASE.to_string(),
            catalog_raw_base: DEFAULT_CATALOG_RAW_BASE.to_string(),
            catalog_cache_dir: DEFAULT_CATALOG_CACHE_DIR.to_string(),
        }
    }
}

fn env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parsed_or_default<T: std::str::FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!(key, raw, "config: malformed value, falling back to default");
            default
        }),
        Err(_) => default,
    }
}

impl Config {
    /// Resolve settings from the environment, falling back to documented
    /// defaults for anything unset or malformed.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            bridge_bind_addr: env_or_default("SPOOLRFID_BRIDGE_BIND_ADDR", &defaults.bridge_bind_addr),
            bridge_bind_port: env_parsed_or_default("SPOOLRFID_BRIDGE_BIND_PORT", defaults.bridge_bind_port),
            bridge_request_timeout: Duration::from_secs(env_parsed_or_default(
                "SPOOLRFID_BRIDGE_REQUEST_TIMEOUT_SECS",
                defaults.bridge_request_timeout.as_secs(),
            )),
            catalog_api_base: env_or_default("SPOOLRFID_CATALOG_API_BASE", &defaults.catalog_api_base),
            catalog_raw_base: env_or_default("SPOOLRFID_CATALOG_RAW_BASE", &defaults.catalog_raw_base),
            catalog_cache_dir: env_or_default("SPOOLRFID_CATALOG_CACHE_DIR", &defaults.catalog_cache_dir),
        }
    }
}
