use std::path::PathBuf;

pub const DB_PATH_ENV: &str = "SWIFT_DB_PATH";
pub const BIND_ADDR_ENV: &str = "SWIFT_BIND_ADDR";

pub const DEFAULT_DB_PATH: &str = "swift_codes.db";
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";

/// Runtime configuration shared by the CLI and the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub db_path: PathBuf,
    pub bind_addr: String,
}

impl Config {
    pub fn new(db_path: impl Into<PathBuf>, bind_addr: impl Into<String>) -> Self {
        Config {
            db_path: db_path.into(),
            bind_addr: bind_addr.into(),
        }
    }

    /// Build from a lookup function, so tests don't touch process env
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Config {
            db_path: lookup(DB_PATH_ENV)
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_PATH)),
            bind_addr: lookup(BIND_ADDR_ENV)
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config::from_lookup(|key| std::env::var(key).ok())
    }
}

/// Install the fmt subscriber. `RUST_LOG` overrides the default `info`.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    // A second call (tests, embedding) keeps the first subscriber
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
