//! Service configuration.
//!
//! Settings are layered, lowest precedence first:
//!
//! 1. built-in defaults
//! 2. an optional YAML file (`--config`, default `./config.yaml`)
//! 3. environment variables (or a `.env` file via `dotenvy`)
//! 4. the `--key` / `--secret` command-line flags
//!
//! Relay settings are optional; when no Redis address of any topology is
//! configured the relay is disabled.

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};

use clap::Parser;
use figment::Figment;
use figment::providers::{Format, Yaml};
use serde::Deserialize;

/// Channel used when no channel name is configured.
pub const DEFAULT_CHANNEL_NAME: &str = "livekit";

/// Config file read when `--config` is not given. Skipped if absent.
pub const DEFAULT_CONFIG_PATH: &str = "./config.yaml";

/// Configuration errors detected at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required setting is missing or blank.
    #[error("missing required setting {0}")]
    Missing(&'static str),

    /// A setting is present but its value is unusable.
    #[error("invalid value for {key}: {reason}")]
    Invalid {
        /// Setting name.
        key: &'static str,
        /// What is wrong with it.
        reason: String,
    },

    /// A config file given with `--config` does not exist.
    #[error("config file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// The config file could not be read or decoded.
    #[error("config file: {0}")]
    File(#[from] Box<figment::Error>),
}

/// Command-line flags.
#[derive(Debug, Clone, Default, Parser)]
#[command(name = "livekit-events", version, about)]
pub struct CliArgs {
    /// Path to a YAML config file.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// LiveKit API key; overrides the file and environment.
    #[arg(long)]
    pub key: Option<String>,

    /// LiveKit API secret; overrides the file and environment.
    #[arg(long)]
    pub secret: Option<String>,
}

/// Top-level service configuration.
///
/// Loaded once at startup via [`HubConfig::load`].
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Fallback tracing filter when `RUST_LOG` is unset.
    pub log_level: String,

    /// Emit JSON log lines instead of human-readable text.
    pub log_json: bool,

    /// Socket address to bind the HTTP server to (e.g. `0.0.0.0:3000`).
    pub listen_addr: SocketAddr,

    /// Trusted webhook origins. Empty disables origin filtering.
    pub trusted_upstreams: Vec<String>,

    /// LiveKit API key expected as the webhook token issuer.
    pub api_key: String,

    /// LiveKit API secret used to check webhook token signatures.
    pub api_secret: String,

    /// Capacity of each subscriber's outbound queue.
    pub subscriber_queue_capacity: usize,

    /// Longest a single WebSocket write may take before the session closes.
    pub subscriber_write_timeout_ms: u64,

    /// Capacity of the hand-off queue in front of the relay forwarder.
    pub relay_queue_capacity: usize,

    /// Relay target; `None` disables the relay.
    pub relay: Option<RelayConfig>,
}

/// Redis connection parameters for the external relay.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Single-node address (`host:port`).
    pub address: Option<String>,

    /// Cluster node addresses (`host:port`).
    pub cluster_addresses: Vec<String>,

    /// Redirect budget for cluster connections.
    pub cluster_max_redirects: u32,

    /// Sentinel addresses (`host:port`). Take precedence over cluster nodes.
    pub sentinel_addresses: Vec<String>,

    /// Name of the master the sentinels monitor.
    pub sentinel_master_name: Option<String>,

    /// ACL username for the sentinels themselves.
    pub sentinel_username: Option<String>,

    /// Password for the sentinels themselves.
    pub sentinel_password: Option<String>,

    /// ACL username.
    pub username: Option<String>,

    /// Password.
    pub password: Option<String>,

    /// Database index for single-node and sentinel connections.
    pub db: i64,

    /// Connect timeout in milliseconds.
    pub dial_timeout_ms: u64,

    /// Response timeout in milliseconds. `None` leaves replies unbounded
    /// apart from the write timeout around each publish.
    pub read_timeout_ms: Option<u64>,

    /// Per-publish timeout in milliseconds.
    pub write_timeout_ms: u64,

    /// Destination pub/sub channel.
    pub channel_name: String,
}

/// Which Redis deployment a [`RelayConfig`] points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedisTopology<'a> {
    /// Sentinel-managed master.
    Sentinel {
        /// Sentinel nodes.
        addresses: &'a [String],
        /// Monitored master name.
        master_name: &'a str,
    },
    /// Redis cluster.
    Cluster {
        /// Seed nodes.
        addresses: &'a [String],
    },
    /// Standalone server.
    Single {
        /// Server address.
        address: &'a str,
    },
}

impl RelayConfig {
    /// Resolves the topology: sentinel, then cluster, then single node.
    #[must_use]
    pub fn topology(&self) -> RedisTopology<'_> {
        match &self.sentinel_master_name {
            Some(master_name) if !self.sentinel_addresses.is_empty() => RedisTopology::Sentinel {
                addresses: &self.sentinel_addresses,
                master_name,
            },
            _ if !self.cluster_addresses.is_empty() => RedisTopology::Cluster {
                addresses: &self.cluster_addresses,
            },
            _ => RedisTopology::Single {
                address: self.address.as_deref().unwrap_or("127.0.0.1:6379"),
            },
        }
    }
}

/// YAML file layout.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    log_level: Option<String>,
    log_format: Option<String>,
    server: ServerSection,
    livekit: LivekitSection,
    subscribers: SubscriberSection,
    redis: RedisSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ServerSection {
    port: Option<u16>,
    bind_address: Option<String>,
    trusted_upstreams: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LivekitSection {
    api_key: Option<String>,
    api_secret: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SubscriberSection {
    queue_capacity: Option<usize>,
    write_timeout: Option<u64>,
    relay_queue_capacity: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RedisSection {
    address: Option<String>,
    username: Option<String>,
    password: Option<String>,
    db: Option<i64>,
    dial_timeout: Option<u64>,
    read_timeout: Option<u64>,
    write_timeout: Option<u64>,
    sentinel_master_name: Option<String>,
    sentinel_username: Option<String>,
    sentinel_password: Option<String>,
    sentinel_addresses: Vec<String>,
    cluster_addresses: Vec<String>,
    cluster_max_redirects: Option<u32>,
    channel_name: Option<String>,
}

impl HubConfig {
    /// Loads configuration from the config file, the process environment
    /// and `cli`.
    ///
    /// Calls `dotenvy::dotenv().ok()` first to optionally load a `.env` file.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if an explicitly given config file is
    /// missing or malformed, the API credentials are missing, or a value
    /// cannot be parsed.
    pub fn load(cli: &CliArgs) -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let file = match &cli.config {
            Some(path) if !path.exists() => return Err(ConfigError::FileNotFound(path.clone())),
            Some(path) => read_file(path)?,
            None => read_optional(Path::new(DEFAULT_CONFIG_PATH))?,
        };
        let mut config = Self::resolve(file, |key| std::env::var(key).ok())?;
        config.apply_overrides(cli);
        Ok(config)
    }

    /// Builds the configuration from environment-style variables only.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the API credentials are missing, the
    /// bind address is invalid, a queue capacity is zero, or the relay is
    /// misconfigured.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        Self::resolve(FileConfig::default(), lookup)
    }

    /// Replaces the credentials with any given on the command line.
    pub fn apply_overrides(&mut self, cli: &CliArgs) {
        if let Some(key) = cli.key.as_ref().filter(|k| !k.trim().is_empty()) {
            self.api_key.clone_from(key);
        }
        if let Some(secret) = cli.secret.as_ref().filter(|s| !s.trim().is_empty()) {
            self.api_secret.clone_from(secret);
        }
    }

    fn resolve<F>(file: FileConfig, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let log_level = get("LOG_LEVEL")
            .or(file.log_level)
            .unwrap_or_else(|| "info".to_string());
        let log_json = get("LOG_FORMAT")
            .or(file.log_format)
            .is_some_and(|f| f.eq_ignore_ascii_case("json"));

        let bind_address = get("BIND_ADDRESS")
            .or(file.server.bind_address)
            .unwrap_or_else(|| "0.0.0.0".to_string());
        let ip: IpAddr = bind_address
            .trim()
            .parse()
            .map_err(|e: std::net::AddrParseError| ConfigError::Invalid {
                key: "BIND_ADDRESS",
                reason: e.to_string(),
            })?;
        let port = parse_or("PORT", get("PORT"), file.server.port.unwrap_or(3000))?;
        let listen_addr = SocketAddr::new(ip, port);

        let trusted_upstreams = list_or(get("TRUSTED_UPSTREAMS"), file.server.trusted_upstreams);

        let api_key = get("LIVEKIT_API_KEY")
            .or(file.livekit.api_key)
            .ok_or(ConfigError::Missing("LIVEKIT_API_KEY"))?;
        let api_secret = get("LIVEKIT_API_SECRET")
            .or(file.livekit.api_secret)
            .ok_or(ConfigError::Missing("LIVEKIT_API_SECRET"))?;

        let subscriber_queue_capacity = parse_capacity(
            "SUBSCRIBER_QUEUE_CAPACITY",
            get("SUBSCRIBER_QUEUE_CAPACITY"),
            file.subscribers.queue_capacity.unwrap_or(256),
        )?;
        let subscriber_write_timeout_ms = parse_or(
            "SUBSCRIBER_WRITE_TIMEOUT_MS",
            get("SUBSCRIBER_WRITE_TIMEOUT_MS"),
            file.subscribers.write_timeout.unwrap_or(5000),
        )?;
        if subscriber_write_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                key: "SUBSCRIBER_WRITE_TIMEOUT_MS",
                reason: "must be greater than zero".to_string(),
            });
        }
        let relay_queue_capacity = parse_capacity(
            "RELAY_QUEUE_CAPACITY",
            get("RELAY_QUEUE_CAPACITY"),
            file.subscribers.relay_queue_capacity.unwrap_or(1024),
        )?;

        let relay = resolve_relay(file.redis, &lookup)?;

        Ok(Self {
            log_level,
            log_json,
            listen_addr,
            trusted_upstreams,
            api_key,
            api_secret,
            subscriber_queue_capacity,
            subscriber_write_timeout_ms,
            relay_queue_capacity,
            relay,
        })
    }
}

fn resolve_relay<F>(file: RedisSection, lookup: &F) -> Result<Option<RelayConfig>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    let address = get("REDIS_ADDRESS").or(file.address);
    let cluster_addresses = list_or(get("REDIS_CLUSTER_ADDRESSES"), file.cluster_addresses);
    let sentinel_addresses = list_or(get("REDIS_SENTINEL_ADDRESSES"), file.sentinel_addresses);
    if address.is_none() && cluster_addresses.is_empty() && sentinel_addresses.is_empty() {
        return Ok(None);
    }

    let sentinel_master_name = get("REDIS_SENTINEL_MASTER_NAME").or(file.sentinel_master_name);
    if !sentinel_addresses.is_empty() && sentinel_master_name.is_none() {
        return Err(ConfigError::Missing("REDIS_SENTINEL_MASTER_NAME"));
    }

    // A set-but-blank channel is an error, not a fallback to the default.
    let channel_name = lookup("REDIS_CHANNEL_NAME")
        .or(file.channel_name)
        .unwrap_or_else(|| DEFAULT_CHANNEL_NAME.to_string());
    if channel_name.trim().is_empty() {
        return Err(ConfigError::Invalid {
            key: "REDIS_CHANNEL_NAME",
            reason: "channel name is required when the relay is enabled".to_string(),
        });
    }

    let read_timeout_ms = match get("REDIS_READ_TIMEOUT_MS") {
        Some(v) => Some(parse_or("REDIS_READ_TIMEOUT_MS", Some(v), 0)?),
        None => file.read_timeout,
    }
    .filter(|ms| *ms > 0);

    Ok(Some(RelayConfig {
        address,
        cluster_addresses,
        cluster_max_redirects: parse_or(
            "REDIS_CLUSTER_MAX_REDIRECTS",
            get("REDIS_CLUSTER_MAX_REDIRECTS"),
            file.cluster_max_redirects.unwrap_or(2),
        )?,
        sentinel_addresses,
        sentinel_master_name,
        sentinel_username: get("REDIS_SENTINEL_USERNAME").or(file.sentinel_username),
        sentinel_password: get("REDIS_SENTINEL_PASSWORD").or(file.sentinel_password),
        username: get("REDIS_USERNAME").or(file.username),
        password: get("REDIS_PASSWORD").or(file.password),
        db: parse_or("REDIS_DB", get("REDIS_DB"), file.db.unwrap_or(0))?,
        dial_timeout_ms: parse_or(
            "REDIS_DIAL_TIMEOUT_MS",
            get("REDIS_DIAL_TIMEOUT_MS"),
            file.dial_timeout.unwrap_or(5000),
        )?,
        read_timeout_ms,
        write_timeout_ms: parse_or(
            "REDIS_WRITE_TIMEOUT_MS",
            get("REDIS_WRITE_TIMEOUT_MS"),
            file.write_timeout.unwrap_or(350),
        )?,
        channel_name,
    }))
}

/// Reads the YAML file at `path` if it exists.
fn read_optional(path: &Path) -> Result<FileConfig, ConfigError> {
    if path.is_file() {
        read_file(path)
    } else {
        Ok(FileConfig::default())
    }
}

/// Reads the YAML file at `path`.
fn read_file(path: &Path) -> Result<FileConfig, ConfigError> {
    Figment::from(Yaml::file(path))
        .extract()
        .map_err(|e| ConfigError::File(Box::new(e)))
}

/// Parses `value` as `T`, returning `default` when unset.
fn parse_or<T>(key: &'static str, value: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match value {
        Some(v) => v.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}

fn parse_capacity(
    key: &'static str,
    value: Option<String>,
    default: usize,
) -> Result<usize, ConfigError> {
    let capacity = parse_or(key, value, default)?;
    if capacity == 0 {
        return Err(ConfigError::Invalid {
            key,
            reason: "must be greater than zero".to_string(),
        });
    }
    Ok(capacity)
}

/// Uses the comma-separated env value when set, the file list otherwise.
fn list_or(value: Option<String>, fallback: Vec<String>) -> Vec<String> {
    match value {
        Some(v) => split_list(&v),
        None => fallback
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
    }
}

/// Splits a comma-separated list, trimming entries and skipping blanks.
fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
