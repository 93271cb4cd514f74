//! Environment-driven configuration.
//!
//! Every knob has a default matching a single-host deployment:
//!
//! | Process          | Listen          | Variable                          |
//! |------------------|-----------------|-----------------------------------|
//! | gateway          | `0.0.0.0:5000`  | `BOOKSTORE_GATEWAY_ADDR`          |
//! | catalog primary  | `0.0.0.0:4000`  | `BOOKSTORE_CATALOG_ADDR`          |
//! | catalog replica  | `0.0.0.0:4001`  | `BOOKSTORE_CATALOG_REPLICA_ADDR`  |
//! | order primary    | `0.0.0.0:3000`  | `BOOKSTORE_ORDER_ADDR`            |
//! | order replica    | `0.0.0.0:3001`  | `BOOKSTORE_ORDER_REPLICA_ADDR`    |
//!
//! Lists (`BOOKSTORE_CATALOG_POOL`, `BOOKSTORE_ORDER_POOL`,
//! `BOOKSTORE_EVENT_PEERS`) are comma separated URLs.

use std::fmt;
use std::time::Duration;

use crate::cache::DEFAULT_CAPACITY;
use crate::gateway::GatewayConfig;
use crate::registry::Endpoint;
use crate::role::Role;

/// One of the five processes of a deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Process {
    Gateway,
    Catalog(Role),
    Order(Role),
}

impl fmt::Display for Process {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Process::Gateway => write!(f, "gateway"),
            Process::Catalog(role) => write!(f, "catalog-{}", role),
            Process::Order(role) => write!(f, "order-{}", role),
        }
    }
}

/// Error type for configuration parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    Invalid {
        key: String,
        value: String,
        reason: String,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Invalid { key, value, reason } => {
                write!(f, "invalid value {:?} for {}: {}", value, key, reason)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[derive(Debug, Clone)]
pub struct Config {
    pub gateway_addr: String,
    pub catalog_addr: String,
    pub catalog_replica_addr: String,
    pub order_addr: String,
    pub order_replica_addr: String,
    /// Catalog endpoints the gateway rotates over for search and info.
    pub catalog_pool: Vec<Endpoint>,
    /// Order endpoints the gateway rotates over for purchase.
    pub order_pool: Vec<Endpoint>,
    /// Catalog primary; source of the replica bootstrap and the order
    /// primary's catalog.
    pub catalog_primary_url: Endpoint,
    /// Catalog replica; the order replica's catalog.
    pub catalog_replica_url: Endpoint,
    pub cache_capacity: usize,
    pub backend_timeout: Duration,
    pub invalidate_after_info: bool,
    /// Every process that should receive this deployment's events.
    pub event_peers: Vec<Endpoint>,
    /// Origin tag stamped on `cache_invalidate` events. Random when unset.
    pub gateway_id: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        let local = |port: u16| Endpoint::new(format!("http://127.0.0.1:{}", port));
        Self {
            gateway_addr: "0.0.0.0:5000".to_string(),
            catalog_addr: "0.0.0.0:4000".to_string(),
            catalog_replica_addr: "0.0.0.0:4001".to_string(),
            order_addr: "0.0.0.0:3000".to_string(),
            order_replica_addr: "0.0.0.0:3001".to_string(),
            catalog_pool: vec![local(4000), local(4001)],
            order_pool: vec![local(3000), local(3001)],
            catalog_primary_url: local(4000),
            catalog_replica_url: local(4001),
            cache_capacity: DEFAULT_CAPACITY,
            backend_timeout: Duration::from_secs(5),
            invalidate_after_info: true,
            event_peers: vec![local(5000), local(4000), local(4001), local(3000), local(3001)],
            gateway_id: None,
        }
    }
}

impl Config {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through an arbitrary lookup. Missing keys keep
    /// their defaults; present but unparsable keys are errors.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();

        if let Some(v) = lookup("BOOKSTORE_GATEWAY_ADDR") {
            config.gateway_addr = v;
        }
        if let Some(v) = lookup("BOOKSTORE_CATALOG_ADDR") {
            config.catalog_addr = v;
        }
        if let Some(v) = lookup("BOOKSTORE_CATALOG_REPLICA_ADDR") {
            config.catalog_replica_addr = v;
        }
        if let Some(v) = lookup("BOOKSTORE_ORDER_ADDR") {
            config.order_addr = v;
        }
        if let Some(v) = lookup("BOOKSTORE_ORDER_REPLICA_ADDR") {
            config.order_replica_addr = v;
        }
        if let Some(v) = lookup("BOOKSTORE_CATALOG_POOL") {
            config.catalog_pool = parse_list("BOOKSTORE_CATALOG_POOL", &v)?;
        }
        if let Some(v) = lookup("BOOKSTORE_ORDER_POOL") {
            config.order_pool = parse_list("BOOKSTORE_ORDER_POOL", &v)?;
        }
        if let Some(v) = lookup("BOOKSTORE_CATALOG_PRIMARY_URL") {
            config.catalog_primary_url = parse_url("BOOKSTORE_CATALOG_PRIMARY_URL", &v)?;
        }
        if let Some(v) = lookup("BOOKSTORE_CATALOG_REPLICA_URL") {
            config.catalog_replica_url = parse_url("BOOKSTORE_CATALOG_REPLICA_URL", &v)?;
        }
        if let Some(v) = lookup("BOOKSTORE_CACHE_CAPACITY") {
            config.cache_capacity = v.trim().parse().map_err(|e: std::num::ParseIntError| {
                invalid("BOOKSTORE_CACHE_CAPACITY", &v, e.to_string())
            })?;
        }
        if let Some(v) = lookup("BOOKSTORE_BACKEND_TIMEOUT_MS") {
            let ms: u64 = v.trim().parse().map_err(|e: std::num::ParseIntError| {
                invalid("BOOKSTORE_BACKEND_TIMEOUT_MS", &v, e.to_string())
            })?;
            if ms == 0 {
                return Err(invalid("BOOKSTORE_BACKEND_TIMEOUT_MS", &v, "must be positive"));
            }
            config.backend_timeout = Duration::from_millis(ms);
        }
        if let Some(v) = lookup("BOOKSTORE_INVALIDATE_AFTER_INFO") {
            config.invalidate_after_info = parse_bool("BOOKSTORE_INVALIDATE_AFTER_INFO", &v)?;
        }
        if let Some(v) = lookup("BOOKSTORE_EVENT_PEERS") {
            config.event_peers = if v.trim().is_empty() {
                Vec::new()
            } else {
                parse_list("BOOKSTORE_EVENT_PEERS", &v)?
            };
        }
        if let Some(v) = lookup("BOOKSTORE_GATEWAY_ID") {
            config.gateway_id = Some(v);
        }

        Ok(config)
    }

    /// Listen address of a process.
    pub fn listen_addr(&self, process: Process) -> &str {
        match process {
            Process::Gateway => &self.gateway_addr,
            Process::Catalog(Role::Primary) => &self.catalog_addr,
            Process::Catalog(Role::Replica) => &self.catalog_replica_addr,
            Process::Order(Role::Primary) => &self.order_addr,
            Process::Order(Role::Replica) => &self.order_replica_addr,
        }
    }

    /// Catalog instance an order service of the given role talks to.
    pub fn catalog_for_order(&self, role: Role) -> &Endpoint {
        match role {
            Role::Primary => &self.catalog_primary_url,
            Role::Replica => &self.catalog_replica_url,
        }
    }

    /// Event peers minus the process itself, matched by listen port.
    pub fn peers_for(&self, process: Process) -> Vec<Endpoint> {
        let own_port = port_of(self.listen_addr(process));
        self.event_peers
            .iter()
            .filter(|peer| own_port.is_none() || port_of(peer.as_str()) != own_port)
            .cloned()
            .collect()
    }

    pub fn gateway(&self) -> GatewayConfig {
        let mut gateway = GatewayConfig::default()
            .with_cache_capacity(self.cache_capacity)
            .with_backend_timeout(self.backend_timeout)
            .with_invalidate_after_info(self.invalidate_after_info);
        if let Some(id) = &self.gateway_id {
            gateway = gateway.with_origin(id.clone());
        }
        gateway
    }
}

fn invalid(key: &str, value: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.into(),
    }
}

fn parse_url(key: &str, value: &str) -> Result<Endpoint, ConfigError> {
    let value = value.trim();
    if value.starts_with("http://") || value.starts_with("https://") {
        Ok(Endpoint::new(value))
    } else {
        Err(invalid(key, value, "expected an http(s) URL"))
    }
}

fn parse_list(key: &str, value: &str) -> Result<Vec<Endpoint>, ConfigError> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| parse_url(key, s))
        .collect()
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(invalid(key, value, "expected a boolean")),
    }
}

fn port_of(addr: &str) -> Option<u16> {
    addr.trim_end_matches('/').rsplit(':').next()?.parse().ok()
}
