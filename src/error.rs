use std::fmt;

/// Error raised by the persistent store boundary (`StorePort`).
#[derive(Debug)]
pub enum StoreError {
    Connection(String),
    Serialization(String),
    NotFound(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Connection(msg) => write!(f, "store connection error: {msg}"),
            StoreError::Serialization(msg) => write!(f, "store serialization error: {msg}"),
            StoreError::NotFound(key) => write!(f, "store key not found: {key}"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

impl From<redis::RedisError> for StoreError {
    fn from(e: redis::RedisError) -> Self {
        StoreError::Connection(e.to_string())
    }
}

/// Error raised submitting an open/close intent to the order execution adapter.
#[derive(Debug)]
pub enum OrderError {
    Rejected(String),
    Timeout(String),
    Network(String),
    BadSymbol(String),
    /// The exchange handle does not implement this query (e.g. no OI endpoint).
    /// Callers treat this as non-blocking rather than a veto.
    Unsupported(String),
}

impl fmt::Display for OrderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderError::Rejected(msg) => write!(f, "order rejected: {msg}"),
            OrderError::Timeout(msg) => write!(f, "order timed out: {msg}"),
            OrderError::Network(msg) => write!(f, "network error submitting order: {msg}"),
            OrderError::BadSymbol(sym) => write!(f, "unsupported symbol: {sym}"),
            OrderError::Unsupported(msg) => write!(f, "unsupported endpoint: {msg}"),
        }
    }
}

impl std::error::Error for OrderError {}

/// Error raised loading `EngineConfig` from file/environment.
#[derive(Debug)]
pub enum ConfigError {
    NotFound(String),
    Parse(String),
    Invalid(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::NotFound(path) => write!(f, "config file not found: {path}"),
            ConfigError::Parse(msg) => write!(f, "config parse error: {msg}"),
            ConfigError::Invalid(msg) => write!(f, "invalid config: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<serde_yaml::Error> for ConfigError {
    fn from(e: serde_yaml::Error) -> Self {
        ConfigError::Parse(e.to_string())
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::NotFound(e.to_string())
    }
}
