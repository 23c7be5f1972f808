use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Clone)]
pub struct Settings {
    pub(super) runtime: RuntimeSettings,
    pub(super) telemetry: TelemetrySettings,
    pub(super) autosave: AutosaveSettings,
    pub(super) timer: TimerSettings,
    pub(super) store: StoreSettings,
    pub(super) redis: RedisSettings,
    pub(super) remote: RemoteSettings,
}

#[derive(Debug, Clone)]
pub struct RuntimeSettings {
    pub environment: Environment,
    pub strict_config: bool,
}

#[derive(Debug, Clone)]
pub struct TelemetrySettings {
    pub log_level: String,
    pub json: bool,
    pub prometheus_enabled: bool,
}

#[derive(Debug, Clone)]
pub struct AutosaveSettings {
    pub debounce_ms: u64,
    pub interval_seconds: u64,
    pub final_flush_timeout_seconds: u64,
}

#[derive(Debug, Clone)]
pub struct TimerSettings {
    pub tick_ms: u64,
}

#[derive(Debug, Clone)]
pub struct StoreSettings {
    pub backend: StoreBackendKind,
    pub dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct RedisSettings {
    pub host: String,
    pub port: u16,
    pub db: u16,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct RemoteSettings {
    pub base_url: String,
    pub token: String,
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
    Staging,
    Test,
}

impl Environment {
    pub fn as_str(self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Production => "production",
            Environment::Staging => "staging",
            Environment::Test => "test",
        }
    }

    pub(super) fn is_production(self) -> bool {
        matches!(self, Environment::Production)
    }
}

/// Where the local progress snapshots live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackendKind {
    Memory,
    File,
    Redis,
}

impl StoreBackendKind {
    pub fn as_str(self) -> &'static str {
        match self {
            StoreBackendKind::Memory => "memory",
            StoreBackendKind::File => "file",
            StoreBackendKind::Redis => "redis",
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {field}: {value}")]
    InvalidValue { field: &'static str, value: String },
    #[error("missing required setting {0}")]
    MissingSetting(&'static str),
}

impl RedisSettings {
    pub fn redis_url(&self) -> String {
        if self.password.is_empty() {
            format!("redis://{}:{}/{}", self.host, self.port, self.db)
        } else {
            format!("redis://:{}@{}:{}/{}", self.password, self.host, self.port, self.db)
        }
    }
}
