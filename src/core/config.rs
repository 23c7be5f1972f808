mod parsing;
mod settings;
mod types;

pub use types::{
    AutosaveSettings, ConfigError, Environment, RedisSettings, RemoteSettings, RuntimeSettings,
    Settings, StoreBackendKind, StoreSettings, TelemetrySettings, TimerSettings,
};
