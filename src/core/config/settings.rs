use std::env;
use std::path::PathBuf;

use super::parsing::{
    parse_bool, parse_environment, parse_positive_u64, parse_store_backend, parse_u16, parse_u64,
    Source,
};
use super::types::{
    AutosaveSettings, ConfigError, RedisSettings, RemoteSettings, RuntimeSettings, Settings,
    StoreSettings, TelemetrySettings, TimerSettings,
};

const MAX_FINAL_FLUSH_TIMEOUT_SECONDS: u64 = 60;

impl Settings {
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_source(|key| env::var(key).ok())
    }

    /// Builds settings from an arbitrary key lookup instead of the process environment.
    pub fn from_source<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let source = Source::new(lookup);

        let environment = parse_environment(source.optional("EXAM_ENGINE_ENV"));
        let strict_config = source
            .optional("EXAM_ENGINE_STRICT_CONFIG")
            .map(|value| parse_bool(&value))
            .unwrap_or(false)
            || environment.is_production();

        let log_level = source.or_default("EXAM_ENGINE_LOG_LEVEL", "info");
        let json = source
            .optional("EXAM_ENGINE_LOG_JSON")
            .map(|value| parse_bool(&value))
            .unwrap_or(false);
        let prometheus_enabled =
            source.optional("PROMETHEUS_ENABLED").map(|value| parse_bool(&value)).unwrap_or(false);

        let debounce_ms =
            parse_u64("AUTOSAVE_DEBOUNCE_MS", source.or_default("AUTOSAVE_DEBOUNCE_MS", "1500"))?;
        let interval_seconds = parse_positive_u64(
            "AUTOSAVE_INTERVAL_SECONDS",
            source.or_default("AUTOSAVE_INTERVAL_SECONDS", "30"),
        )?;
        let final_flush_timeout_seconds = parse_positive_u64(
            "FINAL_FLUSH_TIMEOUT_SECONDS",
            source.or_default("FINAL_FLUSH_TIMEOUT_SECONDS", "5"),
        )?;

        let tick_ms =
            parse_positive_u64("TIMER_TICK_MS", source.or_default("TIMER_TICK_MS", "1000"))?;

        let backend = parse_store_backend(source.or_default("PROGRESS_STORE_BACKEND", "file"))?;
        let dir = PathBuf::from(source.or_default("PROGRESS_STORE_DIR", ".exam-progress"));

        let redis_host = source.or_default("REDIS_HOST", "localhost");
        let redis_port = parse_u16("REDIS_PORT", source.or_default("REDIS_PORT", "6379"))?;
        let redis_db = parse_u16("REDIS_DB", source.or_default("REDIS_DB", "0"))?;
        let redis_password = source.or_default("REDIS_PASSWORD", "");

        let base_url =
            source.or_default("EXAM_API_BASE_URL", "").trim_end_matches('/').to_string();
        let token = source.or_default("EXAM_API_TOKEN", "");
        let timeout_seconds = parse_positive_u64(
            "EXAM_API_TIMEOUT_SECONDS",
            source.or_default("EXAM_API_TIMEOUT_SECONDS", "15"),
        )?;

        let settings = Self {
            runtime: RuntimeSettings { environment, strict_config },
            telemetry: TelemetrySettings { log_level, json, prometheus_enabled },
            autosave: AutosaveSettings {
                debounce_ms,
                interval_seconds,
                final_flush_timeout_seconds,
            },
            timer: TimerSettings { tick_ms },
            store: StoreSettings { backend, dir },
            redis: RedisSettings {
                host: redis_host,
                port: redis_port,
                db: redis_db,
                password: redis_password,
            },
            remote: RemoteSettings { base_url, token, timeout_seconds },
        };

        settings.validate()?;

        Ok(settings)
    }

    pub fn runtime(&self) -> &RuntimeSettings {
        &self.runtime
    }

    pub fn telemetry(&self) -> &TelemetrySettings {
        &self.telemetry
    }

    pub fn autosave(&self) -> &AutosaveSettings {
        &self.autosave
    }

    pub fn timer(&self) -> &TimerSettings {
        &self.timer
    }

    pub fn store(&self) -> &StoreSettings {
        &self.store
    }

    pub fn redis(&self) -> &RedisSettings {
        &self.redis
    }

    pub fn remote(&self) -> &RemoteSettings {
        &self.remote
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.autosave.final_flush_timeout_seconds > MAX_FINAL_FLUSH_TIMEOUT_SECONDS {
            return Err(ConfigError::InvalidValue {
                field: "FINAL_FLUSH_TIMEOUT_SECONDS",
                value: self.autosave.final_flush_timeout_seconds.to_string(),
            });
        }

        if !self.runtime.strict_config {
            return Ok(());
        }

        if self.remote.base_url.is_empty() {
            return Err(ConfigError::MissingSetting("EXAM_API_BASE_URL"));
        }

        if !(self.remote.base_url.starts_with("http://")
            || self.remote.base_url.starts_with("https://"))
        {
            return Err(ConfigError::InvalidValue {
                field: "EXAM_API_BASE_URL",
                value: self.remote.base_url.clone(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::core::config::{Environment, StoreBackendKind};

    fn settings_from(pairs: &[(&str, &str)]) -> Result<Settings, ConfigError> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(key, value)| (key.to_string(), value.to_string())).collect();
        Settings::from_source(move |key| map.get(key).cloned())
    }

    #[test]
    fn defaults_apply_without_any_variables() {
        let settings = settings_from(&[]).expect("settings");
        assert_eq!(settings.runtime().environment, Environment::Development);
        assert!(!settings.runtime().strict_config);
        assert_eq!(settings.autosave().debounce_ms, 1500);
        assert_eq!(settings.autosave().interval_seconds, 30);
        assert_eq!(settings.autosave().final_flush_timeout_seconds, 5);
        assert_eq!(settings.timer().tick_ms, 1000);
        assert_eq!(settings.store().backend, StoreBackendKind::File);
        assert_eq!(settings.redis().redis_url(), "redis://localhost:6379/0");
        assert_eq!(settings.remote().timeout_seconds, 15);
    }

    #[test]
    fn production_requires_remote_base_url() {
        let err = settings_from(&[("EXAM_ENGINE_ENV", "production")]).unwrap_err();
        assert!(matches!(err, ConfigError::MissingSetting("EXAM_API_BASE_URL")));

        let settings = settings_from(&[
            ("EXAM_ENGINE_ENV", "production"),
            ("EXAM_API_BASE_URL", "https://api.example.test/v1/"),
        ])
        .expect("settings");
        assert!(settings.runtime().strict_config);
        assert_eq!(settings.remote().base_url, "https://api.example.test/v1");
    }

    #[test]
    fn rejects_zero_autosave_interval() {
        let err = settings_from(&[("AUTOSAVE_INTERVAL_SECONDS", "0")]).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue { field: "AUTOSAVE_INTERVAL_SECONDS", .. }
        ));
    }

    #[test]
    fn redis_url_includes_password_when_set() {
        let settings = settings_from(&[
            ("PROGRESS_STORE_BACKEND", "redis"),
            ("REDIS_PASSWORD", "hunter2"),
            ("REDIS_DB", "3"),
        ])
        .expect("settings");
        assert_eq!(settings.store().backend, StoreBackendKind::Redis);
        assert_eq!(settings.redis().redis_url(), "redis://:hunter2@localhost:6379/3");
    }
}
