use super::types::{ConfigError, Environment, StoreBackendKind};

/// Key lookup used by `Settings`; the process environment in production, a map in tests.
pub(super) struct Source<F> {
    lookup: F,
}

impl<F> Source<F>
where
    F: Fn(&str) -> Option<String>,
{
    pub(super) fn new(lookup: F) -> Self {
        Self { lookup }
    }

    pub(super) fn optional(&self, key: &str) -> Option<String> {
        (self.lookup)(key).map(|value| value.trim().to_string()).filter(|value| !value.is_empty())
    }

    pub(super) fn or_default(&self, key: &str, default: &str) -> String {
        self.optional(key).unwrap_or_else(|| default.to_string())
    }
}

pub(super) fn parse_u16(field: &'static str, value: String) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidValue { field, value })
}

pub(super) fn parse_u64(field: &'static str, value: String) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidValue { field, value })
}

pub(super) fn parse_positive_u64(field: &'static str, value: String) -> Result<u64, ConfigError> {
    let parsed = parse_u64(field, value)?;
    if parsed == 0 {
        return Err(ConfigError::InvalidValue { field, value: parsed.to_string() });
    }
    Ok(parsed)
}

pub(super) fn parse_bool(value: &str) -> bool {
    matches!(value, "1" | "true" | "TRUE" | "yes" | "YES" | "on" | "ON")
}

pub(super) fn parse_environment(value: Option<String>) -> Environment {
    match value.as_deref().map(|val| val.to_lowercase()) {
        Some(ref val) if val == "production" || val == "prod" => Environment::Production,
        Some(ref val) if val == "staging" => Environment::Staging,
        Some(ref val) if val == "test" || val == "testing" => Environment::Test,
        _ => Environment::Development,
    }
}

pub(super) fn parse_store_backend(value: String) -> Result<StoreBackendKind, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "memory" | "mem" => Ok(StoreBackendKind::Memory),
        "file" | "fs" => Ok(StoreBackendKind::File),
        "redis" => Ok(StoreBackendKind::Redis),
        _ => Err(ConfigError::InvalidValue { field: "PROGRESS_STORE_BACKEND", value }),
    }
}
