use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use super::source::{ConfigEntry, ConfigSource};
use crate::{ConfigError, ConfigValue, Origin};

/// Environment variables as a configuration layer.
///
/// `PREFIX<sep>DATABASE<sep>HOST=db` becomes `database.host = "db"`.
#[derive(Debug, Clone)]
pub struct EnvSource {
    prefix: String,
    separator: String,
}

impl EnvSource {
    pub fn new(prefix: impl Into<String>, separator: impl Into<String>) -> Self {
        let separator = separator.into();
        assert!(!separator.is_empty(), "separator must not be empty");
        Self {
            prefix: prefix.into(),
            separator,
        }
    }

    fn entries_from<I>(&self, vars: I) -> Vec<ConfigEntry>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let prefix_with_sep = format!("{}{}", self.prefix, self.separator);
        let mut entries = Vec::new();

        for (key, value) in vars {
            let Some(path_str) = key.strip_prefix(&prefix_with_sep) else {
                continue;
            };
            if path_str.is_empty() {
                continue;
            }

            let path: Vec<String> = path_str
                .split(&self.separator)
                .map(|s| s.to_lowercase())
                .collect();
            if path.iter().any(String::is_empty) {
                tracing::debug!(variable = %key, "skipping environment variable with an empty path segment");
                continue;
            }

            entries.push(ConfigEntry::at_path(path, coerce_value(&value, Origin::env(&key))));
        }

        entries
    }
}

impl ConfigSource for EnvSource {
    fn entries(&self) -> Result<Vec<ConfigEntry>, ConfigError> {
        let mut vars: Vec<(String, String)> = std::env::vars_os()
            .filter_map(|(key, value)| match (key.into_string(), value.into_string()) {
                (Ok(key), Ok(value)) => Some((key, value)),
                (key, _) => {
                    tracing::debug!(variable = ?key, "skipping environment variable that is not valid UTF-8");
                    None
                }
            })
            .collect();
        // Stable order, so overlapping variables always layer the same way.
        vars.sort();
        Ok(self.entries_from(vars))
    }
}

fn coerce_value(s: &str, origin: Origin) -> ConfigValue {
    if s.eq_ignore_ascii_case("true") {
        return ConfigValue::bool(origin, true);
    }
    if s.eq_ignore_ascii_case("false") {
        return ConfigValue::bool(origin, false);
    }

    if looks_like_integer(s) {
        if let Ok(i) = s.parse::<i64>() {
            return ConfigValue::int(origin, i);
        }
    }

    if s.contains('.') {
        if let Ok(f) = s.parse::<f64>() {
            return ConfigValue::float(origin, f);
        }
    }

    ConfigValue::string(origin, s)
}

fn looks_like_integer(s: &str) -> bool {
    let s = s.strip_prefix('-').unwrap_or(s);
    !s.is_empty() && s.chars().all(|c| c.is_ascii_digit())
}

static SYSTEM_ENVIRONMENT: RwLock<Option<ConfigValue>> = RwLock::new(None);

/// Every environment variable as a flat object of strings, keyed by name.
///
/// Taken once and reused until [`reload_system_environment`] is called.
pub(crate) fn system_environment() -> ConfigValue {
    if let Some(env) = SYSTEM_ENVIRONMENT
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .as_ref()
    {
        return env.clone();
    }

    let mut guard = SYSTEM_ENVIRONMENT
        .write()
        .unwrap_or_else(PoisonError::into_inner);
    guard
        .get_or_insert_with(|| {
            tracing::debug!("taking snapshot of the system environment");
            load_system_environment()
        })
        .clone()
}

/// Drops the environment snapshot so the next lookup reads the process environment again.
pub fn reload_system_environment() {
    *SYSTEM_ENVIRONMENT
        .write()
        .unwrap_or_else(PoisonError::into_inner) = None;
}

fn load_system_environment() -> ConfigValue {
    let fields: BTreeMap<String, ConfigValue> = std::env::vars_os()
        .filter_map(|(key, value)| Some((key.into_string().ok()?, value.into_string().ok()?)))
        .map(|(key, value)| {
            let origin = Origin::env(&key);
            (key, ConfigValue::string(origin, value))
        })
        .collect();
    ConfigValue::object(Origin::new("env variables"), fields)
}
