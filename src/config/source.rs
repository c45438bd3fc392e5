use std::collections::BTreeMap;

use crate::{ConfigError, ConfigValue, Origin};

/// One value a source contributes, placed at `path` below the root.
#[derive(Debug, Clone)]
pub struct ConfigEntry {
    pub path: Vec<String>,
    pub value: ConfigValue,
}

impl ConfigEntry {
    pub fn root(value: ConfigValue) -> Self {
        Self {
            path: Vec::new(),
            value,
        }
    }

    pub fn at_path(path: Vec<String>, value: ConfigValue) -> Self {
        Self { path, value }
    }
}

/// A layer in the loading pipeline.
pub trait ConfigSource: Send + Sync + std::fmt::Debug {
    fn entries(&self) -> Result<Vec<ConfigEntry>, ConfigError>;
}

/// A tree built in code, used as a layer like any file.
#[derive(Debug, Clone)]
pub struct ValueSource {
    value: ConfigValue,
}

impl ValueSource {
    pub fn new(value: ConfigValue) -> Self {
        Self { value }
    }
}

impl ConfigSource for ValueSource {
    fn entries(&self) -> Result<Vec<ConfigEntry>, ConfigError> {
        Ok(vec![ConfigEntry::root(self.value.clone())])
    }
}

/// Combines a source's entries into one tree; later entries win.
///
/// Returns `None` for a source with no entries.
pub(crate) fn layer_from_entries(
    entries: Vec<ConfigEntry>,
) -> Result<Option<ConfigValue>, ConfigError> {
    let mut layer: Option<ConfigValue> = None;
    for entry in entries {
        let tree = nest_at_path(entry)?;
        layer = Some(match layer {
            Some(below) => tree.with_fallback(&below),
            None => tree,
        });
    }
    Ok(layer)
}

fn nest_at_path(entry: ConfigEntry) -> Result<ConfigValue, ConfigError> {
    if entry.path.is_empty() && !entry.value.is_object_like() {
        return Err(ConfigError::BadValue {
            origin: entry.value.origin().clone(),
            message: "the root of a configuration source must be an object".into(),
        });
    }
    if entry.path.iter().any(String::is_empty) {
        return Err(ConfigError::BadPath {
            path: entry.path.join("."),
            message: "path segments must not be empty".into(),
        });
    }

    let origin: Origin = entry.value.origin().clone();
    Ok(entry.path.into_iter().rev().fold(entry.value, |inner, key| {
        ConfigValue::object(origin.clone(), BTreeMap::from([(key, inner)]))
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Path;

    fn origin() -> Origin {
        Origin::new("test")
    }

    fn at(value: &ConfigValue, path: &str) -> Option<ConfigValue> {
        value.peek_path(&Path::parse(path).unwrap()).unwrap()
    }

    #[test]
    fn test_entries_nest_at_path() {
        let entries = vec![
            ConfigEntry::at_path(
                vec!["database".into(), "port".into()],
                ConfigValue::int(origin(), 5432),
            ),
            ConfigEntry::at_path(
                vec!["database".into(), "host".into()],
                ConfigValue::string(origin(), "db"),
            ),
        ];
        let layer = layer_from_entries(entries).unwrap().unwrap();
        assert_eq!(at(&layer, "database.port"), Some(ConfigValue::int(origin(), 5432)));
        assert_eq!(at(&layer, "database.host"), Some(ConfigValue::string(origin(), "db")));
    }

    #[test]
    fn test_later_entries_win() {
        let entries = vec![
            ConfigEntry::at_path(vec!["a".into()], ConfigValue::int(origin(), 1)),
            ConfigEntry::at_path(vec!["a".into()], ConfigValue::int(origin(), 2)),
        ];
        let layer = layer_from_entries(entries).unwrap().unwrap();
        assert_eq!(at(&layer, "a"), Some(ConfigValue::int(origin(), 2)));
    }

    #[test]
    fn test_empty_source_has_no_layer() {
        assert!(layer_from_entries(Vec::new()).unwrap().is_none());
    }

    #[test]
    fn test_root_entry_must_be_object() {
        let entries = vec![ConfigEntry::root(ConfigValue::int(origin(), 1))];
        assert!(matches!(
            layer_from_entries(entries),
            Err(ConfigError::BadValue { .. })
        ));
    }
}
