//! Configuration loading and querying.

mod builder;
mod convert;
mod env;
mod file;
mod interpolate;
mod source;

use serde::de::DeserializeOwned;

pub use builder::ConfigBuilder;
pub use env::{reload_system_environment, EnvSource};
pub(crate) use env::system_environment;
pub use file::FileSource;
pub use source::{ConfigEntry, ConfigSource, ValueSource};

use crate::value::ValueKind;
use crate::{resolve, ConfigError, ConfigValue, Path, ResolveOptions, ValueType};

/// A configuration tree with path-based accessors.
///
/// Loading produces an unresolved `Config`; [`resolve`](Self::resolve)
/// returns a new one with every substitution replaced. Queries on a path
/// that still crosses a substitution fail with
/// [`ConfigError::NotResolved`].
#[derive(Debug, Clone)]
pub struct Config {
    root: ConfigValue,
}

impl Config {
    /// Creates a new configuration builder.
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }

    /// Wraps a tree; anything but an object becomes an empty object.
    pub fn from_value(root: ConfigValue) -> Self {
        Self {
            root: ConfigValue::root_must_be_object(Some(&root), root.origin()),
        }
    }

    pub fn root(&self) -> &ConfigValue {
        &self.root
    }

    pub fn is_resolved(&self) -> bool {
        self.root.is_resolved()
    }

    /// Layers `self` over `fallback`.
    pub fn with_fallback(&self, fallback: &Config) -> Config {
        Self::from_value(self.root.with_fallback(&fallback.root))
    }

    pub fn resolve(&self) -> Result<Config, ConfigError> {
        self.resolve_with(&ResolveOptions::default())
    }

    pub fn resolve_with(&self, options: &ResolveOptions) -> Result<Config, ConfigError> {
        resolve(&self.root, options).map(Self::from_value)
    }

    /// True if `path` holds a value other than null.
    pub fn has_path(&self, path: &str) -> Result<bool, ConfigError> {
        let path = Path::parse(path)?;
        Ok(self
            .find(&path)?
            .is_some_and(|value| !matches!(value.kind(), ValueKind::Null)))
    }

    /// The value at `path`; null counts as missing.
    pub fn get(&self, path: &str) -> Result<ConfigValue, ConfigError> {
        let path = Path::parse(path)?;
        match self.find(&path)? {
            Some(value) if !matches!(value.kind(), ValueKind::Null) => Ok(value),
            _ => Err(ConfigError::Missing { path }),
        }
    }

    /// Scalars are rendered as text.
    pub fn get_string(&self, path: &str) -> Result<String, ConfigError> {
        let value = self.get(path)?;
        match value.kind() {
            ValueKind::Bool(_) | ValueKind::Number(_) | ValueKind::String(_) => {
                Ok(value.render_scalar().unwrap_or_default())
            }
            _ => Err(wrong_type(&value, path, ValueType::String)),
        }
    }

    /// Numbers, or strings that parse as one.
    pub fn get_i64(&self, path: &str) -> Result<i64, ConfigError> {
        let value = self.get(path)?;
        let parsed = match value.kind() {
            ValueKind::Number(n) => n.as_i64(),
            ValueKind::String(s) => s.trim().parse().ok(),
            _ => None,
        };
        parsed.ok_or_else(|| wrong_type(&value, path, ValueType::Number))
    }

    pub fn get_f64(&self, path: &str) -> Result<f64, ConfigError> {
        let value = self.get(path)?;
        let parsed = match value.kind() {
            ValueKind::Number(n) => Some(n.as_f64()),
            ValueKind::String(s) => s.trim().parse().ok(),
            _ => None,
        };
        parsed.ok_or_else(|| wrong_type(&value, path, ValueType::Number))
    }

    /// Booleans, or the strings `true`/`false`, `yes`/`no` and `on`/`off`.
    pub fn get_bool(&self, path: &str) -> Result<bool, ConfigError> {
        let value = self.get(path)?;
        let parsed = match value.kind() {
            ValueKind::Bool(b) => Some(*b),
            ValueKind::String(s) => match s.as_str() {
                "true" | "yes" | "on" => Some(true),
                "false" | "no" | "off" => Some(false),
                _ => None,
            },
            _ => None,
        };
        parsed.ok_or_else(|| wrong_type(&value, path, ValueType::Boolean))
    }

    pub fn get_list(&self, path: &str) -> Result<Vec<ConfigValue>, ConfigError> {
        let value = self.get(path)?;
        match value.as_list() {
            Some(list) => Ok(list.items().to_vec()),
            None => Err(wrong_type(&value, path, ValueType::List)),
        }
    }

    /// The object at `path` as a configuration of its own.
    pub fn get_config(&self, path: &str) -> Result<Config, ConfigError> {
        let value = self.get(path)?;
        if value.as_object().is_none() {
            return Err(wrong_type(&value, path, ValueType::Object));
        }
        Ok(Self { root: value })
    }

    /// Deserializes the whole tree, which must be resolved.
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T, ConfigError> {
        let value = convert::value_to_toml(&self.root)?
            .unwrap_or_else(|| toml::Value::Table(toml::Table::new()));
        value.try_into().map_err(ConfigError::DeserializeError)
    }

    fn find(&self, path: &Path) -> Result<Option<ConfigValue>, ConfigError> {
        let mut current = self.root.clone();
        for (i, segment) in path.segments().iter().enumerate() {
            let next = match current.kind() {
                ValueKind::Object(obj) => obj.get(segment).cloned(),
                _ if current.is_unmergeable() => return Err(not_resolved(path, &current)),
                _ => {
                    let parent = Path::new(path.segments()[..i].iter().cloned())
                        .unwrap_or_else(|_| Path::key(segment.clone()));
                    return Err(ConfigError::WrongType {
                        origin: current.origin().clone(),
                        path: parent,
                        expected: ValueType::Object.name(),
                        found: type_name(&current),
                    });
                }
            };
            match next {
                Some(value) => current = value,
                None => return Ok(None),
            }
        }

        if current.is_unmergeable() {
            return Err(not_resolved(path, &current));
        }
        Ok(Some(current))
    }
}

fn not_resolved(path: &Path, value: &ConfigValue) -> ConfigError {
    ConfigError::NotResolved(format!(
        "{path} crosses an unresolved value at {}; resolve the configuration first",
        value.origin()
    ))
}

fn wrong_type(value: &ConfigValue, path: &str, expected: ValueType) -> ConfigError {
    ConfigError::WrongType {
        origin: value.origin().clone(),
        path: Path::parse(path).unwrap_or_else(|_| Path::key(path)),
        expected: expected.name(),
        found: type_name(value),
    }
}

fn type_name(value: &ConfigValue) -> &'static str {
    value.value_type().map_or("unresolved", ValueType::name)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use serde::Deserialize;

    use super::*;
    use crate::Origin;

    fn origin() -> Origin {
        Origin::new("test")
    }

    fn config(toml: &str) -> Config {
        let table: toml::Table = toml::from_str(toml).unwrap();
        Config::from_value(convert::table_to_value(&table, &origin()).unwrap())
    }

    #[test]
    fn test_typed_getters() {
        let config = config(
            r#"
            name = "svc"
            port = 8080
            ratio = 0.25
            debug = true
            flag = "yes"
            tags = ["a", "b"]
            [db]
            host = "localhost"
            "#,
        );

        assert_eq!(config.get_string("name").unwrap(), "svc");
        assert_eq!(config.get_string("port").unwrap(), "8080");
        assert_eq!(config.get_i64("port").unwrap(), 8080);
        assert_eq!(config.get_f64("ratio").unwrap(), 0.25);
        assert!(config.get_bool("debug").unwrap());
        assert!(config.get_bool("flag").unwrap());
        assert_eq!(config.get_list("tags").unwrap().len(), 2);
        assert_eq!(config.get_config("db").unwrap().get_string("host").unwrap(), "localhost");
        assert_eq!(config.get_string("db.host").unwrap(), "localhost");
    }

    #[test]
    fn test_missing_and_wrong_type() {
        let config = config(
            r#"
            name = "svc"
            [db]
            host = "localhost"
            "#,
        );

        assert!(matches!(config.get("nope"), Err(ConfigError::Missing { .. })));
        assert!(!config.has_path("db.port").unwrap());
        assert!(config.has_path("db.host").unwrap());
        assert!(matches!(
            config.get_i64("name"),
            Err(ConfigError::WrongType { expected: "number", found: "string", .. })
        ));
        assert!(matches!(
            config.get("name.first"),
            Err(ConfigError::WrongType { expected: "object", .. })
        ));
        assert!(matches!(config.get("a..b"), Err(ConfigError::BadPath { .. })));
    }

    #[test]
    fn test_null_counts_as_missing() {
        let mut fields = BTreeMap::new();
        fields.insert("gone".to_string(), ConfigValue::null(origin()));
        let config = Config::from_value(ConfigValue::object(origin(), fields));
        assert!(!config.has_path("gone").unwrap());
        assert!(matches!(config.get("gone"), Err(ConfigError::Missing { .. })));
    }

    #[test]
    fn test_queries_before_resolve() {
        let config = config(
            r#"
            base = "x"
            derived = "${base}-y"
            "#,
        );
        assert!(!config.is_resolved());
        assert!(matches!(config.get("derived"), Err(ConfigError::NotResolved(_))));
        assert!(matches!(config.deserialize::<toml::Table>(), Err(ConfigError::NotResolved(_))));

        let resolved = config.resolve().unwrap();
        assert!(resolved.is_resolved());
        assert_eq!(resolved.get_string("derived").unwrap(), "x-y");
    }

    #[test]
    fn test_with_fallback() {
        let top = config(r#"a = 1"#);
        let bottom = config(
            r#"
            a = 0
            b = 2
            "#,
        );
        let merged = top.with_fallback(&bottom);
        assert_eq!(merged.get_i64("a").unwrap(), 1);
        assert_eq!(merged.get_i64("b").unwrap(), 2);
    }

    #[test]
    fn test_deserialize() {
        #[derive(Debug, Deserialize)]
        struct Db {
            host: String,
            port: u16,
        }

        let config = config(
            r#"
            host = "db"
            port = 5432
            "#,
        );
        let db: Db = config.deserialize().unwrap();
        assert_eq!(db.host, "db");
        assert_eq!(db.port, 5432);
    }
}
