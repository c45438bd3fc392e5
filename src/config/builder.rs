use std::path::Path;

use serde::de::DeserializeOwned;

use super::env::EnvSource;
use super::file::FileSource;
use super::source::{layer_from_entries, ConfigSource, ValueSource};
use super::Config;
use crate::{ConfigError, ConfigValue, Origin, ResolveOptions};

/// Builder for layering configuration from files, the environment and
/// values built in code.
///
/// Sources are merged in registration order, with later sources overriding
/// earlier ones. Objects merge key by key; other values replace what lies
/// below them. Merging keeps substitutions intact, so a later layer can
/// extend an earlier one:
///
/// ```toml
/// # default.toml
/// name = "svc"
/// [server]
/// host = "localhost"
/// port = 8080
/// url = "http://${server.host}:${server.port}/api"
///
/// # dev.toml
/// name = "${name}-dev"
/// ```
///
/// Use `${?path}` for a substitution that may be missing and `$$` for a
/// literal `$`.
///
/// ## Example
///
/// ```no_run
/// use layerconf::Config;
/// use serde::Deserialize;
///
/// #[derive(Deserialize)]
/// struct MyConfig {
///     name: String,
///     port: u16,
/// }
///
/// let config: MyConfig = Config::builder()
///     .with_file("config/default.toml", true)
///     .with_file("config/local.toml", false)
///     .build()?;
/// # Ok::<(), layerconf::ConfigError>(())
/// ```
#[derive(Debug, Default)]
#[must_use = "builders do nothing until .load(), .resolve() or .build() is called"]
pub struct ConfigBuilder {
    sources: Vec<Box<dyn ConfigSource>>,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a TOML file to be loaded.
    ///
    /// If `required` is `true`, loading fails if the file doesn't exist.
    /// Optional files that are missing are silently skipped.
    pub fn with_file(self, path: impl AsRef<Path>, required: bool) -> Self {
        self.with_source(FileSource::new(path, required))
    }

    /// Loads configuration from environment variables with the given prefix.
    ///
    /// Environment variables are mapped to config paths by:
    /// 1. Removing the prefix and separator
    /// 2. Splitting remaining segments on the separator
    /// 3. Converting path segments to lowercase
    ///
    /// Values are coerced from strings to the most specific type:
    /// integer, float, boolean, or string (fallback).
    ///
    /// ```no_run
    /// # use layerconf::Config;
    /// # use serde::Deserialize;
    /// # #[derive(Deserialize)] struct MyConfig { }
    /// // defaults -> env overrides -> local file overrides env
    /// let config: MyConfig = Config::builder()
    ///     .with_file("config/default.toml", true)
    ///     .with_env("MYAPP", "__")
    ///     .with_file("config/local.toml", false)
    ///     .build()?;
    /// # Ok::<(), layerconf::ConfigError>(())
    /// ```
    pub fn with_env(self, prefix: impl Into<String>, separator: impl Into<String>) -> Self {
        self.with_source(EnvSource::new(prefix, separator))
    }

    /// Adds a tree built in code as a layer.
    pub fn with_value(self, value: ConfigValue) -> Self {
        self.with_source(ValueSource::new(value))
    }

    pub fn with_source(mut self, source: impl ConfigSource + 'static) -> Self {
        self.sources.push(Box::new(source));
        self
    }

    /// Loads and merges every source without resolving substitutions.
    pub fn load(self) -> Result<Config, ConfigError> {
        let mut merged: Option<ConfigValue> = None;

        for source in &self.sources {
            let entries = source.entries()?;
            tracing::debug!(?source, entries = entries.len(), "loaded configuration source");

            if let Some(layer) = layer_from_entries(entries)? {
                merged = Some(match merged {
                    Some(below) => layer.with_fallback(&below),
                    None => layer,
                });
            }
        }

        let root = merged.unwrap_or_else(|| ConfigValue::empty_object(Origin::new("empty config")));
        Ok(Config::from_value(root))
    }

    /// Loads, merges and resolves with default options.
    pub fn resolve(self) -> Result<Config, ConfigError> {
        self.resolve_with(&ResolveOptions::default())
    }

    pub fn resolve_with(self, options: &ResolveOptions) -> Result<Config, ConfigError> {
        self.load()?.resolve_with(options)
    }

    /// Loads, resolves and deserializes the configuration.
    ///
    /// This performs deserialization once at build time rather than on each access,
    /// making subsequent config reads zero-cost.
    pub fn build<T: DeserializeOwned>(self) -> Result<T, ConfigError> {
        self.resolve()?.deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn toml_file(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{contents}").unwrap();
        file
    }

    #[derive(Debug, Deserialize)]
    struct AppConfig {
        name: String,
        server: Server,
    }

    #[derive(Debug, Deserialize)]
    struct Server {
        port: u16,
        url: String,
    }

    #[test]
    fn test_build_with_references() {
        let file = toml_file(
            r#"
            name = "svc"
            [server]
            host = "localhost"
            port = 8080
            url = "http://${server.host}:${server.port}/api"
            "#,
        );
        let config: AppConfig = ConfigBuilder::new().with_file(file.path(), true).build().unwrap();
        assert_eq!(config.name, "svc");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.url, "http://localhost:8080/api");
    }

    #[test]
    fn test_later_file_overrides_and_extends() {
        let base = toml_file(
            r#"
            name = "svc"
            [server]
            host = "localhost"
            port = 8080
            url = "http://${server.host}:${server.port}"
            "#,
        );
        let overlay = toml_file(
            r#"
            name = "${name}-dev"
            [server]
            port = 9090
            "#,
        );

        let config: AppConfig = ConfigBuilder::new()
            .with_file(base.path(), true)
            .with_file(overlay.path(), true)
            .build()
            .unwrap();
        assert_eq!(config.name, "svc-dev");
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.server.url, "http://localhost:9090");
    }

    #[test]
    fn test_missing_optional_file_is_skipped() {
        let config = ConfigBuilder::new()
            .with_file("/nonexistent/path/config.toml", false)
            .load()
            .unwrap();
        assert!(config.root().as_object().is_some_and(|o| o.is_empty()));
    }

    #[test]
    fn test_load_keeps_substitutions() {
        let file = toml_file(r#"a = "${b}""#);
        let config = ConfigBuilder::new().with_file(file.path(), true).load().unwrap();
        assert!(!config.is_resolved());

        let err = ConfigBuilder::new().with_file(file.path(), true).resolve().unwrap_err();
        assert!(matches!(err, ConfigError::UnresolvedSubstitution { .. }));
    }

    #[test]
    fn test_value_layer() {
        let file = toml_file(r#"greeting = "hello ${who}""#);
        let mut fields = std::collections::BTreeMap::new();
        fields.insert("who".to_string(), ConfigValue::string(Origin::new("code"), "world"));

        let config = ConfigBuilder::new()
            .with_value(ConfigValue::object(Origin::new("code"), fields))
            .with_file(file.path(), true)
            .resolve()
            .unwrap();
        assert_eq!(config.get_string("greeting").unwrap(), "hello world");
    }

    #[test]
    fn test_deserialize_error() {
        let file = toml_file(r#"name = 5"#);
        let result = ConfigBuilder::new().with_file(file.path(), true).build::<AppConfig>();
        assert!(matches!(result, Err(ConfigError::DeserializeError(_))));
    }
}
