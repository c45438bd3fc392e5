//! Layered configuration with substitutions and delayed merges.
//!
//! Sources (TOML files, environment variables, trees built in code) are
//! merged into one [`ConfigValue`] tree without evaluating `${...}`
//! substitutions. [`resolve`] then replaces every substitution,
//! concatenation and pending merge with a concrete value, so a later
//! layer can refer to what an earlier layer said about the same setting.

pub mod config;
mod error;
mod origin;
mod path;
mod resolve;
mod value;

pub use config::{
    reload_system_environment, Config, ConfigBuilder, ConfigEntry, ConfigSource, EnvSource,
    FileSource, ValueSource,
};
pub use error::ConfigError;
pub use origin::{merge_origins, Origin, OriginKind};
pub use path::Path;
pub use resolve::{resolve, resolve_against, ResolveOptions};
pub use value::{
    ConfigList, ConfigObject, ConfigValue, Number, NumberValue, Substitution, ValueKind, ValueType,
};
