use std::path::PathBuf;

use thiserror::Error;

use crate::{Origin, Path};

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// A required substitution had nothing to point at, or sat on an unbreakable cycle.
    #[error("{origin}: could not resolve substitution to a value: ${{{path}}}{}", cycle_suffix(.cycle))]
    UnresolvedSubstitution {
        origin: Origin,
        path: Path,
        cycle: Option<String>,
    },

    #[error("{origin}: {message}")]
    BadValue { origin: Origin, message: String },

    #[error("invalid path '{path}': {message}")]
    BadPath { path: String, message: String },

    /// A value was queried before its tree was resolved.
    #[error("value not resolved: {0}")]
    NotResolved(String),

    #[error("bug or broken invariant: {0}")]
    BugOrBroken(String),

    #[error("no configuration setting found for key '{path}'")]
    Missing { path: Path },

    #[error("{origin}: {path} has type {found} rather than {expected}")]
    WrongType {
        origin: Origin,
        path: Path,
        expected: &'static str,
        found: &'static str,
    },

    #[error("required config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("failed to read config file '{path}': {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file '{path}': {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("failed to deserialize config: {0}")]
    DeserializeError(#[from] toml::de::Error),
}

fn cycle_suffix(cycle: &Option<String>) -> String {
    match cycle {
        Some(trace) => format!(" (cycle: {trace})"),
        None => String::new(),
    }
}
