//! Substitution and merge resolution.
//!
//! [`resolve`] turns a tree that may still contain references,
//! concatenations and delayed merges into a concrete tree. One pass owns a
//! [`context::ResolveContext`] (options, memo cache, cycle markers) and
//! threads immutable [`source::ResolveSource`] values (the lookup root and
//! the parents leading to the value being resolved) through the recursion.
//!
//! Recursion depth grows with nesting depth times the merge-stack length
//! along substitution chains; extremely deep inputs can exhaust the thread
//! stack.

mod algorithm;
mod context;
mod memo;
mod source;

use crate::{ConfigError, ConfigValue, Origin, Path};
use context::ResolveContext;
use source::ResolveSource;

/// Knobs for one resolution pass.
#[derive(Debug, Clone, Default)]
pub struct ResolveOptions {
    allow_unresolved: bool,
    restrict_to_child: Option<Path>,
    use_system_environment: bool,
}

impl ResolveOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Leave substitutions that cannot be resolved in place instead of failing.
    pub fn with_allow_unresolved(mut self, allow: bool) -> Self {
        self.allow_unresolved = allow;
        self
    }

    /// Only resolve what is needed to produce the value at `path`.
    pub fn with_restrict_to_child(mut self, path: Path) -> Self {
        self.restrict_to_child = Some(path);
        self
    }

    /// Look up substitutions missing from the tree in the process environment.
    pub fn with_system_environment(mut self, enabled: bool) -> Self {
        self.use_system_environment = enabled;
        self
    }

    pub fn allow_unresolved(&self) -> bool {
        self.allow_unresolved
    }

    pub fn restrict_to_child(&self) -> Option<&Path> {
        self.restrict_to_child.as_ref()
    }

    pub fn use_system_environment(&self) -> bool {
        self.use_system_environment
    }
}

/// Reached a value that is already being resolved further up the stack.
#[derive(Debug)]
pub(crate) struct Cycle {
    origin: Origin,
    path: Path,
    trace: String,
}

/// Why a resolution step stopped early.
///
/// `NotPossibleToResolve` is control flow, not an error: callers that can
/// break the cycle match on it; [`resolve`] turns any that reach the top
/// into [`ConfigError::UnresolvedSubstitution`].
#[derive(Debug)]
pub(crate) enum Interrupt {
    NotPossibleToResolve(Cycle),
    Failed(ConfigError),
}

impl From<ConfigError> for Interrupt {
    fn from(err: ConfigError) -> Self {
        Interrupt::Failed(err)
    }
}

pub(crate) type Step<T> = Result<T, Interrupt>;

impl Interrupt {
    fn into_error(self) -> ConfigError {
        match self {
            Interrupt::Failed(err) => err,
            Interrupt::NotPossibleToResolve(cycle) => ConfigError::UnresolvedSubstitution {
                origin: cycle.origin,
                path: cycle.path,
                cycle: Some(cycle.trace),
            },
        }
    }
}

/// Resolves a whole tree, using the tree itself as the lookup root.
///
/// The result holds no references, concatenations or delayed merges
/// unless `options` allows unresolved values or restricts the pass to one
/// child. A concrete input comes back as the same instance.
pub fn resolve(tree: &ConfigValue, options: &ResolveOptions) -> Result<ConfigValue, ConfigError> {
    match resolve_against(tree, tree, options)? {
        Some(resolved) => Ok(resolved),
        None => Err(ConfigError::BugOrBroken(format!(
            "root value at {} resolved to nothing",
            tree.origin()
        ))),
    }
}

/// Resolves `value` with substitutions looked up in `root`.
///
/// Returns `None` when the value was an optional substitution with nothing
/// to point at.
pub fn resolve_against(
    value: &ConfigValue,
    root: &ConfigValue,
    options: &ResolveOptions,
) -> Result<Option<ConfigValue>, ConfigError> {
    if value.is_resolved() {
        return Ok(Some(value.clone()));
    }

    let root = ConfigValue::root_must_be_object(Some(root), root.origin());
    let source = ResolveSource::new(root);
    let mut context = ResolveContext::new(options.clone());

    let outcome = match options.restrict_to_child() {
        Some(path) => context.resolve_child_of_root(value, &source, path),
        None => context.resolve(value, &source),
    };
    outcome.map_err(Interrupt::into_error)
}
