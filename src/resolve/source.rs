//! Where substitutions are looked up while resolving.

use super::context::ResolveContext;
use super::Step;
use crate::config::system_environment;
use crate::value::ValueKind;
use crate::{ConfigError, ConfigValue, Origin, Path};

/// The lookup root plus the chain of containers leading to the value
/// currently being resolved.
///
/// Sources are immutable; every operation returns a new one. When a merge
/// stack resolves one of its own entries, the stack is swapped for the
/// merge of the entries below it, so a self-reference sees only what it
/// overrides.
#[derive(Debug, Clone)]
pub(crate) struct ResolveSource {
    root: ConfigValue,
    /// Root first, innermost container last.
    path_from_root: Option<Vec<ConfigValue>>,
}

impl ResolveSource {
    pub(crate) fn new(root: ConfigValue) -> Self {
        Self {
            root,
            path_from_root: None,
        }
    }

    /// A source whose root is the first of `parents`.
    pub(crate) fn with_parents(parents: Vec<ConfigValue>) -> Self {
        match parents.first() {
            Some(first) => Self {
                root: ConfigValue::root_must_be_object(Some(first), first.origin()),
                path_from_root: Some(parents),
            },
            None => Self::new(ConfigValue::empty_object(Origin::new("empty resolve source"))),
        }
    }

    pub(crate) fn root(&self) -> &ConfigValue {
        &self.root
    }

    /// Records that resolution descends into `parent`.
    pub(crate) fn push_parent(&self, parent: &ConfigValue) -> Self {
        match &self.path_from_root {
            None if parent.same_instance(&self.root) => Self {
                root: self.root.clone(),
                path_from_root: Some(vec![parent.clone()]),
            },
            // A value outside the root hierarchy, e.g. one resolved on its own.
            None => self.clone(),
            Some(path) => {
                let mut path = path.clone();
                path.push(parent.clone());
                Self {
                    root: self.root.clone(),
                    path_from_root: Some(path),
                }
            }
        }
    }

    /// Forgets the parent chain once the root is no longer a view of the original tree.
    pub(crate) fn reset_parents(&self) -> Self {
        match self.path_from_root {
            None => self.clone(),
            Some(_) => Self::new(self.root.clone()),
        }
    }

    /// Replaces the innermost parent `old`, rebuilding every ancestor up to the root.
    pub(crate) fn replace_current_parent(
        &self,
        old: &ConfigValue,
        replacement: Option<&ConfigValue>,
    ) -> Result<Self, ConfigError> {
        if replacement.is_some_and(|r| r.same_instance(old)) {
            return Ok(self.clone());
        }

        match &self.path_from_root {
            Some(path) => match replace(path, old, replacement)? {
                Some(new_path) => Ok(Self::with_parents(new_path)),
                None => Ok(Self::new(ConfigValue::empty_object(self.root.origin().clone()))),
            },
            None if old.same_instance(&self.root) => Ok(Self::new(
                ConfigValue::root_must_be_object(replacement, self.root.origin()),
            )),
            None => Err(ConfigError::BugOrBroken(format!(
                "cannot replace parent {old:?} of a resolve source without a parent chain"
            ))),
        }
    }

    /// Replaces `old`, a child of the innermost parent, with `replacement` (or removes it).
    pub(crate) fn replace_within_current_parent(
        &self,
        old: &ConfigValue,
        replacement: Option<&ConfigValue>,
    ) -> Result<Self, ConfigError> {
        if replacement.is_some_and(|r| r.same_instance(old)) {
            return Ok(self.clone());
        }

        match self.path_from_root.as_ref().and_then(|path| path.last()) {
            Some(parent) => {
                let new_parent = parent.replace_child(old, replacement);
                let new_parent = Some(&new_parent).filter(|p| p.is_container());
                self.replace_current_parent(parent, new_parent)
            }
            None if old.same_instance(&self.root) => Ok(Self::new(
                ConfigValue::root_must_be_object(replacement, self.root.origin()),
            )),
            // Outside the lookup root: no lookup can reach `old`.
            None => Ok(self.clone()),
        }
    }

    /// The key path from the root to `value`, if the parent chain is made
    /// of plain objects starting at the root.
    pub(crate) fn path_to(&self, value: &ConfigValue) -> Option<Path> {
        let parents = self.path_from_root.as_ref()?;
        if !parents.first()?.same_instance(&self.root) {
            return None;
        }

        let children = parents.iter().skip(1).chain(std::iter::once(value));
        let mut segments = Vec::with_capacity(parents.len());
        for (parent, child) in parents.iter().zip(children) {
            let ValueKind::Object(obj) = parent.kind() else {
                return None;
            };
            let (key, _) = obj.iter().find(|(_, v)| v.same_instance(child))?;
            segments.push(key.to_string());
        }
        Path::new(segments).ok()
    }

    /// Finds the value a substitution points at.
    ///
    /// Returns the value (unresolved) and the chain of containers leading
    /// to it. Only the ancestors along `path` are resolved on the way.
    pub(crate) fn lookup(
        &self,
        context: &mut ResolveContext,
        path: &Path,
    ) -> Step<(Option<ConfigValue>, Vec<ConfigValue>)> {
        let lookup_source = Self::new(self.root.clone());
        let partial = context.with_restriction(Some(path.clone()), |ctx| {
            ctx.resolve(&self.root, &lookup_source)
        })?;

        let partial = match partial {
            Some(value) if value.is_object_like() => value,
            other => {
                return Err(ConfigError::BugOrBroken(format!(
                    "resolved object {:?} to non-object {other:?}",
                    self.root
                ))
                .into())
            }
        };

        let (found, parents) = find_in_object(&partial, path)?;
        if found.is_none() && context.options().use_system_environment() {
            let env = system_environment();
            return Ok(find_in_object(&env, path)?);
        }
        Ok((found, parents))
    }
}

/// Walks `path` from `obj` without resolving, collecting the containers passed.
pub(crate) fn find_in_object(
    obj: &ConfigValue,
    path: &Path,
) -> Result<(Option<ConfigValue>, Vec<ConfigValue>), ConfigError> {
    let mut parents = Vec::with_capacity(path.len());
    let mut current = obj.clone();
    let last = path.len() - 1;

    for (i, segment) in path.segments().iter().enumerate() {
        let value = current.peek(segment).map_err(|err| match err {
            ConfigError::NotResolved(message) => {
                ConfigError::NotResolved(format!("{message} (while looking up {path})"))
            }
            other => other,
        })?;
        parents.push(current.clone());

        if i == last {
            return Ok((value, parents));
        }
        match value {
            Some(next) if next.is_object_like() => current = next,
            _ => return Ok((None, parents)),
        }
    }

    Ok((None, parents))
}

/// Swaps `old`, the innermost entry of `path`, and rebuilds each ancestor.
///
/// Returns the new chain, or `None` if nothing of it survives.
fn replace(
    path: &[ConfigValue],
    old: &ConfigValue,
    replacement: Option<&ConfigValue>,
) -> Result<Option<Vec<ConfigValue>>, ConfigError> {
    let Some((child, rest)) = path.split_last() else {
        return Ok(None);
    };
    if !child.same_instance(old) {
        return Err(ConfigError::BugOrBroken(format!(
            "can only replace the innermost parent; {old:?} is not {child:?}"
        )));
    }
    let parent = rest.last();

    match replacement.filter(|r| r.is_container()) {
        // The child leaves the chain of containers, but its parent still gets the replacement.
        None => match parent {
            None => Ok(None),
            Some(parent) => {
                let new_parent = parent.replace_child(old, replacement);
                replace(rest, parent, Some(&new_parent))
            }
        },
        Some(container) => match parent {
            None => Ok(Some(vec![container.clone()])),
            Some(parent) => {
                let new_parent = parent.replace_child(old, Some(container));
                let mut new_path = replace(rest, parent, Some(&new_parent))?.unwrap_or_default();
                new_path.push(container.clone());
                Ok(Some(new_path))
            }
        },
    }
}
