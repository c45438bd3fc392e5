//! Per-pass resolution state.

use std::collections::{HashMap, HashSet};

use super::memo::{MemoKey, ValueId};
use super::source::{find_in_object, ResolveSource};
use super::{Cycle, Interrupt, ResolveOptions, Step};
use crate::value::ValueKind;
use crate::{ConfigError, ConfigValue, Path};

/// Mutable state owned by exactly one resolution pass.
///
/// The restriction is swapped in and out around recursive calls with
/// [`with_restriction`](Self::with_restriction); the trace and cycle
/// markers are pushed and popped around each call, whatever its outcome.
#[derive(Debug)]
pub(crate) struct ResolveContext {
    options: ResolveOptions,
    restrict_to_child: Option<Path>,
    memos: HashMap<MemoKey, ConfigValue>,
    /// References whose lookup is in progress.
    cycle_markers: HashSet<ValueId>,
    /// Values being resolved, outermost first.
    trace: Vec<ConfigValue>,
}

impl ResolveContext {
    pub(crate) fn new(options: ResolveOptions) -> Self {
        Self {
            options,
            restrict_to_child: None,
            memos: HashMap::new(),
            cycle_markers: HashSet::new(),
            trace: Vec::new(),
        }
    }

    pub(crate) fn options(&self) -> &ResolveOptions {
        &self.options
    }

    pub(crate) fn restrict_to_child(&self) -> Option<&Path> {
        self.restrict_to_child.as_ref()
    }

    pub(crate) fn depth(&self) -> usize {
        self.trace.len()
    }

    /// Runs `f` with a different restriction, restoring the previous one afterwards.
    pub(crate) fn with_restriction<T>(
        &mut self,
        restriction: Option<Path>,
        f: impl FnOnce(&mut Self) -> T,
    ) -> T {
        let saved = std::mem::replace(&mut self.restrict_to_child, restriction);
        let result = f(self);
        self.restrict_to_child = saved;
        result
    }

    pub(crate) fn add_cycle_marker(&mut self, value: &ConfigValue) {
        self.cycle_markers.insert(ValueId::of(value));
    }

    pub(crate) fn remove_cycle_marker(&mut self, value: &ConfigValue) {
        self.cycle_markers.remove(&ValueId::of(value));
    }

    /// Resolves one value; `None` means it turned out to be absent.
    pub(crate) fn resolve(
        &mut self,
        original: &ConfigValue,
        source: &ResolveSource,
    ) -> Step<Option<ConfigValue>> {
        if original.is_resolved() {
            return Ok(Some(original.clone()));
        }

        self.trace.push(original.clone());
        let result = self.memoized_resolve(original, source);
        self.trace.pop();
        result
    }

    fn memoized_resolve(
        &mut self,
        original: &ConfigValue,
        source: &ResolveSource,
    ) -> Step<Option<ConfigValue>> {
        let full_key = MemoKey::new(original, None);
        if let Some(cached) = self.memos.get(&full_key) {
            return Ok(Some(cached.clone()));
        }

        // Without a full result, only the restricted child is worth computing.
        let restricted_key = self
            .restrict_to_child
            .clone()
            .map(|path| MemoKey::new(original, Some(path)));
        if let Some(cached) = restricted_key.as_ref().and_then(|key| self.memos.get(key)) {
            return Ok(Some(cached.clone()));
        }

        if self.cycle_markers.contains(&ValueId::of(original)) {
            tracing::trace!(depth = self.depth(), value = ?original, "cycle detected");
            return Err(Interrupt::NotPossibleToResolve(self.cycle_at(original)));
        }

        let resolved = self.resolve_variant(original, source)?;

        if let Some(value) = &resolved {
            if value.is_resolved() {
                self.memos.insert(full_key, value.clone());
            } else if let Some(key) = restricted_key {
                self.memos.insert(key, value.clone());
            } else if self.options.allow_unresolved() {
                self.memos.insert(full_key, value.clone());
            } else {
                return Err(ConfigError::BugOrBroken(format!(
                    "resolution did not produce a resolved value for {original:?}, got {value:?}"
                ))
                .into());
            }
        }

        Ok(resolved)
    }

    fn cycle_at(&self, original: &ConfigValue) -> Cycle {
        let mut chain: Vec<String> = self
            .trace
            .iter()
            .filter_map(|v| match v.kind() {
                ValueKind::Reference(subst) => Some(subst.to_string()),
                _ => None,
            })
            .collect();

        let (origin, path) = match original.kind() {
            ValueKind::Reference(subst) => {
                chain.push(subst.to_string());
                (original.origin().clone(), subst.path.clone())
            }
            _ => (original.origin().clone(), Path::key("<cycle>")),
        };

        Cycle {
            origin,
            path,
            trace: chain.join(" -> "),
        }
    }

    /// Resolves only what `path` needs, then the value at `path` in full.
    ///
    /// Ancestors of the child are resolved as far as the path requires;
    /// the child itself is then resolved unrestricted and written back
    /// into the returned tree. Everything else stays as it was.
    pub(crate) fn resolve_child_of_root(
        &mut self,
        value: &ConfigValue,
        source: &ResolveSource,
        path: &Path,
    ) -> Step<Option<ConfigValue>> {
        let partial = self.with_restriction(Some(path.clone()), |ctx| ctx.resolve(value, source))?;
        let Some(partial) = partial else {
            return Ok(None);
        };
        if !partial.is_object_like() {
            return Ok(Some(partial));
        }

        let (found, parents) = find_in_object(&partial, path)?;
        let Some(found) = found else {
            return Ok(Some(partial));
        };

        let chain = ResolveSource::with_parents(parents);
        // Lookups go to the real root; the chain only matters when the value is the root.
        let child_source = if value.same_instance(source.root()) {
            chain.clone()
        } else {
            ResolveSource::new(source.root().clone())
        };
        let resolved = self.with_restriction(None, |ctx| ctx.resolve(&found, &child_source))?;
        let written = chain.replace_within_current_parent(&found, resolved.as_ref())?;
        Ok(Some(written.root().clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::testing::*;

    #[test]
    fn test_state_is_restored_after_a_caught_cycle() {
        let shared = opt_subst("x");
        let mut context = ResolveContext::new(ResolveOptions::new());

        // x -> ${?y} -> back to `shared`: the cycle is caught and `shared` is absent.
        let looping = obj(vec![("x", opt_subst("y")), ("y", shared.clone())]);
        let looping_source = ResolveSource::new(looping);
        assert!(context.resolve(&shared, &looping_source).unwrap().is_none());
        assert_eq!(context.depth(), 0);
        assert!(context.cycle_markers.is_empty());

        // The same node must resolve normally afterwards.
        let source = ResolveSource::new(obj(vec![("x", int(5))]));
        assert_eq!(context.resolve(&shared, &source).unwrap(), Some(int(5)));
        assert_eq!(context.depth(), 0);
        assert!(context.cycle_markers.is_empty());
    }
}
