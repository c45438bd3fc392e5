//! Resolution of each value variant.

use std::collections::BTreeMap;

use super::context::ResolveContext;
use super::source::ResolveSource;
use super::{Interrupt, Step};
use crate::origin::merge_origins;
use crate::value::{ConfigList, ConfigObject, Substitution, ValueKind};
use crate::{ConfigError, ConfigValue};

impl ResolveContext {
    pub(super) fn resolve_variant(
        &mut self,
        original: &ConfigValue,
        source: &ResolveSource,
    ) -> Step<Option<ConfigValue>> {
        tracing::trace!(
            depth = self.depth(),
            variant = variant_name(original),
            origin = %original.origin(),
            restrict_to_child = ?self.restrict_to_child(),
            "resolving"
        );

        match original.kind() {
            ValueKind::Object(obj) => self.resolve_object(original, obj, source).map(Some),
            ValueKind::List(list) => self.resolve_list(original, list, source).map(Some),
            ValueKind::Reference(subst) => self.resolve_reference(original, subst, source),
            ValueKind::Concatenation(pieces) => {
                self.resolve_concatenation(original, pieces, source)
            }
            ValueKind::DelayedMerge(stack) => self.resolve_delayed_merge(original, stack, source),
            ValueKind::DelayedMergeObject(stack) => {
                match self.resolve_delayed_merge(original, stack, source)? {
                    Some(merged) if !merged.is_object_like() => Err(ConfigError::BugOrBroken(
                        format!("delayed merge of objects resolved to a non-object: {merged:?}"),
                    )
                    .into()),
                    merged => Ok(merged),
                }
            }
            _ => Ok(Some(original.clone())),
        }
    }

    fn resolve_object(
        &mut self,
        original: &ConfigValue,
        obj: &ConfigObject,
        source: &ResolveSource,
    ) -> Step<ConfigValue> {
        let source = source.push_parent(original);
        let restriction = self.restrict_to_child().cloned();
        let mut fields = BTreeMap::new();
        let mut changed = false;

        for (key, child) in obj.iter() {
            let resolved = match &restriction {
                Some(path) if path.first() == key => match path.remainder() {
                    Some(rest) => {
                        self.with_restriction(Some(rest), |ctx| ctx.resolve(child, &source))?
                    }
                    // The target of a lookup is resolved by whoever looked it up.
                    None => Some(child.clone()),
                },
                Some(_) => Some(child.clone()),
                None => self.resolve(child, &source)?,
            };

            match resolved {
                Some(value) => {
                    changed |= !value.same_instance(child);
                    fields.insert(key.to_string(), value);
                }
                None => changed = true,
            }
        }

        if !changed {
            return Ok(original.clone());
        }
        Ok(ConfigValue::new(
            original.origin().clone(),
            ValueKind::Object(ConfigObject::new(fields, obj.ignores_fallbacks())),
        ))
    }

    fn resolve_list(
        &mut self,
        original: &ConfigValue,
        list: &ConfigList,
        source: &ResolveSource,
    ) -> Step<ConfigValue> {
        // No path leads into a list, so a restricted pass has nothing to do here.
        if self.restrict_to_child().is_some() {
            return Ok(original.clone());
        }

        let source = source.push_parent(original);
        let mut items = Vec::with_capacity(list.len());
        let mut changed = false;
        for item in list.items() {
            match self.resolve(item, &source)? {
                Some(value) => {
                    changed |= !value.same_instance(item);
                    items.push(value);
                }
                None => changed = true,
            }
        }

        if !changed {
            return Ok(original.clone());
        }
        Ok(ConfigValue::new(
            original.origin().clone(),
            ValueKind::List(ConfigList::new(items)),
        ))
    }

    fn resolve_reference(
        &mut self,
        original: &ConfigValue,
        subst: &Substitution,
        source: &ResolveSource,
    ) -> Step<Option<ConfigValue>> {
        self.add_cycle_marker(original);
        let outcome = self.lookup_and_resolve(subst, source);
        self.remove_cycle_marker(original);

        let cycle = match outcome {
            Ok(Some(value)) => return Ok(Some(value)),
            Ok(None) => None,
            Err(Interrupt::NotPossibleToResolve(cycle)) => {
                tracing::trace!(depth = self.depth(), %subst, trace = %cycle.trace, "part of a cycle");
                Some(cycle.trace)
            }
            Err(err) => return Err(err),
        };

        if subst.optional {
            Ok(None)
        } else if self.options().allow_unresolved() {
            Ok(Some(original.clone()))
        } else {
            Err(ConfigError::UnresolvedSubstitution {
                origin: original.origin().clone(),
                path: subst.path.clone(),
                cycle,
            }
            .into())
        }
    }

    fn lookup_and_resolve(
        &mut self,
        subst: &Substitution,
        source: &ResolveSource,
    ) -> Step<Option<ConfigValue>> {
        let (found, parents) = source.lookup(self, &subst.path)?;
        match found {
            Some(target) => {
                let target_source = ResolveSource::with_parents(parents);
                self.resolve(&target, &target_source)
            }
            None => Ok(None),
        }
    }

    fn resolve_concatenation(
        &mut self,
        original: &ConfigValue,
        pieces: &[ConfigValue],
        source: &ResolveSource,
    ) -> Step<Option<ConfigValue>> {
        let source = source.push_parent(original);
        let mut resolved = Vec::with_capacity(pieces.len());
        for piece in pieces {
            // Joining needs every piece in full.
            if let Some(value) = self.with_restriction(None, |ctx| ctx.resolve(piece, &source))? {
                resolved.push(value);
            }
        }

        let mut joined = consolidate(resolved)?;
        match joined.len() {
            // Only optional substitutions, none of them defined.
            0 => Ok(None),
            1 => Ok(joined.pop()),
            _ if self.options().allow_unresolved() => Ok(Some(ConfigValue::new(
                original.origin().clone(),
                ValueKind::Concatenation(joined),
            ))),
            _ => Err(ConfigError::BugOrBroken(format!(
                "resolved concatenation was joined to too many values: {joined:?}"
            ))
            .into()),
        }
    }

    fn resolve_delayed_merge(
        &mut self,
        original: &ConfigValue,
        stack: &[ConfigValue],
        source: &ResolveSource,
    ) -> Step<Option<ConfigValue>> {
        if let Some(nested) = stack.iter().find(|entry| entry.is_delayed_merge()) {
            return Err(ConfigError::BugOrBroken(format!(
                "a delayed merge should not contain another one: {nested:?}"
            ))
            .into());
        }

        tracing::trace!(depth = self.depth(), stack_size = stack.len(), "resolving merge stack");

        if let Some(appended) = self.resolve_append_chain(original, stack, source)? {
            return Ok(Some(appended));
        }
        self.resolve_merge_stack(original, stack, source)
    }

    /// Folds the stack from the top, stopping once the result ignores fallbacks.
    fn resolve_merge_stack(
        &mut self,
        original: &ConfigValue,
        stack: &[ConfigValue],
        source: &ResolveSource,
    ) -> Step<Option<ConfigValue>> {
        let mut merged: Option<ConfigValue> = None;

        for (i, entry) in stack.iter().enumerate() {
            let entry_source = if entry.is_unmergeable() {
                // A lookup that comes back through this stack must only see what lies below `entry`.
                let remainder = make_replacement(&stack[i + 1..]);
                source
                    .replace_within_current_parent(original, remainder.as_ref())?
                    .reset_parents()
            } else {
                source.push_parent(original)
            };

            let Some(resolved) = self.resolve(entry, &entry_source)? else {
                continue;
            };
            let accumulated = match merged {
                Some(above) => above.with_fallback(&resolved),
                None => resolved,
            };

            if accumulated.ignores_fallbacks() {
                tracing::trace!(
                    depth = self.depth(),
                    skipped = stack.len() - i - 1,
                    "merge stack settled"
                );
                return Ok(Some(accumulated));
            }
            merged = Some(accumulated);
        }

        Ok(merged)
    }

    /// Iterative fold of `x = ${x} [...]` accumulation chains.
    ///
    /// Only stacks whose top entries all append a concrete list to a
    /// reference to this same setting qualify. The entries below the chain
    /// are resolved the general way to get the base list, then each
    /// literal is appended from the bottom up. Returns `None` to hand
    /// anything else, including every failure case, to the general fold.
    fn resolve_append_chain(
        &mut self,
        original: &ConfigValue,
        stack: &[ConfigValue],
        source: &ResolveSource,
    ) -> Step<Option<ConfigValue>> {
        let chain: Vec<(&Substitution, &ConfigList)> =
            stack.iter().map_while(append_entry).collect();
        if chain.len() < 2 {
            return Ok(None);
        }

        let path = &chain[0].0.path;
        if chain.iter().any(|(subst, _)| subst.path != *path) {
            return Ok(None);
        }
        if source.path_to(original).as_ref() != Some(path) {
            return Ok(None);
        }

        let below = make_replacement(&stack[chain.len()..]);
        let below_source = source
            .replace_within_current_parent(original, below.as_ref())?
            .reset_parents();
        let base = match self.lookup_and_resolve(chain[chain.len() - 1].0, &below_source) {
            Ok(base) => base,
            Err(Interrupt::NotPossibleToResolve(_)) => return Ok(None),
            Err(err) => return Err(err),
        };

        let mut items = match base {
            Some(base) => match base.as_list() {
                Some(list) if base.is_resolved() => list.items().to_vec(),
                _ => return Ok(None),
            },
            None if chain[chain.len() - 1].0.optional => Vec::new(),
            None => return Ok(None),
        };
        for (_, literal) in chain.iter().rev() {
            items.extend(literal.items().iter().cloned());
        }

        tracing::trace!(depth = self.depth(), entries = chain.len(), %path, "folded append chain");
        Ok(Some(ConfigValue::new(
            original.origin().clone(),
            ValueKind::List(ConfigList::new(items)),
        )))
    }
}

/// Matches `${path} [concrete, list]`.
fn append_entry(entry: &ConfigValue) -> Option<(&Substitution, &ConfigList)> {
    let ValueKind::Concatenation(pieces) = entry.kind() else {
        return None;
    };
    match pieces.as_slice() {
        [reference, literal] if literal.is_resolved() => {
            match (reference.kind(), literal.kind()) {
                (ValueKind::Reference(subst), ValueKind::List(list)) => Some((subst, list)),
                _ => None,
            }
        }
        _ => None,
    }
}

/// The merge of `stack`, or `None` if it is empty.
fn make_replacement(stack: &[ConfigValue]) -> Option<ConfigValue> {
    let (first, rest) = stack.split_first()?;
    Some(
        rest.iter()
            .fold(first.clone(), |merged, entry| merged.with_fallback(entry)),
    )
}

/// Joins adjacent resolved pieces; unresolved pieces stay separate.
fn consolidate(pieces: Vec<ConfigValue>) -> Result<Vec<ConfigValue>, ConfigError> {
    if pieces.len() < 2 {
        return Ok(pieces);
    }

    let mut joined: Vec<ConfigValue> = Vec::with_capacity(pieces.len());
    let flattened = pieces.into_iter().flat_map(|piece| match piece.kind() {
        ValueKind::Concatenation(inner) => inner.clone(),
        _ => vec![piece.clone()],
    });
    for right in flattened {
        match joined.pop() {
            None => joined.push(right),
            Some(left) => match join(&left, &right)? {
                Some(value) => joined.push(value),
                None => {
                    joined.push(left);
                    joined.push(right);
                }
            },
        }
    }
    Ok(joined)
}

fn join(left: &ConfigValue, right: &ConfigValue) -> Result<Option<ConfigValue>, ConfigError> {
    if left.is_object_like() && right.is_object_like() {
        return Ok(Some(right.with_fallback(left)));
    }

    match (left.kind(), right.kind()) {
        (ValueKind::List(l), ValueKind::List(r)) => {
            let items = l.items().iter().chain(r.items()).cloned().collect();
            let origin = merge_origins([left.origin(), right.origin()])
                .unwrap_or_else(|| left.origin().clone());
            Ok(Some(ConfigValue::new(
                origin,
                ValueKind::List(ConfigList::new(items)),
            )))
        }
        _ if left.is_unmergeable() || right.is_unmergeable() => Ok(None),
        _ => match (left.render_scalar(), right.render_scalar()) {
            (Some(l), Some(r)) => {
                let origin = merge_origins([left.origin(), right.origin()])
                    .unwrap_or_else(|| left.origin().clone());
                Ok(Some(ConfigValue::string(origin, l + &r)))
            }
            _ => Err(ConfigError::BadValue {
                origin: left.origin().clone(),
                message: format!(
                    "cannot concatenate object or list with a non-object-or-list, {left:?} and \
                     {right:?} are not compatible"
                ),
            }),
        },
    }
}

fn variant_name(value: &ConfigValue) -> &'static str {
    match value.kind() {
        ValueKind::Null => "null",
        ValueKind::Bool(_) => "bool",
        ValueKind::Number(_) => "number",
        ValueKind::String(_) => "string",
        ValueKind::Object(_) => "object",
        ValueKind::List(_) => "list",
        ValueKind::Reference(_) => "reference",
        ValueKind::Concatenation(_) => "concatenation",
        ValueKind::DelayedMerge(_) => "delayed merge",
        ValueKind::DelayedMergeObject(_) => "delayed merge object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::testing::*;

    #[test]
    fn test_join_scalars_as_text() {
        let joined = consolidate(vec![string("port "), int(80), string(" on")]).unwrap();
        assert_eq!(joined, vec![string("port 80 on")]);
    }

    #[test]
    fn test_join_objects_later_piece_wins() {
        let joined = consolidate(vec![
            obj(vec![("a", int(1)), ("b", int(1))]),
            obj(vec![("b", int(2))]),
        ])
        .unwrap();
        assert_eq!(joined, vec![obj(vec![("a", int(1)), ("b", int(2))])]);
    }

    #[test]
    fn test_unresolved_pieces_stay_separate() {
        let joined = consolidate(vec![string("a"), subst("x"), string("b")]).unwrap();
        assert_eq!(joined.len(), 3);
    }

    #[test]
    fn test_list_and_scalar_do_not_join() {
        let err = consolidate(vec![list(vec![int(1)]), string("x")]).unwrap_err();
        assert!(matches!(err, ConfigError::BadValue { .. }));
    }

    #[test]
    fn test_append_entry_shape() {
        assert!(append_entry(&concat(vec![subst("x"), list(vec![int(1)])])).is_some());
        assert!(append_entry(&concat(vec![list(vec![int(1)]), subst("x")])).is_none());
        assert!(append_entry(&concat(vec![subst("x"), list(vec![subst("y")])])).is_none());
        assert!(append_entry(&list(vec![int(1)])).is_none());
    }

    #[test]
    fn test_make_replacement() {
        assert!(make_replacement(&[]).is_none());
        let single = int(1);
        assert!(make_replacement(&[single.clone()]).unwrap().same_instance(&single));
        assert_eq!(
            make_replacement(&[obj(vec![("a", int(1))]), obj(vec![("b", int(2))])]),
            Some(obj(vec![("a", int(1)), ("b", int(2))]))
        );
    }
}
