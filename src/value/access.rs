//! Child lookup and child replacement on container values.

use std::collections::BTreeMap;

use super::{ConfigList, ConfigObject, ConfigValue, ValueKind};
use crate::{ConfigError, Origin, Path};

impl ConfigValue {
    /// Looks up `key` in an object-like value without resolving it.
    ///
    /// On a delayed merge of objects, the layers are searched from the top
    /// and merged while they keep accepting fallbacks. A layer that is
    /// still a substitution might hide or provide the key, so reaching one
    /// fails with `NotResolved`.
    pub(crate) fn peek(&self, key: &str) -> Result<Option<ConfigValue>, ConfigError> {
        match self.kind() {
            ValueKind::Object(obj) => Ok(obj.get(key).cloned()),
            ValueKind::DelayedMergeObject(stack) => peek_layers(self, stack, key),
            _ => Ok(None),
        }
    }

    /// Walks `path` through nested objects without resolving anything.
    pub(crate) fn peek_path(&self, path: &Path) -> Result<Option<ConfigValue>, ConfigError> {
        let mut current = self.clone();
        for segment in path.segments() {
            if !current.is_object_like() {
                return Ok(None);
            }
            match current.peek(segment)? {
                Some(next) => current = next,
                None => return Ok(None),
            }
        }
        Ok(Some(current))
    }

    /// A copy with the direct child `child` swapped for `replacement`.
    ///
    /// `None` removes the child. Values that are not containers, or that
    /// do not hold `child`, come back unchanged.
    pub(crate) fn replace_child(
        &self,
        child: &ConfigValue,
        replacement: Option<&ConfigValue>,
    ) -> ConfigValue {
        let origin = self.origin().clone();
        match self.kind() {
            ValueKind::Object(obj) => {
                let Some(key) = obj
                    .fields
                    .iter()
                    .find(|(_, v)| v.same_instance(child))
                    .map(|(k, _)| k.clone())
                else {
                    return self.clone();
                };
                let mut fields = obj.fields.clone();
                match replacement {
                    Some(value) => {
                        fields.insert(key, value.clone());
                    }
                    None => {
                        fields.remove(&key);
                    }
                }
                ConfigValue::new(
                    origin,
                    ValueKind::Object(ConfigObject::new(fields, obj.ignores_fallbacks)),
                )
            }
            ValueKind::List(list) => match replace_in_list(&list.items, child, replacement) {
                Some(items) => ConfigValue::new(origin, ValueKind::List(ConfigList::new(items))),
                None => self.clone(),
            },
            ValueKind::Concatenation(pieces) => match replace_in_list(pieces, child, replacement) {
                Some(pieces) if pieces.len() > 1 => {
                    ConfigValue::new(origin, ValueKind::Concatenation(pieces))
                }
                Some(mut pieces) if pieces.len() == 1 => pieces.remove(0),
                Some(_) => ConfigValue::empty_object(origin),
                None => self.clone(),
            },
            ValueKind::DelayedMerge(stack) | ValueKind::DelayedMergeObject(stack) => {
                match replace_in_list(stack, child, replacement) {
                    Some(new_stack) if new_stack.is_empty() => ConfigValue::empty_object(origin),
                    Some(new_stack) => {
                        let flat: Vec<ConfigValue> =
                            new_stack.iter().flat_map(ConfigValue::unmerged_values).collect();
                        if flat.len() == 1 {
                            return flat.into_iter().next().unwrap_or_else(|| self.clone());
                        }
                        let object_like = flat[0].is_object_like();
                        let kind = if object_like {
                            ValueKind::DelayedMergeObject(flat)
                        } else {
                            ValueKind::DelayedMerge(flat)
                        };
                        ConfigValue::new(origin, kind)
                    }
                    None => self.clone(),
                }
            }
            _ => self.clone(),
        }
    }

    /// `value` if it is object-like, otherwise an empty object.
    pub(crate) fn root_must_be_object(value: Option<&ConfigValue>, origin: &Origin) -> ConfigValue {
        match value {
            Some(v) if v.is_object_like() => v.clone(),
            _ => ConfigValue::object(origin.clone(), BTreeMap::new()),
        }
    }
}

fn replace_in_list(
    items: &[ConfigValue],
    child: &ConfigValue,
    replacement: Option<&ConfigValue>,
) -> Option<Vec<ConfigValue>> {
    let index = items.iter().position(|v| v.same_instance(child))?;
    let mut replaced = items.to_vec();
    match replacement {
        Some(value) => replaced[index] = value.clone(),
        None => {
            replaced.remove(index);
        }
    }
    Some(replaced)
}

fn peek_layers(
    this: &ConfigValue,
    stack: &[ConfigValue],
    key: &str,
) -> Result<Option<ConfigValue>, ConfigError> {
    let mut found: Option<ConfigValue> = None;

    for layer in stack {
        if let Some(value) = &found {
            if value.ignores_fallbacks() {
                break;
            }
        }

        match layer.kind() {
            ValueKind::Object(obj) => {
                if let Some(value) = obj.get(key) {
                    found = Some(match found {
                        Some(above) => above.with_fallback(value),
                        None => value.clone(),
                    });
                }
            }
            _ if layer.is_unmergeable() => {
                return Err(ConfigError::NotResolved(format!(
                    "key '{key}' is not available at '{}' because the value at '{}' has not been \
                     resolved and may turn out to contain or hide '{key}'; resolve the \
                     configuration before using it",
                    this.origin(),
                    layer.origin()
                )));
            }
            // A non-object layer has no children and ends the search.
            _ => break,
        }
    }

    Ok(found)
}
