//! Fallback merging between values.
//!
//! `a.with_fallback(b)` keeps everything `a` says and lets `b` fill the
//! gaps. Objects merge key by key; a concrete non-object settles the
//! outcome on its own. When either side still holds substitutions the
//! answer cannot be known yet, so the two are stacked into a delayed merge
//! that resolution folds later.

use std::collections::BTreeMap;

use super::{ConfigObject, ConfigValue, ValueKind};
use crate::origin::merge_origins;

impl ConfigValue {
    /// Returns a value where `self` wins and `fallback` fills in what `self` lacks.
    pub fn with_fallback(&self, fallback: &ConfigValue) -> ConfigValue {
        if self.ignores_fallbacks() {
            return self.clone();
        }

        if fallback.is_unmergeable() {
            self.merged_with_unmergeable(fallback)
        } else if let ValueKind::Object(fallback_obj) = fallback.kind() {
            self.merged_with_object(fallback, fallback_obj)
        } else {
            self.merged_with_non_object(fallback)
        }
    }

    /// The stack entries this value contributes to a delayed merge.
    pub(crate) fn unmerged_values(&self) -> Vec<ConfigValue> {
        match self.kind() {
            ValueKind::DelayedMerge(stack) | ValueKind::DelayedMergeObject(stack) => stack.clone(),
            _ => vec![self.clone()],
        }
    }

    fn merged_with_unmergeable(&self, fallback: &ConfigValue) -> ConfigValue {
        let mut stack = self.unmerged_values();
        stack.extend(fallback.unmerged_values());
        self.construct_delayed_merge(stack)
    }

    fn merged_with_object(&self, fallback: &ConfigValue, fallback_obj: &ConfigObject) -> ConfigValue {
        match self.kind() {
            ValueKind::Object(obj) => merge_objects(self, obj, fallback, fallback_obj),
            _ => self.merged_with_non_object(fallback),
        }
    }

    fn merged_with_non_object(&self, fallback: &ConfigValue) -> ConfigValue {
        if self.is_resolved() {
            // Falling back to a non-object adds nothing and blocks any later object merge.
            self.with_fallbacks_ignored()
        } else {
            let mut stack = self.unmerged_values();
            stack.push(fallback.clone());
            self.construct_delayed_merge(stack)
        }
    }

    fn with_fallbacks_ignored(&self) -> ConfigValue {
        match self.kind() {
            ValueKind::Object(obj) if !obj.ignores_fallbacks => ConfigValue::new(
                self.origin().clone(),
                ValueKind::Object(ConfigObject::new(obj.fields.clone(), true)),
            ),
            _ => self.clone(),
        }
    }

    /// Stacks built here are flat by construction.
    pub(crate) fn construct_delayed_merge(&self, stack: Vec<ConfigValue>) -> ConfigValue {
        let origin = merge_origins(stack.iter().map(ConfigValue::origin))
            .unwrap_or_else(|| self.origin().clone());
        if self.is_object_like() {
            ConfigValue::new(origin, ValueKind::DelayedMergeObject(stack))
        } else {
            ConfigValue::new(origin, ValueKind::DelayedMerge(stack))
        }
    }
}

fn merge_objects(
    this: &ConfigValue,
    obj: &ConfigObject,
    fallback: &ConfigValue,
    fallback_obj: &ConfigObject,
) -> ConfigValue {
    let mut merged = BTreeMap::new();
    let mut changed = false;

    for (key, first) in &obj.fields {
        let kept = match fallback_obj.fields.get(key) {
            Some(second) => first.with_fallback(second),
            None => first.clone(),
        };
        if !kept.same_instance(first) {
            changed = true;
        }
        merged.insert(key.clone(), kept);
    }
    for (key, second) in &fallback_obj.fields {
        if !obj.fields.contains_key(key) {
            changed = true;
            merged.insert(key.clone(), second.clone());
        }
    }

    let ignores_fallbacks = fallback_obj.ignores_fallbacks;
    if changed {
        let origin = merge_origins([this.origin(), fallback.origin()])
            .unwrap_or_else(|| this.origin().clone());
        ConfigValue::new(
            origin,
            ValueKind::Object(ConfigObject::new(merged, ignores_fallbacks)),
        )
    } else if ignores_fallbacks != obj.ignores_fallbacks {
        ConfigValue::new(
            this.origin().clone(),
            ValueKind::Object(ConfigObject::new(obj.fields.clone(), ignores_fallbacks)),
        )
    } else {
        this.clone()
    }
}
