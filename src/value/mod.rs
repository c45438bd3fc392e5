//! The configuration value tree.
//!
//! A [`ConfigValue`] is a cheap, reference-counted handle to an immutable
//! node. Every "change" (resolving a substitution, merging two values)
//! builds new nodes and shares untouched children, so the handle's pointer
//! doubles as the node's identity for memoization and cycle detection.
//!
//! Besides the concrete variants (null, booleans, numbers, strings,
//! objects and lists) a tree may hold placeholders that only resolution
//! removes:
//!
//! - [`ValueKind::Reference`]: `${path}` or `${?path}`
//! - [`ValueKind::Concatenation`]: pieces joined once they are concrete
//! - [`ValueKind::DelayedMerge`] / [`ValueKind::DelayedMergeObject`]:
//!   a stack of alternatives, highest priority first

mod access;
mod merge;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::{ConfigError, Origin, Path};

/// The concrete type of a resolved value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    Null,
    Boolean,
    Number,
    String,
    Object,
    List,
}

impl ValueType {
    pub fn name(self) -> &'static str {
        match self {
            ValueType::Null => "null",
            ValueType::Boolean => "boolean",
            ValueType::Number => "number",
            ValueType::String => "string",
            ValueType::Object => "object",
            ValueType::List => "list",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum NumberValue {
    Int(i64),
    Float(f64),
}

/// A number together with the text it was written as, if any.
#[derive(Debug, Clone)]
pub struct Number {
    value: NumberValue,
    text: Option<String>,
}

impl Number {
    pub fn int(value: i64) -> Self {
        Self {
            value: NumberValue::Int(value),
            text: None,
        }
    }

    pub fn float(value: f64) -> Self {
        Self {
            value: NumberValue::Float(value),
            text: None,
        }
    }

    pub fn with_text(self, text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..self
        }
    }

    pub fn value(&self) -> NumberValue {
        self.value
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self.value {
            NumberValue::Int(i) => Some(i),
            NumberValue::Float(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => {
                Some(f as i64)
            }
            NumberValue::Float(_) => None,
        }
    }

    pub fn as_f64(&self) -> f64 {
        match self.value {
            NumberValue::Int(i) => i as f64,
            NumberValue::Float(f) => f,
        }
    }

    /// The original text, or a canonical rendering.
    pub fn render(&self) -> String {
        if let Some(text) = &self.text {
            return text.clone();
        }
        match self.value {
            NumberValue::Int(i) => i.to_string(),
            NumberValue::Float(f) => f.to_string(),
        }
    }
}

impl PartialEq for Number {
    fn eq(&self, other: &Self) -> bool {
        match (self.value, other.value) {
            (NumberValue::Int(a), NumberValue::Int(b)) => a == b,
            _ => self.as_f64() == other.as_f64(),
        }
    }
}

/// The target of a substitution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Substitution {
    pub path: Path,
    pub optional: bool,
}

impl fmt::Display for Substitution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.optional {
            write!(f, "${{?{}}}", self.path)
        } else {
            write!(f, "${{{}}}", self.path)
        }
    }
}

/// Fields of an object value, in key order.
#[derive(Clone)]
pub struct ConfigObject {
    fields: BTreeMap<String, ConfigValue>,
    resolved: bool,
    ignores_fallbacks: bool,
}

impl ConfigObject {
    pub(crate) fn new(fields: BTreeMap<String, ConfigValue>, ignores_fallbacks: bool) -> Self {
        let resolved = fields.values().all(ConfigValue::is_resolved);
        Self {
            fields,
            resolved,
            ignores_fallbacks,
        }
    }

    pub fn get(&self, key: &str) -> Option<&ConfigValue> {
        self.fields.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ConfigValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub(crate) fn fields(&self) -> &BTreeMap<String, ConfigValue> {
        &self.fields
    }

    pub(crate) fn ignores_fallbacks(&self) -> bool {
        self.ignores_fallbacks
    }
}

impl PartialEq for ConfigObject {
    fn eq(&self, other: &Self) -> bool {
        self.fields == other.fields
    }
}

impl fmt::Debug for ConfigObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.fields.iter()).finish()
    }
}

#[derive(Clone)]
pub struct ConfigList {
    items: Vec<ConfigValue>,
    resolved: bool,
}

impl ConfigList {
    pub(crate) fn new(items: Vec<ConfigValue>) -> Self {
        let resolved = items.iter().all(ConfigValue::is_resolved);
        Self { items, resolved }
    }

    pub fn items(&self) -> &[ConfigValue] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl PartialEq for ConfigList {
    fn eq(&self, other: &Self) -> bool {
        self.items == other.items
    }
}

impl fmt::Debug for ConfigList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.items.iter()).finish()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ValueKind {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    Object(ConfigObject),
    List(ConfigList),
    Reference(Substitution),
    Concatenation(Vec<ConfigValue>),
    /// Alternatives for one setting, highest priority first.
    DelayedMerge(Vec<ConfigValue>),
    /// Like `DelayedMerge`, but known to resolve to an object.
    DelayedMergeObject(Vec<ConfigValue>),
}

struct Node {
    origin: Origin,
    kind: ValueKind,
}

/// A node of the configuration tree.
///
/// Cloning is cheap and preserves identity: [`same_instance`](Self::same_instance)
/// holds between a value and its clones. `==` compares structure and
/// ignores origins.
#[derive(Clone)]
pub struct ConfigValue {
    node: Arc<Node>,
}

impl ConfigValue {
    pub(crate) fn new(origin: Origin, kind: ValueKind) -> Self {
        Self {
            node: Arc::new(Node { origin, kind }),
        }
    }

    pub fn null(origin: Origin) -> Self {
        Self::new(origin, ValueKind::Null)
    }

    pub fn bool(origin: Origin, value: bool) -> Self {
        Self::new(origin, ValueKind::Bool(value))
    }

    pub fn int(origin: Origin, value: i64) -> Self {
        Self::new(origin, ValueKind::Number(Number::int(value)))
    }

    pub fn float(origin: Origin, value: f64) -> Self {
        Self::new(origin, ValueKind::Number(Number::float(value)))
    }

    pub fn number(origin: Origin, number: Number) -> Self {
        Self::new(origin, ValueKind::Number(number))
    }

    pub fn string(origin: Origin, value: impl Into<String>) -> Self {
        Self::new(origin, ValueKind::String(value.into()))
    }

    pub fn object(origin: Origin, fields: BTreeMap<String, ConfigValue>) -> Self {
        Self::new(origin, ValueKind::Object(ConfigObject::new(fields, false)))
    }

    pub fn empty_object(origin: Origin) -> Self {
        Self::object(origin, BTreeMap::new())
    }

    pub fn list(origin: Origin, items: Vec<ConfigValue>) -> Self {
        Self::new(origin, ValueKind::List(ConfigList::new(items)))
    }

    pub fn reference(origin: Origin, path: Path, optional: bool) -> Self {
        Self::new(origin, ValueKind::Reference(Substitution { path, optional }))
    }

    /// Joins pieces that resolve into one value.
    ///
    /// Nested concatenations are flattened; a single remaining piece is
    /// returned as-is.
    pub fn concatenation(origin: Origin, pieces: Vec<ConfigValue>) -> Result<Self, ConfigError> {
        let mut flat = Vec::with_capacity(pieces.len());
        for piece in pieces {
            match piece.kind() {
                ValueKind::Concatenation(inner) => flat.extend(inner.iter().cloned()),
                _ => flat.push(piece),
            }
        }
        match flat.len() {
            0 => Err(ConfigError::BugOrBroken(
                "created a concatenation with no pieces".into(),
            )),
            1 => Ok(flat.remove(0)),
            _ => Ok(Self::new(origin, ValueKind::Concatenation(flat))),
        }
    }

    /// A stack of alternatives, highest priority first.
    ///
    /// The stack must be non-empty and must not directly contain another
    /// delayed merge.
    pub fn delayed_merge(origin: Origin, stack: Vec<ConfigValue>) -> Result<Self, ConfigError> {
        check_stack(&stack)?;
        Ok(Self::new(origin, ValueKind::DelayedMerge(stack)))
    }

    /// Like [`delayed_merge`](Self::delayed_merge), for stacks that produce an object.
    pub fn delayed_merge_object(
        origin: Origin,
        stack: Vec<ConfigValue>,
    ) -> Result<Self, ConfigError> {
        check_stack(&stack)?;
        if !stack[0].is_object_like() {
            return Err(ConfigError::BugOrBroken(
                "delayed merge object must have an object on top of its stack".into(),
            ));
        }
        Ok(Self::new(origin, ValueKind::DelayedMergeObject(stack)))
    }

    pub fn origin(&self) -> &Origin {
        &self.node.origin
    }

    pub fn kind(&self) -> &ValueKind {
        &self.node.kind
    }

    /// Same value with a different origin.
    pub fn with_origin(&self, origin: Origin) -> Self {
        Self::new(origin, self.kind().clone())
    }

    /// True if both handles point at the same node.
    pub fn same_instance(&self, other: &ConfigValue) -> bool {
        Arc::ptr_eq(&self.node, &other.node)
    }

    pub(crate) fn identity(&self) -> usize {
        Arc::as_ptr(&self.node) as usize
    }

    /// False while the value or anything beneath it still needs resolving.
    pub fn is_resolved(&self) -> bool {
        match self.kind() {
            ValueKind::Object(obj) => obj.resolved,
            ValueKind::List(list) => list.resolved,
            ValueKind::Reference(_)
            | ValueKind::Concatenation(_)
            | ValueKind::DelayedMerge(_)
            | ValueKind::DelayedMergeObject(_) => false,
            _ => true,
        }
    }

    /// True if merging anything beneath this value cannot change it.
    pub fn ignores_fallbacks(&self) -> bool {
        match self.kind() {
            ValueKind::Object(obj) => obj.ignores_fallbacks,
            // A self-reference may need to look further down the stack.
            ValueKind::Reference(_) | ValueKind::Concatenation(_) => false,
            ValueKind::DelayedMerge(stack) | ValueKind::DelayedMergeObject(stack) => {
                stack.last().is_some_and(ConfigValue::ignores_fallbacks)
            }
            _ => self.is_resolved(),
        }
    }

    /// Values that cannot be merged until resolved.
    pub(crate) fn is_unmergeable(&self) -> bool {
        matches!(
            self.kind(),
            ValueKind::Reference(_)
                | ValueKind::Concatenation(_)
                | ValueKind::DelayedMerge(_)
                | ValueKind::DelayedMergeObject(_)
        )
    }

    pub(crate) fn is_delayed_merge(&self) -> bool {
        matches!(
            self.kind(),
            ValueKind::DelayedMerge(_) | ValueKind::DelayedMergeObject(_)
        )
    }

    /// Objects, resolved or still being merged.
    pub(crate) fn is_object_like(&self) -> bool {
        matches!(
            self.kind(),
            ValueKind::Object(_) | ValueKind::DelayedMergeObject(_)
        )
    }

    /// Values with children that a resolve source can walk through.
    pub(crate) fn is_container(&self) -> bool {
        matches!(
            self.kind(),
            ValueKind::Object(_)
                | ValueKind::List(_)
                | ValueKind::Concatenation(_)
                | ValueKind::DelayedMerge(_)
                | ValueKind::DelayedMergeObject(_)
        )
    }

    /// The concrete type; fails with `NotResolved` on placeholders.
    pub fn value_type(&self) -> Result<ValueType, ConfigError> {
        match self.kind() {
            ValueKind::Null => Ok(ValueType::Null),
            ValueKind::Bool(_) => Ok(ValueType::Boolean),
            ValueKind::Number(_) => Ok(ValueType::Number),
            ValueKind::String(_) => Ok(ValueType::String),
            ValueKind::Object(_) => Ok(ValueType::Object),
            ValueKind::List(_) => Ok(ValueType::List),
            _ => Err(ConfigError::NotResolved(format!(
                "value at {} has unresolved substitutions; resolve the configuration first",
                self.origin()
            ))),
        }
    }

    pub fn as_object(&self) -> Option<&ConfigObject> {
        match self.kind() {
            ValueKind::Object(obj) => Some(obj),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&ConfigList> {
        match self.kind() {
            ValueKind::List(list) => Some(list),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self.kind() {
            ValueKind::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self.kind() {
            ValueKind::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<&Number> {
        match self.kind() {
            ValueKind::Number(n) => Some(n),
            _ => None,
        }
    }

    /// Text form of a scalar, as used when concatenating; `None` for anything else.
    pub(crate) fn render_scalar(&self) -> Option<String> {
        match self.kind() {
            ValueKind::Null => Some("null".into()),
            ValueKind::Bool(b) => Some(b.to_string()),
            ValueKind::Number(n) => Some(n.render()),
            ValueKind::String(s) => Some(s.clone()),
            _ => None,
        }
    }
}

fn check_stack(stack: &[ConfigValue]) -> Result<(), ConfigError> {
    if stack.is_empty() {
        return Err(ConfigError::BugOrBroken(
            "creating an empty delayed merge".into(),
        ));
    }
    if stack.iter().any(ConfigValue::is_delayed_merge) {
        return Err(ConfigError::BugOrBroken(
            "placed a nested delayed merge in a merge stack; the stack should have been flattened"
                .into(),
        ));
    }
    Ok(())
}

impl PartialEq for ConfigValue {
    fn eq(&self, other: &Self) -> bool {
        self.same_instance(other) || self.kind() == other.kind()
    }
}

impl fmt::Debug for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind() {
            ValueKind::Null => f.write_str("null"),
            ValueKind::Bool(b) => write!(f, "{b}"),
            ValueKind::Number(n) => f.write_str(&n.render()),
            ValueKind::String(s) => write!(f, "{s:?}"),
            ValueKind::Object(obj) => obj.fmt(f),
            ValueKind::List(list) => list.fmt(f),
            ValueKind::Reference(subst) => write!(f, "{subst}"),
            ValueKind::Concatenation(pieces) => {
                f.debug_tuple("Concatenation").field(pieces).finish()
            }
            ValueKind::DelayedMerge(stack) => f.debug_tuple("DelayedMerge").field(stack).finish(),
            ValueKind::DelayedMergeObject(stack) => {
                f.debug_tuple("DelayedMergeObject").field(stack).finish()
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Terse builders for tests.

    use super::*;

    pub fn origin() -> Origin {
        Origin::new("test")
    }

    pub fn int(i: i64) -> ConfigValue {
        ConfigValue::int(origin(), i)
    }

    pub fn string(s: &str) -> ConfigValue {
        ConfigValue::string(origin(), s)
    }

    pub fn obj(fields: Vec<(&str, ConfigValue)>) -> ConfigValue {
        ConfigValue::object(
            origin(),
            fields.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
        )
    }

    pub fn list(items: Vec<ConfigValue>) -> ConfigValue {
        ConfigValue::list(origin(), items)
    }

    pub fn subst(path: &str) -> ConfigValue {
        ConfigValue::reference(origin(), Path::parse(path).unwrap(), false)
    }

    pub fn opt_subst(path: &str) -> ConfigValue {
        ConfigValue::reference(origin(), Path::parse(path).unwrap(), true)
    }

    pub fn concat(pieces: Vec<ConfigValue>) -> ConfigValue {
        ConfigValue::concatenation(origin(), pieces).unwrap()
    }
}
