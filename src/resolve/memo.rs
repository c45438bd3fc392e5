//! Identity-keyed cache entries for one resolution pass.

use std::hash::{Hash, Hasher};

use crate::{ConfigValue, Path};

/// A value compared and hashed by node identity rather than structure.
///
/// Holding the handle keeps the node alive, so its address cannot be
/// reused by another node while the key exists.
#[derive(Debug, Clone)]
pub(crate) struct ValueId(ConfigValue);

impl ValueId {
    pub(crate) fn of(value: &ConfigValue) -> Self {
        Self(value.clone())
    }
}

impl PartialEq for ValueId {
    fn eq(&self, other: &Self) -> bool {
        self.0.same_instance(&other.0)
    }
}

impl Eq for ValueId {}

impl Hash for ValueId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.identity().hash(state);
    }
}

/// A node plus the child path resolution was restricted to, if any.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct MemoKey {
    value: ValueId,
    restrict_to_child: Option<Path>,
}

impl MemoKey {
    pub(crate) fn new(value: &ConfigValue, restrict_to_child: Option<Path>) -> Self {
        Self {
            value: ValueId::of(value),
            restrict_to_child,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::value::testing::*;

    #[test]
    fn test_keys_use_identity() {
        let a = int(1);
        let b = int(1);
        assert_eq!(MemoKey::new(&a, None), MemoKey::new(&a.clone(), None));
        assert_ne!(MemoKey::new(&a, None), MemoKey::new(&b, None));
    }

    #[test]
    fn test_restriction_must_match() {
        let a = obj(vec![]);
        let path = Path::parse("x.y").unwrap();
        assert_ne!(MemoKey::new(&a, None), MemoKey::new(&a, Some(path.clone())));
        assert_eq!(
            MemoKey::new(&a, Some(path.clone())),
            MemoKey::new(&a, Some(Path::parse("x.y").unwrap()))
        );

        let mut memos = HashMap::new();
        memos.insert(MemoKey::new(&a, Some(path)), int(5));
        assert!(memos.get(&MemoKey::new(&a, None)).is_none());
    }
}
