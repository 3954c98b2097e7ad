use std::fmt;

/// Composite lock identifier: `"<namespace>_<store>"` for a store lock,
/// `"<namespace>_<store>_<key>"` for a key lock.
///
/// The store segment is escaped (`%` as `%25`, `_` as `%5F`) so it never
/// contains `_`. Within one namespace a store identifier therefore never
/// equals a key identifier, and key identifiers of different stores never
/// collide.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LockId(String);

impl LockId {
    /// Identifier of the store-level lock.
    pub fn store(namespace: &str, store: &str) -> Self {
        Self(format!("{namespace}_{}", escape_segment(store)))
    }

    /// Identifier of the lock for one key in a store.
    pub fn key(namespace: &str, store: &str, key: &str) -> Self {
        Self(format!("{namespace}_{}_{key}", escape_segment(store)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` if `id` is the store lock of `store` or one of its key
    /// locks.
    pub fn belongs_to_store(id: &str, namespace: &str, store: &str) -> bool {
        let store_id = Self::store(namespace, store);
        match id.strip_prefix(store_id.as_str()) {
            Some(rest) => rest.is_empty() || rest.starts_with('_'),
            None => false,
        }
    }
}

impl fmt::Display for LockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for LockId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

fn escape_segment(segment: &str) -> String {
    segment.replace('%', "%25").replace('_', "%5F")
}
