use std::collections::HashMap;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{RegistryError, Result};

/// Where a store lives: its owning context and that context's parent.
///
/// `None` is the root context.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Scope {
    pub context: Option<String>,
    pub parent: Option<String>,
}

impl Scope {
    /// The root context, with no parent.
    pub fn root() -> Self {
        Self::default()
    }

    pub fn new(context: Option<String>, parent: Option<String>) -> Self {
        Self { context, parent }
    }

    /// A child of `parent`.
    pub fn child(context: impl Into<String>, parent: Option<String>) -> Self {
        Self {
            context: Some(context.into()),
            parent,
        }
    }
}

type Slot = (Option<String>, String);

/// Live stores by `(context, name)`.
///
/// Registration rejects a name already live in the registrant's context or
/// in its parent context. The check and the insert happen under one write
/// lock, so two racing registrations of the same name cannot both succeed.
pub struct StoreRegistry<S> {
    stores: RwLock<HashMap<Slot, S>>,
}

impl<S: Clone + Send + Sync> StoreRegistry<S> {
    pub fn new() -> Self {
        Self {
            stores: RwLock::new(HashMap::new()),
        }
    }

    /// Register `store` under `name` in `scope.context`.
    pub fn register(&self, name: &str, scope: &Scope, store: S) -> Result<()> {
        self.register_with(name, scope, || Ok::<_, RegistryError>(store))
            .map(|_| ())
    }

    /// Claim `name` in `scope.context` and build the store to register.
    ///
    /// `make` only runs once the name is known to be free, and runs under the
    /// registry's write lock: nothing else can claim the name in between. If
    /// `make` fails, nothing is registered.
    pub fn register_with<E, F>(&self, name: &str, scope: &Scope, make: F) -> std::result::Result<S, E>
    where
        F: FnOnce() -> std::result::Result<S, E>,
        E: From<RegistryError>,
    {
        let mut stores = self.stores.write();
        let own = (scope.context.clone(), name.to_string());
        if stores.contains_key(&own) {
            return Err(duplicate(name, &scope.context).into());
        }
        if let Some(parent) = &scope.parent {
            if stores.contains_key(&(Some(parent.clone()), name.to_string())) {
                return Err(duplicate(name, &scope.parent).into());
            }
        }
        let store = make()?;
        stores.insert(own, store.clone());
        debug!(store = name, context = ?scope.context, "store registered");
        Ok(store)
    }

    /// Remove `name` from `context`. Returns the removed store, if any.
    pub fn unregister(&self, name: &str, context: Option<&str>) -> Option<S> {
        let removed = self
            .stores
            .write()
            .remove(&(context.map(str::to_string), name.to_string()));
        if removed.is_some() {
            debug!(store = name, ?context, "store unregistered");
        }
        removed
    }

    /// Exact-context lookup.
    pub fn lookup(&self, name: &str, context: Option<&str>) -> Option<S> {
        self.stores
            .read()
            .get(&(context.map(str::to_string), name.to_string()))
            .cloned()
    }

    /// Look in `scope.context` first, then in `scope.parent`.
    pub fn lookup_hierarchical(&self, name: &str, scope: &Scope) -> Option<S> {
        self.lookup(name, scope.context.as_deref()).or_else(|| {
            scope
                .parent
                .as_deref()
                .and_then(|parent| self.lookup(name, Some(parent)))
        })
    }

    /// Store names live in `context`, sorted.
    pub fn names(&self, context: Option<&str>) -> Vec<String> {
        let mut names: Vec<String> = self
            .stores
            .read()
            .keys()
            .filter(|(ctx, _)| ctx.as_deref() == context)
            .map(|(_, name)| name.clone())
            .collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.stores.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<S: Clone + Send + Sync> Default for StoreRegistry<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> std::fmt::Debug for StoreRegistry<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreRegistry")
            .field("stores", &self.stores.read().len())
            .finish()
    }
}

fn duplicate(name: &str, context: &Option<String>) -> RegistryError {
    RegistryError::DuplicateStoreName {
        name: name.to_string(),
        context: context.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn app() -> Scope {
        Scope::child("app", Some("domain".into()))
    }

    fn domain() -> Scope {
        Scope::child("domain", None)
    }

    // -----------------------------------------------------------------------
    // Registration
    // -----------------------------------------------------------------------

    #[test]
    fn register_then_lookup() {
        let reg = StoreRegistry::new();
        reg.register("orders", &app(), 1).unwrap();
        assert_eq!(reg.lookup("orders", Some("app")), Some(1));
        assert_eq!(reg.lookup("orders", Some("domain")), None);
        assert_eq!(reg.lookup("orders", None), None);
    }

    #[test]
    fn duplicate_in_same_context_is_rejected() {
        let reg = StoreRegistry::new();
        reg.register("orders", &app(), 1).unwrap();
        let err = reg.register("orders", &app(), 2).unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateStoreName { ref name, .. } if name == "orders"));
        assert_eq!(reg.lookup("orders", Some("app")), Some(1));
    }

    #[test]
    fn name_in_parent_context_blocks_child() {
        let reg = StoreRegistry::new();
        reg.register("orders", &domain(), 1).unwrap();
        let err = reg.register("orders", &app(), 2).unwrap_err();
        assert!(
            matches!(err, RegistryError::DuplicateStoreName { ref context, .. } if context.as_deref() == Some("domain"))
        );
    }

    #[test]
    fn sibling_contexts_are_independent() {
        let reg = StoreRegistry::new();
        reg.register("orders", &Scope::child("app-a", Some("domain".into())), 1)
            .unwrap();
        reg.register("orders", &Scope::child("app-b", Some("domain".into())), 2)
            .unwrap();
        assert_eq!(reg.len(), 2);
    }

    #[test]
    fn register_with_skips_builder_on_duplicate() {
        let reg = StoreRegistry::new();
        reg.register("orders", &app(), 1).unwrap();
        let mut built = false;
        let result = reg.register_with("orders", &app(), || {
            built = true;
            Ok::<_, RegistryError>(2)
        });
        assert!(result.is_err());
        assert!(!built);
    }

    #[test]
    fn failed_builder_registers_nothing() {
        let reg: StoreRegistry<i32> = StoreRegistry::new();
        let result = reg.register_with("orders", &app(), || {
            Err(RegistryError::InvalidStoreName {
                name: "orders".into(),
                reason: "backend refused".into(),
            })
        });
        assert!(result.is_err());
        assert!(reg.is_empty());
    }

    #[test]
    fn root_scope_registration() {
        let reg = StoreRegistry::new();
        reg.register("s", &Scope::root(), "root").unwrap();
        assert!(reg.register("s", &Scope::root(), "again").is_err());
        assert_eq!(reg.lookup("s", None), Some("root"));
    }

    // -----------------------------------------------------------------------
    // Unregister and lookup
    // -----------------------------------------------------------------------

    #[test]
    fn unregister_frees_the_name() {
        let reg = StoreRegistry::new();
        reg.register("orders", &app(), 1).unwrap();
        assert_eq!(reg.unregister("orders", Some("app")), Some(1));
        assert_eq!(reg.unregister("orders", Some("app")), None);
        reg.register("orders", &app(), 2).unwrap();
    }

    #[test]
    fn hierarchical_lookup_falls_back_to_parent() {
        let reg = StoreRegistry::new();
        reg.register("shared", &domain(), 10).unwrap();
        reg.register("local", &app(), 20).unwrap();
        assert_eq!(reg.lookup_hierarchical("local", &app()), Some(20));
        assert_eq!(reg.lookup_hierarchical("shared", &app()), Some(10));
        assert_eq!(reg.lookup_hierarchical("missing", &app()), None);
        assert_eq!(reg.lookup("shared", Some("app")), None);
    }

    #[test]
    fn names_are_listed_per_context() {
        let reg = StoreRegistry::new();
        reg.register("b", &app(), 1).unwrap();
        reg.register("a", &app(), 2).unwrap();
        reg.register("c", &domain(), 3).unwrap();
        assert_eq!(reg.names(Some("app")), vec!["a", "b"]);
        assert_eq!(reg.names(Some("domain")), vec!["c"]);
    }

    #[test]
    fn racing_registrations_admit_one_winner() {
        let reg = Arc::new(StoreRegistry::new());
        let handles: Vec<_> = (0..16)
            .map(|i| {
                let reg = Arc::clone(&reg);
                thread::spawn(move || reg.register("contested", &app(), i).is_ok())
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(winners, 1);
    }

    #[test]
    fn scope_roundtrips_through_json() {
        let scope = app();
        let json = serde_json::to_string(&scope).unwrap();
        assert_eq!(serde_json::from_str::<Scope>(&json).unwrap(), scope);
    }
}
