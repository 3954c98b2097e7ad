use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::settings::StoreSettings;

/// How a store descriptor arrives at its registered name.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NameResolution {
    /// A top-level store declared under its own name.
    ExplicitName { name: String },
    /// A store defined inline within another component. It uses
    /// `store_name` when one was given and the generated `alias` otherwise.
    GeneratedAliasWithFallback {
        store_name: Option<String>,
        alias: String,
    },
}

impl NameResolution {
    /// The name this store will be registered under.
    pub fn resolve(&self) -> &str {
        match self {
            Self::ExplicitName { name } => name,
            Self::GeneratedAliasWithFallback {
                store_name: Some(name),
                ..
            } => name,
            Self::GeneratedAliasWithFallback { alias, .. } => alias,
        }
    }

    /// Generate a fresh alias for an inline store.
    pub fn generate_alias() -> String {
        format!("inline-store-{}", Uuid::now_v7())
    }
}

/// Everything needed to bring a store to life: how to name it, the policy it
/// runs under, and the contexts used for name-collision checks.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreDescriptor {
    pub resolution: NameResolution,
    pub settings: StoreSettings,
    /// The owning context, e.g. an application identifier.
    pub owning_context: Option<String>,
    /// The parent of the owning context, e.g. a domain identifier.
    pub parent_context: Option<String>,
}

impl StoreDescriptor {
    /// A top-level store with an explicit name.
    pub fn top_level(name: impl Into<String>, settings: StoreSettings) -> Self {
        Self {
            resolution: NameResolution::ExplicitName { name: name.into() },
            settings,
            owning_context: None,
            parent_context: None,
        }
    }

    /// An inline store, optionally named; unnamed stores get a generated alias.
    pub fn inline(store_name: Option<String>, settings: StoreSettings) -> Self {
        Self {
            resolution: NameResolution::GeneratedAliasWithFallback {
                store_name,
                alias: NameResolution::generate_alias(),
            },
            settings,
            owning_context: None,
            parent_context: None,
        }
    }

    pub fn with_contexts(
        mut self,
        owning_context: Option<String>,
        parent_context: Option<String>,
    ) -> Self {
        self.owning_context = owning_context;
        self.parent_context = parent_context;
        self
    }

    /// The name this store is registered under.
    pub fn name(&self) -> &str {
        self.resolution.resolve()
    }
}
