use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use lockbox_lock::{LocalLockFactory, LockFactory, LockGuard, LockId, LockResult};
use lockbox_registry::{Scope, StoreRegistry};
use lockbox_store::{
    sweep, EvictionPolicy, LocalStoreManager, PartitionStore, StoreError, StoreManager,
    StoreResult, SweepReport, SweepScheduler, DEFAULT_PARTITION,
};
use lockbox_types::{Clock, StoreDescriptor, SystemClock};
use parking_lot::Mutex;
use tracing::{info, warn};

use crate::config::{ConnectorConfig, ConsistencyMode};
use crate::definition::StoreDefinition;
use crate::error::{ErrorKind, OperationError, OperationResult};
use crate::operations::ObjectStoreOperations;

/// A started store as seen by the registry and the façade.
#[derive(Clone)]
pub(crate) struct LiveStore {
    /// The name callers refer to the store by.
    pub(crate) name: String,
    pub(crate) partition: Arc<dyn PartitionStore>,
    pub(crate) policy: EvictionPolicy,
}

impl LiveStore {
    /// Partition name; unique across contexts and used in lock identifiers.
    pub(crate) fn identity(&self) -> &str {
        self.partition.name()
    }
}

/// State shared by the connector, its store definitions and its façade.
pub(crate) struct ConnectorCore {
    pub(crate) namespace: String,
    pub(crate) scope: Scope,
    pub(crate) consistency: ConsistencyMode,
    pub(crate) lock_timeout: Option<Duration>,
    pub(crate) registry: StoreRegistry<LiveStore>,
    /// `(context, name)` of every declared store, started or not.
    pub(crate) declared: Mutex<HashSet<(Option<String>, String)>>,
    pub(crate) manager: Arc<dyn StoreManager>,
    pub(crate) locks: Arc<dyn LockFactory>,
    pub(crate) scheduler: SweepScheduler,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) default_store: LiveStore,
}

impl ConnectorCore {
    pub(crate) fn store_lock(&self, store: &LiveStore) -> OperationResult<LockGuard> {
        self.acquire(LockId::store(&self.namespace, store.identity()))
    }

    pub(crate) fn key_lock(&self, store: &LiveStore, key: &str) -> OperationResult<LockGuard> {
        self.acquire(LockId::key(&self.namespace, store.identity(), key))
    }

    fn acquire(&self, id: LockId) -> OperationResult<LockGuard> {
        acquire_lock(self.locks.as_ref(), &id, self.lock_timeout).map_err(OperationError::from_lock)
    }

    /// Whether `name` was declared in the façade's context or its parent.
    pub(crate) fn is_declared(&self, name: &str) -> bool {
        let declared = self.declared.lock();
        declared.contains(&(self.scope.context.clone(), name.to_string()))
            || self
                .scope
                .parent
                .as_ref()
                .is_some_and(|parent| declared.contains(&(Some(parent.clone()), name.to_string())))
    }
}

fn acquire_lock(
    locks: &dyn LockFactory,
    id: &LockId,
    timeout: Option<Duration>,
) -> LockResult<LockGuard> {
    let handle = locks.create_lock(id.as_str())?;
    match timeout {
        Some(timeout) => LockGuard::acquire_for(handle, timeout),
        None => LockGuard::acquire(handle),
    }
}

/// Run one sweep of `store` while holding its store lock.
pub(crate) fn sweep_under_lock(
    locks: &dyn LockFactory,
    namespace: &str,
    lock_timeout: Option<Duration>,
    store: &LiveStore,
    clock: &dyn Clock,
) -> StoreResult<SweepReport> {
    let id = LockId::store(namespace, store.identity());
    let _guard = acquire_lock(locks, &id, lock_timeout).map_err(|e| StoreError::NotAvailable {
        store: store.name.clone(),
        reason: e.to_string(),
    })?;
    sweep(store.partition.as_ref(), &store.policy, clock.now())
}

/// Partition name for `name` in `context`.
///
/// `%` and `/` are escaped in both segments, so a root-level name can never
/// look like a context-qualified one.
pub(crate) fn partition_identity(context: Option<&str>, name: &str) -> String {
    let escape = |s: &str| s.replace('%', "%25").replace('/', "%2F");
    match context {
        Some(ctx) => format!("{}/{}", escape(ctx), escape(name)),
        None => escape(name),
    }
}

/// Owns the registry, lock factory, store manager and sweep scheduler, and
/// every store declared through it.
///
/// Dropping the connector stops all of its stores.
pub struct ObjectStoreConnector {
    core: Arc<ConnectorCore>,
    definitions: Mutex<Vec<Arc<StoreDefinition>>>,
}

impl ObjectStoreConnector {
    /// Build a connector on the local store manager and lock factory, and
    /// start every store listed in `config`.
    pub fn new(config: ConnectorConfig) -> OperationResult<Self> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let manager = LocalStoreManager::with_clock(config.manager_config(), Arc::clone(&clock))
            .map_err(|e| OperationError::from_store(e, DEFAULT_PARTITION, None))?;
        let locks: Arc<dyn LockFactory> = match config.lock_reclaim_threshold {
            Some(threshold) => Arc::new(LocalLockFactory::with_reclaim_threshold(threshold)),
            None => Arc::new(LocalLockFactory::new()),
        };
        Self::with_components(config, Arc::new(manager), locks, clock)
    }

    /// Build a connector on caller-supplied backends.
    pub fn with_components(
        config: ConnectorConfig,
        manager: Arc<dyn StoreManager>,
        locks: Arc<dyn LockFactory>,
        clock: Arc<dyn Clock>,
    ) -> OperationResult<Self> {
        config
            .validate()
            .map_err(|e| OperationError::new(ErrorKind::Any, e.to_string()).with_source(e))?;
        let scheduler = SweepScheduler::new().map_err(|e| {
            OperationError::new(ErrorKind::Any, "cannot start the sweep scheduler").with_source(e)
        })?;

        let default_store = LiveStore {
            name: DEFAULT_PARTITION.to_string(),
            partition: manager.default_partition(),
            policy: EvictionPolicy::default(),
        };
        let core = Arc::new(ConnectorCore {
            namespace: config.namespace.clone(),
            scope: Scope::new(config.owning_context.clone(), config.parent_context.clone()),
            consistency: config.consistency,
            lock_timeout: config.lock_timeout(),
            registry: StoreRegistry::new(),
            declared: Mutex::new(HashSet::new()),
            manager,
            locks,
            scheduler,
            clock,
            default_store,
        });
        let connector = Self {
            core,
            definitions: Mutex::new(Vec::new()),
        };

        for store in &config.stores {
            let descriptor = store
                .to_descriptor()
                .map_err(|e| OperationError::new(ErrorKind::Any, e.to_string()).with_source(e))?;
            connector.define(descriptor)?;
        }
        info!(
            namespace = %connector.core.namespace,
            context = ?connector.core.scope.context,
            stores = config.stores.len(),
            "object store connector ready"
        );
        Ok(connector)
    }

    /// Declare a store without starting it.
    ///
    /// Contexts missing from the descriptor are taken from the connector.
    pub fn declare(&self, descriptor: StoreDescriptor) -> Arc<StoreDefinition> {
        let scope = Scope::new(
            descriptor
                .owning_context
                .clone()
                .or_else(|| self.core.scope.context.clone()),
            descriptor
                .parent_context
                .clone()
                .or_else(|| self.core.scope.parent.clone()),
        );
        self.core
            .declared
            .lock()
            .insert((scope.context.clone(), descriptor.name().to_string()));
        let definition = Arc::new(StoreDefinition::new(descriptor, scope, Arc::clone(&self.core)));
        self.definitions.lock().push(Arc::clone(&definition));
        definition
    }

    /// Declare a store and start it.
    pub fn define(&self, descriptor: StoreDescriptor) -> OperationResult<Arc<StoreDefinition>> {
        let definition = self.declare(descriptor);
        definition.start()?;
        Ok(definition)
    }

    /// The façade over this connector's stores.
    pub fn operations(&self) -> ObjectStoreOperations {
        ObjectStoreOperations::new(Arc::clone(&self.core))
    }

    /// The first declared definition called `name`.
    pub fn definition(&self, name: &str) -> Option<Arc<StoreDefinition>> {
        self.definitions
            .lock()
            .iter()
            .find(|d| d.name() == name)
            .cloned()
    }

    pub fn definitions(&self) -> Vec<Arc<StoreDefinition>> {
        self.definitions.lock().clone()
    }

    pub fn namespace(&self) -> &str {
        &self.core.namespace
    }

    /// Number of stores with an armed sweep timer.
    pub fn armed_sweeps(&self) -> usize {
        self.core.scheduler.armed_count()
    }

    /// Stop every store. All stores are stopped even if some fail; the
    /// first failure is returned.
    pub fn shutdown(&self) -> OperationResult<()> {
        let mut first_error = None;
        for definition in self.definitions.lock().iter() {
            if let Err(e) = definition.stop() {
                warn!(store = definition.name(), error = %e, "failed to stop store");
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Drop for ObjectStoreConnector {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            warn!(error = %e, "connector shutdown incomplete");
        }
    }
}

impl std::fmt::Debug for ObjectStoreConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectStoreConnector")
            .field("namespace", &self.core.namespace)
            .field("scope", &self.core.scope)
            .field("definitions", &self.definitions.lock().len())
            .finish()
    }
}
