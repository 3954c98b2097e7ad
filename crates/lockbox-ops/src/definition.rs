use std::sync::Arc;

use lockbox_lock::LockId;
use lockbox_registry::{validate_store_name, Scope};
use lockbox_store::{EvictionPolicy, SweepReport, SweepTask, DEFAULT_PARTITION};
use lockbox_types::StoreDescriptor;
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::connector::{partition_identity, sweep_under_lock, ConnectorCore, LiveStore};
use crate::error::{ErrorKind, OperationError, OperationResult};

/// The lifecycle of one declared store.
///
/// `start` registers the name, creates the partition and, when the store has
/// a capacity or TTL policy, arms its sweep timer. `stop` undoes all of that
/// and releases the store's idle lock handles; persisted entries stay on
/// disk. Both are idempotent.
pub struct StoreDefinition {
    descriptor: StoreDescriptor,
    scope: Scope,
    core: Arc<ConnectorCore>,
    active: Mutex<Option<LiveStore>>,
}

impl StoreDefinition {
    pub(crate) fn new(descriptor: StoreDescriptor, scope: Scope, core: Arc<ConnectorCore>) -> Self {
        Self {
            descriptor,
            scope,
            core,
            active: Mutex::new(None),
        }
    }

    /// The name the store is registered under.
    pub fn name(&self) -> &str {
        self.descriptor.name()
    }

    pub fn descriptor(&self) -> &StoreDescriptor {
        &self.descriptor
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Name of the backing partition.
    pub fn partition_name(&self) -> String {
        partition_identity(self.scope.context.as_deref(), self.name())
    }

    pub fn is_started(&self) -> bool {
        self.active.lock().is_some()
    }

    pub fn start(&self) -> OperationResult<()> {
        let mut active = self.active.lock();
        if active.is_some() {
            debug!(store = self.name(), "store already started");
            return Ok(());
        }

        let name = self.name();
        validate_store_name(name)?;
        let identity = self.partition_name();
        if identity == DEFAULT_PARTITION {
            return Err(OperationError::new(
                ErrorKind::DuplicateStoreName,
                format!("'{DEFAULT_PARTITION}' is reserved for the default partition"),
            ));
        }

        let settings = &self.descriptor.settings;
        let core = &self.core;
        let live = core.registry.register_with(name, &self.scope, || {
            let partition = core
                .manager
                .create_or_get_store(&identity, settings)
                .map_err(|e| OperationError::from_store(e, name, None))?;
            Ok::<_, OperationError>(LiveStore {
                name: name.to_string(),
                partition,
                policy: EvictionPolicy::from_settings(settings),
            })
        })?;

        if live.policy.is_active() {
            let locks = Arc::clone(&core.locks);
            let clock = Arc::clone(&core.clock);
            let namespace = core.namespace.clone();
            let lock_timeout = core.lock_timeout;
            let store = live.clone();
            let task: SweepTask = Arc::new(move || {
                sweep_under_lock(locks.as_ref(), &namespace, lock_timeout, &store, clock.as_ref())
            });
            core.scheduler.arm(&identity, settings.sweep_interval(), task);
        }

        info!(
            store = name,
            context = ?self.scope.context,
            persistent = settings.persistent,
            "store started"
        );
        *active = Some(live);
        Ok(())
    }

    pub fn stop(&self) -> OperationResult<()> {
        let Some(live) = self.active.lock().take() else {
            return Ok(());
        };
        let core = &self.core;
        let identity = live.identity().to_string();

        core.scheduler.disarm(&identity);
        core.registry.unregister(self.name(), self.scope.context.as_deref());
        let released = core
            .locks
            .release_idle(&|id: &str| LockId::belongs_to_store(id, &core.namespace, &identity));
        core.manager
            .dispose_store(&identity)
            .map_err(|e| OperationError::from_store(e, self.name(), None))?;

        info!(store = self.name(), released_locks = released, "store stopped");
        Ok(())
    }

    /// Run one eviction sweep now, under the store lock.
    pub fn sweep_now(&self) -> OperationResult<SweepReport> {
        let live = self.live()?;
        sweep_under_lock(
            self.core.locks.as_ref(),
            &self.core.namespace,
            self.core.lock_timeout,
            &live,
            self.core.clock.as_ref(),
        )
        .map_err(|e| OperationError::from_store(e, self.name(), None))
    }

    /// Whether a sweep timer is armed for this store.
    pub fn sweep_armed(&self) -> bool {
        self.core.scheduler.is_armed(&self.partition_name())
    }

    fn live(&self) -> OperationResult<LiveStore> {
        self.active
            .lock()
            .clone()
            .ok_or_else(|| OperationError::not_initialised(self.name()))
    }
}

impl std::fmt::Debug for StoreDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreDefinition")
            .field("name", &self.name())
            .field("scope", &self.scope)
            .field("started", &self.is_started())
            .finish()
    }
}
