//! Named, reentrant locks for lockbox.
//!
//! Operations on a store take one of two lock granularities:
//!
//! - the **store lock** ([`LockId::store`]) for clear, listing and sweeps
//! - a **key lock** ([`LockId::key`]) for single-key reads and writes
//!
//! Handles come from a [`LockFactory`]. The bundled [`LocalLockFactory`]
//! hands out in-process [`ReentrantLock`]s and can optionally reclaim idle
//! handles; a clustered deployment would plug in a distributed factory.
//! [`LockGuard`] releases a handle on every exit path.

pub mod error;
pub mod id;
pub mod local;
pub mod reentrant;
pub mod traits;

pub use error::{LockError, LockResult};
pub use id::LockId;
pub use local::LocalLockFactory;
pub use reentrant::ReentrantLock;
pub use traits::{LockFactory, LockGuard, LockHandle};
