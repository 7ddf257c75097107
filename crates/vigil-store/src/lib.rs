pub mod admin;
pub mod error;
pub mod lock;
pub mod memory;
pub mod store;

pub use admin::MachineAdmin;
pub use error::{Result, StoreError};
pub use lock::{KeyedLock, LockGuard, LockPolicy, LOCK_POLL_INTERVAL};
pub use memory::{MemoryStore, StoreConfig};
pub use store::{ConditionStore, MachineLease};
