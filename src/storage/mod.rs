//! Durable-storage primitives shared by the state manager, the
//! consistency manager and the package repository.

pub mod atomic;
pub mod lock;
pub mod transaction;

pub use atomic::{write_atomic, write_atomic_with_backup, DEFAULT_BACKUP_RETENTION};
pub use lock::{ResourceLock, DEFAULT_LOCK_TIMEOUT};
pub use transaction::FileTransaction;
