pub mod keyed_lock;

pub use keyed_lock::KeyedAsyncLock;
pub use keyed_lock::KeyedLockGuard;
