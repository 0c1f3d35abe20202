//! FxBridge Rate Store
//!
//! Key-value persistence of [`RateRecord`](fxbridge_common::RateRecord)s
//! addressed as `"<SOURCE>:<CODE>"` hashes. Every operation probes the
//! connection first and, when it is down, blocks in a bounded, cancellable
//! reconnect loop before giving up with `StoreUnavailable`.

pub mod backend;
pub mod memory;
pub mod redis_backend;
pub mod retry;
pub mod store;

pub use backend::{BackendError, KvBackend};
pub use memory::MemoryBackend;
pub use redis_backend::RedisBackend;
pub use retry::{ReconnectPolicy, RetryError};
pub use store::{ConnectionHealth, RateStore};
