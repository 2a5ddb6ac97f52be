//! Read-cache coordination.
//!
//! - **Resolver**: maps domain write-events to cache-key patterns
//! - **Client**: invalidates, refetches and evicts through a [`CacheBackend`]
//! - **Store**: in-memory backend with stale tracking and refetch coalescing
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! enabled = true
//! operation_timeout_ms = 5000
//! coalesce_refetch = true
//! ```

mod backend;
mod client;
mod config;
mod error;
mod keys;
pub(crate) mod lock;
mod resolver;
mod store;
mod sync;

pub use backend::{CacheBackend, QueryLoader};
pub use client::CacheClient;
pub use config::CacheConfig;
pub use error::{BackendError, CacheError};
pub use keys::CacheKey;
pub use resolver::{InvalidationKeyResolver, InvalidationRule};
pub use store::{EntryState, QueryStore};
pub use sync::CacheSync;
