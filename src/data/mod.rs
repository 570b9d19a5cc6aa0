//! Engine-owned data shared with scripts.
//!
//! ```text
//!   pre-generate hook ──► GlobalStore (snapshot, replaced wholesale)
//!                               │
//!                               ▼
//!   page script ──► GlobalAccess.get(key) ──► DependencyTracker (global set)
//!        │
//!        └──► cache group (snapshot in, written back after the script settles)
//!                               │
//!                               ▼
//!                        CacheStore ──► .inkwell-cache.json (at shutdown)
//! ```

pub mod cache;
pub mod global;

pub use cache::{CacheError, CacheGroup, CacheStore, GroupPolicy};
pub use global::{GlobalAccess, GlobalMap, GlobalStore};
