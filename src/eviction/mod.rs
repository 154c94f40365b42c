//! Eviction policy for the size-bounded cache.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    Eviction Module                           │
//! ├──────────────────────────────────────────────────────────────┤
//! │  priority.rs    - Ordering and victim selection              │
//! │  └─ CacheEntry: key, size, priority, written_at, seq         │
//! │  └─ PriorityEvictionPolicy: over cap → evict to target       │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The cache builds `CacheEntry` from its size index and calls
//! `select_victims()` during cleanup; the policy itself touches no storage.

pub mod priority;
