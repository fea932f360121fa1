//! # segpool - Segmented Memory Pools
//!
//! This crate provides **memory pools**: independently sized byte buffers,
//! each carved into allocations by its own placement policy and handed back
//! on release, with free neighbors merged.
//!
//! ## Overview
//!
//! A pool keeps one buffer and tracks it as a chain of segments, each either
//! allocated or free ("a gap"):
//!
//! ```text
//!   Pool of 1000 bytes after allocating 100, 200, 100 and releasing the 200:
//!
//!   ┌──────────────────────────────────────────────────────────────────────┐
//!   │                          POOL BUFFER                                 │
//!   │                                                                      │
//!   │   ┌───────┬──────────────┬───────┬──────────────────────────────┐    │
//!   │   │ A 100 │   gap 200    │ A 100 │           gap 600            │    │
//!   │   └───────┴──────────────┴───────┴──────────────────────────────┘    │
//!   │   0       100            300     400                           1000  │
//!   │                                                                      │
//!   └──────────────────────────────────────────────────────────────────────┘
//!
//!   Gap index (largest first):  [ 600 @ 400 | 200 @ 100 ]
//! ```
//!
//! Two placement policies are available per pool:
//!
//! - **First fit**: the first gap in address order that is large enough.
//! - **Best fit**: the smallest gap that is large enough, lowest offset on
//!   ties.
//!
//! ## Crate Structure
//!
//! ```text
//!   segpool
//!   ├── config    - RegistryConfig, PoolConfig
//!   ├── error     - PoolError, Result
//!   ├── growth    - GrowthPolicy (load factor / expansion)
//!   ├── registry  - Registry, PoolId
//!   ├── pool      - Pool, Policy, Allocation, SegmentInfo, PoolStats
//!   ├── segment   - segment table and address chain (internal)
//!   ├── gap       - gap index (internal)
//!   └── buffer    - calloc-backed pool buffer (internal)
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use segpool::{Policy, Registry};
//!
//! fn main() -> segpool::Result<()> {
//!     let mut registry = Registry::new();
//!     registry.init()?;
//!
//!     let pool = registry.open_pool(1000, Policy::BestFit)?;
//!     let a = registry.allocate(pool, 100)?.expect("pool has room");
//!
//!     registry.pool_mut(pool)?.bytes_mut(a)?.fill(42);
//!
//!     for segment in registry.inspect(pool)? {
//!         println!("{segment}");
//!     }
//!
//!     registry.release(pool, a)?;
//!     registry.close_pool(pool)?;
//!     registry.teardown()
//! }
//! ```
//!
//! ## How It Works
//!
//! Releasing an allocation merges it with free neighbors so the pool never
//! holds two adjacent gaps:
//!
//! ```text
//!   before:  │ gap 100 │ A 50 │ gap 200 │
//!                         ▲
//!                      release
//!   step 1:  │ gap 100 │ gap 250        │     next gap absorbed
//!   step 2:  │ gap 350                  │     absorbed by previous gap
//! ```
//!
//! Segment records live in a table whose slots are recycled after a merge;
//! each slot carries a generation, so a handle to a released or merged
//! segment is rejected instead of silently aliasing a new one.
//!
//! Every bookkeeping array grows by 2x once it is more than 75% full. Any
//! growth an operation needs is reserved before the operation mutates
//! anything, so a failed call leaves the pool exactly as it was.
//!
//! ## Limitations
//!
//! - **Single-threaded**: operations take `&mut`; there is no locking.
//! - **Byte granularity**: no alignment beyond what offsets give you.
//! - **No virtual memory tricks**: a pool's buffer is one `calloc(3)`.

mod buffer;
pub mod config;
pub mod error;
mod gap;
pub mod growth;
pub mod pool;
pub mod registry;
mod segment;

pub use config::{PoolConfig, RegistryConfig};
pub use error::{PoolError, Result};
pub use growth::GrowthPolicy;
pub use pool::{Allocation, Policy, Pool, PoolStats, SegmentInfo};
pub use registry::{PoolId, Registry};
