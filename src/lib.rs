//! chained-table: a type-erased hash table with separate chaining over
//! fixed-size byte blocks, with pluggable hashing, equality and disposal.
//!
//! Internal Design:
//!
//! Summary
//! - Goal: a single-owner associative container for code that moves keys
//!   and values around as raw bytes (FFI shims, interpreters, arenas of
//!   serialized records) and cannot name their Rust types.
//! - Layers:
//!   - TypeDescriptor: key/value sizes plus hash, equality and the two
//!     disposers; unset callbacks fall back to the stock strategies.
//!   - ChainedTable: the storage engine; owns a copy of every key and value
//!     block it holds.
//!   - PodTable<K, V>: typed convenience view for `bytemuck::Pod` keys and
//!     values, sizes derived from the types.
//!
//! Layout
//! - A fixed array of buckets; bucket `hash(key) % bucket_count` holds the
//!   head of that key's chain inline.
//! - Entries beyond the head live in a `slotmap` arena and are linked by
//!   arena key. The head is never an arena node; removing it promotes its
//!   successor into the bucket.
//! - Chains keep insertion order; keys within a chain are distinct under the
//!   descriptor's equality.
//!
//! Ownership and disposal
//! - Key and value blocks are exact-size boxed copies of the caller's bytes
//!   and are released by the table.
//! - Disposers release what a block *points to*, never the block. They run
//!   on remove (after the entry is unlinked), on update (old value only),
//!   and for every live entry when the table is dropped.
//! - `optimize` moves blocks into the new bucket layout instead of copying
//!   them, so rehashing never runs a disposer.
//!
//! Failure model
//! - Every allocation insert and optimize make (bucket array, key/value
//!   blocks, overflow arena room) is fallible and happens before any
//!   structural change; a refusal is returned as
//!   `TableError::AllocationFailure` and the table is unchanged.
//! - A missing key is an ordinary outcome (`None` / `false`), not an error.
//! - Blocks of the wrong length are caller bugs and panic.
//!
//! Constraints
//! - Single-threaded: `!Send`/`!Sync` (callbacks are `Rc`-shared).
//! - Not reentrant: callbacks must not call back into the table running
//!   them. Debug builds detect it and panic; release builds do not check.
//! - The default identity hash/equality only look at the first machine
//!   word of a key. See [`strategy`].

pub mod chained_table;
mod chained_table_proptest;
pub mod descriptor;
pub mod error;
pub mod pod_table;
mod reentrancy;
pub mod strategy;

// Public surface
pub use chained_table::{ChainedTable, Iter, DEFAULT_BUCKET_COUNT, TARGET_LOAD_FACTOR};
pub use descriptor::{DisposeFn, EqFn, HashFn, TypeDescriptor};
pub use error::{AllocationSite, InsertOutcome, TableError};
pub use pod_table::PodTable;
