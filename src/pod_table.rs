//! PodTable: typed view of a ChainedTable for plain-old-data keys and values.

use crate::chained_table::{ChainedTable, DEFAULT_BUCKET_COUNT};
use crate::descriptor::TypeDescriptor;
use crate::error::{InsertOutcome, TableError};
use bytemuck::Pod;
use core::marker::PhantomData;

/// A [`ChainedTable`] whose blocks are the bytes of `K` and `V`.
///
/// Sizes come from the types. Values are returned by copy: stored blocks
/// have no alignment guarantee, so they are read unaligned rather than
/// borrowed as `&V`.
///
/// Built with [`PodTable::new`] or [`PodTable::with_buckets`], hashing and
/// equality are the identity defaults, which only look at the first machine
/// word of the key. That is exact for integer keys up to word size; wider
/// keys need [`PodTable::with_descriptor`] and real callbacks.
pub struct PodTable<K, V> {
    raw: ChainedTable,
    _types: PhantomData<fn() -> (K, V)>,
}

impl<K: Pod, V: Pod> PodTable<K, V> {
    pub fn new() -> Result<Self, TableError> {
        Self::with_buckets(DEFAULT_BUCKET_COUNT)
    }

    pub fn with_buckets(bucket_count: usize) -> Result<Self, TableError> {
        Self::with_descriptor(TypeDescriptor::of::<K, V>(), bucket_count)
    }

    /// Use custom callbacks. The descriptor's sizes must match `K` and `V`.
    #[track_caller]
    pub fn with_descriptor(descriptor: TypeDescriptor, bucket_count: usize) -> Result<Self, TableError> {
        assert!(
            descriptor.key_size() == core::mem::size_of::<K>()
                && descriptor.value_size() == core::mem::size_of::<V>(),
            "descriptor sizes do not match the key and value types"
        );
        Ok(Self {
            raw: ChainedTable::with_buckets(descriptor, bucket_count)?,
            _types: PhantomData,
        })
    }

    pub fn insert(&mut self, key: &K, value: &V) -> Result<InsertOutcome, TableError> {
        self.raw
            .insert(bytemuck::bytes_of(key), bytemuck::bytes_of(value))
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.raw
            .lookup(bytemuck::bytes_of(key))
            .map(bytemuck::pod_read_unaligned)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.raw.contains_key(bytemuck::bytes_of(key))
    }

    pub fn remove(&mut self, key: &K) -> bool {
        self.raw.remove(bytemuck::bytes_of(key))
    }

    pub fn len(&self) -> usize {
        self.raw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    pub fn bucket_count(&self) -> usize {
        self.raw.bucket_count()
    }

    pub fn load_factor(&self) -> f64 {
        self.raw.load_factor()
    }

    pub fn count_collisions(&self) -> usize {
        self.raw.count_collisions()
    }

    pub fn optimize(&mut self) -> Result<(), TableError> {
        self.raw.optimize()
    }

    /// Copies of every `(key, value)` pair, in table traversal order.
    pub fn iter(&self) -> impl Iterator<Item = (K, V)> + '_ {
        self.raw
            .iter()
            .map(|(k, v)| (bytemuck::pod_read_unaligned(k), bytemuck::pod_read_unaligned(v)))
    }

    pub fn as_raw(&self) -> &ChainedTable {
        &self.raw
    }

    pub fn into_raw(self) -> ChainedTable {
        self.raw
    }
}

impl<K, V> core::fmt::Debug for PodTable<K, V> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_tuple("PodTable").field(&self.raw).finish()
    }
}
