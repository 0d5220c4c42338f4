//! ChainedTable: separately chained hash table over fixed-size byte blocks.
//!
//! Layout
//! - `buckets[i]` holds the head of chain `i` inline (`None` when empty).
//! - Every entry beyond a head lives in the `overflow` arena and is linked
//!   from its predecessor by arena key, so chains are walked head first in
//!   insertion order.
//! - Heads are never arena nodes. Removing a head that has a successor
//!   moves the successor into the bucket and frees its arena slot.

use crate::descriptor::{Strategies, TypeDescriptor};
use crate::error::{copy_block, AllocationSite, InsertOutcome, TableError};
use crate::reentrancy::OperationTracker;
use core::iter::FusedIterator;
use slotmap::{DefaultKey, SlotMap};

/// Bucket count used by [`ChainedTable::new`].
pub const DEFAULT_BUCKET_COUNT: usize = 16;

/// Load factor [`ChainedTable::optimize`] sizes the bucket array for.
pub const TARGET_LOAD_FACTOR: f64 = 0.75;

#[derive(Debug)]
struct Node {
    key: Box<[u8]>,
    value: Box<[u8]>,
    next: Option<DefaultKey>,
}

impl Node {
    /// Owned copies of both blocks. A key block already copied is dropped
    /// with the error when the value block cannot be allocated.
    fn copy_of(key: &[u8], value: &[u8]) -> Result<Self, TableError> {
        let key = copy_block(key, AllocationSite::KeyBlock)?;
        let value = copy_block(value, AllocationSite::ValueBlock)?;
        Ok(Node {
            key,
            value,
            next: None,
        })
    }
}

/// Position of a node within its chain.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum Link {
    Head(usize),
    Overflow(DefaultKey),
}

/// Walks one chain, head first.
#[derive(Clone)]
struct Chain<'a> {
    overflow: &'a SlotMap<DefaultKey, Node>,
    cur: Option<(Link, &'a Node)>,
}

impl<'a> Iterator for Chain<'a> {
    type Item = (Link, &'a Node);

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        let (link, node) = self.cur?;
        let overflow = self.overflow;
        self.cur = node.next.map(|k| (Link::Overflow(k), &overflow[k]));
        Some((link, node))
    }
}

fn target_bucket_count(len: usize) -> usize {
    (len as f64 / TARGET_LOAD_FACTOR) as usize
}

/// `bucket_count` empty chains (at least one), allocated fallibly.
fn empty_buckets(bucket_count: usize) -> Result<Vec<Option<Node>>, TableError> {
    let bucket_count = bucket_count.max(1);
    let mut buckets = Vec::new();
    buckets
        .try_reserve_exact(bucket_count)
        .map_err(|source| TableError::AllocationFailure {
            site: AllocationSite::BucketArray,
            source,
        })?;
    buckets.resize_with(bucket_count, || None);
    Ok(buckets)
}

/// Chains plus the callbacks they are keyed by. Every method assumes the
/// caller has already checked block sizes.
struct Storage {
    strategies: Strategies,
    len: usize,
    buckets: Vec<Option<Node>>,
    overflow: SlotMap<DefaultKey, Node>,
}

impl Storage {
    fn with_buckets(strategies: Strategies, bucket_count: usize) -> Result<Self, TableError> {
        Ok(Self {
            strategies,
            len: 0,
            buckets: empty_buckets(bucket_count)?,
            overflow: SlotMap::new(),
        })
    }

    /// Make room for `additional` more overflow nodes, so the next that many
    /// arena inserts cannot allocate.
    fn reserve_overflow(&mut self, additional: usize) -> Result<(), TableError> {
        self.overflow
            .try_reserve(additional)
            .map_err(|source| TableError::AllocationFailure {
                site: AllocationSite::OverflowNode,
                source,
            })
    }

    #[inline]
    fn bucket_index(&self, key: &[u8]) -> usize {
        (self.strategies.hash(key) % self.buckets.len() as u64) as usize
    }

    fn chain(&self, index: usize) -> Chain<'_> {
        Chain {
            overflow: &self.overflow,
            cur: self.buckets[index].as_ref().map(|n| (Link::Head(index), n)),
        }
    }

    fn node(&self, link: Link) -> &Node {
        match link {
            Link::Head(i) => self.buckets[i]
                .as_ref()
                .expect("linked chain head must be occupied"),
            Link::Overflow(k) => self.overflow.get(k).expect("overflow link must be live"),
        }
    }

    fn node_mut(&mut self, link: Link) -> &mut Node {
        match link {
            Link::Head(i) => self.buckets[i]
                .as_mut()
                .expect("linked chain head must be occupied"),
            Link::Overflow(k) => self
                .overflow
                .get_mut(k)
                .expect("overflow link must be live"),
        }
    }

    /// Scan the chain `key` hashes to. Returns the bucket, the matching
    /// node if any, and the node visited just before the match (or the
    /// chain tail when nothing matched).
    fn probe(&self, key: &[u8]) -> (usize, Option<Link>, Option<Link>) {
        let index = self.bucket_index(key);
        let mut prev = None;
        for (link, node) in self.chain(index) {
            if self.strategies.equals(&node.key, key) {
                return (index, Some(link), prev);
            }
            prev = Some(link);
        }
        (index, None, prev)
    }

    /// Append `node` to chain `index` after `tail` (`None`: chain is empty).
    /// An overflow slot must already be reserved when `tail` is set.
    fn attach(&mut self, index: usize, tail: Option<Link>, mut node: Node) {
        node.next = None;
        match tail {
            None => {
                debug_assert!(self.buckets[index].is_none());
                self.buckets[index] = Some(node);
            }
            Some(tail) => {
                let k = self.overflow.insert(node);
                self.node_mut(tail).next = Some(k);
            }
        }
        self.len += 1;
    }

    fn insert(&mut self, key: &[u8], value: &[u8]) -> Result<InsertOutcome, TableError> {
        let (index, found, tail) = self.probe(key);
        if let Some(link) = found {
            let dispose = self.strategies.dispose_value.clone();
            let node = self.node_mut(link);
            dispose(&mut node.value[..]);
            node.value.copy_from_slice(value);
            return Ok(InsertOutcome::Updated);
        }
        // Every allocation happens before the chain is touched.
        if tail.is_some() {
            self.reserve_overflow(1)?;
        }
        let node = Node::copy_of(key, value)?;
        self.attach(index, tail, node);
        Ok(InsertOutcome::Inserted)
    }

    /// Re-home an entry whose key is known to be absent.
    fn place(&mut self, node: Node) {
        let index = self.bucket_index(&node.key);
        let tail = self.chain(index).last().map(|(link, _)| link);
        self.attach(index, tail, node);
    }

    fn lookup(&self, key: &[u8]) -> Option<&[u8]> {
        let (_, found, _) = self.probe(key);
        found.map(|link| &self.node(link).value[..])
    }

    fn lookup_mut(&mut self, key: &[u8]) -> Option<&mut [u8]> {
        let (_, found, _) = self.probe(key);
        let link = found?;
        Some(&mut self.node_mut(link).value[..])
    }

    fn remove(&mut self, key: &[u8]) -> bool {
        let (_, found, prev) = self.probe(key);
        let Some(link) = found else {
            return false;
        };
        // Unlink first so the chain is consistent while disposers run.
        let mut removed = match link {
            Link::Head(i) => {
                let head = self.buckets[i]
                    .take()
                    .expect("matched chain head must be occupied");
                if let Some(next) = head.next {
                    let successor = self
                        .overflow
                        .remove(next)
                        .expect("successor of a head must be live");
                    self.buckets[i] = Some(successor);
                }
                head
            }
            Link::Overflow(k) => {
                let node = self
                    .overflow
                    .remove(k)
                    .expect("matched overflow node must be live");
                let prev = prev.expect("overflow node must have a predecessor");
                self.node_mut(prev).next = node.next;
                node
            }
        };
        self.len -= 1;
        self.strategies
            .dispose_entry(&mut removed.key, &mut removed.value);
        true
    }

    fn count_collisions(&self) -> usize {
        let collisions = (0..self.buckets.len())
            .map(|i| self.chain(i).count().saturating_sub(1))
            .sum();
        debug_assert_eq!(collisions, self.overflow.len());
        collisions
    }

    /// Rebuild with `len / TARGET_LOAD_FACTOR` buckets, moving every entry.
    /// The new bucket array and enough arena room for every entry to land
    /// in overflow are obtained before anything is touched, so after that
    /// point nothing allocates and nothing can fail.
    fn rehash(&mut self) -> Result<(), TableError> {
        let buckets = empty_buckets(target_bucket_count(self.len))?;
        self.reserve_overflow(self.len)?;
        let old = core::mem::replace(&mut self.buckets, buckets);
        let len = core::mem::replace(&mut self.len, 0);
        // Old and re-placed nodes share the arena. Each old node is removed
        // before it is re-placed, and its successor's key stays live until
        // then.
        for head in old.into_iter().flatten() {
            let mut next = head.next;
            self.place(head);
            while let Some(k) = next {
                let node = self.overflow.remove(k).expect("overflow link must be live");
                next = node.next;
                self.place(node);
            }
        }
        debug_assert_eq!(self.len, len);
        Ok(())
    }
}

impl Drop for Storage {
    fn drop(&mut self) {
        let Storage {
            strategies,
            buckets,
            overflow,
            ..
        } = self;
        for head in buckets.iter_mut().flatten() {
            strategies.dispose_entry(&mut head.key, &mut head.value);
            let mut next = head.next;
            while let Some(k) = next {
                let node = &mut overflow[k];
                strategies.dispose_entry(&mut node.key, &mut node.value);
                next = node.next;
            }
        }
    }
}

/// A hash table with separate chaining whose keys and values are opaque,
/// fixed-size byte blocks.
///
/// Key and value sizes and the hash, equality and disposal callbacks come
/// from the [`TypeDescriptor`] the table is built with. The table copies
/// every key and value it stores and owns those copies; disposers are for
/// resources the blocks *refer to* (for example a heap string whose pointer
/// is the key). Disposers run when an entry is removed, when a value is
/// overwritten (on the old value), and on every live entry when the table
/// is dropped.
///
/// Keys and values passed in must be exactly `key_size()` / `value_size()`
/// bytes long; any other length panics.
///
/// The table is single-threaded and not reentrant: callbacks must not call
/// back into the table that invoked them. Debug builds detect this and
/// panic.
pub struct ChainedTable {
    storage: Storage,
    tracker: OperationTracker,
}

impl ChainedTable {
    /// Table with [`DEFAULT_BUCKET_COUNT`] buckets.
    pub fn new(descriptor: TypeDescriptor) -> Result<Self, TableError> {
        Self::with_buckets(descriptor, DEFAULT_BUCKET_COUNT)
    }

    /// Table with `bucket_count` buckets (at least one). Fails only when
    /// the bucket array cannot be allocated.
    pub fn with_buckets(descriptor: TypeDescriptor, bucket_count: usize) -> Result<Self, TableError> {
        Ok(Self {
            storage: Storage::with_buckets(descriptor.resolve(), bucket_count)?,
            tracker: OperationTracker::new(),
        })
    }

    pub fn len(&self) -> usize {
        self.storage.len
    }

    pub fn is_empty(&self) -> bool {
        self.storage.len == 0
    }

    pub fn bucket_count(&self) -> usize {
        self.storage.buckets.len()
    }

    pub fn key_size(&self) -> usize {
        self.storage.strategies.key_size
    }

    pub fn value_size(&self) -> usize {
        self.storage.strategies.value_size
    }

    #[track_caller]
    fn check_key(&self, key: &[u8]) {
        assert!(
            key.len() == self.key_size(),
            "key block is {} bytes, table keys are {} bytes",
            key.len(),
            self.key_size()
        );
    }

    #[track_caller]
    fn check_value(&self, value: &[u8]) {
        assert!(
            value.len() == self.value_size(),
            "value block is {} bytes, table values are {} bytes",
            value.len(),
            self.value_size()
        );
    }

    /// Store a copy of `key` and `value`, or overwrite the value of an
    /// equal key already present (disposing the old value first).
    ///
    /// On allocation failure nothing is changed.
    pub fn insert(&mut self, key: &[u8], value: &[u8]) -> Result<InsertOutcome, TableError> {
        self.check_key(key);
        self.check_value(value);
        let _op = self.tracker.enter("insert");
        self.storage.insert(key, value)
    }

    /// The value block stored under `key`.
    pub fn lookup(&self, key: &[u8]) -> Option<&[u8]> {
        self.check_key(key);
        let _op = self.tracker.enter("lookup");
        self.storage.lookup(key)
    }

    /// Mutable access to the value block stored under `key`.
    pub fn lookup_mut(&mut self, key: &[u8]) -> Option<&mut [u8]> {
        self.check_key(key);
        let _op = self.tracker.enter("lookup_mut");
        self.storage.lookup_mut(key)
    }

    pub fn contains_key(&self, key: &[u8]) -> bool {
        self.check_key(key);
        let _op = self.tracker.enter("contains_key");
        self.storage.probe(key).1.is_some()
    }

    /// Remove the entry for `key`, running both disposers on it. Returns
    /// `false` and changes nothing when the key is absent.
    pub fn remove(&mut self, key: &[u8]) -> bool {
        self.check_key(key);
        let _op = self.tracker.enter("remove");
        self.storage.remove(key)
    }

    /// `len / bucket_count`.
    pub fn load_factor(&self) -> f64 {
        self.storage.len as f64 / self.storage.buckets.len() as f64
    }

    /// Entries stored beyond the head of their bucket, summed over buckets.
    pub fn count_collisions(&self) -> usize {
        let _op = self.tracker.enter("count_collisions");
        self.storage.count_collisions()
    }

    /// Resize to `floor(len / 0.75)` buckets (at least one) and re-bucket
    /// every entry under the new count.
    ///
    /// Entries move to their new buckets without being copied, so no
    /// disposer runs. If the new bucket array or the overflow room cannot
    /// be allocated the table is left as it was.
    pub fn optimize(&mut self) -> Result<(), TableError> {
        let _op = self.tracker.enter("optimize");
        self.storage.rehash()
    }

    /// Every `(key, value)` pair: buckets in index order, each chain head
    /// first.
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            storage: &self.storage,
            next_bucket: 0,
            chain: Chain {
                overflow: &self.storage.overflow,
                cur: None,
            },
            remaining: self.storage.len,
        }
    }
}

impl core::fmt::Debug for ChainedTable {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ChainedTable")
            .field("len", &self.len())
            .field("bucket_count", &self.bucket_count())
            .field("load_factor", &self.load_factor())
            .field("collisions", &self.storage.count_collisions())
            .field("key_size", &self.key_size())
            .field("value_size", &self.value_size())
            .finish()
    }
}

/// Iterator over the entries of a [`ChainedTable`].
#[derive(Clone)]
pub struct Iter<'a> {
    storage: &'a Storage,
    next_bucket: usize,
    chain: Chain<'a>,
    remaining: usize,
}

impl<'a> Iterator for Iter<'a> {
    type Item = (&'a [u8], &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some((_, node)) = self.chain.next() {
                self.remaining -= 1;
                return Some((&node.key[..], &node.value[..]));
            }
            if self.next_bucket >= self.storage.buckets.len() {
                return None;
            }
            self.chain = self.storage.chain(self.next_bucket);
            self.next_bucket += 1;
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for Iter<'_> {}
impl FusedIterator for Iter<'_> {}

impl<'a> IntoIterator for &'a ChainedTable {
    type Item = (&'a [u8], &'a [u8]);
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
