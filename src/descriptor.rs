//! TypeDescriptor: the key/value layout and callbacks a table is built with.

use crate::strategy;
use std::rc::Rc;

/// Hash of a key block.
pub type HashFn = Rc<dyn Fn(&[u8]) -> u64>;
/// Equality of two key blocks.
pub type EqFn = Rc<dyn Fn(&[u8], &[u8]) -> bool>;
/// Releases resources referenced from inside a key or value block. It must
/// never try to release the block itself; the table owns that memory.
pub type DisposeFn = Rc<dyn Fn(&mut [u8])>;

/// Describes the entries of a table: the exact byte size of every key and
/// value block plus the four callbacks applied to them.
///
/// Unset callbacks resolve to the defaults in [`strategy`]: identity hash
/// and equality (first machine word only, see the module docs for the
/// caveat) and no-op disposal.
///
/// ```
/// use chained_table::{ChainedTable, TypeDescriptor};
///
/// let desc = TypeDescriptor::of::<u32, u64>()
///     .with_hash(|k| u64::from(u32::from_ne_bytes(k.try_into().unwrap())).wrapping_mul(0x9e37_79b9));
/// let mut table = ChainedTable::with_buckets(desc, 8).unwrap();
/// table.insert(&7u32.to_ne_bytes(), &70u64.to_ne_bytes()).unwrap();
/// assert_eq!(table.lookup(&7u32.to_ne_bytes()), Some(&70u64.to_ne_bytes()[..]));
/// ```
#[derive(Clone)]
pub struct TypeDescriptor {
    key_size: usize,
    value_size: usize,
    hash: Option<HashFn>,
    equals: Option<EqFn>,
    dispose_key: Option<DisposeFn>,
    dispose_value: Option<DisposeFn>,
}

impl TypeDescriptor {
    pub fn new(key_size: usize, value_size: usize) -> Self {
        Self {
            key_size,
            value_size,
            hash: None,
            equals: None,
            dispose_key: None,
            dispose_value: None,
        }
    }

    /// Sizes taken from `K` and `V`; all callbacks default.
    pub fn of<K, V>() -> Self {
        Self::new(core::mem::size_of::<K>(), core::mem::size_of::<V>())
    }

    /// Keys are pointers to NUL-terminated strings, values are `V`; hashing
    /// and equality follow the pointer. No disposers are set.
    ///
    /// # Safety
    /// Every key block handed to a table built from this descriptor (for
    /// insertion, lookup or removal) must hold a pointer to a string that
    /// stays alive for as long as the table may read it: stored keys until
    /// they are removed or the table is dropped, probe keys for the call.
    pub unsafe fn text<V>() -> Self {
        Self::new(strategy::WORD, core::mem::size_of::<V>())
            // SAFETY: the constructor's contract covers every key block.
            .with_hash(|k| unsafe { strategy::text_hash(k) })
            .with_equals(|a, b| unsafe { strategy::text_eq(a, b) })
    }

    pub fn with_hash(mut self, hash: impl Fn(&[u8]) -> u64 + 'static) -> Self {
        self.hash = Some(Rc::new(hash));
        self
    }

    pub fn with_equals(mut self, equals: impl Fn(&[u8], &[u8]) -> bool + 'static) -> Self {
        self.equals = Some(Rc::new(equals));
        self
    }

    pub fn with_key_disposer(mut self, dispose: impl Fn(&mut [u8]) + 'static) -> Self {
        self.dispose_key = Some(Rc::new(dispose));
        self
    }

    pub fn with_value_disposer(mut self, dispose: impl Fn(&mut [u8]) + 'static) -> Self {
        self.dispose_value = Some(Rc::new(dispose));
        self
    }

    pub fn key_size(&self) -> usize {
        self.key_size
    }

    pub fn value_size(&self) -> usize {
        self.value_size
    }

    /// Fill unset callbacks with the defaults.
    pub(crate) fn resolve(self) -> Strategies {
        Strategies {
            key_size: self.key_size,
            value_size: self.value_size,
            hash: self
                .hash
                .unwrap_or_else(|| Rc::new(strategy::identity_hash) as HashFn),
            equals: self
                .equals
                .unwrap_or_else(|| Rc::new(strategy::identity_eq) as EqFn),
            dispose_key: self
                .dispose_key
                .unwrap_or_else(|| Rc::new(strategy::noop_dispose) as DisposeFn),
            dispose_value: self
                .dispose_value
                .unwrap_or_else(|| Rc::new(strategy::noop_dispose) as DisposeFn),
        }
    }
}

impl core::fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        fn which<T: ?Sized>(cb: &Option<Rc<T>>) -> &'static str {
            if cb.is_some() {
                "custom"
            } else {
                "default"
            }
        }
        f.debug_struct("TypeDescriptor")
            .field("key_size", &self.key_size)
            .field("value_size", &self.value_size)
            .field("hash", &which(&self.hash))
            .field("equals", &which(&self.equals))
            .field("dispose_key", &which(&self.dispose_key))
            .field("dispose_value", &which(&self.dispose_value))
            .finish()
    }
}

/// A descriptor with every callback resolved; what a table runs on.
pub(crate) struct Strategies {
    pub(crate) key_size: usize,
    pub(crate) value_size: usize,
    pub(crate) hash: HashFn,
    pub(crate) equals: EqFn,
    pub(crate) dispose_key: DisposeFn,
    pub(crate) dispose_value: DisposeFn,
}

impl Strategies {
    #[inline]
    pub(crate) fn hash(&self, key: &[u8]) -> u64 {
        (self.hash)(key)
    }

    #[inline]
    pub(crate) fn equals(&self, a: &[u8], b: &[u8]) -> bool {
        (self.equals)(a, b)
    }

    /// Run both disposers on one entry's blocks.
    pub(crate) fn dispose_entry(&self, key: &mut [u8], value: &mut [u8]) {
        (self.dispose_key)(key);
        (self.dispose_value)(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    /// Invariant: unset callbacks resolve to identity hash/equality and
    /// no-op disposers.
    #[test]
    fn unset_callbacks_resolve_to_defaults() {
        let s = TypeDescriptor::of::<u64, u8>().resolve();
        assert_eq!(s.key_size, 8);
        assert_eq!(s.value_size, 1);
        assert_eq!(s.hash(&99u64.to_ne_bytes()), 99);
        assert!(s.equals(&3u64.to_ne_bytes(), &3u64.to_ne_bytes()));
        assert!(!s.equals(&3u64.to_ne_bytes(), &4u64.to_ne_bytes()));

        let mut k = [1u8; 8];
        let mut v = [2u8];
        s.dispose_entry(&mut k, &mut v);
        assert_eq!(k, [1u8; 8]);
        assert_eq!(v, [2u8]);
    }

    /// Invariant: callbacks set through the builder are the ones invoked.
    #[test]
    fn builder_callbacks_are_used() {
        let disposed = Rc::new(Cell::new(0));
        let dk = disposed.clone();
        let dv = disposed.clone();
        let s = TypeDescriptor::new(2, 2)
            .with_hash(|_| 5)
            .with_equals(|_, _| true)
            .with_key_disposer(move |_| dk.set(dk.get() + 1))
            .with_value_disposer(move |_| dv.set(dv.get() + 10))
            .resolve();
        assert_eq!(s.hash(&[0, 0]), 5);
        assert!(s.equals(&[0, 1], &[1, 0]));
        s.dispose_entry(&mut [0, 0], &mut [0, 0]);
        assert_eq!(disposed.get(), 11);
        (s.dispose_value)(&mut [0u8, 0][..]);
        assert_eq!(disposed.get(), 21);
    }

    #[test]
    fn debug_lists_sizes_and_callback_kinds() {
        let d = TypeDescriptor::new(4, 8).with_hash(|_| 0);
        let s = format!("{:?}", d);
        assert!(s.contains("key_size: 4"));
        assert!(s.contains("hash: \"custom\""));
        assert!(s.contains("equals: \"default\""));
    }

    #[test]
    fn text_descriptor_is_pointer_keyed() {
        let d = unsafe { TypeDescriptor::text::<i32>() };
        assert_eq!(d.key_size(), strategy::WORD);
        assert_eq!(d.value_size(), 4);
        let s = format!("{:?}", d);
        assert!(s.contains("dispose_key: \"default\""));
    }
}
