#![cfg(test)]

// Property tests for ChainedTable kept inside the crate so they can use
// its internal layout knowledge (chain counts) alongside the public API.

use crate::chained_table::ChainedTable;
use crate::descriptor::TypeDescriptor;
use crate::error::InsertOutcome;
use proptest::prelude::*;
use std::cell::Cell;
use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeSet, HashMap};
use std::hash::Hasher;
use std::rc::Rc;

// Pool-indexed operations: indices shrink toward earlier keys, the pool
// shrinks, and op lists shrink in length.
#[derive(Clone, Debug)]
enum Op {
    Insert(usize, i32),
    Remove(usize),
    Lookup(usize),
    Mutate(usize, i32),
    Iterate,
    Optimize,
}

fn arb_scenario() -> impl Strategy<Value = (usize, Vec<u64>, Vec<Op>)> {
    (1usize..=8, proptest::collection::vec(any::<u64>(), 1..=12)).prop_flat_map(
        |(buckets, pool)| {
            let idx = 0..pool.len();
            let op = prop_oneof![
                4 => (idx.clone(), any::<i32>()).prop_map(|(i, v)| Op::Insert(i, v)),
                2 => idx.clone().prop_map(Op::Remove),
                2 => idx.clone().prop_map(Op::Lookup),
                1 => (idx.clone(), any::<i32>()).prop_map(|(i, d)| Op::Mutate(i, d)),
                1 => Just(Op::Iterate),
                1 => Just(Op::Optimize),
            ];
            proptest::collection::vec(op, 1..80).prop_map(move |ops| (buckets, pool.clone(), ops))
        },
    )
}

fn byte_hash(key: &[u8]) -> u64 {
    let mut h = DefaultHasher::new();
    h.write(key);
    h.finish()
}

fn read_i32(block: &[u8]) -> i32 {
    i32::from_ne_bytes(block.try_into().unwrap())
}

#[derive(Default)]
struct Disposals {
    keys: Cell<usize>,
    values: Cell<usize>,
}

fn table_with(
    buckets: usize,
    hash: impl Fn(&[u8]) -> u64 + 'static,
) -> (ChainedTable, Rc<Disposals>) {
    let d = Rc::new(Disposals::default());
    let dk = d.clone();
    let dv = d.clone();
    let desc = TypeDescriptor::of::<u64, i32>()
        .with_hash(hash)
        .with_equals(|a, b| a == b)
        .with_key_disposer(move |_| dk.keys.set(dk.keys.get() + 1))
        .with_value_disposer(move |_| dv.values.set(dv.values.get() + 1));
    (ChainedTable::with_buckets(desc, buckets).unwrap(), d)
}

// Drives one scenario against a std HashMap model.
// Invariants exercised after every op:
// - `len` equals the number of distinct keys in the model.
// - Lookup of every pool key agrees with the model.
// - `load_factor == len / bucket_count`.
// - `count_collisions` equals `len` minus the number of non-empty chains,
//   and equals `len - 1` (or 0) when every key shares one chain.
// - Key disposals equal successful removes; value disposals equal
//   successful removes plus updates. Optimize disposes nothing.
// - Traversal yields each live entry exactly once.
fn run_scenario(
    buckets: usize,
    pool: &[u64],
    ops: Vec<Op>,
    table: (ChainedTable, Rc<Disposals>),
    single_chain: bool,
) -> Result<(), TestCaseError> {
    let (mut sut, disposals) = table;
    let mut model: HashMap<u64, i32> = HashMap::new();
    let mut removes = 0usize;
    let mut updates = 0usize;
    prop_assert_eq!(sut.bucket_count(), buckets);

    for op in ops {
        match op {
            Op::Insert(i, v) => {
                let k = pool[i];
                let already = model.contains_key(&k);
                match sut.insert(&k.to_ne_bytes(), &v.to_ne_bytes()).unwrap() {
                    InsertOutcome::Inserted => prop_assert!(!already, "inserted over a live key"),
                    InsertOutcome::Updated => {
                        prop_assert!(already, "updated an absent key");
                        updates += 1;
                    }
                }
                model.insert(k, v);
            }
            Op::Remove(i) => {
                let k = pool[i];
                let removed = sut.remove(&k.to_ne_bytes());
                prop_assert_eq!(removed, model.remove(&k).is_some());
                if removed {
                    removes += 1;
                }
            }
            Op::Lookup(i) => {
                let k = pool[i];
                let got = sut.lookup(&k.to_ne_bytes()).map(read_i32);
                prop_assert_eq!(got, model.get(&k).copied());
            }
            Op::Mutate(i, d) => {
                let k = pool[i];
                if let Some(block) = sut.lookup_mut(&k.to_ne_bytes()) {
                    let nv = read_i32(block).wrapping_add(d);
                    block.copy_from_slice(&nv.to_ne_bytes());
                    let mv = model.get_mut(&k).expect("present in model");
                    *mv = mv.wrapping_add(d);
                } else {
                    prop_assert!(!model.contains_key(&k));
                }
            }
            Op::Iterate => {
                let seen: Vec<u64> = sut
                    .iter()
                    .map(|(k, _)| u64::from_ne_bytes(k.try_into().unwrap()))
                    .collect();
                let unique: BTreeSet<u64> = seen.iter().copied().collect();
                prop_assert_eq!(seen.len(), unique.len(), "entry visited twice");
                let expected: BTreeSet<u64> = model.keys().copied().collect();
                prop_assert_eq!(unique, expected);
            }
            Op::Optimize => {
                let before = (disposals.keys.get(), disposals.values.get());
                sut.optimize().unwrap();
                prop_assert_eq!(before, (disposals.keys.get(), disposals.values.get()));
                let lf = sut.load_factor();
                let b = sut.bucket_count() as f64;
                prop_assert!(lf <= 0.75 * (b + 1.0) / b, "load factor {} after optimize", lf);
            }
        }

        prop_assert_eq!(sut.len(), model.len());
        prop_assert_eq!(sut.is_empty(), model.is_empty());
        for &k in pool {
            let got = sut.lookup(&k.to_ne_bytes()).map(read_i32);
            prop_assert_eq!(got, model.get(&k).copied());
        }
        prop_assert_eq!(sut.load_factor(), sut.len() as f64 / sut.bucket_count() as f64);

        let chains: BTreeSet<u64> = model
            .keys()
            .map(|k| byte_index(&sut, single_chain, *k))
            .collect();
        prop_assert_eq!(sut.count_collisions(), sut.len() - chains.len());
        if single_chain {
            prop_assert_eq!(sut.count_collisions(), sut.len().saturating_sub(1));
        }

        prop_assert_eq!(disposals.keys.get(), removes);
        prop_assert_eq!(disposals.values.get(), removes + updates);
    }
    Ok(())
}

fn byte_index(t: &ChainedTable, single_chain: bool, k: u64) -> u64 {
    if single_chain {
        0
    } else {
        byte_hash(&k.to_ne_bytes()) % t.bucket_count() as u64
    }
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 128, .. ProptestConfig::default() })]
    #[test]
    fn prop_state_machine((buckets, pool, ops) in arb_scenario()) {
        let table = table_with(buckets, byte_hash);
        run_scenario(buckets, &pool, ops, table, false)?;
    }
}

// Same invariants with every key forced into one chain, stressing head
// promotion and overflow relinking.
proptest! {
    #![proptest_config(ProptestConfig { cases: 128, .. ProptestConfig::default() })]
    #[test]
    fn prop_state_machine_single_chain((buckets, pool, ops) in arb_scenario()) {
        let table = table_with(buckets, |_| 0);
        run_scenario(buckets, &pool, ops, table, true)?;
    }
}

// Dropping the table disposes exactly the entries still live.
proptest! {
    #[test]
    fn prop_drop_disposes_live_entries(keys in proptest::collection::btree_set(any::<u64>(), 0..40), drop_every in 1usize..5) {
        let (mut t, d) = table_with(3, byte_hash);
        for &k in &keys {
            t.insert(&k.to_ne_bytes(), &0i32.to_ne_bytes()).unwrap();
        }
        let mut removed = 0;
        for (i, &k) in keys.iter().enumerate() {
            if i % drop_every == 0 {
                prop_assert!(t.remove(&k.to_ne_bytes()));
                removed += 1;
            }
        }
        prop_assert_eq!(d.keys.get(), removed);
        drop(t);
        prop_assert_eq!(d.keys.get(), keys.len());
        prop_assert_eq!(d.values.get(), keys.len());
    }
}
