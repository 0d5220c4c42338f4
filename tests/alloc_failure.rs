// Allocation failure during insert and optimize.
//
// A global allocator grants each test thread a budget of allocations and
// refuses the rest while the budget is armed. Core contracts exercised:
// - The refused allocation is reported as `AllocationFailure` naming the
//   allocation that failed.
// - The table is unchanged afterwards: same length, lookups, collisions and
//   bucket count.
// - Blocks obtained before the refusal are released, not leaked.
// - The table keeps working once memory is available again.
use chained_table::{AllocationSite, ChainedTable, InsertOutcome, TableError, TypeDescriptor};
use std::alloc::{GlobalAlloc, Layout, System};
use std::cell::Cell;

struct Budgeted;

thread_local! {
    static BUDGET: Cell<Option<usize>> = const { Cell::new(None) };
    static LIVE_BYTES: Cell<isize> = const { Cell::new(0) };
}

fn track(delta: isize) {
    let _ = LIVE_BYTES.try_with(|l| l.set(l.get() + delta));
}

// SAFETY: every granted request is forwarded to `System`; a refusal
// returns null, which `GlobalAlloc::alloc` permits.
unsafe impl GlobalAlloc for Budgeted {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let granted = BUDGET
            .try_with(|b| match b.get() {
                None => true,
                Some(0) => false,
                Some(n) => {
                    b.set(Some(n - 1));
                    true
                }
            })
            .unwrap_or(true);
        if !granted {
            return core::ptr::null_mut();
        }
        // SAFETY: caller upholds the `alloc` contract.
        let ptr = unsafe { System.alloc(layout) };
        if !ptr.is_null() {
            track(layout.size() as isize);
        }
        ptr
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        // SAFETY: `ptr` came from `System.alloc` with this layout.
        unsafe { System.dealloc(ptr, layout) };
        track(-(layout.size() as isize));
    }
}

#[global_allocator]
static ALLOC: Budgeted = Budgeted;

/// Run `f` allowing only `allocations` more allocations on this thread.
/// Returns its result and the net change in live heap bytes.
fn with_budget<R>(allocations: usize, f: impl FnOnce() -> R) -> (R, isize) {
    let before = LIVE_BYTES.with(Cell::get);
    BUDGET.with(|b| b.set(Some(allocations)));
    let out = f();
    BUDGET.with(|b| b.set(None));
    (out, LIVE_BYTES.with(Cell::get) - before)
}

fn k(n: u64) -> [u8; 8] {
    n.to_ne_bytes()
}

fn read(block: &[u8]) -> u64 {
    u64::from_ne_bytes(block.try_into().unwrap())
}

fn refused_site(res: Result<impl std::fmt::Debug, TableError>) -> AllocationSite {
    match res {
        Err(TableError::AllocationFailure { site, .. }) => site,
        other => panic!("expected an allocation failure, got {:?}", other),
    }
}

/// Every key lands in bucket 0 of `buckets`.
fn one_chain_table(buckets: usize) -> ChainedTable {
    let desc = TypeDescriptor::of::<u64, u64>().with_hash(|_| 0);
    ChainedTable::with_buckets(desc, buckets).unwrap()
}

fn keys_in_order(t: &ChainedTable) -> Vec<u64> {
    t.iter().map(|(key, _)| read(key)).collect()
}

// Test: new key into an empty bucket, key block refused.
// Verifies: KeyBlock reported; table unchanged; nothing leaked.
#[test]
fn refused_key_block_leaves_table_unchanged() {
    let mut t = ChainedTable::with_buckets(TypeDescriptor::of::<u64, u64>(), 4).unwrap();
    t.insert(&k(1), &k(10)).unwrap();

    let (res, leaked) = with_budget(0, || t.insert(&k(2), &k(20)));
    assert_eq!(refused_site(res), AllocationSite::KeyBlock);
    assert_eq!(leaked, 0);
    assert_eq!(t.len(), 1);
    assert_eq!(t.lookup(&k(2)), None);
    assert_eq!(t.lookup(&k(1)).map(read), Some(10));
    assert_eq!(t.count_collisions(), 0);
}

// Test: key block granted, value block refused.
// Verifies: ValueBlock reported; the key block already copied is released.
#[test]
fn refused_value_block_releases_key_block() {
    let mut t = ChainedTable::with_buckets(TypeDescriptor::of::<u64, u64>(), 4).unwrap();
    t.insert(&k(1), &k(10)).unwrap();

    let (res, leaked) = with_budget(1, || t.insert(&k(2), &k(20)));
    assert_eq!(refused_site(res), AllocationSite::ValueBlock);
    assert_eq!(leaked, 0, "key block leaked");
    assert_eq!(t.len(), 1);
    assert_eq!(t.lookup(&k(2)), None);
    assert_eq!(t.count_collisions(), 0);

    assert_eq!(t.insert(&k(2), &k(20)).unwrap(), InsertOutcome::Inserted);
    assert_eq!(t.lookup(&k(2)).map(read), Some(20));
}

// Test: second key of a one-chain table, arena room refused.
// Verifies: OverflowNode reported before any block is copied; the chain
// is untouched and accepts the key once memory is back.
#[test]
fn refused_overflow_node_leaves_chain_unchanged() {
    let mut t = one_chain_table(1);
    t.insert(&k(1), &k(10)).unwrap();

    let (res, leaked) = with_budget(0, || t.insert(&k(2), &k(20)));
    assert_eq!(refused_site(res), AllocationSite::OverflowNode);
    assert_eq!(leaked, 0);
    assert_eq!(t.len(), 1);
    assert_eq!(t.lookup(&k(2)), None);
    assert_eq!(t.lookup(&k(1)).map(read), Some(10));
    assert_eq!(t.count_collisions(), 0);
    assert_eq!(keys_in_order(&t), vec![1]);

    t.insert(&k(2), &k(20)).unwrap();
    assert_eq!(keys_in_order(&t), vec![1, 2]);
    assert_eq!(t.count_collisions(), 1);
}

// Test: arena room granted, key block refused on an overflow insert.
// Verifies: KeyBlock reported; chain unchanged.
#[test]
fn refused_key_block_after_overflow_reservation() {
    let mut t = one_chain_table(1);
    t.insert(&k(1), &k(10)).unwrap();

    let (res, _) = with_budget(1, || t.insert(&k(2), &k(20)));
    assert_eq!(refused_site(res), AllocationSite::KeyBlock);
    assert_eq!(t.len(), 1);
    assert_eq!(keys_in_order(&t), vec![1]);
    assert_eq!(t.count_collisions(), 0);
}

// Test: updates allocate nothing.
// Verifies: an update succeeds with no allocation budget at all.
#[test]
fn update_needs_no_allocation() {
    let mut t = one_chain_table(1);
    for n in 0..3 {
        t.insert(&k(n), &k(n)).unwrap();
    }
    let (res, leaked) = with_budget(0, || t.insert(&k(2), &k(200)));
    assert_eq!(res.unwrap(), InsertOutcome::Updated);
    assert_eq!(leaked, 0);
    assert_eq!(t.lookup(&k(2)).map(read), Some(200));
}

// Test: optimize with the new bucket array refused.
// Verifies: BucketArray reported; bucket count, entries, chain order and
// collisions are as before.
#[test]
fn refused_bucket_array_leaves_optimize_undone() {
    let mut t = ChainedTable::with_buckets(TypeDescriptor::of::<u64, u64>(), 2).unwrap();
    for n in 0..8 {
        t.insert(&k(n), &k(n * 10)).unwrap();
    }
    let order = keys_in_order(&t);

    let (res, leaked) = with_budget(0, || t.optimize());
    assert_eq!(refused_site(res), AllocationSite::BucketArray);
    assert_eq!(leaked, 0);
    assert_eq!(t.bucket_count(), 2);
    assert_eq!(t.len(), 8);
    assert_eq!(t.count_collisions(), 6);
    assert_eq!(keys_in_order(&t), order);
    for n in 0..8 {
        assert_eq!(t.lookup(&k(n)).map(read), Some(n * 10));
    }

    t.optimize().unwrap();
    assert_eq!(t.bucket_count(), 10);
    assert_eq!(t.count_collisions(), 0);
}

// Test: optimize with the bucket array granted but the arena room refused.
// Verifies: OverflowNode reported; the granted bucket array is released
// and the old layout is kept.
#[test]
fn refused_overflow_room_leaves_optimize_undone() {
    let mut t = one_chain_table(1);
    for n in 0..8 {
        t.insert(&k(n), &k(n)).unwrap();
    }

    let (res, leaked) = with_budget(1, || t.optimize());
    assert_eq!(refused_site(res), AllocationSite::OverflowNode);
    assert_eq!(leaked, 0);
    assert_eq!(t.bucket_count(), 1);
    assert_eq!(t.len(), 8);
    assert_eq!(t.count_collisions(), 7);
    assert_eq!(keys_in_order(&t), (0..8u64).collect::<Vec<_>>());

    t.optimize().unwrap();
    assert_eq!(t.bucket_count(), 10);
    assert_eq!(keys_in_order(&t), (0..8u64).collect::<Vec<_>>());
    assert_eq!(t.count_collisions(), 7);
}
