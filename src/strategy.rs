//! Stock hash, equality and disposal strategies.
//!
//! Every strategy works on raw key/value blocks (`&[u8]` / `&mut [u8]`)
//! so it can be dropped into a [`TypeDescriptor`](crate::TypeDescriptor)
//! for any key layout.
//!
//! The *identity* pair is the default when a descriptor leaves hash or
//! equality unset. It looks only at the first machine word of the key
//! block, so it is correct only when that word alone identifies the key
//! (integers, pointers, handles). Two distinct keys that share a first
//! word are treated as the same key. Supply a real hash and equality for
//! anything wider.
//!
//! The *text* pair and the dereferencing disposers interpret the first
//! word of a block as a pointer and follow it. They are `unsafe` to call:
//! the caller must guarantee the pointer is valid for the access.

use core::cmp::Ordering;
use std::ffi::{c_char, CStr, CString, NulError};

/// Size of a machine word, and of the pointer stored in a text key block.
pub const WORD: usize = core::mem::size_of::<usize>();

const TEXT_BASE: i64 = 31;
const TEXT_MODULUS: i64 = 1_000_000_009;

/// First machine word of `block`, zero-extended when the block is shorter.
#[inline]
fn leading_word(block: &[u8]) -> usize {
    let mut word = [0u8; WORD];
    let n = block.len().min(WORD);
    word[..n].copy_from_slice(&block[..n]);
    usize::from_ne_bytes(word)
}

/// Default hash: the bit pattern of the key's first machine word.
pub fn identity_hash(key: &[u8]) -> u64 {
    leading_word(key) as u64
}

/// Three-way comparison of the first machine word of two keys.
pub fn identity_cmp(a: &[u8], b: &[u8]) -> Ordering {
    leading_word(a).cmp(&leading_word(b))
}

/// Default equality: [`identity_cmp`] reports `Equal`.
pub fn identity_eq(a: &[u8], b: &[u8]) -> bool {
    identity_cmp(a, b) == Ordering::Equal
}

/// Default disposer. Releases nothing.
pub fn noop_dispose(_block: &mut [u8]) {}

/// Polynomial rolling hash over a byte string: base 31, modulus 1e9+9,
/// each byte contributing `(c - 'a' + 1) * 31^i`.
///
/// Bytes are taken as signed `char`s and bytes below `'a'` contribute
/// negative terms; the truncating remainder keeps the sign, so such
/// strings can hash to values near `u64::MAX`. The result is still a
/// pure function of the bytes, which is all bucket placement needs.
pub fn polynomial_hash(text: &[u8]) -> u64 {
    let mut hash: i64 = 0;
    let mut power: i64 = 1;
    for &c in text {
        let term = i64::from(c as i8) - i64::from(b'a') + 1;
        hash = (hash + term * power) % TEXT_MODULUS;
        power = (power * TEXT_BASE) % TEXT_MODULUS;
    }
    hash as u64
}

/// Encode a pointer as a pointer-sized block.
pub fn pointer_block<T>(ptr: *const T) -> [u8; WORD] {
    (ptr as usize).to_ne_bytes()
}

/// Decode the pointer stored in the first word of `block`.
pub fn block_pointer<T>(block: &[u8]) -> *mut T {
    leading_word(block) as *mut T
}

/// Move `text` to the heap as a NUL-terminated string and return a key
/// block owning it. Pair with [`dispose_c_string`] as the key disposer so
/// the table releases the string when the entry goes away.
pub fn c_string_block(text: &str) -> Result<[u8; WORD], NulError> {
    let owned = CString::new(text)?;
    Ok(pointer_block(owned.into_raw().cast_const()))
}

/// Key block that borrows `text`, for lookups and removals. The block is
/// only meaningful while `text` is alive and must never reach a disposer.
pub fn borrowed_c_str_block(text: &CStr) -> [u8; WORD] {
    pointer_block(text.as_ptr())
}

/// # Safety
/// The first word of `block` must point to a live NUL-terminated string.
unsafe fn c_str_of<'a>(block: &[u8]) -> &'a CStr {
    // SAFETY: guaranteed by the caller.
    unsafe { CStr::from_ptr(block_pointer::<c_char>(block)) }
}

/// Text hash: [`polynomial_hash`] of the string the key block points to.
///
/// # Safety
/// The first word of `key` must point to a live NUL-terminated string.
pub unsafe fn text_hash(key: &[u8]) -> u64 {
    // SAFETY: forwarded caller contract.
    polynomial_hash(unsafe { c_str_of(key) }.to_bytes())
}

/// Lexicographic byte comparison of the strings two key blocks point to.
///
/// # Safety
/// The first word of each block must point to a live NUL-terminated string.
pub unsafe fn text_cmp(a: &[u8], b: &[u8]) -> Ordering {
    // SAFETY: forwarded caller contract.
    unsafe { c_str_of(a).to_bytes().cmp(c_str_of(b).to_bytes()) }
}

/// # Safety
/// Same contract as [`text_cmp`].
pub unsafe fn text_eq(a: &[u8], b: &[u8]) -> bool {
    // SAFETY: forwarded caller contract.
    unsafe { text_cmp(a, b) == Ordering::Equal }
}

/// Dereferencing disposer for blocks holding a string made by
/// [`c_string_block`]. A null pointer is ignored; the stored pointer is
/// cleared after release.
///
/// # Safety
/// The first word of `block` must be null or a pointer obtained from
/// `CString::into_raw` that has not been released yet.
pub unsafe fn dispose_c_string(block: &mut [u8]) {
    let ptr = block_pointer::<c_char>(block);
    if ptr.is_null() {
        return;
    }
    // SAFETY: guaranteed by the caller.
    drop(unsafe { CString::from_raw(ptr) });
    clear_pointer(block);
}

/// Dereferencing disposer for blocks holding a `Box<T>` turned into a raw
/// pointer. A null pointer is ignored; the stored pointer is cleared after
/// release.
///
/// # Safety
/// The first word of `block` must be null or a pointer obtained from
/// `Box::<T>::into_raw` that has not been released yet.
pub unsafe fn dispose_boxed<T>(block: &mut [u8]) {
    let ptr = block_pointer::<T>(block);
    if ptr.is_null() {
        return;
    }
    // SAFETY: guaranteed by the caller.
    drop(unsafe { Box::from_raw(ptr) });
    clear_pointer(block);
}

fn clear_pointer(block: &mut [u8]) {
    let n = block.len().min(WORD);
    block[..n].fill(0);
}
