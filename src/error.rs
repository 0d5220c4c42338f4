//! Error and status types for table operations.

use std::collections::TryReserveError;

/// Which allocation an operation was attempting when the allocator refused.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum AllocationSite {
    BucketArray,
    KeyBlock,
    ValueBlock,
    /// Arena room for an entry beyond the head of its chain.
    OverflowNode,
}

impl core::fmt::Display for AllocationSite {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            AllocationSite::BucketArray => "bucket array",
            AllocationSite::KeyBlock => "key block",
            AllocationSite::ValueBlock => "value block",
            AllocationSite::OverflowNode => "overflow node",
        })
    }
}

/// Errors surfaced by table construction, insertion and rehashing.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
#[non_exhaustive]
pub enum TableError {
    /// The allocator could not provide memory for part of the operation.
    ///
    /// The table is left exactly as it was before the call; any block
    /// already obtained for the attempt has been released.
    #[error("allocation of the {site} failed")]
    AllocationFailure {
        site: AllocationSite,
        #[source]
        source: TryReserveError,
    },
}

impl TableError {
    /// Status code for callers that speak the sentinel protocol.
    pub fn code(&self) -> i32 {
        match self {
            TableError::AllocationFailure { .. } => -1,
        }
    }
}

/// Successful outcome of an insert.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum InsertOutcome {
    /// The key was absent; a new entry now holds it.
    Inserted,
    /// The key was present; its previous value was disposed and overwritten.
    Updated,
}

impl InsertOutcome {
    pub fn code(self) -> i32 {
        match self {
            InsertOutcome::Inserted => 0,
            InsertOutcome::Updated => 1,
        }
    }
}

/// Copy `bytes` into a freshly allocated block of exactly the same size.
pub(crate) fn copy_block(bytes: &[u8], site: AllocationSite) -> Result<Box<[u8]>, TableError> {
    let mut block = Vec::new();
    block
        .try_reserve_exact(bytes.len())
        .map_err(|source| TableError::AllocationFailure { site, source })?;
    block.extend_from_slice(bytes);
    Ok(block.into_boxed_slice())
}
