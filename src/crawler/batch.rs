//! Batch planning for the per-member stages
//!
//! A batch is the unit of fetch + merge + persist. Batch sizes are bounded by
//! what one round of API calls can serve: profiles go through direct
//! `users.get` calls, friends and groups through 25-call scripts.

use crate::state::Stage;

/// Ids per profile batch
pub const PROFILE_BATCH_SIZE: usize = 5000;

/// Ids per friends batch (10 scripts of 25 users)
pub const CONNECTION_BATCH_SIZE: usize = 250;

/// Ids per groups batch (10 scripts of 25 users)
pub const GROUP_BATCH_SIZE: usize = 250;

/// Returns the batch size used by a stage
pub fn batch_size(stage: Stage) -> usize {
    match stage {
        Stage::Profiles => PROFILE_BATCH_SIZE,
        Stage::Connections => CONNECTION_BATCH_SIZE,
        Stage::Groups => GROUP_BATCH_SIZE,
    }
}

/// One slice of pending ids
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Batch<'a> {
    /// Zero-based position of the batch within its stage
    pub index: usize,

    /// Number of batches in the stage
    pub total: usize,

    /// Position of the first id of this batch among all pending ids
    pub offset: usize,

    pub ids: &'a [u64],
}

impl Batch<'_> {
    /// Number of ids in this and every later batch
    pub fn remaining_ids(&self, pending: usize) -> usize {
        pending.saturating_sub(self.offset)
    }
}

/// Splits pending ids into consecutive batches of at most `size` ids
pub fn plan_batches(ids: &[u64], size: usize) -> Vec<Batch<'_>> {
    let size = size.max(1);
    let total = ids.len().div_ceil(size);

    ids.chunks(size)
        .enumerate()
        .map(|(index, ids)| Batch {
            index,
            total,
            offset: index * size,
            ids,
        })
        .collect()
}
