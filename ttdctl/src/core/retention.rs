//! Decaying-density retention for numbered savegames.
//!
//! Walking backwards from the newest index, the policy keeps:
//!
//! - the 10 most recent slots,
//! - every 10th slot of the next 100,
//! - every 100th slot beyond that.
//!
//! With the next index at 1244 this keeps 1243..=1234, 1230, 1220, ..., 1140 and
//! 1100, 1000, ..., 100.

use std::collections::BTreeSet;

const RECENT_SLOTS: u32 = 10;
const SPARSE_SLOTS: u32 = 100;

/// Return the indices in `existing` that should be deleted now that `new_index`
/// has been assigned.
///
/// Slots are counted whether or not a file exists for them, so gaps left by
/// earlier pruning never shift the tiers. Indices `>= new_index` are never
/// returned.
pub fn prune(existing: &BTreeSet<u64>, new_index: u64) -> BTreeSet<u64> {
    let mut doomed = BTreeSet::new();
    let mut modulus: u64 = 1;
    let mut keep = RECENT_SLOTS;

    for index in (1..new_index).rev() {
        if index % modulus == 0 {
            keep -= 1;
        } else if existing.contains(&index) {
            doomed.insert(index);
        }

        if keep == 0 {
            modulus = modulus.saturating_mul(10);
            keep = if modulus < 100 {
                RECENT_SLOTS
            } else {
                SPARSE_SLOTS
            };
        }
    }

    doomed
}
