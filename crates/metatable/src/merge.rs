//! Full-table item scanning, used by compaction's feed stage.
//!
//! Unlike a sorted LSM tree, an LSM-trie compaction has no merge step in the
//! sorted-run sense: there is no key order to preserve. "Feeding" a parent
//! MetaTable into 8 child tables means reading every barrel once and routing
//! each item by its digest's child-slot bits. [`scan_range`] and
//! [`ScanPlan`] give the 8-way parallel feed workers disjoint barrel ranges
//! to claim, matching the reference implementation's per-worker token claim.

use memtable::{Item, TABLE_NR_BARRELS};

use crate::reader::MetaTable;

/// Number of parallel feed workers per input MetaTable (spec §4.5: 8-way).
pub const FEED_WORKERS: u16 = 8;

/// `[start, end)` barrel ranges that partition `0..TABLE_NR_BARRELS` into
/// `FEED_WORKERS` roughly-equal, contiguous chunks (`DB_FEED_UNIT` in the
/// spec's constants, `TABLE_MAX_BARRELS / 8 ≈ 1024`).
pub fn feed_ranges() -> Vec<(u16, u16)> {
    let total = TABLE_NR_BARRELS as u16;
    let chunk = total.div_ceil(FEED_WORKERS);
    (0..FEED_WORKERS)
        .map(|i| {
            let start = (i * chunk).min(total);
            let end = ((i + 1) * chunk).min(total);
            (start, end)
        })
        .filter(|(s, e)| s < e)
        .collect()
}

/// Reads every item physically resident in barrels `[start, end)` of `mt`.
/// Each feed worker calls this once for its claimed chunk; taken together
/// over all chunks of one MetaTable, every item is visited exactly once.
pub fn scan_range(mt: &MetaTable, start: u16, end: u16) -> std::io::Result<Vec<Item>> {
    let mut out = Vec::new();
    for bid in start..end {
        out.extend(mt.scan_barrel(bid)?);
    }
    Ok(out)
}

/// Reads every item in `mt`, barrel by barrel. Convenience wrapper over
/// [`scan_range`] for callers (tests, small tables) that don't need the
/// parallel chunking.
pub fn scan_all(mt: &MetaTable) -> std::io::Result<Vec<Item>> {
    scan_range(mt, 0, TABLE_NR_BARRELS as u16)
}
