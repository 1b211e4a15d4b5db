//! # Memtable
//!
//! The in-memory, barrel-hashed write buffer for the RiptideKV LSM-trie
//! storage engine.
//!
//! Unlike a conventional sorted memtable, a [`Table`] has no total order: it
//! is partitioned into [`TABLE_NR_BARRELS`] fixed buckets ("barrels") by the
//! low bits of a key's [`Digest`], and within a barrel items chain by a
//! second, smaller hash. This trades range-scan support (which the engine
//! does not offer) for O(1) barrel selection and a bounded per-barrel disk
//! page, which is what lets [`Table::seal`]-adjacent code dump a Table as a
//! flat array of 4 KiB pages rather than a sorted run.
//!
//! ## Key properties
//! - **Hash-partitioned, not sorted**: entries land in `digest % 8191`
//!   barrels; no ordering guarantee across or within barrels beyond the
//!   intra-barrel hash chain.
//! - **Mutable until sealed**: [`Table::insert`] upserts in place; once
//!   [`Table::build_bloomtable`] and [`Table::retain`] have run, the Table is
//!   treated as frozen and handed to the disk-side writer.
//! - **Bounded-page retaining**: [`Table::retain`] displaces items out of
//!   overflowing barrels so every barrel's dumped page fits in
//!   [`barrel::BARREL_CAP`] bytes, recording the displacement in a
//!   [`barrel::MetaIndex`].
//!
//! ## Example
//! ```rust
//! use memtable::{KeyValue, Table};
//!
//! let mut t = Table::new();
//! t.insert(&KeyValue::new(b"hello".to_vec(), b"world".to_vec()));
//! assert_eq!(t.lookup(b"hello").unwrap().value, b"world".to_vec());
//! ```

mod barrel;
mod digest;
mod item;
mod table;
mod varint;

pub use barrel::{Barrel, MetaIndex, BARREL_CAP};
pub use digest::{Digest, BARREL_NR_HT, TABLE_NR_BARRELS};
pub use item::{decode_record, Item, KeyValue};
pub use table::{
    Table, METAINDEX_MAX_NR, METAINDEX_PERCENT, RETAIN_MAX_PASSES, TABLE_VOLUME_PERCENT,
};

#[cfg(test)]
mod tests;
