use bloom::{BloomFilter, BloomTable};

use crate::barrel::{Barrel, MetaIndex, BARREL_CAP};
use crate::digest::{Digest, TABLE_NR_BARRELS};
use crate::item::{Item, KeyValue};

/// Fraction of the theoretical maximum (`TABLE_NR_BARRELS * BARREL_CAP`) a
/// Table is allowed to fill before `insert` starts returning `false`.
pub const TABLE_VOLUME_PERCENT: f64 = 0.95;

/// Coverage target for the metaindex: stop adding entries once this fraction
/// of lookups would land directly on their natural barrel.
pub const METAINDEX_PERCENT: f64 = 0.99;

/// Hard cap on metaindex size regardless of coverage achieved.
pub const METAINDEX_MAX_NR: usize = 2048;

/// Retain gives up after this many redistribution passes.
pub const RETAIN_MAX_PASSES: u32 = 100;

/// Bounds displacement-chain chasing in [`Table::lookup`] against a
/// corrupted `rid` cycle, mirroring `metatable::MetaTable`'s read-side cap.
const MAX_CHASE_DEPTH: u32 = 16;

/// The in-memory, barrel-hashed write buffer. Mutable until [`Table::seal`];
/// sealing builds the bloom table, retains overflowing barrels, and freezes
/// the metaindex used by the disk-side reader.
pub struct Table {
    barrels: Vec<Barrel>,
    volume: u64,
    capacity: u64,
    mis: Vec<MetaIndex>,
    bloomtable: Option<BloomTable>,
}

impl Table {
    /// Builds a Table at `TABLE_VOLUME_PERCENT` of the theoretical max.
    pub fn new() -> Self {
        Self::with_capacity_percent(TABLE_VOLUME_PERCENT)
    }

    pub fn with_capacity_percent(cap_percent: f64) -> Self {
        let cap_max = (TABLE_NR_BARRELS as f64) * (BARREL_CAP as f64);
        let capacity = (cap_max * cap_percent) as u64;
        let barrels = (0..TABLE_NR_BARRELS as u16).map(Barrel::new).collect();
        Self {
            barrels,
            volume: 0,
            capacity,
            mis: Vec::new(),
            bloomtable: None,
        }
    }

    pub fn volume(&self) -> u64 {
        self.volume
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn full(&self) -> bool {
        self.volume >= self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.volume == 0
    }

    /// Inserts `kv`. Returns `false` without mutating state if the table is
    /// already full; callers (the engine write path) are expected to swap
    /// tables and retry rather than treat this as an error.
    pub fn insert(&mut self, kv: &KeyValue) -> bool {
        if self.full() {
            return false;
        }
        let item = Item::new(kv.key.clone(), kv.value.clone());
        self.insert_item(item);
        true
    }

    /// Thread-safe variant is provided at a higher level (the engine takes a
    /// per-barrel lock before calling this during parallel compaction feed);
    /// this method itself assumes exclusive access to `self`.
    pub fn insert_item(&mut self, item: Item) {
        let bid = item.digest.barrel_id() as usize;
        let barrel = &mut self.barrels[bid];
        let vol0 = barrel.volume;
        let victim = barrel.insert(item);
        let _ = victim;
        let vol1 = barrel.volume;
        self.volume += (vol1 as u64).saturating_sub(vol0 as u64);
    }

    /// Looks up `key`, chasing the barrel-level displacement chain
    /// (`Barrel::rid`/`min`) the same way the disk-side `MetaTable` reader
    /// does, so a post-`retain` (but not-yet-dumped) table -- the state the
    /// dumper keeps resident in the non-writer active slot during sealing --
    /// still finds items that moved out of their natural barrel.
    pub fn lookup(&self, key: &[u8]) -> Option<KeyValue> {
        let digest = Digest::of(key);
        self.lookup_at(key, &digest, digest.barrel_id(), 0)
    }

    fn lookup_at(&self, key: &[u8], digest: &Digest, bid: u16, depth: u32) -> Option<KeyValue> {
        if depth > MAX_CHASE_DEPTH {
            return None;
        }
        let barrel = &self.barrels[bid as usize];
        let h32 = digest.order_hash(bid);

        if barrel.nr_out > 0 && h32 < barrel.min {
            return self.lookup_at(key, digest, barrel.rid, depth + 1);
        }

        if let Some(item) = barrel.lookup(key, digest.ht_bucket()) {
            return Some(item.to_keyvalue());
        }

        if barrel.nr_out > 0 && h32 == barrel.min && barrel.rid != bid {
            return self.lookup_at(key, digest, barrel.rid, depth + 1);
        }
        None
    }

    pub fn barrel(&self, id: u16) -> &Barrel {
        &self.barrels[id as usize]
    }

    pub fn metaindex(&self) -> &[MetaIndex] {
        &self.mis
    }

    pub fn bloomtable(&self) -> Option<&BloomTable> {
        self.bloomtable.as_ref()
    }

    /// Builds the per-barrel bloom filters into a single [`BloomTable`].
    /// Must run before [`Table::retain`], since retaining changes which
    /// barrel an item's bytes live in but not its membership in the filter
    /// for its *original* barrel (the filter is keyed by barrel id, not by
    /// current residency).
    pub fn build_bloomtable(&mut self) {
        assert!(self.bloomtable.is_none(), "bloomtable already built");
        let filters: Vec<BloomFilter> = self
            .barrels
            .iter()
            .map(|barrel| {
                let items: Vec<&Item> = barrel.iter().collect();
                let mut bf = BloomFilter::new(items.len() as u32);
                for item in items {
                    bf.update(item.digest.bloom_hv());
                }
                bf
            })
            .collect();
        self.bloomtable = Some(BloomTable::build(&filters));
    }

    /// Redistributes items out of overflowing barrels until every barrel
    /// fits in `BARREL_CAP`, then builds the metaindex. Returns `false` if
    /// retaining does not converge within [`RETAIN_MAX_PASSES`].
    pub fn retain(&mut self) -> bool {
        let mut pass = 0u32;
        loop {
            if pass >= RETAIN_MAX_PASSES {
                return false;
            }
            let mut order: Vec<u16> = (0..self.barrels.len() as u16).collect();
            order.sort_by_key(|&id| self.barrels[id as usize].volume);
            if self.barrels[*order.last().unwrap() as usize].volume <= BARREL_CAP {
                break;
            }
            if !self.retain_pass(&order) {
                return false;
            }
            pass += 1;
        }
        self.build_metaindex();
        true
    }

    /// One sweep of the two-pointer displacement: `L` walks up from the
    /// lightest untouched barrel, `R` walks down from the heaviest, moving
    /// `R`'s lowest-order-hash items into `L` until `R` fits.
    fn retain_pass(&mut self, order: &[u16]) -> bool {
        let mut lid: usize = 0;
        let mut rid: usize = order.len() - 1;
        while lid < rid && self.barrels[order[rid] as usize].volume > BARREL_CAP {
            debug_assert_eq!(self.barrels[order[rid] as usize].nr_out, 0);
            while lid < rid && self.barrels[order[lid] as usize].nr_out > 0 {
                lid += 1;
            }
            if lid >= rid {
                break;
            }
            let r_id = order[rid];
            let l_id = order[lid];
            if !self.move_overflow(r_id, l_id) {
                return false;
            }
            rid -= 1;
            lid += 1;
        }
        self.barrels[order[rid] as usize].volume <= BARREL_CAP
    }

    /// Moves the lowest-order-hash items out of barrel `r_id` into `l_id`
    /// until `r_id` fits in `BARREL_CAP`.
    fn move_overflow(&mut self, r_id: u16, l_id: u16) -> bool {
        let mut items = self.barrels[r_id as usize].to_vec();
        items.sort_by_key(|i| i.digest.order_hash(r_id));

        let mut i = 0usize;
        while self.barrels[r_id as usize].volume > BARREL_CAP {
            if i >= items.len() {
                return false;
            }
            let bucket = items[i].digest.ht_bucket();
            let mut moved = self.barrels[r_id as usize]
                .remove(&items[i].key, bucket)
                .expect("item must still be present");
            moved.nr_moved += 1;
            self.barrels[l_id as usize].insert(moved);
            i += 1;
        }
        if i >= items.len() {
            // Every item in the barrel had to move and it still doesn't fit
            // (e.g. a single oversized item exceeds BARREL_CAP on its own):
            // there's no resident item left to derive `min` from, so this
            // distribution can't be retained.
            return false;
        }
        let r = &mut self.barrels[r_id as usize];
        r.nr_out = i as u16;
        r.rid = l_id;
        r.min = items[i].digest.order_hash(r_id);
        true
    }

    fn build_metaindex(&mut self) {
        let mut order: Vec<u16> = (0..self.barrels.len() as u16).collect();
        // sort by nr_out, descending
        order.sort_by(|&a, &b| {
            self.barrels[b as usize]
                .nr_out
                .cmp(&self.barrels[a as usize].nr_out)
        });

        let mut nr_todo = self.retaining_nr_todo() as i64;
        let mut mis = Vec::new();
        for &id in order.iter().take(METAINDEX_MAX_NR) {
            let barrel = &self.barrels[id as usize];
            if barrel.nr_out == 0 {
                break;
            }
            mis.push(MetaIndex {
                id: barrel.id,
                rid: barrel.rid,
                min: barrel.min,
            });
            if barrel.nr_out as i64 >= nr_todo {
                break;
            }
            nr_todo -= barrel.nr_out as i64;
        }
        mis.sort_by_key(|mi| mi.id);
        self.mis = mis;
    }

    /// `nr_cover = nr_all * METAINDEX_PERCENT - (nr_all - nr_displaced)`,
    /// floored at zero: how many more displaced lookups must be covered by
    /// the metaindex to hit the coverage target.
    fn retaining_nr_todo(&self) -> u64 {
        let mut nr_all: u64 = 0;
        let mut nr_out: u64 = 0;
        for barrel in &self.barrels {
            for item in barrel.iter() {
                nr_all += 1 + item.nr_moved as u64;
            }
            nr_out += barrel.nr_out as u64;
        }
        let nr_covered = nr_all.saturating_sub(nr_out);
        let nr_cover = (nr_all as f64 * METAINDEX_PERCENT) as u64;
        nr_cover.saturating_sub(nr_covered)
    }

    /// Serializes every barrel's 4096-byte page into `out`, which must be
    /// exactly `TABLE_NR_BARRELS * 4096` bytes (one dumped Table's worth).
    pub fn dump_pages(&self, out: &mut [u8]) {
        assert_eq!(out.len(), TABLE_NR_BARRELS as usize * 4096);
        for (i, barrel) in self.barrels.iter().enumerate() {
            let page = &mut out[i * 4096..(i + 1) * 4096];
            barrel.dump_page(page);
        }
    }
}

impl Default for Table {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_lookup() {
        let mut t = Table::new();
        t.insert(&KeyValue::new(b"k1".to_vec(), b"v1".to_vec()));
        assert_eq!(t.lookup(b"k1").unwrap().value, b"v1");
        assert!(t.lookup(b"k2").is_none());
    }

    #[test]
    fn overwrite_returns_latest() {
        let mut t = Table::new();
        t.insert(&KeyValue::new(b"k".to_vec(), b"a".to_vec()));
        t.insert(&KeyValue::new(b"k".to_vec(), b"b".to_vec()));
        assert_eq!(t.lookup(b"k").unwrap().value, b"b");
    }

    #[test]
    fn seal_preserves_all_keys() {
        let mut t = Table::new();
        let mut keys = Vec::new();
        for i in 0..20_000u32 {
            let key = format!("key-{i:06}").into_bytes();
            let value = format!("value-{i}").into_bytes();
            t.insert(&KeyValue::new(key.clone(), value));
            keys.push(key);
        }
        t.build_bloomtable();
        assert!(t.retain());
        for (i, key) in keys.iter().enumerate() {
            let expected = format!("value-{i}");
            let found = t.lookup(key).expect("key must survive retain");
            assert_eq!(found.value, expected.into_bytes());
        }
        for barrel in &t.barrels {
            assert!(barrel.volume <= BARREL_CAP);
        }
        let sum: u64 = t.barrels.iter().map(|b| b.volume as u64).sum();
        assert_eq!(sum, t.volume());
    }

    #[test]
    fn metaindex_sorted_by_id() {
        let mut t = Table::new();
        for i in 0..20_000u32 {
            let key = format!("key-{i:06}").into_bytes();
            t.insert(&KeyValue::new(key, b"v".to_vec()));
        }
        t.build_bloomtable();
        assert!(t.retain());
        let ids: Vec<u16> = t.metaindex().iter().map(|mi| mi.id).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
        assert!(t.metaindex().len() <= METAINDEX_MAX_NR);
    }

    #[test]
    fn full_predicate() {
        let mut t = Table::with_capacity_percent(0.0000001);
        assert!(t.insert(&KeyValue::new(b"a".to_vec(), b"b".to_vec())) || t.full());
    }
}
