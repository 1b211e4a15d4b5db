//! Read-only handle to one dumped [`memtable::Table`]: the disk-side lookup
//! with bloom prefiltering, metaindex-guided fetch deferral, and
//! displacement-chain chasing (spec §4.4).

use std::fs::File;
use std::io::BufReader;
use std::os::unix::fs::FileExt;
use std::path::Path;
use std::sync::Arc;

use bloom::BloomTable;
use memtable::{Barrel, Digest, Item, KeyValue, MetaIndex, BARREL_CAP};

use crate::format::{mtid_path, MetaError, MetaFileHeader, PAGE_SIZE};
use crate::writer::read_embedded_bloomtable;

/// Displacement chains are ≤3 deep in practice; this bounds the recursion
/// against a corrupted metaindex chain that would otherwise loop forever.
const MAX_CHASE_DEPTH: u32 = 16;

/// Read-only handle to one dumped Table. Immutable; the engine releases it
/// (and its backing container) once compaction has replaced it.
pub struct MetaTable {
    pub mtid: u64,
    header: MetaFileHeader,
    metaindex: Vec<MetaIndex>,
    bloomtable: Option<BloomTable>,
    data_file: Arc<File>,
}

impl MetaTable {
    /// Loads the meta file for `mtid` from `meta_dir`. `data_file` is the
    /// already-open raw container backing this table's barrel pages.
    /// `load_bf` skips loading the embedded bloom table for tables whose
    /// filters have migrated into a `BloomContainer` (the caller passes
    /// `load_bf = false` once descent has crossed into BC territory).
    pub fn load(
        meta_dir: &Path,
        mtid: u64,
        data_file: Arc<File>,
        load_bf: bool,
    ) -> Result<Self, MetaError> {
        let path = mtid_path(meta_dir, mtid);
        let file = File::open(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                MetaError::NotFound
            } else {
                MetaError::Io(e)
            }
        })?;
        let mut r = BufReader::new(file);
        let header = MetaFileHeader::read_from(&mut r)?;
        let metaindex = crate::format::read_metaindex(&mut r, header.nr_mi)?;

        let mut len_buf = [0u8; 4];
        std::io::Read::read_exact(&mut r, &mut len_buf)?;
        let blob_len = u32::from_le_bytes(len_buf) as usize;
        let mut blob = vec![0u8; blob_len];
        std::io::Read::read_exact(&mut r, &mut blob)?;
        let bloomtable = if load_bf {
            read_embedded_bloomtable(&blob)?
        } else {
            None
        };

        Ok(Self {
            mtid,
            header,
            metaindex,
            bloomtable,
            data_file,
        })
    }

    pub fn volume(&self) -> u64 {
        self.header.volume
    }

    pub fn off(&self) -> u64 {
        self.header.off
    }

    pub fn bloomtable(&self) -> Option<&BloomTable> {
        self.bloomtable.as_ref()
    }

    fn find_metaindex(&self, bid: u16) -> Option<&MetaIndex> {
        self.metaindex
            .binary_search_by_key(&bid, |mi| mi.id)
            .ok()
            .map(|idx| &self.metaindex[idx])
    }

    /// Reads barrel `bid`'s raw 4096-byte page from the container.
    pub fn read_barrel_raw(&self, bid: u16) -> std::io::Result<[u8; PAGE_SIZE as usize]> {
        let mut page = [0u8; PAGE_SIZE as usize];
        let at = self.header.off + (bid as u64) * PAGE_SIZE;
        self.data_file.read_exact_at(&mut page, at)?;
        Ok(page)
    }

    /// Looks up `key` (with precomputed `digest`). Returns `None` on a bloom
    /// true-negative or an exhausted displacement chain.
    pub fn lookup(&self, key: &[u8], digest: &Digest) -> std::io::Result<Option<KeyValue>> {
        let bid = digest.barrel_id();
        if let Some(bt) = &self.bloomtable {
            if !bt.matches(bid as u32, digest.bloom_hv()) {
                return Ok(None);
            }
        }
        self.lookup_at(key, digest, bid, 0)
    }

    fn lookup_at(
        &self,
        key: &[u8],
        digest: &Digest,
        bid: u16,
        depth: u32,
    ) -> std::io::Result<Option<KeyValue>> {
        if depth > MAX_CHASE_DEPTH {
            return Ok(None);
        }
        let h32 = digest.order_hash(bid);

        // Fetch decision: the table-level metaindex only lists barrels that
        // displaced (nr_out > 0). If it covers `bid` and the query's order
        // hash falls below what's still resident, the key (if present) lives
        // entirely at `mi.rid` -- skip reading `bid`'s page at all.
        if let Some(mi) = self.find_metaindex(bid) {
            if h32 < mi.min {
                assert_ne!(mi.rid, mi.id, "metaindex chain must not be self-referential");
                return self.lookup_at(key, digest, mi.rid, depth + 1);
            }
        }

        let page = self.read_barrel_raw(bid)?;
        let inline_mi = MetaIndex::decode(&page[BARREL_CAP as usize..]);

        if inline_mi.rid != inline_mi.id && h32 < inline_mi.min {
            return self.lookup_at(key, digest, inline_mi.rid, depth + 1);
        }

        for (k, v) in Barrel::parse_page(&page[0..BARREL_CAP as usize]) {
            if k == key {
                return Ok(Some(KeyValue::new(k, v)));
            }
        }

        if inline_mi.rid != inline_mi.id && h32 == inline_mi.min {
            return self.lookup_at(key, digest, inline_mi.rid, depth + 1);
        }
        Ok(None)
    }

    /// Reads every item physically resident in barrel `bid`'s page, ignoring
    /// displacement chains -- used by compaction's feed stage, which reads
    /// each barrel exactly once regardless of where its items logically
    /// belong after retain.
    pub fn scan_barrel(&self, bid: u16) -> std::io::Result<Vec<Item>> {
        let page = self.read_barrel_raw(bid)?;
        Ok(Barrel::parse_page(&page[0..BARREL_CAP as usize])
            .into_iter()
            .map(|(k, v)| Item::new(k, v))
            .collect())
    }
}
