//! On-disk layout constants and the per-Table meta file header.
//!
//! A dumped Table occupies one 32 MiB **container**: [`TABLE_NR_BARRELS`]
//! barrel pages of [`PAGE_SIZE`] bytes each, written to a raw data file or
//! block device at some container-aligned offset. The companion *meta
//! file* (named from the table's `mtid`) carries everything needed to read
//! it back without re-scanning every barrel: the header, the metaindex for
//! displaced barrels, and (optionally) the bloom table.
//!
//! ```text
//! MetaFileHeader { u64 off, u64 volume, u64 nr_mi }  packed, little-endian
//! MetaIndex[nr_mi]                                   packed, sorted by id ascending
//! u32 bt_blob_len
//! u8[bt_blob_len]  (BloomTable::dump blob, zero length when not embedded)
//! ```

use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use memtable::{MetaIndex, TABLE_NR_BARRELS};

/// Size of one barrel page.
pub const PAGE_SIZE: u64 = 4096;

/// Fixed size of one dumped Table's container: `TABLE_NR_BARRELS * 4096`.
pub const TABLE_ALIGN: u64 = TABLE_NR_BARRELS as u64 * PAGE_SIZE;

/// Barrel pages are written to disk in batches of this many pages, per the
/// wire-format note in the spec ("2048-page batches").
pub const DUMP_BATCH_PAGES: usize = 2048;

/// Errors recognized at the metatable seam.
#[derive(Debug, thiserror::Error)]
pub enum MetaError {
    #[error("meta file not found")]
    NotFound,
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("corrupt meta file: {0}")]
    Corrupt(String),
}

/// `{off, volume, nr_mi}`, packed little-endian, 24 bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MetaFileHeader {
    /// Byte offset of this table's barrel pages within its backing container.
    pub off: u64,
    /// Total live-item volume at seal time (`Table::volume`).
    pub volume: u64,
    /// Number of entries in the metaindex that follows the header.
    pub nr_mi: u64,
}

impl MetaFileHeader {
    pub const ENCODED_LEN: usize = 24;

    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(&self.off.to_le_bytes())?;
        w.write_all(&self.volume.to_le_bytes())?;
        w.write_all(&self.nr_mi.to_le_bytes())
    }

    pub fn read_from<R: Read>(r: &mut R) -> io::Result<Self> {
        let mut buf = [0u8; 8];
        r.read_exact(&mut buf)?;
        let off = u64::from_le_bytes(buf);
        r.read_exact(&mut buf)?;
        let volume = u64::from_le_bytes(buf);
        r.read_exact(&mut buf)?;
        let nr_mi = u64::from_le_bytes(buf);
        Ok(Self { off, volume, nr_mi })
    }
}

pub fn write_metaindex<W: Write>(w: &mut W, mis: &[MetaIndex]) -> io::Result<()> {
    for mi in mis {
        w.write_all(&mi.encode())?;
    }
    Ok(())
}

pub fn read_metaindex<R: Read>(r: &mut R, nr_mi: u64) -> io::Result<Vec<MetaIndex>> {
    let mut out = Vec::with_capacity(nr_mi as usize);
    let mut buf = [0u8; MetaIndex::ENCODED_LEN];
    for _ in 0..nr_mi {
        r.read_exact(&mut buf)?;
        out.push(MetaIndex::decode(&buf));
    }
    Ok(out)
}

/// Meta file path for `mtid`: `<meta_dir>/<mtid mod 256, hex 2 digits>/<mtid, hex 16 digits>`.
pub fn mtid_path(meta_dir: &Path, mtid: u64) -> PathBuf {
    let shard = format!("{:02x}", mtid % 256);
    let name = format!("{mtid:016x}");
    meta_dir.join(shard).join(name)
}
