//! Dumps a sealed [`memtable::Table`] to disk: the barrel pages into a raw
//! container at a caller-chosen offset, and the companion meta file (header
//! + metaindex + optional embedded bloom table).

use std::fs::{self, File};
use std::io::BufWriter;
use std::os::unix::fs::FileExt;
use std::path::Path;

use bloom::BloomTable;
use memtable::{Table, TABLE_NR_BARRELS};

use crate::format::{mtid_path, MetaFileHeader, DUMP_BATCH_PAGES, PAGE_SIZE};

/// Writes every barrel's 4096-byte page to `file` at `off`, in batches of
/// [`DUMP_BATCH_PAGES`] pages, mirroring the reference implementation's
/// staged write rather than one `32 MiB` allocation.
pub fn dump_barrels(table: &Table, file: &File, off: u64) -> std::io::Result<()> {
    let total = TABLE_NR_BARRELS as usize;
    let mut batch = vec![0u8; DUMP_BATCH_PAGES * PAGE_SIZE as usize];
    let mut bid = 0usize;
    while bid < total {
        let n = DUMP_BATCH_PAGES.min(total - bid);
        for i in 0..n {
            let page = &mut batch[i * PAGE_SIZE as usize..(i + 1) * PAGE_SIZE as usize];
            table.barrel((bid + i) as u16).dump_page(page);
        }
        file.write_all_at(&batch[0..n * PAGE_SIZE as usize], off + (bid as u64) * PAGE_SIZE)?;
        bid += n;
    }
    Ok(())
}

/// Writes the meta file for `mtid`: header, metaindex, and (if
/// `embed_bloomtable` is true) the table's bloom table slab. Compaction
/// dumps of destination tables at BloomContainer depth pass
/// `embed_bloomtable = false`, since the filters migrate into the child
/// slot's `BloomContainer` instead.
pub fn dump_meta(
    meta_dir: &Path,
    mtid: u64,
    table: &Table,
    off: u64,
    embed_bloomtable: bool,
) -> std::io::Result<MetaFileHeader> {
    let header = MetaFileHeader {
        off,
        volume: table.volume(),
        nr_mi: table.metaindex().len() as u64,
    };

    let path = mtid_path(meta_dir, mtid);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = File::create(&path)?;
    let mut w = BufWriter::new(file);

    header.write_to(&mut w)?;
    crate::format::write_metaindex(&mut w, table.metaindex())?;

    let mut bt_blob = Vec::new();
    if embed_bloomtable {
        if let Some(bt) = table.bloomtable() {
            bt.dump(&mut bt_blob)?;
        }
    }
    {
        use std::io::Write;
        w.write_all(&(bt_blob.len() as u32).to_le_bytes())?;
        w.write_all(&bt_blob)?;
    }
    Ok(header)
}

/// Convenience wrapper used by the active-table dumper and by compaction's
/// dump-and-bc stage: dumps barrels then meta in one call and returns the
/// header, the caller is responsible for grafting the resulting mtid into
/// the trie and loading it back as a [`crate::MetaTable`].
pub fn dump_table(
    meta_dir: &Path,
    data_file: &File,
    off: u64,
    mtid: u64,
    table: &Table,
    embed_bloomtable: bool,
) -> std::io::Result<MetaFileHeader> {
    dump_barrels(table, data_file, off)?;
    dump_meta(meta_dir, mtid, table, off, embed_bloomtable)
}

/// Loads the raw `BloomTable` previously dumped for reconstruction tests,
/// without a full `MetaTable::load`. Shared by `reader::MetaTable::load`.
pub fn read_embedded_bloomtable(blob: &[u8]) -> std::io::Result<Option<BloomTable>> {
    if blob.is_empty() {
        return Ok(None);
    }
    Ok(Some(BloomTable::load(&mut &blob[..])?))
}
