/// Per-BloomContainer meta file I/O. A BloomContainer's meta file uses the
/// same `<mtid mod 256>/<mtid>` naming scheme as a MetaTable's (spec §6),
/// since `mtid` is a single counter shared by both kinds of persisted
/// object; only the payload differs (`BloomContainer::dump_meta`/`load_meta`
/// instead of `MetaFileHeader` + metaindex + bloomtable blob).
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::Path;

use bloom::BloomContainer;
use metatable::mtid_path;

pub fn dump_bc_meta(meta_dir: &Path, mtid: u64, bc: &BloomContainer) -> std::io::Result<()> {
    let path = mtid_path(meta_dir, mtid);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = File::create(&path)?;
    let mut w = BufWriter::new(file);
    bc.dump_meta(&mut w)
}

pub fn load_bc_meta(meta_dir: &Path, mtid: u64) -> std::io::Result<BloomContainer> {
    let path = mtid_path(meta_dir, mtid);
    let file = File::open(&path)?;
    let mut r = BufReader::new(file);
    BloomContainer::load_meta(&mut r)
}

pub fn remove_bc_meta(meta_dir: &Path, mtid: u64) {
    let _ = fs::remove_file(mtid_path(meta_dir, mtid));
}
