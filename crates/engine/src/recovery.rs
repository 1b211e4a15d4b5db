/// Cold-start path: opens (or creates) one [`ContainerMap`] per trie level
/// plus the shared BloomContainer backend, then reconstructs the trie's
/// contents from the DB meta file (or starts with an empty trie if none
/// exists yet).
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize};
use std::sync::{Arc, Mutex};

use cmap::ContainerMap;
use config::{CmapConfig, EngineConfig};
use memtable::Table;
use metatable::MetaTable;
use tracing::info;

use crate::meta::{self, MetaDumper, ParsedNode};
use crate::rwlock::RwLock;
use crate::trie::{VirtualContainer, DB_NR_LEVELS};
use crate::{EngineError, Inner};

fn open_or_create_cmap(
    meta_path: &Path,
    raw_path: &Path,
    cap_hint: u64,
) -> Result<ContainerMap, EngineError> {
    if meta_path.exists() {
        Ok(ContainerMap::load(meta_path, raw_path)?)
    } else {
        Ok(ContainerMap::create(raw_path, cap_hint)?)
    }
}

/// Opens the DB rooted at `config.meta_dir`, reading the backend layout from
/// `cmap_conf_path` (spec §6's "ContainerMap configuration file").
pub fn open(config: EngineConfig, cmap_conf_path: PathBuf) -> Result<Inner, EngineError> {
    std::fs::create_dir_all(&config.meta_dir)?;
    let cmap_conf = CmapConfig::load(&cmap_conf_path)?;

    // One ContainerMap per *backend*, not per level: two levels configured
    // against the same backend index must share a single bitmap over that
    // backend's byte range, or they'd each allocate independently over the
    // same physical store and silently clobber each other's containers.
    let mut backend_cmaps: Vec<Arc<ContainerMap>> = Vec::with_capacity(cmap_conf.backends.len());
    let mut backend_files: Vec<Arc<File>> = Vec::with_capacity(cmap_conf.backends.len());
    for (i, backend) in cmap_conf.backends.iter().enumerate() {
        let meta_path = config.meta_dir.join(format!("backend{i}.cmap"));
        let cmap = open_or_create_cmap(&meta_path, &backend.path, backend.cap_hint_bytes())?;
        let file = cmap.raw_file().try_clone()?;
        backend_cmaps.push(Arc::new(cmap));
        backend_files.push(Arc::new(file));
    }

    let mut level_cmaps = Vec::with_capacity(DB_NR_LEVELS);
    let mut level_files = Vec::with_capacity(DB_NR_LEVELS);
    for level in 0..DB_NR_LEVELS {
        let backend_idx = cmap_conf.data_backend[level];
        level_cmaps.push(backend_cmaps[backend_idx].clone());
        level_files.push(backend_files[backend_idx].clone());
    }

    let bc_cmap = backend_cmaps[cmap_conf.bc_backend].clone();
    let bc_file = backend_files[cmap_conf.bc_backend].clone();

    let root = VirtualContainer::build(0);
    let next_mtid = match meta::load(&config.meta_dir)? {
        Some(parsed) => {
            populate(&root, &parsed.root, &config.meta_dir, &level_files)?;
            info!(target: "recovery", next_mtid = parsed.next_mtid, "restored trie from DB meta file");
            parsed.next_mtid
        }
        None => {
            info!(target: "recovery", "no DB meta file found; starting with an empty trie");
            0
        }
    };

    let compaction_sub_mutexes = (0..crate::DB_COMPACTION_NR).map(|_| Mutex::new(())).collect();

    Ok(Inner {
        config,
        rwlock: RwLock::new(),
        active: [Mutex::new(Table::new()), Mutex::new(Table::new())],
        active_idx: AtomicUsize::new(0),
        root,
        level_cmaps,
        level_files,
        bc_cmap,
        bc_file,
        backend_cmaps,
        compaction_root_mutex: Mutex::new(()),
        compaction_sub_mutexes,
        next_mtid: AtomicU64::new(next_mtid),
        set_retry: AtomicU64::new(0),
        closing: AtomicBool::new(false),
        meta_dumper: MetaDumper::new(),
    })
}

/// Walks `vc` and `parsed` in lockstep (the trie's shape is fixed at every
/// depth up to [`crate::trie::BC_START_BIT`], so `VirtualContainer::build`
/// already allocated every node the meta file can possibly describe) and
/// loads each listed mtid into a live `MetaTable`/`BloomContainer` handle.
fn populate(
    vc: &VirtualContainer,
    parsed: &ParsedNode,
    meta_dir: &Path,
    level_files: &[Arc<File>],
) -> Result<(), EngineError> {
    if vc.start_bit != parsed.start_bit {
        return Err(EngineError::CorruptMeta(format!(
            "trie shape mismatch: expected start_bit {}, meta file has {}",
            vc.start_bit, parsed.start_bit
        )));
    }
    let data_file = level_files[vc.level()].clone();
    let load_bf = parsed.bc_mtid.is_none();
    {
        let mut container = vc.container.lock().unwrap();
        for &mtid in &parsed.mtids {
            let mt = MetaTable::load(meta_dir, mtid, data_file.clone(), load_bf)?;
            container.tables.push(Arc::new(mt));
        }
        if let Some(bc_mtid) = parsed.bc_mtid {
            let bc = crate::bc::load_bc_meta(meta_dir, bc_mtid)?;
            container.bloom_container = Some(bc);
            container.bc_mtid = Some(bc_mtid);
        }
    }
    if vc.children.len() != parsed.children.len() {
        return Err(EngineError::CorruptMeta(format!(
            "trie shape mismatch at start_bit {}: expected {} children, meta file has {}",
            vc.start_bit,
            vc.children.len(),
            parsed.children.len()
        )));
    }
    for (child_vc, child_parsed) in vc.children.iter().zip(parsed.children.iter()) {
        populate(child_vc, child_parsed, meta_dir, level_files)?;
    }
    Ok(())
}
