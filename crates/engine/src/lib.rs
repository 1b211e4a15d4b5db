//! # Engine - RiptideKV LSM-Trie Storage Engine
//!
//! The central orchestrator tying together [`memtable`], [`metatable`],
//! [`bloom`], and [`cmap`] into a complete hash-partitioned, trie-organized
//! key-value store.
//!
//! Unlike a sorted LSM tree, there is no total order and no range scan: a key
//! is routed to a barrel by its digest, barrels are sealed into `MetaTable`s,
//! and sealed tables accumulate under [`trie::VirtualContainer`] nodes until
//! compaction feeds them eight-way down into the next trie level.
//!
//! ## Architecture
//!
//! ```text
//! Client
//!   |
//!   v
//! ┌───────────────────────────────────────────────────────┐
//! │                        DB                              │
//! │                                                        │
//! │ write.rs → active[idx].insert_item (barrel hashed)     │
//! │              |                                         │
//! │              |  active table nears capacity            │
//! │              v                                         │
//! │           dumper.rs → bloomtable + retain + dump        │
//! │              |            → graft MetaTable at root     │
//! │              v                                         │
//! │           compaction.rs → feed 8-way into children      │
//! │                           once a node holds too many    │
//! │                                                        │
//! │ read.rs → active[0], active[1] → trie.rs descent        │
//! │            (first match wins, newest first)            │
//! └───────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Responsibilities
//!
//! | Module        | Purpose                                                  |
//! |---------------|-----------------------------------------------------------|
//! | [`lib.rs`]    | `Inner`/`Db` structs, constructor, accessors, `Drop`       |
//! | [`recovery`]  | ContainerMap + DB meta file loading, cold start            |
//! | [`write`]     | `insert()`, `multi_insert()`                               |
//! | [`read`]      | `lookup()`                                                 |
//! | [`compaction`]| Eight-way trie feed, `CompactionPool`                      |
//! | [`trie`]      | `VirtualContainer`/`Container`, trie descent                |
//! | [`meta`]      | DB meta file encode/decode, `MetaDumper` background thread  |
//! | [`dumper`]    | Active-table seal-and-graft background thread              |
//! | [`rwlock`]    | Ticket-based two-room reader/writer lock                   |
//!
//! ## Crash Safety
//!
//! The DB meta file is written to a fresh `META.<stamp>` file and the `META`
//! symlink re-pointed at it, so a crash mid-checkpoint never corrupts the
//! last good one. ContainerMap bitmaps are dumped alongside it. There is no
//! write-ahead log: an active table's contents are only durable once the
//! dumper has sealed and dumped it, which is the same tradeoff the design
//! accepts in exchange for dropping range scans and transactions.
mod bc;
pub(crate) mod compaction;
mod dumper;
mod error;
mod meta;
mod read;
mod recovery;
mod rwlock;
pub(crate) mod trie;
mod write;

pub use error::EngineError;
pub use memtable::KeyValue;
pub use trie::{BC_START_BIT, DB_CONTAINER_NR, DB_NR_LEVELS};

use std::fs::File;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use cmap::ContainerMap;
use config::EngineConfig;
use memtable::Table;
use rwlock::RwLock;
use trie::VirtualContainer;

/// Number of disjoint compaction subtrees the trie is partitioned into.
pub const DB_COMPACTION_NR: usize = 8;
/// Worker threads in the compaction pool.
pub const DB_COMPACTION_THREADS_NR: usize = 4;
/// Cumulative table volume at which a trie node is considered compactable:
/// `TABLE_ALIGN * 7.2`.
pub const DB_COMPACTION_CAP: u64 = (metatable::TABLE_ALIGN as f64 * 7.2) as u64;

/// Everything the engine needs that outlives a single call: the two active
/// tables, the trie, every level's ContainerMap, and the background threads'
/// shared state. Cheap to clone (it's an `Arc`), so the dumper, compaction
/// pool, and meta-dumper threads each hold their own handle.
pub struct Inner {
    pub(crate) config: EngineConfig,
    pub(crate) rwlock: RwLock,
    /// Double-buffered active write tables; `active_idx` names the one
    /// currently accepting inserts.
    pub(crate) active: [Mutex<Table>; 2],
    pub(crate) active_idx: AtomicUsize,
    pub(crate) root: VirtualContainer,
    /// One ContainerMap per trie level (`root.level()` == `0`); levels that
    /// share a backend (per the ContainerMap config) share the same `Arc`.
    pub(crate) level_cmaps: Vec<Arc<ContainerMap>>,
    pub(crate) level_files: Vec<Arc<File>>,
    pub(crate) bc_cmap: Arc<ContainerMap>,
    pub(crate) bc_file: Arc<File>,
    /// One entry per *backend* (not per level), used only to checkpoint each
    /// distinct bitmap exactly once regardless of how many levels share it.
    pub(crate) backend_cmaps: Vec<Arc<ContainerMap>>,
    /// Serializes root-node compaction across the pool's worker threads.
    pub(crate) compaction_root_mutex: Mutex<()>,
    /// One mutex per root child slot (`DB_COMPACTION_NR` of them), serializing
    /// compaction within that subtree so two workers never feed the same node.
    pub(crate) compaction_sub_mutexes: Vec<Mutex<()>>,
    pub(crate) next_mtid: AtomicU64,
    /// Count of inserts that saw a full active table and had to retry after
    /// the dumper swapped it out. Exposed for diagnostics only.
    pub(crate) set_retry: AtomicU64,
    pub(crate) closing: AtomicBool,
    pub(crate) meta_dumper: Arc<meta::MetaDumper>,
}

impl Inner {
    pub(crate) fn meta_dir(&self) -> &std::path::Path {
        &self.config.meta_dir
    }

    pub(crate) fn checkpoint(&self) -> std::io::Result<()> {
        let rt = self.rwlock.reader_lock();
        let next_mtid = self.next_mtid.load(Ordering::SeqCst);
        let result = meta::checkpoint(self.meta_dir(), &self.root, next_mtid);
        self.rwlock.reader_unlock(rt);
        result?;
        for (i, cmap) in self.backend_cmaps.iter().enumerate() {
            cmap.dump(&self.meta_dir().join(format!("backend{i}.cmap")))?;
        }
        Ok(())
    }
}

/// Handles to the engine's background threads, torn down in [`Db::close`].
struct Threads {
    dumper: std::thread::JoinHandle<()>,
    meta_dumper: std::thread::JoinHandle<()>,
    compaction: compaction::CompactionPool,
}

/// A handle to one open RiptideKV database.
///
/// Opening spawns three kinds of background thread against a shared
/// [`Inner`]: the active-table dumper, the compaction pool, and the
/// meta-dumper. `Db::close` (also run from `Drop`) signals them to stop and
/// joins them, performing one last checkpoint.
pub struct Db {
    pub(crate) inner: Arc<Inner>,
    threads: Mutex<Option<Threads>>,
}

impl std::fmt::Debug for Db {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Db")
            .field("meta_dir", &self.inner.config.meta_dir)
            .field("next_mtid", &self.inner.next_mtid.load(Ordering::SeqCst))
            .field("set_retry", &self.inner.set_retry.load(Ordering::SeqCst))
            .field("root_table_count", &self.inner.root.table_count())
            .finish()
    }
}

impl Db {
    /// Opens (or creates) a database rooted at `config.meta_dir`, reading the
    /// ContainerMap backend layout from `cmap_conf_path`.
    pub fn open(config: EngineConfig, cmap_conf_path: PathBuf) -> Result<Self, EngineError> {
        let inner = Arc::new(recovery::open(config, cmap_conf_path)?);

        let dumper_inner = inner.clone();
        let dumper = std::thread::spawn(move || dumper::run(dumper_inner));

        let meta_inner = inner.clone();
        let interval = inner.config.meta_checkpoint_interval;
        let dumper_handle = inner.meta_dumper.clone();
        let meta_dumper = std::thread::spawn(move || {
            meta::dumper_loop(dumper_handle, interval, || meta_inner.checkpoint())
        });

        let compaction = compaction::CompactionPool::spawn(inner.clone());

        Ok(Db {
            inner,
            threads: Mutex::new(Some(Threads {
                dumper,
                meta_dumper,
                compaction,
            })),
        })
    }

    /// Forces an immediate DB meta file checkpoint and blocks until it's
    /// durable.
    pub fn force_dump_meta(&self) {
        self.inner.meta_dumper.request_checkpoint_and_wait();
    }

    /// Number of MetaTables resident at the trie root (level 0).
    pub fn root_table_count(&self) -> usize {
        self.inner.root.table_count()
    }

    /// Stops all background threads and performs one final checkpoint.
    /// Idempotent: calling this more than once (or letting `Drop` call it
    /// after an explicit `close`) is a no-op the second time.
    pub fn close(&self) {
        let threads = self.threads.lock().unwrap().take();
        let Some(threads) = threads else {
            return;
        };
        self.inner.closing.store(true, Ordering::SeqCst);
        threads.compaction.stop_and_join();
        let _ = threads.dumper.join();
        self.inner.meta_dumper.stop.store(true, Ordering::SeqCst);
        let _ = threads.meta_dumper.join();
        let _ = self.inner.checkpoint();
    }
}

impl Drop for Db {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests;
