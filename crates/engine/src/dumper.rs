/// The active-table dumper: swaps the writer over to the other active slot
/// once the current one nears capacity, seals what's left behind (bloomtable
/// + retain + dump + load), and grafts the resulting `MetaTable` onto the
/// trie root.
///
/// The swap itself holds the DB write lock only for the instant it takes to
/// install a fresh writer table in the other slot and flip `active_idx`; the
/// comparatively expensive bloomtable/retain/dump work happens afterwards
/// with writers already unblocked. Critically, the table being sealed is
/// never removed from `active[]` -- it stays resident in what is now the
/// non-writer slot for the entire build_bloomtable/retain/dump/wait-for-root
/// window, so `lookup` (which always checks both active slots before
/// descending the trie) keeps finding every key whose `insert` already
/// returned, right up until the graft below publishes it into the root and
/// the slot is cleared.
use std::sync::atomic::Ordering;
use std::time::Duration;

use memtable::{Table, TABLE_NR_BARRELS};
use metatable::{dump_table, MetaTable};
use tracing::{info, warn};

use crate::Inner;
use std::sync::Arc;

pub fn run(inner: Arc<Inner>) {
    let poll = Duration::from_millis(50);
    loop {
        if inner.closing.load(Ordering::SeqCst) {
            // Drain: seal whatever is left in active[0] one last time if non-empty.
            let idx = inner.active_idx.load(Ordering::SeqCst);
            let has_data = inner.active[idx].lock().unwrap().volume() > 0;
            if has_data {
                seal_active(&inner);
            }
            return;
        }

        let idx = inner.active_idx.load(Ordering::SeqCst);
        let due = inner.active[idx].lock().unwrap().full();
        if due {
            seal_active(&inner);
        } else {
            std::thread::sleep(poll);
        }
    }
}

fn seal_active(inner: &Arc<Inner>) {
    // Flip the writer over to the other slot; the table that was being
    // written stays put at `sealing_idx` (now the non-writer slot) rather
    // than being moved out to a local variable, so it remains visible to
    // `lookup` for as long as sealing takes.
    let sealing_idx = {
        let wt = inner.rwlock.writer_lock();
        let idx = inner.active_idx.load(Ordering::SeqCst);
        let writer_idx = 1 - idx;
        *inner.active[writer_idx].lock().unwrap() = Table::new();
        inner.active_idx.store(writer_idx, Ordering::SeqCst);
        inner.rwlock.writer_unlock(wt);
        idx
    };

    let (mtid, mt) = {
        let mut sealed = inner.active[sealing_idx].lock().unwrap();
        if sealed.is_empty() {
            return;
        }

        sealed.build_bloomtable();
        if !sealed.retain() {
            warn!(target: "dumper", "retain failed to converge; dropping active table");
            *sealed = Table::new();
            return;
        }

        let cmap = &inner.level_cmaps[0];
        let off = cmap.alloc();
        if cmap.is_sentinel(off) {
            warn!(target: "dumper", "level-0 container map exhausted; dropping active table");
            *sealed = Table::new();
            return;
        }

        let mtid = inner.next_mtid.fetch_add(1, Ordering::SeqCst);
        let data_file = &inner.level_files[0];
        if let Err(e) = dump_table(&inner.config.meta_dir, data_file, off, mtid, &sealed, true) {
            warn!(target: "dumper", error = %e, "failed to dump sealed active table");
            cmap.release(off);
            *sealed = Table::new();
            return;
        }

        let mt = match MetaTable::load(&inner.config.meta_dir, mtid, data_file.clone(), true) {
            Ok(mt) => Arc::new(mt),
            Err(e) => {
                warn!(target: "dumper", error = %e, "failed to reload sealed table as MetaTable");
                *sealed = Table::new();
                return;
            }
        };
        (mtid, mt)
        // `sealed` (the lock guard) drops here, but its contents are left in
        // place: the sealed table is still resident at `active[sealing_idx]`
        // for lookups until the graft below.
    };

    while inner.root.table_count() >= crate::trie::DB_CONTAINER_NR {
        if inner.closing.load(Ordering::SeqCst) {
            warn!(target: "dumper", mtid, "root full at shutdown; compaction stopped, grafting anyway");
            break;
        }
        std::thread::sleep(Duration::from_millis(10));
    }

    let wt = inner.rwlock.writer_lock();
    inner.root.container.lock().unwrap().tables.push(mt);
    *inner.active[sealing_idx].lock().unwrap() = Table::new();
    inner.rwlock.writer_unlock(wt);

    info!(target: "dumper", mtid, barrels = TABLE_NR_BARRELS, "sealed active table into root");
}
