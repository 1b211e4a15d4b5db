/// Eight-way trie compaction: feeds a node's resident tables into its eight
/// children by digest, building one destination `Table` per child slot,
/// dumping each as a fresh `MetaTable`, consolidating bloom filters into a
/// `BloomContainer` once depth crosses [`crate::trie::BC_START_BIT`], and
/// grafting the results in under the DB write lock.
///
/// Root compaction is serialized by `compaction_root_mutex`; compaction
/// within one of the root's eight subtrees is serialized by that subtree's
/// entry in `compaction_sub_mutexes`. Since only the dumper (which only ever
/// appends to the root) and compaction (which only mutates a node it holds
/// the relevant mutex for) ever touch a `Container`'s `tables` vector, no two
/// threads can race on the same node.
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bloom::BloomContainer;
use memtable::{Item, Table};
use metatable::{dump_table, feed_ranges, scan_range, MetaTable};
use tracing::{info, warn};

use crate::trie::{VirtualContainer, BC_START_BIT};
use crate::Inner;

/// Cumulative-volume trigger, in addition to the table-count cap.
pub(crate) fn feedable_count(node: &VirtualContainer) -> Option<usize> {
    let container = node.container.lock().unwrap();
    if container.tables.is_empty() {
        return None;
    }
    if container.is_full() || container.volume() >= crate::DB_COMPACTION_CAP {
        Some(container.tables.len())
    } else {
        None
    }
}

/// Feeds the `n` oldest tables of `node` into its eight children, grafts the
/// resulting MetaTables, and drains the fed tables out of `node`. Returns
/// the child slots that received at least one item, so the caller can
/// recurse into them.
pub(crate) fn compact_node(inner: &Arc<Inner>, node: &VirtualContainer, n: usize) -> Vec<u8> {
    let sources: Vec<Arc<MetaTable>> = {
        let container = node.container.lock().unwrap();
        container.tables[0..n].to_vec()
    };

    let dest: [Mutex<Table>; 8] = std::array::from_fn(|_| Mutex::new(Table::new()));
    let start_bit = node.start_bit;

    std::thread::scope(|scope| {
        for (range_start, range_end) in feed_ranges() {
            let sources = &sources;
            let dest = &dest;
            scope.spawn(move || {
                for mt in sources {
                    let items = match scan_range(mt, range_start, range_end) {
                        Ok(items) => items,
                        Err(e) => {
                            warn!(target: "compaction", error = %e, "failed scanning barrel range during feed");
                            continue;
                        }
                    };
                    for item in items {
                        route_item(dest, start_bit, item);
                    }
                }
            });
        }
    });

    let dest_start_bit = start_bit + 3;
    let gen_bc = dest_start_bit >= BC_START_BIT;
    let level = node.level() + 1;

    let mut fed_slots = Vec::new();
    for (slot, table) in dest.into_iter().enumerate() {
        let mut table = table.into_inner().unwrap();
        if table.is_empty() {
            continue;
        }
        table.build_bloomtable();
        if !table.retain() {
            warn!(target: "compaction", slot, "retain failed to converge; dropping fed table");
            continue;
        }

        let cmap = &inner.level_cmaps[level];
        let off = cmap.alloc();
        if cmap.is_sentinel(off) {
            warn!(target: "compaction", level, "container map exhausted; dropping fed table");
            continue;
        }

        let mtid = inner.next_mtid.fetch_add(1, Ordering::SeqCst);
        let data_file = &inner.level_files[level];
        if let Err(e) = dump_table(&inner.config.meta_dir, data_file, off, mtid, &table, !gen_bc) {
            warn!(target: "compaction", error = %e, "failed to dump fed table");
            cmap.release(off);
            continue;
        }
        let mt = match MetaTable::load(&inner.config.meta_dir, mtid, data_file.clone(), !gen_bc) {
            Ok(mt) => Arc::new(mt),
            Err(e) => {
                warn!(target: "compaction", error = %e, "failed to reload fed table");
                continue;
            }
        };

        let child = node.child(slot as u8);
        if gen_bc {
            update_bc(inner, child, &table);
        }

        let wt = inner.rwlock.writer_lock();
        child.container.lock().unwrap().tables.push(mt);
        inner.rwlock.writer_unlock(wt);
        fed_slots.push(slot as u8);
    }

    {
        let wt = inner.rwlock.writer_lock();
        let mut container = node.container.lock().unwrap();
        let drained: Vec<Arc<MetaTable>> = container.tables.drain(0..n).collect();
        inner.rwlock.writer_unlock(wt);
        let level0 = node.level();
        for mt in drained {
            inner.level_cmaps[level0].release(mt.off());
            let _ = std::fs::remove_file(metatable::mtid_path(&inner.config.meta_dir, mt.mtid));
        }
    }

    info!(target: "compaction", start_bit, fed = fed_slots.len(), "fed node into children");
    fed_slots
}

fn route_item(dest: &[Mutex<Table>; 8], start_bit: u32, item: Item) {
    let slot = item.digest.child_slot(start_bit as u64) as usize;
    dest[slot].lock().unwrap().insert_item(item);
}

/// Merges the freshly fed table's bloom filters into `child`'s
/// BloomContainer, building one if this is the first table to reach it.
fn update_bc(inner: &Arc<Inner>, child: &VirtualContainer, table: &Table) {
    let bt = match table.bloomtable() {
        Some(bt) => bt,
        None => return,
    };
    let mut container = child.container.lock().unwrap();
    let off = inner.bc_cmap.alloc();
    if inner.bc_cmap.is_sentinel(off) {
        warn!(target: "compaction", "bloomcontainer map exhausted; skipping bloom consolidation");
        return;
    }
    let new_bc = match &container.bloom_container {
        Some(old_bc) => old_bc.update(bt, &inner.bc_file, off),
        None => BloomContainer::build(bt, &inner.bc_file, off),
    };
    let new_bc = match new_bc {
        Ok(bc) => bc,
        Err(e) => {
            warn!(target: "compaction", error = %e, "failed to build/update bloom container");
            inner.bc_cmap.release(off);
            return;
        }
    };

    let new_mtid = inner.next_mtid.fetch_add(1, Ordering::SeqCst);
    if let Err(e) = crate::bc::dump_bc_meta(&inner.config.meta_dir, new_mtid, &new_bc) {
        warn!(target: "compaction", error = %e, "failed to dump bloom container meta");
        inner.bc_cmap.release(off);
        return;
    }

    if let Some(old_bc) = container.bloom_container.take() {
        inner.bc_cmap.release(old_bc.off_raw());
        if let Some(old_mtid) = container.bc_mtid {
            crate::bc::remove_bc_meta(&inner.config.meta_dir, old_mtid);
        }
    }
    container.bloom_container = Some(new_bc);
    container.bc_mtid = Some(new_mtid);
}

/// Repeatedly feeds `node` while it stays over the compaction trigger,
/// recursing into every child slot that received data. A simplification
/// relative to the reference implementation's largest-feed-count subtree
/// selection: every triggered node is drained in full rather than picking
/// one child to prioritize.
pub(crate) fn drain_subtree(inner: &Arc<Inner>, node: &VirtualContainer) {
    if node.is_terminal() {
        return;
    }
    while let Some(n) = feedable_count(node) {
        let fed = compact_node(inner, node, n);
        for slot in fed {
            drain_subtree(inner, node.child(slot));
        }
    }
}

pub struct CompactionPool {
    threads: Vec<std::thread::JoinHandle<()>>,
}

impl CompactionPool {
    pub fn spawn(inner: Arc<Inner>) -> Self {
        let next_token = Arc::new(AtomicUsize::new(0));
        let nr_threads = inner.config.compaction_threads;
        let threads = (0..nr_threads)
            .map(|_| {
                let inner = inner.clone();
                let next_token = next_token.clone();
                std::thread::spawn(move || worker_loop(inner, next_token))
            })
            .collect();
        CompactionPool { threads }
    }

    pub fn stop_and_join(self) {
        for t in self.threads {
            let _ = t.join();
        }
    }
}

fn worker_loop(inner: Arc<Inner>, next_token: Arc<AtomicUsize>) {
    let poll = Duration::from_millis(75);
    loop {
        if inner.closing.load(Ordering::SeqCst) {
            return;
        }

        let mut did_work = false;
        if let Ok(guard) = inner.compaction_root_mutex.try_lock() {
            if let Some(n) = feedable_count(&inner.root) {
                let fed = compact_node(&inner, &inner.root, n);
                drop(guard);
                for slot in fed {
                    if let Ok(_sub) = inner.compaction_sub_mutexes[slot as usize].try_lock() {
                        drain_subtree(&inner, inner.root.child(slot));
                    }
                }
                did_work = true;
            }
        }

        let token = next_token.fetch_add(1, Ordering::SeqCst) % crate::DB_COMPACTION_NR;
        if let Ok(_sub) = inner.compaction_sub_mutexes[token].try_lock() {
            drain_subtree(&inner, inner.root.child(token as u8));
            did_work = true;
        }

        if !did_work {
            std::thread::sleep(poll);
        }
    }
}
