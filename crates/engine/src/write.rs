/// The write path: routes a `KeyValue` into whichever `active` table is
/// currently accepting inserts, retrying against the other buffer if the
/// dumper swaps tables out from under a concurrent writer.
use std::sync::atomic::Ordering;

use memtable::KeyValue;
use tracing::trace;

use crate::Db;

/// Swapping the active table happens under the DB write lock and only takes
/// the instant required to move a `Table` out and install a fresh one, so a
/// reader taking the read lock here never observes a half-swapped state; it
/// can, however, observe an `active_idx` that's already moved on, which is
/// why `insert` retries rather than erroring out.
///
/// Per the engine's write contract, `insert` blocks until the dumper makes
/// room rather than surfacing a transient "table full" as a caller-visible
/// failure; the only way it returns `false` is the DB closing while a retry
/// is still pending.
impl Db {
    /// Inserts `kv`, overwriting any existing value for the same key.
    /// Blocks until the active table accepts it. Returns `false` only if the
    /// DB is closing and the write was never accepted.
    pub fn insert(&self, kv: KeyValue) -> bool {
        let mut attempt: u32 = 0;
        loop {
            let rt = self.inner.rwlock.reader_lock();
            let idx = self.inner.active_idx.load(Ordering::SeqCst);
            let ok = self.inner.active[idx].lock().unwrap().insert(&kv);
            self.inner.rwlock.reader_unlock(rt);
            if ok {
                return true;
            }
            if self.inner.closing.load(Ordering::SeqCst) {
                return false;
            }
            self.inner.set_retry.fetch_add(1, Ordering::SeqCst);
            attempt += 1;
            trace!(target: "write", attempt, "active table full, retrying after dumper swap");
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
    }

    /// Inserts every item in `kvs`, stopping early on the first dropped
    /// insert. Returns `false` if any insert was dropped.
    pub fn multi_insert(&self, kvs: Vec<KeyValue>) -> bool {
        let mut all_ok = true;
        for kv in kvs {
            if !self.insert(kv) {
                all_ok = false;
            }
        }
        all_ok
    }
}
