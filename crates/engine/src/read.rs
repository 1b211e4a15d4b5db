/// Read path: `lookup()`.
///
/// Point lookups check the two active write buffers first (freshest data,
/// current one before the one mid-seal), then descend the trie: newest
/// resident table wins at each node, bloom/BloomContainer filters prune
/// whole barrels or whole subtrees before any disk I/O.
///
/// There is no range scan: keys are routed by digest, not by sort order, so
/// no ordering exists to scan over (spec Non-goal).
use std::sync::atomic::Ordering;

use memtable::{Digest, KeyValue};

use crate::Db;

impl Db {
    /// Looks up `key`, returning its current value if present.
    pub fn lookup(&self, key: &[u8]) -> std::io::Result<Option<KeyValue>> {
        let rt = self.inner.rwlock.reader_lock();
        let idx = self.inner.active_idx.load(Ordering::SeqCst);
        let result = self.inner.active[idx]
            .lock()
            .unwrap()
            .lookup(key)
            .or_else(|| self.inner.active[1 - idx].lock().unwrap().lookup(key));
        self.inner.rwlock.reader_unlock(rt);
        if let Some(kv) = result {
            return Ok(Some(kv));
        }

        let digest = Digest::of(key);
        self.inner.root.lookup(key, &digest, &self.inner.bc_file)
    }
}
