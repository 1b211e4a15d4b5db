/// The 8-way hash-partitioned trie ([`VirtualContainer`]) that backs the
/// on-disk levels of the engine. A node at depth `L` has `start_bit = 3*L`
/// and holds up to [`DB_CONTAINER_NR`] sealed `MetaTable`s plus, once
/// `start_bit >= BC_START_BIT`, a consolidating [`bloom::BloomContainer`].
///
/// Nodes at `start_bit == BC_START_BIT` are terminal: they never grow
/// children, and compaction stops recursing once it reaches them. Below
/// that depth every node has exactly 8 children, one per 3-bit digest slice.
use std::fs::File;
use std::sync::{Arc, Mutex};

use bloom::BloomContainer;
use memtable::{Digest, KeyValue};
use metatable::MetaTable;

/// Max MetaTables retained per trie node before compaction is forced.
pub const DB_CONTAINER_NR: usize = 20;
/// Depth (in start_bit units) at which a node becomes terminal and starts
/// consolidating its children's bloom filters into a BloomContainer.
pub const BC_START_BIT: u32 = 12;
/// Number of independently configured data levels (one ContainerMap per
/// level 0..DB_NR_LEVELS).
pub const DB_NR_LEVELS: usize = 5;

pub struct Container {
    /// Oldest at index 0, newest at the end.
    pub tables: Vec<Arc<MetaTable>>,
    pub bloom_container: Option<BloomContainer>,
    /// mtid the current `bloom_container` was last dumped under, used to
    /// render the DB meta file's `bc_mtid` token.
    pub bc_mtid: Option<u64>,
}

impl Container {
    fn new() -> Self {
        Container {
            tables: Vec::new(),
            bloom_container: None,
            bc_mtid: None,
        }
    }

    pub fn is_full(&self) -> bool {
        self.tables.len() >= DB_CONTAINER_NR
    }

    /// Cumulative volume across all resident tables, used by the
    /// compaction trigger.
    pub fn volume(&self) -> u64 {
        self.tables.iter().map(|t| t.volume()).sum()
    }
}

pub struct VirtualContainer {
    pub start_bit: u32,
    pub container: Mutex<Container>,
    pub children: Vec<VirtualContainer>,
}

impl VirtualContainer {
    pub fn build(start_bit: u32) -> Self {
        let children = if start_bit >= BC_START_BIT {
            Vec::new()
        } else {
            (0..8).map(|_| VirtualContainer::build(start_bit + 3)).collect()
        };
        VirtualContainer {
            start_bit,
            container: Mutex::new(Container::new()),
            children,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.children.is_empty()
    }

    pub fn level(&self) -> usize {
        (self.start_bit / 3) as usize
    }

    pub fn child(&self, slot: u8) -> &VirtualContainer {
        &self.children[slot as usize]
    }

    /// Looks up `key` by descending the trie following `digest`'s child-slot
    /// bits, searching each node's resident tables newest-first before
    /// descending further.
    ///
    /// `bc_file` is the single backing file shared by every node's
    /// `BloomContainer` (there is one BloomContainer ContainerMap for the
    /// whole DB). When a node carries one, it is consulted first as a
    /// container-wide negative filter: a zero bitmap means none of the
    /// stacked cohorts can hold the key and the whole node is skipped
    /// without touching any resident table.
    pub fn lookup(&self, key: &[u8], digest: &Digest, bc_file: &File) -> std::io::Result<Option<KeyValue>> {
        {
            let container = self.container.lock().unwrap();
            if let Some(bc) = &container.bloom_container {
                let index = digest.barrel_id() as u32 % bc.nr_barrels().max(1);
                if bc.matches(bc_file, index, digest.bloom_hv())? == 0 {
                    return Ok(None);
                }
            }
            for table in container.tables.iter().rev() {
                if let Some(kv) = table.lookup(key, digest)? {
                    return Ok(Some(kv));
                }
            }
        }
        if self.is_terminal() {
            return Ok(None);
        }
        let slot = digest.child_slot(self.start_bit as u64);
        self.child(slot).lookup(key, digest, bc_file)
    }

    /// Total number of tables across this node's subtree, used by the
    /// dumper's "wait for root to have room" condition and by compaction's
    /// "largest feed count" child selection.
    pub fn table_count(&self) -> usize {
        self.container.lock().unwrap().tables.len()
    }
}
