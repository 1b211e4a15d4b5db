//! # ContainerMap
//!
//! A fixed-grain bitmap allocator over a raw backing store (a block device
//! or a plain file). Every unit is a 32 MiB container -- the allocation
//! quantum the trie hands out to both `MetaTable`s and `BloomContainer`s.
//!
//! Allocation scans the bitmap starting at a random offset so that
//! concurrent allocators spread their picks across the backing store
//! instead of racing over the same low-numbered units. Release clears the
//! bit and, when the backing store is a block device, issues a TRIM for the
//! freed range.

mod backing;
mod bitmap;

use std::fs::File;
use std::path::Path;
use std::sync::Mutex;

use rand::Rng;
use thiserror::Error;

/// Allocation grain: every unit handed out by [`ContainerMap`] is exactly
/// 32 MiB, the size reserved for one dumped `MetaTable` or `BloomContainer`.
pub const CONTAINER_UNIT_SIZE: u64 = 32 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum CmapError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("backing store too small: holds {have} units, need {need}")]
    TooSmall { have: u64, need: u64 },
    #[error("empty backing store")]
    Empty,
}

struct State {
    nr_units: u64,
    nr_used: u64,
    bits: Vec<u8>,
}

/// Handle to one raw container store plus its allocation bitmap.
pub struct ContainerMap {
    file: File,
    total_cap: u64,
    discard: bool,
    state: Mutex<State>,
}

impl ContainerMap {
    /// Creates (or opens and grows) the backing store at `raw_path` and
    /// formats a fresh, all-free bitmap sized to fit at least `cap_hint`
    /// bytes.
    pub fn create(raw_path: &Path, cap_hint: u64) -> Result<Self, CmapError> {
        let file = backing::open_raw(raw_path, cap_hint)?;
        let probe = backing::probe(&file, raw_path)?;
        let nr_units = probe.total_cap / CONTAINER_UNIT_SIZE;
        if nr_units == 0 || probe.total_cap == 0 {
            return Err(CmapError::Empty);
        }
        Ok(ContainerMap {
            file,
            total_cap: probe.total_cap,
            discard: probe.discard,
            state: Mutex::new(State {
                nr_units,
                nr_used: 0,
                bits: vec![0u8; bitmap::nr_bytes(nr_units)],
            }),
        })
    }

    /// Loads a previously dumped bitmap from `meta_path` and reopens the
    /// backing store at `raw_path`, verifying it is still large enough.
    pub fn load(meta_path: &Path, raw_path: &Path) -> Result<Self, CmapError> {
        let meta = bitmap::read(meta_path)?;
        let file = backing::open_raw(raw_path, meta.nr_units * CONTAINER_UNIT_SIZE)?;
        let probe = backing::probe(&file, raw_path)?;
        let have_units = probe.total_cap / CONTAINER_UNIT_SIZE;
        if have_units < meta.nr_units {
            return Err(CmapError::TooSmall {
                have: have_units,
                need: meta.nr_units,
            });
        }
        Ok(ContainerMap {
            file,
            total_cap: probe.total_cap,
            discard: probe.discard,
            state: Mutex::new(State {
                nr_units: meta.nr_units,
                nr_used: meta.nr_used,
                bits: meta.bits,
            }),
        })
    }

    /// Persists the current bitmap to `meta_path`.
    pub fn dump(&self, meta_path: &Path) -> std::io::Result<()> {
        let state = self.state.lock().unwrap();
        bitmap::write(
            meta_path,
            &bitmap::Meta {
                nr_units: state.nr_units,
                nr_used: state.nr_used,
                bits: state.bits.clone(),
            },
        )
    }

    pub fn nr_units(&self) -> u64 {
        self.state.lock().unwrap().nr_units
    }

    pub fn nr_used(&self) -> u64 {
        self.state.lock().unwrap().nr_used
    }

    pub fn unused(&self) -> u64 {
        let state = self.state.lock().unwrap();
        state.nr_units - state.nr_used
    }

    pub fn total_cap(&self) -> u64 {
        self.total_cap
    }

    /// Offset returned by [`Self::alloc`] when the map is exhausted. Any
    /// offset at or beyond this value is invalid.
    pub fn sentinel(&self) -> u64 {
        self.state.lock().unwrap().nr_units * CONTAINER_UNIT_SIZE
    }

    pub fn is_sentinel(&self, offset: u64) -> bool {
        offset >= self.sentinel()
    }

    /// Picks a free unit starting from a random index and returns its byte
    /// offset into the backing store. Returns [`Self::sentinel`] when full.
    pub fn alloc(&self) -> u64 {
        let mut state = self.state.lock().unwrap();
        if state.nr_used >= state.nr_units {
            return state.nr_units * CONTAINER_UNIT_SIZE;
        }
        let start = rand::thread_rng().gen_range(0..state.nr_units);
        for i in 0..state.nr_units {
            let id = (i + start) % state.nr_units;
            if !bitmap::get(&state.bits, id) {
                bitmap::set(&mut state.bits, id, true);
                state.nr_used += 1;
                return id * CONTAINER_UNIT_SIZE;
            }
        }
        state.nr_units * CONTAINER_UNIT_SIZE
    }

    /// Frees the unit at `offset`, TRIMming it when the backing store is a
    /// block device.
    pub fn release(&self, offset: u64) {
        debug_assert_eq!(offset % CONTAINER_UNIT_SIZE, 0);
        let id = offset / CONTAINER_UNIT_SIZE;
        {
            let mut state = self.state.lock().unwrap();
            if id >= state.nr_units {
                return;
            }
            if !bitmap::get(&state.bits, id) {
                return;
            }
            bitmap::set(&mut state.bits, id, false);
            state.nr_used -= 1;
        }
        if self.discard {
            let _ = backing::trim(&self.file, offset, CONTAINER_UNIT_SIZE);
        }
    }

    /// The open backing-store handle, for callers that need to read or
    /// write container contents directly.
    pub fn raw_file(&self) -> &File {
        &self.file
    }
}

#[cfg(test)]
mod tests;
