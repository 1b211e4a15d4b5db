use std::path::PathBuf;
use std::time::Duration;

/// Tunables for one [`engine::Db`] instance.
///
/// `Default` mirrors the constants the original hardcodes: a 95% barrel
/// fill threshold before retain kicks in, four compaction worker threads,
/// and a five second meta-checkpoint poll.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Directory holding the DB meta file, per-mtid MetaTable files, and
    /// the ContainerMap meta files.
    pub meta_dir: PathBuf,
    /// Fraction of `BARREL_CAP` a barrel may reach before a dump is forced.
    /// Matches `memtable::TABLE_VOLUME_PERCENT`.
    pub table_capacity_percent: f64,
    /// Growth factor used when the active table's backing mempool-style
    /// buffers need to grow; the original's `mempool.c` doubles by default.
    pub mempool_growth_factor: f64,
    /// Number of compaction worker threads (`DB_COMPACTION_THREADS_NR`).
    pub compaction_threads: usize,
    /// Number of disjoint sub-tree compaction tokens (`DB_COMPACTION_NR`).
    pub compaction_tokens: usize,
    /// How often the meta-dumper thread checks whether a checkpoint is due.
    pub meta_checkpoint_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            meta_dir: PathBuf::from("."),
            table_capacity_percent: 0.95,
            mempool_growth_factor: 2.0,
            compaction_threads: 4,
            compaction_tokens: 8,
            meta_checkpoint_interval: Duration::from_secs(5),
        }
    }
}

impl EngineConfig {
    pub fn with_meta_dir(meta_dir: impl Into<PathBuf>) -> Self {
        EngineConfig {
            meta_dir: meta_dir.into(),
            ..Default::default()
        }
    }
}
