/// Shared scaffolding for engine integration tests: a small ContainerMap
/// config (one backend shared by every level and the BloomContainer) backed
/// by sparse files, so tests stay cheap on disk while exercising the real
/// allocator.
use std::path::PathBuf;

use config::EngineConfig;
use tempfile::TempDir;

use crate::Db;

pub struct TestDb {
    pub dir: TempDir,
    pub db: Db,
}

/// One shared backend (a 1 GiB sparse file, 32 units) used for every trie
/// level and for BloomContainers. Good enough to seal and compact a handful
/// of small tables without running the allocator dry.
pub fn open_test_db() -> TestDb {
    let dir = TempDir::new().unwrap();
    let meta_dir = dir.path().join("meta");
    let backend_path = dir.path().join("backend.raw");

    let cmap_conf = config::CmapConfig {
        backends: vec![config::Backend {
            path: backend_path,
            cap_hint_gib: 1,
        }],
        bc_backend: 0,
        data_backend: [0; config::DB_NR_LEVELS],
    };
    let cmap_conf_path = dir.path().join("cmap.conf");
    cmap_conf.write(&cmap_conf_path).unwrap();

    let config = EngineConfig::with_meta_dir(meta_dir);
    let db = Db::open(config, cmap_conf_path).unwrap();
    TestDb { dir, db }
}

pub fn reopen(t: &TestDb) -> Db {
    let meta_dir = t.dir.path().join("meta");
    let cmap_conf_path = t.dir.path().join("cmap.conf");
    let config = EngineConfig::with_meta_dir(meta_dir);
    Db::open(config, cmap_conf_path).unwrap()
}

#[allow(dead_code)]
pub fn cmap_conf_path(dir: &std::path::Path) -> PathBuf {
    dir.join("cmap.conf")
}
