use tempfile::tempdir;

use crate::{CmapConfig, CmapConfigError, EngineConfig};

#[test]
fn engine_config_default_matches_documented_constants() {
    let cfg = EngineConfig::default();
    assert_eq!(cfg.table_capacity_percent, 0.95);
    assert_eq!(cfg.compaction_threads, 4);
    assert_eq!(cfg.compaction_tokens, 8);
}

fn sample_text() -> String {
    "/data/a\n64\n/data/b\n64\n/data/c\n32\n$\n2\n0\n0\n1\n1\n2\n".to_string()
}

#[test]
fn parses_well_formed_config() {
    let cfg = CmapConfig::parse(&sample_text()).unwrap();
    assert_eq!(cfg.backends.len(), 3);
    assert_eq!(cfg.backends[0].cap_hint_gib, 64);
    assert_eq!(cfg.bc_backend, 2);
    assert_eq!(cfg.data_backend, [0, 0, 1, 1, 2]);
}

#[test]
fn round_trips_through_render() {
    let cfg = CmapConfig::parse(&sample_text()).unwrap();
    let rendered = cfg.render();
    let reparsed = CmapConfig::parse(&rendered).unwrap();
    assert_eq!(cfg, reparsed);
}

#[test]
fn load_reads_from_disk() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("cmap.conf");
    std::fs::write(&path, sample_text()).unwrap();
    let cfg = CmapConfig::load(&path).unwrap();
    assert_eq!(cfg.backends.len(), 3);
}

#[test]
fn rejects_out_of_range_backend_index() {
    let bad = "/data/a\n64\n$\n5\n0\n0\n0\n0\n0\n";
    let err = CmapConfig::parse(bad).unwrap_err();
    assert!(matches!(err, CmapConfigError::Malformed(_)));
}

#[test]
fn rejects_more_than_six_backends() {
    let mut text = String::new();
    for i in 0..7 {
        text.push_str(&format!("/data/{i}\n1\n"));
    }
    text.push_str("$\n0\n0\n0\n0\n0\n0\n");
    let err = CmapConfig::parse(&text).unwrap_err();
    assert!(matches!(err, CmapConfigError::Malformed(_)));
}
