//! # CLI - RiptideKV Interactive Shell
//!
//! A REPL-style command-line interface for the RiptideKV LSM-trie storage
//! engine. Reads commands from stdin, executes them against a [`engine::Db`],
//! and prints results to stdout. Designed for both interactive use and
//! scripted testing (pipe commands via stdin).
//!
//! ## Commands
//!
//! ```text
//! SET key value   Insert or update a key-value pair
//! GET key         Look up a key (prints value or "(nil)")
//! FLUSH           Force a DB meta file checkpoint
//! STATS           Print engine debug info
//! EXIT / QUIT     Shut down gracefully
//! ```
//!
//! There is no SCAN, DEL, or COMPACT command: the store has no total key
//! order to scan over, no tombstone/delete path, and compaction runs
//! entirely in the background via the engine's own compaction pool.
//!
//! ## Configuration
//!
//! ```text
//! RIPTIDE_META_DIR     DB meta file directory           (default: "data/meta")
//! RIPTIDE_CMAP_CONF    ContainerMap config file path    (default: "data/cmap.conf")
//! RIPTIDE_DATA_DIR     Default backend store, if the    (default: "data/backend.raw")
//!                      ContainerMap config file doesn't exist yet
//! RIPTIDE_BACKEND_GIB  Capacity hint for that default   (default: 4)
//!                      backend, in GiB
//! ```
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use config::{Backend, CmapConfig, EngineConfig};
use engine::{Db, KeyValue};

/// Reads a configuration value from the environment, falling back to `default`.
fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Loads the ContainerMap config file at `path`, or writes a minimal
/// single-backend default (every trie level and the BloomContainer sharing
/// one backend) the first time the CLI is pointed at a fresh data directory.
fn load_or_init_cmap_conf(path: &Path) -> Result<()> {
    if path.exists() {
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let backend_path: PathBuf = env_or("RIPTIDE_DATA_DIR", "data/backend.raw").into();
    if let Some(parent) = backend_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let cap_hint_gib: u64 = env_or("RIPTIDE_BACKEND_GIB", "4").parse().unwrap_or(4);
    let conf = CmapConfig {
        backends: vec![Backend {
            path: backend_path,
            cap_hint_gib,
        }],
        bc_backend: 0,
        data_backend: [0; config::DB_NR_LEVELS],
    };
    conf.write(path).context("writing default ContainerMap config")
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let meta_dir: PathBuf = env_or("RIPTIDE_META_DIR", "data/meta").into();
    let cmap_conf_path: PathBuf = env_or("RIPTIDE_CMAP_CONF", "data/cmap.conf").into();
    load_or_init_cmap_conf(&cmap_conf_path)?;

    let config = EngineConfig::with_meta_dir(meta_dir.clone());
    let db = Db::open(config, cmap_conf_path.clone()).context("opening database")?;

    println!(
        "RiptideKV started (meta_dir={}, cmap_conf={}, root_tables={})",
        meta_dir.display(),
        cmap_conf_path.display(),
        db.root_table_count()
    );
    println!("Commands: SET key value | GET key | FLUSH | STATS | EXIT");
    print!("> ");
    io::stdout().flush().ok();

    let stdin = io::stdin();

    for line in stdin.lock().lines() {
        let line = line?;
        let mut parts = line.split_whitespace();
        if let Some(cmd) = parts.next() {
            match cmd.to_uppercase().as_str() {
                "SET" => {
                    if let Some(k) = parts.next() {
                        let v: String = parts.collect::<Vec<&str>>().join(" ");
                        if v.is_empty() {
                            println!("ERR usage: SET key value");
                        } else {
                            let kv = KeyValue::new(k.as_bytes().to_vec(), v.as_bytes().to_vec());
                            if db.insert(kv) {
                                println!("OK");
                            } else {
                                println!("ERR set failed: active table stayed full after retries");
                            }
                        }
                    } else {
                        println!("ERR usage: SET key value");
                    }
                }
                "GET" => {
                    if let Some(k) = parts.next() {
                        match db.lookup(k.as_bytes()) {
                            Ok(Some(kv)) => println!("{}", String::from_utf8_lossy(&kv.value)),
                            Ok(None) => println!("(nil)"),
                            Err(e) => println!("ERR read failed: {e}"),
                        }
                    } else {
                        println!("ERR usage: GET key");
                    }
                }
                "FLUSH" => {
                    db.force_dump_meta();
                    println!("OK (root_tables={})", db.root_table_count());
                }
                "STATS" => {
                    println!("{db:?}");
                }
                "EXIT" | "QUIT" => {
                    println!("bye");
                    break;
                }
                other => {
                    println!("unknown command: {other}");
                }
            }
        }

        print!("> ");
        io::stdout().flush().ok();
    }

    db.close();
    Ok(())
}
