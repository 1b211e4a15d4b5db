//! Parses and writes the ContainerMap configuration file: up to six backend
//! stores (each a `<path>` / `<hint-in-GiB>` line pair), a `$` sentinel, the
//! backend index reserved for BloomContainers, and one backend index per
//! trie level.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

pub const MAX_BACKENDS: usize = 6;
pub const DB_NR_LEVELS: usize = 5;

#[derive(Debug, Error)]
pub enum CmapConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed ContainerMap config: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backend {
    pub path: PathBuf,
    pub cap_hint_gib: u64,
}

impl Backend {
    pub fn cap_hint_bytes(&self) -> u64 {
        self.cap_hint_gib * 1024 * 1024 * 1024
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CmapConfig {
    pub backends: Vec<Backend>,
    /// Index into `backends` used for BloomContainer storage.
    pub bc_backend: usize,
    /// One backend index per trie level, 0..DB_NR_LEVELS.
    pub data_backend: [usize; DB_NR_LEVELS],
}

impl CmapConfig {
    pub fn parse(text: &str) -> Result<Self, CmapConfigError> {
        let mut lines = text.lines();
        let mut backends = Vec::new();
        loop {
            let first = lines
                .next()
                .ok_or_else(|| CmapConfigError::Malformed("unexpected end of file".into()))?
                .trim();
            if first == "$" {
                break;
            }
            if backends.len() >= MAX_BACKENDS {
                return Err(CmapConfigError::Malformed(format!(
                    "more than {MAX_BACKENDS} backends before '$'"
                )));
            }
            let hint_line = lines.next().ok_or_else(|| {
                CmapConfigError::Malformed("missing capacity hint line".into())
            })?;
            let cap_hint_gib: u64 = hint_line.trim().parse().map_err(|_| {
                CmapConfigError::Malformed(format!("bad capacity hint: {hint_line:?}"))
            })?;
            backends.push(Backend {
                path: PathBuf::from(first),
                cap_hint_gib,
            });
        }
        if backends.is_empty() {
            return Err(CmapConfigError::Malformed("no backends declared".into()));
        }

        let bc_backend = parse_index(lines.next(), backends.len())?;
        let mut data_backend = [0usize; DB_NR_LEVELS];
        for slot in data_backend.iter_mut() {
            *slot = parse_index(lines.next(), backends.len())?;
        }

        Ok(CmapConfig {
            backends,
            bc_backend,
            data_backend,
        })
    }

    pub fn load(path: &Path) -> Result<Self, CmapConfigError> {
        let text = fs::read_to_string(path)?;
        Self::parse(&text)
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for backend in &self.backends {
            out.push_str(&backend.path.display().to_string());
            out.push('\n');
            out.push_str(&backend.cap_hint_gib.to_string());
            out.push('\n');
        }
        out.push_str("$\n");
        out.push_str(&self.bc_backend.to_string());
        out.push('\n');
        for idx in &self.data_backend {
            out.push_str(&idx.to_string());
            out.push('\n');
        }
        out
    }

    pub fn write(&self, path: &Path) -> std::io::Result<()> {
        fs::write(path, self.render())
    }
}

fn parse_index(line: Option<&str>, nr_backends: usize) -> Result<usize, CmapConfigError> {
    let line =
        line.ok_or_else(|| CmapConfigError::Malformed("missing backend index line".into()))?;
    let idx: usize = line
        .trim()
        .parse()
        .map_err(|_| CmapConfigError::Malformed(format!("bad backend index: {line:?}")))?;
    if idx >= nr_backends {
        return Err(CmapConfigError::Malformed(format!(
            "backend index {idx} out of range (have {nr_backends})"
        )));
    }
    Ok(idx)
}
