/// The DB meta file: a LISP-like pre-order encoding of the trie plus the
/// `next_mtid` counter, and the background thread that periodically
/// checkpoints it.
///
/// Each node is written as `[ start_bit <|<! mtid* >|>! [bc_mtid] child*8 ]`,
/// an empty leaf as `[ start_bit < > ]`. `<!`/`>!` mark the presence of a
/// BloomContainer so the loader knows to read a `bc_mtid` token and skip
/// requesting embedded bloomtables for that node's MetaTables. The whole
/// render is written to a fresh `META.<unix-nanos>` file and `META` is then
/// re-symlinked to it, so a crash mid-write never corrupts the last good
/// checkpoint.
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::{info, warn};

use crate::trie::VirtualContainer;

pub const META_FILENAME: &str = "META";

fn render_node(vc: &VirtualContainer, out: &mut String) {
    let container = vc.container.lock().unwrap();
    out.push_str("[ ");
    out.push_str(&vc.start_bit.to_string());
    out.push(' ');
    out.push_str(if container.bloom_container.is_some() {
        "<!"
    } else {
        "<"
    });
    for table in &container.tables {
        out.push(' ');
        out.push_str(&format!("{:x}", table.mtid));
    }
    out.push(' ');
    if let Some((mtid, _)) = container.bc_mtid.zip(container.bloom_container.as_ref()) {
        out.push_str(">! ");
        out.push_str(&format!("{mtid:x}"));
    } else {
        out.push('>');
    }
    drop(container);
    for child in &vc.children {
        out.push(' ');
        render_node(child, out);
    }
    out.push_str(" ]");
}

pub fn render(root: &VirtualContainer, next_mtid: u64) -> String {
    let mut out = String::new();
    render_node(root, &mut out);
    out.push('\n');
    out.push_str(&next_mtid.to_string());
    out.push('\n');
    out
}

/// Parsed shape of one trie node: which mtids it held and whether/which
/// BloomContainer mtid was attached. `recovery.rs` turns this into live
/// `MetaTable`/`BloomContainer` handles by loading each mtid from disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedNode {
    pub start_bit: u32,
    pub mtids: Vec<u64>,
    pub bc_mtid: Option<u64>,
    pub children: Vec<ParsedNode>,
}

pub struct Parsed {
    pub root: ParsedNode,
    pub next_mtid: u64,
}

struct Tokens<'a> {
    iter: std::iter::Peekable<std::str::SplitWhitespace<'a>>,
}

impl<'a> Tokens<'a> {
    fn next(&mut self) -> io::Result<&'a str> {
        self.iter
            .next()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "unexpected end of DB meta file"))
    }

    fn peek(&mut self) -> Option<&&'a str> {
        self.iter.peek()
    }
}

fn parse_node(toks: &mut Tokens) -> io::Result<ParsedNode> {
    let open = toks.next()?;
    if open != "[" {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "expected '['"));
    }
    let start_bit: u32 = toks
        .next()?
        .parse()
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "bad start_bit"))?;
    let open_angle = toks.next()?;
    let has_bc = match open_angle {
        "<" => false,
        "<!" => true,
        _ => return Err(io::Error::new(io::ErrorKind::InvalidData, "expected '<' or '<!'")),
    };

    let mut mtids = Vec::new();
    loop {
        match toks.peek() {
            Some(&">") | Some(&">!") => break,
            Some(_) => {
                let tok = toks.next()?;
                let mtid = u64::from_str_radix(tok, 16)
                    .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "bad mtid"))?;
                mtids.push(mtid);
            }
            None => return Err(io::Error::new(io::ErrorKind::InvalidData, "unterminated mtid list")),
        }
    }
    let close_angle = toks.next()?;
    let bc_mtid = match (close_angle, has_bc) {
        (">", false) => None,
        (">!", true) => {
            let tok = toks.next()?;
            Some(
                u64::from_str_radix(tok, 16)
                    .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "bad bc_mtid"))?,
            )
        }
        _ => return Err(io::Error::new(io::ErrorKind::InvalidData, "mismatched '<'/'>' markers")),
    };

    let mut children = Vec::new();
    while toks.peek() == Some(&"[") {
        children.push(parse_node(toks)?);
    }

    let close = toks.next()?;
    if close != "]" {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "expected ']'"));
    }

    Ok(ParsedNode {
        start_bit,
        mtids,
        bc_mtid,
        children,
    })
}

pub fn parse(text: &str) -> io::Result<Parsed> {
    let mut lines = text.splitn(2, '\n');
    let tree_text = lines
        .next()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "empty DB meta file"))?;
    let rest = lines
        .next()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "missing next_mtid line"))?;
    let next_mtid: u64 = rest
        .trim()
        .parse()
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "bad next_mtid"))?;

    let mut toks = Tokens {
        iter: tree_text.split_whitespace().peekable(),
    };
    let root = parse_node(&mut toks)?;
    Ok(Parsed { root, next_mtid })
}

/// Writes the rendered meta to `META.<unix-nanos>` and atomically
/// re-points the `META` symlink at it.
pub fn checkpoint(meta_dir: &Path, root: &VirtualContainer, next_mtid: u64) -> io::Result<PathBuf> {
    let stamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let backup_name = format!("META.{stamp}");
    let backup_path = meta_dir.join(&backup_name);
    fs::write(&backup_path, render(root, next_mtid))?;

    let link_path = meta_dir.join(META_FILENAME);
    let tmp_link = meta_dir.join(format!("META.{stamp}.link"));
    #[cfg(unix)]
    {
        std::os::unix::fs::symlink(&backup_name, &tmp_link)?;
        fs::rename(&tmp_link, &link_path)?;
    }
    #[cfg(not(unix))]
    {
        fs::copy(&backup_path, &link_path)?;
    }
    Ok(backup_path)
}

pub fn load(meta_dir: &Path) -> io::Result<Option<Parsed>> {
    let link_path = meta_dir.join(META_FILENAME);
    if !link_path.exists() {
        return Ok(None);
    }
    let text = fs::read_to_string(&link_path)?;
    Ok(Some(parse(&text)?))
}

/// Background thread body: periodically (and whenever `force` is raised)
/// re-renders the trie and every ContainerMap's bitmap to disk.
pub struct MetaDumper {
    pub force: AtomicBool,
    pub done_cond: Condvar,
    pub done_mutex: Mutex<u64>,
    pub generation: AtomicU64,
    pub stop: AtomicBool,
}

impl MetaDumper {
    pub fn new() -> Arc<Self> {
        Arc::new(MetaDumper {
            force: AtomicBool::new(false),
            done_cond: Condvar::new(),
            done_mutex: Mutex::new(0),
            generation: AtomicU64::new(0),
            stop: AtomicBool::new(false),
        })
    }

    pub fn request_checkpoint_and_wait(&self) {
        let start_gen = self.generation.load(Ordering::SeqCst);
        self.force.store(true, Ordering::SeqCst);
        let guard = self.done_mutex.lock().unwrap();
        let _ = self
            .done_cond
            .wait_while(guard, |done_gen| *done_gen <= start_gen)
            .unwrap();
    }

    pub fn run_once<F>(&self, checkpoint_fn: F)
    where
        F: Fn() -> io::Result<()>,
    {
        match checkpoint_fn() {
            Ok(()) => info!(target: "meta_dumper", "checkpoint complete"),
            Err(e) => warn!(target: "meta_dumper", error = %e, "checkpoint failed"),
        }
        let mut done_gen = self.done_mutex.lock().unwrap();
        *done_gen += 1;
        self.generation.store(*done_gen, Ordering::SeqCst);
        self.done_cond.notify_all();
    }
}

pub fn dumper_loop<F>(dumper: Arc<MetaDumper>, interval: Duration, checkpoint_fn: F)
where
    F: Fn() -> io::Result<()>,
{
    let poll = Duration::from_millis(200).min(interval);
    let mut elapsed = Duration::ZERO;
    loop {
        if dumper.stop.load(Ordering::SeqCst) {
            dumper.run_once(&checkpoint_fn);
            return;
        }
        if dumper.force.swap(false, Ordering::SeqCst) || elapsed >= interval {
            dumper.run_once(&checkpoint_fn);
            elapsed = Duration::ZERO;
            continue;
        }
        std::thread::sleep(poll);
        elapsed += poll;
    }
}
