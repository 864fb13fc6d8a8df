use anyhow::{Context, Result};

static INIT_ONCE: std::sync::Once = std::sync::Once::new();

/// Map a CLI-style verbosity level onto a default tracing filter.
/// `RUST_LOG`, when set, always wins.
pub fn filter_for_verbosity(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

pub fn init_tracing_once(verbosity: u8) {
    INIT_ONCE.call_once(|| {
        let env_filter = std::env::var("RUST_LOG")
            .unwrap_or_else(|_| filter_for_verbosity(verbosity).to_string());
        let _ = tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .try_init();
    });
}

// -------- internal address list: defaults + merging from env/file --------

/// Normalize one address entry (trim, lowercase so IPv6 spellings compare equal).
#[inline]
pub fn normalize_ip(s: &str) -> String {
    s.trim().to_lowercase()
}

/// Merge extra internal addresses from env/file into the provided vector (in-place).
/// - EXPORT_INTERNAL_IPS: comma/semicolon/space separated addresses
/// - EXPORT_INTERNAL_IPS_FILE: path to newline-separated file of addresses (`#` comments allowed)
/// All entries are normalized, then the list is sort+dedup.
pub fn merge_internal_ips(target: &mut Vec<String>) {
    use std::fs::File;
    use std::io::{BufRead, BufReader};

    if let Ok(s) = std::env::var("EXPORT_INTERNAL_IPS") {
        for raw in s.split(|c: char| c == ',' || c == ';' || c.is_whitespace()) {
            let n = normalize_ip(raw);
            if !n.is_empty() {
                target.push(n);
            }
        }
    }

    if let Ok(path) = std::env::var("EXPORT_INTERNAL_IPS_FILE") {
        if !path.trim().is_empty() {
            if let Ok(f) = File::open(&path) {
                let r = BufReader::new(f);
                for line in r.lines().map_while(|l| l.ok()) {
                    let line = line.split('#').next().unwrap_or("");
                    let n = normalize_ip(line);
                    if !n.is_empty() {
                        target.push(n);
                    }
                }
            } else {
                tracing::warn!("EXPORT_INTERNAL_IPS_FILE is set but cannot be opened: {}", path);
            }
        }
    }

    dedup_ips(target);
}

/// Normalize every entry, drop blanks, then sort + dedup.
pub fn dedup_ips(target: &mut Vec<String>) {
    for s in target.iter_mut() {
        *s = normalize_ip(s);
    }
    target.retain(|s| !s.is_empty());
    target.sort();
    target.dedup();
}

// -------- file operations that ride out transient sharing errors --------

use std::fs;
use std::fs::File;
use std::io;
use std::path::Path;
use std::thread::sleep;
use std::time::Duration;

/// Errors seen on Windows while AV/backup filters or another process hold the file:
/// access denied (5), sharing (32) and lock (33) violations, device not ready (21),
/// user-mapped section open (1224).
fn is_retriable_io_error(e: &io::Error) -> bool {
    matches!(e.raw_os_error(), Some(5 | 21 | 32 | 33 | 1224))
}

/// Run `op` up to `tries` times, sleeping a linearly growing delay between
/// retriable failures. Other errors are returned at once.
fn retry_io<T>(tries: usize, delay_ms: u64, what: &str, mut op: impl FnMut() -> io::Result<T>) -> io::Result<T> {
    let mut last_err = None;
    for attempt in 1..=tries.max(1) {
        match op() {
            Ok(v) => return Ok(v),
            Err(e) if is_retriable_io_error(&e) => {
                tracing::trace!(attempt, error=%e, "{what}: transient failure, retrying");
                last_err = Some(e);
                sleep(Duration::from_millis(delay_ms.saturating_mul(attempt as u64)));
            }
            Err(e) => return Err(e),
        }
    }
    Err(last_err.unwrap_or_else(|| io::Error::other(format!("{what} failed"))))
}

pub fn open_with_backoff(path: &Path, tries: usize, delay_ms: u64) -> io::Result<File> {
    retry_io(tries, delay_ms, "open", || File::open(path))
}

/// Create (truncate) `path`.
pub fn create_with_backoff(path: &Path, tries: usize, delay_ms: u64) -> io::Result<File> {
    retry_io(tries, delay_ms, "create", || File::create(path))
}

/// Remove `path`; a file that is already gone counts as removed.
pub fn remove_with_backoff(path: &Path, tries: usize, delay_ms: u64) -> Result<()> {
    retry_io(tries, delay_ms, "remove", || match fs::remove_file(path) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    })
    .with_context(|| format!("remove {}", path.display()))
}

fn rename_with_backoff(src: &Path, dest: &Path, tries: usize, delay_ms: u64) -> Result<()> {
    retry_io(tries, delay_ms, "rename", || fs::rename(src, dest))
        .with_context(|| format!("rename {} -> {}", src.display(), dest.display()))
}

/// Replace `dest` with the fully written `tmp`.
///
/// A plain rename over an existing `dest` is atomic on POSIX, so readers see either
/// the old or the new file. Only when that fails (Windows sharing rules) do we fall
/// back to remove + rename, which has a short window with no `dest` at all.
pub fn replace_file_atomic_backoff(tmp: &Path, dest: &Path) -> Result<()> {
    let tries = 20usize;
    let delay_ms = 50u64;
    if fs::rename(tmp, dest).is_ok() {
        return Ok(());
    }
    if dest.exists() {
        remove_with_backoff(dest, tries, delay_ms)?;
    }
    rename_with_backoff(tmp, dest, tries, delay_ms)
}

/// Write `bytes` to `<dest>.inprogress`, fsync, then promote over `dest`.
pub fn write_file_atomic(dest: &Path, bytes: &[u8]) -> Result<()> {
    use std::io::Write;

    if let Some(parent) = dest.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create dir {}", parent.display()))?;
        }
    }
    let tmp = inprogress_path(dest);
    let mut f = create_with_backoff(&tmp, 16, 50)
        .with_context(|| format!("create {}", tmp.display()))?;
    f.write_all(bytes).with_context(|| format!("write {}", tmp.display()))?;
    f.sync_all().with_context(|| format!("sync {}", tmp.display()))?;
    drop(f);
    replace_file_atomic_backoff(&tmp, dest)
}

/// Sibling temp path used while a file is being written: `<name>.inprogress`.
pub fn inprogress_path(dest: &Path) -> std::path::PathBuf {
    let mut name = dest
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".inprogress");
    dest.with_file_name(name)
}
