//! Line-oriented JSON dump reading, plain (`.jsonl`) or zstd-compressed (`.jsonl.zst`).

use crate::util::open_with_backoff;
use anyhow::{bail, Context, Result};
use std::fs::File;
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use zstd::stream::read::Decoder;

/// Locate `<dir>/<stem>.jsonl.zst` or `<dir>/<stem>.jsonl` (compressed preferred).
pub fn find_dump_file(dir: &Path, stem: &str) -> Option<PathBuf> {
    [format!("{stem}.jsonl.zst"), format!("{stem}.jsonl")]
        .into_iter()
        .map(|name| dir.join(name))
        .find(|p| p.is_file())
}

pub fn is_zstd(path: &Path) -> bool {
    path.extension().is_some_and(|e| e.eq_ignore_ascii_case("zst"))
}

fn open_reader(path: &Path, read_buf_bytes: usize) -> Result<Box<dyn BufRead>> {
    let file = open_with_backoff(path, 16, 50).with_context(|| format!("open {}", path.display()))?;
    let cap = read_buf_bytes.max(8 * 1024);
    let inner: Box<dyn Read> = if is_zstd(path) {
        let mut decoder = Decoder::new(file).with_context(|| format!("zstd {}", path.display()))?;
        decoder.window_log_max(31)?;
        Box::new(decoder)
    } else {
        Box::new(file)
    };
    Ok(Box::new(BufReader::with_capacity(cap, inner)))
}

/// Stream a dump line-by-line; `on_line` gets the 1-based line number and the raw
/// line with `\r?\n` stripped. Blank lines are skipped.
pub fn for_each_line(
    path: &Path,
    read_buf_bytes: usize,
    mut on_line: impl FnMut(usize, &str) -> Result<()>,
) -> Result<()> {
    for_each_line_at(path, read_buf_bytes, |line_no, _, line| on_line(line_no, line))
}

/// Like `for_each_line`, also passing the byte offset where each line starts in the
/// decoded stream. For plain files that is a seekable file position.
pub fn for_each_line_at(
    path: &Path,
    read_buf_bytes: usize,
    mut on_line: impl FnMut(usize, u64, &str) -> Result<()>,
) -> Result<()> {
    let mut reader = open_reader(path, read_buf_bytes)?;
    let mut buf = String::with_capacity(16 * 1024);
    let mut line_no = 0usize;
    let mut offset = 0u64;
    loop {
        buf.clear();
        let n = reader
            .read_line(&mut buf)
            .with_context(|| format!("read {} after line {}", path.display(), line_no))?;
        if n == 0 {
            break;
        }
        line_no += 1;
        let start = offset;
        offset += n as u64;
        let line = buf.trim_end_matches(['\n', '\r']);
        if line.trim().is_empty() {
            continue;
        }
        on_line(line_no, start, line)?;
    }
    Ok(())
}

/// Random access to lines of a plain (uncompressed) dump by byte offset.
pub struct LineReader {
    path: PathBuf,
    reader: BufReader<File>,
    buf: String,
}

impl LineReader {
    pub fn open(path: &Path, read_buf_bytes: usize) -> Result<Self> {
        if is_zstd(path) {
            bail!("{} is compressed; offsets are not seekable", path.display());
        }
        let file = open_with_backoff(path, 16, 50).with_context(|| format!("open {}", path.display()))?;
        Ok(Self {
            path: path.to_path_buf(),
            reader: BufReader::with_capacity(read_buf_bytes.max(8 * 1024), file),
            buf: String::new(),
        })
    }

    /// The line starting at `offset`, without its line terminator.
    pub fn line_at(&mut self, offset: u64) -> Result<&str> {
        self.reader
            .seek(SeekFrom::Start(offset))
            .with_context(|| format!("seek {} to {}", self.path.display(), offset))?;
        self.buf.clear();
        let n = self
            .reader
            .read_line(&mut self.buf)
            .with_context(|| format!("read {} at {}", self.path.display(), offset))?;
        if n == 0 {
            bail!("{} ends before offset {}", self.path.display(), offset);
        }
        Ok(self.buf.trim_end_matches(['\n', '\r']))
    }
}
