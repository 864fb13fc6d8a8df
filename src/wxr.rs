//! WXR (WordPress eXtended RSS) batch documents, the Disqus import format.

use crate::date::format_wxr;
use crate::model::{Comment, CommentTarget};
use crate::paths::{batch_file_name, batch_path};
use crate::sink::{BatchReport, ExportSink, IpPolicy, LOOPBACK_IP};
use crate::state::ProgressTracker;
use crate::util::{create_with_backoff, inprogress_path, replace_file_atomic_backoff};
use anyhow::{Context, Result};
use std::borrow::Cow;
use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Escape text content and attribute-safe characters.
pub fn escape_text(s: &str) -> Cow<'_, str> {
    if !s.contains(|c: char| matches!(c, '&' | '<' | '>' | '"' | '\'')) {
        return Cow::Borrowed(s);
    }
    let mut out = String::with_capacity(s.len() + 16);
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    Cow::Owned(out)
}

/// Wrap in CDATA, splitting any embedded terminator.
pub fn cdata(s: &str) -> String {
    format!("<![CDATA[{}]]>", s.replace("]]>", "]]]]><![CDATA[>"))
}

/// Renders batch documents for one site.
#[derive(Clone, Debug)]
pub struct WxrWriter {
    domain: String,
    ips: IpPolicy,
}

impl WxrWriter {
    pub fn new(domain: impl Into<String>, ips: IpPolicy) -> Self {
        Self { domain: domain.into(), ips }
    }

    pub fn write_document<W: Write>(&self, w: &mut W, targets: &[CommentTarget]) -> io::Result<()> {
        w.write_all(
            br#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0"
  xmlns:content="http://purl.org/rss/1.0/modules/content/"
  xmlns:dsq="http://www.disqus.com/"
  xmlns:dc="http://purl.org/dc/elements/1.1/"
  xmlns:wp="http://wordpress.org/export/1.0/"
>
  <channel>"#,
        )?;
        for t in targets {
            self.write_item(w, t)?;
        }
        w.write_all(b"\n  </channel>\n</rss>\n")
    }

    fn write_item<W: Write>(&self, w: &mut W, t: &CommentTarget) -> io::Result<()> {
        write!(
            w,
            "
    <item>
      <title>{title}</title>
      <link>http://{domain}{url}</link>
      <content:encoded>{teaser}</content:encoded>
      <dsq:thread_identifier>{ident}</dsq:thread_identifier>
      <wp:post_date_gmt>{date}</wp:post_date_gmt>
      <wp:comment_status>{status}</wp:comment_status>",
            title = escape_text(&t.title),
            domain = escape_text(&self.domain),
            url = escape_text(&t.url),
            teaser = cdata(&t.teaser_text),
            ident = escape_text(&t.disqus_id),
            date = format_wxr(t.pubdate_utc),
            status = t.comment_status.as_str(),
        )?;
        for c in &t.comments {
            self.write_comment(w, c)?;
        }
        w.write_all(b"\n    </item>")
    }

    fn write_comment<W: Write>(&self, w: &mut W, c: &Comment) -> io::Result<()> {
        let ip = self
            .ips
            .redact(c.ip_address.as_deref())
            .unwrap_or_else(|| LOOPBACK_IP.to_string());
        let user_id = c.user_id.map(|u| u.to_string()).unwrap_or_default();
        write!(
            w,
            "
      <wp:comment>
        <dsq:remote>
          <dsq:id>{user_id}</dsq:id>
          <dsq:avatar>{avatar}</dsq:avatar>
        </dsq:remote>
        <wp:comment_id>{id}</wp:comment_id>
        <wp:comment_author>{author}</wp:comment_author>
        <wp:comment_author_email>{email}</wp:comment_author_email>
        <wp:comment_author_url>{url}</wp:comment_author_url>
        <wp:comment_author_IP>{ip}</wp:comment_author_IP>
        <wp:comment_date_gmt>{date}</wp:comment_date_gmt>
        <wp:comment_content>{body}</wp:comment_content>
        <wp:comment_approved>{approved}</wp:comment_approved>
        <wp:comment_parent>{parent}</wp:comment_parent>
      </wp:comment>",
            avatar = escape_text(&c.avatar),
            id = c.id,
            author = escape_text(&c.author_name),
            email = escape_text(&c.author_email),
            url = escape_text(&c.author_url),
            ip = escape_text(&ip),
            date = format_wxr(c.submit_date_utc),
            body = cdata(&c.body),
            approved = u8::from(c.is_approved()),
            parent = c.parent_id,
        )
    }
}

/// File-mode sink: one fully rewritten document per batch.
pub struct WxrFileSink {
    out_dir: PathBuf,
    writer: WxrWriter,
    write_buf: usize,
}

impl WxrFileSink {
    pub fn new(out_dir: impl AsRef<Path>, writer: WxrWriter) -> Self {
        Self { out_dir: out_dir.as_ref().to_path_buf(), writer, write_buf: 256 * 1024 }
    }

    pub fn with_write_buffer(mut self, bytes: usize) -> Self {
        self.write_buf = bytes.max(8 * 1024);
        self
    }

    /// Write batch `index` to a temp file, then promote it over the final name.
    pub fn write_batch_file(&self, index: u32, targets: &[CommentTarget]) -> Result<PathBuf> {
        fs::create_dir_all(&self.out_dir)
            .with_context(|| format!("create {}", self.out_dir.display()))?;
        let path = batch_path(&self.out_dir, index);
        let tmp = inprogress_path(&path);

        let file = create_with_backoff(&tmp, 16, 50).with_context(|| format!("create {}", tmp.display()))?;
        let mut w = BufWriter::with_capacity(self.write_buf, file);
        self.writer
            .write_document(&mut w, targets)
            .with_context(|| format!("write {}", tmp.display()))?;
        let file = w.into_inner().map_err(|e| e.into_error()).with_context(|| format!("flush {}", tmp.display()))?;
        file.sync_all().with_context(|| format!("sync {}", tmp.display()))?;
        drop(file);

        replace_file_atomic_backoff(&tmp, &path)?;
        Ok(path)
    }
}

impl ExportSink for WxrFileSink {
    fn emit_batch(
        &mut self,
        index: u32,
        targets: &[CommentTarget],
        tracker: &mut ProgressTracker,
    ) -> Result<BatchReport> {
        let path = self.write_batch_file(index, targets)?;
        let mut report = BatchReport::default();
        for t in targets {
            tracker.mark_record(&t.key)?;
            report.exported += 1;
            report.comments += t.comments.len();
        }
        tracing::debug!(path=%path.display(), items=report.exported, comments=report.comments, "batch written");
        Ok(report)
    }

    fn describe(&self, index: u32) -> String {
        self.out_dir.join(batch_file_name(index)).display().to_string()
    }

    fn output_dir(&self) -> Option<&Path> {
        Some(&self.out_dir)
    }
}
