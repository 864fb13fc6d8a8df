//! Collaborator seams around the legacy datastore, plus `DumpStore`, a concrete
//! store backed by a directory of JSON-lines table dumps.
//!
//! Dump layout:
//!   <dir>/content_types.jsonl[.zst]                 {"id", "app_label", "model"}
//!   <dir>/records/<app_label>.<model>.jsonl[.zst]   {"id", ...arbitrary fields}
//!   <dir>/comments.jsonl[.zst]                      one comment per line
//!
//! Naive timestamps in the dump are wall-clock times at the configured offset.
//!
//! A plain `comments.jsonl` is indexed by byte offset and re-read per record, so
//! only one record's comments are held at a time. A compressed dump cannot be
//! seeked and is decoded once into memory.

use crate::date::Moment;
use crate::jsonl::{find_dump_file, for_each_line, for_each_line_at, is_zstd, LineReader};
use crate::model::{Comment, ContentType, RecordKey, SourceRecord};
use crate::normalize::sanitize_body;
use ahash::AHashMap;
use anyhow::{anyhow, Context, Result};
use regex::Regex;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use time::UtcOffset;
use walkdir::WalkDir;

/// Source of comments and of the keys that have them.
pub trait CommentStore {
    /// Distinct keys having at least one comment, ordered by `(content_type_id, object_id)`.
    /// An `Err` item means enumeration itself failed.
    fn distinct_keys(&self) -> Result<Box<dyn Iterator<Item = Result<RecordKey>> + '_>>;

    /// All comments of one resolved record, oldest first.
    fn comments_for(&self, record: &SourceRecord) -> Result<Vec<Comment>>;
}

/// Content-type table lookups.
pub trait ContentTypes {
    fn content_type(&self, id: u32) -> Result<Option<ContentType>>;
}

/// Maps a key to its owning record; `Ok(None)` means the record no longer exists.
pub trait RecordResolver {
    fn resolve(&self, content_type: &ContentType, key: &RecordKey) -> Result<Option<SourceRecord>>;
}

/// Everything the export pipeline needs from a datastore.
pub trait Datastore: CommentStore + ContentTypes + RecordResolver {}

impl<T: CommentStore + ContentTypes + RecordResolver> Datastore for T {}

// ----------------------------- dump rows ------------------------------------

#[derive(Debug, Deserialize)]
struct ContentTypeRow {
    id: u32,
    app_label: String,
    model: String,
}

/// Optional profile of a registered commenter; wins over the comment's own fields.
#[derive(Debug, Default, Deserialize)]
struct UserRow {
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    avatar: Option<String>,
    #[serde(default)]
    blog: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CommentRow {
    id: u64,
    content_type_id: u32,
    object_pk: Value,
    #[serde(default)]
    user_id: Option<u64>,
    #[serde(default)]
    user: Option<UserRow>,
    #[serde(default)]
    user_name: Option<String>,
    #[serde(default)]
    user_email: Option<String>,
    #[serde(default)]
    user_url: Option<String>,
    #[serde(default)]
    ip_address: Option<String>,
    submit_date: Value,
    #[serde(default)]
    comment: String,
    #[serde(default = "default_true")]
    is_public: bool,
    #[serde(default)]
    is_removed: bool,
}

fn default_true() -> bool {
    true
}

fn non_empty(s: Option<&str>) -> Option<String> {
    s.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}

/// Primary keys arrive as numbers or strings; both become the text key.
fn pk_text(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn parse_comment(line: &str, local: UtcOffset) -> Result<(RecordKey, Comment)> {
    serde_json::from_str::<CommentRow>(line)?.into_comment(local)
}

fn sort_comments(list: &mut [Comment]) {
    list.sort_by(|a, b| a.submit_date_utc.cmp(&b.submit_date_utc).then(a.id.cmp(&b.id)));
}

impl CommentRow {
    fn into_comment(self, local: UtcOffset) -> Result<(RecordKey, Comment)> {
        let object_id = pk_text(&self.object_pk).ok_or_else(|| anyhow!("object_pk is not a key"))?;
        let submitted = Moment::from_value(&self.submit_date)
            .and_then(|m| m.to_utc(local))
            .ok_or_else(|| anyhow!("unreadable submit_date {}", self.submit_date))?;
        let user = self.user.unwrap_or_default();

        let author_name = non_empty(user.display_name.as_deref())
            .or_else(|| non_empty(self.user_name.as_deref()))
            .unwrap_or_default();
        let author_url = non_empty(user.blog.as_deref())
            .or_else(|| non_empty(self.user_url.as_deref()))
            .unwrap_or_default();
        let author_email = non_empty(user.email.as_deref())
            .or_else(|| non_empty(self.user_email.as_deref()))
            .unwrap_or_default();

        let comment = Comment {
            id: self.id,
            user_id: self.user_id,
            author_name,
            author_email,
            author_url,
            avatar: non_empty(user.avatar.as_deref()).unwrap_or_default(),
            ip_address: non_empty(self.ip_address.as_deref()),
            submit_date_utc: submitted,
            body: sanitize_body(&self.comment),
            is_public: self.is_public,
            is_removed: self.is_removed,
            parent_id: 0,
        };
        Ok((RecordKey::new(self.content_type_id, object_id), comment))
    }
}

// ----------------------------- DumpStore ------------------------------------

enum CommentRows {
    /// Plain dump: start offset of every row, per key.
    Indexed { path: PathBuf, offsets: BTreeMap<RecordKey, Vec<u64>> },
    /// Compressed dump: decoded rows, oldest first per key.
    Loaded(BTreeMap<RecordKey, Vec<Comment>>),
}

pub struct DumpStore {
    content_types: AHashMap<u32, ContentType>,
    tables: AHashMap<u32, AHashMap<String, Map<String, Value>>>,
    comments: CommentRows,
    local: UtcOffset,
}

impl DumpStore {
    pub fn open(dir: &Path, local: UtcOffset) -> Result<Self> {
        Self::open_with_buffer(dir, local, 256 * 1024)
    }

    pub fn open_with_buffer(dir: &Path, local: UtcOffset, read_buf: usize) -> Result<Self> {
        let ct_path = find_dump_file(dir, "content_types")
            .ok_or_else(|| anyhow!("no content_types.jsonl[.zst] in {}", dir.display()))?;
        let mut content_types = AHashMap::new();
        for_each_line(&ct_path, read_buf, |line_no, line| {
            let row: ContentTypeRow = serde_json::from_str(line)
                .with_context(|| format!("{}:{}", ct_path.display(), line_no))?;
            content_types.insert(
                row.id,
                ContentType { id: row.id, app_label: row.app_label, model: row.model },
            );
            Ok(())
        })?;

        let by_label: AHashMap<String, u32> =
            content_types.values().map(|ct| (ct.label(), ct.id)).collect();

        let mut tables = AHashMap::new();
        for (label, path) in discover_tables(&dir.join("records")) {
            let Some(&ct_id) = by_label.get(&label) else {
                tracing::warn!(table=%label, path=%path.display(), "no content type declared for table; ignoring");
                continue;
            };
            let rows = load_table(&path, read_buf)?;
            tracing::debug!(table=%label, rows=rows.len(), "loaded table");
            tables.insert(ct_id, rows);
        }

        let comments = match find_dump_file(dir, "comments") {
            Some(c_path) => load_comments(&c_path, local, read_buf)?,
            None => {
                tracing::warn!(dir=%dir.display(), "no comments.jsonl[.zst]; nothing to export");
                CommentRows::Loaded(BTreeMap::new())
            }
        };

        Ok(Self { content_types, tables, comments, local })
    }

    /// Readable comment rows in the dump.
    pub fn comment_count(&self) -> usize {
        match &self.comments {
            CommentRows::Indexed { offsets, .. } => offsets.values().map(Vec::len).sum(),
            CommentRows::Loaded(map) => map.values().map(Vec::len).sum(),
        }
    }
}

/// Read every comment row once, skipping (and counting) unreadable ones.
fn load_comments(path: &Path, local: UtcOffset, read_buf: usize) -> Result<CommentRows> {
    let indexed = !is_zstd(path);
    let mut offsets: BTreeMap<RecordKey, Vec<u64>> = BTreeMap::new();
    let mut loaded: BTreeMap<RecordKey, Vec<Comment>> = BTreeMap::new();
    let mut bad = 0u64;
    for_each_line_at(path, read_buf, |line_no, offset, line| {
        match parse_comment(line, local) {
            Ok((key, _)) if indexed => offsets.entry(key).or_default().push(offset),
            Ok((key, c)) => loaded.entry(key).or_default().push(c),
            Err(e) => {
                bad += 1;
                tracing::warn!(path=%path.display(), line=line_no, error=%e, "skipping unreadable comment row");
            }
        }
        Ok(())
    })?;
    if bad > 0 {
        tracing::warn!(skipped = bad, "comment rows skipped while loading dump");
    }

    if indexed {
        tracing::debug!(path=%path.display(), keys=offsets.len(), "indexed comment rows");
        return Ok(CommentRows::Indexed { path: path.to_path_buf(), offsets });
    }
    for list in loaded.values_mut() {
        sort_comments(list);
    }
    Ok(CommentRows::Loaded(loaded))
}

/// Map `records/<app_label>.<model>.jsonl[.zst]` files to their `app_label.model` label.
fn discover_tables(dir: &Path) -> BTreeMap<String, PathBuf> {
    let re = Regex::new(r"^([A-Za-z0-9_]+)\.([A-Za-z0-9_]+)\.jsonl(\.zst)?$").expect("static table pattern");
    let mut map = BTreeMap::new();
    if !dir.exists() {
        return map;
    }
    for ent in WalkDir::new(dir).min_depth(1).max_depth(1).into_iter().flatten() {
        if let Some(name) = ent.file_name().to_str() {
            if let Some(caps) = re.captures(name) {
                let label = format!("{}.{}", &caps[1], &caps[2]).to_lowercase();
                // a compressed twin wins over the plain file
                if caps.get(3).is_some() || !map.contains_key(&label) {
                    map.insert(label, ent.path().to_path_buf());
                }
            }
        }
    }
    map
}

fn load_table(path: &Path, read_buf: usize) -> Result<AHashMap<String, Map<String, Value>>> {
    let mut rows = AHashMap::new();
    for_each_line(path, read_buf, |line_no, line| {
        let v: Value = serde_json::from_str(line)
            .with_context(|| format!("{}:{}", path.display(), line_no))?;
        let Value::Object(obj) = v else {
            tracing::warn!(path=%path.display(), line=line_no, "record row is not an object; skipping");
            return Ok(());
        };
        match obj.get("id").and_then(pk_text) {
            Some(pk) => {
                rows.insert(pk, obj);
            }
            None => {
                tracing::warn!(path=%path.display(), line=line_no, "record row without id; skipping");
            }
        }
        Ok(())
    })?;
    Ok(rows)
}

impl CommentStore for DumpStore {
    fn distinct_keys(&self) -> Result<Box<dyn Iterator<Item = Result<RecordKey>> + '_>> {
        let keys: Box<dyn Iterator<Item = Result<RecordKey>> + '_> = match &self.comments {
            CommentRows::Indexed { offsets, .. } => Box::new(offsets.keys().map(|k| Ok(k.clone()))),
            CommentRows::Loaded(map) => Box::new(
                map.iter()
                    .filter(|(_, list)| !list.is_empty())
                    .map(|(k, _)| Ok(k.clone())),
            ),
        };
        Ok(keys)
    }

    fn comments_for(&self, record: &SourceRecord) -> Result<Vec<Comment>> {
        let (path, offsets) = match &self.comments {
            CommentRows::Loaded(map) => return Ok(map.get(&record.key).cloned().unwrap_or_default()),
            CommentRows::Indexed { path, offsets } => (path, offsets),
        };
        let Some(offsets) = offsets.get(&record.key) else {
            return Ok(Vec::new());
        };
        let mut reader = LineReader::open(path, 16 * 1024)?;
        let mut list = Vec::with_capacity(offsets.len());
        for &offset in offsets {
            let (_, c) = parse_comment(reader.line_at(offset)?, self.local)
                .with_context(|| format!("{} at byte {}", path.display(), offset))?;
            list.push(c);
        }
        sort_comments(&mut list);
        Ok(list)
    }
}

impl ContentTypes for DumpStore {
    fn content_type(&self, id: u32) -> Result<Option<ContentType>> {
        Ok(self.content_types.get(&id).cloned())
    }
}

impl RecordResolver for DumpStore {
    fn resolve(&self, content_type: &ContentType, key: &RecordKey) -> Result<Option<SourceRecord>> {
        let table = self
            .tables
            .get(&content_type.id)
            .ok_or_else(|| anyhow!("no table loaded for {}", content_type.label()))?;
        Ok(table.get(&key.object_id).map(|fields| {
            let repr = fields
                .get("repr")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| format!("{} object ({})", content_type.model, key.object_id));
            SourceRecord {
                key: key.clone(),
                content_type: content_type.clone(),
                pk: key.object_id.clone(),
                repr,
                fields: fields.clone(),
            }
        }))
    }
}
