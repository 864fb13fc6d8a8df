#![allow(dead_code)]

use anyhow::{anyhow, Result};
use comment_export::{
    CommentExport, ContentType, DisqusApi, Forum, NewPost, RecordKey, SourceRecord, Thread,
    ThreadLookup,
};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Write a compressed `.zst` file containing the provided JSONL lines.
pub fn write_zst_lines(path: &Path, lines: &[String]) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    let f = File::create(path).unwrap();
    let mut enc = zstd::stream::write::Encoder::new(f, 3).unwrap();
    for l in lines {
        writeln!(&mut enc, "{}", l).unwrap();
    }
    enc.finish().unwrap();
}

/// Write a plain JSONL file.
pub fn write_lines(path: &Path, lines: &[String]) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    let mut f = File::create(path).unwrap();
    for l in lines {
        writeln!(&mut f, "{}", l).unwrap();
    }
}

pub fn read_to_string(path: &Path) -> String {
    fs::read_to_string(path).unwrap()
}

/// Sorted file names in `dir` (empty when the directory does not exist).
pub fn file_names(dir: &Path) -> Vec<String> {
    let Ok(rd) = fs::read_dir(dir) else { return Vec::new() };
    let mut names: Vec<String> = rd
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

/// Builder for a dump directory: `content_types`, `records/<app>.<model>` tables, `comments`.
#[derive(Clone, Default)]
pub struct DumpBuilder {
    content_types: Vec<Value>,
    tables: BTreeMap<String, Vec<Value>>,
    comments: Vec<Value>,
}

impl DumpBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn content_type(mut self, id: u32, app_label: &str, model: &str) -> Self {
        self.content_types.push(json!({"id": id, "app_label": app_label, "model": model}));
        self
    }

    pub fn record(mut self, label: &str, row: Value) -> Self {
        self.tables.entry(label.to_string()).or_default().push(row);
        self
    }

    pub fn comment(mut self, row: Value) -> Self {
        self.comments.push(row);
        self
    }

    fn lines(rows: &[Value]) -> Vec<String> {
        rows.iter().map(|v| v.to_string()).collect()
    }

    /// Write every file as plain `.jsonl`.
    pub fn write(&self, dir: &Path) {
        write_lines(&dir.join("content_types.jsonl"), &Self::lines(&self.content_types));
        for (label, rows) in &self.tables {
            write_lines(&dir.join("records").join(format!("{label}.jsonl")), &Self::lines(rows));
        }
        write_lines(&dir.join("comments.jsonl"), &Self::lines(&self.comments));
    }

    /// Same content, with tables and comments zstd-compressed.
    pub fn write_zst(&self, dir: &Path) {
        write_lines(&dir.join("content_types.jsonl"), &Self::lines(&self.content_types));
        for (label, rows) in &self.tables {
            write_zst_lines(&dir.join("records").join(format!("{label}.jsonl.zst")), &Self::lines(rows));
        }
        write_zst_lines(&dir.join("comments.jsonl.zst"), &Self::lines(&self.comments));
    }
}

/// A minimal comment row.
pub fn comment_row(id: u64, content_type_id: u32, object_pk: Value, submit_date: Value, body: &str) -> Value {
    json!({
        "id": id,
        "content_type_id": content_type_id,
        "object_pk": object_pk,
        "user_name": format!("user{id}"),
        "user_email": format!("user{id}@example.org"),
        "ip_address": "203.0.113.9",
        "submit_date": submit_date,
        "comment": body,
        "is_public": true,
        "is_removed": false,
    })
}

/// A small newspaper site:
/// - `news.story` (ct 3): story 7 (long `story_text`, comments 1 and 2 stored out of
///   order, comment 1 from internal IP 10.0.0.5), story 8 (date-only pubdate, comment 3)
/// - `blog.entry` (ct 4): entry "12" (closed, commenter with a profile, comment 4),
///   entry 13 without a pubdate (unexportable, comment 5)
/// - `media.photo` (ct 5): photo 21 titled from its file (comment 6, unix timestamp)
/// - comment 7 on story 99, which was deleted
/// - comment 8 on `polls.poll` (ct 6), whose table is missing from the dump
/// - comment 9 on content type 9, which is not declared
/// - one unreadable comment row
pub fn sample_dump() -> DumpBuilder {
    DumpBuilder::new()
        .content_type(3, "news", "story")
        .content_type(4, "blog", "entry")
        .content_type(5, "media", "photo")
        .content_type(6, "polls", "poll")
        .record("news.story", json!({
            "id": 7, "headline": "Storm hits coast", "pubdate": "2009-03-01 10:00:00",
            "absolute_url": "/news/7/",
            "story_text": format!("<p>{}. {}. {}</p>", "a".repeat(300), "b".repeat(60), "c".repeat(30)),
        }))
        .record("news.story", json!({
            "id": 8, "headline": "Council votes", "pubdate": "2009-03-02",
            "absolute_url": "/news/8/", "body": "Short body.", "enable_comments": true,
        }))
        .record("blog.entry", json!({
            "id": "12", "title": "Hello & welcome", "pubdate": "2009-04-01T08:30:00",
            "url": "/blog/hello/", "description": "  First post.  ", "comment_status": "closed",
        }))
        .record("blog.entry", json!({ "id": 13, "title": "Undated", "url": "/blog/13/" }))
        .record("media.photo", json!({
            "id": 21, "photo": "photos/2009/beach.jpg", "pubdate": "2009-05-01 12:00:00",
            "absolute_url": "/photos/21/",
        }))
        .comment(json!({
            "id": 1, "content_type_id": 3, "object_pk": "7", "user_name": "ann",
            "user_email": "ann@example.org", "ip_address": "10.0.0.5",
            "submit_date": "2009-03-01 12:00:00", "comment": "Second thoughts",
        }))
        .comment(comment_row(2, 3, json!("7"), json!("2009-03-01 11:00:00"), "Great coverage"))
        .comment(comment_row(3, 3, json!(8), json!("2009-03-02 09:00:00"), "Nice <script>alert(1)</script><b>post</b>"))
        .comment(json!({
            "id": 4, "content_type_id": 4, "object_pk": "12", "user_id": 42,
            "user": {"display_name": "Bob B.", "email": "bob@example.org", "blog": "http://bob.example.org", "avatar": "http://img.example.org/bob.png"},
            "user_name": "bob", "user_email": "old@example.org",
            "submit_date": "2009-04-02 10:00:00", "comment": "Welcome!", "is_public": false,
        }))
        .comment(comment_row(5, 4, json!("13"), json!("2009-04-03 10:00:00"), "Where is the date?"))
        .comment(comment_row(6, 5, json!("21"), json!(1241186400), "Lovely beach"))
        .comment(comment_row(7, 3, json!("99"), json!("2009-03-05 10:00:00"), "Orphaned"))
        .comment(comment_row(8, 6, json!("1"), json!("2009-06-01 10:00:00"), "Poll comment"))
        .comment(comment_row(9, 9, json!("1"), json!("2009-06-01 10:00:00"), "Mystery"))
        .comment(json!({"id": "not-a-number"}))
}

/// Keys of `sample_dump` that export, in enumeration order.
pub fn sample_exportable_keys() -> Vec<RecordKey> {
    vec![
        RecordKey::new(3, "7"),
        RecordKey::new(3, "8"),
        RecordKey::new(4, "12"),
        RecordKey::new(5, "21"),
    ]
}

/// Export configured for tests: no progress bar, state inside `out`.
pub fn test_export(out: &Path) -> CommentExport {
    CommentExport::new()
        .out_dir(out)
        .domain("example.com")
        .progress(false)
        .verbosity(0)
}

/// A resolved record built by hand.
pub fn record(ct: u32, app_label: &str, model: &str, pk: &str, fields: Value) -> SourceRecord {
    let Value::Object(fields) = fields else { panic!("fields must be an object") };
    SourceRecord {
        key: RecordKey::new(ct, pk),
        content_type: ContentType { id: ct, app_label: app_label.into(), model: model.into() },
        pk: pk.to_string(),
        repr: format!("{model} object ({pk})"),
        fields,
    }
}

pub fn scratch() -> (tempfile::TempDir, PathBuf, PathBuf) {
    let tmp = tempfile::tempdir().unwrap();
    let dump = tmp.path().join("dump");
    let out = tmp.path().join("out");
    (tmp, dump, out)
}

/// Scripted stand-in for the remote comment API.
#[derive(Default)]
pub struct FakeApi {
    pub forums: HashSet<String>,
    pub by_ident: HashMap<String, Thread>,
    pub by_link: HashMap<String, Thread>,
    /// Lookups of this kind fail with an error instead of answering.
    pub fail_ident_lookups: bool,
    /// Posts whose message equals one of these are rejected.
    pub reject_messages: HashSet<String>,
    /// Panic on the post after this many were accepted, like a process killed mid-batch.
    pub panic_after: Option<usize>,
    pub calls: Vec<String>,
    pub posts: Vec<NewPost>,
    created: u32,
}

impl FakeApi {
    pub fn with_forum(name: &str) -> Self {
        let mut api = Self::default();
        api.forums.insert(name.to_string());
        api
    }

    pub fn calls_starting_with(&self, prefix: &str) -> usize {
        self.calls.iter().filter(|c| c.starts_with(prefix)).count()
    }
}

impl DisqusApi for FakeApi {
    fn forum_details(&mut self, forum: &str) -> Result<Forum> {
        self.calls.push(format!("forum {forum}"));
        if self.forums.contains(forum) {
            Ok(Forum { id: format!("f-{forum}"), name: forum.to_string() })
        } else {
            Err(anyhow!("Invalid argument, 'forum': Unable to find forum"))
        }
    }

    fn thread_details(&mut self, _forum: &str, lookup: ThreadLookup<'_>) -> Result<Option<Thread>> {
        self.calls.push(format!("details {lookup}"));
        match lookup {
            ThreadLookup::Ident(_) if self.fail_ident_lookups => Err(anyhow!("lookup unavailable")),
            ThreadLookup::Ident(id) => Ok(self.by_ident.get(id).cloned()),
            ThreadLookup::Link(url) => Ok(self.by_link.get(url).cloned()),
        }
    }

    fn thread_create(&mut self, _forum: &str, identifier: &str, url: &str, title: &str) -> Result<Thread> {
        self.calls.push(format!("create {identifier} {title}"));
        self.created += 1;
        let thread = Thread { id: format!("t{}", self.created), link: url.to_string() };
        self.by_ident.insert(identifier.to_string(), thread.clone());
        self.by_link.insert(url.to_string(), thread.clone());
        Ok(thread)
    }

    fn post_create(&mut self, post: &NewPost) -> Result<String> {
        self.calls.push(format!("post {}", post.thread));
        if self.reject_messages.contains(&post.message) {
            return Err(anyhow!("rejected by destination"));
        }
        if self.panic_after == Some(self.posts.len()) {
            panic!("connection dropped after {} posts", self.posts.len());
        }
        self.posts.push(post.clone());
        Ok(format!("p{}", self.posts.len()))
    }
}
