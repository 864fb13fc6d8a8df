//! Core value types: record identity, resolved source records, comments and the
//! normalized `CommentTarget` projection handed to sinks.

use crate::date::Moment;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use time::{OffsetDateTime, UtcOffset};

/// Composite identity of a commentable entity, independent of which table it lives in.
///
/// `object_id` keeps the legacy text primary key as comments reference it.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordKey {
    pub content_type_id: u32,
    pub object_id: String,
}

impl RecordKey {
    pub fn new(content_type_id: u32, object_id: impl Into<String>) -> Self {
        Self { content_type_id, object_id: object_id.into() }
    }

    /// Object ids must be a non-empty token without whitespace or control characters.
    pub fn has_valid_object_id(&self) -> bool {
        !self.object_id.is_empty()
            && !self.object_id.chars().any(|c| c.is_whitespace() || c.is_control())
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.content_type_id, self.object_id)
    }
}

/// Declared record type (`app_label.model`).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentType {
    pub id: u32,
    pub app_label: String,
    pub model: String,
}

impl ContentType {
    pub fn label(&self) -> String {
        format!("{}.{}", self.app_label, self.model)
    }
}

/// One resolved owning record with its heterogeneous field map.
#[derive(Clone, Debug, PartialEq)]
pub struct SourceRecord {
    pub key: RecordKey,
    pub content_type: ContentType,
    pub pk: String,
    /// The record's default textual representation.
    pub repr: String,
    pub fields: Map<String, Value>,
}

impl SourceRecord {
    /// Present means the key exists and is not `null`.
    pub fn has(&self, name: &str) -> bool {
        self.fields.get(name).is_some_and(|v| !v.is_null())
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name).filter(|v| !v.is_null())
    }

    /// String view of a field; numbers and booleans are rendered.
    pub fn text(&self, name: &str) -> Option<String> {
        match self.get(name)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    pub fn set_text(&mut self, name: &str, value: impl Into<String>) {
        self.fields.insert(name.to_string(), Value::String(value.into()));
    }

    pub fn flag(&self, name: &str) -> Option<bool> {
        match self.get(name)? {
            Value::Bool(b) => Some(*b),
            Value::Number(n) => n.as_i64().map(|i| i != 0),
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Some(true),
                "0" | "false" | "no" | "off" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommentStatus {
    Open,
    Closed,
}

impl CommentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommentStatus::Open => "open",
            CommentStatus::Closed => "closed",
        }
    }

    /// `comment_status` text wins, then `enable_comments` / `allow_comments` flags.
    pub fn for_record(record: &SourceRecord) -> Self {
        if let Some(s) = record.text("comment_status") {
            if s.trim().eq_ignore_ascii_case("closed") {
                return CommentStatus::Closed;
            }
            return CommentStatus::Open;
        }
        match record.flag("enable_comments").or_else(|| record.flag("allow_comments")) {
            Some(false) => CommentStatus::Closed,
            _ => CommentStatus::Open,
        }
    }
}

/// One comment as read from the comment store.
#[derive(Clone, Debug, PartialEq)]
pub struct Comment {
    pub id: u64,
    pub user_id: Option<u64>,
    pub author_name: String,
    pub author_email: String,
    pub author_url: String,
    pub avatar: String,
    pub ip_address: Option<String>,
    pub submit_date_utc: OffsetDateTime,
    /// Sanitized of unsafe markup.
    pub body: String,
    pub is_public: bool,
    pub is_removed: bool,
    pub parent_id: u64,
}

impl Comment {
    pub fn is_approved(&self) -> bool {
        self.is_public && !self.is_removed
    }
}

/// Why a record was left out of an export run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SkipReason {
    /// The owning record no longer exists.
    NotFound,
    UnknownContentType,
    MalformedId,
    /// The resolver itself failed for this key.
    Resolver(String),
    MissingPubdate,
    MissingUrl,
    MissingTitle,
}

impl SkipReason {
    pub fn label(&self) -> &'static str {
        match self {
            SkipReason::NotFound => "not_found",
            SkipReason::UnknownContentType => "unknown_content_type",
            SkipReason::MalformedId => "malformed_id",
            SkipReason::Resolver(_) => "resolver_error",
            SkipReason::MissingPubdate => "missing_pubdate",
            SkipReason::MissingUrl => "missing_url",
            SkipReason::MissingTitle => "missing_title",
        }
    }

    /// Unexportable records resolved fine but lack required normalized fields.
    pub fn is_unexportable(&self) -> bool {
        matches!(
            self,
            SkipReason::MissingPubdate | SkipReason::MissingUrl | SkipReason::MissingTitle
        )
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Resolver(msg) => write!(f, "resolver_error: {msg}"),
            other => f.write_str(other.label()),
        }
    }
}

/// Normalized, transient view of a commentable entity for one export run.
#[derive(Clone, Debug, PartialEq)]
pub struct CommentTarget {
    pub key: RecordKey,
    pub title: String,
    pub url: String,
    pub teaser_text: String,
    pub pubdate_utc: OffsetDateTime,
    pub disqus_id: String,
    pub comment_status: CommentStatus,
    pub comments: Vec<Comment>,
}

impl CommentTarget {
    /// `"{app_label}.{model}({pk})"`
    pub fn disqus_id_for(record: &SourceRecord) -> String {
        format!("{}.{}({})", record.content_type.app_label, record.content_type.model, record.pk)
    }

    /// Project a normalized record plus its comments. Comments end up oldest-first
    /// whatever order the store returned them in.
    pub fn build(
        record: &SourceRecord,
        mut comments: Vec<Comment>,
        local: UtcOffset,
    ) -> Result<Self, SkipReason> {
        let pubdate_utc = record
            .get("pubdate")
            .and_then(Moment::from_value)
            .and_then(|m| m.to_utc(local))
            .ok_or(SkipReason::MissingPubdate)?;
        let url = record
            .text("absolute_url")
            .or_else(|| record.text("url"))
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty())
            .ok_or(SkipReason::MissingUrl)?;
        let title = record
            .text("title")
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or(SkipReason::MissingTitle)?;

        comments.sort_by(|a, b| a.submit_date_utc.cmp(&b.submit_date_utc).then(a.id.cmp(&b.id)));

        Ok(Self {
            key: record.key.clone(),
            title,
            url,
            teaser_text: record.text("teaser_text").unwrap_or_default(),
            pubdate_utc,
            disqus_id: Self::disqus_id_for(record),
            comment_status: CommentStatus::for_record(record),
            comments,
        })
    }
}
