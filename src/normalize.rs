//! Field-level normalizations that map heterogeneous record shapes onto the
//! canonical `title` / `teaser_text` / `pubdate` fields.
//!
//! Every rule checks for the canonical field before deriving it, so running
//! `normalize` twice leaves the record unchanged.

use crate::date::Moment;
use crate::model::SourceRecord;
use regex::Regex;
use std::sync::OnceLock;

pub const DEFAULT_TEASER_CHARS: usize = 350;

/// Fields tried, in order, when a record has no explicit teaser or description.
const BODY_FIELDS: [&str; 3] = ["body", "story_text", "post"];

#[derive(Clone, Copy, Debug)]
pub struct Normalizer {
    teaser_chars: usize,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self { teaser_chars: DEFAULT_TEASER_CHARS }
    }
}

impl Normalizer {
    pub fn new(teaser_chars: usize) -> Self {
        Self { teaser_chars: teaser_chars.max(1) }
    }

    pub fn teaser_chars(&self) -> usize {
        self.teaser_chars
    }

    pub fn normalize(&self, mut record: SourceRecord) -> SourceRecord {
        self.normalize_in_place(&mut record);
        record
    }

    pub fn normalize_in_place(&self, record: &mut SourceRecord) {
        normalize_pubdate(record);
        normalize_teaser(record, self.teaser_chars);
        normalize_title(record);
    }
}

/// Date-only pubdates become midnight datetimes.
pub fn normalize_pubdate(record: &mut SourceRecord) {
    let Some(m) = record.get("pubdate").and_then(Moment::from_value) else {
        return;
    };
    if m.is_date_only() {
        record.set_text("pubdate", m.at_midnight().to_string());
    }
}

/// `title`, else `headline`, else `name`, else the record's textual representation.
pub fn normalize_title(record: &mut SourceRecord) {
    if record.has("title") {
        return;
    }
    let title = record
        .text("headline")
        .or_else(|| record.text("name"))
        .unwrap_or_else(|| record.repr.clone());
    record.set_text("title", title);
}

/// `teaser_text`, else trimmed `description`, else a teaser cut from a body field.
pub fn normalize_teaser(record: &mut SourceRecord, chars: usize) {
    if record.has("teaser_text") {
        return;
    }
    let teaser = if let Some(desc) = record.text("description") {
        desc.trim().to_string()
    } else if let Some(body) = BODY_FIELDS.iter().find_map(|f| record.text(f)) {
        teaser_from_body(&body, chars)
    } else {
        String::new()
    };
    record.set_text("teaser_text", teaser);
}

/// Cut a teaser from long-form text.
///
/// Short text (stripped of tags) is returned whole. Longer text keeps the first
/// `chars` characters plus the rest of the sentence the cut lands in (up to the next
/// `". "`), is stripped of tags, and gets `". ..."` unless it already ends in `.`,
/// `!` or `?`.
pub fn teaser_from_body(text: &str, chars: usize) -> String {
    let t = text.trim();
    let stripped = strip_tags(t);
    if stripped.chars().count() < chars {
        return stripped;
    }

    let cut = t.char_indices().nth(chars).map(|(i, _)| i).unwrap_or(t.len());
    let (head, tail) = t.split_at(cut);
    let rest_of_sentence = tail.split(". ").next().unwrap_or("").trim();

    let mut teaser = strip_tags(&format!("{head}{rest_of_sentence}")).trim().to_string();
    match teaser.chars().last() {
        Some('.') | Some('!') | Some('?') | None => {}
        Some(_) => teaser.push_str(". ..."),
    }
    teaser
}

fn tag_re() -> &'static Regex {
    static TAG_RE: OnceLock<Regex> = OnceLock::new();
    TAG_RE.get_or_init(|| Regex::new(r"(?s)<[^>]*>").expect("static tag pattern"))
}

/// Remove anything that looks like an HTML/XML tag.
pub fn strip_tags(s: &str) -> String {
    tag_re().replace_all(s, "").into_owned()
}

/// Strip unsafe markup from a comment body, keeping the harmless formatting tags.
pub fn sanitize_body(s: &str) -> String {
    ammonia::clean(s.trim())
}
