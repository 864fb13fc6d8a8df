#[path = "common/mod.rs"]
mod common;

use common::*;
use comment_export::{
    teaser_from_body, CommentExport, KindRegistry, Normalizer, PhotoKind, RecordKind, SourceRecord,
};
use serde_json::json;

/// Title falls back through `headline`, then `name`, then the record's representation.
#[test]
fn title_fallback_order() {
    let n = Normalizer::default();

    let r = n.normalize(record(3, "news", "story", "1", json!({"headline": "H", "name": "N"})));
    assert_eq!(r.text("title").as_deref(), Some("H"));

    let r = n.normalize(record(3, "news", "story", "2", json!({"name": "N"})));
    assert_eq!(r.text("title").as_deref(), Some("N"));

    let r = n.normalize(record(3, "news", "story", "3", json!({"headline": null})));
    assert_eq!(r.text("title").as_deref(), Some("story object (3)"));

    let r = n.normalize(record(3, "news", "story", "4", json!({"title": "Kept", "headline": "H"})));
    assert_eq!(r.text("title").as_deref(), Some("Kept"));
}

/// A date-only pubdate becomes midnight; datetimes are left alone.
#[test]
fn date_only_pubdate_becomes_midnight() {
    let n = Normalizer::default();
    let r = n.normalize(record(3, "news", "story", "1", json!({"pubdate": "2009-03-02"})));
    assert_eq!(r.text("pubdate").as_deref(), Some("2009-03-02T00:00:00"));

    let r = n.normalize(record(3, "news", "story", "2", json!({"pubdate": "2009-03-02 10:11:12"})));
    assert_eq!(r.text("pubdate").as_deref(), Some("2009-03-02 10:11:12"));
}

/// Teaser: explicit teaser wins, then trimmed description, then a body field, else empty.
#[test]
fn teaser_sources_in_order() {
    let n = Normalizer::default();

    let r = n.normalize(record(4, "blog", "entry", "1", json!({"teaser_text": "T", "description": "D"})));
    assert_eq!(r.text("teaser_text").as_deref(), Some("T"));

    let r = n.normalize(record(4, "blog", "entry", "2", json!({"description": "  D  ", "body": "B"})));
    assert_eq!(r.text("teaser_text").as_deref(), Some("D"));

    let r = n.normalize(record(4, "blog", "entry", "3", json!({"post": "<i>P</i>"})));
    assert_eq!(r.text("teaser_text").as_deref(), Some("P"));

    let r = n.normalize(record(4, "blog", "entry", "4", json!({})));
    assert_eq!(r.text("teaser_text").as_deref(), Some(""));
}

/// A 400-character body with a 350-character budget:
/// - tags are stripped,
/// - the cut at 350 extends to the end of its sentence (the next ". "),
/// - text after that sentence is dropped and ". ..." is appended.
#[test]
fn teaser_of_400_char_body_extends_to_sentence_end() {
    let body = format!("<p>{}. {}. {}</p>", "a".repeat(300), "b".repeat(60), "c".repeat(30));
    let teaser = teaser_from_body(&body, 350);

    assert_eq!(teaser, format!("{}. {}. ...", "a".repeat(300), "b".repeat(60)));
    assert!(!teaser.contains('<'));
    assert!(!teaser.contains('c'));
    assert!(teaser.chars().count() >= 350);
}

/// No ellipsis when the extended text already ends in terminal punctuation.
#[test]
fn teaser_keeps_terminal_punctuation() {
    let body = format!("{}. {}!", "a".repeat(345), "b".repeat(50));
    assert_eq!(teaser_from_body(&body, 350), body);

    let body = format!("{}?", "q".repeat(399));
    assert_eq!(teaser_from_body(&body, 350), body);
}

/// Text under the budget is returned whole, stripped of markup.
#[test]
fn short_body_is_returned_stripped() {
    assert_eq!(teaser_from_body("  <b>Short</b> body.  ", 350), "Short body.");
    assert_eq!(teaser_from_body("", 350), "");
}

/// Normalizing an already normalized record changes nothing, photo hook included.
#[test]
fn normalize_is_idempotent() {
    let export = CommentExport::new();
    let inputs = vec![
        record(3, "news", "story", "7", json!({
            "headline": "Storm", "pubdate": "2009-03-01",
            "story_text": format!("{}. {}", "x".repeat(400), "y".repeat(20)),
        })),
        record(5, "media", "photo", "21", json!({"photo": "photos/beach.jpg", "pubdate": "2009-05-01 12:00:00"})),
        record(4, "blog", "entry", "9", json!({})),
    ];
    for r in inputs {
        let once = export.normalize(r);
        let twice = export.normalize(once.clone());
        assert_eq!(once, twice);
    }
}

/// Photos take the file's basename as title, overriding the representation fallback.
#[test]
fn photo_title_from_file_basename() {
    let export = CommentExport::new();
    let r = export.normalize(record(5, "media", "photo", "21", json!({"photo": "photos/2009/beach.jpg"})));
    assert_eq!(r.text("title").as_deref(), Some("beach.jpg"));

    let r = export.normalize(record(5, "media", "photo", "22", json!({"photo": "C:\\pics\\dune.png"})));
    assert_eq!(r.text("title").as_deref(), Some("dune.png"));

    // no file: the generic fallback stands
    let r = export.normalize(record(5, "media", "photo", "23", json!({})));
    assert_eq!(r.text("title").as_deref(), Some("photo object (23)"));
}

struct Shout;

impl RecordKind for Shout {
    fn normalize(&self, record: &mut SourceRecord) {
        if let Some(t) = record.text("title") {
            record.set_text("title", t.to_uppercase());
        }
    }
}

/// Hooks are found by `app_label.model` first, then by bare model; others are untouched.
#[test]
fn registry_dispatches_by_declared_type() {
    let mut reg = KindRegistry::new(Normalizer::default());
    reg.register("events.Gig", Shout);
    reg.register("photo", PhotoKind::new("image"));

    let gig = reg.normalize(record(10, "events", "gig", "1", json!({"title": "loud"})));
    assert_eq!(gig.text("title").as_deref(), Some("LOUD"));

    let other = reg.normalize(record(11, "venues", "gig", "1", json!({"title": "quiet"})));
    assert_eq!(other.text("title").as_deref(), Some("quiet"));

    let photo = reg.normalize(record(12, "gallery", "photo", "1", json!({"image": "a/b/c.gif"})));
    assert_eq!(photo.text("title").as_deref(), Some("c.gif"));
}

/// The teaser budget set on the export reaches the normalizer.
#[test]
fn teaser_budget_is_configurable() {
    let export = CommentExport::new().teaser_chars(10);
    let r = export.normalize(record(3, "news", "story", "1", json!({"body": "one two three four five six"})));
    assert_eq!(r.text("teaser_text").as_deref(), Some("one two three four five six. ..."));
}
