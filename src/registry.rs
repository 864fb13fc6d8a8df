//! Per-type normalization hooks, keyed by declared record type.

use crate::model::SourceRecord;
use crate::normalize::Normalizer;
use ahash::AHashMap;

/// Type-specific adjustments applied after the generic field rules.
/// Implementations must be deterministic so normalization stays idempotent.
pub trait RecordKind: Send + Sync {
    fn normalize(&self, record: &mut SourceRecord);
}

/// Photos are titled by their image file's basename.
pub struct PhotoKind {
    file_field: String,
}

impl PhotoKind {
    pub fn new(file_field: impl Into<String>) -> Self {
        Self { file_field: file_field.into() }
    }
}

impl RecordKind for PhotoKind {
    fn normalize(&self, record: &mut SourceRecord) {
        let Some(path) = record.text(&self.file_field) else { return };
        let base = path
            .trim_end_matches('/')
            .rsplit(|c: char| c == '/' || c == '\\')
            .next()
            .unwrap_or("")
            .to_string();
        if !base.is_empty() {
            record.set_text("title", base);
        }
    }
}

/// Generic normalizer plus hooks looked up by `app_label.model`, then by bare `model`.
pub struct KindRegistry {
    normalizer: Normalizer,
    kinds: AHashMap<String, Box<dyn RecordKind>>,
}

impl KindRegistry {
    pub fn new(normalizer: Normalizer) -> Self {
        Self { normalizer, kinds: AHashMap::new() }
    }

    /// Registry with the stock hooks (`photo`).
    pub fn with_defaults(normalizer: Normalizer) -> Self {
        let mut r = Self::new(normalizer);
        r.register("photo", PhotoKind::new("photo"));
        r
    }

    pub fn set_normalizer(&mut self, normalizer: Normalizer) {
        self.normalizer = normalizer;
    }

    pub fn register(&mut self, type_name: &str, kind: impl RecordKind + 'static) -> &mut Self {
        self.kinds.insert(type_name.to_lowercase(), Box::new(kind));
        self
    }

    fn kind_for(&self, record: &SourceRecord) -> Option<&dyn RecordKind> {
        let ct = &record.content_type;
        self.kinds
            .get(&ct.label().to_lowercase())
            .or_else(|| self.kinds.get(&ct.model.to_lowercase()))
            .map(|k| k.as_ref())
    }

    pub fn normalize(&self, mut record: SourceRecord) -> SourceRecord {
        self.normalizer.normalize_in_place(&mut record);
        if let Some(kind) = self.kind_for(&record) {
            kind.normalize(&mut record);
        }
        record
    }
}
