use crate::batch::chunk;
use crate::config::ExportOptions;
use crate::model::{CommentTarget, RecordKey, SourceRecord};
use crate::normalize::Normalizer;
use crate::paths::next_batch_index;
use crate::progress::ProgressScope;
use crate::registry::{KindRegistry, RecordKind};
use crate::sink::{ExportSink, IpPolicy};
use crate::source::{SourceIterator, SourceStats};
use crate::state::{ProgressStore, ProgressTracker, SaveGranularity};
use crate::store::Datastore;
use crate::util::init_tracing_once;
use crate::wxr::{WxrFileSink, WxrWriter};
use anyhow::{anyhow, Result};
use std::collections::BTreeMap;
use std::path::Path;
use time::UtcOffset;

/// Export driver: pulls resolved records, normalizes them, groups them into
/// batches and hands each batch to a sink, keeping resumable progress.
pub struct CommentExport {
    pub(crate) opts: ExportOptions,
    registry: KindRegistry,
}

/// What one run did (or, in dry-run mode, would do).
#[derive(Clone, Debug, Default)]
pub struct RunSummary {
    pub dry_run: bool,
    /// Batch indices emitted this run, in order.
    pub batches: Vec<u32>,
    pub exported: usize,
    pub comments: usize,
    /// Records whose emission failed; retried on the next run.
    pub failed: Vec<(RecordKey, String)>,
    /// Unexportable records by skip reason.
    pub unexportable: BTreeMap<&'static str, u64>,
    pub source: SourceStats,
    /// Dry runs only: records that would have been exported.
    pub would_export: Vec<RecordKey>,
    pub state_saves: u64,
}

impl RunSummary {
    pub fn unexportable_total(&self) -> u64 {
        self.unexportable.values().sum()
    }
}

impl Default for CommentExport {
    fn default() -> Self {
        Self::new()
    }
}

impl CommentExport {
    pub fn new() -> Self {
        Self::with_options(ExportOptions::default())
    }

    pub fn with_options(opts: ExportOptions) -> Self {
        let registry = KindRegistry::with_defaults(Normalizer::new(opts.teaser_chars));
        Self { opts, registry }
    }

    pub fn options(&self) -> &ExportOptions {
        &self.opts
    }

    // -------- Builder methods --------
    pub fn out_dir(mut self, dir: impl AsRef<Path>) -> Self { self.opts = self.opts.with_out_dir(dir); self }
    pub fn domain(mut self, domain: impl AsRef<str>) -> Self { self.opts = self.opts.with_domain(domain); self }
    pub fn chunk_size(mut self, n: usize) -> Self { self.opts = self.opts.with_chunk_size(n); self }
    pub fn state_path(mut self, path: impl AsRef<Path>) -> Self { self.opts = self.opts.with_state_path(path); self }
    pub fn save_granularity(mut self, g: SaveGranularity) -> Self { self.opts = self.opts.with_save_granularity(g); self }
    pub fn dry_run(mut self, yes: bool) -> Self { self.opts = self.opts.with_dry_run(yes); self }
    pub fn max_items(mut self, n: Option<usize>) -> Self { self.opts = self.opts.with_max_items(n); self }
    pub fn verbosity(mut self, v: u8) -> Self { self.opts = self.opts.with_verbosity(v); self }
    pub fn progress(mut self, yes: bool) -> Self { self.opts = self.opts.with_progress(yes); self }
    pub fn local_offset(mut self, offset: UtcOffset) -> Self { self.opts = self.opts.with_local_offset(offset); self }
    pub fn internal_ips<I, S>(mut self, ips: I) -> Self where I: IntoIterator<Item = S>, S: Into<String> { self.opts = self.opts.with_internal_ips(ips); self }
    pub fn teaser_chars(mut self, n: usize) -> Self {
        self.opts = self.opts.with_teaser_chars(n);
        self.registry.set_normalizer(Normalizer::new(self.opts.teaser_chars));
        self
    }
    /// Add a per-type normalization hook (`"app_label.model"` or bare `"model"`).
    pub fn register_kind(mut self, type_name: &str, kind: impl RecordKind + 'static) -> Self {
        self.registry.register(type_name, kind);
        self
    }

    pub fn ip_policy(&self) -> IpPolicy {
        IpPolicy::new(&self.opts.internal_ips)
    }

    /// File-mode sink configured from these options.
    pub fn wxr_sink(&self) -> WxrFileSink {
        WxrFileSink::new(&self.opts.out_dir, WxrWriter::new(&self.opts.domain, self.ip_policy()))
            .with_write_buffer(self.opts.write_buffer_bytes)
    }

    /// Normalize one resolved record the way a run would.
    pub fn normalize(&self, record: SourceRecord) -> SourceRecord {
        self.registry.normalize(record)
    }

    /// Run one export pass over `store` into `sink`.
    ///
    /// Keys completed by earlier runs are skipped, batch numbering continues after
    /// the last completed batch, and records are marked processed only once the sink
    /// has committed them. In dry-run mode nothing is written and the sink is never
    /// called.
    pub fn run<S, K>(&self, store: &S, sink: &mut K) -> Result<RunSummary>
    where
        S: Datastore,
        K: ExportSink,
    {
        init_tracing_once(self.opts.verbosity);
        let opts = &self.opts;

        let state_store = ProgressStore::new(opts.resolved_state_path());
        let state = state_store.load_or_default();
        let first_index = next_batch_index(&state, sink.output_dir())?;

        let mut source = SourceIterator::new(store, store, store, state.processed_keys.iter().cloned())?;
        let persist = if opts.dry_run { None } else { Some(state_store) };
        let mut tracker = ProgressTracker::new(state, persist, opts.save_granularity);

        let pb = match (opts.progress, opts.max_items) {
            (false, _) => ProgressScope::hidden(),
            (true, Some(n)) => ProgressScope::count("Exporting", n as u64),
            (true, None) => ProgressScope::spinner("Exporting"),
        };

        let mut summary = RunSummary { dry_run: opts.dry_run, ..Default::default() };
        // None once the last representable index has been used
        let mut next_index = Some(first_index);

        let limited: Box<dyn Iterator<Item = Result<SourceRecord>> + '_> = match opts.max_items {
            Some(n) => Box::new(source.by_ref().take(n)),
            None => Box::new(source.by_ref()),
        };

        for group in chunk(limited, opts.chunk_size) {
            let records = group.into_iter().collect::<Result<Vec<_>>>()?;

            let mut targets: Vec<CommentTarget> = Vec::with_capacity(records.len());
            let mut unexportable: Vec<RecordKey> = Vec::new();
            for record in records {
                pb.inc_items(1);
                let record = self.registry.normalize(record);
                let comments = match store.comments_for(&record) {
                    Ok(c) => c,
                    Err(e) => {
                        let msg = format!("{e:#}");
                        tracing::warn!(key=%record.key, error=%msg, "cannot read comments; will retry next run");
                        summary.failed.push((record.key.clone(), msg));
                        continue;
                    }
                };
                match CommentTarget::build(&record, comments, opts.local_offset) {
                    Ok(t) => targets.push(t),
                    Err(reason) => {
                        tracing::debug!(key=%record.key, reason=%reason, "record is not exportable; skipping");
                        *summary.unexportable.entry(reason.label()).or_insert(0) += 1;
                        unexportable.push(record.key);
                    }
                }
            }

            let index = match next_index {
                Some(i) => i,
                None if targets.is_empty() => 0,
                None => return Err(anyhow!("batch numbering exhausted after comments-{}.xml", u32::MAX)),
            };

            if opts.dry_run {
                if !targets.is_empty() {
                    tracing::info!("{}\t{} (dry run)", sink.describe(index), targets.len());
                    for t in &targets {
                        tracing::info!(key=%t.key, ident=%t.disqus_id, comments=t.comments.len(), "would export {:?}", t.title);
                        summary.comments += t.comments.len();
                        summary.would_export.push(t.key.clone());
                    }
                    summary.batches.push(index);
                    next_index = index.checked_add(1);
                }
                continue;
            }

            if !targets.is_empty() {
                let report = sink.emit_batch(index, &targets, &mut tracker)?;
                summary.exported += report.exported;
                summary.comments += report.comments;
                summary.failed.extend(report.failed);
            }
            // permanently unexportable records are only retired in fine-grained mode
            if tracker.granularity() == SaveGranularity::PerItem {
                for key in &unexportable {
                    tracker.mark_record(key)?;
                }
            }
            if !targets.is_empty() {
                tracker.commit_batch(index)?;
                summary.batches.push(index);
                tracing::info!("{}\t{}", sink.describe(index), summary.exported);
                next_index = index.checked_add(1);
            }
        }

        summary.source = source.stats().clone();
        summary.state_saves = tracker.saves();
        pb.finish(if opts.dry_run { "dry run done" } else { "done" });

        tracing::info!(
            dry_run = summary.dry_run,
            batches = summary.batches.len(),
            exported = summary.exported,
            comments = summary.comments,
            failed = summary.failed.len(),
            unexportable = summary.unexportable_total(),
            already_processed = summary.source.already_processed,
            unresolvable = summary.source.skipped_total(),
            "export run finished"
        );
        Ok(summary)
    }
}
