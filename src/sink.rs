//! The export sink seam and the pieces shared by its implementations.

use crate::model::{CommentTarget, RecordKey};
use crate::state::ProgressTracker;
use crate::util::normalize_ip;
use ahash::AHashSet;
use anyhow::Result;
use std::path::Path;

/// Substitute for missing or internal commenter addresses.
pub const LOOPBACK_IP: &str = "127.0.0.1";

/// Outcome of one emitted batch.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Records fully emitted and marked processed.
    pub exported: usize,
    /// Comments written or submitted.
    pub comments: usize,
    /// Records whose emission failed; they stay unprocessed for the next run.
    pub failed: Vec<(RecordKey, String)>,
}

/// Destination for normalized batches.
///
/// Implementations mark each record in `tracker` only after its output is committed.
/// An `Err` aborts the run; per-record destination failures go into
/// `BatchReport::failed` instead.
pub trait ExportSink {
    fn emit_batch(
        &mut self,
        index: u32,
        targets: &[CommentTarget],
        tracker: &mut ProgressTracker,
    ) -> Result<BatchReport>;

    /// Human label for batch `index` (file name, API batch number).
    fn describe(&self, index: u32) -> String {
        format!("batch {index}")
    }

    /// Directory holding numbered batch files, for sinks that write them.
    fn output_dir(&self) -> Option<&Path> {
        None
    }
}

/// Redacts addresses from a configured internal set.
#[derive(Clone, Debug, Default)]
pub struct IpPolicy {
    internal: AHashSet<String>,
}

impl IpPolicy {
    pub fn new<I, S>(internal: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            internal: internal
                .into_iter()
                .map(|s| normalize_ip(s.as_ref()))
                .filter(|s| !s.is_empty())
                .collect(),
        }
    }

    pub fn is_internal(&self, ip: &str) -> bool {
        self.internal.contains(&normalize_ip(ip))
    }

    /// Internal addresses become the loopback placeholder; others pass through.
    pub fn redact(&self, ip: Option<&str>) -> Option<String> {
        let ip = ip.map(str::trim).filter(|s| !s.is_empty())?;
        if self.is_internal(ip) {
            Some(LOOPBACK_IP.to_string())
        } else {
            Some(ip.to_string())
        }
    }
}
