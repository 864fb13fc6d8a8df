use crate::normalize::DEFAULT_TEASER_CHARS;
use crate::state::SaveGranularity;
use crate::util::{dedup_ips, merge_internal_ips};
use std::path::{Path, PathBuf};
use time::UtcOffset;

/// Default state file name, placed in the output directory unless overridden.
pub const DEFAULT_STATE_FILE: &str = ".comment-export-state.json";

/// User-facing options with sensible defaults and builder chaining.
#[derive(Clone, Debug)]
pub struct ExportOptions {
    pub out_dir: PathBuf,
    pub domain: String,               // site domain used to build absolute links
    pub chunk_size: usize,            // records per batch
    pub state_path: Option<PathBuf>,  // if None, out_dir/DEFAULT_STATE_FILE
    pub save_granularity: SaveGranularity,
    pub dry_run: bool,                // enumerate and normalize, write nothing
    pub max_items: Option<usize>,     // cap on records pulled this run
    pub verbosity: u8,                // 0 quiet, 1 batches, 2 per-record, 3 trace
    pub progress: bool,               // show progress spinner
    pub teaser_chars: usize,
    pub local_offset: UtcOffset,      // zone of naive timestamps in the datastore
    pub internal_ips: Vec<String>,    // redacted to loopback on export

    // IO tuning
    pub read_buffer_bytes: usize,
    pub write_buffer_bytes: usize,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            out_dir: PathBuf::from("./wxr_out"),
            domain: "localhost".to_string(),
            chunk_size: 3000,
            state_path: None,
            save_granularity: SaveGranularity::PerBatch,
            dry_run: false,
            max_items: None,
            verbosity: 1,
            progress: true,
            teaser_chars: DEFAULT_TEASER_CHARS,
            local_offset: UtcOffset::UTC,
            internal_ips: Vec::new(),

            read_buffer_bytes: 256 * 1024,
            write_buffer_bytes: 256 * 1024,
        }
    }
}

impl ExportOptions {
    pub fn with_out_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.out_dir = dir.as_ref().to_path_buf();
        self
    }
    pub fn with_domain(mut self, domain: impl AsRef<str>) -> Self {
        let d = domain.as_ref().trim();
        let d = d.strip_prefix("https://").or_else(|| d.strip_prefix("http://")).unwrap_or(d);
        self.domain = d.trim_end_matches('/').to_string();
        self
    }
    pub fn with_chunk_size(mut self, n: usize) -> Self {
        self.chunk_size = n.max(1);
        self
    }
    pub fn with_state_path(mut self, path: impl AsRef<Path>) -> Self {
        self.state_path = Some(path.as_ref().to_path_buf());
        self
    }
    pub fn with_save_granularity(mut self, g: SaveGranularity) -> Self {
        self.save_granularity = g;
        self
    }
    pub fn with_dry_run(mut self, yes: bool) -> Self {
        self.dry_run = yes;
        self
    }
    pub fn with_max_items(mut self, n: Option<usize>) -> Self {
        self.max_items = n;
        self
    }
    pub fn with_verbosity(mut self, v: u8) -> Self {
        self.verbosity = v;
        self
    }
    pub fn with_progress(mut self, yes: bool) -> Self {
        self.progress = yes;
        self
    }
    pub fn with_teaser_chars(mut self, n: usize) -> Self {
        self.teaser_chars = n.max(1);
        self
    }
    pub fn with_local_offset(mut self, offset: UtcOffset) -> Self {
        self.local_offset = offset;
        self
    }
    pub fn with_internal_ips<I, S>(mut self, ips: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.internal_ips.extend(ips.into_iter().map(Into::into));
        dedup_ips(&mut self.internal_ips);
        self
    }
    /// Add addresses from `EXPORT_INTERNAL_IPS` / `EXPORT_INTERNAL_IPS_FILE`.
    pub fn with_env_internal_ips(mut self) -> Self {
        merge_internal_ips(&mut self.internal_ips);
        self
    }

    pub fn resolved_state_path(&self) -> PathBuf {
        self.state_path.clone().unwrap_or_else(|| self.out_dir.join(DEFAULT_STATE_FILE))
    }
}

/// Destination settings for API mode.
#[derive(Clone, Debug)]
pub struct ApiOptions {
    pub forum: String,                 // forum shortname
    pub fallback_author_name: String,  // used when a comment has no author name
    pub fallback_author_email: String, // used when a comment has no author email
}

impl ApiOptions {
    pub fn new(forum: impl Into<String>) -> Self {
        Self {
            forum: forum.into(),
            fallback_author_name: "Anonymous".to_string(),
            fallback_author_email: "anonymous@example.invalid".to_string(),
        }
    }
    pub fn with_fallback_author(mut self, name: impl Into<String>, email: impl Into<String>) -> Self {
        self.fallback_author_name = name.into();
        self.fallback_author_email = email.into();
        self
    }
}
