mod config;
mod date;
mod paths;
mod jsonl;
mod model;

mod normalize;
mod registry;
mod store;
mod source;
mod batch;

mod state;
mod sink;
mod wxr;
mod api;

mod progress;
mod util;
mod pipeline;

pub use crate::config::{ApiOptions, ExportOptions, DEFAULT_STATE_FILE};
pub use crate::date::{format_wxr, parse_utc_offset, Moment};
pub use crate::pipeline::{CommentExport, RunSummary};

pub use crate::model::{
    Comment, CommentStatus, CommentTarget, ContentType, RecordKey, SkipReason, SourceRecord,
};

// Normalization and the per-type hook registry.
pub use crate::normalize::{sanitize_body, strip_tags, teaser_from_body, Normalizer, DEFAULT_TEASER_CHARS};
pub use crate::registry::{KindRegistry, PhotoKind, RecordKind};

// Datastore seams plus the JSON-lines dump implementation.
pub use crate::store::{CommentStore, ContentTypes, Datastore, DumpStore, RecordResolver};
pub use crate::source::{ContentTypeCache, SourceIterator, SourceStats};
pub use crate::batch::{chunk, Chunks};

// Resumable progress.
pub use crate::state::{ProgressState, ProgressStore, ProgressTracker, SaveGranularity, STATE_VERSION};
pub use crate::paths::{batch_file_name, discover_batch_files, next_batch_index};

// Sinks: WXR files and the remote comment API.
pub use crate::sink::{BatchReport, ExportSink, IpPolicy, LOOPBACK_IP};
pub use crate::wxr::{cdata, escape_text, WxrFileSink, WxrWriter};
pub use crate::api::{ApiSink, DisqusApi, Forum, NewPost, PostState, Thread, ThreadLookup};

pub use crate::progress::ProgressScope;

//export robust file ops from util so binaries can import from crate root.
pub use crate::util::{init_tracing_once, open_with_backoff, create_with_backoff, remove_with_backoff, replace_file_atomic_backoff};
