use anyhow::{Context, Result};
use clap::Parser;
use comment_export::{parse_utc_offset, CommentExport, DumpStore, ExportOptions, SaveGranularity};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "comment-export")]
#[command(about = "Export legacy site comments to Disqus WXR batch files", long_about = None)]
struct Args {
    /// Directory holding the JSON-lines dump (content_types, records/, comments)
    #[arg(long)]
    dump: PathBuf,

    /// Output directory for comments-NNN.xml batches
    #[arg(long, default_value = "./wxr_out")]
    out: PathBuf,

    /// Site domain used to build absolute links
    #[arg(long)]
    domain: String,

    /// Records per batch file
    #[arg(long, default_value = "3000")]
    chunk_size: usize,

    /// Progress state file (defaults to <out>/.comment-export-state.json)
    #[arg(long)]
    state_file: Option<PathBuf>,

    /// Enumerate and normalize only; write nothing
    #[arg(long)]
    dry_run: bool,

    /// Stop after this many resolved records
    #[arg(long)]
    max_items: Option<usize>,

    /// 0 quiet, 1 batches, 2 per record, 3 trace
    #[arg(short, long, default_value = "1")]
    verbosity: u8,

    /// Offset of naive timestamps in the dump, e.g. -05:00
    #[arg(long, default_value = "UTC")]
    utc_offset: String,

    /// Commenter address to redact (repeatable)
    #[arg(long = "internal-ip")]
    internal_ips: Vec<String>,

    /// Teaser length budget in characters
    #[arg(long, default_value = "350")]
    teaser_chars: usize,

    /// Save progress after every record instead of every batch
    #[arg(long)]
    per_item_saves: bool,

    /// Hide the progress spinner
    #[arg(long)]
    no_progress: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let offset = parse_utc_offset(&args.utc_offset)?;
    let granularity = if args.per_item_saves { SaveGranularity::PerItem } else { SaveGranularity::PerBatch };

    let mut opts = ExportOptions::default()
        .with_out_dir(&args.out)
        .with_domain(&args.domain)
        .with_chunk_size(args.chunk_size)
        .with_save_granularity(granularity)
        .with_dry_run(args.dry_run)
        .with_max_items(args.max_items)
        .with_verbosity(args.verbosity)
        .with_progress(!args.no_progress)
        .with_teaser_chars(args.teaser_chars)
        .with_local_offset(offset)
        .with_internal_ips(&args.internal_ips)
        .with_env_internal_ips();
    if let Some(p) = &args.state_file {
        opts = opts.with_state_path(p);
    }

    let export = CommentExport::with_options(opts);
    comment_export::init_tracing_once(args.verbosity);

    let store = DumpStore::open_with_buffer(&args.dump, offset, export.options().read_buffer_bytes)
        .with_context(|| format!("open dump {}", args.dump.display()))?;
    tracing::info!(comments = store.comment_count(), dump=%args.dump.display(), "dump loaded");

    let mut sink = export.wxr_sink();
    let summary = export.run(&store, &mut sink)?;

    if summary.dry_run {
        println!("Dry run: {} records with {} comments would be exported", summary.would_export.len(), summary.comments);
    } else {
        println!(
            "Exported {} records ({} comments) into {} batch files",
            summary.exported,
            summary.comments,
            summary.batches.len()
        );
    }
    if summary.unexportable_total() > 0 || summary.source.skipped_total() > 0 {
        println!(
            "Skipped {} unexportable and {} unresolvable records",
            summary.unexportable_total(),
            summary.source.skipped_total()
        );
    }
    if !summary.failed.is_empty() {
        println!("{} records failed and will be retried on the next run", summary.failed.len());
    }
    Ok(())
}
