//! Terminal progress reporting for export runs.

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

fn count_style() -> ProgressStyle {
    ProgressStyle::with_template(
        "{spinner:.green} {msg} {pos}/{len} [{bar:.cyan/blue}] {percent:>3}%  \
         it/s: {per_sec}  elapsed: {elapsed_precise}  eta: {eta_precise}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .progress_chars("█▉▊▋▌▍▎▏  ")
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner:.green} {msg} {pos} records  it/s: {per_sec}  elapsed: {elapsed_precise}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

/// A small wrapper around an `indicatif` bar.
/// Use `ProgressScope::count(..)` when the total is known (`--max-items`),
/// `ProgressScope::spinner(..)` otherwise, or `ProgressScope::hidden()` to draw nothing.
pub struct ProgressScope {
    pb: ProgressBar,
}

impl ProgressScope {
    pub fn count<T: Into<String>>(label: T, total: u64) -> Self {
        let pb = ProgressBar::new(total);
        pb.set_style(count_style());
        Self::labeled(pb, label.into())
    }

    pub fn spinner<T: Into<String>>(label: T) -> Self {
        let pb = ProgressBar::new_spinner();
        pb.set_style(spinner_style());
        Self::labeled(pb, label.into())
    }

    pub fn hidden() -> Self {
        Self { pb: ProgressBar::hidden() }
    }

    fn labeled(pb: ProgressBar, label: String) -> Self {
        if !label.is_empty() {
            pb.set_message(label);
        }
        pb.enable_steady_tick(Duration::from_millis(100));
        Self { pb }
    }

    #[inline]
    pub fn inc_items(&self, delta: u64) {
        self.pb.inc(delta);
    }

    pub fn finish<T: Into<String>>(&self, msg: T) {
        self.pb.finish_with_message(msg.into());
    }
}
