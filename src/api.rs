//! API-mode export: one remote create per comment against a resolved thread.
//!
//! The remote service is reached through [`DisqusApi`]; this crate ships no
//! network client for it.

use crate::config::ApiOptions;
use crate::model::{Comment, CommentTarget};
use crate::sink::{BatchReport, ExportSink, IpPolicy};
use crate::state::ProgressTracker;
use ahash::AHashMap;
use anyhow::{Context, Result};
use std::fmt;
use time::OffsetDateTime;

/// How `thread.details` addresses a thread.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ThreadLookup<'a> {
    Ident(&'a str),
    Link(&'a str),
}

impl fmt::Display for ThreadLookup<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThreadLookup::Ident(id) => write!(f, "ident:{id}"),
            ThreadLookup::Link(url) => write!(f, "link:{url}"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Forum {
    pub id: String,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Thread {
    pub id: String,
    pub link: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PostState {
    Approved,
    Killed,
}

impl PostState {
    pub fn for_comment(c: &Comment) -> Self {
        if c.is_approved() {
            PostState::Approved
        } else {
            PostState::Killed
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PostState::Approved => "approved",
            PostState::Killed => "killed",
        }
    }
}

/// Arguments of `post.create`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewPost {
    pub thread: String,
    pub message: String,
    pub author_name: String,
    pub author_email: String,
    pub author_url: String,
    pub state: PostState,
    pub date: OffsetDateTime,
    pub ip_address: Option<String>,
}

/// The remote commenting API.
pub trait DisqusApi {
    fn forum_details(&mut self, forum: &str) -> Result<Forum>;
    /// `Ok(None)` when no thread matches.
    fn thread_details(&mut self, forum: &str, lookup: ThreadLookup<'_>) -> Result<Option<Thread>>;
    fn thread_create(&mut self, forum: &str, identifier: &str, url: &str, title: &str) -> Result<Thread>;
    /// Returns the new post id.
    fn post_create(&mut self, post: &NewPost) -> Result<String>;
}

pub struct ApiSink<A> {
    api: A,
    opts: ApiOptions,
    ips: IpPolicy,
    domain: String,
    forum: Forum,
    by_ident: AHashMap<String, String>,
    by_url: AHashMap<String, String>,
}

impl<A: DisqusApi> ApiSink<A> {
    /// Fails when the forum cannot be found: nothing could succeed without it.
    pub fn connect(mut api: A, opts: ApiOptions, domain: impl Into<String>, ips: IpPolicy) -> Result<Self> {
        let forum = api
            .forum_details(&opts.forum)
            .with_context(|| format!("forum {:?} not found; aborting export", opts.forum))?;
        tracing::info!(forum=%forum.name, id=%forum.id, "connected to destination forum");
        Ok(Self {
            api,
            opts,
            ips,
            domain: domain.into(),
            forum,
            by_ident: AHashMap::new(),
            by_url: AHashMap::new(),
        })
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn into_api(self) -> A {
        self.api
    }

    pub fn forum(&self) -> &Forum {
        &self.forum
    }

    fn absolute_url(&self, target: &CommentTarget) -> String {
        format!("http://{}{}", self.domain, target.url)
    }

    fn remember(&mut self, ident: &str, url: &str, thread_id: &str) {
        self.by_ident.insert(ident.to_string(), thread_id.to_string());
        self.by_url.insert(url.to_string(), thread_id.to_string());
    }

    /// Thread for `target`: memo, then identifier lookup, then URL lookup, then create.
    pub fn resolve_thread(&mut self, target: &CommentTarget) -> Result<String> {
        let ident = target.disqus_id.as_str();
        let url = self.absolute_url(target);
        if let Some(id) = self.by_ident.get(ident).or_else(|| self.by_url.get(&url)) {
            return Ok(id.clone());
        }

        let forum = self.opts.forum.clone();
        for lookup in [ThreadLookup::Ident(ident), ThreadLookup::Link(&url)] {
            match self.api.thread_details(&forum, lookup) {
                Ok(Some(thread)) => {
                    self.remember(ident, &url, &thread.id);
                    return Ok(thread.id);
                }
                Ok(None) => {}
                Err(e) => tracing::debug!(lookup=%lookup, error=%e, "thread lookup failed"),
            }
        }

        let thread = self
            .api
            .thread_create(&forum, ident, &url, &target.title)
            .with_context(|| format!("create thread {ident}"))?;
        tracing::debug!(ident, thread=%thread.id, "created thread");
        self.remember(ident, &url, &thread.id);
        Ok(thread.id)
    }

    fn new_post(&self, thread: &str, c: &Comment) -> NewPost {
        let author_name = if c.author_name.trim().is_empty() {
            self.opts.fallback_author_name.clone()
        } else {
            c.author_name.clone()
        };
        let author_email = if c.author_email.trim().is_empty() {
            self.opts.fallback_author_email.clone()
        } else {
            c.author_email.clone()
        };
        NewPost {
            thread: thread.to_string(),
            message: c.body.clone(),
            author_name,
            author_email,
            author_url: c.author_url.clone(),
            state: PostState::for_comment(c),
            date: c.submit_date_utc,
            ip_address: self.ips.redact(c.ip_address.as_deref()),
        }
    }

    /// Submit every pending comment of `target`, stopping at the first failure.
    /// `Err` is reserved for state persistence failures, which end the run.
    fn export_target(&mut self, target: &CommentTarget, tracker: &mut ProgressTracker) -> Result<TargetOutcome> {
        let mut thread: Option<String> = None;
        let mut sent = 0usize;
        for c in &target.comments {
            if tracker.is_comment_processed(c.id) {
                continue;
            }
            let thread_id = match thread.clone() {
                Some(t) => t,
                None => match self.resolve_thread(target) {
                    Ok(t) => {
                        thread = Some(t.clone());
                        t
                    }
                    Err(error) => return Ok(TargetOutcome::Failed { sent, error }),
                },
            };
            let post = self.new_post(&thread_id, c);
            match self.api.post_create(&post) {
                Ok(post_id) => {
                    tracing::trace!(comment = c.id, post=%post_id, state = post.state.as_str(), "comment submitted");
                }
                Err(e) => {
                    let error = e.context(format!("post comment {} to thread {}", c.id, thread_id));
                    return Ok(TargetOutcome::Failed { sent, error });
                }
            }
            tracker.mark_comment_durable(c.id)?;
            sent += 1;
        }
        Ok(TargetOutcome::Done(sent))
    }
}

enum TargetOutcome {
    Done(usize),
    Failed { sent: usize, error: anyhow::Error },
}

impl<A: DisqusApi> ExportSink for ApiSink<A> {
    fn emit_batch(
        &mut self,
        _index: u32,
        targets: &[CommentTarget],
        tracker: &mut ProgressTracker,
    ) -> Result<BatchReport> {
        let mut report = BatchReport::default();
        for t in targets {
            match self.export_target(t, tracker)? {
                TargetOutcome::Done(sent) => {
                    tracker.mark_record(&t.key)?;
                    report.exported += 1;
                    report.comments += sent;
                }
                TargetOutcome::Failed { sent, error } => {
                    let msg = format!("{error:#}");
                    tracing::warn!(key=%t.key, ident=%t.disqus_id, error=%msg, "record export failed; will retry next run");
                    report.comments += sent;
                    report.failed.push((t.key.clone(), msg));
                }
            }
        }
        Ok(report)
    }

    fn describe(&self, index: u32) -> String {
        format!("api batch {index} ({})", self.opts.forum)
    }
}
