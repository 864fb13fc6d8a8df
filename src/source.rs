//! Deduplicating source iterator: distinct keys with comments → resolved owning records.

use crate::model::{ContentType, RecordKey, SkipReason, SourceRecord};
use crate::store::{CommentStore, ContentTypes, RecordResolver};
use ahash::{AHashMap, AHashSet};
use anyhow::Result;
use std::collections::BTreeMap;

/// Content-type lookups for one run. Misses are cached too.
#[derive(Default)]
pub struct ContentTypeCache {
    entries: AHashMap<u32, Option<ContentType>>,
    lookups: u64,
}

impl ContentTypeCache {
    pub fn get(&mut self, types: &dyn ContentTypes, id: u32) -> Result<Option<ContentType>> {
        if let Some(hit) = self.entries.get(&id) {
            return Ok(hit.clone());
        }
        self.lookups += 1;
        let ct = types.content_type(id)?;
        self.entries.insert(id, ct.clone());
        Ok(ct)
    }

    /// Number of lookups that went to the underlying table.
    pub fn lookups(&self) -> u64 {
        self.lookups
    }
}

/// Counters describing what the iterator passed over.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SourceStats {
    pub yielded: u64,
    pub already_processed: u64,
    pub duplicates: u64,
    /// Unresolvable keys by `SkipReason::label()`.
    pub skipped: BTreeMap<&'static str, u64>,
}

impl SourceStats {
    pub fn skipped_total(&self) -> u64 {
        self.skipped.values().sum()
    }
}

/// Lazily yields one resolved record per distinct key, skipping keys already
/// processed and keys whose owner cannot be resolved.
///
/// Only a failure of the key enumeration itself comes out as an `Err` item.
/// Keys arrive ordered, so a repeat always follows its first occurrence and only
/// the previous key is remembered.
pub struct SourceIterator<'a> {
    keys: Box<dyn Iterator<Item = Result<RecordKey>> + 'a>,
    types: &'a dyn ContentTypes,
    resolver: &'a dyn RecordResolver,
    done: AHashSet<RecordKey>,
    last: Option<RecordKey>,
    cache: ContentTypeCache,
    stats: SourceStats,
}

impl<'a> SourceIterator<'a> {
    /// `done` is a snapshot of the keys completed by earlier runs.
    pub fn new(
        comments: &'a dyn CommentStore,
        types: &'a dyn ContentTypes,
        resolver: &'a dyn RecordResolver,
        done: impl IntoIterator<Item = RecordKey>,
    ) -> Result<Self> {
        Ok(Self {
            keys: comments.distinct_keys()?,
            types,
            resolver,
            done: done.into_iter().collect(),
            last: None,
            cache: ContentTypeCache::default(),
            stats: SourceStats::default(),
        })
    }

    pub fn stats(&self) -> &SourceStats {
        &self.stats
    }

    pub fn cache(&self) -> &ContentTypeCache {
        &self.cache
    }

    /// Resolve one key; every failure becomes a `SkipReason`.
    fn resolve_key(&mut self, key: &RecordKey) -> Result<SourceRecord, SkipReason> {
        if !key.has_valid_object_id() {
            return Err(SkipReason::MalformedId);
        }
        let ct = match self.cache.get(self.types, key.content_type_id) {
            Ok(Some(ct)) => ct,
            Ok(None) => return Err(SkipReason::UnknownContentType),
            Err(e) => return Err(SkipReason::Resolver(format!("{e:#}"))),
        };
        match self.resolver.resolve(&ct, key) {
            Ok(Some(record)) => {
                tracing::debug!(key=%key, "{}({}) -> {}", ct.model, key.object_id, record.repr);
                Ok(record)
            }
            Ok(None) => Err(SkipReason::NotFound),
            Err(e) => Err(SkipReason::Resolver(format!("{e:#}"))),
        }
    }
}

impl Iterator for SourceIterator<'_> {
    type Item = Result<SourceRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let key = match self.keys.next()? {
                Ok(k) => k,
                Err(e) => return Some(Err(e.context("enumerating commented records"))),
            };
            if self.last.as_ref() == Some(&key) {
                self.stats.duplicates += 1;
                continue;
            }
            self.last = Some(key.clone());
            if self.done.contains(&key) {
                self.stats.already_processed += 1;
                continue;
            }
            match self.resolve_key(&key) {
                Ok(record) => {
                    self.stats.yielded += 1;
                    return Some(Ok(record));
                }
                Err(reason) => {
                    tracing::debug!(key=%key, reason=%reason, "owning record does not resolve; skipping");
                    *self.stats.skipped.entry(reason.label()).or_insert(0) += 1;
                }
            }
        }
    }
}
