//! Region-bucket guide builds.
//!
//! A bucket maps to a fixed, ordered list of shard URLs. Shards are fetched
//! concurrently through a long-TTL per-URL document cache, then merged in
//! shard-list order so that first-writer-wins name-index collisions stay
//! deterministic no matter which fetch settles first. A failed shard
//! contributes nothing; it never fails the build.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::Result;
use futures::future::{join_all, BoxFuture, FutureExt, Shared};
use tokio::sync::oneshot;

use crate::metrics::{GUIDE_BUILDS, GUIDE_SHARD_FAILURES};
use crate::models::{set_if_absent, AuRegion, GuideBucket, GuideIndex};
use crate::services::cache::{Clock, TtlCache};
use crate::services::epg::parser::{self, GzipHint};
use crate::services::fetch::SourceFetch;
use crate::sources;

type SharedBuild = Shared<BoxFuture<'static, Option<Arc<GuideIndex>>>>;

/// Fetches, merges and caches guide indexes per region bucket.
///
/// Cheap to clone; all state lives behind `Arc`s.
pub struct GuideService {
    fetch: Arc<dyn SourceFetch>,
    /// Parsed documents keyed by shard URL. Shared across buckets, so
    /// overlapping shard lists collapse to one fetch.
    shard_docs: Arc<TtlCache<String, Arc<GuideIndex>>>,
    /// Finished merges keyed by bucket.
    indexes: Arc<TtlCache<GuideBucket, Arc<GuideIndex>>>,
    /// Builds in progress. Registered before any suspension point so two
    /// concurrent callers can never both start the same build.
    inflight: Arc<Mutex<HashMap<GuideBucket, SharedBuild>>>,
    guide_timeout: Duration,
}

impl Clone for GuideService {
    fn clone(&self) -> Self {
        Self {
            fetch: Arc::clone(&self.fetch),
            shard_docs: Arc::clone(&self.shard_docs),
            indexes: Arc::clone(&self.indexes),
            inflight: Arc::clone(&self.inflight),
            guide_timeout: self.guide_timeout,
        }
    }
}

impl GuideService {
    pub fn new(
        fetch: Arc<dyn SourceFetch>,
        clock: Arc<dyn Clock>,
        guide_ttl_ms: i64,
        guide_timeout: Duration,
    ) -> Self {
        Self {
            fetch,
            shard_docs: Arc::new(TtlCache::new("guide_shards", guide_ttl_ms, Arc::clone(&clock))),
            indexes: Arc::new(TtlCache::new("guide_indexes", guide_ttl_ms, clock)),
            inflight: Arc::new(Mutex::new(HashMap::new())),
            guide_timeout,
        }
    }

    /// Returns the bucket's merged index, building it if necessary.
    ///
    /// With a `soft_timeout` the caller races the build and gets `None` on
    /// expiry; the build itself keeps running and populates the cache for
    /// the next caller. Without one, the caller waits for the build.
    pub async fn get_or_build(
        &self,
        bucket: GuideBucket,
        soft_timeout: Option<Duration>,
    ) -> Option<Arc<GuideIndex>> {
        if let Some(index) = self.indexes.get(&bucket).await {
            return Some(index);
        }

        let build = self.join_or_start_build(bucket);
        match soft_timeout {
            Some(limit) => tokio::time::timeout(limit, build).await.ok().flatten(),
            None => build.await,
        }
    }

    /// Joins an in-flight build for `bucket` or starts one.
    ///
    /// Synchronous on purpose: the registry entry must exist before this
    /// caller's first await, closing the window where a second caller could
    /// observe "no build in progress" and start a duplicate.
    fn join_or_start_build(&self, bucket: GuideBucket) -> SharedBuild {
        let mut inflight = self
            .inflight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(pending) = inflight.get(&bucket) {
            return pending.clone();
        }

        let (tx, rx) = oneshot::channel();
        let build: SharedBuild = rx.map(|result| result.ok()).boxed().shared();
        inflight.insert(bucket, build.clone());
        drop(inflight);

        let service = self.clone();
        tokio::spawn(async move {
            let index = service.build_index(bucket).await;
            if index.is_empty() {
                // Every shard failed. Caching 24h of emptiness would pin the
                // outage, so the next caller gets to retry.
                tracing::warn!("Guide build for {} produced an empty index", bucket);
            } else {
                service.indexes.set(bucket, Arc::clone(&index)).await;
            }
            service.remove_inflight(bucket);
            let _ = tx.send(index);
        });

        build
    }

    fn remove_inflight(&self, bucket: GuideBucket) {
        self.inflight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&bucket);
    }

    /// Fetches all shards for `bucket` concurrently and merges them.
    ///
    /// `join_all` yields results in input order regardless of completion
    /// order, which is what keeps the first-writer-wins rule reproducible.
    async fn build_index(&self, bucket: GuideBucket) -> Arc<GuideIndex> {
        let started = std::time::Instant::now();
        let urls = sources::shard_urls(bucket);
        let shards = join_all(urls.iter().map(|url| self.shard(url.clone()))).await;

        let mut merged = GuideIndex::default();
        for shard in shards.into_iter().flatten() {
            for (channel_id, programmes) in &shard.programmes {
                merged
                    .programmes
                    .entry(channel_id.clone())
                    .or_default()
                    .extend(programmes.iter().cloned());
            }
            for (key, canonical) in &shard.name_index {
                set_if_absent(&mut merged.name_index, key.clone(), canonical);
            }
        }

        let key = bucket.key();
        GUIDE_BUILDS.with_label_values(&[key.as_str()]).inc();
        tracing::info!(
            "Guide build {} done: {} channels, {} programmes in {}ms",
            key,
            merged.channel_count(),
            merged.programme_count(),
            started.elapsed().as_millis()
        );
        Arc::new(merged)
    }

    /// One shard document through the per-URL cache.
    ///
    /// Fetch or parse failure downgrades to `None` after logging; retries
    /// already happened inside the fetcher.
    async fn shard(&self, url: String) -> Option<Arc<GuideIndex>> {
        if let Some(doc) = self.shard_docs.get(&url).await {
            return Some(doc);
        }
        match self.fetch_and_parse(&url).await {
            Ok(doc) => {
                self.shard_docs.set(url, Arc::clone(&doc)).await;
                Some(doc)
            }
            Err(err) => {
                GUIDE_SHARD_FAILURES.inc();
                tracing::warn!("Guide shard {} failed: {:#}", url, err);
                None
            }
        }
    }

    async fn fetch_and_parse(&self, url: &str) -> Result<Arc<GuideIndex>> {
        let body = self.fetch.fetch_bytes(url, self.guide_timeout).await?;
        let hint = GzipHint::from_url(url);
        // Multi-megabyte XML parse; keep it off the async workers.
        let mut index =
            tokio::task::spawn_blocking(move || parser::parse_bytes(&body, hint)).await??;
        index.sort_programmes();
        Ok(Arc::new(index))
    }

    /// Single-document AU regional guide, same per-URL cache as the shards.
    ///
    /// Failure yields an empty index rather than an error; the catalog
    /// degrades to channels without programme data.
    pub async fn guide_for_region(&self, region: AuRegion) -> Arc<GuideIndex> {
        match self.shard(sources::au_guide_url(region)).await {
            Some(doc) => doc,
            None => Arc::new(GuideIndex::default()),
        }
    }

    /// NZ equivalent of [`GuideService::guide_for_region`].
    pub async fn nz_guide(&self) -> Arc<GuideIndex> {
        match self.shard(sources::nz_guide_url()).await {
            Some(doc) => doc,
            None => Arc::new(GuideIndex::default()),
        }
    }

    /// Force-clears both guide caches. Returns (documents, indexes) counts,
    /// the operational escape hatch for stale-data incidents.
    pub async fn invalidate(&self) -> (usize, usize) {
        let docs = self.shard_docs.clear().await;
        let indexes = self.indexes.clear().await;
        tracing::info!(
            "Guide caches invalidated: {} documents, {} indexes dropped",
            docs,
            indexes
        );
        (docs, indexes)
    }

    /// Entry counts for health reporting: (shard documents, merged indexes).
    pub async fn cache_sizes(&self) -> (usize, usize) {
        (self.shard_docs.len().await, self.indexes.len().await)
    }

    /// Drops expired entries from both caches, returns evicted count.
    pub async fn purge_expired(&self) -> usize {
        self.shard_docs.purge_expired().await + self.indexes.purge_expired().await
    }
}
