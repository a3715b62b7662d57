//! Channel list retrieval and caching.
//!
//! Four upstream families feed the catalogs: regional AU playlists, the NZ
//! playlists, the curated sports/extras feed (three mirrors, first usable
//! answer wins) and the community extras playlist. Each family gets its own
//! TTL cache; a failed refresh degrades to an empty list and is never cached,
//! so the next caller retries immediately.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::models::{AuRegion, Channel, ChannelKind};
use crate::services::cache::{Clock, TtlCache};
use crate::services::fetch::SourceFetch;
use crate::services::m3u_parser;
use crate::sources;

/// Tunables lifted from [`crate::config::Config`] at startup.
#[derive(Debug, Clone)]
pub struct ChannelSettings {
    pub playlist_ttl_ms: i64,
    pub curated_ttl_ms: i64,
    pub extras_ttl_ms: i64,
    pub fetch_timeout: Duration,
    pub extras_url: String,
}

/// Fetches and caches the channel lists behind every catalog.
///
/// Cheap to clone; all state lives behind `Arc`s.
pub struct ChannelService {
    fetch: Arc<dyn SourceFetch>,
    au_lists: Arc<TtlCache<(AuRegion, ChannelKind), Arc<HashMap<String, Channel>>>>,
    nz_lists: Arc<TtlCache<ChannelKind, Arc<HashMap<String, Channel>>>>,
    curated: Arc<TtlCache<(), Arc<Vec<Channel>>>>,
    extras: Arc<TtlCache<(), Arc<Vec<Channel>>>>,
    fetch_timeout: Duration,
    extras_url: String,
}

impl Clone for ChannelService {
    fn clone(&self) -> Self {
        Self {
            fetch: Arc::clone(&self.fetch),
            au_lists: Arc::clone(&self.au_lists),
            nz_lists: Arc::clone(&self.nz_lists),
            curated: Arc::clone(&self.curated),
            extras: Arc::clone(&self.extras),
            fetch_timeout: self.fetch_timeout,
            extras_url: self.extras_url.clone(),
        }
    }
}

impl ChannelService {
    pub fn new(
        fetch: Arc<dyn SourceFetch>,
        clock: Arc<dyn Clock>,
        settings: ChannelSettings,
    ) -> Self {
        Self {
            fetch,
            au_lists: Arc::new(TtlCache::new(
                "au_playlists",
                settings.playlist_ttl_ms,
                Arc::clone(&clock),
            )),
            nz_lists: Arc::new(TtlCache::new(
                "nz_playlists",
                settings.playlist_ttl_ms,
                Arc::clone(&clock),
            )),
            curated: Arc::new(TtlCache::new(
                "curated_feed",
                settings.curated_ttl_ms,
                Arc::clone(&clock),
            )),
            extras: Arc::new(TtlCache::new("extras_feed", settings.extras_ttl_ms, clock)),
            fetch_timeout: settings.fetch_timeout,
            extras_url: settings.extras_url,
        }
    }

    /// Channel map for one AU region and playlist kind.
    ///
    /// Channels without an upstream logo get the region's logo URL filled in.
    /// A failed fetch returns an empty map without caching it.
    pub async fn channels_for_region(
        &self,
        region: AuRegion,
        kind: ChannelKind,
    ) -> Arc<HashMap<String, Channel>> {
        let key = (region, kind);
        if let Some(hit) = self.au_lists.get(&key).await {
            return hit;
        }

        let url = sources::au_playlist_url(region, kind);
        match self.fetch.fetch_text(&url, self.fetch_timeout).await {
            Ok(body) => {
                let mut channels = m3u_parser::parse_map(&body);
                for channel in channels.values_mut() {
                    if channel.logo.is_none() {
                        channel.logo = Some(sources::au_logo_url(region, &channel.id));
                    }
                }
                tracing::info!(
                    "Playlist {}/{}: {} channels",
                    region.slug(),
                    kind.as_str(),
                    channels.len()
                );
                let channels = Arc::new(channels);
                self.au_lists.set(key, Arc::clone(&channels)).await;
                channels
            }
            Err(err) => {
                tracing::warn!("Playlist fetch {} failed: {}", url, err);
                Arc::new(HashMap::new())
            }
        }
    }

    /// Channel map for one NZ playlist kind. Same contract as
    /// [`Self::channels_for_region`].
    pub async fn nz_channels(&self, kind: ChannelKind) -> Arc<HashMap<String, Channel>> {
        if let Some(hit) = self.nz_lists.get(&kind).await {
            return hit;
        }

        let url = sources::nz_playlist_url(kind);
        match self.fetch.fetch_text(&url, self.fetch_timeout).await {
            Ok(body) => {
                let mut channels = m3u_parser::parse_map(&body);
                for channel in channels.values_mut() {
                    if channel.logo.is_none() {
                        channel.logo = Some(sources::nz_logo_url(&channel.id));
                    }
                }
                tracing::info!("Playlist nz/{}: {} channels", kind.as_str(), channels.len());
                let channels = Arc::new(channels);
                self.nz_lists.set(kind, Arc::clone(&channels)).await;
                channels
            }
            Err(err) => {
                tracing::warn!("Playlist fetch {} failed: {}", url, err);
                Arc::new(HashMap::new())
            }
        }
    }

    /// Entry list from the curated sports/extras feed.
    ///
    /// Mirrors are tried in order; the first one that answers with a body of
    /// at least [`sources::CURATED_MIN_BODY_BYTES`] and at least one parsed
    /// entry wins. Entries keep source order and duplicate ids, so quality
    /// variants of the same channel all survive.
    pub async fn curated_channels(&self) -> Arc<Vec<Channel>> {
        if let Some(hit) = self.curated.get(&()).await {
            return hit;
        }

        match self.fetch_curated().await {
            Some(entries) => {
                let entries = Arc::new(entries);
                self.curated.set((), Arc::clone(&entries)).await;
                entries
            }
            None => Arc::new(Vec::new()),
        }
    }

    async fn fetch_curated(&self) -> Option<Vec<Channel>> {
        for mirror in sources::CURATED_MIRRORS {
            match self.fetch.fetch_text(mirror, self.fetch_timeout).await {
                Ok(body) if body.len() < sources::CURATED_MIN_BODY_BYTES => {
                    tracing::warn!(
                        "Curated mirror {} answered only {} bytes, trying next",
                        mirror,
                        body.len()
                    );
                }
                Ok(body) => {
                    let entries = m3u_parser::parse_entries(&body);
                    if entries.is_empty() {
                        tracing::warn!("Curated mirror {} parsed no entries, trying next", mirror);
                    } else {
                        tracing::info!("Curated feed: {} entries via {}", entries.len(), mirror);
                        return Some(entries);
                    }
                }
                Err(err) => {
                    tracing::warn!("Curated mirror {} failed: {}", mirror, err);
                }
            }
        }
        tracing::warn!("All curated mirrors failed");
        None
    }

    /// Entry list from the community extras playlist.
    ///
    /// Extras entries rarely carry a `tvg-id`, so ids are synthesized from
    /// the name slug plus a hash of the stream URL. The same entry keeps the
    /// same id across refetches, which keeps meta links stable.
    pub async fn extras_channels(&self) -> Arc<Vec<Channel>> {
        if let Some(hit) = self.extras.get(&()).await {
            return hit;
        }

        match self.fetch.fetch_text(&self.extras_url, self.fetch_timeout).await {
            Ok(body) => {
                let mut entries = m3u_parser::parse_entries(&body);
                for channel in &mut entries {
                    channel.id = sources::extras_channel_id(&channel.name, &channel.url);
                }
                tracing::info!("Extras feed: {} entries", entries.len());
                let entries = Arc::new(entries);
                self.extras.set((), Arc::clone(&entries)).await;
                entries
            }
            Err(err) => {
                tracing::warn!("Extras fetch {} failed: {}", self.extras_url, err);
                Arc::new(Vec::new())
            }
        }
    }

    /// Drops expired entries from every cache. Returns how many were purged.
    pub async fn purge_expired(&self) -> usize {
        self.au_lists.purge_expired().await
            + self.nz_lists.purge_expired().await
            + self.curated.purge_expired().await
            + self.extras.purge_expired().await
    }

    /// Entry counts per cache, for the health endpoint.
    pub async fn cache_sizes(&self) -> Vec<(&'static str, usize)> {
        vec![
            (self.au_lists.name(), self.au_lists.len().await),
            (self.nz_lists.name(), self.nz_lists.len().await),
            (self.curated.name(), self.curated.len().await),
            (self.extras.name(), self.extras.len().await),
        ]
    }
}

/// Buckets an entry list into packs by group label, preserving both the
/// order packs first appear in and the order of entries inside each pack.
/// Entries without a group land in "Other".
pub fn group_into_packs(channels: &[Channel]) -> Vec<(String, Vec<Channel>)> {
    let mut packs: Vec<(String, Vec<Channel>)> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for channel in channels {
        let label = channel.group.clone().unwrap_or_else(|| "Other".to_string());
        let slot = *index.entry(label.clone()).or_insert_with(|| {
            packs.push((label, Vec::new()));
            packs.len() - 1
        });
        packs[slot].1.push(channel.clone());
    }

    packs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::cache::ManualClock;
    use crate::services::fetch::StubFetch;

    fn service(fetch: StubFetch, clock: Arc<ManualClock>) -> (ChannelService, Arc<StubFetch>) {
        let fetch = Arc::new(fetch);
        let service = ChannelService::new(
            Arc::clone(&fetch) as Arc<dyn SourceFetch>,
            clock,
            ChannelSettings {
                playlist_ttl_ms: 15 * 60 * 1000,
                curated_ttl_ms: 20 * 60 * 1000,
                extras_ttl_ms: 90 * 1000,
                fetch_timeout: Duration::from_secs(10),
                extras_url: "http://extras.test/list.m3u".to_string(),
            },
        );
        (service, fetch)
    }

    fn sydney_playlist() -> String {
        concat!(
            "#EXTM3U\n",
            "#EXTINF:-1 tvg-id=\"ABC.syd\" tvg-logo=\"http://logos.test/abc.png\" ",
            "group-title=\"News\", ABC\n",
            "http://stream.test/abc\n",
            "#EXTINF:-1 tvg-id=\"SBS.syd\" group-title=\"News\", SBS\n",
            "http://stream.test/sbs\n",
        )
        .to_string()
    }

    #[tokio::test]
    async fn test_regional_playlist_cached_until_ttl() {
        let clock = Arc::new(ManualClock::new(0));
        let url = sources::au_playlist_url(AuRegion::Sydney, ChannelKind::Tv);
        let (service, fetch) = service(
            StubFetch::new().with_body(&url, sydney_playlist()),
            Arc::clone(&clock),
        );

        let first = service
            .channels_for_region(AuRegion::Sydney, ChannelKind::Tv)
            .await;
        assert_eq!(first.len(), 2);

        clock.advance(14 * 60 * 1000);
        service
            .channels_for_region(AuRegion::Sydney, ChannelKind::Tv)
            .await;
        assert_eq!(fetch.calls_for(&url), 1);

        clock.advance(2 * 60 * 1000);
        service
            .channels_for_region(AuRegion::Sydney, ChannelKind::Tv)
            .await;
        assert_eq!(fetch.calls_for(&url), 2);
    }

    #[tokio::test]
    async fn test_logo_fallback_fills_only_missing_logos() {
        let clock = Arc::new(ManualClock::new(0));
        let url = sources::au_playlist_url(AuRegion::Sydney, ChannelKind::Tv);
        let (service, _fetch) = service(
            StubFetch::new().with_body(&url, sydney_playlist()),
            clock,
        );

        let channels = service
            .channels_for_region(AuRegion::Sydney, ChannelKind::Tv)
            .await;

        let abc = channels.get("ABC.syd").unwrap();
        assert_eq!(abc.logo.as_deref(), Some("http://logos.test/abc.png"));

        let sbs = channels.get("SBS.syd").unwrap();
        assert_eq!(
            sbs.logo.as_deref(),
            Some(sources::au_logo_url(AuRegion::Sydney, "SBS.syd").as_str())
        );
    }

    #[tokio::test]
    async fn test_playlist_failure_degrades_to_empty_and_is_not_cached() {
        let clock = Arc::new(ManualClock::new(0));
        let url = sources::au_playlist_url(AuRegion::Brisbane, ChannelKind::Tv);
        let (service, fetch) = service(StubFetch::new().with_status(&url, 500), clock);

        let first = service
            .channels_for_region(AuRegion::Brisbane, ChannelKind::Tv)
            .await;
        assert!(first.is_empty());

        // No TTL advance needed, the failure result was never stored.
        service
            .channels_for_region(AuRegion::Brisbane, ChannelKind::Tv)
            .await;
        assert_eq!(fetch.calls_for(&url), 2);
    }

    #[tokio::test]
    async fn test_nz_channels_hit_nz_urls_and_logos() {
        let clock = Arc::new(ManualClock::new(0));
        let url = sources::nz_playlist_url(ChannelKind::Radio);
        let body = concat!(
            "#EXTM3U\n",
            "#EXTINF:-1 tvg-id=\"rnz.national\", RNZ National\n",
            "http://stream.test/rnz\n",
        );
        let (service, fetch) = service(StubFetch::new().with_body(&url, body), clock);

        let channels = service.nz_channels(ChannelKind::Radio).await;
        assert_eq!(fetch.calls_for(&url), 1);

        let rnz = channels.get("rnz.national").unwrap();
        assert_eq!(
            rnz.logo.as_deref(),
            Some(sources::nz_logo_url("rnz.national").as_str())
        );
    }

    #[tokio::test]
    async fn test_curated_failover_skips_error_and_short_mirrors() {
        let clock = Arc::new(ManualClock::new(0));
        let good = concat!(
            "#EXTM3U\n",
            "#EXTINF:-1 tvg-id=\"\" group-title=\"EPL\", Match One\n",
            "http://stream.test/m1\n",
            "#EXTINF:-1 tvg-id=\"\" group-title=\"EPL\", Match Two\n",
            "http://stream.test/m2\n",
        );
        let (service, fetch) = service(
            StubFetch::new()
                .with_status(sources::CURATED_MIRRORS[0], 404)
                .with_body(sources::CURATED_MIRRORS[1], "#EXTM3U\n")
                .with_body(sources::CURATED_MIRRORS[2], good),
            clock,
        );

        let entries = service.curated_channels().await;
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "Match One");
        assert_eq!(fetch.calls_for(sources::CURATED_MIRRORS[0]), 1);
        assert_eq!(fetch.calls_for(sources::CURATED_MIRRORS[1]), 1);
        assert_eq!(fetch.calls_for(sources::CURATED_MIRRORS[2]), 1);
    }

    #[tokio::test]
    async fn test_curated_rejects_long_body_with_no_entries() {
        let clock = Arc::new(ManualClock::new(0));
        // Over the minimum byte floor but nothing parseable in it.
        let junk = "<html>".repeat(40);
        let (service, fetch) = service(
            StubFetch::new()
                .with_body(sources::CURATED_MIRRORS[0], junk)
                .with_status(sources::CURATED_MIRRORS[1], 500)
                .with_status(sources::CURATED_MIRRORS[2], 500),
            clock,
        );

        let entries = service.curated_channels().await;
        assert!(entries.is_empty());

        // Total failure is not cached either.
        service.curated_channels().await;
        assert_eq!(fetch.calls_for(sources::CURATED_MIRRORS[0]), 2);
    }

    #[tokio::test]
    async fn test_curated_preserves_duplicate_quality_variants() {
        let clock = Arc::new(ManualClock::new(0));
        let body = concat!(
            "#EXTM3U\n",
            "#EXTINF:-1 tvg-id=\"sky.sport\" group-title=\"Sports\", Sky Sport HD\n",
            "http://stream.test/hd\n",
            "#EXTINF:-1 tvg-id=\"sky.sport\" group-title=\"Sports\", Sky Sport SD\n",
            "http://stream.test/sd\n",
        );
        let (service, _fetch) = service(
            StubFetch::new().with_body(sources::CURATED_MIRRORS[0], body),
            clock,
        );

        let entries = service.curated_channels().await;
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].id, entries[1].id);
    }

    #[tokio::test]
    async fn test_extras_ids_are_synthesized_and_stable() {
        let clock = Arc::new(ManualClock::new(0));
        let body = concat!(
            "#EXTM3U\n",
            "#EXTINF:-1 group-title=\"Events\", Big Fight Night\n",
            "http://stream.test/fight\n",
            "#EXTINF:-1 group-title=\"Events\", Big Fight Night\n",
            "http://stream.test/fight-alt\n",
        );
        let (service, fetch) = service(
            StubFetch::new().with_body("http://extras.test/list.m3u", body),
            Arc::clone(&clock),
        );

        let first = service.extras_channels().await;
        assert_eq!(
            first[0].id,
            sources::extras_channel_id("Big Fight Night", "http://stream.test/fight")
        );
        // Same name, different stream: ids must not collide.
        assert_ne!(first[0].id, first[1].id);

        clock.advance(10 * 60 * 1000);
        let second = service.extras_channels().await;
        assert_eq!(first[0].id, second[0].id);
        assert_eq!(fetch.calls_for("http://extras.test/list.m3u"), 2);
    }

    #[tokio::test]
    async fn test_group_into_packs_preserves_first_seen_order() {
        let entry = |name: &str, group: Option<&str>| Channel {
            id: name.to_lowercase(),
            name: name.to_string(),
            logo: None,
            group: group.map(str::to_string),
            url: format!("http://stream.test/{}", name.to_lowercase()),
        };

        let packs = group_into_packs(&[
            entry("One", Some("EPL")),
            entry("Two", Some("NBA")),
            entry("Three", Some("EPL")),
            entry("Four", None),
        ]);

        assert_eq!(packs.len(), 3);
        assert_eq!(packs[0].0, "EPL");
        assert_eq!(packs[0].1.len(), 2);
        assert_eq!(packs[1].0, "NBA");
        assert_eq!(packs[2].0, "Other");
    }
}
