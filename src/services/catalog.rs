//! Catalog assembly.
//!
//! Joins channel lists with resolved guide entries into the records the
//! addon boundary serializes: catalog rows with now/next descriptions, full
//! metas with upcoming programmes, and per-variant stream lists. Everything
//! here degrades instead of failing: a missing guide index means placeholder
//! text, an unknown channel means `None`.

use std::collections::{HashMap, HashSet};
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use lru::LruCache;

use crate::models::addon::{
    BehaviorHints, CatalogEntry, CatalogExtra, Manifest, ManifestCatalog, MetaDetail, StreamTarget,
};
use crate::models::{AuRegion, Channel, ChannelKind, GuideBucket, GuideIndex, Programme};
use crate::services::cache::Clock;
use crate::services::channels::{group_into_packs, ChannelService};
use crate::services::epg::GuideService;
use crate::services::resolver;
use crate::sources;

/// Shown when no guide data resolves for a channel.
const PLACEHOLDER_DESCRIPTION: &str = "Live TV";

/// Upcoming titles listed in a meta description.
const META_UPCOMING_LIMIT: usize = 6;

// Cache for resolver outcomes, keyed per index build (LRU with 4k max entries)
lazy_static! {
    static ref RESOLVE_MEMO: Mutex<LruCache<(usize, String, String), Option<String>>> =
        Mutex::new(LruCache::new(NonZeroUsize::new(4096).unwrap()));
}

/// One catalog exposed through the manifest; doubles as the scope segment
/// of meta ids (`autv:{scope}:{channelId}`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogScope {
    Au(AuRegion, ChannelKind),
    Nz(ChannelKind),
    Sports,
    Extras,
}

impl CatalogScope {
    /// Every catalog in manifest order: TV first, then the radio variants.
    pub fn all() -> Vec<CatalogScope> {
        let mut scopes = Vec::with_capacity(20);
        for region in AuRegion::ALL {
            scopes.push(CatalogScope::Au(region, ChannelKind::Tv));
        }
        scopes.push(CatalogScope::Nz(ChannelKind::Tv));
        scopes.push(CatalogScope::Sports);
        scopes.push(CatalogScope::Extras);
        for region in AuRegion::ALL {
            scopes.push(CatalogScope::Au(region, ChannelKind::Radio));
        }
        scopes.push(CatalogScope::Nz(ChannelKind::Radio));
        scopes
    }

    /// Catalog id and meta-id scope segment, e.g. `sydney`, `sydney-radio`.
    pub fn key(&self) -> String {
        match self {
            CatalogScope::Au(region, ChannelKind::Tv) => region.slug().to_string(),
            CatalogScope::Au(region, ChannelKind::Radio) => format!("{}-radio", region.slug()),
            CatalogScope::Nz(ChannelKind::Tv) => "nz".to_string(),
            CatalogScope::Nz(ChannelKind::Radio) => "nz-radio".to_string(),
            CatalogScope::Sports => "sports".to_string(),
            CatalogScope::Extras => "extras".to_string(),
        }
    }

    pub fn from_key(key: &str) -> Option<CatalogScope> {
        match key {
            "nz" => return Some(CatalogScope::Nz(ChannelKind::Tv)),
            "nz-radio" => return Some(CatalogScope::Nz(ChannelKind::Radio)),
            "sports" => return Some(CatalogScope::Sports),
            "extras" => return Some(CatalogScope::Extras),
            _ => {}
        }
        if let Some(slug) = key.strip_suffix("-radio") {
            return AuRegion::from_slug(slug).map(|r| CatalogScope::Au(r, ChannelKind::Radio));
        }
        AuRegion::from_slug(key).map(|r| CatalogScope::Au(r, ChannelKind::Tv))
    }

    pub fn display_name(&self) -> String {
        match self {
            CatalogScope::Au(region, ChannelKind::Tv) => format!("AU | {}", region.upstream_name()),
            CatalogScope::Au(region, ChannelKind::Radio) => {
                format!("AU | {} Radio", region.upstream_name())
            }
            CatalogScope::Nz(ChannelKind::Tv) => "NZ | TV".to_string(),
            CatalogScope::Nz(ChannelKind::Radio) => "NZ | Radio".to_string(),
            CatalogScope::Sports => "Sports & Events".to_string(),
            CatalogScope::Extras => "Extras".to_string(),
        }
    }

    /// Genre used when a channel carries no group label of its own.
    fn fallback_genre(&self) -> &'static str {
        match self {
            CatalogScope::Au(_, ChannelKind::Tv) | CatalogScope::Nz(ChannelKind::Tv) => "TV",
            CatalogScope::Au(_, ChannelKind::Radio) | CatalogScope::Nz(ChannelKind::Radio) => {
                "Radio"
            }
            CatalogScope::Sports => "Sports",
            CatalogScope::Extras => "Extras",
        }
    }
}

/// `autv:{scope}:{channelId}` with the channel id percent-encoded.
pub fn meta_id(scope: CatalogScope, channel_id: &str) -> String {
    format!("autv:{}:{}", scope.key(), urlencoding::encode(channel_id))
}

/// Inverse of [`meta_id`]. `None` for foreign prefixes, unknown scopes and
/// undecodable ids.
pub fn parse_meta_id(meta_id: &str) -> Option<(CatalogScope, String)> {
    let rest = meta_id.strip_prefix("autv:")?;
    let (scope_key, encoded) = rest.split_once(':')?;
    let scope = CatalogScope::from_key(scope_key)?;
    let channel_id = urlencoding::decode(encoded).ok()?.into_owned();
    Some((scope, channel_id))
}

/// Current and next programme at `now` within an ascending-by-start list.
///
/// An instant inside a gap yields `(None, next)`; past the final `stop` both
/// sides are `None`.
pub fn now_next(
    programmes: &[Programme],
    now: DateTime<Utc>,
) -> (Option<&Programme>, Option<&Programme>) {
    let mut current = None;
    let mut next = None;
    for programme in programmes {
        if programme.start <= now && now < programme.stop {
            current = Some(programme);
        } else if programme.start > now {
            next = Some(programme);
            break;
        }
    }
    (current, next)
}

/// Catalog-row description: "Now: ..." and "Next: ..." lines, or the
/// placeholder when nothing resolved. Times render in the programme's own
/// upstream offset.
pub fn describe_now_next(programmes: Option<&[Programme]>, now: DateTime<Utc>) -> String {
    let Some(programmes) = programmes else {
        return PLACEHOLDER_DESCRIPTION.to_string();
    };

    let (current, next) = now_next(programmes, now);
    let mut lines = Vec::new();
    if let Some(programme) = current {
        lines.push(format!(
            "Now: {} ({})",
            programme.title,
            format_span(programme)
        ));
    }
    if let Some(programme) = next {
        lines.push(format!(
            "Next: {} ({})",
            programme.title,
            format_span(programme)
        ));
    }

    if lines.is_empty() {
        PLACEHOLDER_DESCRIPTION.to_string()
    } else {
        lines.join("\n")
    }
}

/// Meta description: the current programme plus up to six upcoming titles
/// with their local start times.
pub fn describe_meta(programmes: Option<&[Programme]>, now: DateTime<Utc>) -> String {
    let Some(programmes) = programmes else {
        return PLACEHOLDER_DESCRIPTION.to_string();
    };

    let (current, _) = now_next(programmes, now);
    let mut lines = Vec::new();
    if let Some(programme) = current {
        lines.push(format!(
            "Now: {} ({})",
            programme.title,
            format_span(programme)
        ));
    }

    let upcoming: Vec<&Programme> = programmes
        .iter()
        .filter(|p| p.start > now)
        .take(META_UPCOMING_LIMIT)
        .collect();
    if !upcoming.is_empty() {
        lines.push("Coming up:".to_string());
        for programme in upcoming {
            lines.push(format!(
                "  {} {}",
                programme.start.format("%H:%M"),
                programme.title
            ));
        }
    }

    if lines.is_empty() {
        PLACEHOLDER_DESCRIPTION.to_string()
    } else {
        lines.join("\n")
    }
}

fn format_span(programme: &Programme) -> String {
    format!(
        "{} - {}",
        programme.start.format("%H:%M"),
        programme.stop.format("%H:%M")
    )
}

/// Assembles addon records from channel lists and guide indexes.
///
/// Cheap to clone; all state lives behind `Arc`s.
pub struct CatalogService {
    channels: ChannelService,
    guides: GuideService,
    clock: Arc<dyn Clock>,
    soft_timeout: Duration,
}

impl Clone for CatalogService {
    fn clone(&self) -> Self {
        Self {
            channels: self.channels.clone(),
            guides: self.guides.clone(),
            clock: Arc::clone(&self.clock),
            soft_timeout: self.soft_timeout,
        }
    }
}

impl CatalogService {
    pub fn new(
        channels: ChannelService,
        guides: GuideService,
        clock: Arc<dyn Clock>,
        soft_timeout: Duration,
    ) -> Self {
        Self {
            channels,
            guides,
            clock,
            soft_timeout,
        }
    }

    /// Addon manifest. Pack labels from the current curated feed become the
    /// genre options of the sports catalog; when the feed is down the
    /// catalog simply lists no options.
    pub async fn manifest(&self) -> Manifest {
        let curated = self.channels.curated_channels().await;
        let pack_names: Vec<String> = group_into_packs(&curated)
            .into_iter()
            .map(|(label, _)| label)
            .collect();

        let catalogs = CatalogScope::all()
            .into_iter()
            .map(|scope| ManifestCatalog {
                kind: "tv".to_string(),
                id: scope.key(),
                name: scope.display_name(),
                extra: match scope {
                    CatalogScope::Sports => vec![CatalogExtra {
                        name: "genre".to_string(),
                        is_required: false,
                        options: pack_names.clone(),
                    }],
                    CatalogScope::Extras => vec![CatalogExtra {
                        name: "genre".to_string(),
                        is_required: false,
                        options: Vec::new(),
                    }],
                    _ => Vec::new(),
                },
            })
            .collect();

        Manifest {
            id: "au.autv.live".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            name: "AUTV".to_string(),
            description: "Free-to-air AU & NZ live TV and radio with EPG, plus curated sports \
                          and extras feeds"
                .to_string(),
            resources: vec![
                "catalog".to_string(),
                "meta".to_string(),
                "stream".to_string(),
            ],
            types: vec!["tv".to_string()],
            id_prefixes: vec!["autv:".to_string()],
            catalogs,
            behavior_hints: BehaviorHints {
                configurable: false,
                configuration_required: false,
            },
        }
    }

    /// Catalog rows for one scope, optionally filtered to a single pack.
    ///
    /// Regional and extras catalogs sort by name; the curated feed keeps its
    /// source order inside packs. Quality variants sharing an id collapse to
    /// one row, the stream resource lists them all.
    pub async fn catalog(&self, scope: CatalogScope, genre: Option<&str>) -> Vec<CatalogEntry> {
        let now = self.now_utc();
        match scope {
            CatalogScope::Au(region, kind) => {
                let channels = self.channels.channels_for_region(region, kind).await;
                let index = self.index_for(scope).await;
                self.region_rows(scope, &channels, index.as_deref(), now)
            }
            CatalogScope::Nz(kind) => {
                let channels = self.channels.nz_channels(kind).await;
                let index = self.index_for(scope).await;
                self.region_rows(scope, &channels, index.as_deref(), now)
            }
            CatalogScope::Sports => {
                let entries = self.channels.curated_channels().await;
                let index = self.index_for(scope).await;
                let mut rows = Vec::new();
                let mut seen = HashSet::new();
                for (label, pack) in group_into_packs(&entries) {
                    if let Some(wanted) = genre {
                        if label != wanted {
                            continue;
                        }
                    }
                    for channel in &pack {
                        if seen.insert(channel.id.clone()) {
                            let mut entry =
                                self.catalog_entry(scope, channel, index.as_deref(), now);
                            entry.genres = vec![label.clone()];
                            rows.push(entry);
                        }
                    }
                }
                rows
            }
            CatalogScope::Extras => {
                let entries = self.channels.extras_channels().await;
                let index = self.index_for(scope).await;
                let mut list: Vec<&Channel> = entries
                    .iter()
                    .filter(|channel| match genre {
                        Some(wanted) => channel.group.as_deref() == Some(wanted),
                        None => true,
                    })
                    .collect();
                let mut seen = HashSet::new();
                list.retain(|channel| seen.insert(channel.id.clone()));
                list.sort_by_key(|channel| channel.name.to_lowercase());
                list.into_iter()
                    .map(|channel| self.catalog_entry(scope, channel, index.as_deref(), now))
                    .collect()
            }
        }
    }

    /// Full meta for one channel, `None` when the id is unknown in `scope`.
    pub async fn meta(&self, scope: CatalogScope, channel_id: &str) -> Option<MetaDetail> {
        let channel = self.find_channel(scope, channel_id).await?;
        let now = self.now_utc();
        let index = self.index_for(scope).await;
        let programmes = index.as_deref().and_then(|index| {
            resolver::resolve_channel_programmes(&channel, index, Some(&*sources::CHANNEL_ALIASES))
        });

        let genres = match &channel.group {
            Some(group) => vec![group.clone()],
            None => vec![scope.fallback_genre().to_string()],
        };

        Some(MetaDetail {
            id: meta_id(scope, &channel.id),
            kind: "tv".to_string(),
            name: channel.name.clone(),
            poster: channel.logo.clone(),
            poster_shape: "square".to_string(),
            logo: channel.logo.clone(),
            background: channel.logo.clone(),
            description: Some(describe_meta(programmes, now)),
            genres,
        })
    }

    /// Every playable variant for one channel, `None` when the id is
    /// unknown in `scope`. Variants sharing a URL collapse to one target.
    pub async fn streams(&self, scope: CatalogScope, channel_id: &str) -> Option<Vec<StreamTarget>> {
        match scope {
            CatalogScope::Au(region, kind) => {
                let channels = self.channels.channels_for_region(region, kind).await;
                channels
                    .get(channel_id)
                    .map(|channel| variant_targets(vec![channel]))
            }
            CatalogScope::Nz(kind) => {
                let channels = self.channels.nz_channels(kind).await;
                channels
                    .get(channel_id)
                    .map(|channel| variant_targets(vec![channel]))
            }
            CatalogScope::Sports => {
                let entries = self.channels.curated_channels().await;
                let variants: Vec<&Channel> = entries
                    .iter()
                    .filter(|channel| channel.id == channel_id)
                    .collect();
                if variants.is_empty() {
                    None
                } else {
                    Some(variant_targets(variants))
                }
            }
            CatalogScope::Extras => {
                let entries = self.channels.extras_channels().await;
                let variants: Vec<&Channel> = entries
                    .iter()
                    .filter(|channel| channel.id == channel_id)
                    .collect();
                if variants.is_empty() {
                    None
                } else {
                    Some(variant_targets(variants))
                }
            }
        }
    }

    fn region_rows(
        &self,
        scope: CatalogScope,
        channels: &HashMap<String, Channel>,
        index: Option<&GuideIndex>,
        now: DateTime<Utc>,
    ) -> Vec<CatalogEntry> {
        let mut list: Vec<&Channel> = channels.values().collect();
        list.sort_by_key(|channel| channel.name.to_lowercase());
        list.into_iter()
            .map(|channel| self.catalog_entry(scope, channel, index, now))
            .collect()
    }

    fn catalog_entry(
        &self,
        scope: CatalogScope,
        channel: &Channel,
        index: Option<&GuideIndex>,
        now: DateTime<Utc>,
    ) -> CatalogEntry {
        let programmes = index.and_then(|index| self.resolved_programmes(channel, index));
        CatalogEntry {
            id: meta_id(scope, &channel.id),
            kind: "tv".to_string(),
            name: channel.name.clone(),
            poster: channel.logo.clone(),
            poster_shape: "square".to_string(),
            description: Some(describe_now_next(programmes, now)),
            genres: channel.group.clone().into_iter().collect(),
        }
    }

    /// Memoized resolver front. Catalog builds resolve hundreds of channels
    /// against the same index, so outcomes are cached per index build;
    /// pointer identity stands in for the build epoch and stays valid for
    /// as long as the index is cached.
    fn resolved_programmes<'a>(
        &self,
        channel: &Channel,
        index: &'a GuideIndex,
    ) -> Option<&'a [Programme]> {
        let epoch = index as *const GuideIndex as usize;
        let key = (epoch, channel.id.clone(), channel.name.clone());
        {
            let mut memo = RESOLVE_MEMO.lock().unwrap();
            if let Some(hit) = memo.get(&key) {
                return hit
                    .clone()
                    .and_then(|canonical| index.programmes.get(&canonical))
                    .map(Vec::as_slice);
            }
        }

        let resolved = resolver::resolve(
            &channel.id,
            &channel.name,
            index,
            Some(&*sources::CHANNEL_ALIASES),
        );
        let mut memo = RESOLVE_MEMO.lock().unwrap();
        memo.put(key, resolved.clone());
        resolved
            .and_then(|canonical| index.programmes.get(&canonical))
            .map(Vec::as_slice)
    }

    async fn find_channel(&self, scope: CatalogScope, channel_id: &str) -> Option<Channel> {
        match scope {
            CatalogScope::Au(region, kind) => self
                .channels
                .channels_for_region(region, kind)
                .await
                .get(channel_id)
                .cloned(),
            CatalogScope::Nz(kind) => self
                .channels
                .nz_channels(kind)
                .await
                .get(channel_id)
                .cloned(),
            CatalogScope::Sports => self
                .channels
                .curated_channels()
                .await
                .iter()
                .find(|channel| channel.id == channel_id)
                .cloned(),
            CatalogScope::Extras => self
                .channels
                .extras_channels()
                .await
                .iter()
                .find(|channel| channel.id == channel_id)
                .cloned(),
        }
    }

    /// Guide index backing one scope.
    ///
    /// Radio channels only ever appear in the regional documents, so radio
    /// scopes read the single-document guides instead of the merged buckets.
    async fn index_for(&self, scope: CatalogScope) -> Option<Arc<GuideIndex>> {
        match scope {
            CatalogScope::Au(region, ChannelKind::Tv) => {
                self.guides
                    .get_or_build(GuideBucket::Au(region), Some(self.soft_timeout))
                    .await
            }
            CatalogScope::Au(region, ChannelKind::Radio) => {
                Some(self.guides.guide_for_region(region).await)
            }
            CatalogScope::Nz(ChannelKind::Tv) => {
                self.guides
                    .get_or_build(GuideBucket::Nz, Some(self.soft_timeout))
                    .await
            }
            CatalogScope::Nz(ChannelKind::Radio) => Some(self.guides.nz_guide().await),
            CatalogScope::Sports => {
                self.guides
                    .get_or_build(GuideBucket::Sports, Some(self.soft_timeout))
                    .await
            }
            CatalogScope::Extras => {
                self.guides
                    .get_or_build(GuideBucket::All, Some(self.soft_timeout))
                    .await
            }
        }
    }

    fn now_utc(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.clock.now_ms()).unwrap_or_else(Utc::now)
    }
}

fn variant_targets(variants: Vec<&Channel>) -> Vec<StreamTarget> {
    let mut seen = HashSet::new();
    let variants: Vec<&Channel> = variants
        .into_iter()
        .filter(|channel| seen.insert(channel.url.clone()))
        .collect();
    let solo = variants.len() == 1;
    variants
        .into_iter()
        .enumerate()
        .map(|(position, channel)| StreamTarget {
            url: channel.url.clone(),
            title: if solo {
                Some(channel.name.clone())
            } else {
                Some(format!("{} #{}", channel.name, position + 1))
            },
        })
        .collect()
}
