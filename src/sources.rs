//! Upstream source tables
//!
//! Every URL the engine fetches is built here: regional playlist/guide/logo
//! endpoints, the guide shard lists behind each region bucket, the curated
//! feed mirrors, and the extras feed default. Also owns the synthesized
//! stable ids for extras entries and the curated-id alias table.

use lazy_static::lazy_static;
use std::collections::HashMap;

use crate::models::{AuRegion, ChannelKind, GuideBucket};

pub const MJH_BASE: &str = "https://i.mjh.nz";

const SHARD_AU1: &str = "https://epgshare01.online/epgshare01/epg_ripper_AU1.xml.gz";
const SHARD_NZ1: &str = "https://epgshare01.online/epgshare01/epg_ripper_NZ1.xml.gz";
const SHARD_UK1: &str = "https://epgshare01.online/epgshare01/epg_ripper_UK1.xml.gz";
const SHARD_US1: &str = "https://epgshare01.online/epgshare01/epg_ripper_US1.xml.gz";
const SHARD_US_SPORTS1: &str =
    "https://epgshare01.online/epgshare01/epg_ripper_US_SPORTS1.xml.gz";

/// Curated sports/entertainment feed mirrors, tried in order.
pub const CURATED_MIRRORS: [&str; 3] = [
    "https://bit.ly/a1xstream",
    "https://a1xs.vip/a1xstream",
    "https://raw.githubusercontent.com/a1xmedia/m3u/refs/heads/main/a1x.m3u",
];

/// Dead curated mirrors answer tiny placeholder bodies; anything shorter
/// than this is rejected without parsing.
pub const CURATED_MIN_BODY_BYTES: usize = 100;

pub const EXTRAS_DEFAULT_URL: &str =
    "https://gist.githubusercontent.com/One800burner/dae77ddddc1b83d3a4d7b34d2bd96a5e/raw/1roguevip.m3u";

pub fn au_playlist_url(region: AuRegion, kind: ChannelKind) -> String {
    format!(
        "{}/au/{}/{}",
        MJH_BASE,
        region.upstream_name(),
        kind.playlist_file()
    )
}

pub fn nz_playlist_url(kind: ChannelKind) -> String {
    format!("{}/nz/{}", MJH_BASE, kind.playlist_file())
}

pub fn au_guide_url(region: AuRegion) -> String {
    format!("{}/au/{}/epg.xml", MJH_BASE, region.upstream_name())
}

pub fn nz_guide_url() -> String {
    format!("{}/nz/epg.xml", MJH_BASE)
}

pub fn au_logo_url(region: AuRegion, channel_id: &str) -> String {
    format!(
        "{}/au/{}/logo/{}.png",
        MJH_BASE,
        region.upstream_name(),
        urlencoding::encode(channel_id)
    )
}

pub fn nz_logo_url(channel_id: &str) -> String {
    format!("{}/nz/logo/{}.png", MJH_BASE, urlencoding::encode(channel_id))
}

/// Ordered shard-URL list for a region bucket.
///
/// List order is significant: the merge engine processes shard results in
/// this order, which decides every first-writer-wins name-index collision.
pub fn shard_urls(bucket: GuideBucket) -> Vec<String> {
    match bucket {
        GuideBucket::Au(region) => vec![au_guide_url(region), SHARD_AU1.to_string()],
        GuideBucket::Nz => vec![nz_guide_url(), SHARD_NZ1.to_string()],
        GuideBucket::Uk => vec![SHARD_UK1.to_string()],
        GuideBucket::Us => vec![SHARD_US1.to_string(), SHARD_US_SPORTS1.to_string()],
        GuideBucket::Sports => vec![
            SHARD_US_SPORTS1.to_string(),
            SHARD_UK1.to_string(),
            SHARD_AU1.to_string(),
        ],
        GuideBucket::All => vec![
            SHARD_AU1.to_string(),
            SHARD_NZ1.to_string(),
            SHARD_UK1.to_string(),
            SHARD_US1.to_string(),
            SHARD_US_SPORTS1.to_string(),
        ],
    }
}

/// Alias table: strict-normalized curated id -> guide-canonical id.
///
/// Lets known-bad id spellings in the curated feed resolve without touching
/// guide data. Consulted before any index lookup.
pub type AliasTable = HashMap<String, String>;

lazy_static! {
    pub static ref CHANNEL_ALIASES: AliasTable = {
        let mut m = HashMap::new();
        let pairs = [
            ("foxcricket", "FoxCricket.au"),
            ("foxleague", "FoxLeague.au"),
            ("foxfooty", "FoxFooty.au"),
            ("skysportsmainevent", "SkySp.MainEv.HD.uk"),
            ("skysportscricket", "SkySp.Cricket.HD.uk"),
            ("skysportsf1", "SkySpF1.HD.uk"),
            ("tntsports1", "TNT.Sports.1.HD.uk"),
            ("tntsports2", "TNT.Sports.2.HD.uk"),
            ("espn1", "ESPN.us"),
            ("espn2", "ESPN2.us"),
            ("foxsports501", "FoxSports501.au"),
            ("foxsports503", "FoxSports503.au"),
        ];
        for (from, to) in pairs {
            m.insert(from.to_string(), to.to_string());
        }
        m
    };
}

/// Stable id for an extras entry: `slug(name)-hash36(url)`.
///
/// The extras playlist carries no `tvg-id` and its stream URLs rotate, so
/// the id has to be derivable from content alone and stay identical across
/// fetches of the same entry.
pub fn extras_channel_id(name: &str, url: &str) -> String {
    format!("{}-{}", slugify(name), hash36(url))
}

/// Lowercases and collapses every run of non-alphanumerics to one `-`.
pub fn slugify(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    let mut pending_dash = false;
    for ch in input.chars() {
        let lower = ch.to_ascii_lowercase();
        if lower.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            slug.push(lower);
            pending_dash = false;
        } else {
            pending_dash = true;
        }
    }
    slug
}

/// 32-bit string hash (`h = h*31 + unit` over UTF-16 code units, wrapping),
/// rendered unsigned in lowercase base 36.
pub fn hash36(input: &str) -> String {
    let mut h: i32 = 0;
    for unit in input.encode_utf16() {
        h = h.wrapping_shl(5).wrapping_sub(h).wrapping_add(unit as i32);
    }
    to_base36(h as u32)
}

fn to_base36(mut n: u32) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_string();
    }
    let mut buf = [0u8; 7];
    let mut i = buf.len();
    while n > 0 {
        i -= 1;
        buf[i] = DIGITS[(n % 36) as usize];
        n /= 36;
    }
    String::from_utf8_lossy(&buf[i..]).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_au_urls_use_capitalized_region() {
        assert_eq!(
            au_playlist_url(AuRegion::Sydney, ChannelKind::Tv),
            "https://i.mjh.nz/au/Sydney/raw-tv.m3u8"
        );
        assert_eq!(
            au_playlist_url(AuRegion::Adelaide, ChannelKind::Radio),
            "https://i.mjh.nz/au/Adelaide/raw-radio.m3u8"
        );
        assert_eq!(
            au_guide_url(AuRegion::Perth),
            "https://i.mjh.nz/au/Perth/epg.xml"
        );
    }

    #[test]
    fn test_logo_urls_encode_channel_ids() {
        assert_eq!(
            au_logo_url(AuRegion::Hobart, "ABC TV"),
            "https://i.mjh.nz/au/Hobart/logo/ABC%20TV.png"
        );
        assert_eq!(
            nz_logo_url("TVNZ1.nz"),
            "https://i.mjh.nz/nz/logo/TVNZ1.nz.png"
        );
    }

    #[test]
    fn test_every_bucket_has_shards() {
        for bucket in [
            GuideBucket::Au(AuRegion::Melbourne),
            GuideBucket::Nz,
            GuideBucket::Uk,
            GuideBucket::Us,
            GuideBucket::Sports,
            GuideBucket::All,
        ] {
            assert!(!shard_urls(bucket).is_empty());
        }
        // regional document first so its names win collisions
        assert!(shard_urls(GuideBucket::Au(AuRegion::Sydney))[0].ends_with("/au/Sydney/epg.xml"));
    }

    #[test]
    fn test_slugify_collapses_noise() {
        assert_eq!(slugify("Fox Cricket 501 HD"), "fox-cricket-501-hd");
        assert_eq!(slugify("ESPN (US) [HD]"), "espn-us-hd");
        assert_eq!(slugify("  --  "), "");
        assert_eq!(slugify("A&E"), "a-e");
    }

    #[test]
    fn test_hash36_matches_reference_values() {
        assert_eq!(hash36(""), "0");
        // h("a") = 97, h("ab") = 97*31 + 98 = 3105
        assert_eq!(hash36("a"), "2p");
        assert_eq!(hash36("ab"), "2e9");
    }

    #[test]
    fn test_extras_ids_are_stable() {
        let url = "http://cdn.example.com/live/token-8f3a/stream.m3u8";
        let first = extras_channel_id("Sky Sports F1", url);
        let second = extras_channel_id("Sky Sports F1", url);
        assert_eq!(first, second);
        assert!(first.starts_with("sky-sports-f1-"));
        let suffix = &first["sky-sports-f1-".len()..];
        assert!(!suffix.is_empty());
        assert!(suffix.chars().all(|c| c.is_ascii_alphanumeric()));
        // same name, rotated url -> different id
        let rotated = extras_channel_id("Sky Sports F1", "http://cdn.example.com/live/token-9b2c/stream.m3u8");
        assert_ne!(first, rotated);
    }
}
