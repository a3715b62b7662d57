use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashMap;

use crate::models::Channel;

lazy_static! {
    /// Regex to parse EXTINF attributes (tvg-id="...", group-title="...", etc)
    static ref ATTR_REGEX: Regex = Regex::new(r#"(\w+(?:-\w+)*)="([^"]*)""#).unwrap();
}

/// Metadata collected from an `#EXTINF` line while waiting for its URL line.
#[derive(Debug)]
struct PendingEntry {
    id: String,
    name: String,
    logo: Option<String>,
    group: Option<String>,
}

/// Parse an EXTINF line.
/// Format: #EXTINF:duration tvg-id="..." tvg-logo="..." group-title="...",Name
///
/// The display name is everything after the *last* comma; `id` falls back
/// to the name when `tvg-id` is absent or empty.
fn parse_extinf(line: &str) -> Option<PendingEntry> {
    let content = line.strip_prefix("#EXTINF:")?;
    let last_comma = content.rfind(',')?;
    let name = content[last_comma + 1..].trim().to_string();
    let header = &content[..last_comma];

    let mut attributes: HashMap<String, String> = HashMap::new();
    for caps in ATTR_REGEX.captures_iter(header) {
        let key = caps.get(1).map(|m| m.as_str().to_string()).unwrap_or_default();
        let value = caps.get(2).map(|m| m.as_str().to_string()).unwrap_or_default();
        attributes.insert(key, value);
    }

    let id = attributes
        .get("tvg-id")
        .filter(|v| !v.is_empty())
        .cloned()
        .unwrap_or_else(|| name.clone());
    let logo = attributes.get("tvg-logo").filter(|v| !v.is_empty()).cloned();
    let group = attributes
        .get("group-title")
        .filter(|v| !v.is_empty())
        .cloned();

    Some(PendingEntry {
        id,
        name,
        logo,
        group,
    })
}

/// Parses M3U text into channel entries, preserving order and duplicates.
///
/// Line-oriented scan: an `#EXTINF` line opens a pending entry, an optional
/// `#EXTGRP` line overrides its group, and the next non-comment, non-empty
/// line completes it when it is an http(s) URL. A non-URL line in that slot
/// discards the pending entry silently. Malformed or empty input yields an
/// empty list, never an error.
pub fn parse_entries(text: &str) -> Vec<Channel> {
    let mut entries = Vec::new();
    let mut pending: Option<PendingEntry> = None;

    for raw_line in text.lines() {
        let line = raw_line.trim();
        if line.is_empty() {
            continue;
        }

        if line.starts_with("#EXTINF:") {
            pending = parse_extinf(line);
            continue;
        }

        if let Some(group) = line.strip_prefix("#EXTGRP:") {
            let group = group.trim();
            if let Some(entry) = pending.as_mut() {
                if !group.is_empty() {
                    entry.group = Some(group.to_string());
                }
            }
            continue;
        }

        // other comments do not disturb the pending slot
        if line.starts_with('#') {
            continue;
        }

        if let Some(entry) = pending.take() {
            if line.starts_with("http://") || line.starts_with("https://") {
                entries.push(Channel {
                    id: entry.id,
                    name: entry.name,
                    logo: entry.logo,
                    group: entry.group,
                    url: line.to_string(),
                });
            }
        }
    }

    entries
}

/// Map form of [`parse_entries`], keyed by channel id.
///
/// Duplicate ids silently overwrite, so the last variant with a given id
/// wins. Use [`parse_entries`] when quality variants must survive.
pub fn parse_map(text: &str) -> HashMap<String, Channel> {
    let mut map = HashMap::new();
    for entry in parse_entries(text) {
        map.insert(entry.id.clone(), entry);
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLAYLIST: &str = r#"#EXTM3U
#EXTINF:-1 tvg-id="mjh-abc" tvg-logo="https://i.mjh.nz/au/Sydney/logo/abc.png" group-title="Sydney",ABC TV
https://i.mjh.nz/au/Sydney/abc.m3u8
#EXTINF:-1 tvg-id="mjh-seven" group-title="Sydney",Seven
https://i.mjh.nz/au/Sydney/seven.m3u8
#EXTINF:-1,SBS World Movies
https://i.mjh.nz/au/Sydney/sbs-movies.m3u8
"#;

    #[test]
    fn test_parse_entries_preserves_order_and_count() {
        let entries = parse_entries(PLAYLIST);
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].id, "mjh-abc");
        assert_eq!(entries[0].name, "ABC TV");
        assert_eq!(
            entries[0].logo.as_deref(),
            Some("https://i.mjh.nz/au/Sydney/logo/abc.png")
        );
        assert_eq!(entries[0].group.as_deref(), Some("Sydney"));
        assert_eq!(entries[1].url, "https://i.mjh.nz/au/Sydney/seven.m3u8");
        // no tvg-id: id falls back to the display name
        assert_eq!(entries[2].id, "SBS World Movies");
        assert!(entries[2].logo.is_none());
    }

    #[test]
    fn test_name_is_text_after_last_comma() {
        let text = "#EXTINF:-1 group-title=\"News, Sport\",Seven News\nhttp://x/seven\n";
        let entries = parse_entries(text);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "Seven News");
        assert_eq!(entries[0].group.as_deref(), Some("News, Sport"));
    }

    #[test]
    fn test_extgrp_overrides_group_for_pending_entry_only() {
        let text = concat!(
            "#EXTINF:-1 group-title=\"Old\",First\n",
            "#EXTGRP:UK Sports\n",
            "http://x/first\n",
            "#EXTINF:-1 group-title=\"Old\",Second\n",
            "http://x/second\n",
        );
        let entries = parse_entries(text);
        assert_eq!(entries[0].group.as_deref(), Some("UK Sports"));
        assert_eq!(entries[1].group.as_deref(), Some("Old"));
    }

    #[test]
    fn test_non_url_line_discards_pending_entry() {
        let text = concat!(
            "#EXTINF:-1,Broken\n",
            "not-a-url\n",
            "#EXTINF:-1,Working\n",
            "http://x/ok\n",
        );
        let entries = parse_entries(text);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "Working");
    }

    #[test]
    fn test_comments_inside_slot_do_not_discard() {
        let text = concat!(
            "#EXTINF:-1,Kept\n",
            "#EXTVLCOPT:http-user-agent=VLC\n",
            "\n",
            "http://x/kept\n",
        );
        let entries = parse_entries(text);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "Kept");
    }

    #[test]
    fn test_trailing_extinf_without_url_is_dropped() {
        let text = "#EXTM3U\n#EXTINF:-1,No Stream\n";
        assert!(parse_entries(text).is_empty());
    }

    #[test]
    fn test_empty_and_garbage_input_yield_empty() {
        assert!(parse_entries("").is_empty());
        assert!(parse_entries("random\nlines\nwithout structure").is_empty());
    }

    #[test]
    fn test_parse_map_collisions_overwrite() {
        let text = concat!(
            "#EXTINF:-1 tvg-id=\"seven\",Seven SD\n",
            "http://x/sd\n",
            "#EXTINF:-1 tvg-id=\"seven\",Seven HD\n",
            "http://x/hd\n",
        );
        assert_eq!(parse_entries(text).len(), 2);
        let map = parse_map(text);
        assert_eq!(map.len(), 1);
        assert_eq!(map["seven"].url, "http://x/hd");
    }

    #[test]
    fn test_duplicate_variants_survive_in_entries() {
        let text = concat!(
            "#EXTINF:-1 tvg-id=\"fox\",Fox Cricket 1080p\n",
            "http://x/fox-1080\n",
            "#EXTINF:-1 tvg-id=\"fox\",Fox Cricket 720p\n",
            "http://x/fox-720\n",
        );
        let entries = parse_entries(text);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].id, entries[1].id);
    }
}
