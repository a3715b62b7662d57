//! Channel identity resolution.
//!
//! Playlist channel ids rarely match guide channel ids exactly, so a catalog
//! request has to bridge the two. The resolver walks a fixed ladder of
//! normalized lookups against the merged name index and returns the first
//! canonical id that hits. A miss is a normal outcome, not an error; callers
//! degrade to a placeholder listing.

use lazy_static::lazy_static;
use regex::Regex;

use crate::metrics::RESOLVER_OUTCOMES;
use crate::models::{Channel, GuideIndex, Programme};
use crate::sources::AliasTable;

lazy_static! {
    /// Bracketed annotations such as "[BU]" or "[Geo-blocked]".
    static ref BRACKET_SPAN_REGEX: Regex = Regex::new(r"\[[^\]]*\]").unwrap();

    /// Parenthetical annotations such as "(HD)" or "(Backup)".
    static ref PAREN_SPAN_REGEX: Regex = Regex::new(r"\([^)]*\)").unwrap();

    /// Quality markers that differ between feeds of the same channel.
    static ref QUALITY_TOKEN_REGEX: Regex =
        Regex::new(r"(?i)\b(UHD|4K|2160p|FHD|1080p|HD|720p|SD)\b").unwrap();

    /// Filler words that carry no channel identity.
    static ref NOISE_TOKEN_REGEX: Regex =
        Regex::new(r"(?i)\b(backup|alt|feed|test|unstable)\b").unwrap();

    /// Country suffixes stripped only in the last-resort name lookup.
    static ref REGION_TOKEN_REGEX: Regex =
        Regex::new(r"(?i)\b(uk|us|usa|nz|au|ca|eu)\b").unwrap();

    /// Whitespace runs left behind by the strip passes.
    static ref WHITESPACE_REGEX: Regex = Regex::new(r"\s+").unwrap();
}

/// Lowercases and deletes everything outside `[a-z0-9]`.
pub fn strict_normalize(input: &str) -> String {
    input
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect()
}

/// Strips annotations and noise from a display name while keeping word
/// structure.
///
/// The result still contains spaces. It doubles as a standalone index key
/// and as the intermediate fed into [`strict_normalize`] when building a
/// lookup key, so both forms end up registered in the name index.
pub fn loose_normalize(input: &str) -> String {
    let lowered = input.to_lowercase();
    let stripped = BRACKET_SPAN_REGEX.replace_all(&lowered, "");
    let stripped = PAREN_SPAN_REGEX.replace_all(&stripped, "");
    let stripped = QUALITY_TOKEN_REGEX.replace_all(&stripped, "");
    let stripped = NOISE_TOKEN_REGEX.replace_all(&stripped, "");
    WHITESPACE_REGEX
        .replace_all(&stripped, " ")
        .trim()
        .to_string()
}

/// Loose form for a lookup key: strip, collapse, then strict-normalize.
fn loose_key(input: &str) -> String {
    strict_normalize(&loose_normalize(input))
}

fn strip_region_tokens(input: &str) -> String {
    let stripped = REGION_TOKEN_REGEX.replace_all(input, " ");
    WHITESPACE_REGEX
        .replace_all(&stripped, " ")
        .trim()
        .to_string()
}

fn record(outcome: &str) {
    RESOLVER_OUTCOMES.with_label_values(&[outcome]).inc();
}

/// Maps a playlist channel's `(id, name)` pair onto a canonical guide id.
///
/// Strategies run in a fixed precedence order and return on first hit:
///
/// 1. alias table exact hit on the strict-normalized id
/// 2. the id is already a `programmes` key
/// 3. strict-normalized id in the name index
/// 4. loose-normalized id in the name index
/// 5. strict then loose-normalized name
/// 6. progressive token collapse of the id (split on `.` `_` `-`, drop
///    trailing tokens one at a time)
/// 7. loose-normalized name with country suffixes stripped
///
/// Step 7 never applies to the id path. The guide data in the wild matches
/// under the current asymmetry, so it stays.
pub fn resolve(
    candidate_id: &str,
    candidate_name: &str,
    index: &GuideIndex,
    aliases: Option<&AliasTable>,
) -> Option<String> {
    if let Some(table) = aliases {
        if let Some(canonical) = table.get(&strict_normalize(candidate_id)) {
            record("alias");
            return Some(canonical.clone());
        }
    }

    if index.programmes.contains_key(candidate_id) {
        record("direct");
        return Some(candidate_id.to_string());
    }

    if let Some(canonical) = index.name_index.get(&strict_normalize(candidate_id)) {
        record("strict_id");
        return Some(canonical.clone());
    }

    if let Some(canonical) = index.name_index.get(&loose_key(candidate_id)) {
        record("loose_id");
        return Some(canonical.clone());
    }

    if let Some(canonical) = index.name_index.get(&strict_normalize(candidate_name)) {
        record("strict_name");
        return Some(canonical.clone());
    }

    if let Some(canonical) = index.name_index.get(&loose_key(candidate_name)) {
        record("loose_name");
        return Some(canonical.clone());
    }

    // Ids like "foxsports503.extra.42" often carry trailing disambiguators
    // separated by dots, underscores or dashes. Rejoin progressively shorter
    // prefixes with spaces and retry both normalizations.
    let tokens: Vec<&str> = candidate_id.split(['.', '_', '-']).collect();
    for take in (1..=tokens.len()).rev() {
        let joined = tokens[..take].join(" ");
        if let Some(canonical) = index.name_index.get(&strict_normalize(&joined)) {
            record("token_collapse");
            return Some(canonical.clone());
        }
        if let Some(canonical) = index.name_index.get(&loose_key(&joined)) {
            record("token_collapse");
            return Some(canonical.clone());
        }
    }

    // Country suffix stripping applies to the name only, and only when it
    // actually changes the string; otherwise step 5 already covered it.
    let loose_name = loose_normalize(candidate_name);
    let deregioned = strip_region_tokens(&loose_name);
    if deregioned != loose_name {
        if let Some(canonical) = index.name_index.get(&strict_normalize(&deregioned)) {
            record("region_name");
            return Some(canonical.clone());
        }
    }

    record("miss");
    None
}

/// Resolves a channel and looks up its programme list in one step.
///
/// `None` means "no programme data available". Callers render the channel
/// with placeholder status text instead of failing.
pub fn resolve_channel_programmes<'a>(
    channel: &Channel,
    index: &'a GuideIndex,
    aliases: Option<&AliasTable>,
) -> Option<&'a [Programme]> {
    let canonical = resolve(&channel.id, &channel.name, index, aliases)?;
    index.programmes.get(&canonical).map(Vec::as_slice)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn index_with(names: &[(&str, &str)], programme_keys: &[&str]) -> GuideIndex {
        let mut index = GuideIndex::default();
        for (key, id) in names {
            index
                .name_index
                .insert((*key).to_string(), (*id).to_string());
        }
        for key in programme_keys {
            index.programmes.insert((*key).to_string(), Vec::new());
        }
        index
    }

    #[test]
    fn test_strict_normalize_keeps_only_alphanumerics() {
        assert_eq!(strict_normalize("Fox Sports 503!"), "foxsports503");
        assert_eq!(strict_normalize("ABC-TV (Sydney)"), "abctvsydney");
        assert_eq!(strict_normalize(""), "");
    }

    #[test]
    fn test_loose_normalize_strips_annotations_and_quality() {
        assert_eq!(loose_normalize("Fox Sports 503 [BU] (HD)"), "fox sports 503");
        assert_eq!(loose_key("Fox Sports 503 [BU] (HD)"), "foxsports503");
    }

    #[test]
    fn test_loose_normalize_strips_noise_words() {
        assert_eq!(loose_normalize("ESPN backup feed"), "espn");
        assert_eq!(loose_normalize("Seven UHD test"), "seven");
    }

    #[test]
    fn test_loose_normalize_keeps_region_tokens() {
        // Country suffixes survive the loose pass; only the final fallback
        // strips them, and only on the name path.
        assert_eq!(loose_normalize("Sky News UK"), "sky news uk");
    }

    #[test]
    fn test_alias_wins_over_name_index() {
        let index = index_with(&[("espn1", "ESPN.backup")], &[]);
        let mut aliases: AliasTable = HashMap::new();
        aliases.insert("espn1".to_string(), "ESPN.us".to_string());
        let resolved = resolve("espn1", "ESPN (US)", &index, Some(&aliases));
        assert_eq!(resolved.as_deref(), Some("ESPN.us"));
    }

    #[test]
    fn test_direct_programme_key_returned_unchanged() {
        let index = index_with(&[], &["FoxCricket.au"]);
        let resolved = resolve("FoxCricket.au", "Fox Cricket", &index, None);
        assert_eq!(resolved.as_deref(), Some("FoxCricket.au"));
    }

    #[test]
    fn test_strict_id_lookup() {
        let index = index_with(&[("sbsviceland", "SBSVICELAND.au")], &[]);
        let resolved = resolve("SBS-Viceland", "something else", &index, None);
        assert_eq!(resolved.as_deref(), Some("SBSVICELAND.au"));
    }

    #[test]
    fn test_loose_name_lookup_strips_brackets() {
        let index = index_with(&[("foxsports503", "FS503.au")], &[]);
        let resolved = resolve("unknown.id", "Fox Sports 503 [BU] (HD)", &index, None);
        assert_eq!(resolved.as_deref(), Some("FS503.au"));
    }

    #[test]
    fn test_token_collapse_drops_trailing_disambiguators() {
        let index = index_with(&[("foxsports503", "FS503.au")], &[]);
        let resolved = resolve("foxsports503.extra.42", "nope", &index, None);
        assert_eq!(resolved.as_deref(), Some("FS503.au"));
    }

    #[test]
    fn test_token_collapse_rejoins_with_spaces() {
        // "fox.cricket" becomes "fox cricket", whose strict form matches the
        // display-name registration.
        let index = index_with(&[("foxcricket", "FoxCricket.au")], &[]);
        let resolved = resolve("fox.cricket", "FOX CRICKET [HD]", &index, None);
        assert_eq!(resolved.as_deref(), Some("FoxCricket.au"));
    }

    #[test]
    fn test_region_stripping_applies_to_name_only() {
        let index = index_with(&[("skynews", "SkyNews.uk")], &[]);

        // Name path reaches the index once "uk" is stripped.
        let by_name = resolve("zzz", "Sky News UK", &index, None);
        assert_eq!(by_name.as_deref(), Some("SkyNews.uk"));

        // A region suffix embedded in the id gets no such treatment.
        let by_id = resolve("skynewsuk", "zzz", &index, None);
        assert_eq!(by_id, None);
    }

    #[test]
    fn test_region_stripping_skipped_when_unchanged() {
        // No region token in the name, so the fallback is a no-op and the
        // overall resolution misses.
        let index = index_with(&[("skynews", "SkyNews.uk")], &[]);
        assert_eq!(resolve("zzz", "Sky Nws", &index, None), None);
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let index = index_with(&[("foxcricket", "FoxCricket.au")], &["Seven.au"]);
        let first = resolve("fox.cricket", "Fox Cricket", &index, None);
        let second = resolve("fox.cricket", "Fox Cricket", &index, None);
        assert_eq!(first, second);
        assert_eq!(first.as_deref(), Some("FoxCricket.au"));
    }

    #[test]
    fn test_unresolvable_pair_returns_none() {
        let index = index_with(&[("foxcricket", "FoxCricket.au")], &[]);
        assert_eq!(resolve("random.thing", "Random Thing", &index, None), None);
    }

    #[test]
    fn test_resolve_channel_programmes_returns_list() {
        let mut index = index_with(&[("foxcricket", "FoxCricket.au")], &[]);
        index
            .programmes
            .insert("FoxCricket.au".to_string(), Vec::new());
        let channel = Channel {
            id: "fox.cricket".to_string(),
            name: "FOX CRICKET [HD]".to_string(),
            logo: None,
            group: None,
            url: "https://example.com/stream".to_string(),
        };
        let programmes = resolve_channel_programmes(&channel, &index, None);
        assert!(programmes.is_some());
        assert!(programmes.is_some_and(|p| p.is_empty()));
    }
}
