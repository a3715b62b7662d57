use chrono::{DateTime, FixedOffset};
use serde::Serialize;
use std::collections::HashMap;

/// One scheduled guide entry for a channel.
///
/// Timestamps keep the source's local offset so wall-clock display survives,
/// while comparisons and sorting use the absolute instant.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Programme {
    pub start: DateTime<FixedOffset>,
    pub stop: DateTime<FixedOffset>,
    pub title: String,
}

/// Merged programme data for one logical region, the unit the identity
/// resolver operates over.
///
/// `name_index` maps every normalization variant of a channel's display
/// names and id to the canonical `<channel id>`. First writer for a key
/// wins; later duplicates are dropped via [`set_if_absent`], never
/// overwritten. Shard list order is significant, so this "first source,
/// first match" bias must be preserved.
#[derive(Debug, Clone, Default)]
pub struct GuideIndex {
    pub programmes: HashMap<String, Vec<Programme>>,
    pub name_index: HashMap<String, String>,
}

impl GuideIndex {
    pub fn is_empty(&self) -> bool {
        self.programmes.is_empty() && self.name_index.is_empty()
    }

    pub fn channel_count(&self) -> usize {
        self.programmes.len()
    }

    pub fn programme_count(&self) -> usize {
        self.programmes.values().map(Vec::len).sum()
    }

    /// Sorts every channel's programme list ascending by start time.
    ///
    /// Called once per fetched document before it enters the shard cache.
    /// Merging concatenates already-sorted shard lists without re-sorting.
    pub fn sort_programmes(&mut self) {
        for list in self.programmes.values_mut() {
            list.sort_by_key(|p| p.start);
        }
    }
}

/// Inserts only when `key` is not yet present.
///
/// Every name-index registration site goes through this helper; the
/// first-registration-wins behavior is a core invariant, not an accident
/// of map semantics.
pub fn set_if_absent(map: &mut HashMap<String, String>, key: String, value: &str) {
    map.entry(key).or_insert_with(|| value.to_string());
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(10 * 3600)
            .unwrap()
            .with_ymd_and_hms(2025, 6, 1, hour, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_set_if_absent_keeps_first_writer() {
        let mut map = HashMap::new();
        set_if_absent(&mut map, "seven".to_string(), "Seven.au");
        set_if_absent(&mut map, "seven".to_string(), "SevenHD.au");
        assert_eq!(map.get("seven").map(String::as_str), Some("Seven.au"));
    }

    #[test]
    fn test_sort_programmes_orders_by_start() {
        let mut index = GuideIndex::default();
        index.programmes.insert(
            "ABC1.au".to_string(),
            vec![
                Programme { start: at(12), stop: at(13), title: "News".into() },
                Programme { start: at(9), stop: at(10), title: "Breakfast".into() },
            ],
        );
        index.sort_programmes();
        let titles: Vec<_> = index.programmes["ABC1.au"]
            .iter()
            .map(|p| p.title.as_str())
            .collect();
        assert_eq!(titles, vec!["Breakfast", "News"]);
    }
}
