use std::fmt;

/// Australian metro regions served by the regional upstreams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuRegion {
    Adelaide,
    Brisbane,
    Canberra,
    Darwin,
    Hobart,
    Melbourne,
    Perth,
    Sydney,
}

impl AuRegion {
    pub const ALL: [AuRegion; 8] = [
        AuRegion::Adelaide,
        AuRegion::Brisbane,
        AuRegion::Canberra,
        AuRegion::Darwin,
        AuRegion::Hobart,
        AuRegion::Melbourne,
        AuRegion::Perth,
        AuRegion::Sydney,
    ];

    /// Capitalized name as it appears in upstream i.mjh.nz paths.
    pub fn upstream_name(&self) -> &'static str {
        match self {
            AuRegion::Adelaide => "Adelaide",
            AuRegion::Brisbane => "Brisbane",
            AuRegion::Canberra => "Canberra",
            AuRegion::Darwin => "Darwin",
            AuRegion::Hobart => "Hobart",
            AuRegion::Melbourne => "Melbourne",
            AuRegion::Perth => "Perth",
            AuRegion::Sydney => "Sydney",
        }
    }

    /// Lowercase slug used in catalog ids and route paths.
    pub fn slug(&self) -> &'static str {
        match self {
            AuRegion::Adelaide => "adelaide",
            AuRegion::Brisbane => "brisbane",
            AuRegion::Canberra => "canberra",
            AuRegion::Darwin => "darwin",
            AuRegion::Hobart => "hobart",
            AuRegion::Melbourne => "melbourne",
            AuRegion::Perth => "perth",
            AuRegion::Sydney => "sydney",
        }
    }

    pub fn from_slug(slug: &str) -> Option<AuRegion> {
        AuRegion::ALL.iter().copied().find(|r| r.slug() == slug)
    }
}

impl fmt::Display for AuRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.upstream_name())
    }
}

/// Logical guide grouping, each resolving to a fixed list of shard URLs.
///
/// A closed enum so an unknown bucket cannot reach the merge engine at
/// runtime; route inputs go through [`GuideBucket::from_key`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GuideBucket {
    Au(AuRegion),
    Nz,
    Uk,
    Us,
    Sports,
    All,
}

impl GuideBucket {
    /// Cache/route key, e.g. `au-sydney`, `sports`.
    pub fn key(&self) -> String {
        match self {
            GuideBucket::Au(region) => format!("au-{}", region.slug()),
            GuideBucket::Nz => "nz".to_string(),
            GuideBucket::Uk => "uk".to_string(),
            GuideBucket::Us => "us".to_string(),
            GuideBucket::Sports => "sports".to_string(),
            GuideBucket::All => "all".to_string(),
        }
    }

    pub fn from_key(key: &str) -> Option<GuideBucket> {
        match key {
            "nz" => Some(GuideBucket::Nz),
            "uk" => Some(GuideBucket::Uk),
            "us" => Some(GuideBucket::Us),
            "sports" => Some(GuideBucket::Sports),
            "all" => Some(GuideBucket::All),
            other => other
                .strip_prefix("au-")
                .and_then(AuRegion::from_slug)
                .map(GuideBucket::Au),
        }
    }
}

impl fmt::Display for GuideBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_keys_round_trip() {
        let buckets = [
            GuideBucket::Au(AuRegion::Sydney),
            GuideBucket::Nz,
            GuideBucket::Uk,
            GuideBucket::Us,
            GuideBucket::Sports,
            GuideBucket::All,
        ];
        for bucket in buckets {
            assert_eq!(GuideBucket::from_key(&bucket.key()), Some(bucket));
        }
        assert_eq!(GuideBucket::from_key("au-auckland"), None);
        assert_eq!(GuideBucket::from_key("emea"), None);
    }

    #[test]
    fn test_region_slugs_round_trip() {
        for region in AuRegion::ALL {
            assert_eq!(AuRegion::from_slug(region.slug()), Some(region));
        }
        assert_eq!(AuRegion::from_slug("Sydney"), None);
    }
}
