use serde::{Deserialize, Serialize};

/// One playable entry from a source playlist.
///
/// Identity is source-scoped: `id` comes from the `tvg-id` attribute (or the
/// display name when the attribute is absent) and is not guaranteed unique
/// across sources. Collisions inside one parse result silently overwrite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Channel {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logo: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    pub url: String,
}

/// Playlist flavor offered by the regional upstreams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    Tv,
    Radio,
}

impl ChannelKind {
    /// File name of the upstream playlist variant.
    pub fn playlist_file(&self) -> &'static str {
        match self {
            ChannelKind::Tv => "raw-tv.m3u8",
            ChannelKind::Radio => "raw-radio.m3u8",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelKind::Tv => "tv",
            ChannelKind::Radio => "radio",
        }
    }
}
