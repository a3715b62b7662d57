//! Streaming XMLTV guide parser.
//!
//! Guide shards run to tens of megabytes, so the scan keeps memory bounded
//! to the output index: text content is accumulated for exactly two
//! elements, `<title>` under an open `<programme>` and `<display-name>`
//! under an open `<channel>`. Everything else streams past.
//!
//! Programme lists come out in document order. Sorting is the caller's job
//! after all documents for a bucket have been consumed, because merging
//! interleaves shards and a per-document sort alone would not survive it.

use std::io::{BufRead, BufReader};

use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use flate2::read::GzDecoder;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::models::{set_if_absent, GuideIndex, Programme};
use crate::services::resolver::{loose_normalize, strict_normalize};

/// Transport-level hint for whether a guide body is gzip-compressed.
///
/// `Auto` and `Gzip` both fall back to sniffing the two-byte magic, since
/// an upstream may hand back plain XML from a `.gz` URL once a proxy or the
/// HTTP client has already decompressed it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GzipHint {
    Auto,
    Gzip,
    Plain,
}

impl GzipHint {
    pub fn from_url(url: &str) -> Self {
        if url.ends_with(".gz") {
            GzipHint::Gzip
        } else {
            GzipHint::Auto
        }
    }
}

fn looks_gzipped(bytes: &[u8]) -> bool {
    bytes.len() >= 2 && bytes[0] == 0x1f && bytes[1] == 0x8b
}

/// Parses a fetched guide body, decompressing first when the hint or the
/// magic bytes say so.
pub fn parse_bytes(bytes: &[u8], hint: GzipHint) -> Result<GuideIndex> {
    let gzipped = match hint {
        GzipHint::Plain => false,
        GzipHint::Gzip | GzipHint::Auto => looks_gzipped(bytes),
    };
    if gzipped {
        let decoder = GzDecoder::new(bytes);
        parse_reader(BufReader::with_capacity(64 * 1024, decoder))
    } else {
        parse_reader(bytes)
    }
}

/// Buffered variant for documents small enough to hold as a string.
pub fn parse_str(xml: &str) -> Result<GuideIndex> {
    parse_reader(xml.as_bytes())
}

/// Tracks which element's text we are inside, if any.
#[derive(Debug, Clone, Copy, PartialEq)]
enum ParserState {
    Root,
    Channel,
    DisplayName,
    Programme,
    Title,
}

struct PendingChannel {
    id: String,
    display_names: Vec<String>,
}

struct PendingProgramme {
    channel: String,
    start: DateTime<FixedOffset>,
    stop: DateTime<FixedOffset>,
    title: String,
}

/// Streaming parse of one XMLTV document.
///
/// Structural XML errors abort the parse and propagate; the merge engine
/// treats that as a failed shard without failing the whole build.
pub fn parse_reader<R: BufRead>(reader: R) -> Result<GuideIndex> {
    let mut xml_reader = Reader::from_reader(reader);
    xml_reader.config_mut().trim_text(true);

    let mut index = GuideIndex::default();
    let mut buf = Vec::with_capacity(8192);

    let mut state = ParserState::Root;
    let mut current_channel: Option<PendingChannel> = None;
    let mut current_programme: Option<PendingProgramme> = None;
    let mut text_buf = String::new();

    loop {
        match xml_reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match e.name().as_ref() {
                b"channel" => {
                    state = ParserState::Channel;
                    current_channel = Some(PendingChannel {
                        id: attr_value(e, "id").unwrap_or_default(),
                        display_names: Vec::new(),
                    });
                }
                b"programme" => {
                    state = ParserState::Programme;
                    current_programme = pending_programme(e);
                }
                b"display-name" if state == ParserState::Channel => {
                    state = ParserState::DisplayName;
                    text_buf.clear();
                }
                b"title" if state == ParserState::Programme => {
                    state = ParserState::Title;
                    text_buf.clear();
                }
                _ => {}
            },
            Ok(Event::Empty(ref e)) => {
                // Self-closing <programme .../> carries no title but still
                // counts when channel and start are usable.
                if e.name().as_ref() == b"programme" {
                    if let Some(pending) = pending_programme(e) {
                        push_programme(&mut index, pending);
                    }
                }
            }
            Ok(Event::Text(ref e)) => {
                if state == ParserState::Title || state == ParserState::DisplayName {
                    if let Ok(text) = e.unescape() {
                        text_buf.push_str(&text);
                    }
                }
            }
            Ok(Event::CData(ref e)) => {
                if state == ParserState::Title || state == ParserState::DisplayName {
                    text_buf.push_str(&String::from_utf8_lossy(e));
                }
            }
            Ok(Event::End(ref e)) => match e.name().as_ref() {
                b"channel" => {
                    register_channel(&mut index, current_channel.take());
                    state = ParserState::Root;
                }
                b"programme" => {
                    if let Some(mut pending) = current_programme.take() {
                        pending.title = pending.title.trim().to_string();
                        push_programme(&mut index, pending);
                    }
                    state = ParserState::Root;
                }
                b"display-name" if state == ParserState::DisplayName => {
                    let name = text_buf.trim();
                    if !name.is_empty() {
                        if let Some(channel) = current_channel.as_mut() {
                            channel.display_names.push(name.to_string());
                        }
                    }
                    state = ParserState::Channel;
                }
                b"title" if state == ParserState::Title => {
                    if let Some(programme) = current_programme.as_mut() {
                        programme.title = text_buf.clone();
                    }
                    state = ParserState::Programme;
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(err) => {
                let position = xml_reader.buffer_position();
                return Err(err).with_context(|| format!("malformed guide XML at byte {position}"));
            }
        }
        buf.clear();
    }

    Ok(index)
}

fn attr_value(element: &BytesStart, name: &str) -> Option<String> {
    let attr = element.try_get_attribute(name).ok()??;
    attr.unescape_value().ok().map(|v| v.into_owned())
}

/// Builds a programme skeleton from the element attributes.
///
/// A missing channel, a missing start, or a start that fails every known
/// timestamp format drops the programme silently. A missing or broken stop
/// degrades to a zero-length slot instead.
fn pending_programme(element: &BytesStart) -> Option<PendingProgramme> {
    let channel = attr_value(element, "channel").filter(|c| !c.is_empty())?;
    let start = parse_xmltv_time(&attr_value(element, "start")?)?;
    let stop = attr_value(element, "stop")
        .and_then(|s| parse_xmltv_time(&s))
        .unwrap_or(start);
    Some(PendingProgramme {
        channel,
        start,
        stop,
        title: String::new(),
    })
}

fn push_programme(index: &mut GuideIndex, pending: PendingProgramme) {
    index
        .programmes
        .entry(pending.channel)
        .or_default()
        .push(Programme {
            start: pending.start,
            stop: pending.stop,
            title: pending.title,
        });
}

/// Registers one channel's lookup keys into the name index.
///
/// Each non-empty display name contributes its strict form, its loose form
/// as a standalone key, and the strict form of the loose form when that
/// differs; the channel id contributes its strict form. All writes go
/// through [`set_if_absent`], so across a whole document (and across
/// merged shards) the first registration for a key wins.
fn register_channel(index: &mut GuideIndex, channel: Option<PendingChannel>) {
    let Some(channel) = channel else { return };
    if channel.id.is_empty() || channel.display_names.is_empty() {
        return;
    }

    for name in &channel.display_names {
        let strict = strict_normalize(name);
        if !strict.is_empty() {
            set_if_absent(&mut index.name_index, strict.clone(), &channel.id);
        }
        let loose = loose_normalize(name);
        if !loose.is_empty() {
            set_if_absent(&mut index.name_index, loose.clone(), &channel.id);
            let loose_strict = strict_normalize(&loose);
            if !loose_strict.is_empty() && loose_strict != strict {
                set_if_absent(&mut index.name_index, loose_strict, &channel.id);
            }
        }
    }

    let id_key = strict_normalize(&channel.id);
    if !id_key.is_empty() {
        set_if_absent(&mut index.name_index, id_key, &channel.id);
    }
}

/// Parses an XMLTV timestamp like `20250601093000 +1000`.
///
/// Some feeds omit the offset (assumed UTC) and a few emit RFC 3339.
/// Anything else returns `None`.
fn parse_xmltv_time(raw: &str) -> Option<DateTime<FixedOffset>> {
    let trimmed = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_str(trimmed, "%Y%m%d%H%M%S %z") {
        return Some(parsed);
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, "%Y%m%d%H%M%S") {
        return Some(Utc.from_utc_datetime(&naive).fixed_offset());
    }
    DateTime::parse_from_rfc3339(trimmed).ok()
}
