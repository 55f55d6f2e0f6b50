//! Lenient RSS 2.0 / RSS 1.0 (RDF) / Atom parsing on top of `quick-xml`.
//!
//! The parser is a single pass over reader events with a stack of open
//! elements. Each open element accumulates its own text (descendant text
//! included) and attributes; when it closes, its path relative to the
//! enclosing `<item>`/`<entry>` decides which [`RawEntry`] field it fills.
//! The first non-empty value for a field wins.

use crate::error::{Error, Result};
use crate::utils::decode_entities;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

/// How many leading characters are inspected by [`classify_payload`].
const SHAPE_WINDOW: usize = 400;

/// What a fetched payload looks like, judged from its head only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadShape {
    /// Opens with `<rss`, `<feed` or an XML declaration.
    Feed,
    /// An HTML page: block page, redirect notice or article body.
    Html,
    Unknown,
}

/// Classify a payload before handing it to the parser.
pub fn classify_payload(text: &str) -> PayloadShape {
    let head: String = text.chars().take(SHAPE_WINDOW).collect::<String>().to_lowercase();
    if head.contains("<rss") || head.contains("<feed") || head.contains("<?xml") {
        PayloadShape::Feed
    } else if head.contains("<html") || head.contains("<!doctype html") {
        PayloadShape::Html
    } else {
        PayloadShape::Unknown
    }
}

/// Reject anything that does not look like a feed with a descriptive [`Error::Shape`].
pub fn ensure_feed_shape(text: &str) -> Result<()> {
    match classify_payload(text) {
        PayloadShape::Feed => Ok(()),
        PayloadShape::Html => Err(Error::Shape("Not an RSS/Atom XML (got an HTML page)".into())),
        PayloadShape::Unknown => Err(Error::Shape("Not an RSS/Atom XML".into())),
    }
}

/// One `<item>` or `<entry>` with every field still raw.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawEntry {
    pub title: Option<String>,
    pub link: Option<String>,
    pub guid: Option<String>,
    pub pub_date: Option<String>,
    pub iso_date: Option<String>,
    pub updated: Option<String>,
    pub description: Option<String>,
    pub content_encoded: Option<String>,
    pub content: Option<String>,
    pub summary: Option<String>,
    pub source_title: Option<String>,
    pub creator: Option<String>,
    pub enclosure_url: Option<String>,
    pub media_content_url: Option<String>,
    pub media_thumbnail_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedFeed {
    pub title: Option<String>,
    pub entries: Vec<RawEntry>,
}

struct Frame {
    name: String,
    text: String,
    attrs: Vec<(String, String)>,
}

impl Frame {
    fn open(e: &BytesStart<'_>) -> Self {
        let name = String::from_utf8_lossy(e.name().as_ref()).to_ascii_lowercase();
        let mut attrs = Vec::new();
        let mut attributes = e.attributes();
        attributes.with_checks(false);
        for attr in attributes.flatten() {
            let key = String::from_utf8_lossy(attr.key.as_ref()).to_ascii_lowercase();
            let value = decode_entities(&String::from_utf8_lossy(&attr.value)).into_owned();
            attrs.push((key, value));
        }
        Self {
            name,
            text: String::new(),
            attrs,
        }
    }

    fn attr(&self, key: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.trim())
            .filter(|v| !v.is_empty())
    }
}

/// Parse a feed document.
///
/// # Errors
///
/// [`Error::Parse`] if the XML is malformed beyond what the lenient reader
/// tolerates (mismatched end tags are tolerated).
pub fn parse_feed(xml: &str) -> Result<ParsedFeed> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().check_end_names = false;

    let mut feed = ParsedFeed::default();
    let mut stack: Vec<Frame> = Vec::new();
    // (stack depth of the entry element, entry being filled)
    let mut current: Option<(usize, RawEntry)> = None;

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                let frame = Frame::open(&e);
                let starts_entry =
                    current.is_none() && (frame.name == "item" || frame.name == "entry");
                stack.push(frame);
                if starts_entry {
                    current = Some((stack.len(), RawEntry::default()));
                }
            }
            Event::Empty(e) => {
                let frame = Frame::open(&e);
                close_element(frame, &stack, &mut current, &mut feed);
            }
            Event::Text(t) => {
                append_text(&mut stack, &decode_entities(&String::from_utf8_lossy(&t)))
            }
            Event::CData(t) => append_text(&mut stack, &String::from_utf8_lossy(&t)),
            Event::GeneralRef(r) => {
                let name = String::from_utf8_lossy(&r);
                append_text(&mut stack, &decode_entities(&format!("&{name};")));
            }
            Event::End(_) => {
                let Some(frame) = stack.pop() else { continue };
                if let Some(parent) = stack.last_mut() {
                    parent.text.push_str(&frame.text);
                }
                let closes_entry = matches!(&current, Some((depth, _)) if *depth == stack.len() + 1);
                if closes_entry {
                    if let Some((_, entry)) = current.take() {
                        feed.entries.push(entry);
                    }
                } else {
                    close_element(frame, &stack, &mut current, &mut feed);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    // An unterminated last entry still counts.
    if let Some((_, entry)) = current.take() {
        feed.entries.push(entry);
    }
    Ok(feed)
}

fn append_text(stack: &mut [Frame], text: &str) {
    if let Some(top) = stack.last_mut() {
        top.text.push_str(text);
    }
}

fn close_element(
    frame: Frame,
    stack: &[Frame],
    current: &mut Option<(usize, RawEntry)>,
    feed: &mut ParsedFeed,
) {
    match current {
        Some((depth, entry)) => {
            let mut path: Vec<&str> = stack[*depth..].iter().map(|f| f.name.as_str()).collect();
            path.push(&frame.name);
            assign_entry_field(entry, &path.join("/"), &frame);
        }
        None => {
            let parent = stack.last().map(|f| f.name.as_str());
            if frame.name == "title" && matches!(parent, Some("channel") | Some("feed")) {
                set_once(&mut feed.title, &frame.text);
            }
        }
    }
}

fn assign_entry_field(entry: &mut RawEntry, path: &str, frame: &Frame) {
    let text = frame.text.as_str();
    match path {
        "title" => set_once(&mut entry.title, text),
        "link" => {
            if !text.trim().is_empty() {
                set_once(&mut entry.link, text);
            } else if let Some(href) = frame.attr("href") {
                match frame.attr("rel") {
                    None | Some("alternate") => set_once(&mut entry.link, href),
                    Some(_) => set_once(&mut entry.guid, href),
                }
            }
        }
        "guid" | "id" => set_once(&mut entry.guid, text),
        "pubdate" => set_once(&mut entry.pub_date, text),
        "dc:date" | "published" => set_once(&mut entry.iso_date, text),
        "updated" => set_once(&mut entry.updated, text),
        "description" => set_once(&mut entry.description, text),
        "content:encoded" => set_once(&mut entry.content_encoded, text),
        "content" => set_once(&mut entry.content, text),
        "summary" => set_once(&mut entry.summary, text),
        "source" | "source/title" => set_once(&mut entry.source_title, text),
        "author/name" | "author" | "dc:creator" => set_once(&mut entry.creator, text),
        "enclosure" => {
            if let Some(url) = frame.attr("url") {
                set_once(&mut entry.enclosure_url, url);
            }
        }
        p if p.ends_with("media:content") => {
            if let Some(url) = frame.attr("url") {
                set_once(&mut entry.media_content_url, url);
            }
        }
        p if p.ends_with("media:thumbnail") => {
            if let Some(url) = frame.attr("url") {
                set_once(&mut entry.media_thumbnail_url, url);
            }
        }
        _ => {}
    }
}

fn set_once(slot: &mut Option<String>, value: &str) {
    let value = value.trim();
    if slot.is_none() && !value.is_empty() {
        *slot = Some(value.to_string());
    }
}
