use chrono::{DateTime, SecondsFormat, Utc};
use quick_xml::escape::escape;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::io::{Cursor, Write};
use thiserror::Error;

use crate::config::OutputFormat;
use crate::model::{FeedDocument, FeedItem};
use crate::util::{truncate_chars, xml_safe, MAX_SUMMARY_CHARS};

/// RSS `category` domain (Atom `scheme`) marking the source-name category.
pub const SOURCE_SCHEME: &str = "source";

/// Prefix turning a bare `unique_id` into an Atom entry IRI.
pub const ATOM_ID_PREFIX: &str = "urn:feedforge:";

const GENERATOR: &str = concat!("feedforge ", env!("CARGO_PKG_VERSION"));
const ATOM_NS: &str = "http://www.w3.org/2005/Atom";

/// Errors raised while serializing a [`FeedDocument`].
#[derive(Debug, Error)]
pub enum SerializationError {
    /// A required field was empty; items are validated at construction, so
    /// this means a caller built one by hand.
    #[error("required field '{field}' is empty ({context})")]
    MissingField {
        field: &'static str,
        context: String,
    },

    #[error("XML write failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Serializes a document in the requested syndication format.
pub fn render(doc: &FeedDocument, format: OutputFormat) -> Result<Vec<u8>, SerializationError> {
    validate(doc)?;
    match format {
        OutputFormat::Rss => render_rss(doc),
        OutputFormat::Atom => render_atom(doc),
    }
}

fn validate(doc: &FeedDocument) -> Result<(), SerializationError> {
    if doc.meta.title.trim().is_empty() {
        return Err(missing("title", "channel"));
    }
    if doc.meta.link.trim().is_empty() {
        return Err(missing("link", "channel"));
    }
    for item in &doc.items {
        if item.unique_id.trim().is_empty() {
            return Err(missing("unique_id", item.link.as_str()));
        }
        if item.title.trim().is_empty() {
            return Err(missing("title", &item.unique_id));
        }
    }
    Ok(())
}

fn missing(field: &'static str, context: &str) -> SerializationError {
    SerializationError::MissingField {
        field,
        context: context.to_string(),
    }
}

/// RFC 2822 with a literal `GMT` zone, as most RSS readers expect.
fn rfc2822_gmt(dt: &DateTime<Utc>) -> String {
    dt.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

fn rfc3339(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn summary_text(item: &FeedItem) -> String {
    truncate_chars(&item.summary, MAX_SUMMARY_CHARS).into_owned()
}

/// Escaped element text. CR goes out as `&#13;` because parsers fold a
/// literal CR into LF.
fn escaped_text(text: &str) -> BytesText<'static> {
    let escaped = escape(xml_safe(text).as_ref()).replace('\r', "&#13;");
    BytesText::from_escaped(escaped)
}

/// Writes `<name>text</name>`.
fn text_element<W: Write>(writer: &mut Writer<W>, name: &str, text: &str) -> std::io::Result<()> {
    writer.write_event(Event::Start(BytesStart::new(name)))?;
    writer.write_event(Event::Text(escaped_text(text)))?;
    writer.write_event(Event::End(BytesEnd::new(name)))
}

/// Writes `<name attr="value">text</name>`.
fn text_element_with_attr<W: Write>(
    writer: &mut Writer<W>,
    name: &str,
    attr: (&str, &str),
    text: &str,
) -> std::io::Result<()> {
    let mut start = BytesStart::new(name);
    start.push_attribute((attr.0, xml_safe(attr.1).as_ref()));
    writer.write_event(Event::Start(start))?;
    writer.write_event(Event::Text(escaped_text(text)))?;
    writer.write_event(Event::End(BytesEnd::new(name)))
}

fn new_writer() -> Result<Writer<Cursor<Vec<u8>>>, SerializationError> {
    let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    Ok(writer)
}

fn finish(writer: Writer<Cursor<Vec<u8>>>) -> Vec<u8> {
    let mut bytes = writer.into_inner().into_inner();
    bytes.push(b'\n');
    bytes
}

fn render_rss(doc: &FeedDocument) -> Result<Vec<u8>, SerializationError> {
    let mut writer = new_writer()?;

    let mut rss = BytesStart::new("rss");
    rss.push_attribute(("version", "2.0"));
    writer.write_event(Event::Start(rss))?;
    writer.write_event(Event::Start(BytesStart::new("channel")))?;

    text_element(&mut writer, "title", &doc.meta.title)?;
    text_element(&mut writer, "link", &doc.meta.link)?;
    text_element(&mut writer, "description", &doc.meta.description)?;
    if !doc.meta.language.is_empty() {
        text_element(&mut writer, "language", &doc.meta.language)?;
    }
    text_element(&mut writer, "lastBuildDate", &rfc2822_gmt(&doc.last_build))?;
    text_element(&mut writer, "generator", GENERATOR)?;

    for item in &doc.items {
        writer.write_event(Event::Start(BytesStart::new("item")))?;
        text_element(&mut writer, "title", &item.title)?;
        text_element(&mut writer, "link", item.link.as_str())?;
        text_element_with_attr(
            &mut writer,
            "guid",
            ("isPermaLink", "false"),
            &item.unique_id,
        )?;
        text_element(&mut writer, "pubDate", &rfc2822_gmt(&item.published_at))?;
        if !item.source.is_empty() {
            text_element_with_attr(
                &mut writer,
                "category",
                ("domain", SOURCE_SCHEME),
                &item.source,
            )?;
        }
        for category in &item.categories {
            text_element(&mut writer, "category", category)?;
        }
        text_element(&mut writer, "description", &summary_text(item))?;
        writer.write_event(Event::End(BytesEnd::new("item")))?;
    }

    writer.write_event(Event::End(BytesEnd::new("channel")))?;
    writer.write_event(Event::End(BytesEnd::new("rss")))?;
    Ok(finish(writer))
}

fn render_atom(doc: &FeedDocument) -> Result<Vec<u8>, SerializationError> {
    let mut writer = new_writer()?;

    let mut feed = BytesStart::new("feed");
    feed.push_attribute(("xmlns", ATOM_NS));
    if !doc.meta.language.is_empty() {
        feed.push_attribute(("xml:lang", xml_safe(&doc.meta.language).as_ref()));
    }
    writer.write_event(Event::Start(feed))?;

    text_element(&mut writer, "title", &doc.meta.title)?;
    text_element(&mut writer, "subtitle", &doc.meta.description)?;
    text_element(&mut writer, "id", &doc.meta.link)?;
    let mut self_link = BytesStart::new("link");
    self_link.push_attribute(("rel", "self"));
    self_link.push_attribute(("href", xml_safe(&doc.meta.link).as_ref()));
    writer.write_event(Event::Empty(self_link))?;
    text_element(&mut writer, "updated", &rfc3339(&doc.last_build))?;
    text_element(&mut writer, "generator", GENERATOR)?;

    for item in &doc.items {
        writer.write_event(Event::Start(BytesStart::new("entry")))?;
        text_element(&mut writer, "title", &item.title)?;
        let mut link = BytesStart::new("link");
        link.push_attribute(("rel", "alternate"));
        link.push_attribute(("href", item.link.as_str()));
        writer.write_event(Event::Empty(link))?;
        text_element(
            &mut writer,
            "id",
            &format!("{}{}", ATOM_ID_PREFIX, item.unique_id),
        )?;
        text_element(&mut writer, "published", &rfc3339(&item.published_at))?;
        text_element(&mut writer, "updated", &rfc3339(&item.published_at))?;
        if !item.source.is_empty() {
            let mut category = BytesStart::new("category");
            category.push_attribute(("term", xml_safe(&item.source).as_ref()));
            category.push_attribute(("scheme", SOURCE_SCHEME));
            writer.write_event(Event::Empty(category))?;
        }
        for term in &item.categories {
            let mut category = BytesStart::new("category");
            category.push_attribute(("term", xml_safe(term).as_ref()));
            writer.write_event(Event::Empty(category))?;
        }
        text_element_with_attr(&mut writer, "summary", ("type", "text"), &summary_text(item))?;
        writer.write_event(Event::End(BytesEnd::new("entry")))?;
    }

    writer.write_event(Event::End(BytesEnd::new("feed")))?;
    Ok(finish(writer))
}
