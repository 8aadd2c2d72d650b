//! Property tests: rendered feeds stay well-formed whatever the item text.

use chrono::{TimeZone, Utc};
use proptest::prelude::*;
use quick_xml::events::Event;
use quick_xml::Reader;
use url::Url;

use feedforge::feed::render;
use feedforge::model::{FeedDocument, FeedItem, FeedMeta};
use feedforge::util::clean_text;
use feedforge::OutputFormat;

fn document(title: &str, summary: &str, category: &str) -> FeedDocument {
    let meta = FeedMeta {
        title: "Jobs & <more>".into(),
        link: "https://example.com/feed.xml?a=1&b=2".into(),
        description: "\"quoted\"".into(),
        language: "en-au".into(),
    };
    let link = Url::parse("https://example.com/job?id=1&ref=feed").unwrap();
    let published = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
    let item = FeedItem::new("Source <&>", title, link, published)
        .unwrap()
        .with_summary(summary)
        .with_category(category);
    FeedDocument::new(meta, published, vec![item])
}

/// Parses the whole document, returning the text of every `name` element.
/// Panics if the XML is not well-formed.
fn texts_of(xml: &[u8], name: &str) -> Vec<String> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().check_end_names = true;
    let mut buf = Vec::new();
    let mut out = Vec::new();
    let mut inside = false;
    loop {
        match reader.read_event_into(&mut buf).unwrap() {
            Event::Start(e) if e.name().as_ref() == name.as_bytes() => {
                inside = true;
                out.push(String::new());
            }
            Event::End(e) if e.name().as_ref() == name.as_bytes() => inside = false,
            Event::Text(t) if inside => {
                let text = t.unescape().unwrap().into_owned();
                if let Some(last) = out.last_mut() {
                    last.push_str(&text);
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    out
}

fn text_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z][a-zA-Z0-9<>&\"' éü中\t\n\r]{0,40}"
}

proptest! {
    #[test]
    fn rss_text_round_trips(title in text_strategy(), summary in text_strategy(), category in text_strategy()) {
        let xml = render(&document(&title, &summary, &category), OutputFormat::Rss).unwrap();

        let titles = texts_of(&xml, "title");
        prop_assert_eq!(titles.len(), 2);
        prop_assert_eq!(&titles[0], "Jobs & <more>");
        prop_assert_eq!(&titles[1], &clean_text(&title));

        let descriptions = texts_of(&xml, "description");
        prop_assert_eq!(&descriptions[1], summary.trim());

        let categories = texts_of(&xml, "category");
        prop_assert_eq!(&categories[0], "Source <&>");
        prop_assert_eq!(&categories[1], &clean_text(&category));
    }

    #[test]
    fn atom_text_round_trips(title in text_strategy(), summary in text_strategy()) {
        let xml = render(&document(&title, &summary, "Band 1"), OutputFormat::Atom).unwrap();

        let titles = texts_of(&xml, "title");
        prop_assert_eq!(&titles[1], &clean_text(&title));
        let summaries = texts_of(&xml, "summary");
        prop_assert_eq!(&summaries[0], summary.trim());
    }

    #[test]
    fn control_characters_never_reach_output(noise in proptest::collection::vec(0u8..0x20, 1..8)) {
        let mut title = String::from("Job");
        title.extend(noise.iter().map(|b| char::from(*b)));
        let xml = render(&document(&title, &title, "x"), OutputFormat::Rss).unwrap();
        for byte in &xml {
            prop_assert!(*byte >= 0x20 || matches!(*byte, b'\t' | b'\n' | b'\r'));
        }
        // Still parses.
        texts_of(&xml, "title");
    }
}
