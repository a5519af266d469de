use quick_xml::events::Event;
use quick_xml::Reader;

use crate::{Error, Result};

/// A parsed RSS document: the channel title and its items in document order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawFeedDocument {
    pub title: String,
    pub items: Vec<ChannelItem>,
}

/// One `<item>` of an RSS channel, fields as they appear in the document
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChannelItem {
    pub title: String,
    pub link: String,
    /// Possibly empty
    pub description: String,
    /// Free-form date string, see [`super::timestamp::normalize`]
    pub pub_date: String,
}

/// Collects `<root>/channel/item` fields while the reader walks the document
///
/// Only un-prefixed element names count, so `atom:link` or `media:title`
/// never shadow `link` or `title`. Markup nested inside a field contributes
/// its text and nothing else.
#[derive(Default)]
struct DocumentBuilder {
    path: Vec<Vec<u8>>,
    saw_channel: bool,
    title: String,
    current: Option<ChannelItem>,
    items: Vec<ChannelItem>,
}

impl DocumentBuilder {
    fn at(&self, depth: usize, name: &[u8]) -> bool {
        self.path.get(depth).is_some_and(|n| n.as_slice() == name)
    }

    fn in_item(&self) -> bool {
        self.path.len() == 3 && self.at(1, b"channel") && self.at(2, b"item")
    }

    fn open(&mut self, name: &[u8]) {
        self.path.push(name.to_vec());
        if self.path.len() == 2 && self.at(1, b"channel") {
            self.saw_channel = true;
        }
        if self.in_item() {
            self.current = Some(ChannelItem::default());
        }
    }

    fn close(&mut self) {
        if self.in_item() {
            if let Some(item) = self.current.take() {
                self.items.push(item);
            }
        }
        self.path.pop();
    }

    fn text(&mut self, text: &str) {
        if !self.at(1, b"channel") {
            return;
        }
        if self.at(2, b"title") {
            self.title.push_str(text);
            return;
        }
        let Some(item) = self.current.as_mut() else {
            return;
        };
        let field = match self.path.get(3).map(Vec::as_slice) {
            Some(b"title") => &mut item.title,
            Some(b"link") => &mut item.link,
            Some(b"description") => &mut item.description,
            Some(b"pubDate") => &mut item.pub_date,
            _ => return,
        };
        field.push_str(text);
    }

    fn finish(self) -> Result<RawFeedDocument> {
        if !self.path.is_empty() {
            return Err(Error::FeedParse("Feed document ends inside an element".to_string()));
        }
        if !self.saw_channel {
            return Err(Error::FeedParse("Feed document has no channel".to_string()));
        }

        let items = self
            .items
            .into_iter()
            .map(|item| ChannelItem {
                title: item.title.trim().to_string(),
                link: item.link.trim().to_string(),
                description: item.description.trim().to_string(),
                pub_date: item.pub_date.trim().to_string(),
            })
            .collect();

        Ok(RawFeedDocument {
            title: self.title.trim().to_string(),
            items,
        })
    }
}

/// Parse RSS content into its channel items
pub fn parse_feed(content: &[u8]) -> Result<RawFeedDocument> {
    let text = std::str::from_utf8(content)
        .map_err(|e| Error::FeedParse(format!("Feed is not valid UTF-8: {}", e)))?;

    let mut reader = Reader::from_str(text);
    let mut builder = DocumentBuilder::default();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => builder.open(e.name().as_ref()),
            Ok(Event::Empty(e)) => {
                builder.open(e.name().as_ref());
                builder.close();
            }
            Ok(Event::End(_)) => builder.close(),
            Ok(Event::Text(e)) => {
                let text = e
                    .unescape()
                    .map_err(|e| Error::FeedParse(format!("Invalid text in feed: {}", e)))?;
                builder.text(&text);
            }
            Ok(Event::CData(e)) => builder.text(&String::from_utf8_lossy(&e)),
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(Error::FeedParse(format!("Failed to parse feed: {}", e)));
            }
            _ => {}
        }
    }

    builder.finish()
}
