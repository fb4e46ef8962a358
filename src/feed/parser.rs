use crate::feed::model::Feed;
use quick_xml::events::Event;
use quick_xml::Reader;
use thiserror::Error;

/// Local name of the Atom document element.
const FEED_ELEMENT: &[u8] = b"feed";

/// The bytes were not a well-formed Atom document.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Parse error: {0}")]
    Xml(#[from] quick_xml::DeError),
    /// Well-formed XML, but not an Atom feed (e.g. an HTML error page)
    #[error("Parse error: root element is <{0}>, expected <feed>")]
    NotAtom(String),
}

/// Parses an Atom document into a [`Feed`].
///
/// Only structure is checked. Missing ids, titles or timestamps come back
/// as empty strings; the caller decides whether that matters. The document
/// element must be `<feed>` though, or any well-formed XML would come back
/// as an empty feed.
pub fn parse_feed(bytes: &[u8]) -> Result<Feed, ParseError> {
    let feed: Feed = quick_xml::de::from_reader(bytes)?;

    let root = root_element(bytes)?;
    if root != FEED_ELEMENT {
        return Err(ParseError::NotAtom(
            String::from_utf8_lossy(&root).into_owned(),
        ));
    }
    Ok(feed)
}

/// Local name of the first element, empty if there is none.
fn root_element(bytes: &[u8]) -> Result<Vec<u8>, quick_xml::DeError> {
    let mut reader = Reader::from_reader(bytes);
    let mut buf = Vec::new();
    loop {
        match reader
            .read_event_into(&mut buf)
            .map_err(quick_xml::DeError::InvalidXml)?
        {
            Event::Start(e) | Event::Empty(e) => return Ok(e.local_name().as_ref().to_vec()),
            Event::Eof => return Ok(Vec::new()),
            _ => {}
        }
        buf.clear();
    }
}
