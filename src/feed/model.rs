//! Atom feed model.
//!
//! Field names mirror the Atom elements they are read from. The serde
//! attributes follow quick-xml conventions: `@name` for attributes and
//! `$text` for character data. Every field defaults so that a missing
//! element becomes an empty value instead of a parse failure.
use chrono::{DateTime, FixedOffset};
use serde::Deserialize;

/// Link relation pointing at the next older archive page.
pub const PREV_ARCHIVE: &str = "prev-archive";
/// Link relation pointing at the next newer archive page.
pub const NEXT_ARCHIVE: &str = "next-archive";

/// One page of an Atom feed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Feed {
    pub id: String,
    pub title: Text,
    pub updated: String,
    #[serde(rename = "link")]
    pub links: Vec<Link>,
    #[serde(rename = "entry")]
    pub entries: Vec<Entry>,
}

impl Feed {
    /// Returns the href of the first link with the given relation.
    ///
    /// Atom allows repeated relations; only the first one encountered counts.
    pub fn link(&self, rel: &str) -> Option<&str> {
        self.links
            .iter()
            .find(|l| l.rel == rel)
            .map(|l| l.href.as_str())
    }

    pub fn prev_archive(&self) -> Option<&str> {
        self.link(PREV_ARCHIVE)
    }

    pub fn next_archive(&self) -> Option<&str> {
        self.link(NEXT_ARCHIVE)
    }
}

/// A single feed entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Entry {
    pub id: String,
    pub title: Text,
    /// Raw `published` value as sent by the server.
    pub published: String,
    pub updated: String,
    pub content: Text,
    #[serde(rename = "link")]
    pub links: Vec<Link>,
}

impl Entry {
    /// Parses [`Entry::published`] as RFC 3339.
    ///
    /// Returns `None` when the element is absent or not a valid timestamp;
    /// the raw string is still available on the entry.
    pub fn published_at(&self) -> Option<DateTime<FixedOffset>> {
        let raw = self.published.trim();
        if raw.is_empty() {
            return None;
        }
        DateTime::parse_from_rfc3339(raw).ok()
    }
}

/// Atom text construct (`title`, `content`): a `type` attribute plus character data.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Text {
    #[serde(rename = "@type")]
    pub content_type: String,
    #[serde(rename = "$text")]
    pub body: String,
}

/// `<link rel=".." href=".."/>`
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Link {
    #[serde(rename = "@rel")]
    pub rel: String,
    #[serde(rename = "@href")]
    pub href: String,
}

impl Link {
    pub fn new(rel: impl Into<String>, href: impl Into<String>) -> Self {
        Self {
            rel: rel.into(),
            href: href.into(),
        }
    }
}
