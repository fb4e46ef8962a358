//! Atom archive reading and traversal.
//!
//! # Architecture
//!
//! - [`fetcher`] - single-attempt HTTP GET with size and time limits
//! - [`parser`] - Atom XML into [`Feed`] via quick-xml's serde support
//! - [`model`] - the `Feed`/`Entry`/`Link` types
//! - [`reader`] - fetch, optionally decrypt, then parse one page
//! - [`traversal`] - the seek-first / forward walk over the archive chain
//!
//! # Example
//!
//! ```ignore
//! use futures::TryStreamExt;
//! use feedwalk::feed::{ArchiveWalker, FeedReader, Fetcher, FetcherOptions, Scheme};
//!
//! let fetcher = Fetcher::new(FetcherOptions::default())?;
//! let reader = FeedReader::new(fetcher, Scheme::Https, "feeds.example.com");
//!
//! let mut entries = Box::pin(ArchiveWalker::new(&reader).entries());
//! while let Some(entry) = entries.try_next().await? {
//!     println!("{} {}", entry.id, entry.content.body);
//! }
//! ```

pub mod fetcher;
pub mod model;
pub mod parser;
pub mod reader;
pub mod traversal;

pub use fetcher::{FetchError, Fetcher, FetcherOptions};
pub use model::{Entry, Feed, Link, Text, NEXT_ARCHIVE, PREV_ARCHIVE};
pub use parser::{parse_feed, ParseError};
pub use reader::{FeedReader, FeedSource, ReadError, Scheme};
pub use traversal::{archive_feed_id, ArchivePage, ArchiveWalker, TraversalError};
