//! Archive chain traversal.
//!
//! Archive pages form a doubly linked list: `prev-archive` points one page
//! older, `next-archive` one page newer. The newest page is the `recent`
//! resource. Replaying the whole history oldest-first takes two phases:
//!
//! 1. **Seek first**: start at `recent` and follow `prev-archive` until a
//!    page has none. Nothing is emitted.
//! 2. **Forward**: emit that oldest page, then follow `next-archive`,
//!    emitting each page, until a page has none.
//!
//! [`ArchiveWalker`] holds this as an explicit state machine and is driven
//! one page at a time, so callers can stop consuming at any point without
//! the rest of the chain being fetched.
use crate::feed::model::{Entry, Feed};
use crate::feed::reader::{is_valid_feed_id, FeedSource, ReadError};
use futures::stream::{self, Stream, TryStreamExt};
use std::collections::HashSet;
use thiserror::Error;
use url::Url;

/// Errors that end a traversal. None are retried; restart from `recent`.
#[derive(Debug, Error)]
pub enum TraversalError {
    #[error(transparent)]
    Read(#[from] ReadError),
    /// An archive link's href does not end in a usable feed id
    #[error("Cannot extract feed id from link {href:?}: {reason}")]
    LinkExtraction { href: String, reason: String },
    /// The chain revisits a page, it would never terminate
    #[error("Archive chain loops back to feed {feed_id}")]
    ArchiveLoop { feed_id: String },
}

/// A page produced by the forward phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchivePage {
    /// Id the page was fetched under; `None` for the `recent` resource.
    pub feed_id: Option<String>,
    pub feed: Feed,
}

#[derive(Debug)]
enum Phase {
    /// Nothing fetched yet.
    Recent,
    /// Walking back; holds the oldest page seen so far.
    Seeking(ArchivePage),
    /// Holds the next page to hand out.
    Emit(ArchivePage),
    /// Holds the `next-archive` href of the last emitted page.
    Forward(String),
    Done,
}

/// Two-phase walker over an archive chain.
pub struct ArchiveWalker<'a, S: ?Sized> {
    source: &'a S,
    phase: Phase,
    /// Ids fetched in the current phase, for loop detection.
    visited: HashSet<String>,
}

impl<'a, S: FeedSource + ?Sized> ArchiveWalker<'a, S> {
    pub fn new(source: &'a S) -> Self {
        Self {
            source,
            phase: Phase::Recent,
            visited: HashSet::new(),
        }
    }

    /// Advances to the next page of the forward phase.
    ///
    /// The first call runs the whole seek-first phase. Returns `Ok(None)`
    /// once the newest page has been handed out, or straight away when the
    /// feed has no `recent` page. After an error the walker is finished.
    pub async fn next_page(&mut self) -> Result<Option<ArchivePage>, TraversalError> {
        loop {
            // Any early return below leaves the walker in `Done`.
            match std::mem::replace(&mut self.phase, Phase::Done) {
                Phase::Recent => {
                    tracing::info!("Looking for first feed");
                    match self.source.recent().await? {
                        Some(feed) => {
                            self.phase = Phase::Seeking(ArchivePage {
                                feed_id: None,
                                feed,
                            });
                        }
                        None => {
                            tracing::info!("Nothing in the feed");
                            return Ok(None);
                        }
                    }
                }
                Phase::Seeking(page) => match page.feed.prev_archive() {
                    Some(href) => {
                        let feed_id = archive_feed_id(href)?;
                        tracing::info!(feed_id = %feed_id, "Prev archive feed");
                        let page = self.visit(feed_id).await?;
                        self.phase = Phase::Seeking(page);
                    }
                    None => {
                        tracing::info!(
                            feed_id = page.feed_id.as_deref().unwrap_or("recent"),
                            "Found first feed"
                        );
                        self.visited.clear();
                        if let Some(id) = &page.feed_id {
                            self.visited.insert(id.clone());
                        }
                        self.phase = Phase::Emit(page);
                    }
                },
                Phase::Emit(page) => {
                    if let Some(href) = page.feed.next_archive() {
                        self.phase = Phase::Forward(href.to_string());
                    }
                    return Ok(Some(page));
                }
                Phase::Forward(href) => {
                    let feed_id = archive_feed_id(&href)?;
                    tracing::info!(feed_id = %feed_id, "Next archive feed");
                    let page = self.visit(feed_id).await?;
                    self.phase = Phase::Emit(page);
                }
                Phase::Done => return Ok(None),
            }
        }
    }

    async fn visit(&mut self, feed_id: String) -> Result<ArchivePage, TraversalError> {
        if !self.visited.insert(feed_id.clone()) {
            return Err(TraversalError::ArchiveLoop { feed_id });
        }
        let feed = self.source.feed(&feed_id).await?;
        Ok(ArchivePage {
            feed_id: Some(feed_id),
            feed,
        })
    }

    /// Pages oldest first, fetched lazily as the stream is polled.
    ///
    /// The stream ends after the first error.
    pub fn pages(self) -> impl Stream<Item = Result<ArchivePage, TraversalError>> + 'a {
        stream::try_unfold(self, |mut walker| async move {
            let next = walker.next_page().await?;
            Ok::<_, TraversalError>(next.map(|page| (page, walker)))
        })
    }

    /// Entries oldest page first, each page's entries in document order.
    pub fn entries(self) -> impl Stream<Item = Result<Entry, TraversalError>> + 'a {
        self.pages()
            .map_ok(|page| {
                stream::iter(
                    page.feed
                        .entries
                        .into_iter()
                        .map(Ok::<_, TraversalError>),
                )
            })
            .try_flatten()
    }
}

/// Extracts the feed id from an archive link: the last segment of its path.
///
/// Relative hrefs are accepted; only their path is used. An href whose path
/// ends in `/` or that has no path at all yields
/// [`TraversalError::LinkExtraction`] rather than a doomed request.
pub fn archive_feed_id(href: &str) -> Result<String, TraversalError> {
    let extraction_error = |reason: &str| TraversalError::LinkExtraction {
        href: href.to_string(),
        reason: reason.to_string(),
    };

    let url = match Url::parse(href) {
        Ok(url) => url,
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            // Placeholder base: the host is discarded, only the path matters.
            let base = Url::parse("http://archive.invalid/")
                .map_err(|e| extraction_error(&e.to_string()))?;
            base.join(href).map_err(|e| extraction_error(&e.to_string()))?
        }
        Err(e) => return Err(extraction_error(&e.to_string())),
    };

    let last = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .ok_or_else(|| extraction_error("href has no path"))?;

    if !is_valid_feed_id(last) {
        return Err(extraction_error("path does not end in a feed id"));
    }
    Ok(last.to_string())
}
