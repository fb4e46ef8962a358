use crate::crypto::{DecryptError, EnvelopeDecryptor};
use crate::feed::fetcher::{FetchError, Fetcher};
use crate::feed::model::Feed;
use crate::feed::parser::{parse_feed, ParseError};
use async_trait::async_trait;
use clap::ValueEnum;
use serde::Deserialize;
use std::fmt;
use thiserror::Error;

/// Resource name of the newest page.
pub const RECENT: &str = "recent";

/// Transport scheme for the feed endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    Http,
    #[default]
    Https,
}

impl Scheme {
    pub fn as_str(self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure of one read: the first stage that failed wins.
#[derive(Debug, Error)]
pub enum ReadError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Decrypt(#[from] DecryptError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    /// Feed id cannot be placed in a request path
    #[error("Invalid feed id {0:?}")]
    InvalidFeedId(String),
}

/// Anything that can hand out archive pages by id.
///
/// The traversal engine only talks to this trait, so it can walk an
/// in-memory chain in tests exactly as it walks the HTTP endpoint.
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// The newest page. `Ok(None)` means the feed has nothing to offer yet.
    async fn recent(&self) -> Result<Option<Feed>, ReadError>;

    /// The archive page with the given id.
    async fn feed(&self, feed_id: &str) -> Result<Feed, ReadError>;
}

/// Reads pages from `{scheme}://{endpoint}/notifications/{id}`.
///
/// Each call is fetch, then decrypt when a key reference is configured,
/// then parse. A call either returns a whole [`Feed`] or the error of the
/// first stage that failed.
#[derive(Debug)]
pub struct FeedReader {
    fetcher: Fetcher,
    scheme: Scheme,
    endpoint: String,
    decryptor: Option<EnvelopeDecryptor>,
}

impl FeedReader {
    pub fn new(fetcher: Fetcher, scheme: Scheme, endpoint: impl Into<String>) -> Self {
        let endpoint: String = endpoint.into();
        Self {
            fetcher,
            scheme,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            decryptor: None,
        }
    }

    /// Switches the reader to encrypted mode.
    pub fn with_decryptor(mut self, decryptor: EnvelopeDecryptor) -> Self {
        self.decryptor = Some(decryptor);
        self
    }

    /// True when a key reference is configured and bodies are envelopes.
    pub fn is_encrypted(&self) -> bool {
        self.decryptor.is_some()
    }

    pub fn resource_url(&self, resource: &str) -> String {
        format!(
            "{}://{}/notifications/{}",
            self.scheme, self.endpoint, resource
        )
    }

    /// Fetches and parses the `recent` page.
    ///
    /// An empty body (e.g. `204 No Content`) means there is no feed yet and
    /// yields `Ok(None)`.
    pub async fn get_recent(&self) -> Result<Option<Feed>, ReadError> {
        let bytes = self.fetcher.fetch(&self.resource_url(RECENT)).await?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            tracing::info!(endpoint = %self.endpoint, "Recent feed is empty");
            return Ok(None);
        }
        self.decode(bytes).await.map(Some)
    }

    /// Fetches and parses the archive page `feed_id`.
    pub async fn get_feed(&self, feed_id: &str) -> Result<Feed, ReadError> {
        if !is_valid_feed_id(feed_id) {
            return Err(ReadError::InvalidFeedId(feed_id.to_string()));
        }
        let bytes = self.fetcher.fetch(&self.resource_url(feed_id)).await?;
        self.decode(bytes).await
    }

    async fn decode(&self, bytes: Vec<u8>) -> Result<Feed, ReadError> {
        let plaintext = match &self.decryptor {
            Some(decryptor) => decryptor.decrypt(&bytes).await?,
            None => bytes,
        };
        Ok(parse_feed(&plaintext)?)
    }
}

#[async_trait]
impl FeedSource for FeedReader {
    async fn recent(&self) -> Result<Option<Feed>, ReadError> {
        self.get_recent().await
    }

    async fn feed(&self, feed_id: &str) -> Result<Feed, ReadError> {
        self.get_feed(feed_id).await
    }
}

/// A feed id is a single path segment.
pub fn is_valid_feed_id(feed_id: &str) -> bool {
    !feed_id.is_empty()
        && feed_id != "."
        && feed_id != ".."
        && !feed_id.contains(['/', '?', '#'])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::fetcher::FetcherOptions;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const PAGE: &str = r#"<feed xmlns="http://www.w3.org/2005/Atom">
  <link rel="prev-archive" href="http://example.com/notifications/41"/>
  <entry><id>e1</id><content type="text">one</content></entry>
</feed>"#;

    fn reader_for(server: &MockServer) -> FeedReader {
        let endpoint = server.uri().trim_start_matches("http://").to_string();
        let fetcher = Fetcher::new(FetcherOptions::default()).unwrap();
        FeedReader::new(fetcher, Scheme::Http, endpoint)
    }

    #[tokio::test]
    async fn test_get_recent_parses_page() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/notifications/recent"))
            .respond_with(ResponseTemplate::new(200).set_body_string(PAGE))
            .expect(1)
            .mount(&mock_server)
            .await;

        let reader = reader_for(&mock_server);
        assert!(!reader.is_encrypted());
        let feed = reader.get_recent().await.unwrap().unwrap();
        assert_eq!(feed.entries.len(), 1);
        assert_eq!(
            feed.prev_archive(),
            Some("http://example.com/notifications/41")
        );
    }

    #[tokio::test]
    async fn test_get_feed_by_id() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/notifications/41"))
            .respond_with(ResponseTemplate::new(200).set_body_string(PAGE))
            .expect(1)
            .mount(&mock_server)
            .await;

        let feed = reader_for(&mock_server).get_feed("41").await.unwrap();
        assert_eq!(feed.entries[0].id, "e1");
    }

    #[tokio::test]
    async fn test_get_recent_404() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        match reader_for(&mock_server).get_recent().await.unwrap_err() {
            ReadError::Fetch(FetchError::HttpStatus { status: 404 }) => {}
            e => panic!("Expected HttpStatus(404), got {:?}", e),
        }
    }

    #[tokio::test]
    async fn test_get_recent_no_content_is_absent() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&mock_server)
            .await;

        assert!(reader_for(&mock_server).get_recent().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_malformed_page_is_parse_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<not valid xml"))
            .mount(&mock_server)
            .await;

        let err = reader_for(&mock_server).get_feed("3").await.unwrap_err();
        assert!(matches!(err, ReadError::Parse(_)));
    }

    #[tokio::test]
    async fn test_invalid_feed_id_issues_no_request() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(PAGE))
            .expect(0)
            .mount(&mock_server)
            .await;

        let reader = reader_for(&mock_server);
        for id in ["", "a/b", "..", "x?y=1"] {
            let err = reader.get_feed(id).await.unwrap_err();
            assert!(matches!(err, ReadError::InvalidFeedId(_)), "id {:?}", id);
        }
    }

    #[tokio::test]
    async fn test_resource_url_layout() {
        let fetcher = Fetcher::with_client(reqwest::Client::new(), &FetcherOptions::default());
        let reader = FeedReader::new(fetcher, Scheme::Https, "feeds.example.com/");
        assert_eq!(
            reader.resource_url(RECENT),
            "https://feeds.example.com/notifications/recent"
        );
        assert_eq!(
            reader.resource_url("17"),
            "https://feeds.example.com/notifications/17"
        );
    }
}
