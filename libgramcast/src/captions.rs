//! Caption list sources
//!
//! A caption list is a plain text resource, one caption per line. It is
//! fetched fresh for every operation that needs it; nothing is cached.

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;

use crate::error::{FetchError, Result};

const FETCH_TIMEOUT: Duration = Duration::from_secs(15);

/// Where caption lists come from
#[async_trait]
pub trait CaptionSource: Send + Sync {
    /// Non-blank, trimmed lines of the list at `url`, in order
    ///
    /// An empty list is returned as such; deciding whether that is an error
    /// is up to the caller.
    async fn fetch_lines(&self, url: &str) -> Result<Vec<String>>;
}

/// Split a caption list into trimmed, non-blank lines
pub fn parse_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Fetches caption lists over HTTP(S)
#[derive(Clone)]
pub struct HttpCaptionSource {
    client: reqwest::Client,
}

impl HttpCaptionSource {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Default for HttpCaptionSource {
    fn default() -> Self {
        Self::new(reqwest::Client::new())
    }
}

#[async_trait]
impl CaptionSource for HttpCaptionSource {
    async fn fetch_lines(&self, url: &str) -> Result<Vec<String>> {
        let unreachable = |reason: String| FetchError::Unreachable {
            url: url.to_string(),
            reason,
        };

        tracing::debug!("Fetching caption list from {}", url);

        let response = self
            .client
            .get(url)
            .timeout(FETCH_TIMEOUT)
            .send()
            .await
            .map_err(|e| unreachable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(unreachable(format!("HTTP {}", status.as_u16())).into());
        }

        let text = response
            .text()
            .await
            .map_err(|e| unreachable(e.to_string()))?;

        Ok(parse_lines(&text))
    }
}

/// Caption lists held in memory, keyed by URL
///
/// Unknown URLs behave like an unreachable source.
#[derive(Debug, Default, Clone)]
pub struct StaticCaptionSource {
    lists: HashMap<String, Vec<String>>,
}

impl StaticCaptionSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_list(mut self, url: &str, lines: &[&str]) -> Self {
        self.lists.insert(
            url.to_string(),
            lines.iter().map(|l| l.to_string()).collect(),
        );
        self
    }
}

#[async_trait]
impl CaptionSource for StaticCaptionSource {
    async fn fetch_lines(&self, url: &str) -> Result<Vec<String>> {
        self.lists
            .get(url)
            .map(|lines| parse_lines(&lines.join("\n")))
            .ok_or_else(|| {
                FetchError::Unreachable {
                    url: url.to_string(),
                    reason: "no such caption list".to_string(),
                }
                .into()
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_parse_lines_drops_blanks_and_trims() {
        let lines = parse_lines("  first \n\n\t\nsecond\r\n   \nthird");
        assert_eq!(lines, vec!["first", "second", "third"]);
    }

    #[test]
    fn test_parse_lines_empty_text() {
        assert!(parse_lines("\n \n").is_empty());
    }

    #[tokio::test]
    async fn test_http_source_fetches_lines() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/captions.txt"))
            .respond_with(ResponseTemplate::new(200).set_body_string("a\n\nb\n"))
            .mount(&server)
            .await;

        let source = HttpCaptionSource::default();
        let lines = source
            .fetch_lines(&format!("{}/captions.txt", server.uri()))
            .await
            .unwrap();
        assert_eq!(lines, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_http_source_reports_status_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let source = HttpCaptionSource::default();
        let err = source
            .fetch_lines(&format!("{}/missing.txt", server.uri()))
            .await
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("missing.txt"));
        assert!(message.contains("404"));
    }

    #[tokio::test]
    async fn test_static_source_unknown_url_is_unreachable() {
        let source = StaticCaptionSource::new().with_list("http://c/1", &["x"]);
        assert_eq!(source.fetch_lines("http://c/1").await.unwrap(), vec!["x"]);
        assert!(source.fetch_lines("http://c/2").await.is_err());
    }
}
