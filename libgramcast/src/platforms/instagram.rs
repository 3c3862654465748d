//! Instagram Graph API client over HTTP
//!
//! All calls are form posts or query GETs against `{base_url}/{node}` with the
//! access token as the `access_token` parameter. Request timeouts differ by
//! call: container and publish calls can take a while on the platform side,
//! reel containers most of all.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use std::time::Duration;

use crate::config::GraphConfig;
use crate::credentials::Credentials;
use crate::error::{RemoteError, Result};
use crate::platforms::{ContainerStatus, GraphApi, PollPolicy};
use crate::types::normalize_base;

const LOOKUP_TIMEOUT: Duration = Duration::from_secs(15);
const CONTAINER_TIMEOUT: Duration = Duration::from_secs(45);
const REEL_TIMEOUT: Duration = Duration::from_secs(90);

/// Why a Graph call did not produce an id
#[derive(Debug)]
enum CallFailure {
    /// The request never got a response
    Transport(String),
    /// The API answered without the expected id
    Rejected(String),
}

impl CallFailure {
    /// `step` names the call in transport errors, which have no variant of their own
    fn into_remote(self, step: &str, rejected: impl FnOnce(String) -> RemoteError) -> RemoteError {
        match self {
            CallFailure::Transport(reason) => RemoteError::Network(format!("{}: {}", step, reason)),
            CallFailure::Rejected(reason) => rejected(reason),
        }
    }
}

/// [`GraphApi`] implementation talking to graph.facebook.com (or a stand-in)
#[derive(Clone)]
pub struct InstagramGraph {
    client: reqwest::Client,
    base_url: String,
    poll: PollPolicy,
}

impl InstagramGraph {
    pub fn new(base_url: &str, poll: PollPolicy) -> Self {
        Self::with_client(reqwest::Client::new(), base_url, poll)
    }

    pub fn with_client(client: reqwest::Client, base_url: &str, poll: PollPolicy) -> Self {
        Self {
            client,
            base_url: normalize_base(base_url).to_string(),
            poll,
        }
    }

    pub fn from_config(config: &GraphConfig) -> Self {
        Self::new(&config.base_url, PollPolicy::from(config))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn node_url(&self, node: &str) -> String {
        format!("{}/{}", self.base_url, node)
    }

    async fn post_for_id(
        &self,
        creds: &Credentials,
        edge: &str,
        params: &[(&str, &str)],
        timeout: Duration,
    ) -> std::result::Result<String, CallFailure> {
        let url = self.node_url(&format!("{}/{}", creds.user_id(), edge));
        let mut form = params.to_vec();
        form.push(("access_token", creds.access_token()));

        tracing::debug!("POST {}", url);

        let response = self
            .client
            .post(&url)
            .form(&form)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| CallFailure::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| CallFailure::Transport(e.to_string()))?;

        extract_id(status, &body).map_err(CallFailure::Rejected)
    }

    async fn get_node(
        &self,
        creds: &Credentials,
        node: &str,
        fields: &str,
    ) -> std::result::Result<Value, String> {
        let url = self.node_url(node);
        tracing::debug!("GET {} fields={}", url, fields);

        let response = self
            .client
            .get(&url)
            .query(&[("fields", fields), ("access_token", creds.access_token())])
            .timeout(LOOKUP_TIMEOUT)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = response.status();
        let body = response.text().await.map_err(|e| e.to_string())?;
        if !status.is_success() {
            return Err(describe_failure(status, &body));
        }
        serde_json::from_str(&body).map_err(|e| format!("Invalid response body: {}", e))
    }
}

/// Pull the `id` out of a Graph response body
fn extract_id(status: StatusCode, body: &str) -> std::result::Result<String, String> {
    let value: Value = serde_json::from_str(body).unwrap_or(Value::Null);
    let id = match value.get("id") {
        Some(Value::String(id)) if !id.is_empty() => Some(id.clone()),
        Some(Value::Number(id)) => Some(id.to_string()),
        _ => None,
    };

    match id {
        Some(id) if status.is_success() => Ok(id),
        _ => Err(describe_failure(status, body)),
    }
}

/// Human-readable failure, preferring the Graph error message when present
fn describe_failure(status: StatusCode, body: &str) -> String {
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.pointer("/error/message")
                .and_then(Value::as_str)
                .map(str::to_string)
        });

    match message {
        Some(message) => format!("HTTP {}: {}", status.as_u16(), message),
        None => format!("HTTP {}: {}", status.as_u16(), body.trim()),
    }
}

#[async_trait]
impl GraphApi for InstagramGraph {
    async fn create_image_container(&self, creds: &Credentials, image_url: &str) -> Result<String> {
        let id = self
            .post_for_id(
                creds,
                "media",
                &[("image_url", image_url), ("is_carousel_item", "true")],
                CONTAINER_TIMEOUT,
            )
            .await
            .map_err(|f| {
                f.into_remote(&format!("upload {}", image_url), |reason| {
                    RemoteError::Upload(format!("{}: {}", image_url, reason))
                })
            })?;
        tracing::debug!(container_id = %id, "Created image container for {}", image_url);
        Ok(id)
    }

    async fn create_reel_container(
        &self,
        creds: &Credentials,
        video_url: &str,
        caption: &str,
    ) -> Result<String> {
        let id = self
            .post_for_id(
                creds,
                "media",
                &[
                    ("media_type", "REELS"),
                    ("video_url", video_url),
                    ("caption", caption),
                ],
                REEL_TIMEOUT,
            )
            .await
            .map_err(|f| {
                f.into_remote(&format!("upload {}", video_url), |reason| {
                    RemoteError::Upload(format!("{}: {}", video_url, reason))
                })
            })?;
        tracing::debug!(container_id = %id, "Created reel container for {}", video_url);
        Ok(id)
    }

    async fn create_carousel_container(
        &self,
        creds: &Credentials,
        child_ids: &[String],
        caption: &str,
    ) -> Result<String> {
        let children = child_ids.join(",");
        let id = self
            .post_for_id(
                creds,
                "media",
                &[
                    ("media_type", "CAROUSEL"),
                    ("children", children.as_str()),
                    ("caption", caption),
                ],
                CONTAINER_TIMEOUT,
            )
            .await
            .map_err(|f| f.into_remote("carousel container", RemoteError::ContainerCreation))?;
        tracing::debug!(container_id = %id, children = child_ids.len(), "Created carousel container");
        Ok(id)
    }

    async fn container_status(
        &self,
        creds: &Credentials,
        container_id: &str,
    ) -> Result<ContainerStatus> {
        let value = self
            .get_node(creds, container_id, "status_code,status")
            .await
            .map_err(|e| RemoteError::Network(format!("status {}: {}", container_id, e)))?;

        let raw = ["status_code", "status"]
            .iter()
            .find_map(|field| {
                value
                    .get(*field)
                    .and_then(Value::as_str)
                    .filter(|s| !s.is_empty())
            })
            .unwrap_or("");
        Ok(ContainerStatus::from_remote(raw))
    }

    async fn publish(&self, creds: &Credentials, container_id: &str) -> Result<String> {
        let media_id = self
            .post_for_id(
                creds,
                "media_publish",
                &[("creation_id", container_id)],
                CONTAINER_TIMEOUT,
            )
            .await
            .map_err(|f| {
                f.into_remote(&format!("publish {}", container_id), RemoteError::Publish)
            })?;
        tracing::debug!(media_id = %media_id, "Published container {}", container_id);
        Ok(media_id)
    }

    async fn fetch_permalink(&self, creds: &Credentials, media_id: &str) -> String {
        match self.get_node(creds, media_id, "permalink").await {
            Ok(value) => value
                .get("permalink")
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string(),
            Err(e) => {
                tracing::warn!(media_id, "Permalink lookup failed: {}", e);
                String::new()
            }
        }
    }

    fn poll_policy(&self) -> PollPolicy {
        self.poll
    }

    fn name(&self) -> &str {
        "instagram"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GramcastError;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn creds() -> Credentials {
        Credentials::new("tok", "1784")
    }

    fn graph(server: &MockServer, max_attempts: u32) -> InstagramGraph {
        InstagramGraph::new(
            &format!("{}/", server.uri()),
            PollPolicy {
                max_attempts,
                interval: Duration::from_millis(1),
            },
        )
    }

    #[test]
    fn test_extract_id() {
        assert_eq!(
            extract_id(StatusCode::OK, r#"{"id":"178"}"#).unwrap(),
            "178"
        );
        assert_eq!(extract_id(StatusCode::OK, r#"{"id":178}"#).unwrap(), "178");

        let err = extract_id(StatusCode::OK, r#"{"foo":1}"#).unwrap_err();
        assert!(err.contains("foo"));

        let err = extract_id(
            StatusCode::BAD_REQUEST,
            r#"{"error":{"message":"Invalid parameter","code":100}}"#,
        )
        .unwrap_err();
        assert_eq!(err, "HTTP 400: Invalid parameter");
    }

    #[test]
    fn test_base_url_is_normalized() {
        let graph = InstagramGraph::new("https://graph.example/v19.0//", PollPolicy::default());
        assert_eq!(graph.base_url(), "https://graph.example/v19.0");
    }

    #[tokio::test]
    async fn test_create_image_container_sends_carousel_item() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/1784/media"))
            .and(body_string_contains("is_carousel_item=true"))
            .and(body_string_contains("access_token=tok"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "c1"})))
            .expect(1)
            .mount(&server)
            .await;

        let id = graph(&server, 3)
            .create_image_container(&creds(), "http://x/img%20%281%29.jpg")
            .await
            .unwrap();
        assert_eq!(id, "c1");
    }

    #[tokio::test]
    async fn test_create_image_container_failure_is_upload_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/1784/media"))
            .respond_with(
                ResponseTemplate::new(400)
                    .set_body_json(json!({"error": {"message": "Only photo or video can be accepted"}})),
            )
            .mount(&server)
            .await;

        let err = graph(&server, 3)
            .create_image_container(&creds(), "http://x/bad.jpg")
            .await
            .unwrap_err();
        match err {
            GramcastError::Remote(RemoteError::Upload(message)) => {
                assert!(message.contains("http://x/bad.jpg"));
                assert!(message.contains("Only photo or video"));
            }
            other => panic!("Expected upload error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_create_reel_container_sends_reels_type() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/1784/media"))
            .and(body_string_contains("media_type=REELS"))
            .and(body_string_contains("caption=hello"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "r1"})))
            .expect(1)
            .mount(&server)
            .await;

        let id = graph(&server, 3)
            .create_reel_container(&creds(), "http://v/vid.mp4", "hello")
            .await
            .unwrap();
        assert_eq!(id, "r1");
    }

    #[tokio::test]
    async fn test_carousel_container_joins_children() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/1784/media"))
            .and(body_string_contains("media_type=CAROUSEL"))
            .and(body_string_contains("children=a%2Cb"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "car"})))
            .expect(1)
            .mount(&server)
            .await;

        let id = graph(&server, 3)
            .create_carousel_container(&creds(), &["a".to_string(), "b".to_string()], "cap")
            .await
            .unwrap();
        assert_eq!(id, "car");
    }

    #[tokio::test]
    async fn test_carousel_container_without_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;

        let err = graph(&server, 3)
            .create_carousel_container(&creds(), &["a".to_string()], "cap")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            GramcastError::Remote(RemoteError::ContainerCreation(_))
        ));
        assert!(err.to_string().contains("Carousel container creation error"));
    }

    #[tokio::test]
    async fn test_publish_returns_media_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/1784/media_publish"))
            .and(body_string_contains("creation_id=car"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "m1"})))
            .expect(1)
            .mount(&server)
            .await;

        let media_id = graph(&server, 3).publish(&creds(), "car").await.unwrap();
        assert_eq!(media_id, "m1");
    }

    #[tokio::test]
    async fn test_publish_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/1784/media_publish"))
            .respond_with(
                ResponseTemplate::new(400).set_body_json(json!({"error": {"message": "Media ID is not available"}})),
            )
            .mount(&server)
            .await;

        let err = graph(&server, 3).publish(&creds(), "car").await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Graph API error: media_publish error: HTTP 400: Media ID is not available"
        );
    }

    #[tokio::test]
    async fn test_unreachable_server_is_network_error() {
        let graph = InstagramGraph::new("http://127.0.0.1:9", PollPolicy::default());
        let err = graph
            .create_image_container(&creds(), "http://x/a.jpg")
            .await
            .unwrap_err();
        match err {
            GramcastError::Remote(RemoteError::Network(message)) => {
                assert!(message.starts_with("upload http://x/a.jpg: "));
            }
            other => panic!("Expected network error, got {:?}", other),
        }

        let err = graph.publish(&creds(), "car").await.unwrap_err();
        assert!(err.to_string().contains("Network error: publish car: "));
    }

    #[tokio::test]
    async fn test_container_status_prefers_status_code() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/c1"))
            .and(query_param("fields", "status_code,status"))
            .and(query_param("access_token", "tok"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"status_code": "FINISHED", "status": "Finished: done"})),
            )
            .mount(&server)
            .await;

        let status = graph(&server, 3).container_status(&creds(), "c1").await.unwrap();
        assert_eq!(status, ContainerStatus::Finished);
    }

    #[tokio::test]
    async fn test_container_status_falls_back_to_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/c1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "error"})))
            .mount(&server)
            .await;

        let status = graph(&server, 3).container_status(&creds(), "c1").await.unwrap();
        assert_eq!(status, ContainerStatus::Error);
    }

    #[tokio::test]
    async fn test_empty_status_code_falls_back_to_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/c1"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"status_code": "", "status": "Finished: ok"})),
            )
            .mount(&server)
            .await;

        let status = graph(&server, 3).container_status(&creds(), "c1").await.unwrap();
        assert_eq!(status, ContainerStatus::Finished);
    }

    #[tokio::test]
    async fn test_poll_gives_up_after_max_attempts() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/slow"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"status_code": "IN_PROGRESS"})),
            )
            .expect(4)
            .mount(&server)
            .await;

        assert!(!graph(&server, 4).poll_until_ready(&creds(), "slow").await);
    }

    #[tokio::test]
    async fn test_poll_stops_immediately_on_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/broken"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status_code": "ERROR"})))
            .expect(1)
            .mount(&server)
            .await;

        assert!(!graph(&server, 10).poll_until_ready(&creds(), "broken").await);
    }

    #[tokio::test]
    async fn test_poll_retries_failed_checks() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status_code": "FINISHED"})))
            .mount(&server)
            .await;

        assert!(graph(&server, 5).poll_until_ready(&creds(), "flaky").await);
    }

    #[tokio::test]
    async fn test_permalink_lookup() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/m1"))
            .and(query_param("fields", "permalink"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"permalink": "https://www.instagram.com/p/abc/"})),
            )
            .mount(&server)
            .await;

        let link = graph(&server, 3).fetch_permalink(&creds(), "m1").await;
        assert_eq!(link, "https://www.instagram.com/p/abc/");
    }

    #[tokio::test]
    async fn test_permalink_failure_is_empty() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        assert_eq!(graph(&server, 3).fetch_permalink(&creds(), "m1").await, "");
    }
}
