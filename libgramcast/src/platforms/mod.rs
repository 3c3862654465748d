//! Graph API abstraction and implementations
//!
//! Publishing on Instagram is a multi-step protocol: create a media
//! container, wait until the platform has processed it, publish it, then
//! look up the permalink of the resulting media. [`GraphApi`] exposes each
//! step separately so the orchestrator can drive them and record progress.
//!
//! # Examples
//!
//! ```no_run
//! use libgramcast::credentials::Credentials;
//! use libgramcast::platforms::{instagram::InstagramGraph, GraphApi, PollPolicy};
//!
//! # async fn example() -> libgramcast::Result<()> {
//! let graph = InstagramGraph::new("https://graph.facebook.com/v19.0", PollPolicy::default());
//! let creds = Credentials::new("token", "17841400000000000");
//!
//! let container = graph
//!     .create_image_container(&creds, "https://cdn.example/img%20%281%29.jpg")
//!     .await?;
//! if graph.poll_until_ready(&creds, &container).await {
//!     println!("{} is ready", container);
//! }
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use std::time::Duration;

use crate::config::GraphConfig;
use crate::credentials::Credentials;
use crate::error::Result;

pub mod instagram;

// Available outside tests so integration tests and embedders can script runs
pub mod mock;

/// Processing state of a media container
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerStatus {
    Finished,
    Error,
    Expired,
    InProgress,
    Unknown,
}

impl ContainerStatus {
    /// Interpret a `status_code` / `status` value, case-insensitively
    ///
    /// The `status` field may carry a trailing explanation
    /// (`"Error: Media upload failed"`), so only the leading word counts.
    pub fn from_remote(value: &str) -> Self {
        let code = value
            .trim()
            .split(|c: char| c == ':' || c.is_whitespace())
            .next()
            .unwrap_or("")
            .to_uppercase();

        match code.as_str() {
            "FINISHED" | "PUBLISHED" => ContainerStatus::Finished,
            "ERROR" => ContainerStatus::Error,
            "EXPIRED" => ContainerStatus::Expired,
            "IN_PROGRESS" => ContainerStatus::InProgress,
            _ => ContainerStatus::Unknown,
        }
    }

    /// Whether polling can stop
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ContainerStatus::Finished | ContainerStatus::Error | ContainerStatus::Expired
        )
    }
}

/// Bound on readiness polling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub max_attempts: u32,
    pub interval: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 20,
            interval: Duration::from_secs(2),
        }
    }
}

impl From<&GraphConfig> for PollPolicy {
    fn from(config: &GraphConfig) -> Self {
        Self {
            max_attempts: config.poll_max_attempts,
            interval: config.poll_interval(),
        }
    }
}

/// Instagram Graph API operations used for publishing
///
/// Every call takes the resolved credentials of the account it acts for, so a
/// single client serves all accounts.
#[async_trait]
pub trait GraphApi: Send + Sync {
    /// Create a carousel item container for an image
    ///
    /// # Errors
    ///
    /// `RemoteError::Upload` when the request fails or no id comes back.
    async fn create_image_container(&self, creds: &Credentials, image_url: &str) -> Result<String>;

    /// Create a reel container for a video
    ///
    /// # Errors
    ///
    /// `RemoteError::Upload` when the request fails or no id comes back.
    async fn create_reel_container(
        &self,
        creds: &Credentials,
        video_url: &str,
        caption: &str,
    ) -> Result<String>;

    /// Create the carousel container grouping already created children
    ///
    /// # Errors
    ///
    /// `RemoteError::ContainerCreation` when no id comes back.
    async fn create_carousel_container(
        &self,
        creds: &Credentials,
        child_ids: &[String],
        caption: &str,
    ) -> Result<String>;

    /// Current processing state of a container
    async fn container_status(&self, creds: &Credentials, container_id: &str)
        -> Result<ContainerStatus>;

    /// Publish a ready container, returning the media id
    ///
    /// # Errors
    ///
    /// `RemoteError::Publish` when no media id comes back.
    async fn publish(&self, creds: &Credentials, container_id: &str) -> Result<String>;

    /// Permalink of published media, or an empty string if it cannot be read
    async fn fetch_permalink(&self, creds: &Credentials, media_id: &str) -> String;

    /// Readiness polling bound used by [`poll_until_ready`](Self::poll_until_ready)
    fn poll_policy(&self) -> PollPolicy;

    /// Short identifier for logging
    fn name(&self) -> &str;

    /// Wait until a container is ready to publish
    ///
    /// Returns `true` once the container reports FINISHED and `false` as soon
    /// as it reports ERROR or EXPIRED, or after `max_attempts` status checks
    /// without a terminal answer. Failed status checks count as attempts and
    /// are retried.
    async fn poll_until_ready(&self, creds: &Credentials, container_id: &str) -> bool {
        let policy = self.poll_policy();

        for attempt in 1..=policy.max_attempts {
            match self.container_status(creds, container_id).await {
                Ok(ContainerStatus::Finished) => {
                    tracing::debug!(container_id, attempt, "Container ready");
                    return true;
                }
                Ok(status @ (ContainerStatus::Error | ContainerStatus::Expired)) => {
                    tracing::warn!(container_id, ?status, "Container will not become ready");
                    return false;
                }
                Ok(status) => {
                    tracing::debug!(container_id, attempt, ?status, "Container not ready yet");
                }
                Err(e) => {
                    tracing::warn!(container_id, attempt, "Status check failed: {}", e);
                }
            }

            if attempt < policy.max_attempts {
                tokio::time::sleep(policy.interval).await;
            }
        }

        tracing::warn!(
            container_id,
            attempts = policy.max_attempts,
            "Container not ready within poll bound"
        );
        false
    }
}
