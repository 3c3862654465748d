//! Scriptable Graph API for testing
//!
//! [`MockGraph`] hands out sequential container ids (`container-1`,
//! `container-2`, ...) and records every call, so tests can drive the
//! publish orchestrator through success and failure paths without network
//! access and then assert on exactly which remote steps happened.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;

use crate::credentials::Credentials;
use crate::error::{RemoteError, Result};
use crate::platforms::{ContainerStatus, GraphApi, PollPolicy};

/// One recorded Graph API call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphCall {
    ImageContainer { image_url: String },
    ReelContainer { video_url: String, caption: String },
    CarouselContainer { children: Vec<String>, caption: String },
    Status { container_id: String },
    Publish { container_id: String },
    Permalink { media_id: String },
}

/// Behavior of a [`MockGraph`]
#[derive(Debug, Clone)]
pub struct MockGraphConfig {
    /// Error returned by image and reel container creation
    pub upload_error: Option<String>,

    /// Error returned by carousel container creation
    pub carousel_error: Option<String>,

    /// Error returned by publish
    pub publish_error: Option<String>,

    /// Status reported for the n-th created container (1-based); `Finished` otherwise
    pub container_statuses: HashMap<usize, ContainerStatus>,

    /// Permalink returned for published media; empty simulates a failed lookup
    pub permalink: String,

    /// Delay before each container creation (simulates upload latency)
    pub delay: Duration,

    pub poll: PollPolicy,
}

impl Default for MockGraphConfig {
    fn default() -> Self {
        Self {
            upload_error: None,
            carousel_error: None,
            publish_error: None,
            container_statuses: HashMap::new(),
            permalink: "https://www.instagram.com/p/mock/".to_string(),
            delay: Duration::from_millis(0),
            poll: PollPolicy {
                max_attempts: 3,
                interval: Duration::from_millis(0),
            },
        }
    }
}

#[derive(Debug, Default)]
struct MockState {
    containers_created: usize,
    media_published: usize,
    calls: Vec<GraphCall>,
}

/// Mock Graph API
///
/// Clones share the call log, so a test can keep one handle while the
/// orchestrator owns another.
#[derive(Debug, Clone)]
pub struct MockGraph {
    config: MockGraphConfig,
    state: Arc<Mutex<MockState>>,
}

impl MockGraph {
    pub fn new(config: MockGraphConfig) -> Self {
        Self {
            config,
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    /// A Graph API where every step succeeds
    pub fn success() -> Self {
        Self::new(MockGraphConfig::default())
    }

    /// Container creation (image or reel) always fails
    pub fn upload_failure(error: &str) -> Self {
        Self::new(MockGraphConfig {
            upload_error: Some(error.to_string()),
            ..Default::default()
        })
    }

    /// Publishing always fails
    pub fn publish_failure(error: &str) -> Self {
        Self::new(MockGraphConfig {
            publish_error: Some(error.to_string()),
            ..Default::default()
        })
    }

    /// The n-th created container (1-based) stays in progress forever
    pub fn never_ready(container_number: usize) -> Self {
        Self::new(MockGraphConfig::default()).with_status(container_number, ContainerStatus::InProgress)
    }

    /// Container creation waits `delay` before answering
    pub fn with_delay(delay: Duration) -> Self {
        Self::new(MockGraphConfig {
            delay,
            ..Default::default()
        })
    }

    /// Report `status` for the n-th created container (1-based)
    pub fn with_status(mut self, container_number: usize, status: ContainerStatus) -> Self {
        self.config.container_statuses.insert(container_number, status);
        self
    }

    pub fn with_permalink(mut self, permalink: &str) -> Self {
        self.config.permalink = permalink.to_string();
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn record(&self, call: GraphCall) {
        self.lock().calls.push(call);
    }

    fn next_container_id(&self) -> String {
        let mut state = self.lock();
        state.containers_created += 1;
        format!("container-{}", state.containers_created)
    }

    /// Every call made so far, in order
    pub fn calls(&self) -> Vec<GraphCall> {
        self.lock().calls.clone()
    }

    /// Number of recorded calls matching `predicate`
    pub fn count(&self, predicate: impl Fn(&GraphCall) -> bool) -> usize {
        self.lock().calls.iter().filter(|c| predicate(c)).count()
    }

    pub fn image_container_calls(&self) -> usize {
        self.count(|c| matches!(c, GraphCall::ImageContainer { .. }))
    }

    pub fn carousel_container_calls(&self) -> usize {
        self.count(|c| matches!(c, GraphCall::CarouselContainer { .. }))
    }

    pub fn publish_calls(&self) -> usize {
        self.count(|c| matches!(c, GraphCall::Publish { .. }))
    }

    /// Total number of remote calls of any kind
    pub fn total_calls(&self) -> usize {
        self.lock().calls.len()
    }
}

#[async_trait]
impl GraphApi for MockGraph {
    async fn create_image_container(&self, _creds: &Credentials, image_url: &str) -> Result<String> {
        if !self.config.delay.is_zero() {
            sleep(self.config.delay).await;
        }
        self.record(GraphCall::ImageContainer {
            image_url: image_url.to_string(),
        });

        if let Some(error) = &self.config.upload_error {
            return Err(RemoteError::Upload(format!("{}: {}", image_url, error)).into());
        }
        Ok(self.next_container_id())
    }

    async fn create_reel_container(
        &self,
        _creds: &Credentials,
        video_url: &str,
        caption: &str,
    ) -> Result<String> {
        if !self.config.delay.is_zero() {
            sleep(self.config.delay).await;
        }
        self.record(GraphCall::ReelContainer {
            video_url: video_url.to_string(),
            caption: caption.to_string(),
        });

        if let Some(error) = &self.config.upload_error {
            return Err(RemoteError::Upload(format!("{}: {}", video_url, error)).into());
        }
        Ok(self.next_container_id())
    }

    async fn create_carousel_container(
        &self,
        _creds: &Credentials,
        child_ids: &[String],
        caption: &str,
    ) -> Result<String> {
        self.record(GraphCall::CarouselContainer {
            children: child_ids.to_vec(),
            caption: caption.to_string(),
        });

        if let Some(error) = &self.config.carousel_error {
            return Err(RemoteError::ContainerCreation(error.clone()).into());
        }
        Ok(self.next_container_id())
    }

    async fn container_status(
        &self,
        _creds: &Credentials,
        container_id: &str,
    ) -> Result<ContainerStatus> {
        self.record(GraphCall::Status {
            container_id: container_id.to_string(),
        });

        let number = container_id
            .strip_prefix("container-")
            .and_then(|n| n.parse::<usize>().ok())
            .unwrap_or(0);
        Ok(self
            .config
            .container_statuses
            .get(&number)
            .copied()
            .unwrap_or(ContainerStatus::Finished))
    }

    async fn publish(&self, _creds: &Credentials, container_id: &str) -> Result<String> {
        self.record(GraphCall::Publish {
            container_id: container_id.to_string(),
        });

        if let Some(error) = &self.config.publish_error {
            return Err(RemoteError::Publish(error.clone()).into());
        }
        let mut state = self.lock();
        state.media_published += 1;
        Ok(format!("media-{}", state.media_published))
    }

    async fn fetch_permalink(&self, _creds: &Credentials, media_id: &str) -> String {
        self.record(GraphCall::Permalink {
            media_id: media_id.to_string(),
        });
        self.config.permalink.clone()
    }

    fn poll_policy(&self) -> PollPolicy {
        self.config.poll
    }

    fn name(&self) -> &str {
        "mock"
    }
}
