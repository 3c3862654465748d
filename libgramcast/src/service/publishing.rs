//! Publish orchestration
//!
//! A run takes one account from `running` to `success` or `error`, driving
//! the content selector and the Graph API in between. This is the only place
//! where failures are caught: whatever goes wrong inside a run ends up as the
//! account's persisted error status, and cursors committed before the failure
//! stay committed.
//!
//! Runs are single-flight per state key within the process. A second run for
//! an account whose run is still in flight is rejected with
//! [`GramcastError::RunInProgress`] and leaves that account's state alone.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tracing::{error, info};

use super::events::{Event, EventBus};
use crate::credentials::{CredentialSource, Credentials};
use crate::error::{GramcastError, Result};
use crate::platforms::GraphApi;
use crate::selector::ContentSelector;
use crate::types::{Account, ContentType, PublishOutcome, RunState, RunStatus};

/// What a run publishes and how it was triggered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunKind {
    Carousel,
    Reel,
    ManualCarousel,
    ManualReel,
}

impl RunKind {
    pub fn label(&self) -> &'static str {
        match self {
            RunKind::Carousel => "Carousel",
            RunKind::Reel => "Reel",
            RunKind::ManualCarousel => "Carousel (manual)",
            RunKind::ManualReel => "Reel (manual)",
        }
    }

    pub fn mode(&self) -> &'static str {
        match self {
            RunKind::Carousel | RunKind::Reel => "auto",
            RunKind::ManualCarousel | RunKind::ManualReel => "manual",
        }
    }
}

/// Status message recorded after a successful run
pub fn success_message(kind: RunKind, outcome: &PublishOutcome) -> String {
    let permalink = if outcome.permalink.is_empty() {
        "(not available)"
    } else {
        outcome.permalink.as_str()
    };
    format!(
        "{} published\nMedia ID: {}\nPermalink: {}",
        kind.label(),
        outcome.media_id,
        permalink
    )
}

type InFlight = Arc<Mutex<HashSet<String>>>;

/// Holds an account's in-flight slot until dropped
struct RunGuard {
    key: String,
    in_flight: InFlight,
}

impl RunGuard {
    fn acquire(in_flight: &InFlight, key: &str) -> Result<Self> {
        let mut keys = in_flight.lock().unwrap_or_else(|e| e.into_inner());
        if !keys.insert(key.to_string()) {
            return Err(GramcastError::RunInProgress(key.to_string()));
        }
        Ok(Self {
            key: key.to_string(),
            in_flight: Arc::clone(in_flight),
        })
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.in_flight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.key);
    }
}

/// Publish orchestrator
///
/// Cheap to clone; clones share the in-flight set, so concurrent tasks
/// spawned from one service still exclude each other.
#[derive(Clone)]
pub struct PublishingService {
    selector: ContentSelector,
    graph: Arc<dyn GraphApi>,
    credentials: Arc<dyn CredentialSource>,
    event_bus: EventBus,
    in_flight: InFlight,
}

impl PublishingService {
    pub fn new(
        selector: ContentSelector,
        graph: Arc<dyn GraphApi>,
        credentials: Arc<dyn CredentialSource>,
        event_bus: EventBus,
    ) -> Self {
        Self {
            selector,
            graph,
            credentials,
            event_bus,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn selector(&self) -> &ContentSelector {
        &self.selector
    }

    /// Whether a run for this account is currently in flight
    pub fn is_running(&self, account: &Account) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(account.state_key())
    }

    /// Publish the next rotation for an account
    ///
    /// Returns `None` on any failure; the reason is recorded in the account's
    /// run status.
    pub async fn run_auto(&self, account: &Account) -> Option<PublishOutcome> {
        self.try_run_auto(account).await.ok()
    }

    /// [`run_auto`](Self::run_auto), keeping the failure
    pub async fn try_run_auto(&self, account: &Account) -> Result<PublishOutcome> {
        let kind = match account.content_type {
            ContentType::Carousel => RunKind::Carousel,
            ContentType::Reel => RunKind::Reel,
        };

        let _guard = self.begin(account, kind)?;
        let result = match kind {
            RunKind::Carousel => self.auto_carousel(account).await,
            _ => self.auto_reel(account).await,
        };
        self.finish(account, kind, result)
    }

    /// Publish hand-picked images as a carousel
    ///
    /// `caption` replaces the rotating caption when non-empty. On success the
    /// image cursor advances by the number of selected images.
    ///
    /// # Errors
    ///
    /// - `NoSelection` if `image_urls` is empty (nothing is recorded)
    /// - `InvalidInput` if the account does not publish carousels
    /// - any run failure, after it was recorded as the account's status
    pub async fn publish_selected_carousel(
        &self,
        account: &Account,
        image_urls: &[String],
        caption: Option<&str>,
    ) -> Result<PublishOutcome> {
        if image_urls.is_empty() {
            return Err(GramcastError::NoSelection);
        }
        if account.content_type != ContentType::Carousel {
            return Err(GramcastError::InvalidInput(format!(
                "account '{}' publishes {}s, not carousels",
                account.display_name(),
                account.content_type
            )));
        }

        let kind = RunKind::ManualCarousel;
        let _guard = self.begin(account, kind)?;
        let result = self.manual_carousel(account, image_urls, caption).await;
        self.finish(account, kind, result)
    }

    /// Publish a hand-picked video as a reel
    ///
    /// `caption` replaces the rotating caption when non-empty. On success the
    /// video is marked used.
    ///
    /// # Errors
    ///
    /// - `InvalidInput` if `video_url` is empty or the account does not publish reels
    /// - any run failure, after it was recorded as the account's status
    pub async fn publish_selected_reel(
        &self,
        account: &Account,
        video_url: &str,
        caption: Option<&str>,
    ) -> Result<PublishOutcome> {
        if video_url.trim().is_empty() {
            return Err(GramcastError::InvalidInput("Missing video".to_string()));
        }
        if account.content_type != ContentType::Reel {
            return Err(GramcastError::InvalidInput(format!(
                "account '{}' publishes {}s, not reels",
                account.display_name(),
                account.content_type
            )));
        }

        let kind = RunKind::ManualReel;
        let _guard = self.begin(account, kind)?;
        let result = self.manual_reel(account, video_url, caption).await;
        self.finish(account, kind, result)
    }

    fn begin(&self, account: &Account, kind: RunKind) -> Result<RunGuard> {
        let guard = RunGuard::acquire(&self.in_flight, account.state_key())?;

        self.selector
            .state()
            .save_status(account.state_key(), &RunStatus::now(RunState::Running, ""))?;

        info!(
            account = account.display_name(),
            mode = kind.mode(),
            "{} run started",
            kind.label()
        );
        self.event_bus.emit(Event::RunStarted {
            account: account.display_name().to_string(),
            state_key: account.state_key().to_string(),
            mode: kind.mode().to_string(),
        });

        Ok(guard)
    }

    fn finish(
        &self,
        account: &Account,
        kind: RunKind,
        result: Result<PublishOutcome>,
    ) -> Result<PublishOutcome> {
        let key = account.state_key();
        let status = match &result {
            Ok(outcome) => {
                info!(
                    account = account.display_name(),
                    media_id = %outcome.media_id,
                    permalink = %outcome.permalink,
                    "{} published",
                    kind.label()
                );
                self.event_bus.emit(Event::RunSucceeded {
                    state_key: key.to_string(),
                    media_id: outcome.media_id.clone(),
                    permalink: outcome.permalink.clone(),
                });
                RunStatus::now(RunState::Success, success_message(kind, outcome))
            }
            Err(e) => {
                error!(account = account.display_name(), "{} run failed: {}", kind.label(), e);
                self.event_bus.emit(Event::RunFailed {
                    state_key: key.to_string(),
                    error: e.to_string(),
                });
                RunStatus::now(RunState::Error, e.to_string())
            }
        };

        if let Err(e) = self.selector.state().save_status(key, &status) {
            error!(
                account = account.display_name(),
                "Failed to record {} status: {}",
                status.status,
                e
            );
        }
        result
    }

    /// Create a container for one image and wait for it to be ready
    async fn ready_image(
        &self,
        account: &Account,
        creds: &Credentials,
        image_url: &str,
    ) -> Result<String> {
        let container_id = self.graph.create_image_container(creds, image_url).await?;
        self.container_created(account, &container_id, image_url);
        self.await_ready(account, creds, &container_id).await?;
        Ok(container_id)
    }

    async fn ready_reel(
        &self,
        account: &Account,
        creds: &Credentials,
        video_url: &str,
        caption: &str,
    ) -> Result<String> {
        let container_id = self
            .graph
            .create_reel_container(creds, video_url, caption)
            .await?;
        self.container_created(account, &container_id, video_url);
        self.await_ready(account, creds, &container_id).await?;
        Ok(container_id)
    }

    fn container_created(&self, account: &Account, container_id: &str, media_url: &str) {
        self.event_bus.emit(Event::ContainerCreated {
            state_key: account.state_key().to_string(),
            container_id: container_id.to_string(),
            media_url: media_url.to_string(),
        });
    }

    async fn await_ready(
        &self,
        account: &Account,
        creds: &Credentials,
        container_id: &str,
    ) -> Result<()> {
        if !self.graph.poll_until_ready(creds, container_id).await {
            return Err(GramcastError::ReadinessTimeout(container_id.to_string()));
        }
        self.event_bus.emit(Event::ContainerReady {
            state_key: account.state_key().to_string(),
            container_id: container_id.to_string(),
        });
        Ok(())
    }

    async fn carousel_from_children(
        &self,
        account: &Account,
        creds: &Credentials,
        children: &[String],
        caption: &str,
    ) -> Result<PublishOutcome> {
        let creation_id = self
            .graph
            .create_carousel_container(creds, children, caption)
            .await?;
        self.container_created(account, &creation_id, "");
        self.publish_container(creds, &creation_id).await
    }

    async fn publish_container(
        &self,
        creds: &Credentials,
        creation_id: &str,
    ) -> Result<PublishOutcome> {
        let media_id = self.graph.publish(creds, creation_id).await?;
        let permalink = self.graph.fetch_permalink(creds, &media_id).await;
        Ok(PublishOutcome { media_id, permalink })
    }

    async fn caption_or_next(&self, account: &Account, caption: Option<&str>) -> Result<String> {
        match caption.filter(|c| !c.is_empty()) {
            Some(caption) => Ok(caption.to_string()),
            None => self.selector.commit_caption(account).await,
        }
    }

    async fn auto_carousel(&self, account: &Account) -> Result<PublishOutcome> {
        let creds = self.credentials.resolve(account)?;
        let image_urls = self.selector.commit_slides(account)?;

        let mut children = Vec::with_capacity(image_urls.len());
        for image_url in &image_urls {
            children.push(self.ready_image(account, &creds, image_url).await?);
        }

        let caption = self.selector.commit_caption(account).await?;
        self.carousel_from_children(account, &creds, &children, &caption)
            .await
    }

    async fn auto_reel(&self, account: &Account) -> Result<PublishOutcome> {
        let creds = self.credentials.resolve(account)?;
        let video_url = self
            .selector
            .pick_random_video(account)?
            .ok_or_else(|| GramcastError::NoContentAvailable("No videos left".to_string()))?;

        let caption = self.selector.commit_caption(account).await?;
        let creation_id = self
            .ready_reel(account, &creds, &video_url, &caption)
            .await?;
        self.publish_container(&creds, &creation_id).await
    }

    async fn manual_carousel(
        &self,
        account: &Account,
        image_urls: &[String],
        caption: Option<&str>,
    ) -> Result<PublishOutcome> {
        let creds = self.credentials.resolve(account)?;

        let mut children = Vec::with_capacity(image_urls.len());
        for image_url in image_urls {
            children.push(self.ready_image(account, &creds, image_url).await?);
        }

        let caption = self.caption_or_next(account, caption).await?;
        let outcome = self
            .carousel_from_children(account, &creds, &children, &caption)
            .await?;
        self.selector.advance_images(account, image_urls.len())?;
        Ok(outcome)
    }

    async fn manual_reel(
        &self,
        account: &Account,
        video_url: &str,
        caption: Option<&str>,
    ) -> Result<PublishOutcome> {
        let creds = self.credentials.resolve(account)?;
        let caption = self.caption_or_next(account, caption).await?;

        let creation_id = self
            .ready_reel(account, &creds, video_url, &caption)
            .await?;
        let outcome = self.publish_container(&creds, &creation_id).await?;
        self.selector.mark_video_used(account, video_url)?;
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::captions::StaticCaptionSource;
    use crate::credentials::StaticCredentialSource;
    use crate::platforms::mock::{GraphCall, MockGraph};
    use crate::state::{Cursor, MemoryStateStore, StateStore};
    use crate::types::ImageNaming;
    use std::time::Duration;

    const CAPTIONS: &str = "http://captions/list.txt";

    fn service(graph: MockGraph) -> (PublishingService, Arc<MemoryStateStore>) {
        let state = Arc::new(MemoryStateStore::new());
        let captions = Arc::new(StaticCaptionSource::new().with_list(CAPTIONS, &["a", "b"]));
        let credentials = Arc::new(
            StaticCredentialSource::new()
                .with("TOKEN", "tok")
                .with("USER", "1784"),
        );
        let service = PublishingService::new(
            ContentSelector::new(state.clone(), captions),
            Arc::new(graph),
            credentials,
            EventBus::new(32),
        );
        (service, state)
    }

    fn carousel(slides: u32) -> Account {
        Account::carousel("Cars", "cars", "http://x/", slides)
            .with_caption_url(CAPTIONS)
            .with_credentials("TOKEN", "USER")
            .with_naming(ImageNaming::Img)
    }

    fn reel() -> Account {
        Account::reel("Clips", "clips", "http://v/")
            .with_caption_url(CAPTIONS)
            .with_credentials("TOKEN", "USER")
    }

    #[test]
    fn test_success_message_format() {
        let outcome = PublishOutcome {
            media_id: "m1".to_string(),
            permalink: "https://ig/p/1".to_string(),
        };
        assert_eq!(
            success_message(RunKind::Carousel, &outcome),
            "Carousel published\nMedia ID: m1\nPermalink: https://ig/p/1"
        );

        let outcome = PublishOutcome {
            media_id: "m2".to_string(),
            permalink: String::new(),
        };
        assert_eq!(
            success_message(RunKind::ManualReel, &outcome),
            "Reel (manual) published\nMedia ID: m2\nPermalink: (not available)"
        );
    }

    #[tokio::test]
    async fn test_auto_carousel_success() {
        let graph = MockGraph::success();
        let (service, state) = service(graph.clone());
        let account = carousel(2);

        let outcome = service.run_auto(&account).await.unwrap();
        assert_eq!(outcome.media_id, "media-1");

        assert_eq!(
            graph.calls()[0],
            GraphCall::ImageContainer {
                image_url: "http://x/img%20%281%29.jpg".to_string()
            }
        );
        assert!(graph.calls().contains(&GraphCall::CarouselContainer {
            children: vec!["container-1".to_string(), "container-2".to_string()],
            caption: "a".to_string(),
        }));

        let status = state.load_status("cars").unwrap();
        assert_eq!(status.status, RunState::Success);
        assert!(status.message.starts_with("Carousel published\nMedia ID: media-1"));
        assert!(status.last_run.is_some());
        assert!(!service.is_running(&account));
    }

    #[tokio::test]
    async fn test_missing_credentials_are_recorded() {
        let (service, state) = service(MockGraph::success());
        let account = carousel(1).with_credentials("NOPE", "USER");

        assert!(service.run_auto(&account).await.is_none());

        let status = state.load_status("cars").unwrap();
        assert_eq!(status.status, RunState::Error);
        assert!(status.message.contains("Missing environment var NOPE"));
        assert_eq!(state.load_cursor("cars", Cursor::Image).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_run_on_same_account_is_rejected() {
        let (service, state) = service(MockGraph::with_delay(Duration::from_millis(200)));
        let account = carousel(1);

        let first = {
            let service = service.clone();
            let account = account.clone();
            tokio::spawn(async move { service.try_run_auto(&account).await })
        };

        // Wait for the first run to mark the account running
        for _ in 0..100 {
            if service.is_running(&account) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        match service.try_run_auto(&account).await {
            Err(GramcastError::RunInProgress(key)) => assert_eq!(key, "cars"),
            other => panic!("Expected RunInProgress, got {:?}", other),
        }
        assert_eq!(state.load_status("cars").unwrap().status, RunState::Running);
        assert_eq!(state.load_cursor("cars", Cursor::Image).unwrap(), 1);

        assert!(first.await.unwrap().is_ok());
        assert!(!service.is_running(&account));
    }

    #[tokio::test]
    async fn test_different_accounts_run_concurrently() {
        let (service, _state) = service(MockGraph::with_delay(Duration::from_millis(50)));
        let a = carousel(1);
        let b = reel();

        let (ra, rb) = tokio::join!(service.try_run_auto(&a), service.try_run_auto(&b));
        assert!(ra.is_ok());
        assert!(rb.is_ok());
    }

    #[tokio::test]
    async fn test_selective_flows_reject_wrong_content_type() {
        let (service, state) = service(MockGraph::success());

        let err = service
            .publish_selected_carousel(&reel(), &["http://x/a.jpg".to_string()], None)
            .await
            .unwrap_err();
        assert!(matches!(err, GramcastError::InvalidInput(_)));

        let err = service
            .publish_selected_reel(&carousel(1), "http://v/vid.mp4", None)
            .await
            .unwrap_err();
        assert!(matches!(err, GramcastError::InvalidInput(_)));

        let err = service
            .publish_selected_reel(&reel(), "  ", None)
            .await
            .unwrap_err();
        assert!(matches!(err, GramcastError::InvalidInput(_)));

        assert_eq!(state.load_status("clips").unwrap().status, RunState::Never);
    }

    #[tokio::test]
    async fn test_events_follow_the_run() {
        let state = Arc::new(MemoryStateStore::new());
        let captions = Arc::new(StaticCaptionSource::new().with_list(CAPTIONS, &["a"]));
        let credentials = Arc::new(
            StaticCredentialSource::new()
                .with("TOKEN", "tok")
                .with("USER", "1784"),
        );
        let bus = EventBus::new(32);
        let mut events = bus.subscribe();
        let service = PublishingService::new(
            ContentSelector::new(state, captions),
            Arc::new(MockGraph::success()),
            credentials,
            bus,
        );

        service.run_auto(&reel()).await.unwrap();

        let mut seen = Vec::new();
        while let Ok(event) = events.try_recv() {
            seen.push(event);
        }
        assert!(matches!(seen.first(), Some(Event::RunStarted { mode, .. }) if mode == "auto"));
        assert!(seen
            .iter()
            .any(|e| matches!(e, Event::ContainerReady { container_id, .. } if container_id == "container-1")));
        assert!(matches!(seen.last(), Some(Event::RunSucceeded { media_id, .. }) if media_id == "media-1"));
    }
}
