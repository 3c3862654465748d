//! Service layer for Gramcast
//!
//! `GramcastService` is the single entry point for front ends. It wires the
//! account registry, rotation state, caption source, Graph API client and
//! credential lookup together and exposes the caller-facing operations:
//!
//! - `PublishingService`: auto and selective publish runs
//! - `PreviewService`: non-mutating previews of the next post
//! - `EventBus`: run progress events
//!
//! # Example
//!
//! ```no_run
//! use libgramcast::service::GramcastService;
//!
//! # async fn example() -> libgramcast::Result<()> {
//! let service = GramcastService::new()?;
//! let account = service.account(0)?;
//!
//! let preview = service.preview(&account).await?;
//! println!("Next caption: {}", preview.caption);
//!
//! if let Some(outcome) = service.run_auto(&account).await {
//!     println!("Published {}", outcome.media_id);
//! }
//! # Ok(())
//! # }
//! ```

pub mod events;
pub mod preview;
pub mod publishing;

pub use preview::Preview;
pub use publishing::RunKind;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use self::events::EventBus;
use self::preview::PreviewService;
use self::publishing::PublishingService;
use crate::accounts::AccountStore;
use crate::captions::{CaptionSource, HttpCaptionSource};
use crate::config::Config;
use crate::credentials::{CredentialSource, EnvCredentialSource};
use crate::error::Result;
use crate::platforms::{instagram::InstagramGraph, GraphApi};
use crate::selector::ContentSelector;
use crate::state::{FileStateStore, StateStore};
use crate::types::{Account, ContentType, PublishOutcome, RotationState, RunStatus};

/// Run status of one registry entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountStatus {
    pub index: usize,
    pub name: String,
    pub state_prefix: String,
    #[serde(rename = "type")]
    pub content_type: ContentType,
    #[serde(flatten)]
    pub status: RunStatus,
}

/// Main service facade
///
/// Sub-services share the same state store and event bus.
pub struct GramcastService {
    accounts: AccountStore,
    state: Arc<dyn StateStore>,
    publishing: PublishingService,
    preview: PreviewService,
    event_bus: EventBus,
}

impl GramcastService {
    /// Create a service from the configuration at the default location
    ///
    /// # Errors
    ///
    /// Returns an error if an existing configuration file cannot be read or
    /// parsed.
    pub fn new() -> Result<Self> {
        let config = Config::load()?;
        Ok(Self::from_config(&config))
    }

    /// Production wiring: JSON files on disk, captions over HTTP, the real
    /// Graph API and credentials from the process environment
    pub fn from_config(config: &Config) -> Self {
        Self::with_parts(
            AccountStore::from_config(config),
            Arc::new(FileStateStore::new(config.state_dir())),
            Arc::new(HttpCaptionSource::default()),
            Arc::new(InstagramGraph::from_config(&config.graph)),
            Arc::new(EnvCredentialSource),
        )
    }

    /// Wire a service from explicit parts, for tests and embedders
    pub fn with_parts(
        accounts: AccountStore,
        state: Arc<dyn StateStore>,
        captions: Arc<dyn CaptionSource>,
        graph: Arc<dyn GraphApi>,
        credentials: Arc<dyn CredentialSource>,
    ) -> Self {
        let event_bus = EventBus::new(100);
        let selector = ContentSelector::new(Arc::clone(&state), captions);

        tracing::debug!(
            state = state.backend_name(),
            graph = graph.name(),
            credentials = credentials.backend_name(),
            "Service initialized"
        );

        let publishing =
            PublishingService::new(selector.clone(), graph, credentials, event_bus.clone());
        let preview = PreviewService::new(selector);

        Self {
            accounts,
            state,
            publishing,
            preview,
            event_bus,
        }
    }

    pub fn accounts(&self) -> &AccountStore {
        &self.accounts
    }

    pub fn publishing(&self) -> &PublishingService {
        &self.publishing
    }

    pub fn previews(&self) -> &PreviewService {
        &self.preview
    }

    /// Subscribe to run events
    pub fn subscribe(&self) -> events::EventReceiver {
        self.event_bus.subscribe()
    }

    /// Account at registry position `index`
    pub fn account(&self, index: usize) -> Result<Account> {
        self.accounts.get(index)
    }

    /// Publish the next rotation; `None` means the failure was recorded as status
    pub async fn run_auto(&self, account: &Account) -> Option<PublishOutcome> {
        self.publishing.run_auto(account).await
    }

    /// [`run_auto`](Self::run_auto), keeping the failure
    pub async fn try_run_auto(&self, account: &Account) -> Result<PublishOutcome> {
        self.publishing.try_run_auto(account).await
    }

    /// Run every given account as its own task and wait for all of them
    ///
    /// Results come back in input order.
    pub async fn run_accounts(
        &self,
        accounts: Vec<Account>,
    ) -> Vec<(Account, Result<PublishOutcome>)> {
        let handles: Vec<_> = accounts
            .into_iter()
            .map(|account| {
                let publishing = self.publishing.clone();
                tokio::spawn(async move {
                    let result = publishing.try_run_auto(&account).await;
                    (account, result)
                })
            })
            .collect();

        join_all(handles)
            .await
            .into_iter()
            .filter_map(|joined| match joined {
                Ok(pair) => Some(pair),
                Err(e) => {
                    tracing::error!("Account run task panicked: {}", e);
                    None
                }
            })
            .collect()
    }

    pub async fn preview_caption(&self, account: &Account) -> Result<String> {
        self.preview.caption(account).await
    }

    pub fn preview_image_candidates(
        &self,
        account: &Account,
        count: Option<usize>,
    ) -> Result<Vec<String>> {
        self.preview.image_candidates(account, count)
    }

    pub fn preview_video_candidates(&self, account: &Account, k: usize) -> Result<Vec<String>> {
        self.preview.video_candidates(account, k)
    }

    pub async fn preview(&self, account: &Account) -> Result<Preview> {
        self.preview.preview(account).await
    }

    pub async fn publish_selected_carousel(
        &self,
        account: &Account,
        image_urls: &[String],
        caption: Option<&str>,
    ) -> Result<PublishOutcome> {
        self.publishing
            .publish_selected_carousel(account, image_urls, caption)
            .await
    }

    pub async fn publish_selected_reel(
        &self,
        account: &Account,
        video_url: &str,
        caption: Option<&str>,
    ) -> Result<PublishOutcome> {
        self.publishing
            .publish_selected_reel(account, video_url, caption)
            .await
    }

    /// Last run status of an account; `never` if it has not run
    pub fn get_status(&self, account: &Account) -> Result<RunStatus> {
        self.state.load_status(account.state_key())
    }

    /// Status of every account in registry order
    pub fn all_statuses(&self) -> Result<Vec<AccountStatus>> {
        self.accounts
            .load()?
            .into_iter()
            .enumerate()
            .map(|(index, account)| {
                Ok(AccountStatus {
                    index,
                    status: self.get_status(&account)?,
                    name: account.name,
                    state_prefix: account.state_prefix,
                    content_type: account.content_type,
                })
            })
            .collect()
    }

    /// Current rotation cursors and used videos of an account
    pub fn rotation(&self, account: &Account) -> Result<RotationState> {
        self.state.rotation(account.state_key())
    }
}
