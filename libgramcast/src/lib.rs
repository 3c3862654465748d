//! Gramcast - rotation-based Instagram carousel and reel publishing
//!
//! This library keeps per-account rotation state (caption line, image index,
//! used videos) and drives the Instagram Graph API publish workflow, either
//! fully automatically or from a hand-picked selection.

pub mod accounts;
pub mod captions;
pub mod config;
pub mod credentials;
pub mod error;
pub mod logging;
pub mod platforms;
pub mod selector;
pub mod service;
pub mod state;
pub mod types;

// Re-export commonly used types
pub use accounts::AccountStore;
pub use config::Config;
pub use error::{GramcastError, Result};
pub use service::GramcastService;
pub use types::{Account, ContentType, ImageNaming, PublishOutcome, RunState, RunStatus};
