//! Account registry
//!
//! Accounts live in one ordered JSON array and are addressed by position.
//! Every save rewrites the whole file; there is no partial update and no
//! concurrency control, the last writer wins.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::error::{ConfigError, GramcastError, Result, StoreError};
use crate::state::write_atomic;
use crate::types::{Account, ContentType};

/// File-backed, index-addressed list of [`Account`]s
#[derive(Debug, Clone)]
pub struct AccountStore {
    path: PathBuf,
}

impl AccountStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.accounts_path())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load every account in order
    ///
    /// A missing registry is an empty one.
    pub fn load(&self) -> Result<Vec<Account>> {
        if !self.path.exists() {
            tracing::debug!("No account registry at {}", self.path.display());
            return Ok(Vec::new());
        }

        let content = std::fs::read_to_string(&self.path).map_err(|source| StoreError::Io {
            path: self.path.display().to_string(),
            source,
        })?;
        let accounts = serde_json::from_str(&content).map_err(StoreError::Serialize)?;
        Ok(accounts)
    }

    /// Account at `index`
    pub fn get(&self, index: usize) -> Result<Account> {
        self.load()?
            .into_iter()
            .nth(index)
            .ok_or(GramcastError::AccountNotFound(index))
    }

    /// Overwrite the registry with `accounts`
    pub fn save(&self, accounts: &[Account]) -> Result<()> {
        warn_on_shared_state_keys(accounts);
        let content = serde_json::to_string_pretty(accounts).map_err(StoreError::Serialize)?;
        write_atomic(&self.path, content.as_bytes())?;
        tracing::debug!(
            "Saved {} account(s) to {}",
            accounts.len(),
            self.path.display()
        );
        Ok(())
    }

    /// Replace the account at `index`, or append when `index` is `None`
    ///
    /// The record is validated and stripped of fields that belong to the
    /// other content type. Returns the account's position.
    pub fn upsert(&self, index: Option<usize>, account: Account) -> Result<usize> {
        let account = Self::prepare(account)?;
        let mut accounts = self.load()?;

        let position = match index {
            Some(i) if i < accounts.len() => {
                accounts[i] = account;
                i
            }
            Some(i) => return Err(GramcastError::AccountNotFound(i)),
            None => {
                accounts.push(account);
                accounts.len() - 1
            }
        };

        self.save(&accounts)?;
        Ok(position)
    }

    /// Check that an account carries everything its content type needs
    pub fn validate_account(account: &Account) -> Result<()> {
        for (field, value) in [
            ("name", &account.name),
            ("access_token_env", &account.access_token_env),
            ("ig_user_id_env", &account.ig_user_id_env),
            ("caption_url", &account.caption_url),
            ("state_prefix", &account.state_prefix),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::MissingField(field.to_string()).into());
            }
        }

        match account.content_type {
            ContentType::Carousel => {
                account.image_base_url()?;
                if account.slides_per_post == Some(0) {
                    return Err(ConfigError::InvalidAccount(
                        "slides_per_post must be a positive integer".to_string(),
                    )
                    .into());
                }
            }
            ContentType::Reel => {
                account.video_base_url()?;
            }
        }

        Ok(())
    }

    fn prepare(mut account: Account) -> Result<Account> {
        Self::validate_account(&account)?;
        match account.content_type {
            ContentType::Carousel => {
                account.slides_per_post = Some(account.slides_per_post.unwrap_or(1));
                account.video_base_url = None;
            }
            ContentType::Reel => {
                account.base_url = None;
                account.slides_per_post = None;
                account.image_naming = None;
            }
        }
        Ok(account)
    }
}

fn warn_on_shared_state_keys(accounts: &[Account]) {
    let mut seen = HashSet::new();
    for account in accounts {
        if !seen.insert(account.state_key()) {
            tracing::warn!(
                "State prefix '{}' is used by more than one account; their rotations will collide",
                account.state_key()
            );
        }
    }
}
