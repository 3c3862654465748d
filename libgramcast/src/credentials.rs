//! Credential resolution
//!
//! Accounts never store secrets. They name the environment variables that
//! hold the Graph API access token and the Instagram user id, and a
//! [`CredentialSource`] turns those names into [`Credentials`] right before a
//! remote call.

use secrecy::{ExposeSecret, SecretString};
use std::collections::HashMap;

use crate::error::{ConfigError, Result};
use crate::types::Account;

/// Resolved `(access_token, user_id)` pair
///
/// The token is zeroed on drop and redacted from `Debug` output.
pub struct Credentials {
    access_token: SecretString,
    user_id: String,
}

impl Credentials {
    pub fn new(access_token: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            access_token: SecretString::from(access_token.into()),
            user_id: user_id.into(),
        }
    }

    pub fn access_token(&self) -> &str {
        self.access_token.expose_secret()
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("access_token", &"[REDACTED]")
            .field("user_id", &self.user_id)
            .finish()
    }
}

/// Lookup of named credential values
pub trait CredentialSource: Send + Sync {
    /// Value stored under `name`, if any
    fn lookup(&self, name: &str) -> Option<String>;

    /// Backend identifier for logging
    fn backend_name(&self) -> &str;

    /// Resolve the credentials an account refers to
    ///
    /// # Errors
    ///
    /// - `ConfigError::MissingField` if the account does not name both variables
    /// - `ConfigError::MissingCredential` if a named variable is unset or empty
    fn resolve(&self, account: &Account) -> Result<Credentials> {
        let token_var = account.access_token_env.trim();
        let user_var = account.ig_user_id_env.trim();
        if token_var.is_empty() || user_var.is_empty() {
            return Err(ConfigError::MissingField(
                "access_token_env or ig_user_id_env".to_string(),
            )
            .into());
        }

        let fetch = |var: &str| {
            self.lookup(var)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| ConfigError::MissingCredential(var.to_string()))
        };

        let token = fetch(token_var)?;
        let user_id = fetch(user_var)?;
        Ok(Credentials::new(token, user_id))
    }
}

/// Process environment (after any `.env` file was loaded by the binary)
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvCredentialSource;

impl CredentialSource for EnvCredentialSource {
    fn lookup(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }

    fn backend_name(&self) -> &str {
        "env"
    }
}

/// Fixed set of values, for tests and embedding callers
#[derive(Debug, Default, Clone)]
pub struct StaticCredentialSource {
    values: HashMap<String, String>,
}

impl StaticCredentialSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, value: &str) -> Self {
        self.values.insert(name.to_string(), value.to_string());
        self
    }
}

impl CredentialSource for StaticCredentialSource {
    fn lookup(&self, name: &str) -> Option<String> {
        self.values.get(name).cloned()
    }

    fn backend_name(&self) -> &str {
        "static"
    }
}
