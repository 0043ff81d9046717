//! # Application State
//!
//! State shared across all workers: the storage ports, the collaborator
//! ports, the config read-through cache, and the per-process request
//! tally. Built once in `main` and cloned into workers; nothing here is a
//! process global.

use std::sync::Arc;

use ew_core::error::{AppError, Result};
use ew_core::models::ConfigMap;
use ew_core::traits::{
    ChallengeVerifier, CommentRepo, ConfigRepo, CounterRepo, IdentityProvider, ImportSource,
    MediaStore, Notifier, SpamChecker,
};
use tokio::sync::RwLock;

use crate::rate_limit::RequestTally;

/// Config keys never returned to non-admin callers.
pub const SENSITIVE_KEYS: &[&str] = &["ADMIN_PASS"];

pub struct AppState {
    pub comments: Arc<dyn CommentRepo>,
    pub config_repo: Arc<dyn ConfigRepo>,
    pub counters: Arc<dyn CounterRepo>,
    pub identity: Arc<dyn IdentityProvider>,
    pub media: Arc<dyn MediaStore>,
    pub spam: Arc<dyn SpamChecker>,
    pub notifier: Arc<dyn Notifier>,
    pub challenge: Arc<dyn ChallengeVerifier>,
    pub imports: Vec<Arc<dyn ImportSource>>,
    pub tally: RequestTally,
    config_cache: RwLock<Option<ConfigMap>>,
}

impl AppState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        comments: Arc<dyn CommentRepo>,
        config_repo: Arc<dyn ConfigRepo>,
        counters: Arc<dyn CounterRepo>,
        identity: Arc<dyn IdentityProvider>,
        media: Arc<dyn MediaStore>,
        spam: Arc<dyn SpamChecker>,
        notifier: Arc<dyn Notifier>,
        challenge: Arc<dyn ChallengeVerifier>,
        imports: Vec<Arc<dyn ImportSource>>,
    ) -> Self {
        Self {
            comments,
            config_repo,
            counters,
            identity,
            media,
            spam,
            notifier,
            challenge,
            imports,
            tally: RequestTally::default(),
            config_cache: RwLock::new(None),
        }
    }

    /// The current configuration, loaded from storage on first use and
    /// cached afterwards. Writes go through [`AppState::set_config`] which
    /// refreshes the cache.
    pub async fn config(&self) -> Result<ConfigMap> {
        if let Some(cached) = self.config_cache.read().await.as_ref() {
            return Ok(cached.clone());
        }
        let loaded = self.config_repo.load().await?;
        *self.config_cache.write().await = Some(loaded.clone());
        Ok(loaded)
    }

    /// Merge `patch` into the stored configuration and refresh the cache.
    pub async fn set_config(&self, patch: &ConfigMap) -> Result<ConfigMap> {
        let merged = self.config_repo.merge(patch).await?;
        *self.config_cache.write().await = Some(merged.clone());
        Ok(merged)
    }

    /// Admin status: the hash of the presented token matches the stored
    /// admin-password hash. No password configured means nobody is admin.
    pub async fn is_admin(&self, token: &str) -> Result<bool> {
        let config = self.config().await?;
        let stored = cfg_str(&config, "ADMIN_PASS");
        Ok(!stored.is_empty() && self.identity.token_hash(token) == stored)
    }
}

/// A string config value, empty when absent or not a string.
pub fn cfg_str<'a>(config: &'a ConfigMap, key: &str) -> &'a str {
    config.get(key).and_then(|v| v.as_str()).unwrap_or("")
}

/// A numeric config value; accepts numbers and numeric strings (the admin
/// panel round-trips everything through text inputs).
pub fn cfg_u64(config: &ConfigMap, key: &str) -> Option<u64> {
    match config.get(key) {
        Some(serde_json::Value::Number(n)) => n.as_u64(),
        Some(serde_json::Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    }
}

/// The config map with sensitive keys removed, for non-admin callers.
pub fn public_view(config: &ConfigMap) -> ConfigMap {
    let mut out = config.clone();
    for key in SENSITIVE_KEYS {
        out.remove(*key);
    }
    out
}

/// Admin update allow-list: wire name to column. Anything else in a `set`
/// payload is rejected before a statement is built.
pub fn mutable_column(wire_name: &str) -> Option<&'static str> {
    match wire_name {
        "avatar" => Some("avatar"),
        "body" => Some("body"),
        "link" => Some("link"),
        "mail" => Some("mail"),
        "nick" => Some("nick"),
        "isSpam" => Some("is_spam"),
        "top" => Some("top"),
        _ => None,
    }
}

/// Convenience guard for admin-only operations.
pub fn require_admin(admin: bool) -> Result<()> {
    if admin {
        Ok(())
    } else {
        Err(AppError::Unauthorized)
    }
}
