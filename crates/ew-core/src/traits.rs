//! # Core Traits (Ports)
//!
//! Any plugin must implement these traits to be used by the binary. The
//! storage ports own all persistence; the collaborator ports (spam,
//! notification, challenge, import, media) are narrow call contracts whose
//! internals live outside the core.

use async_trait::async_trait;

use crate::models::{Comment, CommentSeed, ConfigMap, SpamFilter, Viewer};

/// Data persistence contract for the comment table.
#[async_trait]
pub trait CommentRepo: Send + Sync {
    /// Non-pinned top-level comments under `url` with `created < before`,
    /// newest first, visibility applied. `fetch` is `page size + 1` so the
    /// caller can derive the continuation flag without a count query.
    async fn page_top_level(
        &self,
        url: &str,
        before: i64,
        fetch: i64,
        viewer: &Viewer,
    ) -> anyhow::Result<Vec<Comment>>;

    /// Pinned top-level comments under `url`, newest first, capped at
    /// `ceiling` as a safety bound.
    async fn pinned(&self, url: &str, viewer: &Viewer, ceiling: i64) -> anyhow::Result<Vec<Comment>>;

    /// All replies whose thread root is in `roots`, oldest first, in one
    /// batched membership query. Callers must not pass an empty slice.
    async fn replies_for(&self, roots: &[String], viewer: &Viewer) -> anyhow::Result<Vec<Comment>>;

    /// Total top-level comments under `url` matching the visibility
    /// predicate (replies excluded).
    async fn count_top_level(&self, url: &str, viewer: &Viewer) -> anyhow::Result<i64>;

    async fn find(&self, id: &str) -> anyhow::Result<Option<Comment>>;
    async fn insert(&self, comment: &Comment) -> anyhow::Result<()>;
    async fn delete(&self, id: &str) -> anyhow::Result<()>;

    /// Admin field update. `fields` maps column names (already validated
    /// against the allow-list) to new values; the implementation binds them
    /// in one deterministic order and stamps `updated`.
    async fn update_fields(
        &self,
        id: &str,
        fields: &[(String, serde_json::Value)],
        updated: i64,
    ) -> anyhow::Result<()>;

    /// Offset-paginated admin search: moderation filter plus free-text
    /// keyword over author name, mail, link, ip, body, url and href.
    /// Returns the matching total alongside the page.
    async fn admin_page(
        &self,
        filter: SpamFilter,
        keyword: &str,
        per: i64,
        page: i64,
    ) -> anyhow::Result<(i64, Vec<Comment>)>;

    /// Full table dump, oldest first.
    async fn export_all(&self) -> anyhow::Result<Vec<Comment>>;

    /// Visible-comment totals per url. Urls absent from the table report 0.
    async fn counts_by_url(
        &self,
        urls: &[String],
        include_reply: bool,
    ) -> anyhow::Result<Vec<(String, i64)>>;

    /// Latest visible comments, site-wide when `urls` is empty.
    async fn recent(
        &self,
        urls: &[String],
        include_reply: bool,
        limit: i64,
    ) -> anyhow::Result<Vec<Comment>>;

    /// Overwrite the like set. The surrounding read-modify-write is not
    /// transactionally isolated; see the design notes.
    async fn set_likes(&self, id: &str, likes: &[String], updated: i64) -> anyhow::Result<()>;

    /// Flip the stored moderation flag (background reclassification path).
    async fn set_spam(&self, id: &str, is_spam: bool, updated: i64) -> anyhow::Result<()>;

    /// Submissions since `since` (epoch ms), from one ip or from all.
    /// Feeds the windowed rate limiter.
    async fn count_submissions_since(&self, ip: Option<&str>, since: i64) -> anyhow::Result<i64>;
}

/// Persistence contract for the single-record configuration blob.
#[async_trait]
pub trait ConfigRepo: Send + Sync {
    /// The stored map; an absent record yields an empty map (first run).
    async fn load(&self) -> anyhow::Result<ConfigMap>;

    /// Shallow-overlay `patch` onto the stored map and persist the union.
    /// Returns the merged result. An empty patch must not write.
    async fn merge(&self, patch: &ConfigMap) -> anyhow::Result<ConfigMap>;
}

/// Persistence contract for per-url hit counters.
#[async_trait]
pub trait CounterRepo: Send + Sync {
    /// Atomically increment the counter for `url`, refreshing the
    /// denormalized title, and return the new count.
    async fn increment(&self, url: &str, title: &str, now: i64) -> anyhow::Result<i64>;
}

/// Identity and credential hashing contract.
pub trait IdentityProvider: Send + Sync {
    /// A fresh opaque client token (correlation, not a security credential).
    fn issue_token(&self) -> String;

    /// Hash of an access token; admin status is this compared against the
    /// stored admin-password hash.
    fn token_hash(&self, token: &str) -> String;

    /// The access token an admin obtains from a raw password.
    fn password_token(&self, password: &str) -> String;

    /// Stable hash of a mail address, for avatar services.
    fn mail_hash(&self, mail: &str) -> String;
}

/// Spam evaluation contract. The precheck runs synchronously on the submit
/// path with fast local rules only; full classification runs detached.
#[async_trait]
pub trait SpamChecker: Send + Sync {
    fn precheck(&self, comment: &Comment, config: &ConfigMap) -> bool;
    async fn classify(&self, comment: &Comment, config: &ConfigMap) -> anyhow::Result<bool>;
}

/// Outbound notification contract (mail / IM). Failures are logged by the
/// caller, never surfaced to the submitter.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn comment_posted(
        &self,
        comment: &Comment,
        parent: Option<&Comment>,
        config: &ConfigMap,
    ) -> anyhow::Result<()>;
}

/// Bot-challenge verification against an external service, keyed by the
/// submitter ip.
#[async_trait]
pub trait ChallengeVerifier: Send + Sync {
    async fn verify(&self, response: &str, ip: &str, config: &ConfigMap) -> anyhow::Result<bool>;
}

/// A legacy comment-system adapter. Parses an exported file into records
/// that the dispatcher persists through the live submission save path.
pub trait ImportSource: Send + Sync {
    fn name(&self) -> &'static str;
    fn parse(&self, file: &str) -> anyhow::Result<Vec<CommentSeed>>;
}

/// Media storage contract for image uploads.
#[async_trait]
pub trait MediaStore: Send + Sync {
    /// Saves raw bytes and returns the public URL of the stored image.
    async fn save_upload(&self, data: Vec<u8>, content_type: &str) -> anyhow::Result<String>;
}
