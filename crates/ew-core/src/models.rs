//! # Domain Models
//!
//! Core entities of Echo-Wall: the comment row, the per-deployment config
//! blob, and per-page hit counters. Field names serialize as camelCase to
//! match the widget wire protocol; timestamps are epoch milliseconds.

use serde::{Deserialize, Serialize};

/// The opaque per-deployment configuration record: a flat JSON object of
/// known keys (admin password hash, CORS allow-list, rate-limit thresholds,
/// feature toggles). No schema beyond the keys handlers consume.
pub type ConfigMap = serde_json::Map<String, serde_json::Value>;

/// A single comment or reply. One row in the comment table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    /// Opaque unique id, generated at creation, never reused.
    pub id: String,
    /// Identity token of the author.
    pub uid: String,
    pub nick: String,
    pub mail: String,
    pub mail_hash: String,
    pub link: String,
    pub ip: String,
    pub user_agent: String,
    /// Author matched the configured site owner and was logged in as admin
    /// at submit time.
    pub is_owner: bool,
    /// Page identifier the comment belongs to.
    pub url: String,
    /// Full link of the page.
    pub href: String,
    /// Immediate parent comment, empty for top-level comments.
    pub pid: String,
    /// Top-level ancestor of the reply chain; empty iff this comment is
    /// itself top-level.
    pub rid: String,
    /// Sanitized, HTML-safe text.
    pub body: String,
    pub is_spam: bool,
    /// Identity tokens that liked this comment. Unique membership,
    /// order irrelevant.
    #[serde(default)]
    pub likes: Vec<String>,
    /// Pinned ahead of chronological order by an admin.
    pub top: bool,
    pub created: i64,
    pub updated: i64,
    /// Optional precomputed avatar URL override.
    pub avatar: Option<String>,
}

impl Comment {
    /// True for a thread root (a comment replies attach to).
    pub fn is_top_level(&self) -> bool {
        self.rid.is_empty()
    }
}

/// Who is asking. Every read applies the visibility predicate for the
/// public viewer; the admin viewer sees everything, spam included.
#[derive(Debug, Clone)]
pub enum Viewer {
    /// A regular client, identified by its access token. Sees non-spam
    /// comments plus its own hidden ones.
    Public { uid: String },
    Admin,
}

impl Viewer {
    pub fn public(uid: impl Into<String>) -> Self {
        Viewer::Public { uid: uid.into() }
    }

    /// The author-carveout token, if any.
    pub fn uid(&self) -> Option<&str> {
        match self {
            Viewer::Public { uid } => Some(uid),
            Viewer::Admin => None,
        }
    }

}

/// Moderation filter for admin reads. Stored values are boolean
/// visible/hidden; `All` exists only as a query filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpamFilter {
    Visible,
    Hidden,
    All,
}

impl SpamFilter {
    /// Admin tooling sends "VISIBLE" / "HIDDEN"; anything else means all.
    pub fn from_request(raw: Option<&str>) -> Self {
        match raw.map(|s| s.to_ascii_uppercase()).as_deref() {
            Some("VISIBLE") => SpamFilter::Visible,
            Some("HIDDEN") => SpamFilter::Hidden,
            _ => SpamFilter::All,
        }
    }
}

/// A record produced by an import adapter, fed through the same save path
/// as a live submission.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentSeed {
    pub url: String,
    pub body: String,
    #[serde(default)]
    pub nick: String,
    #[serde(default)]
    pub mail: String,
    #[serde(default)]
    pub link: String,
    #[serde(default)]
    pub href: String,
    /// Original creation time, when the source format preserves one.
    #[serde(default)]
    pub created: Option<i64>,
}
