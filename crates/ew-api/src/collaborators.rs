//! # Default Collaborators
//!
//! In-tree implementations of the external call contracts: a local-rules
//! spam evaluator, a log-only notifier, an HTTP bot-challenge verifier,
//! an external image host client, and the generic JSON import adapter.
//! Deployments swap richer implementations in through `AppState`.

use async_trait::async_trait;
use base64::Engine;
use ew_core::models::{Comment, CommentSeed, ConfigMap};
use ew_core::traits::{ChallengeVerifier, ImportSource, MediaStore, Notifier, SpamChecker};

use crate::state::{cfg_str, cfg_u64};

/// Spam evaluation from local rules: a configured forbidden-word list and
/// a link-count ceiling. The precheck and the full classification share
/// the same rules here; richer deployments plug in a scoring service for
/// the classify side.
pub struct KeywordSpamChecker;

fn hits_forbidden_words(comment: &Comment, config: &ConfigMap) -> bool {
    let words = cfg_str(config, "FORBIDDEN_WORDS");
    if words.trim().is_empty() {
        return false;
    }
    let haystack = format!("{} {}", comment.nick, comment.body).to_lowercase();
    words
        .split(',')
        .map(|w| w.trim().to_lowercase())
        .any(|w| !w.is_empty() && haystack.contains(&w))
}

#[async_trait]
impl SpamChecker for KeywordSpamChecker {
    fn precheck(&self, comment: &Comment, config: &ConfigMap) -> bool {
        hits_forbidden_words(comment, config)
    }

    async fn classify(&self, comment: &Comment, config: &ConfigMap) -> anyhow::Result<bool> {
        if hits_forbidden_words(comment, config) {
            return Ok(true);
        }
        let max_links = cfg_u64(config, "SPAM_MAX_LINKS").unwrap_or(5) as usize;
        Ok(max_links > 0 && comment.body.matches("http").count() > max_links)
    }
}

/// Notification sink that only writes to the log. Mail and IM senders
/// implement the same contract out of tree.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn comment_posted(
        &self,
        comment: &Comment,
        parent: Option<&Comment>,
        _config: &ConfigMap,
    ) -> anyhow::Result<()> {
        match parent {
            Some(parent) => log::info!(
                "comment {} on {} replies to {}",
                comment.id,
                comment.url,
                parent.id
            ),
            None => log::info!("comment {} on {}", comment.id, comment.url),
        }
        Ok(())
    }
}

/// Bot-challenge verification against a remote endpoint, keyed by the
/// submitter ip. Unconfigured deployments skip the check.
pub struct HttpChallengeVerifier {
    client: reqwest::Client,
}

impl HttpChallengeVerifier {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpChallengeVerifier {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(serde::Deserialize)]
struct ChallengeOutcome {
    success: bool,
}

#[async_trait]
impl ChallengeVerifier for HttpChallengeVerifier {
    async fn verify(&self, response: &str, ip: &str, config: &ConfigMap) -> anyhow::Result<bool> {
        let secret = cfg_str(config, "CHALLENGE_SECRET");
        let url = cfg_str(config, "CHALLENGE_VERIFY_URL");
        if secret.is_empty() || url.is_empty() {
            return Ok(true);
        }
        let outcome: ChallengeOutcome = self
            .client
            .post(url)
            .form(&[("secret", secret), ("response", response), ("remoteip", ip)])
            .send()
            .await?
            .json()
            .await?;
        Ok(outcome.success)
    }
}

/// Image host client: ships the upload to a remote service and returns the
/// hosted URL.
pub struct ExternalImageHost {
    client: reqwest::Client,
    endpoint: String,
}

impl ExternalImageHost {
    pub fn new(endpoint: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
        }
    }
}

#[derive(serde::Deserialize)]
struct HostedImage {
    url: String,
}

#[async_trait]
impl MediaStore for ExternalImageHost {
    async fn save_upload(&self, data: Vec<u8>, _content_type: &str) -> anyhow::Result<String> {
        let encoded = base64::engine::general_purpose::STANDARD.encode(&data);
        let hosted: HostedImage = self
            .client
            .post(&self.endpoint)
            .json(&serde_json::json!({ "image": encoded }))
            .send()
            .await?
            .json()
            .await?;
        Ok(hosted.url)
    }
}

/// Import adapter for a plain JSON array of records.
pub struct JsonImportSource;

impl ImportSource for JsonImportSource {
    fn name(&self) -> &'static str {
        "generic-json"
    }

    fn parse(&self, file: &str) -> anyhow::Result<Vec<CommentSeed>> {
        Ok(serde_json::from_str(file)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn comment_with_body(body: &str) -> Comment {
        Comment {
            id: "c1".to_string(),
            uid: String::new(),
            nick: "nick".to_string(),
            mail: String::new(),
            mail_hash: String::new(),
            link: String::new(),
            ip: String::new(),
            user_agent: String::new(),
            is_owner: false,
            url: "/p".to_string(),
            href: String::new(),
            pid: String::new(),
            rid: String::new(),
            body: body.to_string(),
            is_spam: false,
            likes: Vec::new(),
            top: false,
            created: 0,
            updated: 0,
            avatar: None,
        }
    }

    #[tokio::test]
    async fn forbidden_words_trip_precheck_and_classify() {
        let mut config = ConfigMap::new();
        config.insert("FORBIDDEN_WORDS".to_string(), serde_json::json!("casino, pills"));
        let checker = KeywordSpamChecker;

        let spam = comment_with_body("cheap CASINO chips");
        assert!(checker.precheck(&spam, &config));
        assert!(checker.classify(&spam, &config).await.unwrap());

        let ham = comment_with_body("nice article");
        assert!(!checker.precheck(&ham, &config));
        assert!(!checker.classify(&ham, &config).await.unwrap());
    }

    #[tokio::test]
    async fn link_floods_only_trip_full_classification() {
        let config = ConfigMap::new();
        let checker = KeywordSpamChecker;
        let flood = comment_with_body(&"http://x.example ".repeat(8));
        assert!(!checker.precheck(&flood, &config), "precheck is fast local rules only");
        assert!(checker.classify(&flood, &config).await.unwrap());
    }

    #[test]
    fn json_import_parses_seed_records() {
        let file = r#"[{"url": "/p", "body": "hello", "nick": "old-system-user"}]"#;
        let seeds = JsonImportSource.parse(file).expect("parse");
        assert_eq!(seeds.len(), 1);
        assert_eq!(seeds[0].nick, "old-system-user");

        assert!(JsonImportSource.parse("not json").is_err());
    }
}
