//! ew-core
//!
//! The central domain logic and interface definitions for Echo-Wall.

pub mod error;
pub mod models;
pub mod traits;

// Re-exporting for easier access in other crates
pub use error::*;
pub use models::*;
pub use traits::*;

/// Current wall-clock time as epoch milliseconds, the unit every
/// persisted timestamp uses.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::models::*;

    #[test]
    fn comment_wire_names_are_camel_case() {
        let comment = Comment {
            id: "abc123".to_string(),
            uid: "tok".to_string(),
            nick: "Ferris".to_string(),
            mail: "ferris@example.com".to_string(),
            mail_hash: "deadbeef".to_string(),
            link: String::new(),
            ip: "127.0.0.1".to_string(),
            user_agent: "test".to_string(),
            is_owner: false,
            url: "/post/1".to_string(),
            href: "https://example.com/post/1".to_string(),
            pid: String::new(),
            rid: String::new(),
            body: "Hello!".to_string(),
            is_spam: false,
            likes: vec!["tok2".to_string()],
            top: false,
            created: 1_700_000_000_000,
            updated: 1_700_000_000_000,
            avatar: None,
        };

        let json = serde_json::to_value(&comment).expect("serialize");
        assert!(json.get("mailHash").is_some());
        assert!(json.get("isSpam").is_some());
        assert!(json.get("userAgent").is_some());
        assert!(json.get("mail_hash").is_none());
    }

    #[test]
    fn viewer_uid_carveout_only_for_public() {
        let public = Viewer::public("tok");
        assert_eq!(public.uid(), Some("tok"));
        assert_eq!(Viewer::Admin.uid(), None);
    }
}
