//! # ew-auth-simple
//!
//! SHA-256 implementation of `IdentityProvider`. Handles opaque client
//! tokens, the admin password hash chain, and mail hashes for avatar
//! services.
//!
//! The chain: a raw password maps to the access token `sha256(password)`;
//! the config stores `sha256(token)`. Admin status is a single hash of the
//! presented token compared against the stored value, so the raw password
//! never persists anywhere.

use ew_core::traits::IdentityProvider;
use sha2::{Digest, Sha256};
use uuid::Uuid;

pub struct SimpleIdentityProvider;

impl SimpleIdentityProvider {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SimpleIdentityProvider {
    fn default() -> Self {
        Self::new()
    }
}

fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

impl IdentityProvider for SimpleIdentityProvider {
    /// A correlation token, not a security credential. Hyphens stripped to
    /// match the compact id style of the rest of the system.
    fn issue_token(&self) -> String {
        Uuid::new_v4().simple().to_string()
    }

    fn token_hash(&self, token: &str) -> String {
        sha256_hex(token)
    }

    fn password_token(&self, password: &str) -> String {
        sha256_hex(password)
    }

    /// Avatar services key off a normalized mail hash: trimmed, lowercased.
    fn mail_hash(&self, mail: &str) -> String {
        sha256_hex(&mail.trim().to_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_are_compact_and_unique() {
        let auth = SimpleIdentityProvider::new();
        let a = auth.issue_token();
        let b = auth.issue_token();
        assert_eq!(a.len(), 32);
        assert!(!a.contains('-'));
        assert_ne!(a, b);
    }

    #[test]
    fn admin_chain_verifies_without_storing_the_password() {
        let auth = SimpleIdentityProvider::new();
        let token = auth.password_token("hunter2");
        let stored = auth.token_hash(&token);

        // Login later: same password, same token, same stored hash.
        assert_eq!(auth.token_hash(&auth.password_token("hunter2")), stored);
        assert_ne!(auth.token_hash(&auth.password_token("wrong")), stored);
        assert_ne!(stored, "hunter2");
        assert_ne!(token, "hunter2");
    }

    #[test]
    fn mail_hash_normalizes_case_and_whitespace() {
        let auth = SimpleIdentityProvider::new();
        assert_eq!(
            auth.mail_hash("Ferris@Example.COM "),
            auth.mail_hash("ferris@example.com")
        );
    }
}
