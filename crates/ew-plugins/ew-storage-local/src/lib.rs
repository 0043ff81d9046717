//! # ew-storage-local
//!
//! Local filesystem implementation of `MediaStore` for image uploads.
//! Content-addressable: files are named by their SHA-256 hash and sharded
//! into two directory levels, which deduplicates repeat uploads for free.

use async_trait::async_trait;
use ew_core::traits::MediaStore;
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use tokio::fs;

pub struct LocalMediaStore {
    /// Root directory for all uploads (e.g., "./data/uploads")
    root_path: PathBuf,
    /// Public URL prefix (e.g., "/static/uploads")
    url_prefix: String,
}

impl LocalMediaStore {
    pub fn new(root: PathBuf, url_prefix: String) -> Self {
        Self {
            root_path: root,
            url_prefix,
        }
    }

    /// Generates a sharded path: "ab/cd/abcdef...hash.ext"
    fn sharded_path(&self, name: &str) -> PathBuf {
        let mut path = self.root_path.clone();
        path.push(&name[0..2]);
        path.push(&name[2..4]);
        path.push(name);
        path
    }
}

fn extension_for(content_type: &str) -> &'static str {
    match content_type {
        "image/png" => "png",
        "image/gif" => "gif",
        "image/webp" => "webp",
        _ => "jpg",
    }
}

#[async_trait]
impl MediaStore for LocalMediaStore {
    /// Saves an upload under its SHA-256 hash and returns the public URL.
    async fn save_upload(&self, data: Vec<u8>, content_type: &str) -> anyhow::Result<String> {
        let mut hasher = Sha256::new();
        hasher.update(&data);
        let name = format!("{}.{}", hex::encode(hasher.finalize()), extension_for(content_type));

        let target = self.sharded_path(&name);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }
        if fs::try_exists(&target).await? {
            // Same bytes, same name: nothing to write.
        } else {
            fs::write(&target, &data).await?;
        }

        Ok(format!(
            "{}/{}/{}/{}",
            self.url_prefix,
            &name[0..2],
            &name[2..4],
            name
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upload_is_content_addressed_and_idempotent() {
        let root = std::env::temp_dir().join("ew-storage-local-test");
        let store = LocalMediaStore::new(root.clone(), "/static/uploads".to_string());

        let url_a = store
            .save_upload(b"fake image bytes".to_vec(), "image/png")
            .await
            .expect("first save");
        let url_b = store
            .save_upload(b"fake image bytes".to_vec(), "image/png")
            .await
            .expect("repeat save");
        assert_eq!(url_a, url_b, "same bytes map to the same URL");
        assert!(url_a.starts_with("/static/uploads/"));
        assert!(url_a.ends_with(".png"));

        let url_c = store
            .save_upload(b"other bytes".to_vec(), "image/jpeg")
            .await
            .expect("different save");
        assert_ne!(url_a, url_c);

        let _ = fs::remove_dir_all(&root).await;
    }
}
