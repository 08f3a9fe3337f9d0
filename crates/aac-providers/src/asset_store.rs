//! Local-disk layout for generated images and their sidecar metadata: one
//! directory per run under `<runtime_data_root>/runs/<run_id>/`, images
//! written under their sanitized filename, one `metadata_attempt_{n}.json`
//! per optimization attempt.

use std::io;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use aac_domain::filename::sanitize_filename;

pub struct AssetStore {
    runtime_data_root: PathBuf,
}

impl AssetStore {
    pub fn new(runtime_data_root: impl Into<PathBuf>) -> Self {
        Self { runtime_data_root: runtime_data_root.into() }
    }

    pub fn runs_root(&self) -> io::Result<PathBuf> {
        let root = self.runtime_data_root.join("runs");
        std::fs::create_dir_all(&root)?;
        Ok(root)
    }

    pub fn exports_root(&self) -> io::Result<PathBuf> {
        let root = self.runtime_data_root.join("exports");
        std::fs::create_dir_all(&root)?;
        Ok(root)
    }

    pub fn run_dir(&self, run_id: &str) -> io::Result<PathBuf> {
        let path = self.runs_root()?.join(run_id);
        std::fs::create_dir_all(&path)?;
        Ok(path)
    }

    pub fn write_image(&self, run_id: &str, filename: &str, image_bytes: &[u8]) -> io::Result<PathBuf> {
        let path = self.run_dir(run_id)?.join(sanitize_filename(filename));
        std::fs::write(&path, image_bytes)?;
        Ok(path)
    }

    pub fn write_metadata(&self, run_id: &str, attempt: i32, payload: &serde_json::Value) -> io::Result<PathBuf> {
        let path = self.run_dir(run_id)?.join(format!("metadata_attempt_{attempt}.json"));
        let rendered = serde_json::to_string_pretty(payload).unwrap_or_default();
        std::fs::write(&path, rendered)?;
        Ok(path)
    }
}

pub fn sha256_bytes(content: &[u8]) -> String {
    let digest = Sha256::digest(content);
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

pub fn image_dimensions(path: &Path) -> Result<(u32, u32), image::ImageError> {
    let reader = image::io::Reader::open(path)?.with_guessed_format()?;
    let dims = reader.into_dimensions()?;
    Ok(dims)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_bytes_is_deterministic() {
        assert_eq!(sha256_bytes(b"hello"), sha256_bytes(b"hello"));
        assert_ne!(sha256_bytes(b"hello"), sha256_bytes(b"world"));
    }

    #[test]
    fn write_image_and_metadata_round_trip() {
        let dir = std::env::temp_dir().join(format!("aac-asset-store-test-{}", std::process::id()));
        let store = AssetStore::new(&dir);
        let written = store.write_image("run-123", "draft_attempt_1.jpg", b"fake-jpeg-bytes").unwrap();
        assert!(written.exists());
        let meta = store.write_metadata("run-123", 1, &serde_json::json!({ "model": "flux-1.1-pro" })).unwrap();
        assert!(meta.exists());
        std::fs::remove_dir_all(&dir).ok();
    }
}
