//! Per-request scratch storage.
//!
//! Every conversion stages its inputs and outputs in an independently named
//! temporary directory, so concurrent requests never share state. The
//! directory is removed when `Staging` drops, success or failure; removal
//! errors are swallowed by `tempfile`.

use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Scratch directory holding one request's model files.
pub struct Staging {
    dir: TempDir,
}

impl Staging {
    /// Create a fresh scratch directory under the system temp location.
    pub fn create() -> io::Result<Self> {
        let dir = tempfile::Builder::new().prefix("tfjs_convert_").tempdir()?;
        tracing::debug!("Staging directory created: {}", dir.path().display());
        Ok(Self { dir })
    }

    /// Root of the scratch directory.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Location of the (patched) topology descriptor.
    pub fn model_json_path(&self) -> PathBuf {
        self.dir.path().join("model.json")
    }

    /// Location of the uploaded weight blob.
    pub fn weights_path(&self) -> PathBuf {
        self.dir.path().join("weights.bin")
    }

    /// Location of the intermediate SavedModel emitted by the loader.
    pub fn saved_model_path(&self) -> PathBuf {
        self.dir.path().join("saved_model")
    }

    /// Location of the final TFLite flatbuffer.
    pub fn tflite_path(&self) -> PathBuf {
        self.dir.path().join("model.tflite")
    }

    /// Stage the uploaded artifact pair on disk for the external loader.
    pub async fn write_inputs(&self, model_json: &[u8], weights: &[u8]) -> io::Result<()> {
        tokio::fs::write(self.model_json_path(), model_json).await?;
        tokio::fs::write(self.weights_path(), weights).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn inputs_are_staged_on_disk() {
        let staging = Staging::create().unwrap();
        staging.write_inputs(b"{\"format\":\"x\"}", b"\x01\x02\x03").await.unwrap();

        assert_eq!(
            tokio::fs::read(staging.model_json_path()).await.unwrap(),
            b"{\"format\":\"x\"}"
        );
        assert_eq!(
            tokio::fs::read(staging.weights_path()).await.unwrap(),
            b"\x01\x02\x03"
        );
    }

    #[tokio::test]
    async fn directories_are_independent_per_request() {
        let a = Staging::create().unwrap();
        let b = Staging::create().unwrap();
        assert_ne!(a.path(), b.path());
    }

    #[tokio::test]
    async fn scratch_is_removed_on_drop() {
        let staging = Staging::create().unwrap();
        staging.write_inputs(b"{}", b"weights").await.unwrap();
        let root = staging.path().to_path_buf();
        assert!(root.exists());

        drop(staging);
        assert!(!root.exists());
    }
}
