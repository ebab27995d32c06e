//! Encode/save collaborators

use async_trait::async_trait;
use common::PipelineError;
use std::path::{Path, PathBuf};

/// Receives finished screenshots and clips
#[async_trait]
pub trait MediaSink: Send + Sync {
    /// Persist `bytes` under `filename`, returning where it ended up
    async fn encode_and_save(&self, bytes: Vec<u8>, filename: &str) -> Result<PathBuf, PipelineError>;
}

/// `<prefix>-<local time>.<extension>`
pub fn timestamped_filename(prefix: &str, extension: &str) -> String {
    format!(
        "{}-{}.{}",
        prefix,
        chrono::Local::now().format("%Y%m%d-%H%M%S%.3f"),
        extension
    )
}

/// Writes files into a directory, creating it on first use
#[derive(Debug, Clone)]
pub struct FileSink {
    dir: PathBuf,
}

impl FileSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl MediaSink for FileSink {
    async fn encode_and_save(&self, bytes: Vec<u8>, filename: &str) -> Result<PathBuf, PipelineError> {
        let name = Path::new(filename)
            .file_name()
            .ok_or_else(|| PipelineError::Io(format!("Invalid filename: {}", filename)))?;

        tokio::fs::create_dir_all(&self.dir).await?;

        let path = self.dir.join(name);
        tokio::fs::write(&path, &bytes).await?;

        log::info!("Saved {} ({} bytes)", path.display(), bytes.len());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamped_filename() {
        let name = timestamped_filename("retrocast", "png");
        assert!(name.starts_with("retrocast-"));
        assert!(name.ends_with(".png"));
    }

    #[tokio::test]
    async fn test_file_sink_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileSink::new(dir.path().join("nested/out"));

        let path = sink.encode_and_save(vec![1, 2, 3], "shot.png").await.unwrap();
        assert_eq!(path, dir.path().join("nested/out/shot.png"));
        assert_eq!(std::fs::read(&path).unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_file_sink_strips_directories() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileSink::new(dir.path());

        let path = sink.encode_and_save(vec![0], "../escape.gif").await.unwrap();
        assert_eq!(path, dir.path().join("escape.gif"));
    }

    #[tokio::test]
    async fn test_file_sink_rejects_empty_name() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileSink::new(dir.path());
        assert!(sink.encode_and_save(vec![0], "..").await.is_err());
    }
}
