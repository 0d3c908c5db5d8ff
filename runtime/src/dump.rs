//! JSON file dumps of harvested data.

use anyhow::{Context, Result};
use case_catalog::{CatalogParent, Transformed};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;

/// Writes timestamped, pretty-printed JSON files into one directory.
#[derive(Debug, Clone)]
pub struct FileDump {
    dir: PathBuf,
}

impl FileDump {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `container_detail_<id>_<timestamp>.json`
    pub async fn write_detail(&self, parent_id: i64, data: &Transformed) -> Result<PathBuf> {
        self.write_json(&format!("container_detail_{parent_id}_{}.json", timestamp()), data)
            .await
    }

    /// `container_<timestamp>.json`
    pub async fn write_containers(&self, parents: &[CatalogParent]) -> Result<PathBuf> {
        self.write_json(&format!("container_{}.json", timestamp()), &parents)
            .await
    }

    async fn write_json<T: Serialize + ?Sized>(&self, file_name: &str, value: &T) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("failed to create {}", self.dir.display()))?;
        let path = self.dir.join(file_name);
        let json = serde_json::to_string_pretty(value).context("failed to serialize dump")?;
        tokio::fs::write(&path, json)
            .await
            .with_context(|| format!("failed to write {}", path.display()))?;
        info!("saved {}", path.display());
        Ok(path)
    }
}

fn timestamp() -> String {
    chrono::Local::now().format("%Y%m%d_%H%M%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use case_catalog::{transform, RawItemRecord, TransformOptions};

    #[tokio::test]
    async fn test_detail_dump_keeps_non_ascii() {
        let dir = tempfile::tempdir().unwrap();
        let dump = FileDump::new(dir.path().join("out"));
        let data = transform(
            &[RawItemRecord::new(7, "AK-47 | 红线", "隐秘")],
            500,
            &TransformOptions::default(),
        );

        let path = dump.write_detail(500, &data).await.unwrap();
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("container_detail_500_"));
        assert!(name.ends_with(".json"));

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("红线"));
        let back: Transformed = serde_json::from_str(&text).unwrap();
        assert_eq!(back, data);
    }
}
