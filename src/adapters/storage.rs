use crate::core::{DraftStorage, ProjectDraft};
use crate::utils::error::Result;
use std::path::{Path, PathBuf};

/// Keeps drafts as pretty-printed JSON files under `base_path`.
#[derive(Debug, Clone)]
pub struct LocalDraftStorage {
    base_path: PathBuf,
}

impl LocalDraftStorage {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    fn path_for(&self, name: &str) -> PathBuf {
        let path = Path::new(name);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_path.join(path)
        }
    }
}

impl DraftStorage for LocalDraftStorage {
    async fn load_draft(&self, name: &str) -> Result<ProjectDraft> {
        let full_path = self.path_for(name);
        tracing::debug!("Reading draft from {}", full_path.display());
        let content = tokio::fs::read_to_string(&full_path).await?;
        let mut draft: ProjectDraft = serde_json::from_str(&content)?;
        // 衍生欄位一律重算，不信任檔案內容
        draft.recompute();
        Ok(draft)
    }

    async fn save_draft(&self, name: &str, draft: &ProjectDraft) -> Result<()> {
        let full_path = self.path_for(name);
        let json = serde_json::to_string_pretty(draft)?;

        if let Some(parent) = full_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        tokio::fs::write(&full_path, json).await?;
        tracing::debug!("Draft saved to {}", full_path.display());
        Ok(())
    }

    async fn remove_draft(&self, name: &str) -> Result<()> {
        let full_path = self.path_for(name);
        match tokio::fs::remove_file(&full_path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
