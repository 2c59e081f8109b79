use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::{
    errors::{AppError, Result},
    storage::FileStore,
};

pub struct LocalStorage {
    base_path: PathBuf,
}

impl LocalStorage {
    pub fn new<P: AsRef<Path>>(base_path: P) -> Result<Self> {
        let base_path = base_path.as_ref().to_path_buf();

        std::fs::create_dir_all(&base_path)
            .map_err(|e| AppError::Storage(format!("Failed to create storage directory: {}", e)))?;

        Ok(Self { base_path })
    }

    fn full_path(&self, path: &str) -> PathBuf {
        self.base_path.join(path)
    }
}

#[async_trait]
impl FileStore for LocalStorage {
    async fn write(&self, path: &str, data: &[u8]) -> Result<u64> {
        let full_path = self.full_path(path);

        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| AppError::Storage(format!("Failed to create directory: {}", e)))?;
        }

        fs::write(&full_path, data)
            .await
            .map_err(|e| AppError::Storage(format!("Failed to write file: {}", e)))?;

        Ok(data.len() as u64)
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let full_path = self.full_path(path);

        fs::remove_file(&full_path)
            .await
            .map_err(|e| AppError::Storage(format!("Failed to delete file: {}", e)))?;

        Ok(())
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        Ok(self.full_path(path).exists())
    }
}
