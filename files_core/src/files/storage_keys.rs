//! Bulk storage-key resolution for already-built files

use std::sync::Arc;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::ResolverConfig;
use crate::error::{FileError, Result};
use super::models::{File, TransferMethod};
use super::repository::RecordStore;

/// Fills in storage keys for a batch of files with one query per record kind.
pub struct StorageKeyLoader {
    store: Arc<dyn RecordStore>,
    tenant_id: String,
    max_batch_size: usize,
}

impl StorageKeyLoader {
    pub fn new(store: Arc<dyn RecordStore>, tenant_id: impl Into<String>) -> Self {
        Self {
            store,
            tenant_id: tenant_id.into(),
            max_batch_size: ResolverConfig::default().max_batch_size,
        }
    }

    pub fn with_config(mut self, config: &ResolverConfig) -> Self {
        self.max_batch_size = config.max_batch_size;
        self
    }

    pub fn with_max_batch_size(mut self, max_batch_size: usize) -> Self {
        self.max_batch_size = max_batch_size;
        self
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    /// Resolves the storage key of every file.
    ///
    /// Nothing is written unless every file resolves; on error the slice is
    /// left as it was.
    pub async fn load_storage_keys(&self, files: &mut [File]) -> Result<()> {
        if files.len() > self.max_batch_size {
            warn!(
                "Resolving storage keys for {} files, above the configured batch size of {}",
                files.len(),
                self.max_batch_size
            );
        }

        let mut upload_ids = Vec::new();
        let mut tool_ids = Vec::new();
        let mut related_ids = Vec::with_capacity(files.len());

        for file in files.iter() {
            let Some(raw) = file.related_id.as_deref() else {
                return Err(FileError::MissingReference(file.id.clone()));
            };

            if file.tenant_id() != self.tenant_id {
                return Err(FileError::TenantMismatch {
                    expected: self.tenant_id.clone(),
                    actual: file.tenant_id().to_string(),
                    file_id: file.id.clone(),
                });
            }

            let related_id = Uuid::parse_str(raw)
                .map_err(|_| FileError::InvalidReference(format!("Invalid file related_id: {}", raw)))?;

            match file.transfer_method() {
                TransferMethod::LocalFile | TransferMethod::RemoteUrl => upload_ids.push(related_id),
                TransferMethod::ToolFile => tool_ids.push(related_id),
            }
            related_ids.push(related_id);
        }

        let uploads = self.store.upload_records(&upload_ids, &self.tenant_id).await?;
        let tools = self.store.tool_records(&tool_ids, &self.tenant_id).await?;

        let mut keys = Vec::with_capacity(files.len());
        for (file, related_id) in files.iter().zip(&related_ids) {
            let key = match file.transfer_method() {
                TransferMethod::LocalFile | TransferMethod::RemoteUrl => uploads
                    .get(related_id)
                    .map(|record| record.key.clone())
                    .ok_or_else(|| FileError::RecordNotFound(format!("Upload file {} not found", related_id)))?,
                TransferMethod::ToolFile => tools
                    .get(related_id)
                    .map(|record| record.file_key.clone())
                    .ok_or_else(|| FileError::RecordNotFound(format!("Tool file {} not found", related_id)))?,
            };
            keys.push(key);
        }

        for (file, key) in files.iter_mut().zip(keys) {
            file.set_storage_key(key);
        }

        debug!("Loaded {} storage keys for tenant {}", related_ids.len(), self.tenant_id);
        Ok(())
    }
}
