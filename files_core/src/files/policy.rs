//! Upload policy: which files a caller's configuration accepts

use serde::{Deserialize, Serialize};

use crate::error::{FileError, Result};
use super::classify::normalize_extension;
use super::models::{File, FileType, TransferMethod};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageConfig {
    #[serde(default)]
    pub number_limits: Option<usize>,
    /// When non-empty, the only transfer methods accepted for images.
    #[serde(default)]
    pub transfer_methods: Vec<TransferMethod>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileUploadConfig {
    #[serde(default)]
    pub allowed_file_types: Vec<FileType>,
    /// Only consulted for custom files. `Some(vec![])` rejects every custom file.
    #[serde(default)]
    pub allowed_file_extensions: Option<Vec<String>>,
    #[serde(default)]
    pub allowed_file_upload_methods: Vec<TransferMethod>,
    #[serde(default)]
    pub number_limits: Option<usize>,
    #[serde(default)]
    pub image_config: Option<ImageConfig>,
}

impl FileUploadConfig {
    pub fn is_file_allowed(
        &self,
        file_type: FileType,
        extension: &str,
        transfer_method: TransferMethod,
    ) -> bool {
        if !self.allowed_file_types.is_empty()
            && file_type != FileType::Custom
            && !self.allowed_file_types.contains(&file_type)
        {
            return false;
        }

        if file_type == FileType::Custom {
            if let Some(allowed) = &self.allowed_file_extensions {
                let extension = normalize_extension(extension);
                if !allowed.iter().any(|e| normalize_extension(e) == extension) {
                    return false;
                }
            }
        }

        if file_type == FileType::Image {
            // The image override is exhaustive: no fallback to the general list.
            if let Some(image_config) = &self.image_config {
                if !image_config.transfer_methods.is_empty()
                    && !image_config.transfer_methods.contains(&transfer_method)
                {
                    return false;
                }
            }
        } else if !self.allowed_file_upload_methods.is_empty()
            && !self.allowed_file_upload_methods.contains(&transfer_method)
        {
            return false;
        }

        true
    }

    pub fn image_limit(&self) -> Option<usize> {
        self.image_config.as_ref().and_then(|c| c.number_limits)
    }
}

pub struct UploadPolicy;

impl UploadPolicy {
    pub fn validate(file: &File, config: &FileUploadConfig) -> Result<()> {
        if config.is_file_allowed(file.file_type, &file.extension, file.transfer_method()) {
            Ok(())
        } else {
            Err(FileError::PolicyViolation {
                filename: file.filename.clone(),
            })
        }
    }

    /// Collection-level limits, checked once every file has been built.
    pub fn validate_batch(files: &[File], config: &FileUploadConfig) -> Result<()> {
        if let Some(limit) = config.image_limit() {
            let images = files.iter().filter(|f| f.file_type == FileType::Image).count();
            if images > limit {
                return Err(FileError::TooManyImages { limit });
            }
        }

        if let Some(limit) = config.number_limits {
            if files.len() > limit {
                return Err(FileError::TooManyFiles { limit });
            }
        }

        Ok(())
    }
}
