use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use crate::config::FactoryConfig;
use crate::error::{FileError, Result};
use super::classify::{normalize_extension, preferred_extension, standardize_file_type};
use super::models::{
    File, FileBelongsTo, FileDescriptor, FileParts, FileType, MessageFile, ToolRecord, TransferMethod,
    UploadRecord, DEFAULT_EXTENSION,
};
use super::policy::{FileUploadConfig, UploadPolicy};
use super::probe::{HttpMetadataProbe, RemoteMetadataProbe};
use super::repository::RecordStore;
use super::signing::{HmacUrlSigner, SignedUrlIssuer};

/// Builds normalized [`File`]s from caller descriptors.
#[derive(Clone)]
pub struct FileFactory {
    store: Arc<dyn RecordStore>,
    probe: Arc<dyn RemoteMetadataProbe>,
    signer: Arc<dyn SignedUrlIssuer>,
}

/// Backing records fetched up front for a set of descriptors.
#[derive(Default)]
struct PrefetchedRecords {
    uploads: HashMap<Uuid, UploadRecord>,
    tools: HashMap<Uuid, ToolRecord>,
}

impl FileFactory {
    pub fn new(
        store: Arc<dyn RecordStore>,
        probe: Arc<dyn RemoteMetadataProbe>,
        signer: Arc<dyn SignedUrlIssuer>,
    ) -> Self {
        Self { store, probe, signer }
    }

    /// Wires the HTTP probe and HMAC signer from configuration.
    pub fn from_config(config: &FactoryConfig, store: Arc<dyn RecordStore>) -> Result<Self> {
        let probe = HttpMetadataProbe::new(&config.probe)?;
        let signer = HmacUrlSigner::new(&config.signing)?;
        Ok(Self::new(store, Arc::new(probe), Arc::new(signer)))
    }

    pub async fn build_one(
        &self,
        descriptor: &FileDescriptor,
        tenant_id: &str,
        config: Option<&FileUploadConfig>,
        strict_type_validation: bool,
    ) -> Result<File> {
        let records = self.prefetch(std::slice::from_ref(descriptor), tenant_id).await?;
        self.build_validated(descriptor, tenant_id, &records, config, strict_type_validation)
            .await
    }

    pub async fn build_from_mapping(
        &self,
        mapping: &serde_json::Value,
        tenant_id: &str,
        config: Option<&FileUploadConfig>,
        strict_type_validation: bool,
    ) -> Result<File> {
        let descriptor = FileDescriptor::from_mapping(mapping)?;
        self.build_one(&descriptor, tenant_id, config, strict_type_validation).await
    }

    /// Builds every descriptor in order, then applies the collection limits.
    ///
    /// Backing records are fetched with at most one query per record kind.
    /// The first failing descriptor aborts the whole batch.
    pub async fn build_many(
        &self,
        descriptors: &[FileDescriptor],
        tenant_id: &str,
        config: Option<&FileUploadConfig>,
        strict_type_validation: bool,
    ) -> Result<Vec<File>> {
        let records = self.prefetch(descriptors, tenant_id).await?;

        let mut files = Vec::with_capacity(descriptors.len());
        for descriptor in descriptors {
            let file = self
                .build_validated(descriptor, tenant_id, &records, config, strict_type_validation)
                .await?;
            files.push(file);
        }

        if let Some(config) = config {
            UploadPolicy::validate_batch(&files, config)?;
        }

        debug!("Built {} files for tenant {}", files.len(), tenant_id);
        Ok(files)
    }

    pub async fn build_from_mappings(
        &self,
        mappings: &[serde_json::Value],
        tenant_id: &str,
        config: Option<&FileUploadConfig>,
        strict_type_validation: bool,
    ) -> Result<Vec<File>> {
        let descriptors = mappings
            .iter()
            .map(FileDescriptor::from_mapping)
            .collect::<Result<Vec<_>>>()?;
        self.build_many(&descriptors, tenant_id, config, strict_type_validation).await
    }

    /// Rebuilds the files attached to a message; assistant-produced files are skipped.
    pub async fn build_from_message_files(
        &self,
        message_files: &[MessageFile],
        tenant_id: &str,
        config: &FileUploadConfig,
    ) -> Result<Vec<File>> {
        let descriptors: Vec<FileDescriptor> = message_files
            .iter()
            .filter(|f| f.belongs_to != FileBelongsTo::Assistant)
            .map(FileDescriptor::from)
            .collect();
        self.build_many(&descriptors, tenant_id, Some(config), false).await
    }

    async fn prefetch(&self, descriptors: &[FileDescriptor], tenant_id: &str) -> Result<PrefetchedRecords> {
        let mut upload_ids = Vec::new();
        let mut tool_ids = Vec::new();

        for descriptor in descriptors {
            // Malformed ids are reported by the per-file pass, in order.
            let Some(id) = descriptor
                .related_id
                .as_deref()
                .and_then(|id| Uuid::parse_str(id).ok())
            else {
                continue;
            };

            match descriptor.transfer_method {
                TransferMethod::LocalFile | TransferMethod::RemoteUrl => upload_ids.push(id),
                TransferMethod::ToolFile => tool_ids.push(id),
            }
        }

        upload_ids.sort_unstable();
        upload_ids.dedup();
        tool_ids.sort_unstable();
        tool_ids.dedup();

        let mut records = PrefetchedRecords::default();
        if !upload_ids.is_empty() {
            records.uploads = self.store.upload_records(&upload_ids, tenant_id).await?;
        }
        if !tool_ids.is_empty() {
            records.tools = self.store.tool_records(&tool_ids, tenant_id).await?;
        }

        Ok(records)
    }

    async fn build_validated(
        &self,
        descriptor: &FileDescriptor,
        tenant_id: &str,
        records: &PrefetchedRecords,
        config: Option<&FileUploadConfig>,
        strict_type_validation: bool,
    ) -> Result<File> {
        let file = match descriptor.transfer_method {
            TransferMethod::LocalFile => {
                self.build_from_local_file(descriptor, tenant_id, records, strict_type_validation)?
            }
            TransferMethod::RemoteUrl => match descriptor.related_id.as_deref() {
                Some(_) => self.build_from_uploaded_url(descriptor, tenant_id, records, strict_type_validation)?,
                None => self.build_from_remote_url(descriptor, tenant_id).await?,
            },
            TransferMethod::ToolFile => {
                self.build_from_tool_file(descriptor, tenant_id, records, strict_type_validation)?
            }
        };

        if let Some(config) = config {
            UploadPolicy::validate(&file, config)?;
        }

        debug!(
            "Built {} file {:?} ({}) for tenant {}",
            file.transfer_method(), file.filename, file.file_type, tenant_id
        );
        Ok(file)
    }

    fn build_from_local_file(
        &self,
        descriptor: &FileDescriptor,
        tenant_id: &str,
        records: &PrefetchedRecords,
        strict_type_validation: bool,
    ) -> Result<File> {
        let record = upload_record_for(descriptor, records)?;
        let remote_url = if record.source_url.is_empty() {
            self.signer.upload_file_url(&record.id)
        } else {
            record.source_url.clone()
        };

        file_from_upload_record(descriptor, tenant_id, record, remote_url, strict_type_validation)
    }

    /// Remote URL that was uploaded and stored first; served through a signed link.
    fn build_from_uploaded_url(
        &self,
        descriptor: &FileDescriptor,
        tenant_id: &str,
        records: &PrefetchedRecords,
        strict_type_validation: bool,
    ) -> Result<File> {
        let record = upload_record_for(descriptor, records)?;
        let remote_url = self.signer.upload_file_url(&record.id);

        file_from_upload_record(descriptor, tenant_id, record, remote_url, strict_type_validation)
    }

    async fn build_from_remote_url(&self, descriptor: &FileDescriptor, tenant_id: &str) -> Result<File> {
        let url = descriptor
            .url
            .as_deref()
            .filter(|url| !url.is_empty())
            .ok_or_else(|| FileError::InvalidReference("Invalid file url".to_string()))?;

        let info = self.probe.head_probe(url).await;
        let extension = extension_for(info.mime_type.as_deref(), &info.filename);
        let detected = standardize_file_type(&extension, info.mime_type.as_deref().unwrap_or_default());

        // Enforced even without strict validation for bare URLs.
        if let Some(declared) = descriptor.declared_type {
            if declared != detected {
                return Err(FileError::TypeMismatch { declared, detected });
            }
        }

        Ok(File::new(FileParts {
            id: descriptor.id.clone(),
            tenant_id: tenant_id.to_string(),
            filename: info.filename,
            extension,
            mime_type: info.mime_type,
            file_type: detected,
            transfer_method: TransferMethod::RemoteUrl,
            remote_url: url.to_string(),
            related_id: None,
            size: info.size,
            storage_key: String::new(),
        }))
    }

    fn build_from_tool_file(
        &self,
        descriptor: &FileDescriptor,
        tenant_id: &str,
        records: &PrefetchedRecords,
        strict_type_validation: bool,
    ) -> Result<File> {
        let tool_file_id = descriptor
            .related_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| FileError::InvalidReference("Missing tool file id".to_string()))?;

        let record = Uuid::parse_str(tool_file_id)
            .ok()
            .and_then(|id| records.tools.get(&id))
            .ok_or_else(|| FileError::RecordNotFound(format!("ToolFile {} not found", tool_file_id)))?;

        let extension = tool_file_extension(&record.file_key);
        let detected = standardize_file_type(&extension, &record.mimetype);
        let file_type = resolve_file_type(descriptor.declared_type, detected, strict_type_validation)?;
        let remote_url = match record.original_url.as_deref() {
            Some(url) if !url.is_empty() => url.to_string(),
            _ => self.signer.tool_file_url(&record.id, &extension),
        };

        Ok(File::new(FileParts {
            id: descriptor.id.clone(),
            tenant_id: tenant_id.to_string(),
            filename: record.name.clone(),
            extension,
            mime_type: Some(record.mimetype.clone()),
            file_type,
            transfer_method: TransferMethod::ToolFile,
            remote_url,
            related_id: Some(record.id.to_string()),
            size: record.size,
            storage_key: record.file_key.clone(),
        }))
    }
}

fn upload_record_for<'a>(descriptor: &FileDescriptor, records: &'a PrefetchedRecords) -> Result<&'a UploadRecord> {
    let raw = descriptor
        .related_id
        .as_deref()
        .filter(|id| !id.is_empty())
        .ok_or_else(|| FileError::InvalidReference("Invalid upload file id".to_string()))?;

    let upload_file_id = Uuid::parse_str(raw)
        .map_err(|_| FileError::InvalidReference(format!("Invalid upload file id format: {}", raw)))?;

    records
        .uploads
        .get(&upload_file_id)
        .ok_or_else(|| FileError::RecordNotFound(format!("Invalid upload file: {}", upload_file_id)))
}

fn file_from_upload_record(
    descriptor: &FileDescriptor,
    tenant_id: &str,
    record: &UploadRecord,
    remote_url: String,
    strict_type_validation: bool,
) -> Result<File> {
    let extension = normalize_extension(&record.extension);
    let detected = standardize_file_type(&extension, &record.mime_type);
    let file_type = resolve_file_type(descriptor.declared_type, detected, strict_type_validation)?;

    Ok(File::new(FileParts {
        id: descriptor.id.clone(),
        tenant_id: tenant_id.to_string(),
        filename: record.name.clone(),
        extension,
        mime_type: Some(record.mime_type.clone()),
        file_type,
        transfer_method: descriptor.transfer_method,
        remote_url,
        related_id: Some(record.id.to_string()),
        size: record.size,
        storage_key: record.key.clone(),
    }))
}

/// A declared type wins unless it is absent or `Custom`.
fn resolve_file_type(declared: Option<FileType>, detected: FileType, strict: bool) -> Result<FileType> {
    if strict {
        if let Some(declared) = declared {
            if declared != detected {
                return Err(FileError::TypeMismatch { declared, detected });
            }
        }
    }

    Ok(match declared {
        Some(declared) if declared != FileType::Custom => declared,
        _ => detected,
    })
}

/// Picks an extension for a remote file. The filename's own suffix wins when
/// the mime type lists it; otherwise the mime type's canonical extension, then
/// any extension registered for it, then the bare suffix, then
/// [`DEFAULT_EXTENSION`].
pub(crate) fn extension_for(mime_type: Option<&str>, filename: &str) -> String {
    let suffix = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| !ext.is_empty());

    if let Some(mime_type) = mime_type {
        let known = mime_guess::get_mime_extensions_str(mime_type).unwrap_or_default();
        if let Some(ext) = suffix.as_deref().filter(|ext| known.contains(ext)) {
            return format!(".{}", ext);
        }
        if let Some(ext) = preferred_extension(mime_type) {
            return ext.to_string();
        }
        if let Some(ext) = known.first() {
            return format!(".{}", ext);
        }
    }

    suffix
        .map(|ext| format!(".{}", ext))
        .unwrap_or_else(|| DEFAULT_EXTENSION.to_string())
}

fn tool_file_extension(file_key: &str) -> String {
    let name = file_key.rsplit('/').next().unwrap_or(file_key);
    name.rsplit_once('.')
        .map(|(_, ext)| normalize_extension(ext))
        .filter(|ext| !ext.is_empty())
        .unwrap_or_else(|| DEFAULT_EXTENSION.to_string())
}
