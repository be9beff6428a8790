use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{FileError, Result};

/// Sentinel size for files whose byte count could not be determined.
pub const UNKNOWN_SIZE: i64 = -1;

/// Extension used when neither a mime type nor a filename yields one.
pub const DEFAULT_EXTENSION: &str = ".bin";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Image,
    Video,
    Audio,
    Document,
    Custom,
}

impl FileType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileType::Image => "image",
            FileType::Video => "video",
            FileType::Audio => "audio",
            FileType::Document => "document",
            FileType::Custom => "custom",
        }
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FileType {
    type Err = FileError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "image" => Ok(FileType::Image),
            "video" => Ok(FileType::Video),
            "audio" => Ok(FileType::Audio),
            "document" => Ok(FileType::Document),
            "custom" => Ok(FileType::Custom),
            other => Err(FileError::InvalidCategory(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferMethod {
    LocalFile,
    RemoteUrl,
    ToolFile,
}

impl TransferMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferMethod::LocalFile => "local_file",
            TransferMethod::RemoteUrl => "remote_url",
            TransferMethod::ToolFile => "tool_file",
        }
    }
}

impl fmt::Display for TransferMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransferMethod {
    type Err = FileError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "local_file" => Ok(TransferMethod::LocalFile),
            "remote_url" => Ok(TransferMethod::RemoteUrl),
            "tool_file" => Ok(TransferMethod::ToolFile),
            other => Err(FileError::UnsupportedMethod(other.to_string())),
        }
    }
}

/// A normalized file reference.
///
/// The owning tenant and transfer method are fixed at construction and only
/// readable. The storage key is either filled in by the builder (record-backed
/// files) or written once by
/// [`StorageKeyLoader`](super::storage_keys::StorageKeyLoader).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct File {
    pub id: Option<String>,
    tenant_id: String,
    pub filename: String,
    pub extension: String,
    pub mime_type: Option<String>,
    #[serde(rename = "type")]
    pub file_type: FileType,
    transfer_method: TransferMethod,
    pub remote_url: String,
    pub related_id: Option<String>,
    pub size: i64,
    #[serde(skip)]
    storage_key: String,
}

/// Field values for [`File::new`]; keeps the constructor readable at call sites.
#[derive(Debug, Clone)]
pub struct FileParts {
    pub id: Option<String>,
    pub tenant_id: String,
    pub filename: String,
    pub extension: String,
    pub mime_type: Option<String>,
    pub file_type: FileType,
    pub transfer_method: TransferMethod,
    pub remote_url: String,
    pub related_id: Option<String>,
    pub size: i64,
    pub storage_key: String,
}

impl File {
    pub fn new(parts: FileParts) -> Self {
        Self {
            id: parts.id,
            tenant_id: parts.tenant_id,
            filename: parts.filename,
            extension: parts.extension,
            mime_type: parts.mime_type,
            file_type: parts.file_type,
            transfer_method: parts.transfer_method,
            remote_url: parts.remote_url,
            related_id: parts.related_id,
            size: parts.size,
            storage_key: parts.storage_key,
        }
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    pub fn transfer_method(&self) -> TransferMethod {
        self.transfer_method
    }

    pub fn storage_key(&self) -> &str {
        &self.storage_key
    }

    pub(crate) fn set_storage_key(&mut self, key: String) {
        self.storage_key = key;
    }

    pub fn has_known_size(&self) -> bool {
        self.size != UNKNOWN_SIZE
    }

    /// Markdown link for the file; images render inline.
    pub fn markdown(&self) -> String {
        match self.file_type {
            FileType::Image => format!("![{}]({})", self.filename, self.remote_url),
            _ => format!("[{}]({})", self.filename, self.remote_url),
        }
    }
}

/// Caller-supplied reference to a file, one per file to build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDescriptor {
    pub transfer_method: TransferMethod,
    pub url: Option<String>,
    pub related_id: Option<String>,
    pub id: Option<String>,
    pub declared_type: Option<FileType>,
}

#[derive(Debug, Deserialize)]
struct DescriptorMapping {
    transfer_method: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    remote_url: Option<String>,
    #[serde(default)]
    upload_file_id: Option<String>,
    #[serde(default)]
    tool_file_id: Option<String>,
    #[serde(default)]
    related_id: Option<String>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default, rename = "type")]
    file_type: Option<String>,
}

impl FileDescriptor {
    pub fn new(transfer_method: TransferMethod) -> Self {
        Self {
            transfer_method,
            url: None,
            related_id: None,
            id: None,
            declared_type: None,
        }
    }

    pub fn local_file(upload_file_id: impl Into<String>) -> Self {
        Self::new(TransferMethod::LocalFile).with_related_id(upload_file_id)
    }

    pub fn remote_url(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Self::new(TransferMethod::RemoteUrl)
        }
    }

    pub fn tool_file(tool_file_id: impl Into<String>) -> Self {
        Self::new(TransferMethod::ToolFile).with_related_id(tool_file_id)
    }

    pub fn with_related_id(mut self, related_id: impl Into<String>) -> Self {
        self.related_id = Some(related_id.into());
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_declared_type(mut self, file_type: FileType) -> Self {
        self.declared_type = Some(file_type);
        self
    }

    /// Parses the loose JSON mapping sent by API callers.
    ///
    /// The related record id may arrive as `upload_file_id`, `tool_file_id`
    /// or `related_id`; the url as `url` or `remote_url`.
    pub fn from_mapping(mapping: &serde_json::Value) -> Result<Self> {
        let raw: DescriptorMapping = serde_json::from_value(mapping.clone())
            .map_err(|e| FileError::InvalidReference(format!("Malformed file mapping: {}", e)))?;

        let transfer_method = raw
            .transfer_method
            .as_deref()
            .unwrap_or_default()
            .parse::<TransferMethod>()?;

        let declared_type = raw
            .file_type
            .as_deref()
            .filter(|t| !t.is_empty())
            .map(str::parse::<FileType>)
            .transpose()?;

        let related_id = match transfer_method {
            TransferMethod::ToolFile => raw.tool_file_id.or(raw.related_id),
            _ => raw.upload_file_id.or(raw.related_id),
        };

        Ok(Self {
            transfer_method,
            url: raw.url.or(raw.remote_url),
            related_id: related_id.filter(|id| !id.is_empty()),
            id: raw.id,
            declared_type,
        })
    }
}

/// Persisted metadata of an uploaded file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadRecord {
    pub id: Uuid,
    pub tenant_id: String,
    pub name: String,
    /// Stored without the leading dot, e.g. `"pdf"`.
    pub extension: String,
    pub mime_type: String,
    pub size: i64,
    pub key: String,
    pub source_url: String,
    pub created_at: DateTime<Utc>,
}

/// Persisted metadata of a file produced by a tool invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolRecord {
    pub id: Uuid,
    pub tenant_id: String,
    pub name: String,
    /// Storage key; its suffix after the last `.` is the file extension.
    pub file_key: String,
    pub mimetype: String,
    pub size: i64,
    pub original_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileBelongsTo {
    User,
    Assistant,
}

/// A file attached to a conversation message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageFile {
    pub id: String,
    pub transfer_method: TransferMethod,
    pub url: Option<String>,
    #[serde(rename = "type")]
    pub file_type: Option<FileType>,
    pub upload_file_id: Option<String>,
    pub belongs_to: FileBelongsTo,
}

impl From<&MessageFile> for FileDescriptor {
    fn from(message_file: &MessageFile) -> Self {
        Self {
            transfer_method: message_file.transfer_method,
            url: message_file.url.clone(),
            related_id: message_file.upload_file_id.clone(),
            id: Some(message_file.id.clone()),
            declared_type: message_file.file_type,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_transfer_method_tokens() {
        assert_eq!("local_file".parse::<TransferMethod>().unwrap(), TransferMethod::LocalFile);
        assert_eq!("tool_file".parse::<TransferMethod>().unwrap(), TransferMethod::ToolFile);
        assert_eq!(TransferMethod::RemoteUrl.to_string(), "remote_url");

        let err = "ftp".parse::<TransferMethod>().unwrap_err();
        assert!(matches!(err, FileError::UnsupportedMethod(ref m) if m == "ftp"));
    }

    #[test]
    fn test_file_type_tokens() {
        assert_eq!("document".parse::<FileType>().unwrap(), FileType::Document);
        assert!(matches!("spreadsheet".parse::<FileType>(), Err(FileError::InvalidCategory(_))));
        assert_eq!(serde_json::to_value(FileType::Image).unwrap(), json!("image"));
    }

    #[test]
    fn test_descriptor_from_mapping() {
        let descriptor = FileDescriptor::from_mapping(&json!({
            "transfer_method": "local_file",
            "upload_file_id": "c0a80101-0000-4000-8000-000000000001",
            "type": "image",
            "id": "f1",
        }))
        .unwrap();

        assert_eq!(descriptor.transfer_method, TransferMethod::LocalFile);
        assert_eq!(descriptor.related_id.as_deref(), Some("c0a80101-0000-4000-8000-000000000001"));
        assert_eq!(descriptor.declared_type, Some(FileType::Image));
        assert_eq!(descriptor.id.as_deref(), Some("f1"));

        let descriptor = FileDescriptor::from_mapping(&json!({
            "transfer_method": "remote_url",
            "remote_url": "https://example.com/a.png",
        }))
        .unwrap();
        assert_eq!(descriptor.url.as_deref(), Some("https://example.com/a.png"));
        assert_eq!(descriptor.related_id, None);
        assert_eq!(descriptor.declared_type, None);

        let descriptor = FileDescriptor::from_mapping(&json!({
            "transfer_method": "tool_file",
            "tool_file_id": "abc",
        }))
        .unwrap();
        assert_eq!(descriptor.related_id.as_deref(), Some("abc"));
    }

    #[test]
    fn test_descriptor_from_mapping_rejects_unknown_method() {
        let err = FileDescriptor::from_mapping(&json!({ "transfer_method": "carrier_pigeon" })).unwrap_err();
        assert!(matches!(err, FileError::UnsupportedMethod(_)));

        let err = FileDescriptor::from_mapping(&json!({ "url": "https://example.com" })).unwrap_err();
        assert!(matches!(err, FileError::UnsupportedMethod(_)));
    }

    #[test]
    fn test_file_serialization_hides_storage_key() {
        let file = File::new(FileParts {
            id: None,
            tenant_id: "tenant".to_string(),
            filename: "cat.png".to_string(),
            extension: ".png".to_string(),
            mime_type: Some("image/png".to_string()),
            file_type: FileType::Image,
            transfer_method: TransferMethod::LocalFile,
            remote_url: "https://files.example.com/cat.png".to_string(),
            related_id: Some("r1".to_string()),
            size: 10,
            storage_key: "upload_files/tenant/cat.png".to_string(),
        });

        let value = serde_json::to_value(&file).unwrap();
        assert_eq!(value["type"], "image");
        assert_eq!(value["transfer_method"], "local_file");
        assert!(value.get("storage_key").is_none());
        assert_eq!(file.storage_key(), "upload_files/tenant/cat.png");
        assert_eq!(file.markdown(), "![cat.png](https://files.example.com/cat.png)");

        let restored: File = serde_json::from_value(value).unwrap();
        assert_eq!(restored.tenant_id(), "tenant");
        assert_eq!(restored.transfer_method(), TransferMethod::LocalFile);
    }
}
