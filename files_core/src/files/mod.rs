pub mod classify;
pub mod factory;
pub mod memory;
pub mod models;
pub mod policy;
pub mod probe;
pub mod repository;
pub mod signing;
pub mod storage_keys;

pub use classify::{file_type_from_mime_type, standardize_file_type};
pub use factory::FileFactory;
pub use memory::{InMemoryRecordStore, QueryStats};
pub use models::{
    File, FileBelongsTo, FileDescriptor, FileParts, FileType, MessageFile, ToolRecord, TransferMethod,
    UploadRecord, DEFAULT_EXTENSION, UNKNOWN_SIZE,
};
pub use policy::{FileUploadConfig, ImageConfig, UploadPolicy};
pub use probe::{HttpMetadataProbe, RemoteFileInfo, RemoteMetadataProbe};
pub use repository::{RecordStore, SqliteRecordStore};
pub use signing::{HmacUrlSigner, SignedUrlIssuer, UrlSignature};
pub use storage_keys::StorageKeyLoader;
