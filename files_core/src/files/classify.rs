//! Content-type inference from file extension and mime type

use lazy_static::lazy_static;
use std::collections::{HashMap, HashSet};

use super::models::FileType;

lazy_static! {
    static ref IMAGE_EXTENSIONS: HashSet<&'static str> =
        ["jpg", "jpeg", "png", "webp", "gif", "svg"].into_iter().collect();

    static ref VIDEO_EXTENSIONS: HashSet<&'static str> =
        ["mp4", "mov", "mpeg", "webm"].into_iter().collect();

    static ref AUDIO_EXTENSIONS: HashSet<&'static str> =
        ["mp3", "m4a", "wav", "amr", "mpga"].into_iter().collect();

    static ref DOCUMENT_EXTENSIONS: HashSet<&'static str> = [
        "txt", "markdown", "md", "mdx", "pdf", "html", "htm", "xlsx", "xls", "vtt",
        "properties", "doc", "docx", "csv", "eml", "msg", "pptx", "ppt", "xml", "epub",
    ]
    .into_iter()
    .collect();

    static ref PREFERRED_EXTENSIONS: HashMap<&'static str, &'static str> = [
        ("application/octet-stream", ".bin"),
        ("image/jpeg", ".jpg"),
        ("image/png", ".png"),
        ("image/gif", ".gif"),
        ("image/webp", ".webp"),
        ("image/svg+xml", ".svg"),
        ("video/mp4", ".mp4"),
        ("video/quicktime", ".mov"),
        ("video/mpeg", ".mpeg"),
        ("video/webm", ".webm"),
        ("audio/mpeg", ".mp3"),
        ("audio/mp4", ".m4a"),
        ("audio/wav", ".wav"),
        ("audio/x-wav", ".wav"),
        ("audio/amr", ".amr"),
        ("text/plain", ".txt"),
        ("text/markdown", ".md"),
        ("text/csv", ".csv"),
        ("text/html", ".html"),
        ("text/xml", ".xml"),
        ("text/vtt", ".vtt"),
        ("application/xml", ".xml"),
        ("application/json", ".json"),
        ("application/pdf", ".pdf"),
        ("application/zip", ".zip"),
        ("application/epub+zip", ".epub"),
        ("application/msword", ".doc"),
        ("application/vnd.openxmlformats-officedocument.wordprocessingml.document", ".docx"),
        ("application/vnd.ms-excel", ".xls"),
        ("application/vnd.openxmlformats-officedocument.spreadsheetml.sheet", ".xlsx"),
        ("application/vnd.ms-powerpoint", ".ppt"),
        ("application/vnd.openxmlformats-officedocument.presentationml.presentation", ".pptx"),
        ("message/rfc822", ".eml"),
    ]
    .into_iter()
    .collect();
}

/// Infers the file type, trusting the extension over the mime type.
///
/// Never fails: anything unrecognised is [`FileType::Custom`].
pub fn standardize_file_type(extension: &str, mime_type: &str) -> FileType {
    let guessed = if extension.is_empty() {
        None
    } else {
        file_type_from_extension(extension)
    };

    guessed
        .or_else(|| mime_type_category(mime_type))
        .unwrap_or(FileType::Custom)
}

pub fn file_type_from_extension(extension: &str) -> Option<FileType> {
    let extension = extension.trim_start_matches('.').to_ascii_lowercase();
    let extension = extension.as_str();

    if IMAGE_EXTENSIONS.contains(extension) {
        Some(FileType::Image)
    } else if VIDEO_EXTENSIONS.contains(extension) {
        Some(FileType::Video)
    } else if AUDIO_EXTENSIONS.contains(extension) {
        Some(FileType::Audio)
    } else if DOCUMENT_EXTENSIONS.contains(extension) {
        Some(FileType::Document)
    } else {
        None
    }
}

pub fn file_type_from_mime_type(mime_type: &str) -> FileType {
    mime_type_category(mime_type).unwrap_or(FileType::Custom)
}

fn mime_type_category(mime_type: &str) -> Option<FileType> {
    if mime_type.contains("image") {
        Some(FileType::Image)
    } else if mime_type.contains("video") {
        Some(FileType::Video)
    } else if mime_type.contains("audio") {
        Some(FileType::Audio)
    } else if mime_type.contains("text") || mime_type.contains("pdf") {
        Some(FileType::Document)
    } else {
        None
    }
}

/// Canonical extension for common mime types, e.g. `.jpg` for `image/jpeg`.
pub fn preferred_extension(mime_type: &str) -> Option<&'static str> {
    let essence = mime_type.split(';').next().unwrap_or_default().trim().to_ascii_lowercase();
    PREFERRED_EXTENSIONS.get(essence.as_str()).copied()
}

/// Lower-cases an extension and gives it a single leading dot; empty stays empty.
pub fn normalize_extension(raw: &str) -> String {
    let trimmed = raw.trim().trim_start_matches('.');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!(".{}", trimmed.to_ascii_lowercase())
    }
}
