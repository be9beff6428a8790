//! Time-limited signed access URLs for stored files

use base64::{engine::general_purpose::URL_SAFE, Engine as _};
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use url::form_urlencoded;
use uuid::Uuid;

use crate::config::SigningConfig;
use crate::error::{FileError, Result};

type HmacSha256 = Hmac<Sha256>;

pub trait SignedUrlIssuer: Send + Sync {
    fn upload_file_url(&self, upload_file_id: &Uuid) -> String;
    fn tool_file_url(&self, tool_file_id: &Uuid, extension: &str) -> String;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlSignature {
    pub timestamp: i64,
    pub nonce: String,
    pub sign: String,
}

#[derive(Clone)]
pub struct HmacUrlSigner {
    mac: HmacSha256,
    files_url: String,
    access_timeout_seconds: i64,
}

impl HmacUrlSigner {
    pub fn new(config: &SigningConfig) -> Result<Self> {
        if config.secret_key.is_empty() {
            return Err(FileError::Config("Signing secret key cannot be empty".to_string()));
        }

        let mac = HmacSha256::new_from_slice(config.secret_key.as_bytes())
            .map_err(|e| FileError::Config(format!("Invalid signing key: {}", e)))?;

        Ok(Self {
            mac,
            files_url: config.files_url.trim_end_matches('/').to_string(),
            access_timeout_seconds: config.access_timeout_seconds as i64,
        })
    }

    pub fn sign(&self, file_id: &Uuid) -> UrlSignature {
        let nonce = Uuid::new_v4().simple().to_string();
        self.sign_at(file_id, Utc::now().timestamp(), nonce)
    }

    fn sign_at(&self, file_id: &Uuid, timestamp: i64, nonce: String) -> UrlSignature {
        let mut mac = self.mac.clone();
        mac.update(Self::payload(file_id, timestamp, &nonce).as_bytes());
        let sign = URL_SAFE.encode(mac.finalize().into_bytes());

        UrlSignature { timestamp, nonce, sign }
    }

    /// Checks the signature and that it has not outlived the access timeout.
    pub fn verify(&self, file_id: &Uuid, signature: &UrlSignature) -> bool {
        self.verify_at(file_id, signature, Utc::now().timestamp())
    }

    fn verify_at(&self, file_id: &Uuid, signature: &UrlSignature, now: i64) -> bool {
        let Ok(expected) = URL_SAFE.decode(&signature.sign) else {
            return false;
        };

        let mut mac = self.mac.clone();
        mac.update(Self::payload(file_id, signature.timestamp, &signature.nonce).as_bytes());
        if mac.verify_slice(&expected).is_err() {
            return false;
        }

        now - signature.timestamp <= self.access_timeout_seconds
    }

    fn payload(file_id: &Uuid, timestamp: i64, nonce: &str) -> String {
        format!("file-preview|{}|{}|{}", file_id, timestamp, nonce)
    }

    fn with_query(base: String, signature: &UrlSignature) -> String {
        let query = form_urlencoded::Serializer::new(String::new())
            .append_pair("timestamp", &signature.timestamp.to_string())
            .append_pair("nonce", &signature.nonce)
            .append_pair("sign", &signature.sign)
            .finish();
        format!("{}?{}", base, query)
    }
}

impl SignedUrlIssuer for HmacUrlSigner {
    fn upload_file_url(&self, upload_file_id: &Uuid) -> String {
        let base = format!("{}/files/{}/file-preview", self.files_url, upload_file_id);
        Self::with_query(base, &self.sign(upload_file_id))
    }

    fn tool_file_url(&self, tool_file_id: &Uuid, extension: &str) -> String {
        let base = format!("{}/files/tools/{}{}", self.files_url, tool_file_id, extension);
        Self::with_query(base, &self.sign(tool_file_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signer() -> HmacUrlSigner {
        HmacUrlSigner::new(&SigningConfig {
            secret_key: "test-secret".to_string(),
            files_url: "https://files.example.com/".to_string(),
            access_timeout_seconds: 300,
        })
        .unwrap()
    }

    #[test]
    fn test_signature_verifies() {
        let signer = signer();
        let id = Uuid::new_v4();
        let signature = signer.sign(&id);

        assert!(signer.verify(&id, &signature));
        assert!(!signer.verify(&Uuid::new_v4(), &signature));

        let tampered = UrlSignature {
            nonce: "other".to_string(),
            ..signature.clone()
        };
        assert!(!signer.verify(&id, &tampered));
    }

    #[test]
    fn test_signature_expires() {
        let signer = signer();
        let id = Uuid::new_v4();
        let signature = signer.sign_at(&id, 1_000, "n".to_string());

        assert!(signer.verify_at(&id, &signature, 1_300));
        assert!(!signer.verify_at(&id, &signature, 1_301));
    }

    #[test]
    fn test_other_secret_rejects() {
        let id = Uuid::new_v4();
        let signature = signer().sign(&id);
        let other = HmacUrlSigner::new(&SigningConfig {
            secret_key: "different".to_string(),
            ..SigningConfig::default()
        })
        .unwrap();

        assert!(!other.verify(&id, &signature));
    }

    #[test]
    fn test_url_shapes() {
        let signer = signer();
        let id = Uuid::new_v4();

        let url = signer.upload_file_url(&id);
        assert!(url.starts_with(&format!("https://files.example.com/files/{}/file-preview?timestamp=", id)));
        assert!(url.contains("&nonce=") && url.contains("&sign="));

        let url = signer.tool_file_url(&id, ".png");
        assert!(url.starts_with(&format!("https://files.example.com/files/tools/{}.png?", id)));
    }

    #[test]
    fn test_empty_secret_rejected() {
        let result = HmacUrlSigner::new(&SigningConfig {
            secret_key: String::new(),
            ..SigningConfig::default()
        });
        assert!(matches!(result, Err(FileError::Config(_))));
    }
}
