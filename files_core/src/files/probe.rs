//! Remote file metadata via HTTP HEAD.
//!
//! Metadata from a remote URL is advisory: every failure (blocked host,
//! network error, non-200 answer) degrades to what can be guessed from the URL
//! itself, with [`UNKNOWN_SIZE`] as the size.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use http::{header, HeaderMap, StatusCode};
use reqwest::dns::{Addrs, Name, Resolve, Resolving};
use reqwest::redirect;
use tracing::{debug, warn};

use crate::config::ProbeConfig;
use crate::error::{FileError, Result};
use super::models::UNKNOWN_SIZE;

const MAX_REDIRECTS: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFileInfo {
    pub mime_type: Option<String>,
    pub filename: String,
    pub size: i64,
}

impl RemoteFileInfo {
    /// Best guess from the URL alone: last path segment and its mime type.
    pub fn from_url(url: &str) -> Self {
        let filename = filename_from_url(url).unwrap_or_default();
        Self {
            mime_type: guess_mime_type(&filename),
            filename,
            size: UNKNOWN_SIZE,
        }
    }

    /// Refines the guess with a HEAD response. Non-200 answers are ignored.
    pub fn apply_head_response(&mut self, status: StatusCode, headers: &HeaderMap) {
        if status != StatusCode::OK {
            return;
        }

        if let Some(disposition) = header_str(headers, header::CONTENT_DISPOSITION) {
            if let Some(filename) = parse_content_disposition_filename(disposition) {
                self.mime_type = guess_mime_type(&filename);
                self.filename = filename;
            }
        }

        if let Some(size) = header_str(headers, header::CONTENT_LENGTH)
            .and_then(|v| v.trim().parse::<u64>().ok())
            .and_then(|v| i64::try_from(v).ok())
        {
            self.size = size;
        }
    }
}

#[async_trait]
pub trait RemoteMetadataProbe: Send + Sync {
    async fn head_probe(&self, url: &str) -> RemoteFileInfo;
}

#[derive(Clone)]
pub struct HttpMetadataProbe {
    client: reqwest::Client,
    allow_private_hosts: bool,
}

impl HttpMetadataProbe {
    pub fn new(config: &ProbeConfig) -> Result<Self> {
        let allow_private_hosts = config.allow_private_hosts;
        let redirect_policy = redirect::Policy::custom(move |attempt| {
            if attempt.previous().len() >= MAX_REDIRECTS {
                return attempt.error("too many redirects");
            }
            let private = attempt.url().host_str().map(is_private_host).unwrap_or(true);
            if private && !allow_private_hosts {
                attempt.stop()
            } else {
                attempt.follow()
            }
        });

        let mut builder = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .redirect(redirect_policy);
        if !allow_private_hosts {
            builder = builder.dns_resolver(Arc::new(PublicOnlyResolver));
        }

        let client = builder
            .build()
            .map_err(|e| FileError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            allow_private_hosts,
        })
    }

    fn is_allowed(&self, url: &str) -> bool {
        let Ok(parsed) = url::Url::parse(url) else {
            return false;
        };

        if !matches!(parsed.scheme(), "http" | "https") {
            return false;
        }

        match parsed.host_str() {
            Some(host) => self.allow_private_hosts || !is_private_host(host),
            None => false,
        }
    }
}

#[async_trait]
impl RemoteMetadataProbe for HttpMetadataProbe {
    async fn head_probe(&self, url: &str) -> RemoteFileInfo {
        let mut info = RemoteFileInfo::from_url(url);

        if !self.is_allowed(url) {
            warn!("Skipping metadata probe for disallowed url: {}", url);
            return info;
        }

        match self.client.head(url).send().await {
            Ok(response) => {
                debug!("HEAD {} returned {}", url, response.status());
                info.apply_head_response(response.status(), response.headers());
            }
            Err(e) => {
                warn!("HEAD request to {} failed: {}", url, e);
            }
        }

        info
    }
}

fn header_str(headers: &HeaderMap, name: header::HeaderName) -> Option<&str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn guess_mime_type(filename: &str) -> Option<String> {
    if filename.is_empty() {
        return None;
    }
    mime_guess::from_path(filename)
        .first()
        .map(|mime: mime::Mime| mime.essence_str().to_string())
}

/// Last non-empty path segment of the URL, percent-decoded.
pub fn filename_from_url(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let segment = parsed.path_segments()?.filter(|s| !s.is_empty()).last()?;
    if segment == "." || segment == ".." {
        return None;
    }
    Some(percent_decode(segment).unwrap_or_else(|| segment.to_string()))
}

/// Extracts the filename from a `Content-Disposition` value.
///
/// `filename*=UTF-8''...` takes precedence over `filename=`.
pub fn parse_content_disposition_filename(value: &str) -> Option<String> {
    let mut plain = None;

    for param in value.split(';') {
        let Some((name, v)) = param.trim().split_once('=') else {
            continue;
        };
        let name = name.trim().to_ascii_lowercase();
        let v = v.trim();

        if name == "filename*" {
            let encoded = v
                .strip_prefix("UTF-8''")
                .or_else(|| v.strip_prefix("utf-8''"))
                .unwrap_or(v);
            if let Some(decoded) = percent_decode(encoded.trim_matches('"')).filter(|s| !s.is_empty()) {
                return Some(decoded);
            }
        } else if name == "filename" {
            let unquoted = v.trim_matches('"');
            if !unquoted.is_empty() {
                plain = Some(unquoted.to_string());
            }
        }
    }

    plain
}

fn percent_decode(input: &str) -> Option<String> {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let decoded = std::str::from_utf8(&bytes[i + 1..i + 3])
                .ok()
                .and_then(|hex| u8::from_str_radix(hex, 16).ok());
            if let Some(b) = decoded {
                out.push(b);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8(out).ok()
}

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Resolver that drops private addresses. Hostnames pointing into the
/// internal network fail to resolve, on the first request and on redirects.
struct PublicOnlyResolver;

impl Resolve for PublicOnlyResolver {
    fn resolve(&self, name: Name) -> Resolving {
        let host = name.as_str().to_string();
        Box::pin(async move {
            resolve_public(&host)
                .await
                .map(|addrs| Box::new(addrs.into_iter()) as Addrs)
        })
    }
}

async fn resolve_public(host: &str) -> std::result::Result<Vec<SocketAddr>, BoxError> {
    let resolved = tokio::net::lookup_host((host, 0)).await?;
    let public = public_addrs(resolved);
    if public.is_empty() {
        return Err(format!("{} resolves only to private addresses", host).into());
    }
    Ok(public)
}

fn public_addrs(addrs: impl IntoIterator<Item = SocketAddr>) -> Vec<SocketAddr> {
    addrs.into_iter().filter(|addr| !is_private_ip(addr.ip())).collect()
}

/// Loopback, private, link-local and internal-looking hosts.
pub fn is_private_host(host: &str) -> bool {
    let host = host.trim_start_matches('[').trim_end_matches(']').to_ascii_lowercase();
    if host == "localhost" || host.ends_with(".localhost") || host.ends_with(".local") || host.ends_with(".internal") {
        return true;
    }

    match host.parse::<IpAddr>() {
        Ok(ip) => is_private_ip(ip),
        Err(_) => false,
    }
}

/// IPv4-mapped and IPv4-compatible v6 addresses are judged by their v4 form.
pub fn is_private_ip(ip: IpAddr) -> bool {
    match ip.to_canonical() {
        IpAddr::V4(v4) => is_private_v4(v4),
        IpAddr::V6(v6) => {
            v6.is_loopback()
                || v6.is_unspecified()
                || (v6.segments()[0] & 0xffc0) == 0xfe80
                || (v6.segments()[0] & 0xfe00) == 0xfc00
                || v6.to_ipv4().is_some_and(is_private_v4)
        }
    }
}

fn is_private_v4(v4: Ipv4Addr) -> bool {
    let [a, b, ..] = v4.octets();
    v4.is_loopback()
        || v4.is_private()
        || v4.is_link_local()
        || v4.is_unspecified()
        || v4.is_broadcast()
        // 100.64.0.0/10 carrier-grade NAT
        || (a == 100 && (b & 0xc0) == 64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    #[test]
    fn test_from_url_guesses_name_and_mime() {
        let info = RemoteFileInfo::from_url("https://x/y.csv");
        assert_eq!(info.filename, "y.csv");
        assert_eq!(info.mime_type.as_deref(), Some("text/csv"));
        assert_eq!(info.size, UNKNOWN_SIZE);

        let info = RemoteFileInfo::from_url("https://example.com/files/report%20final.pdf?sig=abc");
        assert_eq!(info.filename, "report final.pdf");
        assert_eq!(info.mime_type.as_deref(), Some("application/pdf"));

        let info = RemoteFileInfo::from_url("https://example.com/");
        assert_eq!(info.filename, "");
        assert_eq!(info.mime_type, None);
    }

    #[test]
    fn test_head_response_refines_guess() {
        let mut info = RemoteFileInfo::from_url("https://example.com/download?id=7");
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_DISPOSITION, HeaderValue::from_static("attachment; filename=\"r.pdf\""));
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("42"));

        info.apply_head_response(StatusCode::OK, &headers);
        assert_eq!(info.filename, "r.pdf");
        assert_eq!(info.mime_type.as_deref(), Some("application/pdf"));
        assert_eq!(info.size, 42);
    }

    #[test]
    fn test_non_ok_response_is_ignored() {
        let mut info = RemoteFileInfo::from_url("https://x/y.csv");
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("42"));

        info.apply_head_response(StatusCode::NOT_FOUND, &headers);
        assert_eq!(info, RemoteFileInfo::from_url("https://x/y.csv"));
    }

    #[test]
    fn test_negative_content_length_keeps_unknown_size() {
        let mut info = RemoteFileInfo::from_url("https://x/y.csv");
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("-5"));

        info.apply_head_response(StatusCode::OK, &headers);
        assert_eq!(info.size, UNKNOWN_SIZE);
    }

    #[test]
    fn test_content_disposition_variants() {
        assert_eq!(parse_content_disposition_filename("attachment; filename=plain.txt").as_deref(), Some("plain.txt"));
        assert_eq!(
            parse_content_disposition_filename("attachment; filename=\"a.txt\"; filename*=UTF-8''b%C3%A9.txt").as_deref(),
            Some("bé.txt")
        );
        assert_eq!(parse_content_disposition_filename("inline"), None);
    }

    #[test]
    fn test_private_hosts() {
        assert!(is_private_host("localhost"));
        assert!(is_private_host("127.0.0.1"));
        assert!(is_private_host("10.1.2.3"));
        assert!(is_private_host("192.168.0.10"));
        assert!(is_private_host("169.254.169.254"));
        assert!(is_private_host("[::1]"));
        assert!(is_private_host("metadata.internal"));
        assert!(!is_private_host("8.8.8.8"));
        assert!(!is_private_host("example.com"));
    }

    #[test]
    fn test_mapped_ipv6_hosts_are_private() {
        assert!(is_private_host("[::ffff:127.0.0.1]"));
        assert!(is_private_host("[::ffff:7f00:1]"));
        assert!(is_private_host("[::ffff:169.254.169.254]"));
        assert!(is_private_host("[::ffff:10.0.0.1]"));
        assert!(is_private_host("[::127.0.0.1]"));
        assert!(is_private_host("[fd00::1]"));
        assert!(is_private_host("100.64.1.1"));
        assert!(!is_private_host("[::ffff:8.8.8.8]"));
        assert!(!is_private_host("[2606:4700::1111]"));

        let probe = HttpMetadataProbe::new(&ProbeConfig::default()).unwrap();
        assert!(!probe.is_allowed("http://[::ffff:127.0.0.1]:8080/admin.csv"));
        assert!(!probe.is_allowed("http://[::ffff:169.254.169.254]/latest/meta-data"));
    }

    #[test]
    fn test_resolved_private_addresses_are_dropped() {
        let addrs: Vec<SocketAddr> = vec![
            "127.0.0.1:0".parse().unwrap(),
            "[::ffff:10.1.2.3]:0".parse().unwrap(),
            "93.184.216.34:0".parse().unwrap(),
        ];
        assert_eq!(public_addrs(addrs), vec!["93.184.216.34:0".parse::<SocketAddr>().unwrap()]);
        assert!(public_addrs(vec!["[::1]:0".parse::<SocketAddr>().unwrap()]).is_empty());
    }

    #[tokio::test]
    async fn test_localhost_never_resolves() {
        assert!(resolve_public("localhost").await.is_err());
    }

    #[tokio::test]
    async fn test_probe_skips_private_hosts() {
        let probe = HttpMetadataProbe::new(&ProbeConfig::default()).unwrap();
        let info = probe.head_probe("http://127.0.0.1:1/secret.csv").await;

        assert_eq!(info.filename, "secret.csv");
        assert_eq!(info.size, UNKNOWN_SIZE);
        assert!(!probe.is_allowed("file:///etc/passwd"));
        assert!(probe.is_allowed("https://example.com/a.png"));
    }

    #[tokio::test]
    async fn test_probe_swallows_connection_errors() {
        let config = ProbeConfig {
            allow_private_hosts: true,
            ..ProbeConfig::default()
        };
        let probe = HttpMetadataProbe::new(&config).unwrap();
        let info = probe.head_probe("http://127.0.0.1:1/data.json").await;

        assert_eq!(info.filename, "data.json");
        assert_eq!(info.mime_type.as_deref(), Some("application/json"));
        assert_eq!(info.size, UNKNOWN_SIZE);
    }
}
