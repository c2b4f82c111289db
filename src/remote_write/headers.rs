//! HTTP envelope of a remote-write request

use crate::{Error, Result};
use axum::http::{HeaderMap, HeaderName, HeaderValue};
use tracing::{debug, warn};

pub const EXPECTED_CONTENT_TYPE: &str = "application/x-protobuf";
pub const EXPECTED_CONTENT_ENCODING: &str = "snappy";
pub const SUPPORTED_VERSIONS: [&str; 2] = ["0.1.0", "1.0.0"];

/// Largest accepted compressed body
pub const DEFAULT_MAX_REQUEST_BYTES: usize = 100 * 1024 * 1024;

pub const VERSION_HEADER: &str = "x-prometheus-remote-write-version";
pub const STATUS_HEADER: &str = "x-prometheus-remote-write-status";
pub const BYTES_RECEIVED_HEADER: &str = "x-prometheus-remote-write-bytes-received";

/// Headers consulted for the account id, in priority order
pub const ACCOUNT_HEADERS: [&str; 4] = [
    "x-scope-orgid",
    "x-account-id",
    "x-organization-id",
    "x-org-id",
];

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
}

/// Check content type and encoding. An unknown protocol version is only
/// logged.
pub fn validate_headers(headers: &HeaderMap) -> Result<()> {
    let content_type = header_str(headers, "content-type");
    if !content_type.contains(EXPECTED_CONTENT_TYPE) {
        return Err(Error::WireValidation(format!(
            "Invalid Content-Type: expected '{}', got '{}'",
            EXPECTED_CONTENT_TYPE, content_type
        )));
    }

    let content_encoding = header_str(headers, "content-encoding");
    if !content_encoding
        .to_ascii_lowercase()
        .contains(EXPECTED_CONTENT_ENCODING)
    {
        return Err(Error::WireValidation(format!(
            "Invalid Content-Encoding: expected '{}', got '{}'",
            EXPECTED_CONTENT_ENCODING, content_encoding
        )));
    }

    let version = header_str(headers, VERSION_HEADER);
    if !version.is_empty() && !SUPPORTED_VERSIONS.contains(&version) {
        warn!(
            version,
            supported = ?SUPPORTED_VERSIONS,
            "Unsupported remote-write version"
        );
    }

    Ok(())
}

/// Reject empty bodies and bodies over `max_bytes`
pub fn validate_request_size(body_len: usize, max_bytes: usize) -> Result<()> {
    if body_len == 0 {
        return Err(Error::WireValidation("Request body is empty".to_string()));
    }
    if body_len > max_bytes {
        return Err(Error::WireValidation(format!(
            "Request body too large: {} bytes (max: {} bytes, {:.1} MB)",
            body_len,
            max_bytes,
            max_bytes as f64 / (1024.0 * 1024.0)
        )));
    }
    Ok(())
}

/// Parse `major.minor.patch`
pub fn parse_remote_write_version(version: &str) -> Result<(u32, u32, u32)> {
    let invalid = || Error::WireValidation(format!("Invalid version format: {}", version));

    let parts: Vec<&str> = version.split('.').collect();
    let [major, minor, patch] = parts.as_slice() else {
        return Err(invalid());
    };

    let parse = |s: &str| s.parse::<u32>().map_err(|_| invalid());
    Ok((parse(*major)?, parse(*minor)?, parse(*patch)?))
}

/// First non-empty account header, or `default` when none is set
pub fn extract_account_id(headers: &HeaderMap, default: &str) -> String {
    for name in ACCOUNT_HEADERS {
        let value = header_str(headers, name).trim();
        if !value.is_empty() {
            debug!(account_id = value, header = name, "Extracted account id");
            return value.to_string();
        }
    }
    default.to_string()
}

/// Headers attached to a successful remote-write response
pub fn response_headers(bytes_received: usize) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        HeaderName::from_static(STATUS_HEADER),
        HeaderValue::from_static("success"),
    );
    headers.insert(
        HeaderName::from_static(BYTES_RECEIVED_HEADER),
        HeaderValue::from(bytes_received),
    );
    headers
}
