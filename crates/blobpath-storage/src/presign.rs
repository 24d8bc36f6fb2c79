//! Time-limited read URLs.
//!
//! The store signs the URL with its account-level key material. There is no
//! revocation: a URL stays valid until it expires or the key is rotated.

use std::time::Duration;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use blobpath_models::CloudPath;
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::debug;

use crate::error::{StorageError, StorageResult};
use crate::store::ObjectStore;

/// Default expiry for presigned URLs (1 hour).
pub const DEFAULT_EXPIRY_SECS: u64 = 3600;

/// Maximum allowed expiry (7 days), the SigV4 ceiling.
pub const MAX_EXPIRY_SECS: u64 = 604800;

type HmacSha256 = Hmac<Sha256>;

/// A signed read URL and its validity window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresignedUrl {
    /// The signed URL.
    pub url: String,
    /// Start of the validity window.
    pub issued_at: DateTime<Utc>,
    /// End of the validity window.
    pub expires_at: DateTime<Utc>,
    /// Length of the window in seconds.
    pub expires_in_secs: u64,
}

/// Issue a read URL for `path` valid for `expire_seconds` from now.
///
/// The issuance instant is truncated to whole seconds so the expiry embedded
/// in the URL is exactly `issued_at + expire_seconds`.
pub async fn issue(
    store: &dyn ObjectStore,
    path: &CloudPath,
    expire_seconds: u64,
) -> StorageResult<PresignedUrl> {
    if expire_seconds == 0 {
        return Err(StorageError::PresignFailed(
            "expiry must be at least one second".to_string(),
        ));
    }
    if expire_seconds > MAX_EXPIRY_SECS {
        return Err(StorageError::PresignFailed(format!(
            "expiry of {}s exceeds the maximum of {}s",
            expire_seconds, MAX_EXPIRY_SECS
        )));
    }

    let issued_at = Utc::now().trunc_subsecs(0);
    let expires_in = Duration::from_secs(expire_seconds);
    let expires_at = issued_at + chrono::Duration::seconds(expire_seconds as i64);

    debug!(container = %path.container(), key = %path.key(), expire_seconds, "Presigning read URL");

    let url = store
        .presign_get(path.container(), path.key(), issued_at, expires_in)
        .await?;

    Ok(PresignedUrl {
        url,
        issued_at,
        expires_at,
        expires_in_secs: expire_seconds,
    })
}

/// Read grant signed with HMAC-SHA256, used by stores that sign URLs themselves.
///
/// Query form: `st=<start>&se=<expiry>&sp=r&sig=<signature>` with RFC 3339
/// timestamps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadGrant {
    pub container: String,
    pub key: String,
    pub starts_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl ReadGrant {
    /// Permission string; grants are read-only.
    pub const PERMISSION: &'static str = "r";

    pub fn new(
        container: &str,
        key: &str,
        starts_at: DateTime<Utc>,
        expires_in: Duration,
    ) -> StorageResult<Self> {
        let expires_in = chrono::Duration::from_std(expires_in)
            .map_err(|e| StorageError::PresignFailed(e.to_string()))?;

        Ok(Self {
            container: container.to_string(),
            key: key.to_string(),
            starts_at,
            expires_at: starts_at + expires_in,
        })
    }

    fn string_to_sign(&self) -> String {
        format!(
            "{}\n{}\n{}\n/{}/{}",
            Self::PERMISSION,
            format_time(&self.starts_at),
            format_time(&self.expires_at),
            self.container,
            self.key
        )
    }

    fn mac(&self, secret: &[u8]) -> StorageResult<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(secret)
            .map_err(|e| StorageError::PresignFailed(format!("Invalid HMAC key: {}", e)))?;
        mac.update(self.string_to_sign().as_bytes());
        Ok(mac)
    }

    /// Signed query string for this grant.
    pub fn sign(&self, secret: &[u8]) -> StorageResult<String> {
        let signature = self.mac(secret)?.finalize().into_bytes();

        Ok(format!(
            "st={}&se={}&sp={}&sig={}",
            urlencoding::encode(&format_time(&self.starts_at)),
            urlencoding::encode(&format_time(&self.expires_at)),
            Self::PERMISSION,
            URL_SAFE_NO_PAD.encode(signature)
        ))
    }

    /// Verify a signature against this grant at instant `now`.
    ///
    /// Returns `Ok(false)` for bad signatures and for instants outside the window.
    pub fn verify(&self, signature: &str, secret: &[u8], now: DateTime<Utc>) -> StorageResult<bool> {
        let sig_bytes = match URL_SAFE_NO_PAD.decode(signature) {
            Ok(bytes) => bytes,
            Err(_) => return Ok(false),
        };

        if self.mac(secret)?.verify_slice(&sig_bytes).is_err() {
            return Ok(false);
        }

        Ok(now >= self.starts_at && now < self.expires_at)
    }
}

/// RFC 3339 with whole seconds and a `Z` suffix.
pub fn format_time(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"test-secret-key-32-bytes-long!!!";

    fn grant() -> ReadGrant {
        let start = DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        ReadGrant::new("c1", "notes/todo.txt", start, Duration::from_secs(3600)).unwrap()
    }

    fn signature_of(query: &str) -> String {
        query
            .split('&')
            .find_map(|pair| pair.strip_prefix("sig="))
            .unwrap()
            .to_string()
    }

    #[test]
    fn test_grant_window() {
        let g = grant();
        assert_eq!(format_time(&g.expires_at), "2026-01-01T01:00:00Z");
    }

    #[test]
    fn test_sign_verify() {
        let g = grant();
        let query = g.sign(SECRET).unwrap();
        assert!(query.contains("se=2026-01-01T01%3A00%3A00Z"));
        assert!(query.contains("sp=r"));

        let inside = g.starts_at + chrono::Duration::seconds(10);
        assert!(g.verify(&signature_of(&query), SECRET, inside).unwrap());
    }

    #[test]
    fn test_verify_wrong_secret() {
        let g = grant();
        let query = g.sign(SECRET).unwrap();
        let inside = g.starts_at + chrono::Duration::seconds(10);
        assert!(!g.verify(&signature_of(&query), b"wrong-secret", inside).unwrap());
    }

    #[test]
    fn test_verify_expired() {
        let g = grant();
        let query = g.sign(SECRET).unwrap();
        assert!(!g.verify(&signature_of(&query), SECRET, g.expires_at).unwrap());
    }

    #[test]
    fn test_verify_tampered_key() {
        let g = grant();
        let query = g.sign(SECRET).unwrap();
        let mut other = g.clone();
        other.key = "notes/secret.txt".to_string();
        let inside = g.starts_at + chrono::Duration::seconds(10);
        assert!(!other.verify(&signature_of(&query), SECRET, inside).unwrap());
    }
}
