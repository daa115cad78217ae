//! AWS Signature Version 4 for S3 requests.
//!
//! Every request signs `host`, `x-amz-content-sha256` and `x-amz-date`, plus
//! `x-amz-security-token` for temporary credentials. The URL's path and query
//! must already be encoded with [`encode_segment`]; the canonical request is
//! built from them as they are sent.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::Url;
use sha2::{Digest, Sha256};

use crate::config::AwsCredentials;
use crate::error::StoreError;

const ALGORITHM: &str = "AWS4-HMAC-SHA256";
const SERVICE: &str = "s3";

type HmacSha256 = Hmac<Sha256>;

/// Percent-encode everything outside the RFC 3986 unreserved set.
pub(crate) fn encode_segment(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}

pub(crate) struct Signer {
    credentials: AwsCredentials,
    region: String,
}

impl Signer {
    pub fn new(credentials: AwsCredentials, region: impl Into<String>) -> Self {
        Self {
            credentials,
            region: region.into(),
        }
    }

    /// Headers to attach to a request for `url` carrying `payload`.
    ///
    /// `host` is signed but not returned; the HTTP client derives the same
    /// value from the URL.
    pub fn sign(
        &self,
        method: &str,
        url: &Url,
        payload: &[u8],
        now: DateTime<Utc>,
    ) -> Result<Vec<(&'static str, String)>, StoreError> {
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let date = now.format("%Y%m%d").to_string();
        let payload_hash = hex::encode(Sha256::digest(payload));

        // Sorted by name.
        let mut headers = vec![
            ("host", host_header(url)),
            ("x-amz-content-sha256", payload_hash.clone()),
            ("x-amz-date", amz_date.clone()),
        ];
        if let Some(token) = &self.credentials.session_token {
            headers.push(("x-amz-security-token", token.clone()));
        }

        let signed_headers = headers
            .iter()
            .map(|(name, _)| *name)
            .collect::<Vec<_>>()
            .join(";");
        let canonical_headers: String = headers
            .iter()
            .map(|(name, value)| format!("{name}:{}\n", value.trim()))
            .collect();

        let canonical_request = format!(
            "{method}\n{}\n{}\n{canonical_headers}\n{signed_headers}\n{payload_hash}",
            url.path(),
            canonical_query(url)
        );
        log::trace!("Canonical request:\n{canonical_request}");

        let scope = format!("{date}/{}/{SERVICE}/aws4_request", self.region);
        let string_to_sign = format!(
            "{ALGORITHM}\n{amz_date}\n{scope}\n{}",
            hex::encode(Sha256::digest(canonical_request.as_bytes()))
        );
        let signature = hex::encode(hmac_sha256(&self.signing_key(&date)?, &string_to_sign)?);

        headers.retain(|(name, _)| *name != "host");
        headers.push((
            "authorization",
            format!(
                "{ALGORITHM} Credential={}/{scope}, SignedHeaders={signed_headers}, Signature={signature}",
                self.credentials.access_key_id
            ),
        ));
        Ok(headers)
    }

    fn signing_key(&self, date: &str) -> Result<Vec<u8>, StoreError> {
        let secret = format!("AWS4{}", self.credentials.secret_access_key);
        let key = hmac_sha256(secret.as_bytes(), date)?;
        let key = hmac_sha256(&key, &self.region)?;
        let key = hmac_sha256(&key, SERVICE)?;
        hmac_sha256(&key, "aws4_request")
    }
}

fn hmac_sha256(key: &[u8], data: &str) -> Result<Vec<u8>, StoreError> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|_| StoreError::Unavailable("invalid request signing key".to_string()))?;
    mac.update(data.as_bytes());
    Ok(mac.finalize().into_bytes().to_vec())
}

fn host_header(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    }
}

/// Query parameters sorted by name. Values are taken as already encoded.
fn canonical_query(url: &Url) -> String {
    let mut pairs: Vec<(&str, &str)> = url
        .query()
        .unwrap_or_default()
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| pair.split_once('=').unwrap_or((pair, "")))
        .collect();
    pairs.sort_unstable();
    pairs
        .iter()
        .map(|(name, value)| format!("{name}={value}"))
        .collect::<Vec<_>>()
        .join("&")
}
