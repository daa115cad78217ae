//! S3-compatible object store over HTTP.
//!
//! Uses path-style addressing (`{endpoint}/{bucket}/{key}`) and the
//! `ListObjectsV2` API for listing. Requests are signed with AWS Signature
//! Version 4 by default; anonymous and bearer-token access are available for
//! gateways that accept them.

use std::time::Duration;

use reqwest::blocking::{Client, Response};
use reqwest::{Method, StatusCode, Url};
use serde::Deserialize;

use super::sigv4::{encode_segment, Signer};
use super::{validate_key, ArtifactStore};
use crate::config::{Credentials, RunnerConfig};
use crate::error::{ConfigError, StoreError};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

enum Auth {
    Anonymous,
    Bearer(String),
    SigV4(Signer),
}

pub struct HttpStore {
    client: Client,
    bucket_url: Url,
    auth: Auth,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListBucketResult {
    #[serde(default)]
    contents: Vec<ListedObject>,
    #[serde(default)]
    is_truncated: bool,
    next_continuation_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListedObject {
    key: String,
}

impl HttpStore {
    /// Build a store from the bucket, endpoint, region and credentials settings.
    pub fn from_config(config: &RunnerConfig) -> Result<Self, ConfigError> {
        let bucket = config.bucket.as_deref().ok_or(ConfigError::Missing("bucket"))?;
        let endpoint = config.endpoint_url();
        let credentials = config.credentials.resolve()?;

        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ConfigError::Invalid {
                field: "endpoint",
                reason: e.to_string(),
            })?;

        Self::new(client, &endpoint, bucket, &config.region, credentials)
    }

    pub fn new(
        client: Client,
        endpoint: &str,
        bucket: &str,
        region: &str,
        credentials: Credentials,
    ) -> Result<Self, ConfigError> {
        let invalid = |reason: String| ConfigError::Invalid {
            field: "endpoint",
            reason,
        };

        let mut bucket_url = Url::parse(endpoint).map_err(|e| invalid(e.to_string()))?;
        if bucket_url.cannot_be_a_base() {
            return Err(invalid(format!("'{endpoint}' cannot be used as a base URL")));
        }
        let path = format!(
            "{}/{}",
            bucket_url.path().trim_end_matches('/'),
            encode_segment(bucket)
        );
        bucket_url.set_path(&path);
        bucket_url.set_query(None);

        let auth = match credentials {
            Credentials::Anonymous => Auth::Anonymous,
            Credentials::Bearer(token) => Auth::Bearer(token),
            Credentials::Aws(aws) => Auth::SigV4(Signer::new(aws, region)),
        };

        Ok(Self {
            client,
            bucket_url,
            auth,
        })
    }

    fn object_url(&self, key: &str) -> Result<Url, StoreError> {
        validate_key(key)?;
        let encoded: Vec<String> = key.split('/').map(encode_segment).collect();
        let mut url = self.bucket_url.clone();
        url.set_path(&format!("{}/{}", self.bucket_url.path(), encoded.join("/")));
        Ok(url)
    }

    fn list_url(&self, prefix: &str, continuation: Option<&str>) -> Url {
        // Sorted by name so the query is already in canonical order.
        let mut query = Vec::new();
        if let Some(token) = continuation {
            query.push(format!("continuation-token={}", encode_segment(token)));
        }
        query.push("list-type=2".to_string());
        query.push(format!("prefix={}", encode_segment(prefix)));

        let mut url = self.bucket_url.clone();
        url.set_query(Some(&query.join("&")));
        url
    }

    fn send(
        &self,
        method: Method,
        url: Url,
        body: Option<(&[u8], &str)>,
    ) -> Result<Response, StoreError> {
        let payload = body.map(|(bytes, _)| bytes).unwrap_or_default();
        let mut request = match &self.auth {
            Auth::Anonymous => self.client.request(method, url),
            Auth::Bearer(token) => self.client.request(method, url).bearer_auth(token),
            Auth::SigV4(signer) => {
                let headers = signer.sign(method.as_str(), &url, payload, chrono::Utc::now())?;
                headers.into_iter().fold(
                    self.client.request(method, url),
                    |request, (name, value)| request.header(name, value),
                )
            }
        };
        if let Some((bytes, content_type)) = body {
            request = request
                .header(reqwest::header::CONTENT_TYPE, content_type)
                .body(bytes.to_vec());
        }
        request
            .send()
            .map_err(|e| StoreError::Unavailable(e.to_string()))
    }
}

/// Map a non-success status to an error, treating auth failures as the
/// store being unreachable for this caller.
fn status_error(status: StatusCode, context: &str) -> StoreError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            StoreError::Unavailable(format!("access denied ({status}) while {context}"))
        }
        _ => StoreError::Unavailable(format!("unexpected status {status} while {context}")),
    }
}

impl ArtifactStore for HttpStore {
    fn exists(&self, key: &str) -> Result<bool, StoreError> {
        let url = self.object_url(key)?;
        let response = self.send(Method::HEAD, url, None)?;
        match response.status() {
            s if s.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            s => Err(status_error(s, &format!("checking '{key}'"))),
        }
    }

    fn put(&self, key: &str, bytes: &[u8], content_type: &str) -> Result<(), StoreError> {
        let url = self.object_url(key)?;
        let response = self.send(Method::PUT, url, Some((bytes, content_type)))?;

        let status = response.status();
        if status.is_success() {
            log::debug!("Uploaded {} bytes to {key}", bytes.len());
            return Ok(());
        }
        if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
            return Err(status_error(status, &format!("writing '{key}'")));
        }
        let body = response.text().unwrap_or_default();
        Err(StoreError::Write {
            key: key.to_string(),
            reason: format!("status {status}: {}", body.trim()),
        })
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let mut keys = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let url = self.list_url(prefix, continuation.take().as_deref());
            let response = self.send(Method::GET, url, None)?;
            if !response.status().is_success() {
                return Err(status_error(
                    response.status(),
                    &format!("listing prefix '{prefix}'"),
                ));
            }
            let body = response
                .text()
                .map_err(|e| StoreError::Unavailable(e.to_string()))?;
            let page: ListBucketResult = quick_xml::de::from_str(&body)
                .map_err(|e| StoreError::Unavailable(format!("invalid list response: {e}")))?;

            keys.extend(
                page.contents
                    .into_iter()
                    .map(|o| o.key)
                    .filter(|k| !k.ends_with('/')),
            );

            match page.next_continuation_token {
                Some(token) if page.is_truncated => continuation = Some(token),
                _ => break,
            }
        }

        keys.sort_unstable();
        Ok(keys)
    }

    fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        let url = self.object_url(key)?;
        let response = self.send(Method::GET, url, None)?;
        match response.status() {
            s if s.is_success() => response
                .bytes()
                .map(|b| b.to_vec())
                .map_err(|e| StoreError::Unavailable(e.to_string())),
            StatusCode::NOT_FOUND => Err(StoreError::NotFound(key.to_string())),
            s => Err(status_error(s, &format!("reading '{key}'"))),
        }
    }

    fn describe(&self) -> String {
        self.bucket_url.to_string()
    }
}
