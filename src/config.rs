//! Runner configuration.
//!
//! Built once at startup (JSON file, then command-line overrides), validated,
//! and passed by reference to the store and the batch runner.
//!
//! ```json
//! {
//!   "bucket": "my-clips",
//!   "region": "eu-west-1",
//!   "credentials": { "type": "aws_env" },
//!   "instance_type": "g4dn.xlarge",
//!   "generator": { "program": "/opt/musicgen/generate.py", "args": ["--seconds", "{duration}"] }
//! }
//! ```

use std::fmt;
use std::path::{Path, PathBuf};

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Fallback hourly rate when the instance type is not in the pricing table.
pub const DEFAULT_HOURLY_RATE_USD: f64 = 0.40;

/// Default longest segment a model is asked for in one pass.
pub const DEFAULT_MAX_SEGMENT_SECS: f64 = 30.0;

/// On-demand hourly prices for the instance types the runner usually lands on.
const INSTANCE_PRICING: &[(&str, f64)] = &[
    ("g4dn.xlarge", 0.526),
    ("g4dn.2xlarge", 0.752),
    ("m5.large", 0.096),
    ("m5.xlarge", 0.192),
];

/// Environment variables read by [`CredentialsStrategy::AwsEnv`].
pub const AWS_ACCESS_KEY_ID_VAR: &str = "AWS_ACCESS_KEY_ID";
pub const AWS_SECRET_ACCESS_KEY_VAR: &str = "AWS_SECRET_ACCESS_KEY";
pub const AWS_SESSION_TOKEN_VAR: &str = "AWS_SESSION_TOKEN";

/// How the HTTP store obtains credentials.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CredentialsStrategy {
    /// AWS access key pair from `AWS_ACCESS_KEY_ID` and
    /// `AWS_SECRET_ACCESS_KEY`, plus `AWS_SESSION_TOKEN` when set. Requests
    /// are signed with Signature Version 4.
    #[default]
    AwsEnv,
    /// AWS access key id given inline, secret read from the named
    /// environment variable.
    AwsKey {
        access_key_id: String,
        secret_env: String,
    },
    /// Unauthenticated requests (public buckets, local gateways).
    Anonymous,
    /// Bearer token read from the named environment variable at startup.
    BearerEnv { var: String },
}

/// AWS access key pair used to sign requests.
#[derive(Clone, PartialEq, Eq)]
pub struct AwsCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl fmt::Debug for AwsCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwsCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &self.session_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Credentials after the strategy has been resolved against the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credentials {
    Anonymous,
    Bearer(String),
    Aws(AwsCredentials),
}

impl CredentialsStrategy {
    /// Resolve the strategy against the process environment.
    pub fn resolve(&self) -> Result<Credentials, ConfigError> {
        self.resolve_with(|name| std::env::var(name).ok())
    }

    /// Resolve the strategy, reading variables through `lookup`.
    pub fn resolve_with(
        &self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Credentials, ConfigError> {
        let required = |var: &str| match lookup(var) {
            Some(value) if !value.trim().is_empty() => Ok(value.trim().to_string()),
            _ => Err(ConfigError::Invalid {
                field: "credentials",
                reason: format!("environment variable {var} is not set"),
            }),
        };

        match self {
            CredentialsStrategy::AwsEnv => Ok(Credentials::Aws(AwsCredentials {
                access_key_id: required(AWS_ACCESS_KEY_ID_VAR)?,
                secret_access_key: required(AWS_SECRET_ACCESS_KEY_VAR)?,
                session_token: required(AWS_SESSION_TOKEN_VAR).ok(),
            })),
            CredentialsStrategy::AwsKey {
                access_key_id,
                secret_env,
            } => Ok(Credentials::Aws(AwsCredentials {
                access_key_id: access_key_id.clone(),
                secret_access_key: required(secret_env.as_str())?,
                session_token: None,
            })),
            CredentialsStrategy::Anonymous => Ok(Credentials::Anonymous),
            CredentialsStrategy::BearerEnv { var } => {
                required(var.as_str()).map(Credentials::Bearer)
            }
        }
    }
}

/// External generator program invocation.
///
/// `{duration}` and `{sample_rate}` in `args` are substituted per segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratorConfig {
    pub program: PathBuf,
    #[serde(default = "default_generator_args")]
    pub args: Vec<String>,
    /// Samples per model frame; output may be off by this much per segment.
    #[serde(default = "default_frame_size")]
    pub frame_size: usize,
}

fn default_generator_args() -> Vec<String> {
    vec!["--duration".to_string(), "{duration}".to_string()]
}

fn default_frame_size() -> usize {
    // 50 tokens per second at 32 kHz
    640
}

impl GeneratorConfig {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: default_generator_args(),
            frame_size: default_frame_size(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder)]
#[builder(default, setter(into), build_fn(error = "ConfigError"))]
#[serde(default)]
pub struct RunnerConfig {
    /// Target bucket for the HTTP store.
    #[builder(setter(into, strip_option))]
    pub bucket: Option<String>,
    pub region: String,
    /// S3-compatible endpoint. Defaults to the AWS regional endpoint.
    #[builder(setter(into, strip_option))]
    pub endpoint: Option<String>,
    pub credentials: CredentialsStrategy,
    /// Explicit hourly rate; overrides the instance pricing table.
    #[builder(setter(into, strip_option))]
    pub hourly_rate_usd: Option<f64>,
    pub instance_type: String,
    /// Write to a local directory instead of a bucket.
    #[builder(setter(into, strip_option))]
    pub store_dir: Option<PathBuf>,
    #[builder(setter(into, strip_option))]
    pub generator: Option<GeneratorConfig>,
    pub max_segment_secs: f64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            bucket: None,
            region: "us-east-1".to_string(),
            endpoint: None,
            credentials: CredentialsStrategy::AwsEnv,
            hourly_rate_usd: None,
            instance_type: "g4dn.xlarge".to_string(),
            store_dir: None,
            generator: None,
            max_segment_secs: DEFAULT_MAX_SEGMENT_SECS,
        }
    }
}

impl RunnerConfig {
    /// Load configuration from a JSON file. Missing keys take defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = serde_json::from_str(&content)?;
        log::info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Hourly cost used for estimates: the explicit rate, else the pricing
    /// table entry for `instance_type`, else [`DEFAULT_HOURLY_RATE_USD`].
    pub fn hourly_rate(&self) -> f64 {
        self.hourly_rate_usd.unwrap_or_else(|| {
            INSTANCE_PRICING
                .iter()
                .find(|(name, _)| *name == self.instance_type)
                .map(|(_, rate)| *rate)
                .unwrap_or(DEFAULT_HOURLY_RATE_USD)
        })
    }

    pub fn endpoint_url(&self) -> String {
        self.endpoint
            .clone()
            .unwrap_or_else(|| format!("https://s3.{}.amazonaws.com", self.region))
    }

    /// Check settings that would otherwise fail halfway through a batch.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(bucket) = &self.bucket {
            if !is_valid_bucket_name(bucket) {
                return Err(ConfigError::Invalid {
                    field: "bucket",
                    reason: format!("'{bucket}' is not a valid bucket name"),
                });
            }
        }

        if self.region.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "region",
                reason: "region is empty".to_string(),
            });
        }

        if let Some(rate) = self.hourly_rate_usd {
            if !rate.is_finite() || rate < 0.0 {
                return Err(ConfigError::Invalid {
                    field: "hourly_rate_usd",
                    reason: format!("{rate} is not a non-negative amount"),
                });
            }
        }

        if !self.max_segment_secs.is_finite() || self.max_segment_secs <= 0.0 {
            return Err(ConfigError::Invalid {
                field: "max_segment_secs",
                reason: format!("{} must be positive", self.max_segment_secs),
            });
        }

        if let Some(generator) = &self.generator {
            if generator.program.as_os_str().is_empty() {
                return Err(ConfigError::Invalid {
                    field: "generator",
                    reason: "program is empty".to_string(),
                });
            }
            if generator.frame_size == 0 {
                return Err(ConfigError::Invalid {
                    field: "generator",
                    reason: "frame_size must be at least 1".to_string(),
                });
            }
        }

        Ok(())
    }
}

/// Bucket naming rules: 3-63 characters, ASCII alphanumerics plus `-` and
/// `.`, not starting or ending with `-`.
pub fn is_valid_bucket_name(name: &str) -> bool {
    (3..=63).contains(&name.len())
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.')
        && !name.starts_with('-')
        && !name.ends_with('-')
}
