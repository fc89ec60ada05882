//! Context - Per-invocation context and provider configuration
//!
//! Every lifecycle call receives an [`OperationContext`] instead of reaching
//! for process-wide client or configuration singletons. The context carries the
//! logical request id used to correlate log lines and a shared, read-only
//! [`ProviderConfig`].

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tokio::time::Instant;

use crate::retry::RetryPolicy;

/// Default budget for read-type calls (3 minutes)
pub const READ_RETRY_TIMEOUT: Duration = Duration::from_secs(3 * 60);
/// Default budget for mutating calls (5 minutes)
pub const WRITE_RETRY_TIMEOUT: Duration = Duration::from_secs(5 * 60);
/// Default first backoff between retry attempts
pub const DEFAULT_MIN_BACKOFF: Duration = Duration::from_millis(500);
/// Default ceiling for the doubling backoff
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(10);
/// Default number of calls per second allowed for each API action
pub const DEFAULT_RATE_LIMIT_PER_SEC: u32 = 20;

/// Errors raised while loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Per resource family overrides of the built-in wait settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct WaitOverride {
    pub timeout_secs: Option<u64>,
    pub delay_secs: Option<u64>,
    pub poll_interval_secs: Option<u64>,
}

/// Provider configuration
///
/// Loaded from a JSON file; every field has a default so an empty object is a
/// valid configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Vendor region (e.g., "ap-northeast-1")
    pub region: String,
    pub read_timeout_secs: u64,
    pub write_timeout_secs: u64,
    pub min_backoff_ms: u64,
    pub max_backoff_ms: u64,
    /// Client-side limit on calls per second, applied per API action
    pub rate_limit_per_sec: u32,
    /// Keyed by resource type (e.g., "ec2_nat_gateway")
    pub families: HashMap<String, WaitOverride>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            region: "us-east-1".to_string(),
            read_timeout_secs: READ_RETRY_TIMEOUT.as_secs(),
            write_timeout_secs: WRITE_RETRY_TIMEOUT.as_secs(),
            min_backoff_ms: DEFAULT_MIN_BACKOFF.as_millis() as u64,
            max_backoff_ms: DEFAULT_MAX_BACKOFF.as_millis() as u64,
            rate_limit_per_sec: DEFAULT_RATE_LIMIT_PER_SEC,
            families: HashMap::new(),
        }
    }
}

impl ProviderConfig {
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        let config: ProviderConfig = serde_json::from_str(s)?;
        config.check()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&content)
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    fn check(&self) -> Result<(), ConfigError> {
        if self.region.is_empty() {
            return Err(ConfigError::Invalid("region must not be empty".to_string()));
        }
        if self.read_timeout_secs == 0 || self.write_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "retry timeouts must be greater than zero".to_string(),
            ));
        }
        if self.min_backoff_ms > self.max_backoff_ms {
            return Err(ConfigError::Invalid(format!(
                "min_backoff_ms ({}) exceeds max_backoff_ms ({})",
                self.min_backoff_ms, self.max_backoff_ms
            )));
        }
        if self.rate_limit_per_sec == 0 {
            return Err(ConfigError::Invalid(
                "rate_limit_per_sec must be greater than zero".to_string(),
            ));
        }
        for (family, o) in &self.families {
            if o.timeout_secs == Some(0) || o.poll_interval_secs == Some(0) {
                return Err(ConfigError::Invalid(format!(
                    "families.{}: timeout_secs and poll_interval_secs must be greater than zero",
                    family
                )));
            }
        }
        Ok(())
    }

    /// Retry policy for read-type calls
    pub fn read_policy(&self) -> RetryPolicy {
        self.policy(self.read_timeout_secs)
    }

    /// Retry policy for mutating calls
    pub fn write_policy(&self) -> RetryPolicy {
        self.policy(self.write_timeout_secs)
    }

    fn policy(&self, timeout_secs: u64) -> RetryPolicy {
        RetryPolicy::new(Duration::from_secs(timeout_secs)).with_backoff(
            Duration::from_millis(self.min_backoff_ms),
            Duration::from_millis(self.max_backoff_ms),
        )
    }

    pub fn family(&self, resource_type: &str) -> Option<&WaitOverride> {
        self.families.get(resource_type)
    }
}

/// Logical request id attached to every log line of one lifecycle call
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LogId(String);

impl LogId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for LogId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for LogId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for LogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Context passed into every lifecycle call
#[derive(Debug, Clone)]
pub struct OperationContext {
    pub log_id: LogId,
    pub config: Arc<ProviderConfig>,
}

impl OperationContext {
    /// Create a context with a fresh logical request id
    pub fn new(config: Arc<ProviderConfig>) -> Self {
        Self {
            log_id: LogId::new(),
            config,
        }
    }

    pub fn with_log_id(mut self, log_id: impl Into<LogId>) -> Self {
        self.log_id = log_id.into();
        self
    }

    /// Start an elapsed-time guard that logs when dropped
    pub fn elapsed(&self, label: impl Into<String>) -> ElapsedGuard {
        ElapsedGuard {
            label: label.into(),
            log_id: self.log_id.clone(),
            start: Instant::now(),
        }
    }
}

/// Logs how long a lifecycle call took once it goes out of scope
pub struct ElapsedGuard {
    label: String,
    log_id: LogId,
    start: Instant,
}

impl Drop for ElapsedGuard {
    fn drop(&mut self) {
        log::debug!(
            "[{}] {} elapsed {} ms",
            self.log_id,
            self.label,
            self.start.elapsed().as_millis()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_object_uses_defaults() {
        let config = ProviderConfig::from_json_str("{}").unwrap();
        assert_eq!(config, ProviderConfig::default());
        assert_eq!(config.read_policy().timeout, READ_RETRY_TIMEOUT);
        assert_eq!(config.write_policy().timeout, WRITE_RETRY_TIMEOUT);
    }

    #[test]
    fn family_overrides_are_parsed() {
        let config = ProviderConfig::from_json_str(
            r#"{
                "region": "ap-northeast-1",
                "write_timeout_secs": 600,
                "families": {
                    "ec2_nat_gateway": { "timeout_secs": 1800, "poll_interval_secs": 15 }
                }
            }"#,
        )
        .unwrap();

        assert_eq!(config.region, "ap-northeast-1");
        assert_eq!(config.write_policy().timeout, Duration::from_secs(600));
        let nat = config.family("ec2_nat_gateway").unwrap();
        assert_eq!(nat.timeout_secs, Some(1800));
        assert_eq!(nat.poll_interval_secs, Some(15));
        assert_eq!(nat.delay_secs, None);
        assert!(config.family("ec2_vpc").is_none());
    }

    #[test]
    fn rejects_inverted_backoff_bounds() {
        let err = ProviderConfig::from_json_str(r#"{"min_backoff_ms": 5000, "max_backoff_ms": 100}"#)
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_zero_timeout() {
        let err = ProviderConfig::from_json_str(r#"{"read_timeout_secs": 0}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_zero_family_poll_interval() {
        let err = ProviderConfig::from_json_str(
            r#"{"families":{"x":{"poll_interval_secs":0,"delay_secs":0,"timeout_secs":1}}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(ref m) if m.contains("families.x")));

        let err = ProviderConfig::from_json_str(r#"{"families":{"x":{"timeout_secs":0}}}"#)
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let config =
            ProviderConfig::from_json_str(r#"{"families":{"x":{"delay_secs":0}}}"#).unwrap();
        assert_eq!(config.family("x").unwrap().delay_secs, Some(0));
    }

    #[test]
    fn rejects_zero_rate_limit() {
        let err = ProviderConfig::from_json_str(r#"{"rate_limit_per_sec": 0}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
        assert_eq!(
            ProviderConfig::default().rate_limit_per_sec,
            DEFAULT_RATE_LIMIT_PER_SEC
        );
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"region": "eu-west-1"}}"#).unwrap();

        let config = ProviderConfig::from_file(file.path()).unwrap();
        assert_eq!(config.region, "eu-west-1");
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ProviderConfig::from_file(&dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn contexts_get_distinct_log_ids() {
        let config = Arc::new(ProviderConfig::default());
        let a = OperationContext::new(config.clone());
        let b = OperationContext::new(config);
        assert_ne!(a.log_id, b.log_id);

        let fixed = a.with_log_id("req-1");
        assert_eq!(fixed.log_id.as_str(), "req-1");
    }
}
