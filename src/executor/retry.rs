use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::SqlTemplateError;

const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_BACKOFF_MS: u64 = 100;

/// Error messages treated as transient unless configured otherwise.
pub const DEFAULT_TRANSIENT_MARKERS: &[&str] = &[
    "Unable to connect to any of the specified MySQL hosts.",
    "Too many connections",
    "error connecting: Timeout expired.",
    "database is locked",
];

/// How often a failed call is re-attempted, and which failures qualify.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_retries: u32,
    /// Delay before the first retry; each further retry waits one more multiple of it.
    #[serde(rename = "backoff_ms", with = "millis")]
    pub backoff: Duration,
    pub transient_markers: Vec<String>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            backoff: Duration::from_millis(DEFAULT_BACKOFF_MS),
            transient_markers: DEFAULT_TRANSIENT_MARKERS
                .iter()
                .map(|m| (*m).to_string())
                .collect(),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    #[must_use]
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    #[must_use]
    pub fn with_marker(mut self, marker: impl Into<String>) -> Self {
        self.transient_markers.push(marker.into());
        self
    }

    /// True when `err` is a driver failure whose message carries a transient marker.
    #[must_use]
    pub fn is_transient(&self, err: &SqlTemplateError) -> bool {
        if err.is_template_failure() {
            return false;
        }
        let message = match err {
            SqlTemplateError::ConnectionError(msg) | SqlTemplateError::ExecutionError(msg) => {
                msg.clone()
            }
            #[cfg(feature = "sqlite")]
            SqlTemplateError::SqliteError(e) => e.to_string(),
            #[cfg(feature = "postgres")]
            SqlTemplateError::PostgresError(e) => e.to_string(),
            _ => return false,
        };
        self.transient_markers
            .iter()
            .any(|marker| !marker.is_empty() && message.contains(marker.as_str()))
    }

    /// Runs `op`, re-running it after transient failures up to `max_retries` times.
    ///
    /// # Errors
    /// Returns the last error once it is not transient or retries are exhausted.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut op: F) -> Result<T, SqlTemplateError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, SqlTemplateError>>,
    {
        let mut attempt: u32 = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if attempt < self.max_retries && self.is_transient(&err) => {
                    attempt += 1;
                    info!(
                        operation,
                        attempt,
                        max_retries = self.max_retries,
                        error = %err,
                        "transient failure; retrying"
                    );
                    tokio::time::sleep(self.backoff * attempt).await;
                }
                Err(err) => {
                    if attempt > 0 {
                        warn!(operation, attempts = attempt + 1, error = %err, "giving up");
                    }
                    return Err(err);
                }
            }
        }
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use tokio::runtime::Runtime;

    use super::*;

    fn quick() -> RetryPolicy {
        RetryPolicy::default().with_backoff(Duration::from_millis(1))
    }

    #[test]
    fn transient_errors_are_retried_until_success() {
        let rt = Runtime::new().unwrap();
        let calls = AtomicU32::new(0);
        let calls = &calls;
        let result = rt.block_on(quick().run("test", move || async move {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Err(SqlTemplateError::ConnectionError("Too many connections".into()))
            } else {
                Ok(n)
            }
        }));
        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn retries_stop_at_the_limit() {
        let rt = Runtime::new().unwrap();
        let calls = AtomicU32::new(0);
        let calls = &calls;
        let result: Result<(), _> = rt.block_on(quick().run("test", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(SqlTemplateError::ExecutionError("database is locked".into()))
        }));
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn template_and_unknown_errors_are_not_retried() {
        let policy = quick();
        assert!(!policy.is_transient(&SqlTemplateError::Template("Too many connections".into())));
        assert!(!policy.is_transient(&SqlTemplateError::ExecutionError("syntax error".into())));
        assert!(!policy.is_transient(&SqlTemplateError::ParameterError(
            "Too many connections".into()
        )));
    }

    #[test]
    fn deserializes_with_defaults() {
        let policy: RetryPolicy = serde_json::from_str(r#"{"max_retries": 1, "backoff_ms": 5}"#).unwrap();
        assert_eq!(policy.max_retries, 1);
        assert_eq!(policy.backoff, Duration::from_millis(5));
        assert!(policy.transient_markers.iter().any(|m| m == "database is locked"));
    }
}
