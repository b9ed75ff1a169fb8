//! Engine configuration
//!
//! The configuration is built once, validated once at engine construction and
//! never changes afterwards.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Buffering discipline of the engine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Bounded buffer, producers block when it is full. Suited to replaying
    /// files from disk.
    #[default]
    Synchronous,

    /// Unbounded buffer, producers never block. Suited to live streams.
    Asynchronous,
}

/// Configuration for an ingestion engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Name used in logs and for the extraction thread
    pub name: String,

    /// Buffering discipline
    pub mode: Mode,

    /// Number of buffered samples that triggers a full batch
    pub batch_size: usize,

    /// Idle time after which a partial batch is flushed
    #[serde(rename = "idle_timeout_ms", with = "millis")]
    pub idle_timeout: Duration,

    /// Sleep between two checks of the flush trigger
    #[serde(rename = "poll_interval_ms", with = "millis")]
    pub poll_interval: Duration,

    /// Expected worker kinds, all identical
    pub worker_kinds: Vec<String>,

    /// Dispatch whatever is still buffered when the engine shuts down
    pub flush_on_shutdown: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            name: "engine".to_string(),
            mode: Mode::Synchronous,
            batch_size: 1,
            idle_timeout: Duration::from_secs(10),
            poll_interval: Duration::from_millis(10),
            worker_kinds: Vec::new(),
            flush_on_shutdown: true,
        }
    }
}

impl EngineConfig {
    /// Set the engine name
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the buffering discipline
    #[must_use]
    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the batch size
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Set the idle timeout
    #[must_use]
    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// Set the poll interval
    #[must_use]
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Set the expected worker kinds
    #[must_use]
    pub fn with_worker_kinds<I, S>(mut self, kinds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.worker_kinds = kinds.into_iter().map(Into::into).collect();
        self
    }

    /// Choose whether buffered samples are dispatched on shutdown
    #[must_use]
    pub fn with_flush_on_shutdown(mut self, flush: bool) -> Self {
        self.flush_on_shutdown = flush;
        self
    }

    /// Check every option; called once by the engine before starting
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::InvalidConfig("batch_size must be greater than 0".into()));
        }

        if self.idle_timeout.is_zero() {
            return Err(Error::InvalidConfig("idle_timeout must be greater than 0".into()));
        }

        if self.poll_interval.is_zero() {
            return Err(Error::InvalidConfig("poll_interval must be greater than 0".into()));
        }

        if self.poll_interval > self.idle_timeout {
            return Err(Error::InvalidConfig(format!(
                "poll_interval ({:?}) must not exceed idle_timeout ({:?})",
                self.poll_interval, self.idle_timeout
            )));
        }

        if let Some(first) = self.worker_kinds.first() {
            if let Some(other) = self.worker_kinds.iter().find(|k| *k != first) {
                return Err(Error::HeterogeneousWorkers {
                    expected: first.clone(),
                    found: other.clone(),
                });
            }
        }

        Ok(())
    }

    /// Parse a JSON document; missing fields take their default value
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read the configuration from environment variables, once, at startup.
    ///
    /// Recognised variables: `BATCH_SIZE`, `IDLE_TIMEOUT_MS`,
    /// `POLL_INTERVAL_MS`, `ASYNCHRONOUS`, `WORKER_KINDS` (`|`-separated).
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(value) = lookup("BATCH_SIZE") {
            config.batch_size = parse_number("BATCH_SIZE", &value)?;
        }

        if let Some(value) = lookup("IDLE_TIMEOUT_MS") {
            config.idle_timeout = Duration::from_millis(parse_number("IDLE_TIMEOUT_MS", &value)?);
        }

        if let Some(value) = lookup("POLL_INTERVAL_MS") {
            config.poll_interval = Duration::from_millis(parse_number("POLL_INTERVAL_MS", &value)?);
        }

        if let Some(value) = lookup("ASYNCHRONOUS") {
            config.mode = if parse_bool("ASYNCHRONOUS", &value)? {
                Mode::Asynchronous
            } else {
                Mode::Synchronous
            };
        }

        if let Some(value) = lookup("WORKER_KINDS") {
            config.worker_kinds = value
                .split('|')
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(String::from)
                .collect();
        }

        config.validate()?;
        Ok(config)
    }
}

fn parse_number<N: std::str::FromStr>(key: &str, value: &str) -> Result<N> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::InvalidConfig(format!("{key}: `{value}` is not a valid number")))
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(Error::InvalidConfig(format!("{key}: `{value}` is not a boolean"))),
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
    use super::*;
    use std::collections::HashMap;
    use test_case::test_case;

    #[test]
    fn test_default_is_valid() {
        EngineConfig::default().validate().unwrap();
    }

    #[test_case(EngineConfig::default().with_batch_size(0) ; "zero batch size")]
    #[test_case(EngineConfig::default().with_idle_timeout(Duration::ZERO) ; "zero timeout")]
    #[test_case(EngineConfig::default().with_poll_interval(Duration::ZERO) ; "zero poll interval")]
    #[test_case(
        EngineConfig::default()
            .with_idle_timeout(Duration::from_millis(5))
            .with_poll_interval(Duration::from_millis(10))
        ; "poll slower than timeout"
    )]
    fn test_invalid_config(config: EngineConfig) {
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_heterogeneous_worker_kinds_rejected() {
        let config = EngineConfig::default().with_worker_kinds(["detector", "reid"]);
        assert!(matches!(
            config.validate(),
            Err(Error::HeterogeneousWorkers { expected, found }) if expected == "detector" && found == "reid"
        ));

        EngineConfig::default()
            .with_worker_kinds(["detector", "detector", "detector"])
            .validate()
            .unwrap();
    }

    #[test]
    fn test_from_json() {
        let config = EngineConfig::from_json(
            r#"{"mode": "asynchronous", "batch_size": 8, "idle_timeout_ms": 250, "worker_kinds": ["reid"]}"#,
        )
        .unwrap();

        assert_eq!(config.mode, Mode::Asynchronous);
        assert_eq!(config.batch_size, 8);
        assert_eq!(config.idle_timeout, Duration::from_millis(250));
        assert_eq!(config.poll_interval, Duration::from_millis(10));
        assert_eq!(config.worker_kinds, vec!["reid".to_string()]);
    }

    #[test]
    fn test_json_roundtrip() {
        let config = EngineConfig::default()
            .with_mode(Mode::Asynchronous)
            .with_batch_size(3);
        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(EngineConfig::from_json(&json).unwrap(), config);
    }

    #[test]
    fn test_from_lookup() {
        let vars: HashMap<&str, &str> = [
            ("BATCH_SIZE", "16"),
            ("IDLE_TIMEOUT_MS", "1500"),
            ("ASYNCHRONOUS", "True"),
            ("WORKER_KINDS", "detector|detector"),
        ]
        .into_iter()
        .collect();

        let config = EngineConfig::from_lookup(|key| vars.get(key).map(|v| (*v).to_string())).unwrap();
        assert_eq!(config.batch_size, 16);
        assert_eq!(config.idle_timeout, Duration::from_millis(1500));
        assert_eq!(config.mode, Mode::Asynchronous);
        assert_eq!(config.worker_kinds.len(), 2);
    }

    #[test_case("BATCH_SIZE", "many" ; "non numeric batch size")]
    #[test_case("ASYNCHRONOUS", "maybe" ; "non boolean mode")]
    #[test_case("BATCH_SIZE", "0" ; "zero batch size")]
    fn test_from_lookup_rejects(key: &'static str, value: &'static str) {
        let result = EngineConfig::from_lookup(|k| (k == key).then(|| value.to_string()));
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }
}
