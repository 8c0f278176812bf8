//! Configuration for the node agent.

use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use minik8s_id::NodeName;

use crate::reconciler::ReconcilerConfig;
use crate::worker::{WorkerConfig, DEFAULT_QUEUE_CAPACITY};

/// Node agent configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Name this node registers under.
    pub node_name: NodeName,

    /// Per-pod worker settings.
    pub worker: WorkerConfig,

    /// Event reconciler settings.
    pub reconciler: ReconcilerConfig,

    /// Simulated latency of the mock runtime.
    pub mock_runtime_delay: Duration,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        // Node name can be provided or auto-generated
        let node_name = match lookup("MINIK8S_NODE_NAME") {
            Some(name) => NodeName::parse(&name).context("invalid MINIK8S_NODE_NAME")?,
            None => NodeName::new(),
        };

        let queue_capacity: usize = parse_or(
            &lookup,
            "MINIK8S_WORKER_QUEUE_CAPACITY",
            DEFAULT_QUEUE_CAPACITY,
        )?;
        if queue_capacity == 0 {
            anyhow::bail!("MINIK8S_WORKER_QUEUE_CAPACITY must be at least 1");
        }

        let defaults = ReconcilerConfig::default();
        let max_attempts: u32 = parse_or(
            &lookup,
            "MINIK8S_RECONCILE_MAX_ATTEMPTS",
            defaults.max_attempts,
        )?;
        if max_attempts == 0 {
            anyhow::bail!("MINIK8S_RECONCILE_MAX_ATTEMPTS must be at least 1");
        }

        let delay_ms: u64 = parse_or(&lookup, "MINIK8S_MOCK_RUNTIME_DELAY_MS", 0)?;

        let log_level = lookup("MINIK8S_LOG_LEVEL").unwrap_or_else(|| "info".to_string());

        Ok(Self {
            node_name,
            worker: WorkerConfig { queue_capacity },
            reconciler: ReconcilerConfig {
                max_attempts,
                ..defaults
            },
            mock_runtime_delay: Duration::from_millis(delay_ms),
            log_level,
        })
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("invalid {key}: {raw:?}")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(config.worker.queue_capacity, DEFAULT_QUEUE_CAPACITY);
        assert_eq!(config.reconciler, ReconcilerConfig::default());
        assert_eq!(config.mock_runtime_delay, Duration::ZERO);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("MINIK8S_NODE_NAME", "node-1"),
            ("MINIK8S_WORKER_QUEUE_CAPACITY", "4"),
            ("MINIK8S_RECONCILE_MAX_ATTEMPTS", "2"),
            ("MINIK8S_MOCK_RUNTIME_DELAY_MS", "250"),
            ("MINIK8S_LOG_LEVEL", "debug"),
        ])
        .unwrap();

        assert_eq!(config.node_name.as_str(), "node-1");
        assert_eq!(config.worker.queue_capacity, 4);
        assert_eq!(config.reconciler.max_attempts, 2);
        assert_eq!(config.mock_runtime_delay, Duration::from_millis(250));
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn test_zero_capacity_rejected() {
        assert!(load(&[("MINIK8S_WORKER_QUEUE_CAPACITY", "0")]).is_err());
    }

    #[test]
    fn test_garbage_rejected() {
        let err = load(&[("MINIK8S_WORKER_QUEUE_CAPACITY", "lots")]).unwrap_err();
        assert!(err.to_string().contains("MINIK8S_WORKER_QUEUE_CAPACITY"));
    }

    #[test]
    fn test_invalid_node_name() {
        assert!(load(&[("MINIK8S_NODE_NAME", "node 1")]).is_err());
    }
}
