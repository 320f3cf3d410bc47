// src/config.rs
use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::ingest::IngestCfg;
use crate::producer::ProducerCfg;
use crate::reduce::{ideal_average, ReduceLoopCfg};
use crate::window::DEFAULT_CAPACITY;

pub const ENV_CONFIG_PATH: &str = "RUNNING_AVG_CONFIG";
const ENV_NODES: &str = "RUNNING_AVG_NODES";
const ENV_WINDOW: &str = "RUNNING_AVG_WINDOW";
const ENV_BIND: &str = "RUNNING_AVG_BIND";
const ENV_METRICS: &str = "RUNNING_AVG_METRICS";

fn default_window_capacity() -> usize {
    DEFAULT_CAPACITY
}
fn default_value_range() -> i64 {
    100
}
fn default_reduce_interval_ms() -> u64 {
    3000
}
fn default_nodes() -> usize {
    3
}
fn default_queue_capacity() -> usize {
    1024
}
fn default_batch_size() -> usize {
    64
}
fn default_node_timeout_ms() -> u64 {
    500
}
fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default = "default_window_capacity")]
    pub window_capacity: usize,
    /// Producers draw values from `[0, value_range)`.
    #[serde(default = "default_value_range")]
    pub value_range: i64,
    #[serde(default = "default_reduce_interval_ms")]
    pub reduce_interval_ms: u64,
    #[serde(default = "default_nodes")]
    pub nodes: usize,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_node_timeout_ms")]
    pub node_timeout_ms: u64,
    #[serde(default)]
    pub producer_pause_ms: u64,
    #[serde(default)]
    pub producer_seed: Option<u64>,
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default)]
    pub metrics: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            window_capacity: default_window_capacity(),
            value_range: default_value_range(),
            reduce_interval_ms: default_reduce_interval_ms(),
            nodes: default_nodes(),
            queue_capacity: default_queue_capacity(),
            batch_size: default_batch_size(),
            node_timeout_ms: default_node_timeout_ms(),
            producer_pause_ms: 0,
            producer_seed: None,
            bind: default_bind(),
            metrics: false,
        }
    }
}

impl Config {
    /// Load from an explicit path. Supports TOML or JSON formats.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let cfg: Config = match ext.as_str() {
            "json" => serde_json::from_str(&content)
                .with_context(|| format!("parsing JSON config {}", path.display()))?,
            _ => toml::from_str(&content)
                .with_context(|| format!("parsing TOML config {}", path.display()))?,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load using env var + fallbacks, then apply env overrides:
    /// 1) $RUNNING_AVG_CONFIG
    /// 2) config/running_average.toml
    /// 3) config/running_average.json
    /// 4) built-in defaults
    pub fn load_default() -> Result<Self> {
        let mut cfg = if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
            }
            Self::load_from(&pb)?
        } else {
            let toml_p = PathBuf::from("config/running_average.toml");
            let json_p = PathBuf::from("config/running_average.json");
            if toml_p.exists() {
                Self::load_from(&toml_p)?
            } else if json_p.exists() {
                Self::load_from(&json_p)?
            } else {
                Self::default()
            }
        };
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(v) = std::env::var(ENV_NODES) {
            self.nodes = v
                .trim()
                .parse()
                .with_context(|| format!("{ENV_NODES}={v} is not a node count"))?;
        }
        if let Ok(v) = std::env::var(ENV_WINDOW) {
            self.window_capacity = v
                .trim()
                .parse()
                .with_context(|| format!("{ENV_WINDOW}={v} is not a window size"))?;
        }
        if let Ok(v) = std::env::var(ENV_BIND) {
            self.bind = v.trim().to_string();
        }
        if let Ok(v) = std::env::var(ENV_METRICS) {
            self.metrics = v.trim() == "1";
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.window_capacity == 0 {
            bail!("window_capacity must be positive");
        }
        if self.value_range <= 0 {
            bail!("value_range must be positive");
        }
        if self.nodes == 0 {
            bail!("nodes must be at least 1");
        }
        if self.queue_capacity == 0 || self.batch_size == 0 {
            bail!("queue_capacity and batch_size must be positive");
        }
        if self.reduce_interval_ms == 0 {
            bail!("reduce_interval_ms must be positive");
        }
        Ok(())
    }

    pub fn ingest(&self) -> IngestCfg {
        IngestCfg {
            queue_capacity: self.queue_capacity,
            batch_size: self.batch_size,
        }
    }

    /// Producer settings for `node`; a fixed seed is offset per node so the
    /// streams differ.
    pub fn producer(&self, node: usize) -> ProducerCfg {
        ProducerCfg {
            range: self.value_range,
            pause: Duration::from_millis(self.producer_pause_ms),
            seed: self.producer_seed.map(|s| s.wrapping_add(node as u64)),
        }
    }

    pub fn reduce_loop(&self) -> ReduceLoopCfg {
        ReduceLoopCfg {
            interval: Duration::from_millis(self.reduce_interval_ms),
            ideal_avg: ideal_average(self.value_range),
        }
    }

    pub fn node_timeout(&self) -> Duration {
        Duration::from_millis(self.node_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    fn clear_env() {
        for k in [ENV_CONFIG_PATH, ENV_NODES, ENV_WINDOW, ENV_BIND, ENV_METRICS] {
            env::remove_var(k);
        }
    }

    #[test]
    fn defaults_match_reference_setup() {
        let c = Config::default();
        assert_eq!(c.window_capacity, 500);
        assert_eq!(c.value_range, 100);
        assert_eq!(c.reduce_interval_ms, 3000);
        assert_eq!(c.reduce_loop().ideal_avg, 50.0);
        c.validate().unwrap();
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let c: Config = toml::from_str("nodes = 5\nwindow_capacity = 10").unwrap();
        assert_eq!(c.nodes, 5);
        assert_eq!(c.window_capacity, 10);
        assert_eq!(c.batch_size, 64);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let mut c = Config::default();
        c.window_capacity = 0;
        assert!(c.validate().is_err());

        let mut c = Config::default();
        c.value_range = 0;
        assert!(c.validate().is_err());

        assert!(toml::from_str::<Config>("window = 3").is_err());
    }

    #[test]
    fn seeds_differ_per_node() {
        let c = Config {
            producer_seed: Some(10),
            ..Config::default()
        };
        assert_eq!(c.producer(0).seed, Some(10));
        assert_eq!(c.producer(2).seed, Some(12));
    }

    #[serial_test::serial]
    #[test]
    fn default_uses_env_then_fallbacks() {
        // Isolate CWD in a temp dir so the repo's config/ does not interfere.
        let old = env::current_dir().unwrap();
        let tmp = tempfile::tempdir().unwrap();
        env::set_current_dir(tmp.path()).unwrap();
        clear_env();

        // No files, no env -> defaults
        assert_eq!(Config::load_default().unwrap(), Config::default());

        // Fallback file
        fs::create_dir_all("config").unwrap();
        fs::write("config/running_average.json", r#"{"nodes": 2}"#).unwrap();
        assert_eq!(Config::load_default().unwrap().nodes, 2);

        // Env path wins over fallback
        let p = tmp.path().join("custom.toml");
        fs::write(&p, "nodes = 7\nvalue_range = 10").unwrap();
        env::set_var(ENV_CONFIG_PATH, p.display().to_string());
        let c = Config::load_default().unwrap();
        assert_eq!((c.nodes, c.value_range), (7, 10));

        // Overrides apply last
        env::set_var(ENV_NODES, "4");
        env::set_var(ENV_METRICS, "1");
        let c = Config::load_default().unwrap();
        assert_eq!(c.nodes, 4);
        assert!(c.metrics);

        // Dangling env path is an error
        env::set_var(ENV_CONFIG_PATH, tmp.path().join("missing.toml").display().to_string());
        assert!(Config::load_default().is_err());

        clear_env();
        env::set_current_dir(&old).unwrap();
    }
}
