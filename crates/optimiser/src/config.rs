//! Controller configuration

use anyhow::Result;
use optimiser_lib::cluster::PromQueries;
use optimiser_lib::controller::ControllerConfig;
use optimiser_lib::ControllerError;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable naming an optional config file
pub const CONFIG_PATH_ENV: &str = "OPTIMISER_CONFIG";

pub const DEFAULT_CONFIG_PATH: &str = "/etc/energy-optimiser/config.toml";

/// Controller configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OptimiserConfig {
    /// Cluster name attached to every structured log event
    #[serde(default = "default_cluster_name")]
    pub cluster_name: String,

    /// Seconds slept between cycles
    #[serde(default = "default_observation_interval")]
    pub observation_interval_secs: u64,

    /// Seconds waited after an action before re-observing
    #[serde(default = "default_action_settle")]
    pub action_settle_secs: u64,

    /// Cycles between paired policy updates
    #[serde(default = "default_update_timestep")]
    pub update_timestep: u64,

    /// Largest node count the target space must address
    #[serde(default = "default_max_nodes")]
    pub max_nodes: usize,

    /// Largest pod count the target space must address
    #[serde(default = "default_max_pods")]
    pub max_pods: usize,

    /// Bound on one snapshot, in seconds
    #[serde(default = "default_observation_timeout")]
    pub observation_timeout_secs: u64,

    #[serde(default = "default_prometheus_url")]
    pub prometheus_url: String,

    /// Queries behind each snapshot field
    #[serde(default)]
    pub queries: PromQueries,

    /// Where per-cycle suggestion records are written
    #[serde(default = "default_suggestion_dir")]
    pub suggestion_dir: PathBuf,

    /// Directory holding `family.onnx` and `target.onnx`
    #[serde(default = "default_model_dir")]
    pub model_dir: PathBuf,

    /// Where update batches are exported for the trainer
    #[serde(default = "default_trajectory_dir")]
    pub trajectory_dir: PathBuf,

    /// API server port for health/metrics/status
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Log mutations instead of applying them
    #[serde(default)]
    pub dry_run: bool,

    /// Fixed sampling seed; entropy when unset
    #[serde(default)]
    pub policy_seed: Option<u64>,
}

fn default_cluster_name() -> String {
    std::env::var("CLUSTER_NAME").unwrap_or_else(|_| "default".to_string())
}

fn default_observation_interval() -> u64 {
    30
}

fn default_action_settle() -> u64 {
    90
}

fn default_update_timestep() -> u64 {
    400
}

fn default_max_nodes() -> usize {
    64
}

fn default_max_pods() -> usize {
    512
}

fn default_observation_timeout() -> u64 {
    20
}

fn default_prometheus_url() -> String {
    "http://prometheus-k8s.monitoring:9090".to_string()
}

fn default_suggestion_dir() -> PathBuf {
    PathBuf::from("/tmp/k8s_optimizer_suggestions")
}

fn default_model_dir() -> PathBuf {
    PathBuf::from("/var/lib/energy-optimiser/models")
}

fn default_trajectory_dir() -> PathBuf {
    PathBuf::from("/var/lib/energy-optimiser/trajectories")
}

fn default_api_port() -> u16 {
    9105
}

impl OptimiserConfig {
    /// Load from the optional config file, then `OPTIMISER_*` environment variables
    pub fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from(&path)
    }

    pub fn load_from(path: &str) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix("OPTIMISER"))
            .build()?;

        let config: Self = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ControllerError> {
        if self.update_timestep == 0 {
            return Err(ControllerError::Config(
                "update_timestep must be at least 1".to_string(),
            ));
        }
        if self.observation_timeout_secs == 0 {
            return Err(ControllerError::Config(
                "observation_timeout_secs must be at least 1".to_string(),
            ));
        }
        if self.max_nodes == 0 {
            return Err(ControllerError::Config(
                "max_nodes must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn observation_timeout(&self) -> Duration {
        Duration::from_secs(self.observation_timeout_secs)
    }

    pub fn controller(&self) -> ControllerConfig {
        ControllerConfig {
            observation_interval: Duration::from_secs(self.observation_interval_secs),
            action_settle: Duration::from_secs(self.action_settle_secs),
            observation_timeout: self.observation_timeout(),
            update_timestep: self.update_timestep,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn from_toml(body: &str) -> Result<OptimiserConfig> {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile()?;
        file.write_all(body.as_bytes())?;
        let path = file.path().to_string_lossy().to_string();
        OptimiserConfig::load_from(&path)
    }

    #[test]
    fn test_defaults() {
        let config = from_toml("").unwrap();
        assert_eq!(config.observation_interval_secs, 30);
        assert_eq!(config.action_settle_secs, 90);
        assert_eq!(config.update_timestep, 400);
        assert_eq!(config.max_nodes, 64);
        assert_eq!(config.max_pods, 512);
        assert_eq!(config.observation_timeout_secs, 20);
        assert_eq!(config.prometheus_url, "http://prometheus-k8s.monitoring:9090");
        assert_eq!(config.suggestion_dir, PathBuf::from("/tmp/k8s_optimizer_suggestions"));
        assert_eq!(config.api_port, 9105);
        assert!(!config.dry_run);
        assert!(config.policy_seed.is_none());
        assert_eq!(config.queries, PromQueries::default());
    }

    #[test]
    fn test_file_overrides() {
        let config = from_toml(
            r#"
            update_timestep = 50
            dry_run = true
            policy_seed = 7

            [queries]
            node_power = "sum by (instance) (custom_node_watts)"
            "#,
        )
        .unwrap();
        assert_eq!(config.update_timestep, 50);
        assert!(config.dry_run);
        assert_eq!(config.policy_seed, Some(7));
        assert_eq!(config.queries.node_power, "sum by (instance) (custom_node_watts)");
        assert_eq!(config.queries.pod_cpu, PromQueries::default().pod_cpu);

        let controller = config.controller();
        assert_eq!(controller.update_timestep, 50);
        assert_eq!(controller.action_settle, Duration::from_secs(90));
    }

    #[test]
    fn test_zero_update_timestep_rejected() {
        let err = from_toml("update_timestep = 0").unwrap_err();
        assert!(err.to_string().contains("update_timestep"));
    }
}
