//! Policy stage backed by an exported ONNX policy network
//!
//! The network is trained off-process. This stage samples actions from it
//! with tract, hands buffered trajectories to the trainer as JSON lines, and
//! picks up a replaced model file on the next update. Without a model file
//! it samples uniformly.

use super::{ActionChoice, PolicyStage, StageKind, Trajectory};
use anyhow::{Context, Result};
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::SeedableRng;
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tract_onnx::prelude::*;
use tracing::{debug, info, warn};

/// Maximum inference latency before warning
const MAX_INFERENCE_MS: u128 = 5;

/// Model version reported when sampling uniformly
pub const UNIFORM_MODEL_VERSION: &str = "uniform";

type TractModel = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Configuration for one ONNX-backed stage
#[derive(Debug, Clone)]
pub struct OnnxStageConfig {
    pub stage: StageKind,
    /// Input width of the network
    pub state_dim: usize,
    /// Output width of the network
    pub action_dim: usize,
    /// Model file; may not exist yet
    pub model_path: PathBuf,
    /// Where update batches are written for the trainer
    pub export_dir: Option<PathBuf>,
    /// Fixed sampling seed, entropy when absent
    pub seed: Option<u64>,
}

struct LoadedModel {
    plan: TractModel,
    digest: String,
}

pub struct OnnxPolicyStage {
    config: OnnxStageConfig,
    model: Option<LoadedModel>,
    rng: StdRng,
}

impl OnnxPolicyStage {
    /// Create a stage, loading the model file if present
    ///
    /// A missing file selects uniform sampling; an unreadable or invalid one
    /// is an error.
    pub fn new(config: OnnxStageConfig) -> Result<Self> {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let mut stage = Self {
            config,
            model: None,
            rng,
        };

        if stage.config.model_path.exists() {
            let loaded = stage.load_from_disk()?;
            info!(
                stage = %stage.config.stage,
                path = %stage.config.model_path.display(),
                version = %loaded.digest,
                "Loaded policy model"
            );
            stage.model = Some(loaded);
        } else {
            warn!(
                stage = %stage.config.stage,
                path = %stage.config.model_path.display(),
                "No policy model found, sampling uniformly"
            );
        }

        Ok(stage)
    }

    /// Short digest of the loaded model, or [`UNIFORM_MODEL_VERSION`]
    pub fn model_version(&self) -> &str {
        self.model
            .as_ref()
            .map(|m| m.digest.as_str())
            .unwrap_or(UNIFORM_MODEL_VERSION)
    }

    fn load_from_disk(&self) -> Result<LoadedModel> {
        let bytes = fs::read(&self.config.model_path).with_context(|| {
            format!("Failed to read model {}", self.config.model_path.display())
        })?;
        let digest = model_digest(&bytes);
        let plan = load_model(&bytes, self.config.state_dim)?;
        Ok(LoadedModel { plan, digest })
    }

    /// Swap in the model file if the trainer replaced it
    fn reload_if_changed(&mut self) -> Result<()> {
        if !self.config.model_path.exists() {
            return Ok(());
        }
        let bytes = fs::read(&self.config.model_path)?;
        let digest = model_digest(&bytes);
        if self.model.as_ref().map(|m| m.digest == digest).unwrap_or(false) {
            debug!(stage = %self.config.stage, "Policy model unchanged");
            return Ok(());
        }

        let plan = load_model(&bytes, self.config.state_dim)?;
        info!(
            stage = %self.config.stage,
            old_version = %self.model_version(),
            new_version = %digest,
            "Policy model reloaded"
        );
        self.model = Some(LoadedModel { plan, digest });
        Ok(())
    }

    fn infer(&self, model: &LoadedModel, state: &[f32]) -> Result<(Vec<f32>, f32)> {
        let start = Instant::now();
        let input: Tensor =
            tract_ndarray::Array2::from_shape_vec((1, self.config.state_dim), state.to_vec())
                .context("State does not match model input width")?
                .into();

        let outputs = model.plan.run(tvec!(input.into()))?;
        let logits: Vec<f32> = outputs
            .get(0)
            .context("No output from policy model")?
            .to_array_view::<f32>()?
            .iter()
            .copied()
            .collect();
        if logits.len() != self.config.action_dim {
            anyhow::bail!(
                "Policy model produced {} logits, expected {}",
                logits.len(),
                self.config.action_dim
            );
        }

        // Actor-critic exports carry the value head as a second output
        let value = match outputs.get(1) {
            Some(v) => v.to_array_view::<f32>()?.iter().next().copied().unwrap_or(0.0),
            None => 0.0,
        };

        let elapsed = start.elapsed();
        if elapsed.as_millis() > MAX_INFERENCE_MS {
            warn!(
                stage = %self.config.stage,
                elapsed_ms = elapsed.as_millis(),
                "Policy inference exceeded {}ms target",
                MAX_INFERENCE_MS
            );
        }

        Ok((softmax(&logits), value))
    }

    fn export(&self, trajectory: &Trajectory) -> Result<()> {
        let Some(dir) = &self.config.export_dir else {
            return Ok(());
        };
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create export dir {}", dir.display()))?;

        let path = dir.join(format!(
            "{}-{}.jsonl",
            self.config.stage,
            chrono::Utc::now().timestamp_millis()
        ));
        let mut writer = BufWriter::new(File::create(&path)?);
        let mut rows = 0usize;
        for transition in trajectory.transitions() {
            serde_json::to_writer(&mut writer, &transition)?;
            writer.write_all(b"\n")?;
            rows += 1;
        }
        writer.flush()?;

        info!(
            stage = %self.config.stage,
            path = %path.display(),
            transitions = rows,
            "Exported trajectory batch"
        );
        Ok(())
    }
}

impl PolicyStage for OnnxPolicyStage {
    fn select_action(&mut self, state: &[f32]) -> Result<ActionChoice> {
        let (probs, value) = match &self.model {
            Some(model) => self.infer(model, state)?,
            None => (uniform(self.config.action_dim), 0.0),
        };

        let dist = WeightedIndex::new(&probs).context("Policy produced invalid probabilities")?;
        let index = dist.sample(&mut self.rng);

        Ok(ActionChoice {
            index,
            log_prob: probs[index].ln(),
            value,
        })
    }

    fn update(&mut self, trajectory: &Trajectory) -> Result<()> {
        self.export(trajectory)?;
        self.reload_if_changed()
    }

    fn action_dim(&self) -> usize {
        self.config.action_dim
    }

    fn model_version(&self) -> String {
        OnnxPolicyStage::model_version(self).to_string()
    }
}

/// Load and optimize an ONNX policy network taking `[1, state_dim]` input
fn load_model(bytes: &[u8], state_dim: usize) -> Result<TractModel> {
    let model = tract_onnx::onnx()
        .model_for_read(&mut std::io::Cursor::new(bytes))
        .context("Failed to parse ONNX model")?
        .with_input_fact(0, f32::fact([1, state_dim]).into())
        .context("Failed to set input shape")?
        .into_optimized()
        .context("Failed to optimize model")?
        .into_runnable()
        .context("Failed to create runnable model")?;
    Ok(model)
}

fn model_digest(bytes: &[u8]) -> String {
    let digest = hex::encode(Sha256::digest(bytes));
    digest[..12].to_string()
}

fn uniform(n: usize) -> Vec<f32> {
    vec![1.0 / n.max(1) as f32; n.max(1)]
}

fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|l| (l - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.iter().map(|e| e / sum).collect()
}

/// Conventional model file location for a stage
pub fn model_path(model_dir: &Path, stage: StageKind) -> PathBuf {
    model_dir.join(format!("{}.onnx", stage))
}
