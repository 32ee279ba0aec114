//! # Configuration
//!
//! Every tunable of a training run, (de)serialisable with serde. Missing fields fall
//! back to the defaults below, so a config file only needs the values it changes:
//!
//! ```json
//! {
//!   "agent": { "batch_size": 32, "epsilon": { "decay": 500.0 } },
//!   "training": { "episodes": 200, "step_timeout_ms": 10000 },
//!   "env": { "offered_load": 1.2 }
//! }
//! ```

use serde::{Serialize, Deserialize};
use std::fs;
use std::path::Path;

use crate::agent::EpsilonSchedule;
use crate::env::AqmEnvConfig;
use crate::error::{AqmError, Result};
use crate::layers::WeightInit;
use crate::loss::SmoothL1Loss;
use crate::network::DEFAULT_HIDDEN_SIZES;
use crate::optimizer::{GradientClipper, OptimizerWrapper};

/// Hyperparameters of the DQN agent
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Replay memory capacity
    pub memory_capacity: usize,
    pub batch_size: usize,
    /// Discount factor
    pub gamma: f32,
    pub epsilon: EpsilonSchedule,
    pub hidden_sizes: Vec<usize>,
    pub weight_init: WeightInit,
    pub optimizer: OptimizerWrapper,
    pub gradient_clipper: GradientClipper,
    pub loss: SmoothL1Loss,
    /// Seed for weight init, exploration and replay sampling; entropy when absent
    pub seed: Option<u64>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        AgentConfig {
            memory_capacity: 10_000,
            batch_size: 64,
            gamma: 0.99,
            epsilon: EpsilonSchedule::default(),
            hidden_sizes: DEFAULT_HIDDEN_SIZES.to_vec(),
            weight_init: WeightInit::default(),
            optimizer: OptimizerWrapper::default(),
            gradient_clipper: GradientClipper::default(),
            loss: SmoothL1Loss::default(),
            seed: None,
        }
    }
}

impl AgentConfig {
    pub fn validate(&self) -> Result<()> {
        if self.memory_capacity == 0 {
            return Err(AqmError::invalid_parameter("memory_capacity", "must be at least 1"));
        }
        if self.batch_size == 0 {
            return Err(AqmError::invalid_parameter("batch_size", "must be at least 1"));
        }
        if self.batch_size > self.memory_capacity {
            return Err(AqmError::invalid_parameter(
                "batch_size",
                "must not exceed memory_capacity, or optimization never runs",
            ));
        }
        if !(0.0..=1.0).contains(&self.gamma) {
            return Err(AqmError::invalid_parameter("gamma", "must lie in [0, 1]"));
        }
        let eps = &self.epsilon;
        if !(0.0..=1.0).contains(&eps.start) || !(0.0..=1.0).contains(&eps.end) {
            return Err(AqmError::invalid_parameter("epsilon", "start and end must lie in [0, 1]"));
        }
        if !(eps.decay > 0.0) {
            return Err(AqmError::invalid_parameter("epsilon.decay", "must be positive"));
        }
        if self.hidden_sizes.iter().any(|&size| size == 0) {
            return Err(AqmError::invalid_parameter("hidden_sizes", "every hidden layer needs at least 1 unit"));
        }
        if let WeightInit::Uniform { min, max } = self.weight_init {
            if !(min <= max) {
                return Err(AqmError::invalid_parameter("weight_init", "uniform range needs min <= max"));
            }
        }
        let lr = match &self.optimizer {
            OptimizerWrapper::Adam(adam) => adam.learning_rate,
            OptimizerWrapper::Sgd(sgd) => sgd.learning_rate,
        };
        if !(lr > 0.0) || !lr.is_finite() {
            return Err(AqmError::invalid_parameter("optimizer.learning_rate", "must be a positive number"));
        }
        match self.gradient_clipper {
            GradientClipper::ClipByValue { min, max } if !(min <= max) => {
                return Err(AqmError::invalid_parameter("gradient_clipper", "needs min <= max"));
            }
            GradientClipper::ClipByNorm { max_norm } | GradientClipper::ClipByGlobalNorm { max_norm }
                if !(max_norm > 0.0) =>
            {
                return Err(AqmError::invalid_parameter("gradient_clipper", "max_norm must be positive"));
            }
            _ => {}
        }
        if !(self.loss.beta >= 0.0) {
            return Err(AqmError::invalid_parameter("loss.beta", "must not be negative"));
        }
        Ok(())
    }
}

/// Settings of the episode loop
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub episodes: usize,
    /// Cut an episode after this many steps (treated as truncation)
    pub max_steps_per_episode: Option<usize>,
    /// Deadline for each environment reset/step call
    pub step_timeout_ms: Option<u64>,
    /// With a deadline set: stop restarting the environment while more than this
    /// many timed-out workers are still running
    pub max_stuck_workers: Option<usize>,
    /// Greedy evaluation episodes played after training
    pub test_episodes: usize,
    /// Trailing window for the mean reward in progress logs and the report
    pub report_window: usize,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        TrainingConfig {
            episodes: 1000,
            max_steps_per_episode: None,
            step_timeout_ms: None,
            max_stuck_workers: Some(8),
            test_episodes: 1,
            report_window: 100,
        }
    }
}

impl TrainingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_steps_per_episode == Some(0) {
            return Err(AqmError::invalid_parameter("max_steps_per_episode", "must be at least 1"));
        }
        if self.step_timeout_ms == Some(0) {
            return Err(AqmError::invalid_parameter("step_timeout_ms", "must be at least 1"));
        }
        if self.report_window == 0 {
            return Err(AqmError::invalid_parameter("report_window", "must be at least 1"));
        }
        Ok(())
    }
}

/// Complete configuration of a training run
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub agent: AgentConfig,
    pub training: TrainingConfig,
    pub env: AqmEnvConfig,
    /// Default tracing filter; `RUST_LOG` takes precedence
    pub log_level: String,
}

impl Default for RunConfig {
    fn default() -> Self {
        RunConfig {
            agent: AgentConfig::default(),
            training: TrainingConfig::default(),
            env: AqmEnvConfig::default(),
            log_level: "info".to_string(),
        }
    }
}

impl RunConfig {
    /// Read a JSON config file and validate it.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = fs::read_to_string(path.as_ref())?;
        let config = Self::from_json(&data)?;
        Ok(config)
    }

    pub fn from_json(data: &str) -> Result<Self> {
        let config: RunConfig = serde_json::from_str(data)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        self.agent.validate()?;
        self.training.validate()?;
        self.env.validate()?;
        Ok(())
    }
}
