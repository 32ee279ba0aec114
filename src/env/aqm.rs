use ndarray::{array, Array1};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use serde::{Serialize, Deserialize};
use serde_json::json;
use tracing::trace;

use crate::error::{AqmError, Result};

use super::{Environment, Step, StepInfo};

/// Observation: `[queue_delay, link_utilization, drop_probability]`, each in `[0, 1]`.
pub const OBSERVATION_SIZE: usize = 3;

/// Actions: keep, +0.01, -0.01, +0.1, -0.1 on the drop probability.
pub const ACTION_COUNT: usize = 5;

/// Parameters of the bottleneck link and the traffic offered to it
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AqmEnvConfig {
    pub bottleneck_rate_mbps: f64,
    pub packet_size_bytes: u32,
    /// Queue limit in packets; arrivals beyond it are tail-dropped
    pub buffer_packets: u32,
    /// Mean arrival rate as a multiple of the bottleneck capacity
    pub offered_load: f64,
    /// Standard deviation of the per-step multiplicative load noise
    pub load_jitter: f64,
    /// Simulated time covered by one step
    pub step_interval_ms: f64,
    /// Simulated time of one episode
    pub simulation_time_s: f64,
    pub initial_drop_probability: f64,
    pub seed: Option<u64>,
}

impl Default for AqmEnvConfig {
    fn default() -> Self {
        AqmEnvConfig {
            bottleneck_rate_mbps: 10.0,
            packet_size_bytes: 1500,
            buffer_packets: 100,
            offered_load: 1.1,
            load_jitter: 0.15,
            step_interval_ms: 50.0,
            simulation_time_s: 5.0,
            initial_drop_probability: 0.0,
            seed: None,
        }
    }
}

impl AqmEnvConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.bottleneck_rate_mbps > 0.0) {
            return Err(AqmError::invalid_parameter("env.bottleneck_rate_mbps", "must be positive"));
        }
        if self.packet_size_bytes == 0 {
            return Err(AqmError::invalid_parameter("env.packet_size_bytes", "must be at least 1"));
        }
        if self.buffer_packets == 0 {
            return Err(AqmError::invalid_parameter("env.buffer_packets", "must be at least 1"));
        }
        if !(self.offered_load >= 0.0) {
            return Err(AqmError::invalid_parameter("env.offered_load", "must not be negative"));
        }
        if !(self.load_jitter >= 0.0) || !self.load_jitter.is_finite() {
            return Err(AqmError::invalid_parameter("env.load_jitter", "must be a non-negative number"));
        }
        if !(self.step_interval_ms > 0.0) {
            return Err(AqmError::invalid_parameter("env.step_interval_ms", "must be positive"));
        }
        if !(self.simulation_time_s * 1000.0 >= self.step_interval_ms) {
            return Err(AqmError::invalid_parameter(
                "env.simulation_time_s",
                "must cover at least one step interval",
            ));
        }
        if !(0.0..=1.0).contains(&self.initial_drop_probability) {
            return Err(AqmError::invalid_parameter("env.initial_drop_probability", "must lie in [0, 1]"));
        }
        Ok(())
    }

    /// Time to transmit one packet on the bottleneck
    fn service_time_ms(&self) -> f64 {
        self.packet_size_bytes as f64 * 8.0 / (self.bottleneck_rate_mbps * 1e6) * 1000.0
    }

    /// Packets the bottleneck can transmit in one step
    fn capacity_per_step(&self) -> f64 {
        self.step_interval_ms / self.service_time_ms()
    }

    fn episode_steps(&self) -> usize {
        ((self.simulation_time_s * 1000.0 / self.step_interval_ms).round() as usize).max(1)
    }
}

/// Fluid model of a single bottleneck queue driven by an agent-controlled early-drop
/// probability.
///
/// Each step offers a noisy amount of traffic, drops a `drop_probability` share of
/// it before it is queued, serves up to the link capacity and tail-drops whatever
/// overflows the buffer. The reward favours high link utilisation and low queueing
/// delay: `(u^2 - 0.5) + (2 / (1 + delay_ms / 5) - 1.5)`.
pub struct AqmEnv {
    config: AqmEnvConfig,
    rng: StdRng,
    noise: Normal<f64>,
    queue_packets: f64,
    drop_probability: f64,
    steps: usize,
    episode_steps: usize,
}

impl AqmEnv {
    pub fn new(config: AqmEnvConfig) -> Result<Self> {
        config.validate()?;
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let noise = Normal::new(0.0, config.load_jitter)
            .map_err(|e| AqmError::invalid_parameter("env.load_jitter".to_string(), e.to_string()))?;
        let episode_steps = config.episode_steps();
        let drop_probability = config.initial_drop_probability;

        Ok(AqmEnv {
            config,
            rng,
            noise,
            queue_packets: 0.0,
            drop_probability,
            steps: 0,
            episode_steps,
        })
    }

    pub fn config(&self) -> &AqmEnvConfig {
        &self.config
    }

    pub fn drop_probability(&self) -> f64 {
        self.drop_probability
    }

    pub fn queue_packets(&self) -> f64 {
        self.queue_packets
    }

    /// Steps per episode
    pub fn episode_steps(&self) -> usize {
        self.episode_steps
    }

    /// Queueing delay a packet joining the current queue would see
    fn queue_delay_ms(&self) -> f64 {
        self.queue_packets * self.config.service_time_ms()
    }

    fn max_delay_ms(&self) -> f64 {
        self.config.buffer_packets as f64 * self.config.service_time_ms()
    }

    fn observation(&self, utilization: f64) -> Array1<f32> {
        let delay = (self.queue_delay_ms() / self.max_delay_ms()).clamp(0.0, 1.0);
        array![
            delay as f32,
            utilization.clamp(0.0, 1.0) as f32,
            self.drop_probability as f32
        ]
    }

    fn apply_action(&mut self, action: usize) -> Result<()> {
        let delta = match action {
            0 => 0.0,
            1 => 0.01,
            2 => -0.01,
            3 => 0.1,
            4 => -0.1,
            _ => {
                return Err(AqmError::InvalidAction {
                    action,
                    max_actions: ACTION_COUNT,
                })
            }
        };
        self.drop_probability = (self.drop_probability + delta).clamp(0.0, 1.0);
        Ok(())
    }
}

/// `(u^2 - 0.5) + (2 / (1 + delay_ms / 5) - 1.5)`, or 0 when not finite.
pub fn reward(link_utilization: f64, queue_delay_ms: f64) -> f32 {
    let reward = (link_utilization.powi(2) - 0.5) + (2.0 / (1.0 + queue_delay_ms / 5.0) - 1.5);
    if reward.is_finite() {
        reward as f32
    } else {
        0.0
    }
}

impl Environment for AqmEnv {
    fn observation_size(&self) -> usize {
        OBSERVATION_SIZE
    }

    fn action_count(&self) -> usize {
        ACTION_COUNT
    }

    fn reset(&mut self) -> Result<(Array1<f32>, StepInfo)> {
        self.queue_packets = 0.0;
        self.drop_probability = self.config.initial_drop_probability;
        self.steps = 0;

        let mut info = StepInfo::new();
        info.insert("episode_steps".to_string(), json!(self.episode_steps));
        Ok((self.observation(0.0), info))
    }

    fn step(&mut self, action: usize) -> Result<Step> {
        if self.steps >= self.episode_steps {
            return Err(AqmError::Environment("episode finished; reset required".to_string()));
        }
        self.apply_action(action)?;

        let capacity = self.config.capacity_per_step();
        let load = (self.config.offered_load * (1.0 + self.noise.sample(&mut self.rng))).max(0.0);
        let arrivals = load * capacity;
        let early_drops = arrivals * self.drop_probability;

        let backlog = self.queue_packets + arrivals - early_drops;
        let served = backlog.min(capacity);
        let buffer = self.config.buffer_packets as f64;
        let overflow = (backlog - served - buffer).max(0.0);
        self.queue_packets = (backlog - served).min(buffer);
        self.steps += 1;

        let utilization = served / capacity;
        let delay_ms = self.queue_delay_ms();
        let reward = reward(utilization, delay_ms);
        let done = self.steps >= self.episode_steps;

        trace!(
            action,
            drop_probability = self.drop_probability,
            utilization,
            delay_ms,
            reward,
            "aqm step"
        );

        let mut info = StepInfo::new();
        info.insert("queue_packets".to_string(), json!(self.queue_packets));
        info.insert("queue_delay_ms".to_string(), json!(delay_ms));
        info.insert("dropped_packets".to_string(), json!(early_drops + overflow));

        Ok(Step {
            observation: self.observation(utilization),
            reward,
            done,
            truncated: false,
            info,
        })
    }
}
