//! # Environments
//!
//! The agent only talks to an environment through [`Environment`]: `reset` hands out
//! the first observation of an episode, `step` applies a discrete action and reports
//! the next observation, a reward and whether the episode ended.
//!
//! - [`AqmEnv`]: in-process fluid model of a bottleneck queue whose drop
//!   probability is the controlled quantity
//! - [`DeadlineEnv`]: runs any environment on a worker thread and bounds every call
//!   with a deadline, for simulators that may hang

pub mod aqm;
pub mod deadline;

use ndarray::Array1;

use crate::error::Result;

pub use aqm::{AqmEnv, AqmEnvConfig};
pub use deadline::DeadlineEnv;

/// Free-form diagnostics attached to a reset or step
pub type StepInfo = serde_json::Map<String, serde_json::Value>;

/// Result of a single environment step
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub observation: Array1<f32>,
    pub reward: f32,
    /// The episode reached a terminal state
    pub done: bool,
    /// The episode was cut short (e.g. a time limit) without reaching a terminal state
    pub truncated: bool,
    pub info: StepInfo,
}

/// Single-agent environment with a fixed observation size and discrete actions.
pub trait Environment {
    /// Length of every observation vector
    fn observation_size(&self) -> usize;

    /// Number of discrete actions; valid actions are `0..action_count()`
    fn action_count(&self) -> usize;

    /// Start a new episode
    fn reset(&mut self) -> Result<(Array1<f32>, StepInfo)>;

    /// Apply `action` and advance one step
    fn step(&mut self, action: usize) -> Result<Step>;
}

impl<E: Environment + ?Sized> Environment for Box<E> {
    fn observation_size(&self) -> usize {
        (**self).observation_size()
    }

    fn action_count(&self) -> usize {
        (**self).action_count()
    }

    fn reset(&mut self) -> Result<(Array1<f32>, StepInfo)> {
        (**self).reset()
    }

    fn step(&mut self, action: usize) -> Result<Step> {
        (**self).step(action)
    }
}
