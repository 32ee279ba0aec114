//! # rl-aqm - Deep Q-Learning for Active Queue Management
//!
//! rl-aqm trains a DQN agent to steer the early-drop probability of a bottleneck
//! queue. The learning engine is self-contained: a small feed-forward value network
//! written on top of `ndarray`, experience replay, epsilon-greedy exploration, a
//! target network and an Adam optimizer with gradient clipping.
//!
//! ## Key Features
//!
//! - **Value Network**: ReLU MLP with frozen and trainable evaluation per call
//! - **Agent**: epsilon-greedy action selection, smooth L1 TD updates, hard target sync
//! - **Replay Memory**: fixed-capacity FIFO with uniform sampling without replacement
//! - **Environments**: a trait for any step/reset simulator, an in-process queue model
//!   and a deadline wrapper for simulators that may hang
//! - **Driver**: the episode loop, with per-episode reward reporting
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rl_aqm::agent::DqnAgent;
//! use rl_aqm::config::RunConfig;
//! use rl_aqm::env::{AqmEnv, Environment};
//! use rl_aqm::trainer::Trainer;
//!
//! let config = RunConfig::default();
//! let env = AqmEnv::new(config.env.clone()).unwrap();
//! let agent = DqnAgent::new(env.observation_size(), env.action_count(), config.agent.clone()).unwrap();
//!
//! let mut trainer = Trainer::new(agent, env, config.training.clone()).unwrap();
//! let report = trainer.run().unwrap();
//! println!("mean reward: {:?}", report.trailing_mean_reward());
//! ```
//!
//! ## Module Organization
//!
//! - [`activations`] - ReLU and linear activations
//! - [`agent`] - The DQN agent and its exploration schedule
//! - [`config`] - Serde-backed run configuration
//! - [`env`] - Environment trait, queue model and deadline wrapper
//! - [`error`] - Error types and result handling
//! - [`layers`] - Dense layers and weight initialization
//! - [`logging`] - Tracing subscriber setup
//! - [`loss`] - Smooth L1 loss
//! - [`metrics`] - Training metrics and tracking
//! - [`network`] - The action-value network
//! - [`optimizer`] - Adam, SGD and gradient clipping
//! - [`replay_buffer`] - Experience replay
//! - [`trainer`] - The episode loop

pub mod activations;
pub mod agent;
pub mod config;
pub mod env;
pub mod error;
pub mod layers;
pub mod logging;
pub mod loss;
pub mod metrics;
pub mod network;
pub mod optimizer;
pub mod replay_buffer;
pub mod trainer;

#[cfg(test)]
mod tests;
