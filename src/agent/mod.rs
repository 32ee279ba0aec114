//! # DQN Agent
//!
//! The agent owns everything that learns:
//!
//! - **Policy network**: chooses actions and receives every gradient update
//! - **Target network**: a hard copy of the policy, refreshed only by
//!   [`DqnAgent::update_target_net`], used to score next states
//! - **Replay memory**: the last `memory_capacity` transitions, sampled uniformly
//! - **Exploration schedule**: epsilon decays from `start` to `end` with the number of
//!   action selections
//!
//! ## Learning step
//!
//! [`DqnAgent::optimize_model`] samples a batch, computes
//! `reward + gamma * max_a target(next_state)` (zero future value for terminal
//! transitions), takes the smooth L1 loss against the policy's value of the action
//! actually taken, clips gradients and applies one optimizer step.
//!
//! ```rust,no_run
//! use rl_aqm::agent::{DqnAgentBuilder, EpsilonSchedule};
//! use ndarray::array;
//!
//! let mut agent = DqnAgentBuilder::new()
//!     .state_size(3)
//!     .action_size(5)
//!     .epsilon(EpsilonSchedule::new(0.9, 0.05, 200.0))
//!     .seed(42)
//!     .build()
//!     .unwrap();
//!
//! let state = array![0.2, 0.9, 0.0];
//! let action = agent.select_action(state.view()).unwrap();
//! ```

mod dqn;
mod schedule;

pub use dqn::{DqnAgent, DqnAgentBuilder, OptimizeStats};
pub use schedule::EpsilonSchedule;
