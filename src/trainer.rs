//! # Training Driver
//!
//! Feeds environment interaction into the agent, one strictly ordered step at a time:
//! select action, step the environment, store the transition, optimize, advance.
//! The target network is synchronised once at every episode boundary.
//!
//! Environment failures (including missed deadlines) abort only the current
//! episode: the failed step never reaches the agent and training moves on to the
//! next episode. Errors raised by the agent itself are returned to the caller.

use ndarray::Array1;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::agent::DqnAgent;
use crate::config::TrainingConfig;
use crate::env::Environment;
use crate::error::{AqmError, Result};
use crate::metrics::MetricsTracker;

/// How an episode ended
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", content = "reason", rename_all = "snake_case")]
pub enum EpisodeOutcome {
    /// The environment reported a terminal state
    Completed,
    /// The environment or the step limit cut the episode short
    Truncated,
    /// An environment call failed; the episode was abandoned
    Aborted(String),
}

/// Per-episode record
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct EpisodeSummary {
    pub episode: usize,
    pub total_reward: f32,
    pub steps: usize,
    /// Exploration threshold when the episode ended
    pub epsilon: f32,
    /// Mean loss of the optimization steps taken during the episode
    pub mean_loss: Option<f32>,
    pub outcome: EpisodeOutcome,
}

impl EpisodeSummary {
    pub fn is_aborted(&self) -> bool {
        matches!(self.outcome, EpisodeOutcome::Aborted(_))
    }
}

/// Everything `Trainer::run` learned about the run
#[derive(Clone, Debug, Serialize)]
pub struct TrainingReport {
    pub episodes: Vec<EpisodeSummary>,
    pub window: usize,
}

impl TrainingReport {
    pub fn completed(&self) -> usize {
        self.episodes.iter().filter(|e| !e.is_aborted()).count()
    }

    pub fn aborted(&self) -> usize {
        self.episodes.iter().filter(|e| e.is_aborted()).count()
    }

    /// Mean reward of the last `window` episodes that were not aborted
    pub fn trailing_mean_reward(&self) -> Option<f32> {
        let rewards: Vec<f32> = self
            .episodes
            .iter()
            .filter(|e| !e.is_aborted())
            .map(|e| e.total_reward)
            .collect();
        let tail = &rewards[rewards.len().saturating_sub(self.window)..];
        if tail.is_empty() {
            None
        } else {
            Some(tail.iter().sum::<f32>() / tail.len() as f32)
        }
    }

    pub fn best_reward(&self) -> Option<f32> {
        self.episodes
            .iter()
            .filter(|e| !e.is_aborted())
            .map(|e| e.total_reward)
            .reduce(f32::max)
    }
}

/// Owns the agent and the environment for the duration of a training run.
pub struct Trainer<E> {
    agent: DqnAgent,
    env: E,
    config: TrainingConfig,
    metrics: MetricsTracker,
}

impl<E: Environment> Trainer<E> {
    pub fn new(agent: DqnAgent, env: E, config: TrainingConfig) -> Result<Self> {
        config.validate()?;
        if env.observation_size() != agent.state_size() {
            return Err(AqmError::dimension_mismatch(
                format!("observations of length {}", agent.state_size()),
                format!("{}", env.observation_size()),
            ));
        }
        if env.action_count() != agent.action_size() {
            return Err(AqmError::dimension_mismatch(
                format!("{} actions", agent.action_size()),
                format!("{}", env.action_count()),
            ));
        }

        let metrics = MetricsTracker::new(config.report_window.max(1000));
        Ok(Trainer {
            agent,
            env,
            config,
            metrics,
        })
    }

    pub fn agent(&self) -> &DqnAgent {
        &self.agent
    }

    pub fn env(&self) -> &E {
        &self.env
    }

    pub fn metrics(&self) -> &MetricsTracker {
        &self.metrics
    }

    pub fn into_parts(self) -> (DqnAgent, E) {
        (self.agent, self.env)
    }

    /// Run `config.episodes` episodes.
    pub fn run(&mut self) -> Result<TrainingReport> {
        let mut episodes = Vec::with_capacity(self.config.episodes);
        for episode in 0..self.config.episodes {
            let summary = self.run_episode(episode)?;
            episodes.push(summary);
        }

        let report = TrainingReport {
            episodes,
            window: self.config.report_window,
        };
        info!(
            completed = report.completed(),
            aborted = report.aborted(),
            mean_reward = ?report.trailing_mean_reward(),
            "training finished"
        );
        Ok(report)
    }

    /// Play one episode, learning after every step, then sync the target network.
    pub fn run_episode(&mut self, episode: usize) -> Result<EpisodeSummary> {
        let mut total_reward = 0.0f32;
        let mut steps = 0usize;
        let mut losses = Vec::new();

        let outcome = self.play(&mut total_reward, &mut steps, &mut losses)?;

        self.agent.update_target_net()?;

        let epsilon = self.agent.epsilon();
        let mean_loss = if losses.is_empty() {
            None
        } else {
            Some(losses.iter().sum::<f32>() / losses.len() as f32)
        };
        let summary = EpisodeSummary {
            episode,
            total_reward,
            steps,
            epsilon,
            mean_loss,
            outcome,
        };

        match &summary.outcome {
            EpisodeOutcome::Aborted(reason) => {
                warn!(episode, steps, reason = reason.as_str(), "episode aborted");
            }
            _ => {
                self.metrics.record_episode(total_reward, steps, epsilon);
                info!(
                    episode,
                    reward = total_reward,
                    steps,
                    epsilon,
                    mean_loss = ?mean_loss,
                    mean_reward = ?self.metrics.recent_mean_reward(self.config.report_window),
                    "episode finished"
                );
            }
        }

        Ok(summary)
    }

    /// Play `episodes` greedy episodes without learning.
    ///
    /// Nothing is stored, optimized or synchronised and the exploration counter is
    /// left alone. A failed environment call ends that episode with
    /// [`EpisodeOutcome::Aborted`] and evaluation moves on to the next one.
    pub fn evaluate(&mut self, episodes: usize) -> Result<Vec<EpisodeSummary>> {
        let mut summaries = Vec::with_capacity(episodes);
        for episode in 0..episodes {
            let mut total_reward = 0.0f32;
            let mut steps = 0usize;
            let outcome = self.play_greedy(&mut total_reward, &mut steps)?;

            if let EpisodeOutcome::Aborted(reason) = &outcome {
                warn!(episode, steps, reason = reason.as_str(), "evaluation episode aborted");
            } else {
                info!(episode, reward = total_reward, steps, "evaluation episode finished");
            }
            summaries.push(EpisodeSummary {
                episode,
                total_reward,
                steps,
                epsilon: self.agent.epsilon(),
                mean_loss: None,
                outcome,
            });
        }
        Ok(summaries)
    }

    fn play_greedy(&mut self, total_reward: &mut f32, steps: &mut usize) -> Result<EpisodeOutcome> {
        let mut state = match self.env.reset() {
            Ok((state, _info)) => state,
            Err(e) => return Ok(EpisodeOutcome::Aborted(format!("reset failed: {}", e))),
        };
        if let Err(reason) = self.check_observation(&state) {
            return Ok(EpisodeOutcome::Aborted(reason));
        }

        loop {
            let action = self.agent.greedy_action(state.view())?;

            let step = match self.env.step(action) {
                Ok(step) => step,
                Err(e) => return Ok(EpisodeOutcome::Aborted(format!("step failed: {}", e))),
            };
            if let Err(reason) = self.check_observation(&step.observation) {
                return Ok(EpisodeOutcome::Aborted(reason));
            }
            debug!(state = ?state.as_slice(), action, reward = step.reward, "evaluation step");

            *total_reward += step.reward;
            *steps += 1;

            if step.done {
                return Ok(EpisodeOutcome::Completed);
            }
            if step.truncated || self.at_step_limit(*steps) {
                return Ok(EpisodeOutcome::Truncated);
            }
            state = step.observation;
        }
    }

    fn at_step_limit(&self, steps: usize) -> bool {
        self.config
            .max_steps_per_episode
            .map_or(false, |limit| steps >= limit)
    }

    fn play(&mut self, total_reward: &mut f32, steps: &mut usize, losses: &mut Vec<f32>) -> Result<EpisodeOutcome> {
        let mut state = match self.env.reset() {
            Ok((state, _info)) => state,
            Err(e) => return Ok(EpisodeOutcome::Aborted(format!("reset failed: {}", e))),
        };
        if let Err(reason) = self.check_observation(&state) {
            return Ok(EpisodeOutcome::Aborted(reason));
        }

        loop {
            let action = self.agent.select_action(state.view())?;

            let step = match self.env.step(action) {
                Ok(step) => step,
                Err(e) => return Ok(EpisodeOutcome::Aborted(format!("step failed: {}", e))),
            };
            if let Err(reason) = self.check_observation(&step.observation) {
                return Ok(EpisodeOutcome::Aborted(reason));
            }
            if !step.reward.is_finite() {
                return Ok(EpisodeOutcome::Aborted(format!("non-finite reward {}", step.reward)));
            }

            *total_reward += step.reward;
            *steps += 1;

            let next_state = if step.done { None } else { Some(step.observation.clone()) };
            self.agent.push_transition(state, action, next_state, step.reward)?;

            if let Some(stats) = self.agent.optimize_model()? {
                losses.push(stats.loss);
                self.metrics.record_loss(stats.loss);
            }

            if step.done {
                return Ok(EpisodeOutcome::Completed);
            }
            if step.truncated || self.at_step_limit(*steps) {
                return Ok(EpisodeOutcome::Truncated);
            }

            state = step.observation;
        }
    }

    fn check_observation(&self, observation: &Array1<f32>) -> std::result::Result<(), String> {
        let expected = self.agent.state_size();
        if observation.len() != expected {
            return Err(format!(
                "observation of length {} (expected {})",
                observation.len(),
                expected
            ));
        }
        if observation.iter().any(|v| !v.is_finite()) {
            return Err("observation contains non-finite values".to_string());
        }
        Ok(())
    }
}
