use serde::{Serialize, Deserialize};
use std::collections::VecDeque;

/// Bounded histories of training signals
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrainingMetrics {
    /// Loss of every optimization step
    pub losses: VecDeque<f32>,

    /// Cumulative reward per episode
    pub episode_rewards: VecDeque<f32>,

    /// Steps per episode
    pub episode_lengths: VecDeque<usize>,

    /// Exploration threshold at the end of each episode
    pub epsilons: VecDeque<f32>,
}

/// Tracks metrics during training, keeping at most `history_size` entries per series.
pub struct MetricsTracker {
    metrics: TrainingMetrics,
    history_size: usize,
    episode_count: usize,
    total_steps: usize,
    optimization_steps: usize,
}

fn push_bounded<T>(series: &mut VecDeque<T>, value: T, history_size: usize) {
    if series.len() >= history_size {
        series.pop_front();
    }
    series.push_back(value);
}

fn mean<'a, I: Iterator<Item = &'a f32>>(values: I) -> Option<f32> {
    let (sum, count) = values.fold((0.0f64, 0usize), |(sum, count), &v| (sum + v as f64, count + 1));
    if count == 0 {
        None
    } else {
        Some((sum / count as f64) as f32)
    }
}

impl MetricsTracker {
    pub fn new(history_size: usize) -> Self {
        MetricsTracker {
            metrics: TrainingMetrics::default(),
            history_size: history_size.max(1),
            episode_count: 0,
            total_steps: 0,
            optimization_steps: 0,
        }
    }

    /// Record a training loss
    pub fn record_loss(&mut self, loss: f32) {
        self.optimization_steps += 1;
        push_bounded(&mut self.metrics.losses, loss, self.history_size);
    }

    /// Record a finished episode
    pub fn record_episode(&mut self, reward: f32, length: usize, epsilon: f32) {
        self.episode_count += 1;
        self.total_steps += length;
        push_bounded(&mut self.metrics.episode_rewards, reward, self.history_size);
        push_bounded(&mut self.metrics.episode_lengths, length, self.history_size);
        push_bounded(&mut self.metrics.epsilons, epsilon, self.history_size);
    }

    /// Mean reward over the last `window` recorded episodes
    pub fn recent_mean_reward(&self, window: usize) -> Option<f32> {
        let rewards = &self.metrics.episode_rewards;
        let skip = rewards.len().saturating_sub(window);
        mean(rewards.iter().skip(skip))
    }

    /// Mean of the retained losses
    pub fn mean_loss(&self) -> Option<f32> {
        mean(self.metrics.losses.iter())
    }

    pub fn best_episode_reward(&self) -> Option<f32> {
        self.metrics.episode_rewards.iter().copied().reduce(f32::max)
    }

    pub fn episode_count(&self) -> usize {
        self.episode_count
    }

    pub fn total_steps(&self) -> usize {
        self.total_steps
    }

    pub fn optimization_steps(&self) -> usize {
        self.optimization_steps
    }

    pub fn metrics(&self) -> &TrainingMetrics {
        &self.metrics
    }
}
