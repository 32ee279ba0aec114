use ndarray::{Array1, Array2, ArrayView1, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::config::AgentConfig;
use crate::error::{AqmError, Result};
use crate::network::QNetwork;
use crate::optimizer::{GradientClipper, Optimizer, OptimizerWrapper};
use crate::replay_buffer::{ReplayBuffer, Transition};

use super::schedule::EpsilonSchedule;

/// Deep Q-Network agent with experience replay and a target network.
///
/// - The **policy network** picks actions and is trained every optimization step
/// - The **target network** scores bootstrapped next-state values and only changes
///   when [`DqnAgent::update_target_net`] copies the policy into it
/// - Exploration is epsilon-greedy with an exponentially decaying epsilon
///
/// # Example
///
/// ```rust
/// use rl_aqm::agent::DqnAgent;
/// use rl_aqm::config::AgentConfig;
/// use ndarray::array;
///
/// let config = AgentConfig { seed: Some(1), ..AgentConfig::default() };
/// let mut agent = DqnAgent::new(3, 5, config).unwrap();
///
/// let state = array![0.1, 0.8, 0.0];
/// let action = agent.select_action(state.view()).unwrap();
/// assert!(action < 5);
///
/// // After the environment step...
/// let next_state = array![0.2, 0.7, 0.01];
/// agent.push_transition(state, action, Some(next_state), 0.3).unwrap();
///
/// // Nothing to learn from until a full batch is stored
/// assert!(agent.optimize_model().unwrap().is_none());
/// ```
pub struct DqnAgent {
    policy_net: QNetwork,
    target_net: QNetwork,
    memory: ReplayBuffer,
    optimizer: OptimizerWrapper,
    config: AgentConfig,
    steps_done: u64,
    rng: StdRng,
}

/// Outcome of one optimization step
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OptimizeStats {
    /// Smooth L1 loss of the sampled batch before the update
    pub loss: f32,
    /// L2 norm of the gradients before clipping
    pub grad_norm: f32,
}

impl DqnAgent {
    /// Create an agent for `state_size`-dimensional observations and `action_size`
    /// discrete actions. The target network starts as an exact copy of the policy.
    pub fn new(state_size: usize, action_size: usize, config: AgentConfig) -> Result<Self> {
        config.validate()?;

        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let policy_net = QNetwork::new(
            state_size,
            action_size,
            &config.hidden_sizes,
            config.weight_init,
            &mut rng,
        )?;
        let target_net = policy_net.clone();

        Ok(DqnAgent {
            policy_net,
            target_net,
            memory: ReplayBuffer::new(config.memory_capacity),
            optimizer: config.optimizer.clone(),
            config,
            steps_done: 0,
            rng,
        })
    }

    pub fn state_size(&self) -> usize {
        self.policy_net.state_size()
    }

    pub fn action_size(&self) -> usize {
        self.policy_net.action_size()
    }

    /// Number of `select_action` calls so far
    pub fn steps_done(&self) -> u64 {
        self.steps_done
    }

    /// Exploration threshold the next `select_action` call will use
    pub fn epsilon(&self) -> f32 {
        self.config.epsilon.threshold(self.steps_done)
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn policy_net(&self) -> &QNetwork {
        &self.policy_net
    }

    pub fn target_net(&self) -> &QNetwork {
        &self.target_net
    }

    pub fn memory(&self) -> &ReplayBuffer {
        &self.memory
    }

    /// Epsilon-greedy action selection.
    ///
    /// The step counter advances on every call, whichever branch is taken.
    pub fn select_action(&mut self, state: ArrayView1<f32>) -> Result<usize> {
        self.check_state(state)?;

        let sample: f32 = self.rng.gen();
        let eps_threshold = self.config.epsilon.threshold(self.steps_done);
        self.steps_done += 1;

        if sample > eps_threshold {
            self.greedy_action(state)
        } else {
            Ok(self.rng.gen_range(0..self.action_size()))
        }
    }

    /// Action with the highest policy value; the lowest index wins ties.
    pub fn greedy_action(&self, state: ArrayView1<f32>) -> Result<usize> {
        let q_values = self.policy_net.evaluate_one(state)?;
        argmax(q_values.view())
    }

    /// Store one transition. `next_state` is `None` for the step that ended the episode.
    pub fn push_transition(
        &mut self,
        state: Array1<f32>,
        action: usize,
        next_state: Option<Array1<f32>>,
        reward: f32,
    ) -> Result<()> {
        self.check_state(state.view())?;
        if let Some(next) = &next_state {
            self.check_state(next.view())?;
        }
        if action >= self.action_size() {
            return Err(AqmError::InvalidAction {
                action,
                max_actions: self.action_size(),
            });
        }
        if !reward.is_finite()
            || state.iter().any(|v| !v.is_finite())
            || next_state.iter().flat_map(|s| s.iter()).any(|v| !v.is_finite())
        {
            return Err(AqmError::NumericalError("transition contains non-finite values".to_string()));
        }

        self.memory.push(Transition::new(state, action, next_state, reward));
        Ok(())
    }

    /// One gradient step on a uniformly sampled batch.
    ///
    /// Returns `Ok(None)` without touching anything while fewer than `batch_size`
    /// transitions are stored.
    pub fn optimize_model(&mut self) -> Result<Option<OptimizeStats>> {
        let batch_size = self.config.batch_size;
        if self.memory.len() < batch_size {
            return Ok(None);
        }

        let state_size = self.state_size();
        let action_size = self.action_size();

        let mut states = Array2::zeros((batch_size, state_size));
        let mut actions = Vec::with_capacity(batch_size);
        let mut rewards = Array1::zeros(batch_size);
        let mut non_final_mask = Vec::with_capacity(batch_size);
        let mut non_final_next_states = Vec::with_capacity(batch_size);

        let transitions = self.memory.sample(batch_size, &mut self.rng)?;
        for (i, transition) in transitions.into_iter().enumerate() {
            states.row_mut(i).assign(&transition.state);
            actions.push(transition.action);
            rewards[i] = transition.reward;
            non_final_mask.push(transition.next_state.is_some());
            if let Some(next_state) = &transition.next_state {
                non_final_next_states.push(next_state.view());
            }
        }

        // Bootstrapped values come from the frozen target network; terminal rows stay 0
        let mut next_state_values = Array1::<f32>::zeros(batch_size);
        if !non_final_next_states.is_empty() {
            let next_batch = ndarray::stack(Axis(0), &non_final_next_states)
                .map_err(|e| AqmError::dimension_mismatch(format!("[K, {}]", state_size), e.to_string()))?;
            let next_values = self.target_net.evaluate(next_batch.view())?;
            let maxima = next_values.map_axis(Axis(1), |row| row.fold(f32::NEG_INFINITY, |m, &v| m.max(v)));
            let mut maxima = maxima.into_iter();
            for (slot, &present) in next_state_values.iter_mut().zip(&non_final_mask) {
                if present {
                    if let Some(value) = maxima.next() {
                        *slot = value;
                    }
                }
            }
        }

        let expected_values = &next_state_values * self.config.gamma + &rewards;

        let trace = self.policy_net.forward_trace(states.view())?;
        let state_action_values = Array1::from_shape_fn(batch_size, |i| trace.output[[i, actions[i]]]);

        let loss = self.config.loss.compute(state_action_values.view(), expected_values.view());
        if !loss.is_finite() {
            return Err(AqmError::NumericalError(format!("loss is {}", loss)));
        }

        // Only the taken action's output receives gradient
        let value_grads = self.config.loss.gradient(state_action_values.view(), expected_values.view());
        let mut output_grad = Array2::zeros((batch_size, action_size));
        for (i, &action) in actions.iter().enumerate() {
            output_grad[[i, action]] = value_grads[i];
        }

        let mut gradients = self.policy_net.backward(&trace, output_grad.view())?;
        let grad_norm = gradients.global_norm();
        self.config.gradient_clipper.clip(&mut gradients);
        if !gradients.is_finite() {
            return Err(AqmError::NumericalError(format!(
                "non-finite gradients (norm before clipping {})",
                grad_norm
            )));
        }
        self.optimizer.step(&mut self.policy_net, &gradients)?;

        debug!(loss, grad_norm, memory = self.memory.len(), "optimization step");

        Ok(Some(OptimizeStats { loss, grad_norm }))
    }

    /// Hard-copy every policy parameter into the target network. The copy is
    /// all-or-nothing: on error the target keeps its previous parameters.
    pub fn update_target_net(&mut self) -> Result<()> {
        self.target_net.copy_from(&self.policy_net)
    }

    fn check_state(&self, state: ArrayView1<f32>) -> Result<()> {
        if state.len() != self.state_size() {
            return Err(AqmError::dimension_mismatch(
                format!("state of length {}", self.state_size()),
                format!("{}", state.len()),
            ));
        }
        Ok(())
    }
}

/// Index of the largest value, first occurrence on ties.
fn argmax(values: ArrayView1<f32>) -> Result<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (i, &value) in values.iter().enumerate() {
        if value.is_nan() {
            return Err(AqmError::NumericalError("NaN action-value".to_string()));
        }
        match best {
            Some((_, best_value)) if value <= best_value => {}
            _ => best = Some((i, value)),
        }
    }
    best.map(|(i, _)| i)
        .ok_or_else(|| AqmError::NumericalError("No action-values".to_string()))
}

/// Builder pattern for DqnAgent
pub struct DqnAgentBuilder {
    state_size: usize,
    action_size: usize,
    config: AgentConfig,
}

impl DqnAgentBuilder {
    pub fn new() -> Self {
        DqnAgentBuilder {
            state_size: 0,
            action_size: 0,
            config: AgentConfig::default(),
        }
    }

    pub fn state_size(mut self, size: usize) -> Self {
        self.state_size = size;
        self
    }

    pub fn action_size(mut self, size: usize) -> Self {
        self.action_size = size;
        self
    }

    pub fn config(mut self, config: AgentConfig) -> Self {
        self.config = config;
        self
    }

    pub fn memory_capacity(mut self, capacity: usize) -> Self {
        self.config.memory_capacity = capacity;
        self
    }

    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.config.batch_size = batch_size;
        self
    }

    pub fn gamma(mut self, gamma: f32) -> Self {
        self.config.gamma = gamma;
        self
    }

    pub fn epsilon(mut self, schedule: EpsilonSchedule) -> Self {
        self.config.epsilon = schedule;
        self
    }

    pub fn hidden_sizes(mut self, sizes: &[usize]) -> Self {
        self.config.hidden_sizes = sizes.to_vec();
        self
    }

    pub fn optimizer(mut self, optimizer: OptimizerWrapper) -> Self {
        self.config.optimizer = optimizer;
        self
    }

    pub fn gradient_clipper(mut self, clipper: GradientClipper) -> Self {
        self.config.gradient_clipper = clipper;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.config.seed = Some(seed);
        self
    }

    pub fn build(self) -> Result<DqnAgent> {
        if self.state_size == 0 {
            return Err(AqmError::invalid_parameter("state_size", "must be specified"));
        }
        if self.action_size == 0 {
            return Err(AqmError::invalid_parameter("action_size", "must be specified"));
        }
        DqnAgent::new(self.state_size, self.action_size, self.config)
    }
}

impl Default for DqnAgentBuilder {
    fn default() -> Self {
        Self::new()
    }
}
