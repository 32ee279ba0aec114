use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use rand::Rng;
use serde::{Serialize, Deserialize};

use crate::activations::Activation;
use crate::error::{AqmError, Result};
use crate::layers::{DenseLayer, LayerTrace, WeightInit};

/// Hidden layer widths used when none are configured.
pub const DEFAULT_HIDDEN_SIZES: [usize; 2] = [64, 64];

/// Feed-forward action-value network: ReLU hidden layers and a linear output layer
/// producing one estimate per discrete action.
///
/// Evaluation comes in two flavours chosen per call rather than by a global mode:
/// [`QNetwork::evaluate`] is frozen and records nothing, [`QNetwork::forward_trace`]
/// records what [`QNetwork::backward`] needs to compute gradients.
///
/// # Example
///
/// ```rust
/// use rl_aqm::network::QNetwork;
/// use rl_aqm::layers::WeightInit;
/// use ndarray::Array2;
/// use rand::SeedableRng;
///
/// let mut rng = rand::rngs::StdRng::seed_from_u64(7);
/// let network = QNetwork::new(3, 5, &[64, 64], WeightInit::default(), &mut rng).unwrap();
/// let values = network.evaluate(Array2::zeros((8, 3)).view()).unwrap();
/// assert_eq!(values.dim(), (8, 5));
/// ```
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct QNetwork {
    pub layers: Vec<DenseLayer>,
}

/// Per-layer inputs and pre-activations of one trainable forward pass.
#[derive(Clone, Debug)]
pub struct ForwardTrace {
    pub output: Array2<f32>,
    layers: Vec<LayerTrace>,
}

/// Gradient of the loss with respect to one layer's parameters
#[derive(Clone, Debug, PartialEq)]
pub struct LayerGradients {
    pub weights: Array2<f32>,
    pub biases: Array1<f32>,
}

/// Gradients for every layer of a network, ordered input to output.
#[derive(Clone, Debug, PartialEq)]
pub struct Gradients {
    pub layers: Vec<LayerGradients>,
}

impl Gradients {
    /// L2 norm over every weight and bias gradient element.
    pub fn global_norm(&self) -> f32 {
        self.layers
            .iter()
            .map(|g| {
                g.weights.iter().map(|&x| x * x).sum::<f32>()
                    + g.biases.iter().map(|&x| x * x).sum::<f32>()
            })
            .sum::<f32>()
            .sqrt()
    }

    /// True when no gradient element is NaN or infinite.
    pub fn is_finite(&self) -> bool {
        self.layers
            .iter()
            .flat_map(|g| g.weights.iter().chain(g.biases.iter()))
            .all(|x| x.is_finite())
    }

    /// Largest absolute gradient element.
    pub fn max_abs(&self) -> f32 {
        self.layers
            .iter()
            .flat_map(|g| g.weights.iter().chain(g.biases.iter()))
            .fold(0.0f32, |max, &x| max.max(x.abs()))
    }
}

impl QNetwork {
    /// Build a network mapping `state_size` inputs to `action_size` outputs through
    /// `hidden_sizes` ReLU layers.
    pub fn new<R: Rng + ?Sized>(
        state_size: usize,
        action_size: usize,
        hidden_sizes: &[usize],
        init: WeightInit,
        rng: &mut R,
    ) -> Result<Self> {
        if state_size == 0 {
            return Err(AqmError::invalid_parameter("state_size", "must be at least 1"));
        }
        if action_size == 0 {
            return Err(AqmError::invalid_parameter("action_size", "must be at least 1"));
        }
        if hidden_sizes.iter().any(|&size| size == 0) {
            return Err(AqmError::invalid_parameter("hidden_sizes", "every hidden layer needs at least 1 unit"));
        }

        let mut layer_sizes = Vec::with_capacity(hidden_sizes.len() + 2);
        layer_sizes.push(state_size);
        layer_sizes.extend_from_slice(hidden_sizes);
        layer_sizes.push(action_size);

        let last = layer_sizes.len() - 2;
        let layers = layer_sizes
            .windows(2)
            .enumerate()
            .map(|(i, window)| {
                let activation = if i == last { Activation::Linear } else { Activation::Relu };
                DenseLayer::new(window[0], window[1], activation, init, rng)
            })
            .collect();

        Ok(QNetwork { layers })
    }

    /// Build a network from explicit layers, checking that consecutive sizes chain.
    pub fn from_layers(layers: Vec<DenseLayer>) -> Result<Self> {
        if layers.is_empty() {
            return Err(AqmError::invalid_parameter("layers", "network needs at least one layer"));
        }
        for pair in layers.windows(2) {
            if pair[0].output_size() != pair[1].input_size() {
                return Err(AqmError::dimension_mismatch(
                    format!("layer input of {}", pair[0].output_size()),
                    format!("{}", pair[1].input_size()),
                ));
            }
        }
        Ok(QNetwork { layers })
    }

    pub fn state_size(&self) -> usize {
        self.layers[0].input_size()
    }

    pub fn action_size(&self) -> usize {
        self.layers[self.layers.len() - 1].output_size()
    }

    /// Frozen evaluation of a batch `[N, S]` into action-values `[N, A]`.
    pub fn evaluate(&self, states: ArrayView2<f32>) -> Result<Array2<f32>> {
        self.check_input(states)?;
        let mut current = states.to_owned();
        for layer in &self.layers {
            current = layer.forward_batch(current.view());
        }
        Ok(current)
    }

    /// Frozen evaluation of a single state `[S]` into action-values `[A]`.
    pub fn evaluate_one(&self, state: ArrayView1<f32>) -> Result<Array1<f32>> {
        let values = self.evaluate(state.insert_axis(Axis(0)))?;
        Ok(values.index_axis_move(Axis(0), 0))
    }

    /// Trainable evaluation: same output as [`QNetwork::evaluate`], plus the per-layer
    /// record needed for backpropagation.
    pub fn forward_trace(&self, states: ArrayView2<f32>) -> Result<ForwardTrace> {
        self.check_input(states)?;
        let mut traces = Vec::with_capacity(self.layers.len());
        let mut current = states.to_owned();
        for layer in &self.layers {
            let (output, trace) = layer.forward_traced(current.view());
            traces.push(trace);
            current = output;
        }
        Ok(ForwardTrace {
            output: current,
            layers: traces,
        })
    }

    /// Backpropagate dLoss/dOutput through the traced forward pass.
    pub fn backward(&self, trace: &ForwardTrace, output_grad: ArrayView2<f32>) -> Result<Gradients> {
        if output_grad.dim() != trace.output.dim() {
            return Err(AqmError::dimension_mismatch(
                format!("{:?}", trace.output.dim()),
                format!("{:?}", output_grad.dim()),
            ));
        }
        if trace.layers.len() != self.layers.len() {
            return Err(AqmError::dimension_mismatch(
                format!("trace of {} layers", self.layers.len()),
                format!("{}", trace.layers.len()),
            ));
        }

        let mut gradients = Vec::with_capacity(self.layers.len());
        let mut current_error = output_grad.to_owned();

        for i in (0..self.layers.len()).rev() {
            let layer = &self.layers[i];
            let (adjusted_error, weight_gradients, bias_gradients) =
                layer.backward_batch(&trace.layers[i], current_error.view());
            gradients.push(LayerGradients {
                weights: weight_gradients,
                biases: bias_gradients,
            });

            if i != 0 {
                current_error = adjusted_error.dot(&layer.weights.t());
            }
        }

        gradients.reverse();
        Ok(Gradients { layers: gradients })
    }

    /// Hard copy of every parameter from `other`. Either all layers are copied or,
    /// when the architectures differ, none are.
    pub fn copy_from(&mut self, other: &QNetwork) -> Result<()> {
        if self.layers.len() != other.layers.len() {
            return Err(AqmError::dimension_mismatch(
                format!("{} layers", self.layers.len()),
                format!("{} layers", other.layers.len()),
            ));
        }
        for (mine, theirs) in self.layers.iter().zip(&other.layers) {
            if mine.weights.dim() != theirs.weights.dim() {
                return Err(AqmError::dimension_mismatch(
                    format!("{:?}", mine.weights.dim()),
                    format!("{:?}", theirs.weights.dim()),
                ));
            }
        }

        for (mine, theirs) in self.layers.iter_mut().zip(&other.layers) {
            mine.weights.assign(&theirs.weights);
            mine.biases.assign(&theirs.biases);
            mine.activation = theirs.activation;
        }
        Ok(())
    }

    /// Total number of trainable scalars.
    pub fn parameter_count(&self) -> usize {
        self.layers
            .iter()
            .map(|layer| layer.weights.len() + layer.biases.len())
            .sum()
    }

    fn check_input(&self, states: ArrayView2<f32>) -> Result<()> {
        let expected = self.state_size();
        if states.ncols() != expected {
            return Err(AqmError::dimension_mismatch(
                format!("[N, {}]", expected),
                format!("{:?}", states.dim()),
            ));
        }
        Ok(())
    }
}
