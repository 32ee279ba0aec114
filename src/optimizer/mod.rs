pub mod gradient_clipper;

use ndarray::{Array1, Array2};
use serde::{Serialize, Deserialize};

use crate::error::{AqmError, Result};
use crate::network::{Gradients, QNetwork};

pub use gradient_clipper::GradientClipper;

/// Applies one update to a network's parameters from its gradients.
pub trait Optimizer {
    fn step(&mut self, network: &mut QNetwork, gradients: &Gradients) -> Result<()>;

    fn learning_rate(&self) -> f32;
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OptimizerWrapper {
    Sgd(Sgd),
    Adam(Adam),
}

impl Default for OptimizerWrapper {
    fn default() -> Self {
        OptimizerWrapper::Adam(Adam::default())
    }
}

impl Optimizer for OptimizerWrapper {
    fn step(&mut self, network: &mut QNetwork, gradients: &Gradients) -> Result<()> {
        match self {
            OptimizerWrapper::Sgd(optimizer) => optimizer.step(network, gradients),
            OptimizerWrapper::Adam(optimizer) => optimizer.step(network, gradients),
        }
    }

    fn learning_rate(&self) -> f32 {
        match self {
            OptimizerWrapper::Sgd(optimizer) => optimizer.learning_rate(),
            OptimizerWrapper::Adam(optimizer) => optimizer.learning_rate(),
        }
    }
}

fn check_layer_count(network: &QNetwork, gradients: &Gradients) -> Result<()> {
    if network.layers.len() != gradients.layers.len() {
        return Err(AqmError::dimension_mismatch(
            format!("gradients for {} layers", network.layers.len()),
            format!("{}", gradients.layers.len()),
        ));
    }
    Ok(())
}

/// Plain stochastic gradient descent
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct Sgd {
    pub learning_rate: f32,
}

impl Sgd {
    pub fn new(learning_rate: f32) -> Sgd {
        Sgd { learning_rate }
    }
}

impl Default for Sgd {
    fn default() -> Self {
        Self::new(0.01)
    }
}

impl Optimizer for Sgd {
    fn step(&mut self, network: &mut QNetwork, gradients: &Gradients) -> Result<()> {
        check_layer_count(network, gradients)?;
        let lr = self.learning_rate;
        for (layer, grads) in network.layers.iter_mut().zip(&gradients.layers) {
            layer.weights.zip_mut_with(&grads.weights, |w, &g| *w -= lr * g);
            layer.biases.zip_mut_with(&grads.biases, |b, &g| *b -= lr * g);
        }
        Ok(())
    }

    fn learning_rate(&self) -> f32 {
        self.learning_rate
    }
}

/// Adam: per-parameter step sizes from bias-corrected first and second moment
/// estimates. Moments are allocated on the first step to match the network.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct Adam {
    pub learning_rate: f32,
    pub beta1: f32,
    pub beta2: f32,
    pub epsilon: f32,
    #[serde(skip)]
    m_weights: Vec<Array2<f32>>,
    #[serde(skip)]
    v_weights: Vec<Array2<f32>>,
    #[serde(skip)]
    m_biases: Vec<Array1<f32>>,
    #[serde(skip)]
    v_biases: Vec<Array1<f32>>,
    /// Number of completed steps
    #[serde(skip)]
    pub t: usize,
}

impl Adam {
    pub fn new(learning_rate: f32, beta1: f32, beta2: f32, epsilon: f32) -> Self {
        Adam {
            learning_rate,
            beta1,
            beta2,
            epsilon,
            m_weights: Vec::new(),
            v_weights: Vec::new(),
            m_biases: Vec::new(),
            v_biases: Vec::new(),
            t: 0,
        }
    }

    /// Forget all moment estimates, as if no step had been taken.
    pub fn reset(&mut self) {
        self.m_weights.clear();
        self.v_weights.clear();
        self.m_biases.clear();
        self.v_biases.clear();
        self.t = 0;
    }

    fn ensure_moments(&mut self, gradients: &Gradients) -> Result<()> {
        if self.m_weights.is_empty() {
            for grads in &gradients.layers {
                self.m_weights.push(Array2::zeros(grads.weights.dim()));
                self.v_weights.push(Array2::zeros(grads.weights.dim()));
                self.m_biases.push(Array1::zeros(grads.biases.dim()));
                self.v_biases.push(Array1::zeros(grads.biases.dim()));
            }
            return Ok(());
        }

        if self.m_weights.len() != gradients.layers.len() {
            return Err(AqmError::dimension_mismatch(
                format!("moments for {} layers", self.m_weights.len()),
                format!("{}", gradients.layers.len()),
            ));
        }
        for (i, grads) in gradients.layers.iter().enumerate() {
            if self.m_weights[i].dim() != grads.weights.dim() || self.m_biases[i].dim() != grads.biases.dim() {
                return Err(AqmError::dimension_mismatch(
                    format!("{:?}", self.m_weights[i].dim()),
                    format!("{:?}", grads.weights.dim()),
                ));
            }
        }
        Ok(())
    }
}

impl Default for Adam {
    fn default() -> Self {
        Self::new(1e-3, 0.9, 0.999, 1e-8)
    }
}

impl Optimizer for Adam {
    fn step(&mut self, network: &mut QNetwork, gradients: &Gradients) -> Result<()> {
        check_layer_count(network, gradients)?;
        self.ensure_moments(gradients)?;

        self.t += 1;
        let (beta1, beta2, eps, lr) = (self.beta1, self.beta2, self.epsilon, self.learning_rate);
        let correction1 = 1.0 - beta1.powi(self.t as i32);
        let correction2 = 1.0 - beta2.powi(self.t as i32);

        for (i, (layer, grads)) in network.layers.iter_mut().zip(&gradients.layers).enumerate() {
            let m = &mut self.m_weights[i];
            let v = &mut self.v_weights[i];
            m.zip_mut_with(&grads.weights, |m, &g| *m = beta1 * *m + (1.0 - beta1) * g);
            v.zip_mut_with(&grads.weights, |v, &g| *v = beta2 * *v + (1.0 - beta2) * g * g);
            let m_hat = m.mapv(|x| x / correction1);
            let v_hat = v.mapv(|x| x / correction2);
            layer.weights -= &((&m_hat / &(v_hat.mapv(f32::sqrt) + eps)) * lr);

            let m = &mut self.m_biases[i];
            let v = &mut self.v_biases[i];
            m.zip_mut_with(&grads.biases, |m, &g| *m = beta1 * *m + (1.0 - beta1) * g);
            v.zip_mut_with(&grads.biases, |v, &g| *v = beta2 * *v + (1.0 - beta2) * g * g);
            let m_hat = m.mapv(|x| x / correction1);
            let v_hat = v.mapv(|x| x / correction2);
            layer.biases -= &((&m_hat / &(v_hat.mapv(f32::sqrt) + eps)) * lr);
        }
        Ok(())
    }

    fn learning_rate(&self) -> f32 {
        self.learning_rate
    }
}
