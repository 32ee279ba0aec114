use ndarray::{Array1, ArrayView1};
use serde::{Serialize, Deserialize};

/// Smooth L1 (Huber-style) loss with mean reduction.
///
/// Quadratic for residuals smaller than `beta`, linear beyond it, so a few large
/// residuals cannot dominate the update.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmoothL1Loss {
    pub beta: f32,
}

impl Default for SmoothL1Loss {
    fn default() -> Self {
        SmoothL1Loss { beta: 1.0 }
    }
}

impl SmoothL1Loss {
    pub fn new(beta: f32) -> Self {
        SmoothL1Loss { beta }
    }

    /// Mean loss over the batch.
    pub fn compute(&self, predictions: ArrayView1<f32>, targets: ArrayView1<f32>) -> f32 {
        if predictions.is_empty() {
            return 0.0;
        }
        let beta = self.beta;
        let diff = &predictions - &targets;
        diff.mapv(|x| {
            let abs_x = x.abs();
            if abs_x < beta {
                0.5 * x * x / beta
            } else {
                abs_x - 0.5 * beta
            }
        })
        .sum()
            / predictions.len() as f32
    }

    /// Gradient of the mean loss with respect to each prediction.
    pub fn gradient(&self, predictions: ArrayView1<f32>, targets: ArrayView1<f32>) -> Array1<f32> {
        if predictions.is_empty() {
            return Array1::zeros(0);
        }
        let beta = self.beta;
        let n = predictions.len() as f32;
        let diff = &predictions - &targets;
        diff.mapv(|x| {
            if x.abs() < beta {
                x / beta
            } else {
                x.signum()
            }
        }) / n
    }
}
