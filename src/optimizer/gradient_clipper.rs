use serde::{Serialize, Deserialize};

use crate::network::Gradients;

/// Gradient clipping methods
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GradientClipper {
    /// Clamp every gradient element into `[min, max]`
    ClipByValue { min: f32, max: f32 },

    /// Rescale each weight or bias tensor whose L2 norm exceeds `max_norm`
    ClipByNorm { max_norm: f32 },

    /// Rescale all gradients together when their joint L2 norm exceeds `max_norm`
    ClipByGlobalNorm { max_norm: f32 },

    /// No clipping
    None,
}

impl Default for GradientClipper {
    fn default() -> Self {
        GradientClipper::ClipByValue { min: -1.0, max: 1.0 }
    }
}

// Like clamp, but NaN stays NaN instead of becoming `min`
fn clamp_keep_nan(g: f32, min: f32, max: f32) -> f32 {
    if g.is_nan() {
        g
    } else {
        g.max(min).min(max)
    }
}

impl GradientClipper {
    /// Clip `gradients` in place.
    pub fn clip(&self, gradients: &mut Gradients) {
        match *self {
            GradientClipper::ClipByValue { min, max } => {
                for layer in &mut gradients.layers {
                    layer.weights.mapv_inplace(|g| clamp_keep_nan(g, min, max));
                    layer.biases.mapv_inplace(|g| clamp_keep_nan(g, min, max));
                }
            }

            GradientClipper::ClipByNorm { max_norm } => {
                for layer in &mut gradients.layers {
                    let norm = layer.weights.iter().map(|&g| g * g).sum::<f32>().sqrt();
                    if norm > max_norm {
                        let scale = max_norm / norm;
                        layer.weights.mapv_inplace(|g| g * scale);
                    }
                    let norm = layer.biases.iter().map(|&g| g * g).sum::<f32>().sqrt();
                    if norm > max_norm {
                        let scale = max_norm / norm;
                        layer.biases.mapv_inplace(|g| g * scale);
                    }
                }
            }

            GradientClipper::ClipByGlobalNorm { max_norm } => {
                let global_norm = gradients.global_norm();
                if global_norm > max_norm {
                    let scale = max_norm / global_norm;
                    for layer in &mut gradients.layers {
                        layer.weights.mapv_inplace(|g| g * scale);
                        layer.biases.mapv_inplace(|g| g * scale);
                    }
                }
            }

            GradientClipper::None => {}
        }
    }
}
