//! # Activation Functions
//!
//! The value network only needs two activations:
//!
//! - **ReLU**: `max(0, x)` after every hidden layer
//! - **Linear**: identity on the output layer, so action-values stay unbounded
//!
//! ```rust
//! use rl_aqm::activations::Activation;
//! use ndarray::array;
//!
//! let mut data = array![[1.0, -0.5, 0.0, 2.0]];
//! Activation::Relu.apply_batch(&mut data);
//! assert_eq!(data, array![[1.0, 0.0, 0.0, 2.0]]);
//! ```

pub mod functions;

pub use functions::Activation;
