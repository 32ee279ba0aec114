pub mod dense;
pub mod initialization;

pub use dense::{DenseLayer, LayerTrace};
pub use initialization::WeightInit;
