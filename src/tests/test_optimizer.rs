use ndarray::{array, Array1, Array2};
use rand::rngs::StdRng;
use rand::SeedableRng;
use crate::activations::Activation;
use crate::layers::{DenseLayer, WeightInit};
use crate::loss::SmoothL1Loss;
use crate::network::{Gradients, LayerGradients, QNetwork};
use crate::optimizer::{Adam, GradientClipper, Optimizer, OptimizerWrapper, Sgd};

fn single_layer_network() -> QNetwork {
    let mut rng = StdRng::seed_from_u64(0);
    let layer = DenseLayer::new(1, 2, Activation::Linear, WeightInit::default(), &mut rng)
        .with_weights(array![[1.0, 1.0]])
        .unwrap()
        .with_biases(array![0.0, 0.0])
        .unwrap();
    QNetwork::from_layers(vec![layer]).unwrap()
}

fn gradients(weights: Array2<f32>, biases: Array1<f32>) -> Gradients {
    Gradients {
        layers: vec![LayerGradients { weights, biases }],
    }
}

#[test]
fn test_sgd_step() {
    let mut net = single_layer_network();
    let mut sgd = Sgd::new(0.5);
    sgd.step(&mut net, &gradients(array![[0.2, -0.4]], array![1.0, 0.0])).unwrap();

    let w = &net.layers[0].weights;
    assert!((w[[0, 0]] - 0.9).abs() < 1e-6);
    assert!((w[[0, 1]] - 1.2).abs() < 1e-6);
    assert_eq!(net.layers[0].biases, array![-0.5, 0.0]);
}

#[test]
fn test_adam_first_step_moves_by_learning_rate() {
    let mut net = single_layer_network();
    let mut adam = Adam::default();
    adam.step(&mut net, &gradients(array![[0.1, -0.2]], array![0.0, 3.0])).unwrap();

    // Bias correction makes the first update lr * g / |g|
    let w = &net.layers[0].weights;
    assert!((w[[0, 0]] - 0.999).abs() < 1e-5);
    assert!((w[[0, 1]] - 1.001).abs() < 1e-5);
    let b = &net.layers[0].biases;
    assert_eq!(b[0], 0.0);
    assert!((b[1] + 0.001).abs() < 1e-5);
    assert_eq!(adam.t, 1);
}

#[test]
fn test_adam_keeps_moments_across_steps() {
    let mut net = single_layer_network();
    let mut adam = Adam::new(0.01, 0.9, 0.999, 1e-8);
    let grads = gradients(array![[1.0, 1.0]], array![1.0, 1.0]);
    for _ in 0..5 {
        adam.step(&mut net, &grads).unwrap();
    }
    // A constant gradient keeps the normalised step at lr
    assert!((net.layers[0].weights[[0, 0]] - 0.95).abs() < 1e-4);
    assert_eq!(adam.t, 5);

    adam.reset();
    assert_eq!(adam.t, 0);
}

#[test]
fn test_adam_rejects_other_network() {
    let mut net = single_layer_network();
    let mut adam = Adam::default();
    adam.step(&mut net, &gradients(array![[0.1, 0.1]], array![0.1, 0.1])).unwrap();

    let mut rng = StdRng::seed_from_u64(1);
    let mut other = QNetwork::new(1, 2, &[3], WeightInit::default(), &mut rng).unwrap();
    let other_grads = Gradients {
        layers: other
            .layers
            .iter()
            .map(|l| LayerGradients {
                weights: Array2::zeros(l.weights.dim()),
                biases: Array1::zeros(l.biases.len()),
            })
            .collect(),
    };
    assert!(adam.step(&mut other, &other_grads).is_err());
}

#[test]
fn test_optimizer_wrapper_dispatch() {
    let mut net = single_layer_network();
    let mut optimizer = OptimizerWrapper::Sgd(Sgd::new(1.0));
    assert_eq!(optimizer.learning_rate(), 1.0);
    optimizer.step(&mut net, &gradients(array![[1.0, 0.0]], array![0.0, 0.0])).unwrap();
    assert_eq!(net.layers[0].weights, array![[0.0, 1.0]]);

    assert_eq!(OptimizerWrapper::default().learning_rate(), 1e-3);
}

#[test]
fn test_optimizer_wrapper_json() {
    let optimizer: OptimizerWrapper = serde_json::from_str(r#"{"kind": "sgd", "learning_rate": 0.1}"#).unwrap();
    assert_eq!(optimizer, OptimizerWrapper::Sgd(Sgd::new(0.1)));

    let optimizer: OptimizerWrapper = serde_json::from_str(r#"{"kind": "adam"}"#).unwrap();
    assert_eq!(optimizer, OptimizerWrapper::Adam(Adam::default()));
}

#[test]
fn test_clip_by_value() {
    let mut grads = gradients(array![[5.0, -0.5]], array![-3.0, 0.25]);
    GradientClipper::default().clip(&mut grads);
    assert_eq!(grads.layers[0].weights, array![[1.0, -0.5]]);
    assert_eq!(grads.layers[0].biases, array![-1.0, 0.25]);
}

#[test]
fn test_clip_by_global_norm() {
    let mut grads = gradients(array![[3.0, 0.0]], array![0.0, 4.0]);
    GradientClipper::ClipByGlobalNorm { max_norm: 1.0 }.clip(&mut grads);
    assert!((grads.global_norm() - 1.0).abs() < 1e-6);
    assert!((grads.layers[0].weights[[0, 0]] - 0.6).abs() < 1e-6);

    // Already inside the bound: untouched
    let mut small = gradients(array![[0.1, 0.0]], array![0.0, 0.1]);
    let before = small.clone();
    GradientClipper::ClipByGlobalNorm { max_norm: 1.0 }.clip(&mut small);
    assert_eq!(small, before);
}

#[test]
fn test_clip_by_norm_per_tensor() {
    let mut grads = gradients(array![[3.0, 4.0]], array![0.3, 0.4]);
    GradientClipper::ClipByNorm { max_norm: 1.0 }.clip(&mut grads);
    assert!((grads.layers[0].weights[[0, 0]] - 0.6).abs() < 1e-6);
    assert!((grads.layers[0].weights[[0, 1]] - 0.8).abs() < 1e-6);
    assert_eq!(grads.layers[0].biases, array![0.3, 0.4]);
}

#[test]
fn test_no_clipping() {
    let mut grads = gradients(array![[30.0, -40.0]], array![100.0, 0.0]);
    let before = grads.clone();
    GradientClipper::None.clip(&mut grads);
    assert_eq!(grads, before);
}

#[test]
fn test_smooth_l1_values() {
    let loss = SmoothL1Loss::default();
    let predictions = array![0.5, 3.0, -2.0, 1.0];
    let targets = array![0.0, 0.0, 0.0, 1.0];
    // 0.125, 2.5, 1.5 and 0, averaged
    let value = loss.compute(predictions.view(), targets.view());
    assert!((value - 1.03125).abs() < 1e-6);
}

#[test]
fn test_smooth_l1_gradient() {
    let loss = SmoothL1Loss::default();
    let predictions = array![0.5, 3.0, -2.0, 1.0];
    let targets = array![0.0, 0.0, 0.0, 1.0];
    let grad = loss.gradient(predictions.view(), targets.view());
    assert_eq!(grad, array![0.125, 0.25, -0.25, 0.0]);
}

#[test]
fn test_smooth_l1_empty_batch() {
    let loss = SmoothL1Loss::default();
    let empty = Array1::<f32>::zeros(0);
    assert_eq!(loss.compute(empty.view(), empty.view()), 0.0);
    assert!(loss.gradient(empty.view(), empty.view()).is_empty());
}

#[test]
fn test_clip_by_value_keeps_nan() {
    let mut grads = gradients(array![[f32::NAN, 5.0]], array![-5.0, f32::NAN]);
    GradientClipper::ClipByValue { min: -1.0, max: 1.0 }.clip(&mut grads);
    assert!(grads.layers[0].weights[[0, 0]].is_nan());
    assert_eq!(grads.layers[0].weights[[0, 1]], 1.0);
    assert_eq!(grads.layers[0].biases[0], -1.0);
    assert!(grads.layers[0].biases[1].is_nan());
    assert!(!grads.is_finite());
}
