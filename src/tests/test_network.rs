use ndarray::{array, Array1, Array2};
use rand::rngs::StdRng;
use rand::SeedableRng;
use crate::activations::Activation;
use crate::error::AqmError;
use crate::layers::{DenseLayer, WeightInit};
use crate::network::{QNetwork, DEFAULT_HIDDEN_SIZES};

fn network(state_size: usize, action_size: usize) -> QNetwork {
    let mut rng = StdRng::seed_from_u64(3);
    QNetwork::new(state_size, action_size, &DEFAULT_HIDDEN_SIZES, WeightInit::default(), &mut rng).unwrap()
}

// 2 -> 2 (ReLU) -> 1 (linear) with pre-activations kept well away from zero
fn hand_built() -> QNetwork {
    let mut rng = StdRng::seed_from_u64(0);
    let hidden = DenseLayer::new(2, 2, Activation::Relu, WeightInit::default(), &mut rng)
        .with_weights(array![[1.0, -1.0], [0.5, 2.0]])
        .unwrap()
        .with_biases(array![0.1, 0.2])
        .unwrap();
    let output = DenseLayer::new(2, 1, Activation::Linear, WeightInit::default(), &mut rng)
        .with_weights(array![[1.5], [-0.5]])
        .unwrap()
        .with_biases(array![0.3])
        .unwrap();
    QNetwork::from_layers(vec![hidden, output]).unwrap()
}

#[test]
fn test_network_architecture() {
    let net = network(3, 5);
    assert_eq!(net.layers.len(), 3);
    assert_eq!(net.layers[0].weights.shape(), [3, 64]);
    assert_eq!(net.layers[1].weights.shape(), [64, 64]);
    assert_eq!(net.layers[2].weights.shape(), [64, 5]);
    assert_eq!(net.layers[0].activation, Activation::Relu);
    assert_eq!(net.layers[2].activation, Activation::Linear);
    assert_eq!(net.state_size(), 3);
    assert_eq!(net.action_size(), 5);
    assert_eq!(net.parameter_count(), 3 * 64 + 64 + 64 * 64 + 64 + 64 * 5 + 5);
}

#[test]
fn test_new_rejects_zero_sizes() {
    let mut rng = StdRng::seed_from_u64(0);
    assert!(QNetwork::new(0, 2, &[4], WeightInit::default(), &mut rng).is_err());
    assert!(QNetwork::new(2, 0, &[4], WeightInit::default(), &mut rng).is_err());
}

#[test]
fn test_evaluate_shape() {
    let net = network(4, 2);
    for n in [1, 7, 64] {
        let values = net.evaluate(Array2::ones((n, 4)).view()).unwrap();
        assert_eq!(values.dim(), (n, 2));
    }
}

#[test]
fn test_evaluate_rejects_wrong_state_size() {
    let net = network(4, 2);
    let result = net.evaluate(Array2::zeros((3, 5)).view());
    assert!(matches!(result, Err(AqmError::DimensionMismatch { .. })));
}

#[test]
fn test_evaluate_does_not_change_parameters() {
    let net = network(3, 5);
    let before = net.clone();
    let _ = net.evaluate(Array2::ones((10, 3)).view()).unwrap();
    let _ = net.forward_trace(Array2::ones((10, 3)).view()).unwrap();
    assert_eq!(net, before);
}

#[test]
fn test_evaluate_one_matches_batch_row() {
    let net = network(3, 5);
    let states = array![[0.1, 0.2, 0.3], [0.9, 0.0, 0.5]];
    let batch = net.evaluate(states.view()).unwrap();
    let single = net.evaluate_one(states.row(1)).unwrap();
    assert_eq!(single, batch.row(1).to_owned());
}

#[test]
fn test_forward_trace_matches_evaluate() {
    let net = network(3, 5);
    let states = array![[0.4, 0.1, 0.0], [1.0, 1.0, 1.0]];
    let trace = net.forward_trace(states.view()).unwrap();
    assert_eq!(trace.output, net.evaluate(states.view()).unwrap());
}

#[test]
fn test_hand_built_forward() {
    let net = hand_built();
    // [1, 1] -> hidden [1.6, 1.2] -> 1.5 * 1.6 - 0.5 * 1.2 + 0.3 = 2.1
    let out = net.evaluate(array![[1.0, 1.0]].view()).unwrap();
    assert!((out[[0, 0]] - 2.1).abs() < 1e-5);
}

#[test]
fn test_backward_matches_finite_differences() {
    let net = hand_built();
    let states = array![[1.0, 1.0], [2.0, -1.0]];
    let output_grad = array![[1.0], [-0.5]];

    // Scalar objective: sum(output * output_grad)
    let objective = |n: &QNetwork| -> f32 {
        let out = n.evaluate(states.view()).unwrap();
        (&out * &output_grad).sum()
    };

    let trace = net.forward_trace(states.view()).unwrap();
    let grads = net.backward(&trace, output_grad.view()).unwrap();

    let h = 1e-2;
    for layer_idx in 0..net.layers.len() {
        let shape = net.layers[layer_idx].weights.dim();
        for i in 0..shape.0 {
            for j in 0..shape.1 {
                let mut plus = net.clone();
                plus.layers[layer_idx].weights[[i, j]] += h;
                let mut minus = net.clone();
                minus.layers[layer_idx].weights[[i, j]] -= h;
                let numeric = (objective(&plus) - objective(&minus)) / (2.0 * h);
                let analytic = grads.layers[layer_idx].weights[[i, j]];
                assert!(
                    (numeric - analytic).abs() < 1e-3,
                    "layer {} weight ({}, {}): numeric {} analytic {}",
                    layer_idx, i, j, numeric, analytic
                );
            }
        }
        for k in 0..net.layers[layer_idx].biases.len() {
            let mut plus = net.clone();
            plus.layers[layer_idx].biases[k] += h;
            let mut minus = net.clone();
            minus.layers[layer_idx].biases[k] -= h;
            let numeric = (objective(&plus) - objective(&minus)) / (2.0 * h);
            let analytic = grads.layers[layer_idx].biases[k];
            assert!((numeric - analytic).abs() < 1e-3);
        }
    }
}

#[test]
fn test_backward_rejects_wrong_gradient_shape() {
    let net = hand_built();
    let trace = net.forward_trace(array![[1.0, 1.0]].view()).unwrap();
    let result = net.backward(&trace, Array2::zeros((2, 1)).view());
    assert!(result.is_err());
}

#[test]
fn test_gradient_norms() {
    let net = hand_built();
    let trace = net.forward_trace(array![[1.0, 1.0]].view()).unwrap();
    let grads = net.backward(&trace, array![[1.0]].view()).unwrap();

    let manual: f32 = grads
        .layers
        .iter()
        .flat_map(|l| l.weights.iter().chain(l.biases.iter()))
        .map(|g| g * g)
        .sum::<f32>()
        .sqrt();
    assert!((grads.global_norm() - manual).abs() < 1e-5);
    // Hidden activations are [1.6, 1.2], so the largest gradient is 1.6
    assert!((grads.max_abs() - 1.6).abs() < 1e-5);
}

#[test]
fn test_copy_from_makes_networks_equal() {
    let mut rng = StdRng::seed_from_u64(10);
    let source = QNetwork::new(3, 5, &[8], WeightInit::default(), &mut rng).unwrap();
    let mut target = QNetwork::new(3, 5, &[8], WeightInit::default(), &mut rng).unwrap();
    assert_ne!(source, target);

    target.copy_from(&source).unwrap();
    assert_eq!(source, target);
}

#[test]
fn test_copy_from_rejects_other_architecture() {
    let mut rng = StdRng::seed_from_u64(10);
    let source = QNetwork::new(3, 5, &[8], WeightInit::default(), &mut rng).unwrap();
    let mut target = QNetwork::new(3, 5, &[16], WeightInit::default(), &mut rng).unwrap();
    let before = target.clone();

    assert!(target.copy_from(&source).is_err());
    assert_eq!(target, before);
}

#[test]
fn test_from_layers_rejects_mismatched_layers() {
    let mut rng = StdRng::seed_from_u64(0);
    let a = DenseLayer::new(2, 3, Activation::Relu, WeightInit::default(), &mut rng);
    let b = DenseLayer::new(4, 1, Activation::Linear, WeightInit::default(), &mut rng);
    assert!(QNetwork::from_layers(vec![a, b]).is_err());
    assert!(QNetwork::from_layers(Vec::new()).is_err());
}

#[test]
fn test_network_serde_round_trip() {
    let net = network(3, 5);
    let json = serde_json::to_string(&net).unwrap();
    let restored: QNetwork = serde_json::from_str(&json).unwrap();
    assert_eq!(net, restored);
    let state = Array1::from(vec![0.2, 0.4, 0.6]);
    assert_eq!(net.evaluate_one(state.view()).unwrap(), restored.evaluate_one(state.view()).unwrap());
}

#[test]
fn test_gradients_is_finite() {
    let net = hand_built();
    let trace = net.forward_trace(array![[1.0, 1.0]].view()).unwrap();
    let mut grads = net.backward(&trace, array![[1.0]].view()).unwrap();
    assert!(grads.is_finite());

    grads.layers[0].biases[1] = f32::INFINITY;
    assert!(!grads.is_finite());
    grads.layers[0].biases[1] = f32::NAN;
    assert!(!grads.is_finite());
}
