use super::*;

fn identity(weights: Vec<f32>, bias: f32) -> LinearModel {
    LinearModel {
        weights,
        bias,
        activation: Activation::Identity,
    }
}

#[test]
fn test_parse_defaults_to_tanh() {
    let model = LinearModel::from_json_str(r#"{ "weights": [1.0, 2.0] }"#).unwrap();
    assert_eq!(model.activation, Activation::Tanh);
    assert_eq!(model.bias, 0.0);
    assert_eq!(model.input_size(), 2);
}

#[test]
fn test_parse_rejects_empty_weights() {
    let err = LinearModel::from_json_str(r#"{ "weights": [] }"#).unwrap_err();
    assert!(matches!(err, EvaluatorError::Model(_)));
}

#[test]
fn test_parse_rejects_malformed_json() {
    let err = LinearModel::from_json_str("weights = [1.0]").unwrap_err();
    assert!(matches!(err, EvaluatorError::Model(_)));
}

#[test]
fn test_score_weighted_sum() {
    let model = identity(vec![2.0, -1.0], 0.5);
    assert_eq!(model.score(&[3.0, 4.0]), 2.5);
}

#[test]
fn test_score_pads_and_truncates() {
    let model = identity(vec![1.0, 1.0, 1.0], 0.0);
    assert_eq!(model.score(&[2.0]), 2.0);
    assert_eq!(model.score(&[1.0, 1.0, 1.0, 100.0]), 3.0);
}

#[test]
fn test_tanh_bounds_output() {
    let model = LinearModel {
        weights: vec![100.0],
        bias: 0.0,
        activation: Activation::Tanh,
    };
    let high = model.score(&[10.0]);
    let low = model.score(&[-10.0]);
    assert!(high <= 1.0 && high > 0.99);
    assert!(low >= -1.0 && low < -0.99);
    assert_eq!(model.score(&[0.0]), 0.0);
}

#[test]
fn test_score_batch_keeps_order() {
    let model = identity(vec![1.0], 0.0);
    let inputs = vec![vec![3.0], vec![1.0], vec![2.0]];
    assert_eq!(model.score_batch(&inputs), vec![3.0, 1.0, 2.0]);
}
