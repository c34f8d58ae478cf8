//! End-to-end tests for the selective loss through the public API.

use entrenar_slm::config::parse_config;
use entrenar_slm::slm::{Logits, LogitsShape, Reduction, SelectiveLoss, IGNORE_INDEX};
use entrenar_slm::{backward, slm_loss, Error, Tensor};
use ndarray::{array, Array2, Array3};

fn cross_entropy(row: &[f32], class: usize) -> f32 {
    let lse = row.iter().map(|x| x.exp()).sum::<f32>().ln();
    lse - row[class]
}

/// Two sequences of three tokens over a vocabulary of two.
fn batch() -> (Array3<f32>, Array3<f32>, Array2<i64>) {
    let student = array![
        [[2.0, 0.0], [0.0, 0.5], [1.0, 1.0]],
        [[0.0, 0.0], [3.0, 0.0], [0.0, 2.0]]
    ];
    let teacher = array![
        [[2.5, 0.0], [0.0, 4.0], [3.0, 1.0]],
        [[0.0, 1.0], [3.0, 0.0], [0.0, 2.1]]
    ];
    let labels = array![[0, 1, 0], [1, 0, 1]];
    (student, teacher, labels)
}

#[test]
fn test_training_step_shape() {
    // excess row 0: [0.5, 3.5, 2.0], row 1: [1.0, 0.0, 0.1]
    let (student, teacher, labels) = batch();
    let output = Tensor::from_vec(student.iter().copied().collect(), true);
    let student = Logits::from_tensor(output.clone(), LogitsShape::new(2, 3, 2)).unwrap();
    let teacher = Logits::new(teacher, false);

    let (mut loss, selection) = SelectiveLoss::new(0.5)
        .unwrap()
        .forward_with_selection(&student, &teacher, &labels)
        .unwrap();

    assert_eq!(selection.keep_count, 1);
    assert_eq!(
        selection.labels,
        array![[IGNORE_INDEX, 1, IGNORE_INDEX], [1, IGNORE_INDEX, IGNORE_INDEX]]
    );

    let expected = (cross_entropy(&[0.0, 0.5], 1) + cross_entropy(&[0.0, 0.0], 1)) / 2.0;
    assert!((loss.data()[0] - expected).abs() < 1e-5);

    backward(&mut loss, None);
    let grad = output.grad().expect("student output should receive gradient");
    let touched: Vec<usize> = (0..6)
        .filter(|i| grad[2 * i] != 0.0 || grad[2 * i + 1] != 0.0)
        .collect();
    assert_eq!(touched, vec![1, 3]);
}

#[test]
fn test_caller_labels_survive() {
    let (student, teacher, labels) = batch();
    let before = labels.clone();

    slm_loss(
        &Logits::new(student, true),
        &Logits::new(teacher, false),
        &labels,
        0.34,
    )
    .unwrap();

    assert_eq!(labels, before);
}

#[test]
fn test_per_sequence_output() {
    let (student, teacher, labels) = batch();
    let loss = SelectiveLoss::new(0.5)
        .unwrap()
        .with_reduction(Reduction::PerSequence)
        .forward(
            &Logits::new(student, true),
            &Logits::new(teacher, false),
            &labels,
        )
        .unwrap();

    assert_eq!(loss.len(), 2);
    assert!((loss.data()[0] - cross_entropy(&[0.0, 0.5], 1)).abs() < 1e-5);
    assert!((loss.data()[1] - cross_entropy(&[0.0, 0.0], 1)).abs() < 1e-5);
}

#[test]
fn test_loss_from_yaml_config() {
    let spec = parse_config("slm:\n  proportion_to_keep: 1.0\n  reduction: sum\n").unwrap();
    let loss_fn = SelectiveLoss::from_spec(&spec).unwrap();

    let (student, teacher, labels) = batch();
    let loss = loss_fn
        .forward(
            &Logits::new(student, false),
            &Logits::new(teacher, false),
            &labels,
        )
        .unwrap();

    let expected = cross_entropy(&[2.0, 0.0], 0)
        + cross_entropy(&[0.0, 0.5], 1)
        + cross_entropy(&[1.0, 1.0], 0)
        + cross_entropy(&[0.0, 0.0], 1)
        + cross_entropy(&[3.0, 0.0], 0)
        + cross_entropy(&[0.0, 2.0], 1);
    assert!((loss.data()[0] - expected).abs() < 1e-4);
}

#[test]
fn test_error_taxonomy() {
    let (student, teacher, labels) = batch();
    let student = Logits::new(student, true);
    let teacher = Logits::new(teacher, false);

    // k = floor(0.2 * 3) = 0
    assert!(matches!(
        slm_loss(&student, &teacher, &labels, 0.2),
        Err(Error::DegenerateKeepCount { seq_len: 3, .. })
    ));

    let bad_labels = array![[0, 1, 0], [1, 2, 1]];
    assert!(matches!(
        slm_loss(&student, &teacher, &bad_labels, 0.5),
        Err(Error::LabelOutOfRange {
            batch: 1,
            position: 1,
            label: 2,
            vocab: 2
        })
    ));

    let short_labels = array![[0, 1], [1, 0]];
    assert!(matches!(
        slm_loss(&student, &teacher, &short_labels, 0.5),
        Err(Error::ShapeMismatch { .. })
    ));

    let other_teacher = Logits::new(Array3::zeros((2, 3, 4)), false);
    assert!(matches!(
        slm_loss(&student, &other_teacher, &labels, 0.5),
        Err(Error::ShapeMismatch { .. })
    ));
}

#[test]
fn test_error_messages_name_the_inputs() {
    let student = Logits::new(Array3::zeros((1, 2, 3)), true);
    let teacher = Logits::new(Array3::zeros((1, 2, 3)), false);
    let labels = array![[0, 1]];

    let msg = slm_loss(&student, &teacher, &labels, 0.1)
        .unwrap_err()
        .to_string();
    assert!(msg.contains("0.1"));
    assert!(msg.contains('2'));
}
