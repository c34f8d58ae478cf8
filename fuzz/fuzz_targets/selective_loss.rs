#![no_main]

use arbitrary::Arbitrary;
use entrenar_slm::slm::{Logits, Reduction, SelectiveLoss, IGNORE_INDEX};
use entrenar_slm::{backward, Error};
use libfuzzer_sys::fuzz_target;
use ndarray::{Array2, Array3};

/// Fuzz target for the selective loss
///
/// Any shape, label and proportion combination must either produce a finite
/// loss or a typed error, never a panic.

#[derive(Arbitrary, Debug)]
struct SelectiveLossInput {
    batch: u8,
    seq_len: u8,
    vocab: u8,
    proportion: f64,
    reduction: u8,
    student: Vec<u8>,
    teacher: Vec<u8>,
    labels: Vec<i8>,
}

fn bytes_to_logits(bytes: &[u8], n: usize) -> Vec<f32> {
    // Map 0..255 to -10.0..10.0, cycling when the input is short
    (0..n)
        .map(|i| bytes.get(i % bytes.len().max(1)).copied().unwrap_or(0))
        .map(|b| (b as f32) / 255.0 * 20.0 - 10.0)
        .collect()
}

fuzz_target!(|input: SelectiveLossInput| {
    let b = (input.batch as usize % 4) + 1;
    let l = input.seq_len as usize % 16;
    let v = input.vocab as usize % 8;
    let n = b * l * v;

    let student = Array3::from_shape_vec((b, l, v), bytes_to_logits(&input.student, n)).unwrap();
    let teacher = Array3::from_shape_vec((b, l, v), bytes_to_logits(&input.teacher, n)).unwrap();
    let labels: Vec<i64> = (0..b * l)
        .map(|i| match input.labels.get(i) {
            Some(&y) if y < -64 => IGNORE_INDEX,
            Some(&y) => y as i64,
            None => 0,
        })
        .collect();
    let labels = Array2::from_shape_vec((b, l), labels).unwrap();

    let reduction = match input.reduction % 3 {
        0 => Reduction::Mean,
        1 => Reduction::Sum,
        _ => Reduction::PerSequence,
    };
    let Ok(loss_fn) = SelectiveLoss::new(input.proportion) else {
        return;
    };
    let loss_fn = loss_fn.with_reduction(reduction);

    let student = Logits::new(student, true);
    let teacher = Logits::new(teacher, false);

    match loss_fn.forward(&student, &teacher, &labels) {
        Ok(mut loss) => {
            assert!(loss.data().iter().all(|x| x.is_finite()));
            backward(&mut loss, None);
        }
        Err(
            Error::DegenerateKeepCount { .. }
            | Error::LabelOutOfRange { .. }
            | Error::NoValidTargets { .. }
            | Error::InvalidParameter(_),
        ) => {}
        Err(e) => panic!("unexpected error: {e}"),
    }
});
