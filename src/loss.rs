//! Loss Functions
//!
//! Each variant supplies the scalar loss and its derivative with respect to
//! the prediction. The derivative is what seeds backpropagation; its shape
//! always matches the prediction.
//!
//! Cross-entropy here is the fused softmax+cross-entropy form: its derivative
//! is the clean `actual − expected`, which is only correct when the values
//! fed in are already softmax probabilities. Pair it with a softmax output;
//! feeding it raw logits silently trains the wrong thing.

use crate::matrix::Matrix;

/// The training objective.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Loss {
    /// Mean squared error over all elements.
    Mse,
    /// Categorical cross-entropy, fused with a softmax output.
    CrossEntropy,
    /// Binary cross-entropy with probability clipping.
    BinaryCrossEntropy,
}

/// Probabilities are clipped into `[CLIP, 1 - CLIP]` before any log, so a
/// saturated sigmoid cannot produce `ln(0)`.
const CLIP: f64 = 1e-12;

impl Loss {
    /// Scalar loss between a target and a prediction of the same shape.
    pub fn loss(&self, expected: &Matrix, actual: &Matrix) -> f64 {
        assert!(
            expected.rows() == actual.rows() && expected.cols() == actual.cols(),
            "Loss shape mismatch: expected {}x{}, actual {}x{}",
            expected.rows(),
            expected.cols(),
            actual.rows(),
            actual.cols()
        );
        let n = (expected.rows() * expected.cols()) as f64;
        match self {
            Loss::Mse => actual.sub(expected).square().sum() / n,
            // unnormalized, matching the `actual − expected` derivative
            Loss::CrossEntropy => {
                let mut total = 0.0;
                for (e, a) in expected.data().iter().zip(actual.data()) {
                    if *e != 0.0 {
                        total -= e * a.max(CLIP).ln();
                    }
                }
                total
            }
            Loss::BinaryCrossEntropy => {
                let mut total = 0.0;
                for (e, a) in expected.data().iter().zip(actual.data()) {
                    let p = a.clamp(CLIP, 1.0 - CLIP);
                    total -= e * p.ln() + (1.0 - e) * (1.0 - p).ln();
                }
                total / n
            }
        }
    }

    /// Derivative of the loss with respect to the prediction.
    ///
    /// Same shape as `actual`; this matrix seeds the backward pass.
    pub fn derivative(&self, expected: &Matrix, actual: &Matrix) -> Matrix {
        assert!(
            expected.rows() == actual.rows() && expected.cols() == actual.cols(),
            "Loss shape mismatch: expected {}x{}, actual {}x{}",
            expected.rows(),
            expected.cols(),
            actual.rows(),
            actual.cols()
        );
        let n = (expected.rows() * expected.cols()) as f64;
        match self {
            Loss::Mse => actual.sub(expected).scale(2.0 / n),
            // gradient through the fused softmax: probabilities minus target
            Loss::CrossEntropy => actual.sub(expected),
            Loss::BinaryCrossEntropy => {
                let mut out = Matrix::zeros(expected.rows(), expected.cols());
                for i in 0..expected.rows() {
                    for j in 0..expected.cols() {
                        let e = expected.get(i, j);
                        let p = actual.get(i, j).clamp(CLIP, 1.0 - CLIP);
                        out.set(i, j, (-e / p + (1.0 - e) / (1.0 - p)) / n);
                    }
                }
                out
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mse_known_value() {
        let expected = Matrix::column(&[1.0, 0.0]);
        let actual = Matrix::column(&[0.5, 0.5]);
        // ((0.5)^2 + (0.5)^2) / 2 = 0.25
        assert!((Loss::Mse.loss(&expected, &actual) - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_mse_derivative_numerical() {
        let expected = Matrix::column(&[1.0, -0.5, 0.3]);
        let actual = Matrix::column(&[0.2, 0.4, -0.1]);
        let grad = Loss::Mse.derivative(&expected, &actual);

        let eps = 1e-6;
        for i in 0..3 {
            let mut plus = actual.clone();
            plus.set(i, 0, plus.get(i, 0) + eps);
            let mut minus = actual.clone();
            minus.set(i, 0, minus.get(i, 0) - eps);
            let numeric =
                (Loss::Mse.loss(&expected, &plus) - Loss::Mse.loss(&expected, &minus)) / (2.0 * eps);
            assert!((grad.get(i, 0) - numeric).abs() < 1e-6);
        }
    }

    #[test]
    fn test_cross_entropy_perfect_prediction_is_near_zero() {
        let expected = Matrix::column(&[0.0, 1.0, 0.0]);
        let actual = Matrix::column(&[1e-9, 1.0 - 2e-9, 1e-9]);
        assert!(Loss::CrossEntropy.loss(&expected, &actual) < 1e-6);
    }

    #[test]
    fn test_cross_entropy_sums_over_batch_columns() {
        // one-hot targets in two columns: loss is the plain sum of the
        // per-sample terms, unnormalized like its derivative
        let expected = Matrix::from_rows(&[&[1.0, 0.0], &[0.0, 1.0]]);
        let actual = Matrix::from_rows(&[&[0.5, 0.75], &[0.5, 0.25]]);
        let loss = Loss::CrossEntropy.loss(&expected, &actual);
        let by_hand = -(0.5f64.ln()) - (0.25f64.ln());
        assert!((loss - by_hand).abs() < 1e-12);
    }

    #[test]
    fn test_cross_entropy_derivative_is_difference() {
        let expected = Matrix::column(&[0.0, 1.0, 0.0]);
        let actual = Matrix::column(&[0.2, 0.5, 0.3]);
        let grad = Loss::CrossEntropy.derivative(&expected, &actual);
        assert_eq!(grad.data(), &[0.2, -0.5, 0.3]);
    }

    #[test]
    fn test_bce_clipping_keeps_loss_finite() {
        let expected = Matrix::column(&[1.0, 0.0]);
        let actual = Matrix::column(&[0.0, 1.0]); // worst case without clipping
        let loss = Loss::BinaryCrossEntropy.loss(&expected, &actual);
        assert!(loss.is_finite());
        assert!(loss > 10.0); // severely wrong, but bounded
    }

    #[test]
    fn test_bce_derivative_numerical() {
        let expected = Matrix::column(&[1.0, 0.0, 1.0]);
        let actual = Matrix::column(&[0.7, 0.2, 0.4]);
        let grad = Loss::BinaryCrossEntropy.derivative(&expected, &actual);

        let eps = 1e-6;
        for i in 0..3 {
            let mut plus = actual.clone();
            plus.set(i, 0, plus.get(i, 0) + eps);
            let mut minus = actual.clone();
            minus.set(i, 0, minus.get(i, 0) - eps);
            let numeric = (Loss::BinaryCrossEntropy.loss(&expected, &plus)
                - Loss::BinaryCrossEntropy.loss(&expected, &minus))
                / (2.0 * eps);
            assert!((grad.get(i, 0) - numeric).abs() < 1e-5);
        }
    }

    #[test]
    #[should_panic(expected = "Loss shape mismatch")]
    fn test_loss_shape_mismatch_panics() {
        Loss::Mse.loss(&Matrix::zeros(2, 1), &Matrix::zeros(3, 1));
    }
}
