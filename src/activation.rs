//! Activation Functions
//!
//! Activations are a closed set of variants rather than a trait object: the
//! backward pass needs to know that softmax is special (its derivative is a
//! Jacobian, not an elementwise factor), and an enum makes that dispatch
//! explicit instead of hiding it behind dynamic dispatch.
//!
//! ## The Softmax Caveat
//!
//! Identity, Sigmoid and ReLU have elementwise derivatives, so a layer can
//! multiply the incoming delta with `derivative(z)` directly. Softmax couples
//! every element of a column: its derivative is the full Jacobian
//! `diag(σ) − σσᵗ`. [`Activation::backward`] hides the difference: it
//! computes the correct delta-times-derivative product for every variant,
//! using the Jacobian-vector form `σ ⊙ (δ − (σ·δ))` per column for softmax,
//! which is the same product without materializing the K×K Jacobian.

use crate::matrix::Matrix;

/// The activation function applied after a layer's affine transform.
///
/// `Identity` is a first-class variant: a linear output layer says so
/// explicitly rather than carrying a null/None activation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Activation {
    /// Passthrough; derivative is all ones.
    Identity,
    /// `σ(x) = 1 / (1 + e^-x)`.
    Sigmoid,
    /// `max(0, x)`. The derivative at exactly 0 is taken to be 0.
    Relu,
    /// Column-wise `e^x / Σe^x` with max-subtraction for stability.
    Softmax,
}

impl Activation {
    /// Apply the activation elementwise (column-wise for softmax).
    pub fn apply(&self, z: &Matrix) -> Matrix {
        match self {
            Activation::Identity => z.clone(),
            Activation::Sigmoid => z.map(|x| 1.0 / (1.0 + (-x).exp())),
            Activation::Relu => z.map(|x| x.max(0.0)),
            Activation::Softmax => z.transpose().softmax_rows().transpose(),
        }
    }

    /// The derivative of the activation at `z`.
    ///
    /// For Identity/Sigmoid/ReLU this is an elementwise factor with the same
    /// shape as `z`. For Softmax it is the full Jacobian `diag(σ) − σσᵗ` and
    /// `z` must be a single column vector; callers that only need the
    /// Jacobian-vector product should use [`Activation::backward`] instead.
    pub fn derivative(&self, z: &Matrix) -> Matrix {
        match self {
            Activation::Identity => Matrix::ones(z.rows(), z.cols()),
            Activation::Sigmoid => {
                let s = self.apply(z);
                s.hadamard(&s.map(|x| 1.0 - x))
            }
            Activation::Relu => z.map(|x| if x > 0.0 { 1.0 } else { 0.0 }),
            Activation::Softmax => {
                assert_eq!(
                    z.cols(),
                    1,
                    "Softmax Jacobian is defined for column vectors, got {}x{}",
                    z.rows(),
                    z.cols()
                );
                let sigma = self.apply(z);
                let k = sigma.rows();
                let mut diag = Matrix::zeros(k, k);
                for i in 0..k {
                    diag.set(i, i, sigma.get(i, 0));
                }
                diag.sub(&sigma.dot(&sigma.transpose()))
            }
        }
    }

    /// Multiply an incoming delta by the activation derivative at `z`.
    ///
    /// This is the seam the layer backward pass uses. Elementwise variants
    /// reduce to `delta ⊙ derivative(z)`; softmax computes the true
    /// Jacobian-vector product per column.
    pub fn backward(&self, z: &Matrix, delta: &Matrix) -> Matrix {
        match self {
            Activation::Identity => delta.clone(),
            Activation::Sigmoid | Activation::Relu => delta.hadamard(&self.derivative(z)),
            Activation::Softmax => {
                assert!(
                    z.rows() == delta.rows() && z.cols() == delta.cols(),
                    "Softmax backward shape mismatch: {}x{} vs {}x{}",
                    z.rows(),
                    z.cols(),
                    delta.rows(),
                    delta.cols()
                );
                let sigma = self.apply(z);
                let mut out = Matrix::zeros(z.rows(), z.cols());
                for j in 0..z.cols() {
                    // per column: σ ⊙ (δ − (σ·δ))
                    let mut dot = 0.0;
                    for i in 0..z.rows() {
                        dot += sigma.get(i, j) * delta.get(i, j);
                    }
                    for i in 0..z.rows() {
                        out.set(i, j, sigma.get(i, j) * (delta.get(i, j) - dot));
                    }
                }
                out
            }
        }
    }
}
