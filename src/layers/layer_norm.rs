//! Layer Normalization
//!
//! Normalizes each row of a `(seq, d_model)` matrix to zero mean and unit
//! variance, then applies a learned per-feature affine transform
//! `out = x_norm ⊙ γ + β`.
//!
//! The input gradient is the closed three-term form
//!
//! ```text
//! dx = (dx_norm − mean(dx_norm) − x_norm ⊙ mean(dx_norm ⊙ x_norm)) · inv_std
//! ```
//!
//! with the means taken per row. The two subtracted terms are the gradient
//! flowing back through the row mean and the row variance. γ and β are
//! trained with a plain gradient-descent step in `backward`.

use crate::matrix::Matrix;

const EPSILON: f64 = 1e-5;

/// Per-row layer normalization with learned scale and shift.
#[derive(Clone, Debug)]
pub struct LayerNormalization {
    /// `(1, d_model)` scale, initialized to ones.
    gamma: Matrix,
    /// `(1, d_model)` shift, initialized to zeros.
    beta: Matrix,
}

/// Forward-pass values the backward pass needs.
#[derive(Clone, Debug)]
pub struct LayerNormContext {
    /// The normalized input before the affine transform, `(seq, d_model)`.
    pub x_norm: Matrix,
    /// Per-row `1/√(var + ε)`, `(seq, 1)`.
    pub inv_std: Matrix,
}

/// Parameter gradients and the input delta.
#[derive(Clone, Debug)]
pub struct LayerNormGradients {
    pub d_gamma: Matrix,
    pub d_beta: Matrix,
    pub input_delta: Matrix,
}

impl LayerNormalization {
    pub fn new(d_model: usize) -> Self {
        assert!(d_model > 0, "LayerNorm width must be positive");
        Self {
            gamma: Matrix::ones(1, d_model),
            beta: Matrix::zeros(1, d_model),
        }
    }

    pub fn d_model(&self) -> usize {
        self.gamma.cols()
    }

    /// Normalize each row and apply the affine transform.
    pub fn forward(&self, x: &Matrix) -> (Matrix, LayerNormContext) {
        assert_eq!(
            x.cols(),
            self.d_model(),
            "LayerNorm expects {} features, got {}x{}",
            self.d_model(),
            x.rows(),
            x.cols()
        );
        let d = x.cols() as f64;
        let mut x_norm = Matrix::zeros(x.rows(), x.cols());
        let mut inv_std = Matrix::zeros(x.rows(), 1);
        let mut out = Matrix::zeros(x.rows(), x.cols());

        for i in 0..x.rows() {
            let mut mean = 0.0;
            for j in 0..x.cols() {
                mean += x.get(i, j);
            }
            mean /= d;

            let mut var = 0.0;
            for j in 0..x.cols() {
                let diff = x.get(i, j) - mean;
                var += diff * diff;
            }
            var /= d;

            let istd = 1.0 / (var + EPSILON).sqrt();
            inv_std.set(i, 0, istd);

            for j in 0..x.cols() {
                let n = (x.get(i, j) - mean) * istd;
                x_norm.set(i, j, n);
                out.set(i, j, n * self.gamma.get(0, j) + self.beta.get(0, j));
            }
        }

        (out, LayerNormContext { x_norm, inv_std })
    }

    /// Compute gradients without updating γ/β.
    pub fn gradients(&self, delta: &Matrix, ctx: &LayerNormContext) -> LayerNormGradients {
        let rows = ctx.x_norm.rows();
        let cols = ctx.x_norm.cols();
        assert!(
            delta.rows() == rows && delta.cols() == cols,
            "LayerNorm backward shape mismatch: {}x{} vs {}x{}",
            delta.rows(),
            delta.cols(),
            rows,
            cols
        );
        let d = cols as f64;

        let mut d_gamma = Matrix::zeros(1, cols);
        let mut d_beta = Matrix::zeros(1, cols);
        for i in 0..rows {
            for j in 0..cols {
                let g = delta.get(i, j);
                d_gamma.set(0, j, d_gamma.get(0, j) + g * ctx.x_norm.get(i, j));
                d_beta.set(0, j, d_beta.get(0, j) + g);
            }
        }

        let mut input_delta = Matrix::zeros(rows, cols);
        for i in 0..rows {
            // gradient through the affine transform
            let mut mean_dn = 0.0;
            let mut mean_dn_xn = 0.0;
            for j in 0..cols {
                let dn = delta.get(i, j) * self.gamma.get(0, j);
                mean_dn += dn;
                mean_dn_xn += dn * ctx.x_norm.get(i, j);
            }
            mean_dn /= d;
            mean_dn_xn /= d;

            let istd = ctx.inv_std.get(i, 0);
            for j in 0..cols {
                let dn = delta.get(i, j) * self.gamma.get(0, j);
                let dx = (dn - mean_dn - ctx.x_norm.get(i, j) * mean_dn_xn) * istd;
                input_delta.set(i, j, dx);
            }
        }

        LayerNormGradients {
            d_gamma,
            d_beta,
            input_delta,
        }
    }

    /// Gradient step on γ/β, returning the delta for the layer below.
    pub fn backward(&mut self, delta: &Matrix, ctx: &LayerNormContext, lr: f64) -> Matrix {
        let grads = self.gradients(delta, ctx);
        self.gamma.sub_in_place(&grads.d_gamma.scale(lr));
        self.beta.sub_in_place(&grads.d_beta.scale(lr));
        grads.input_delta
    }
}
