//! Inverted Dropout
//!
//! During training, each element is zeroed with probability `rate` and the
//! survivors are scaled by `1/(1-rate)`, so the expected activation is
//! unchanged and nothing special happens at evaluation time. The mask drawn
//! on the forward pass is stored in the context and reused exactly in
//! backward.

use crate::matrix::Matrix;

/// Inverted dropout with a fixed drop probability.
#[derive(Clone, Copy, Debug)]
pub struct Dropout {
    rate: f64,
}

/// The mask drawn during forward, `None` when dropout was inactive.
#[derive(Clone, Debug)]
pub struct DropoutContext {
    mask: Option<Matrix>,
}

impl Dropout {
    /// # Panics
    ///
    /// Panics unless `0.0 <= rate < 1.0`.
    pub fn new(rate: f64) -> Self {
        assert!(
            (0.0..1.0).contains(&rate),
            "Dropout rate must be in [0, 1), got {rate}"
        );
        Self { rate }
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// Apply dropout. With `training == false` or a zero rate this is a
    /// passthrough and the context carries no mask.
    pub fn forward(&self, x: &Matrix, training: bool) -> (Matrix, DropoutContext) {
        if !training || self.rate == 0.0 {
            return (x.clone(), DropoutContext { mask: None });
        }
        let keep_scale = 1.0 / (1.0 - self.rate);
        let mask = Matrix::zeros(x.rows(), x.cols()).map(|_| {
            if rand::random::<f64>() < self.rate {
                0.0
            } else {
                keep_scale
            }
        });
        (x.hadamard(&mask), DropoutContext { mask: Some(mask) })
    }

    /// Route the delta through the same mask the forward pass used.
    pub fn backward(&self, delta: &Matrix, ctx: &DropoutContext) -> Matrix {
        match &ctx.mask {
            Some(mask) => delta.hadamard(mask),
            None => delta.clone(),
        }
    }
}
