//! Position-wise Feed-Forward Network
//!
//! Two dense layers applied independently at every sequence position:
//! `d_model → d_ff` with ReLU, then `d_ff → d_model` with no activation.
//! Inputs and outputs are `(seq, d_model)`; since a [`Layer`] batches samples
//! as columns, the whole sequence goes through both layers as one transposed
//! batch.

use crate::activation::Activation;
use crate::layer::{Layer, LayerBuilder, LayerContext};
use crate::matrix::Matrix;
use crate::optimizer::OptimizerKind;

#[derive(Clone, Debug)]
pub struct FeedForwardNetwork {
    hidden: Layer,
    output: Layer,
}

#[derive(Clone, Debug)]
pub struct FeedForwardContext {
    hidden_ctx: LayerContext,
    output_ctx: LayerContext,
}

impl FeedForwardNetwork {
    pub fn new(d_model: usize, d_ff: usize, seed: u64) -> Self {
        Self {
            hidden: LayerBuilder::new()
                .with_size(d_model, d_ff)
                .with_activation(Activation::Relu)
                .with_optimizer(OptimizerKind::Adam)
                .with_seed(seed)
                .build(),
            output: LayerBuilder::new()
                .with_size(d_ff, d_model)
                .with_activation(Activation::Identity)
                .with_optimizer(OptimizerKind::Adam)
                .with_seed(seed.wrapping_add(1))
                .build(),
        }
    }

    pub fn d_model(&self) -> usize {
        self.hidden.input_size()
    }

    /// Apply both layers to a `(seq, d_model)` input.
    pub fn forward(&self, x: &Matrix) -> (Matrix, FeedForwardContext) {
        let (h, hidden_ctx) = self.hidden.feed_forward(&x.transpose());
        let (out, output_ctx) = self.output.feed_forward(&h);
        (
            out.transpose(),
            FeedForwardContext {
                hidden_ctx,
                output_ctx,
            },
        )
    }

    /// Input gradient without parameter updates.
    pub fn gradients(&self, delta: &Matrix, ctx: &FeedForwardContext) -> Matrix {
        let d_hidden = self
            .output
            .gradients(&delta.transpose(), &ctx.output_ctx)
            .input_delta;
        self.hidden
            .gradients(&d_hidden, &ctx.hidden_ctx)
            .input_delta
            .transpose()
    }

    /// One training step through both layers, returning the input delta.
    pub fn backward(&mut self, delta: &Matrix, ctx: &FeedForwardContext, lr: f64) -> Matrix {
        let d_hidden = self.output.backward(&delta.transpose(), &ctx.output_ctx, lr);
        self.hidden
            .backward(&d_hidden, &ctx.hidden_ctx, lr)
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_shape() {
        let ffn = FeedForwardNetwork::new(8, 32, 3);
        let x = Matrix::random_seeded(5, 8, 4);
        let (out, _) = ffn.forward(&x);
        assert_eq!((out.rows(), out.cols()), (5, 8));
    }

    #[test]
    fn test_input_gradient_matches_numerical() {
        let ffn = FeedForwardNetwork::new(4, 6, 31);
        let x = Matrix::random_seeded(3, 4, 32);

        let objective = |input: &Matrix| {
            let (out, _) = ffn.forward(input);
            out.square().sum()
        };

        let (out, ctx) = ffn.forward(&x);
        let delta = out.scale(2.0);
        let analytic = ffn.gradients(&delta, &ctx);

        let eps = 1e-6;
        for i in 0..x.rows() {
            for j in 0..x.cols() {
                let mut plus = x.clone();
                plus.set(i, j, plus.get(i, j) + eps);
                let mut minus = x.clone();
                minus.set(i, j, minus.get(i, j) - eps);
                let numeric = (objective(&plus) - objective(&minus)) / (2.0 * eps);
                let a = analytic.get(i, j);
                let rel = (a - numeric).abs() / numeric.abs().max(1e-6);
                assert!(rel < 1e-5, "({i},{j}): analytic {a}, numeric {numeric}");
            }
        }
    }

    #[test]
    fn test_backward_reduces_objective() {
        let mut ffn = FeedForwardNetwork::new(4, 8, 5);
        let x = Matrix::random_seeded(3, 4, 6);

        let (out, ctx) = ffn.forward(&x);
        let before = out.square().sum();
        ffn.backward(&out.scale(2.0), &ctx, 0.01);

        let (out, _) = ffn.forward(&x);
        assert!(out.square().sum() < before);
    }
}
