//! Transformer Encoder
//!
//! Each encoder layer is the classic two-sublayer block on `(seq, d_model)`
//! matrices:
//!
//! ```text
//! x ── self-attention ── dropout ──(+x)── norm ── ffn ── dropout ──(+)── norm ──▶
//! ```
//!
//! Backward walks the exact reverse: each LayerNorm's backward runs, each
//! residual junction adds the skip-path gradient back in, and each dropout
//! replays its forward mask.

use crate::layers::attention::{AttentionContext, MultiHeadAttention};
use crate::layers::dropout::{Dropout, DropoutContext};
use crate::layers::feed_forward::{FeedForwardContext, FeedForwardNetwork};
use crate::layers::layer_norm::{LayerNormContext, LayerNormalization};
use crate::matrix::Matrix;

#[derive(Clone, Debug)]
pub struct EncoderLayer {
    attention: MultiHeadAttention,
    norm1: LayerNormalization,
    ffn: FeedForwardNetwork,
    norm2: LayerNormalization,
    dropout: Dropout,
}

#[derive(Clone, Debug)]
pub struct EncoderLayerContext {
    attn_ctx: AttentionContext,
    drop1_ctx: DropoutContext,
    norm1_ctx: LayerNormContext,
    ffn_ctx: FeedForwardContext,
    drop2_ctx: DropoutContext,
    norm2_ctx: LayerNormContext,
}

impl EncoderLayer {
    pub fn new(d_model: usize, num_heads: usize, d_ff: usize, dropout_rate: f64, seed: u64) -> Self {
        Self {
            attention: MultiHeadAttention::new(d_model, num_heads, seed),
            norm1: LayerNormalization::new(d_model),
            ffn: FeedForwardNetwork::new(d_model, d_ff, seed.wrapping_add(10)),
            norm2: LayerNormalization::new(d_model),
            dropout: Dropout::new(dropout_rate),
        }
    }

    pub fn forward(&self, x: &Matrix, training: bool) -> (Matrix, EncoderLayerContext) {
        let (attn_out, attn_ctx) = self.attention.forward(x, x, x, None);
        let (attn_dropped, drop1_ctx) = self.dropout.forward(&attn_out, training);
        let (normed1, norm1_ctx) = self.norm1.forward(&x.add(&attn_dropped));

        let (ffn_out, ffn_ctx) = self.ffn.forward(&normed1);
        let (ffn_dropped, drop2_ctx) = self.dropout.forward(&ffn_out, training);
        let (out, norm2_ctx) = self.norm2.forward(&normed1.add(&ffn_dropped));

        (
            out,
            EncoderLayerContext {
                attn_ctx,
                drop1_ctx,
                norm1_ctx,
                ffn_ctx,
                drop2_ctx,
                norm2_ctx,
            },
        )
    }

    pub fn backward(&mut self, delta: &Matrix, ctx: &EncoderLayerContext, lr: f64) -> Matrix {
        let d_res2 = self.norm2.backward(delta, &ctx.norm2_ctx, lr);

        let d_ffn_out = self.dropout.backward(&d_res2, &ctx.drop2_ctx);
        // residual: the skip path carries d_res2 straight through
        let d_normed1 = self.ffn.backward(&d_ffn_out, &ctx.ffn_ctx, lr).add(&d_res2);

        let d_res1 = self.norm1.backward(&d_normed1, &ctx.norm1_ctx, lr);

        let d_attn_out = self.dropout.backward(&d_res1, &ctx.drop1_ctx);
        let attn_deltas = self.attention.backward(&d_attn_out, &ctx.attn_ctx, lr);
        attn_deltas.total().add(&d_res1)
    }
}

/// A stack of encoder layers applied in order.
#[derive(Clone, Debug)]
pub struct Encoder {
    layers: Vec<EncoderLayer>,
}

#[derive(Clone, Debug)]
pub struct EncoderContext {
    layer_ctxs: Vec<EncoderLayerContext>,
}

impl Encoder {
    pub fn new(
        num_layers: usize,
        d_model: usize,
        num_heads: usize,
        d_ff: usize,
        dropout_rate: f64,
        seed: u64,
    ) -> Self {
        assert!(num_layers > 0, "Encoder needs at least one layer");
        let layers = (0..num_layers)
            .map(|i| {
                EncoderLayer::new(
                    d_model,
                    num_heads,
                    d_ff,
                    dropout_rate,
                    seed.wrapping_add(i as u64 * 100),
                )
            })
            .collect();
        Self { layers }
    }

    pub fn forward(&self, x: &Matrix, training: bool) -> (Matrix, EncoderContext) {
        let mut out = x.clone();
        let mut layer_ctxs = Vec::with_capacity(self.layers.len());
        for layer in &self.layers {
            let (next, ctx) = layer.forward(&out, training);
            out = next;
            layer_ctxs.push(ctx);
        }
        (out, EncoderContext { layer_ctxs })
    }

    pub fn backward(&mut self, delta: &Matrix, ctx: &EncoderContext, lr: f64) -> Matrix {
        let mut delta = delta.clone();
        for (layer, layer_ctx) in self.layers.iter_mut().zip(&ctx.layer_ctxs).rev() {
            delta = layer.backward(&delta, layer_ctx, lr);
        }
        delta
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layer_preserves_shape() {
        let layer = EncoderLayer::new(8, 2, 16, 0.0, 1);
        let x = Matrix::random_seeded(5, 8, 2);
        let (out, _) = layer.forward(&x, true);
        assert_eq!((out.rows(), out.cols()), (5, 8));
    }

    #[test]
    fn test_stack_threads_through_all_layers() {
        let encoder = Encoder::new(3, 8, 2, 16, 0.0, 1);
        let x = Matrix::random_seeded(4, 8, 2);
        let (out, ctx) = encoder.forward(&x, true);
        assert_eq!((out.rows(), out.cols()), (4, 8));
        assert_eq!(ctx.layer_ctxs.len(), 3);
    }

    #[test]
    fn test_backward_returns_input_shaped_delta() {
        let mut encoder = Encoder::new(2, 8, 2, 16, 0.0, 7);
        let x = Matrix::random_seeded(4, 8, 8);
        let (out, ctx) = encoder.forward(&x, true);
        let delta = encoder.backward(&out.scale(2.0), &ctx, 0.001);
        assert_eq!((delta.rows(), delta.cols()), (4, 8));
        assert!(delta.data().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_backward_reduces_objective() {
        let mut encoder = Encoder::new(2, 4, 2, 8, 0.0, 3);
        let x = Matrix::random_seeded(3, 4, 4);

        let (out, ctx) = encoder.forward(&x, true);
        let before = out.square().sum();
        encoder.backward(&out.scale(2.0), &ctx, 0.005);

        let (out, _) = encoder.forward(&x, true);
        assert!(out.square().sum() < before);
    }
}
