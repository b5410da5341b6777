//! Transformer Decoder
//!
//! Each decoder layer has three sublayers: causally masked self-attention,
//! cross-attention against the encoder output, and the feed-forward network,
//! each followed by dropout, a residual add and a LayerNorm.
//!
//! Backward returns two deltas per layer: one for the decoder input below,
//! and one for the encoder output the cross-attention read from. The encoder
//! delta is the sum of the cross-attention key and value gradients; the
//! query gradient belongs to the decoder path. [`Decoder::backward`]
//! accumulates the encoder deltas across all layers, since every layer reads
//! the same encoder output.

use crate::layers::attention::{causal_mask, AttentionContext, MultiHeadAttention};
use crate::layers::dropout::{Dropout, DropoutContext};
use crate::layers::feed_forward::{FeedForwardContext, FeedForwardNetwork};
use crate::layers::layer_norm::{LayerNormContext, LayerNormalization};
use crate::matrix::Matrix;

#[derive(Clone, Debug)]
pub struct DecoderLayer {
    self_attention: MultiHeadAttention,
    norm1: LayerNormalization,
    cross_attention: MultiHeadAttention,
    norm2: LayerNormalization,
    ffn: FeedForwardNetwork,
    norm3: LayerNormalization,
    dropout: Dropout,
}

#[derive(Clone, Debug)]
pub struct DecoderLayerContext {
    self_attn_ctx: AttentionContext,
    drop1_ctx: DropoutContext,
    norm1_ctx: LayerNormContext,
    cross_attn_ctx: AttentionContext,
    drop2_ctx: DropoutContext,
    norm2_ctx: LayerNormContext,
    ffn_ctx: FeedForwardContext,
    drop3_ctx: DropoutContext,
    norm3_ctx: LayerNormContext,
}

impl DecoderLayer {
    pub fn new(d_model: usize, num_heads: usize, d_ff: usize, dropout_rate: f64, seed: u64) -> Self {
        Self {
            self_attention: MultiHeadAttention::new(d_model, num_heads, seed),
            norm1: LayerNormalization::new(d_model),
            cross_attention: MultiHeadAttention::new(d_model, num_heads, seed.wrapping_add(10)),
            norm2: LayerNormalization::new(d_model),
            ffn: FeedForwardNetwork::new(d_model, d_ff, seed.wrapping_add(20)),
            norm3: LayerNormalization::new(d_model),
            dropout: Dropout::new(dropout_rate),
        }
    }

    pub fn forward(
        &self,
        x: &Matrix,
        encoder_output: &Matrix,
        training: bool,
    ) -> (Matrix, DecoderLayerContext) {
        let mask = causal_mask(x.rows());
        let (sa_out, self_attn_ctx) = self.self_attention.forward(x, x, x, Some(&mask));
        let (sa_dropped, drop1_ctx) = self.dropout.forward(&sa_out, training);
        let (normed1, norm1_ctx) = self.norm1.forward(&x.add(&sa_dropped));

        let (ca_out, cross_attn_ctx) =
            self.cross_attention
                .forward(&normed1, encoder_output, encoder_output, None);
        let (ca_dropped, drop2_ctx) = self.dropout.forward(&ca_out, training);
        let (normed2, norm2_ctx) = self.norm2.forward(&normed1.add(&ca_dropped));

        let (ffn_out, ffn_ctx) = self.ffn.forward(&normed2);
        let (ffn_dropped, drop3_ctx) = self.dropout.forward(&ffn_out, training);
        let (out, norm3_ctx) = self.norm3.forward(&normed2.add(&ffn_dropped));

        (
            out,
            DecoderLayerContext {
                self_attn_ctx,
                drop1_ctx,
                norm1_ctx,
                cross_attn_ctx,
                drop2_ctx,
                norm2_ctx,
                ffn_ctx,
                drop3_ctx,
                norm3_ctx,
            },
        )
    }

    /// Returns `(decoder_delta, encoder_delta)`.
    pub fn backward(
        &mut self,
        delta: &Matrix,
        ctx: &DecoderLayerContext,
        lr: f64,
    ) -> (Matrix, Matrix) {
        let d_res3 = self.norm3.backward(delta, &ctx.norm3_ctx, lr);
        let d_ffn_out = self.dropout.backward(&d_res3, &ctx.drop3_ctx);
        let d_normed2 = self.ffn.backward(&d_ffn_out, &ctx.ffn_ctx, lr).add(&d_res3);

        let d_res2 = self.norm2.backward(&d_normed2, &ctx.norm2_ctx, lr);
        let d_ca_out = self.dropout.backward(&d_res2, &ctx.drop2_ctx);
        let ca_deltas = self
            .cross_attention
            .backward(&d_ca_out, &ctx.cross_attn_ctx, lr);
        // keys and values came from the encoder; the query path stays here
        let encoder_delta = ca_deltas.key.add(&ca_deltas.value);
        let d_normed1 = ca_deltas.query.add(&d_res2);

        let d_res1 = self.norm1.backward(&d_normed1, &ctx.norm1_ctx, lr);
        let d_sa_out = self.dropout.backward(&d_res1, &ctx.drop1_ctx);
        let sa_deltas = self
            .self_attention
            .backward(&d_sa_out, &ctx.self_attn_ctx, lr);
        let decoder_delta = sa_deltas.total().add(&d_res1);

        (decoder_delta, encoder_delta)
    }
}

/// A stack of decoder layers sharing one encoder output.
#[derive(Clone, Debug)]
pub struct Decoder {
    layers: Vec<DecoderLayer>,
}

#[derive(Clone, Debug)]
pub struct DecoderContext {
    layer_ctxs: Vec<DecoderLayerContext>,
}

impl Decoder {
    pub fn new(
        num_layers: usize,
        d_model: usize,
        num_heads: usize,
        d_ff: usize,
        dropout_rate: f64,
        seed: u64,
    ) -> Self {
        assert!(num_layers > 0, "Decoder needs at least one layer");
        let layers = (0..num_layers)
            .map(|i| {
                DecoderLayer::new(
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

    pub fn forward(
        &self,
        x: &Matrix,
        encoder_output: &Matrix,
        training: bool,
    ) -> (Matrix, DecoderContext) {
        let mut out = x.clone();
        let mut layer_ctxs = Vec::with_capacity(self.layers.len());
        for layer in &self.layers {
            let (next, ctx) = layer.forward(&out, encoder_output, training);
            out = next;
            layer_ctxs.push(ctx);
        }
        (out, DecoderContext { layer_ctxs })
    }

    /// Returns `(decoder_input_delta, accumulated_encoder_delta)`.
    pub fn backward(&mut self, delta: &Matrix, ctx: &DecoderContext, lr: f64) -> (Matrix, Matrix) {
        let mut delta = delta.clone();
        let mut encoder_delta: Option<Matrix> = None;
        for (layer, layer_ctx) in self.layers.iter_mut().zip(&ctx.layer_ctxs).rev() {
            let (d, enc_d) = layer.backward(&delta, layer_ctx, lr);
            delta = d;
            encoder_delta = Some(match encoder_delta {
                Some(acc) => acc.add(&enc_d),
                None => enc_d,
            });
        }
        // layers is non-empty, checked at construction
        let encoder_delta = encoder_delta.unwrap_or_else(|| {
            panic!("Decoder backward on an empty stack")
        });
        (delta, encoder_delta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layer_shapes() {
        let layer = DecoderLayer::new(8, 2, 16, 0.0, 1);
        let x = Matrix::random_seeded(4, 8, 2);
        let memory = Matrix::random_seeded(6, 8, 3);
        let (out, _) = layer.forward(&x, &memory, true);
        assert_eq!((out.rows(), out.cols()), (4, 8));
    }

    #[test]
    fn test_backward_delta_shapes() {
        let mut layer = DecoderLayer::new(8, 2, 16, 0.0, 1);
        let x = Matrix::random_seeded(4, 8, 2);
        let memory = Matrix::random_seeded(6, 8, 3);
        let (out, ctx) = layer.forward(&x, &memory, true);
        let (dec_delta, enc_delta) = layer.backward(&out.scale(2.0), &ctx, 0.001);
        assert_eq!((dec_delta.rows(), dec_delta.cols()), (4, 8));
        assert_eq!((enc_delta.rows(), enc_delta.cols()), (6, 8));
    }

    #[test]
    fn test_stack_accumulates_encoder_delta() {
        let mut decoder = Decoder::new(3, 4, 2, 8, 0.0, 5);
        let x = Matrix::random_seeded(3, 4, 6);
        let memory = Matrix::random_seeded(5, 4, 7);

        let (out, ctx) = decoder.forward(&x, &memory, true);
        let (dec_delta, enc_delta) = decoder.backward(&out.scale(2.0), &ctx, 0.001);
        assert_eq!((dec_delta.rows(), dec_delta.cols()), (3, 4));
        assert_eq!((enc_delta.rows(), enc_delta.cols()), (5, 4));
        assert!(enc_delta.data().iter().any(|&v| v != 0.0));
    }
}
