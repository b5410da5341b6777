//! Transformer Model
//!
//! Ties the pieces together: two trainable embeddings with positional
//! encoding (one per side), an encoder stack, and a decoder stack that
//! cross-attends to the encoder output.
//!
//! ## Training Step
//!
//! One call to [`TransformerModel::train`] runs a single forward pass,
//! computes the loss and its gradient, optionally clips the gradient, and
//! threads it back through the decoder, the encoder (fed the accumulated
//! cross-attention deltas), and both embeddings. Every parameter in the
//! model takes exactly one optimizer step per call.

use serde::{Deserialize, Serialize};

use crate::gradients::clip_l2_norm;
use crate::layers::decoder::{Decoder, DecoderContext};
use crate::layers::encoder::{Encoder, EncoderContext};
use crate::layers::positional::{PositionalContext, PositionalEncoding};
use crate::loss::Loss;
use crate::matrix::Matrix;

/// Model hyperparameters.
///
/// Serializable so a training run can record its exact configuration, for
/// example through `TrainingLogger::with_config`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransformerConfig {
    /// Embedding and residual stream width.
    pub d_model: usize,
    /// Attention heads per layer; must divide `d_model`.
    pub num_heads: usize,
    /// Feed-forward hidden width.
    pub d_ff: usize,
    /// Encoder and decoder depth.
    pub num_layers: usize,
    /// Token vocabulary size.
    pub vocab_size: usize,
    /// Fixed sequence length for both sides.
    pub word_length: usize,
    /// Dropout probability, `[0, 1)`.
    pub dropout_rate: f64,
    /// Maximum L2 norm for the loss gradient; `None` disables clipping.
    pub grad_clip: Option<f64>,
    /// Seed for all weight initialization.
    pub seed: u64,
}

impl Default for TransformerConfig {
    fn default() -> Self {
        Self {
            d_model: 64,
            num_heads: 4,
            d_ff: 128,
            num_layers: 2,
            vocab_size: 256,
            word_length: 16,
            dropout_rate: 0.1,
            grad_clip: Some(1.0),
            seed: 42,
        }
    }
}

impl TransformerConfig {
    /// A deliberately small configuration for tests and quick experiments.
    pub fn tiny() -> Self {
        Self {
            d_model: 16,
            num_heads: 2,
            d_ff: 32,
            num_layers: 2,
            vocab_size: 32,
            word_length: 8,
            dropout_rate: 0.1,
            grad_clip: Some(1.0),
            seed: 42,
        }
    }

    /// # Panics
    ///
    /// Panics on an inconsistent configuration.
    pub fn validate(&self) {
        assert!(
            self.d_model > 0
                && self.num_heads > 0
                && self.d_ff > 0
                && self.num_layers > 0
                && self.vocab_size > 0
                && self.word_length > 0,
            "All model dimensions must be positive: {self:?}"
        );
        assert_eq!(
            self.d_model % self.num_heads,
            0,
            "d_model ({}) must be divisible by num_heads ({})",
            self.d_model,
            self.num_heads
        );
        assert!(
            (0.0..1.0).contains(&self.dropout_rate),
            "Dropout rate must be in [0, 1), got {}",
            self.dropout_rate
        );
        if let Some(clip) = self.grad_clip {
            assert!(clip > 0.0, "grad_clip must be positive, got {clip}");
        }
    }
}

/// Sequence-to-sequence transformer with manually derived gradients.
#[derive(Clone, Debug)]
pub struct TransformerModel {
    config: TransformerConfig,
    encoder_embedding: PositionalEncoding,
    decoder_embedding: PositionalEncoding,
    encoder: Encoder,
    decoder: Decoder,
    loss: Loss,
}

/// Contexts from one forward pass, consumed by the backward pass.
#[derive(Clone, Debug)]
pub struct ModelContext {
    enc_embed_ctx: PositionalContext,
    enc_ctx: EncoderContext,
    dec_embed_ctx: PositionalContext,
    dec_ctx: DecoderContext,
}

impl TransformerModel {
    pub fn new(config: TransformerConfig) -> Self {
        config.validate();
        let seed = config.seed;
        Self {
            encoder_embedding: PositionalEncoding::new(
                config.vocab_size,
                config.d_model,
                config.word_length,
                seed,
            ),
            decoder_embedding: PositionalEncoding::new(
                config.vocab_size,
                config.d_model,
                config.word_length,
                seed.wrapping_add(1),
            ),
            encoder: Encoder::new(
                config.num_layers,
                config.d_model,
                config.num_heads,
                config.d_ff,
                config.dropout_rate,
                seed.wrapping_add(1_000),
            ),
            decoder: Decoder::new(
                config.num_layers,
                config.d_model,
                config.num_heads,
                config.d_ff,
                config.dropout_rate,
                seed.wrapping_add(2_000),
            ),
            loss: Loss::Mse,
            config,
        }
    }

    /// Replace the training objective (MSE by default).
    pub fn with_loss(mut self, loss: Loss) -> Self {
        self.loss = loss;
        self
    }

    pub fn config(&self) -> &TransformerConfig {
        &self.config
    }

    /// Run the full model. Both sequences must be exactly `word_length`
    /// tokens; the output is `(word_length, d_model)`.
    pub fn forward(
        &self,
        input_seq: &[usize],
        output_seq: &[usize],
        training: bool,
    ) -> (Matrix, ModelContext) {
        let (enc_in, enc_embed_ctx) = self.encoder_embedding.forward(input_seq);
        let (enc_out, enc_ctx) = self.encoder.forward(&enc_in, training);

        let (dec_in, dec_embed_ctx) = self.decoder_embedding.forward(output_seq);
        let (dec_out, dec_ctx) = self.decoder.forward(&dec_in, &enc_out, training);

        (
            dec_out,
            ModelContext {
                enc_embed_ctx,
                enc_ctx,
                dec_embed_ctx,
                dec_ctx,
            },
        )
    }

    /// Inference-mode forward pass (dropout inactive).
    pub fn predict(&self, input_seq: &[usize], output_seq: &[usize]) -> Matrix {
        self.forward(input_seq, output_seq, false).0
    }

    /// One full training step; returns the loss before the update.
    pub fn train(
        &mut self,
        input_seq: &[usize],
        output_seq: &[usize],
        target: &Matrix,
        lr: f64,
    ) -> f64 {
        let (output, ctx) = self.forward(input_seq, output_seq, true);
        let loss = self.loss.loss(target, &output);

        let mut grad = self.loss.derivative(target, &output);
        if let Some(clip) = self.config.grad_clip {
            clip_l2_norm(&mut grad, clip);
        }

        let (dec_input_delta, encoder_delta) = self.decoder.backward(&grad, &ctx.dec_ctx, lr);
        self.decoder_embedding
            .backward(&dec_input_delta, &ctx.dec_embed_ctx, lr);

        let enc_input_delta = self.encoder.backward(&encoder_delta, &ctx.enc_ctx, lr);
        self.encoder_embedding
            .backward(&enc_input_delta, &ctx.enc_embed_ctx, lr);

        loss
    }
}
