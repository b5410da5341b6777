//! Token Embedding with Positional Encoding
//!
//! Turns a fixed-length token sequence into a `(seq, d_model)` matrix: each
//! token is looked up through a trainable embedding (a dense layer fed
//! one-hot columns), and a fixed sinusoidal positional signal is added so
//! downstream attention can tell positions apart.
//!
//! The sinusoid follows the standard form: for position `pos` and feature
//! pair `2i`/`2i+1`,
//!
//! ```text
//! pe[pos][2i]   = sin(pos / 10000^(2i/d_model))
//! pe[pos][2i+1] = cos(pos / 10000^(2i/d_model))
//! ```
//!
//! Only the embedding is trainable; backward feeds the embedding layer and
//! stops (token ids have no gradient).

use crate::activation::Activation;
use crate::layer::{Layer, LayerBuilder, LayerContext};
use crate::matrix::Matrix;
use crate::optimizer::OptimizerKind;

#[derive(Clone, Debug)]
pub struct PositionalEncoding {
    embedding: Layer,
    /// Precomputed sinusoid, `(word_length, d_model)`.
    sinusoid: Matrix,
    vocab_size: usize,
}

#[derive(Clone, Debug)]
pub struct PositionalContext {
    embed_ctx: LayerContext,
}

impl PositionalEncoding {
    pub fn new(vocab_size: usize, d_model: usize, word_length: usize, seed: u64) -> Self {
        assert!(vocab_size > 0 && d_model > 0 && word_length > 0);
        let mut sinusoid = Matrix::zeros(word_length, d_model);
        for pos in 0..word_length {
            for j in 0..d_model {
                let exponent = (2 * (j / 2)) as f64 / d_model as f64;
                let angle = pos as f64 / 10_000f64.powf(exponent);
                let value = if j % 2 == 0 { angle.sin() } else { angle.cos() };
                sinusoid.set(pos, j, value);
            }
        }
        Self {
            embedding: LayerBuilder::new()
                .with_size(vocab_size, d_model)
                .with_activation(Activation::Identity)
                .with_optimizer(OptimizerKind::Adam)
                .with_seed(seed)
                .build(),
            sinusoid,
            vocab_size,
        }
    }

    pub fn word_length(&self) -> usize {
        self.sinusoid.rows()
    }

    pub fn d_model(&self) -> usize {
        self.sinusoid.cols()
    }

    /// Embed a token sequence of exactly `word_length` ids.
    ///
    /// # Panics
    ///
    /// Panics on a wrong sequence length or an out-of-vocabulary id.
    pub fn forward(&self, tokens: &[usize]) -> (Matrix, PositionalContext) {
        assert_eq!(
            tokens.len(),
            self.word_length(),
            "Expected a sequence of {} tokens, got {}",
            self.word_length(),
            tokens.len()
        );
        // one-hot columns, one per position
        let mut one_hot = Matrix::zeros(self.vocab_size, tokens.len());
        for (pos, &token) in tokens.iter().enumerate() {
            assert!(
                token < self.vocab_size,
                "Token {token} out of vocabulary (size {})",
                self.vocab_size
            );
            one_hot.set(token, pos, 1.0);
        }
        let (embedded, embed_ctx) = self.embedding.feed_forward(&one_hot);
        let out = embedded.transpose().add(&self.sinusoid);
        (out, PositionalContext { embed_ctx })
    }

    /// Train the embedding from a `(seq, d_model)` delta. The positional
    /// sinusoid is fixed and absorbs no gradient.
    pub fn backward(&mut self, delta: &Matrix, ctx: &PositionalContext, lr: f64) {
        self.embedding.backward(&delta.transpose(), &ctx.embed_ctx, lr);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_shape_and_sinusoid_offset() {
        let pe = PositionalEncoding::new(10, 8, 4, 1);
        let (out, _) = pe.forward(&[1, 2, 3, 4]);
        assert_eq!((out.rows(), out.cols()), (4, 8));
        // position 0: sin terms are 0, cos terms are 1
        assert_eq!(pe.sinusoid.get(0, 0), 0.0);
        assert_eq!(pe.sinusoid.get(0, 1), 1.0);
    }

    #[test]
    fn test_same_token_differs_by_position() {
        let pe = PositionalEncoding::new(10, 8, 3, 1);
        let (out, _) = pe.forward(&[5, 5, 5]);
        // identical embeddings separated only by the positional signal
        let mut any_diff = false;
        for j in 0..8 {
            if (out.get(0, j) - out.get(1, j)).abs() > 1e-9 {
                any_diff = true;
            }
        }
        assert!(any_diff);
    }

    #[test]
    fn test_backward_moves_embedding() {
        let mut pe = PositionalEncoding::new(6, 4, 2, 3);
        let tokens = [1, 4];
        let (before, ctx) = pe.forward(&tokens);
        pe.backward(&Matrix::ones(2, 4), &ctx, 0.1);
        let (after, _) = pe.forward(&tokens);
        assert_ne!(before, after);
    }

    #[test]
    #[should_panic(expected = "out of vocabulary")]
    fn test_rejects_out_of_vocab_token() {
        let pe = PositionalEncoding::new(4, 4, 2, 1);
        pe.forward(&[0, 9]);
    }

    #[test]
    #[should_panic(expected = "Expected a sequence of 3 tokens")]
    fn test_rejects_wrong_length() {
        let pe = PositionalEncoding::new(4, 4, 3, 1);
        pe.forward(&[0, 1]);
    }
}
