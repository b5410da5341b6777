//! Multi-Head Scaled Dot-Product Attention
//!
//! Attention works on `(seq, d_model)` matrices: each row is one position.
//! Four internal projection layers (query, key, value, output) are plain
//! [`Layer`]s with identity activation; since a `Layer` batches samples as
//! columns, the projections transpose at the boundary in both directions.
//!
//! ## Forward
//!
//! ```text
//! Q, K, V  = projections of the three inputs           (seq, d_model)
//! per head: scores  = Q_h · K_hᵗ / √d_k  (+ mask)      (seq_q, seq_k)
//!           weights = softmax_rows(scores)
//!           out_h   = weights · V_h                    (seq_q, d_k)
//! output   = O-projection of the concatenated heads
//! ```
//!
//! An optional additive mask carries `-inf` in positions that must not be
//! attended to; the stable softmax turns those into exactly zero weight.
//!
//! ## Backward
//!
//! The softmax backward is the true per-row Jacobian-vector product
//! `w ⊙ (g − (w·g))`. The three input deltas are returned separately as an
//! [`AttentionDeltas`]: self-attention feeds one matrix to all three inputs
//! and sums all three deltas, while cross-attention routes the query delta
//! down its own stack and the key and value deltas toward the other one.

use crate::activation::Activation;
use crate::layer::{Layer, LayerBuilder, LayerContext};
use crate::matrix::Matrix;
use crate::optimizer::OptimizerKind;

/// Multi-head attention with learned Q/K/V/O projections.
#[derive(Clone, Debug)]
pub struct MultiHeadAttention {
    num_heads: usize,
    d_k: usize,
    query_proj: Layer,
    key_proj: Layer,
    value_proj: Layer,
    output_proj: Layer,
}

/// Everything the backward pass needs from one forward call.
#[derive(Clone, Debug)]
pub struct AttentionContext {
    /// Projected queries/keys/values, `(seq, d_model)`.
    pub q: Matrix,
    pub k: Matrix,
    pub v: Matrix,
    q_ctx: LayerContext,
    k_ctx: LayerContext,
    v_ctx: LayerContext,
    o_ctx: LayerContext,
    /// Post-softmax attention weights, one `(seq_q, seq_k)` matrix per head.
    pub weights: Vec<Matrix>,
}

/// Input gradients, one per attention input.
///
/// Callers sum the members that share an origin.
#[derive(Clone, Debug)]
pub struct AttentionDeltas {
    pub query: Matrix,
    pub key: Matrix,
    pub value: Matrix,
}

impl AttentionDeltas {
    /// Sum of all three deltas, for self-attention where every input is the
    /// same matrix.
    pub fn total(&self) -> Matrix {
        self.query.add(&self.key).add(&self.value)
    }
}

/// Additive causal mask: zero on and below the diagonal, `-inf` above, so
/// position `i` can only attend to positions `<= i`.
pub fn causal_mask(seq_len: usize) -> Matrix {
    let mut mask = Matrix::zeros(seq_len, seq_len);
    for i in 0..seq_len {
        for j in (i + 1)..seq_len {
            mask.set(i, j, f64::NEG_INFINITY);
        }
    }
    mask
}

impl MultiHeadAttention {
    /// # Panics
    ///
    /// Panics unless `num_heads` divides `d_model` evenly.
    pub fn new(d_model: usize, num_heads: usize, seed: u64) -> Self {
        assert!(num_heads > 0, "Attention needs at least one head");
        assert_eq!(
            d_model % num_heads,
            0,
            "d_model ({d_model}) must be divisible by num_heads ({num_heads})"
        );
        let proj = |seed_offset: u64| {
            LayerBuilder::new()
                .with_size(d_model, d_model)
                .with_activation(Activation::Identity)
                .with_optimizer(OptimizerKind::Adam)
                .with_seed(seed.wrapping_add(seed_offset))
                .build()
        };
        Self {
            num_heads,
            d_k: d_model / num_heads,
            query_proj: proj(0),
            key_proj: proj(1),
            value_proj: proj(2),
            output_proj: proj(3),
        }
    }

    pub fn d_model(&self) -> usize {
        self.num_heads * self.d_k
    }

    pub fn num_heads(&self) -> usize {
        self.num_heads
    }

    /// Run attention over `(seq, d_model)` inputs. For self-attention pass
    /// the same matrix three times; the mask, when present, must be shaped
    /// `(seq_q, seq_k)`.
    pub fn forward(
        &self,
        query_input: &Matrix,
        key_input: &Matrix,
        value_input: &Matrix,
        mask: Option<&Matrix>,
    ) -> (Matrix, AttentionContext) {
        assert_eq!(
            key_input.rows(),
            value_input.rows(),
            "Keys and values must agree on sequence length: {} vs {}",
            key_input.rows(),
            value_input.rows()
        );

        // project; layers batch samples as columns, so transpose both ways
        let (q_t, q_ctx) = self.query_proj.feed_forward(&query_input.transpose());
        let (k_t, k_ctx) = self.key_proj.feed_forward(&key_input.transpose());
        let (v_t, v_ctx) = self.value_proj.feed_forward(&value_input.transpose());
        let q = q_t.transpose();
        let k = k_t.transpose();
        let v = v_t.transpose();

        if let Some(m) = mask {
            assert!(
                m.rows() == q.rows() && m.cols() == k.rows(),
                "Mask must be {}x{}, got {}x{}",
                q.rows(),
                k.rows(),
                m.rows(),
                m.cols()
            );
        }

        let scale = 1.0 / (self.d_k as f64).sqrt();
        let mut weights = Vec::with_capacity(self.num_heads);
        let mut attn_out = Matrix::zeros(q.rows(), self.d_model());

        for h in 0..self.num_heads {
            let q_h = slice_cols(&q, h * self.d_k, self.d_k);
            let k_h = slice_cols(&k, h * self.d_k, self.d_k);
            let v_h = slice_cols(&v, h * self.d_k, self.d_k);

            let mut scores = q_h.dot(&k_h.transpose()).scale(scale);
            if let Some(m) = mask {
                scores.add_in_place(m);
            }
            let w = scores.softmax_rows();
            let out_h = w.dot(&v_h);
            write_cols(&mut attn_out, h * self.d_k, &out_h);
            weights.push(w);
        }

        let (out_t, o_ctx) = self.output_proj.feed_forward(&attn_out.transpose());
        (
            out_t.transpose(),
            AttentionContext {
                q,
                k,
                v,
                q_ctx,
                k_ctx,
                v_ctx,
                o_ctx,
                weights,
            },
        )
    }

    /// Gradients for the three inputs without touching parameters.
    pub fn gradients(&self, delta: &Matrix, ctx: &AttentionContext) -> AttentionDeltas {
        let d_attn_out = self
            .output_proj
            .gradients(&delta.transpose(), &ctx.o_ctx)
            .input_delta
            .transpose();
        let (dq, dk, dv) = self.heads_backward(&d_attn_out, ctx);
        AttentionDeltas {
            query: self
                .query_proj
                .gradients(&dq.transpose(), &ctx.q_ctx)
                .input_delta
                .transpose(),
            key: self
                .key_proj
                .gradients(&dk.transpose(), &ctx.k_ctx)
                .input_delta
                .transpose(),
            value: self
                .value_proj
                .gradients(&dv.transpose(), &ctx.v_ctx)
                .input_delta
                .transpose(),
        }
    }

    /// One training step: update all four projections and return the input
    /// deltas.
    pub fn backward(&mut self, delta: &Matrix, ctx: &AttentionContext, lr: f64) -> AttentionDeltas {
        let d_attn_out = self
            .output_proj
            .backward(&delta.transpose(), &ctx.o_ctx, lr)
            .transpose();
        let (dq, dk, dv) = self.heads_backward(&d_attn_out, ctx);
        AttentionDeltas {
            query: self
                .query_proj
                .backward(&dq.transpose(), &ctx.q_ctx, lr)
                .transpose(),
            key: self
                .key_proj
                .backward(&dk.transpose(), &ctx.k_ctx, lr)
                .transpose(),
            value: self
                .value_proj
                .backward(&dv.transpose(), &ctx.v_ctx, lr)
                .transpose(),
        }
    }

    /// Gradient through the per-head score/softmax/value chain. Takes the
    /// gradient of the concatenated head outputs, returns gradients of the
    /// projected Q, K and V.
    fn heads_backward(&self, d_attn_out: &Matrix, ctx: &AttentionContext) -> (Matrix, Matrix, Matrix) {
        let scale = 1.0 / (self.d_k as f64).sqrt();
        let mut dq = Matrix::zeros(ctx.q.rows(), self.d_model());
        let mut dk = Matrix::zeros(ctx.k.rows(), self.d_model());
        let mut dv = Matrix::zeros(ctx.v.rows(), self.d_model());

        for h in 0..self.num_heads {
            let q_h = slice_cols(&ctx.q, h * self.d_k, self.d_k);
            let k_h = slice_cols(&ctx.k, h * self.d_k, self.d_k);
            let v_h = slice_cols(&ctx.v, h * self.d_k, self.d_k);
            let w = &ctx.weights[h];
            let d_out_h = slice_cols(d_attn_out, h * self.d_k, self.d_k);

            let dv_h = w.transpose().dot(&d_out_h);
            let d_weights = d_out_h.dot(&v_h.transpose());

            // softmax rows: d_scores = w ⊙ (g − (w·g)) per row
            let mut d_scores = Matrix::zeros(w.rows(), w.cols());
            for i in 0..w.rows() {
                let mut row_dot = 0.0;
                for j in 0..w.cols() {
                    row_dot += w.get(i, j) * d_weights.get(i, j);
                }
                for j in 0..w.cols() {
                    d_scores.set(i, j, w.get(i, j) * (d_weights.get(i, j) - row_dot));
                }
            }
            d_scores.scale_in_place(scale);

            let dq_h = d_scores.dot(&k_h);
            let dk_h = d_scores.transpose().dot(&q_h);

            write_cols(&mut dq, h * self.d_k, &dq_h);
            write_cols(&mut dk, h * self.d_k, &dk_h);
            write_cols(&mut dv, h * self.d_k, &dv_h);
        }
        (dq, dk, dv)
    }
}

/// Copy `len` columns starting at `start` into a new matrix.
fn slice_cols(m: &Matrix, start: usize, len: usize) -> Matrix {
    let mut out = Matrix::zeros(m.rows(), len);
    for i in 0..m.rows() {
        for j in 0..len {
            out.set(i, j, m.get(i, start + j));
        }
    }
    out
}

/// Write `block` into `m` starting at column `start`.
fn write_cols(m: &mut Matrix, start: usize, block: &Matrix) {
    for i in 0..block.rows() {
        for j in 0..block.cols() {
            m.set(i, start + j, block.get(i, j));
        }
    }
}
