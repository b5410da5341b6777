//! Trainable Dense Layer
//!
//! A dense layer computes `a = activation(W·x + b)` over a batch laid out
//! column-per-sample: the input is `(in_features, samples)`, weights are
//! `(out_features, in_features)`, and biases are a `(out_features, 1)` column
//! broadcast across the batch.
//!
//! ## Forward/Backward Contract
//!
//! The forward pass is pure and returns the values the backward pass needs
//! as an explicit [`LayerContext`] instead of stashing them in the layer:
//!
//! ```text
//! let (a, ctx) = layer.feed_forward(&x);
//! let delta_prev = layer.backward(&loss_grad, &ctx, lr);
//! ```
//!
//! `backward` computes the parameter gradients, lets the layer's optimizer
//! apply them, and returns the delta for the layer below. The returned delta
//! is computed from the weights *before* the update, so stacked layers see a
//! consistent gradient for the whole step.
//!
//! [`Layer::gradients`] exposes the same math without the parameter update,
//! which is what numerical gradient checks build on.

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::activation::Activation;
use crate::matrix::Matrix;
use crate::optimizer::{Optimizer, OptimizerKind};

/// A fully connected layer with its own optimizer state.
#[derive(Clone, Debug)]
pub struct Layer {
    weights: Matrix,
    biases: Matrix,
    activation: Activation,
    optimizer: Optimizer,
}

/// Values captured during the forward pass that backward needs.
#[derive(Clone, Debug)]
pub struct LayerContext {
    /// The input batch, `(in_features, samples)`.
    pub input: Matrix,
    /// Pre-activation `W·x + b`.
    pub z: Matrix,
}

/// Parameter gradients and the delta for the previous layer.
#[derive(Clone, Debug)]
pub struct LayerGradients {
    pub dw: Matrix,
    pub db: Matrix,
    /// `Wᵗ·dz`, the gradient with respect to this layer's input.
    pub input_delta: Matrix,
}

impl Layer {
    /// Number of input features this layer expects.
    pub fn input_size(&self) -> usize {
        self.weights.cols()
    }

    /// Number of output features this layer produces.
    pub fn output_size(&self) -> usize {
        self.weights.rows()
    }

    pub fn weights(&self) -> &Matrix {
        &self.weights
    }

    pub fn biases(&self) -> &Matrix {
        &self.biases
    }

    /// Run the layer forward over a `(in_features, samples)` batch.
    pub fn feed_forward(&self, input: &Matrix) -> (Matrix, LayerContext) {
        assert_eq!(
            input.rows(),
            self.input_size(),
            "Layer expects {} input features, got {}x{}",
            self.input_size(),
            input.rows(),
            input.cols()
        );
        let z = self.weights.dot(input).add_broadcast_col(&self.biases);
        let a = self.activation.apply(&z);
        (
            a,
            LayerContext {
                input: input.clone(),
                z,
            },
        )
    }

    /// Compute gradients for one backward step without touching parameters.
    ///
    /// `delta` is the loss gradient with respect to this layer's activated
    /// output, shaped `(out_features, samples)`.
    pub fn gradients(&self, delta: &Matrix, ctx: &LayerContext) -> LayerGradients {
        let dz = self.activation.backward(&ctx.z, delta);
        let dw = dz.dot(&ctx.input.transpose());
        let db = dz.sum_by_row();
        let input_delta = self.weights.transpose().dot(&dz);
        LayerGradients {
            dw,
            db,
            input_delta,
        }
    }

    /// One training step: compute gradients, update parameters through the
    /// optimizer, and return the delta for the previous layer.
    pub fn backward(&mut self, delta: &Matrix, ctx: &LayerContext, lr: f64) -> Matrix {
        let grads = self.gradients(delta, ctx);
        self.optimizer
            .update(&mut self.weights, &mut self.biases, &grads.dw, &grads.db, lr);
        grads.input_delta
    }
}

/// Builder for [`Layer`], validating the configuration at build time.
///
/// Weight init defaults to Xavier from a seedable RNG; biases default to
/// zero. Explicit matrices can be supplied for tests and experiments.
#[derive(Debug, Default)]
pub struct LayerBuilder {
    input_size: usize,
    output_size: usize,
    activation: Option<Activation>,
    optimizer: Option<OptimizerKind>,
    weights: Option<Matrix>,
    biases: Option<Matrix>,
    seed: Option<u64>,
}

impl LayerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_size(mut self, input_size: usize, output_size: usize) -> Self {
        self.input_size = input_size;
        self.output_size = output_size;
        self
    }

    pub fn with_activation(mut self, activation: Activation) -> Self {
        self.activation = Some(activation);
        self
    }

    pub fn with_optimizer(mut self, kind: OptimizerKind) -> Self {
        self.optimizer = Some(kind);
        self
    }

    /// Use explicit weights instead of random initialization.
    pub fn with_weights(mut self, weights: Matrix) -> Self {
        self.weights = Some(weights);
        self
    }

    /// Use explicit biases instead of zeros.
    pub fn with_biases(mut self, biases: Matrix) -> Self {
        self.biases = Some(biases);
        self
    }

    /// Seed for weight initialization; unseeded builds use thread-local
    /// entropy.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// # Panics
    ///
    /// Panics if either size is zero, the activation is missing, or explicit
    /// weights/biases have the wrong shape.
    pub fn build(self) -> Layer {
        assert!(
            self.input_size > 0 && self.output_size > 0,
            "Layer sizes must be positive, got {}x{}",
            self.output_size,
            self.input_size
        );
        let activation = self
            .activation
            .unwrap_or_else(|| panic!("Layer requires an activation"));

        let weights = match self.weights {
            Some(w) => {
                assert!(
                    w.rows() == self.output_size && w.cols() == self.input_size,
                    "Weights must be {}x{}, got {}x{}",
                    self.output_size,
                    self.input_size,
                    w.rows(),
                    w.cols()
                );
                w
            }
            None => {
                let mut rng = match self.seed {
                    Some(seed) => StdRng::seed_from_u64(seed),
                    None => StdRng::from_os_rng(),
                };
                Matrix::xavier(self.output_size, self.input_size, &mut rng)
            }
        };

        let biases = match self.biases {
            Some(b) => {
                assert!(
                    b.rows() == self.output_size && b.cols() == 1,
                    "Biases must be {}x1, got {}x{}",
                    self.output_size,
                    b.rows(),
                    b.cols()
                );
                b
            }
            None => Matrix::zeros(self.output_size, 1),
        };

        Layer {
            weights,
            biases,
            activation,
            optimizer: self.optimizer.unwrap_or(OptimizerKind::Sgd).build(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loss::Loss;

    fn sigmoid_layer() -> Layer {
        LayerBuilder::new()
            .with_size(1, 1)
            .with_activation(Activation::Sigmoid)
            .with_weights(Matrix::from_rows(&[&[0.8]]))
            .with_biases(Matrix::column(&[0.2]))
            .build()
    }

    #[test]
    fn test_feed_forward_known_values() {
        let layer = sigmoid_layer();
        let x = Matrix::column(&[0.5]);
        let (a, ctx) = layer.feed_forward(&x);
        // z = 0.8*0.5 + 0.2 = 0.6
        assert!((ctx.z.get(0, 0) - 0.6).abs() < 1e-12);
        assert!((a.get(0, 0) - 1.0 / (1.0 + (-0.6f64).exp())).abs() < 1e-12);
    }

    #[test]
    fn test_weight_gradient_matches_numerical() {
        let layer = sigmoid_layer();
        let x = Matrix::column(&[0.5]);
        let y = Matrix::column(&[1.0]);

        let (a, ctx) = layer.feed_forward(&x);
        let delta = Loss::Mse.derivative(&y, &a);
        let grads = layer.gradients(&delta, &ctx);

        let eps = 1e-6;
        let loss_with_weight = |w: f64| {
            let perturbed = LayerBuilder::new()
                .with_size(1, 1)
                .with_activation(Activation::Sigmoid)
                .with_weights(Matrix::from_rows(&[&[w]]))
                .with_biases(Matrix::column(&[0.2]))
                .build();
            let (a, _) = perturbed.feed_forward(&x);
            Loss::Mse.loss(&y, &a)
        };
        let numeric_dw = (loss_with_weight(0.8 + eps) - loss_with_weight(0.8 - eps)) / (2.0 * eps);
        let rel = (grads.dw.get(0, 0) - numeric_dw).abs() / numeric_dw.abs().max(1e-12);
        assert!(rel < 1e-5, "relative error {rel}");
    }

    #[test]
    fn test_bias_gradient_matches_numerical() {
        let layer = sigmoid_layer();
        let x = Matrix::column(&[0.5]);
        let y = Matrix::column(&[1.0]);

        let (a, ctx) = layer.feed_forward(&x);
        let delta = Loss::Mse.derivative(&y, &a);
        let grads = layer.gradients(&delta, &ctx);

        let eps = 1e-6;
        let loss_with_bias = |b: f64| {
            let perturbed = LayerBuilder::new()
                .with_size(1, 1)
                .with_activation(Activation::Sigmoid)
                .with_weights(Matrix::from_rows(&[&[0.8]]))
                .with_biases(Matrix::column(&[b]))
                .build();
            let (a, _) = perturbed.feed_forward(&x);
            Loss::Mse.loss(&y, &a)
        };
        let numeric_db = (loss_with_bias(0.2 + eps) - loss_with_bias(0.2 - eps)) / (2.0 * eps);
        let rel = (grads.db.get(0, 0) - numeric_db).abs() / numeric_db.abs().max(1e-12);
        assert!(rel < 1e-5, "relative error {rel}");
    }

    #[test]
    fn test_relu_layer_input_gradient_numerical() {
        let layer = LayerBuilder::new()
            .with_size(3, 2)
            .with_activation(Activation::Relu)
            .with_optimizer(OptimizerKind::Sgd)
            .with_seed(11)
            .build();
        let x = Matrix::column(&[0.4, -0.3, 0.9]);
        let y = Matrix::column(&[1.0, 0.0]);

        let (a, ctx) = layer.feed_forward(&x);
        let delta = Loss::Mse.derivative(&y, &a);
        let grads = layer.gradients(&delta, &ctx);

        let eps = 1e-6;
        for i in 0..3 {
            let mut plus = x.clone();
            plus.set(i, 0, plus.get(i, 0) + eps);
            let mut minus = x.clone();
            minus.set(i, 0, minus.get(i, 0) - eps);
            let (ap, _) = layer.feed_forward(&plus);
            let (am, _) = layer.feed_forward(&minus);
            let numeric = (Loss::Mse.loss(&y, &ap) - Loss::Mse.loss(&y, &am)) / (2.0 * eps);
            assert!(
                (grads.input_delta.get(i, 0) - numeric).abs() < 1e-6,
                "input delta {i}: analytic {} vs numeric {}",
                grads.input_delta.get(i, 0),
                numeric
            );
        }
    }

    #[test]
    fn test_backward_reduces_loss() {
        let mut layer = sigmoid_layer();
        let x = Matrix::column(&[0.5]);
        let y = Matrix::column(&[1.0]);

        let (a, ctx) = layer.feed_forward(&x);
        let before = Loss::Mse.loss(&y, &a);
        let delta = Loss::Mse.derivative(&y, &a);
        layer.backward(&delta, &ctx, 0.5);

        let (a, _) = layer.feed_forward(&x);
        assert!(Loss::Mse.loss(&y, &a) < before);
    }

    #[test]
    fn test_batch_bias_broadcast() {
        let layer = LayerBuilder::new()
            .with_size(2, 2)
            .with_activation(Activation::Identity)
            .with_weights(Matrix::from_rows(&[&[1.0, 0.0], &[0.0, 1.0]]))
            .with_biases(Matrix::column(&[10.0, 20.0]))
            .build();
        let batch = Matrix::from_rows(&[&[1.0, 2.0, 3.0], &[4.0, 5.0, 6.0]]);
        let (a, _) = layer.feed_forward(&batch);
        assert_eq!(a.data(), &[11.0, 12.0, 13.0, 24.0, 25.0, 26.0]);
    }

    #[test]
    fn test_backward_delta_uses_pre_update_weights() {
        let mut layer = sigmoid_layer();
        let x = Matrix::column(&[0.5]);
        let y = Matrix::column(&[1.0]);

        let (a, ctx) = layer.feed_forward(&x);
        let delta = Loss::Mse.derivative(&y, &a);

        let expected = layer.gradients(&delta, &ctx).input_delta;
        let returned = layer.backward(&delta, &ctx, 1.0);
        assert_eq!(returned, expected);
    }

    #[test]
    #[should_panic(expected = "Layer sizes must be positive")]
    fn test_builder_rejects_zero_size() {
        LayerBuilder::new()
            .with_size(0, 3)
            .with_activation(Activation::Relu)
            .build();
    }

    #[test]
    #[should_panic(expected = "Layer requires an activation")]
    fn test_builder_rejects_missing_activation() {
        LayerBuilder::new().with_size(2, 2).build();
    }
}
