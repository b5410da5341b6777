//! Malvolio: Neural Network Engine with Hand-Derived Gradients
//!
//! A from-scratch, CPU-only neural network and transformer training engine.
//! Every backward pass is derived and written by hand; there is no autograd
//! graph. Named after the humorless steward from *Twelfth Night*, who also
//! did everything the hard way.
//!
//! # Modules
//!
//! - [`matrix`] - Dense `f64` matrix algebra, the numeric foundation
//! - [`activation`] / [`loss`] / [`optimizer`] - The classic training trio
//! - [`layer`] - A trainable dense layer with explicit forward contexts
//! - [`layers`] - Transformer building blocks (attention, LayerNorm, ...)
//! - [`model`] - A full encoder/decoder transformer
//! - [`gradients`] - Gradient norm utilities
//! - [`training_logger`] - CSV metrics logging
//!
//! # Example
//!
//! ```rust
//! use malvolio::{Activation, LayerBuilder, Loss, Matrix, OptimizerKind};
//!
//! let mut layer = LayerBuilder::new()
//!     .with_size(2, 1)
//!     .with_activation(Activation::Sigmoid)
//!     .with_optimizer(OptimizerKind::Adam)
//!     .with_seed(42)
//!     .build();
//!
//! let x = Matrix::column(&[0.5, -0.3]);
//! let y = Matrix::column(&[1.0]);
//!
//! for _ in 0..100 {
//!     let (prediction, ctx) = layer.feed_forward(&x);
//!     let delta = Loss::Mse.derivative(&y, &prediction);
//!     layer.backward(&delta, &ctx, 0.1);
//! }
//! ```

pub mod activation;
pub mod gradients;
pub mod layer;
pub mod layers;
pub mod loss;
pub mod matrix;
pub mod model;
pub mod optimizer;
pub mod training_logger;

// Re-export main types for convenience
pub use activation::Activation;
pub use layer::{Layer, LayerBuilder, LayerContext, LayerGradients};
pub use layers::{
    causal_mask, AttentionDeltas, Decoder, Dropout, Encoder, FeedForwardNetwork,
    LayerNormalization, MultiHeadAttention, PositionalEncoding,
};
pub use loss::Loss;
pub use matrix::Matrix;
pub use model::{ModelContext, TransformerConfig, TransformerModel};
pub use optimizer::{Optimizer, OptimizerKind};
pub use training_logger::TrainingLogger;
