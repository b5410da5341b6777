//! Transformer building blocks.
//!
//! Everything here works on `(seq, d_model)` matrices with one row per
//! position, returns an explicit context from its forward pass, and takes
//! that context back in backward.

pub mod attention;
pub mod decoder;
pub mod dropout;
pub mod encoder;
pub mod feed_forward;
pub mod layer_norm;
pub mod positional;

pub use attention::{causal_mask, AttentionContext, AttentionDeltas, MultiHeadAttention};
pub use decoder::{Decoder, DecoderContext, DecoderLayer, DecoderLayerContext};
pub use dropout::{Dropout, DropoutContext};
pub use encoder::{Encoder, EncoderContext, EncoderLayer, EncoderLayerContext};
pub use feed_forward::{FeedForwardContext, FeedForwardNetwork};
pub use layer_norm::{LayerNormContext, LayerNormGradients, LayerNormalization};
pub use positional::{PositionalContext, PositionalEncoding};
