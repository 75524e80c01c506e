//! Core decoding pipeline for a lapped-transform video codec: range-coded
//! entropy decoding, integer transforms, biorthogonal lapped pre/post
//! filters, a block-size quad-tree, a hierarchical motion-vector grid,
//! intra prediction, PVQ de-quantization, and an optional dering
//! post-filter, orchestrated by a packet-driven frame engine.

pub mod array2d;
pub mod band;
pub mod block_size;
pub mod cdf;
pub mod consts;
pub mod dering;
pub mod engine;
pub mod entropy;
pub mod error;
pub mod filter;
pub mod frame;
pub mod intra;
pub mod mc;
pub mod mv;
pub mod pvq;
pub mod txfm;
pub mod util;
pub mod y4m;

pub use engine::{Engine, PictureInfo};
pub use error::{Error, Result};
