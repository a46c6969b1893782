#![allow(clippy::needless_return, clippy::similar_names, clippy::inline_always)]
#![warn(clippy::correctness, clippy::perf, clippy::pedantic, clippy::inline_always)]
#[macro_use]
extern crate log;

pub use crate::bounding_box::BoundingBox;
pub use crate::errors::DecodeErrors;
pub use crate::image::Decoder;

pub mod bitstream;
pub mod block_writer;
pub mod bounding_box;
mod cursor;
pub mod dequantize;
pub mod errors;
mod headers;
pub mod huffman;
pub mod idct;
pub mod image;
