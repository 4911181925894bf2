pub mod atlas;
pub mod decoder;
pub mod encoder;
pub mod format;
pub mod rgb565;
pub mod tga;

pub use decoder::{decode, decode_indexed, decode_true_color};
pub use encoder::{encode_indexed, encode_indexed_with, encode_true_color};
