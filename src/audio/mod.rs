//! Audio sample formats and containers

mod convert;
pub mod wav;

pub use convert::{bytes_to_float, float_to_bytes, float_to_i16, i16_to_bytes};
pub use wav::{WAV_HEADER_SIZE, streaming_header};
