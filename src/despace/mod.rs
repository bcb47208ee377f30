mod core;
mod error;
mod simd;


pub use self::core::{
    Kernel, PAR_CHUNK, PAR_THRESHOLD, despace, despace_in_place, despace_in_place_with,
    despace_to_vec, despace_to_vec_with, despace_with, despace_write,
};
pub use self::error::DespaceError;
pub use self::simd::{CHUNK, WHITESPACE, compress_store, is_despace_byte, keep_mask};
