use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DespaceError {
    /// The destination cannot hold a full copy of the source. Checked before
    /// any byte is read or written.
    #[error("destination holds {capacity} bytes but source is {needed} bytes")]
    DestinationTooSmall { needed: usize, capacity: usize },

    #[error("unknown kernel '{0}' (expected auto, scalar, portable, memchr, avx2 or avx512)")]
    UnknownKernel(String),
}
