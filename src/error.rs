//! The closed error taxonomy returned by every public entry point.
//!
//! Every kind below corresponds to one row of the error table in the
//! specification this crate implements. Errors are never recovered from
//! internally; they surface to the caller verbatim.

use thiserror::Error;

/// Result alias used throughout this crate.
pub type Result<T> = std::result::Result<T, CmpError>;

/// The closed error taxonomy of the compression codec.
///
/// Each variant carries a stable numeric code (see [`cmp_get_error_code`])
/// so that callers coming from a C-shaped API can branch on an integer,
/// matching the `cmp_get_error_code` accessor named in the external
/// interface.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CmpError {
    /// Unclassified invariant violation.
    #[error("generic compression error")]
    Generic,

    /// The output buffer cannot hold the next write.
    #[error("output buffer too small (need {needed} bytes, have {available})")]
    SmallBuf {
        /// Bytes the failing write needed.
        needed: usize,
        /// Bytes actually available in the destination buffer.
        available: usize,
    },

    /// Invalid configuration, unclassified.
    #[error("invalid compression parameter")]
    ParGeneric,

    /// A specific compression parameter (golomb_par, spill, ...) is out of its allowed range.
    #[error("invalid compression parameter: {0}")]
    ParSpecific(&'static str),

    /// Caller-supplied buffers are inconsistent with each other (e.g. model length mismatch).
    #[error("invalid compression parameter buffers")]
    ParBuffers,

    /// The `max_used_bits` registry does not have an entry for the requested field/version.
    #[error("invalid max_used_bits parameter")]
    ParMaxUsedBits,

    /// A required parameter pointer/buffer was not supplied.
    #[error("required compression parameter missing")]
    ParNull,

    /// The chunk buffer was empty where one was required.
    #[error("chunk buffer is null/empty")]
    ChunkNull,

    /// The chunk is larger than the codec can address.
    #[error("chunk too large ({0} bytes)")]
    ChunkTooLarge(usize),

    /// The chunk does not contain a single full collection.
    #[error("chunk too small to contain a collection")]
    ChunkTooSmall,

    /// The chunk's declared size does not match the sum of its collections.
    #[error("chunk size inconsistent with its collections")]
    ChunkSizeInconsistent,

    /// Two collections in the same chunk map to different chunk types.
    #[error("collections in chunk disagree on subservice/chunk type")]
    ChunkSubserviceInconsistent,

    /// The collection's subservice identifier does not map to a supported data type.
    #[error("collection subservice unsupported")]
    ColSubserviceUnsupported,

    /// The collection's payload length is inconsistent with its header or samples.
    #[error("collection size inconsistent")]
    ColSizeInconsistent,

    /// The entity buffer was empty where one was required.
    #[error("entity buffer is null/empty")]
    EntityNull,

    /// The entity buffer is smaller than its own header.
    #[error("entity too small for its header")]
    EntityTooSmall,

    /// The entity header failed structural validation.
    #[error("malformed entity header")]
    EntityHeader,

    /// `end_time` precedes `start_time`, or a timestamp field is otherwise invalid.
    #[error("invalid entity timestamp")]
    EntityTimestamp,

    /// The decoder reached an internal state that should be unreachable for well-formed input.
    #[error("internal decoder assertion failed")]
    IntDecoder,

    /// The entity declares a data type this codec build does not support.
    #[error("unsupported data type")]
    IntDataTypeUnsupported,

    /// A compressed collection claims a size larger than the entity can bound.
    #[error("compressed collection too large")]
    IntCmpColTooLarge,

    /// A sample exceeded its field's declared `max_used_bits`.
    #[error("sample value exceeds max_used_bits for its field")]
    DataValueTooLarge,
}

impl CmpError {
    /// The stable numeric code for this error kind, for callers that want
    /// a C-style return code rather than matching on the enum.
    #[must_use]
    pub const fn code(&self) -> i32 {
        match self {
            Self::Generic => -1,
            Self::SmallBuf { .. } => -2,
            Self::ParGeneric => -3,
            Self::ParSpecific(_) => -4,
            Self::ParBuffers => -5,
            Self::ParMaxUsedBits => -6,
            Self::ParNull => -7,
            Self::ChunkNull => -8,
            Self::ChunkTooLarge(_) => -9,
            Self::ChunkTooSmall => -10,
            Self::ChunkSizeInconsistent => -11,
            Self::ChunkSubserviceInconsistent => -12,
            Self::ColSubserviceUnsupported => -13,
            Self::ColSizeInconsistent => -14,
            Self::EntityNull => -15,
            Self::EntityTooSmall => -16,
            Self::EntityHeader => -17,
            Self::EntityTimestamp => -18,
            Self::IntDecoder => -19,
            Self::IntDataTypeUnsupported => -20,
            Self::IntCmpColTooLarge => -21,
            Self::DataValueTooLarge => -22,
        }
    }
}

/// Accessor named after the external interface's `cmp_get_error_code`.
#[must_use]
pub const fn cmp_get_error_code(error: &CmpError) -> i32 {
    error.code()
}
