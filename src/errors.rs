//! Contains the error types that may be encountered while parsing a JFIF header
//! or decoding its entropy-coded segment.
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};

/// Common decode errors.
///
/// All decode operations in this crate are non-recoverable: once one of these
/// is produced, the call that produced it is over and the decoder (for header
/// errors) is stuck in a terminal error state until reassigned to a fresh
/// buffer.
#[allow(clippy::module_name_repetitions)]
pub enum DecodeErrors {
    /// A read (byte, bit, or segment) ran past the end of the supplied buffer.
    PrematureEndOfBuffer,
    /// A marker was encountered that is valid JPEG but outside the baseline
    /// subset this crate supports, or was not the marker expected in the
    /// current header state.
    UnsupportedMarker(u16),
    /// An in-range marker's payload (precision, component count, sampling
    /// factor, spectral selection, successive approximation) falls outside
    /// the supported subset.
    UnsupportedParameter(String),
    /// Internal inconsistency in table sizes, symbol values or coefficient
    /// lengths that indicates the input is not well-formed baseline JPEG.
    CorruptedData(String),
    /// An unexpected marker was hit mid-ECS that was neither byte-stuffed
    /// nor the terminal bit of the scan.
    EcsReadError,
    /// Region-of-interest coordinates were out of bounds or degenerate.
    RoiError,
}

impl Debug for DecodeErrors {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(self, f)
    }
}

impl Display for DecodeErrors {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PrematureEndOfBuffer => {
                write!(f, "Premature end of buffer while reading JFIF data")
            }
            Self::UnsupportedMarker(marker) => {
                write!(f, "Unsupported or unrecognized marker: 0x{:04x}", marker)
            }
            Self::UnsupportedParameter(reason) => {
                write!(f, "Unsupported parameter. Reason: {}", reason)
            }
            Self::CorruptedData(reason) => {
                write!(f, "Corrupted data. Reason: {}", reason)
            }
            Self::EcsReadError => {
                write!(f, "Unexpected marker encountered while reading entropy-coded segment")
            }
            Self::RoiError => {
                write!(f, "Region of interest is invalid or out of bounds")
            }
        }
    }
}

impl Error for DecodeErrors {}
