use sift_core::ParamsError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScaleSpaceError {
    #[error("invalid scale-space parameters: {0}")]
    InvalidParams(#[from] ParamsError),
    #[error("image data length mismatch: expected {expected_len}, got {actual_len}")]
    InvalidImageData { expected_len: usize, actual_len: usize },
    #[error("image dimensions {width}x{height} overflow the addressable size")]
    DimensionOverflow { width: usize, height: usize },
    #[error("could not allocate {bytes} bytes for the scale space")]
    AllocationFailed { bytes: usize },
}

pub type ScaleResult<T> = Result<T, ScaleSpaceError>;
