use sift_scale::ScaleSpaceError;
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SiftError {
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("malformed input: {0}")]
    Format(String),
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
    #[error("file name too long: {0}")]
    PathOverflow(String),
    #[error("could not allocate memory: {0}")]
    Alloc(String),
}

impl SiftError {
    pub(crate) fn io(context: impl Into<String>, source: io::Error) -> Self {
        SiftError::Io { context: context.into(), source }
    }
}

impl From<ScaleSpaceError> for SiftError {
    fn from(err: ScaleSpaceError) -> Self {
        match err {
            ScaleSpaceError::InvalidParams(e) => SiftError::Config(e.to_string()),
            ScaleSpaceError::InvalidImageData { .. } => SiftError::Format(err.to_string()),
            ScaleSpaceError::DimensionOverflow { .. } | ScaleSpaceError::AllocationFailed { .. } => {
                SiftError::Alloc(err.to_string())
            }
        }
    }
}

pub type SiftResult<T> = Result<T, SiftError>;
