use thiserror::Error;

/// Crate-wide error type.
///
/// The variants mirror the failure taxonomy callers need to distinguish:
/// a stream that is malformed, a stream that is well-formed but uses a
/// feature this crate deliberately does not implement, a depth/layout we
/// cannot represent, and plain I/O trouble.
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("invalid image: {0}")]
    InvalidImage(&'static str),

    #[error("invalid image: {0}")]
    InvalidImageDetail(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unsupported bit depth: {0}")]
    UnsupportedDepth(u16),

    #[error("unsupported format: {0}")]
    UnsupportedFormat(&'static str),

    #[error("not implemented: {0}")]
    NotImplemented(&'static str),
}

pub type Result<T> = std::result::Result<T, CodecError>;

impl CodecError {
    /// True when the error marks a feature the crate refuses rather than
    /// a byte stream it could not parse.
    pub fn is_unsupported(&self) -> bool {
        matches!(
            self,
            CodecError::UnsupportedDepth(_)
                | CodecError::UnsupportedFormat(_)
                | CodecError::NotImplemented(_)
        )
    }
}
