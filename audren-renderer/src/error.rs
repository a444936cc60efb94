//! Error types for audren-renderer
//!
//! `ResultCode` is the renderer's wire-visible result taxonomy; `Error` adds
//! the unrecoverable configuration failures and common-crate errors on top.

use thiserror::Error;

/// Renderer result codes
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultCode {
    /// Generic failure
    #[error("operation failed")]
    OperationFailed,

    /// Requested revision is outside the supported range
    #[error("unsupported revision")]
    UnsupportedRevision,

    /// Supplied work buffer is smaller than `get_work_buffer_size`
    #[error("work buffer too small")]
    WorkBufferTooSmall,

    /// Section size, revision or consumed-size mismatch in an update
    #[error("invalid update info")]
    InvalidUpdateInfo,

    /// Mix graph contains a cycle or a mix that never reaches the final mix
    #[error("invalid mix sorting")]
    InvalidMixSorting,

    /// Unsupported execution mode / device combination
    #[error("unsupported operation")]
    UnsupportedOperation,

    /// Operation not valid for the session's execution mode
    #[error("invalid execution context operation")]
    InvalidExecutionContextOperation,

    /// Guest address could not be mapped
    #[error("invalid address info")]
    InvalidAddressInfo,

    /// Output buffer cannot hold the reply
    #[error("insufficient output buffer")]
    InsufficientBuffer,
}

impl ResultCode {
    /// Numeric code reported in the error-info output section
    pub fn code(self) -> u32 {
        match self {
            ResultCode::OperationFailed => 2,
            ResultCode::UnsupportedRevision => 2 | (1 << 9),
            ResultCode::WorkBufferTooSmall => 2 | (4 << 9),
            ResultCode::InvalidUpdateInfo => 2 | (41 << 9),
            ResultCode::InvalidMixSorting => 2 | (43 << 9),
            ResultCode::UnsupportedOperation => 2 | (513 << 9),
            ResultCode::InvalidExecutionContextOperation => 2 | (514 << 9),
            ResultCode::InvalidAddressInfo => 2 | (42 << 9),
            ResultCode::InsufficientBuffer => 2 | (5 << 9),
        }
    }
}

/// Main error type for audren-renderer
#[derive(Error, Debug)]
pub enum Error {
    /// Recoverable renderer failure reported to the caller
    #[error("Renderer error: {0}")]
    Renderer(#[from] ResultCode),

    /// Unrecoverable configuration error
    ///
    /// Unknown effect/sink type tags and unimplemented estimator versions end
    /// up here; they mean revision negotiation is broken and the session must
    /// be torn down.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Errors from the common crate (config files, I/O)
    #[error(transparent)]
    Common(#[from] audren_common::Error),
}

impl Error {
    /// The renderer result code, if this is a recoverable renderer error
    pub fn result_code(&self) -> Option<ResultCode> {
        match self {
            Error::Renderer(code) => Some(*code),
            _ => None,
        }
    }
}

/// Convenience Result type using the renderer Error
pub type Result<T> = std::result::Result<T, Error>;
