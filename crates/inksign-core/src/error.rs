use thiserror::Error;

#[derive(Error, Debug)]
pub enum StampError {
    #[error("Invalid base64 image payload: {0}")]
    DecodeError(String),

    #[error("Unsupported image format: {0}")]
    FormatError(String),

    #[error("Cannot open source document: {0}")]
    SourceUnavailable(String),

    #[error("PDF operation failed: {0}")]
    OperationError(String),
}
