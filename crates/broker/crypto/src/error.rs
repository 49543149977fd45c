//! Codec error types

use thiserror::Error;

/// Codec errors
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Invalid key encoding: {0}")]
    InvalidKeyEncoding(#[from] base64::DecodeError),

    #[error("Invalid key length: expected 32 bytes, got {0}")]
    InvalidKeyLength(usize),

    #[error("Ciphertext too short: {0} bytes")]
    Truncated(usize),

    #[error("Encryption failed")]
    Encrypt,

    #[error("Decryption failed: ciphertext is corrupt or was sealed with another key")]
    Decrypt,
}

/// Result type for codec operations
pub type Result<T> = std::result::Result<T, CodecError>;
