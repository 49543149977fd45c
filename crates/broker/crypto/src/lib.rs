//! Stratus Crypto - codecs for sensitive instance and binding state
//!
//! Every field classified as sensitive passes through a [`Codec`] before it
//! reaches persistence and right after it is loaded. Implementations are
//! interchangeable and selected once at boot from [`CodecSettings`]:
//!
//! - [`NoopCodec`]: passes bytes through; development only
//! - [`AesGcmCodec`]: AES-256-GCM with a fresh random nonce per call

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod aes;
pub mod error;
pub mod noop;

pub use aes::AesGcmCodec;
pub use error::{CodecError, Result};
pub use noop::NoopCodec;

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Symmetric codec applied at the persistence boundary
pub trait Codec: Send + Sync {
    /// Encrypt `plaintext` into a self-describing ciphertext
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>>;

    /// Decrypt a ciphertext produced by [`Codec::encrypt`]
    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>>;

    /// Codec name for logging
    fn name(&self) -> &str;
}

/// Codec selection, as found in broker configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "kebab-case")]
pub enum CodecSettings {
    /// No encryption
    #[default]
    None,

    /// AES-256-GCM with a base64-encoded 32-byte key
    #[serde(rename = "aes256-gcm")]
    Aes256Gcm { key: String },
}

/// Build the codec described by `settings`
pub fn build_codec(settings: &CodecSettings) -> Result<Arc<dyn Codec>> {
    match settings {
        CodecSettings::None => Ok(Arc::new(NoopCodec)),
        CodecSettings::Aes256Gcm { key } => Ok(Arc::new(AesGcmCodec::from_base64_key(key)?)),
    }
}
