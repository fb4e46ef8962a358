//! Feed envelope decryption.
//!
//! - [`envelope`] - the `wrapped-key::payload` wire format and AES-256-GCM open
//! - [`key_service`] - HTTP client for an external key-unwrap service
//!
//! Key unwrapping is a capability injected through [`KeyUnwrap`], so the
//! decryptor never knows whether keys come from a key-management service,
//! a local keyring, or a test double.

pub mod envelope;
pub mod key_service;

use async_trait::async_trait;
use secrecy::SecretSlice;
use thiserror::Error;

pub use envelope::{decrypt, DecryptError, Envelope, EnvelopeDecryptor, KEY_LEN, NONCE_LEN};
pub use key_service::{KeyServiceClient, KeyServiceOptions};

/// Failure to recover a data key from its wrapped form.
#[derive(Debug, Error)]
pub enum KeyUnwrapError {
    /// Transport-level failure reaching the key service
    #[error("Key service request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// Key service answered with a non-2xx status
    #[error("Key service rejected unwrap: status {status}")]
    Rejected { status: u16 },
    /// Key service did not answer within the timeout
    #[error("Key service timed out")]
    Timeout,
    /// Key service answered 2xx but the body was unusable
    #[error("Invalid key service response: {0}")]
    InvalidResponse(String),
    /// Any other capability-specific failure
    #[error("{0}")]
    Failed(String),
}

/// Recovers raw key bytes from wrapped key bytes.
///
/// Implementations return whatever key material the backing service holds;
/// length checks happen in the decryptor.
#[async_trait]
pub trait KeyUnwrap: Send + Sync {
    async fn unwrap_key(&self, wrapped: &[u8]) -> Result<SecretSlice<u8>, KeyUnwrapError>;
}
