//! Encrypted feed envelopes.
//!
//! # Wire format
//!
//! ```text
//! base64(wrapped_key) "::" base64(nonce[12] || ciphertext || tag[16])
//! ```
//!
//! The wrapped key is recovered through a [`KeyUnwrap`] capability; the
//! first 32 bytes it returns are the AES-256-GCM key. No associated data.
use crate::crypto::{KeyUnwrap, KeyUnwrapError};
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use secrecy::ExposeSecret;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Separator between the wrapped key and the sealed payload.
pub const ENVELOPE_SEPARATOR: &str = "::";
/// AES-256 key length in bytes.
pub const KEY_LEN: usize = 32;
/// AES-GCM nonce length in bytes.
pub const NONCE_LEN: usize = 12;

/// Which half of the envelope a decoding error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment {
    WrappedKey,
    Ciphertext,
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::WrappedKey => f.write_str("wrapped key"),
            Segment::Ciphertext => f.write_str("ciphertext"),
        }
    }
}

/// Errors from opening an envelope. Any of them aborts the decrypt.
#[derive(Debug, Error)]
pub enum DecryptError {
    /// Envelope body is not UTF-8 text
    #[error("Malformed envelope: body is not UTF-8")]
    NotUtf8,
    /// Envelope did not split into exactly two `::` segments
    #[error("Malformed envelope: expected 2 segments, got {0}")]
    SegmentCount(usize),
    /// A segment was not valid standard base64
    #[error("Invalid base64 in {segment}: {source}")]
    Encoding {
        segment: Segment,
        #[source]
        source: base64::DecodeError,
    },
    /// The key-unwrap capability failed
    #[error("Key unwrap failed: {0}")]
    KeyUnwrap(#[from] KeyUnwrapError),
    /// Unwrapped key material is shorter than an AES-256 key
    #[error("Unwrapped key too short: {len} bytes (need {need})", need = KEY_LEN)]
    KeyTooShort { len: usize },
    /// Sealed payload shorter than the nonce
    #[error("Malformed ciphertext: {len} bytes is shorter than the {nonce}-byte nonce", nonce = NONCE_LEN)]
    MalformedCiphertext { len: usize },
    /// GCM tag check failed (wrong key or tampered payload)
    #[error("Ciphertext authentication failed")]
    Authentication,
}

impl DecryptError {
    /// True for the errors that mean the body was not a well-formed envelope.
    pub fn is_format_error(&self) -> bool {
        matches!(self, DecryptError::NotUtf8 | DecryptError::SegmentCount(_))
    }
}

/// An envelope split into its decoded halves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub wrapped_key: Vec<u8>,
    /// `nonce || ciphertext || tag`
    pub sealed: Vec<u8>,
}

impl Envelope {
    /// Splits and base64-decodes an envelope body.
    pub fn parse(raw: &[u8]) -> Result<Self, DecryptError> {
        let text = std::str::from_utf8(raw).map_err(|_| DecryptError::NotUtf8)?;

        let parts: Vec<&str> = text.split(ENVELOPE_SEPARATOR).collect();
        let [key_b64, sealed_b64] = parts.as_slice() else {
            return Err(DecryptError::SegmentCount(parts.len()));
        };

        let wrapped_key = STANDARD
            .decode(key_b64)
            .map_err(|source| DecryptError::Encoding {
                segment: Segment::WrappedKey,
                source,
            })?;
        let sealed = STANDARD
            .decode(sealed_b64)
            .map_err(|source| DecryptError::Encoding {
                segment: Segment::Ciphertext,
                source,
            })?;

        Ok(Self {
            wrapped_key,
            sealed,
        })
    }
}

/// Opens an envelope body with the given key-unwrap capability.
///
/// Steps, each fatal on failure: split on `::`, base64-decode both halves,
/// unwrap the key, then AES-256-GCM open with the leading 12 bytes as nonce.
pub async fn decrypt(raw: &[u8], unwrap: &dyn KeyUnwrap) -> Result<Vec<u8>, DecryptError> {
    let envelope = Envelope::parse(raw)?;

    let key = unwrap.unwrap_key(&envelope.wrapped_key).await?;
    let key = key.expose_secret();
    if key.len() < KEY_LEN {
        return Err(DecryptError::KeyTooShort { len: key.len() });
    }

    open(&key[..KEY_LEN], &envelope.sealed)
}

fn open(key: &[u8], sealed: &[u8]) -> Result<Vec<u8>, DecryptError> {
    if sealed.len() < NONCE_LEN {
        return Err(DecryptError::MalformedCiphertext { len: sealed.len() });
    }

    let cipher =
        Aes256Gcm::new_from_slice(key).map_err(|_| DecryptError::KeyTooShort { len: key.len() })?;
    let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);

    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| DecryptError::Authentication)
}

/// Decrypts feed bodies for a reader configured with a key reference.
#[derive(Clone)]
pub struct EnvelopeDecryptor {
    key_ref: String,
    unwrap: Arc<dyn KeyUnwrap>,
}

impl EnvelopeDecryptor {
    pub fn new(key_ref: impl Into<String>, unwrap: Arc<dyn KeyUnwrap>) -> Self {
        Self {
            key_ref: key_ref.into(),
            unwrap,
        }
    }

    pub fn key_ref(&self) -> &str {
        &self.key_ref
    }

    pub async fn decrypt(&self, raw: &[u8]) -> Result<Vec<u8>, DecryptError> {
        tracing::debug!(key_ref = %self.key_ref, bytes = raw.len(), "Decrypting feed envelope");
        decrypt(raw, self.unwrap.as_ref()).await
    }
}

impl fmt::Debug for EnvelopeDecryptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnvelopeDecryptor")
            .field("key_ref", &self.key_ref)
            .finish_non_exhaustive()
    }
}
