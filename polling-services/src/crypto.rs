//! At-rest encryption of source credentials (OAuth token sets, ICS URLs).
//!
//! AES-256-GCM with a random 12-byte IV per record. The stored form is
//! `base64(iv || tag || ciphertext)`.

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Key, Nonce,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use shared::WorkflowError;
use thiserror::Error;

const IV_LEN: usize = 12;
const TAG_LEN: usize = 16;
const KEY_LEN: usize = 32;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("ENCRYPTION_KEY must be 64 hex characters or base64 of 32 bytes")]
    InvalidKey,

    #[error("Failed to encrypt credentials")]
    Encrypt,

    #[error("Stored credentials could not be decrypted")]
    Decrypt,

    #[error("Stored credentials are malformed")]
    Malformed,
}

impl From<CryptoError> for WorkflowError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::InvalidKey => WorkflowError::Configuration(err.to_string()),
            other => WorkflowError::Internal(anyhow::Error::new(other)),
        }
    }
}

/// Encrypts and decrypts credential blobs with one process-wide key.
#[derive(Clone)]
pub struct Cipher {
    aead: Aes256Gcm,
}

impl std::fmt::Debug for Cipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Cipher(..)")
    }
}

impl Cipher {
    /// Accepts the key as 64 hex characters or as base64 of 32 bytes.
    pub fn from_key_material(material: &str) -> Result<Self, CryptoError> {
        let material = material.trim();
        let bytes = decode_hex(material)
            .or_else(|| STANDARD.decode(material).ok())
            .filter(|b| b.len() == KEY_LEN)
            .ok_or(CryptoError::InvalidKey)?;
        Ok(Self {
            aead: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&bytes)),
        })
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        // aes-gcm appends the tag to the ciphertext
        let sealed = self
            .aead
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|_| CryptoError::Encrypt)?;
        let (ciphertext, tag) = sealed.split_at(sealed.len() - TAG_LEN);

        let mut out = Vec::with_capacity(IV_LEN + sealed.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(tag);
        out.extend_from_slice(ciphertext);
        Ok(STANDARD.encode(out))
    }

    pub fn decrypt(&self, stored: &str) -> Result<String, CryptoError> {
        let raw = STANDARD
            .decode(stored.trim())
            .map_err(|_| CryptoError::Malformed)?;
        if raw.len() < IV_LEN + TAG_LEN {
            return Err(CryptoError::Malformed);
        }
        let (iv, rest) = raw.split_at(IV_LEN);
        let (tag, ciphertext) = rest.split_at(TAG_LEN);

        let mut sealed = Vec::with_capacity(rest.len());
        sealed.extend_from_slice(ciphertext);
        sealed.extend_from_slice(tag);

        let plain = self
            .aead
            .decrypt(Nonce::from_slice(iv), sealed.as_slice())
            .map_err(|_| CryptoError::Decrypt)?;
        String::from_utf8(plain).map_err(|_| CryptoError::Malformed)
    }
}

fn decode_hex(text: &str) -> Option<Vec<u8>> {
    if text.len() != KEY_LEN * 2 || !text.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    (0..text.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&text[i..i + 2], 16).ok())
        .collect()
}
