// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! Authenticated encryption of block payloads.
//!
//! Payloads are sealed with AES-128-GCM under a per-instance random key.
//! The 12-byte nonce is stored zero-padded to the 16-byte cipher block size,
//! so for payloads that are a multiple of 16 bytes the ciphertext is too:
//! `nonce (16) || ciphertext || tag (16)`.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes128Gcm, Key, Nonce};
use rand::{CryptoRng, RngCore};
use thiserror::Error;

/// The encryption key size in bytes.
pub const KEY_SIZE: usize = 16;

/// The AES-GCM nonce size in bytes.
const NONCE_SIZE: usize = 12;

/// The nonce field as stored, padded to the cipher block size.
const NONCE_FIELD_SIZE: usize = 16;

/// The AES-GCM authentication tag size in bytes.
const TAG_SIZE: usize = 16;

/// Errors reported by the cipher.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// The input length is not a multiple of the cipher block size.
    #[error("ciphertext of {0} bytes is not a multiple of 16")]
    UnalignedCiphertext(usize),

    /// The input is too short to hold a nonce and a tag.
    #[error("ciphertext of {0} bytes is too short")]
    TruncatedCiphertext(usize),

    /// The authentication tag did not verify; the ciphertext was tampered
    /// with or was sealed under a different key.
    #[error("block authentication failed")]
    AuthenticationFailure,

    /// The cipher could not seal the payload.
    #[error("block encryption failed")]
    EncryptionFailure,
}

/// A fixed-block-size authenticated cipher for block payloads.
#[derive(Clone)]
pub struct CryptoUtils {
    cipher: Aes128Gcm,
}

impl CryptoUtils {
    /// Instantiates the cipher from a 16-byte key.
    pub fn new(key: &[u8; KEY_SIZE]) -> Self {
        Self {
            cipher: Aes128Gcm::new(Key::<Aes128Gcm>::from_slice(key)),
        }
    }

    /// Draws a fresh random key.
    pub fn generate_key<R: RngCore + CryptoRng>(rng: &mut R) -> [u8; KEY_SIZE] {
        let mut key = [0u8; KEY_SIZE];
        rng.fill_bytes(&mut key);
        key
    }

    /// The ciphertext length produced for a payload of `plaintext_len`
    /// bytes. A multiple of 16 whenever `plaintext_len` is.
    pub const fn ciphertext_len(plaintext_len: usize) -> usize {
        NONCE_FIELD_SIZE + plaintext_len + TAG_SIZE
    }

    /// Seals `plaintext` under a fresh random nonce.
    pub fn encrypt<R: RngCore + CryptoRng>(
        &self,
        plaintext: &[u8],
        rng: &mut R,
    ) -> Result<Vec<u8>, CryptoError> {
        let mut nonce = [0u8; NONCE_SIZE];
        rng.fill_bytes(&mut nonce);

        let sealed = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|_| CryptoError::EncryptionFailure)?;

        let mut out = Vec::with_capacity(Self::ciphertext_len(plaintext.len()));
        out.extend_from_slice(&nonce);
        out.resize(NONCE_FIELD_SIZE, 0);
        out.extend_from_slice(&sealed);
        Ok(out)
    }

    /// Opens a ciphertext produced by [`CryptoUtils::encrypt`]. Rejects
    /// inputs whose length is not a multiple of 16 and inputs whose
    /// authentication tag does not verify.
    pub fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if data.len() % 16 != 0 {
            return Err(CryptoError::UnalignedCiphertext(data.len()));
        }
        if data.len() < NONCE_FIELD_SIZE + TAG_SIZE {
            return Err(CryptoError::TruncatedCiphertext(data.len()));
        }

        let nonce = &data[..NONCE_SIZE];
        let sealed = &data[NONCE_FIELD_SIZE..];
        self.cipher
            .decrypt(Nonce::from_slice(nonce), sealed)
            .map_err(|_| CryptoError::AuthenticationFailure)
    }
}

impl std::fmt::Debug for CryptoUtils {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // The key must never appear in logs.
        write!(f, "CryptoUtils")
    }
}
