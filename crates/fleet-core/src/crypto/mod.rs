//! Token/credential encryption: Argon2id key derivation over AES-256-GCM.
//!
//! Wire layout is `salt(16) ‖ nonce(12) ‖ ciphertext‖tag(16)`, base64url
//! encoded. A fresh random salt and nonce are drawn for every call, so
//! encrypting the same payload twice never produces the same output.
//! `CryptoError` is intentionally flat: it never says which step failed
//! (bad password vs. truncated input vs. tampered tag all look identical
//! to a caller), so a failing decrypt can't be used as an oracle.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use argon2::{Algorithm, Argon2, Params, Version};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

pub const SALT_LENGTH: usize = 16;
pub const NONCE_LENGTH: usize = 12;
pub const TAG_LENGTH: usize = 16;

const ARGON2_TIME_COST: u32 = 3;
const ARGON2_MEMORY_COST_KIB: u32 = 65536;
const ARGON2_PARALLELISM: u32 = 4;
const ARGON2_HASH_LEN: usize = 32;

#[derive(Debug, Clone, Error)]
#[error("credential encryption failed")]
pub struct CryptoError;

pub type CryptoResult<T> = std::result::Result<T, CryptoError>;

/// Derives a per-call AES-256 key from a master password via Argon2id and
/// uses it to seal/open arbitrary JSON-serializable payloads.
pub struct CredentialCipher {
    master_password: Vec<u8>,
}

impl CredentialCipher {
    pub fn new(master_password: impl Into<Vec<u8>>) -> CryptoResult<Self> {
        let master_password = master_password.into();
        if master_password.is_empty() {
            return Err(CryptoError);
        }
        Ok(Self { master_password })
    }

    fn derive_key(&self, salt: &[u8]) -> CryptoResult<[u8; ARGON2_HASH_LEN]> {
        let params = Params::new(
            ARGON2_MEMORY_COST_KIB,
            ARGON2_TIME_COST,
            ARGON2_PARALLELISM,
            Some(ARGON2_HASH_LEN),
        )
        .map_err(|_| CryptoError)?;
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

        let mut key = [0u8; ARGON2_HASH_LEN];
        argon2
            .hash_password_into(&self.master_password, salt, &mut key)
            .map_err(|_| CryptoError)?;
        Ok(key)
    }

    /// Encrypt any `Serialize` value, returning a base64url (no padding)
    /// token suitable for storage alongside plaintext metadata.
    pub fn encrypt<T: Serialize>(&self, value: &T) -> CryptoResult<String> {
        let plaintext = serde_json::to_vec(value).map_err(|_| CryptoError)?;

        let mut salt = [0u8; SALT_LENGTH];
        let mut nonce_bytes = [0u8; NONCE_LENGTH];
        rand::thread_rng().fill_bytes(&mut salt);
        rand::thread_rng().fill_bytes(&mut nonce_bytes);

        let key_bytes = self.derive_key(&salt)?;
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key_bytes));
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext.as_ref())
            .map_err(|_| CryptoError)?;

        let mut out = Vec::with_capacity(SALT_LENGTH + NONCE_LENGTH + ciphertext.len());
        out.extend_from_slice(&salt);
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);

        Ok(URL_SAFE_NO_PAD.encode(out))
    }

    /// Decrypt a token produced by [`Self::encrypt`] back into `T`.
    pub fn decrypt<T: DeserializeOwned>(&self, token: &str) -> CryptoResult<T> {
        let raw = URL_SAFE_NO_PAD.decode(token).map_err(|_| CryptoError)?;
        if raw.len() < SALT_LENGTH + NONCE_LENGTH + TAG_LENGTH {
            return Err(CryptoError);
        }

        let (salt, rest) = raw.split_at(SALT_LENGTH);
        let (nonce_bytes, ciphertext) = rest.split_at(NONCE_LENGTH);

        let key_bytes = self.derive_key(salt)?;
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key_bytes));
        let nonce = Nonce::from_slice(nonce_bytes);

        let plaintext = cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| CryptoError)?;

        serde_json::from_slice(&plaintext).map_err(|_| CryptoError)
    }
}
