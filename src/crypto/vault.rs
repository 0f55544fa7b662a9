// Symmetric protection for generated secrets at rest.
//
// Secrets are encrypted with AES in full-block CFB mode. Each resource carries its own random
// salt, which is used as the cipher IV; the key is global to the broker.

use aes::cipher::{AsyncStreamCipher, KeyIvInit};
use aes::{Aes128, Aes192, Aes256};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use rand::rngs::OsRng;
use rand::{Rng, RngCore};
use std::fmt;
use thiserror::Error;

/// Cipher block length; salts decode to exactly this many bytes.
pub const SALT_LEN: usize = 16;

const ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum VaultError {
    #[error("{0}")]
    Precondition(String),
    #[error("{0}")]
    Crypto(String),
}

/// The broker-wide encryption key. Valid lengths are 16, 24 and 32 bytes.
#[derive(Clone)]
pub struct EncryptionKey(Vec<u8>);

impl EncryptionKey {
    pub fn new(raw: impl Into<Vec<u8>>) -> Result<Self, VaultError> {
        let raw = raw.into();
        match raw.len() {
            16 | 24 | 32 => Ok(Self(raw)),
            n => Err(VaultError::Crypto(format!(
                "encryption key must be 16, 24 or 32 bytes, got {n}"
            ))),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EncryptionKey(<redacted>)")
    }
}

/// Encrypts `plaintext` under `key`, using the base64 `salt` as IV. Returns base64 ciphertext.
pub fn protect(plaintext: &str, key: &[u8], salt: &str) -> Result<String, VaultError> {
    if salt.is_empty() {
        return Err(VaultError::Precondition(
            "Salt has to be set before writing the password".to_string(),
        ));
    }
    let iv = decode_salt(salt)?;

    let mut buf = plaintext.as_bytes().to_vec();
    match key.len() {
        16 => cfb_mode::Encryptor::<Aes128>::new_from_slices(key, &iv)
            .map_err(|e| VaultError::Crypto(format!("cipher init failed: {e}")))?
            .encrypt(&mut buf),
        24 => cfb_mode::Encryptor::<Aes192>::new_from_slices(key, &iv)
            .map_err(|e| VaultError::Crypto(format!("cipher init failed: {e}")))?
            .encrypt(&mut buf),
        32 => cfb_mode::Encryptor::<Aes256>::new_from_slices(key, &iv)
            .map_err(|e| VaultError::Crypto(format!("cipher init failed: {e}")))?
            .encrypt(&mut buf),
        n => return Err(invalid_key_size(n)),
    }

    Ok(STANDARD.encode(buf))
}

/// Inverse of [`protect`].
pub fn reveal(ciphertext: &str, key: &[u8], salt: &str) -> Result<String, VaultError> {
    if salt.is_empty() || ciphertext.is_empty() {
        return Err(VaultError::Precondition(
            "Salt and password have to be set before reading the password".to_string(),
        ));
    }
    let iv = decode_salt(salt)?;
    let mut buf = STANDARD
        .decode(ciphertext)
        .map_err(|e| VaultError::Crypto(format!("ciphertext is not valid base64: {e}")))?;

    match key.len() {
        16 => cfb_mode::Decryptor::<Aes128>::new_from_slices(key, &iv)
            .map_err(|e| VaultError::Crypto(format!("cipher init failed: {e}")))?
            .decrypt(&mut buf),
        24 => cfb_mode::Decryptor::<Aes192>::new_from_slices(key, &iv)
            .map_err(|e| VaultError::Crypto(format!("cipher init failed: {e}")))?
            .decrypt(&mut buf),
        32 => cfb_mode::Decryptor::<Aes256>::new_from_slices(key, &iv)
            .map_err(|e| VaultError::Crypto(format!("cipher init failed: {e}")))?
            .decrypt(&mut buf),
        n => return Err(invalid_key_size(n)),
    }

    String::from_utf8(buf)
        .map_err(|_| VaultError::Crypto("decrypted secret is not valid UTF-8".to_string()))
}

/// Random lowercase alphanumeric string from the OS CSPRNG.
///
/// Used for database names, usernames and passwords, so the alphabet stays within what every
/// supported engine accepts in identifiers.
pub fn random_string(len: usize) -> String {
    let mut rng = OsRng;
    (0..len)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}

/// Fresh base64-encoded salt of one cipher block.
pub fn generate_salt() -> String {
    let mut iv = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut iv);
    STANDARD.encode(iv)
}

fn decode_salt(salt: &str) -> Result<Vec<u8>, VaultError> {
    let iv = STANDARD
        .decode(salt)
        .map_err(|e| VaultError::Crypto(format!("salt is not valid base64: {e}")))?;
    if iv.len() != SALT_LEN {
        return Err(VaultError::Crypto(format!(
            "salt must decode to {SALT_LEN} bytes, got {}",
            iv.len()
        )));
    }
    Ok(iv)
}

fn invalid_key_size(n: usize) -> VaultError {
    VaultError::Crypto(format!("invalid AES key size {n}"))
}
