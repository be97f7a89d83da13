//! Record codec: AES-256-GCM sealed payloads in base64 text.
//!
//! Record layout before encoding: `version || nonce || ciphertext || tag`.
//! The version byte keeps the format portable across future layout changes;
//! the nonce is drawn fresh from the OS CSPRNG on every seal and never reused
//! under the same key.

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use lockbox_core::store::StoreError;

use crate::key::KeyMaterial;

/// Format version written as the first byte of every record.
pub const FORMAT_VERSION: u8 = 1;
/// AES-GCM nonce length (96 bits).
pub const NONCE_LEN: usize = 12;

/// Encrypt `plaintext` into a base64 record string.
pub fn seal(key: &KeyMaterial, plaintext: &[u8]) -> Result<String, StoreError> {
    let cipher = build_cipher(key)?;
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|e| StoreError::CipherInit {
            reason: format!("encrypt failed: {e}"),
        })?;

    let mut record = Vec::with_capacity(1 + NONCE_LEN + ciphertext.len());
    record.push(FORMAT_VERSION);
    record.extend_from_slice(nonce.as_slice());
    record.extend_from_slice(&ciphertext);
    Ok(STANDARD.encode(record))
}

/// Decrypt a base64 record string produced by [`seal`].
pub fn open(key: &KeyMaterial, encoded: &str) -> Result<Vec<u8>, StoreError> {
    let raw = STANDARD.decode(encoded).map_err(|e| StoreError::Format {
        reason: format!("base64 decode failed: {e}"),
    })?;

    if raw.len() < 1 + NONCE_LEN {
        return Err(StoreError::Format {
            reason: "record shorter than version byte and nonce".to_string(),
        });
    }

    let (header, rest) = raw.split_at(1);
    if header[0] != FORMAT_VERSION {
        return Err(StoreError::Format {
            reason: format!("unsupported format version {}", header[0]),
        });
    }

    let (nonce_bytes, ciphertext) = rest.split_at(NONCE_LEN);
    let cipher = build_cipher(key)?;
    let nonce = Nonce::from_slice(nonce_bytes);

    // A failed tag check covers corruption, tampering, and wrong key alike;
    // the error deliberately carries no detail that would tell them apart.
    cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| StoreError::Authentication)
}

fn build_cipher(key: &KeyMaterial) -> Result<Aes256Gcm, StoreError> {
    Aes256Gcm::new_from_slice(key.bytes()).map_err(|e| StoreError::CipherInit {
        reason: e.to_string(),
    })
}
