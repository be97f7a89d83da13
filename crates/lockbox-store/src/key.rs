use std::fmt;
use std::sync::{Arc, Mutex};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use hkdf::Hkdf;
use rand::{rngs::OsRng, RngCore};
use sha2::Sha256;
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Exact length of the symmetric key in bytes (AES-256).
pub const KEY_LEN: usize = 32;

/// Default environment variable holding the base64-encoded master key.
pub const DEFAULT_ENV_VAR: &str = "LOCKBOX_MASTER_KEY";

/// HKDF info string; domain-separates keys derived for this store.
const HKDF_INFO: &[u8] = b"lockbox-master-key-v1";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyError {
    #[error("key material must be exactly {KEY_LEN} bytes, got {actual}")]
    InvalidLength { actual: usize },
    #[error("key decode error: {0}")]
    Decode(String),
    #[error("key source error: {0}")]
    Source(String),
}

/// Key material used for encryption at rest.
///
/// The key bytes are zeroized when the value is dropped. `id` is a
/// non-sensitive label for logging and rotation; never log the key bytes.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct KeyMaterial {
    id: String,
    bytes: [u8; KEY_LEN],
}

impl KeyMaterial {
    /// Wrap an externally supplied key. Rejects anything that is not exactly
    /// 32 bytes; there is no padding or truncation fallback.
    pub fn from_bytes(id: impl Into<String>, bytes: &[u8]) -> Result<Self, KeyError> {
        if bytes.len() != KEY_LEN {
            return Err(KeyError::InvalidLength {
                actual: bytes.len(),
            });
        }
        let mut key = [0u8; KEY_LEN];
        key.copy_from_slice(bytes);
        Ok(Self {
            id: id.into(),
            bytes: key,
        })
    }

    /// Generate a fresh random key from the OS CSPRNG.
    pub fn generate(id: impl Into<String>) -> Self {
        let mut bytes = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut bytes);
        Self {
            id: id.into(),
            bytes,
        }
    }

    /// Derive a key from a caller-supplied secret and salt via HKDF-SHA256.
    /// The same (secret, salt) pair always yields the same key.
    pub fn derive(id: impl Into<String>, secret: &[u8], salt: &[u8]) -> Self {
        let hk = Hkdf::<Sha256>::new(Some(salt), secret);
        let mut okm = [0u8; KEY_LEN];
        // expand cannot fail when output length <= 255 * hash-length
        hk.expand(HKDF_INFO, &mut okm)
            .expect("HKDF expand should not fail for 32-byte output");
        Self {
            id: id.into(),
            bytes: okm,
        }
    }

    /// Decode a base64 (standard alphabet) key, e.g. from an environment
    /// variable populated by `lockbox keygen`.
    pub fn from_base64(id: impl Into<String>, encoded: &str) -> Result<Self, KeyError> {
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|e| KeyError::Decode(e.to_string()))?;
        Self::from_bytes(id, &bytes)
    }

    /// Encode the key as base64 for transport into an environment variable.
    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.bytes)
    }

    /// Label for logging and rotation.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Raw key bytes for cipher construction.
    pub fn bytes(&self) -> &[u8; KEY_LEN] {
        &self.bytes
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never log the actual key material.
        f.debug_struct("KeyMaterial")
            .field("id", &self.id)
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Provides access to encryption keys (environment injection in production;
/// memory in tests).
pub trait KeyProvider: Send + Sync {
    fn get_or_create(&self) -> Result<KeyMaterial, KeyError>;
}

/// Reads a base64-encoded key from an environment variable.
///
/// This provider cannot mint a key of its own; an unset variable is a
/// `Source` error.
pub struct EnvKeyProvider {
    var: String,
}

impl EnvKeyProvider {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

impl KeyProvider for EnvKeyProvider {
    fn get_or_create(&self) -> Result<KeyMaterial, KeyError> {
        match std::env::var(&self.var) {
            Ok(encoded) if !encoded.trim().is_empty() => {
                KeyMaterial::from_base64(self.var.as_str(), &encoded)
            }
            _ => Err(KeyError::Source(format!(
                "environment variable {} is not set; generate a key with `lockbox keygen`",
                self.var
            ))),
        }
    }
}

/// Derives the key on demand from a secret/salt pair (HKDF-SHA256).
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct DerivedKeyProvider {
    id: String,
    secret: Vec<u8>,
    salt: Vec<u8>,
}

impl DerivedKeyProvider {
    pub fn new(id: impl Into<String>, secret: Vec<u8>, salt: Vec<u8>) -> Self {
        Self {
            id: id.into(),
            secret,
            salt,
        }
    }
}

impl KeyProvider for DerivedKeyProvider {
    fn get_or_create(&self) -> Result<KeyMaterial, KeyError> {
        Ok(KeyMaterial::derive(self.id.as_str(), &self.secret, &self.salt))
    }
}

/// In-memory key provider for tests and ephemeral sessions. Generates a key
/// on first use and hands out the same one afterwards.
#[derive(Debug, Default, Clone)]
pub struct InMemoryKeyProvider {
    inner: Arc<Mutex<Option<KeyMaterial>>>,
}

impl KeyProvider for InMemoryKeyProvider {
    fn get_or_create(&self) -> Result<KeyMaterial, KeyError> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|err| KeyError::Source(format!("lock poisoned: {err}")))?;

        if let Some(existing) = guard.clone() {
            return Ok(existing);
        }

        let material = KeyMaterial::generate("ephemeral");
        *guard = Some(material.clone());
        Ok(material)
    }
}

#[cfg(test)]
mod tests {
    use base64::{engine::general_purpose::STANDARD, Engine as _};

    use super::*;

    #[test]
    fn from_bytes_rejects_wrong_length() {
        let err = KeyMaterial::from_bytes("t", &[0u8; 16]).expect_err("16 bytes must be rejected");
        assert_eq!(err, KeyError::InvalidLength { actual: 16 });

        let err = KeyMaterial::from_bytes("t", &[0u8; 33]).expect_err("33 bytes must be rejected");
        assert_eq!(err, KeyError::InvalidLength { actual: 33 });
    }

    #[test]
    fn generate_produces_distinct_keys() {
        let a = KeyMaterial::generate("a");
        let b = KeyMaterial::generate("b");
        assert_ne!(a.bytes(), b.bytes());
    }

    #[test]
    fn base64_round_trip() {
        let key = KeyMaterial::generate("t");
        let decoded = KeyMaterial::from_base64("t", &key.to_base64()).expect("decode");
        assert_eq!(decoded.bytes(), key.bytes());
    }

    #[test]
    fn from_base64_rejects_garbage() {
        let err = KeyMaterial::from_base64("t", "not-valid-base64!").expect_err("must fail");
        assert!(matches!(err, KeyError::Decode(_)));
    }

    #[test]
    fn derive_is_deterministic_and_salt_sensitive() {
        let a = KeyMaterial::derive("t", b"machine-secret", b"salt-1");
        let b = KeyMaterial::derive("t", b"machine-secret", b"salt-1");
        let c = KeyMaterial::derive("t", b"machine-secret", b"salt-2");

        assert_eq!(a.bytes(), b.bytes());
        assert_ne!(a.bytes(), c.bytes());
    }

    #[test]
    fn debug_redacts_key_bytes() {
        let key = KeyMaterial::generate("visible-id");
        let rendered = format!("{key:?}");
        assert!(rendered.contains("visible-id"));
        assert!(rendered.contains("[REDACTED]"));
        assert!(!rendered.contains(&key.to_base64()));
    }

    #[test]
    fn env_provider_reads_key_from_variable() {
        let var = "LOCKBOX_TEST_KEY_READS";
        let key = KeyMaterial::generate("t");
        std::env::set_var(var, key.to_base64());

        let provider = EnvKeyProvider::new(var);
        let resolved = provider.get_or_create().expect("resolve");
        assert_eq!(resolved.bytes(), key.bytes());

        std::env::remove_var(var);
    }

    #[test]
    fn env_provider_errors_when_unset() {
        let provider = EnvKeyProvider::new("LOCKBOX_TEST_KEY_UNSET");
        let err = provider.get_or_create().expect_err("must fail");
        assert!(matches!(err, KeyError::Source(_)));
    }

    #[test]
    fn env_provider_rejects_wrong_length() {
        let var = "LOCKBOX_TEST_KEY_SHORT";
        std::env::set_var(var, STANDARD.encode([0u8; 16]));

        let provider = EnvKeyProvider::new(var);
        let err = provider.get_or_create().expect_err("must fail");
        assert_eq!(err, KeyError::InvalidLength { actual: 16 });

        std::env::remove_var(var);
    }

    #[test]
    fn memory_provider_returns_same_key() {
        let provider = InMemoryKeyProvider::default();
        let first = provider.get_or_create().expect("first");
        let second = provider.get_or_create().expect("second");

        assert_eq!(first.bytes(), second.bytes());
        assert_eq!(first.id(), second.id());
    }

    #[test]
    fn derived_provider_is_stable_across_calls() {
        let provider = DerivedKeyProvider::new("t", b"secret".to_vec(), b"salt".to_vec());
        let first = provider.get_or_create().expect("first");
        let second = provider.get_or_create().expect("second");
        assert_eq!(first.bytes(), second.bytes());
    }
}
