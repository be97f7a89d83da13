use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use lockbox_core::store::{SecretStore, StoreError};
use tempfile::NamedTempFile;
use tracing::instrument;

use crate::cipher;
use crate::key::{KeyError, KeyProvider};

/// Extension shared by every record file under the store root.
const RECORD_EXT: &str = "enc";
/// Longest accepted secret name.
const MAX_NAME_LEN: usize = 128;

/// AES-GCM encrypted file-backed store implementing the shared `SecretStore`
/// contract. One record file per secret name, at `<root>/<name>.enc`.
///
/// The store holds no cross-thread or cross-process coordination: concurrent
/// writers to the same name race last-writer-wins, and the tempfile-then-
/// rename write keeps any concurrent reader on a complete record.
pub struct SecretFileStore<P: KeyProvider> {
    root: PathBuf,
    key_provider: P,
}

impl<P: KeyProvider> SecretFileStore<P> {
    pub fn new(root: impl Into<PathBuf>, key_provider: P) -> Self {
        Self {
            root: root.into(),
            key_provider,
        }
    }

    /// Directory holding the record files.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether a record exists for `name`. Does not touch the key material.
    pub fn exists(&self, name: &str) -> Result<bool, StoreError> {
        validate_name(name)?;
        Ok(self.path_for(name).exists())
    }

    /// Names of all stored secrets, sorted. Files without the record
    /// extension are ignored; a missing root directory means no secrets.
    pub fn list(&self) -> Result<Vec<String>, StoreError> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }

        let mut names = Vec::new();
        for entry in fs::read_dir(&self.root).map_err(io_err)? {
            let path = entry.map_err(io_err)?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXT) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.push(stem.to_string());
            }
        }

        names.sort();
        Ok(names)
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.root.join(format!("{name}.{RECORD_EXT}"))
    }

    /// Create the root directory if needed and restrict it to the owner.
    /// Repeated calls on an existing directory are a no-op success.
    fn ensure_dir(&self) -> Result<(), StoreError> {
        fs::create_dir_all(&self.root).map_err(|e| StoreError::DirectoryCreation {
            reason: e.to_string(),
        })?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.root, fs::Permissions::from_mode(0o700)).map_err(|e| {
                StoreError::DirectoryCreation {
                    reason: format!("could not restrict directory permissions: {e}"),
                }
            })?;
        }

        Ok(())
    }

    fn key_material(&self) -> Result<crate::key::KeyMaterial, StoreError> {
        self.key_provider.get_or_create().map_err(key_err)
    }
}

impl<P: KeyProvider> SecretStore for SecretFileStore<P> {
    #[instrument(skip(self, value))]
    fn set(&self, name: &str, value: &[u8]) -> Result<(), StoreError> {
        validate_name(name)?;
        self.ensure_dir()?;

        let material = self.key_material()?;
        let record = cipher::seal(&material, value)?;
        write_record(&self.path_for(name), &record)
    }

    #[instrument(skip(self))]
    fn get(&self, name: &str) -> Result<Option<Vec<u8>>, StoreError> {
        validate_name(name)?;

        let encoded = match fs::read_to_string(self.path_for(name)) {
            Ok(encoded) => encoded,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(io_err(err)),
        };

        let material = self.key_material()?;
        cipher::open(&material, &encoded).map(Some)
    }

    #[instrument(skip(self))]
    fn delete(&self, name: &str) -> Result<(), StoreError> {
        validate_name(name)?;

        match fs::remove_file(self.path_for(name)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(io_err(err)),
        }
    }
}

/// Validate that a secret name maps to a single safe file name.
///
/// Allowed: ASCII alphanumeric, underscore, hyphen, dot; at most 128
/// characters; no leading dot and no `..` sequence. Everything else --
/// path separators included -- is rejected rather than escaped.
fn validate_name(name: &str) -> Result<(), StoreError> {
    let invalid = |reason: &str| StoreError::InvalidName {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    if name.is_empty() {
        return Err(invalid("name must not be empty"));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(invalid("name exceeds 128 characters"));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
    {
        return Err(invalid(
            "allowed characters are ASCII alphanumeric, '_', '-', and '.'",
        ));
    }
    if name.starts_with('.') || name.contains("..") {
        return Err(invalid("name must not start with '.' or contain '..'"));
    }
    Ok(())
}

/// Write a record atomically: tempfile in the target directory, then rename.
/// A crash mid-write leaves the previous record intact, and a concurrent
/// reader never observes a partially written file.
fn write_record(path: &Path, encoded: &str) -> Result<(), StoreError> {
    let parent = path.parent().ok_or_else(|| StoreError::Io {
        reason: "record path has no parent directory".to_string(),
    })?;

    let mut tmp = NamedTempFile::new_in(parent).map_err(io_err)?;
    tmp.write_all(encoded.as_bytes()).map_err(io_err)?;
    tmp.flush().map_err(io_err)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tmp.as_file()
            .set_permissions(fs::Permissions::from_mode(0o600))
            .map_err(io_err)?;
    }

    tmp.persist(path).map_err(|e| io_err(e.error))?;
    Ok(())
}

fn io_err(err: std::io::Error) -> StoreError {
    StoreError::Io {
        reason: err.to_string(),
    }
}

fn key_err(err: KeyError) -> StoreError {
    StoreError::CipherInit {
        reason: format!("key provider: {err}"),
    }
}
