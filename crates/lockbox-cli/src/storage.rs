use std::path::PathBuf;

use crate::config::Config;
use color_eyre::Result;
use dirs::data_dir;
use lockbox_store::{
    key::{EnvKeyProvider, DEFAULT_ENV_VAR},
    store::SecretFileStore,
};
use tracing::debug;

/// Resolve the default secret storage directory for Lockbox.
pub fn default_data_dir() -> Result<PathBuf> {
    let base = data_dir().ok_or_else(|| color_eyre::eyre::eyre!("no data dir available"))?;
    Ok(base.join("lockbox").join("secure"))
}

/// Build the production encrypted store, keyed from the environment.
pub fn production_store(config: &Config) -> Result<SecretFileStore<EnvKeyProvider>> {
    let root = default_data_dir()?;
    debug!(?root, "initializing encrypted store");
    Ok(SecretFileStore::new(root, key_provider(config)))
}

/// Build a store honoring config overrides.
pub fn store_from_config(config: &Config) -> Result<SecretFileStore<EnvKeyProvider>> {
    if let Some(root) = &config.data_dir {
        debug!(?root, "initializing encrypted store (config override)");
        return Ok(SecretFileStore::new(root.clone(), key_provider(config)));
    }

    production_store(config)
}

fn key_provider(config: &Config) -> EnvKeyProvider {
    let var = config
        .key_env
        .clone()
        .unwrap_or_else(|| DEFAULT_ENV_VAR.to_string());
    EnvKeyProvider::new(var)
}

/// Helper for tests to construct a store rooted at a temp dir with an
/// in-memory key.
#[cfg(test)]
pub fn test_store(root: impl Into<PathBuf>) -> SecretFileStore<lockbox_store::key::InMemoryKeyProvider> {
    SecretFileStore::new(root, lockbox_store::key::InMemoryKeyProvider::default())
}
