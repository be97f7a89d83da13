use clap::{Parser, Subcommand};

/// CLI surface definition. One subcommand per store operation plus the
/// provisioning helpers (keygen, health, config).
#[derive(Parser, Debug)]
#[command(
    name = "lockbox",
    about = "Encrypted at-rest secret storage for desktop applications",
    version,
    propagate_version = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Store a secret. Reads the value from stdin when VALUE is omitted, so
    /// secrets stay out of shell history.
    Set {
        key: String,
        value: Option<String>,
    },
    /// Print a secret's value. Exits nonzero when the secret is absent.
    Get { key: String },
    /// Remove a secret. Succeeds even when the secret is absent.
    Delete { key: String },
    /// List stored secret names.
    List,
    /// Generate a fresh base64 master key and print it.
    Keygen,
    /// Run a health check against the encrypted store.
    Health,
    /// Manage CLI configuration.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Print version and exit.
    Version,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum ConfigCommand {
    /// Create a default config file if one does not exist.
    Init,
}
