mod cli;
mod config;
mod storage;

use std::io::{Read, Write};

use clap::Parser;
use color_eyre::Result;
use lockbox_core::store::SecretStore;
use lockbox_store::key::{KeyMaterial, DEFAULT_ENV_VAR};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Entry point wiring the CLI to the encrypted store.
fn main() -> Result<()> {
    color_eyre::install()?;
    init_tracing();

    let cli = cli::Cli::parse();
    let config = config::load()?;
    match cli.command {
        cli::Command::Set { key, value } => run_set(&key, value, &config)?,
        cli::Command::Get { key } => run_get(&key, &config)?,
        cli::Command::Delete { key } => run_delete(&key, &config)?,
        cli::Command::List => run_list(&config)?,
        cli::Command::Keygen => run_keygen(),
        cli::Command::Health => run_health_check(&config)?,
        cli::Command::Config(cli::ConfigCommand::Init) => init_config(&config)?,
        cli::Command::Version => print_version(),
    }

    Ok(())
}

fn init_tracing() {
    // Respect user-provided filters, default to info to avoid noisy stdout.
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer().with_target(false);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

fn print_version() {
    println!("lockbox-cli {}", env!("CARGO_PKG_VERSION"));
}

fn run_set(key: &str, value: Option<String>, config: &config::Config) -> Result<()> {
    let store = storage::store_from_config(config)?;
    let value = match value {
        Some(v) => v.into_bytes(),
        None => read_secret_from_stdin()?,
    };
    store.set(key, &value)?;
    println!("Stored {key}");
    Ok(())
}

fn run_get(key: &str, config: &config::Config) -> Result<()> {
    let store = storage::store_from_config(config)?;
    match store.get(key)? {
        Some(value) => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&value)?;
            stdout.write_all(b"\n")?;
            Ok(())
        }
        None => color_eyre::eyre::bail!("no secret stored under {key:?}"),
    }
}

fn run_delete(key: &str, config: &config::Config) -> Result<()> {
    let store = storage::store_from_config(config)?;
    store.delete(key)?;
    println!("Deleted {key}");
    Ok(())
}

fn run_list(config: &config::Config) -> Result<()> {
    let store = storage::store_from_config(config)?;
    for name in store.list()? {
        println!("{name}");
    }
    Ok(())
}

fn run_keygen() {
    // Print the key alone on stdout so it can be piped; guidance goes to stderr.
    let material = KeyMaterial::generate("keygen");
    println!("{}", material.to_base64());
    eprintln!("Export this as {DEFAULT_ENV_VAR} to use the store.");
}

/// Runs a quick round-trip probe of the encrypted storage path.
fn run_health_check(config: &config::Config) -> Result<()> {
    let store = storage::store_from_config(config)?;
    run_store_health(&store)?;
    println!("Storage: ok");
    Ok(())
}

fn run_store_health<S: SecretStore>(store: &S) -> Result<()> {
    let probe_key = "health-probe";
    let payload = b"ok";
    store.set(probe_key, payload)?;
    let round_trip = store.get(probe_key)?;
    store.delete(probe_key)?;

    if round_trip.as_deref() != Some(payload.as_slice()) {
        color_eyre::eyre::bail!("storage round-trip failed");
    }
    Ok(())
}

fn init_config(config: &config::Config) -> Result<()> {
    let path = config::write_default_if_missing(config)?;
    println!("Config initialized at {}", path.display());
    Ok(())
}

fn read_secret_from_stdin() -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    std::io::stdin().read_to_end(&mut buf)?;
    trim_trailing_newline(&mut buf);
    Ok(buf)
}

/// Drop a single trailing newline (or CRLF) so `echo secret | lockbox set k`
/// stores the secret, not the secret plus a line terminator.
fn trim_trailing_newline(buf: &mut Vec<u8>) {
    if buf.last() == Some(&b'\n') {
        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
    }
}
