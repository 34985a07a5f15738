//! Configuration-surface entry point (spec §6, §4.10).
//!
//! This binary owns no DBI attachment of its own — per spec §1, the real
//! host (Pin, DynamoRIO, Frida, …) is an external C/C++ collaborator with no
//! stable Rust binding in this corpus. What it does own is the `--log`
//! through `--sel` configuration surface: parse it, validate it the same way
//! a concrete host backend's `main` would before constructing
//! `bfi::Engine`, and report the outcome with spec §6's exit codes (0 clean,
//! 1 configuration error). A real backend links `bfi` as a library and calls
//! `Engine::new`/`on_instruction`/`finish` from its own callbacks instead of
//! going through this binary.

use clap::Parser;

use bfi::cli::Args;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let log = args.log.clone();

    match args.into_config() {
        Ok(config) => {
            tracing::info!(%config, "configuration validated");
            let _sink = bfi::Sink::open(log.as_deref())?;
            println!("{config}");
            Ok(())
        }
        Err(err) => {
            eprintln!("bfi: {err:#}");
            std::process::exit(1);
        }
    }
}
