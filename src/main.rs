// Entrypoint for the CLI application.
// - Keeps `main` small: load config, authenticate once, build the store and
//   hand it to the UI loop.
// - An authorization failure ends the process; everything else is reported
//   by the menu and the loop continues.

use anyhow::Context;
use drive_reports::{api::HttpDriveApi, auth, config::Config, store::DriveStore, ui::main_menu};
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    let config = Config::from_env();

    // `RUST_LOG` wins over `DRIVE_LOG`.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let credentials = auth::authenticate(&config.auth()).context("Authorization failed")?;
    let api = HttpDriveApi::new(&config.api_url, credentials)?;
    let store = DriveStore::new(api);

    // Blocks until the user exits.
    main_menu(&store, &config)?;
    Ok(())
}
