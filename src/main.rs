//! docshift - MongoDB database migration tool
//!
//! # Usage
//!
//! ```bash
//! # Copy every collection of one database into another
//! docshift migrate --source-uri mongodb://old:27017/shop --target-uri mongodb://new:27017/shop
//!
//! # Inventory both sides before a run
//! docshift inventory --source prod --target staging
//!
//! # Spot-check one collection, case-insensitively
//! docshift verify themecolor --target staging
//! ```

use tracing_subscriber::EnvFilter;

use docshift::cli::{CliInterface, RunStatus};
use docshift::error::Result;

/// Application entry point
#[tokio::main]
async fn main() {
    match run().await {
        Ok(status) => std::process::exit(status.exit_code()),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

/// Main application logic
///
/// 1. Parse command-line arguments and load configuration
/// 2. Initialize logging
/// 3. Handle local subcommands or run a store command
async fn run() -> Result<RunStatus> {
    let cli = CliInterface::new()?;

    initialize_logging(&cli);

    if cli.handle_subcommand()? {
        return Ok(RunStatus::Success);
    }

    cli.execute(cli.connection_manager()).await
}

/// Initialize logging system
///
/// `RUST_LOG` wins when set; otherwise the level comes from the config file
/// adjusted by `-v`, `--vv` and `-q`.
fn initialize_logging(cli: &CliInterface) {
    let level = cli
        .config()
        .logging
        .level
        .to_tracing_level()
        .as_str()
        .to_lowercase();
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("docshift={level},warn")));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if cli.config().logging.timestamps {
        subscriber.init();
    } else {
        subscriber.without_time().init();
    }
}
