//! Run distributed key generation for every configured party

use anyhow::Result;
use clap::Parser;
use mpc_party::{init_tracing, DataArgs};
use tracing::{warn, Level};

/// Generate a threshold key and store one share per party
#[derive(Parser)]
#[command(name = "mpc-keygen")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    data: DataArgs,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing(Level::INFO);
    let cli = Cli::parse();

    let config = cli.data.config()?;
    let store = cli.data.store();

    let report = mpc_core::run_keygen(&config, &store).await?;
    if !report.unsaved.is_empty() {
        warn!(unsaved = ?report.unsaved, "Some party data was not saved");
    }

    println!("Public Key: {}", report.public_key_hex());
    println!("  X: {}", hex::encode(report.x));
    println!("  Y: {}", hex::encode(report.y));

    Ok(())
}

