//! Sign a message with a subset of the stored party shares

use anyhow::Result;
use clap::Parser;
use mpc_party::{init_tracing, parse_party_indexes, DataArgs};
use tracing::{info, Level};

/// Run threshold signing over a participant set
#[derive(Parser)]
#[command(name = "mpc-sign")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    data: DataArgs,

    /// Participating party indexes (comma-separated)
    #[arg(short, long, default_value = "0,1,2,3")]
    parties: String,

    /// Message to sign
    #[arg(short, long, default_value = "Hello")]
    message: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing(Level::ERROR);
    let cli = Cli::parse();

    let parties = parse_party_indexes(&cli.parties)?;
    let config = cli.data.config()?;
    let store = cli.data.store();

    let signature =
        mpc_core::run_signing(&config, &store, cli.message.as_bytes(), &parties).await?;

    info!(
        participants = ?parties,
        recovery_id = signature.recovery_id,
        der = hex::encode(signature.to_der()?),
        "Signature generated"
    );

    println!("{}", signature.to_hex());

    Ok(())
}
