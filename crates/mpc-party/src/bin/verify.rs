//! Verify a signature against the stored group key

use anyhow::Result;
use clap::Parser;
use mpc_party::{init_tracing, DataArgs};
use tracing::Level;

/// Check an `r || s` hex signature over a message
#[derive(Parser)]
#[command(name = "mpc-verify")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    data: DataArgs,

    /// Signature to check (hex of r || s)
    #[arg(short, long)]
    signature: String,

    /// Message that was signed
    #[arg(short, long)]
    message: String,
}

fn main() -> Result<()> {
    init_tracing(Level::WARN);
    let cli = Cli::parse();

    let store = cli.data.store();
    if mpc_core::verify_signature(&store, cli.message.as_bytes(), &cli.signature)? {
        println!("Signature is valid");
    } else {
        println!("Signature is invalid");
    }

    Ok(())
}
