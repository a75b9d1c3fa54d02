use anyhow::Context;
use clap::Parser;

use keyholderd::config::Cli;
use keyholderd::{logging, mlock, server};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    logging::init(cli.debug).context("failed to initialize logging")?;
    mlock::lock_all_memory();

    server::run(&cli).await.context("keyholderd exited with an error")?;
    Ok(())
}
