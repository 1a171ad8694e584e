//! Serial Command Engine CLI (`serialsrv`)

use clap::Parser;
use serialsrv::cli::{run, Cli};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    run(Cli::parse()).await
}
