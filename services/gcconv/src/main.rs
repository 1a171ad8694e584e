//! GCode Stream Converter CLI (`gcconv`)

use clap::Parser;
use gcconv::cli::{run, Cli};

fn main() -> anyhow::Result<()> {
    run(Cli::parse())
}
