extern crate log;
extern crate pretty_env_logger;

use anyhow::Context;
use clap::Parser;
use imx_fuseloader::{Cli, Config, commands};

fn main() -> anyhow::Result<()> {
    pretty_env_logger::init();

    let cli = Cli::parse();

    let config = Config::read(&cli.config)
        .with_context(|| format!("Tried to open --config {}", cli.config.display()))?;

    if let Some(command) = cli.commands {
        commands::process(&config, command)
    } else {
        eprintln!("Done nothing");
        Ok(())
    }
}
