mod blow;
mod generate;
mod map;
mod read;
mod sign;

use crate::{Commands, config::Config};

pub fn process(config: &Config, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Read(selector) => read::process(config, selector),
        Commands::Blow { selector, value } => blow::process(config, selector, &value),
        Commands::Map { selector, show_value } => map::process(config, selector, show_value),
        Commands::Generate(args) => generate::process(config, args),
        Commands::Sign(args) => sign::process(config, args),
    }
}
