use anyhow::Context;

use crate::FusemapSelector;
use crate::config::Config;
use crate::fusemap::{FuseMap, Mapping};
use crate::otp::OtpDevice;

pub fn process(config: &Config, selector: FusemapSelector, show_value: bool) -> anyhow::Result<()> {
    let fusemap = FuseMap::find(&config.fusemap_path, &selector.processor, &selector.reference)
        .with_context(|| format!("Could not load fusemap for {}", selector.processor))?;

    let mapping = fusemap.find_name(&selector.name)?;
    let register = match mapping {
        Mapping::Register(register) => register,
        Mapping::Fuse(fuse) => &fusemap.registers[&fuse.register],
    };

    let value = if show_value {
        Some(OtpDevice::read(&config.otp_path, &fusemap, &register.name)?.bytes)
    } else {
        None
    };

    println!("{}", register.bit_map(value.as_deref()));

    Ok(())
}
