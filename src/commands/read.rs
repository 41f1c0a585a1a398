use anyhow::Context;

use crate::FusemapSelector;
use crate::config::Config;
use crate::fusemap::FuseMap;
use crate::otp::OtpDevice;

pub fn process(config: &Config, selector: FusemapSelector) -> anyhow::Result<()> {
    let fusemap = FuseMap::find(&config.fusemap_path, &selector.processor, &selector.reference)
        .with_context(|| format!("Could not load fusemap for {}", selector.processor))?;

    let access = OtpDevice::read(&config.otp_path, &fusemap, &selector.name)
        .with_context(|| format!("Could not read {}", selector.name))?;

    log::info!(
        "{} @ 0x{:08x} (+{} bits, width {} bits) = 0x{}",
        selector.name,
        access.address,
        access.offset,
        access.bit_length,
        access.bytes.iter().map(|b| format!("{b:02x}")).collect::<String>()
    );

    Ok(())
}
