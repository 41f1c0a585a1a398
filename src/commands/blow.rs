use anyhow::Context;

use crate::FusemapSelector;
use crate::config::Config;
use crate::fusemap::FuseMap;
use crate::otp::OtpDevice;

pub fn process(config: &Config, selector: FusemapSelector, value_hex: &str) -> anyhow::Result<()> {
    let fusemap = FuseMap::find(&config.fusemap_path, &selector.processor, &selector.reference)
        .with_context(|| format!("Could not load fusemap for {}", selector.processor))?;

    let value = parse_hex(value_hex).with_context(|| format!("Invalid hex value {value_hex}"))?;

    log::warn!("Blowing {} — this operation is irreversible", selector.name);

    let access = OtpDevice::blow(&config.otp_path, &fusemap, &selector.name, &value)
        .with_context(|| format!("Could not blow {}", selector.name))?;

    log::info!("Wrote {} bytes to 0x{:08x}", access.bytes.len(), access.address);

    Ok(())
}

/// Parse an optionally `0x`-prefixed, possibly odd-length hex string into
/// big-endian bytes (CLI convenience; the core encoder takes bytes).
fn parse_hex(input: &str) -> anyhow::Result<Vec<u8>> {
    let trimmed = input.strip_prefix("0x").unwrap_or(input);
    let padded = if trimmed.len() % 2 == 1 {
        format!("0{trimmed}")
    } else {
        trimmed.to_string()
    };

    padded
        .as_bytes()
        .chunks(2)
        .map(|pair| {
            let digits = std::str::from_utf8(pair).expect("ASCII chunk");
            u8::from_str_radix(digits, 16).map_err(anyhow::Error::from)
        })
        .collect()
}
