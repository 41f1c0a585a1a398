use std::fs;

use anyhow::Context;
use rsa::RsaPublicKey;
use rsa::pkcs8::DecodePublicKey;

use crate::SignArguments;
use crate::config::Config;
use crate::hab::{AssembleInput, HabAssembler, LocalRsaSigner, SrkTable};

pub fn process(config: &Config, args: SignArguments) -> anyhow::Result<()> {
    let chain = config
        .certificates
        .get(args.chain)
        .ok_or_else(|| anyhow::anyhow!("Certificate chain {} does not exist", args.chain))?;

    log::info!("Building SRK table from certificate chain {}", args.chain);
    let mut srk_table = SrkTable::new();
    for certificate in &chain.0 {
        let public_key = read_certificate_public_key(&certificate.path)
            .with_context(|| format!("Could not read SRK certificate {}", certificate.path.display()))?;
        srk_table.add_key(&public_key)?;
    }
    let srk_bytes = srk_table.to_bytes();

    let csf_certificate_der = read_certificate_der(&args.csf_cert_path)
        .with_context(|| format!("Could not read {}", args.csf_cert_path.display()))?;
    let img_certificate_der = read_certificate_der(&args.img_cert_path)
        .with_context(|| format!("Could not read {}", args.img_cert_path.display()))?;

    let csf_signer = LocalRsaSigner::from_pem(
        &fs::read_to_string(&args.csf_key_path)
            .with_context(|| format!("Could not read {}", args.csf_key_path.display()))?,
    )?;
    let img_signer = LocalRsaSigner::from_pem(
        &fs::read_to_string(&args.img_key_path)
            .with_context(|| format!("Could not read {}", args.img_key_path.display()))?,
    )?;

    let image =
        fs::read(&args.input_path).with_context(|| format!("Could not read {}", args.input_path.display()))?;

    log::info!("Assembling CSF for {}", args.input_path.display());
    let csf = HabAssembler::assemble(&AssembleInput {
        image: &image,
        srk_table: &srk_bytes,
        srk_index: args.srk_index,
        engine: 0xff, // HAB_ENG_SW — software authentication, no DCP
        csf_certificate_der: &csf_certificate_der,
        img_certificate_der: &img_certificate_der,
        csf_signer: &csf_signer,
        img_signer: &img_signer,
        sdp: args.sdp,
    })
    .context("Could not assemble CSF")?;

    let output_path = args.output_path_with_default();
    let mut signed = image;
    signed.extend_from_slice(&csf);
    fs::write(&output_path, &signed).with_context(|| format!("Could not write {}", output_path.display()))?;

    log::info!("Wrote signed image to {}", output_path.display());

    Ok(())
}

fn read_certificate_der(path: &std::path::Path) -> anyhow::Result<Vec<u8>> {
    let text = fs::read_to_string(path)?;
    Ok(pem::parse(text)?.contents().to_vec())
}

fn read_certificate_public_key(path: &std::path::Path) -> anyhow::Result<RsaPublicKey> {
    let der = read_certificate_der(path)?;
    let (_, certificate) = x509_parser::certificate::X509Certificate::from_der(&der)
        .map_err(|error| anyhow::anyhow!("Could not parse certificate {}: {error}", path.display()))?;
    Ok(RsaPublicKey::from_public_key_der(certificate.public_key().raw)?)
}
