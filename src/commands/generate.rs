use std::fs;

use anyhow::Context;

use crate::GenerateArguments;
use crate::config::Config;
use crate::hab::CertFactory;

pub fn process(config: &Config, args: GenerateArguments) -> anyhow::Result<()> {
    let chain = config
        .certificates
        .get(args.chain)
        .ok_or_else(|| anyhow::anyhow!("Certificate chain {} does not exist", args.chain))?;

    let key_type = chain
        .0
        .first()
        .and_then(|certificate| certificate.prototype.as_ref())
        .map(|prototype| prototype.key_type)
        .ok_or_else(|| anyhow::anyhow!("Certificate chain {} has no prototype configured", args.chain))?;

    fs::create_dir_all(&args.output_path)
        .with_context(|| format!("Could not create {}", args.output_path.display()))?;

    log::info!("Generating SRK certificate authority ({} bits)", key_type.bits());
    let ca = CertFactory::new_ca(key_type.bits(), args.validity_days)?;
    write_pair(&args.output_path, "ca", &ca.generated.certificate_pem, &ca.generated.private_key_pem)?;

    for tag in ["CSF", "IMG"] {
        log::info!("Generating {tag} leaf certificate");
        let cert = CertFactory::new_cert(tag, key_type.bits(), args.validity_days, &ca)?;
        write_pair(
            &args.output_path,
            &tag.to_lowercase(),
            &cert.certificate_pem,
            &cert.private_key_pem,
        )?;
    }

    log::info!("Certificates written to {}", args.output_path.display());

    Ok(())
}

fn write_pair(dir: &std::path::Path, tag: &str, certificate_pem: &str, private_key_pem: &str) -> anyhow::Result<()> {
    fs::write(dir.join(format!("{tag}.pem")), certificate_pem)
        .with_context(|| format!("Could not write {tag}.pem"))?;
    fs::write(dir.join(format!("{tag}.key")), private_key_pem).with_context(|| format!("Could not write {tag}.key"))
}
