//! Self-signed SRK CA generation and CSF/IMG leaf certificate generation
//! with HAB-expected subject strings (spec §4.9).
//!
//! Grounded on `examples/original_source/hab/crypto.go`'s `NewCA()` /
//! `NewCertificate()`. The teacher's own certificate generation
//! (`src/processors/certificates.rs`) shells out to an external
//! `nxpcrypto` binary, which doesn't fit a self-contained `CertFactory`;
//! `rcgen` is adopted from
//! `examples/other_examples/manifests/biandratti-huginn-proxy/Cargo.toml`
//! as the in-process certificate-generation crate, with RSA keypairs
//! supplied by the teacher's own `rsa` dependency (rcgen cannot generate
//! RSA keys itself, only sign with an externally-generated one).

use rand::rngs::OsRng;
use rcgen::{
    BasicConstraints, CertificateParams, DistinguishedName, DnType, Issuer, IsCa, KeyPair, KeyUsagePurpose,
    SerialNumber,
};
use rsa::RsaPrivateKey;
use rsa::pkcs8::EncodePrivateKey;
use time::{Duration, OffsetDateTime};

use crate::error::HabError;

/// A freshly minted RSA keypair plus the certificate built around it.
pub struct GeneratedCert {
    pub private_key_pem: String,
    pub certificate_pem: String,
    pub certificate_der: Vec<u8>,
}

/// A self-signed CA, kept alive so leaf certificates can be issued under
/// it via `CertFactory::new_cert`.
pub struct CertificateAuthority {
    pub generated: GeneratedCert,
    params: CertificateParams,
    key_pair: KeyPair,
}

pub struct CertFactory;

impl CertFactory {
    /// Generate an RSA key of `key_length_bits` and self-sign a CA
    /// certificate over it: `CN = SRK_sha256_<key_length_bits>`, basic
    /// constraints CA=true, key usage certSign, valid for
    /// `validity_days` from now.
    pub fn new_ca(key_length_bits: usize, validity_days: i64) -> Result<CertificateAuthority, HabError> {
        let subject = format!("SRK_sha256_{key_length_bits}");
        let (key_pair, private_key_pem) = generate_rsa_key_pair(key_length_bits)?;

        let mut params = CertificateParams::new(Vec::<String>::new())?;
        params.distinguished_name = common_name(&subject);
        params.not_before = OffsetDateTime::now_utc();
        params.not_after = params.not_before + Duration::days(validity_days);
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages = vec![KeyUsagePurpose::KeyCertSign];
        // HAB expects a serial number of zero on every certificate it
        // validates, SRK CA included.
        params.serial_number = Some(SerialNumber::from(vec![0u8]));

        let cert = params.clone().self_signed(&key_pair)?;
        let certificate_pem = cert.pem();
        let certificate_der = cert.der().to_vec();

        Ok(CertificateAuthority {
            generated: GeneratedCert {
                private_key_pem,
                certificate_pem,
                certificate_der,
            },
            params,
            key_pair,
        })
    }

    /// Generate an RSA key of `key_length_bits` and a leaf certificate
    /// signed by `parent`: `CN = <tag>_sha256_<key_length_bits>`, serial
    /// number 0 (HAB expects this), valid for `validity_days` from now.
    /// `tag` is conventionally `"CSF"` or `"IMG"`.
    pub fn new_cert(
        tag: &str,
        key_length_bits: usize,
        validity_days: i64,
        parent: &CertificateAuthority,
    ) -> Result<GeneratedCert, HabError> {
        let subject = format!("{tag}_sha256_{key_length_bits}");
        let (key_pair, private_key_pem) = generate_rsa_key_pair(key_length_bits)?;

        let mut params = CertificateParams::new(Vec::<String>::new())?;
        params.distinguished_name = common_name(&subject);
        params.not_before = OffsetDateTime::now_utc();
        params.not_after = params.not_before + Duration::days(validity_days);
        params.is_ca = IsCa::NoCa;
        params.key_usages = vec![KeyUsagePurpose::DigitalSignature];
        params.serial_number = Some(SerialNumber::from(vec![0u8]));

        let issuer = Issuer::new(&parent.params, &parent.key_pair);
        let cert = params.signed_by(&key_pair, &issuer)?;

        Ok(GeneratedCert {
            private_key_pem,
            certificate_pem: cert.pem(),
            certificate_der: cert.der().to_vec(),
        })
    }
}

fn common_name(subject: &str) -> DistinguishedName {
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, subject);
    dn
}

fn generate_rsa_key_pair(key_length_bits: usize) -> Result<(KeyPair, String), HabError> {
    let mut rng = OsRng;
    let private_key = RsaPrivateKey::new(&mut rng, key_length_bits)?;
    let pkcs8_pem = private_key
        .to_pkcs8_pem(Default::default())
        .map_err(|e| HabError::Pkcs8(e.to_string()))?;
    let key_pair = KeyPair::from_pem_and_sign_algo(&pkcs8_pem, &rcgen::PKCS_RSA_SHA256)?;
    Ok((key_pair, pkcs8_pem.to_string()))
}
