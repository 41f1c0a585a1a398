#![allow(unused)]

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Grounded on the teacher's own `src/config.rs` shape (serde + toml,
/// a certificate-chain list); fields generalized from bootloader flash
/// layout to fusemap lookup and HAB key material.
#[derive(Deserialize, Debug)]
pub struct Config {
    /// Directory searched for `<processor>.yaml` fusemap documents.
    pub fusemap_path: PathBuf,

    /// Path of the NVMEM character device. Empty runs in simulation mode
    /// (`OtpDevice::blow` returns the encoded bytes without touching any
    /// device; `OtpDevice::read` still requires a real path).
    #[serde(default)]
    pub otp_path: PathBuf,

    /// SRK chains as used by this project: each chain is the certificate
    /// set fused into one `SRK_HASH` slot, the last entry conventionally
    /// being the leaf signing certificate used for CSF/IMG authentication.
    #[serde(default)]
    pub certificates: Vec<CertificateChain>,
}

#[derive(Deserialize, Debug)]
pub struct CertificateChain(pub Vec<Certificate>);

#[derive(Deserialize, Debug, Clone)]
pub struct Certificate {
    /// Path of the file containing the public-facing certificate (PEM).
    pub path: PathBuf,

    /// When set, the certificate can be generated and the private key can
    /// be directly used to generate HAB signatures.
    pub prototype: Option<CertificatePrototype>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct CertificatePrototype {
    /// Key type to generate.
    pub key_type: KeyType,

    /// Path of the file containing the private key (PEM), used to sign
    /// CSF/IMG data blocks.
    pub key_path: PathBuf,
}

#[derive(Deserialize, Debug, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum KeyType {
    Rsa2048,
    Rsa3072,
    Rsa4096,
}

impl KeyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyType::Rsa2048 => "rsa2048",
            KeyType::Rsa3072 => "rsa3072",
            KeyType::Rsa4096 => "rsa4096",
        }
    }

    /// Modulus size in bits, as `CertFactory`/`rsa::RsaPrivateKey::new` want it.
    pub fn bits(self) -> usize {
        match self {
            KeyType::Rsa2048 => 2048,
            KeyType::Rsa3072 => 3072,
            KeyType::Rsa4096 => 4096,
        }
    }
}

impl Config {
    pub fn read(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        Ok(toml::from_str::<Config>(&std::fs::read_to_string(path)?)?)
    }
}
