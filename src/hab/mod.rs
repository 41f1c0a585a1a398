//! HABv4 artifact builder: SRK table, IVT/BootData parsing, CSF assembly
//! and detached PKCS#7 signing (spec §4.6–4.9).

pub mod assembler;
pub mod certs;
pub mod signer;
pub mod structs;

pub use assembler::{AssembleInput, HabAssembler};
pub use certs::{CertFactory, GeneratedCert};
pub use signer::{HabSigner, LocalRsaSigner, Pkcs7SignedData};
pub use structs::{AuthenticateData, BootData, Csf, Dcd, Header, InstallKey, Ivt, PublicKey, SrkTable};
