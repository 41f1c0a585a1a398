//! Structured error taxonomy for the fusemap/OTP core and the HAB subsystem.
//!
//! The CLI layer (`src/commands/*.rs`, `src/main.rs`) keeps using `anyhow`
//! the way the rest of this crate's ancestry does; these types exist so
//! that a caller embedding the library can match on the failure kind
//! instead of parsing strings.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum FuseError {
    #[error("missing reference")]
    MissingReference,

    #[error("missing driver")]
    MissingDriver,

    #[error("unsupported driver {0}")]
    UnsupportedDriver(String),

    #[error("register {0} word {1} cannot exceed bank size {2}")]
    WordOutOfRange(String, u32, u32),

    #[error("fuse {0} offset {1} cannot exceed register length")]
    OffsetOutOfRange(String, u32),

    #[error("fuse {0} length {1} cannot exceed 512")]
    FuseTooLong(String, u32),

    #[error("register/fuse names must be unique, double entry for {0}")]
    DuplicateName(String),

    #[error("register read/write address must be unique, double entry for {address:#x} ({name})")]
    DuplicateAddress { address: u32, name: String },

    #[error("invalid gap register ({0})")]
    InvalidGapRegister(String),

    #[error("invalid gap, missing operation ({0})")]
    MissingOperation(String),

    #[error("invalid gap, missing length ({0})")]
    MissingLength(String),

    #[error("could not find any register/fuse named {0}")]
    NotFound(String),

    #[error("fusemap has not been validated yet")]
    NotValidated,

    #[error("requested reference {requested} does not match document reference {found}")]
    InvalidReference { requested: String, found: String },

    #[error("null value")]
    NullValue,

    #[error("value bit size {0} exceeds {1}")]
    ValueTooWide(u32, u32),

    #[error("driver does not support blow operation")]
    DriverReadOnly,

    #[error("empty device path")]
    EmptyDevicePath,

    #[error("I/O error at address {address:#x}: {source}")]
    Io {
        address: u32,
        #[source]
        source: std::io::Error,
    },

    #[error("fusemap document parse error: {0}")]
    Parse(#[from] serde_yml::Error),
}

#[derive(Error, Debug)]
pub enum HabError {
    #[error("invalid IVT: {0}")]
    InvalidIvt(String),

    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("SRK table cannot hold more than 4 keys")]
    TooManySrks,

    #[error("SRK table has no keys to hash")]
    EmptySrkTable,

    #[error("assembled CSF ({actual} bytes) exceeds its padded slot ({limit} bytes)")]
    CsfTooLarge { actual: usize, limit: usize },

    #[error("RSA error: {0}")]
    Rsa(#[from] rsa::Error),

    #[error("certificate generation error: {0}")]
    Cert(#[from] rcgen::Error),

    #[error("PKCS#8 error: {0}")]
    Pkcs8(String),

    #[error("certificate parse error: {0}")]
    CertParse(String),
}
