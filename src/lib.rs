use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

pub use crate::config::Config;

pub mod codec;
pub mod commands;
mod config;
pub mod error;
pub mod fusemap;
pub mod hab;
pub mod otp;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE", default_value = "./config.toml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub commands: Option<Commands>,
}

#[derive(Args, Debug, Clone)]
pub struct FusemapSelector {
    /// Processor identifier, e.g. `IMX53` (matches `<processor>.yaml` in
    /// the configured fusemap directory)
    #[arg(long)]
    pub processor: String,

    /// Reference-manual revision the named fusemap document must declare
    #[arg(long)]
    pub reference: String,

    /// Register or fuse name to operate on
    #[arg(long)]
    pub name: String,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Read a register or fuse's current value from the NVMEM device
    Read(FusemapSelector),
    /// Blow (write) a fuse value. Irreversible.
    Blow {
        #[command(flatten)]
        selector: FusemapSelector,

        /// Big-endian hex value to write, e.g. `0x0f` or `0faabb`
        #[arg(long, value_name = "HEX")]
        value: String,
    },
    /// Render a register's bit-field layout as a box-drawing diagram
    Map {
        #[command(flatten)]
        selector: FusemapSelector,

        /// Also read the device and show the fuse's current bit values
        #[arg(long)]
        show_value: bool,
    },
    /// Generate an SRK certificate authority plus CSF/IMG leaf certificates
    Generate(GenerateArguments),
    /// Assemble a signed HABv4 boot image (SRK table, CSF, detached signatures)
    Sign(SignArguments),
}

#[derive(Args, Debug, Clone)]
pub struct GenerateArguments {
    /// Which SRK chain (index into `config.certificates`) to (re)generate
    #[arg(long, default_value_t = 0)]
    pub chain: usize,

    /// Certificate validity, in days, starting now
    #[arg(long, default_value_t = 3650)]
    pub validity_days: i64,

    /// Directory certificates and private keys are written to
    #[arg(long, value_name = "DIR")]
    pub output_path: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct SignArguments {
    /// Path to the unsigned boot image (must carry a valid IVT/BootData)
    #[arg(short, long, value_name = "INPUT_FILE")]
    pub input_path: PathBuf,

    /// Output file path for the assembled CSF (appended at the image's
    /// reserved CSF slot) [default: <INPUT_FILE>.csf.bin]
    #[arg(short, long, value_name = "OUTPUT_FILE")]
    pub output_path: Option<PathBuf>,

    /// Which SRK chain (index into `config.certificates`) supplies the
    /// `SRK_HASH` table
    #[arg(long, default_value_t = 0)]
    pub chain: usize,

    /// 1-based SRK table slot the signing key occupies
    #[arg(long, default_value_t = 1)]
    pub srk_index: u8,

    /// PEM certificate of the CSF signing key
    #[arg(long, value_name = "FILE")]
    pub csf_cert_path: PathBuf,

    /// PEM private key matching `csf_cert_path`
    #[arg(long, value_name = "FILE")]
    pub csf_key_path: PathBuf,

    /// PEM certificate of the IMG signing key
    #[arg(long, value_name = "FILE")]
    pub img_cert_path: PathBuf,

    /// PEM private key matching `img_cert_path`
    #[arg(long, value_name = "FILE")]
    pub img_key_path: PathBuf,

    /// Authenticate the image as a serial-download (SDP) artifact,
    /// additionally authenticating its DCD
    #[arg(long)]
    pub sdp: bool,
}

impl SignArguments {
    pub fn output_path_with_default(&self) -> PathBuf {
        self.output_path
            .clone()
            .unwrap_or_else(|| self.input_path.clone().with_extension("csf.bin"))
    }
}
