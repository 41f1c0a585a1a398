//! HABv4 wire structures: headers, IVT, boot data, Install Key / Authenticate
//! Data commands, SRK public key records and tables.
//!
//! Grounded on `examples/original_source/hab/csf.go`, `hab/srk.go` and
//! `hab/const.go`. Header tags are big-endian; IVT/BootData bodies and the
//! command structs are little-endian, exactly mirroring the Go `binary.Write`
//! calls these are ported from.

use rsa::BigUint;
use rsa::traits::PublicKeyParts;
use sha2::{Digest, Sha256};

use crate::error::HabError;

pub const HAB_VER: u8 = 0x40;
pub const IVT_OFFSET: u32 = 1024;

pub const HAB_KEY_PUBLIC: u8 = 0xe1;

pub const HAB_CMD_INS_KEY_CLR: u8 = 0;
pub const HAB_CMD_INS_KEY_CSF: u8 = 2;
pub const HAB_CMD_INS_KEY_HSH: u8 = 128;

pub const HAB_CMD_AUT_DAT_CLR: u8 = 0x00;

pub const HAB_TAG_IVT: u8 = 0xd1;
pub const HAB_TAG_DCD: u8 = 0xd2;
pub const HAB_TAG_CSF: u8 = 0xd4;
pub const HAB_TAG_CRT: u8 = 0xd7;
pub const HAB_TAG_SIG: u8 = 0xd8;
pub const HAB_TAG_RVT: u8 = 0xdd;

pub const HAB_CMD_INS_KEY: u8 = 0xbe;
pub const HAB_CMD_AUT_DAT: u8 = 0xca;

pub const HAB_PCL_SRK: u8 = 0x03;
pub const HAB_PCL_X509: u8 = 0x09;
pub const HAB_PCL_CMS: u8 = 0xc5;

pub const HAB_ALG_ANY: u8 = 0x00;
pub const HAB_ALG_SHA256: u8 = 0x17;
pub const HAB_ALG_PKCS1: u8 = 0x21;

pub const HAB_ENG_SW: u8 = 0xff;
pub const HAB_ENG_DCP: u8 = 0x1b;

/// Key target/index constants (HABv4 API RM p33).
pub const HAB_KEY_SRK: u8 = 0;
pub const HAB_KEY_CSFK: u8 = 1;

/// A data structure header (tag/len/ver), always big-endian on the wire.
#[derive(Debug, Clone, Copy)]
pub struct Header {
    pub tag: u8,
    pub len: u16,
    pub ver: u8,
}

impl Header {
    pub fn new(tag: u8) -> Self {
        Header { tag, len: 4, ver: HAB_VER }
    }

    pub fn to_bytes(self) -> [u8; 4] {
        let [hi, lo] = self.len.to_be_bytes();
        [self.tag, hi, lo, self.ver]
    }

    pub fn from_bytes(buf: &[u8]) -> Result<Self, HabError> {
        if buf.len() < 4 {
            return Err(HabError::InvalidIvt("header not found".into()));
        }
        Ok(Header {
            tag: buf[0],
            len: u16::from_be_bytes([buf[1], buf[2]]),
            ver: buf[3],
        })
    }
}

/// A tagged command-sequence-file blob: header plus payload, with the
/// header's length kept in sync as data is appended.
#[derive(Debug, Clone)]
pub struct Csf {
    pub header: Header,
    pub data: Vec<u8>,
}

impl Csf {
    pub fn new(tag: u8) -> Self {
        Csf { header: Header::new(tag), data: Vec::new() }
    }

    pub fn set(&mut self, buf: Vec<u8>) {
        self.header.len += buf.len() as u16;
        self.data = buf;
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = self.header.to_bytes().to_vec();
        out.extend_from_slice(&self.data);
        out
    }
}

/// Image Vector Table (p161, IMX6ULLRM): header is big-endian, the rest of
/// the struct is little-endian.
#[derive(Debug, Clone, Copy)]
pub struct Ivt {
    pub header: Header,
    pub entry: u32,
    pub reserved1: u32,
    pub dcd: u32,
    pub boot_data: u32,
    pub self_addr: u32,
    pub csf: u32,
    pub reserved2: u32,
}

impl Ivt {
    pub fn from_bytes(buf: &[u8]) -> Result<Self, HabError> {
        if buf.len() < 32 {
            return Err(HabError::InvalidIvt("buffer too short".into()));
        }
        let header = Header::from_bytes(&buf[0..4])?;
        if header.tag != HAB_TAG_IVT {
            return Err(HabError::InvalidIvt("IVT header not found".into()));
        }
        let u32_at = |off: usize| u32::from_le_bytes(buf[off..off + 4].try_into().unwrap());
        Ok(Ivt {
            header,
            entry: u32_at(4),
            reserved1: u32_at(8),
            dcd: u32_at(12),
            boot_data: u32_at(16),
            self_addr: u32_at(20),
            csf: u32_at(24),
            reserved2: u32_at(28),
        })
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        let mut out = [0u8; 32];
        out[0..4].copy_from_slice(&self.header.to_bytes());
        out[4..8].copy_from_slice(&self.entry.to_le_bytes());
        out[8..12].copy_from_slice(&self.reserved1.to_le_bytes());
        out[12..16].copy_from_slice(&self.dcd.to_le_bytes());
        out[16..20].copy_from_slice(&self.boot_data.to_le_bytes());
        out[20..24].copy_from_slice(&self.self_addr.to_le_bytes());
        out[24..28].copy_from_slice(&self.csf.to_le_bytes());
        out[28..32].copy_from_slice(&self.reserved2.to_le_bytes());
        out
    }
}

/// Boot Data structure (p162, IMX6ULLRM), little-endian, immediately
/// following the IVT's `boot_data` pointer.
#[derive(Debug, Clone, Copy)]
pub struct BootData {
    pub start: u32,
    pub length: u32,
    pub plugin: u32,
}

impl BootData {
    /// Locate and parse the boot data referenced by `ivt` within `imx`.
    pub fn from_image(imx: &[u8], ivt: &Ivt) -> Result<Self, HabError> {
        let off = (ivt.boot_data - ivt.self_addr) as usize;
        if off + 12 > imx.len() {
            return Err(HabError::InvalidIvt(format!(
                "invalid boot data offset ({off}/{})",
                imx.len()
            )));
        }
        let u32_at = |o: usize| u32::from_le_bytes(imx[off + o..off + o + 4].try_into().unwrap());
        Ok(BootData { start: u32_at(0), length: u32_at(4), plugin: u32_at(8) })
    }
}

/// Device Configuration Data. Only the header is modeled here — the
/// assembler only ever needs `header.len` to size the Authenticate-DCD
/// data block (spec §4.8 step 3); the register-init command stream itself
/// passes through untouched.
#[derive(Debug, Clone, Copy)]
pub struct Dcd {
    pub header: Header,
}

impl Dcd {
    /// Locate and parse the DCD header referenced by `ivt` within `imx`.
    pub fn from_image(imx: &[u8], ivt: &Ivt) -> Result<Self, HabError> {
        let off = (ivt.dcd - ivt.self_addr) as usize;
        if off + 4 > imx.len() {
            return Err(HabError::InvalidIvt(format!("invalid DCD offset ({off}/{})", imx.len())));
        }
        let header = Header::from_bytes(&imx[off..off + 4])?;
        if header.tag != HAB_TAG_DCD {
            return Err(HabError::InvalidIvt("DCD header not found".into()));
        }
        Ok(Dcd { header })
    }
}

/// Install Key command (p33, HABv4 API RM), big-endian on the wire.
#[derive(Debug, Clone, Copy)]
pub struct InstallKey {
    pub flg: u8,
    pub pcl: u8,
    pub alg: u8,
    pub src: u8,
    pub tgt: u8,
    pub key_dat: u32,
}

impl InstallKey {
    pub const LEN: u16 = 12;

    pub fn new() -> Self {
        InstallKey { flg: 0, pcl: 0, alg: HAB_ALG_ANY, src: 0, tgt: 0, key_dat: 0 }
    }

    /// `Tag(1) Len(2 BE) Flg(1) Pcl(1) Alg(1) Src(1) Tgt(1) KeyDat(4 BE)`,
    /// no version byte — unlike `CSF`/`Header`, `InstallKey`'s wire struct
    /// has no `Ver` field.
    pub fn to_bytes(self) -> [u8; 12] {
        let mut out = [0u8; 12];
        out[0] = HAB_CMD_INS_KEY;
        out[1..3].copy_from_slice(&Self::LEN.to_be_bytes());
        out[3] = self.flg;
        out[4] = self.pcl;
        out[5] = self.alg;
        out[6] = self.src;
        out[7] = self.tgt;
        out[8..12].copy_from_slice(&self.key_dat.to_be_bytes());
        out
    }
}

impl Default for InstallKey {
    fn default() -> Self {
        Self::new()
    }
}

/// Authenticate Data command (p39, HABv4 API RM), with an optional trailing
/// data block. `Bytes()` in the original truncates to 12 bytes when no data
/// block has been set; this mirrors that with an explicit `Option`.
#[derive(Debug, Clone, Copy)]
pub struct AuthenticateData {
    pub flg: u8,
    pub key: u8,
    pub pcl: u8,
    pub eng: u8,
    pub cfg: u8,
    pub aut_start: u32,
    pub data_block: Option<DataBlock>,
}

#[derive(Debug, Clone, Copy)]
pub struct DataBlock {
    pub start: u32,
    pub bytes: u32,
}

impl AuthenticateData {
    pub fn new() -> Self {
        AuthenticateData {
            flg: HAB_CMD_AUT_DAT_CLR,
            key: 0,
            pcl: 0,
            eng: HAB_ENG_SW,
            cfg: 0,
            aut_start: 0,
            data_block: None,
        }
    }

    pub fn len(self) -> u16 {
        if self.data_block.is_some() { 20 } else { 12 }
    }

    pub fn set_data_block(&mut self, start: u32, bytes: u32) {
        self.data_block = Some(DataBlock { start, bytes });
    }

    /// `Tag(1) Len(2 BE) Flg(1) Key(1) Pcl(1) Eng(1) Cfg(1) AutStart(4 BE)`,
    /// no version byte, followed by the optional 8-byte data block.
    pub fn to_bytes(self) -> Vec<u8> {
        let mut out = vec![0u8; 12];
        out[0] = HAB_CMD_AUT_DAT;
        out[1..3].copy_from_slice(&self.len().to_be_bytes());
        out[3] = self.flg;
        out[4] = self.key;
        out[5] = self.pcl;
        out[6] = self.eng;
        out[7] = self.cfg;
        out[8..12].copy_from_slice(&self.aut_start.to_be_bytes());
        if let Some(blk) = self.data_block {
            out.extend_from_slice(&blk.start.to_be_bytes());
            out.extend_from_slice(&blk.bytes.to_be_bytes());
        }
        out
    }
}

impl Default for AuthenticateData {
    fn default() -> Self {
        Self::new()
    }
}

/// An SRK public key record (p37, HABv4 API RM): an RSA modulus/exponent
/// pair wrapped in the fixed public-key tag framing.
#[derive(Debug, Clone)]
pub struct PublicKey {
    pub modulus: Vec<u8>,
    pub exponent: Vec<u8>,
}

impl PublicKey {
    pub fn from_rsa(key: &rsa::RsaPublicKey) -> Result<Self, HabError> {
        let modulus = key.n().to_bytes_be();
        let exponent = key.e().to_bytes_be();
        if modulus.len() > 0xffff {
            return Err(HabError::InvalidPublicKey("unexpected modulus size".into()));
        }
        if exponent.len() > 3 {
            return Err(HabError::InvalidPublicKey("unexpected exponent size".into()));
        }
        Ok(PublicKey { modulus, exponent })
    }

    /// `Tag1(1) KeyLen(2) Tag2(1) reserved(2) Tag3(2) ModLen(2) ExpLen(2)` —
    /// 12 fixed header bytes (`Tag3` is a `u16` field on the wire despite
    /// only ever holding the single-byte constant `HAB_CMD_INS_KEY_HSH`).
    fn key_len(&self) -> u16 {
        12 + self.modulus.len() as u16 + self.exponent.len() as u16
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.key_len() as usize);
        out.push(HAB_KEY_PUBLIC);
        out.extend_from_slice(&self.key_len().to_be_bytes());
        out.push(HAB_ALG_PKCS1);
        out.extend_from_slice(&0u16.to_be_bytes());
        out.extend_from_slice(&(HAB_CMD_INS_KEY_HSH as u16).to_be_bytes());
        out.extend_from_slice(&(self.modulus.len() as u16).to_be_bytes());
        out.extend_from_slice(&(self.exponent.len() as u16).to_be_bytes());
        out.extend_from_slice(&self.modulus);
        out.extend_from_slice(&self.exponent);
        out
    }

    pub fn hash(&self) -> [u8; 32] {
        Sha256::digest(self.to_bytes()).into()
    }
}

/// A Super Root Key table (p25, HABv4 API RM): up to four SRK public keys,
/// hashed together to produce the value that gets fused into `SRK_HASH`.
#[derive(Debug, Clone, Default)]
pub struct SrkTable {
    pub keys: Vec<PublicKey>,
}

impl SrkTable {
    pub const MAX_KEYS: usize = 4;

    pub fn new() -> Self {
        SrkTable { keys: Vec::new() }
    }

    pub fn add_key(&mut self, key: &rsa::RsaPublicKey) -> Result<(), HabError> {
        if self.keys.len() >= Self::MAX_KEYS {
            return Err(HabError::TooManySrks);
        }
        self.keys.push(PublicKey::from_rsa(key)?);
        Ok(())
    }

    fn len(&self) -> u16 {
        4 + self.keys.iter().map(|k| k.key_len()).sum::<u16>()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.len() as usize);
        out.push(HAB_TAG_CRT);
        out.extend_from_slice(&self.len().to_be_bytes());
        out.push(HAB_VER);
        for key in &self.keys {
            out.extend_from_slice(&key.to_bytes());
        }
        out
    }

    pub fn hash(&self) -> Result<[u8; 32], HabError> {
        if self.keys.is_empty() {
            return Err(HabError::EmptySrkTable);
        }
        if self.keys.len() > Self::MAX_KEYS {
            return Err(HabError::TooManySrks);
        }
        let mut concatenated = Vec::with_capacity(32 * self.keys.len());
        for key in &self.keys {
            concatenated.extend_from_slice(&key.hash());
        }
        Ok(Sha256::digest(concatenated).into())
    }
}
