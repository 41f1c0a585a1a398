//! Declarative description of an SoC's One-Time-Programmable (OTP) layout:
//! banks, words, registers, named bit-fields, addressing gaps and driver
//! word size, with validation, name lookup and address resolution.
//!
//! Grounded on `examples/original_source/fusemap/fusemap.go`,
//! `fusemap/driver.go`, `fusemap/yaml.go` and `fusemap/overlay_test.go`.

mod pretty;
mod sort;

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::FuseError;

/// The NVMEM driver a fusemap targets. Only two drivers exist in the wild;
/// anything else is rejected at validation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Driver {
    /// `nvmem-imx-iim`: 1-byte words, 32-word banks.
    ImxIim,
    /// `nvmem-imx-ocotp`: 4-byte words, 8-word banks.
    ImxOcotp,
}

impl Driver {
    fn parse(name: &str) -> Result<Self, FuseError> {
        match name {
            "" => Err(FuseError::MissingDriver),
            "nvmem-imx-iim" => Ok(Driver::ImxIim),
            "nvmem-imx-ocotp" => Ok(Driver::ImxOcotp),
            other => Err(FuseError::UnsupportedDriver(other.to_string())),
        }
    }

    /// Bytes per word, mandated by the driver.
    pub fn word_size(self) -> u32 {
        match self {
            Driver::ImxIim => 1,
            Driver::ImxOcotp => 4,
        }
    }

    /// Words per bank, mandated by the driver. The YAML-declared
    /// `bank_size` must agree with this (spec §9's canonical resolution of
    /// the driver-parameter Open Question).
    pub fn bank_size_constant(self) -> u32 {
        match self {
            Driver::ImxIim => 32,
            Driver::ImxOcotp => 8,
        }
    }

    /// Whether this driver's device accepts writes at all.
    pub fn writable(self) -> bool {
        matches!(self, Driver::ImxOcotp)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Gap {
    #[serde(default)]
    pub read: bool,
    #[serde(default)]
    pub write: bool,
    #[serde(rename = "len", default)]
    pub length: u32,
}

#[derive(Debug, Clone, Deserialize)]
struct RawFuse {
    offset: u32,
    #[serde(rename = "len")]
    length: u32,
}

#[derive(Debug, Clone, Deserialize)]
struct RawRegister {
    bank: u32,
    word: u32,
    #[serde(default)]
    fuses: HashMap<String, RawFuse>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawFuseMap {
    processor: String,
    reference: String,
    driver: String,
    bank_size: u32,
    #[serde(default)]
    gaps: HashMap<String, Gap>,
    #[serde(default)]
    registers: HashMap<String, RawRegister>,
}

/// A named bit-field within a register.
#[derive(Debug, Clone)]
pub struct Fuse {
    pub name: String,
    pub offset: u32,
    pub length: u32,
    pub register: String,
}

/// A word-sized unit of OTP.
#[derive(Debug, Clone)]
pub struct Register {
    pub name: String,
    pub bank: u32,
    pub word: u32,
    pub read_address: u32,
    pub write_address: u32,
    /// Register width in bits (`8 * word_size`).
    pub length: u32,
    pub fuses: HashMap<String, Fuse>,
}

impl Register {
    pub fn fuses_by_offset(&self) -> Vec<&Fuse> {
        sort::fuses_by_offset(self.fuses.values().collect())
    }
}

/// A resolved fusemap lookup result: either a whole register or one of its
/// named bit-fields.
#[derive(Debug, Clone, Copy)]
pub enum Mapping<'a> {
    Register(&'a Register),
    Fuse(&'a Fuse),
}

impl<'a> Mapping<'a> {
    /// Read/write addressing parameters for this mapping: `(address,
    /// bit_offset, bit_length)`, where `address` is the register's
    /// read-side or write-side address as selected by the caller.
    pub fn read_addressing(&self, fusemap: &FuseMap) -> (u32, u32, u32) {
        match self {
            Mapping::Register(reg) => (reg.read_address, 0, 8 * fusemap.word_size),
            Mapping::Fuse(fuse) => {
                let reg = &fusemap.registers[&fuse.register];
                (reg.read_address, fuse.offset, fuse.length)
            }
        }
    }

    pub fn write_addressing(&self, fusemap: &FuseMap) -> (u32, u32, u32) {
        match self {
            Mapping::Register(reg) => (reg.write_address, 0, 8 * fusemap.word_size),
            Mapping::Fuse(fuse) => {
                let reg = &fusemap.registers[&fuse.register];
                (reg.write_address, fuse.offset, fuse.length)
            }
        }
    }
}

/// A named collection describing one SoC/reference-manual pair's OTP
/// layout.
#[derive(Debug, Clone)]
pub struct FuseMap {
    pub processor: String,
    pub reference: String,
    pub driver: Driver,
    pub word_size: u32,
    pub bank_size: u32,
    pub registers: HashMap<String, Register>,
    pub gaps: HashMap<String, Gap>,
    valid: bool,
}

impl FuseMap {
    /// Parse a fusemap YAML document. Does not validate.
    pub fn parse(yaml: &[u8]) -> Result<Self, FuseError> {
        let raw: RawFuseMap = serde_yml::from_slice(yaml)?;
        let driver = Driver::parse(&raw.driver)?;

        let mut registers = HashMap::new();
        for (name, raw_reg) in raw.registers {
            let mut fuses = HashMap::new();
            for (fuse_name, raw_fuse) in raw_reg.fuses {
                fuses.insert(
                    fuse_name.clone(),
                    Fuse {
                        name: fuse_name,
                        offset: raw_fuse.offset,
                        length: raw_fuse.length,
                        register: name.clone(),
                    },
                );
            }
            registers.insert(
                name.clone(),
                Register {
                    name,
                    bank: raw_reg.bank,
                    word: raw_reg.word,
                    read_address: 0,
                    write_address: 0,
                    length: 8 * driver.word_size(),
                    fuses,
                },
            );
        }

        Ok(FuseMap {
            processor: raw.processor,
            reference: raw.reference,
            driver,
            word_size: driver.word_size(),
            bank_size: raw.bank_size,
            registers,
            gaps: raw.gaps,
            valid: false,
        })
    }

    /// Locate `<processor>.yaml` under `dir`, parse it, validate it, and
    /// require its declared processor/reference to match the request.
    pub fn find(dir: &Path, processor: &str, reference: &str) -> Result<Self, FuseError> {
        let path = dir.join(format!("{processor}.yaml"));
        let bytes = fs::read(&path).map_err(|source| FuseError::Io { address: 0, source })?;

        let mut fusemap = Self::parse(&bytes)?;
        fusemap.validate()?;

        if fusemap.processor != processor || fusemap.reference != reference {
            return Err(FuseError::InvalidReference {
                requested: format!("{processor}/{reference}"),
                found: format!("{}/{}", fusemap.processor, fusemap.reference),
            });
        }

        Ok(fusemap)
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    fn check_validated(&self) -> Result<(), FuseError> {
        if self.valid {
            Ok(())
        } else {
            Err(FuseError::NotValidated)
        }
    }

    /// Validate structural invariants, resolve addresses, apply gaps, and
    /// mark the fusemap as validated. See spec §4.3 for the full rule set.
    pub fn validate(&mut self) -> Result<(), FuseError> {
        if self.reference.is_empty() {
            return Err(FuseError::MissingReference);
        }

        if self.bank_size != self.driver.bank_size_constant() {
            return Err(FuseError::UnsupportedDriver(format!(
                "declared bank_size {} does not match driver's expected {}",
                self.bank_size,
                self.driver.bank_size_constant()
            )));
        }

        let mut names: HashMap<String, ()> = HashMap::new();

        let register_names: Vec<String> = {
            let mut v: Vec<String> = self.registers.keys().cloned().collect();
            v.sort();
            v
        };

        for reg_name in &register_names {
            if names.insert(reg_name.clone(), ()).is_some() {
                return Err(FuseError::DuplicateName(reg_name.clone()));
            }

            let word = self.registers[reg_name].word;
            if word >= self.bank_size {
                return Err(FuseError::WordOutOfRange(reg_name.clone(), word, self.bank_size));
            }

            let fuse_names: Vec<String> = {
                let mut v: Vec<String> = self.registers[reg_name].fuses.keys().cloned().collect();
                v.sort();
                v
            };
            for fuse_name in &fuse_names {
                if names.insert(fuse_name.clone(), ()).is_some() {
                    return Err(FuseError::DuplicateName(fuse_name.clone()));
                }

                let fuse = &self.registers[reg_name].fuses[fuse_name];
                if fuse.offset > 31 {
                    return Err(FuseError::OffsetOutOfRange(fuse_name.clone(), fuse.offset));
                }
                if fuse.length > 512 {
                    return Err(FuseError::FuseTooLong(fuse_name.clone(), fuse.length));
                }
            }

            let reg = self.registers.get_mut(reg_name).unwrap();
            let address = (reg.bank * self.bank_size + reg.word) * self.word_size;
            reg.read_address = address;
            reg.write_address = address;
        }

        self.apply_gaps()?;

        let mut read_addrs: HashMap<u32, String> = HashMap::new();
        let mut write_addrs: HashMap<u32, String> = HashMap::new();
        for reg_name in &register_names {
            let reg = &self.registers[reg_name];
            if let Some(existing) = read_addrs.insert(reg.read_address, reg_name.clone()) {
                return Err(FuseError::DuplicateAddress {
                    address: reg.read_address,
                    name: existing,
                });
            }
            if let Some(existing) = write_addrs.insert(reg.write_address, reg_name.clone()) {
                return Err(FuseError::DuplicateAddress {
                    address: reg.write_address,
                    name: existing,
                });
            }
        }

        self.valid = true;
        Ok(())
    }

    fn apply_gaps(&mut self) -> Result<(), FuseError> {
        if self.gaps.is_empty() {
            return Ok(());
        }

        let mut register_names: Vec<String> = self.registers.keys().cloned().collect();
        register_names.sort();

        let mut gap_names: Vec<String> = self.gaps.keys().cloned().collect();
        gap_names.sort();

        let original: HashMap<String, (u32, u32)> = self
            .registers
            .iter()
            .map(|(name, reg)| (name.clone(), (reg.read_address, reg.write_address)))
            .collect();

        let mut read_addrs = original.iter().map(|(n, (r, _))| (n.clone(), *r)).collect::<HashMap<_, _>>();
        let mut write_addrs = original.iter().map(|(n, (_, w))| (n.clone(), *w)).collect::<HashMap<_, _>>();

        for reg_name in &register_names {
            let (reg_read, reg_write) = original[reg_name];

            for gap_name in &gap_names {
                let gap_reg = self
                    .registers
                    .get(gap_name)
                    .ok_or_else(|| FuseError::InvalidGapRegister(gap_name.clone()))?;
                let gap = &self.gaps[gap_name];

                if !gap.read && !gap.write {
                    return Err(FuseError::MissingOperation(gap_name.clone()));
                }
                if gap.length == 0 {
                    return Err(FuseError::MissingLength(gap_name.clone()));
                }

                if gap.read && reg_read >= gap_reg.read_address {
                    *read_addrs.get_mut(reg_name).unwrap() += gap.length / self.word_size;
                }
                if gap.write && reg_write >= gap_reg.write_address {
                    *write_addrs.get_mut(reg_name).unwrap() += gap.length / self.word_size;
                }
            }
        }

        for reg_name in &register_names {
            let reg = self.registers.get_mut(reg_name).unwrap();
            reg.read_address = read_addrs[reg_name];
            reg.write_address = write_addrs[reg_name];
        }

        Ok(())
    }

    /// Look up a register or fuse by name across the merged namespace.
    pub fn find_name(&self, name: &str) -> Result<Mapping<'_>, FuseError> {
        self.check_validated()?;

        if let Some(reg) = self.registers.get(name) {
            return Ok(Mapping::Register(reg));
        }

        for reg in self.registers.values() {
            if let Some(fuse) = reg.fuses.get(name) {
                return Ok(Mapping::Fuse(fuse));
            }
        }

        Err(FuseError::NotFound(name.to_string()))
    }

    pub fn registers_by_read_address(&self) -> Vec<&Register> {
        sort::registers_by_read_address(self.registers.values().collect())
    }

    pub fn registers_by_write_address(&self) -> Vec<&Register> {
        sort::registers_by_write_address(self.registers.values().collect())
    }

    /// Overlay a validated "vendor" fusemap onto this validated "reference"
    /// fusemap. Every vendor register must already exist here by name;
    /// every vendor fuse is attached to the matching register, rejecting a
    /// name collision with an existing fuse in that register.
    ///
    /// Grounded on `examples/original_source/fusemap/overlay_test.go`.
    pub fn overlay(&mut self, vendor: &FuseMap) -> Result<(), FuseError> {
        self.check_validated()?;
        vendor.check_validated()?;

        for (reg_name, vendor_reg) in &vendor.registers {
            if !self.registers.contains_key(reg_name) {
                return Err(FuseError::NotFound(reg_name.clone()));
            }

            for (fuse_name, vendor_fuse) in &vendor_reg.fuses {
                let reg = self.registers.get_mut(reg_name).unwrap();
                if reg.fuses.contains_key(fuse_name) {
                    return Err(FuseError::DuplicateName(fuse_name.clone()));
                }
                reg.fuses.insert(
                    fuse_name.clone(),
                    Fuse {
                        name: fuse_name.clone(),
                        offset: vendor_fuse.offset,
                        length: vendor_fuse.length,
                        register: reg_name.clone(),
                    },
                );
            }
        }

        Ok(())
    }
}
