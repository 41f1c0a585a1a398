//! Read and write the NVMEM character device with the driver's word
//! granularity; simulation mode when no device path is given.
//!
//! Grounded on `examples/original_source/otp/otp_linux.go`,
//! `otp/blow.go`, `otp/read.go`, `otp/otp.go`.

use std::fs::OpenOptions;
use std::io::{Read, Seek, SeekFrom, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;

use crate::codec;
use crate::error::FuseError;
use crate::fusemap::{FuseMap, Mapping};

const DEVICE_FLAGS: i32 = libc::O_EXCL | libc::O_SYNC;

/// The outcome of a successful read or write: the encoded bytes, the
/// register's resolved address, and the field's bit offset/length within
/// it.
pub struct Access {
    pub bytes: Vec<u8>,
    pub address: u32,
    pub offset: u32,
    pub bit_length: u32,
}

/// Reads and writes OTP storage through the Linux NVMEM character device.
pub struct OtpDevice;

impl OtpDevice {
    /// Read a register or fuse's current value.
    ///
    /// `path` empty fails with `EmptyDevicePath` — unlike `blow`, read has
    /// no simulation mode because there is nothing useful to simulate.
    pub fn read(path: &Path, fusemap: &FuseMap, name: &str) -> Result<Access, FuseError> {
        if path.as_os_str().is_empty() {
            return Err(FuseError::EmptyDevicePath);
        }

        if !fusemap.is_valid() {
            return Err(FuseError::NotValidated);
        }

        let mapping = fusemap.find_name(name)?;
        let (address, offset, bit_length) = mapping.read_addressing(fusemap);

        let word_size = fusemap.word_size;
        let num_words = (offset + bit_length).div_ceil(8 * word_size);
        let num_bytes = (num_words * word_size) as usize;

        let mut file = OpenOptions::new()
            .read(true)
            .custom_flags(DEVICE_FLAGS)
            .open(path)
            .map_err(|source| FuseError::Io { address, source })?;

        file.seek(SeekFrom::Start(address as u64))
            .map_err(|source| FuseError::Io { address, source })?;

        let mut raw = vec![0u8; num_bytes];
        file.read_exact(&mut raw)
            .map_err(|source| FuseError::Io { address, source })?;

        let decoded = codec::decode_read(offset, bit_length, &raw);

        Ok(Access {
            bytes: decoded,
            address,
            offset,
            bit_length,
        })
    }

    /// Blow (write) a register or fuse.
    ///
    /// With an empty `path`, this runs in simulation mode: the encoded
    /// bytes are returned without touching any device, which is how the
    /// CLI's dry-run and this crate's own tests exercise the encoder.
    pub fn blow(path: &Path, fusemap: &FuseMap, name: &str, value: &[u8]) -> Result<Access, FuseError> {
        if value.is_empty() {
            return Err(FuseError::NullValue);
        }

        if !fusemap.is_valid() {
            return Err(FuseError::NotValidated);
        }

        if !fusemap.driver.writable() {
            return Err(FuseError::DriverReadOnly);
        }

        let mapping = fusemap.find_name(name)?;
        let (address, offset, bit_length) = mapping.write_addressing(fusemap);

        let encoded = codec::encode_write(offset, bit_length, value)?;

        if path.as_os_str().is_empty() {
            return Ok(Access {
                bytes: encoded,
                address,
                offset,
                bit_length,
            });
        }

        let word_size = fusemap.word_size as usize;
        let mut file = OpenOptions::new()
            .write(true)
            .custom_flags(DEVICE_FLAGS)
            .open(path)
            .map_err(|source| FuseError::Io { address, source })?;

        // One word per syscall, strictly ascending: the driver rejects
        // multi-word transfers, and a partial write has already fused
        // some bits, so there is no retry or rollback on failure.
        for (i, word) in encoded.chunks(word_size).enumerate() {
            let word_address = address + (i * word_size) as u32;
            file.seek(SeekFrom::Start(word_address as u64))
                .map_err(|source| FuseError::Io { address: word_address, source })?;
            file.write_all(word)
                .map_err(|source| FuseError::Io { address: word_address, source })?;
        }

        Ok(Access {
            bytes: encoded,
            address,
            offset,
            bit_length,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fusemap::FuseMap;
    use std::io::Write as _;

    fn fusemap_for(yaml: &str) -> FuseMap {
        let mut fusemap = FuseMap::parse(yaml.as_bytes()).unwrap();
        fusemap.validate().unwrap();
        fusemap
    }

    const TEST_OCOTP_YAML: &str = r#"
processor: test
reference: test
driver: nvmem-imx-ocotp
bank_size: 8
registers:
  REG1:
    bank: 1
    word: 0
  REG2:
    bank: 1
    word: 1
    fuses:
      OTP1:
        offset: 1
        len: 3
      OTP2:
        offset: 4
        len: 48
  REG3:
    bank: 1
    word: 2
    fuses:
      OTP3:
        offset: 0
        len: 48
  REG4:
    bank: 1
    word: 3
    fuses:
      OTP4:
        offset: 4
        len: 60
"#;

    // Vectors from examples/original_source/src/crucible/blow_test.go
    // TestBlow (simulation mode, matching spec §8 scenario 2).
    #[test]
    fn blow_simulation_otp4_vector() {
        let fusemap = fusemap_for(TEST_OCOTP_YAML);
        let value = [0x0f, 0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff, 0xaa];
        let access = OtpDevice::blow(Path::new(""), &fusemap, "OTP4", &value).unwrap();
        assert_eq!(access.bytes, vec![0xa0, 0xfa, 0xef, 0xde, 0xcd, 0xbc, 0xab, 0xfa]);
        assert_eq!(access.address, 0x0b * 4);
    }

    #[test]
    fn blow_simulation_register_vector() {
        let fusemap = fusemap_for(TEST_OCOTP_YAML);
        let access = OtpDevice::blow(Path::new(""), &fusemap, "REG1", &[0x03]).unwrap();
        assert_eq!(access.bytes, vec![0x03, 0x00, 0x00, 0x00]);
        assert_eq!(access.address, 0x08 * 4);
    }

    // Scenario 3 from spec §8: over-wide write rejected, narrower one ok.
    #[test]
    fn blow_rejects_value_too_wide() {
        let yaml = r#"
processor: test
reference: test
driver: nvmem-imx-ocotp
bank_size: 8
registers:
  REG1:
    bank: 0
    word: 0
    fuses:
      OTP1:
        offset: 0
        len: 4
"#;
        let fusemap = fusemap_for(yaml);
        assert!(matches!(
            OtpDevice::blow(Path::new(""), &fusemap, "OTP1", &[0xff]),
            Err(FuseError::ValueTooWide(8, 4))
        ));
        assert!(OtpDevice::blow(Path::new(""), &fusemap, "OTP1", &[0x02]).is_ok());
    }

    // Scenario 4 from spec §8: a read-only driver rejects all blows.
    #[test]
    fn blow_rejects_on_readonly_driver() {
        let yaml = r#"
processor: test
reference: test
driver: nvmem-imx-iim
bank_size: 32
registers:
  REG1:
    bank: 0
    word: 0
    fuses:
      SRK_LOCK:
        offset: 0
        len: 1
"#;
        let fusemap = fusemap_for(yaml);
        assert!(matches!(
            OtpDevice::blow(Path::new(""), &fusemap, "SRK_LOCK", &[0xff]),
            Err(FuseError::DriverReadOnly)
        ));
    }

    #[test]
    fn blow_rejects_null_value() {
        let fusemap = fusemap_for(TEST_OCOTP_YAML);
        assert!(matches!(
            OtpDevice::blow(Path::new(""), &fusemap, "OTP1", &[]),
            Err(FuseError::NullValue)
        ));
    }

    #[test]
    fn read_rejects_empty_path() {
        let fusemap = fusemap_for(TEST_OCOTP_YAML);
        assert!(matches!(
            OtpDevice::read(Path::new(""), &fusemap, "OTP1"),
            Err(FuseError::EmptyDevicePath)
        ));
    }

    // Synthetic stand-in for spec §8 scenario 1 (TestReadIMX53 in
    // examples/original_source/otp/read_test.go): the real IMX53.yaml
    // fusemap and nvmem.IMX53 device snapshot are vendor data not present
    // in this pack (see DESIGN.md), so this exercises the same shapes —
    // a plain register read, a single-bit fuse, and a fuse whose length
    // spans past its own register's width into the bytes of the
    // registers that follow it — against a synthetic device image.
    #[test]
    fn read_mirrors_imx53_register_and_wide_fuse_shapes() {
        let yaml = r#"
processor: test
reference: test
driver: nvmem-imx-iim
bank_size: 32
registers:
  BANK0_WORD0:
    bank: 0
    word: 0
  BANK0_WORD1:
    bank: 0
    word: 1
    fuses:
      SRK_LOCK:
        offset: 0
        len: 1
  BANK0_WORD2:
    bank: 0
    word: 2
    fuses:
      SRK_HASH:
        offset: 0
        len: 256
"#;
        let fusemap = fusemap_for(yaml);

        let mut device = vec![0u8; 64];
        device[0] = 0x10; // BANK0_WORD0
        device[1] = 0x01; // SRK_LOCK, bit 0 set
        let srk_hash_bytes: Vec<u8> = (1..=32).collect();
        device[2..34].copy_from_slice(&srk_hash_bytes);

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&device).unwrap();
        let path = file.path().to_path_buf();

        let reg = OtpDevice::read(&path, &fusemap, "BANK0_WORD0").unwrap();
        assert_eq!(reg.bytes, vec![0x10]);
        assert_eq!(reg.address, 0x00);

        let lock = OtpDevice::read(&path, &fusemap, "SRK_LOCK").unwrap();
        assert_eq!(lock.bytes, vec![0x01]);
        assert_eq!(lock.address, 0x01);

        let hash = OtpDevice::read(&path, &fusemap, "SRK_HASH").unwrap();
        assert_eq!(hash.address, 0x02);
        assert_eq!(hash.bit_length, 256);
        // Literal expected value: srk_hash_bytes is [1, 2, ..., 32] stored
        // little-endian-first on the device, so the decoded big-endian
        // value is that range reversed, [32, 31, ..., 1].
        let expected_hash: Vec<u8> = (1..=32).rev().collect();
        assert_eq!(hash.bytes, expected_hash);
    }

    // Round-trips a blow through a real tempfile-backed device and reads
    // it back, the way TestBlowAndRead does in the original source.
    #[test]
    fn blow_and_read_round_trip() {
        let yaml = r#"
processor: test
reference: test
driver: nvmem-imx-ocotp
bank_size: 8
registers:
  REG1:
    bank: 0
    word: 0
    fuses:
      OTP1:
        offset: 0
        len: 256
"#;
        let fusemap = fusemap_for(yaml);

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[0xaa; 33]).unwrap();
        let path = file.path().to_path_buf();

        let value: Vec<u8> = (0..32).map(|i| (i * 7 + 1) as u8).collect();
        let blown = OtpDevice::blow(&path, &fusemap, "OTP1", &value).unwrap();
        assert_eq!(blown.address, 0x00);

        // value is already exactly 32 bytes wide with a nonzero leading
        // byte, so the 256-bit field read back is the literal value.
        let read_back = OtpDevice::read(&path, &fusemap, "OTP1").unwrap();
        assert_eq!(read_back.bytes, value);
    }
}
