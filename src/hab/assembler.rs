//! CSF offset threading and record assembly: Install-Key, Authenticate-Data,
//! certificate/signature records, SDP/DCD handling (spec §4.8).
//!
//! Grounded on `examples/original_source/hab/hab.go`'s `Sign()` function.
//! The Authenticate-DCD offset quirk — `aut_start` computed from
//! `img_signature`'s record length rather than `dcd_signature`'s — is
//! preserved exactly as written there, per spec §9's explicit instruction
//! not to "correct" it.

use crate::codec::pad_to_multiple_of_4;
use crate::error::HabError;
use crate::hab::signer::{HabSigner, Pkcs7SignedData};
use crate::hab::structs::{
    AuthenticateData, BootData, Csf, Dcd, HAB_ALG_SHA256, HAB_CMD_INS_KEY_CSF, HAB_KEY_CSFK, HAB_PCL_CMS,
    HAB_PCL_SRK, HAB_PCL_X509, HAB_TAG_CSF, HAB_TAG_CRT, HAB_TAG_SIG, IVT_OFFSET, InstallKey, Ivt,
};

const HAB_KEY_IMG: u8 = 2;

/// Everything `assemble` needs: the boot image, the already-serialized SRK
/// table, which SRK slot is signing this image, the engine id, both
/// certificates (DER), both signers, and whether this is an SDP (serial
/// download) image requiring a separately authenticated DCD.
pub struct AssembleInput<'a> {
    pub image: &'a [u8],
    pub srk_table: &'a [u8],
    pub srk_index: u8,
    pub engine: u8,
    pub csf_certificate_der: &'a [u8],
    pub img_certificate_der: &'a [u8],
    pub csf_signer: &'a dyn HabSigner,
    pub img_signer: &'a dyn HabSigner,
    pub sdp: bool,
}

pub struct HabAssembler;

impl HabAssembler {
    pub fn assemble(input: &AssembleInput<'_>) -> Result<Vec<u8>, HabError> {
        let ivt = Ivt::from_bytes(input.image)?;
        let boot_data = BootData::from_image(input.image, &ivt)?;
        let expected_len = (boot_data.length as usize)
            .checked_sub(input.image.len())
            .and_then(|v| v.checked_sub(IVT_OFFSET as usize))
            .ok_or_else(|| HabError::InvalidIvt("boot data length smaller than image".into()))?;

        // Step 3: SDP zeroes ivt.dcd in a copy of the image before signing,
        // since the ROM recomputes the hash with the DCD pointer cleared.
        let (signing_image, dcd) = if input.sdp {
            let dcd = Dcd::from_image(input.image, &ivt)?;
            let mut copy = input.image.to_vec();
            let mut zeroed_ivt = ivt;
            zeroed_ivt.dcd = 0;
            copy[0..32].copy_from_slice(&zeroed_ivt.to_bytes());
            (copy, Some(dcd))
        } else {
            (input.image.to_vec(), None)
        };

        // Step 6: sign image (and DCD, if SDP) now — record lengths for
        // the certificate/signature chunks are fixed once the key sizes
        // and certificates are known, independent of the CSF's own
        // not-yet-computed command offsets.
        let csf_cert_record = wrap_record(HAB_TAG_CRT, input.csf_certificate_der);
        let img_cert_record = wrap_record(HAB_TAG_CRT, input.img_certificate_der);

        let img_signature =
            Pkcs7SignedData::build(&signing_image, input.img_signer, input.img_certificate_der)?;
        let img_sig_record = wrap_record(HAB_TAG_SIG, &img_signature);

        let dcd_sig_record = if let Some(dcd) = &dcd {
            // Signed with the IMG signer, the same key Authenticate-Data
            // uses for the image itself (spec §4.8 step 6).
            let dcd_off = (ivt.dcd - ivt.self_addr) as usize;
            let dcd_bytes = &input.image[dcd_off..dcd_off + dcd.header.len as usize];
            let dcd_signature = Pkcs7SignedData::build(dcd_bytes, input.img_signer, input.img_certificate_der)?;
            Some(wrap_record(HAB_TAG_SIG, &dcd_signature))
        } else {
            None
        };

        // Step 2: prepare commands with placeholder (zero) addresses.
        let mut install_srk = InstallKey::new();
        install_srk.pcl = HAB_PCL_SRK;
        install_srk.alg = HAB_ALG_SHA256;
        install_srk.src = input.srk_index - 1;

        let mut install_csfk = InstallKey::new();
        install_csfk.flg = HAB_CMD_INS_KEY_CSF;
        install_csfk.pcl = HAB_PCL_X509;
        install_csfk.tgt = HAB_KEY_CSFK;

        let mut auth_csf = AuthenticateData::new();
        auth_csf.key = HAB_KEY_CSFK;
        auth_csf.pcl = HAB_PCL_CMS;
        auth_csf.eng = input.engine;

        let mut install_img = InstallKey::new();
        install_img.pcl = HAB_PCL_X509;
        install_img.tgt = HAB_KEY_IMG;

        let mut auth_data = AuthenticateData::new();
        auth_data.key = HAB_KEY_IMG;
        auth_data.pcl = HAB_PCL_CMS;
        auth_data.eng = input.engine;
        auth_data.set_data_block(ivt.self_addr, input.image.len() as u32);

        let mut auth_dcd = dcd.as_ref().map(|dcd| {
            let mut ad = AuthenticateData::new();
            ad.key = HAB_KEY_IMG;
            ad.pcl = HAB_PCL_CMS;
            ad.eng = input.engine;
            ad.set_data_block(ivt.dcd, dcd.header.len as u32);
            ad
        });

        // Step 4: accumulate csf.header.len as each command is appended.
        let commands_len = 4
            + InstallKey::LEN as usize
            + InstallKey::LEN as usize
            + auth_csf.len() as usize
            + InstallKey::LEN as usize
            + auth_data.len() as usize
            + auth_dcd.as_ref().map(|ad| ad.len() as usize).unwrap_or(0);

        // Step 5: walk the offset layout deterministically.
        install_srk.key_dat = commands_len as u32;
        install_csfk.key_dat = install_srk.key_dat + input.srk_table.len() as u32;
        auth_csf.aut_start = install_csfk.key_dat + csf_cert_record.len() as u32;
        install_img.key_dat = auth_csf.aut_start + img_sig_record.len() as u32;
        auth_data.aut_start = install_img.key_dat + img_cert_record.len() as u32;
        if let Some(ad) = auth_dcd.as_mut() {
            // HAB layout quirk (spec §9): reuses the IMG signature record's
            // length as the stride here, not the DCD signature's own.
            ad.aut_start = auth_data.aut_start + img_sig_record.len() as u32;
        }

        let mut commands = Vec::with_capacity(commands_len - 4);
        commands.extend_from_slice(&install_srk.to_bytes());
        commands.extend_from_slice(&install_csfk.to_bytes());
        commands.extend_from_slice(&auth_csf.to_bytes());
        commands.extend_from_slice(&install_img.to_bytes());
        commands.extend_from_slice(&auth_data.to_bytes());
        if let Some(ad) = &auth_dcd {
            commands.extend_from_slice(&ad.to_bytes());
        }

        let mut csf = Csf::new(HAB_TAG_CSF);
        csf.set(commands);
        let csf_command_section = csf.to_bytes();

        // Step 8: sign the finalized command section with the CSF signer.
        let csf_signature =
            Pkcs7SignedData::build(&csf_command_section, input.csf_signer, input.csf_certificate_der)?;
        let csf_sig_record = wrap_record(HAB_TAG_SIG, &csf_signature);

        // Step 7: concatenate in wire order.
        let mut stream = Vec::new();
        stream.extend_from_slice(&csf_command_section);
        stream.extend_from_slice(input.srk_table);
        stream.extend_from_slice(&csf_cert_record);
        stream.extend_from_slice(&csf_sig_record);
        stream.extend_from_slice(&img_cert_record);
        stream.extend_from_slice(&img_sig_record);
        if let Some(rec) = &dcd_sig_record {
            stream.extend_from_slice(rec);
        }

        // Step 9: pad to the CSF slot computed from BootData.
        if stream.len() > expected_len {
            return Err(HabError::CsfTooLarge {
                actual: stream.len(),
                limit: expected_len,
            });
        }
        stream.resize(expected_len, 0);

        Ok(stream)
    }
}

/// Wrap `payload` in a CSF record header of `tag`, right-padded to a
/// 4-byte boundary (spec §4.8, final paragraph).
fn wrap_record(tag: u8, payload: &[u8]) -> Vec<u8> {
    let padded = pad_to_multiple_of_4(payload);
    let total_len = 4 + padded.len();
    let mut out = Vec::with_capacity(total_len);
    out.push(tag);
    out.extend_from_slice(&(total_len as u16).to_be_bytes());
    out.push(crate::hab::structs::HAB_VER);
    out.extend_from_slice(&padded);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hab::certs::CertFactory;
    use crate::hab::signer::LocalRsaSigner;
    use crate::hab::structs::{HAB_TAG_IVT, Header, SrkTable};
    use rsa::RsaPrivateKey;
    use rsa::pkcs8::DecodePrivateKey;

    fn synthetic_image() -> Vec<u8> {
        // IVT at offset 0, BootData right after it at offset 32, image
        // body padded out so BootData.length leaves room for a CSF.
        let ivt_self = 0x8000_0000u32;
        let boot_data_addr = ivt_self + 32;
        let csf_addr = ivt_self + 64; // unused by the assembler directly
        let entry = ivt_self + 0x60;

        let mut image = vec![0u8; 64];
        image[0] = HAB_TAG_IVT;
        image[1..3].copy_from_slice(&32u16.to_be_bytes());
        image[3] = 0x40;
        image[4..8].copy_from_slice(&entry.to_le_bytes());
        image[12..16].copy_from_slice(&0u32.to_le_bytes()); // no DCD
        image[16..20].copy_from_slice(&boot_data_addr.to_le_bytes());
        image[20..24].copy_from_slice(&ivt_self.to_le_bytes());
        image[24..28].copy_from_slice(&csf_addr.to_le_bytes());

        let length = image.len() as u32 + IVT_OFFSET + 0x2000;
        image[32..36].copy_from_slice(&ivt_self.to_le_bytes());
        image[36..40].copy_from_slice(&length.to_le_bytes());
        image[40..44].copy_from_slice(&0u32.to_le_bytes());

        image
    }

    #[test]
    fn assemble_pads_to_expected_csf_length() {
        let image = synthetic_image();

        let ca = CertFactory::new_ca(2048, 7300).unwrap();
        let csf_cert = CertFactory::new_cert("CSF", 2048, 7300, &ca).unwrap();
        let img_cert = CertFactory::new_cert("IMG", 2048, 7300, &ca).unwrap();

        let csf_key = RsaPrivateKey::from_pkcs8_pem(&csf_cert.private_key_pem).unwrap();
        let img_key = RsaPrivateKey::from_pkcs8_pem(&img_cert.private_key_pem).unwrap();
        let csf_signer = LocalRsaSigner::from_key(csf_key);
        let img_signer = LocalRsaSigner::from_key(img_key);

        let mut srk_table = SrkTable::new();
        let ca_key = RsaPrivateKey::from_pkcs8_pem(&ca.generated.private_key_pem).unwrap();
        srk_table.add_key(&ca_key.to_public_key()).unwrap();
        let srk_bytes = srk_table.to_bytes();

        let input = AssembleInput {
            image: &image,
            srk_table: &srk_bytes,
            srk_index: 1,
            engine: 0xff,
            csf_certificate_der: &csf_cert.certificate_der,
            img_certificate_der: &img_cert.certificate_der,
            csf_signer: &csf_signer,
            img_signer: &img_signer,
            sdp: false,
        };

        let assembled = HabAssembler::assemble(&input).unwrap();
        let boot_data = BootData::from_image(&image, &Ivt::from_bytes(&image).unwrap()).unwrap();
        let expected_len = boot_data.length as usize - image.len() - IVT_OFFSET as usize;
        assert_eq!(assembled.len(), expected_len);

        let header = Header::from_bytes(&assembled[0..4]).unwrap();
        assert_eq!(header.tag, crate::hab::structs::HAB_TAG_CSF);
    }

    #[test]
    fn assemble_rejects_oversized_csf() {
        let mut image = synthetic_image();
        // Shrink the declared slot so the assembled CSF can't fit.
        let tiny_length = image.len() as u32 + IVT_OFFSET + 8;
        image[36..40].copy_from_slice(&tiny_length.to_le_bytes());

        let ca = CertFactory::new_ca(1024, 3650).unwrap();
        let csf_cert = CertFactory::new_cert("CSF", 1024, 3650, &ca).unwrap();
        let img_cert = CertFactory::new_cert("IMG", 1024, 3650, &ca).unwrap();
        let csf_key = RsaPrivateKey::from_pkcs8_pem(&csf_cert.private_key_pem).unwrap();
        let img_key = RsaPrivateKey::from_pkcs8_pem(&img_cert.private_key_pem).unwrap();
        let csf_signer = LocalRsaSigner::from_key(csf_key);
        let img_signer = LocalRsaSigner::from_key(img_key);

        let mut srk_table = SrkTable::new();
        let ca_key = RsaPrivateKey::from_pkcs8_pem(&ca.generated.private_key_pem).unwrap();
        srk_table.add_key(&ca_key.to_public_key()).unwrap();
        let srk_bytes = srk_table.to_bytes();

        let input = AssembleInput {
            image: &image,
            srk_table: &srk_bytes,
            srk_index: 1,
            engine: 0xff,
            csf_certificate_der: &csf_cert.certificate_der,
            img_certificate_der: &img_cert.certificate_der,
            csf_signer: &csf_signer,
            img_signer: &img_signer,
            sdp: false,
        };

        assert!(matches!(HabAssembler::assemble(&input), Err(HabError::CsfTooLarge { .. })));
    }

    #[test]
    fn sdp_image_authenticates_both_image_and_dcd() {
        use crate::hab::structs::HAB_TAG_DCD;

        let ivt_self = 0x8000_0000u32;
        let boot_data_addr = ivt_self + 32;
        let dcd_addr = ivt_self + 44;
        let entry = ivt_self + 0x60;

        let mut image = vec![0u8; 96];
        image[0] = HAB_TAG_IVT;
        image[1..3].copy_from_slice(&32u16.to_be_bytes());
        image[3] = 0x40;
        image[4..8].copy_from_slice(&entry.to_le_bytes());
        image[12..16].copy_from_slice(&dcd_addr.to_le_bytes());
        image[16..20].copy_from_slice(&boot_data_addr.to_le_bytes());
        image[20..24].copy_from_slice(&ivt_self.to_le_bytes());

        let length = image.len() as u32 + IVT_OFFSET + 0x2000;
        image[32..36].copy_from_slice(&ivt_self.to_le_bytes());
        image[36..40].copy_from_slice(&length.to_le_bytes());

        image[44] = HAB_TAG_DCD;
        image[45..47].copy_from_slice(&16u16.to_be_bytes());
        image[47] = 0x40;

        let ca = CertFactory::new_ca(2048, 7300).unwrap();
        let csf_cert = CertFactory::new_cert("CSF", 2048, 7300, &ca).unwrap();
        let img_cert = CertFactory::new_cert("IMG", 2048, 7300, &ca).unwrap();
        let csf_key = RsaPrivateKey::from_pkcs8_pem(&csf_cert.private_key_pem).unwrap();
        let img_key = RsaPrivateKey::from_pkcs8_pem(&img_cert.private_key_pem).unwrap();
        let csf_signer = LocalRsaSigner::from_key(csf_key);
        let img_signer = LocalRsaSigner::from_key(img_key);

        let mut srk_table = SrkTable::new();
        let ca_key = RsaPrivateKey::from_pkcs8_pem(&ca.generated.private_key_pem).unwrap();
        srk_table.add_key(&ca_key.to_public_key()).unwrap();
        let srk_bytes = srk_table.to_bytes();

        let input = AssembleInput {
            image: &image,
            srk_table: &srk_bytes,
            srk_index: 1,
            engine: 0xff,
            csf_certificate_der: &csf_cert.certificate_der,
            img_certificate_der: &img_cert.certificate_der,
            csf_signer: &csf_signer,
            img_signer: &img_signer,
            sdp: true,
        };

        let assembled = HabAssembler::assemble(&input).unwrap();
        let header = Header::from_bytes(&assembled[0..4]).unwrap();
        assert_eq!(header.tag, crate::hab::structs::HAB_TAG_CSF);
        // Five commands (SRK, CSFK, auth-CSF, install-IMG, auth-IMG) plus
        // one more for the DCD authenticate-data command.
        assert!(header.len as usize > 4 + 5 * InstallKey::LEN as usize);
    }
}
