//! End-to-end HAB assembly: generate an SRK CA plus CSF/IMG leaves, sign a
//! synthetic boot image, and check the CSF slot comes back filled and
//! padded to the size BootData reserved for it.

use imx_fuseloader::hab::{AssembleInput, CertFactory, HabAssembler, LocalRsaSigner, SrkTable};
use rsa::RsaPrivateKey;
use rsa::pkcs8::DecodePrivateKey;

const IVT_OFFSET: u32 = 1024;
const HAB_TAG_IVT: u8 = 0xd1;
const HAB_TAG_CSF: u8 = 0xd4;

fn synthetic_image(csf_room: u32) -> Vec<u8> {
    let self_addr = 0x8780_0000u32;
    let boot_data_addr = self_addr + 32;
    let csf_addr = self_addr + 64;
    let entry = self_addr + 0x60;

    let mut image = vec![0u8; 64];
    image[0] = HAB_TAG_IVT;
    image[1..3].copy_from_slice(&32u16.to_be_bytes());
    image[3] = 0x40;
    image[4..8].copy_from_slice(&entry.to_le_bytes());
    image[16..20].copy_from_slice(&boot_data_addr.to_le_bytes());
    image[20..24].copy_from_slice(&self_addr.to_le_bytes());
    image[24..28].copy_from_slice(&csf_addr.to_le_bytes());

    let length = image.len() as u32 + IVT_OFFSET + csf_room;
    image[32..36].copy_from_slice(&self_addr.to_le_bytes());
    image[36..40].copy_from_slice(&length.to_le_bytes());

    image
}

#[test]
fn signed_image_carries_a_csf_record_padded_to_its_slot() {
    let image = synthetic_image(0x1000);

    let ca = CertFactory::new_ca(2048, 7300).expect("CA generation");
    let csf_cert = CertFactory::new_cert("CSF", 2048, 7300, &ca).expect("CSF cert");
    let img_cert = CertFactory::new_cert("IMG", 2048, 7300, &ca).expect("IMG cert");

    let csf_key = RsaPrivateKey::from_pkcs8_pem(&csf_cert.private_key_pem).unwrap();
    let img_key = RsaPrivateKey::from_pkcs8_pem(&img_cert.private_key_pem).unwrap();
    let csf_signer = LocalRsaSigner::from_key(csf_key);
    let img_signer = LocalRsaSigner::from_key(img_key);

    let ca_key = RsaPrivateKey::from_pkcs8_pem(&ca.generated.private_key_pem).unwrap();
    let mut srk_table = SrkTable::new();
    srk_table.add_key(&ca_key.to_public_key()).unwrap();
    let srk_bytes = srk_table.to_bytes();

    let csf = HabAssembler::assemble(&AssembleInput {
        image: &image,
        srk_table: &srk_bytes,
        srk_index: 1,
        engine: 0xff,
        csf_certificate_der: &csf_cert.certificate_der,
        img_certificate_der: &img_cert.certificate_der,
        csf_signer: &csf_signer,
        img_signer: &img_signer,
        sdp: false,
    })
    .expect("assembly");

    assert_eq!(csf.len(), 0x1000);
    assert_eq!(csf[0], HAB_TAG_CSF);

    // Output goes where a real caller would place it: spliced into the
    // image at its reserved CSF slot, written out as one artifact.
    let dir = tempfile::tempdir().unwrap();
    let output_path = dir.path().join("signed.bin");
    let mut signed = image.clone();
    signed.extend_from_slice(&csf);
    std::fs::write(&output_path, &signed).unwrap();

    let readback = std::fs::read(&output_path).unwrap();
    assert_eq!(readback.len(), image.len() + csf.len());
}

#[test]
fn oversized_signed_content_is_rejected() {
    // CSF slot too small to hold even the commands section plus one SRK key.
    let image = synthetic_image(4);

    let ca = CertFactory::new_ca(1024, 3650).expect("CA generation");
    let csf_cert = CertFactory::new_cert("CSF", 1024, 3650, &ca).expect("CSF cert");
    let img_cert = CertFactory::new_cert("IMG", 1024, 3650, &ca).expect("IMG cert");

    let csf_key = RsaPrivateKey::from_pkcs8_pem(&csf_cert.private_key_pem).unwrap();
    let img_key = RsaPrivateKey::from_pkcs8_pem(&img_cert.private_key_pem).unwrap();
    let csf_signer = LocalRsaSigner::from_key(csf_key);
    let img_signer = LocalRsaSigner::from_key(img_key);

    let ca_key = RsaPrivateKey::from_pkcs8_pem(&ca.generated.private_key_pem).unwrap();
    let mut srk_table = SrkTable::new();
    srk_table.add_key(&ca_key.to_public_key()).unwrap();
    let srk_bytes = srk_table.to_bytes();

    let result = HabAssembler::assemble(&AssembleInput {
        image: &image,
        srk_table: &srk_bytes,
        srk_index: 1,
        engine: 0xff,
        csf_certificate_der: &csf_cert.certificate_der,
        img_certificate_der: &img_cert.certificate_der,
        csf_signer: &csf_signer,
        img_signer: &img_signer,
        sdp: false,
    });

    assert!(result.is_err());
}
