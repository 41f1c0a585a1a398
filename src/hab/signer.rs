//! Abstract signing capability plus the detached PKCS#7 `SignedData`
//! envelope built over it (spec §4.7, §6).
//!
//! Grounded on `examples/original_source/hab/crypto.go`'s `sign()`
//! (overall shape: SignedData, detached, SHA-256 digest, RSA) and
//! `cmd/habtool/habtool_file.go` (local PEM-backed concrete signer). No
//! crate in the retrieval pack builds PKCS#7/CMS envelopes (the original
//! itself reaches for an external `smallstep/pkcs7` library rather than
//! hand-rolling one), so the minimal DER writer below is original
//! plumbing, not a port of any teacher or pack file.

use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::{Pkcs1v15Sign, RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha256};

use crate::error::HabError;

/// The boundary of the HAB subsystem: `Sign(digest) -> signature`,
/// `public_key() -> RSA public key`. A local PEM-backed key and a
/// KMS-backed remote key both satisfy this; `HabAssembler` depends on
/// nothing more concrete.
pub trait HabSigner {
    /// Sign a 32-byte SHA-256 digest, returning a raw PKCS#1v1.5 RSA
    /// signature (key-size bytes, no envelope).
    fn sign(&self, digest: &[u8; 32]) -> Result<Vec<u8>, HabError>;

    /// The public key counterpart, used to size records ahead of signing.
    fn public_key(&self) -> RsaPublicKey;
}

/// A local, PEM-file-backed RSA private key signer (either PKCS#8 or
/// PKCS#1 framing, the two forms `rsa::RsaPrivateKey` callers actually
/// produce). Grounded on `habtool_file.go`'s key loading.
pub struct LocalRsaSigner {
    key: RsaPrivateKey,
}

impl LocalRsaSigner {
    pub fn from_pem(pem: &str) -> Result<Self, HabError> {
        let key = RsaPrivateKey::from_pkcs8_pem(pem)
            .ok()
            .or_else(|| RsaPrivateKey::from_pkcs1_pem(pem).ok())
            .ok_or_else(|| {
                HabError::Pkcs8("failed to parse RSA private key PEM as PKCS#8 or PKCS#1".into())
            })?;
        Ok(LocalRsaSigner { key })
    }

    pub fn from_key(key: RsaPrivateKey) -> Self {
        LocalRsaSigner { key }
    }
}

impl HabSigner for LocalRsaSigner {
    fn sign(&self, digest: &[u8; 32]) -> Result<Vec<u8>, HabError> {
        let padding = Pkcs1v15Sign::new::<Sha256>();
        Ok(self.key.sign(padding, digest)?)
    }

    fn public_key(&self) -> RsaPublicKey {
        self.key.to_public_key()
    }
}

// RSA encryption: 1.2.840.113549.1.1.1
const OID_RSA_ENCRYPTION: [u8; 9] = [0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x01, 0x01];
// id-sha256: 2.16.840.1.101.3.4.2.1
const OID_SHA256: [u8; 9] = [0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02, 0x01];
// pkcs7-signedData: 1.2.840.113549.1.7.2
const OID_PKCS7_SIGNED_DATA: [u8; 9] = [0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x07, 0x02];
// pkcs7-data: 1.2.840.113549.1.7.1
const OID_PKCS7_DATA: [u8; 9] = [0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x07, 0x01];

fn der_len(n: usize) -> Vec<u8> {
    if n < 0x80 {
        vec![n as u8]
    } else {
        let mut body = n.to_be_bytes().to_vec();
        while body.first() == Some(&0) {
            body.remove(0);
        }
        let mut out = vec![0x80 | body.len() as u8];
        out.extend(body);
        out
    }
}

fn der_tlv(tag: u8, content: &[u8]) -> Vec<u8> {
    let mut out = vec![tag];
    out.extend(der_len(content.len()));
    out.extend_from_slice(content);
    out
}

fn der_sequence(content: &[u8]) -> Vec<u8> {
    der_tlv(0x30, content)
}

fn der_set(content: &[u8]) -> Vec<u8> {
    der_tlv(0x31, content)
}

fn der_oid(body: &[u8]) -> Vec<u8> {
    der_tlv(0x06, body)
}

fn der_null() -> Vec<u8> {
    vec![0x05, 0x00]
}

fn der_octet_string(content: &[u8]) -> Vec<u8> {
    der_tlv(0x04, content)
}

fn der_small_integer(value: u8) -> Vec<u8> {
    der_tlv(0x02, &[value])
}

/// `[0] EXPLICIT`, i.e. a constructed context tag wrapping a full TLV.
fn der_context_explicit(tag_num: u8, content: &[u8]) -> Vec<u8> {
    der_tlv(0xa0 | tag_num, content)
}

/// Builds the detached PKCS#7 `SignedData` envelope HAB's ROM expects for
/// a CSF/IMG/DCD authentication record: `ContentInfo { signedData {
/// version=1, digestAlgorithms={sha256}, encapContentInfo={data, no
/// content}, signerInfos={one SignerInfo} } }`. The data itself is not
/// embedded — only its SHA-256 digest is signed.
pub struct Pkcs7SignedData;

impl Pkcs7SignedData {
    pub fn build(data: &[u8], signer: &dyn HabSigner, certificate_der: &[u8]) -> Result<Vec<u8>, HabError> {
        let digest: [u8; 32] = Sha256::digest(data).into();
        let signature = signer.sign(&digest)?;

        let (_, cert) = x509_parser::certificate::X509Certificate::from_der(certificate_der)
            .map_err(|e| HabError::CertParse(format!("could not parse signer certificate: {e}")))?;

        let issuer_der = cert.tbs_certificate.issuer.as_raw().to_vec();
        let serial_der = der_tlv(0x02, cert.tbs_certificate.raw_serial());

        let sha256_alg_id = der_sequence(&[der_oid(&OID_SHA256), der_null()].concat());
        let digest_algorithms = der_set(&sha256_alg_id);

        let encap_content_info = der_sequence(&der_oid(&OID_PKCS7_DATA));

        let issuer_and_serial = der_sequence(&[issuer_der, serial_der].concat());
        let rsa_alg_id = der_sequence(&[der_oid(&OID_RSA_ENCRYPTION), der_null()].concat());

        let signer_info = der_sequence(
            &[
                der_small_integer(1),
                issuer_and_serial,
                sha256_alg_id,
                rsa_alg_id,
                der_octet_string(&signature),
            ]
            .concat(),
        );
        let signer_infos = der_set(&signer_info);

        let signed_data = der_sequence(
            &[der_small_integer(1), digest_algorithms, encap_content_info, signer_infos].concat(),
        );

        let content_info = der_sequence(
            &[der_oid(&OID_PKCS7_SIGNED_DATA), der_context_explicit(0, &signed_data)].concat(),
        );

        Ok(content_info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    fn test_cert_and_signer() -> (Vec<u8>, LocalRsaSigner) {
        let pem = include_str!("testdata/srk1.pem");
        let block = pem::parse(pem).expect("valid PEM");

        // srk1.pem is a self-signed test certificate; its matching private
        // key isn't shipped (the pack has no vendor private keys), so this
        // test exercises envelope shape with a freshly generated signer
        // paired with the certificate's DER for issuer/serial extraction.
        let mut rng = OsRng;
        let key = RsaPrivateKey::new(&mut rng, 2048).expect("key generation");
        (block.contents().to_vec(), LocalRsaSigner::from_key(key))
    }

    #[test]
    fn build_produces_a_sequence() {
        let (cert_der, signer) = test_cert_and_signer();
        let envelope = Pkcs7SignedData::build(b"some image bytes", &signer, &cert_der).unwrap();
        assert_eq!(envelope[0], 0x30);
        assert!(envelope.len() > 64);
    }

    #[test]
    fn build_is_deterministic_for_same_inputs() {
        let (cert_der, signer) = test_cert_and_signer();
        let a = Pkcs7SignedData::build(b"same bytes", &signer, &cert_der).unwrap();
        let b = Pkcs7SignedData::build(b"same bytes", &signer, &cert_der).unwrap();
        assert_eq!(a, b);
    }
}
