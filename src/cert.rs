//! Certificate handling for the handshake.
//!
//! The engine never interprets certificates itself; it asks a
//! [`CertificateContext`] for them. `lookup` selects a chain and signer for
//! the server's flight, `verify` inspects the peer's chain and returns a
//! [`SignatureVerifier`] that later checks the CertificateVerify signature.
//! A verifier is consumed exactly once: either with the real signed content,
//! or with empty slices when the handshake is abandoned before
//! CertificateVerify arrives, so implementations can release per-handshake
//! resources in every outcome.
//!
//! An Ed25519 implementation is included, with just enough DER handling to
//! carry a key through a minimal self-signed certificate.

use alloc::boxed::Box;
use alloc::vec::Vec;

use crate::crypto::SIGSCHEME_ED25519;
use crate::error::{AlertDescription, Error};

/// Context string for server CertificateVerify (RFC 8446 section 4.4.3).
pub const SERVER_CONTEXT: &[u8] = b"TLS 1.3, server CertificateVerify";

/// Context string for client CertificateVerify (RFC 8446 section 4.4.3).
pub const CLIENT_CONTEXT: &[u8] = b"TLS 1.3, client CertificateVerify";

/// 64 spaces + context (up to 33 bytes) + 0x00 + up to 64 bytes hash.
pub const MAX_SIGNED_CONTENT_SIZE: usize = 64 + 33 + 1 + 64;

/// Signs CertificateVerify content on behalf of a certificate chain.
pub trait Signer {
    /// Signature scheme the signatures are produced under.
    fn scheme(&self) -> u16;
    fn sign(&self, content: &[u8]) -> Result<Vec<u8>, Error>;
}

/// Verifies the peer's CertificateVerify signature.
///
/// Consumed on use. `verify(&[], &[])` is the release call: it checks
/// nothing and must succeed, freeing whatever the verifier holds.
pub trait SignatureVerifier {
    fn verify(self: Box<Self>, content: &[u8], signature: &[u8]) -> Result<(), Error>;
}

/// A certificate chain selected for sending, with its signer.
pub struct CertificateChain<'a> {
    pub scheme: u16,
    /// End-entity certificate first, DER encoded.
    pub certificates: &'a [Vec<u8>],
    pub signer: &'a dyn Signer,
}

/// Supplies and checks certificates for handshakes.
pub trait CertificateContext {
    /// Select a chain for `server_name` acceptable to a peer advertising
    /// `signature_schemes`.
    fn lookup(
        &self,
        server_name: Option<&str>,
        signature_schemes: &[u16],
    ) -> Result<CertificateChain<'_>, Error>;

    /// Inspect the peer's chain (end-entity first) and return the verifier
    /// for its CertificateVerify.
    fn verify(&self, certificates: &[&[u8]]) -> Result<Box<dyn SignatureVerifier>, Error>;
}

/// Build the content signed in CertificateVerify (RFC 8446 section 4.4.3):
/// 64 bytes of 0x20, the context string, a zero byte, the transcript hash.
pub fn certificate_verify_content(
    context: &[u8],
    transcript_hash: &[u8],
) -> heapless::Vec<u8, MAX_SIGNED_CONTENT_SIZE> {
    let mut content = heapless::Vec::new();
    let _ = content.extend_from_slice(&[0x20; 64]);
    let _ = content.extend_from_slice(context);
    let _ = content.push(0x00);
    let _ = content.extend_from_slice(transcript_hash);
    content
}

// ---------------------------------------------------------------------------
// Ed25519 implementation

/// Ed25519 signer over a 32-byte seed.
pub struct Ed25519Signer {
    key: ed25519_dalek::SigningKey,
}

impl Ed25519Signer {
    pub fn new(seed: &[u8; 32]) -> Self {
        Self {
            key: ed25519_dalek::SigningKey::from_bytes(seed),
        }
    }

    pub fn public_key(&self) -> [u8; 32] {
        self.key.verifying_key().to_bytes()
    }
}

impl Signer for Ed25519Signer {
    fn scheme(&self) -> u16 {
        SIGSCHEME_ED25519
    }
    fn sign(&self, content: &[u8]) -> Result<Vec<u8>, Error> {
        use ed25519_dalek::Signer as _;
        Ok(self.key.sign(content).to_bytes().to_vec())
    }
}

struct Ed25519Verifier {
    key: ed25519_dalek::VerifyingKey,
}

impl SignatureVerifier for Ed25519Verifier {
    fn verify(self: Box<Self>, content: &[u8], signature: &[u8]) -> Result<(), Error> {
        use ed25519_dalek::Verifier as _;
        if content.is_empty() && signature.is_empty() {
            // release call, nothing to check
            return Ok(());
        }
        let sig: [u8; 64] = signature
            .try_into()
            .map_err(|_| Error::SelfAlert(AlertDescription::DecryptError))?;
        self.key
            .verify(content, &ed25519_dalek::Signature::from_bytes(&sig))
            .map_err(|_| Error::SelfAlert(AlertDescription::DecryptError))
    }
}

/// Certificate context holding one self-signed Ed25519 certificate.
///
/// Servers construct it with a seed; clients that only verify use
/// [`Ed25519CertificateContext::verify_only`]. Peer chains are trusted if
/// their end-entity certificate carries a well-formed Ed25519 key; chain
/// building against a root store is out of scope here and belongs to a
/// caller-provided `CertificateContext`.
pub struct Ed25519CertificateContext {
    chain: Vec<Vec<u8>>,
    signer: Option<Ed25519Signer>,
}

impl Ed25519CertificateContext {
    /// Context with a signing key and a freshly built certificate for it.
    pub fn new(seed: &[u8; 32]) -> Self {
        let signer = Ed25519Signer::new(seed);
        let cert = build_ed25519_cert_der(&signer.public_key());
        Self {
            chain: alloc::vec![cert],
            signer: Some(signer),
        }
    }

    /// Verification-only context (no chain to present).
    pub fn verify_only() -> Self {
        Self {
            chain: Vec::new(),
            signer: None,
        }
    }
}

impl CertificateContext for Ed25519CertificateContext {
    fn lookup(
        &self,
        _server_name: Option<&str>,
        signature_schemes: &[u16],
    ) -> Result<CertificateChain<'_>, Error> {
        let signer = self
            .signer
            .as_ref()
            .ok_or(Error::SelfAlert(AlertDescription::HandshakeFailure))?;
        if !signature_schemes.contains(&SIGSCHEME_ED25519) {
            return Err(Error::SelfAlert(AlertDescription::HandshakeFailure));
        }
        Ok(CertificateChain {
            scheme: SIGSCHEME_ED25519,
            certificates: &self.chain,
            signer,
        })
    }

    fn verify(&self, certificates: &[&[u8]]) -> Result<Box<dyn SignatureVerifier>, Error> {
        let end_entity = certificates
            .first()
            .ok_or(Error::SelfAlert(AlertDescription::CertificateUnknown))?;
        let raw = extract_ed25519_pubkey(end_entity)?;
        let key = ed25519_dalek::VerifyingKey::from_bytes(&raw)
            .map_err(|_| Error::SelfAlert(AlertDescription::BadCertificate))?;
        Ok(Box::new(Ed25519Verifier { key }))
    }
}

/// Extract an Ed25519 public key from a DER certificate.
///
/// Minimal ASN.1 walk: locate the Ed25519 OID (1.3.101.112) and take the
/// 33-byte BIT STRING that follows it in the SubjectPublicKeyInfo.
pub fn extract_ed25519_pubkey(cert_der: &[u8]) -> Result<[u8; 32], Error> {
    const ED25519_OID: &[u8] = &[0x06, 0x03, 0x2b, 0x65, 0x70];
    let oid_pos = find_subsequence(cert_der, ED25519_OID)
        .ok_or(Error::SelfAlert(AlertDescription::BadCertificate))?;
    let after_oid = oid_pos + ED25519_OID.len();

    for i in after_oid..cert_der.len().saturating_sub(34) {
        if cert_der[i] != 0x03 {
            continue;
        }
        // BIT STRING of length 33: unused-bits byte plus the 32-byte key
        if cert_der[i + 1] != 33 {
            continue;
        }
        if cert_der[i + 2] != 0x00 {
            return Err(Error::SelfAlert(AlertDescription::BadCertificate));
        }
        let key_start = i + 3;
        let mut key = [0u8; 32];
        key.copy_from_slice(&cert_der[key_start..key_start + 32]);
        return Ok(key);
    }
    Err(Error::SelfAlert(AlertDescription::BadCertificate))
}

/// Build a minimal self-signed DER certificate around an Ed25519 key.
///
/// X.509v3 shape with fixed issuer/subject (CN=tls-server), fixed validity,
/// and a placeholder signature. Enough structure for the verify path to
/// find the SubjectPublicKeyInfo.
pub fn build_ed25519_cert_der(public_key: &[u8; 32]) -> Vec<u8> {
    #[rustfmt::skip]
    const TEMPLATE: &[u8] = &[
        // SEQUENCE (Certificate)
        0x30, 0x81, 0xd6,
          // SEQUENCE (TBSCertificate)
          0x30, 0x81, 0x89,
            // [0] EXPLICIT INTEGER v3 (2)
            0xa0, 0x03, 0x02, 0x01, 0x02,
            // INTEGER serialNumber = 1
            0x02, 0x01, 0x01,
            // SEQUENCE (signature algorithm OID = Ed25519)
            0x30, 0x05, 0x06, 0x03, 0x2b, 0x65, 0x70,
            // SEQUENCE (issuer: CN=tls-server)
            0x30, 0x15,
              0x31, 0x13, 0x30, 0x11,
                0x06, 0x03, 0x55, 0x04, 0x03,  // OID 2.5.4.3 (CN)
                0x0c, 0x0a,                    // UTF8String length 10
                b't', b'l', b's', b'-', b's', b'e', b'r', b'v', b'e', b'r',
            // SEQUENCE (validity)
            0x30, 0x1e,
              0x17, 0x0d, b'2', b'5', b'0', b'1', b'0', b'1',
              b'0', b'0', b'0', b'0', b'0', b'0', b'Z',
              0x17, 0x0d, b'3', b'5', b'0', b'1', b'0', b'1',
              b'0', b'0', b'0', b'0', b'0', b'0', b'Z',
            // SEQUENCE (subject: CN=tls-server)
            0x30, 0x15,
              0x31, 0x13, 0x30, 0x11,
                0x06, 0x03, 0x55, 0x04, 0x03,
                0x0c, 0x0a,
                b't', b'l', b's', b'-', b's', b'e', b'r', b'v', b'e', b'r',
            // SEQUENCE (SubjectPublicKeyInfo)
            0x30, 0x2a,
              0x30, 0x05, 0x06, 0x03, 0x2b, 0x65, 0x70,
              // BIT STRING: 0x00 padding + 32 bytes public key
              0x03, 0x21, 0x00,
              0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
              0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
              0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
              0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
          // SEQUENCE (signatureAlgorithm = Ed25519)
          0x30, 0x05, 0x06, 0x03, 0x2b, 0x65, 0x70,
          // BIT STRING (placeholder signature)
          0x03, 0x41, 0x00,
          0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
          0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
          0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
          0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
          0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
          0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
          0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
          0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    ];

    let mut cert = TEMPLATE.to_vec();
    // key placeholder sits right after the 03 21 00 BIT STRING header
    if let Some(pos) = find_subsequence(&cert, &[0x03, 0x21, 0x00]) {
        cert[pos + 3..pos + 3 + 32].copy_from_slice(public_key);
    }
    cert
}

fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    (0..=(haystack.len() - needle.len())).find(|&i| haystack[i..i + needle.len()] == *needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signed_content_format() {
        let hash = [0xab; 32];
        let content = certificate_verify_content(SERVER_CONTEXT, &hash);
        assert!(content[..64].iter().all(|&b| b == 0x20));
        assert_eq!(&content[64..64 + SERVER_CONTEXT.len()], SERVER_CONTEXT);
        assert_eq!(content[64 + SERVER_CONTEXT.len()], 0x00);
        assert_eq!(&content[64 + SERVER_CONTEXT.len() + 1..], &hash);
    }

    #[test]
    fn signed_content_sha384_hash() {
        let hash = [0xcd; 48];
        let content = certificate_verify_content(CLIENT_CONTEXT, &hash);
        assert_eq!(content.len(), 64 + CLIENT_CONTEXT.len() + 1 + 48);
    }

    #[test]
    fn sign_then_verify_through_context() {
        let ctx = Ed25519CertificateContext::new(&[0x42; 32]);
        let hash = [0xab; 32];
        let content = certificate_verify_content(SERVER_CONTEXT, &hash);

        let chain = ctx.lookup(None, &[SIGSCHEME_ED25519]).unwrap();
        assert_eq!(chain.scheme, SIGSCHEME_ED25519);
        assert_eq!(chain.certificates.len(), 1);
        let signature = chain.signer.sign(&content).unwrap();

        let certs: Vec<&[u8]> = chain.certificates.iter().map(|c| c.as_slice()).collect();
        let verifier = ctx.verify(&certs).unwrap();
        verifier.verify(&content, &signature).unwrap();
    }

    #[test]
    fn verify_rejects_wrong_signer() {
        let server = Ed25519CertificateContext::new(&[0x42; 32]);
        let impostor = Ed25519CertificateContext::new(&[0x43; 32]);
        let hash = [0xab; 32];
        let content = certificate_verify_content(SERVER_CONTEXT, &hash);

        let chain = impostor.lookup(None, &[SIGSCHEME_ED25519]).unwrap();
        let signature = chain.signer.sign(&content).unwrap();

        let server_chain = server.lookup(None, &[SIGSCHEME_ED25519]).unwrap();
        let certs: Vec<&[u8]> = server_chain
            .certificates
            .iter()
            .map(|c| c.as_slice())
            .collect();
        let verifier = server.verify(&certs).unwrap();
        assert!(verifier.verify(&content, &signature).is_err());
    }

    #[test]
    fn release_call_always_succeeds() {
        let ctx = Ed25519CertificateContext::new(&[0x42; 32]);
        let chain = ctx.lookup(None, &[SIGSCHEME_ED25519]).unwrap();
        let certs: Vec<&[u8]> = chain.certificates.iter().map(|c| c.as_slice()).collect();
        let verifier = ctx.verify(&certs).unwrap();
        verifier.verify(&[], &[]).unwrap();
    }

    #[test]
    fn lookup_requires_matching_scheme() {
        let ctx = Ed25519CertificateContext::new(&[0x42; 32]);
        assert!(ctx.lookup(None, &[0x0403]).is_err());
        assert!(ctx.lookup(None, &[SIGSCHEME_ED25519, 0x0403]).is_ok());
    }

    #[test]
    fn verify_only_context_cannot_lookup() {
        let ctx = Ed25519CertificateContext::verify_only();
        assert!(ctx.lookup(None, &[SIGSCHEME_ED25519]).is_err());
    }

    #[test]
    fn pubkey_roundtrips_through_cert() {
        let signer = Ed25519Signer::new(&[0x55; 32]);
        let cert = build_ed25519_cert_der(&signer.public_key());
        assert_eq!(extract_ed25519_pubkey(&cert).unwrap(), signer.public_key());
    }

    #[test]
    fn extract_rejects_garbage() {
        assert!(extract_ed25519_pubkey(&[0xde, 0xad, 0xbe, 0xef]).is_err());
    }
}
