//! TLS 1.3 key schedule (RFC 8446 section 7.1) and transcript hash.
//!
//! The schedule walks three extraction levels: early secret (no PSK here,
//! so extracted from zeros), handshake secret (mixed with the ECDHE shared
//! secret), and master secret. Traffic secrets branch off each level bound
//! to a transcript hash. All buffers are sized for the negotiated hash, so
//! SHA-256 and SHA-384 suites share one code path.

use alloc::boxed::Box;

use zeroize::Zeroize;

use crate::crypto::hkdf::{derive_secret, hkdf_expand_label};
use crate::crypto::{DigestBytes, HashAlgorithm, HashContext, MAX_DIGEST_SIZE};
use crate::error::Error;

/// Running hash of the handshake transcript.
///
/// Snapshots clone the inner state, so a hash "up to this message" never
/// disturbs the live computation.
pub struct Transcript {
    ctx: Box<dyn HashContext>,
}

impl Transcript {
    pub fn new(hash: &dyn HashAlgorithm) -> Self {
        Self {
            ctx: hash.context(),
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        self.ctx.update(data);
    }

    pub fn current_hash(&self) -> DigestBytes {
        self.ctx.snapshot()
    }
}

/// Digest-sized secret, wiped on drop.
pub struct Secret {
    bytes: [u8; MAX_DIGEST_SIZE],
    len: usize,
}

impl Secret {
    fn zero(len: usize) -> Self {
        Self {
            bytes: [0u8; MAX_DIGEST_SIZE],
            len,
        }
    }

    pub(crate) fn from_slice(bytes: &[u8]) -> Self {
        let mut out = Self::zero(bytes.len().min(MAX_DIGEST_SIZE));
        let len = out.len;
        out.bytes[..len].copy_from_slice(&bytes[..len]);
        out
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes[..self.len]
    }

    fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.bytes[..self.len]
    }
}

impl Drop for Secret {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl Clone for Secret {
    fn clone(&self) -> Self {
        let mut out = Self::zero(self.len);
        out.bytes[..self.len].copy_from_slice(self.as_slice());
        out
    }
}

/// The three-level secret chain for one connection.
pub struct KeySchedule {
    hash: &'static dyn HashAlgorithm,
    early_secret: Secret,
    handshake_secret: Secret,
    master_secret: Secret,
}

impl KeySchedule {
    /// Start the schedule: Early-Secret = HKDF-Extract(0, 0). External PSKs
    /// would feed in here; none are supported.
    pub fn new(hash: &'static dyn HashAlgorithm) -> Result<Self, Error> {
        let len = hash.digest_size();
        let zeros = [0u8; MAX_DIGEST_SIZE];
        let mut early_secret = Secret::zero(len);
        hash.hkdf_extract(&zeros[..len], &zeros[..len], early_secret.as_mut_slice())?;
        Ok(Self {
            hash,
            early_secret,
            handshake_secret: Secret::zero(len),
            master_secret: Secret::zero(len),
        })
    }

    pub fn hash(&self) -> &'static dyn HashAlgorithm {
        self.hash
    }

    fn empty_transcript_hash(&self) -> DigestBytes {
        self.hash.context().finalize()
    }

    /// Handshake-Secret = HKDF-Extract(Derive-Secret(early, "derived"), ECDHE).
    pub fn derive_handshake_secret(&mut self, shared_secret: &[u8]) -> Result<(), Error> {
        let len = self.hash.digest_size();
        let empty_hash = self.empty_transcript_hash();
        let mut derived = Secret::zero(len);
        derive_secret(
            self.hash,
            self.early_secret.as_slice(),
            b"derived",
            &empty_hash,
            derived.as_mut_slice(),
        )?;
        self.hash.hkdf_extract(
            derived.as_slice(),
            shared_secret,
            self.handshake_secret.as_mut_slice(),
        )
    }

    /// Master-Secret = HKDF-Extract(Derive-Secret(handshake, "derived"), 0).
    pub fn derive_master_secret(&mut self) -> Result<(), Error> {
        let len = self.hash.digest_size();
        let empty_hash = self.empty_transcript_hash();
        let zeros = [0u8; MAX_DIGEST_SIZE];
        let mut derived = Secret::zero(len);
        derive_secret(
            self.hash,
            self.handshake_secret.as_slice(),
            b"derived",
            &empty_hash,
            derived.as_mut_slice(),
        )?;
        self.hash.hkdf_extract(
            derived.as_slice(),
            &zeros[..len],
            self.master_secret.as_mut_slice(),
        )
    }

    /// Client and server handshake traffic secrets over the ClientHello..
    /// ServerHello transcript hash.
    pub fn handshake_traffic_secrets(
        &self,
        transcript_hash: &[u8],
    ) -> Result<(Secret, Secret), Error> {
        let len = self.hash.digest_size();
        let mut client = Secret::zero(len);
        let mut server = Secret::zero(len);
        derive_secret(
            self.hash,
            self.handshake_secret.as_slice(),
            b"c hs traffic",
            transcript_hash,
            client.as_mut_slice(),
        )?;
        derive_secret(
            self.hash,
            self.handshake_secret.as_slice(),
            b"s hs traffic",
            transcript_hash,
            server.as_mut_slice(),
        )?;
        Ok((client, server))
    }

    /// Client and server application traffic secrets over the ClientHello..
    /// server Finished transcript hash.
    pub fn application_traffic_secrets(
        &self,
        transcript_hash: &[u8],
    ) -> Result<(Secret, Secret), Error> {
        let len = self.hash.digest_size();
        let mut client = Secret::zero(len);
        let mut server = Secret::zero(len);
        derive_secret(
            self.hash,
            self.master_secret.as_slice(),
            b"c ap traffic",
            transcript_hash,
            client.as_mut_slice(),
        )?;
        derive_secret(
            self.hash,
            self.master_secret.as_slice(),
            b"s ap traffic",
            transcript_hash,
            server.as_mut_slice(),
        )?;
        Ok((client, server))
    }

    /// finished_key = HKDF-Expand-Label(traffic_secret, "finished", "", Hash.length).
    pub fn finished_key(&self, traffic_secret: &Secret) -> Result<Secret, Error> {
        let mut key = Secret::zero(self.hash.digest_size());
        hkdf_expand_label(
            self.hash,
            traffic_secret.as_slice(),
            b"finished",
            &[],
            key.as_mut_slice(),
        )?;
        Ok(key)
    }

    /// verify_data = HMAC(finished_key, transcript_hash).
    pub fn finished_verify_data(
        &self,
        traffic_secret: &Secret,
        transcript_hash: &[u8],
    ) -> Result<DigestBytes, Error> {
        let key = self.finished_key(traffic_secret)?;
        let mut mac = self.hash.hmac(key.as_slice())?;
        mac.update(transcript_hash);
        Ok(mac.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::rustcrypto::{SHA256, SHA384};
    use hex_literal::hex;

    // RFC 8448 section 3, simple 1-RTT handshake.
    const SHARED_SECRET: [u8; 32] =
        hex!("8bd4054fb55b9d63fdfbacf9f04b9f0d35e6d63f537563efd46272900f89492d");
    const HELLO_HASH: [u8; 32] =
        hex!("860c06edc07858ee8e78f0e7428c58edd6b43f2ca3e6e95f02ed063cf0e1cad8");

    fn schedule_at_handshake() -> KeySchedule {
        let mut ks = KeySchedule::new(&SHA256).unwrap();
        ks.derive_handshake_secret(&SHARED_SECRET).unwrap();
        ks
    }

    #[test]
    fn early_secret_matches_vector() {
        let ks = KeySchedule::new(&SHA256).unwrap();
        assert_eq!(
            ks.early_secret.as_slice(),
            hex!("33ad0a1c607ec03b09e6cd9893680ce210adf300aa1f2660e1b22e10f170f92a")
        );
    }

    #[test]
    fn handshake_secret_matches_vector() {
        let ks = schedule_at_handshake();
        assert_eq!(
            ks.handshake_secret.as_slice(),
            hex!("1dc826e93606aa6fdc0aadc12f741b01046aa6b99f691ed221a9f0ca043fbeac")
        );
    }

    #[test]
    fn handshake_traffic_secrets_match_vectors() {
        let ks = schedule_at_handshake();
        let (client, server) = ks.handshake_traffic_secrets(&HELLO_HASH).unwrap();
        assert_eq!(
            client.as_slice(),
            hex!("b3eddb126e067f35a780b3abf45e2d8f3b1a950738f52e9600746a0e27a55a21")
        );
        assert_eq!(
            server.as_slice(),
            hex!("b67b7d690cc16c4e75e54213cb2d37b4e9c912bcded9105d42befd59d391ad38")
        );
    }

    #[test]
    fn master_secret_matches_vector() {
        let mut ks = schedule_at_handshake();
        ks.derive_master_secret().unwrap();
        assert_eq!(
            ks.master_secret.as_slice(),
            hex!("18df06843d13a08bf2a449844c5f8a478001bc4d4c627984d5a41da8d0402919")
        );
    }

    #[test]
    fn application_traffic_secrets_match_vectors() {
        let mut ks = schedule_at_handshake();
        ks.derive_master_secret().unwrap();
        let finished_hash =
            hex!("9608102a0f1ccc6db6250b7b7e417b1a000eaada3daae4777a7686c9ff83df13");
        let (client, server) = ks.application_traffic_secrets(&finished_hash).unwrap();
        assert_eq!(
            client.as_slice(),
            hex!("9e40646ce79a7f9dc05af8889bce6552875afa0b06df0087f792ebb7c17504a5")
        );
        assert_eq!(
            server.as_slice(),
            hex!("a11af9f05531f856ad47116b45a950328204b4f44bfb6b3a4b4f1f3fcb631643")
        );
    }

    #[test]
    fn server_finished_verify_data_matches_vector() {
        let ks = schedule_at_handshake();
        let (_, server) = ks.handshake_traffic_secrets(&HELLO_HASH).unwrap();
        let key = ks.finished_key(&server).unwrap();
        assert_eq!(
            key.as_slice(),
            hex!("008d3b66f816ea559f96b537e885c31fc068bf492c652f01f288a1d8cdc19fc8")
        );
        let cv_hash = hex!("edb7725fa7a3473b031ec8ef65a2485493900138a2b91291407d7951a06110ed");
        let verify = ks.finished_verify_data(&server, &cv_hash).unwrap();
        assert_eq!(
            verify.as_slice(),
            hex!("9b9b141d906337fbd2cbdce71df4deda4ab42c309572cb7fffee5454b78f0718")
        );
    }

    #[test]
    fn sha384_schedule_has_48_byte_secrets() {
        let mut ks = KeySchedule::new(&SHA384).unwrap();
        ks.derive_handshake_secret(&[0x17; 48]).unwrap();
        let hash = [0x42u8; 48];
        let (client, server) = ks.handshake_traffic_secrets(&hash).unwrap();
        assert_eq!(client.as_slice().len(), 48);
        assert_eq!(server.as_slice().len(), 48);
        assert_ne!(client.as_slice(), server.as_slice());
        let verify = ks.finished_verify_data(&client, &hash).unwrap();
        assert_eq!(verify.len(), 48);
    }

    #[test]
    fn transcript_snapshot_is_stable() {
        let mut t = Transcript::new(&SHA256);
        t.update(b"hello");
        let a = t.current_hash();
        let b = t.current_hash();
        assert_eq!(a, b);
        t.update(b" world");
        assert_ne!(t.current_hash(), a);
    }
}
