//! Pluggable crypto backends for the TLS engine.
//!
//! Suite negotiation picks the hash and AEAD at runtime, so the seams here
//! are trait objects: an algorithm descriptor (`HashAlgorithm`,
//! `AeadAlgorithm`, `KeyExchangeAlgorithm`) is a `&'static dyn` handed out
//! by the provider, and live state (a running hash, an armed cipher, a
//! pending key exchange) is a boxed context created from it.

pub mod hkdf;
pub mod rustcrypto;

use alloc::boxed::Box;
use alloc::vec::Vec;
use zeroize::Zeroizing;

use crate::error::Error;

/// Largest digest any supported hash produces (SHA-384 here, SHA-512 cap).
pub const MAX_DIGEST_SIZE: usize = 64;
/// Largest AEAD key any supported cipher takes.
pub const MAX_AEAD_KEY_SIZE: usize = 32;
/// Largest AEAD IV.
pub const MAX_IV_SIZE: usize = 16;
/// AEAD authentication tag size (16 for every TLS 1.3 cipher).
pub const TAG_SIZE: usize = 16;
/// Largest key-share public key (uncompressed SEC1 point for secp256r1).
pub const MAX_PUBLIC_KEY_SIZE: usize = 65;

/// TLS 1.3 cipher suite identifiers (RFC 8446 §B.4).
pub const TLS_AES_128_GCM_SHA256: u16 = 0x1301;
pub const TLS_AES_256_GCM_SHA384: u16 = 0x1302;
pub const TLS_CHACHA20_POLY1305_SHA256: u16 = 0x1303;

/// Named groups (RFC 8446 §4.2.7).
pub const GROUP_SECP256R1: u16 = 0x0017;
pub const GROUP_X25519: u16 = 0x001d;

/// Signature schemes (RFC 8446 §4.2.3).
pub const SIGSCHEME_ECDSA_SECP256R1_SHA256: u16 = 0x0403;
pub const SIGSCHEME_ED25519: u16 = 0x0807;

/// A digest or MAC output, sized for the largest supported hash.
pub type DigestBytes = heapless::Vec<u8, MAX_DIGEST_SIZE>;

/// Key exchange output, wiped on drop.
pub type SharedSecret = Zeroizing<Vec<u8>>;

/// A running hash (or HMAC) computation.
pub trait HashContext {
    fn update(&mut self, data: &[u8]);
    /// Produce the digest, consuming the context.
    fn finalize(self: Box<Self>) -> DigestBytes;
    /// Produce the digest and reset to the initial state.
    fn finalize_reset(&mut self) -> DigestBytes;
    /// Digest of the data absorbed so far, leaving the context undisturbed.
    fn snapshot(&self) -> DigestBytes;
}

/// A hash function together with its HMAC and HKDF constructions.
pub trait HashAlgorithm: Sync {
    fn digest_size(&self) -> usize;
    fn block_size(&self) -> usize;
    /// Fresh hash context.
    fn context(&self) -> Box<dyn HashContext>;
    /// HMAC context keyed with `key`; `finalize` yields the tag.
    fn hmac(&self, key: &[u8]) -> Result<Box<dyn HashContext>, Error>;
    /// HKDF-Extract (RFC 5869). `prk` must be `digest_size` bytes.
    fn hkdf_extract(&self, salt: &[u8], ikm: &[u8], prk: &mut [u8]) -> Result<(), Error>;
    /// HKDF-Expand (RFC 5869) filling all of `okm`.
    fn hkdf_expand(&self, prk: &[u8], info: &[u8], okm: &mut [u8]) -> Result<(), Error>;
}

/// An AEAD cipher armed with a key. The record layer owns nonces and
/// sequence numbers; contexts only ever see the final nonce.
pub trait AeadCipher {
    /// Encrypt `buf[..payload_len]` in place and write the tag into
    /// `buf[payload_len..payload_len + TAG_SIZE]`. Returns ciphertext length
    /// including the tag.
    fn seal_in_place(
        &self,
        nonce: &[u8],
        aad: &[u8],
        buf: &mut [u8],
        payload_len: usize,
    ) -> Result<usize, Error>;

    /// Verify and decrypt `buf[..ciphertext_len]` (tag included) in place.
    /// Returns the plaintext length.
    fn open_in_place(
        &self,
        nonce: &[u8],
        aad: &[u8],
        buf: &mut [u8],
        ciphertext_len: usize,
    ) -> Result<usize, Error>;
}

/// An AEAD algorithm descriptor.
pub trait AeadAlgorithm: Sync {
    fn key_size(&self) -> usize;
    fn iv_size(&self) -> usize;
    fn tag_size(&self) -> usize {
        TAG_SIZE
    }
    /// Arm a cipher with `key` (must be exactly `key_size` bytes).
    fn new_cipher(&self, key: &[u8]) -> Result<Box<dyn AeadCipher>, Error>;
}

/// An in-flight key exchange. The handle is linear: completing it consumes
/// it, so a secret can never be derived twice from one ephemeral key.
pub trait KeyExchangeContext {
    /// Complete the exchange against the peer's public key, or abandon it
    /// by passing `None` (releases the ephemeral key, returns `Ok(None)`).
    fn complete(self: Box<Self>, peer_public: Option<&[u8]>)
        -> Result<Option<SharedSecret>, Error>;

    /// Our public key share, as sent on the wire.
    fn public_key(&self) -> &[u8];
}

/// A key exchange algorithm descriptor.
pub trait KeyExchangeAlgorithm: Sync {
    /// Named group identifier.
    fn group(&self) -> u16;
    fn public_key_size(&self) -> usize;
    /// Generate an ephemeral key pair; the returned context carries the
    /// public share and completes against the peer's share later.
    fn create(&self, random: &dyn SecureRandom) -> Result<Box<dyn KeyExchangeContext>, Error>;
    /// One-shot responder exchange: generate a key pair, derive the secret
    /// against `peer_public`, return our public share and the secret.
    fn exchange(
        &self,
        random: &dyn SecureRandom,
        peer_public: &[u8],
    ) -> Result<(heapless::Vec<u8, MAX_PUBLIC_KEY_SIZE>, SharedSecret), Error>;
}

/// Cryptographically secure random source.
pub trait SecureRandom: Sync {
    fn fill(&self, buf: &mut [u8]);
}

/// A negotiable cipher suite: wire identifier plus its two algorithms.
pub struct CipherSuite {
    pub id: u16,
    pub aead: &'static dyn AeadAlgorithm,
    pub hash: &'static dyn HashAlgorithm,
}

/// The capability set a connection runs on.
pub trait CryptoProvider {
    fn random(&self) -> &dyn SecureRandom;
    /// Supported suites, in preference order.
    fn cipher_suites(&self) -> &[&'static CipherSuite];
    /// Supported key exchanges, in preference order.
    fn key_exchanges(&self) -> &[&'static dyn KeyExchangeAlgorithm];

    fn find_cipher_suite(&self, id: u16) -> Option<&'static CipherSuite> {
        self.cipher_suites().iter().copied().find(|s| s.id == id)
    }

    fn find_key_exchange(&self, group: u16) -> Option<&'static dyn KeyExchangeAlgorithm> {
        self.key_exchanges().iter().copied().find(|k| k.group() == group)
    }
}
