//! RustCrypto-backed algorithm implementations.
//!
//! Provides SHA-256/SHA-384 (with their HMAC and HKDF constructions),
//! AES-128-GCM, AES-256-GCM, ChaCha20-Poly1305, X25519 and secp256r1 key
//! exchange, the three TLS 1.3 cipher suites built from them, and an
//! OS-backed random source.

use alloc::boxed::Box;

use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::AeadInPlace;
use aes_gcm::KeyInit;
use hmac::Mac;
use p256::elliptic_curve::sec1::ToEncodedPoint;
use sha2::Digest;
use zeroize::{Zeroize, Zeroizing};

use crate::crypto::{
    AeadAlgorithm, AeadCipher, CipherSuite, CryptoProvider, DigestBytes, HashAlgorithm,
    HashContext, KeyExchangeAlgorithm, KeyExchangeContext, SecureRandom, SharedSecret,
    GROUP_SECP256R1, GROUP_X25519, MAX_PUBLIC_KEY_SIZE, TAG_SIZE, TLS_AES_128_GCM_SHA256,
    TLS_AES_256_GCM_SHA384, TLS_CHACHA20_POLY1305_SHA256,
};
use crate::error::{AlertDescription, Error};

fn digest_bytes(raw: &[u8]) -> DigestBytes {
    let mut out = DigestBytes::new();
    let _ = out.extend_from_slice(raw);
    out
}

// ---------------------------------------------------------------------------
// Hashes

pub struct Sha256Algorithm;
pub struct Sha384Algorithm;

pub static SHA256: Sha256Algorithm = Sha256Algorithm;
pub static SHA384: Sha384Algorithm = Sha384Algorithm;

struct Sha256Context(sha2::Sha256);
struct Sha384Context(sha2::Sha384);
struct HmacSha256Context(hmac::Hmac<sha2::Sha256>);
struct HmacSha384Context(hmac::Hmac<sha2::Sha384>);

impl HashContext for Sha256Context {
    fn update(&mut self, data: &[u8]) {
        Digest::update(&mut self.0, data);
    }
    fn finalize(self: Box<Self>) -> DigestBytes {
        digest_bytes(&self.0.finalize())
    }
    fn finalize_reset(&mut self) -> DigestBytes {
        digest_bytes(&self.0.finalize_reset())
    }
    fn snapshot(&self) -> DigestBytes {
        digest_bytes(&self.0.clone().finalize())
    }
}

impl HashContext for Sha384Context {
    fn update(&mut self, data: &[u8]) {
        Digest::update(&mut self.0, data);
    }
    fn finalize(self: Box<Self>) -> DigestBytes {
        digest_bytes(&self.0.finalize())
    }
    fn finalize_reset(&mut self) -> DigestBytes {
        digest_bytes(&self.0.finalize_reset())
    }
    fn snapshot(&self) -> DigestBytes {
        digest_bytes(&self.0.clone().finalize())
    }
}

impl HashContext for HmacSha256Context {
    fn update(&mut self, data: &[u8]) {
        Mac::update(&mut self.0, data);
    }
    fn finalize(self: Box<Self>) -> DigestBytes {
        digest_bytes(&self.0.finalize().into_bytes())
    }
    fn finalize_reset(&mut self) -> DigestBytes {
        digest_bytes(&self.0.finalize_reset().into_bytes())
    }
    fn snapshot(&self) -> DigestBytes {
        digest_bytes(&self.0.clone().finalize().into_bytes())
    }
}

impl HashContext for HmacSha384Context {
    fn update(&mut self, data: &[u8]) {
        Mac::update(&mut self.0, data);
    }
    fn finalize(self: Box<Self>) -> DigestBytes {
        digest_bytes(&self.0.finalize().into_bytes())
    }
    fn finalize_reset(&mut self) -> DigestBytes {
        digest_bytes(&self.0.finalize_reset().into_bytes())
    }
    fn snapshot(&self) -> DigestBytes {
        digest_bytes(&self.0.clone().finalize().into_bytes())
    }
}

impl HashAlgorithm for Sha256Algorithm {
    fn digest_size(&self) -> usize {
        32
    }
    fn block_size(&self) -> usize {
        64
    }
    fn context(&self) -> Box<dyn HashContext> {
        Box::new(Sha256Context(sha2::Sha256::new()))
    }
    fn hmac(&self, key: &[u8]) -> Result<Box<dyn HashContext>, Error> {
        let mac = <hmac::Hmac<sha2::Sha256> as Mac>::new_from_slice(key)
            .map_err(|_| Error::IncompatibleKey)?;
        Ok(Box::new(HmacSha256Context(mac)))
    }
    fn hkdf_extract(&self, salt: &[u8], ikm: &[u8], prk: &mut [u8]) -> Result<(), Error> {
        if prk.len() != 32 {
            return Err(Error::IncompatibleKey);
        }
        let (out, _) = hkdf::Hkdf::<sha2::Sha256>::extract(Some(salt), ikm);
        prk.copy_from_slice(&out);
        Ok(())
    }
    fn hkdf_expand(&self, prk: &[u8], info: &[u8], okm: &mut [u8]) -> Result<(), Error> {
        let kdf = hkdf::Hkdf::<sha2::Sha256>::from_prk(prk).map_err(|_| Error::IncompatibleKey)?;
        kdf.expand(info, okm).map_err(|_| Error::IncompatibleKey)
    }
}

impl HashAlgorithm for Sha384Algorithm {
    fn digest_size(&self) -> usize {
        48
    }
    fn block_size(&self) -> usize {
        128
    }
    fn context(&self) -> Box<dyn HashContext> {
        Box::new(Sha384Context(sha2::Sha384::new()))
    }
    fn hmac(&self, key: &[u8]) -> Result<Box<dyn HashContext>, Error> {
        let mac = <hmac::Hmac<sha2::Sha384> as Mac>::new_from_slice(key)
            .map_err(|_| Error::IncompatibleKey)?;
        Ok(Box::new(HmacSha384Context(mac)))
    }
    fn hkdf_extract(&self, salt: &[u8], ikm: &[u8], prk: &mut [u8]) -> Result<(), Error> {
        if prk.len() != 48 {
            return Err(Error::IncompatibleKey);
        }
        let (out, _) = hkdf::Hkdf::<sha2::Sha384>::extract(Some(salt), ikm);
        prk.copy_from_slice(&out);
        Ok(())
    }
    fn hkdf_expand(&self, prk: &[u8], info: &[u8], okm: &mut [u8]) -> Result<(), Error> {
        let kdf = hkdf::Hkdf::<sha2::Sha384>::from_prk(prk).map_err(|_| Error::IncompatibleKey)?;
        kdf.expand(info, okm).map_err(|_| Error::IncompatibleKey)
    }
}

// ---------------------------------------------------------------------------
// AEADs

pub struct Aes128GcmAlgorithm;
pub struct Aes256GcmAlgorithm;
pub struct ChaCha20Poly1305Algorithm;

pub static AES_128_GCM: Aes128GcmAlgorithm = Aes128GcmAlgorithm;
pub static AES_256_GCM: Aes256GcmAlgorithm = Aes256GcmAlgorithm;
pub static CHACHA20_POLY1305: ChaCha20Poly1305Algorithm = ChaCha20Poly1305Algorithm;

struct Aes128GcmCipher(aes_gcm::Aes128Gcm);
struct Aes256GcmCipher(aes_gcm::Aes256Gcm);
struct ChaCha20Poly1305Cipher(chacha20poly1305::ChaCha20Poly1305);

macro_rules! impl_aead_cipher {
    ($cipher:ident) => {
        impl AeadCipher for $cipher {
            fn seal_in_place(
                &self,
                nonce: &[u8],
                aad: &[u8],
                buf: &mut [u8],
                payload_len: usize,
            ) -> Result<usize, Error> {
                if nonce.len() != 12 || buf.len() < payload_len + TAG_SIZE {
                    return Err(Error::IncompatibleKey);
                }
                let tag = self
                    .0
                    .encrypt_in_place_detached(
                        GenericArray::from_slice(nonce),
                        aad,
                        &mut buf[..payload_len],
                    )
                    .map_err(|_| Error::Library)?;
                buf[payload_len..payload_len + TAG_SIZE].copy_from_slice(&tag);
                Ok(payload_len + TAG_SIZE)
            }

            fn open_in_place(
                &self,
                nonce: &[u8],
                aad: &[u8],
                buf: &mut [u8],
                ciphertext_len: usize,
            ) -> Result<usize, Error> {
                if nonce.len() != 12
                    || ciphertext_len < TAG_SIZE
                    || buf.len() < ciphertext_len
                {
                    return Err(Error::SelfAlert(AlertDescription::BadRecordMac));
                }
                let plaintext_len = ciphertext_len - TAG_SIZE;
                let tag = GenericArray::clone_from_slice(&buf[plaintext_len..ciphertext_len]);
                self.0
                    .decrypt_in_place_detached(
                        GenericArray::from_slice(nonce),
                        aad,
                        &mut buf[..plaintext_len],
                        &tag,
                    )
                    .map_err(|_| Error::SelfAlert(AlertDescription::BadRecordMac))?;
                Ok(plaintext_len)
            }
        }
    };
}

impl_aead_cipher!(Aes128GcmCipher);
impl_aead_cipher!(Aes256GcmCipher);
impl_aead_cipher!(ChaCha20Poly1305Cipher);

impl AeadAlgorithm for Aes128GcmAlgorithm {
    fn key_size(&self) -> usize {
        16
    }
    fn iv_size(&self) -> usize {
        12
    }
    fn new_cipher(&self, key: &[u8]) -> Result<Box<dyn AeadCipher>, Error> {
        let cipher = aes_gcm::Aes128Gcm::new_from_slice(key).map_err(|_| Error::IncompatibleKey)?;
        Ok(Box::new(Aes128GcmCipher(cipher)))
    }
}

impl AeadAlgorithm for Aes256GcmAlgorithm {
    fn key_size(&self) -> usize {
        32
    }
    fn iv_size(&self) -> usize {
        12
    }
    fn new_cipher(&self, key: &[u8]) -> Result<Box<dyn AeadCipher>, Error> {
        let cipher = aes_gcm::Aes256Gcm::new_from_slice(key).map_err(|_| Error::IncompatibleKey)?;
        Ok(Box::new(Aes256GcmCipher(cipher)))
    }
}

impl AeadAlgorithm for ChaCha20Poly1305Algorithm {
    fn key_size(&self) -> usize {
        32
    }
    fn iv_size(&self) -> usize {
        12
    }
    fn new_cipher(&self, key: &[u8]) -> Result<Box<dyn AeadCipher>, Error> {
        let cipher = chacha20poly1305::ChaCha20Poly1305::new_from_slice(key)
            .map_err(|_| Error::IncompatibleKey)?;
        Ok(Box::new(ChaCha20Poly1305Cipher(cipher)))
    }
}

// ---------------------------------------------------------------------------
// Key exchange

pub struct X25519Algorithm;
pub struct Secp256r1Algorithm;

pub static X25519: X25519Algorithm = X25519Algorithm;
pub static SECP256R1: Secp256r1Algorithm = Secp256r1Algorithm;

struct X25519Context {
    secret: x25519_dalek::StaticSecret,
    public: [u8; 32],
}

impl KeyExchangeContext for X25519Context {
    fn complete(
        self: Box<Self>,
        peer_public: Option<&[u8]>,
    ) -> Result<Option<SharedSecret>, Error> {
        let Some(peer) = peer_public else {
            return Ok(None);
        };
        let peer: [u8; 32] = peer
            .try_into()
            .map_err(|_| Error::SelfAlert(AlertDescription::IllegalParameter))?;
        let shared = self.secret.diffie_hellman(&x25519_dalek::PublicKey::from(peer));
        if !shared.was_contributory() {
            return Err(Error::SelfAlert(AlertDescription::IllegalParameter));
        }
        Ok(Some(Zeroizing::new(shared.as_bytes().to_vec())))
    }

    fn public_key(&self) -> &[u8] {
        &self.public
    }
}

impl KeyExchangeAlgorithm for X25519Algorithm {
    fn group(&self) -> u16 {
        GROUP_X25519
    }
    fn public_key_size(&self) -> usize {
        32
    }
    fn create(&self, random: &dyn SecureRandom) -> Result<Box<dyn KeyExchangeContext>, Error> {
        let mut seed = [0u8; 32];
        random.fill(&mut seed);
        let secret = x25519_dalek::StaticSecret::from(seed);
        seed.zeroize();
        let public = *x25519_dalek::PublicKey::from(&secret).as_bytes();
        Ok(Box::new(X25519Context { secret, public }))
    }
    fn exchange(
        &self,
        random: &dyn SecureRandom,
        peer_public: &[u8],
    ) -> Result<(heapless::Vec<u8, MAX_PUBLIC_KEY_SIZE>, SharedSecret), Error> {
        let ctx = self.create(random)?;
        let mut public = heapless::Vec::new();
        let _ = public.extend_from_slice(ctx.public_key());
        match ctx.complete(Some(peer_public))? {
            Some(secret) => Ok((public, secret)),
            None => Err(Error::Library),
        }
    }
}

struct Secp256r1Context {
    scalar: p256::NonZeroScalar,
    public: [u8; 65],
}

impl KeyExchangeContext for Secp256r1Context {
    fn complete(
        self: Box<Self>,
        peer_public: Option<&[u8]>,
    ) -> Result<Option<SharedSecret>, Error> {
        let Some(peer) = peer_public else {
            return Ok(None);
        };
        let peer = p256::PublicKey::from_sec1_bytes(peer)
            .map_err(|_| Error::SelfAlert(AlertDescription::IllegalParameter))?;
        let shared = p256::ecdh::diffie_hellman(&self.scalar, peer.as_affine());
        Ok(Some(Zeroizing::new(shared.raw_secret_bytes().to_vec())))
    }

    fn public_key(&self) -> &[u8] {
        &self.public
    }
}

impl KeyExchangeAlgorithm for Secp256r1Algorithm {
    fn group(&self) -> u16 {
        GROUP_SECP256R1
    }
    fn public_key_size(&self) -> usize {
        65
    }
    fn create(&self, random: &dyn SecureRandom) -> Result<Box<dyn KeyExchangeContext>, Error> {
        // Rejection-sample a valid scalar; nearly always succeeds first try.
        let scalar = loop {
            let mut candidate = [0u8; 32];
            random.fill(&mut candidate);
            let maybe: Option<p256::NonZeroScalar> =
                p256::NonZeroScalar::from_repr(candidate.into()).into();
            candidate.zeroize();
            if let Some(scalar) = maybe {
                break scalar;
            }
        };
        let point = p256::PublicKey::from_secret_scalar(&scalar).to_encoded_point(false);
        let mut public = [0u8; 65];
        public.copy_from_slice(point.as_bytes());
        Ok(Box::new(Secp256r1Context { scalar, public }))
    }
    fn exchange(
        &self,
        random: &dyn SecureRandom,
        peer_public: &[u8],
    ) -> Result<(heapless::Vec<u8, MAX_PUBLIC_KEY_SIZE>, SharedSecret), Error> {
        let ctx = self.create(random)?;
        let mut public = heapless::Vec::new();
        let _ = public.extend_from_slice(ctx.public_key());
        match ctx.complete(Some(peer_public))? {
            Some(secret) => Ok((public, secret)),
            None => Err(Error::Library),
        }
    }
}

// ---------------------------------------------------------------------------
// Suites and provider

pub static SUITE_AES_128_GCM_SHA256: CipherSuite = CipherSuite {
    id: TLS_AES_128_GCM_SHA256,
    aead: &AES_128_GCM,
    hash: &SHA256,
};

pub static SUITE_AES_256_GCM_SHA384: CipherSuite = CipherSuite {
    id: TLS_AES_256_GCM_SHA384,
    aead: &AES_256_GCM,
    hash: &SHA384,
};

pub static SUITE_CHACHA20_POLY1305_SHA256: CipherSuite = CipherSuite {
    id: TLS_CHACHA20_POLY1305_SHA256,
    aead: &CHACHA20_POLY1305,
    hash: &SHA256,
};

/// OS-backed random source.
#[cfg(feature = "std")]
pub struct SystemRandom;

#[cfg(feature = "std")]
impl SecureRandom for SystemRandom {
    fn fill(&self, buf: &mut [u8]) {
        use rand::RngCore;
        rand::rngs::OsRng.fill_bytes(buf);
    }
}

/// Provider over a caller-chosen random source and algorithm tables.
pub struct RustCryptoProvider<R: SecureRandom> {
    pub random: R,
    pub cipher_suites: &'static [&'static CipherSuite],
    pub key_exchanges: &'static [&'static dyn KeyExchangeAlgorithm],
}

impl<R: SecureRandom> CryptoProvider for RustCryptoProvider<R> {
    fn random(&self) -> &dyn SecureRandom {
        &self.random
    }
    fn cipher_suites(&self) -> &[&'static CipherSuite] {
        self.cipher_suites
    }
    fn key_exchanges(&self) -> &[&'static dyn KeyExchangeAlgorithm] {
        self.key_exchanges
    }
}

/// All supported suites, in preference order.
pub static ALL_CIPHER_SUITES: [&CipherSuite; 3] = [
    &SUITE_AES_128_GCM_SHA256,
    &SUITE_AES_256_GCM_SHA384,
    &SUITE_CHACHA20_POLY1305_SHA256,
];

/// All supported key exchanges, in preference order.
pub static ALL_KEY_EXCHANGES: [&dyn KeyExchangeAlgorithm; 2] = [&X25519, &SECP256R1];

/// Everything this backend supports, over the OS random source.
#[cfg(feature = "std")]
pub fn default_provider() -> RustCryptoProvider<SystemRandom> {
    RustCryptoProvider {
        random: SystemRandom,
        cipher_suites: &ALL_CIPHER_SUITES,
        key_exchanges: &ALL_KEY_EXCHANGES,
    }
}
