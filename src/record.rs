//! TLS 1.3 record protection (RFC 8446 section 5).
//!
//! An [`AeadState`] is one armed direction: the cipher, the static IV, and
//! the record sequence number. Nonces are built here by XORing the
//! big-endian sequence number into the low bytes of the IV; backends only
//! ever see the finished nonce, so a misused cipher context cannot reuse
//! one.

use alloc::boxed::Box;

use zeroize::Zeroize;

use crate::buffer::OutputBuffer;
use crate::crypto::hkdf::hkdf_expand_label;
use crate::crypto::{AeadCipher, CipherSuite, MAX_AEAD_KEY_SIZE, MAX_IV_SIZE, TAG_SIZE};
use crate::error::{AlertDescription, Error};
use crate::key_schedule::Secret;

/// Record header: type, legacy version, length.
pub const HEADER_SIZE: usize = 5;
/// Plaintext limit per record (2^14).
pub const MAX_PLAINTEXT_SIZE: usize = 16384;
/// Protected-record body limit: plaintext + content type byte + tag + padding allowance.
pub const MAX_CIPHERTEXT_SIZE: usize = MAX_PLAINTEXT_SIZE + 256;

/// Record content types (RFC 8446 section 5.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ContentType {
    ChangeCipherSpec = 20,
    Alert = 21,
    Handshake = 22,
    ApplicationData = 23,
}

impl ContentType {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            20 => Some(Self::ChangeCipherSpec),
            21 => Some(Self::Alert),
            22 => Some(Self::Handshake),
            23 => Some(Self::ApplicationData),
            _ => None,
        }
    }
}

/// Decoded record header.
#[derive(Debug, Clone, Copy)]
pub struct RecordHeader {
    pub content_type: ContentType,
    pub length: usize,
}

/// Decode a 5-byte record header. The legacy version field is ignored on
/// input; peers put 0x0301 or 0x0303 there.
pub fn decode_header(buf: &[u8; HEADER_SIZE]) -> Result<RecordHeader, Error> {
    let content_type = ContentType::from_u8(buf[0])
        .ok_or(Error::SelfAlert(AlertDescription::UnexpectedMessage))?;
    let length = usize::from(u16::from_be_bytes([buf[3], buf[4]]));
    if length > MAX_CIPHERTEXT_SIZE {
        return Err(Error::SelfAlert(AlertDescription::DecodeError));
    }
    Ok(RecordHeader {
        content_type,
        length,
    })
}

fn put_header<const N: usize>(out: &mut OutputBuffer<N>, content_type: ContentType, length: usize) {
    out.extend_from_slice(&[
        content_type as u8,
        0x03,
        0x03,
        (length >> 8) as u8,
        length as u8,
    ]);
}

/// Append an unprotected record (cleartext handshake era).
pub fn plaintext_record<const N: usize>(
    content_type: ContentType,
    payload: &[u8],
    out: &mut OutputBuffer<N>,
) {
    put_header(out, content_type, payload.len());
    out.extend_from_slice(payload);
}

/// One direction of record protection.
pub struct AeadState {
    cipher: Box<dyn AeadCipher>,
    iv: [u8; MAX_IV_SIZE],
    iv_len: usize,
    seq: u64,
}

impl AeadState {
    /// Arm a direction from a traffic secret: key and IV via
    /// HKDF-Expand-Label with "key" and "iv" (RFC 8446 section 7.3).
    pub fn from_traffic_secret(suite: &CipherSuite, secret: &Secret) -> Result<Self, Error> {
        let key_len = suite.aead.key_size();
        let iv_len = suite.aead.iv_size();

        let mut key = [0u8; MAX_AEAD_KEY_SIZE];
        hkdf_expand_label(suite.hash, secret.as_slice(), b"key", &[], &mut key[..key_len])?;
        let mut iv = [0u8; MAX_IV_SIZE];
        hkdf_expand_label(suite.hash, secret.as_slice(), b"iv", &[], &mut iv[..iv_len])?;

        let cipher = suite.aead.new_cipher(&key[..key_len]);
        key.zeroize();
        Ok(Self {
            cipher: cipher?,
            iv,
            iv_len,
            seq: 0,
        })
    }

    /// Records processed under this state so far.
    pub fn sequence(&self) -> u64 {
        self.seq
    }

    fn next_nonce(&mut self) -> Result<[u8; MAX_IV_SIZE], Error> {
        if self.seq == u64::MAX {
            return Err(Error::SequenceOverflow);
        }
        let mut nonce = self.iv;
        let seq = self.seq.to_be_bytes();
        for (n, s) in nonce[self.iv_len - 8..self.iv_len].iter_mut().zip(seq) {
            *n ^= s;
        }
        self.seq += 1;
        Ok(nonce)
    }
}

impl Drop for AeadState {
    fn drop(&mut self) {
        self.iv.zeroize();
    }
}

/// Seal one record: inner plaintext is `payload || content_type` (no
/// padding is emitted), the outer type is always application_data, and the
/// AAD is the outer header.
pub fn seal_record<const N: usize>(
    state: &mut AeadState,
    content_type: ContentType,
    payload: &[u8],
    out: &mut OutputBuffer<N>,
) -> Result<(), Error> {
    if payload.len() > MAX_PLAINTEXT_SIZE {
        return Err(Error::Library);
    }
    let inner_len = payload.len() + 1;
    let ciphertext_len = inner_len + TAG_SIZE;

    let start = out.len();
    out.reserve(HEADER_SIZE + ciphertext_len);
    put_header(out, ContentType::ApplicationData, ciphertext_len);
    out.extend_from_slice(payload);
    out.push(content_type as u8);
    out.extend_from_slice(&[0u8; TAG_SIZE]);

    let nonce = state.next_nonce()?;
    let record = &mut out.as_mut_slice()[start..];
    let (header, body) = record.split_at_mut(HEADER_SIZE);
    state
        .cipher
        .seal_in_place(&nonce[..state.iv_len], header, body, inner_len)?;
    Ok(())
}

/// Open one record in place. `payload` holds the ciphertext body; on
/// success its prefix is the inner plaintext, whose length and real content
/// type are returned. Padding zeros are stripped per RFC 8446 section 5.4.
pub fn open_record(
    state: &mut AeadState,
    header: &[u8; HEADER_SIZE],
    payload: &mut [u8],
) -> Result<(usize, ContentType), Error> {
    let nonce = state.next_nonce()?;
    let plain_len =
        state
            .cipher
            .open_in_place(&nonce[..state.iv_len], header, payload, payload.len())?;

    let mut end = plain_len;
    while end > 0 && payload[end - 1] == 0 {
        end -= 1;
    }
    if end == 0 {
        // inner plaintext was nothing but padding
        return Err(Error::SelfAlert(AlertDescription::UnexpectedMessage));
    }
    let content_type = ContentType::from_u8(payload[end - 1])
        .ok_or(Error::SelfAlert(AlertDescription::UnexpectedMessage))?;
    Ok((end - 1, content_type))
}
