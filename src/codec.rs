//! Handshake message encoding and parsing (RFC 8446 section 4).
//!
//! Parsers borrow from the input and enforce exact-length framing: every
//! length prefix must cover exactly the bytes it claims, and a message body
//! with trailing bytes is a decode error. Unknown extensions are skipped;
//! unknown message types are the dispatcher's problem.

use alloc::vec::Vec;

use crate::error::{AlertDescription, Error};

/// Handshake message types (RFC 8446 section 4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum HandshakeType {
    ClientHello = 1,
    ServerHello = 2,
    NewSessionTicket = 4,
    EncryptedExtensions = 8,
    Certificate = 11,
    CertificateRequest = 13,
    CertificateVerify = 15,
    Finished = 20,
}

impl HandshakeType {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            1 => Some(Self::ClientHello),
            2 => Some(Self::ServerHello),
            4 => Some(Self::NewSessionTicket),
            8 => Some(Self::EncryptedExtensions),
            11 => Some(Self::Certificate),
            13 => Some(Self::CertificateRequest),
            15 => Some(Self::CertificateVerify),
            20 => Some(Self::Finished),
            _ => None,
        }
    }
}

/// Extension types used here (RFC 8446 section 4.2).
pub const EXT_SERVER_NAME: u16 = 0;
pub const EXT_SUPPORTED_GROUPS: u16 = 10;
pub const EXT_SIGNATURE_ALGORITHMS: u16 = 13;
pub const EXT_SUPPORTED_VERSIONS: u16 = 43;
pub const EXT_KEY_SHARE: u16 = 51;

/// TLS 1.3 wire version.
pub const TLS13_VERSION: u16 = 0x0304;
/// Legacy version field value (TLS 1.2) carried for middlebox tolerance.
pub const LEGACY_VERSION: u16 = 0x0303;

pub const HANDSHAKE_HEADER_SIZE: usize = 4;

/// HelloRetryRequest is signalled by this magic ServerHello.random.
pub const HELLO_RETRY_REQUEST_RANDOM: [u8; 32] = [
    0xcf, 0x21, 0xad, 0x74, 0xe5, 0x9a, 0x61, 0x11, 0xbe, 0x1d, 0x8c, 0x02, 0x1e, 0x65, 0xb8,
    0x91, 0xc2, 0xa2, 0x11, 0x16, 0x7a, 0xbb, 0x8c, 0x5e, 0x07, 0x9e, 0x09, 0xe2, 0xc8, 0xa8,
    0x33, 0x9c,
];

fn decode_error() -> Error {
    Error::SelfAlert(AlertDescription::DecodeError)
}

// ---------------------------------------------------------------------------
// Cursor

/// Borrowing reader over a message body.
pub(crate) struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn is_done(&self) -> bool {
        self.pos == self.buf.len()
    }

    pub fn take(&mut self, n: usize) -> Result<&'a [u8], Error> {
        if self.remaining() < n {
            return Err(decode_error());
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    pub fn u8(&mut self) -> Result<u8, Error> {
        Ok(self.take(1)?[0])
    }

    pub fn u16(&mut self) -> Result<u16, Error> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    pub fn u24(&mut self) -> Result<usize, Error> {
        let b = self.take(3)?;
        Ok(((b[0] as usize) << 16) | ((b[1] as usize) << 8) | b[2] as usize)
    }

    /// u8-length-prefixed vector.
    pub fn vec8(&mut self) -> Result<&'a [u8], Error> {
        let len = self.u8()? as usize;
        self.take(len)
    }

    /// u16-length-prefixed vector.
    pub fn vec16(&mut self) -> Result<&'a [u8], Error> {
        let len = self.u16()? as usize;
        self.take(len)
    }

    /// u24-length-prefixed vector.
    pub fn vec24(&mut self) -> Result<&'a [u8], Error> {
        let len = self.u24()?;
        self.take(len)
    }

    /// Error unless every byte was consumed.
    pub fn expect_done(&self) -> Result<(), Error> {
        if self.is_done() {
            Ok(())
        } else {
            Err(decode_error())
        }
    }
}

// ---------------------------------------------------------------------------
// Writer helpers

pub(crate) fn put_u16(out: &mut Vec<u8>, v: u16) {
    out.extend_from_slice(&v.to_be_bytes());
}

pub(crate) fn put_u24(out: &mut Vec<u8>, v: usize) {
    out.extend_from_slice(&[(v >> 16) as u8, (v >> 8) as u8, v as u8]);
}

/// Reserve a u16 length prefix, returning the mark to patch later.
pub(crate) fn mark_u16(out: &mut Vec<u8>) -> usize {
    let mark = out.len();
    out.extend_from_slice(&[0, 0]);
    mark
}

pub(crate) fn patch_u16(out: &mut [u8], mark: usize) {
    let len = (out.len() - mark - 2) as u16;
    out[mark..mark + 2].copy_from_slice(&len.to_be_bytes());
}

fn mark_u24(out: &mut Vec<u8>) -> usize {
    let mark = out.len();
    out.extend_from_slice(&[0, 0, 0]);
    mark
}

fn patch_u24(out: &mut [u8], mark: usize) {
    let len = out.len() - mark - 3;
    out[mark..mark + 3].copy_from_slice(&[(len >> 16) as u8, (len >> 8) as u8, len as u8]);
}

/// Wrap `body` writing in a handshake header, patching the u24 length.
fn with_handshake_header(msg_type: HandshakeType, body: impl FnOnce(&mut Vec<u8>)) -> Vec<u8> {
    let mut out = Vec::with_capacity(64);
    out.push(msg_type as u8);
    let mark = mark_u24(&mut out);
    body(&mut out);
    patch_u24(&mut out, mark);
    out
}

/// Split the next complete handshake message off `buf`.
///
/// Returns `(msg_type, body, total_len)` or `None` when more input is
/// needed. `msg_type` stays raw so the dispatcher decides what unknown
/// types mean in its state.
pub fn peek_message(buf: &[u8]) -> Result<Option<(u8, &[u8], usize)>, Error> {
    if buf.len() < HANDSHAKE_HEADER_SIZE {
        return Ok(None);
    }
    let msg_type = buf[0];
    let len = ((buf[1] as usize) << 16) | ((buf[2] as usize) << 8) | buf[3] as usize;
    let total = HANDSHAKE_HEADER_SIZE + len;
    if buf.len() < total {
        return Ok(None);
    }
    Ok(Some((msg_type, &buf[HANDSHAKE_HEADER_SIZE..total], total)))
}

// ---------------------------------------------------------------------------
// ClientHello

pub struct ClientHelloParams<'a> {
    pub random: &'a [u8; 32],
    pub legacy_session_id: &'a [u8],
    pub cipher_suites: &'a [u16],
    pub server_name: Option<&'a str>,
    pub signature_schemes: &'a [u16],
    pub supported_groups: &'a [u16],
    pub key_share_group: u16,
    pub key_share_public: &'a [u8],
}

/// Parsed ClientHello view.
pub struct ClientHello<'a> {
    pub random: &'a [u8],
    pub legacy_session_id: &'a [u8],
    pub cipher_suites: heapless::Vec<u16, 32>,
    pub server_name: Option<&'a str>,
    pub signature_schemes: heapless::Vec<u16, 32>,
    pub key_shares: heapless::Vec<(u16, &'a [u8]), 8>,
    pub key_share_present: bool,
    pub signature_algorithms_present: bool,
    pub supports_tls13: bool,
}

pub fn encode_client_hello(params: &ClientHelloParams<'_>) -> Vec<u8> {
    with_handshake_header(HandshakeType::ClientHello, |out| {
        put_u16(out, LEGACY_VERSION);
        out.extend_from_slice(params.random);
        out.push(params.legacy_session_id.len() as u8);
        out.extend_from_slice(params.legacy_session_id);

        let mark = mark_u16(out);
        for &suite in params.cipher_suites {
            put_u16(out, suite);
        }
        patch_u16(out, mark);

        // legacy compression methods: null only
        out.push(1);
        out.push(0);

        let ext_mark = mark_u16(out);

        if let Some(name) = params.server_name {
            put_u16(out, EXT_SERVER_NAME);
            let m = mark_u16(out);
            let list = mark_u16(out);
            out.push(0); // name_type host_name
            let n = mark_u16(out);
            out.extend_from_slice(name.as_bytes());
            patch_u16(out, n);
            patch_u16(out, list);
            patch_u16(out, m);
        }

        put_u16(out, EXT_SUPPORTED_GROUPS);
        let m = mark_u16(out);
        let list = mark_u16(out);
        for &group in params.supported_groups {
            put_u16(out, group);
        }
        patch_u16(out, list);
        patch_u16(out, m);

        put_u16(out, EXT_SIGNATURE_ALGORITHMS);
        let m = mark_u16(out);
        let list = mark_u16(out);
        for &scheme in params.signature_schemes {
            put_u16(out, scheme);
        }
        patch_u16(out, list);
        patch_u16(out, m);

        put_u16(out, EXT_SUPPORTED_VERSIONS);
        let m = mark_u16(out);
        out.push(2);
        put_u16(out, TLS13_VERSION);
        patch_u16(out, m);

        put_u16(out, EXT_KEY_SHARE);
        let m = mark_u16(out);
        let list = mark_u16(out);
        put_u16(out, params.key_share_group);
        let k = mark_u16(out);
        out.extend_from_slice(params.key_share_public);
        patch_u16(out, k);
        patch_u16(out, list);
        patch_u16(out, m);

        patch_u16(out, ext_mark);
    })
}

pub fn parse_client_hello(body: &[u8]) -> Result<ClientHello<'_>, Error> {
    let mut r = Reader::new(body);
    let _legacy_version = r.u16()?;
    let random = r.take(32)?;
    let legacy_session_id = r.vec8()?;
    if legacy_session_id.len() > 32 {
        return Err(decode_error());
    }

    let suites_raw = r.vec16()?;
    if suites_raw.is_empty() || suites_raw.len() % 2 != 0 {
        return Err(decode_error());
    }
    let mut cipher_suites = heapless::Vec::new();
    for chunk in suites_raw.chunks_exact(2) {
        // ignore overflow past our tracking capacity
        let _ = cipher_suites.push(u16::from_be_bytes([chunk[0], chunk[1]]));
    }

    let compressions = r.vec8()?;
    if !compressions.contains(&0) {
        return Err(Error::SelfAlert(AlertDescription::IllegalParameter));
    }

    let mut hello = ClientHello {
        random,
        legacy_session_id,
        cipher_suites,
        server_name: None,
        signature_schemes: heapless::Vec::new(),
        key_shares: heapless::Vec::new(),
        key_share_present: false,
        signature_algorithms_present: false,
        supports_tls13: false,
    };

    let extensions = r.vec16()?;
    r.expect_done()?;
    let mut er = Reader::new(extensions);
    while !er.is_done() {
        let ext_type = er.u16()?;
        let data = er.vec16()?;
        let mut xr = Reader::new(data);
        match ext_type {
            EXT_SERVER_NAME => {
                let list = xr.vec16()?;
                let mut lr = Reader::new(list);
                while !lr.is_done() {
                    let name_type = lr.u8()?;
                    let name = lr.vec16()?;
                    if name_type == 0 {
                        hello.server_name =
                            Some(core::str::from_utf8(name).map_err(|_| decode_error())?);
                    }
                }
                xr.expect_done()?;
            }
            EXT_SIGNATURE_ALGORITHMS => {
                hello.signature_algorithms_present = true;
                let list = xr.vec16()?;
                xr.expect_done()?;
                if list.is_empty() || list.len() % 2 != 0 {
                    return Err(decode_error());
                }
                for chunk in list.chunks_exact(2) {
                    let _ = hello
                        .signature_schemes
                        .push(u16::from_be_bytes([chunk[0], chunk[1]]));
                }
            }
            EXT_SUPPORTED_VERSIONS => {
                let list = xr.vec8()?;
                xr.expect_done()?;
                if list.is_empty() || list.len() % 2 != 0 {
                    return Err(decode_error());
                }
                for chunk in list.chunks_exact(2) {
                    if u16::from_be_bytes([chunk[0], chunk[1]]) == TLS13_VERSION {
                        hello.supports_tls13 = true;
                    }
                }
            }
            EXT_KEY_SHARE => {
                hello.key_share_present = true;
                let list = xr.vec16()?;
                xr.expect_done()?;
                let mut lr = Reader::new(list);
                while !lr.is_done() {
                    let group = lr.u16()?;
                    let public = lr.vec16()?;
                    let _ = hello.key_shares.push((group, public));
                }
            }
            _ => {} // unknown extensions are skipped
        }
    }

    Ok(hello)
}

// ---------------------------------------------------------------------------
// ServerHello

/// Parsed ServerHello view.
pub struct ServerHello<'a> {
    pub random: &'a [u8],
    pub cipher_suite: u16,
    pub key_share: Option<(u16, &'a [u8])>,
    pub selected_version: Option<u16>,
}

pub fn encode_server_hello(
    random: &[u8; 32],
    session_id_echo: &[u8],
    cipher_suite: u16,
    key_share_group: u16,
    key_share_public: &[u8],
) -> Vec<u8> {
    with_handshake_header(HandshakeType::ServerHello, |out| {
        put_u16(out, LEGACY_VERSION);
        out.extend_from_slice(random);
        out.push(session_id_echo.len() as u8);
        out.extend_from_slice(session_id_echo);
        put_u16(out, cipher_suite);
        out.push(0); // legacy compression

        let ext_mark = mark_u16(out);

        put_u16(out, EXT_SUPPORTED_VERSIONS);
        let m = mark_u16(out);
        put_u16(out, TLS13_VERSION);
        patch_u16(out, m);

        put_u16(out, EXT_KEY_SHARE);
        let m = mark_u16(out);
        put_u16(out, key_share_group);
        let k = mark_u16(out);
        out.extend_from_slice(key_share_public);
        patch_u16(out, k);
        patch_u16(out, m);

        patch_u16(out, ext_mark);
    })
}

pub fn parse_server_hello(body: &[u8]) -> Result<ServerHello<'_>, Error> {
    let mut r = Reader::new(body);
    let _legacy_version = r.u16()?;
    let random = r.take(32)?;
    if random == HELLO_RETRY_REQUEST_RANDOM {
        // retry not supported; the offered share was our only one anyway
        return Err(Error::SelfAlert(AlertDescription::HandshakeFailure));
    }
    let _session_id_echo = r.vec8()?;
    let cipher_suite = r.u16()?;
    let compression = r.u8()?;
    if compression != 0 {
        return Err(Error::SelfAlert(AlertDescription::IllegalParameter));
    }

    let mut hello = ServerHello {
        random,
        cipher_suite,
        key_share: None,
        selected_version: None,
    };

    let extensions = r.vec16()?;
    r.expect_done()?;
    let mut er = Reader::new(extensions);
    while !er.is_done() {
        let ext_type = er.u16()?;
        let data = er.vec16()?;
        let mut xr = Reader::new(data);
        match ext_type {
            EXT_SUPPORTED_VERSIONS => {
                hello.selected_version = Some(xr.u16()?);
                xr.expect_done()?;
            }
            EXT_KEY_SHARE => {
                let group = xr.u16()?;
                let public = xr.vec16()?;
                xr.expect_done()?;
                hello.key_share = Some((group, public));
            }
            _ => {}
        }
    }

    Ok(hello)
}

// ---------------------------------------------------------------------------
// EncryptedExtensions

pub fn encode_encrypted_extensions() -> Vec<u8> {
    with_handshake_header(HandshakeType::EncryptedExtensions, |out| {
        let mark = mark_u16(out);
        patch_u16(out, mark);
    })
}

/// Walk the extension list; contents are all ignorable here.
pub fn parse_encrypted_extensions(body: &[u8]) -> Result<(), Error> {
    let mut r = Reader::new(body);
    let extensions = r.vec16()?;
    r.expect_done()?;
    let mut er = Reader::new(extensions);
    while !er.is_done() {
        let _ext_type = er.u16()?;
        let _data = er.vec16()?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Certificate

pub fn encode_certificate(certificates: &[Vec<u8>]) -> Vec<u8> {
    with_handshake_header(HandshakeType::Certificate, |out| {
        out.push(0); // empty certificate_request_context
        let mark = mark_u24(out);
        for cert in certificates {
            put_u24(out, cert.len());
            out.extend_from_slice(cert);
            put_u16(out, 0); // no per-certificate extensions
        }
        patch_u24(out, mark);
    })
}

/// Collect the DER entries from a Certificate message.
pub fn parse_certificate(body: &[u8]) -> Result<Vec<&[u8]>, Error> {
    let mut r = Reader::new(body);
    let context = r.vec8()?;
    if !context.is_empty() {
        // only empty request contexts exist outside post-handshake auth
        return Err(Error::SelfAlert(AlertDescription::IllegalParameter));
    }
    let list = r.vec24()?;
    r.expect_done()?;

    let mut certs = Vec::new();
    let mut lr = Reader::new(list);
    while !lr.is_done() {
        let cert = lr.vec24()?;
        let _extensions = lr.vec16()?;
        certs.push(cert);
    }
    Ok(certs)
}

// ---------------------------------------------------------------------------
// CertificateVerify

pub fn encode_certificate_verify(scheme: u16, signature: &[u8]) -> Vec<u8> {
    with_handshake_header(HandshakeType::CertificateVerify, |out| {
        put_u16(out, scheme);
        let mark = mark_u16(out);
        out.extend_from_slice(signature);
        patch_u16(out, mark);
    })
}

pub fn parse_certificate_verify(body: &[u8]) -> Result<(u16, &[u8]), Error> {
    let mut r = Reader::new(body);
    let scheme = r.u16()?;
    let signature = r.vec16()?;
    r.expect_done()?;
    Ok((scheme, signature))
}

// ---------------------------------------------------------------------------
// CertificateRequest

/// Client-side minimal parse: shape check only, contents unused because no
/// client certificate is ever sent.
pub fn parse_certificate_request(body: &[u8]) -> Result<(), Error> {
    let mut r = Reader::new(body);
    let _context = r.vec8()?;
    let extensions = r.vec16()?;
    r.expect_done()?;
    let mut er = Reader::new(extensions);
    while !er.is_done() {
        let _ext_type = er.u16()?;
        let _data = er.vec16()?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Finished

pub fn encode_finished(verify_data: &[u8]) -> Vec<u8> {
    with_handshake_header(HandshakeType::Finished, |out| {
        out.extend_from_slice(verify_data);
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{
        GROUP_X25519, SIGSCHEME_ED25519, TLS_AES_128_GCM_SHA256, TLS_CHACHA20_POLY1305_SHA256,
    };

    fn sample_client_hello() -> Vec<u8> {
        encode_client_hello(&ClientHelloParams {
            random: &[0x5a; 32],
            legacy_session_id: &[0x11; 32],
            cipher_suites: &[TLS_AES_128_GCM_SHA256, TLS_CHACHA20_POLY1305_SHA256],
            server_name: Some("example.com"),
            signature_schemes: &[SIGSCHEME_ED25519],
            supported_groups: &[GROUP_X25519],
            key_share_group: GROUP_X25519,
            key_share_public: &[0xaa; 32],
        })
    }

    #[test]
    fn client_hello_roundtrip() {
        let msg = sample_client_hello();
        assert_eq!(msg[0], HandshakeType::ClientHello as u8);
        let (msg_type, body, total) = peek_message(&msg).unwrap().unwrap();
        assert_eq!(msg_type, HandshakeType::ClientHello as u8);
        assert_eq!(total, msg.len());

        let hello = parse_client_hello(body).unwrap();
        assert_eq!(hello.random, &[0x5a; 32]);
        assert_eq!(hello.legacy_session_id.len(), 32);
        assert_eq!(
            hello.cipher_suites.as_slice(),
            &[TLS_AES_128_GCM_SHA256, TLS_CHACHA20_POLY1305_SHA256]
        );
        assert_eq!(hello.server_name, Some("example.com"));
        assert_eq!(hello.signature_schemes.as_slice(), &[SIGSCHEME_ED25519]);
        assert!(hello.supports_tls13);
        assert!(hello.key_share_present);
        assert_eq!(hello.key_shares.as_slice(), &[(GROUP_X25519, &[0xaa; 32][..])]);
    }

    #[test]
    fn server_hello_roundtrip() {
        let msg = encode_server_hello(
            &[0x42; 32],
            &[0x11; 32],
            TLS_AES_128_GCM_SHA256,
            GROUP_X25519,
            &[0xbb; 32],
        );
        let (_, body, _) = peek_message(&msg).unwrap().unwrap();
        let hello = parse_server_hello(body).unwrap();
        assert_eq!(hello.cipher_suite, TLS_AES_128_GCM_SHA256);
        assert_eq!(hello.selected_version, Some(TLS13_VERSION));
        assert_eq!(hello.key_share, Some((GROUP_X25519, &[0xbb; 32][..])));
    }

    #[test]
    fn hello_retry_request_rejected() {
        let msg = encode_server_hello(
            &HELLO_RETRY_REQUEST_RANDOM,
            &[],
            TLS_AES_128_GCM_SHA256,
            GROUP_X25519,
            &[0xbb; 32],
        );
        let (_, body, _) = peek_message(&msg).unwrap().unwrap();
        assert_eq!(
            parse_server_hello(body).err(),
            Some(Error::SelfAlert(AlertDescription::HandshakeFailure))
        );
    }

    #[test]
    fn truncated_message_needs_more_input() {
        let msg = sample_client_hello();
        assert!(peek_message(&msg[..3]).unwrap().is_none());
        assert!(peek_message(&msg[..msg.len() - 1]).unwrap().is_none());
    }

    #[test]
    fn truncated_body_is_decode_error() {
        let msg = sample_client_hello();
        let (_, body, _) = peek_message(&msg).unwrap().unwrap();
        assert_eq!(
            parse_client_hello(&body[..body.len() - 5]).err(),
            Some(Error::SelfAlert(AlertDescription::DecodeError))
        );
    }

    #[test]
    fn trailing_bytes_are_decode_error() {
        let msg = sample_client_hello();
        let (_, body, _) = peek_message(&msg).unwrap().unwrap();
        let mut extended = body.to_vec();
        extended.push(0);
        assert_eq!(
            parse_client_hello(&extended).err(),
            Some(Error::SelfAlert(AlertDescription::DecodeError))
        );
    }

    #[test]
    fn unknown_extension_skipped() {
        // splice an unknown extension into an otherwise valid ClientHello
        let msg = encode_client_hello(&ClientHelloParams {
            random: &[0x5a; 32],
            legacy_session_id: &[],
            cipher_suites: &[TLS_AES_128_GCM_SHA256],
            server_name: None,
            signature_schemes: &[SIGSCHEME_ED25519],
            supported_groups: &[GROUP_X25519],
            key_share_group: GROUP_X25519,
            key_share_public: &[0xaa; 32],
        });
        let (_, body, _) = peek_message(&msg).unwrap().unwrap();
        let mut patched = body.to_vec();
        // append a type 0xfafa extension and grow the outer length prefix
        let mut r = Reader::new(&patched);
        let _ = r.u16().unwrap();
        let _ = r.take(32).unwrap();
        let _ = r.vec8().unwrap();
        let _ = r.vec16().unwrap();
        let _ = r.vec8().unwrap();
        let ext_mark = patched.len() - r.remaining();
        patched.extend_from_slice(&[0xfa, 0xfa, 0x00, 0x02, 0x01, 0x02]);
        let new_len =
            u16::from_be_bytes([patched[ext_mark], patched[ext_mark + 1]]) + 6;
        patched[ext_mark..ext_mark + 2].copy_from_slice(&new_len.to_be_bytes());

        let hello = parse_client_hello(&patched).unwrap();
        assert!(hello.supports_tls13);
    }

    #[test]
    fn certificate_entries_roundtrip() {
        let certs = alloc::vec![alloc::vec![0xde; 40], alloc::vec![0xad; 7]];
        let msg = encode_certificate(&certs);
        let (_, body, _) = peek_message(&msg).unwrap().unwrap();
        let parsed = parse_certificate(body).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0], &[0xde; 40][..]);
        assert_eq!(parsed[1], &[0xad; 7][..]);
    }

    #[test]
    fn certificate_verify_roundtrip() {
        let msg = encode_certificate_verify(SIGSCHEME_ED25519, &[0x77; 64]);
        let (_, body, _) = peek_message(&msg).unwrap().unwrap();
        let (scheme, sig) = parse_certificate_verify(body).unwrap();
        assert_eq!(scheme, SIGSCHEME_ED25519);
        assert_eq!(sig, &[0x77; 64][..]);
    }

    #[test]
    fn finished_carries_verify_data() {
        let msg = encode_finished(&[0x99; 32]);
        let (msg_type, body, _) = peek_message(&msg).unwrap().unwrap();
        assert_eq!(msg_type, HandshakeType::Finished as u8);
        assert_eq!(body, &[0x99; 32][..]);
    }

    #[test]
    fn compression_without_null_rejected() {
        let msg = sample_client_hello();
        let (_, body, _) = peek_message(&msg).unwrap().unwrap();
        let mut patched = body.to_vec();
        // compression vector follows the suite list
        let mut r = Reader::new(&patched);
        let _ = r.u16().unwrap();
        let _ = r.take(32).unwrap();
        let _ = r.vec8().unwrap();
        let _ = r.vec16().unwrap();
        let comp_mark = patched.len() - r.remaining();
        assert_eq!(patched[comp_mark], 1);
        patched[comp_mark + 1] = 1; // not null
        assert_eq!(
            parse_client_hello(&patched).err(),
            Some(Error::SelfAlert(AlertDescription::IllegalParameter))
        );
    }
}
