//! TLS 1.3 handshake state machines (RFC 8446 section 4).
//!
//! The engine works at message granularity: the connection layer reassembles
//! handshake messages out of records and feeds them in one at a time, and
//! the engine queues [`Action`]s back: messages to send and key-arming
//! events, in the exact order the record layer must apply them.

use alloc::boxed::Box;
use alloc::collections::VecDeque;
use alloc::vec::Vec;

use crate::cert::{
    certificate_verify_content, CertificateContext, SignatureVerifier, SERVER_CONTEXT,
};
use crate::codec::{self, HandshakeType, TLS13_VERSION};
use crate::crypto::{CipherSuite, CryptoProvider, KeyExchangeContext, SIGSCHEME_ED25519};
use crate::error::{AlertDescription, Error};
use crate::key_schedule::{KeySchedule, Secret, Transcript};

/// Reassembly cap: no legitimate message here comes close (certificate
/// chains are the largest, and they fit comfortably).
pub(crate) const MAX_HANDSHAKE_MESSAGE_SIZE: usize = 65536;

/// Which side of the connection this engine drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    Server,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Start,
    WaitServerHello,
    WaitEncryptedExtensions,
    WaitCertificateRequestOrCertificate,
    WaitCertificate,
    WaitCertificateVerify,
    WaitFinished,
    Connected,
}

/// Ordered instructions for the record layer.
pub(crate) enum Action {
    /// Handshake message to send before any write keys exist.
    SendCleartext(Vec<u8>),
    /// Handshake message to send under the current write keys.
    SendEncrypted(Vec<u8>),
    ArmWriteHandshake(Secret),
    ArmReadHandshake(Secret),
    ArmWriteApplication(Secret),
    ArmReadApplication(Secret),
}

pub(crate) struct HandshakeEngine<'a> {
    role: Role,
    state: State,
    provider: &'a dyn CryptoProvider,
    certificates: &'a dyn CertificateContext,
    server_name: Option<&'a str>,
    suite: Option<&'static CipherSuite>,
    transcript: Option<Transcript>,
    key_schedule: Option<KeySchedule>,
    /// Client buffers its own ClientHello until the suite (and so the
    /// transcript hash) is known.
    client_hello: Vec<u8>,
    key_exchange: Option<Box<dyn KeyExchangeContext>>,
    offered_group: u16,
    client_hs_secret: Option<Secret>,
    server_hs_secret: Option<Secret>,
    /// Server holds the client's application secret until its Finished
    /// verifies.
    pending_read_app: Option<Secret>,
    verifier: Option<Box<dyn SignatureVerifier>>,
    actions: VecDeque<Action>,
}

fn unexpected() -> Error {
    Error::SelfAlert(AlertDescription::UnexpectedMessage)
}

/// Constant-time byte comparison for Finished verification.
fn ct_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b) {
        diff |= x ^ y;
    }
    diff == 0
}

impl<'a> HandshakeEngine<'a> {
    pub fn new_client(
        provider: &'a dyn CryptoProvider,
        certificates: &'a dyn CertificateContext,
        server_name: Option<&'a str>,
    ) -> Self {
        Self::new(Role::Client, provider, certificates, server_name)
    }

    pub fn new_server(
        provider: &'a dyn CryptoProvider,
        certificates: &'a dyn CertificateContext,
    ) -> Self {
        Self::new(Role::Server, provider, certificates, None)
    }

    fn new(
        role: Role,
        provider: &'a dyn CryptoProvider,
        certificates: &'a dyn CertificateContext,
        server_name: Option<&'a str>,
    ) -> Self {
        Self {
            role,
            state: State::Start,
            provider,
            certificates,
            server_name,
            suite: None,
            transcript: None,
            key_schedule: None,
            client_hello: Vec::new(),
            key_exchange: None,
            offered_group: 0,
            client_hs_secret: None,
            server_hs_secret: None,
            pending_read_app: None,
            verifier: None,
            actions: VecDeque::new(),
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn suite(&self) -> Option<&'static CipherSuite> {
        self.suite
    }

    pub fn is_connected(&self) -> bool {
        self.state == State::Connected
    }

    pub fn take_action(&mut self) -> Option<Action> {
        self.actions.pop_front()
    }

    /// Release held crypto material on abandoned handshakes. The pending
    /// verifier gets its mandatory empty-input call; an unfinished key
    /// exchange is completed with no peer share.
    pub fn abort(&mut self) {
        if let Some(verifier) = self.verifier.take() {
            let _ = verifier.verify(&[], &[]);
        }
        if let Some(kx) = self.key_exchange.take() {
            let _ = kx.complete(None);
        }
    }

    /// Client first flight: build and queue the ClientHello.
    pub fn start(&mut self) -> Result<(), Error> {
        if self.role != Role::Client || self.state != State::Start {
            return Err(Error::Library);
        }

        let key_exchanges = self.provider.key_exchanges();
        let kx_alg = *key_exchanges.first().ok_or(Error::Library)?;
        let kx = kx_alg.create(self.provider.random())?;
        self.offered_group = kx_alg.group();

        let mut random = [0u8; 32];
        self.provider.random().fill(&mut random);

        let mut suites: heapless::Vec<u16, 8> = heapless::Vec::new();
        for suite in self.provider.cipher_suites() {
            let _ = suites.push(suite.id);
        }
        let mut groups: heapless::Vec<u16, 8> = heapless::Vec::new();
        for alg in key_exchanges {
            let _ = groups.push(alg.group());
        }

        let hello = codec::encode_client_hello(&codec::ClientHelloParams {
            random: &random,
            legacy_session_id: &[],
            cipher_suites: &suites,
            server_name: self.server_name,
            signature_schemes: &[SIGSCHEME_ED25519],
            supported_groups: &groups,
            key_share_group: self.offered_group,
            key_share_public: kx.public_key(),
        });

        self.key_exchange = Some(kx);
        self.client_hello = hello.clone();
        self.actions.push_back(Action::SendCleartext(hello));
        self.state = State::WaitServerHello;
        Ok(())
    }

    /// Dispatch one complete handshake message. `full` includes the 4-byte
    /// header (the transcript hashes it whole), `body` is the payload.
    pub fn handle_message(&mut self, msg_type: u8, full: &[u8], body: &[u8]) -> Result<(), Error> {
        let Some(msg_type) = HandshakeType::from_u8(msg_type) else {
            return Err(unexpected());
        };
        match (self.role, self.state, msg_type) {
            (Role::Server, State::Start, HandshakeType::ClientHello) => {
                self.process_client_hello(full, body)
            }
            (Role::Client, State::WaitServerHello, HandshakeType::ServerHello) => {
                self.process_server_hello(full, body)
            }
            (
                Role::Client,
                State::WaitEncryptedExtensions,
                HandshakeType::EncryptedExtensions,
            ) => self.process_encrypted_extensions(full, body),
            (
                Role::Client,
                State::WaitCertificateRequestOrCertificate,
                HandshakeType::CertificateRequest,
            ) => self.process_certificate_request(full, body),
            (
                Role::Client,
                State::WaitCertificateRequestOrCertificate | State::WaitCertificate,
                HandshakeType::Certificate,
            ) => self.process_certificate(full, body),
            (Role::Client, State::WaitCertificateVerify, HandshakeType::CertificateVerify) => {
                self.process_certificate_verify(full, body)
            }
            (Role::Client, State::WaitFinished, HandshakeType::Finished) => {
                self.process_server_finished(full, body)
            }
            (Role::Server, State::WaitFinished, HandshakeType::Finished) => {
                self.process_client_finished(full, body)
            }
            _ => Err(unexpected()),
        }
    }

    fn transcript(&mut self) -> Result<&mut Transcript, Error> {
        self.transcript.as_mut().ok_or(Error::Library)
    }

    fn key_schedule(&mut self) -> Result<&mut KeySchedule, Error> {
        self.key_schedule.as_mut().ok_or(Error::Library)
    }

    // -- server ------------------------------------------------------------

    fn process_client_hello(&mut self, full: &[u8], body: &[u8]) -> Result<(), Error> {
        let hello = codec::parse_client_hello(body)?;
        if !hello.supports_tls13 {
            return Err(Error::SelfAlert(AlertDescription::ProtocolVersion));
        }
        if !hello.key_share_present {
            return Err(Error::SelfAlert(AlertDescription::MissingExtension));
        }
        if !hello.signature_algorithms_present {
            return Err(Error::SelfAlert(AlertDescription::MissingExtension));
        }

        let suite = self
            .provider
            .cipher_suites()
            .iter()
            .copied()
            .find(|s| hello.cipher_suites.contains(&s.id))
            .ok_or(Error::SelfAlert(AlertDescription::HandshakeFailure))?;

        // First supported group the client actually sent a share for.
        // Without a usable share the handshake fails here; retries are not
        // offered.
        let mut selected = None;
        for alg in self.provider.key_exchanges() {
            if let Some(&(group, public)) = hello
                .key_shares
                .iter()
                .find(|(group, _)| *group == alg.group())
            {
                selected = Some((*alg, group, public));
                break;
            }
        }
        let (kx_alg, group, peer_public) =
            selected.ok_or(Error::SelfAlert(AlertDescription::HandshakeFailure))?;
        let (our_public, shared) = kx_alg.exchange(self.provider.random(), peer_public)?;

        let mut transcript = Transcript::new(suite.hash);
        transcript.update(full);

        let mut random = [0u8; 32];
        self.provider.random().fill(&mut random);
        let server_hello = codec::encode_server_hello(
            &random,
            hello.legacy_session_id,
            suite.id,
            group,
            &our_public,
        );
        transcript.update(&server_hello);

        let mut key_schedule = KeySchedule::new(suite.hash)?;
        key_schedule.derive_handshake_secret(&shared)?;
        let hello_hash = transcript.current_hash();
        let (client_hs, server_hs) = key_schedule.handshake_traffic_secrets(&hello_hash)?;

        self.actions.push_back(Action::SendCleartext(server_hello));
        self.actions
            .push_back(Action::ArmWriteHandshake(server_hs.clone()));
        self.actions
            .push_back(Action::ArmReadHandshake(client_hs.clone()));

        let encrypted_extensions = codec::encode_encrypted_extensions();
        transcript.update(&encrypted_extensions);
        self.actions
            .push_back(Action::SendEncrypted(encrypted_extensions));

        let chain = self
            .certificates
            .lookup(hello.server_name, &hello.signature_schemes)?;
        let certificate = codec::encode_certificate(chain.certificates);
        transcript.update(&certificate);
        self.actions.push_back(Action::SendEncrypted(certificate));

        let content = certificate_verify_content(SERVER_CONTEXT, &transcript.current_hash());
        let signature = chain.signer.sign(&content)?;
        let certificate_verify = codec::encode_certificate_verify(chain.scheme, &signature);
        transcript.update(&certificate_verify);
        self.actions
            .push_back(Action::SendEncrypted(certificate_verify));

        let verify_data =
            key_schedule.finished_verify_data(&server_hs, &transcript.current_hash())?;
        let finished = codec::encode_finished(&verify_data);
        transcript.update(&finished);
        self.actions.push_back(Action::SendEncrypted(finished));

        key_schedule.derive_master_secret()?;
        let (client_ap, server_ap) =
            key_schedule.application_traffic_secrets(&transcript.current_hash())?;
        self.actions.push_back(Action::ArmWriteApplication(server_ap));
        self.pending_read_app = Some(client_ap);

        self.suite = Some(suite);
        self.transcript = Some(transcript);
        self.key_schedule = Some(key_schedule);
        self.client_hs_secret = Some(client_hs);
        self.server_hs_secret = Some(server_hs);
        self.state = State::WaitFinished;
        Ok(())
    }

    fn process_client_finished(&mut self, full: &[u8], body: &[u8]) -> Result<(), Error> {
        let hash_before = self.transcript()?.current_hash();
        let client_hs = self.client_hs_secret.take().ok_or(Error::Library)?;
        let expected = self
            .key_schedule()?
            .finished_verify_data(&client_hs, &hash_before)?;
        if body.len() != expected.len() {
            return Err(Error::SelfAlert(AlertDescription::DecodeError));
        }
        if !ct_eq(body, &expected) {
            return Err(Error::SelfAlert(AlertDescription::DecryptError));
        }
        self.transcript()?.update(full);
        let client_ap = self.pending_read_app.take().ok_or(Error::Library)?;
        self.actions.push_back(Action::ArmReadApplication(client_ap));
        self.server_hs_secret = None;
        self.state = State::Connected;
        Ok(())
    }

    // -- client ------------------------------------------------------------

    fn process_server_hello(&mut self, full: &[u8], body: &[u8]) -> Result<(), Error> {
        let hello = codec::parse_server_hello(body)?;

        match hello.selected_version {
            Some(TLS13_VERSION) => {}
            Some(_) => return Err(Error::SelfAlert(AlertDescription::IllegalParameter)),
            None => return Err(Error::SelfAlert(AlertDescription::MissingExtension)),
        }
        let suite = self
            .provider
            .find_cipher_suite(hello.cipher_suite)
            .ok_or(Error::SelfAlert(AlertDescription::HandshakeFailure))?;
        let (group, peer_public) = hello
            .key_share
            .ok_or(Error::SelfAlert(AlertDescription::MissingExtension))?;
        if group != self.offered_group {
            return Err(Error::SelfAlert(AlertDescription::IllegalParameter));
        }

        let kx = self.key_exchange.take().ok_or(Error::Library)?;
        let shared = kx.complete(Some(peer_public))?.ok_or(Error::Library)?;

        let mut transcript = Transcript::new(suite.hash);
        transcript.update(&self.client_hello);
        transcript.update(full);
        self.client_hello = Vec::new();

        let mut key_schedule = KeySchedule::new(suite.hash)?;
        key_schedule.derive_handshake_secret(&shared)?;
        let hello_hash = transcript.current_hash();
        let (client_hs, server_hs) = key_schedule.handshake_traffic_secrets(&hello_hash)?;

        self.actions
            .push_back(Action::ArmReadHandshake(server_hs.clone()));
        self.actions
            .push_back(Action::ArmWriteHandshake(client_hs.clone()));

        self.suite = Some(suite);
        self.transcript = Some(transcript);
        self.key_schedule = Some(key_schedule);
        self.client_hs_secret = Some(client_hs);
        self.server_hs_secret = Some(server_hs);
        self.state = State::WaitEncryptedExtensions;
        Ok(())
    }

    fn process_encrypted_extensions(&mut self, full: &[u8], body: &[u8]) -> Result<(), Error> {
        codec::parse_encrypted_extensions(body)?;
        self.transcript()?.update(full);
        self.state = State::WaitCertificateRequestOrCertificate;
        Ok(())
    }

    fn process_certificate_request(&mut self, full: &[u8], body: &[u8]) -> Result<(), Error> {
        // noted but never answered with a client certificate
        codec::parse_certificate_request(body)?;
        self.transcript()?.update(full);
        self.state = State::WaitCertificate;
        Ok(())
    }

    fn process_certificate(&mut self, full: &[u8], body: &[u8]) -> Result<(), Error> {
        let certificates = codec::parse_certificate(body)?;
        if certificates.is_empty() {
            return Err(Error::SelfAlert(AlertDescription::CertificateUnknown));
        }
        self.verifier = Some(self.certificates.verify(&certificates)?);
        self.transcript()?.update(full);
        self.state = State::WaitCertificateVerify;
        Ok(())
    }

    fn process_certificate_verify(&mut self, full: &[u8], body: &[u8]) -> Result<(), Error> {
        let hash_before = self.transcript()?.current_hash();
        let (scheme, signature) = codec::parse_certificate_verify(body)?;
        if scheme != SIGSCHEME_ED25519 {
            return Err(Error::SelfAlert(AlertDescription::IllegalParameter));
        }
        let content = certificate_verify_content(SERVER_CONTEXT, &hash_before);
        let verifier = self.verifier.take().ok_or(Error::Library)?;
        verifier.verify(&content, signature)?;
        self.transcript()?.update(full);
        self.state = State::WaitFinished;
        Ok(())
    }

    fn process_server_finished(&mut self, full: &[u8], body: &[u8]) -> Result<(), Error> {
        let hash_before = self.transcript()?.current_hash();
        let server_hs = self.server_hs_secret.take().ok_or(Error::Library)?;
        let expected = self
            .key_schedule()?
            .finished_verify_data(&server_hs, &hash_before)?;
        if body.len() != expected.len() {
            return Err(Error::SelfAlert(AlertDescription::DecodeError));
        }
        if !ct_eq(body, &expected) {
            return Err(Error::SelfAlert(AlertDescription::DecryptError));
        }
        self.transcript()?.update(full);

        self.key_schedule()?.derive_master_secret()?;
        let finished_hash = self.transcript()?.current_hash();
        let (client_ap, server_ap) = self
            .key_schedule()?
            .application_traffic_secrets(&finished_hash)?;

        let client_hs = self.client_hs_secret.take().ok_or(Error::Library)?;
        let verify_data = self
            .key_schedule()?
            .finished_verify_data(&client_hs, &finished_hash)?;
        let finished = codec::encode_finished(&verify_data);
        self.transcript()?.update(&finished);

        self.actions.push_back(Action::SendEncrypted(finished));
        self.actions
            .push_back(Action::ArmWriteApplication(client_ap));
        self.actions
            .push_back(Action::ArmReadApplication(server_ap));
        self.state = State::Connected;
        Ok(())
    }
}

impl Drop for HandshakeEngine<'_> {
    fn drop(&mut self) {
        self.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cert::Ed25519CertificateContext;
    use crate::codec::peek_message;
    use crate::crypto::rustcrypto::default_provider;
    use crate::crypto::{GROUP_X25519, TLS_AES_128_GCM_SHA256};

    #[test]
    fn ct_eq_basics() {
        assert!(ct_eq(b"abc", b"abc"));
        assert!(!ct_eq(b"abc", b"abd"));
        assert!(!ct_eq(b"abc", b"ab"));
        assert!(ct_eq(b"", b""));
    }

    #[test]
    fn client_start_emits_client_hello() {
        let provider = default_provider();
        let certs = Ed25519CertificateContext::verify_only();
        let mut engine = HandshakeEngine::new_client(&provider, &certs, Some("example.com"));
        engine.start().unwrap();
        let Some(Action::SendCleartext(msg)) = engine.take_action() else {
            panic!("expected cleartext flight");
        };
        let (msg_type, body, _) = peek_message(&msg).unwrap().unwrap();
        assert_eq!(msg_type, HandshakeType::ClientHello as u8);
        let hello = codec::parse_client_hello(body).unwrap();
        assert!(hello.supports_tls13);
        assert_eq!(hello.server_name, Some("example.com"));
        assert!(engine.take_action().is_none());
    }

    #[test]
    fn server_hello_without_key_share_is_missing_extension() {
        let provider = default_provider();
        let certs = Ed25519CertificateContext::verify_only();
        let mut engine = HandshakeEngine::new_client(&provider, &certs, None);
        engine.start().unwrap();
        let _ = engine.take_action();

        // hand-build a ServerHello carrying only supported_versions
        let mut body = Vec::new();
        codec::put_u16(&mut body, 0x0303);
        body.extend_from_slice(&[0x42; 32]);
        body.push(0); // session id echo
        codec::put_u16(&mut body, TLS_AES_128_GCM_SHA256);
        body.push(0); // compression
        let ext = codec::mark_u16(&mut body);
        codec::put_u16(&mut body, codec::EXT_SUPPORTED_VERSIONS);
        let m = codec::mark_u16(&mut body);
        codec::put_u16(&mut body, TLS13_VERSION);
        codec::patch_u16(&mut body, m);
        codec::patch_u16(&mut body, ext);

        let mut full = alloc::vec![HandshakeType::ServerHello as u8, 0, 0, body.len() as u8];
        full.extend_from_slice(&body);
        assert_eq!(
            engine.handle_message(HandshakeType::ServerHello as u8, &full, &body),
            Err(Error::SelfAlert(AlertDescription::MissingExtension))
        );
    }

    #[test]
    fn unexpected_message_in_start_state() {
        let provider = default_provider();
        let certs = Ed25519CertificateContext::verify_only();
        let mut engine = HandshakeEngine::new_client(&provider, &certs, None);
        engine.start().unwrap();
        let _ = engine.take_action();
        let finished = codec::encode_finished(&[0u8; 32]);
        let (msg_type, body, _) = peek_message(&finished).unwrap().unwrap();
        assert_eq!(
            engine.handle_message(msg_type, &finished, body),
            Err(Error::SelfAlert(AlertDescription::UnexpectedMessage))
        );
    }

    #[test]
    fn server_rejects_hello_without_overlap() {
        let provider = default_provider();
        let certs = Ed25519CertificateContext::new(&[0x42; 32]);
        let mut engine = HandshakeEngine::new_server(&provider, &certs);

        let hello = codec::encode_client_hello(&codec::ClientHelloParams {
            random: &[0x5a; 32],
            legacy_session_id: &[],
            cipher_suites: &[0x1399], // no such suite
            server_name: None,
            signature_schemes: &[SIGSCHEME_ED25519],
            supported_groups: &[GROUP_X25519],
            key_share_group: GROUP_X25519,
            key_share_public: &[0xaa; 32],
        });
        let (msg_type, body, _) = peek_message(&hello).unwrap().unwrap();
        assert_eq!(
            engine.handle_message(msg_type, &hello, body),
            Err(Error::SelfAlert(AlertDescription::HandshakeFailure))
        );
    }
}
