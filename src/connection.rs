//! Sans-I/O connection driver.
//!
//! [`Connection`] owns the record layer and the handshake engine and never
//! touches a socket: every operation takes the bytes that arrived and an
//! [`OutputBuffer`] for the bytes to transmit. The caller moves both.
//!
//! Error contract: a `SelfAlert` (or internal) failure from `handshake`
//! leaves the matching alert record in the send buffer; transmitting it
//! before tearing down is the caller's side of the deal. `WouldBlock` and
//! peer alerts put nothing in the buffer.

use alloc::vec::Vec;

use crate::buffer::OutputBuffer;
use crate::cert::CertificateContext;
use crate::crypto::CryptoProvider;
use crate::error::{AlertDescription, Error};
use crate::handshake::{Action, HandshakeEngine, Role, MAX_HANDSHAKE_MESSAGE_SIZE};
use crate::record::{
    decode_header, open_record, plaintext_record, seal_record, AeadState, ContentType,
    HEADER_SIZE, MAX_PLAINTEXT_SIZE,
};

/// Outcome of a successful `handshake` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeStatus {
    /// More peer flights are needed; transmit the send buffer and wait.
    InProgress,
    /// The connection is established.
    Complete,
}

/// One TLS 1.3 connection, either role.
pub struct Connection<'a> {
    engine: HandshakeEngine<'a>,
    read_state: Option<AeadState>,
    write_state: Option<AeadState>,
    /// Handshake messages can span records; partial ones wait here.
    recv_messages: Vec<u8>,
    started: bool,
}

impl<'a> Connection<'a> {
    /// Client connection. `server_name` goes out in the SNI extension and
    /// is offered to the certificate context on lookup.
    pub fn new_client(
        provider: &'a dyn CryptoProvider,
        certificates: &'a dyn CertificateContext,
        server_name: Option<&'a str>,
    ) -> Self {
        Self {
            engine: HandshakeEngine::new_client(provider, certificates, server_name),
            read_state: None,
            write_state: None,
            recv_messages: Vec::new(),
            started: false,
        }
    }

    /// Server connection.
    pub fn new_server(
        provider: &'a dyn CryptoProvider,
        certificates: &'a dyn CertificateContext,
    ) -> Self {
        Self {
            engine: HandshakeEngine::new_server(provider, certificates),
            read_state: None,
            write_state: None,
            recv_messages: Vec::new(),
            started: false,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.engine.is_connected()
    }

    pub fn role(&self) -> Role {
        self.engine.role()
    }

    /// Negotiated cipher suite identifier, once known.
    pub fn cipher_suite(&self) -> Option<u16> {
        self.engine.suite().map(|s| s.id)
    }

    /// Drive the handshake: consume peer records from `input`, append our
    /// flights to `sendbuf`. Returns the status and how many input bytes
    /// were consumed; a partial record at the tail is left unconsumed for
    /// the next call.
    pub fn handshake<const N: usize>(
        &mut self,
        sendbuf: &mut OutputBuffer<N>,
        input: &[u8],
    ) -> Result<(HandshakeStatus, usize), Error> {
        if self.engine.is_connected() {
            return Err(Error::HandshakeAlreadyComplete);
        }
        match self.drive_handshake(sendbuf, input) {
            Ok(consumed) => {
                let status = if self.engine.is_connected() {
                    HandshakeStatus::Complete
                } else {
                    HandshakeStatus::InProgress
                };
                Ok((status, consumed))
            }
            Err(err) => {
                self.fail(sendbuf, err);
                Err(err)
            }
        }
    }

    fn drive_handshake<const N: usize>(
        &mut self,
        sendbuf: &mut OutputBuffer<N>,
        input: &[u8],
    ) -> Result<usize, Error> {
        if self.engine.role() == Role::Client && !self.started {
            self.started = true;
            self.engine.start()?;
            self.flush_actions(sendbuf)?;
        }

        let mut consumed = 0;
        while !self.engine.is_connected() {
            let rest = &input[consumed..];
            if rest.len() < HEADER_SIZE {
                break;
            }
            let raw_header: [u8; HEADER_SIZE] = rest[..HEADER_SIZE]
                .try_into()
                .map_err(|_| Error::Library)?;
            let header = decode_header(&raw_header)?;
            if rest.len() < HEADER_SIZE + header.length {
                break;
            }
            let body = &rest[HEADER_SIZE..HEADER_SIZE + header.length];
            consumed += HEADER_SIZE + header.length;

            match header.content_type {
                // middlebox compatibility: ignored whenever it shows up
                ContentType::ChangeCipherSpec => {}
                ContentType::Alert => return Err(parse_alert(body)?),
                ContentType::Handshake => {
                    if self.read_state.is_some() {
                        // peer must protect its handshake once keys exist
                        return Err(Error::SelfAlert(AlertDescription::UnexpectedMessage));
                    }
                    self.feed_messages(sendbuf, body)?;
                }
                ContentType::ApplicationData => {
                    let state = self
                        .read_state
                        .as_mut()
                        .ok_or(Error::SelfAlert(AlertDescription::UnexpectedMessage))?;
                    let mut record = body.to_vec();
                    let (len, inner_type) = open_record(state, &raw_header, &mut record)?;
                    match inner_type {
                        ContentType::Handshake => self.feed_messages(sendbuf, &record[..len])?,
                        ContentType::Alert => return Err(parse_alert(&record[..len])?),
                        _ => {
                            return Err(Error::SelfAlert(AlertDescription::UnexpectedMessage));
                        }
                    }
                }
            }
        }
        Ok(consumed)
    }

    /// Buffer handshake bytes and dispatch every complete message.
    fn feed_messages<const N: usize>(
        &mut self,
        sendbuf: &mut OutputBuffer<N>,
        data: &[u8],
    ) -> Result<(), Error> {
        self.recv_messages.extend_from_slice(data);
        loop {
            if self.recv_messages.len() >= 4 {
                let declared = ((self.recv_messages[1] as usize) << 16)
                    | ((self.recv_messages[2] as usize) << 8)
                    | self.recv_messages[3] as usize;
                if declared > MAX_HANDSHAKE_MESSAGE_SIZE {
                    return Err(Error::SelfAlert(AlertDescription::DecodeError));
                }
            }
            let total = match crate::codec::peek_message(&self.recv_messages)? {
                Some((_, _, total)) => total,
                None => break,
            };
            let full: Vec<u8> = self.recv_messages.drain(..total).collect();
            let (msg_type, msg_body, _) =
                crate::codec::peek_message(&full)?.ok_or(Error::Library)?;
            self.engine.handle_message(msg_type, &full, msg_body)?;
            self.flush_actions(sendbuf)?;
            if self.engine.is_connected() {
                break;
            }
        }
        Ok(())
    }

    /// Apply queued engine actions in order: emit records and arm key slots.
    fn flush_actions<const N: usize>(
        &mut self,
        sendbuf: &mut OutputBuffer<N>,
    ) -> Result<(), Error> {
        while let Some(action) = self.engine.take_action() {
            match action {
                Action::SendCleartext(msg) => {
                    plaintext_record(ContentType::Handshake, &msg, sendbuf);
                }
                Action::SendEncrypted(msg) => {
                    let state = self.write_state.as_mut().ok_or(Error::Library)?;
                    seal_record(state, ContentType::Handshake, &msg, sendbuf)?;
                }
                Action::ArmWriteHandshake(secret) | Action::ArmWriteApplication(secret) => {
                    let suite = self.engine.suite().ok_or(Error::Library)?;
                    self.write_state = Some(AeadState::from_traffic_secret(suite, &secret)?);
                }
                Action::ArmReadHandshake(secret) | Action::ArmReadApplication(secret) => {
                    let suite = self.engine.suite().ok_or(Error::Library)?;
                    self.read_state = Some(AeadState::from_traffic_secret(suite, &secret)?);
                }
            }
        }
        Ok(())
    }

    /// Protect `plaintext` into `sendbuf`, splitting at the record size
    /// limit. An empty input still produces one (empty) record.
    pub fn send<const N: usize>(
        &mut self,
        sendbuf: &mut OutputBuffer<N>,
        plaintext: &[u8],
    ) -> Result<usize, Error> {
        if !self.engine.is_connected() {
            return Err(Error::HandshakeInProgress);
        }
        let state = self.write_state.as_mut().ok_or(Error::Library)?;
        if plaintext.is_empty() {
            seal_record(state, ContentType::ApplicationData, &[], sendbuf)?;
            return Ok(0);
        }
        for chunk in plaintext.chunks(MAX_PLAINTEXT_SIZE) {
            seal_record(state, ContentType::ApplicationData, chunk, sendbuf)?;
        }
        Ok(plaintext.len())
    }

    /// Unprotect one record from `input`, appending application data to
    /// `plainbuf`. Returns bytes consumed; `WouldBlock` when `input` holds
    /// no complete record. Post-handshake handshake messages (tickets) are
    /// consumed and dropped. A peer alert surfaces as `PeerAlert`, with
    /// close_notify marking orderly shutdown.
    ///
    /// Until the connection is established this returns
    /// `HandshakeInProgress`: handshake-era records go through [`handshake`],
    /// which unprotects them itself.
    ///
    /// [`handshake`]: Connection::handshake
    pub fn receive<const N: usize>(
        &mut self,
        plainbuf: &mut OutputBuffer<N>,
        input: &[u8],
    ) -> Result<usize, Error> {
        if !self.engine.is_connected() {
            return Err(Error::HandshakeInProgress);
        }
        if input.len() < HEADER_SIZE {
            return Err(Error::WouldBlock);
        }
        let raw_header: [u8; HEADER_SIZE] = input[..HEADER_SIZE]
            .try_into()
            .map_err(|_| Error::Library)?;
        let header = decode_header(&raw_header)?;
        if input.len() < HEADER_SIZE + header.length {
            return Err(Error::WouldBlock);
        }
        let consumed = HEADER_SIZE + header.length;

        match header.content_type {
            ContentType::ChangeCipherSpec => Ok(consumed),
            ContentType::ApplicationData => {
                let state = self.read_state.as_mut().ok_or(Error::Library)?;
                let mut record = input[HEADER_SIZE..consumed].to_vec();
                let (len, inner_type) = open_record(state, &raw_header, &mut record)?;
                match inner_type {
                    ContentType::ApplicationData => {
                        plainbuf.extend_from_slice(&record[..len]);
                        Ok(consumed)
                    }
                    // NewSessionTicket and friends; session persistence is
                    // the caller's business, not ours
                    ContentType::Handshake => Ok(consumed),
                    ContentType::Alert => Err(parse_alert(&record[..len])?),
                    ContentType::ChangeCipherSpec => {
                        Err(Error::SelfAlert(AlertDescription::UnexpectedMessage))
                    }
                }
            }
            // everything travels protected once the handshake is done
            _ => Err(Error::SelfAlert(AlertDescription::UnexpectedMessage)),
        }
    }

    /// Queue a close_notify alert for orderly shutdown.
    pub fn close<const N: usize>(&mut self, sendbuf: &mut OutputBuffer<N>) -> Result<(), Error> {
        self.emit_alert(sendbuf, AlertDescription::CloseNotify)
    }

    fn fail<const N: usize>(&mut self, sendbuf: &mut OutputBuffer<N>, err: Error) {
        self.engine.abort();
        if let Some(desc) = err.alert_to_send() {
            let _ = self.emit_alert(sendbuf, desc);
        }
    }

    fn emit_alert<const N: usize>(
        &mut self,
        sendbuf: &mut OutputBuffer<N>,
        desc: AlertDescription,
    ) -> Result<(), Error> {
        let level = if desc.is_warning() { 1 } else { 2 };
        let payload = [level, desc.to_u8()];
        match &mut self.write_state {
            Some(state) => seal_record(state, ContentType::Alert, &payload, sendbuf),
            None => {
                plaintext_record(ContentType::Alert, &payload, sendbuf);
                Ok(())
            }
        }
    }
}

/// Decode an alert body into the error it represents.
fn parse_alert(body: &[u8]) -> Result<Error, Error> {
    if body.len() != 2 {
        return Err(Error::SelfAlert(AlertDescription::DecodeError));
    }
    let desc = AlertDescription::from_u8(body[1])
        .ok_or(Error::SelfAlert(AlertDescription::DecodeError))?;
    Ok(Error::PeerAlert(desc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cert::Ed25519CertificateContext;
    use crate::crypto::rustcrypto::default_provider;

    type Buf = OutputBuffer<4096>;

    fn pump(client: &mut Connection<'_>, server: &mut Connection<'_>) {
        let mut c2s: Vec<u8> = Vec::new();
        let mut s2c: Vec<u8> = Vec::new();
        for _ in 0..8 {
            if client.is_connected() && server.is_connected() {
                return;
            }
            if !client.is_connected() {
                let mut out = Buf::new();
                let (_, consumed) = client.handshake(&mut out, &s2c).unwrap();
                s2c.drain(..consumed);
                c2s.extend_from_slice(&out);
            }
            if !server.is_connected() {
                let mut out = Buf::new();
                let (_, consumed) = server.handshake(&mut out, &c2s).unwrap();
                c2s.drain(..consumed);
                s2c.extend_from_slice(&out);
            }
        }
        panic!("handshake did not converge");
    }

    #[test]
    fn handshake_and_echo() {
        let provider = default_provider();
        let server_certs = Ed25519CertificateContext::new(&[0x42; 32]);
        let client_certs = Ed25519CertificateContext::verify_only();
        let mut client = Connection::new_client(&provider, &client_certs, Some("localhost"));
        let mut server = Connection::new_server(&provider, &server_certs);
        pump(&mut client, &mut server);

        let mut wire = Buf::new();
        assert_eq!(client.send(&mut wire, b"ping").unwrap(), 4);
        let mut plain = Buf::new();
        let consumed = server.receive(&mut plain, &wire).unwrap();
        assert_eq!(consumed, wire.len());
        assert_eq!(&plain[..], b"ping");

        let mut wire = Buf::new();
        server.send(&mut wire, b"pong").unwrap();
        let mut plain = Buf::new();
        client.receive(&mut plain, &wire).unwrap();
        assert_eq!(&plain[..], b"pong");
    }

    #[test]
    fn send_before_connected_fails() {
        let provider = default_provider();
        let certs = Ed25519CertificateContext::verify_only();
        let mut client = Connection::new_client(&provider, &certs, None);
        let mut buf = Buf::new();
        assert_eq!(
            client.send(&mut buf, b"early"),
            Err(Error::HandshakeInProgress)
        );
        assert_eq!(client.receive(&mut buf, &[]), Err(Error::HandshakeInProgress));
    }

    #[test]
    fn handshake_after_connected_fails() {
        let provider = default_provider();
        let server_certs = Ed25519CertificateContext::new(&[0x42; 32]);
        let client_certs = Ed25519CertificateContext::verify_only();
        let mut client = Connection::new_client(&provider, &client_certs, None);
        let mut server = Connection::new_server(&provider, &server_certs);
        pump(&mut client, &mut server);
        let mut buf = Buf::new();
        assert_eq!(
            client.handshake(&mut buf, &[]),
            Err(Error::HandshakeAlreadyComplete)
        );
    }

    #[test]
    fn receive_partial_record_would_block() {
        let provider = default_provider();
        let server_certs = Ed25519CertificateContext::new(&[0x42; 32]);
        let client_certs = Ed25519CertificateContext::verify_only();
        let mut client = Connection::new_client(&provider, &client_certs, None);
        let mut server = Connection::new_server(&provider, &server_certs);
        pump(&mut client, &mut server);

        let mut wire = Buf::new();
        client.send(&mut wire, b"split me").unwrap();
        let mut plain = Buf::new();
        assert_eq!(
            server.receive(&mut plain, &wire[..3]),
            Err(Error::WouldBlock)
        );
        assert_eq!(
            server.receive(&mut plain, &wire[..wire.len() - 1]),
            Err(Error::WouldBlock)
        );
        server.receive(&mut plain, &wire).unwrap();
        assert_eq!(&plain[..], b"split me");
    }

    #[test]
    fn close_notify_roundtrip() {
        let provider = default_provider();
        let server_certs = Ed25519CertificateContext::new(&[0x42; 32]);
        let client_certs = Ed25519CertificateContext::verify_only();
        let mut client = Connection::new_client(&provider, &client_certs, None);
        let mut server = Connection::new_server(&provider, &server_certs);
        pump(&mut client, &mut server);

        let mut wire = Buf::new();
        client.close(&mut wire).unwrap();
        let mut plain = Buf::new();
        assert_eq!(
            server.receive(&mut plain, &wire),
            Err(Error::PeerAlert(AlertDescription::CloseNotify))
        );
    }
}
