#![cfg_attr(not(feature = "std"), no_std)]
#![forbid(unsafe_code)]

//! Sans-I/O TLS 1.3 protocol engine.
//!
//! Implements the RFC 8446 handshake state machines, key schedule, and
//! record protection without performing any I/O: callers shuttle bytes
//! between the [`Connection`] and their transport. Crypto is pluggable
//! through the trait objects in [`crypto`]; a RustCrypto-backed provider
//! ships in [`crypto::rustcrypto`].
//!
//! ```no_run
//! use milli_tls::cert::Ed25519CertificateContext;
//! use milli_tls::crypto::rustcrypto::default_provider;
//! use milli_tls::{Connection, OutputBuffer};
//!
//! let provider = default_provider();
//! let certs = Ed25519CertificateContext::verify_only();
//! let mut conn = Connection::new_client(&provider, &certs, Some("example.com"));
//! let mut sendbuf: OutputBuffer = OutputBuffer::new();
//! let (_status, _consumed) = conn.handshake(&mut sendbuf, &[]).unwrap();
//! // transmit sendbuf, feed replies back into handshake() until Complete
//! ```

#[cfg(any(test, feature = "std"))]
extern crate std;

extern crate alloc;

pub mod buffer;
pub mod cert;
pub mod codec;
pub mod connection;
pub mod crypto;
pub mod error;
pub mod key_schedule;
pub mod record;

mod handshake;

pub use buffer::OutputBuffer;
pub use connection::{Connection, HandshakeStatus};
pub use error::{AlertDescription, Error};
pub use handshake::Role;
