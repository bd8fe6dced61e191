//! TLS 1.3 alert descriptions (RFC 8446 section 6) and the crate error type.

/// TLS alert description codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AlertDescription {
    CloseNotify = 0,
    UnexpectedMessage = 10,
    BadRecordMac = 20,
    RecordOverflow = 22,
    HandshakeFailure = 40,
    BadCertificate = 42,
    CertificateRevoked = 44,
    CertificateExpired = 45,
    CertificateUnknown = 46,
    IllegalParameter = 47,
    UnknownCa = 48,
    DecodeError = 50,
    DecryptError = 51,
    ProtocolVersion = 70,
    InsufficientSecurity = 71,
    InternalError = 80,
    UserCanceled = 90,
    MissingExtension = 109,
    UnsupportedExtension = 110,
    UnrecognizedName = 112,
    NoApplicationProtocol = 120,
}

impl AlertDescription {
    /// Convert from a raw u8 byte.
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::CloseNotify),
            10 => Some(Self::UnexpectedMessage),
            20 => Some(Self::BadRecordMac),
            22 => Some(Self::RecordOverflow),
            40 => Some(Self::HandshakeFailure),
            42 => Some(Self::BadCertificate),
            44 => Some(Self::CertificateRevoked),
            45 => Some(Self::CertificateExpired),
            46 => Some(Self::CertificateUnknown),
            47 => Some(Self::IllegalParameter),
            48 => Some(Self::UnknownCa),
            50 => Some(Self::DecodeError),
            51 => Some(Self::DecryptError),
            70 => Some(Self::ProtocolVersion),
            71 => Some(Self::InsufficientSecurity),
            80 => Some(Self::InternalError),
            90 => Some(Self::UserCanceled),
            109 => Some(Self::MissingExtension),
            110 => Some(Self::UnsupportedExtension),
            112 => Some(Self::UnrecognizedName),
            120 => Some(Self::NoApplicationProtocol),
            _ => None,
        }
    }

    /// Convert to raw u8 byte.
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Whether the alert is a warning rather than fatal (RFC 8446 §6.1).
    pub fn is_warning(self) -> bool {
        matches!(self, Self::CloseNotify | Self::UserCanceled)
    }
}

/// Top-level crate error.
///
/// Protocol failures carry their TLS alert description and which side
/// detected them: `SelfAlert` means this engine found the problem and owes
/// the peer an alert record, `PeerAlert` means the remote side reported one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Local protocol failure; the matching alert must reach the peer.
    SelfAlert(AlertDescription),
    /// The peer sent an alert record.
    PeerAlert(AlertDescription),
    /// Operation requires a completed handshake.
    HandshakeInProgress,
    /// `handshake` called after the connection reached `Connected`.
    HandshakeAlreadyComplete,
    /// Key material rejected by a crypto backend (wrong size or format).
    IncompatibleKey,
    /// Per-direction record sequence number space exhausted.
    SequenceOverflow,
    /// Input ends mid-record; nothing consumed past it.
    WouldBlock,
    /// Internal invariant violated.
    Library,
}

impl Error {
    /// Alert description to transmit for this error, if one is owed.
    pub fn alert_to_send(&self) -> Option<AlertDescription> {
        match self {
            Error::SelfAlert(desc) => Some(*desc),
            Error::HandshakeInProgress
            | Error::HandshakeAlreadyComplete
            | Error::WouldBlock
            | Error::PeerAlert(_) => None,
            Error::IncompatibleKey | Error::SequenceOverflow | Error::Library => {
                Some(AlertDescription::InternalError)
            }
        }
    }
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::SelfAlert(desc) => write!(f, "fatal alert raised: {desc:?}"),
            Error::PeerAlert(desc) => write!(f, "alert received from peer: {desc:?}"),
            Error::HandshakeInProgress => write!(f, "handshake still in progress"),
            Error::HandshakeAlreadyComplete => write!(f, "handshake already complete"),
            Error::IncompatibleKey => write!(f, "incompatible key material"),
            Error::SequenceOverflow => write!(f, "record sequence number exhausted"),
            Error::WouldBlock => write!(f, "would block on partial record"),
            Error::Library => write!(f, "internal library error"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_alert_codes() {
        let codes = [
            AlertDescription::CloseNotify,
            AlertDescription::UnexpectedMessage,
            AlertDescription::BadRecordMac,
            AlertDescription::RecordOverflow,
            AlertDescription::HandshakeFailure,
            AlertDescription::BadCertificate,
            AlertDescription::CertificateRevoked,
            AlertDescription::CertificateExpired,
            AlertDescription::CertificateUnknown,
            AlertDescription::IllegalParameter,
            AlertDescription::UnknownCa,
            AlertDescription::DecodeError,
            AlertDescription::DecryptError,
            AlertDescription::ProtocolVersion,
            AlertDescription::InsufficientSecurity,
            AlertDescription::InternalError,
            AlertDescription::UserCanceled,
            AlertDescription::MissingExtension,
            AlertDescription::UnsupportedExtension,
            AlertDescription::UnrecognizedName,
            AlertDescription::NoApplicationProtocol,
        ];
        for code in codes {
            assert_eq!(AlertDescription::from_u8(code.to_u8()), Some(code));
        }
    }

    #[test]
    fn unknown_alert_code() {
        assert_eq!(AlertDescription::from_u8(255), None);
        assert_eq!(AlertDescription::from_u8(2), None);
    }

    #[test]
    fn alert_to_send_classification() {
        assert_eq!(
            Error::SelfAlert(AlertDescription::DecodeError).alert_to_send(),
            Some(AlertDescription::DecodeError)
        );
        assert_eq!(
            Error::PeerAlert(AlertDescription::CloseNotify).alert_to_send(),
            None
        );
        assert_eq!(Error::WouldBlock.alert_to_send(), None);
        assert_eq!(
            Error::SequenceOverflow.alert_to_send(),
            Some(AlertDescription::InternalError)
        );
    }

    #[test]
    fn warning_alerts() {
        assert!(AlertDescription::CloseNotify.is_warning());
        assert!(AlertDescription::UserCanceled.is_warning());
        assert!(!AlertDescription::BadRecordMac.is_warning());
    }
}
