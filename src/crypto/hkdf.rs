//! HKDF-Expand-Label and Derive-Secret (RFC 8446 section 7.1).
//!
//! These are standalone so the key schedule, the record layer, and tests
//! can all derive labeled secrets from any `HashAlgorithm`.

use crate::crypto::HashAlgorithm;
use crate::error::Error;

/// Every TLS 1.3 label is prefixed with "tls13 " inside the HkdfLabel.
const LABEL_PREFIX: &[u8] = b"tls13 ";

// HkdfLabel: u16 length, u8-prefixed label, u8-prefixed context.
const MAX_INFO_SIZE: usize = 2 + 1 + 255 + 1 + 255;

/// HKDF-Expand-Label: expand `secret` with a "tls13 "-prefixed label and
/// context, filling all of `out`.
pub fn hkdf_expand_label(
    hash: &dyn HashAlgorithm,
    secret: &[u8],
    label: &[u8],
    context: &[u8],
    out: &mut [u8],
) -> Result<(), Error> {
    let label_len = LABEL_PREFIX.len() + label.len();
    if label_len > 255 || context.len() > 255 || out.len() > 0xffff {
        return Err(Error::Library);
    }

    let mut info = [0u8; MAX_INFO_SIZE];
    let mut pos = 0;
    info[pos..pos + 2].copy_from_slice(&(out.len() as u16).to_be_bytes());
    pos += 2;
    info[pos] = label_len as u8;
    pos += 1;
    info[pos..pos + LABEL_PREFIX.len()].copy_from_slice(LABEL_PREFIX);
    pos += LABEL_PREFIX.len();
    info[pos..pos + label.len()].copy_from_slice(label);
    pos += label.len();
    info[pos] = context.len() as u8;
    pos += 1;
    info[pos..pos + context.len()].copy_from_slice(context);
    pos += context.len();

    hash.hkdf_expand(secret, &info[..pos], out)
}

/// Derive-Secret: expand to a full digest-size secret bound to a
/// transcript hash.
pub fn derive_secret(
    hash: &dyn HashAlgorithm,
    secret: &[u8],
    label: &[u8],
    transcript_hash: &[u8],
    out: &mut [u8],
) -> Result<(), Error> {
    hkdf_expand_label(hash, secret, label, transcript_hash, out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::rustcrypto::SHA256;
    use hex_literal::hex;

    #[test]
    fn early_secret_and_derived() {
        // Extract with zero salt and zero IKM, then Derive-Secret with the
        // "derived" label over the empty-transcript hash (RFC 8448 values).
        let zeros = [0u8; 32];
        let mut early = [0u8; 32];
        SHA256.hkdf_extract(&zeros, &zeros, &mut early).unwrap();
        assert_eq!(
            early,
            hex!("33ad0a1c607ec03b09e6cd9893680ce210adf300aa1f2660e1b22e10f170f92a")
        );

        let empty_hash = hex!("e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855");
        let mut derived = [0u8; 32];
        derive_secret(&SHA256, &early, b"derived", &empty_hash, &mut derived).unwrap();
        assert_eq!(
            derived,
            hex!("6f2615a108c702c5678f54fc9dbab69716c076189c48250cebeac3576c3611ba")
        );
    }

    #[test]
    fn rejects_oversized_label() {
        let secret = [0u8; 32];
        let long = [b'a'; 256];
        let mut out = [0u8; 32];
        assert_eq!(
            hkdf_expand_label(&SHA256, &secret, &long, &[], &mut out),
            Err(Error::Library)
        );
    }
}
