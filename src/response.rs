//! Structure of successful ENROLL, SIGN and APPLET VERSION replies.
//!
//! This only splits replies into their fields; nothing here checks a signature or
//! looks inside a certificate beyond its DER length.

use crate::Result;
use nom::bytes::complete::{tag, take};
use nom::combinator::{recognize, rest};
use nom::multi::length_data;
use nom::number::complete::{be_u32, be_u8};
use nom::sequence::pair;
use std::fmt;
use tracing::trace_span;

pub type IResult<'a, T> = nom::IResult<&'a [u8], T>;

/// First byte of an ENROLL reply, for historical reasons.
pub const REGISTER_RESERVED: u8 = 0x05;
/// Length of an uncompressed P-256 point.
pub const PUBLIC_KEY_LEN: usize = 65;

/// DER tag of a SEQUENCE, which is what an X.509 certificate is on the outside.
const DER_SEQUENCE: u8 = 0x30;

/// Parses a DER length. If bit 8 of the first byte is 0, bits 1-7 are the length.
/// If bit 8 is set, bits 1-7 are the number of subsequent (big-endian) length bytes.
fn der_len(input: &[u8]) -> IResult<usize> {
    let (input, first) = be_u8(input)?;
    if first < 0x80 {
        return Ok((input, first as usize));
    }
    let n = first & 0x7F;
    // Zero is BER's indefinite length, which DER doesn't allow; and nothing we'll ever
    // see is anywhere near 4GB.
    if n == 0 || n > 4 {
        return Err(nom::Err::Error(nom::error::Error::new(
            input,
            nom::error::ErrorKind::TooLarge,
        )));
    }
    let (input, raw) = take(n)(input)?;
    Ok((input, raw.iter().fold(0, |acc, b| acc << 8 | *b as usize)))
}

/// Takes a whole DER SEQUENCE, header included.
fn der_sequence(input: &[u8]) -> IResult<&[u8]> {
    recognize(pair(tag(&[DER_SEQUENCE][..]), length_data(der_len)))(input)
}

/// A successful ENROLL reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterResponse {
    /// Uncompressed P-256 public key, 0x04 || X || Y.
    pub public_key: Vec<u8>,
    /// Opaque handle to pass back to SIGN.
    pub key_handle: Vec<u8>,
    /// DER-encoded X.509 attestation certificate.
    pub attestation_cert: Vec<u8>,
    /// DER-encoded ECDSA signature over the registration data.
    pub signature: Vec<u8>,
}

fn register_response(input: &[u8]) -> IResult<RegisterResponse> {
    let (input, _) = tag(&[REGISTER_RESERVED][..])(input)?;
    let (input, public_key) = take(PUBLIC_KEY_LEN)(input)?;
    let (input, key_handle) = length_data(be_u8)(input)?;
    let (input, attestation_cert) = der_sequence(input)?;
    let (input, signature) = rest(input)?;
    Ok((
        input,
        RegisterResponse {
            public_key: public_key.to_owned(),
            key_handle: key_handle.to_owned(),
            attestation_cert: attestation_cert.to_owned(),
            signature: signature.to_owned(),
        },
    ))
}

impl RegisterResponse {
    pub fn parse(data: &[u8]) -> Result<Self> {
        let span = trace_span!("RegisterResponse");
        let _enter = span.enter();

        Ok(register_response(data)?.1)
    }
}

/// A successful SIGN reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignResponse {
    /// Bit 0 is set if the user was present.
    pub user_presence: u8,
    /// Signature counter; keys bump this on every signature.
    pub counter: u32,
    /// DER-encoded ECDSA signature.
    pub signature: Vec<u8>,
}

fn sign_response(input: &[u8]) -> IResult<SignResponse> {
    let (input, user_presence) = be_u8(input)?;
    let (input, counter) = be_u32(input)?;
    let (input, signature) = rest(input)?;
    Ok((
        input,
        SignResponse {
            user_presence,
            counter,
            signature: signature.to_owned(),
        },
    ))
}

impl SignResponse {
    pub fn parse(data: &[u8]) -> Result<Self> {
        let span = trace_span!("SignResponse");
        let _enter = span.enter();

        Ok(sign_response(data)?.1)
    }

    pub fn user_present(&self) -> bool {
        self.user_presence & 0x01 != 0
    }
}

/// Applet version, from the first 3 bytes of an APPLET VERSION reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppletVersion {
    pub major: u8,
    pub minor: u8,
    pub patch: u8,
}

fn applet_version(input: &[u8]) -> IResult<AppletVersion> {
    let (input, major) = be_u8(input)?;
    let (input, minor) = be_u8(input)?;
    let (input, patch) = be_u8(input)?;
    Ok((
        input,
        AppletVersion {
            major,
            minor,
            patch,
        },
    ))
}

impl AppletVersion {
    /// Anything past the first 3 bytes is vendor-specific, and ignored.
    pub fn parse(data: &[u8]) -> Result<Self> {
        Ok(applet_version(data)?.1)
    }
}

impl fmt::Display for AppletVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use nom::error::ErrorKind;

    fn register_bytes(cert: &[u8]) -> Vec<u8> {
        let mut data = vec![REGISTER_RESERVED];
        data.push(0x04);
        data.extend_from_slice(&[0xAB; 64]);
        data.push(4);
        data.extend_from_slice(&[0xDE, 0xAD, 0xBE, 0xEF]);
        data.extend_from_slice(cert);
        data.extend_from_slice(&[0x30, 0x02, 0x05, 0x00]);
        data
    }

    #[test]
    fn test_parse_register_response() {
        let cert = [0x30, 0x03, 0x02, 0x01, 0x07];
        let rsp = RegisterResponse::parse(&register_bytes(&cert)).expect("couldn't parse");
        assert_eq!(rsp.public_key.len(), PUBLIC_KEY_LEN);
        assert_eq!(rsp.public_key[0], 0x04);
        assert_eq!(rsp.key_handle, vec![0xDE, 0xAD, 0xBE, 0xEF]);
        assert_eq!(rsp.attestation_cert, cert.to_vec());
        assert_eq!(rsp.signature, vec![0x30, 0x02, 0x05, 0x00]);
    }

    #[test]
    fn test_parse_register_response_long_cert() {
        // Real certificates are a few hundred bytes, so use the long length form.
        let mut cert = vec![0x30, 0x82, 0x01, 0x2C];
        cert.extend_from_slice(&[0x55; 0x12C]);
        let rsp = RegisterResponse::parse(&register_bytes(&cert)).expect("couldn't parse");
        assert_eq!(rsp.attestation_cert.len(), 4 + 0x12C);
        assert_eq!(rsp.signature, vec![0x30, 0x02, 0x05, 0x00]);
    }

    #[test]
    fn test_parse_register_response_bad_reserved_byte() {
        let mut data = register_bytes(&[0x30, 0x00]);
        data[0] = 0x04;
        assert!(matches!(
            RegisterResponse::parse(&data),
            Err(Error::Parse(ErrorKind::Tag))
        ));
    }

    #[test]
    fn test_parse_register_response_truncated_key_handle() {
        let data = register_bytes(&[0x30, 0x00]);
        assert!(matches!(
            RegisterResponse::parse(&data[..1 + 65 + 1 + 2]),
            Err(Error::Incomplete(_))
        ));
    }

    #[test]
    fn test_der_len() {
        assert_eq!(der_len(&[0x05, 0xFF]), Ok((&[0xFF][..], 5)));
        assert_eq!(der_len(&[0x81, 0x80]), Ok((&[][..], 0x80)));
        assert_eq!(der_len(&[0x82, 0x01, 0x00]), Ok((&[][..], 0x100)));
        assert!(der_len(&[0x80]).is_err());
    }

    #[test]
    fn test_parse_sign_response() {
        let rsp = SignResponse::parse(&[0x01, 0x00, 0x00, 0x01, 0x02, 0x30, 0x44, 0x02])
            .expect("couldn't parse");
        assert_eq!(
            rsp,
            SignResponse {
                user_presence: 0x01,
                counter: 0x0102,
                signature: vec![0x30, 0x44, 0x02],
            }
        );
        assert!(rsp.user_present());
    }

    #[test]
    fn test_parse_sign_response_too_short() {
        assert!(matches!(
            SignResponse::parse(&[0x01, 0x00, 0x00]),
            Err(Error::Parse(ErrorKind::Eof))
        ));
    }

    #[test]
    fn test_parse_applet_version() {
        let v = AppletVersion::parse(&[0x01, 0x02, 0x03, 0xFF]).expect("couldn't parse");
        assert_eq!(
            v,
            AppletVersion {
                major: 1,
                minor: 2,
                patch: 3
            }
        );
        assert_eq!(v.to_string(), "1.2.3");
        assert!(AppletVersion::parse(&[0x01]).is_err());
    }
}
