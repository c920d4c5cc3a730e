//! U2F command encoding.
//!
//! Every command uses the extended-length form of ISO 7816-4:
//!
//! ```text
//! | CLA | INS | P1 | P2 | 00 | LenHi LenLo | Data | 00 00 |
//! ```
//!
//! The trailing two bytes are an extended Le of zero, ie. "as much as you've got".

use crate::version::ProtocolVersion;
use crate::{Error, Result};
use bitflags::bitflags;
use byteorder::{BigEndian, ByteOrder};
use num_enum::IntoPrimitive;
use tracing::trace;

/// Header length: CLA, INS, P1, P2, and a 3-byte extended Lc.
pub const HEADER_LEN: usize = 7;
/// Trailer length: a 2-byte extended Le.
pub const TRAILER_LEN: usize = 2;

/// Longest data field the 16-bit Lc can describe.
pub const MAX_DATA_LEN: usize = u16::MAX as usize;
/// Longest key handle a V2 SIGN's 1-byte length prefix can describe.
pub const MAX_KEY_HANDLE_LEN: usize = u8::MAX as usize;

/// Class byte; U2F only uses the interindustry class.
pub const CLA: u8 = 0x00;

#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive)]
#[repr(u8)]
pub enum Instruction {
    /// Register a new key pair for an application.
    Enroll = 0x01,
    /// Sign a challenge with a previously registered key pair.
    Sign = 0x02,
    /// Query the U2F protocol version, eg. "U2F_V2".
    Version = 0x03,
    /// Vendor extension: query the applet version. The first 3 bytes of the reply are
    /// major, minor and patch.
    AppletVersion = 0x11,
}

bitflags! {
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
    pub struct P1: u8 {
        /// A Test of User Presence is required.
        const TUP_REQUIRED = 0x01;
        /// Consume the Test of User Presence.
        const TUP_CONSUME = 0x02;
        /// Only check whether the key handle is ours; don't touch-gate or sign.
        /// Replies to this are never usable signatures.
        const TUP_TESTONLY = 0x04;
        /// Attest with the device's individual key rather than a batch key.
        const INDIVIDUAL_KEY = 0x80;
    }
}

/// Encodes a command with the given data segments, concatenated in order.
///
/// The buffer is allocated at its final size.
pub fn encode(ins: Instruction, p1: P1, segments: &[&[u8]]) -> Result<Vec<u8>> {
    let data_len: usize = segments.iter().map(|s| s.len()).sum();
    if data_len > MAX_DATA_LEN {
        return Err(Error::LengthOverflow {
            field: "command data",
            len: data_len,
            max: MAX_DATA_LEN,
        });
    }

    let mut buf = vec![0; HEADER_LEN + data_len + TRAILER_LEN];
    buf[0] = CLA;
    buf[1] = ins.into();
    buf[2] = p1.bits();
    // buf[3] is P2, buf[4] is the extended length marker; both zero.
    BigEndian::write_u16(&mut buf[5..HEADER_LEN], data_len as u16);

    let mut offset = HEADER_LEN;
    for segment in segments {
        buf[offset..offset + segment.len()].copy_from_slice(segment);
        offset += segment.len();
    }

    trace!(?ins, ?p1, data_len, "encoded");
    Ok(buf)
}

/// ENROLL: `challenge || app_id_hash`. Identical across protocol versions.
pub fn enroll(p1: P1, challenge: &[u8], app_id_hash: &[u8]) -> Result<Vec<u8>> {
    encode(Instruction::Enroll, p1, &[challenge, app_id_hash])
}

/// SIGN: `challenge_hash || app_id_hash || key_handle`. V2 and later put the key
/// handle's length in a byte right in front of it.
pub fn sign(
    version: &ProtocolVersion,
    p1: P1,
    challenge_hash: &[u8],
    app_id_hash: &[u8],
    key_handle: &[u8],
) -> Result<Vec<u8>> {
    match version {
        ProtocolVersion::V1 => encode(
            Instruction::Sign,
            p1,
            &[challenge_hash, app_id_hash, key_handle],
        ),
        ProtocolVersion::V2Plus(_) => {
            let kh_len = u8::try_from(key_handle.len()).map_err(|_| Error::LengthOverflow {
                field: "key handle",
                len: key_handle.len(),
                max: MAX_KEY_HANDLE_LEN,
            })?;
            encode(
                Instruction::Sign,
                p1,
                &[challenge_hash, app_id_hash, &[kh_len], key_handle],
            )
        }
    }
}

/// VERSION. Takes no version itself, as it's how we find out.
pub fn version() -> Vec<u8> {
    header_only(Instruction::Version)
}

/// APPLET VERSION.
pub fn applet_version() -> Vec<u8> {
    header_only(Instruction::AppletVersion)
}

fn header_only(ins: Instruction) -> Vec<u8> {
    vec![CLA, ins.into(), 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]
}
