//! Client side of the U2F security key command set.
//!
//! Commands are ISO 7816-4 style APDUs with extended length encoding. The [`Device`]
//! session encodes them with [`apdu`], pushes them through a [`Transport`], and
//! remembers which protocol generation the key speaks.

pub mod apdu;
pub mod device;
pub mod pcsc;
pub mod response;
pub mod status;
pub mod transport;
pub mod version;

pub use device::Device;
pub use status::Status;
pub use transport::{Response, Transport};
pub use version::ProtocolVersion;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{field} is {len} bytes long, but its length field only fits {max}")]
    LengthOverflow {
        field: &'static str,
        len: usize,
        max: usize,
    },

    #[error("malformed response: {0:?}")]
    Parse(nom::error::ErrorKind),

    #[error("incomplete response: {0:?}")]
    Incomplete(nom::Needed),

    #[error("PCSC: {0}")]
    PCSC(#[from] ::pcsc::Error),

    #[error("APDU error: {0}")]
    APDU(Status),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl<'a> From<nom::Err<nom::error::Error<&'a [u8]>>> for Error {
    fn from(e: nom::Err<nom::error::Error<&'a [u8]>>) -> Self {
        match e {
            nom::Err::Error(err) | nom::Err::Failure(err) => Self::Parse(err.code),
            nom::Err::Incomplete(needed) => Self::Incomplete(needed),
        }
    }
}
