use std::fmt;

/// Result code of a command exchange.
///
/// Zero is success. Positive values are ISO 7816 status words reported by the key,
/// with the `90 00` success word already folded into zero by the transport. Negative
/// values are failures below the APDU layer, reported by the transport itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Status(pub i32);

impl Status {
    pub const OK: Self = Self(0);

    /// 0x6700: Wrong length.
    pub const WRONG_LENGTH: Self = Self(0x6700);
    /// 0x6985: Conditions of use not satisfied; for U2F, "touch the key".
    pub const CONDITIONS_NOT_SATISFIED: Self = Self(0x6985);
    /// 0x6A80: Wrong data; for U2F, a key handle this key didn't issue.
    pub const WRONG_DATA: Self = Self(0x6A80);
    /// 0x6D00: Instruction not supported. Legacy keys answer VERSION with this.
    pub const INS_NOT_SUPPORTED: Self = Self(0x6D00);
    /// 0x6E00: Class not supported.
    pub const CLA_NOT_SUPPORTED: Self = Self(0x6E00);

    /// The transport couldn't complete the exchange at all.
    pub const TRANSPORT_ERROR: Self = Self(-0x7F);

    /// Builds a status from a raw status word. `90 00` is success.
    pub fn from_sw(sw1: u8, sw2: u8) -> Self {
        match (sw1, sw2) {
            (0x90, 0x00) => Self::OK,
            (sw1, sw2) => Self(i32::from(u16::from_be_bytes([sw1, sw2]))),
        }
    }

    pub fn is_ok(&self) -> bool {
        *self == Self::OK
    }

    pub fn class(&self) -> StatusClass {
        match *self {
            Self::OK => StatusClass::OK,
            Self::WRONG_LENGTH => StatusClass::WrongLength,
            Self::CONDITIONS_NOT_SATISFIED => StatusClass::UserPresenceRequired,
            Self::WRONG_DATA => StatusClass::BadKeyHandle,
            Self::INS_NOT_SUPPORTED => StatusClass::InsNotSupported,
            Self::CLA_NOT_SUPPORTED => StatusClass::ClaNotSupported,
            Self(x) if x < 0 => StatusClass::Transport(x),
            Self(x) => StatusClass::Unknown(x),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    OK,                   // 0x0000 (0x9000 on the wire)
    WrongLength,          // 0x6700
    UserPresenceRequired, // 0x6985 - Touch the key and try again.
    BadKeyHandle,         // 0x6A80 - Key handle not issued by this key, or mangled.
    InsNotSupported,      // 0x6D00
    ClaNotSupported,      // 0x6E00
    Transport(i32),       // < 0 - Below the APDU layer.
    Unknown(i32),         // Anything else!
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.class() {
            StatusClass::OK => write!(f, "OK"),
            StatusClass::WrongLength => write!(f, "0x{:04X} (wrong length)", self.0),
            StatusClass::UserPresenceRequired => {
                write!(f, "0x{:04X} (user presence required)", self.0)
            }
            StatusClass::BadKeyHandle => write!(f, "0x{:04X} (bad key handle)", self.0),
            StatusClass::InsNotSupported => {
                write!(f, "0x{:04X} (instruction not supported)", self.0)
            }
            StatusClass::ClaNotSupported => write!(f, "0x{:04X} (class not supported)", self.0),
            StatusClass::Transport(x) => write!(f, "{} (transport error)", x),
            StatusClass::Unknown(x) => write!(f, "0x{:04X}", x),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_sw() {
        assert_eq!(Status::from_sw(0x90, 0x00), Status::OK);
        assert_eq!(Status::from_sw(0x6D, 0x00), Status::INS_NOT_SUPPORTED);
        assert_eq!(Status::from_sw(0x6A, 0x80), Status(0x6A80));
        assert_eq!(Status::from_sw(0xFF, 0xFF), Status(0xFFFF));
    }

    #[test]
    fn test_class() {
        assert_eq!(Status(0).class(), StatusClass::OK);
        assert_eq!(Status(0x6985).class(), StatusClass::UserPresenceRequired);
        assert_eq!(Status::TRANSPORT_ERROR.class(), StatusClass::Transport(-0x7F));
        assert_eq!(Status(0x6A82).class(), StatusClass::Unknown(0x6A82));
    }

    #[test]
    fn test_display() {
        assert_eq!(Status::OK.to_string(), "OK");
        assert_eq!(
            Status::CONDITIONS_NOT_SATISFIED.to_string(),
            "0x6985 (user presence required)"
        );
        assert_eq!(Status(0x6A82).to_string(), "0x6A82");
    }
}
