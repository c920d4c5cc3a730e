use std::fmt;

/// Identifier of the original U2F protocol. Keys that predate the VERSION command
/// speak this.
pub const U2F_V1: &[u8] = b"U2F_V1";
/// Identifier of the second (and current) U2F protocol.
pub const U2F_V2: &[u8] = b"U2F_V2";

/// Protocol generation of a key, as reported by VERSION.
///
/// Only V1 is special-cased; every later generation shares the V2 command layout, so
/// anything that isn't exactly "U2F_V1" is treated as V2 and keeps its raw identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolVersion {
    V1,
    V2Plus(Vec<u8>),
}

impl ProtocolVersion {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::V1 => U2F_V1,
            Self::V2Plus(raw) => raw,
        }
    }
}

impl From<&[u8]> for ProtocolVersion {
    fn from(raw: &[u8]) -> Self {
        if raw == U2F_V1 {
            Self::V1
        } else {
            Self::V2Plus(raw.to_owned())
        }
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(self.as_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_bytes() {
        assert_eq!(ProtocolVersion::from(&b"U2F_V1"[..]), ProtocolVersion::V1);
        assert_eq!(
            ProtocolVersion::from(U2F_V2),
            ProtocolVersion::V2Plus(b"U2F_V2".to_vec())
        );
        // An empty reply is still "not V1".
        assert_eq!(ProtocolVersion::from(&b""[..]), ProtocolVersion::V2Plus(vec![]));
    }

    #[test]
    fn test_as_bytes() {
        assert_eq!(ProtocolVersion::V1.as_bytes(), b"U2F_V1");
        assert_eq!(ProtocolVersion::V2Plus(b"FIDO_2_0".to_vec()).as_bytes(), b"FIDO_2_0");
        assert_eq!(ProtocolVersion::V1.to_string(), "U2F_V1");
    }
}
