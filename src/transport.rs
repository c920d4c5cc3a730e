use crate::{Error, Result, Status};

/// Reply to a single command: a status and the payload, with the status word stripped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: Status,
    pub data: Vec<u8>,
}

impl Response {
    pub fn new<T: Into<Vec<u8>>>(status: Status, data: T) -> Self {
        Self {
            status,
            data: data.into(),
        }
    }

    pub fn ok<T: Into<Vec<u8>>>(data: T) -> Self {
        Self::new(Status::OK, data)
    }

    /// A failed exchange, with no payload.
    pub fn failed(status: Status) -> Self {
        Self::new(status, Vec::new())
    }

    /// Returns the payload if the exchange succeeded.
    pub fn into_result(self) -> Result<Vec<u8>> {
        if self.status.is_ok() {
            Ok(self.data)
        } else {
            Err(Error::APDU(self.status))
        }
    }
}

/// Something that can carry a command to a key and bring its reply back.
///
/// Keys are half-duplex: `send` takes `&mut self`, so there is never more than one
/// exchange in flight. Every `send` must resolve to exactly one [`Response`]; failures
/// below the APDU layer are reported as a negative [`Status`], not by panicking or
/// dropping the reply. Timeouts and retries, if any, live in the implementation.
#[allow(async_fn_in_trait)]
pub trait Transport {
    async fn send(&mut self, apdu: &[u8]) -> Response;
}
