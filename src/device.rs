use crate::apdu::{self, P1};
use crate::transport::{Response, Transport};
use crate::version::ProtocolVersion;
use crate::{Result, Status};
use tracing::{debug, instrument, trace};

/// A session with a single U2F key.
///
/// The session learns the key's protocol version the first time it's needed and keeps
/// it for the rest of its life; there's no way to forget it short of opening a new
/// session. Every operation takes `&mut self`, as keys only do one thing at a time.
#[derive(Debug)]
pub struct Device<T: Transport> {
    transport: T,
    version: Option<ProtocolVersion>,
}

impl<T: Transport> Device<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            version: None,
        }
    }

    #[cfg(test)]
    pub(crate) fn transport(&self) -> &T {
        &self.transport
    }

    /// The key's protocol version, if it's been resolved yet.
    pub fn protocol_version(&self) -> Option<&ProtocolVersion> {
        self.version.as_ref()
    }

    async fn exchange(&mut self, req: &[u8]) -> Response {
        trace!(?req, ">> TX");
        let rsp = self.transport.send(req).await;
        trace!(?rsp, "<< RX");
        rsp
    }

    /// Queries the key's protocol version identifier, eg. "U2F_V2".
    ///
    /// Only the first successful call talks to the key. Keys too old to know the VERSION
    /// command answer it with [`Status::INS_NOT_SUPPORTED`]; that's reported as a
    /// successful "U2F_V1". Any other failure is returned untouched, and the next call
    /// will ask again.
    #[instrument(skip_all)]
    pub async fn version(&mut self) -> Response {
        match self.resolve().await {
            Ok(version) => Response::ok(version.as_bytes()),
            Err(rsp) => rsp,
        }
    }

    async fn resolve(&mut self) -> Result<ProtocolVersion, Response> {
        if let Some(version) = &self.version {
            debug!(%version, "Using cached version");
            return Ok(version.clone());
        }

        let rsp = self.exchange(&apdu::version()).await;
        let version = match rsp.status {
            Status::OK => ProtocolVersion::from(rsp.data.as_slice()),
            Status::INS_NOT_SUPPORTED => {
                debug!("VERSION not supported, assuming a U2F_V1 key");
                ProtocolVersion::V1
            }
            status => {
                debug!(%status, "Couldn't query version");
                return Err(rsp);
            }
        };
        debug!(%version, "Resolved version");
        self.version = Some(version.clone());
        Ok(version)
    }

    /// Registers a new key pair for `app_id_hash`. Requires, and consumes, a touch.
    ///
    /// The attestation is made with the key's individual attestation key. The reply is
    /// returned as-is; see [`crate::response::RegisterResponse`] to pick it apart.
    #[instrument(skip_all)]
    pub async fn enroll(&mut self, challenge: &[u8], app_id_hash: &[u8]) -> Result<Response> {
        let p1 = P1::TUP_REQUIRED | P1::TUP_CONSUME | P1::INDIVIDUAL_KEY;
        let req = apdu::enroll(p1, challenge, app_id_hash)?;
        Ok(self.exchange(&req).await)
    }

    /// Signs `challenge_hash` with the key pair behind `key_handle`. Requires, and
    /// consumes, a touch.
    ///
    /// The command layout depends on the protocol version, so this resolves it first; if
    /// that fails, its response is returned and nothing else is sent.
    ///
    /// With `no_wink`, the key is only asked whether it recognises `key_handle`: it won't
    /// wait for a touch, and a successful reply is NOT a usable signature. This is how
    /// you check for an existing enrollment without bothering the user.
    #[instrument(skip(self, challenge_hash, app_id_hash, key_handle))]
    pub async fn sign(
        &mut self,
        challenge_hash: &[u8],
        app_id_hash: &[u8],
        key_handle: &[u8],
        no_wink: bool,
    ) -> Result<Response> {
        let version = match self.resolve().await {
            Ok(version) => version,
            Err(rsp) => return Ok(rsp),
        };

        let mut p1 = P1::TUP_REQUIRED | P1::TUP_CONSUME;
        if no_wink {
            p1 |= P1::TUP_TESTONLY;
        }
        let req = apdu::sign(&version, p1, challenge_hash, app_id_hash, key_handle)?;
        Ok(self.exchange(&req).await)
    }

    /// Queries the applet version. Not every key implements this.
    #[instrument(skip_all)]
    pub async fn applet_version(&mut self) -> Response {
        self.exchange(&apdu::applet_version()).await
    }
}
