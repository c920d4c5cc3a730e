//! Transport for NFC security keys on a PC/SC reader.
//!
//! NFC keys are ordinary ISO 7816 cards with a FIDO applet on them; once it's selected,
//! U2F commands go over the air as-is. Replies longer than the reader will hand us in
//! one go are collected with GET RESPONSE.

use crate::transport::Response;
use crate::{Result, Status};
use tap::TapFallible;
use tracing::{debug, trace, trace_span, warn};

/// Application ID of the FIDO applet.
pub const FIDO_AID: [u8; 8] = [0xA0, 0x00, 0x00, 0x06, 0x47, 0x2F, 0x00, 0x01];

/// GET RESPONSE rounds allowed for a single command. Each round carries up to 256 bytes,
/// and no reply can outgrow the largest buffer a reader hands back.
pub const MAX_GET_RESPONSE_ROUNDS: usize = pcsc::MAX_BUFFER_SIZE_EXTENDED / 256;

/// A connected card with the FIDO applet selected.
///
/// `pcsc` is synchronous: [`send`](crate::Transport::send) blocks on
/// `Card::transmit` and never yields, so drive it with an executor that's fine with
/// that, eg. `futures::executor::block_on`.
pub struct PCSC {
    card: pcsc::Card,
    rbuf: Vec<u8>,
}

impl PCSC {
    /// Wraps a connected card, and selects the FIDO applet on it.
    pub fn new(card: pcsc::Card) -> Result<Self> {
        let span = trace_span!("select_fido_applet");
        let _enter = span.enter();

        let mut slf = Self {
            card,
            rbuf: vec![0; pcsc::MAX_BUFFER_SIZE_EXTENDED],
        };
        let select = write_cmd(apdu::Command::new_with_payload(
            0x00,
            0xA4,
            0x04,
            0x00,
            &FIDO_AID[..],
        ));
        // Keys answer with their version string, eg. "U2F_V2".
        let applet = slf.transmit(&select)?.into_result()?;
        debug!(applet = %String::from_utf8_lossy(&applet), "Selected FIDO applet");
        Ok(slf)
    }

    fn transmit(&mut self, req: &[u8]) -> Result<Response> {
        let Self { card, rbuf } = self;
        exchange(req, |req| Ok(card.transmit(req, &mut rbuf[..])?.to_vec()))
    }
}

impl crate::Transport for PCSC {
    async fn send(&mut self, apdu: &[u8]) -> Response {
        or_transport_error(self.transmit(apdu))
    }
}

/// What to do after one raw reply from the card.
#[derive(Debug, PartialEq, Eq)]
enum Step {
    /// The reply is complete.
    Done(Response),
    /// More data is waiting; fetch it with GET RESPONSE and this Le.
    GetResponse(u16),
}

/// Appends the body of a raw reply to `data`, and decides on its status word.
fn step(data: &mut Vec<u8>, rsp: &[u8]) -> Step {
    if rsp.len() < 2 {
        warn!(?rsp, "Response has no status word");
        return Step::Done(Response::failed(Status::TRANSPORT_ERROR));
    }
    let (body, sw) = rsp.split_at(rsp.len() - 2);
    data.extend_from_slice(body);

    match (sw[0], sw[1]) {
        // 0 means 256.
        (0x61, 0x00) => Step::GetResponse(256),
        (0x61, xx) => Step::GetResponse(u16::from(xx)),
        (sw1, sw2) => {
            let status = Status::from_sw(sw1, sw2);
            Step::Done(Response::new(status, std::mem::take(data)))
        }
    }
}

/// Sends a command through `transmit`, following GET RESPONSE chains until the card
/// gives a final status word, or [`MAX_GET_RESPONSE_ROUNDS`] runs out.
fn exchange<F>(req: &[u8], mut transmit: F) -> Result<Response>
where
    F: FnMut(&[u8]) -> Result<Vec<u8>>,
{
    let mut req = req.to_vec();
    let mut data = Vec::new();
    for round in 0..=MAX_GET_RESPONSE_ROUNDS {
        let rsp = transmit(&req)?;
        match step(&mut data, &rsp) {
            Step::Done(rsp) => return Ok(rsp),
            Step::GetResponse(le) => {
                debug!(le, round, "Issuing GET RESPONSE");
                req = write_cmd(apdu::Command::new_with_le(0x00, 0xC0, 0x00, 0x00, le));
            }
        }
    }
    warn!(len = data.len(), "Card never finished its reply");
    Ok(Response::failed(Status::TRANSPORT_ERROR))
}

/// Every `send` yields a reply; anything that went wrong below the APDU layer becomes
/// [`Status::TRANSPORT_ERROR`].
fn or_transport_error(rsp: Result<Response>) -> Response {
    rsp.tap_err(|err| warn!("Couldn't transmit: {}", err))
        .unwrap_or_else(|_| Response::failed(Status::TRANSPORT_ERROR))
}

fn write_cmd(cmd: apdu::Command) -> Vec<u8> {
    let mut buf = vec![0; cmd.len()];
    cmd.write(&mut buf[..]);
    trace!(?buf, "Built command");
    buf
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use std::collections::VecDeque;

    const COMMAND: [u8; 9] = [0x00, 0x03, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00];

    /// Runs `exchange` against scripted card replies; returns the result and every
    /// request the card saw.
    fn run(replies: &[&[u8]]) -> (Result<Response>, Vec<Vec<u8>>) {
        let mut replies: VecDeque<Vec<u8>> = replies.iter().map(|r| r.to_vec()).collect();
        let mut sent = Vec::new();
        let rsp = exchange(&COMMAND, |req| {
            sent.push(req.to_vec());
            Ok(replies.pop_front().expect("card ran out of replies"))
        });
        (rsp, sent)
    }

    #[test]
    fn test_exchange_ok() {
        let (rsp, sent) = run(&[b"U2F_V2\x90\x00"]);
        assert_eq!(rsp.expect("couldn't exchange"), Response::ok(&b"U2F_V2"[..]));
        assert_eq!(sent, vec![COMMAND.to_vec()]);
    }

    #[test]
    fn test_exchange_error_status() {
        let (rsp, sent) = run(&[&[0x6A, 0x80]]);
        assert_eq!(
            rsp.expect("couldn't exchange"),
            Response::failed(Status::WRONG_DATA)
        );
        assert_eq!(sent.len(), 1);
    }

    #[test]
    fn test_exchange_no_status_word() {
        let (rsp, _) = run(&[&[0x90]]);
        assert_eq!(
            rsp.expect("couldn't exchange"),
            Response::failed(Status::TRANSPORT_ERROR)
        );
    }

    #[test]
    fn test_exchange_get_response() {
        let (rsp, sent) = run(&[&[0x01, 0x02, 0x61, 0x10], &[0x03, 0x04, 0x90, 0x00]]);
        assert_eq!(
            rsp.expect("couldn't exchange"),
            Response::ok(vec![0x01, 0x02, 0x03, 0x04])
        );
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0], COMMAND.to_vec());
        assert_eq!(&sent[1][..4], &[0x00, 0xC0, 0x00, 0x00]);
        assert_eq!(sent[1].last(), Some(&0x10));
    }

    #[test]
    fn test_exchange_endless_get_response() {
        let mut calls = 0;
        let rsp = exchange(&COMMAND, |_| {
            calls += 1;
            Ok(vec![0xAA, 0x61, 0x00])
        });
        assert_eq!(
            rsp.expect("couldn't exchange"),
            Response::failed(Status::TRANSPORT_ERROR)
        );
        assert_eq!(calls, MAX_GET_RESPONSE_ROUNDS + 1);
    }

    #[test]
    fn test_exchange_transmit_fails() {
        let rsp = exchange(&COMMAND, |_| Err(Error::PCSC(pcsc::Error::NoSmartcard)));
        assert!(matches!(rsp, Err(Error::PCSC(pcsc::Error::NoSmartcard))));
        assert_eq!(
            or_transport_error(rsp),
            Response::failed(Status::TRANSPORT_ERROR)
        );
    }

    #[test]
    fn test_step() {
        let mut data = vec![];
        assert_eq!(step(&mut data, &[0x01, 0x61, 0x00]), Step::GetResponse(256));
        assert_eq!(step(&mut data, &[0x02, 0x61, 0x05]), Step::GetResponse(5));
        assert_eq!(
            step(&mut data, &[0x03, 0x69, 0x85]),
            Step::Done(Response::new(Status::CONDITIONS_NOT_SATISFIED, vec![1, 2, 3]))
        );
        assert!(data.is_empty());
    }
}
