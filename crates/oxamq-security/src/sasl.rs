//! The SASL negotiation layer.
//!
//! SASL runs before AMQP on the same byte stream, under its own
//! protocol header. A [`Sasl`] is a sans-IO state machine just like the
//! frame transport: feed it peer bytes with [`Sasl::input`], drain its
//! bytes with [`Sasl::output`], and once [`Sasl::outcome`] turns
//! terminal both directions report end of stream — everything after
//! that point belongs to the AMQP layer.
//!
//! Mechanism internals are out of scope by design: the negotiation
//! payloads (initial response, challenges, responses) move through the
//! opaque [`Sasl::send`] / [`Sasl::recv`] pair, and the application
//! decides the verdict with [`Sasl::done`]. Only the PLAIN initial
//! response gets a convenience constructor, [`Sasl::plain`].

use std::collections::VecDeque;

use bytes::{Buf, BufMut, BytesMut};

use oxamq_codec::{decode_value, encode_to_vec, Array, Symbol, TypeTag, Value};

use crate::error::SecurityError;

/// The SASL protocol header, exchanged before any SASL frame.
pub const SASL_HEADER: [u8; 8] = *b"AMQP\x03\x01\x00\x00";

/// SASL frame type code.
const FRAME_TYPE_SASL: u8 = 1;

const MECHANISMS: u64 = 0x40;
const INIT: u64 = 0x41;
const CHALLENGE: u64 = 0x42;
const RESPONSE: u64 = 0x43;
const OUTCOME: u64 = 0x44;

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// Terminal verdict of a SASL negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaslOutcome {
    /// Authentication succeeded.
    Ok,
    /// Authentication failed due to bad credentials.
    Auth,
    /// Authentication failed due to a system error.
    Sys,
}

impl SaslOutcome {
    /// The wire code carried in the Outcome frame.
    pub fn code(self) -> u8 {
        match self {
            SaslOutcome::Ok => 0,
            SaslOutcome::Auth => 1,
            SaslOutcome::Sys => 2,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(SaslOutcome::Ok),
            1 => Some(SaslOutcome::Auth),
            2 => Some(SaslOutcome::Sys),
            _ => None,
        }
    }
}

/// Which side of the negotiation this state machine plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Client,
    Server,
}

// ---------------------------------------------------------------------------
// Sasl
// ---------------------------------------------------------------------------

/// One side of a SASL negotiation. See the module docs.
#[derive(Debug)]
pub struct Sasl {
    role: Role,
    /// Server: mechanisms to offer. Client: mechanisms the peer offered.
    mechanisms: Vec<Symbol>,
    /// The mechanism chosen for this negotiation.
    chosen: Option<Symbol>,
    /// Client-side initial response, sent inside Init.
    initial_response: Option<Vec<u8>>,
    /// Opaque payloads queued for the peer (challenges or responses).
    to_send: VecDeque<Vec<u8>>,
    /// Opaque payloads received from the peer, oldest first.
    received: VecDeque<Vec<u8>>,
    outcome: Option<SaslOutcome>,

    header_sent: bool,
    header_received: bool,
    mechanisms_sent: bool,
    init_sent: bool,
    outcome_sent: bool,
    defunct: bool,
    /// A generated frame that did not fit the previous output budget.
    stashed: Option<Vec<u8>>,
}

impl Sasl {
    /// The client (initiating) side of a negotiation.
    pub fn client() -> Self {
        Self::new(Role::Client)
    }

    /// The server (accepting) side of a negotiation.
    pub fn server() -> Self {
        Self::new(Role::Server)
    }

    fn new(role: Role) -> Self {
        Self {
            role,
            mechanisms: Vec::new(),
            chosen: None,
            initial_response: None,
            to_send: VecDeque::new(),
            received: VecDeque::new(),
            outcome: None,
            header_sent: false,
            header_received: false,
            mechanisms_sent: false,
            init_sent: false,
            outcome_sent: false,
            defunct: false,
            stashed: None,
        }
    }

    /// Sets the mechanism list. On a server this is the offer put on
    /// the wire in Mechanisms; on a client it restricts which offered
    /// mechanism [`input`](Self::input) may pick.
    pub fn mechanisms<I, S>(&mut self, mechanisms: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.mechanisms = mechanisms
            .into_iter()
            .map(|m| Symbol::new(m.into()))
            .collect();
    }

    /// Client convenience: negotiate PLAIN with the given credentials.
    /// The initial response is the standard `\0user\0password` form.
    pub fn plain(&mut self, user: &str, password: &str) {
        let mut response = Vec::with_capacity(user.len() + password.len() + 2);
        response.push(0);
        response.extend_from_slice(user.as_bytes());
        response.push(0);
        response.extend_from_slice(password.as_bytes());
        self.chosen = Some(Symbol::new("PLAIN"));
        self.initial_response = Some(response);
    }

    /// The mechanism in play, once chosen (client) or once the peer's
    /// Init arrived (server).
    pub fn mechanism(&self) -> Option<&str> {
        self.chosen.as_ref().map(Symbol::as_str)
    }

    /// Queues an opaque negotiation payload for the peer: a challenge
    /// when playing server, a response when playing client.
    pub fn send(&mut self, bytes: &[u8]) {
        self.to_send.push_back(bytes.to_vec());
    }

    /// Takes the oldest opaque payload received from the peer: the
    /// initial response or a response on a server, a challenge on a
    /// client.
    pub fn recv(&mut self) -> Option<Vec<u8>> {
        self.received.pop_front()
    }

    /// The negotiation verdict, readable once terminal.
    pub fn outcome(&self) -> Option<SaslOutcome> {
        self.outcome
    }

    /// Server verdict: forces the negotiation to completion. The
    /// Outcome frame goes out on the next [`output`](Self::output).
    pub fn done(&mut self, outcome: SaslOutcome) {
        self.outcome = Some(outcome);
    }

    /// Whether the negotiation has reached its terminal state on this
    /// side (outcome known, and on a server already emitted).
    pub fn is_done(&self) -> bool {
        match self.role {
            Role::Client => self.outcome.is_some(),
            Role::Server => self.outcome_sent,
        }
    }

    // -----------------------------------------------------------------
    // Output
    // -----------------------------------------------------------------

    /// Serializes pending negotiation frames into at most `max` bytes.
    /// Returns `Ok(None)` once this side is done: the stream now
    /// belongs to the AMQP layer.
    pub fn output(&mut self, max: usize) -> Result<Option<Vec<u8>>, SecurityError> {
        if self.defunct {
            return Err(SecurityError::Defunct);
        }
        let mut out = Vec::new();
        loop {
            let frame = match self.stashed.take() {
                Some(frame) => frame,
                None => match self.next_frame()? {
                    Some(frame) => frame,
                    None => break,
                },
            };
            if out.len() + frame.len() > max {
                // An empty result asks the caller for a bigger budget.
                self.stashed = Some(frame);
                break;
            }
            out.extend_from_slice(&frame);
        }
        if out.is_empty() && self.is_done() && self.stashed.is_none() {
            return Ok(None);
        }
        Ok(Some(out))
    }

    fn next_frame(&mut self) -> Result<Option<Vec<u8>>, SecurityError> {
        if !self.header_sent {
            self.header_sent = true;
            return Ok(Some(SASL_HEADER.to_vec()));
        }
        match self.role {
            Role::Server => {
                if !self.mechanisms_sent {
                    self.mechanisms_sent = true;
                    let mut offer = Array::new(TypeTag::Symbol);
                    for m in &self.mechanisms {
                        offer.elements.push(Value::Symbol(m.clone()));
                    }
                    return Ok(Some(frame(
                        MECHANISMS,
                        vec![Value::Array(offer)],
                    )?));
                }
                if let Some(challenge) = self.to_send.pop_front() {
                    return Ok(Some(frame(CHALLENGE, vec![Value::Binary(challenge)])?));
                }
                if let Some(outcome) = self.outcome {
                    if !self.outcome_sent {
                        self.outcome_sent = true;
                        tracing::debug!(code = outcome.code(), "sasl outcome emitted");
                        return Ok(Some(frame(
                            OUTCOME,
                            vec![Value::Ubyte(outcome.code())],
                        )?));
                    }
                }
            }
            Role::Client => {
                if !self.init_sent {
                    // Init waits for the peer's offer unless a mechanism
                    // was chosen up front.
                    let Some(chosen) = self.chosen.clone() else {
                        return Ok(None);
                    };
                    self.init_sent = true;
                    let response = self
                        .initial_response
                        .take()
                        .map(Value::Binary)
                        .unwrap_or(Value::Null);
                    return Ok(Some(frame(
                        INIT,
                        vec![Value::Symbol(chosen), response],
                    )?));
                }
                if let Some(response) = self.to_send.pop_front() {
                    return Ok(Some(frame(RESPONSE, vec![Value::Binary(response)])?));
                }
            }
        }
        Ok(None)
    }

    // -----------------------------------------------------------------
    // Input
    // -----------------------------------------------------------------

    /// Parses and applies complete SASL frames, header first. Counts
    /// whole frames only, like the AMQP transport; a trailing partial
    /// frame stays unconsumed. Returns `Ok(None)` once the negotiation
    /// is terminal — remaining bytes are the AMQP layer's.
    pub fn input(&mut self, bytes: &[u8]) -> Result<Option<usize>, SecurityError> {
        if self.defunct {
            return Err(SecurityError::Defunct);
        }
        if self.is_done() {
            return Ok(None);
        }
        match self.input_inner(bytes) {
            Ok(consumed) => Ok(Some(consumed)),
            Err(e) => {
                self.defunct = true;
                Err(e)
            }
        }
    }

    fn input_inner(&mut self, bytes: &[u8]) -> Result<usize, SecurityError> {
        let mut consumed = 0;

        if !self.header_received {
            if bytes.len() < 8 {
                return Ok(0);
            }
            let mut found = [0u8; 8];
            found.copy_from_slice(&bytes[..8]);
            if found != SASL_HEADER {
                return Err(SecurityError::HeaderMismatch { found });
            }
            self.header_received = true;
            consumed = 8;
        }

        while bytes.len() - consumed >= 8 {
            let mut header = &bytes[consumed..consumed + 8];
            let size = header.get_u32() as usize;
            let doff = header.get_u8() as usize * 4;
            let ftype = header.get_u8();
            let _channel = header.get_u16();
            if size < 8 || doff < 8 || doff > size {
                return Err(SecurityError::MalformedPerformative("bad frame header"));
            }
            if bytes.len() - consumed < size {
                break;
            }
            if ftype != FRAME_TYPE_SASL {
                return Err(SecurityError::MalformedPerformative("not a sasl frame"));
            }
            self.apply(&bytes[consumed + doff..consumed + size])?;
            consumed += size;
            if self.outcome.is_some() && self.role == Role::Client {
                break;
            }
        }
        Ok(consumed)
    }

    fn apply(&mut self, body: &[u8]) -> Result<(), SecurityError> {
        let (value, _) = decode_value(body)?;
        let Value::Described(d) = value else {
            return Err(SecurityError::MalformedPerformative(
                "sasl frame body is not a described list",
            ));
        };
        let Value::Ulong(code) = d.descriptor else {
            return Err(SecurityError::MalformedPerformative(
                "sasl descriptor is not a ulong",
            ));
        };
        let Value::List(fields) = d.value else {
            return Err(SecurityError::MalformedPerformative(
                "sasl performative is not a list",
            ));
        };

        match (self.role, code) {
            (Role::Client, MECHANISMS) => {
                let offered = decode_mechanisms(fields.first())?;
                // An explicit choice (e.g. from `plain`) stands; a
                // restriction list picks the first offered match.
                if self.chosen.is_none() {
                    self.chosen = offered
                        .iter()
                        .find(|m| self.mechanisms.is_empty() || self.mechanisms.contains(m))
                        .cloned();
                }
                self.mechanisms = offered;
            }
            (Role::Server, INIT) => {
                let Some(Value::Symbol(mechanism)) = fields.first() else {
                    return Err(SecurityError::MalformedPerformative(
                        "init without mechanism",
                    ));
                };
                self.chosen = Some(mechanism.clone());
                if let Some(Value::Binary(response)) = fields.get(1) {
                    self.received.push_back(response.clone());
                }
            }
            (Role::Client, CHALLENGE) => {
                if !self.init_sent {
                    return Err(SecurityError::OutOfSequence("challenge before init"));
                }
                self.received.push_back(binary_field(fields.first())?);
            }
            (Role::Server, RESPONSE) => {
                if self.chosen.is_none() {
                    return Err(SecurityError::OutOfSequence("response before init"));
                }
                self.received.push_back(binary_field(fields.first())?);
            }
            (Role::Client, OUTCOME) => {
                let Some(Value::Ubyte(code)) = fields.first() else {
                    return Err(SecurityError::MalformedPerformative(
                        "outcome without code",
                    ));
                };
                self.outcome = Some(SaslOutcome::from_code(*code).ok_or(
                    SecurityError::MalformedPerformative("unknown outcome code"),
                )?);
                tracing::debug!(code = *code, "sasl outcome received");
            }
            (_, MECHANISMS | INIT | CHALLENGE | RESPONSE | OUTCOME) => {
                return Err(SecurityError::OutOfSequence(
                    "performative for the other role",
                ));
            }
            (_, other) => return Err(SecurityError::UnknownPerformative(other)),
        }
        Ok(())
    }
}

fn binary_field(v: Option<&Value>) -> Result<Vec<u8>, SecurityError> {
    match v {
        Some(Value::Binary(b)) => Ok(b.clone()),
        _ => Err(SecurityError::MalformedPerformative(
            "expected a binary field",
        )),
    }
}

fn decode_mechanisms(v: Option<&Value>) -> Result<Vec<Symbol>, SecurityError> {
    match v {
        // A single offer may be a bare symbol rather than an array.
        Some(Value::Symbol(s)) => Ok(vec![s.clone()]),
        Some(Value::Array(a)) => a
            .elements
            .iter()
            .map(|e| match e {
                Value::Symbol(s) => Ok(s.clone()),
                _ => Err(SecurityError::MalformedPerformative(
                    "mechanism is not a symbol",
                )),
            })
            .collect(),
        _ => Err(SecurityError::MalformedPerformative(
            "mechanisms field missing",
        )),
    }
}

// Frames one SASL performative: described list body under the standard
// 8-byte frame header, type 1, channel 0.
fn frame(descriptor: u64, fields: Vec<Value>) -> Result<Vec<u8>, SecurityError> {
    let body = encode_to_vec(&Value::described(
        Value::Ulong(descriptor),
        Value::List(fields),
    ))?;
    let size = 8 + body.len();
    let mut out = BytesMut::with_capacity(size);
    out.put_u32(size as u32);
    out.put_u8(2);
    out.put_u8(FRAME_TYPE_SASL);
    out.put_u16(0);
    out.put_slice(&body);
    Ok(out.to_vec())
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn pump(from: &mut Sasl, to: &mut Sasl) {
        loop {
            match from.output(64 * 1024).unwrap() {
                Some(bytes) if bytes.is_empty() => break,
                Some(bytes) => {
                    let consumed = to.input(&bytes).unwrap().unwrap();
                    assert_eq!(consumed, bytes.len());
                }
                None => break,
            }
        }
    }

    // =====================================================================
    // PLAIN exchange
    // =====================================================================

    #[test]
    fn test_plain_exchange_reaches_ok_outcome() {
        let mut server = Sasl::server();
        server.mechanisms(["PLAIN", "ANONYMOUS"]);
        let mut client = Sasl::client();
        client.plain("user", "trustno1");

        pump(&mut server, &mut client);
        pump(&mut client, &mut server);

        // The server sees the mechanism and the initial response.
        assert_eq!(server.mechanism(), Some("PLAIN"));
        let response = server.recv().expect("initial response should arrive");
        assert_eq!(response, b"\0user\0trustno1");

        server.done(SaslOutcome::Ok);
        pump(&mut server, &mut client);

        assert_eq!(client.outcome(), Some(SaslOutcome::Ok));
        assert!(client.is_done());
        assert!(server.is_done());
        // Both directions are now end-of-stream.
        assert_eq!(client.output(1024).unwrap(), None);
        assert_eq!(client.input(&[0; 16]).unwrap(), None);
    }

    #[test]
    fn test_client_picks_first_offered_mechanism_within_restriction() {
        let mut server = Sasl::server();
        server.mechanisms(["GSSAPI", "PLAIN"]);
        let mut client = Sasl::client();
        client.mechanisms(["PLAIN"]);

        pump(&mut server, &mut client);
        assert_eq!(client.mechanism(), Some("PLAIN"));
    }

    #[test]
    fn test_auth_failure_outcome() {
        let mut server = Sasl::server();
        server.mechanisms(["PLAIN"]);
        let mut client = Sasl::client();
        client.plain("user", "wrong");

        pump(&mut server, &mut client);
        pump(&mut client, &mut server);
        server.recv().unwrap();
        server.done(SaslOutcome::Auth);
        pump(&mut server, &mut client);

        assert_eq!(client.outcome(), Some(SaslOutcome::Auth));
    }

    // =====================================================================
    // Challenge / response
    // =====================================================================

    #[test]
    fn test_opaque_challenge_response_round() {
        let mut server = Sasl::server();
        server.mechanisms(["DIGEST-MD5"]);
        let mut client = Sasl::client();

        pump(&mut server, &mut client);
        assert_eq!(client.mechanism(), Some("DIGEST-MD5"));
        pump(&mut client, &mut server);

        server.send(b"nonce=abc");
        pump(&mut server, &mut client);
        assert_eq!(client.recv().as_deref(), Some(&b"nonce=abc"[..]));

        client.send(b"digest=def");
        pump(&mut client, &mut server);
        assert_eq!(server.recv().as_deref(), Some(&b"digest=def"[..]));
    }

    // =====================================================================
    // Input policing
    // =====================================================================

    #[test]
    fn test_input_rejects_amqp_header() {
        let mut server = Sasl::server();
        let err = server.input(b"AMQP\x00\x01\x00\x00").unwrap_err();
        assert!(matches!(err, SecurityError::HeaderMismatch { .. }));
        assert!(matches!(
            server.input(&SASL_HEADER),
            Err(SecurityError::Defunct)
        ));
    }

    #[test]
    fn test_input_partial_frame_left_unconsumed() {
        let mut server = Sasl::server();
        server.mechanisms(["PLAIN"]);
        let mut client = Sasl::client();
        client.plain("u", "p");

        let bytes = server.output(64 * 1024).unwrap().unwrap();
        let consumed = client.input(&bytes[..10]).unwrap().unwrap();
        assert_eq!(consumed, 8, "header only; partial frame stays");
        let consumed = client.input(&bytes[consumed..]).unwrap().unwrap();
        assert_eq!(consumed, bytes.len() - 8);
        assert_eq!(client.mechanism(), Some("PLAIN"));
    }

    #[test]
    fn test_challenge_before_init_is_out_of_sequence() {
        let mut client = Sasl::client();
        client.input(&SASL_HEADER).unwrap();
        let challenge = frame(CHALLENGE, vec![Value::Binary(b"x".to_vec())]).unwrap();
        let err = client.input(&challenge).unwrap_err();
        assert!(matches!(err, SecurityError::OutOfSequence(_)));
    }
}
