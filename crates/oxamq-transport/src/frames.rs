//! Performatives: the protocol's frame bodies, as described lists.
//!
//! Every AMQP frame body is a described list whose descriptor says
//! which performative it is (Open is 0x10, Close is 0x18, and so on).
//! This module gives each performative a plain struct, a positional
//! encoding to a codec [`Value`], and a tolerant positional decoding:
//! trailing fields a peer omits fall back to the protocol's defaults,
//! and fields we don't track are skipped without complaint. A field of
//! the wrong *type*, though, is a fatal
//! [`MalformedPerformative`](TransportError::MalformedPerformative).

use oxamq_codec::{decode_value, encode_to_vec, CodecError, Value};
use oxamq_engine::{Condition, Disposition as DeliveryState, ExpiryPolicy, Durability, Terminus};

use crate::error::TransportError;

// ---------------------------------------------------------------------------
// Descriptor codes
// ---------------------------------------------------------------------------

const OPEN: u64 = 0x10;
const BEGIN: u64 = 0x11;
const ATTACH: u64 = 0x12;
const FLOW: u64 = 0x13;
const TRANSFER: u64 = 0x14;
const DISPOSITION: u64 = 0x15;
const DETACH: u64 = 0x16;
const END: u64 = 0x17;
const CLOSE: u64 = 0x18;
const ERROR: u64 = 0x1d;
const SOURCE: u64 = 0x28;
const TARGET: u64 = 0x29;

// ---------------------------------------------------------------------------
// Positional field reader
// ---------------------------------------------------------------------------

/// Reads a performative's list fields by position, supplying protocol
/// defaults for anything the peer truncated away.
struct Fields<'a>(&'a [Value]);

impl<'a> Fields<'a> {
    /// The field at `i`, with absent and null both reading as `None`.
    fn get(&self, i: usize) -> Option<&'a Value> {
        match self.0.get(i) {
            None | Some(Value::Null) => None,
            Some(v) => Some(v),
        }
    }

    fn string(&self, i: usize, what: &'static str) -> Result<String, TransportError> {
        match self.get(i) {
            Some(Value::String(s)) => Ok(s.clone()),
            Some(_) => Err(TransportError::MalformedPerformative(what)),
            None => Err(TransportError::MalformedPerformative(what)),
        }
    }

    fn opt_string(&self, i: usize, what: &'static str) -> Result<Option<String>, TransportError> {
        match self.get(i) {
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(_) => Err(TransportError::MalformedPerformative(what)),
            None => Ok(None),
        }
    }

    fn uint(&self, i: usize, default: u32, what: &'static str) -> Result<u32, TransportError> {
        match self.get(i) {
            Some(Value::Uint(n)) => Ok(*n),
            Some(_) => Err(TransportError::MalformedPerformative(what)),
            None => Ok(default),
        }
    }

    fn opt_uint(&self, i: usize, what: &'static str) -> Result<Option<u32>, TransportError> {
        match self.get(i) {
            Some(Value::Uint(n)) => Ok(Some(*n)),
            Some(_) => Err(TransportError::MalformedPerformative(what)),
            None => Ok(None),
        }
    }

    fn opt_ushort(&self, i: usize, what: &'static str) -> Result<Option<u16>, TransportError> {
        match self.get(i) {
            Some(Value::Ushort(n)) => Ok(Some(*n)),
            Some(_) => Err(TransportError::MalformedPerformative(what)),
            None => Ok(None),
        }
    }

    fn boolean(&self, i: usize, default: bool, what: &'static str) -> Result<bool, TransportError> {
        match self.get(i) {
            Some(Value::Bool(b)) => Ok(*b),
            Some(_) => Err(TransportError::MalformedPerformative(what)),
            None => Ok(default),
        }
    }

    fn binary(&self, i: usize, what: &'static str) -> Result<Vec<u8>, TransportError> {
        match self.get(i) {
            Some(Value::Binary(b)) => Ok(b.clone()),
            Some(_) => Err(TransportError::MalformedPerformative(what)),
            None => Err(TransportError::MalformedPerformative(what)),
        }
    }
}

// Strips trailing nulls so encoded lists carry only meaningful fields.
fn trim_list(mut fields: Vec<Value>) -> Value {
    while matches!(fields.last(), Some(Value::Null)) {
        fields.pop();
    }
    Value::List(fields)
}

fn opt_string_value(s: &Option<String>) -> Value {
    match s {
        Some(s) => Value::String(s.clone()),
        None => Value::Null,
    }
}

fn opt_uint_value(n: Option<u32>) -> Value {
    match n {
        Some(n) => Value::Uint(n),
        None => Value::Null,
    }
}

// ---------------------------------------------------------------------------
// Condition ↔ error performative (0x1d)
// ---------------------------------------------------------------------------

/// Renders an endpoint close condition as the protocol's error type.
pub fn condition_to_value(c: &Condition) -> Value {
    Value::described(
        Value::Ulong(ERROR),
        trim_list(vec![
            Value::Symbol(c.name.clone()),
            opt_string_value(&c.description),
            c.info.clone(),
        ]),
    )
}

/// Parses an error value back into a [`Condition`].
pub fn condition_from_value(v: &Value) -> Result<Condition, TransportError> {
    let Value::Described(d) = v else {
        return Err(TransportError::MalformedPerformative("error"));
    };
    if d.descriptor != Value::Ulong(ERROR) {
        return Err(TransportError::MalformedPerformative("error descriptor"));
    }
    let Value::List(fields) = &d.value else {
        return Err(TransportError::MalformedPerformative("error body"));
    };
    let f = Fields(fields);
    let name = match f.get(0) {
        Some(Value::Symbol(s)) => s.clone(),
        _ => return Err(TransportError::MalformedPerformative("error condition")),
    };
    Ok(Condition {
        name,
        description: f.opt_string(1, "error description")?,
        info: f.get(2).cloned().unwrap_or(Value::Null),
    })
}

fn opt_condition_value(c: &Option<Condition>) -> Value {
    match c {
        Some(c) => condition_to_value(c),
        None => Value::Null,
    }
}

fn opt_condition(f: &Fields<'_>, i: usize) -> Result<Option<Condition>, TransportError> {
    match f.get(i) {
        Some(v) => Ok(Some(condition_from_value(v)?)),
        None => Ok(None),
    }
}

// ---------------------------------------------------------------------------
// Terminus ↔ source (0x28) / target (0x29)
// ---------------------------------------------------------------------------

fn terminus_fields(t: &Terminus) -> Vec<Value> {
    vec![
        opt_string_value(&t.address),
        Value::Uint(t.durability.code()),
        Value::symbol(t.expiry_policy.symbol()),
        Value::Uint(t.timeout),
        Value::Bool(t.dynamic),
        t.properties.clone(),
    ]
}

/// Renders a terminus as a source value.
pub fn source_to_value(t: &Terminus) -> Value {
    let mut fields = terminus_fields(t);
    // distribution-mode, filter, default-outcome, outcomes, capabilities
    fields.push(Value::Null);
    fields.push(t.filter.clone());
    fields.push(Value::Null);
    fields.push(t.outcomes.clone());
    fields.push(t.capabilities.clone());
    Value::described(Value::Ulong(SOURCE), trim_list(fields))
}

/// Renders a terminus as a target value.
pub fn target_to_value(t: &Terminus) -> Value {
    let mut fields = terminus_fields(t);
    fields.push(t.capabilities.clone());
    Value::described(Value::Ulong(TARGET), trim_list(fields))
}

/// Parses a source or target value back into a [`Terminus`].
pub fn terminus_from_value(v: &Value) -> Result<Terminus, TransportError> {
    let Value::Described(d) = v else {
        return Err(TransportError::MalformedPerformative("terminus"));
    };
    let descriptor = match &d.descriptor {
        Value::Ulong(code) if *code == SOURCE || *code == TARGET => *code,
        _ => return Err(TransportError::MalformedPerformative("terminus descriptor")),
    };
    let Value::List(fields) = &d.value else {
        return Err(TransportError::MalformedPerformative("terminus body"));
    };
    let f = Fields(fields);
    let expiry = match f.get(2) {
        Some(Value::Symbol(s)) => ExpiryPolicy::from_symbol(s.as_str()),
        None => ExpiryPolicy::default(),
        Some(_) => return Err(TransportError::MalformedPerformative("terminus expiry")),
    };
    let mut t = Terminus {
        address: f.opt_string(0, "terminus address")?,
        durability: Durability::from_code(f.uint(1, 0, "terminus durability")?),
        expiry_policy: expiry,
        timeout: f.uint(3, 0, "terminus timeout")?,
        dynamic: f.boolean(4, false, "terminus dynamic")?,
        properties: f.get(5).cloned().unwrap_or(Value::Null),
        ..Terminus::default()
    };
    if descriptor == SOURCE {
        t.filter = f.get(7).cloned().unwrap_or(Value::Null);
        t.outcomes = f.get(9).cloned().unwrap_or(Value::Null);
        t.capabilities = f.get(10).cloned().unwrap_or(Value::Null);
    } else {
        t.capabilities = f.get(6).cloned().unwrap_or(Value::Null);
    }
    Ok(t)
}

fn opt_terminus(
    f: &Fields<'_>,
    i: usize,
) -> Result<Option<Terminus>, TransportError> {
    match f.get(i) {
        Some(v) => Ok(Some(terminus_from_value(v)?)),
        None => Ok(None),
    }
}

// ---------------------------------------------------------------------------
// Delivery state ↔ disposition outcome types (0x23–0x27)
// ---------------------------------------------------------------------------

/// Renders a delivery disposition as its described outcome type.
pub fn delivery_state_to_value(state: DeliveryState) -> Value {
    Value::described(Value::Ulong(state.code()), Value::List(Vec::new()))
}

/// Parses a delivery-state value back into a disposition.
pub fn delivery_state_from_value(v: &Value) -> Result<DeliveryState, TransportError> {
    let Value::Described(d) = v else {
        return Err(TransportError::MalformedPerformative("delivery state"));
    };
    let Value::Ulong(code) = d.descriptor else {
        return Err(TransportError::MalformedPerformative("delivery state descriptor"));
    };
    DeliveryState::from_code(code)
        .ok_or(TransportError::MalformedPerformative("delivery state code"))
}

// ---------------------------------------------------------------------------
// The performatives
// ---------------------------------------------------------------------------

/// Open (0x10): the connection handshake.
#[derive(Debug, Clone, PartialEq)]
pub struct Open {
    pub container_id: String,
    pub hostname: Option<String>,
    pub max_frame_size: u32,
    pub channel_max: u16,
    /// Idle timeout in milliseconds, if the peer wants keepalives.
    pub idle_timeout: Option<u32>,
}

/// Begin (0x11): opens a session on a channel.
#[derive(Debug, Clone, PartialEq)]
pub struct Begin {
    /// Present when this Begin answers one of ours: the channel *we*
    /// chose for the session.
    pub remote_channel: Option<u16>,
    pub next_outgoing_id: u32,
    pub incoming_window: u32,
    pub outgoing_window: u32,
}

/// Attach (0x12): opens a link on a session.
#[derive(Debug, Clone, PartialEq)]
pub struct Attach {
    pub name: String,
    pub handle: u32,
    /// The *frame sender's* role: `true` means the peer is the
    /// receiver.
    pub role_receiver: bool,
    pub source: Option<Terminus>,
    pub target: Option<Terminus>,
    pub initial_delivery_count: Option<u32>,
}

/// Flow (0x13): window and credit updates.
#[derive(Debug, Clone, PartialEq)]
pub struct Flow {
    pub next_incoming_id: Option<u32>,
    pub incoming_window: u32,
    pub next_outgoing_id: u32,
    pub outgoing_window: u32,
    /// Absent for session-level flow.
    pub handle: Option<u32>,
    pub delivery_count: Option<u32>,
    pub link_credit: Option<u32>,
    pub drain: bool,
}

/// Transfer (0x14): one frame of delivery payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Transfer {
    pub handle: u32,
    pub delivery_id: Option<u32>,
    pub delivery_tag: Vec<u8>,
    pub message_format: u32,
    pub settled: bool,
    /// More frames of this delivery follow.
    pub more: bool,
}

/// Disposition (0x15): settlement and outcome for a delivery-id range.
#[derive(Debug, Clone, PartialEq)]
pub struct Disposition {
    /// The *frame sender's* role: `true` when a receiver is reporting.
    pub role_receiver: bool,
    pub first: u32,
    pub last: Option<u32>,
    pub settled: bool,
    pub state: Option<DeliveryState>,
}

/// Detach (0x16): closes a link.
#[derive(Debug, Clone, PartialEq)]
pub struct Detach {
    pub handle: u32,
    pub closed: bool,
    pub error: Option<Condition>,
}

/// End (0x17): closes a session.
#[derive(Debug, Clone, PartialEq)]
pub struct End {
    pub error: Option<Condition>,
}

/// Close (0x18): closes the connection.
#[derive(Debug, Clone, PartialEq)]
pub struct Close {
    pub error: Option<Condition>,
}

/// One decoded frame body.
#[derive(Debug, Clone, PartialEq)]
pub enum Performative {
    Open(Open),
    Begin(Begin),
    Attach(Attach),
    Flow(Flow),
    Transfer(Transfer),
    Disposition(Disposition),
    Detach(Detach),
    End(End),
    Close(Close),
}

impl Performative {
    /// The performative's name, for frame traces.
    pub fn name(&self) -> &'static str {
        match self {
            Performative::Open(_) => "open",
            Performative::Begin(_) => "begin",
            Performative::Attach(_) => "attach",
            Performative::Flow(_) => "flow",
            Performative::Transfer(_) => "transfer",
            Performative::Disposition(_) => "disposition",
            Performative::Detach(_) => "detach",
            Performative::End(_) => "end",
            Performative::Close(_) => "close",
        }
    }

    /// Renders this performative as its described-list value.
    pub fn to_value(&self) -> Value {
        let (code, fields) = match self {
            Performative::Open(p) => (
                OPEN,
                vec![
                    Value::String(p.container_id.clone()),
                    opt_string_value(&p.hostname),
                    Value::Uint(p.max_frame_size),
                    Value::Ushort(p.channel_max),
                    opt_uint_value(p.idle_timeout),
                ],
            ),
            Performative::Begin(p) => (
                BEGIN,
                vec![
                    match p.remote_channel {
                        Some(ch) => Value::Ushort(ch),
                        None => Value::Null,
                    },
                    Value::Uint(p.next_outgoing_id),
                    Value::Uint(p.incoming_window),
                    Value::Uint(p.outgoing_window),
                ],
            ),
            Performative::Attach(p) => (
                ATTACH,
                vec![
                    Value::String(p.name.clone()),
                    Value::Uint(p.handle),
                    Value::Bool(p.role_receiver),
                    Value::Null, // snd-settle-mode
                    Value::Null, // rcv-settle-mode
                    p.source.as_ref().map(source_to_value).unwrap_or(Value::Null),
                    p.target.as_ref().map(target_to_value).unwrap_or(Value::Null),
                    Value::Null, // unsettled
                    Value::Null, // incomplete-unsettled
                    opt_uint_value(p.initial_delivery_count),
                ],
            ),
            Performative::Flow(p) => (
                FLOW,
                vec![
                    opt_uint_value(p.next_incoming_id),
                    Value::Uint(p.incoming_window),
                    Value::Uint(p.next_outgoing_id),
                    Value::Uint(p.outgoing_window),
                    opt_uint_value(p.handle),
                    opt_uint_value(p.delivery_count),
                    opt_uint_value(p.link_credit),
                    Value::Null, // available
                    Value::Bool(p.drain),
                ],
            ),
            Performative::Transfer(p) => (
                TRANSFER,
                vec![
                    Value::Uint(p.handle),
                    opt_uint_value(p.delivery_id),
                    Value::Binary(p.delivery_tag.clone()),
                    Value::Uint(p.message_format),
                    Value::Bool(p.settled),
                    Value::Bool(p.more),
                ],
            ),
            Performative::Disposition(p) => (
                DISPOSITION,
                vec![
                    Value::Bool(p.role_receiver),
                    Value::Uint(p.first),
                    opt_uint_value(p.last),
                    Value::Bool(p.settled),
                    p.state.map(delivery_state_to_value).unwrap_or(Value::Null),
                ],
            ),
            Performative::Detach(p) => (
                DETACH,
                vec![
                    Value::Uint(p.handle),
                    Value::Bool(p.closed),
                    opt_condition_value(&p.error),
                ],
            ),
            Performative::End(p) => (END, vec![opt_condition_value(&p.error)]),
            Performative::Close(p) => (CLOSE, vec![opt_condition_value(&p.error)]),
        };
        Value::described(Value::Ulong(code), trim_list(fields))
    }

    /// Encodes this performative to its wire bytes.
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        encode_to_vec(&self.to_value())
    }

    /// Decodes one performative from `bytes`, returning it and the
    /// bytes consumed (any remainder is the frame's payload).
    pub fn decode(bytes: &[u8]) -> Result<(Performative, usize), TransportError> {
        let (value, consumed) = decode_value(bytes)?;
        Ok((Self::from_value(&value)?, consumed))
    }

    /// Interprets a decoded body value as a performative.
    pub fn from_value(value: &Value) -> Result<Performative, TransportError> {
        let Value::Described(d) = value else {
            return Err(TransportError::MalformedPerformative("frame body"));
        };
        let code = match d.descriptor {
            Value::Ulong(code) => code,
            _ => return Err(TransportError::MalformedPerformative("frame descriptor")),
        };
        let empty = Vec::new();
        let fields = match &d.value {
            Value::List(fields) => fields,
            Value::Null => &empty,
            _ => return Err(TransportError::MalformedPerformative("frame body list")),
        };
        let f = Fields(fields);

        let performative = match code {
            OPEN => Performative::Open(Open {
                container_id: f.string(0, "open container-id")?,
                hostname: f.opt_string(1, "open hostname")?,
                max_frame_size: f.uint(2, u32::MAX, "open max-frame-size")?,
                channel_max: f.opt_ushort(3, "open channel-max")?.unwrap_or(u16::MAX),
                idle_timeout: f.opt_uint(4, "open idle-time-out")?,
            }),
            BEGIN => Performative::Begin(Begin {
                remote_channel: f.opt_ushort(0, "begin remote-channel")?,
                next_outgoing_id: f.uint(1, 0, "begin next-outgoing-id")?,
                incoming_window: f.uint(2, 0, "begin incoming-window")?,
                outgoing_window: f.uint(3, 0, "begin outgoing-window")?,
            }),
            ATTACH => Performative::Attach(Attach {
                name: f.string(0, "attach name")?,
                handle: f.uint(1, 0, "attach handle")?,
                role_receiver: f.boolean(2, false, "attach role")?,
                source: opt_terminus(&f, 5)?,
                target: opt_terminus(&f, 6)?,
                initial_delivery_count: f.opt_uint(9, "attach initial-delivery-count")?,
            }),
            FLOW => Performative::Flow(Flow {
                next_incoming_id: f.opt_uint(0, "flow next-incoming-id")?,
                incoming_window: f.uint(1, 0, "flow incoming-window")?,
                next_outgoing_id: f.uint(2, 0, "flow next-outgoing-id")?,
                outgoing_window: f.uint(3, 0, "flow outgoing-window")?,
                handle: f.opt_uint(4, "flow handle")?,
                delivery_count: f.opt_uint(5, "flow delivery-count")?,
                link_credit: f.opt_uint(6, "flow link-credit")?,
                drain: f.boolean(8, false, "flow drain")?,
            }),
            TRANSFER => Performative::Transfer(Transfer {
                handle: f.uint(0, 0, "transfer handle")?,
                delivery_id: f.opt_uint(1, "transfer delivery-id")?,
                delivery_tag: f.binary(2, "transfer delivery-tag")?,
                message_format: f.uint(3, 0, "transfer message-format")?,
                settled: f.boolean(4, false, "transfer settled")?,
                more: f.boolean(5, false, "transfer more")?,
            }),
            DISPOSITION => Performative::Disposition(Disposition {
                role_receiver: f.boolean(0, false, "disposition role")?,
                first: f.uint(1, 0, "disposition first")?,
                last: f.opt_uint(2, "disposition last")?,
                settled: f.boolean(3, false, "disposition settled")?,
                state: match f.get(4) {
                    Some(v) => Some(delivery_state_from_value(v)?),
                    None => None,
                },
            }),
            DETACH => Performative::Detach(Detach {
                handle: f.uint(0, 0, "detach handle")?,
                closed: f.boolean(1, false, "detach closed")?,
                error: opt_condition(&f, 2)?,
            }),
            END => Performative::End(End {
                error: opt_condition(&f, 0)?,
            }),
            CLOSE => Performative::Close(Close {
                error: opt_condition(&f, 0)?,
            }),
            other => return Err(TransportError::UnknownPerformative(other)),
        };
        Ok(performative)
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(p: Performative) {
        let bytes = p.encode().unwrap();
        let (decoded, consumed) = Performative::decode(&bytes).unwrap();
        assert_eq!(consumed, bytes.len());
        assert_eq!(decoded, p);
    }

    #[test]
    fn test_open_roundtrip_with_defaults_trimmed() {
        roundtrip(Performative::Open(Open {
            container_id: "box-a".into(),
            hostname: Some("peer.example".into()),
            max_frame_size: 65536,
            channel_max: 255,
            idle_timeout: None,
        }));
    }

    #[test]
    fn test_open_missing_optional_fields_use_protocol_defaults() {
        // A bare Open with only the container-id.
        let v = Value::described(
            Value::Ulong(0x10),
            Value::List(vec![Value::string("tiny")]),
        );
        let Performative::Open(open) = Performative::from_value(&v).unwrap() else {
            panic!("expected open")
        };
        assert_eq!(open.container_id, "tiny");
        assert_eq!(open.max_frame_size, u32::MAX);
        assert_eq!(open.channel_max, u16::MAX);
        assert_eq!(open.idle_timeout, None);
    }

    #[test]
    fn test_begin_reply_carries_remote_channel() {
        roundtrip(Performative::Begin(Begin {
            remote_channel: Some(3),
            next_outgoing_id: 0,
            incoming_window: 2048,
            outgoing_window: 2048,
        }));
        roundtrip(Performative::Begin(Begin {
            remote_channel: None,
            next_outgoing_id: 7,
            incoming_window: 10,
            outgoing_window: 10,
        }));
    }

    #[test]
    fn test_attach_roundtrip_with_termini() {
        roundtrip(Performative::Attach(Attach {
            name: "L".into(),
            handle: 0,
            role_receiver: true,
            source: Some(Terminus::with_address("queue-1")),
            target: Some(Terminus::default()),
            initial_delivery_count: None,
        }));
    }

    #[test]
    fn test_flow_roundtrip_link_level() {
        roundtrip(Performative::Flow(Flow {
            next_incoming_id: Some(0),
            incoming_window: 2048,
            next_outgoing_id: 0,
            outgoing_window: 2048,
            handle: Some(0),
            delivery_count: Some(0),
            link_credit: Some(10),
            drain: false,
        }));
    }

    #[test]
    fn test_transfer_roundtrip() {
        roundtrip(Performative::Transfer(Transfer {
            handle: 0,
            delivery_id: Some(0),
            delivery_tag: b"t-0".to_vec(),
            message_format: 0,
            settled: false,
            more: false,
        }));
    }

    #[test]
    fn test_disposition_roundtrip_with_accepted_state() {
        roundtrip(Performative::Disposition(Disposition {
            role_receiver: true,
            first: 0,
            last: Some(2),
            settled: true,
            state: Some(DeliveryState::Accepted),
        }));
    }

    #[test]
    fn test_close_roundtrip_with_condition() {
        roundtrip(Performative::Close(Close {
            error: Some(Condition::new("amqp:internal-error", "boom")),
        }));
        roundtrip(Performative::Close(Close { error: None }));
    }

    #[test]
    fn test_detach_and_end_roundtrip() {
        roundtrip(Performative::Detach(Detach {
            handle: 1,
            closed: true,
            error: None,
        }));
        roundtrip(Performative::End(End { error: None }));
    }

    #[test]
    fn test_unknown_descriptor_is_fatal() {
        let v = Value::described(Value::Ulong(0x99), Value::List(vec![]));
        assert!(matches!(
            Performative::from_value(&v),
            Err(TransportError::UnknownPerformative(0x99))
        ));
    }

    #[test]
    fn test_wrong_field_type_is_malformed() {
        // Open with an integer where the container-id string belongs.
        let v = Value::described(
            Value::Ulong(0x10),
            Value::List(vec![Value::Uint(42)]),
        );
        assert!(matches!(
            Performative::from_value(&v),
            Err(TransportError::MalformedPerformative(_))
        ));
    }

    #[test]
    fn test_terminus_source_fields_survive_roundtrip() {
        let mut t = Terminus::with_address("topic-7");
        t.durability = Durability::Configuration;
        t.expiry_policy = ExpiryPolicy::Never;
        t.dynamic = true;
        t.filter = Value::Map(vec![(Value::symbol("selector"), Value::string("x > 1"))]);

        let v = source_to_value(&t);
        assert_eq!(terminus_from_value(&v).unwrap(), t);
    }

    #[test]
    fn test_delivery_state_value_mapping() {
        for s in [
            DeliveryState::Received,
            DeliveryState::Accepted,
            DeliveryState::Rejected,
            DeliveryState::Released,
            DeliveryState::Modified,
        ] {
            let v = delivery_state_to_value(s);
            assert_eq!(delivery_state_from_value(&v).unwrap(), s);
        }
    }
}
