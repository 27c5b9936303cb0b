//! A minimal bare-sections message.
//!
//! AMQP messages are a sequence of described sections in the transfer
//! payload. [`Message`] covers the sections an engine-level application
//! actually touches: the header, the properties most routing cares
//! about, application properties, and an amqp-value body. Everything
//! encodes through the codec's value tree, so any section content the
//! codec can express survives a round trip.

use oxamq_codec::{decode_value, encode_value, Symbol, Value};

use crate::error::OxamqError;

const HEADER: u64 = 0x70;
const PROPERTIES: u64 = 0x73;
const APPLICATION_PROPERTIES: u64 = 0x74;
const AMQP_VALUE: u64 = 0x77;

const DEFAULT_PRIORITY: u8 = 4;

/// A bare-sections message. See the module docs.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub durable: bool,
    pub priority: u8,
    /// Time to live in milliseconds.
    pub ttl: Option<u32>,
    pub message_id: Option<String>,
    pub to: Option<String>,
    pub subject: Option<String>,
    pub reply_to: Option<String>,
    pub content_type: Option<Symbol>,
    /// Application properties, in insertion order.
    pub application_properties: Vec<(String, Value)>,
    pub body: Value,
}

impl Default for Message {
    fn default() -> Self {
        Self {
            durable: false,
            priority: DEFAULT_PRIORITY,
            ttl: None,
            message_id: None,
            to: None,
            subject: None,
            reply_to: None,
            content_type: None,
            application_properties: Vec::new(),
            body: Value::Null,
        }
    }
}

impl Message {
    /// A message with the given body and everything else defaulted.
    pub fn with_body(body: Value) -> Self {
        Self {
            body,
            ..Self::default()
        }
    }

    /// A message with a string body.
    pub fn text(body: impl Into<String>) -> Self {
        Self::with_body(Value::String(body.into()))
    }

    /// Adds an application property.
    pub fn property(mut self, key: impl Into<String>, value: Value) -> Self {
        self.application_properties.push((key.into(), value));
        self
    }

    /// Encodes the message as its wire sections, ready to hand to
    /// `Connection::send`.
    pub fn encode(&self) -> Result<Vec<u8>, OxamqError> {
        let mut out = Vec::new();

        if self.durable || self.priority != DEFAULT_PRIORITY || self.ttl.is_some() {
            let header = vec![
                Value::Bool(self.durable),
                Value::Ubyte(self.priority),
                self.ttl.map(Value::Uint).unwrap_or(Value::Null),
            ];
            encode_value(&section(HEADER, Value::List(header)), &mut out)?;
        }

        if self.message_id.is_some()
            || self.to.is_some()
            || self.subject.is_some()
            || self.reply_to.is_some()
            || self.content_type.is_some()
        {
            let string_or_null = |s: &Option<String>| {
                s.as_ref()
                    .map(|s| Value::String(s.clone()))
                    .unwrap_or(Value::Null)
            };
            let properties = vec![
                string_or_null(&self.message_id),
                Value::Null, // user-id
                string_or_null(&self.to),
                string_or_null(&self.subject),
                string_or_null(&self.reply_to),
                Value::Null, // correlation-id
                self.content_type
                    .clone()
                    .map(Value::Symbol)
                    .unwrap_or(Value::Null),
            ];
            encode_value(&section(PROPERTIES, Value::List(properties)), &mut out)?;
        }

        if !self.application_properties.is_empty() {
            let map = self
                .application_properties
                .iter()
                .map(|(k, v)| (Value::String(k.clone()), v.clone()))
                .collect();
            encode_value(&section(APPLICATION_PROPERTIES, Value::Map(map)), &mut out)?;
        }

        encode_value(&section(AMQP_VALUE, self.body.clone()), &mut out)?;
        Ok(out)
    }

    /// Decodes a message from its wire sections. Sections this type
    /// does not model are skipped, not errors; unknown trailing bytes
    /// are.
    pub fn decode(mut bytes: &[u8]) -> Result<Self, OxamqError> {
        let mut message = Self::default();
        let mut saw_body = false;

        while !bytes.is_empty() {
            let (value, consumed) = decode_value(bytes)?;
            bytes = &bytes[consumed..];
            let Value::Described(d) = value else {
                return Err(OxamqError::MalformedMessage(
                    "section is not a described value",
                ));
            };
            let Value::Ulong(code) = d.descriptor else {
                return Err(OxamqError::MalformedMessage(
                    "section descriptor is not a ulong",
                ));
            };
            match code {
                HEADER => {
                    let Value::List(fields) = d.value else {
                        return Err(OxamqError::MalformedMessage("header is not a list"));
                    };
                    if let Some(Value::Bool(durable)) = fields.first() {
                        message.durable = *durable;
                    }
                    if let Some(Value::Ubyte(priority)) = fields.get(1) {
                        message.priority = *priority;
                    }
                    if let Some(Value::Uint(ttl)) = fields.get(2) {
                        message.ttl = Some(*ttl);
                    }
                }
                PROPERTIES => {
                    let Value::List(fields) = d.value else {
                        return Err(OxamqError::MalformedMessage("properties is not a list"));
                    };
                    let string_at = |i: usize| match fields.get(i) {
                        Some(Value::String(s)) => Some(s.clone()),
                        _ => None,
                    };
                    message.message_id = string_at(0);
                    message.to = string_at(2);
                    message.subject = string_at(3);
                    message.reply_to = string_at(4);
                    if let Some(Value::Symbol(s)) = fields.get(6) {
                        message.content_type = Some(s.clone());
                    }
                }
                APPLICATION_PROPERTIES => {
                    let Value::Map(pairs) = d.value else {
                        return Err(OxamqError::MalformedMessage(
                            "application-properties is not a map",
                        ));
                    };
                    for (k, v) in pairs {
                        let Value::String(key) = k else {
                            return Err(OxamqError::MalformedMessage(
                                "application property key is not a string",
                            ));
                        };
                        message.application_properties.push((key, v));
                    }
                }
                AMQP_VALUE => {
                    message.body = d.value;
                    saw_body = true;
                }
                _ => {} // sections this type does not model
            }
        }

        if !saw_body {
            return Err(OxamqError::MalformedMessage("no amqp-value body section"));
        }
        Ok(message)
    }
}

fn section(descriptor: u64, value: Value) -> Value {
    Value::described(Value::Ulong(descriptor), value)
}

// =========================================================================
// Tests
// =========================================================================
