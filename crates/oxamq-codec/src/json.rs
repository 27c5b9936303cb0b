//! JSON rendering of AMQP values, for logs and debugging tools.
//!
//! Available behind the `json` feature. The mapping is lossy by design:
//! JSON has no symbols, timestamps, or described values, so those render
//! as tagged strings or wrapper objects a human can read back. Round
//! tripping through JSON is explicitly not supported; the AMQP binary
//! encoding is the only faithful serialization.
//!
//! Mapping summary:
//!
//! - null, bool, integers, floats, string → the obvious JSON value
//! - `Symbol("x")` → `":x"` (leading colon marks a symbol)
//! - `Timestamp(t)` → `"@<t>ms"`, `Uuid` → its hyphenated form
//! - `Binary` → `{"binary": "<hex>"}`
//! - decimals → `{"decimal32": <bits>}` and so on
//! - `List` → JSON array; `Map` → JSON array of `[key, value]` pairs
//!   (AMQP map keys need not be strings)
//! - `Array` → `{"array": [...], "descriptor": ...?}`
//! - `Described` → `{"descriptor": ..., "value": ...}`

use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};

use crate::types::Value;

fn hex(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        s.push_str(&format!("{b:02x}"));
    }
    s
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, ser: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => ser.serialize_unit(),
            Value::Bool(b) => ser.serialize_bool(*b),
            Value::Ubyte(n) => ser.serialize_u8(*n),
            Value::Byte(n) => ser.serialize_i8(*n),
            Value::Ushort(n) => ser.serialize_u16(*n),
            Value::Short(n) => ser.serialize_i16(*n),
            Value::Uint(n) => ser.serialize_u32(*n),
            Value::Int(n) => ser.serialize_i32(*n),
            Value::Char(c) => ser.serialize_char(*c),
            Value::Ulong(n) => ser.serialize_u64(*n),
            Value::Long(n) => ser.serialize_i64(*n),
            Value::Timestamp(t) => ser.serialize_str(&t.to_string()),
            Value::Float(x) => ser.serialize_f32(*x),
            Value::Double(x) => ser.serialize_f64(*x),
            Value::Decimal32(bits) => {
                let mut map = ser.serialize_map(Some(1))?;
                map.serialize_entry("decimal32", bits)?;
                map.end()
            }
            Value::Decimal64(bits) => {
                let mut map = ser.serialize_map(Some(1))?;
                map.serialize_entry("decimal64", bits)?;
                map.end()
            }
            Value::Decimal128(bytes) => {
                let mut map = ser.serialize_map(Some(1))?;
                map.serialize_entry("decimal128", &hex(bytes))?;
                map.end()
            }
            Value::Uuid(u) => ser.serialize_str(&u.to_string()),
            Value::Binary(bytes) => {
                let mut map = ser.serialize_map(Some(1))?;
                map.serialize_entry("binary", &hex(bytes))?;
                map.end()
            }
            Value::String(s) => ser.serialize_str(s),
            Value::Symbol(s) => ser.serialize_str(&s.to_string()),
            Value::List(items) => {
                let mut seq = ser.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Map(pairs) => {
                // AMQP map keys are arbitrary values, so render as an
                // array of [key, value] pairs rather than a JSON object.
                let mut seq = ser.serialize_seq(Some(pairs.len()))?;
                for (k, v) in pairs {
                    seq.serialize_element(&[k, v])?;
                }
                seq.end()
            }
            Value::Array(arr) => {
                let entries = 1 + usize::from(arr.descriptor.is_some());
                let mut map = ser.serialize_map(Some(entries))?;
                if let Some(d) = &arr.descriptor {
                    map.serialize_entry("descriptor", d.as_ref())?;
                }
                map.serialize_entry("array", &arr.elements)?;
                map.end()
            }
            Value::Described(d) => {
                let mut map = ser.serialize_map(Some(2))?;
                map.serialize_entry("descriptor", &d.descriptor)?;
                map.serialize_entry("value", &d.value)?;
                map.end()
            }
        }
    }
}

// =========================================================================
// Tests
// =========================================================================
