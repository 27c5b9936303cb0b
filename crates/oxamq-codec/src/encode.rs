//! Binary encoding: [`Value`] trees → AMQP 1.0 octets.
//!
//! Every value is written as a constructor byte followed by a payload
//! whose shape the constructor dictates. The encoder always picks the
//! smallest legal encoding (`uint0` over `smalluint` over `uint`), which
//! is what peers expect and what keeps frames compact; the decoder in
//! `decode.rs` accepts every standard form regardless.
//!
//! Array elements are the one exception to "smallest wins": the element
//! constructor is written once for the whole array, so every element
//! payload must use the fixed-width form that constructor names.

use crate::error::CodecError;
use crate::types::{Array, TypeTag, Value};

/// Appends the encoding of `value` to `out`.
pub fn encode_value(value: &Value, out: &mut Vec<u8>) -> Result<(), CodecError> {
    match value {
        Value::Null => out.push(0x40),
        Value::Bool(true) => out.push(0x41),
        Value::Bool(false) => out.push(0x42),
        Value::Ubyte(n) => {
            out.push(0x50);
            out.push(*n);
        }
        Value::Byte(n) => {
            out.push(0x51);
            out.push(*n as u8);
        }
        Value::Ushort(n) => {
            out.push(0x60);
            out.extend_from_slice(&n.to_be_bytes());
        }
        Value::Short(n) => {
            out.push(0x61);
            out.extend_from_slice(&n.to_be_bytes());
        }
        Value::Uint(0) => out.push(0x43),
        Value::Uint(n) if *n <= u8::MAX as u32 => {
            out.push(0x52);
            out.push(*n as u8);
        }
        Value::Uint(n) => {
            out.push(0x70);
            out.extend_from_slice(&n.to_be_bytes());
        }
        Value::Int(n) if i8::try_from(*n).is_ok() => {
            out.push(0x54);
            out.push(*n as i8 as u8);
        }
        Value::Int(n) => {
            out.push(0x71);
            out.extend_from_slice(&n.to_be_bytes());
        }
        Value::Char(c) => {
            out.push(0x73);
            out.extend_from_slice(&(*c as u32).to_be_bytes());
        }
        Value::Ulong(0) => out.push(0x44),
        Value::Ulong(n) if *n <= u8::MAX as u64 => {
            out.push(0x53);
            out.push(*n as u8);
        }
        Value::Ulong(n) => {
            out.push(0x80);
            out.extend_from_slice(&n.to_be_bytes());
        }
        Value::Long(n) if i8::try_from(*n).is_ok() => {
            out.push(0x55);
            out.push(*n as i8 as u8);
        }
        Value::Long(n) => {
            out.push(0x81);
            out.extend_from_slice(&n.to_be_bytes());
        }
        Value::Timestamp(t) => {
            out.push(0x83);
            out.extend_from_slice(&t.0.to_be_bytes());
        }
        Value::Float(x) => {
            out.push(0x72);
            out.extend_from_slice(&x.to_be_bytes());
        }
        Value::Double(x) => {
            out.push(0x82);
            out.extend_from_slice(&x.to_be_bytes());
        }
        Value::Decimal32(bits) => {
            out.push(0x74);
            out.extend_from_slice(&bits.to_be_bytes());
        }
        Value::Decimal64(bits) => {
            out.push(0x84);
            out.extend_from_slice(&bits.to_be_bytes());
        }
        Value::Decimal128(bytes) => {
            out.push(0x94);
            out.extend_from_slice(bytes);
        }
        Value::Uuid(u) => {
            out.push(0x98);
            out.extend_from_slice(&u.0);
        }
        Value::Binary(b) => encode_variable(0xa0, 0xb0, b, out),
        Value::String(s) => encode_variable(0xa1, 0xb1, s.as_bytes(), out),
        Value::Symbol(s) => encode_variable(0xa3, 0xb3, s.0.as_bytes(), out),
        Value::List(items) => {
            if items.is_empty() {
                out.push(0x45); // list0
                return Ok(());
            }
            let mut body = Vec::new();
            for item in items {
                encode_value(item, &mut body)?;
            }
            encode_compound(0xc0, 0xd0, items.len(), &body, out);
        }
        Value::Map(pairs) => {
            let mut body = Vec::new();
            for (k, v) in pairs {
                encode_value(k, &mut body)?;
                encode_value(v, &mut body)?;
            }
            encode_compound(0xc1, 0xd1, pairs.len() * 2, &body, out);
        }
        Value::Array(arr) => encode_array(arr, out)?,
        Value::Described(d) => {
            out.push(0x00);
            encode_value(&d.descriptor, out)?;
            encode_value(&d.value, out)?;
        }
    }
    Ok(())
}

/// Encodes `value` into a fresh buffer.
pub fn encode_to_vec(value: &Value) -> Result<Vec<u8>, CodecError> {
    let mut out = Vec::new();
    encode_value(value, &mut out)?;
    Ok(out)
}

// Variable-width payloads (binary / string / symbol): one-byte length
// when it fits, four-byte length otherwise.
fn encode_variable(small: u8, large: u8, bytes: &[u8], out: &mut Vec<u8>) {
    if bytes.len() <= u8::MAX as usize {
        out.push(small);
        out.push(bytes.len() as u8);
    } else {
        out.push(large);
        out.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
    }
    out.extend_from_slice(bytes);
}

// Compound (list/map) framing: size counts the count field plus the body,
// never the size field itself.
fn encode_compound(small: u8, large: u8, count: usize, body: &[u8], out: &mut Vec<u8>) {
    let size8 = body.len() + 1;
    if size8 <= u8::MAX as usize && count <= u8::MAX as usize {
        out.push(small);
        out.push(size8 as u8);
        out.push(count as u8);
    } else {
        out.push(large);
        out.extend_from_slice(&((body.len() + 4) as u32).to_be_bytes());
        out.extend_from_slice(&(count as u32).to_be_bytes());
    }
    out.extend_from_slice(body);
}

fn encode_array(arr: &Array, out: &mut Vec<u8>) -> Result<(), CodecError> {
    // Shared constructor: optional descriptor prefix, then the wide-form
    // element constructor.
    let mut inner = Vec::new();
    if let Some(descriptor) = &arr.descriptor {
        inner.push(0x00);
        encode_value(descriptor, &mut inner)?;
    }
    inner.push(array_constructor(arr.element)?);

    for element in &arr.elements {
        if element.tag() != arr.element {
            return Err(CodecError::HeterogeneousArray {
                expected: arr.element,
                found: element.tag(),
            });
        }
        encode_array_element(element, &mut inner)?;
    }

    let count = arr.elements.len();
    let size8 = inner.len() + 1;
    if size8 <= u8::MAX as usize && count <= u8::MAX as usize {
        out.push(0xe0);
        out.push(size8 as u8);
        out.push(count as u8);
    } else {
        out.push(0xf0);
        out.extend_from_slice(&((inner.len() + 4) as u32).to_be_bytes());
        out.extend_from_slice(&(count as u32).to_be_bytes());
    }
    out.extend_from_slice(&inner);
    Ok(())
}

/// The wide-form constructor byte used for `tag` inside an array.
pub(crate) fn array_constructor(tag: TypeTag) -> Result<u8, CodecError> {
    Ok(match tag {
        TypeTag::Null => 0x40,
        TypeTag::Bool => 0x56,
        TypeTag::Ubyte => 0x50,
        TypeTag::Byte => 0x51,
        TypeTag::Ushort => 0x60,
        TypeTag::Short => 0x61,
        TypeTag::Uint => 0x70,
        TypeTag::Int => 0x71,
        TypeTag::Char => 0x73,
        TypeTag::Ulong => 0x80,
        TypeTag::Long => 0x81,
        TypeTag::Timestamp => 0x83,
        TypeTag::Float => 0x72,
        TypeTag::Double => 0x82,
        TypeTag::Decimal32 => 0x74,
        TypeTag::Decimal64 => 0x84,
        TypeTag::Decimal128 => 0x94,
        TypeTag::Uuid => 0x98,
        TypeTag::Binary => 0xb0,
        TypeTag::String => 0xb1,
        TypeTag::Symbol => 0xb3,
        TypeTag::List => 0xd0,
        TypeTag::Map => 0xd1,
        TypeTag::Array => 0xf0,
        TypeTag::Described => return Err(CodecError::DescriptorInArray),
    })
}

// One element payload, without a constructor (the array wrote it once).
fn encode_array_element(element: &Value, out: &mut Vec<u8>) -> Result<(), CodecError> {
    match element {
        Value::Null => {}
        Value::Bool(b) => out.push(if *b { 1 } else { 0 }),
        Value::Ubyte(n) => out.push(*n),
        Value::Byte(n) => out.push(*n as u8),
        Value::Ushort(n) => out.extend_from_slice(&n.to_be_bytes()),
        Value::Short(n) => out.extend_from_slice(&n.to_be_bytes()),
        Value::Uint(n) => out.extend_from_slice(&n.to_be_bytes()),
        Value::Int(n) => out.extend_from_slice(&n.to_be_bytes()),
        Value::Char(c) => out.extend_from_slice(&(*c as u32).to_be_bytes()),
        Value::Ulong(n) => out.extend_from_slice(&n.to_be_bytes()),
        Value::Long(n) => out.extend_from_slice(&n.to_be_bytes()),
        Value::Timestamp(t) => out.extend_from_slice(&t.0.to_be_bytes()),
        Value::Float(x) => out.extend_from_slice(&x.to_be_bytes()),
        Value::Double(x) => out.extend_from_slice(&x.to_be_bytes()),
        Value::Decimal32(bits) => out.extend_from_slice(&bits.to_be_bytes()),
        Value::Decimal64(bits) => out.extend_from_slice(&bits.to_be_bytes()),
        Value::Decimal128(bytes) => out.extend_from_slice(bytes),
        Value::Uuid(u) => out.extend_from_slice(&u.0),
        Value::Binary(b) => {
            out.extend_from_slice(&(b.len() as u32).to_be_bytes());
            out.extend_from_slice(b);
        }
        Value::String(s) => {
            out.extend_from_slice(&(s.len() as u32).to_be_bytes());
            out.extend_from_slice(s.as_bytes());
        }
        Value::Symbol(s) => {
            out.extend_from_slice(&(s.0.len() as u32).to_be_bytes());
            out.extend_from_slice(s.0.as_bytes());
        }
        Value::List(items) => {
            let mut body = Vec::new();
            for item in items {
                encode_value(item, &mut body)?;
            }
            out.extend_from_slice(&((body.len() + 4) as u32).to_be_bytes());
            out.extend_from_slice(&(items.len() as u32).to_be_bytes());
            out.extend_from_slice(&body);
        }
        Value::Map(pairs) => {
            let mut body = Vec::new();
            for (k, v) in pairs {
                encode_value(k, &mut body)?;
                encode_value(v, &mut body)?;
            }
            out.extend_from_slice(&((body.len() + 4) as u32).to_be_bytes());
            out.extend_from_slice(&((pairs.len() * 2) as u32).to_be_bytes());
            out.extend_from_slice(&body);
        }
        Value::Array(arr) => {
            // Nested array element: the array32 body (size, count,
            // constructor, payload) without the leading 0xf0.
            let mut whole = Vec::new();
            encode_array(arr, &mut whole)?;
            match whole[0] {
                0xe0 => {
                    // Re-widen: element position requires the 32-bit form.
                    let count = whole[2] as u32;
                    let inner = &whole[3..];
                    out.extend_from_slice(&((inner.len() + 4) as u32).to_be_bytes());
                    out.extend_from_slice(&count.to_be_bytes());
                    out.extend_from_slice(inner);
                }
                _ => out.extend_from_slice(&whole[1..]),
            }
        }
        Value::Described(_) => return Err(CodecError::DescriptorInArray),
    }
    Ok(())
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Symbol, Timestamp, Uuid};

    fn enc(v: &Value) -> Vec<u8> {
        encode_to_vec(v).expect("encode should succeed")
    }

    // =====================================================================
    // Fixed-width scalars: exact octet layout
    // =====================================================================

    #[test]
    fn test_encode_null_single_byte() {
        assert_eq!(enc(&Value::Null), [0x40]);
    }

    #[test]
    fn test_encode_bool_fixed_constructors() {
        assert_eq!(enc(&Value::Bool(true)), [0x41]);
        assert_eq!(enc(&Value::Bool(false)), [0x42]);
    }

    #[test]
    fn test_encode_uint_picks_smallest_form() {
        assert_eq!(enc(&Value::Uint(0)), [0x43]);
        assert_eq!(enc(&Value::Uint(255)), [0x52, 0xff]);
        assert_eq!(enc(&Value::Uint(256)), [0x70, 0, 0, 1, 0]);
    }

    #[test]
    fn test_encode_ulong_picks_smallest_form() {
        assert_eq!(enc(&Value::Ulong(0)), [0x44]);
        assert_eq!(enc(&Value::Ulong(16)), [0x53, 16]);
        assert_eq!(
            enc(&Value::Ulong(0x0102030405060708)),
            [0x80, 1, 2, 3, 4, 5, 6, 7, 8]
        );
    }

    #[test]
    fn test_encode_int_small_form_covers_negative() {
        assert_eq!(enc(&Value::Int(-1)), [0x54, 0xff]);
        assert_eq!(enc(&Value::Int(1000)), [0x71, 0, 0, 0x03, 0xe8]);
    }

    #[test]
    fn test_encode_long_small_and_wide() {
        assert_eq!(enc(&Value::Long(-2)), [0x55, 0xfe]);
        assert_eq!(enc(&Value::Long(300)), [0x81, 0, 0, 0, 0, 0, 0, 1, 44]);
    }

    #[test]
    fn test_encode_timestamp_wide_only() {
        assert_eq!(enc(&Value::Timestamp(Timestamp(1))), [0x83, 0, 0, 0, 0, 0, 0, 0, 1]);
    }

    #[test]
    fn test_encode_char_utf32() {
        assert_eq!(enc(&Value::Char('A')), [0x73, 0, 0, 0, 0x41]);
    }

    #[test]
    fn test_encode_uuid_sixteen_raw_bytes() {
        let u = Uuid([9; 16]);
        let bytes = enc(&Value::Uuid(u));
        assert_eq!(bytes[0], 0x98);
        assert_eq!(&bytes[1..], [9; 16]);
    }

    // =====================================================================
    // Variable-width: binary / string / symbol
    // =====================================================================

    #[test]
    fn test_encode_string_short_form() {
        assert_eq!(enc(&Value::string("ab")), [0xa1, 2, b'a', b'b']);
    }

    #[test]
    fn test_encode_string_long_form_when_over_255() {
        let s = "x".repeat(300);
        let bytes = enc(&Value::string(&s));
        assert_eq!(bytes[0], 0xb1);
        assert_eq!(&bytes[1..5], &300u32.to_be_bytes());
        assert_eq!(bytes.len(), 5 + 300);
    }

    #[test]
    fn test_encode_symbol_uses_symbol_constructors() {
        assert_eq!(
            enc(&Value::Symbol(Symbol::new("ok"))),
            [0xa3, 2, b'o', b'k']
        );
    }

    #[test]
    fn test_encode_binary_short_form() {
        assert_eq!(enc(&Value::Binary(vec![1, 2, 3])), [0xa0, 3, 1, 2, 3]);
    }

    // =====================================================================
    // Composites
    // =====================================================================

    #[test]
    fn test_encode_empty_list_is_list0() {
        assert_eq!(enc(&Value::List(vec![])), [0x45]);
    }

    #[test]
    fn test_encode_list8_size_includes_count_byte() {
        // [null, true] → body = 40 41 (2 bytes), size = body + count byte = 3.
        let bytes = enc(&Value::List(vec![Value::Null, Value::Bool(true)]));
        assert_eq!(bytes, [0xc0, 3, 2, 0x40, 0x41]);
    }

    #[test]
    fn test_encode_map8_count_is_keys_plus_values() {
        let bytes = enc(&Value::Map(vec![(Value::string("a"), Value::Int(1))]));
        // map8, size, count=2, "a" as str8, 1 as smallint.
        assert_eq!(bytes, [0xc1, 6, 2, 0xa1, 1, b'a', 0x54, 1]);
    }

    #[test]
    fn test_encode_described_prefixes_descriptor() {
        let v = Value::described(Value::Ulong(0x10), Value::List(vec![]));
        assert_eq!(enc(&v), [0x00, 0x53, 0x10, 0x45]);
    }

    #[test]
    fn test_encode_array_shares_one_constructor() {
        let mut arr = Array::new(TypeTag::Int);
        arr.elements = vec![Value::Int(1), Value::Int(2)];
        let bytes = enc(&Value::Array(arr));
        // array8: size covers count byte + constructor + payload
        // = 1 + 1 + 2*4 = 10.
        assert_eq!(
            bytes,
            [0xe0, 10, 2, 0x71, 0, 0, 0, 1, 0, 0, 0, 2]
        );
    }

    #[test]
    fn test_encode_array_rejects_mixed_element_types() {
        let mut arr = Array::new(TypeTag::Int);
        arr.elements = vec![Value::Int(1), Value::string("nope")];
        let result = encode_to_vec(&Value::Array(arr));
        assert!(matches!(
            result,
            Err(CodecError::HeterogeneousArray { .. })
        ));
    }

    #[test]
    fn test_encode_described_array_constructor_carries_descriptor() {
        let mut arr = Array::described(Value::Ulong(0x24), TypeTag::List);
        arr.elements = vec![Value::List(vec![])];
        let bytes = enc(&Value::Array(arr));
        // array8, size, count=1, 0x00 smallulong 0x24, list32 constructor,
        // then one empty-list element (size=4, count=0).
        assert_eq!(
            bytes,
            [0xe0, 13, 1, 0x00, 0x53, 0x24, 0xd0, 0, 0, 0, 4, 0, 0, 0, 0]
        );
    }
}
