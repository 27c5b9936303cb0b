//! Binary decoding: AMQP 1.0 octets → [`Value`] trees.
//!
//! The decoder accepts every standard encoding for a type (a `uint` may
//! arrive as `uint0`, `smalluint`, or the 4-byte form) and normalizes to
//! the one [`Value`] variant. Unknown constructor bytes fail with
//! [`CodecError::UnknownConstructor`] — the explicit unmapped-type policy.
//! Compound size prefixes are verified against the bytes actually
//! consumed, so a lying frame cannot smuggle trailing garbage.

use crate::error::CodecError;
use crate::types::{Array, Described, Symbol, Timestamp, TypeTag, Uuid, Value};

/// A reading head over a byte slice. Every read checks bounds and fails
/// with [`CodecError::Incomplete`] instead of panicking.
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn u8(&mut self) -> Result<u8, CodecError> {
        let b = *self.buf.get(self.pos).ok_or(CodecError::Incomplete)?;
        self.pos += 1;
        Ok(b)
    }

    fn bytes(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        let end = self.pos.checked_add(n).ok_or(CodecError::Incomplete)?;
        let slice = self.buf.get(self.pos..end).ok_or(CodecError::Incomplete)?;
        self.pos = end;
        Ok(slice)
    }

    fn u16(&mut self) -> Result<u16, CodecError> {
        Ok(u16::from_be_bytes(self.bytes(2)?.try_into().expect("len 2")))
    }

    fn u32(&mut self) -> Result<u32, CodecError> {
        Ok(u32::from_be_bytes(self.bytes(4)?.try_into().expect("len 4")))
    }

    fn u64(&mut self) -> Result<u64, CodecError> {
        Ok(u64::from_be_bytes(self.bytes(8)?.try_into().expect("len 8")))
    }
}

/// Decodes one value from the front of `buf`.
///
/// Returns the value and the number of bytes consumed; callers feeding a
/// frame body call this in a loop until the body is exhausted.
pub fn decode_value(buf: &[u8]) -> Result<(Value, usize), CodecError> {
    let mut r = Reader::new(buf);
    let value = read_value(&mut r)?;
    Ok((value, r.pos))
}

fn read_value(r: &mut Reader<'_>) -> Result<Value, CodecError> {
    let code = r.u8()?;
    read_value_with_code(code, r)
}

fn read_value_with_code(code: u8, r: &mut Reader<'_>) -> Result<Value, CodecError> {
    Ok(match code {
        0x00 => {
            let descriptor = read_value(r)?;
            let value = read_value(r)?;
            Value::Described(Box::new(Described { descriptor, value }))
        }
        0x40 => Value::Null,
        0x41 => Value::Bool(true),
        0x42 => Value::Bool(false),
        0x56 => match r.u8()? {
            0 => Value::Bool(false),
            1 => Value::Bool(true),
            b => return Err(CodecError::InvalidBool(b)),
        },
        0x43 => Value::Uint(0),
        0x44 => Value::Ulong(0),
        0x45 => Value::List(Vec::new()),
        0x50 => Value::Ubyte(r.u8()?),
        0x51 => Value::Byte(r.u8()? as i8),
        0x52 => Value::Uint(r.u8()? as u32),
        0x53 => Value::Ulong(r.u8()? as u64),
        0x54 => Value::Int(r.u8()? as i8 as i32),
        0x55 => Value::Long(r.u8()? as i8 as i64),
        0x60 => Value::Ushort(r.u16()?),
        0x61 => Value::Short(r.u16()? as i16),
        0x70 => Value::Uint(r.u32()?),
        0x71 => Value::Int(r.u32()? as i32),
        0x72 => Value::Float(f32::from_be_bytes(r.bytes(4)?.try_into().expect("len 4"))),
        0x73 => {
            let cp = r.u32()?;
            Value::Char(char::from_u32(cp).ok_or(CodecError::InvalidChar(cp))?)
        }
        0x74 => Value::Decimal32(r.u32()?),
        0x80 => Value::Ulong(r.u64()?),
        0x81 => Value::Long(r.u64()? as i64),
        0x82 => Value::Double(f64::from_be_bytes(r.bytes(8)?.try_into().expect("len 8"))),
        0x83 => Value::Timestamp(Timestamp(r.u64()? as i64)),
        0x84 => Value::Decimal64(r.u64()?),
        0x94 => Value::Decimal128(r.bytes(16)?.try_into().expect("len 16")),
        0x98 => Value::Uuid(Uuid(r.bytes(16)?.try_into().expect("len 16"))),
        0xa0 => {
            let len = r.u8()? as usize;
            Value::Binary(r.bytes(len)?.to_vec())
        }
        0xa1 => {
            let len = r.u8()? as usize;
            Value::String(String::from_utf8(r.bytes(len)?.to_vec())?)
        }
        0xa3 => {
            let len = r.u8()? as usize;
            Value::Symbol(Symbol(String::from_utf8(r.bytes(len)?.to_vec())?))
        }
        0xb0 => {
            let len = r.u32()? as usize;
            Value::Binary(r.bytes(len)?.to_vec())
        }
        0xb1 => {
            let len = r.u32()? as usize;
            Value::String(String::from_utf8(r.bytes(len)?.to_vec())?)
        }
        0xb3 => {
            let len = r.u32()? as usize;
            Value::Symbol(Symbol(String::from_utf8(r.bytes(len)?.to_vec())?))
        }
        0xc0 | 0xd0 => read_compound(code == 0xc0, r, false)?,
        0xc1 | 0xd1 => read_compound(code == 0xc1, r, true)?,
        0xe0 | 0xf0 => {
            let (size, count) = if code == 0xe0 {
                (r.u8()? as usize, r.u8()? as usize)
            } else {
                (r.u32()? as usize, r.u32()? as usize)
            };
            let count_width = if code == 0xe0 { 1 } else { 4 };
            let body = r.bytes(size.checked_sub(count_width).ok_or(CodecError::Incomplete)?)?;
            Value::Array(read_array_body(body, count)?)
        }
        other => return Err(CodecError::UnknownConstructor(other)),
    })
}

// List or map bodies: size, count, then `count` child values that must
// consume exactly the declared region.
fn read_compound(small: bool, r: &mut Reader<'_>, is_map: bool) -> Result<Value, CodecError> {
    let (size, count) = if small {
        (r.u8()? as usize, r.u8()? as usize)
    } else {
        (r.u32()? as usize, r.u32()? as usize)
    };
    let count_width = if small { 1 } else { 4 };
    let body = r.bytes(size.checked_sub(count_width).ok_or(CodecError::Incomplete)?)?;

    let mut inner = Reader::new(body);
    let mut items = Vec::with_capacity(count.min(64));
    for _ in 0..count {
        items.push(read_value(&mut inner)?);
    }
    if inner.pos != body.len() {
        return Err(CodecError::SizeMismatch {
            declared: body.len(),
            consumed: inner.pos,
        });
    }

    if is_map {
        if count % 2 != 0 {
            return Err(CodecError::OddMapEntries(count));
        }
        let mut pairs = Vec::with_capacity(count / 2);
        let mut iter = items.into_iter();
        while let (Some(k), Some(v)) = (iter.next(), iter.next()) {
            pairs.push((k, v));
        }
        Ok(Value::Map(pairs))
    } else {
        Ok(Value::List(items))
    }
}

fn read_array_body(body: &[u8], count: usize) -> Result<Array, CodecError> {
    let mut r = Reader::new(body);

    // Shared constructor, possibly prefixed by a descriptor.
    let mut code = r.u8()?;
    let descriptor = if code == 0x00 {
        let d = read_value(&mut r)?;
        code = r.u8()?;
        Some(Box::new(d))
    } else {
        None
    };
    let element = tag_for_array_code(code)?;

    let mut elements = Vec::with_capacity(count.min(64));
    for _ in 0..count {
        elements.push(read_array_element(code, &mut r)?);
    }
    if r.pos != body.len() {
        return Err(CodecError::SizeMismatch {
            declared: body.len(),
            consumed: r.pos,
        });
    }
    Ok(Array {
        descriptor,
        element,
        elements,
    })
}

fn tag_for_array_code(code: u8) -> Result<TypeTag, CodecError> {
    Ok(match code {
        0x40 => TypeTag::Null,
        0x41 | 0x42 | 0x56 => TypeTag::Bool,
        0x50 => TypeTag::Ubyte,
        0x51 => TypeTag::Byte,
        0x60 => TypeTag::Ushort,
        0x61 => TypeTag::Short,
        0x43 | 0x52 | 0x70 => TypeTag::Uint,
        0x54 | 0x71 => TypeTag::Int,
        0x73 => TypeTag::Char,
        0x44 | 0x53 | 0x80 => TypeTag::Ulong,
        0x55 | 0x81 => TypeTag::Long,
        0x83 => TypeTag::Timestamp,
        0x72 => TypeTag::Float,
        0x82 => TypeTag::Double,
        0x74 => TypeTag::Decimal32,
        0x84 => TypeTag::Decimal64,
        0x94 => TypeTag::Decimal128,
        0x98 => TypeTag::Uuid,
        0xa0 | 0xb0 => TypeTag::Binary,
        0xa1 | 0xb1 => TypeTag::String,
        0xa3 | 0xb3 => TypeTag::Symbol,
        0x45 | 0xc0 | 0xd0 => TypeTag::List,
        0xc1 | 0xd1 => TypeTag::Map,
        0xe0 | 0xf0 => TypeTag::Array,
        other => return Err(CodecError::UnknownConstructor(other)),
    })
}

// One array element: payload only, the shared constructor told us the shape.
fn read_array_element(code: u8, r: &mut Reader<'_>) -> Result<Value, CodecError> {
    Ok(match code {
        // Zero-width constructors: the value lives entirely in the code.
        0x40 => Value::Null,
        0x41 => Value::Bool(true),
        0x42 => Value::Bool(false),
        0x43 => Value::Uint(0),
        0x44 => Value::Ulong(0),
        0x45 => Value::List(Vec::new()),
        0x56 => match r.u8()? {
            0 => Value::Bool(false),
            1 => Value::Bool(true),
            b => return Err(CodecError::InvalidBool(b)),
        },
        0x50 => Value::Ubyte(r.u8()?),
        0x51 => Value::Byte(r.u8()? as i8),
        0x52 => Value::Uint(r.u8()? as u32),
        0x53 => Value::Ulong(r.u8()? as u64),
        0x54 => Value::Int(r.u8()? as i8 as i32),
        0x55 => Value::Long(r.u8()? as i8 as i64),
        0x60 => Value::Ushort(r.u16()?),
        0x61 => Value::Short(r.u16()? as i16),
        0x70 => Value::Uint(r.u32()?),
        0x71 => Value::Int(r.u32()? as i32),
        0x72 => Value::Float(f32::from_be_bytes(r.bytes(4)?.try_into().expect("len 4"))),
        0x73 => {
            let cp = r.u32()?;
            Value::Char(char::from_u32(cp).ok_or(CodecError::InvalidChar(cp))?)
        }
        0x74 => Value::Decimal32(r.u32()?),
        0x80 => Value::Ulong(r.u64()?),
        0x81 => Value::Long(r.u64()? as i64),
        0x82 => Value::Double(f64::from_be_bytes(r.bytes(8)?.try_into().expect("len 8"))),
        0x83 => Value::Timestamp(Timestamp(r.u64()? as i64)),
        0x84 => Value::Decimal64(r.u64()?),
        0x94 => Value::Decimal128(r.bytes(16)?.try_into().expect("len 16")),
        0x98 => Value::Uuid(Uuid(r.bytes(16)?.try_into().expect("len 16"))),
        0xa0 | 0xb0 => {
            let len = var_len(code, r)?;
            Value::Binary(r.bytes(len)?.to_vec())
        }
        0xa1 | 0xb1 => {
            let len = var_len(code, r)?;
            Value::String(String::from_utf8(r.bytes(len)?.to_vec())?)
        }
        0xa3 | 0xb3 => {
            let len = var_len(code, r)?;
            Value::Symbol(Symbol(String::from_utf8(r.bytes(len)?.to_vec())?))
        }
        0xc0 | 0xd0 => read_compound(code == 0xc0, r, false)?,
        0xc1 | 0xd1 => read_compound(code == 0xc1, r, true)?,
        0xe0 | 0xf0 => {
            let (size, count) = if code == 0xe0 {
                (r.u8()? as usize, r.u8()? as usize)
            } else {
                (r.u32()? as usize, r.u32()? as usize)
            };
            let count_width = if code == 0xe0 { 1 } else { 4 };
            let body = r.bytes(size.checked_sub(count_width).ok_or(CodecError::Incomplete)?)?;
            Value::Array(read_array_body(body, count)?)
        }
        other => return Err(CodecError::UnknownConstructor(other)),
    })
}

fn var_len(code: u8, r: &mut Reader<'_>) -> Result<usize, CodecError> {
    if code < 0xb0 {
        Ok(r.u8()? as usize)
    } else {
        Ok(r.u32()? as usize)
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encode::encode_to_vec;

    fn roundtrip(v: &Value) {
        let bytes = encode_to_vec(v).expect("encode");
        let (decoded, consumed) = decode_value(&bytes).expect("decode");
        assert_eq!(consumed, bytes.len(), "must consume the whole encoding");
        assert_eq!(&decoded, v, "round-trip must reproduce the value");
    }

    // =====================================================================
    // Round-trip law across the type universe
    // =====================================================================

    #[test]
    fn test_roundtrip_every_scalar_type() {
        roundtrip(&Value::Null);
        roundtrip(&Value::Bool(true));
        roundtrip(&Value::Bool(false));
        roundtrip(&Value::Ubyte(42));
        roundtrip(&Value::Byte(-42));
        roundtrip(&Value::Ushort(4242));
        roundtrip(&Value::Short(-4242));
        roundtrip(&Value::Uint(0));
        roundtrip(&Value::Uint(77));
        roundtrip(&Value::Uint(3_000_000_000));
        roundtrip(&Value::Int(-4242));
        roundtrip(&Value::Char('✓'));
        roundtrip(&Value::Ulong(0));
        roundtrip(&Value::Ulong(99));
        roundtrip(&Value::Ulong(u64::MAX));
        roundtrip(&Value::Long(-1));
        roundtrip(&Value::Long(i64::MIN));
        roundtrip(&Value::Timestamp(Timestamp(1_234_567_890_123)));
        roundtrip(&Value::Float(1.234));
        roundtrip(&Value::Double(11.2233));
        roundtrip(&Value::Decimal32(0xdead_beef));
        roundtrip(&Value::Decimal64(0x0123_4567_89ab_cdef));
        roundtrip(&Value::Decimal128([7; 16]));
        roundtrip(&Value::Uuid(Uuid([3; 16])));
        roundtrip(&Value::Binary(vec![0, 1, 2, 255]));
        roundtrip(&Value::String("héllo".into()));
        roundtrip(&Value::Symbol(Symbol::new("amqp:accepted:list")));
    }

    #[test]
    fn test_roundtrip_long_variable_width_forms() {
        roundtrip(&Value::Binary(vec![0xab; 700]));
        roundtrip(&Value::String("s".repeat(700)));
        roundtrip(&Value::Symbol(Symbol::new("y".repeat(300))));
    }

    #[test]
    fn test_roundtrip_nested_composites() {
        let v = Value::List(vec![
            Value::Null,
            Value::Map(vec![
                (Value::string("a"), Value::Int(1)),
                (Value::symbol("k"), Value::List(vec![Value::Bool(true)])),
            ]),
            Value::described(Value::Ulong(0x77), Value::string("body")),
        ]);
        roundtrip(&v);
    }

    #[test]
    fn test_roundtrip_described_of_array_of_map() {
        // The deepest nesting the composite rules allow interacting:
        // a described value wrapping an array whose elements are maps.
        let mut arr = Array::new(TypeTag::Map);
        arr.elements = vec![
            Value::Map(vec![(Value::string("k1"), Value::Uint(1))]),
            Value::Map(vec![(Value::string("k2"), Value::Uint(2))]),
        ];
        let v = Value::described(Value::symbol("x:batch"), Value::Array(arr));
        roundtrip(&v);
    }

    #[test]
    fn test_roundtrip_described_array_with_shared_descriptor() {
        let mut arr = Array::described(Value::Ulong(0x24), TypeTag::List);
        arr.elements = vec![Value::List(vec![]), Value::List(vec![Value::Int(5)])];
        roundtrip(&Value::Array(arr));
    }

    #[test]
    fn test_roundtrip_empty_and_large_arrays() {
        roundtrip(&Value::Array(Array::new(TypeTag::Uint)));

        let mut big = Array::new(TypeTag::Long);
        big.elements = (0..300).map(Value::Long).collect();
        roundtrip(&Value::Array(big));
    }

    #[test]
    fn test_roundtrip_large_list_uses_list32() {
        let v = Value::List((0..300).map(Value::Int).collect());
        let bytes = encode_to_vec(&v).unwrap();
        assert_eq!(bytes[0], 0xd0);
        roundtrip(&v);
    }

    // =====================================================================
    // Alternate encodings accepted on decode
    // =====================================================================

    #[test]
    fn test_decode_boolean_byte_form() {
        assert_eq!(decode_value(&[0x56, 1]).unwrap().0, Value::Bool(true));
        assert_eq!(decode_value(&[0x56, 0]).unwrap().0, Value::Bool(false));
    }

    #[test]
    fn test_decode_boolean_byte_form_rejects_other_values() {
        assert!(matches!(
            decode_value(&[0x56, 7]),
            Err(CodecError::InvalidBool(7))
        ));
    }

    #[test]
    fn test_decode_wide_uint_normalizes() {
        // 0x70 with a small value decodes to the same Value as uint0.
        let (v, _) = decode_value(&[0x70, 0, 0, 0, 0]).unwrap();
        assert_eq!(v, Value::Uint(0));
    }

    #[test]
    fn test_decode_array_of_true_zero_width() {
        // Constructor 0x41 means "every element is true, no payload bytes".
        // size = count byte + constructor = 2.
        let (v, _) = decode_value(&[0xe0, 2, 3, 0x41]).unwrap();
        let Value::Array(arr) = v else {
            panic!("expected array")
        };
        assert_eq!(arr.element, TypeTag::Bool);
        assert_eq!(arr.elements, vec![Value::Bool(true); 3]);
    }

    // =====================================================================
    // Malformed input
    // =====================================================================

    #[test]
    fn test_decode_unknown_constructor_fails() {
        assert!(matches!(
            decode_value(&[0x3f]),
            Err(CodecError::UnknownConstructor(0x3f))
        ));
    }

    #[test]
    fn test_decode_truncated_payload_fails() {
        // str8 claiming 5 bytes with only 2 present.
        assert!(matches!(
            decode_value(&[0xa1, 5, b'a', b'b']),
            Err(CodecError::Incomplete)
        ));
    }

    #[test]
    fn test_decode_empty_buffer_fails() {
        assert!(matches!(decode_value(&[]), Err(CodecError::Incomplete)));
    }

    #[test]
    fn test_decode_list_size_lying_fails() {
        // list8: size=4 (count byte + 3 body bytes) but body holds a
        // single null — one declared child consumes 1 of 3 bytes.
        let bytes = [0xc0, 4, 1, 0x40, 0x40, 0x40];
        assert!(matches!(
            decode_value(&bytes),
            Err(CodecError::SizeMismatch { .. })
        ));
    }

    #[test]
    fn test_decode_map_odd_count_fails() {
        // map8 claiming 1 child ("a" str8).
        let bytes = [0xc1, 4, 1, 0xa1, 1, b'a'];
        assert!(matches!(
            decode_value(&bytes),
            Err(CodecError::OddMapEntries(1))
        ));
    }

    #[test]
    fn test_decode_invalid_char_fails() {
        // 0xd800 is a surrogate, not a scalar value.
        let bytes = [0x73, 0x00, 0x00, 0xd8, 0x00];
        assert!(matches!(
            decode_value(&bytes),
            Err(CodecError::InvalidChar(0xd800))
        ));
    }

    #[test]
    fn test_decode_consumes_only_one_value() {
        // Two nulls back to back: first decode consumes exactly one byte.
        let (v, consumed) = decode_value(&[0x40, 0x40]).unwrap();
        assert_eq!(v, Value::Null);
        assert_eq!(consumed, 1);
    }
}
