//! The AMQP 1.0 type universe as Rust types.
//!
//! AMQP is a self-describing wire format: every encoded value carries its
//! own type information, and values nest recursively (a map of lists of
//! described arrays is perfectly legal). This module models that universe
//! as one closed [`Value`] enum, so encode and decode are exhaustive
//! `match`es checked by the compiler — there is no runtime dispatch table
//! to fall out of sync with the wire format.
//!
//! Think of [`Value`] as the "parse tree" of a wire value and [`TypeTag`]
//! as just the node label, useful when you need to talk about a type
//! without holding a value of it (array element types, error messages).

use std::fmt;

// ---------------------------------------------------------------------------
// Scalar newtypes
// ---------------------------------------------------------------------------

/// An AMQP symbol: an ASCII-ish string drawn from a restricted lexicon.
///
/// Symbols and strings are distinct wire types. Connection capabilities,
/// error condition names, and SASL mechanism names are all symbols, and a
/// peer that receives a plain string where a symbol is expected is within
/// its rights to reject the frame. The newtype keeps the two from being
/// mixed up in Rust code the same way the wire keeps them apart.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol(pub String);

impl Symbol {
    /// Creates a symbol from anything string-like.
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Returns the symbol text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, ":{}", self.0)
    }
}

impl From<&str> for Symbol {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// An AMQP timestamp: milliseconds since the Unix epoch, signed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Timestamp(pub i64);

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}ms", self.0)
    }
}

/// A 16-byte UUID, stored big-endian as it appears on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Uuid(pub [u8; 16]);

impl fmt::Display for Uuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Standard 8-4-4-4-12 grouping.
        let b = &self.0;
        for (i, byte) in b.iter().enumerate() {
            if matches!(i, 4 | 6 | 8 | 10) {
                write!(f, "-")?;
            }
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Composite types
// ---------------------------------------------------------------------------

/// A described value: some value tagged with an extra descriptor value.
///
/// This is AMQP's extension mechanism. Every protocol performative (Open,
/// Transfer, ...) is "a described list": a list whose descriptor says
/// which performative it is. The descriptor is itself a full value —
/// usually a `Ulong` code or a `Symbol` name.
#[derive(Debug, Clone, PartialEq)]
pub struct Described {
    /// What this value *means* (a ulong code or symbol, by convention).
    pub descriptor: Value,
    /// The value being described.
    pub value: Value,
}

impl Described {
    /// Wraps `value` with `descriptor`.
    pub fn new(descriptor: Value, value: Value) -> Self {
        Self { descriptor, value }
    }
}

/// A homogeneous array: every element shares one type tag, and the
/// element constructor is written once on the wire instead of per element.
///
/// An array may also carry a single shared descriptor, making it an
/// array-of-described — the descriptor applies to every element.
#[derive(Debug, Clone, PartialEq)]
pub struct Array {
    /// Shared descriptor, if this is an array of described values.
    pub descriptor: Option<Box<Value>>,
    /// The element type every member must match.
    pub element: TypeTag,
    /// The elements, in order. Invariant: `elements[i].tag() == element`.
    pub elements: Vec<Value>,
}

impl Array {
    /// Creates an undescribed array of the given element type.
    pub fn new(element: TypeTag) -> Self {
        Self {
            descriptor: None,
            element,
            elements: Vec::new(),
        }
    }

    /// Creates an array whose elements share `descriptor`.
    pub fn described(descriptor: Value, element: TypeTag) -> Self {
        Self {
            descriptor: Some(Box::new(descriptor)),
            element,
            elements: Vec::new(),
        }
    }

    /// Number of elements (the descriptor does not count).
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Returns `true` if the array has no elements.
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Value — the closed universe
// ---------------------------------------------------------------------------

/// One AMQP value: a node in the recursive, self-describing value tree.
///
/// The variants cover the complete AMQP 1.0 type universe. Because the
/// enum is closed, `encode`/`decode` match exhaustively and adding a
/// variant is a compile error everywhere it matters.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// The null value.
    #[default]
    Null,
    /// Boolean.
    Bool(bool),
    /// Unsigned 8-bit integer.
    Ubyte(u8),
    /// Signed 8-bit integer.
    Byte(i8),
    /// Unsigned 16-bit integer.
    Ushort(u16),
    /// Signed 16-bit integer.
    Short(i16),
    /// Unsigned 32-bit integer.
    Uint(u32),
    /// Signed 32-bit integer.
    Int(i32),
    /// A single Unicode code point.
    Char(char),
    /// Unsigned 64-bit integer.
    Ulong(u64),
    /// Signed 64-bit integer.
    Long(i64),
    /// Milliseconds since the Unix epoch.
    Timestamp(Timestamp),
    /// IEEE 754 single precision.
    Float(f32),
    /// IEEE 754 double precision.
    Double(f64),
    /// IEEE 754-2008 decimal32, raw bits.
    Decimal32(u32),
    /// IEEE 754-2008 decimal64, raw bits.
    Decimal64(u64),
    /// IEEE 754-2008 decimal128, raw bytes.
    Decimal128([u8; 16]),
    /// A 16-byte UUID.
    Uuid(Uuid),
    /// Opaque binary data.
    Binary(Vec<u8>),
    /// A UTF-8 string.
    String(String),
    /// A symbol (see [`Symbol`]).
    Symbol(Symbol),
    /// An ordered, heterogeneous sequence.
    List(Vec<Value>),
    /// An ordered sequence of key/value pairs. Keys may be any value;
    /// duplicate handling is the application's business, not the codec's.
    Map(Vec<(Value, Value)>),
    /// A homogeneous array (see [`Array`]).
    Array(Array),
    /// A described value (see [`Described`]). Boxed: the variant would
    /// otherwise make every `Value` two values wide.
    Described(Box<Described>),
}

impl Value {
    /// Returns the type tag for this value.
    pub fn tag(&self) -> TypeTag {
        match self {
            Value::Null => TypeTag::Null,
            Value::Bool(_) => TypeTag::Bool,
            Value::Ubyte(_) => TypeTag::Ubyte,
            Value::Byte(_) => TypeTag::Byte,
            Value::Ushort(_) => TypeTag::Ushort,
            Value::Short(_) => TypeTag::Short,
            Value::Uint(_) => TypeTag::Uint,
            Value::Int(_) => TypeTag::Int,
            Value::Char(_) => TypeTag::Char,
            Value::Ulong(_) => TypeTag::Ulong,
            Value::Long(_) => TypeTag::Long,
            Value::Timestamp(_) => TypeTag::Timestamp,
            Value::Float(_) => TypeTag::Float,
            Value::Double(_) => TypeTag::Double,
            Value::Decimal32(_) => TypeTag::Decimal32,
            Value::Decimal64(_) => TypeTag::Decimal64,
            Value::Decimal128(_) => TypeTag::Decimal128,
            Value::Uuid(_) => TypeTag::Uuid,
            Value::Binary(_) => TypeTag::Binary,
            Value::String(_) => TypeTag::String,
            Value::Symbol(_) => TypeTag::Symbol,
            Value::List(_) => TypeTag::List,
            Value::Map(_) => TypeTag::Map,
            Value::Array(_) => TypeTag::Array,
            Value::Described(_) => TypeTag::Described,
        }
    }

    /// Returns `true` for the composite variants a cursor can enter.
    pub fn is_composite(&self) -> bool {
        matches!(
            self,
            Value::List(_) | Value::Map(_) | Value::Array(_) | Value::Described(_)
        )
    }

    /// Returns `true` if this is `Value::Null`.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Wraps a described value.
    pub fn described(descriptor: Value, value: Value) -> Self {
        Value::Described(Box::new(Described::new(descriptor, value)))
    }

    /// Shorthand for a symbol value.
    pub fn symbol(s: impl Into<String>) -> Self {
        Value::Symbol(Symbol::new(s))
    }

    /// Shorthand for a string value.
    pub fn string(s: impl Into<String>) -> Self {
        Value::String(s.into())
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_owned())
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Uint(n)
    }
}

impl From<u64> for Value {
    fn from(n: u64) -> Self {
        Value::Ulong(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Long(n)
    }
}

impl From<Symbol> for Value {
    fn from(s: Symbol) -> Self {
        Value::Symbol(s)
    }
}

// ---------------------------------------------------------------------------
// TypeTag
// ---------------------------------------------------------------------------

/// The label of a [`Value`] variant, without the payload.
///
/// Used wherever a type must be named independently of a value: the
/// element type of an [`Array`], cursor inspection (`Data::type_tag`),
/// and error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeTag {
    /// The null type.
    Null,
    /// Boolean.
    Bool,
    /// Unsigned 8-bit integer.
    Ubyte,
    /// Signed 8-bit integer.
    Byte,
    /// Unsigned 16-bit integer.
    Ushort,
    /// Signed 16-bit integer.
    Short,
    /// Unsigned 32-bit integer.
    Uint,
    /// Signed 32-bit integer.
    Int,
    /// A Unicode code point.
    Char,
    /// Unsigned 64-bit integer.
    Ulong,
    /// Signed 64-bit integer.
    Long,
    /// Milliseconds since the epoch.
    Timestamp,
    /// IEEE single.
    Float,
    /// IEEE double.
    Double,
    /// decimal32.
    Decimal32,
    /// decimal64.
    Decimal64,
    /// decimal128.
    Decimal128,
    /// UUID.
    Uuid,
    /// Binary blob.
    Binary,
    /// UTF-8 string.
    String,
    /// Symbol.
    Symbol,
    /// List.
    List,
    /// Map.
    Map,
    /// Homogeneous array.
    Array,
    /// Described value.
    Described,
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TypeTag::Null => "null",
            TypeTag::Bool => "bool",
            TypeTag::Ubyte => "ubyte",
            TypeTag::Byte => "byte",
            TypeTag::Ushort => "ushort",
            TypeTag::Short => "short",
            TypeTag::Uint => "uint",
            TypeTag::Int => "int",
            TypeTag::Char => "char",
            TypeTag::Ulong => "ulong",
            TypeTag::Long => "long",
            TypeTag::Timestamp => "timestamp",
            TypeTag::Float => "float",
            TypeTag::Double => "double",
            TypeTag::Decimal32 => "decimal32",
            TypeTag::Decimal64 => "decimal64",
            TypeTag::Decimal128 => "decimal128",
            TypeTag::Uuid => "uuid",
            TypeTag::Binary => "binary",
            TypeTag::String => "string",
            TypeTag::Symbol => "symbol",
            TypeTag::List => "list",
            TypeTag::Map => "map",
            TypeTag::Array => "array",
            TypeTag::Described => "described",
        };
        f.write_str(name)
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_tag_matches_variant() {
        assert_eq!(Value::Null.tag(), TypeTag::Null);
        assert_eq!(Value::Bool(true).tag(), TypeTag::Bool);
        assert_eq!(Value::Ulong(7).tag(), TypeTag::Ulong);
        assert_eq!(Value::symbol("x").tag(), TypeTag::Symbol);
        assert_eq!(Value::List(vec![]).tag(), TypeTag::List);
        assert_eq!(
            Value::described(Value::Ulong(1), Value::Null).tag(),
            TypeTag::Described
        );
    }

    #[test]
    fn test_is_composite_only_for_container_variants() {
        assert!(Value::List(vec![]).is_composite());
        assert!(Value::Map(vec![]).is_composite());
        assert!(Value::Array(Array::new(TypeTag::Int)).is_composite());
        assert!(Value::described(Value::Ulong(0), Value::Null).is_composite());

        assert!(!Value::Null.is_composite());
        assert!(!Value::String("s".into()).is_composite());
        assert!(!Value::Binary(vec![1]).is_composite());
    }

    #[test]
    fn test_symbol_and_string_are_distinct_values() {
        // The whole point of the Symbol newtype: these must not compare equal
        // and must not carry the same tag.
        let sym = Value::symbol("abc");
        let s = Value::string("abc");
        assert_ne!(sym, s);
        assert_ne!(sym.tag(), s.tag());
    }

    #[test]
    fn test_uuid_display_standard_grouping() {
        let u = Uuid([
            0x12, 0x34, 0x56, 0x78, 0x9a, 0xbc, 0xde, 0xf0, 0x12, 0x34, 0x56,
            0x78, 0x9a, 0xbc, 0xde, 0xf0,
        ]);
        assert_eq!(u.to_string(), "12345678-9abc-def0-1234-56789abcdef0");
    }

    #[test]
    fn test_described_equality_is_structural() {
        let a = Described::new(Value::Ulong(16), Value::List(vec![Value::Null]));
        let b = Described::new(Value::Ulong(16), Value::List(vec![Value::Null]));
        let c = Described::new(Value::Ulong(17), Value::List(vec![Value::Null]));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_array_described_constructor_sets_shared_descriptor() {
        let arr = Array::described(Value::symbol("tag"), TypeTag::Int);
        assert_eq!(arr.element, TypeTag::Int);
        assert_eq!(arr.descriptor.as_deref(), Some(&Value::symbol("tag")));
        assert!(arr.is_empty());
    }

    #[test]
    fn test_type_tag_display_names() {
        assert_eq!(TypeTag::Ulong.to_string(), "ulong");
        assert_eq!(TypeTag::Described.to_string(), "described");
        assert_eq!(TypeTag::Decimal128.to_string(), "decimal128");
    }
}
