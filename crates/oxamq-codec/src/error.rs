//! Error type for the codec crate.
//!
//! Decode errors mean the bytes do not form a valid AMQP value and the
//! surrounding frame must be treated as malformed. Builder errors mean the
//! caller violated a composite's shape rules (they are programmer errors,
//! surfaced as `Result` rather than panics so a transport can turn them
//! into a clean teardown).

use crate::types::TypeTag;

/// Errors produced while encoding, decoding, or building AMQP values.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The buffer ended in the middle of an encoded value.
    #[error("truncated encoding: ran out of bytes")]
    Incomplete,

    /// A constructor byte with no meaning in AMQP 1.0.
    ///
    /// This is the codec's explicit "unmapped type" signal: decode fails
    /// rather than guessing.
    #[error("unknown constructor byte 0x{0:02x}")]
    UnknownConstructor(u8),

    /// A size prefix disagreed with the bytes actually consumed.
    #[error("size mismatch in composite: declared {declared}, consumed {consumed}")]
    SizeMismatch {
        /// The size the encoding claimed.
        declared: usize,
        /// What decoding the children actually consumed.
        consumed: usize,
    },

    /// A char encoding that is not a valid Unicode scalar value.
    #[error("invalid unicode code point 0x{0:08x}")]
    InvalidChar(u32),

    /// A string or symbol that is not valid UTF-8.
    #[error("invalid utf-8 in string value")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    /// A boolean payload byte other than 0x00 or 0x01.
    #[error("invalid boolean payload byte 0x{0:02x}")]
    InvalidBool(u8),

    /// A typed accessor was called on a value of a different type.
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        /// The type the accessor wanted.
        expected: TypeTag,
        /// The type actually present.
        found: TypeTag,
    },

    /// An array element whose type differs from the array's element type.
    #[error("heterogeneous array: element type {expected}, found {found}")]
    HeterogeneousArray {
        /// The array's declared element type.
        expected: TypeTag,
        /// The offending element's type.
        found: TypeTag,
    },

    /// A described element appeared inside an array body; the shared
    /// array descriptor is the only legal place for one.
    #[error("described element inside array body")]
    DescriptorInArray,

    /// A map was exited with an odd number of children.
    #[error("map exited with odd child count {0}")]
    OddMapEntries(usize),

    /// A described value was exited with other than exactly two children.
    #[error("described value exited with {0} children, requires 2")]
    IncompleteDescribed(usize),

    /// A described array was exited before its descriptor was put.
    #[error("described array exited without a descriptor")]
    MissingArrayDescriptor,

    /// A composite that cannot take another child received one.
    #[error("composite {tag} cannot take another child (has {count})")]
    TooManyChildren {
        /// The composite's type.
        tag: TypeTag,
        /// How many children it already holds.
        count: usize,
    },

    /// A `put_*` call on a cursor that has switched to read mode.
    #[error("builder operation on a data cursor in read mode")]
    BuildInReadMode,

    /// `encode()` was called with one or more composites still entered.
    #[error("encode called while still inside a composite")]
    UnexitedComposite,

    /// `enter()` was called on a non-composite value.
    #[error("cannot enter non-composite value of type {0}")]
    NotComposite(TypeTag),

    /// A cursor operation that needs a current value had none.
    #[error("no current value at cursor")]
    NoCurrentValue,

    /// `exit()` was called at the root level.
    #[error("exit called at root level")]
    AtRootLevel,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_strings() {
        let err = CodecError::UnknownConstructor(0x3f);
        assert_eq!(err.to_string(), "unknown constructor byte 0x3f");

        let err = CodecError::TypeMismatch {
            expected: TypeTag::Symbol,
            found: TypeTag::String,
        };
        assert_eq!(err.to_string(), "type mismatch: expected symbol, found string");
    }
}
