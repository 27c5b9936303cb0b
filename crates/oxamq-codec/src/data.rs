//! A navigable builder/reader cursor over AMQP value trees.
//!
//! [`Data`] offers the classic AMQP engine surface — `put_*` to build,
//! `next`/`prev`/`enter`/`exit` to walk, `get_*` to read, `encode`/
//! `decode` to cross the byte boundary — but it is implemented over an
//! explicit [`Value`] tree with indexed child access, not a flat buffer
//! with hidden position state. The cursor is just (stack of entered
//! composites, index within the current level); every invariant lives in
//! plain struct fields you can see in a debugger.
//!
//! A `Data` operates in one of two modes, never both at once:
//!
//! - **Build**: fresh instances start here. `put_*` appends at the
//!   cursor; `enter()` descends into the composite you just put;
//!   `exit()` validates the composite's shape (described = exactly two
//!   children, map = even count, array = homogeneous + descriptor
//!   present if promised).
//! - **Read**: `decode()` and `rewind()` switch here. `next`/`prev`
//!   move among siblings, `enter`/`exit` descend and ascend, `get_*`
//!   read the current value. Further `put_*` calls are rejected.
//!
//! ```
//! use oxamq_codec::{Data, TypeTag, Value};
//!
//! let mut data = Data::new();
//! data.put_map().unwrap();
//! data.enter().unwrap();
//! data.put_string("a").unwrap();
//! data.put_int(1).unwrap();
//! data.exit().unwrap();
//!
//! let bytes = data.encode().unwrap();
//!
//! let mut read = Data::new();
//! read.decode(&bytes).unwrap();
//! read.rewind();
//! assert_eq!(read.next(), Some(TypeTag::Map));
//! assert_eq!(read.get_object().unwrap(),
//!            Value::Map(vec![(Value::string("a"), Value::Int(1))]));
//! ```

use crate::decode::decode_value;
use crate::encode::encode_value;
use crate::error::CodecError;
use crate::types::{Array, Described, Symbol, Timestamp, TypeTag, Uuid, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Build,
    Read,
}

/// One entered composite: where it sits in its parent level, and how many
/// children have been appended since entering (build mode only).
#[derive(Debug, Clone, Copy)]
struct Frame {
    index: usize,
    added: usize,
}

/// The cursor. See the module docs for the full protocol.
#[derive(Debug)]
pub struct Data {
    roots: Vec<Value>,
    stack: Vec<Frame>,
    cursor: Option<usize>,
    mode: Mode,
}

impl Default for Data {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Child addressing over Value
//
// Children are addressed in "flattened" coordinates: a map's keys and
// values each count as one child (so a 3-entry map has 6 children), a
// described value always has 2, and a described array's descriptor is
// child 0 with elements following.
// ---------------------------------------------------------------------------

fn child_count(v: &Value) -> usize {
    match v {
        Value::List(items) => items.len(),
        Value::Map(pairs) => pairs.len() * 2,
        Value::Array(a) => usize::from(a.descriptor.is_some()) + a.elements.len(),
        Value::Described(_) => 2,
        _ => 0,
    }
}

fn child_at(v: &Value, i: usize) -> Option<&Value> {
    match v {
        Value::List(items) => items.get(i),
        Value::Map(pairs) => pairs.get(i / 2).map(|p| if i % 2 == 0 { &p.0 } else { &p.1 }),
        Value::Array(a) => match &a.descriptor {
            Some(d) if i == 0 => Some(d),
            Some(_) => a.elements.get(i - 1),
            None => a.elements.get(i),
        },
        Value::Described(d) => match i {
            0 => Some(&d.descriptor),
            1 => Some(&d.value),
            _ => None,
        },
        _ => None,
    }
}

fn child_at_mut(v: &mut Value, i: usize) -> Option<&mut Value> {
    match v {
        Value::List(items) => items.get_mut(i),
        Value::Map(pairs) => pairs
            .get_mut(i / 2)
            .map(|p| if i % 2 == 0 { &mut p.0 } else { &mut p.1 }),
        Value::Array(a) => match &mut a.descriptor {
            Some(d) if i == 0 => Some(d.as_mut()),
            Some(_) => a.elements.get_mut(i - 1),
            None => a.elements.get_mut(i),
        },
        Value::Described(d) => match i {
            0 => Some(&mut d.descriptor),
            1 => Some(&mut d.value),
            _ => None,
        },
        _ => None,
    }
}

// Append `value` as the `added`-th child of `node`.
fn append_child(node: &mut Value, added: usize, value: Value) -> Result<(), CodecError> {
    match node {
        Value::List(items) => items.push(value),
        Value::Map(pairs) => {
            if added % 2 == 0 {
                // A key opens a pair; the value slot is filled next.
                pairs.push((value, Value::Null));
            } else {
                // Guaranteed by the branch above: an odd `added` means a
                // pair was just opened.
                pairs.last_mut().expect("open pair").1 = value;
            }
        }
        Value::Described(d) => match added {
            0 => d.descriptor = value,
            1 => d.value = value,
            n => {
                return Err(CodecError::TooManyChildren {
                    tag: TypeTag::Described,
                    count: n,
                });
            }
        },
        Value::Array(a) => {
            if added == 0 && matches!(a.descriptor.as_deref(), Some(Value::Null)) {
                // A described array's first child is its descriptor.
                a.descriptor = Some(Box::new(value));
            } else {
                if value.tag() != a.element {
                    return Err(CodecError::HeterogeneousArray {
                        expected: a.element,
                        found: value.tag(),
                    });
                }
                a.elements.push(value);
            }
        }
        other => return Err(CodecError::NotComposite(other.tag())),
    }
    Ok(())
}

impl Data {
    /// Creates an empty cursor in build mode.
    pub fn new() -> Self {
        Self {
            roots: Vec::new(),
            stack: Vec::new(),
            cursor: None,
            mode: Mode::Build,
        }
    }

    /// Discards everything and returns to build mode.
    pub fn clear(&mut self) {
        self.roots.clear();
        self.stack.clear();
        self.cursor = None;
        self.mode = Mode::Build;
    }

    /// Moves the cursor to the very start and switches to read mode.
    pub fn rewind(&mut self) {
        self.stack.clear();
        self.cursor = None;
        self.mode = Mode::Read;
    }

    // -----------------------------------------------------------------
    // Level resolution
    // -----------------------------------------------------------------

    // The composite the cursor is inside, or None at root level.
    fn level_node(&self) -> Option<&Value> {
        let mut node: Option<&Value> = None;
        for frame in &self.stack {
            node = Some(match node {
                None => self.roots.get(frame.index)?,
                Some(parent) => child_at(parent, frame.index)?,
            });
        }
        node
    }

    fn level_node_mut(&mut self) -> Option<&mut Value> {
        let mut frames = self.stack.iter();
        let first = frames.next()?;
        let mut node = self.roots.get_mut(first.index)?;
        for frame in frames {
            node = child_at_mut(node, frame.index)?;
        }
        Some(node)
    }

    fn level_len(&self) -> usize {
        match self.level_node() {
            None => self.roots.len(),
            Some(node) => child_count(node),
        }
    }

    /// The value under the cursor, if any.
    pub fn current(&self) -> Option<&Value> {
        let i = self.cursor?;
        match self.level_node() {
            None => self.roots.get(i),
            Some(node) => child_at(node, i),
        }
    }

    // -----------------------------------------------------------------
    // Navigation
    // -----------------------------------------------------------------

    /// Advances to the next sibling. Returns its type tag, or `None` at
    /// the end of the level (the cursor does not move past the end).
    pub fn next(&mut self) -> Option<TypeTag> {
        let next = match self.cursor {
            None => 0,
            Some(i) => i + 1,
        };
        if next >= self.level_len() {
            return None;
        }
        self.cursor = Some(next);
        self.current().map(Value::tag)
    }

    /// Steps back to the previous sibling. Returns its type tag, or
    /// `None` after stepping before the first sibling.
    pub fn prev(&mut self) -> Option<TypeTag> {
        match self.cursor {
            None => None,
            Some(0) => {
                self.cursor = None;
                None
            }
            Some(i) => {
                self.cursor = Some(i - 1);
                self.current().map(Value::tag)
            }
        }
    }

    /// The type tag of the value under the cursor.
    pub fn type_tag(&self) -> Option<TypeTag> {
        self.current().map(Value::tag)
    }

    /// Descends into the composite under the cursor. In build mode this
    /// must be the composite just put, still empty.
    pub fn enter(&mut self) -> Result<(), CodecError> {
        let i = self.cursor.ok_or(CodecError::NoCurrentValue)?;
        let node = self.current().ok_or(CodecError::NoCurrentValue)?;
        if !node.is_composite() {
            return Err(CodecError::NotComposite(node.tag()));
        }
        let added = match self.mode {
            Mode::Build => 0,
            Mode::Read => child_count(node),
        };
        self.stack.push(Frame { index: i, added });
        self.cursor = None;
        Ok(())
    }

    /// Ascends to the parent level, leaving the cursor on the composite
    /// (so the following `next()` lands after it). In build mode this
    /// validates the composite's shape.
    pub fn exit(&mut self) -> Result<(), CodecError> {
        let frame = *self.stack.last().ok_or(CodecError::AtRootLevel)?;
        if self.mode == Mode::Build {
            // Resolve the composite being exited and check its shape.
            let node = self.level_node().ok_or(CodecError::AtRootLevel)?;
            match node {
                Value::Map(_) if frame.added % 2 != 0 => {
                    return Err(CodecError::OddMapEntries(frame.added));
                }
                Value::Described(_) if frame.added != 2 => {
                    return Err(CodecError::IncompleteDescribed(frame.added));
                }
                Value::Array(a)
                    if matches!(a.descriptor.as_deref(), Some(Value::Null))
                        && frame.added == 0 =>
                {
                    return Err(CodecError::MissingArrayDescriptor);
                }
                _ => {}
            }
        }
        self.stack.pop();
        self.cursor = Some(frame.index);
        Ok(())
    }

    // -----------------------------------------------------------------
    // Building
    // -----------------------------------------------------------------

    /// Appends a fully-formed value at the cursor. This is the generic
    /// entry point every typed `put_*` goes through; passing a composite
    /// `Value` puts the whole subtree in one call.
    pub fn put_object(&mut self, value: Value) -> Result<(), CodecError> {
        if self.mode == Mode::Read {
            return Err(CodecError::BuildInReadMode);
        }
        if self.stack.is_empty() {
            self.roots.push(value);
            self.cursor = Some(self.roots.len() - 1);
            return Ok(());
        }
        let frame = *self.stack.last().expect("non-empty stack");
        let node = self.level_node_mut().ok_or(CodecError::NoCurrentValue)?;
        append_child(node, frame.added, value)?;
        self.stack.last_mut().expect("non-empty stack").added += 1;
        self.cursor = Some(frame.added);
        Ok(())
    }

    /// Puts a null.
    pub fn put_null(&mut self) -> Result<(), CodecError> {
        self.put_object(Value::Null)
    }

    /// Puts a boolean.
    pub fn put_bool(&mut self, b: bool) -> Result<(), CodecError> {
        self.put_object(Value::Bool(b))
    }

    /// Puts an unsigned byte.
    pub fn put_ubyte(&mut self, n: u8) -> Result<(), CodecError> {
        self.put_object(Value::Ubyte(n))
    }

    /// Puts a signed byte.
    pub fn put_byte(&mut self, n: i8) -> Result<(), CodecError> {
        self.put_object(Value::Byte(n))
    }

    /// Puts an unsigned short.
    pub fn put_ushort(&mut self, n: u16) -> Result<(), CodecError> {
        self.put_object(Value::Ushort(n))
    }

    /// Puts a signed short.
    pub fn put_short(&mut self, n: i16) -> Result<(), CodecError> {
        self.put_object(Value::Short(n))
    }

    /// Puts an unsigned int.
    pub fn put_uint(&mut self, n: u32) -> Result<(), CodecError> {
        self.put_object(Value::Uint(n))
    }

    /// Puts a signed int.
    pub fn put_int(&mut self, n: i32) -> Result<(), CodecError> {
        self.put_object(Value::Int(n))
    }

    /// Puts a character.
    pub fn put_char(&mut self, c: char) -> Result<(), CodecError> {
        self.put_object(Value::Char(c))
    }

    /// Puts an unsigned long.
    pub fn put_ulong(&mut self, n: u64) -> Result<(), CodecError> {
        self.put_object(Value::Ulong(n))
    }

    /// Puts a signed long.
    pub fn put_long(&mut self, n: i64) -> Result<(), CodecError> {
        self.put_object(Value::Long(n))
    }

    /// Puts a timestamp (milliseconds since the epoch).
    pub fn put_timestamp(&mut self, millis: i64) -> Result<(), CodecError> {
        self.put_object(Value::Timestamp(Timestamp(millis)))
    }

    /// Puts a single-precision float.
    pub fn put_float(&mut self, x: f32) -> Result<(), CodecError> {
        self.put_object(Value::Float(x))
    }

    /// Puts a double-precision float.
    pub fn put_double(&mut self, x: f64) -> Result<(), CodecError> {
        self.put_object(Value::Double(x))
    }

    /// Puts a decimal32 by raw bits.
    pub fn put_decimal32(&mut self, bits: u32) -> Result<(), CodecError> {
        self.put_object(Value::Decimal32(bits))
    }

    /// Puts a decimal64 by raw bits.
    pub fn put_decimal64(&mut self, bits: u64) -> Result<(), CodecError> {
        self.put_object(Value::Decimal64(bits))
    }

    /// Puts a decimal128 by raw bytes.
    pub fn put_decimal128(&mut self, bytes: [u8; 16]) -> Result<(), CodecError> {
        self.put_object(Value::Decimal128(bytes))
    }

    /// Puts a UUID.
    pub fn put_uuid(&mut self, uuid: Uuid) -> Result<(), CodecError> {
        self.put_object(Value::Uuid(uuid))
    }

    /// Puts a binary blob.
    pub fn put_binary(&mut self, bytes: impl Into<Vec<u8>>) -> Result<(), CodecError> {
        self.put_object(Value::Binary(bytes.into()))
    }

    /// Puts a string.
    pub fn put_string(&mut self, s: impl Into<String>) -> Result<(), CodecError> {
        self.put_object(Value::String(s.into()))
    }

    /// Puts a symbol.
    pub fn put_symbol(&mut self, s: impl Into<String>) -> Result<(), CodecError> {
        self.put_object(Value::Symbol(Symbol::new(s)))
    }

    /// Opens an empty list; `enter()` to populate it.
    pub fn put_list(&mut self) -> Result<(), CodecError> {
        self.put_object(Value::List(Vec::new()))
    }

    /// Opens an empty map; `enter()` and put an even number of children
    /// (alternating key, value).
    pub fn put_map(&mut self) -> Result<(), CodecError> {
        self.put_object(Value::Map(Vec::new()))
    }

    /// Opens a described value; `enter()` and put exactly two children
    /// (descriptor, then value).
    pub fn put_described(&mut self) -> Result<(), CodecError> {
        self.put_object(Value::Described(Box::new(Described::new(
            Value::Null,
            Value::Null,
        ))))
    }

    /// Opens an array of `element` type; `enter()` to populate. If
    /// `described` is true the first child put is the shared descriptor.
    pub fn put_array(&mut self, described: bool, element: TypeTag) -> Result<(), CodecError> {
        let mut arr = Array::new(element);
        if described {
            // Placeholder descriptor; the first child put replaces it.
            arr.descriptor = Some(Box::new(Value::Null));
        }
        self.put_object(Value::Array(arr))
    }

    // -----------------------------------------------------------------
    // Reading
    // -----------------------------------------------------------------

    fn expect<'a, T>(
        &'a self,
        expected: TypeTag,
        pick: impl FnOnce(&'a Value) -> Option<T>,
    ) -> Result<T, CodecError> {
        let node = self.current().ok_or(CodecError::NoCurrentValue)?;
        pick(node).ok_or(CodecError::TypeMismatch {
            expected,
            found: node.tag(),
        })
    }

    /// Clones the value under the cursor — the generic counterpart of
    /// `put_object`; composites come back as whole subtrees.
    pub fn get_object(&self) -> Result<Value, CodecError> {
        self.current().cloned().ok_or(CodecError::NoCurrentValue)
    }

    /// Reads a boolean.
    pub fn get_bool(&self) -> Result<bool, CodecError> {
        self.expect(TypeTag::Bool, |v| match v {
            Value::Bool(b) => Some(*b),
            _ => None,
        })
    }

    /// Reads an unsigned byte.
    pub fn get_ubyte(&self) -> Result<u8, CodecError> {
        self.expect(TypeTag::Ubyte, |v| match v {
            Value::Ubyte(n) => Some(*n),
            _ => None,
        })
    }

    /// Reads a signed byte.
    pub fn get_byte(&self) -> Result<i8, CodecError> {
        self.expect(TypeTag::Byte, |v| match v {
            Value::Byte(n) => Some(*n),
            _ => None,
        })
    }

    /// Reads an unsigned short.
    pub fn get_ushort(&self) -> Result<u16, CodecError> {
        self.expect(TypeTag::Ushort, |v| match v {
            Value::Ushort(n) => Some(*n),
            _ => None,
        })
    }

    /// Reads a signed short.
    pub fn get_short(&self) -> Result<i16, CodecError> {
        self.expect(TypeTag::Short, |v| match v {
            Value::Short(n) => Some(*n),
            _ => None,
        })
    }

    /// Reads an unsigned int.
    pub fn get_uint(&self) -> Result<u32, CodecError> {
        self.expect(TypeTag::Uint, |v| match v {
            Value::Uint(n) => Some(*n),
            _ => None,
        })
    }

    /// Reads a signed int.
    pub fn get_int(&self) -> Result<i32, CodecError> {
        self.expect(TypeTag::Int, |v| match v {
            Value::Int(n) => Some(*n),
            _ => None,
        })
    }

    /// Reads a character.
    pub fn get_char(&self) -> Result<char, CodecError> {
        self.expect(TypeTag::Char, |v| match v {
            Value::Char(c) => Some(*c),
            _ => None,
        })
    }

    /// Reads an unsigned long.
    pub fn get_ulong(&self) -> Result<u64, CodecError> {
        self.expect(TypeTag::Ulong, |v| match v {
            Value::Ulong(n) => Some(*n),
            _ => None,
        })
    }

    /// Reads a signed long.
    pub fn get_long(&self) -> Result<i64, CodecError> {
        self.expect(TypeTag::Long, |v| match v {
            Value::Long(n) => Some(*n),
            _ => None,
        })
    }

    /// Reads a timestamp as milliseconds since the epoch.
    pub fn get_timestamp(&self) -> Result<i64, CodecError> {
        self.expect(TypeTag::Timestamp, |v| match v {
            Value::Timestamp(t) => Some(t.0),
            _ => None,
        })
    }

    /// Reads a single-precision float.
    pub fn get_float(&self) -> Result<f32, CodecError> {
        self.expect(TypeTag::Float, |v| match v {
            Value::Float(x) => Some(*x),
            _ => None,
        })
    }

    /// Reads a double-precision float.
    pub fn get_double(&self) -> Result<f64, CodecError> {
        self.expect(TypeTag::Double, |v| match v {
            Value::Double(x) => Some(*x),
            _ => None,
        })
    }

    /// Reads binary data.
    pub fn get_binary(&self) -> Result<Vec<u8>, CodecError> {
        self.expect(TypeTag::Binary, |v| match v {
            Value::Binary(b) => Some(b.clone()),
            _ => None,
        })
    }

    /// Reads a string.
    pub fn get_string(&self) -> Result<String, CodecError> {
        self.expect(TypeTag::String, |v| match v {
            Value::String(s) => Some(s.clone()),
            _ => None,
        })
    }

    /// Reads a symbol.
    pub fn get_symbol(&self) -> Result<Symbol, CodecError> {
        self.expect(TypeTag::Symbol, |v| match v {
            Value::Symbol(s) => Some(s.clone()),
            _ => None,
        })
    }

    /// Reads a UUID.
    pub fn get_uuid(&self) -> Result<Uuid, CodecError> {
        self.expect(TypeTag::Uuid, |v| match v {
            Value::Uuid(u) => Some(*u),
            _ => None,
        })
    }

    /// Returns the child count of the list under the cursor.
    pub fn get_list(&self) -> Result<usize, CodecError> {
        self.expect(TypeTag::List, |v| match v {
            Value::List(items) => Some(items.len()),
            _ => None,
        })
    }

    /// Returns the flattened child count (keys + values) of the map
    /// under the cursor.
    pub fn get_map(&self) -> Result<usize, CodecError> {
        self.expect(TypeTag::Map, |v| match v {
            Value::Map(pairs) => Some(pairs.len() * 2),
            _ => None,
        })
    }

    /// Returns (element count, is-described, element type) of the array
    /// under the cursor.
    pub fn get_array(&self) -> Result<(usize, bool, TypeTag), CodecError> {
        self.expect(TypeTag::Array, |v| match v {
            Value::Array(a) => Some((a.elements.len(), a.descriptor.is_some(), a.element)),
            _ => None,
        })
    }

    /// Returns `true` if the cursor is on a described value.
    pub fn is_described(&self) -> bool {
        matches!(self.current(), Some(Value::Described(_)))
    }

    /// Returns `true` if the cursor is on a null.
    pub fn is_null(&self) -> bool {
        matches!(self.current(), Some(Value::Null))
    }

    // -----------------------------------------------------------------
    // Byte boundary
    // -----------------------------------------------------------------

    /// Serializes every root value, in order, to AMQP binary.
    ///
    /// # Errors
    /// [`CodecError::UnexitedComposite`] if `exit()` calls are missing.
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        if !self.stack.is_empty() {
            return Err(CodecError::UnexitedComposite);
        }
        let mut out = Vec::new();
        for root in &self.roots {
            encode_value(root, &mut out)?;
        }
        Ok(out)
    }

    /// Parses one value from `bytes`, appends it as a new root, switches
    /// to read mode, and returns the bytes consumed.
    pub fn decode(&mut self, bytes: &[u8]) -> Result<usize, CodecError> {
        let (value, consumed) = decode_value(bytes)?;
        self.roots.push(value);
        self.stack.clear();
        self.mode = Mode::Read;
        Ok(consumed)
    }
}

// =========================================================================
// Tests
// =========================================================================
