//! The AMQP 1.0 data codec for Oxamq.
//!
//! This crate is the lowest layer of the stack: it knows how to turn
//! AMQP values into bytes and back, and nothing else. The layers above
//! use it for everything that crosses the wire:
//!
//! - **Types** ([`Value`], [`TypeTag`], [`Symbol`], [`Described`],
//!   [`Array`], ...) — the self-describing AMQP type universe as one
//!   closed enum.
//! - **Encode/decode** ([`encode_value`], [`decode_value`]) — the
//!   binary encoding: constructor byte, then payload, values nesting
//!   recursively.
//! - **Cursor** ([`Data`]) — a builder/reader over a value tree with
//!   `put_*`/`get_*` and `enter`/`exit` navigation, for code that
//!   assembles or walks values incrementally.
//! - **Errors** ([`CodecError`]) — every way a byte sequence or a
//!   cursor operation can be malformed.
//!
//! # Architecture
//!
//! The codec is deliberately ignorant of frames, performatives, and
//! protocol state. It sees only values:
//!
//! ```text
//! Engine (endpoints) → Transport (frames) → Codec (values ↔ bytes)
//! ```
//!
//! Encoding always picks the smallest wire form for a value; decoding
//! accepts every legal form. With the `json` feature enabled, [`Value`]
//! also implements `serde::Serialize` for human-readable diagnostics
//! (the JSON mapping is lossy and one-way).

// ---------------------------------------------------------------------------
// Module declarations
// ---------------------------------------------------------------------------

mod data;
mod decode;
mod encode;
mod error;
#[cfg(feature = "json")]
mod json;
mod types;

// ---------------------------------------------------------------------------
// Re-exports
// ---------------------------------------------------------------------------

pub use data::Data;
pub use decode::decode_value;
pub use encode::{encode_to_vec, encode_value};
pub use error::CodecError;
pub use types::{Array, Described, Symbol, Timestamp, TypeTag, Uuid, Value};
