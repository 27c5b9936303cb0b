//! # Oxamq
//!
//! A sans-IO AMQP 1.0 protocol engine.
//!
//! Oxamq implements the AMQP 1.0 endpoint model — connections,
//! sessions, links, deliveries — as a pure state machine that never
//! touches a socket. The application owns the I/O loop: it reads bytes
//! from wherever they come from and feeds them to [`Transport::input`],
//! drains [`Transport::output`] to wherever they go, and in between
//! drives the [`Connection`] through ordinary method calls.
//!
//! ## Quick start
//!
//! ```rust
//! use oxamq::prelude::*;
//!
//! let mut transport = Transport::new();
//! let mut connection = Connection::new("my-container");
//! connection.open();
//! transport.bind(connection)?;
//!
//! // Pump transport.output(..) to the peer and feed peer bytes to
//! // transport.input(..); everything else is method calls on
//! // transport.connection_mut().
//! # Ok::<(), oxamq::OxamqError>(())
//! ```
//!
//! The layers stack bottom-up and each is usable on its own:
//!
//! - [`oxamq_codec`] — the AMQP type system and its wire codec;
//! - [`oxamq_engine`] — the endpoint state machines and credit flow;
//! - [`oxamq_transport`] — framing, with the `input`/`output` contract;
//! - [`oxamq_security`] — the SASL/SSL layer boundary.

mod error;
mod message;
mod tracker;

pub use error::OxamqError;
pub use message::Message;
pub use tracker::{Tracker, TrackerRegistry};

pub use oxamq_codec as codec;
pub use oxamq_engine as engine;
pub use oxamq_security as security;
pub use oxamq_transport as transport;

/// The types nearly every embedder needs.
pub mod prelude {
    pub use crate::{Message, OxamqError, Tracker, TrackerRegistry};
    pub use oxamq_codec::Value;
    pub use oxamq_engine::{
        Condition, Connection, DeliveryHandle, Disposition, EndpointState, LinkHandle, Role,
        SessionHandle,
    };
    pub use oxamq_security::{Sasl, SaslOutcome};
    pub use oxamq_transport::{Transport, TransportConfig};
}
