//! Security layers for the Oxamq protocol engine.
//!
//! Both layers here decorate the byte stream *underneath* the AMQP
//! frame transport and stay invisible to it: SASL negotiates first on
//! the shared stream under its own protocol header, SSL wraps the whole
//! stream in TLS. The transport treats a decorated stream identically
//! to an undecorated one.
//!
//! - [`Sasl`] is a complete sans-IO negotiation state machine with the
//!   same `input`/`output` contract as the frame transport.
//! - [`SslDomain`] / [`Ssl`] draw the TLS configuration boundary
//!   without pulling a TLS stack behind it; see the [`ssl`] module
//!   docs.

mod error;
pub mod sasl;
pub mod ssl;

pub use error::SecurityError;
pub use sasl::{Sasl, SaslOutcome, SASL_HEADER};
pub use ssl::{Ssl, SslDomain, SslMode, VerifyMode};
