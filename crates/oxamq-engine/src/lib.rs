//! The AMQP 1.0 endpoint state machine for Oxamq.
//!
//! This crate models the protocol's entities and their lifecycle —
//! everything an AMQP client or broker tracks *between* frames:
//!
//! - **Endpoints** ([`Endpoint`], [`EndpointState`], [`Condition`]) —
//!   the shared local/remote tri-state lifecycle and close conditions.
//! - **Connection** ([`Connection`]) — the top-level endpoint; owns all
//!   sessions, links, and deliveries, plus the work queue of deliveries
//!   needing attention.
//! - **Session** ([`Session`]) — channel multiplexing and transfer
//!   windows.
//! - **Link** ([`Link`], [`Role`], [`Terminus`]) — named directional
//!   transfer channels with credit-based flow control.
//! - **Delivery** ([`Delivery`], [`Disposition`]) — per-transfer
//!   disposition and settlement.
//! - **Errors** ([`EngineError`]) — credit exhaustion, illegal
//!   transitions, stale handles.
//!
//! # Architecture
//!
//! The engine owns protocol *state*, not bytes. It has no notion of
//! frames or sockets; a transport applies decoded peer frames through
//! the `on_remote_*` hooks and drains pending local changes through the
//! emission hooks:
//!
//! ```text
//! Application ──open/send/flow/settle──→ Engine ←──on_remote_* ── Transport
//! ```
//!
//! Everything is single-threaded cooperative: no locks, no blocking,
//! every call a synchronous state edit.

// ---------------------------------------------------------------------------
// Module declarations
// ---------------------------------------------------------------------------

mod connection;
mod delivery;
pub mod endpoint;
mod error;
mod link;
mod session;
mod terminus;

// ---------------------------------------------------------------------------
// Re-exports
// ---------------------------------------------------------------------------

pub use connection::Connection;
pub use delivery::{Delivery, DeliveryHandle, Disposition};
pub use endpoint::{Condition, Endpoint, EndpointState};
pub use error::EngineError;
pub use link::{Link, LinkHandle, Role};
pub use session::{Session, SessionHandle};
pub use terminus::{Durability, ExpiryPolicy, Terminus};
