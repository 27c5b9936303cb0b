//! Error types for the engine layer.

use thiserror::Error;

use crate::delivery::{DeliveryHandle, Disposition};
use crate::link::{LinkHandle, Role};
use crate::session::SessionHandle;

/// Everything that can go wrong mutating engine state.
///
/// These are all synchronous, caller-facing errors: the engine never
/// defers a failure. Stale-handle and wrong-role variants are programmer
/// errors; the credit and disposition variants are the protocol's own
/// rules pushing back.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    /// A session handle that does not name a live session.
    #[error("unknown session: {0}")]
    UnknownSession(SessionHandle),

    /// A link handle that does not name a live link.
    #[error("unknown link: {0}")]
    UnknownLink(LinkHandle),

    /// A delivery handle that does not name a live delivery. Handles go
    /// stale once a delivery is reclaimed (both sides settled).
    #[error("unknown delivery: {0}")]
    UnknownDelivery(DeliveryHandle),

    /// A sender-only operation on a receiver, or vice versa.
    #[error("operation requires a {expected} link")]
    WrongRole {
        /// The role the operation is defined for.
        expected: Role,
    },

    /// `send` or `advance` on a sender with zero credit. The peer must
    /// grant more credit before another transfer may begin.
    #[error("link credit exhausted")]
    InsufficientCredit,

    /// `send`, `recv`, or `advance` with no current delivery on the link.
    #[error("no current delivery on link")]
    NoCurrentDelivery,

    /// `update` on a delivery whose local disposition is already
    /// terminal. Only unset and `received` dispositions may change.
    #[error("delivery disposition already terminal: {state}")]
    DispositionTerminal {
        /// The terminal disposition already in place.
        state: Disposition,
    },
}
