//! The shared endpoint lifecycle: local and remote tri-state.
//!
//! Connections, sessions, and links are all "endpoints" in the same
//! sense: each has a local lifecycle the application drives and a remote
//! lifecycle mirrored from decoded peer frames. The two sides advance
//! independently, and only ever forward:
//!
//! ```text
//! Uninit ──open()──→ Active ──close()──→ Closed
//! ```
//!
//! An endpoint is fully shut only when *both* sides report `Closed`.
//! The six `state::*` bit flags combine one local and one remote state
//! into a mask for filtered traversal (`Connection::session_head` and
//! friends): `state::LOCAL_ACTIVE | state::REMOTE_UNINIT` matches
//! endpoints we've opened that the peer hasn't answered yet.

use std::fmt;

use oxamq_codec::{Symbol, Value};

/// One side's lifecycle state. Transitions are monotonic: once `Closed`,
/// an endpoint side never reports anything else again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EndpointState {
    /// Not yet opened.
    #[default]
    Uninit,
    /// Open and usable.
    Active,
    /// Closed; terminal.
    Closed,
}

/// Bit flags for endpoint-state masks, used by the filtered traversals.
pub mod state {
    /// Local side not yet opened.
    pub const LOCAL_UNINIT: u8 = 1;
    /// Local side open.
    pub const LOCAL_ACTIVE: u8 = 2;
    /// Local side closed.
    pub const LOCAL_CLOSED: u8 = 4;
    /// Remote side not yet opened.
    pub const REMOTE_UNINIT: u8 = 8;
    /// Remote side open.
    pub const REMOTE_ACTIVE: u8 = 16;
    /// Remote side closed.
    pub const REMOTE_CLOSED: u8 = 32;
}

/// An error condition attached to an endpoint close: a symbolic name,
/// an optional human-readable description, and a free-form info map.
/// Equality is structural.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Condition {
    /// The symbolic condition name (e.g. `amqp:internal-error`).
    pub name: Symbol,
    /// Optional human-readable detail.
    pub description: Option<String>,
    /// Extension data; `Value::Null` when absent.
    pub info: Value,
}

impl Condition {
    /// Creates a condition with a name and description and no info map.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: Symbol::new(name),
            description: Some(description.into()),
            info: Value::Null,
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.description {
            Some(d) => write!(f, "{}: {}", self.name, d),
            None => write!(f, "{}", self.name),
        }
    }
}

/// The local/remote state pair plus close conditions, embedded in every
/// Connection, Session, and Link.
#[derive(Debug, Default)]
pub struct Endpoint {
    local: EndpointState,
    remote: EndpointState,
    /// Condition the application attached to its own close, if any.
    pub condition: Option<Condition>,
    /// Condition the peer carried in its Close/End/Detach, if any.
    /// Written only by frame decoding.
    pub remote_condition: Option<Condition>,
}

impl Endpoint {
    /// The local side's state.
    pub fn local(&self) -> EndpointState {
        self.local
    }

    /// The remote side's state. Read-only: only decoded peer frames
    /// advance it.
    pub fn remote(&self) -> EndpointState {
        self.remote
    }

    /// Moves the local side to `Active`. No-op unless currently `Uninit`
    /// (states never move backward).
    pub fn open(&mut self) {
        if self.local == EndpointState::Uninit {
            self.local = EndpointState::Active;
        }
    }

    /// Moves the local side to `Closed`. Idempotent: closing a closed
    /// endpoint changes nothing.
    pub fn close(&mut self) {
        self.local = EndpointState::Closed;
    }

    /// Frame-decoding hook: the peer's open arrived.
    pub(crate) fn remote_open(&mut self) {
        if self.remote == EndpointState::Uninit {
            self.remote = EndpointState::Active;
        }
    }

    /// Frame-decoding hook: the peer's close arrived.
    pub(crate) fn remote_close(&mut self) {
        self.remote = EndpointState::Closed;
    }

    /// The combined local|remote bitmask (see [`state`]).
    pub fn state(&self) -> u8 {
        let local = match self.local {
            EndpointState::Uninit => state::LOCAL_UNINIT,
            EndpointState::Active => state::LOCAL_ACTIVE,
            EndpointState::Closed => state::LOCAL_CLOSED,
        };
        let remote = match self.remote {
            EndpointState::Uninit => state::REMOTE_UNINIT,
            EndpointState::Active => state::REMOTE_ACTIVE,
            EndpointState::Closed => state::REMOTE_CLOSED,
        };
        local | remote
    }

    /// Returns `true` if this endpoint's state matches `mask`: at least
    /// one local flag and one remote flag from the mask must hold.
    pub fn matches(&self, mask: u8) -> bool {
        let s = self.state();
        const LOCAL: u8 = state::LOCAL_UNINIT | state::LOCAL_ACTIVE | state::LOCAL_CLOSED;
        const REMOTE: u8 = state::REMOTE_UNINIT | state::REMOTE_ACTIVE | state::REMOTE_CLOSED;
        (s & mask & LOCAL) != 0 && (s & mask & REMOTE) != 0
    }
}

// =========================================================================
// Tests
// =========================================================================
