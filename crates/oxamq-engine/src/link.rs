//! Link: a named, directional transfer channel within a session.
//!
//! A link is either a sender or a receiver for its whole lifetime. It
//! owns the credit balance that rations transfers, the ordered set of
//! live deliveries, and the "current delivery" pointer that `send`,
//! `recv`, and `advance` operate on. The delivery-moving operations live
//! on [`Connection`](crate::Connection) because they touch the shared
//! delivery arena and work queue; this module is the link's own state.

use std::collections::VecDeque;
use std::fmt;

use crate::delivery::DeliveryHandle;
use crate::endpoint::Endpoint;
use crate::session::SessionHandle;
use crate::terminus::Terminus;

/// Index handle naming one link within its connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LinkHandle(usize);

impl LinkHandle {
    pub(crate) fn new(index: usize) -> Self {
        Self(index)
    }

    /// The raw index value.
    pub fn into_inner(self) -> usize {
        self.0
    }
}

impl fmt::Display for LinkHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "link#{}", self.0)
    }
}

/// The two link roles. A link is one or the other, never both.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Transfers deliveries to the peer, rationed by credit.
    Sender,
    /// Grants credit and receives deliveries.
    Receiver,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Role::Sender => "sender",
            Role::Receiver => "receiver",
        })
    }
}

/// One directional transfer channel. Create with
/// [`Connection::sender`](crate::Connection::sender) or
/// [`Connection::receiver`](crate::Connection::receiver).
#[derive(Debug)]
pub struct Link {
    pub(crate) endpoint: Endpoint,
    pub(crate) name: String,
    pub(crate) session: SessionHandle,
    pub(crate) role: Role,
    /// Where deliveries on this link come from.
    pub source: Terminus,
    /// Where deliveries on this link go.
    pub target: Terminus,
    /// The peer's advertised source, once its Attach arrives.
    pub(crate) remote_source: Option<Terminus>,
    /// The peer's advertised target, once its Attach arrives.
    pub(crate) remote_target: Option<Terminus>,

    /// Sender: transfers still permitted. Receiver: credit granted and
    /// not yet consumed by arriving transfers. Never negative by type.
    pub(crate) credit: u32,
    /// Transfers completed over this link's lifetime (the AMQP
    /// delivery-count sequence, modulo wrap).
    pub(crate) delivery_count: u32,
    /// Completed deliveries awaiting the peer (sender: queued for
    /// transfer; receiver: arrived and unread).
    pub(crate) queued: u32,
    /// A drain cycle is in progress.
    pub(crate) drain: bool,
    /// A Flow frame should be emitted for this link.
    pub(crate) flow_pending: bool,

    /// Live deliveries in creation/arrival order.
    pub(crate) deliveries: VecDeque<DeliveryHandle>,
    /// The delivery `send`/`recv` operate on.
    pub(crate) current: Option<DeliveryHandle>,
    /// Sender side: advanced deliveries not yet emitted as Transfers.
    pub(crate) tx_queue: VecDeque<DeliveryHandle>,
}

impl Link {
    pub(crate) fn new(session: SessionHandle, name: String, role: Role) -> Self {
        Self {
            endpoint: Endpoint::default(),
            name,
            session,
            role,
            source: Terminus::default(),
            target: Terminus::default(),
            remote_source: None,
            remote_target: None,
            credit: 0,
            delivery_count: 0,
            queued: 0,
            drain: false,
            flow_pending: false,
            deliveries: VecDeque::new(),
            current: None,
            tx_queue: VecDeque::new(),
        }
    }

    /// The link name negotiated on Attach.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The session this link lives in.
    pub fn session(&self) -> SessionHandle {
        self.session
    }

    /// Sender or receiver.
    pub fn role(&self) -> Role {
        self.role
    }

    /// The local/remote lifecycle state.
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Opens the link locally (emits Attach on the next output).
    pub fn open(&mut self) {
        self.endpoint.open();
    }

    /// Closes the link locally (emits Detach on the next output).
    /// Idempotent.
    pub fn close(&mut self) {
        self.endpoint.close();
    }

    /// Current credit balance (see the field docs for the per-role
    /// meaning).
    pub fn credit(&self) -> u32 {
        self.credit
    }

    /// Completed-transfer count over the link's lifetime.
    pub fn delivery_count(&self) -> u32 {
        self.delivery_count
    }

    /// Completed deliveries awaiting the peer or the application.
    pub fn queued(&self) -> u32 {
        self.queued
    }

    /// Whether a drain cycle is in progress.
    pub fn draining(&self) -> bool {
        self.drain
    }

    /// The peer's source terminus, once its Attach has arrived.
    pub fn remote_source(&self) -> Option<&Terminus> {
        self.remote_source.as_ref()
    }

    /// The peer's target terminus, once its Attach has arrived.
    pub fn remote_target(&self) -> Option<&Terminus> {
        self.remote_target.as_ref()
    }

    /// Deliveries not yet reclaimed (reclamation requires both sides
    /// settled), the link's leak hazard if settlement is neglected.
    pub fn unsettled(&self) -> usize {
        self.deliveries.len()
    }
}

// =========================================================================
// Tests
// =========================================================================
