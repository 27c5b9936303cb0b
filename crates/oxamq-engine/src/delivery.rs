//! Delivery: one message-transfer attempt and its settlement state.
//!
//! A delivery exists on exactly one link, identified by a tag unique
//! within that link's lifetime. Each side holds a disposition (the
//! outcome it has assigned, if any) and a settled flag; settlement is
//! one-way and irreversible. A delivery is reclaimed — removed from its
//! link and its handle invalidated — only once *both* sides have
//! settled.
//!
//! Applications never write the remote fields. They change only when
//! decoded peer frames arrive, and the edge-triggered `updated` flag
//! tells the application something remote changed since it last looked.

use std::fmt;

use crate::link::LinkHandle;

/// Index handle naming one delivery within its connection.
///
/// Handles are stable for the delivery's lifetime and go stale at
/// reclamation; using a stale handle is
/// [`EngineError::UnknownDelivery`](crate::EngineError::UnknownDelivery).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeliveryHandle(usize);

impl DeliveryHandle {
    /// Wraps a raw index.
    pub(crate) fn new(index: usize) -> Self {
        Self(index)
    }

    /// The raw index value.
    pub fn into_inner(self) -> usize {
        self.0
    }
}

impl fmt::Display for DeliveryHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "delivery#{}", self.0)
    }
}

/// A delivery outcome. `Received` is the one non-terminal disposition:
/// it reports partial progress and may still be replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Partial transfer progress; non-terminal.
    Received,
    /// The delivery was accepted.
    Accepted,
    /// The delivery was rejected as invalid.
    Rejected,
    /// The delivery was not and will not be acted on.
    Released,
    /// The delivery was modified but not processed.
    Modified,
}

impl Disposition {
    /// The descriptor code of the corresponding delivery-state type.
    pub fn code(self) -> u64 {
        match self {
            Disposition::Received => 0x23,
            Disposition::Accepted => 0x24,
            Disposition::Rejected => 0x25,
            Disposition::Released => 0x26,
            Disposition::Modified => 0x27,
        }
    }

    /// Maps a descriptor code back, if it names a delivery state.
    pub fn from_code(code: u64) -> Option<Self> {
        match code {
            0x23 => Some(Disposition::Received),
            0x24 => Some(Disposition::Accepted),
            0x25 => Some(Disposition::Rejected),
            0x26 => Some(Disposition::Released),
            0x27 => Some(Disposition::Modified),
            _ => None,
        }
    }

    /// Returns `true` for every disposition except `Received`.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Disposition::Received)
    }
}

impl fmt::Display for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Disposition::Received => "received",
            Disposition::Accepted => "accepted",
            Disposition::Rejected => "rejected",
            Disposition::Released => "released",
            Disposition::Modified => "modified",
        };
        f.write_str(name)
    }
}

/// One in-flight transfer attempt. Created by
/// [`Connection::delivery`](crate::Connection::delivery) on the sending
/// side or by an arriving Transfer frame on the receiving side.
#[derive(Debug)]
pub struct Delivery {
    pub(crate) link: LinkHandle,
    pub(crate) tag: Vec<u8>,
    pub(crate) local_state: Option<Disposition>,
    pub(crate) remote_state: Option<Disposition>,
    pub(crate) local_settled: bool,
    pub(crate) remote_settled: bool,
    /// Edge-triggered: remote state or settlement changed since last read.
    pub(crate) updated: bool,
    /// The peer (or local sender) has finished writing this delivery.
    pub(crate) done: bool,
    /// Transfer payload not yet read (receiver) or not yet emitted (sender).
    pub(crate) bytes: Vec<u8>,
    /// Wire delivery-id, assigned when the transfer crosses the transport.
    pub(crate) delivery_id: Option<u32>,
    pub(crate) work_queued: bool,
    pub(crate) disposition_dirty: bool,
}

impl Delivery {
    pub(crate) fn new(link: LinkHandle, tag: Vec<u8>) -> Self {
        Self {
            link,
            tag,
            local_state: None,
            remote_state: None,
            local_settled: false,
            remote_settled: false,
            updated: false,
            done: false,
            bytes: Vec::new(),
            delivery_id: None,
            work_queued: false,
            disposition_dirty: false,
        }
    }

    /// The link this delivery belongs to.
    pub fn link(&self) -> LinkHandle {
        self.link
    }

    /// The delivery tag, unique within the link's lifetime.
    pub fn tag(&self) -> &[u8] {
        &self.tag
    }

    /// The disposition this side has assigned, if any.
    pub fn local_state(&self) -> Option<Disposition> {
        self.local_state
    }

    /// The disposition the peer has assigned, if any. Read-only: only
    /// decoded frames change it.
    pub fn remote_state(&self) -> Option<Disposition> {
        self.remote_state
    }

    /// Whether this side has settled. Monotonic.
    pub fn settled(&self) -> bool {
        self.local_settled
    }

    /// Whether the peer has settled. Monotonic.
    pub fn remote_settled(&self) -> bool {
        self.remote_settled
    }

    /// The wire delivery-id, once the delivery has crossed the wire in
    /// either direction.
    pub fn delivery_id(&self) -> Option<u32> {
        self.delivery_id
    }

    /// Readable: a receiver-side delivery with buffered or finished
    /// payload, positioned for `recv`.
    pub fn readable(&self) -> bool {
        !self.bytes.is_empty() || self.done
    }

    /// Writable: a sender-side delivery not yet completed by `advance`.
    pub fn writable(&self) -> bool {
        !self.done
    }

    /// Whether the whole payload has arrived (receiver) or been
    /// completed (sender).
    pub fn complete(&self) -> bool {
        self.done
    }

    /// Bytes currently buffered and unread.
    pub fn pending(&self) -> usize {
        self.bytes.len()
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disposition_code_roundtrip() {
        for d in [
            Disposition::Received,
            Disposition::Accepted,
            Disposition::Rejected,
            Disposition::Released,
            Disposition::Modified,
        ] {
            assert_eq!(Disposition::from_code(d.code()), Some(d));
        }
        assert_eq!(Disposition::from_code(0x10), None);
    }

    #[test]
    fn test_only_received_is_non_terminal() {
        assert!(!Disposition::Received.is_terminal());
        assert!(Disposition::Accepted.is_terminal());
        assert!(Disposition::Rejected.is_terminal());
        assert!(Disposition::Released.is_terminal());
        assert!(Disposition::Modified.is_terminal());
    }

    #[test]
    fn test_new_delivery_is_writable_not_readable() {
        let d = Delivery::new(LinkHandle::new(0), b"t-0".to_vec());
        assert!(d.writable());
        assert!(!d.readable());
        assert!(!d.settled());
        assert_eq!(d.local_state(), None);
        assert_eq!(d.tag(), b"t-0");
    }
}
