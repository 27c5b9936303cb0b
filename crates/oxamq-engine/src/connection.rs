//! The connection: top-level endpoint and owner of all engine state.
//!
//! One `Connection` owns every session, link, and delivery beneath it,
//! stored in arenas and named by index handles ([`SessionHandle`],
//! [`LinkHandle`], [`DeliveryHandle`]). There are no back-pointers or
//! intrusive chains: the "work queue" of deliveries needing attention is
//! a plain `VecDeque` the connection owns, and traversal runs over the
//! arenas in insertion order, filtered by endpoint-state mask.
//!
//! # Who calls what
//!
//! Applications drive the *local* side: `open`, `session`, `sender`,
//! `delivery`, `send`, `flow`, `update`, `settle`. The *remote* side
//! moves only when a transport applies decoded peer frames through the
//! `on_remote_*` hooks; applications read it, never write it.
//!
//! # Concurrency
//!
//! Not thread-safe, on purpose: the engine is single-threaded
//! cooperative. Every mutation is a synchronous local state edit, made
//! visible to the peer on the transport's next output pass. Callers that
//! need sharing wrap the whole connection at a higher level.

use std::collections::VecDeque;

use crate::delivery::{Delivery, DeliveryHandle, Disposition};
use crate::endpoint::{Condition, Endpoint};
use crate::error::EngineError;
use crate::link::{Link, LinkHandle, Role};
use crate::session::{Session, SessionHandle};
use crate::terminus::Terminus;

/// The top-level endpoint. See the module docs for the ownership story.
#[derive(Debug)]
pub struct Connection {
    endpoint: Endpoint,
    container: String,
    hostname: Option<String>,
    remote_container: Option<String>,
    remote_hostname: Option<String>,

    sessions: Vec<Session>,
    links: Vec<Link>,
    /// Delivery arena; `None` slots are reclaimed deliveries awaiting
    /// reuse.
    deliveries: Vec<Option<Delivery>>,

    /// Deliveries needing application attention, newest ready first.
    work: VecDeque<DeliveryHandle>,
    /// Deliveries whose local disposition/settlement must be conveyed.
    dispositions: VecDeque<DeliveryHandle>,
}

impl Connection {
    /// Creates a closed, empty connection with the given container-id.
    pub fn new(container: impl Into<String>) -> Self {
        Self {
            endpoint: Endpoint::default(),
            container: container.into(),
            hostname: None,
            remote_container: None,
            remote_hostname: None,
            sessions: Vec::new(),
            links: Vec::new(),
            deliveries: Vec::new(),
            work: VecDeque::new(),
            dispositions: VecDeque::new(),
        }
    }

    // -----------------------------------------------------------------
    // Connection endpoint
    // -----------------------------------------------------------------

    /// The container-id sent in Open.
    pub fn container(&self) -> &str {
        &self.container
    }

    /// Sets the hostname sent in Open.
    pub fn set_hostname(&mut self, hostname: impl Into<String>) {
        self.hostname = Some(hostname.into());
    }

    /// The hostname sent in Open, if set.
    pub fn hostname(&self) -> Option<&str> {
        self.hostname.as_deref()
    }

    /// The peer's container-id, once its Open has arrived.
    pub fn remote_container(&self) -> Option<&str> {
        self.remote_container.as_deref()
    }

    /// The peer's hostname, once its Open has arrived.
    pub fn remote_hostname(&self) -> Option<&str> {
        self.remote_hostname.as_deref()
    }

    /// The connection's local/remote lifecycle state.
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Combined endpoint state bitmask (see
    /// [`state`](crate::endpoint::state)).
    pub fn state(&self) -> u8 {
        self.endpoint.state()
    }

    /// Opens the connection locally.
    pub fn open(&mut self) {
        self.endpoint.open();
        tracing::debug!(container = %self.container, "connection opened locally");
    }

    /// Closes the connection locally. Idempotent. Deliveries left
    /// unsettled are not settled for you; they stay visible through
    /// their links until reconciled.
    pub fn close(&mut self) {
        self.endpoint.close();
        tracing::debug!(container = %self.container, "connection closed locally");
    }

    /// Closes the connection locally with an error condition that the
    /// Close frame will carry.
    pub fn close_with(&mut self, condition: Condition) {
        self.endpoint.condition = Some(condition);
        self.close();
    }

    // -----------------------------------------------------------------
    // Sessions
    // -----------------------------------------------------------------

    /// Creates a new session (still locally uninitialized; call
    /// [`Session::open`] through [`session_mut`](Self::session_mut)).
    pub fn session(&mut self) -> SessionHandle {
        self.sessions.push(Session::new());
        let handle = SessionHandle::new(self.sessions.len() - 1);
        tracing::debug!(%handle, "session created");
        handle
    }

    /// Borrows a session.
    pub fn session_ref(&self, handle: SessionHandle) -> Result<&Session, EngineError> {
        self.sessions
            .get(handle.into_inner())
            .ok_or(EngineError::UnknownSession(handle))
    }

    /// Mutably borrows a session.
    pub fn session_mut(&mut self, handle: SessionHandle) -> Result<&mut Session, EngineError> {
        self.sessions
            .get_mut(handle.into_inner())
            .ok_or(EngineError::UnknownSession(handle))
    }

    /// First session whose endpoint state matches `mask`, in creation
    /// order.
    pub fn session_head(&self, mask: u8) -> Option<SessionHandle> {
        self.session_from(0, mask)
    }

    /// Next matching session after `handle`, in creation order.
    pub fn session_next(&self, handle: SessionHandle, mask: u8) -> Option<SessionHandle> {
        self.session_from(handle.into_inner() + 1, mask)
    }

    fn session_from(&self, start: usize, mask: u8) -> Option<SessionHandle> {
        self.sessions
            .iter()
            .enumerate()
            .skip(start)
            .find(|(_, s)| s.endpoint.matches(mask))
            .map(|(i, _)| SessionHandle::new(i))
    }

    // -----------------------------------------------------------------
    // Links
    // -----------------------------------------------------------------

    /// Creates a sender link named `name` on `session`.
    pub fn sender(
        &mut self,
        session: SessionHandle,
        name: impl Into<String>,
    ) -> Result<LinkHandle, EngineError> {
        self.new_link(session, name.into(), Role::Sender)
    }

    /// Creates a receiver link named `name` on `session`.
    pub fn receiver(
        &mut self,
        session: SessionHandle,
        name: impl Into<String>,
    ) -> Result<LinkHandle, EngineError> {
        self.new_link(session, name.into(), Role::Receiver)
    }

    fn new_link(
        &mut self,
        session: SessionHandle,
        name: String,
        role: Role,
    ) -> Result<LinkHandle, EngineError> {
        self.session_ref(session)?;
        self.links.push(Link::new(session, name, role));
        let handle = LinkHandle::new(self.links.len() - 1);
        tracing::debug!(%handle, %session, role = %self.links[handle.into_inner()].role, "link created");
        Ok(handle)
    }

    /// Borrows a link.
    pub fn link_ref(&self, handle: LinkHandle) -> Result<&Link, EngineError> {
        self.links
            .get(handle.into_inner())
            .ok_or(EngineError::UnknownLink(handle))
    }

    /// Mutably borrows a link.
    pub fn link_mut(&mut self, handle: LinkHandle) -> Result<&mut Link, EngineError> {
        self.links
            .get_mut(handle.into_inner())
            .ok_or(EngineError::UnknownLink(handle))
    }

    /// First link whose endpoint state matches `mask`, in creation
    /// order (across all sessions).
    pub fn link_head(&self, mask: u8) -> Option<LinkHandle> {
        self.link_from(0, mask)
    }

    /// Next matching link after `handle`, in creation order.
    pub fn link_next(&self, handle: LinkHandle, mask: u8) -> Option<LinkHandle> {
        self.link_from(handle.into_inner() + 1, mask)
    }

    fn link_from(&self, start: usize, mask: u8) -> Option<LinkHandle> {
        self.links
            .iter()
            .enumerate()
            .skip(start)
            .find(|(_, l)| l.endpoint.matches(mask))
            .map(|(i, _)| LinkHandle::new(i))
    }

    // -----------------------------------------------------------------
    // Deliveries and transfer
    // -----------------------------------------------------------------

    /// Creates a delivery tagged `tag` on `link` and makes it current if
    /// the link has no current delivery.
    pub fn delivery(
        &mut self,
        link: LinkHandle,
        tag: impl Into<Vec<u8>>,
    ) -> Result<DeliveryHandle, EngineError> {
        self.link_ref(link)?;
        let delivery = Delivery::new(link, tag.into());

        // Reuse a reclaimed arena slot when one exists.
        let index = match self.deliveries.iter().position(Option::is_none) {
            Some(i) => {
                self.deliveries[i] = Some(delivery);
                i
            }
            None => {
                self.deliveries.push(Some(delivery));
                self.deliveries.len() - 1
            }
        };
        let handle = DeliveryHandle::new(index);

        let l = &mut self.links[link.into_inner()];
        l.deliveries.push_back(handle);
        if l.current.is_none() {
            l.current = Some(handle);
        }
        tracing::trace!(%link, %handle, "delivery created");
        Ok(handle)
    }

    /// Borrows a delivery.
    pub fn delivery_ref(&self, handle: DeliveryHandle) -> Result<&Delivery, EngineError> {
        self.deliveries
            .get(handle.into_inner())
            .and_then(Option::as_ref)
            .ok_or(EngineError::UnknownDelivery(handle))
    }

    fn delivery_mut(&mut self, handle: DeliveryHandle) -> Result<&mut Delivery, EngineError> {
        self.deliveries
            .get_mut(handle.into_inner())
            .and_then(Option::as_mut)
            .ok_or(EngineError::UnknownDelivery(handle))
    }

    /// The delivery `send`/`recv`/`advance` operate on, if any.
    pub fn current(&self, link: LinkHandle) -> Result<Option<DeliveryHandle>, EngineError> {
        Ok(self.link_ref(link)?.current)
    }

    /// Appends `bytes` to the current delivery's transfer buffer.
    ///
    /// # Errors
    /// - [`EngineError::WrongRole`] on a receiver
    /// - [`EngineError::NoCurrentDelivery`] with nothing to write to
    /// - [`EngineError::InsufficientCredit`] when the peer has granted
    ///   no credit — transfers must never outrun credit, so this fails
    ///   instead of buffering indefinitely
    pub fn send(&mut self, link: LinkHandle, bytes: &[u8]) -> Result<usize, EngineError> {
        let l = self.link_ref(link)?;
        if l.role != Role::Sender {
            return Err(EngineError::WrongRole {
                expected: Role::Sender,
            });
        }
        if l.credit == 0 {
            return Err(EngineError::InsufficientCredit);
        }
        let current = l.current.ok_or(EngineError::NoCurrentDelivery)?;
        let d = self.delivery_mut(current)?;
        d.bytes.extend_from_slice(bytes);
        tracing::trace!(%link, %current, n = bytes.len(), "bytes staged for transfer");
        Ok(bytes.len())
    }

    /// Reads up to `max` bytes from the current delivery's buffer.
    /// Returns `Ok(None)` once the peer has finished the transfer and
    /// the buffer is drained (end of stream), and `Ok(Some(empty))`
    /// when more payload is still expected but none has arrived.
    pub fn recv(
        &mut self,
        link: LinkHandle,
        max: usize,
    ) -> Result<Option<Vec<u8>>, EngineError> {
        let l = self.link_ref(link)?;
        if l.role != Role::Receiver {
            return Err(EngineError::WrongRole {
                expected: Role::Receiver,
            });
        }
        let current = l.current.ok_or(EngineError::NoCurrentDelivery)?;
        let d = self.delivery_mut(current)?;
        if d.bytes.is_empty() {
            return if d.done { Ok(None) } else { Ok(Some(Vec::new())) };
        }
        let n = max.min(d.bytes.len());
        let chunk = d.bytes.drain(..n).collect();
        Ok(Some(chunk))
    }

    /// Completes the current delivery and moves the current pointer to
    /// the next delivery on the link. On a sender this consumes one
    /// credit and queues the delivery for transfer on the next output
    /// pass. Returns `false` if there was no current delivery.
    pub fn advance(&mut self, link: LinkHandle) -> Result<bool, EngineError> {
        let l = self.link_ref(link)?;
        let Some(current) = l.current else {
            return Ok(false);
        };
        if l.role == Role::Sender {
            if l.credit == 0 {
                return Err(EngineError::InsufficientCredit);
            }
            let d = self.delivery_mut(current)?;
            d.done = true;
            let l = &mut self.links[link.into_inner()];
            l.credit -= 1;
            l.delivery_count = l.delivery_count.wrapping_add(1);
            l.queued += 1;
            l.tx_queue.push_back(current);
            tracing::debug!(%link, %current, credit = l.credit, "delivery advanced for transfer");
        } else {
            let l = &mut self.links[link.into_inner()];
            l.queued = l.queued.saturating_sub(1);
        }
        self.move_current_past(link, current);
        Ok(true)
    }

    // Repositions `link.current` to the delivery after `past` in the
    // link's delivery order, or clears it.
    fn move_current_past(&mut self, link: LinkHandle, past: DeliveryHandle) {
        let l = &mut self.links[link.into_inner()];
        let next = l
            .deliveries
            .iter()
            .skip_while(|&&h| h != past)
            .nth(1)
            .copied();
        l.current = next;
    }

    // -----------------------------------------------------------------
    // Flow control
    // -----------------------------------------------------------------

    /// Grants the peer `n` more credits (receiver only). Conveyed in a
    /// Flow frame on the next output pass.
    pub fn flow(&mut self, link: LinkHandle, n: u32) -> Result<(), EngineError> {
        let l = self.link_mut(link)?;
        if l.role != Role::Receiver {
            return Err(EngineError::WrongRole {
                expected: Role::Receiver,
            });
        }
        l.credit += n;
        l.flow_pending = true;
        tracing::debug!(%link, granted = n, credit = l.credit, "credit granted");
        Ok(())
    }

    /// Grants `n` credits and asks the peer to flush them immediately,
    /// converting whatever it cannot use into an explicit zero (drain
    /// cycle).
    pub fn drain(&mut self, link: LinkHandle, n: u32) -> Result<(), EngineError> {
        let l = self.link_mut(link)?;
        if l.role != Role::Receiver {
            return Err(EngineError::WrongRole {
                expected: Role::Receiver,
            });
        }
        l.credit += n;
        l.drain = true;
        l.flow_pending = true;
        tracing::debug!(%link, granted = n, "drain requested");
        Ok(())
    }

    /// Ends a drain cycle on a sender: gives back all remaining credit
    /// by advancing the delivery count, so the peer sees its drain
    /// satisfied. Returns the number of credits surrendered.
    pub fn drained(&mut self, link: LinkHandle) -> Result<u32, EngineError> {
        let l = self.link_mut(link)?;
        if l.role != Role::Sender {
            return Err(EngineError::WrongRole {
                expected: Role::Sender,
            });
        }
        if !l.drain {
            return Ok(0);
        }
        let surrendered = l.credit;
        l.delivery_count = l.delivery_count.wrapping_add(surrendered);
        l.credit = 0;
        l.drain = false;
        l.flow_pending = true;
        tracing::debug!(%link, surrendered, "drain cycle ended");
        Ok(surrendered)
    }

    // -----------------------------------------------------------------
    // Disposition and settlement
    // -----------------------------------------------------------------

    /// Sets the local disposition of a delivery. Legal from unset or
    /// from `Received`; terminal dispositions cannot be replaced.
    pub fn update(
        &mut self,
        handle: DeliveryHandle,
        disposition: Disposition,
    ) -> Result<(), EngineError> {
        let d = self.delivery_mut(handle)?;
        if let Some(state) = d.local_state {
            if state.is_terminal() {
                return Err(EngineError::DispositionTerminal { state });
            }
        }
        d.local_state = Some(disposition);
        tracing::debug!(%handle, %disposition, "delivery updated locally");
        self.queue_disposition(handle);
        Ok(())
    }

    /// Settles a delivery locally. Irreversible and idempotent.
    /// Settling with the disposition still unset is allowed (implicit
    /// abandonment) but leaves the peer to draw its own conclusions.
    ///
    /// Once both sides have settled, the delivery is reclaimed: removed
    /// from its link and its handle invalidated.
    pub fn settle(&mut self, handle: DeliveryHandle) -> Result<(), EngineError> {
        let d = self.delivery_mut(handle)?;
        if d.local_settled {
            return Ok(());
        }
        d.local_settled = true;
        tracing::debug!(%handle, "delivery settled locally");
        self.queue_disposition(handle);
        self.maybe_reclaim(handle);
        Ok(())
    }

    /// Edge-triggered: `true` exactly when the remote disposition or
    /// settlement changed since the last call. Reading clears the flag.
    pub fn delivery_updated(&mut self, handle: DeliveryHandle) -> Result<bool, EngineError> {
        let d = self.delivery_mut(handle)?;
        let was = d.updated;
        d.updated = false;
        Ok(was)
    }

    fn queue_disposition(&mut self, handle: DeliveryHandle) {
        // Reclaimed deliveries can still sit in the queue; emitters skip
        // them.
        if let Ok(d) = self.delivery_mut(handle) {
            if !d.disposition_dirty {
                d.disposition_dirty = true;
                self.dispositions.push_back(handle);
            }
        }
    }

    fn maybe_reclaim(&mut self, handle: DeliveryHandle) {
        let Ok(d) = self.delivery_ref(handle) else {
            return;
        };
        if !(d.local_settled && d.remote_settled) {
            return;
        }
        let link = d.link;
        let l = &mut self.links[link.into_inner()];
        if l.current == Some(handle) {
            self.move_current_past(link, handle);
        }
        let l = &mut self.links[link.into_inner()];
        l.deliveries.retain(|&h| h != handle);
        l.tx_queue.retain(|&h| h != handle);
        self.deliveries[handle.into_inner()] = None;
        tracing::trace!(%link, %handle, "delivery reclaimed");
    }

    // -----------------------------------------------------------------
    // Work queue
    // -----------------------------------------------------------------

    /// The delivery most recently made ready by peer activity, without
    /// removing it from the queue.
    pub fn work_head(&mut self) -> Option<DeliveryHandle> {
        self.prune_stale_work();
        self.work.front().copied()
    }

    /// The queue entry after `handle`, for walking the work set
    /// without draining it.
    pub fn work_next(&mut self, handle: DeliveryHandle) -> Option<DeliveryHandle> {
        self.prune_stale_work();
        let pos = self.work.iter().position(|&h| h == handle)?;
        for &h in self.work.iter().skip(pos + 1) {
            if self.deliveries[h.into_inner()].is_some() {
                return Some(h);
            }
        }
        None
    }

    /// Removes and returns the head of the work queue.
    pub fn work_pop(&mut self) -> Option<DeliveryHandle> {
        self.prune_stale_work();
        let handle = self.work.pop_front()?;
        if let Ok(d) = self.delivery_mut(handle) {
            d.work_queued = false;
        }
        Some(handle)
    }

    // Drops reclaimed deliveries from the front of the queue.
    fn prune_stale_work(&mut self) {
        while let Some(&handle) = self.work.front() {
            if self.delivery_ref(handle).is_ok() {
                break;
            }
            self.work.pop_front();
        }
    }

    fn push_work(&mut self, handle: DeliveryHandle) {
        if let Ok(d) = self.delivery_mut(handle) {
            if !d.work_queued {
                d.work_queued = true;
                // Newest ready first.
                self.work.push_front(handle);
            }
        }
    }

    // -----------------------------------------------------------------
    // Frame-application hooks (transport side)
    // -----------------------------------------------------------------
    //
    // Everything below is driven by decoded peer frames. Application
    // code never calls these; it observes their effects through the
    // remote accessors, the work queue, and `recv`.

    /// Applies a peer Open.
    pub fn on_remote_open(&mut self, container: String, hostname: Option<String>) {
        self.remote_container = Some(container);
        self.remote_hostname = hostname;
        self.endpoint.remote_open();
    }

    /// Applies a peer Close.
    pub fn on_remote_close(&mut self, condition: Option<Condition>) {
        self.endpoint.remote_condition = condition;
        self.endpoint.remote_close();
    }

    /// Applies a peer Begin to `session`.
    pub fn on_remote_begin(
        &mut self,
        session: SessionHandle,
        remote_channel: u16,
        next_outgoing_id: u32,
        incoming_window: u32,
        outgoing_window: u32,
    ) -> Result<(), EngineError> {
        let s = self.session_mut(session)?;
        s.remote_channel = Some(remote_channel);
        let _ = next_outgoing_id;
        s.remote_incoming_window = incoming_window;
        s.remote_outgoing_window = outgoing_window;
        s.endpoint.remote_open();
        Ok(())
    }

    /// Applies a peer End to `session`.
    pub fn on_remote_end(
        &mut self,
        session: SessionHandle,
        condition: Option<Condition>,
    ) -> Result<(), EngineError> {
        let s = self.session_mut(session)?;
        s.endpoint.remote_condition = condition;
        s.endpoint.remote_close();
        Ok(())
    }

    /// Applies a peer Attach to `link`.
    pub fn on_remote_attach(
        &mut self,
        link: LinkHandle,
        source: Option<Terminus>,
        target: Option<Terminus>,
    ) -> Result<(), EngineError> {
        let l = self.link_mut(link)?;
        l.remote_source = source;
        l.remote_target = target;
        l.endpoint.remote_open();
        Ok(())
    }

    /// Applies a peer Detach to `link`.
    pub fn on_remote_detach(
        &mut self,
        link: LinkHandle,
        condition: Option<Condition>,
    ) -> Result<(), EngineError> {
        let l = self.link_mut(link)?;
        l.endpoint.remote_condition = condition;
        l.endpoint.remote_close();
        Ok(())
    }

    /// Applies a peer Flow to `link`. On a sender this recomputes the
    /// credit balance from the peer's view:
    /// `credit = delivery_count + link_credit − our delivery_count`
    /// (serial-number arithmetic).
    pub fn on_remote_flow(
        &mut self,
        link: LinkHandle,
        delivery_count: u32,
        link_credit: u32,
        drain: bool,
    ) -> Result<(), EngineError> {
        let l = self.link_mut(link)?;
        if l.role == Role::Sender {
            l.credit = delivery_count
                .wrapping_add(link_credit)
                .wrapping_sub(l.delivery_count);
            l.drain = drain;
            tracing::debug!(%link, credit = l.credit, drain, "credit replenished by peer");
        }
        Ok(())
    }

    /// Applies one peer Transfer frame to `link`. Consecutive frames of
    /// a multi-frame delivery (`more = true`) accumulate into the same
    /// delivery; `more = false` completes it and makes it readable.
    /// Returns the delivery the payload landed in.
    pub fn on_remote_transfer(
        &mut self,
        link: LinkHandle,
        tag: &[u8],
        delivery_id: u32,
        payload: &[u8],
        settled: bool,
        more: bool,
    ) -> Result<DeliveryHandle, EngineError> {
        let l = self.link_ref(link)?;

        // A continuation lands in the link's newest delivery when that
        // delivery is still incomplete and carries the same tag.
        let continuation = l.deliveries.back().copied().filter(|&h| {
            self.delivery_ref(h)
                .map(|d| !d.done && d.tag == tag)
                .unwrap_or(false)
        });

        let handle = match continuation {
            Some(h) => h,
            None => {
                let h = self.delivery(link, tag)?;
                let l = &mut self.links[link.into_inner()];
                // The first frame of a delivery consumes one credit.
                l.credit = l.credit.saturating_sub(1);
                l.delivery_count = l.delivery_count.wrapping_add(1);
                l.queued += 1;
                h
            }
        };

        let d = self.delivery_mut(handle)?;
        d.delivery_id = Some(delivery_id);
        d.bytes.extend_from_slice(payload);
        d.remote_settled = d.remote_settled || settled;
        d.done = !more;
        if !more {
            self.push_work(handle);
        }
        tracing::trace!(%link, %handle, n = payload.len(), more, "transfer applied");
        if settled {
            self.maybe_reclaim(handle);
        }
        Ok(handle)
    }

    /// Applies one peer Disposition row to a delivery.
    pub fn on_remote_disposition(
        &mut self,
        handle: DeliveryHandle,
        state: Option<Disposition>,
        settled: bool,
    ) -> Result<(), EngineError> {
        let d = self.delivery_mut(handle)?;
        if state.is_some() {
            d.remote_state = state;
        }
        d.remote_settled = d.remote_settled || settled;
        d.updated = true;
        self.push_work(handle);
        if settled {
            self.maybe_reclaim(handle);
        }
        Ok(())
    }

    // -----------------------------------------------------------------
    // Frame-emission hooks (transport side)
    // -----------------------------------------------------------------

    /// Takes and clears a link's pending-Flow flag.
    pub fn take_flow_pending(&mut self, link: LinkHandle) -> Result<bool, EngineError> {
        let l = self.link_mut(link)?;
        let was = l.flow_pending;
        l.flow_pending = false;
        Ok(was)
    }

    /// Pops the next delivery queued for transfer on a sender link.
    pub fn pop_transfer(&mut self, link: LinkHandle) -> Result<Option<DeliveryHandle>, EngineError> {
        let l = self.link_mut(link)?;
        let handle = l.tx_queue.pop_front();
        if handle.is_some() {
            l.queued = l.queued.saturating_sub(1);
        }
        Ok(handle)
    }

    /// Pops the next delivery whose local disposition/settlement must be
    /// conveyed, skipping already-reclaimed entries.
    pub fn pop_disposition(&mut self) -> Option<DeliveryHandle> {
        while let Some(handle) = self.dispositions.pop_front() {
            if let Ok(d) = self.delivery_mut(handle) {
                d.disposition_dirty = false;
                return Some(handle);
            }
        }
        None
    }

    /// Drains a delivery's staged payload for emission and records the
    /// wire delivery-id assigned to it.
    pub fn take_transfer_payload(
        &mut self,
        handle: DeliveryHandle,
        delivery_id: u32,
    ) -> Result<Vec<u8>, EngineError> {
        let d = self.delivery_mut(handle)?;
        d.delivery_id = Some(delivery_id);
        Ok(std::mem::take(&mut d.bytes))
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::state;

    // -- Helpers ----------------------------------------------------------

    /// A connection with one open session and one open sender "L" that
    /// has been granted `credit`.
    fn sender_with_credit(credit: u32) -> (Connection, LinkHandle) {
        let mut conn = Connection::new("test-container");
        conn.open();
        let ssn = conn.session();
        conn.session_mut(ssn).unwrap().open();
        let link = conn.sender(ssn, "L").unwrap();
        conn.link_mut(link).unwrap().open();
        // Peer grants credit via a Flow.
        conn.on_remote_flow(link, 0, credit, false).unwrap();
        (conn, link)
    }

    fn receiver(granted: u32) -> (Connection, LinkHandle) {
        let mut conn = Connection::new("test-container");
        conn.open();
        let ssn = conn.session();
        conn.session_mut(ssn).unwrap().open();
        let link = conn.receiver(ssn, "L").unwrap();
        conn.link_mut(link).unwrap().open();
        if granted > 0 {
            conn.flow(link, granted).unwrap();
        }
        (conn, link)
    }

    // =====================================================================
    // Sessions and traversal
    // =====================================================================

    #[test]
    fn test_session_head_filters_by_state_mask() {
        let mut conn = Connection::new("c");
        let s1 = conn.session();
        let s2 = conn.session();
        conn.session_mut(s2).unwrap().open();

        let active = state::LOCAL_ACTIVE | state::REMOTE_UNINIT;
        let uninit = state::LOCAL_UNINIT | state::REMOTE_UNINIT;

        assert_eq!(conn.session_head(active), Some(s2));
        assert_eq!(conn.session_head(uninit), Some(s1));
        assert_eq!(conn.session_next(s2, active), None);
    }

    #[test]
    fn test_link_traversal_is_creation_order() {
        let mut conn = Connection::new("c");
        let ssn = conn.session();
        let a = conn.sender(ssn, "a").unwrap();
        let b = conn.receiver(ssn, "b").unwrap();
        conn.link_mut(a).unwrap().open();
        conn.link_mut(b).unwrap().open();

        let mask = state::LOCAL_ACTIVE | state::REMOTE_UNINIT;
        assert_eq!(conn.link_head(mask), Some(a));
        assert_eq!(conn.link_next(a, mask), Some(b));
        assert_eq!(conn.link_next(b, mask), None);
    }

    #[test]
    fn test_sender_on_unknown_session_fails() {
        let mut conn = Connection::new("c");
        let stale = SessionHandle::new(7);
        assert!(matches!(
            conn.sender(stale, "L"),
            Err(EngineError::UnknownSession(_))
        ));
    }

    // =====================================================================
    // Credit and send
    // =====================================================================

    #[test]
    fn test_send_with_zero_credit_fails() {
        let (mut conn, link) = sender_with_credit(0);
        conn.delivery(link, b"t-0".as_slice()).unwrap();

        assert_eq!(
            conn.send(link, b"hello"),
            Err(EngineError::InsufficientCredit)
        );
    }

    #[test]
    fn test_send_without_current_delivery_fails() {
        let (mut conn, link) = sender_with_credit(5);
        assert_eq!(
            conn.send(link, b"hello"),
            Err(EngineError::NoCurrentDelivery)
        );
    }

    #[test]
    fn test_send_on_receiver_fails() {
        let (mut conn, link) = receiver(5);
        assert_eq!(
            conn.send(link, b"x"),
            Err(EngineError::WrongRole {
                expected: Role::Sender
            })
        );
    }

    #[test]
    fn test_advance_consumes_exactly_one_credit() {
        let (mut conn, link) = sender_with_credit(2);
        conn.delivery(link, b"t-0".as_slice()).unwrap();
        conn.send(link, b"payload").unwrap();
        conn.advance(link).unwrap();

        assert_eq!(conn.link_ref(link).unwrap().credit(), 1);
        assert_eq!(conn.link_ref(link).unwrap().delivery_count(), 1);
        assert_eq!(conn.link_ref(link).unwrap().queued(), 1);
    }

    #[test]
    fn test_transfers_never_exceed_granted_credit() {
        // Credit invariant: with 2 credits, the third advance must fail.
        let (mut conn, link) = sender_with_credit(2);
        for i in 0..2 {
            conn.delivery(link, format!("t-{i}").into_bytes()).unwrap();
            conn.send(link, b"x").unwrap();
            conn.advance(link).unwrap();
        }

        conn.delivery(link, b"t-2".as_slice()).unwrap();
        assert_eq!(conn.send(link, b"x"), Err(EngineError::InsufficientCredit));
        assert_eq!(conn.advance(link), Err(EngineError::InsufficientCredit));
    }

    #[test]
    fn test_flow_replenishes_sender_credit_by_formula() {
        let (mut conn, link) = sender_with_credit(1);
        conn.delivery(link, b"t-0".as_slice()).unwrap();
        conn.send(link, b"x").unwrap();
        conn.advance(link).unwrap();
        assert_eq!(conn.link_ref(link).unwrap().credit(), 0);

        // Peer has seen delivery-count 1 and grants 10 more.
        conn.on_remote_flow(link, 1, 10, false).unwrap();
        assert_eq!(conn.link_ref(link).unwrap().credit(), 10);

        // A stale Flow based on delivery-count 0 yields the same window.
        conn.on_remote_flow(link, 0, 11, false).unwrap();
        assert_eq!(conn.link_ref(link).unwrap().credit(), 10);
    }

    #[test]
    fn test_drained_surrenders_residual_credit() {
        let (mut conn, link) = sender_with_credit(5);
        conn.on_remote_flow(link, 0, 5, true).unwrap();
        assert!(conn.link_ref(link).unwrap().draining());

        let surrendered = conn.drained(link).unwrap();
        assert_eq!(surrendered, 5);
        let l = conn.link_ref(link).unwrap();
        assert_eq!(l.credit(), 0);
        assert_eq!(l.delivery_count(), 5);
        assert!(!l.draining());

        // Without an active drain cycle, drained is a no-op.
        assert_eq!(conn.drained(link).unwrap(), 0);
    }

    #[test]
    fn test_receiver_flow_accumulates_credit() {
        let (mut conn, link) = receiver(0);
        conn.flow(link, 4).unwrap();
        conn.flow(link, 6).unwrap();
        assert_eq!(conn.link_ref(link).unwrap().credit(), 10);
        assert!(conn.take_flow_pending(link).unwrap());
        assert!(!conn.take_flow_pending(link).unwrap());
    }

    // =====================================================================
    // Receiving transfers
    // =====================================================================

    #[test]
    fn test_transfer_consumes_credit_and_recv_reads_payload() {
        let (mut conn, link) = receiver(10);
        conn.on_remote_transfer(link, b"t-0", 0, b"hello", false, false)
            .unwrap();

        assert_eq!(conn.link_ref(link).unwrap().credit(), 9);
        assert_eq!(conn.recv(link, 5).unwrap(), Some(b"hello".to_vec()));
        // Payload drained and the peer is done: end of stream.
        assert_eq!(conn.recv(link, 5).unwrap(), None);
    }

    #[test]
    fn test_multiframe_transfer_accumulates_until_more_clears() {
        let (mut conn, link) = receiver(10);
        let h1 = conn
            .on_remote_transfer(link, b"t-0", 0, b"he", false, true)
            .unwrap();
        let h2 = conn
            .on_remote_transfer(link, b"t-0", 0, b"llo", false, false)
            .unwrap();

        assert_eq!(h1, h2, "continuation frames land in the same delivery");
        // Only one credit consumed for the whole delivery.
        assert_eq!(conn.link_ref(link).unwrap().credit(), 9);
        assert_eq!(conn.recv(link, 10).unwrap(), Some(b"hello".to_vec()));
        assert_eq!(conn.recv(link, 10).unwrap(), None);
    }

    #[test]
    fn test_incomplete_transfer_recv_returns_empty_not_eos() {
        let (mut conn, link) = receiver(10);
        conn.on_remote_transfer(link, b"t-0", 0, b"", false, true)
            .unwrap();
        assert_eq!(conn.recv(link, 10).unwrap(), Some(Vec::new()));
    }

    #[test]
    fn test_completed_transfer_appears_at_work_head() {
        let (mut conn, link) = receiver(10);
        let h1 = conn
            .on_remote_transfer(link, b"t-0", 0, b"a", false, false)
            .unwrap();
        let h2 = conn
            .on_remote_transfer(link, b"t-1", 1, b"b", false, false)
            .unwrap();

        // Newest ready first.
        assert_eq!(conn.work_head(), Some(h2));
        assert_eq!(conn.work_pop(), Some(h2));
        assert_eq!(conn.work_pop(), Some(h1));
        assert_eq!(conn.work_pop(), None);
    }

    #[test]
    fn test_work_next_walks_without_draining() {
        let (mut conn, link) = receiver(10);
        let h1 = conn
            .on_remote_transfer(link, b"t-0", 0, b"a", false, false)
            .unwrap();
        let h2 = conn
            .on_remote_transfer(link, b"t-1", 1, b"b", false, false)
            .unwrap();

        let head = conn.work_head().unwrap();
        assert_eq!(head, h2);
        assert_eq!(conn.work_next(head), Some(h1));
        assert_eq!(conn.work_next(h1), None);
        // Walking did not consume anything.
        assert_eq!(conn.work_head(), Some(h2));
    }

    // =====================================================================
    // Disposition and settlement
    // =====================================================================

    #[test]
    fn test_update_from_received_to_terminal_allowed() {
        let (mut conn, link) = receiver(10);
        let h = conn
            .on_remote_transfer(link, b"t-0", 0, b"x", false, false)
            .unwrap();

        conn.update(h, Disposition::Received).unwrap();
        conn.update(h, Disposition::Accepted).unwrap();
        assert_eq!(
            conn.delivery_ref(h).unwrap().local_state(),
            Some(Disposition::Accepted)
        );
    }

    #[test]
    fn test_update_after_terminal_disposition_fails() {
        let (mut conn, link) = receiver(10);
        let h = conn
            .on_remote_transfer(link, b"t-0", 0, b"x", false, false)
            .unwrap();
        conn.update(h, Disposition::Accepted).unwrap();

        assert_eq!(
            conn.update(h, Disposition::Released),
            Err(EngineError::DispositionTerminal {
                state: Disposition::Accepted
            })
        );
    }

    #[test]
    fn test_settle_is_monotonic_and_idempotent() {
        let (mut conn, link) = sender_with_credit(1);
        let h = conn.delivery(link, b"t-0".as_slice()).unwrap();

        conn.settle(h).unwrap();
        assert!(conn.delivery_ref(h).unwrap().settled());
        conn.settle(h).unwrap();
        assert!(conn.delivery_ref(h).unwrap().settled());
    }

    #[test]
    fn test_delivery_reclaimed_once_both_sides_settled() {
        let (mut conn, link) = sender_with_credit(1);
        let h = conn.delivery(link, b"t-0".as_slice()).unwrap();
        assert_eq!(conn.link_ref(link).unwrap().unsettled(), 1);

        conn.settle(h).unwrap();
        // Still alive: the peer has not settled.
        assert!(conn.delivery_ref(h).is_ok());

        conn.on_remote_disposition(h, Some(Disposition::Accepted), true)
            .unwrap();
        // Both sides settled: gone.
        assert!(matches!(
            conn.delivery_ref(h),
            Err(EngineError::UnknownDelivery(_))
        ));
        assert_eq!(conn.link_ref(link).unwrap().unsettled(), 0);
    }

    #[test]
    fn test_remote_disposition_sets_edge_triggered_updated() {
        let (mut conn, link) = sender_with_credit(1);
        let h = conn.delivery(link, b"t-0".as_slice()).unwrap();

        assert!(!conn.delivery_updated(h).unwrap());
        conn.on_remote_disposition(h, Some(Disposition::Accepted), false)
            .unwrap();
        assert!(conn.delivery_updated(h).unwrap());
        // Reading cleared it.
        assert!(!conn.delivery_updated(h).unwrap());
        assert_eq!(
            conn.delivery_ref(h).unwrap().remote_state(),
            Some(Disposition::Accepted)
        );
    }

    #[test]
    fn test_arena_slot_reused_after_reclamation() {
        let (mut conn, link) = sender_with_credit(5);
        let h = conn.delivery(link, b"t-0".as_slice()).unwrap();
        conn.settle(h).unwrap();
        conn.on_remote_disposition(h, None, true).unwrap();

        let h2 = conn.delivery(link, b"t-1".as_slice()).unwrap();
        assert_eq!(h.into_inner(), h2.into_inner(), "slot reused");
        assert_eq!(conn.delivery_ref(h2).unwrap().tag(), b"t-1");
    }

    // =====================================================================
    // Connection endpoint
    // =====================================================================

    #[test]
    fn test_close_with_attaches_condition() {
        let mut conn = Connection::new("c");
        conn.open();
        conn.close_with(Condition::new("amqp:internal-error", "boom"));

        assert_eq!(conn.state(), state::LOCAL_CLOSED | state::REMOTE_UNINIT);
        assert_eq!(
            conn.endpoint().condition.as_ref().map(|c| c.name.as_str()),
            Some("amqp:internal-error")
        );
    }

    #[test]
    fn test_remote_open_mirrors_peer_identity() {
        let mut conn = Connection::new("c");
        conn.on_remote_open("peer".into(), Some("host.example".into()));

        assert_eq!(conn.remote_container(), Some("peer"));
        assert_eq!(conn.remote_hostname(), Some("host.example"));
        assert_eq!(conn.state() & state::REMOTE_ACTIVE, state::REMOTE_ACTIVE);
    }

    #[test]
    fn test_advance_moves_current_to_next_delivery() {
        let (mut conn, link) = sender_with_credit(5);
        let h1 = conn.delivery(link, b"t-0".as_slice()).unwrap();
        let h2 = conn.delivery(link, b"t-1".as_slice()).unwrap();
        assert_eq!(conn.current(link).unwrap(), Some(h1));

        conn.send(link, b"x").unwrap();
        conn.advance(link).unwrap();
        assert_eq!(conn.current(link).unwrap(), Some(h2));

        conn.advance(link).unwrap();
        assert_eq!(conn.current(link).unwrap(), None);
        assert!(!conn.advance(link).unwrap(), "nothing left to advance");
    }
}
