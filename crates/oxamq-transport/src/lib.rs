//! The sans-IO frame driver for Oxamq.
//!
//! A [`Transport`] binds exactly one [`Connection`] to a byte stream it
//! never owns: callers feed peer bytes to [`Transport::input`] and
//! drain produced bytes from [`Transport::output`]. Between those two
//! calls, the transport does all the protocol's wire work:
//!
//! - emits the protocol header and one frame per pending local state
//!   change (Open/Begin/Attach/Flow/Transfer/Disposition/Detach/End/
//!   Close), FIFO in the order the changes were made;
//! - parses incoming frames and applies them to the bound connection's
//!   remote-side state through the engine's `on_remote_*` hooks;
//! - assigns channel numbers, link handles, and delivery-ids, keeping
//!   the wire's namespaces out of the engine entirely.
//!
//! State changes only ever apply at frame granularity: `input` consumes
//! the header and whole frames, and leaves a trailing partial frame
//! unconsumed for the caller to present again once more bytes arrive.
//!
//! A fatal error (malformed frame, bad header) poisons the transport:
//! every later call fails with [`TransportError::Defunct`], and the
//! caller must discard the transport/connection pair. The one
//! recoverable error is [`TransportError::Overflow`] from `output`,
//! which asks for a bigger byte budget.

use std::collections::{HashMap, HashSet};

use bytes::{Buf, BufMut, BytesMut};

use oxamq_engine::{
    endpoint::state, Connection, DeliveryHandle, EndpointState, LinkHandle, Role, SessionHandle,
};

use crate::frames::{
    Attach, Begin, Close, Detach, Disposition, End, Flow, Open, Performative, Transfer,
};

mod error;
pub mod frames;

pub use error::TransportError;

/// The AMQP 1.0 protocol header, exchanged before any frame.
pub const PROTOCOL_HEADER: [u8; 8] = *b"AMQP\x00\x01\x00\x00";

/// AMQP frame type code (SASL frames use 1 and ride their own header).
const FRAME_TYPE_AMQP: u8 = 0;

/// Matches endpoints in any state at all.
const ANY: u8 = state::LOCAL_UNINIT
    | state::LOCAL_ACTIVE
    | state::LOCAL_CLOSED
    | state::REMOTE_UNINIT
    | state::REMOTE_ACTIVE
    | state::REMOTE_CLOSED;

/// Locally opened or closed, any remote state: the endpoints with wire
/// work pending.
const LOCAL_BEGUN: u8 = state::LOCAL_ACTIVE
    | state::LOCAL_CLOSED
    | state::REMOTE_UNINIT
    | state::REMOTE_ACTIVE
    | state::REMOTE_CLOSED;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Transport tuning knobs, advertised to the peer in Open.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Largest frame this transport will accept, in bytes.
    pub max_frame_size: u32,
    /// Highest channel number this transport will use.
    pub channel_max: u16,
    /// Idle timeout in milliseconds, surfaced to the driving loop and
    /// advertised to the peer. The engine never acts on it; keepalive
    /// scheduling belongs to the caller's event loop.
    pub idle_timeout: Option<u32>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_frame_size: 64 * 1024,
            channel_max: 32767,
            idle_timeout: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

/// Binds one connection to a byte stream. See the module docs.
#[derive(Debug, Default)]
pub struct Transport {
    config: TransportConfig,
    connection: Option<Connection>,

    header_sent: bool,
    header_received: bool,
    open_sent: bool,
    close_sent: bool,
    defunct: bool,

    /// Channel allocation for locally begun sessions.
    next_channel: u16,
    begin_sent: HashSet<SessionHandle>,
    end_sent: HashSet<SessionHandle>,
    /// Incoming channel number → session.
    channels_in: HashMap<u16, SessionHandle>,

    /// Handle allocation for locally attached links, per session.
    next_handle: HashMap<SessionHandle, u32>,
    attach_sent: HashMap<LinkHandle, u32>,
    detach_sent: HashSet<LinkHandle>,
    /// (session, peer's handle) → link.
    handles_in: HashMap<(SessionHandle, u32), LinkHandle>,

    /// Delivery-ids we assigned to outgoing transfers.
    ids_out: HashMap<(SessionHandle, u32), DeliveryHandle>,
    /// Delivery-ids the peer assigned to incoming transfers.
    ids_in: HashMap<(SessionHandle, u32), DeliveryHandle>,
    /// Last incoming delivery-id per session, for continuation frames
    /// that omit the field.
    last_id_in: HashMap<SessionHandle, u32>,

    /// A generated frame that did not fit the previous output budget.
    stashed: Option<Vec<u8>>,

    frames_input: u64,
    frames_output: u64,
}

impl Transport {
    /// A transport with default configuration and no bound connection.
    pub fn new() -> Self {
        Self::with_config(TransportConfig::default())
    }

    /// A transport with explicit configuration.
    pub fn with_config(config: TransportConfig) -> Self {
        Self {
            config,
            connection: None,
            header_sent: false,
            header_received: false,
            open_sent: false,
            close_sent: false,
            defunct: false,
            next_channel: 0,
            begin_sent: HashSet::new(),
            end_sent: HashSet::new(),
            channels_in: HashMap::new(),
            next_handle: HashMap::new(),
            attach_sent: HashMap::new(),
            detach_sent: HashSet::new(),
            handles_in: HashMap::new(),
            ids_out: HashMap::new(),
            ids_in: HashMap::new(),
            last_id_in: HashMap::new(),
            stashed: None,
            frames_input: 0,
            frames_output: 0,
        }
    }

    /// Binds `connection`; the transport owns it from here on and lends
    /// it back through [`connection_mut`](Self::connection_mut).
    ///
    /// # Errors
    /// [`TransportError::AlreadyBound`] if a connection is already
    /// bound; a transport drives exactly one connection for its
    /// lifetime.
    pub fn bind(&mut self, connection: Connection) -> Result<(), TransportError> {
        if self.connection.is_some() {
            return Err(TransportError::AlreadyBound);
        }
        self.connection = Some(connection);
        Ok(())
    }

    /// The bound connection, if any.
    pub fn connection(&self) -> Option<&Connection> {
        self.connection.as_ref()
    }

    /// Mutable access to the bound connection, for driving local state.
    pub fn connection_mut(&mut self) -> Option<&mut Connection> {
        self.connection.as_mut()
    }

    /// The transport configuration.
    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// AMQP frames parsed and applied so far.
    pub fn frames_input(&self) -> u64 {
        self.frames_input
    }

    /// AMQP frames produced so far.
    pub fn frames_output(&self) -> u64 {
        self.frames_output
    }

    /// Whether a fatal error has poisoned this transport.
    pub fn is_defunct(&self) -> bool {
        self.defunct
    }

    // -----------------------------------------------------------------
    // Output
    // -----------------------------------------------------------------

    /// Serializes pending local state changes into at most `max` bytes
    /// of whole frames.
    ///
    /// Returns `Ok(Some(bytes))` (possibly empty when nothing is
    /// pending), or `Ok(None)` once the connection is fully closed and
    /// the Close frame has been emitted: end of stream, no output ever
    /// again.
    ///
    /// # Errors
    /// [`TransportError::Overflow`] when the next frame alone exceeds
    /// `max` — recoverable, retry with a bigger budget. Anything else
    /// is fatal.
    pub fn output(&mut self, max: usize) -> Result<Option<Vec<u8>>, TransportError> {
        if self.defunct {
            return Err(TransportError::Defunct);
        }
        if self.connection.is_none() {
            return Err(TransportError::NotBound);
        }

        let mut out = Vec::new();
        loop {
            let frame = match self.stashed.take() {
                Some(frame) => frame,
                None => match self.next_frame()? {
                    Some(frame) => frame,
                    None => break,
                },
            };
            if out.len() + frame.len() > max {
                let size = frame.len();
                self.stashed = Some(frame);
                if out.is_empty() {
                    return Err(TransportError::Overflow {
                        frame: size,
                        budget: max,
                    });
                }
                break;
            }
            out.extend_from_slice(&frame);
        }

        if out.is_empty() && self.close_sent && self.stashed.is_none() {
            return Ok(None);
        }
        Ok(Some(out))
    }

    // Produces the next pending frame, FIFO over the endpoint
    // lifecycle: header, Open, Begins, Attaches, Flows, Transfers,
    // Dispositions, Detaches, Ends, Close.
    fn next_frame(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        if !self.header_sent {
            self.header_sent = true;
            return Ok(Some(PROTOCOL_HEADER.to_vec()));
        }

        if let Some(frame) = self.open_frame()? {
            return Ok(Some(frame));
        }
        // Nothing else goes on the wire before our Open.
        if !self.open_sent {
            return Ok(None);
        }
        if let Some(frame) = self.begin_frame()? {
            return Ok(Some(frame));
        }
        if let Some(frame) = self.attach_frame()? {
            return Ok(Some(frame));
        }
        if let Some(frame) = self.flow_frame()? {
            return Ok(Some(frame));
        }
        if let Some(frame) = self.transfer_frame()? {
            return Ok(Some(frame));
        }
        if let Some(frame) = self.disposition_frame()? {
            return Ok(Some(frame));
        }
        if let Some(frame) = self.detach_frame()? {
            return Ok(Some(frame));
        }
        if let Some(frame) = self.end_frame()? {
            return Ok(Some(frame));
        }
        if let Some(frame) = self.close_frame()? {
            return Ok(Some(frame));
        }
        Ok(None)
    }

    fn conn(&self) -> &Connection {
        self.connection.as_ref().expect("checked by caller")
    }

    fn conn_mut(&mut self) -> &mut Connection {
        self.connection.as_mut().expect("checked by caller")
    }

    fn emit(
        &mut self,
        channel: u16,
        performative: &Performative,
        payload: &[u8],
    ) -> Result<Vec<u8>, TransportError> {
        let body = performative.encode()?;
        let size = 8 + body.len() + payload.len();
        let mut frame = BytesMut::with_capacity(size);
        frame.put_u32(size as u32);
        frame.put_u8(2); // doff: no extended header
        frame.put_u8(FRAME_TYPE_AMQP);
        frame.put_u16(channel);
        frame.put_slice(&body);
        frame.put_slice(payload);
        self.frames_output += 1;
        tracing::trace!(
            frame = performative.name(),
            channel,
            size,
            "frame emitted"
        );
        Ok(frame.to_vec())
    }

    fn open_frame(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        if self.open_sent || self.conn().endpoint().local() == EndpointState::Uninit {
            return Ok(None);
        }
        let conn = self.conn();
        let open = Performative::Open(Open {
            container_id: conn.container().to_owned(),
            hostname: conn.hostname().map(str::to_owned),
            max_frame_size: self.config.max_frame_size,
            channel_max: self.config.channel_max,
            idle_timeout: self.config.idle_timeout,
        });
        self.open_sent = true;
        Ok(Some(self.emit(0, &open, &[])?))
    }

    fn begin_frame(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        let pending = {
            let conn = self.conn();
            let mut cursor = conn.session_head(LOCAL_BEGUN);
            loop {
                match cursor {
                    Some(s) if self.begin_sent.contains(&s) => {
                        cursor = conn.session_next(s, LOCAL_BEGUN);
                    }
                    other => break other,
                }
            }
        };
        let Some(session) = pending else {
            return Ok(None);
        };

        let channel = self.next_channel;
        self.next_channel += 1;
        let s = self
            .conn_mut()
            .session_mut(session)
            .expect("session from traversal");
        s.set_local_channel(channel);
        let begin = Performative::Begin(Begin {
            remote_channel: s.remote_channel(),
            next_outgoing_id: s.next_outgoing_id(),
            incoming_window: s.incoming_window,
            outgoing_window: s.outgoing_window,
        });
        self.begin_sent.insert(session);
        Ok(Some(self.emit(channel, &begin, &[])?))
    }

    fn attach_frame(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        let pending = {
            let conn = self.conn();
            let mut cursor = conn.link_head(LOCAL_BEGUN);
            loop {
                match cursor {
                    Some(l)
                        if self.attach_sent.contains_key(&l)
                            || !self
                                .begin_sent
                                .contains(&conn.link_ref(l)?.session()) =>
                    {
                        cursor = conn.link_next(l, LOCAL_BEGUN);
                    }
                    other => break other,
                }
            }
        };
        let Some(link) = pending else {
            return Ok(None);
        };

        let (session, name, role, source, target, delivery_count) = {
            let l = self.conn().link_ref(link)?;
            (
                l.session(),
                l.name().to_owned(),
                l.role(),
                l.source.clone(),
                l.target.clone(),
                l.delivery_count(),
            )
        };
        let handle = {
            let next = self.next_handle.entry(session).or_insert(0);
            let h = *next;
            *next += 1;
            h
        };
        let attach = Performative::Attach(Attach {
            name,
            handle,
            role_receiver: role == Role::Receiver,
            source: Some(source),
            target: Some(target),
            initial_delivery_count: (role == Role::Sender).then_some(delivery_count),
        });
        let channel = self.channel_of(session)?;
        self.attach_sent.insert(link, handle);
        Ok(Some(self.emit(channel, &attach, &[])?))
    }

    fn flow_frame(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        // Only attached links can put a Flow on the wire; pending flags
        // on unattached links survive until the Attach goes out.
        let attached: Vec<LinkHandle> = self.attach_sent.keys().copied().collect();
        for link in attached {
            if !self.conn_mut().take_flow_pending(link)? {
                continue;
            }
            let conn = self.conn();
            let l = conn.link_ref(link)?;
            let session = l.session();
            let s = conn.session_ref(session)?;
            let flow = Performative::Flow(Flow {
                next_incoming_id: None,
                incoming_window: s.incoming_window,
                next_outgoing_id: s.next_outgoing_id(),
                outgoing_window: s.outgoing_window,
                handle: Some(self.attach_sent[&link]),
                delivery_count: Some(l.delivery_count()),
                link_credit: Some(l.credit()),
                drain: l.draining(),
            });
            let channel = self.channel_of(session)?;
            return Ok(Some(self.emit(channel, &flow, &[])?));
        }
        Ok(None)
    }

    fn transfer_frame(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        let attached: Vec<(LinkHandle, u32)> =
            self.attach_sent.iter().map(|(&l, &h)| (l, h)).collect();
        for (link, handle) in attached {
            if self.conn().link_ref(link)?.role() != Role::Sender {
                continue;
            }
            let Some(delivery) = self.conn_mut().pop_transfer(link)? else {
                continue;
            };
            let session = self.conn().link_ref(link)?.session();
            let id = self
                .conn_mut()
                .session_mut(session)?
                .advance_outgoing_id();
            let payload = self.conn_mut().take_transfer_payload(delivery, id)?;
            let d = self.conn().delivery_ref(delivery)?;
            let transfer = Performative::Transfer(Transfer {
                handle,
                delivery_id: Some(id),
                delivery_tag: d.tag().to_vec(),
                message_format: 0,
                settled: d.settled(),
                more: false,
            });
            self.ids_out.insert((session, id), delivery);
            let channel = self.channel_of(session)?;
            return Ok(Some(self.emit(channel, &transfer, &payload)?));
        }
        Ok(None)
    }

    fn disposition_frame(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        loop {
            let Some(delivery) = self.conn_mut().pop_disposition() else {
                return Ok(None);
            };
            let conn = self.conn();
            let d = conn.delivery_ref(delivery)?;
            // A delivery that never crossed the wire has nothing for the
            // peer to correlate; its disposition stays local.
            let Some(id) = d.delivery_id() else {
                continue;
            };
            let link = d.link();
            let disposition = Performative::Disposition(Disposition {
                role_receiver: conn.link_ref(link)?.role() == Role::Receiver,
                first: id,
                last: None,
                settled: d.settled(),
                state: d.local_state(),
            });
            let session = conn.link_ref(link)?.session();
            let channel = self.channel_of(session)?;
            return Ok(Some(self.emit(channel, &disposition, &[])?));
        }
    }

    fn detach_frame(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        let attached: Vec<(LinkHandle, u32)> =
            self.attach_sent.iter().map(|(&l, &h)| (l, h)).collect();
        for (link, handle) in attached {
            if self.detach_sent.contains(&link) {
                continue;
            }
            let conn = self.conn();
            let l = conn.link_ref(link)?;
            if l.endpoint().local() != EndpointState::Closed {
                continue;
            }
            let detach = Performative::Detach(Detach {
                handle,
                closed: true,
                error: l.endpoint().condition.clone(),
            });
            let channel = self.channel_of(l.session())?;
            self.detach_sent.insert(link);
            return Ok(Some(self.emit(channel, &detach, &[])?));
        }
        Ok(None)
    }

    fn end_frame(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        let begun: Vec<SessionHandle> = self.begin_sent.iter().copied().collect();
        for session in begun {
            if self.end_sent.contains(&session) {
                continue;
            }
            let conn = self.conn();
            let s = conn.session_ref(session)?;
            if s.endpoint().local() != EndpointState::Closed {
                continue;
            }
            let end = Performative::End(End {
                error: s.endpoint().condition.clone(),
            });
            let channel = self.channel_of(session)?;
            self.end_sent.insert(session);
            return Ok(Some(self.emit(channel, &end, &[])?));
        }
        Ok(None)
    }

    fn close_frame(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        if self.close_sent || self.conn().endpoint().local() != EndpointState::Closed {
            return Ok(None);
        }
        let close = Performative::Close(Close {
            error: self.conn().endpoint().condition.clone(),
        });
        self.close_sent = true;
        Ok(Some(self.emit(0, &close, &[])?))
    }

    fn channel_of(&self, session: SessionHandle) -> Result<u16, TransportError> {
        self.conn()
            .session_ref(session)?
            .local_channel()
            .ok_or(TransportError::MalformedPerformative("session has no channel"))
    }

    // -----------------------------------------------------------------
    // Input
    // -----------------------------------------------------------------

    /// Parses and applies as many complete frames as `bytes` contains.
    ///
    /// Returns `Ok(Some(consumed))`, counting the protocol header and
    /// whole frames only — a trailing partial frame is left unconsumed
    /// and must be presented again with more data. Returns `Ok(None)`
    /// once the peer's Close has been applied: end of stream, nothing
    /// further will be accepted.
    ///
    /// # Errors
    /// All input errors are fatal; the transport is defunct afterwards.
    pub fn input(&mut self, bytes: &[u8]) -> Result<Option<usize>, TransportError> {
        if self.defunct {
            return Err(TransportError::Defunct);
        }
        if self.connection.is_none() {
            return Err(TransportError::NotBound);
        }
        if self.conn().endpoint().remote() == EndpointState::Closed {
            return Ok(None);
        }

        match self.input_inner(bytes) {
            Ok(consumed) => Ok(Some(consumed)),
            Err(e) => {
                self.defunct = true;
                Err(e)
            }
        }
    }

    fn input_inner(&mut self, bytes: &[u8]) -> Result<usize, TransportError> {
        let mut consumed = 0;

        if !self.header_received {
            if bytes.len() < 8 {
                return Ok(0);
            }
            let mut found = [0u8; 8];
            found.copy_from_slice(&bytes[..8]);
            if found != PROTOCOL_HEADER {
                return Err(TransportError::HeaderMismatch { found });
            }
            self.header_received = true;
            consumed = 8;
        }

        while bytes.len() - consumed >= 8 {
            let mut header = &bytes[consumed..consumed + 8];
            let size = header.get_u32();
            let doff = header.get_u8();
            let ftype = header.get_u8();
            let channel = header.get_u16();

            if size < 8 {
                return Err(TransportError::FrameTooSmall(size));
            }
            if size > self.config.max_frame_size {
                return Err(TransportError::FrameTooLarge {
                    size,
                    max: self.config.max_frame_size,
                });
            }
            if bytes.len() - consumed < size as usize {
                // Partial frame: the caller re-presents these bytes.
                break;
            }
            let body_start = doff as usize * 4;
            if doff < 2 || body_start > size as usize {
                return Err(TransportError::InvalidDoff(doff));
            }
            if ftype != FRAME_TYPE_AMQP {
                return Err(TransportError::UnexpectedFrameType(ftype));
            }

            let body = &bytes[consumed + body_start..consumed + size as usize];
            if !body.is_empty() {
                let (performative, used) = Performative::decode(body)?;
                let payload = &body[used..];
                tracing::trace!(
                    frame = performative.name(),
                    channel,
                    size,
                    "frame received"
                );
                self.apply(channel, performative, payload)?;
            }
            // An empty body is a keepalive; it still counts as a frame.
            self.frames_input += 1;
            consumed += size as usize;

            if self.conn().endpoint().remote() == EndpointState::Closed {
                break;
            }
        }
        Ok(consumed)
    }

    // Applies one decoded frame to the bound connection.
    fn apply(
        &mut self,
        channel: u16,
        performative: Performative,
        payload: &[u8],
    ) -> Result<(), TransportError> {
        match performative {
            Performative::Open(open) => {
                self.conn_mut()
                    .on_remote_open(open.container_id, open.hostname);
            }
            Performative::Begin(begin) => {
                // A reply names the channel we chose. Otherwise the
                // Begin pairs with our oldest session that has not yet
                // seen one, or stands up a fresh peer-initiated session.
                let session = match begin.remote_channel {
                    Some(local_ch) => self
                        .session_by_local_channel(local_ch)
                        .ok_or(TransportError::UnknownChannel(local_ch))?,
                    None => match self.unpaired_session() {
                        Some(session) => session,
                        None => self.conn_mut().session(),
                    },
                };
                self.channels_in.insert(channel, session);
                self.conn_mut().on_remote_begin(
                    session,
                    channel,
                    begin.next_outgoing_id,
                    begin.incoming_window,
                    begin.outgoing_window,
                )?;
            }
            Performative::Attach(attach) => {
                let session = self.session_in(channel)?;
                let link = match self.link_by_name(session, &attach.name) {
                    Some(link) => link,
                    None => {
                        // Peer-initiated link: mirror it with the
                        // opposite role.
                        let conn = self.conn_mut();
                        if attach.role_receiver {
                            conn.sender(session, attach.name.clone())?
                        } else {
                            conn.receiver(session, attach.name.clone())?
                        }
                    }
                };
                self.handles_in.insert((session, attach.handle), link);
                self.conn_mut()
                    .on_remote_attach(link, attach.source, attach.target)?;
            }
            Performative::Flow(flow) => {
                if let Some(handle) = flow.handle {
                    let session = self.session_in(channel)?;
                    let link = self.link_in(session, handle)?;
                    self.conn_mut().on_remote_flow(
                        link,
                        flow.delivery_count.unwrap_or(0),
                        flow.link_credit.unwrap_or(0),
                        flow.drain,
                    )?;
                }
                // Session-level flow carries only window updates, which
                // the engine does not police.
            }
            Performative::Transfer(transfer) => {
                let session = self.session_in(channel)?;
                let link = self.link_in(session, transfer.handle)?;
                let id = match transfer.delivery_id {
                    Some(id) => id,
                    // Continuation frames may omit the id.
                    None => *self
                        .last_id_in
                        .get(&session)
                        .ok_or(TransportError::MalformedPerformative(
                            "transfer without delivery-id",
                        ))?,
                };
                self.last_id_in.insert(session, id);
                let delivery = self.conn_mut().on_remote_transfer(
                    link,
                    &transfer.delivery_tag,
                    id,
                    payload,
                    transfer.settled,
                    transfer.more,
                )?;
                self.ids_in.insert((session, id), delivery);
            }
            Performative::Disposition(disposition) => {
                let session = self.session_in(channel)?;
                let last = disposition.last.unwrap_or(disposition.first);
                // The peer as receiver reports on deliveries we sent; as
                // sender, on deliveries we received.
                let map = if disposition.role_receiver {
                    &self.ids_out
                } else {
                    &self.ids_in
                };
                // Walk the live deliveries rather than the wire range:
                // the range is peer-controlled and may span billions of
                // ids, or wrap past u32::MAX. Delivery-ids are serial
                // numbers, so membership is a wrapping distance check.
                let span = last.wrapping_sub(disposition.first);
                let covered: Vec<DeliveryHandle> = map
                    .iter()
                    .filter(|((s, id), _)| {
                        *s == session && id.wrapping_sub(disposition.first) <= span
                    })
                    .map(|(_, &delivery)| delivery)
                    .collect();
                for delivery in covered {
                    self.conn_mut().on_remote_disposition(
                        delivery,
                        disposition.state,
                        disposition.settled,
                    )?;
                }
            }
            Performative::Detach(detach) => {
                let session = self.session_in(channel)?;
                let link = self.link_in(session, detach.handle)?;
                self.conn_mut().on_remote_detach(link, detach.error)?;
            }
            Performative::End(end) => {
                let session = self.session_in(channel)?;
                self.conn_mut().on_remote_end(session, end.error)?;
            }
            Performative::Close(close) => {
                self.conn_mut().on_remote_close(close.error);
            }
        }
        Ok(())
    }

    fn session_in(&self, channel: u16) -> Result<SessionHandle, TransportError> {
        self.channels_in
            .get(&channel)
            .copied()
            .ok_or(TransportError::UnknownChannel(channel))
    }

    fn link_in(&self, session: SessionHandle, handle: u32) -> Result<LinkHandle, TransportError> {
        self.handles_in
            .get(&(session, handle))
            .copied()
            .ok_or(TransportError::UnknownHandle(handle))
    }

    fn unpaired_session(&self) -> Option<SessionHandle> {
        let conn = self.conn();
        let mut cursor = conn.session_head(ANY);
        while let Some(s) = cursor {
            if conn.session_ref(s).ok()?.endpoint().remote() == EndpointState::Uninit {
                return Some(s);
            }
            cursor = conn.session_next(s, ANY);
        }
        None
    }

    fn session_by_local_channel(&self, channel: u16) -> Option<SessionHandle> {
        let conn = self.conn();
        let mut cursor = conn.session_head(ANY);
        while let Some(s) = cursor {
            if conn.session_ref(s).ok()?.local_channel() == Some(channel) {
                return Some(s);
            }
            cursor = conn.session_next(s, ANY);
        }
        None
    }

    fn link_by_name(&self, session: SessionHandle, name: &str) -> Option<LinkHandle> {
        let conn = self.conn();
        let mut cursor = conn.link_head(ANY);
        while let Some(l) = cursor {
            let link = conn.link_ref(l).ok()?;
            if link.session() == session
                && link.name() == name
                && link.endpoint().remote() == EndpointState::Uninit
            {
                return Some(l);
            }
            cursor = conn.link_next(l, ANY);
        }
        None
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    // -- Helpers ----------------------------------------------------------

    /// An opened transport/connection pair ready to exchange frames.
    fn opened(container: &str) -> Transport {
        let mut t = Transport::new();
        let mut conn = Connection::new(container);
        conn.open();
        t.bind(conn).unwrap();
        t
    }

    /// Drains everything `from` has pending into `to`.
    fn pump(from: &mut Transport, to: &mut Transport) {
        loop {
            match from.output(64 * 1024).unwrap() {
                Some(bytes) if bytes.is_empty() => break,
                Some(bytes) => {
                    let consumed = to.input(&bytes).unwrap();
                    assert_eq!(consumed, Some(bytes.len()), "whole frames must be consumed");
                }
                None => break,
            }
        }
    }

    /// Two attached stacks where side `a` has sent one unsettled
    /// delivery, so it holds outgoing delivery-id 0.
    fn sent_one_delivery() -> (Transport, DeliveryHandle) {
        let mut a = opened("a");
        let mut b = opened("b");

        let conn = a.connection_mut().unwrap();
        let ssn = conn.session();
        conn.session_mut(ssn).unwrap().open();
        let snd = conn.sender(ssn, "L").unwrap();
        conn.link_mut(snd).unwrap().open();

        let conn = b.connection_mut().unwrap();
        let ssn = conn.session();
        conn.session_mut(ssn).unwrap().open();
        let rcv = conn.receiver(ssn, "L").unwrap();
        conn.link_mut(rcv).unwrap().open();

        pump(&mut a, &mut b);
        pump(&mut b, &mut a);
        pump(&mut a, &mut b);

        b.connection_mut().unwrap().flow(rcv, 10).unwrap();
        pump(&mut b, &mut a);

        let conn = a.connection_mut().unwrap();
        let outgoing = conn.delivery(snd, &b"t0"[..]).unwrap();
        conn.send(snd, b"x").unwrap();
        conn.advance(snd).unwrap();
        pump(&mut a, &mut b);
        (a, outgoing)
    }

    /// A wire frame built by hand, for feeding crafted performatives.
    fn raw_frame(channel: u16, performative: &Performative) -> Vec<u8> {
        let body = performative.encode().unwrap();
        let mut frame = BytesMut::with_capacity(8 + body.len());
        frame.put_u32((8 + body.len()) as u32);
        frame.put_u8(2);
        frame.put_u8(FRAME_TYPE_AMQP);
        frame.put_u16(channel);
        frame.put_slice(&body);
        frame.to_vec()
    }

    // =====================================================================
    // bind()
    // =====================================================================

    #[test]
    fn test_bind_twice_fails() {
        let mut t = Transport::new();
        t.bind(Connection::new("a")).unwrap();
        assert!(matches!(
            t.bind(Connection::new("b")),
            Err(TransportError::AlreadyBound)
        ));
    }

    #[test]
    fn test_unbound_transport_rejects_io() {
        let mut t = Transport::new();
        assert!(matches!(t.output(1024), Err(TransportError::NotBound)));
        assert!(matches!(t.input(&[0; 8]), Err(TransportError::NotBound)));
    }

    // =====================================================================
    // output()
    // =====================================================================

    #[test]
    fn test_output_starts_with_protocol_header_then_open() {
        let mut t = opened("box-a");
        let bytes = t.output(64 * 1024).unwrap().unwrap();

        assert_eq!(&bytes[..8], &PROTOCOL_HEADER);
        // The next frame is an Open on channel 0.
        let size = u32::from_be_bytes(bytes[8..12].try_into().unwrap()) as usize;
        assert_eq!(8 + size, bytes.len());
        let (performative, _) = Performative::decode(&bytes[16..]).unwrap();
        let Performative::Open(open) = performative else {
            panic!("expected open, got {}", performative.name());
        };
        assert_eq!(open.container_id, "box-a");
        assert_eq!(t.frames_output(), 1);
    }

    #[test]
    fn test_output_overflow_is_recoverable() {
        let mut t = opened("box-a");
        // 4 bytes cannot even hold the header.
        let err = t.output(4).unwrap_err();
        assert!(matches!(err, TransportError::Overflow { .. }));
        assert!(!err.is_fatal());

        // A real budget succeeds afterwards, nothing lost.
        let bytes = t.output(64 * 1024).unwrap().unwrap();
        assert_eq!(&bytes[..8], &PROTOCOL_HEADER);
    }

    #[test]
    fn test_output_after_close_reaches_eos() {
        let mut a = opened("a");
        let mut b = opened("b");
        pump(&mut a, &mut b);
        pump(&mut b, &mut a);

        a.connection_mut().unwrap().close();
        pump(&mut a, &mut b);

        // Everything including Close has been emitted: end of stream.
        assert_eq!(a.output(64 * 1024).unwrap(), None);
    }

    // =====================================================================
    // input()
    // =====================================================================

    #[test]
    fn test_input_rejects_foreign_header() {
        let mut t = opened("box-a");
        let err = t.input(b"HTTP/1.1LOL").unwrap_err();
        assert!(matches!(err, TransportError::HeaderMismatch { .. }));
        assert!(err.is_fatal());
        // Poisoned for good.
        assert!(matches!(t.input(&PROTOCOL_HEADER), Err(TransportError::Defunct)));
        assert!(matches!(t.output(1024), Err(TransportError::Defunct)));
    }

    #[test]
    fn test_input_split_frame_applies_exactly_once() {
        let mut a = opened("a");
        let mut b = opened("b");
        let bytes = a.output(64 * 1024).unwrap().unwrap();

        // First half: the header plus a partial Open frame.
        let split = 12;
        let consumed = b.input(&bytes[..split]).unwrap().unwrap();
        assert_eq!(consumed, 8, "only the header fits; partial frame unconsumed");
        assert_eq!(b.frames_input(), 0);
        assert_eq!(b.connection().unwrap().remote_container(), None);

        // The caller re-presents the remainder.
        let consumed = b.input(&bytes[consumed..]).unwrap().unwrap();
        assert_eq!(consumed, bytes.len() - 8);
        assert_eq!(b.frames_input(), 1);
        assert_eq!(b.connection().unwrap().remote_container(), Some("a"));
    }

    #[test]
    fn test_input_after_remote_close_is_eos() {
        let mut a = opened("a");
        let mut b = opened("b");
        pump(&mut a, &mut b);
        pump(&mut b, &mut a);

        a.connection_mut().unwrap().close();
        pump(&mut a, &mut b);
        assert_eq!(
            b.connection().unwrap().endpoint().remote(),
            EndpointState::Closed
        );

        assert_eq!(b.input(&[0; 16]).unwrap(), None);
    }

    // =====================================================================
    // Disposition ranges
    // =====================================================================

    #[test]
    fn test_disposition_full_range_applies_in_bounded_time() {
        let (mut a, outgoing) = sent_one_delivery();
        let disposition = Performative::Disposition(Disposition {
            role_receiver: true,
            first: 0,
            last: Some(u32::MAX),
            settled: false,
            state: Some(oxamq_engine::Disposition::Accepted),
        });
        let frame = raw_frame(0, &disposition);

        // The range is peer-controlled; applying it must cost work
        // proportional to live deliveries, not to the range width.
        let started = std::time::Instant::now();
        assert_eq!(a.input(&frame).unwrap(), Some(frame.len()));
        assert!(started.elapsed() < std::time::Duration::from_secs(2));

        let conn = a.connection_mut().unwrap();
        assert!(conn.delivery_updated(outgoing).unwrap());
        assert_eq!(
            conn.delivery_ref(outgoing).unwrap().remote_state(),
            Some(oxamq_engine::Disposition::Accepted)
        );
    }

    #[test]
    fn test_disposition_wrapped_range_reaches_covered_ids() {
        let (mut a, outgoing) = sent_one_delivery();
        // Delivery-ids are serial numbers: [u32::MAX, 1] wraps past
        // zero and covers id 0.
        let disposition = Performative::Disposition(Disposition {
            role_receiver: true,
            first: u32::MAX,
            last: Some(1),
            settled: false,
            state: Some(oxamq_engine::Disposition::Accepted),
        });
        let frame = raw_frame(0, &disposition);
        assert_eq!(a.input(&frame).unwrap(), Some(frame.len()));

        let conn = a.connection_mut().unwrap();
        assert!(conn.delivery_updated(outgoing).unwrap());
        assert_eq!(
            conn.delivery_ref(outgoing).unwrap().remote_state(),
            Some(oxamq_engine::Disposition::Accepted)
        );
    }

    // =====================================================================
    // The full handshake
    // =====================================================================

    #[test]
    fn test_open_exchange_mirrors_identities() {
        let mut a = opened("box-a");
        let mut b = opened("box-b");
        a.connection_mut().unwrap().set_hostname("b.example");

        pump(&mut a, &mut b);
        pump(&mut b, &mut a);

        assert_eq!(b.connection().unwrap().remote_container(), Some("box-a"));
        assert_eq!(b.connection().unwrap().remote_hostname(), Some("b.example"));
        assert_eq!(a.connection().unwrap().remote_container(), Some("box-b"));
        assert_eq!(
            a.connection().unwrap().endpoint().remote(),
            EndpointState::Active
        );
    }

    #[test]
    fn test_session_and_link_handshake() {
        let mut a = opened("a");
        let mut b = opened("b");

        // A opens a session and a sender; B a session and a receiver.
        let conn = a.connection_mut().unwrap();
        let ssn_a = conn.session();
        conn.session_mut(ssn_a).unwrap().open();
        let snd = conn.sender(ssn_a, "L").unwrap();
        conn.link_mut(snd).unwrap().open();

        let conn = b.connection_mut().unwrap();
        let ssn_b = conn.session();
        conn.session_mut(ssn_b).unwrap().open();
        let rcv = conn.receiver(ssn_b, "L").unwrap();
        conn.link_mut(rcv).unwrap().open();

        pump(&mut a, &mut b);
        pump(&mut b, &mut a);
        pump(&mut a, &mut b);

        // Both ends observe the remote link as attached.
        let link_a = a.connection().unwrap().link_ref(snd).unwrap();
        assert_eq!(link_a.endpoint().remote(), EndpointState::Active);
        let link_b = b.connection().unwrap().link_ref(rcv).unwrap();
        assert_eq!(link_b.endpoint().remote(), EndpointState::Active);
    }

    #[test]
    fn test_close_condition_travels_in_close_frame() {
        let mut a = opened("a");
        let mut b = opened("b");
        pump(&mut a, &mut b);
        pump(&mut b, &mut a);

        a.connection_mut()
            .unwrap()
            .close_with(oxamq_engine::Condition::new("amqp:internal-error", "boom"));
        pump(&mut a, &mut b);

        let cond = b
            .connection()
            .unwrap()
            .endpoint()
            .remote_condition
            .clone()
            .expect("condition should arrive");
        assert_eq!(cond.name.as_str(), "amqp:internal-error");
        assert_eq!(cond.description.as_deref(), Some("boom"));
    }
}
