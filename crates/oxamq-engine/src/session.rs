//! Session: the multiplexing context for links within a connection.
//!
//! Sessions map to channels on the wire and carry the incoming/outgoing
//! transfer windows that bound how many frames may be in flight. The
//! engine surfaces the windows but leaves enforcement to the transport's
//! frame pacing; channel numbers are transport-assigned bookkeeping the
//! engine merely stores.

use std::fmt;

use crate::endpoint::Endpoint;

/// Index handle naming one session within its connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionHandle(usize);

impl SessionHandle {
    pub(crate) fn new(index: usize) -> Self {
        Self(index)
    }

    /// The raw index value.
    pub fn into_inner(self) -> usize {
        self.0
    }
}

impl fmt::Display for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session#{}", self.0)
    }
}

/// One session. Create with
/// [`Connection::session`](crate::Connection::session).
#[derive(Debug)]
pub struct Session {
    pub(crate) endpoint: Endpoint,
    /// How many incoming transfer frames we are prepared to buffer.
    pub incoming_window: u32,
    /// How many outgoing transfer frames we are prepared to have in
    /// flight.
    pub outgoing_window: u32,
    /// The next outgoing transfer-id.
    pub(crate) next_outgoing_id: u32,
    /// The peer's advertised windows, from its Begin frame.
    pub(crate) remote_incoming_window: u32,
    pub(crate) remote_outgoing_window: u32,
    /// Channel numbers, assigned by the transport on Begin.
    pub(crate) local_channel: Option<u16>,
    pub(crate) remote_channel: Option<u16>,
}

/// Default transfer window, generous enough that the window never
/// throttles small exchanges.
const DEFAULT_WINDOW: u32 = 2048;

impl Session {
    pub(crate) fn new() -> Self {
        Self {
            endpoint: Endpoint::default(),
            incoming_window: DEFAULT_WINDOW,
            outgoing_window: DEFAULT_WINDOW,
            next_outgoing_id: 0,
            remote_incoming_window: 0,
            remote_outgoing_window: 0,
            local_channel: None,
            remote_channel: None,
        }
    }

    /// The local/remote lifecycle state.
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Opens the session locally (emits Begin on the next output).
    pub fn open(&mut self) {
        self.endpoint.open();
    }

    /// Closes the session locally (emits End on the next output).
    /// Idempotent.
    pub fn close(&mut self) {
        self.endpoint.close();
    }

    /// The next transfer-id this session will assign.
    pub fn next_outgoing_id(&self) -> u32 {
        self.next_outgoing_id
    }

    /// Transport hook: allocates the next outgoing transfer-id.
    pub fn advance_outgoing_id(&mut self) -> u32 {
        let id = self.next_outgoing_id;
        self.next_outgoing_id = self.next_outgoing_id.wrapping_add(1);
        id
    }

    /// Transport hook: records the channel this session was assigned.
    pub fn set_local_channel(&mut self, channel: u16) {
        self.local_channel = Some(channel);
    }

    /// The peer's advertised incoming window.
    pub fn remote_incoming_window(&self) -> u32 {
        self.remote_incoming_window
    }

    /// The peer's advertised outgoing window.
    pub fn remote_outgoing_window(&self) -> u32 {
        self.remote_outgoing_window
    }

    /// The channel number this session occupies locally, once the
    /// transport has assigned one.
    pub fn local_channel(&self) -> Option<u16> {
        self.local_channel
    }

    /// The channel number the peer chose, once its Begin has arrived.
    pub fn remote_channel(&self) -> Option<u16> {
        self.remote_channel
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::EndpointState;

    #[test]
    fn test_new_session_has_default_windows_and_no_channel() {
        let s = Session::new();
        assert_eq!(s.incoming_window, DEFAULT_WINDOW);
        assert_eq!(s.outgoing_window, DEFAULT_WINDOW);
        assert_eq!(s.local_channel(), None);
        assert_eq!(s.remote_channel(), None);
        assert_eq!(s.endpoint().local(), EndpointState::Uninit);
    }

    #[test]
    fn test_open_close_monotonic() {
        let mut s = Session::new();
        s.open();
        s.close();
        s.open(); // must not reopen
        assert_eq!(s.endpoint().local(), EndpointState::Closed);
    }
}
