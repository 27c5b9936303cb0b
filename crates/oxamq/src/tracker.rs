//! Outcome tracking for sent and received deliveries.
//!
//! A [`Tracker`] is a stable, monotonically increasing ticket for a
//! delivery, independent of the engine's handle lifetime: handles die
//! when a delivery is reclaimed, trackers stay valid as identifiers and
//! merely stop resolving. The [`TrackerRegistry`] maps trackers back to
//! deliveries and applies outcomes individually or cumulatively, the
//! way an application acknowledges "everything up to here".

use std::collections::VecDeque;
use std::fmt;

use oxamq_engine::{Connection, DeliveryHandle, Disposition};

use crate::error::OxamqError;

/// A ticket for one tracked delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Tracker(u64);

impl Tracker {
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Tracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tracker#{}", self.0)
    }
}

/// Issues trackers and applies outcomes through them.
#[derive(Debug, Default)]
pub struct TrackerRegistry {
    next: u64,
    /// Tracked deliveries, oldest first. Invariant: tracker numbers
    /// strictly increase along the queue.
    entries: VecDeque<(u64, DeliveryHandle)>,
}

impl TrackerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issues a tracker for `delivery`.
    pub fn track(&mut self, delivery: DeliveryHandle) -> Tracker {
        let id = self.next;
        self.next += 1;
        self.entries.push_back((id, delivery));
        Tracker(id)
    }

    /// The delivery behind `tracker`, if it is still tracked.
    pub fn delivery(&self, tracker: Tracker) -> Option<DeliveryHandle> {
        self.entries
            .iter()
            .find(|(id, _)| *id == tracker.0)
            .map(|&(_, d)| d)
    }

    /// Trackers still outstanding.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Accepts one delivery, or everything up to and including
    /// `tracker` when `cumulative`. Returns how many were updated.
    pub fn accept(
        &mut self,
        connection: &mut Connection,
        tracker: Tracker,
        cumulative: bool,
    ) -> Result<usize, OxamqError> {
        self.apply(connection, tracker, cumulative, Disposition::Accepted)
    }

    /// Rejects one delivery, or everything up to and including
    /// `tracker` when `cumulative`. Returns how many were updated.
    pub fn reject(
        &mut self,
        connection: &mut Connection,
        tracker: Tracker,
        cumulative: bool,
    ) -> Result<usize, OxamqError> {
        self.apply(connection, tracker, cumulative, Disposition::Rejected)
    }

    /// Settles one delivery, or everything up to and including
    /// `tracker` when `cumulative`, and forgets the trackers. Returns
    /// how many were settled.
    pub fn settle(
        &mut self,
        connection: &mut Connection,
        tracker: Tracker,
        cumulative: bool,
    ) -> Result<usize, OxamqError> {
        let covered = self.covered(tracker, cumulative)?;
        for &(_, delivery) in &covered {
            connection.settle(delivery)?;
        }
        self.entries
            .retain(|(id, _)| !covered.iter().any(|(c, _)| c == id));
        Ok(covered.len())
    }

    fn apply(
        &mut self,
        connection: &mut Connection,
        tracker: Tracker,
        cumulative: bool,
        disposition: Disposition,
    ) -> Result<usize, OxamqError> {
        let covered = self.covered(tracker, cumulative)?;
        for &(_, delivery) in &covered {
            connection.update(delivery, disposition)?;
        }
        Ok(covered.len())
    }

    // The tracked entries an operation covers: just `tracker`, or the
    // whole prefix up to and including it.
    fn covered(
        &self,
        tracker: Tracker,
        cumulative: bool,
    ) -> Result<Vec<(u64, DeliveryHandle)>, OxamqError> {
        let pos = self
            .entries
            .iter()
            .position(|(id, _)| *id == tracker.0)
            .ok_or(OxamqError::UnknownTracker(tracker.0))?;
        let skip = if cumulative { 0 } else { pos };
        Ok(self
            .entries
            .iter()
            .take(pos + 1)
            .skip(skip)
            .copied()
            .collect())
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use oxamq_engine::EngineError;

    /// A receiver with `n` deliveries already transferred in.
    fn receiver_with(n: u32) -> (Connection, Vec<DeliveryHandle>) {
        let mut conn = Connection::new("c");
        let session = conn.session();
        let link = conn.receiver(session, "in").unwrap();
        conn.flow(link, n).unwrap();
        let mut handles = Vec::new();
        for i in 0..n {
            let tag = vec![i as u8];
            let h = conn
                .on_remote_transfer(link, &tag, i, b"payload", false, false)
                .unwrap();
            handles.push(h);
        }
        (conn, handles)
    }

    // ====================================================================
    // track() / delivery()
    // ====================================================================

    #[test]
    fn test_trackers_increase_and_resolve() {
        let (_conn, handles) = receiver_with(2);
        let mut reg = TrackerRegistry::new();
        let t0 = reg.track(handles[0]);
        let t1 = reg.track(handles[1]);
        assert!(t0 < t1);
        assert_eq!(reg.delivery(t0), Some(handles[0]));
        assert_eq!(reg.delivery(t1), Some(handles[1]));
        assert_eq!(reg.len(), 2);
    }

    // ====================================================================
    // accept() / reject()
    // ====================================================================

    #[test]
    fn test_accept_individual_updates_one() {
        let (mut conn, handles) = receiver_with(3);
        let mut reg = TrackerRegistry::new();
        let trackers: Vec<_> = handles.iter().map(|&h| reg.track(h)).collect();

        let updated = reg.accept(&mut conn, trackers[1], false).unwrap();
        assert_eq!(updated, 1);
        assert_eq!(
            conn.delivery_ref(handles[1]).unwrap().local_state(),
            Some(Disposition::Accepted)
        );
        assert_eq!(conn.delivery_ref(handles[0]).unwrap().local_state(), None);
    }

    #[test]
    fn test_accept_cumulative_updates_prefix() {
        let (mut conn, handles) = receiver_with(3);
        let mut reg = TrackerRegistry::new();
        let trackers: Vec<_> = handles.iter().map(|&h| reg.track(h)).collect();

        let updated = reg.accept(&mut conn, trackers[1], true).unwrap();
        assert_eq!(updated, 2);
        assert_eq!(conn.delivery_ref(handles[2]).unwrap().local_state(), None);
    }

    #[test]
    fn test_reject_after_accept_is_terminal() {
        let (mut conn, handles) = receiver_with(1);
        let mut reg = TrackerRegistry::new();
        let t = reg.track(handles[0]);
        reg.accept(&mut conn, t, false).unwrap();
        let err = reg.reject(&mut conn, t, false).unwrap_err();
        assert!(matches!(
            err,
            OxamqError::Engine(EngineError::DispositionTerminal { .. })
        ));
    }

    // ====================================================================
    // settle()
    // ====================================================================

    #[test]
    fn test_settle_cumulative_forgets_trackers() {
        let (mut conn, handles) = receiver_with(3);
        let mut reg = TrackerRegistry::new();
        let trackers: Vec<_> = handles.iter().map(|&h| reg.track(h)).collect();
        reg.accept(&mut conn, trackers[2], true).unwrap();

        let settled = reg.settle(&mut conn, trackers[1], true).unwrap();
        assert_eq!(settled, 2);
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.delivery(trackers[0]), None);
        assert_eq!(reg.delivery(trackers[2]), Some(handles[2]));
    }

    #[test]
    fn test_unknown_tracker_is_an_error() {
        let (mut conn, handles) = receiver_with(1);
        let mut reg = TrackerRegistry::new();
        let t = reg.track(handles[0]);
        reg.settle(&mut conn, t, false).unwrap();
        assert!(matches!(
            reg.accept(&mut conn, t, false),
            Err(OxamqError::UnknownTracker(_))
        ));
    }
}
