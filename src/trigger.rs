//! Edge trigger over the per-frame "object of interest present" condition.
//!
//! Two states, `Absent` and `Present`, starting `Absent` whatever the first
//! frame holds. Only the `Absent -> Present` edge carries a signal byte; the
//! `Present -> Absent` edge is reported for logging but sends nothing, so the
//! external device sees one byte per contiguous run of present frames.

/// Byte sent on every `Absent -> Present` edge.
pub const SIGNAL_BYTE: u8 = b'A';

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PresenceState {
    #[default]
    Absent,
    Present,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Edge {
    /// `Absent -> Present`.
    Rising,
    /// `Present -> Absent`.
    Falling,
}

impl Edge {
    /// Byte to put on the link for this edge, if any.
    pub fn signal(self) -> Option<u8> {
        match self {
            Edge::Rising => Some(SIGNAL_BYTE),
            Edge::Falling => None,
        }
    }
}

impl PresenceState {
    /// Transition function: next state and the edge taken, if any.
    pub fn advance(self, any_of_interest: bool) -> (PresenceState, Option<Edge>) {
        match (self, any_of_interest) {
            (PresenceState::Absent, true) => (PresenceState::Present, Some(Edge::Rising)),
            (PresenceState::Present, false) => (PresenceState::Absent, Some(Edge::Falling)),
            (state, _) => (state, None),
        }
    }
}

/// Owner of the single presence state for a run.
#[derive(Debug, Default)]
pub struct EdgeTrigger {
    state: PresenceState,
}

impl EdgeTrigger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> PresenceState {
        self.state
    }

    /// Feed one frame's condition; returns the edge taken, if any.
    pub fn update(&mut self, any_of_interest: bool) -> Option<Edge> {
        let (next, edge) = self.state.advance(any_of_interest);
        self.state = next;
        edge
    }
}
