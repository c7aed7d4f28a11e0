use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

/// Client connection/mode states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    /// Connected; frames are requested one at a time.
    Pull,
    /// Connected; the tracker streams frames to the listener.
    Push,
}

impl ConnectionState {
    /// Check if transition from current state to target state is valid
    pub fn can_transition_to(&self, target: &ConnectionState) -> bool {
        use ConnectionState::*;

        matches!(
            (self, target),
            (Disconnected, Pull) |
            (Pull, Push) |
            (Push, Pull) |
            // close() is legal from anywhere
            (Pull, Disconnected) |
            (Push, Disconnected) |
            (Disconnected, Disconnected)
        )
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Disconnected => "Disconnected",
            Self::Pull => "Pull",
            Self::Push => "Push",
        }
    }

    pub fn is_connected(&self) -> bool {
        !matches!(self, Self::Disconnected)
    }

    fn as_u8(self) -> u8 {
        match self {
            Self::Disconnected => 0,
            Self::Pull => 1,
            Self::Push => 2,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Pull,
            2 => Self::Push,
            _ => Self::Disconnected,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Atomically updated mode shared between the controller and the listener.
///
/// Only the controller changes the mode. The listener's sole write is the
/// terminal link-lost flag.
#[derive(Debug, Default)]
pub struct ModeCell {
    state: AtomicU8,
    link_lost: AtomicBool,
}

impl ModeCell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Move to `target` if the transition table allows it from the current
    /// state. Returns the previous state, or the current one on rejection.
    pub fn transition_to(&self, target: ConnectionState) -> Result<ConnectionState, ConnectionState> {
        let mut current = self.get();
        loop {
            if !current.can_transition_to(&target) {
                return Err(current);
            }
            match self.state.compare_exchange(
                current.as_u8(),
                target.as_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Ok(current),
                Err(actual) => current = ConnectionState::from_u8(actual),
            }
        }
    }

    /// Force Disconnected and clear the link-lost flag.
    pub fn reset(&self) -> ConnectionState {
        self.link_lost.store(false, Ordering::Release);
        ConnectionState::from_u8(self.state.swap(ConnectionState::Disconnected.as_u8(), Ordering::AcqRel))
    }

    pub fn mark_link_lost(&self) {
        self.link_lost.store(true, Ordering::Release);
    }

    pub fn is_link_lost(&self) -> bool {
        self.link_lost.load(Ordering::Acquire)
    }
}
