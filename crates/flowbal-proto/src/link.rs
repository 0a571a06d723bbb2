//! Registration handshake state between a component and its parent.

use serde::{Deserialize, Serialize};

/// Progress of a component's registration with its parent tier.
///
/// Every tier uses the same three steps: nothing sent yet, request sent and
/// waiting for the acknowledgment, acknowledged. Components only act on
/// parent-issued commands (or start reporting) once `Active`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum LinkState {
    #[default]
    Unregistered,
    AwaitingAck,
    Active,
}

impl LinkState {
    /// Record that a register request went out.
    pub fn request_sent(&mut self) {
        if *self == LinkState::Unregistered {
            *self = LinkState::AwaitingAck;
        }
    }

    /// Apply an acknowledgment. Returns `true` when this ack completed the handshake.
    pub fn acknowledge(&mut self) -> bool {
        let was_active = self.is_active();
        *self = LinkState::Active;
        !was_active
    }

    pub fn is_active(&self) -> bool {
        *self == LinkState::Active
    }

    /// Whether a register request was ever sent, so a deregistration is owed on shutdown.
    pub fn has_registered(&self) -> bool {
        *self != LinkState::Unregistered
    }
}
