//! Network presence events and the monitor task that applies them.
//!
//! The device-network substrate relays connect/disconnect and neighbor
//! power transitions as [`PresenceEvent`]s. A [`PresenceMonitor`] owns
//! the receiving half of the event channel and feeds each event into
//! the device, which cancels in-progress speech and updates its
//! validity accordingly. Neighbor events matter only when the source is
//! directly adjacent; remote machines elsewhere on the network are
//! ignored.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::device::{NodeId, SpeechDevice};

/// Relationship between the event source and this device on the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Adjacency {
    /// The source sits directly beside this device
    Direct,
    /// The source is reachable but not adjacent
    Remote,
}

/// One presence notification relayed from the network substrate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresenceEvent {
    /// This device finished joining the network
    SelfConnected,
    /// This device was removed from the network
    SelfDisconnected,
    /// A machine on the network powered on
    NeighborStarted {
        /// Identity of the machine that started
        source: NodeId,
        /// Its relationship to this device
        adjacency: Adjacency,
    },
    /// A machine on the network powered off
    NeighborStopped {
        /// Identity of the machine that stopped
        source: NodeId,
        /// Its relationship to this device
        adjacency: Adjacency,
    },
}

impl PresenceEvent {
    /// Stable name of the event kind for log fields.
    #[must_use]
    pub const fn event_name(&self) -> &'static str {
        match self {
            Self::SelfConnected => "self_connected",
            Self::SelfDisconnected => "self_disconnected",
            Self::NeighborStarted { .. } => "neighbor_started",
            Self::NeighborStopped { .. } => "neighbor_stopped",
        }
    }

    /// Whether this is a neighbor power transition rather than a
    /// self connect/disconnect.
    #[must_use]
    pub const fn is_neighbor_event(&self) -> bool {
        matches!(
            self,
            Self::NeighborStarted { .. } | Self::NeighborStopped { .. }
        )
    }
}

/// Task body that drains presence events into a device.
///
/// Obtained from [`SpeechDevice::attach_presence`] and handed to
/// `tokio::spawn`; the loop ends when every sender is dropped.
///
/// [`SpeechDevice::attach_presence`]: crate::device::SpeechDevice::attach_presence
#[derive(Debug)]
pub struct PresenceMonitor {
    device: Arc<SpeechDevice>,
    events: mpsc::UnboundedReceiver<PresenceEvent>,
}

impl PresenceMonitor {
    /// Wire a monitor between an event channel and a device.
    #[must_use]
    pub fn new(device: Arc<SpeechDevice>, events: mpsc::UnboundedReceiver<PresenceEvent>) -> Self {
        Self { device, events }
    }

    /// Apply events until every sender is dropped.
    pub async fn run(mut self) {
        while let Some(event) = self.events.recv().await {
            tracing::debug!(event = event.event_name(), "presence event");
            self.device.handle_presence(&event);
        }
        tracing::debug!("presence monitor stopped");
    }
}
