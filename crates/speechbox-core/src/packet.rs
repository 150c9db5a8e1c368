//! Audio packets and the receiver seam they are dispatched through.
//!
//! The device never interprets synthesized audio; it wraps each payload
//! slice in an [`AudioPacket`] and hands it to every registered
//! [`AudioReceiver`] that accepts audio from the direction it is
//! attached on. An [`EmissionMonitor`] is always subscribed internally
//! so the device can observe its own output.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::session::SessionId;

/// Playback duration units carried per packet byte (8 bits, 4 units each).
pub const PACKET_DURATION_MULTIPLIER: u32 = 8 * 4;

/// Attachment side of a receiver on the six-sided device network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Below the device
    Down,
    /// Above the device
    Up,
    /// North side
    North,
    /// South side
    South,
    /// West side
    West,
    /// East side
    East,
}

impl Direction {
    /// All six directions, in declaration order.
    pub const ALL: [Self; 6] = [
        Self::Down,
        Self::Up,
        Self::North,
        Self::South,
        Self::West,
        Self::East,
    ];

    /// The side facing back toward this one.
    #[must_use]
    pub const fn opposite(self) -> Self {
        match self {
            Self::Down => Self::Up,
            Self::Up => Self::Down,
            Self::North => Self::South,
            Self::South => Self::North,
            Self::West => Self::East,
            Self::East => Self::West,
        }
    }
}

/// One timed slice of synthesized audio plus its playback metadata.
///
/// `duration_units` is derived from the configured packet size, not the
/// payload length, so a truncated final packet still advances playback
/// clocks by a full interval on the receiving side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioPacket {
    /// Session the packet belongs to
    pub source_id: SessionId,
    /// Volume at emission time, `0..=127`
    pub volume: u8,
    /// Fixed playback duration in codec units
    pub duration_units: u32,
    /// Opaque audio bytes, at most the configured packet size
    pub payload: Vec<u8>,
}

impl AudioPacket {
    /// Build a packet for `payload` emitted under `session` at `volume`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn new(source_id: SessionId, volume: u8, packet_size: usize, payload: Vec<u8>) -> Self {
        Self {
            source_id,
            volume,
            duration_units: (packet_size as u32).saturating_mul(PACKET_DURATION_MULTIPLIER),
            payload,
        }
    }

    /// Payload length in bytes.
    #[must_use]
    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }
}

/// Sink for emitted audio packets.
///
/// Implementations declare via [`connects_audio`](Self::connects_audio)
/// whether they accept audio arriving from a given side; `None` means
/// an internal attachment with no side.
pub trait AudioReceiver: Send + Sync + fmt::Debug {
    /// Whether this receiver accepts audio arriving from `direction`.
    fn connects_audio(&self, direction: Option<Direction>) -> bool;

    /// Deliver one packet arriving from `direction`.
    fn receive_packet(&self, packet: &AudioPacket, direction: Option<Direction>);
}

/// Always-subscribed internal receiver modelling the device hearing its
/// own output.
///
/// Keeps running packet/byte counters and the most recent packet so
/// hosts and tests can observe emission without wiring a real sink.
#[derive(Debug, Default)]
pub struct EmissionMonitor {
    packets: AtomicU64,
    bytes: AtomicU64,
    last_packet: Mutex<Option<AudioPacket>>,
}

impl EmissionMonitor {
    /// Create a monitor with zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Total packets observed since creation or the last reset.
    #[must_use]
    pub fn packet_count(&self) -> u64 {
        self.packets.load(Ordering::Relaxed)
    }

    /// Total payload bytes observed since creation or the last reset.
    #[must_use]
    pub fn byte_count(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }

    /// The most recent packet observed, if any.
    #[must_use]
    pub fn last_packet(&self) -> Option<AudioPacket> {
        self.last_packet.lock().clone()
    }

    /// Zero the counters and forget the last packet.
    pub fn reset(&self) {
        self.packets.store(0, Ordering::Relaxed);
        self.bytes.store(0, Ordering::Relaxed);
        *self.last_packet.lock() = None;
    }
}

impl AudioReceiver for EmissionMonitor {
    fn connects_audio(&self, _direction: Option<Direction>) -> bool {
        true
    }

    fn receive_packet(&self, packet: &AudioPacket, _direction: Option<Direction>) {
        self.packets.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(packet.payload.len() as u64, Ordering::Relaxed);
        *self.last_packet.lock() = Some(packet.clone());
    }
}
