//! The speech device controller and its streaming state machine.
//!
//! A [`SpeechDevice`] moves through three states: idle, locked (a
//! request was accepted and the provider is still synthesizing), and
//! streaming (a buffer is installed and timed packets are going out).
//! All state lives behind one mutex; the host drives progress by
//! calling [`tick`](SpeechDevice::tick) on its own cadence, and the
//! device performs its own 250 ms timing comparison against the
//! supplied instant. Synthesis outcomes and presence events arrive over
//! channels from their own tasks and are folded into the same state
//! boundary.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::chunker::PacketChunker;
use crate::error::{SpeechError, SpeechResult};
use crate::packet::{AudioPacket, AudioReceiver, Direction, EmissionMonitor};
use crate::persist::PersistedConfig;
use crate::presence::{Adjacency, PresenceEvent, PresenceMonitor};
use crate::provider::{SpeechProvider, SpeechRequest, SynthesisOutcome, SynthesisWorker};
use crate::session::{SessionId, SessionManager};
use crate::{
    DEFAULT_MAX_TEXT_LENGTH, DEFAULT_PACKET_SIZE, DEFAULT_VOLUME, EMIT_INTERVAL, MAX_PACKET_SIZE,
    MAX_VOLUME,
};

/// Identity of a machine on the device network.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeId(String);

impl NodeId {
    /// Create a node id from its network address.
    #[must_use]
    pub fn new<S: Into<String>>(address: S) -> Self {
        Self(address.into())
    }

    /// The address as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Speech device configuration
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    /// Identity of this device on the network
    pub node: NodeId,
    /// Maximum payload bytes per emitted packet
    pub packet_size: usize,
    /// Maximum accepted text length in characters
    pub max_text_length: usize,
}

impl DeviceConfig {
    /// Create a configuration with default packet size and text limit.
    #[must_use]
    pub fn new(node: NodeId) -> Self {
        Self {
            node,
            packet_size: DEFAULT_PACKET_SIZE,
            max_text_length: DEFAULT_MAX_TEXT_LENGTH,
        }
    }

    /// Set the packet size.
    ///
    /// # Errors
    ///
    /// Returns an error if `packet_size` is zero or above
    /// [`MAX_PACKET_SIZE`].
    pub fn with_packet_size(mut self, packet_size: usize) -> SpeechResult<Self> {
        if !(1..=MAX_PACKET_SIZE).contains(&packet_size) {
            return Err(SpeechError::configuration(format!(
                "Packet size must be between 1 and {MAX_PACKET_SIZE}, got {packet_size}"
            )));
        }
        self.packet_size = packet_size;
        Ok(self)
    }

    /// Set the maximum accepted text length in characters.
    ///
    /// # Errors
    ///
    /// Returns an error if `max_text_length` is zero.
    pub fn with_max_text_length(mut self, max_text_length: usize) -> SpeechResult<Self> {
        if max_text_length == 0 {
            return Err(SpeechError::configuration(
                "Maximum text length must be greater than 0".to_string(),
            ));
        }
        self.max_text_length = max_text_length;
        Ok(self)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any field is out of range.
    pub fn validate(&self) -> SpeechResult<()> {
        if !(1..=MAX_PACKET_SIZE).contains(&self.packet_size) {
            return Err(SpeechError::configuration(format!(
                "Packet size must be between 1 and {MAX_PACKET_SIZE}, got {}",
                self.packet_size
            )));
        }
        if self.max_text_length == 0 {
            return Err(SpeechError::configuration(
                "Maximum text length must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Hardware descriptor exposed to network inventory queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Device class
    pub class: &'static str,
    /// Human-readable description
    pub description: &'static str,
    /// Vendor name
    pub vendor: &'static str,
    /// Product name
    pub product: &'static str,
}

impl Default for DeviceInfo {
    fn default() -> Self {
        Self {
            class: "multimedia",
            description: "Text-To-Speech Interface",
            vendor: "DFKI",
            product: "Mary",
        }
    }
}

#[derive(Debug)]
struct DeviceState {
    valid: bool,
    locked: bool,
    stream: Option<PacketChunker>,
    session: Option<SessionId>,
    volume: u8,
    last_emit: Option<Instant>,
    request_seq: u64,
    synthesis_error: Option<SpeechError>,
}

impl DeviceState {
    fn new() -> Self {
        Self {
            valid: false,
            locked: false,
            stream: None,
            session: None,
            volume: DEFAULT_VOLUME,
            last_emit: None,
            request_seq: 0,
            synthesis_error: None,
        }
    }

    fn busy(&self) -> bool {
        self.locked || self.stream.is_some()
    }
}

#[derive(Debug)]
struct RegisteredReceiver {
    receiver: Arc<dyn AudioReceiver>,
    direction: Option<Direction>,
}

/// Networked speech-output peripheral.
///
/// Accepts one phrase at a time via [`say`](Self::say), obtains audio
/// bytes from the attached [`SpeechProvider`], and emits them as
/// fixed-size packets every 250 ms to the registered receivers plus the
/// built-in [`EmissionMonitor`].
#[derive(Debug)]
pub struct SpeechDevice {
    config: DeviceConfig,
    sessions: Arc<SessionManager>,
    state: Mutex<DeviceState>,
    requests: Mutex<Option<mpsc::UnboundedSender<SpeechRequest>>>,
    outcomes_tx: mpsc::UnboundedSender<SynthesisOutcome>,
    outcomes_rx: Mutex<mpsc::UnboundedReceiver<SynthesisOutcome>>,
    receivers: RwLock<Vec<RegisteredReceiver>>,
    monitor: EmissionMonitor,
}

impl SpeechDevice {
    /// Create a device from its configuration and the shared session
    /// manager.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: DeviceConfig, sessions: Arc<SessionManager>) -> SpeechResult<Self> {
        config.validate()?;
        let (outcomes_tx, outcomes_rx) = mpsc::unbounded_channel();
        info!(node = %config.node, packet_size = config.packet_size, "speech device created");
        Ok(Self {
            config,
            sessions,
            state: Mutex::new(DeviceState::new()),
            requests: Mutex::new(None),
            outcomes_tx,
            outcomes_rx: Mutex::new(outcomes_rx),
            receivers: RwLock::new(Vec::new()),
            monitor: EmissionMonitor::new(),
        })
    }

    /// Wire a provider to this device, returning the worker to spawn.
    ///
    /// The returned [`SynthesisWorker`] must be handed to
    /// `tokio::spawn` (or polled some other way) for [`say`](Self::say)
    /// requests to ever complete. Attaching a second provider replaces
    /// the first.
    #[must_use]
    pub fn attach_provider(&self, provider: Arc<dyn SpeechProvider>) -> SynthesisWorker {
        let (request_tx, request_rx) = mpsc::unbounded_channel();
        *self.requests.lock() = Some(request_tx);
        info!(node = %self.config.node, "speech provider attached");
        SynthesisWorker::new(provider, request_rx, self.outcomes_tx.clone())
    }

    /// Wire a presence event channel to this device.
    ///
    /// Returns the sender the network substrate pushes events into and
    /// the monitor task to spawn.
    #[must_use]
    pub fn attach_presence(
        self: &Arc<Self>,
    ) -> (mpsc::UnboundedSender<PresenceEvent>, PresenceMonitor) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        (event_tx, PresenceMonitor::new(Arc::clone(self), event_rx))
    }

    /// Request that `text` be spoken.
    ///
    /// Accepting the request only queues it; the synthesized stream
    /// starts once the provider delivers and a later
    /// [`tick`](Self::tick) installs the buffer.
    ///
    /// # Errors
    ///
    /// Returns [`SpeechError::AlreadyProcessing`] while a previous
    /// request is locked or streaming, [`SpeechError::TextTooLong`]
    /// when `text` exceeds the configured maximum, and
    /// [`SpeechError::ProviderUnavailable`] when no provider is
    /// attached or its worker is gone.
    pub fn say(&self, text: &str) -> SpeechResult<()> {
        let mut state = self.state.lock();
        if state.busy() {
            return Err(SpeechError::AlreadyProcessing);
        }
        if text.chars().count() > self.config.max_text_length {
            return Err(SpeechError::TextTooLong);
        }

        let requests = self.requests.lock();
        let Some(sender) = requests.as_ref() else {
            return Err(SpeechError::ProviderUnavailable);
        };

        state.request_seq += 1;
        state.locked = true;
        state.synthesis_error = None;
        let request = SpeechRequest {
            text: text.to_string(),
            seq: state.request_seq,
        };
        if sender.send(request).is_err() {
            state.locked = false;
            return Err(SpeechError::ProviderUnavailable);
        }
        debug!(node = %self.config.node, seq = state.request_seq, "speech request accepted");
        Ok(())
    }

    /// Stop the current speech, releasing the codec session.
    ///
    /// # Errors
    ///
    /// Returns [`SpeechError::NotTalking`] when the device is idle.
    pub fn stop(&self) -> SpeechResult<()> {
        let mut state = self.state.lock();
        if !state.busy() {
            return Err(SpeechError::NotTalking);
        }
        self.clear_stream(&mut state);
        info!(node = %self.config.node, "speech stopped");
        Ok(())
    }

    /// Whether a request is currently locked or streaming.
    #[must_use]
    pub fn is_processing(&self) -> bool {
        self.state.lock().busy()
    }

    /// Whether the device is properly connected to the network, per the
    /// most recent presence event. A fresh device is not valid until
    /// its [`PresenceEvent::SelfConnected`] arrives.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.state.lock().valid
    }

    /// Set the playback volume as a fraction of full scale.
    ///
    /// The fraction is clamped to `[0.0, 1.0]` and mapped to a byte in
    /// `[0, 127]`. Packets pick up the volume at emission time, so a
    /// change mid-stream affects the very next packet.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn set_volume(&self, fraction: f32) {
        let volume = (fraction.clamp(0.0, 1.0) * f32::from(MAX_VOLUME)) as u8;
        self.state.lock().volume = volume;
        debug!(node = %self.config.node, volume, "volume set");
    }

    /// Current playback volume in `[0, 127]`.
    #[must_use]
    pub fn volume(&self) -> u8 {
        self.state.lock().volume
    }

    /// Session id of the active stream, if any.
    #[must_use]
    pub fn current_session(&self) -> Option<SessionId> {
        self.state.lock().session
    }

    /// Collect the failure of the most recent synthesis attempt, if one
    /// happened since the last call. Presence-driven cancellations do
    /// not surface here.
    #[must_use]
    pub fn take_synthesis_error(&self) -> Option<SpeechError> {
        self.state.lock().synthesis_error.take()
    }

    /// Register an audio receiver attached on `direction` (`None` for
    /// an internal attachment with no side).
    pub fn add_receiver(&self, receiver: Arc<dyn AudioReceiver>, direction: Option<Direction>) {
        self.receivers.write().push(RegisteredReceiver {
            receiver,
            direction,
        });
    }

    /// Number of registered receivers, not counting the built-in
    /// monitor.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.receivers.read().len()
    }

    /// The built-in receiver observing this device's own output.
    #[must_use]
    pub const fn monitor(&self) -> &EmissionMonitor {
        &self.monitor
    }

    /// This device's configuration.
    #[must_use]
    pub const fn config(&self) -> &DeviceConfig {
        &self.config
    }

    /// This device's identity on the network.
    #[must_use]
    pub const fn node(&self) -> &NodeId {
        &self.config.node
    }

    /// Hardware descriptor for network inventory queries.
    #[must_use]
    pub fn device_info(&self) -> DeviceInfo {
        DeviceInfo::default()
    }

    /// Snapshot the settings worth persisting.
    #[must_use]
    pub fn persisted(&self) -> PersistedConfig {
        PersistedConfig::capture(self.volume())
    }

    /// Restore settings from a persisted snapshot.
    pub fn restore(&self, persisted: PersistedConfig) {
        self.state.lock().volume = persisted.volume();
    }

    /// Advance the device: fold in pending synthesis outcomes, then
    /// emit at most one packet if the stream is due.
    ///
    /// The host calls this on its own cadence with a monotonic `now`;
    /// the device compares against its running emission timestamp,
    /// which advances by exactly 250 ms per packet rather than
    /// resetting, so a late call never triggers a burst of catch-up
    /// packets.
    pub fn tick(&self, now: Instant) {
        self.drain_outcomes(now);
        if let Some(packet) = self.next_packet(now) {
            self.dispatch(&packet);
        }
    }

    /// Apply a presence event to the device.
    ///
    /// Called by the [`PresenceMonitor`] task, or directly by hosts
    /// that relay events synchronously.
    pub fn handle_presence(&self, event: &PresenceEvent) {
        let mut state = self.state.lock();
        match event {
            PresenceEvent::SelfConnected => {
                state.valid = true;
                info!(node = %self.config.node, "connected to network");
            }
            PresenceEvent::SelfDisconnected => {
                if state.busy() {
                    self.clear_stream(&mut state);
                    info!(node = %self.config.node, "speech cancelled by disconnect");
                }
                state.valid = false;
                info!(node = %self.config.node, "disconnected from network");
            }
            PresenceEvent::NeighborStarted { source, adjacency } => {
                self.neighbor_power(&mut state, source, *adjacency, true);
            }
            PresenceEvent::NeighborStopped { source, adjacency } => {
                self.neighbor_power(&mut state, source, *adjacency, false);
            }
        }
    }

    fn neighbor_power(
        &self,
        state: &mut DeviceState,
        source: &NodeId,
        adjacency: Adjacency,
        started: bool,
    ) {
        if adjacency != Adjacency::Direct {
            debug!(node = %self.config.node, neighbor = %source, "ignoring remote power event");
            return;
        }
        if state.busy() {
            self.clear_stream(state);
            info!(node = %self.config.node, neighbor = %source, "speech cancelled by neighbor power event");
        }
        state.valid = started;
    }

    fn drain_outcomes(&self, now: Instant) {
        let mut outcomes = self.outcomes_rx.lock();
        while let Ok(outcome) = outcomes.try_recv() {
            let mut state = self.state.lock();
            if !state.locked || outcome.seq != state.request_seq {
                warn!(node = %self.config.node, seq = outcome.seq, "discarding stale synthesis outcome");
                continue;
            }
            match outcome.result {
                Ok(buffer) => {
                    let session = self.sessions.allocate();
                    let stream = PacketChunker::new(buffer, self.config.packet_size);
                    info!(
                        node = %self.config.node,
                        session = %session,
                        bytes = stream.total_len(),
                        "synthesized stream ready"
                    );
                    state.stream = Some(stream);
                    state.session = Some(session);
                    state.last_emit = Some(now);
                    state.locked = false;
                }
                Err(err) => {
                    error!(node = %self.config.node, error = %err, "speech synthesis failed");
                    state.locked = false;
                    state.synthesis_error = Some(err);
                }
            }
        }
    }

    fn next_packet(&self, now: Instant) -> Option<AudioPacket> {
        let mut state = self.state.lock();
        state.stream.as_ref()?;
        let last_emit = state.last_emit?;
        if now.duration_since(last_emit) < EMIT_INTERVAL {
            return None;
        }
        state.last_emit = Some(last_emit + EMIT_INTERVAL);

        let payload = state.stream.as_mut().and_then(PacketChunker::next_payload);
        let Some(payload) = payload else {
            info!(node = %self.config.node, "stream exhausted");
            self.clear_stream(&mut state);
            return None;
        };
        let Some(session) = state.session else {
            self.clear_stream(&mut state);
            return None;
        };
        let packet = AudioPacket::new(session, state.volume, self.config.packet_size, payload);
        debug!(
            node = %self.config.node,
            session = %session,
            bytes = packet.payload_len(),
            "emitting packet"
        );
        Some(packet)
    }

    // Runs outside the state lock; receivers are free to block.
    fn dispatch(&self, packet: &AudioPacket) {
        self.monitor.receive_packet(packet, None);
        let receivers = self.receivers.read();
        for registered in receivers.iter() {
            if registered.receiver.connects_audio(registered.direction) {
                registered.receiver.receive_packet(packet, registered.direction);
            }
        }
    }

    fn clear_stream(&self, state: &mut DeviceState) {
        if let Some(session) = state.session.take() {
            self.sessions.release(session);
        }
        state.stream = None;
        state.locked = false;
        state.last_emit = None;
    }
}

impl Drop for SpeechDevice {
    fn drop(&mut self) {
        let mut state = self.state.lock();
        if let Some(session) = state.session.take() {
            self.sessions.release(session);
        }
    }
}

/// Spawn a task that calls [`SpeechDevice::tick`] every `period`.
///
/// The task runs until aborted; it holds its own reference to the
/// device. `period` should be comfortably below the 250 ms emission
/// interval so packet timing stays close to cadence.
pub fn spawn_ticker(device: Arc<SpeechDevice>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            device.tick(Instant::now());
        }
    })
}
