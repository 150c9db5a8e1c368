//! Integration tests for the speechbox-core crate

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use speechbox_core::{
    spawn_ticker, Adjacency, AudioPacket, AudioReceiver, DeviceConfig, Direction, EmissionMonitor,
    NodeId, PresenceEvent, SessionManager, SpeechDevice, SpeechError, SpeechProvider, SpeechResult,
    EMIT_INTERVAL,
};

/// Provider producing a fixed number of bytes per input character.
#[derive(Debug)]
struct ToneProvider {
    bytes_per_char: usize,
}

#[async_trait]
impl SpeechProvider for ToneProvider {
    async fn synthesize(&self, text: &str) -> SpeechResult<Vec<u8>> {
        Ok(vec![0x55; text.chars().count() * self.bytes_per_char])
    }
}

/// Provider that always fails.
#[derive(Debug)]
struct BrokenProvider;

#[async_trait]
impl SpeechProvider for BrokenProvider {
    async fn synthesize(&self, _text: &str) -> SpeechResult<Vec<u8>> {
        Err(SpeechError::synthesis("no acoustic model loaded"))
    }
}

/// Provider that takes a while before delivering.
#[derive(Debug)]
struct SlowProvider {
    delay: Duration,
}

#[async_trait]
impl SpeechProvider for SlowProvider {
    async fn synthesize(&self, _text: &str) -> SpeechResult<Vec<u8>> {
        tokio::time::sleep(self.delay).await;
        Ok(vec![0u8; 4096])
    }
}

/// Receiver that refuses every direction.
#[derive(Debug, Default)]
struct DeafSink {
    received: AtomicU64,
}

impl AudioReceiver for DeafSink {
    fn connects_audio(&self, _direction: Option<Direction>) -> bool {
        false
    }

    fn receive_packet(&self, _packet: &AudioPacket, _direction: Option<Direction>) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

fn speech_device(
    provider: Arc<dyn SpeechProvider>,
    sessions: &Arc<SessionManager>,
) -> Arc<SpeechDevice> {
    init_tracing();
    let config = DeviceConfig::new(NodeId::new("speechbox-0"));
    let device =
        Arc::new(SpeechDevice::new(config, Arc::clone(sessions)).expect("valid device config"));
    let worker = device.attach_provider(provider);
    tokio::spawn(worker.run());
    device
}

/// Tick with a fixed instant until the synthesized stream installs.
async fn wait_for_stream(device: &SpeechDevice, install_at: Instant) {
    for _ in 0..500 {
        device.tick(install_at);
        if device.current_session().is_some() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    panic!("synthesized stream never arrived");
}

#[tokio::test]
async fn test_full_speech_stream_lifecycle() {
    let sessions = Arc::new(SessionManager::new());
    let device = speech_device(Arc::new(ToneProvider { bytes_per_char: 640 }), &sessions);

    let start = Instant::now();
    device.say("hello").expect("say should be accepted");
    assert!(device.is_processing());

    // 5 characters at 640 bytes each: a 3200 byte stream.
    wait_for_stream(&device, start).await;
    assert_eq!(sessions.active_count(), 1);

    // Just before the interval nothing goes out.
    device.tick(start + Duration::from_millis(249));
    assert_eq!(device.monitor().packet_count(), 0);

    device.tick(start + EMIT_INTERVAL);
    assert_eq!(device.monitor().packet_count(), 1);
    let first = device.monitor().last_packet().expect("first packet");
    assert_eq!(first.payload_len(), 1500);
    assert_eq!(first.duration_units, 1500 * 32);

    // A request in the middle of the stream is rejected too.
    assert_eq!(device.say("again"), Err(SpeechError::AlreadyProcessing));

    // Same instant again: the next packet is not yet due.
    device.tick(start + EMIT_INTERVAL);
    assert_eq!(device.monitor().packet_count(), 1);

    device.tick(start + EMIT_INTERVAL * 2);
    device.tick(start + EMIT_INTERVAL * 3);
    assert_eq!(device.monitor().packet_count(), 3);
    assert_eq!(device.monitor().byte_count(), 3200);
    let last = device.monitor().last_packet().expect("final packet");
    assert_eq!(last.payload_len(), 200);
    assert!(device.is_processing());

    // Exhaustion is observed one interval after the final packet.
    device.tick(start + EMIT_INTERVAL * 4);
    assert!(!device.is_processing());
    assert!(device.current_session().is_none());
    assert_eq!(sessions.active_count(), 0);
}

#[tokio::test]
async fn test_late_ticks_emit_one_packet_each() {
    let sessions = Arc::new(SessionManager::new());
    let device = speech_device(Arc::new(ToneProvider { bytes_per_char: 640 }), &sessions);

    let start = Instant::now();
    device.say("hello").expect("say should be accepted");
    wait_for_stream(&device, start).await;

    // A host that went away for ten seconds still gets one packet per
    // call, not a forty packet burst.
    let late = start + Duration::from_secs(10);
    device.tick(late);
    assert_eq!(device.monitor().packet_count(), 1);
    device.tick(late);
    assert_eq!(device.monitor().packet_count(), 2);
}

#[tokio::test]
async fn test_volume_applies_at_emission_time() {
    let sessions = Arc::new(SessionManager::new());
    let device = speech_device(Arc::new(ToneProvider { bytes_per_char: 1500 }), &sessions);

    let start = Instant::now();
    device.say("hi").expect("say should be accepted");
    wait_for_stream(&device, start).await;

    device.set_volume(1.0);
    device.tick(start + EMIT_INTERVAL);
    assert_eq!(device.monitor().last_packet().expect("packet").volume, 127);

    device.set_volume(0.25);
    device.tick(start + EMIT_INTERVAL * 2);
    assert_eq!(device.monitor().last_packet().expect("packet").volume, 31);
}

#[tokio::test]
async fn test_say_while_synthesizing_is_rejected() {
    let sessions = Arc::new(SessionManager::new());
    let device = speech_device(
        Arc::new(SlowProvider {
            delay: Duration::from_millis(200),
        }),
        &sessions,
    );

    device.say("first").expect("first say should be accepted");
    assert_eq!(device.say("second"), Err(SpeechError::AlreadyProcessing));
}

#[tokio::test]
async fn test_stop_mid_stream_releases_everything() {
    let sessions = Arc::new(SessionManager::new());
    let device = speech_device(Arc::new(ToneProvider { bytes_per_char: 640 }), &sessions);

    let start = Instant::now();
    device.say("hello").expect("say should be accepted");
    wait_for_stream(&device, start).await;
    device.tick(start + EMIT_INTERVAL);
    assert_eq!(device.monitor().packet_count(), 1);

    device.stop().expect("stop while streaming");
    assert!(!device.is_processing());
    assert_eq!(sessions.active_count(), 0);

    device.tick(start + EMIT_INTERVAL * 2);
    assert_eq!(device.monitor().packet_count(), 1);

    // The device is immediately ready for the next phrase.
    device.say("next").expect("say after stop");
}

#[tokio::test]
async fn test_neighbor_stop_cancels_stream() {
    let sessions = Arc::new(SessionManager::new());
    let device = speech_device(Arc::new(ToneProvider { bytes_per_char: 640 }), &sessions);
    device.handle_presence(&PresenceEvent::SelfConnected);

    let start = Instant::now();
    device.say("hello").expect("say should be accepted");
    wait_for_stream(&device, start).await;
    device.tick(start + EMIT_INTERVAL);
    assert_eq!(device.monitor().packet_count(), 1);

    device.handle_presence(&PresenceEvent::NeighborStopped {
        source: NodeId::new("neighbor"),
        adjacency: Adjacency::Direct,
    });
    assert!(!device.is_processing());
    assert!(!device.is_valid());
    assert_eq!(sessions.active_count(), 0);

    // Later ticks find nothing left to emit.
    device.tick(start + EMIT_INTERVAL * 2);
    assert_eq!(device.monitor().packet_count(), 1);
}

#[tokio::test]
async fn test_disconnect_mid_stream_releases_session() {
    let sessions = Arc::new(SessionManager::new());
    let device = speech_device(Arc::new(ToneProvider { bytes_per_char: 640 }), &sessions);
    device.handle_presence(&PresenceEvent::SelfConnected);

    let start = Instant::now();
    device.say("hello").expect("say should be accepted");
    wait_for_stream(&device, start).await;
    assert_eq!(sessions.active_count(), 1);

    device.handle_presence(&PresenceEvent::SelfDisconnected);
    assert!(!device.is_valid());
    assert!(!device.is_processing());
    assert_eq!(sessions.active_count(), 0);
}

#[tokio::test]
async fn test_outcome_after_stop_is_discarded() {
    let sessions = Arc::new(SessionManager::new());
    let device = speech_device(
        Arc::new(SlowProvider {
            delay: Duration::from_millis(50),
        }),
        &sessions,
    );

    device.say("cancelled").expect("say should be accepted");
    device.stop().expect("stop while locked");
    assert!(!device.is_processing());

    // Let the provider finish, then make sure its late delivery does
    // not start playback.
    tokio::time::sleep(Duration::from_millis(150)).await;
    let start = Instant::now();
    for i in 0..5u32 {
        device.tick(start + EMIT_INTERVAL * i);
    }
    assert!(!device.is_processing());
    assert_eq!(device.monitor().packet_count(), 0);
    assert_eq!(sessions.active_count(), 0);
    assert!(device.take_synthesis_error().is_none());
}

#[tokio::test]
async fn test_provider_failure_returns_to_idle() {
    let sessions = Arc::new(SessionManager::new());
    let device = speech_device(Arc::new(BrokenProvider), &sessions);

    device.say("anything").expect("say should be accepted");

    let start = Instant::now();
    let mut failure = None;
    for _ in 0..500 {
        device.tick(start);
        if let Some(err) = device.take_synthesis_error() {
            failure = Some(err);
            break;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    assert_eq!(
        failure,
        Some(SpeechError::synthesis("no acoustic model loaded"))
    );
    assert!(!device.is_processing());
    assert_eq!(device.monitor().packet_count(), 0);

    // The device accepts a new request after the failure.
    assert!(device.say("retry").is_ok());
}

#[tokio::test]
async fn test_receivers_filtered_by_connectivity() {
    let sessions = Arc::new(SessionManager::new());
    let device = speech_device(Arc::new(ToneProvider { bytes_per_char: 300 }), &sessions);

    let open = Arc::new(EmissionMonitor::new());
    let deaf = Arc::new(DeafSink::default());
    device.add_receiver(Arc::clone(&open) as Arc<dyn AudioReceiver>, Some(Direction::Up));
    device.add_receiver(Arc::clone(&deaf) as Arc<dyn AudioReceiver>, Some(Direction::Down));

    let start = Instant::now();
    device.say("ab").expect("say should be accepted");
    wait_for_stream(&device, start).await;
    device.tick(start + EMIT_INTERVAL);

    assert_eq!(device.monitor().packet_count(), 1);
    assert_eq!(open.packet_count(), 1);
    assert_eq!(deaf.received.load(Ordering::Relaxed), 0);
}

#[tokio::test]
async fn test_empty_synthesis_completes_without_packets() {
    let sessions = Arc::new(SessionManager::new());
    let device = speech_device(Arc::new(ToneProvider { bytes_per_char: 640 }), &sessions);

    let start = Instant::now();
    device.say("").expect("empty say should be accepted");
    wait_for_stream(&device, start).await;

    device.tick(start + EMIT_INTERVAL);
    assert_eq!(device.monitor().packet_count(), 0);
    assert!(!device.is_processing());
    assert_eq!(sessions.active_count(), 0);
}

#[tokio::test]
async fn test_two_devices_share_session_namespace() {
    let sessions = Arc::new(SessionManager::new());
    let a = speech_device(Arc::new(ToneProvider { bytes_per_char: 640 }), &sessions);
    let b = speech_device(Arc::new(ToneProvider { bytes_per_char: 640 }), &sessions);

    let start = Instant::now();
    a.say("hello").expect("say should be accepted");
    b.say("world").expect("say should be accepted");
    wait_for_stream(&a, start).await;
    wait_for_stream(&b, start).await;

    assert_eq!(sessions.active_count(), 2);
    assert_ne!(a.current_session(), b.current_session());
}

#[tokio::test]
async fn test_presence_monitor_task_applies_events() {
    let sessions = Arc::new(SessionManager::new());
    let device = speech_device(Arc::new(ToneProvider { bytes_per_char: 640 }), &sessions);
    let (events, monitor) = device.attach_presence();
    tokio::spawn(monitor.run());

    events
        .send(PresenceEvent::SelfConnected)
        .expect("event channel open");
    for _ in 0..500 {
        if device.is_valid() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    assert!(device.is_valid());

    events
        .send(PresenceEvent::SelfDisconnected)
        .expect("event channel open");
    for _ in 0..500 {
        if !device.is_valid() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    assert!(!device.is_valid());
}

#[tokio::test]
async fn test_spawn_ticker_streams_to_completion() {
    let sessions = Arc::new(SessionManager::new());
    let device = speech_device(Arc::new(ToneProvider { bytes_per_char: 300 }), &sessions);
    let ticker = spawn_ticker(Arc::clone(&device), Duration::from_millis(20));

    // 600 bytes fit in a single packet.
    device.say("ab").expect("say should be accepted");
    tokio::time::sleep(Duration::from_millis(900)).await;

    assert_eq!(device.monitor().packet_count(), 1);
    assert_eq!(device.monitor().byte_count(), 600);
    assert!(!device.is_processing());
    ticker.abort();
}

#[test]
fn test_constants() {
    assert_eq!(speechbox_core::DEFAULT_PACKET_SIZE, 1500);
    assert_eq!(speechbox_core::MAX_PACKET_SIZE, 65_536);
    assert_eq!(speechbox_core::EMIT_INTERVAL, Duration::from_millis(250));
    assert_eq!(speechbox_core::DEFAULT_VOLUME, 127);
    assert_eq!(speechbox_core::MAX_VOLUME, 127);
    assert_eq!(speechbox_core::DEFAULT_MAX_TEXT_LENGTH, 8_192);
    assert!(!speechbox_core::VERSION.is_empty());
}
