//! # Speechbox Core
//!
//! Streaming core for a networked speech-output peripheral.
//!
//! ## Features
//!
//! - `say`/`stop`/volume contract with stable caller-visible errors
//! - Pluggable async text-to-speech provider port
//! - Fixed-size packet emission on a strict 250 ms cadence
//! - Codec session lifecycle shared across devices
//! - Presence tracking with neighbor-power cancellation
//! - Persisted volume with absent-when-default encoding
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use speechbox_core::{
//!     spawn_ticker, DeviceConfig, NodeId, SessionManager, SpeechDevice, SpeechProvider,
//!     SpeechResult,
//! };
//!
//! #[derive(Debug)]
//! struct Flatline;
//!
//! #[async_trait::async_trait]
//! impl SpeechProvider for Flatline {
//!     async fn synthesize(&self, text: &str) -> SpeechResult<Vec<u8>> {
//!         Ok(vec![0u8; text.chars().count() * 1024])
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> SpeechResult<()> {
//!     let sessions = Arc::new(SessionManager::new());
//!     let config = DeviceConfig::new(NodeId::new("speechbox-0"));
//!     let device = Arc::new(SpeechDevice::new(config, sessions)?);
//!
//!     let worker = device.attach_provider(Arc::new(Flatline));
//!     tokio::spawn(worker.run());
//!     let ticker = spawn_ticker(Arc::clone(&device), Duration::from_millis(50));
//!
//!     device.say("Hello, world!")?;
//!     tokio::time::sleep(Duration::from_secs(5)).await;
//!     ticker.abort();
//!     Ok(())
//! }
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod chunker;
pub mod device;
pub mod error;
pub mod packet;
pub mod persist;
pub mod presence;
pub mod provider;
pub mod session;

// Re-export main types for convenience
pub use chunker::PacketChunker;
pub use device::{spawn_ticker, DeviceConfig, DeviceInfo, NodeId, SpeechDevice};
pub use error::{SpeechError, SpeechResult};
pub use packet::{AudioPacket, AudioReceiver, Direction, EmissionMonitor};
pub use persist::PersistedConfig;
pub use presence::{Adjacency, PresenceEvent, PresenceMonitor};
pub use provider::{SpeechProvider, SpeechRequest, SynthesisOutcome, SynthesisWorker};
pub use session::{SessionId, SessionManager, SessionStats};

use std::time::Duration;

/// Version information for the speechbox-core crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default packet payload size in bytes (Ethernet MTU convention)
pub const DEFAULT_PACKET_SIZE: usize = 1500;

/// Upper bound on the configurable packet size
pub const MAX_PACKET_SIZE: usize = 65_536;

/// Interval between emitted packets
pub const EMIT_INTERVAL: Duration = Duration::from_millis(250);

/// Volume a device starts with and falls back to when nothing is persisted
pub const DEFAULT_VOLUME: u8 = 127;

/// Loudest representable volume
pub const MAX_VOLUME: u8 = 127;

/// Default maximum accepted text length in characters
pub const DEFAULT_MAX_TEXT_LENGTH: usize = 8_192;
