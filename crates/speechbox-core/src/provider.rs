//! Text-to-speech provider port and the worker that drives it.
//!
//! The device never calls a provider directly. [`SpeechDevice::say`]
//! pushes a [`SpeechRequest`] to a [`SynthesisWorker`] running as its
//! own task; the worker awaits the provider and pushes a
//! [`SynthesisOutcome`] back over a channel the device drains during
//! `tick`. Each request carries a sequence number so an outcome that
//! arrives after its request was cancelled can be recognized and
//! discarded.
//!
//! [`SpeechDevice::say`]: crate::device::SpeechDevice::say

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::SpeechResult;

/// Port to an external text-to-speech engine.
///
/// Implementations turn a text phrase into raw audio bytes in whatever
/// codec the surrounding audio network expects; the device treats the
/// bytes as opaque. Failures should be reported as
/// [`SpeechError::Synthesis`](crate::SpeechError::Synthesis).
#[async_trait]
pub trait SpeechProvider: Send + Sync + fmt::Debug {
    /// Synthesize `text` into raw audio bytes.
    ///
    /// # Errors
    ///
    /// Returns an error when the provider cannot produce audio for the
    /// given text.
    async fn synthesize(&self, text: &str) -> SpeechResult<Vec<u8>>;
}

/// One accepted speech request on its way to the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeechRequest {
    /// Text to synthesize
    pub text: String,
    /// Generation counter tying the eventual outcome to this request
    pub seq: u64,
}

/// Result of one synthesis attempt, tagged with its request sequence.
#[derive(Debug)]
pub struct SynthesisOutcome {
    /// Sequence number of the request that produced this outcome
    pub seq: u64,
    /// The synthesized bytes, or the provider failure
    pub result: SpeechResult<Vec<u8>>,
}

/// Task body that pulls requests, awaits the provider, and pushes
/// outcomes back to the device.
///
/// Obtained from [`SpeechDevice::attach_provider`] and handed to
/// `tokio::spawn`; the loop ends when the device side of either channel
/// is dropped.
///
/// [`SpeechDevice::attach_provider`]: crate::device::SpeechDevice::attach_provider
#[derive(Debug)]
pub struct SynthesisWorker {
    provider: Arc<dyn SpeechProvider>,
    requests: mpsc::UnboundedReceiver<SpeechRequest>,
    outcomes: mpsc::UnboundedSender<SynthesisOutcome>,
}

impl SynthesisWorker {
    /// Wire a worker between a provider and a request/outcome channel pair.
    #[must_use]
    pub fn new(
        provider: Arc<dyn SpeechProvider>,
        requests: mpsc::UnboundedReceiver<SpeechRequest>,
        outcomes: mpsc::UnboundedSender<SynthesisOutcome>,
    ) -> Self {
        Self {
            provider,
            requests,
            outcomes,
        }
    }

    /// Serve requests until the device drops its end of the channels.
    pub async fn run(mut self) {
        while let Some(request) = self.requests.recv().await {
            tracing::debug!(seq = request.seq, chars = request.text.chars().count(), "synthesizing");
            let result = self.provider.synthesize(&request.text).await;
            let outcome = SynthesisOutcome {
                seq: request.seq,
                result,
            };
            if self.outcomes.send(outcome).is_err() {
                break;
            }
        }
        tracing::debug!("synthesis worker stopped");
    }
}
