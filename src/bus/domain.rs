//! In-process event bus.
//!
//! One broadcast topic per pipeline stage output (`frame.raw`,
//! `frame.decoded`, `event.normalized`, `error`) plus a dedicated `mpsc`
//! channel for outbound command requests. Every stage subscribes to the
//! topics it cares about without knowing who else is publishing or
//! consuming on the other side.

use tokio::sync::{broadcast, mpsc};

use crate::decoder::domain::DecodeError;
use crate::model::domain::{CommandRequest, IntermediateForm, NormalizedEvent};

/// A frame freshly arrived from the broker, not yet decoded.
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub device_family: crate::model::domain::DeviceFamily,
    pub topic: String,
    pub payload: Vec<u8>,
}

/// A decode or normalization failure, tagged with its originating
/// component, published on the `error` topic rather than interrupting the
/// pipeline.
#[derive(Debug, Clone)]
pub struct ErrorEvent {
    pub component: &'static str,
    pub message: String,
}

impl ErrorEvent {
    pub fn from_decode_error(component: &'static str, error: &DecodeError) -> Self {
        Self { component, message: error.to_string() }
    }
}

/// Capacity of the broadcast channels. Generous enough to absorb telemetry
/// bursts without one slow subscriber forcing a `RecvError::Lagged` onto
/// the others.
const BROADCAST_CAPACITY: usize = 1024;
const COMMAND_CHANNEL_CAPACITY: usize = 256;

/// The in-process bus: one `broadcast::Sender` per event topic, plus a
/// dedicated `mpsc` for outbound commands (single consumer: the command
/// builder, which in turn publishes to the broker).
#[derive(Clone)]
pub struct EventBus {
    frame_raw: broadcast::Sender<RawFrame>,
    frame_decoded: broadcast::Sender<IntermediateForm>,
    event_normalized: broadcast::Sender<NormalizedEvent>,
    command_request: mpsc::Sender<CommandRequest>,
    command_request_rx: std::sync::Arc<tokio::sync::Mutex<Option<mpsc::Receiver<CommandRequest>>>>,
    error: broadcast::Sender<ErrorEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (frame_raw, _) = broadcast::channel(BROADCAST_CAPACITY);
        let (frame_decoded, _) = broadcast::channel(BROADCAST_CAPACITY);
        let (event_normalized, _) = broadcast::channel(BROADCAST_CAPACITY);
        let (command_request, command_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let (error, _) = broadcast::channel(BROADCAST_CAPACITY);

        Self {
            frame_raw,
            frame_decoded,
            event_normalized,
            command_request,
            command_request_rx: std::sync::Arc::new(tokio::sync::Mutex::new(Some(command_rx))),
            error,
        }
    }

    pub fn publish_raw_frame(&self, frame: RawFrame) {
        let _ = self.frame_raw.send(frame);
    }

    pub fn subscribe_raw_frame(&self) -> broadcast::Receiver<RawFrame> {
        self.frame_raw.subscribe()
    }

    pub fn publish_decoded(&self, ifo: IntermediateForm) {
        let _ = self.frame_decoded.send(ifo);
    }

    pub fn subscribe_decoded(&self) -> broadcast::Receiver<IntermediateForm> {
        self.frame_decoded.subscribe()
    }

    pub fn publish_normalized(&self, event: NormalizedEvent) {
        let _ = self.event_normalized.send(event);
    }

    pub fn subscribe_normalized(&self) -> broadcast::Receiver<NormalizedEvent> {
        self.event_normalized.subscribe()
    }

    pub async fn publish_command(&self, command: CommandRequest) {
        let _ = self.command_request.send(command).await;
    }

    pub fn command_sender(&self) -> mpsc::Sender<CommandRequest> {
        self.command_request.clone()
    }

    /// Takes the command receiver, once. Only the command-builder task
    /// should call this during startup; later calls return `None`.
    pub async fn take_command_receiver(&self) -> Option<mpsc::Receiver<CommandRequest>> {
        self.command_request_rx.lock().await.take()
    }

    pub fn publish_error(&self, error: ErrorEvent) {
        let _ = self.error.send(error);
    }

    pub fn subscribe_error(&self) -> broadcast::Receiver<ErrorEvent> {
        self.error.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus").finish_non_exhaustive()
    }
}
