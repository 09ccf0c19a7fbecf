use crate::command::ControlAction;
use crate::error::SessionError;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use voice_snake_types::audio::{Blob, INPUT_SAMPLE_RATE, OUTPUT_SAMPLE_RATE};
use voice_snake_types::{ClientMessage, FunctionCall, FunctionResponse, RealtimeInput, ServerMessage, Setup, ToolResponse};
use voice_snake_utils::audio::{self, VolumeMeter, CAPTURE_CHUNK_SIZE};
use voice_snake_utils::playback::{PlaybackId, PlaybackScheduler};

mod config;
mod consts;
mod devices;
mod transport;
mod utils;

pub use config::{Config, ConfigBuilder};
pub use consts::{DEFAULT_MODEL, GEMINI_API_KEY, TOOL_NAME};
pub use devices::{AudioDevices, CaptureStream, NativeAudio, PlaybackSink};
pub use transport::{Connection, Inbound, Transport, WsTransport};
pub use utils::{build_request, build_setup, control_tool};

use consts::{CAPTURE_CHANNELS, PLAYBACK_CHANNELS, TOOL_ACK, TOOL_ACTION_PARAM};

/// Notifications for the host UI.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Connected (`true`) or disconnected (`false`).
    Status(bool),
    /// Human-readable reason the session failed.
    Error(String),
    /// Smoothed microphone level in [0, 1].
    Volume(f32),
    /// A recognized voice command.
    Control(ControlAction),
}

pub type EventTx = mpsc::UnboundedSender<SessionEvent>;

fn emit(events: &EventTx, event: SessionEvent) {
    if events.send(event).is_err() {
        tracing::trace!("session event dropped, host is gone");
    }
}

/// Everything owned by one connection. Dropping it aborts the session's
/// tasks and releases the microphone, which joins the capture thread.
struct ActiveSession {
    generation: u64,
    _capture: Box<dyn CaptureStream>,
    tasks: Vec<JoinHandle<()>>,
}

impl Drop for ActiveSession {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

type SharedSession = Arc<Mutex<Option<ActiveSession>>>;

fn lock(state: &SharedSession) -> MutexGuard<'_, Option<ActiveSession>> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Owns the voice session: microphone capture, the remote connection,
/// inbound dispatch and speech playback.
pub struct SessionManager<T, D> {
    transport: T,
    devices: D,
    setup: Setup,
    events: EventTx,
    state: SharedSession,
    generation: AtomicU64,
}

impl<T: Transport, D: AudioDevices> SessionManager<T, D> {
    pub fn new(transport: T, devices: D, setup: Setup, events: EventTx) -> Self {
        Self {
            transport,
            devices,
            setup,
            events,
            state: Arc::new(Mutex::new(None)),
            generation: AtomicU64::new(0),
        }
    }

    pub fn is_connected(&self) -> bool {
        lock(&self.state).is_some()
    }

    /// Starts a fresh session, replacing any previous one. Failures are
    /// reported as [`SessionEvent::Error`] and leave nothing behind.
    pub async fn connect(&self) -> Result<(), SessionError> {
        self.stop().await;

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::info!(generation, "connecting voice session");

        if let Err(e) = self.open(generation).await {
            tracing::error!("failed to start voice session: {}", e);
            emit(&self.events, SessionEvent::Error(e.to_string()));
            emit(&self.events, SessionEvent::Status(false));
            return Err(e);
        }
        Ok(())
    }

    async fn open(&self, generation: u64) -> Result<(), SessionError> {
        let mut capture = self
            .devices
            .open_capture(INPUT_SAMPLE_RATE, CAPTURE_CHANNELS, CAPTURE_CHUNK_SIZE)?;
        let chunks = capture
            .take_chunks()
            .ok_or_else(|| SessionError::Device("capture stream already taken".to_string()))?;

        let mut playback = self.devices.open_playback(OUTPUT_SAMPLE_RATE, PLAYBACK_CHANNELS)?;
        let completions = playback.take_completions();

        let connection = match self.transport.open(self.setup.clone()).await {
            Ok(connection) => connection,
            Err(e) => {
                release((capture, playback)).await;
                return Err(e);
            }
        };
        let (outbound, mut inbound, io_tasks) = connection.into_parts();

        // From here on, dropping `session` releases everything acquired above.
        let session = ActiveSession {
            generation,
            _capture: capture,
            tasks: io_tasks,
        };
        if let Err(e) = wait_for_setup(&mut inbound).await {
            release((session, playback)).await;
            return Err(e);
        }

        *lock(&self.state) = Some(session);
        tracing::info!(generation, "voice session open");
        emit(&self.events, SessionEvent::Status(true));

        let capture_task = tokio::spawn(stream_capture(chunks, outbound.clone(), self.events.clone()));
        let dispatcher = Dispatcher {
            generation,
            outbound,
            events: self.events.clone(),
            state: self.state.clone(),
            playback,
            completions,
            scheduler: PlaybackScheduler::new(),
        };
        let dispatch_task = tokio::spawn(dispatcher.run(inbound));

        let mut state = lock(&self.state);
        match state.as_mut().filter(|s| s.generation == generation) {
            Some(session) => session.tasks.extend([capture_task, dispatch_task]),
            // Already torn down by the dispatcher.
            None => {
                capture_task.abort();
                dispatch_task.abort();
            }
        }
        Ok(())
    }

    /// Tears the session down. Safe to call repeatedly or without a session.
    pub async fn stop(&self) {
        let Some(mut session) = lock(&self.state).take() else {
            return;
        };
        let generation = session.generation;
        let tasks = std::mem::take(&mut session.tasks);
        for task in &tasks {
            task.abort();
        }
        release(session).await;
        for task in tasks {
            // Cancelled tasks report a JoinError; that is the expected outcome.
            let _ = task.await;
        }
        tracing::info!(generation, "voice session stopped");
        emit(&self.events, SessionEvent::Status(false));
    }
}

/// Drops `devices` on the blocking pool, since closing an endpoint joins
/// its device thread.
async fn release<R: Send + 'static>(devices: R) {
    if tokio::task::spawn_blocking(move || drop(devices)).await.is_err() {
        tracing::error!("releasing the audio devices panicked");
    }
}

async fn wait_for_setup(inbound: &mut mpsc::Receiver<Inbound>) -> Result<(), SessionError> {
    loop {
        match inbound.recv().await {
            Some(Inbound::Message(message)) if message.is_setup_complete() => return Ok(()),
            Some(Inbound::Message(_)) => {
                tracing::debug!("ignoring message received before setup completed");
            }
            Some(Inbound::Closed(reason)) => return Err(SessionError::Closed(reason)),
            Some(Inbound::Failed(e)) => return Err(SessionError::Connection(e)),
            None => return Err(SessionError::Closed(None)),
        }
    }
}

/// Streams captured chunks as realtime input. Sends never wait on earlier
/// sends; the single writer keeps them in capture order.
async fn stream_capture(
    mut chunks: mpsc::Receiver<Vec<f32>>,
    outbound: mpsc::Sender<ClientMessage>,
    events: EventTx,
) {
    let mut meter = VolumeMeter::new();
    while let Some(chunk) = chunks.recv().await {
        emit(&events, SessionEvent::Volume(meter.update(&chunk)));

        let frame = audio::encode_frame(&chunk, INPUT_SAMPLE_RATE);
        match outbound.try_send(ClientMessage::RealtimeInput(RealtimeInput::audio(frame))) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                tracing::warn!("outbound queue full, dropping audio chunk");
            }
            Err(TrySendError::Closed(_)) => break,
        }
    }
    tracing::debug!("capture stream finished");
}

struct Dispatcher {
    generation: u64,
    outbound: mpsc::Sender<ClientMessage>,
    events: EventTx,
    state: SharedSession,
    playback: Box<dyn PlaybackSink>,
    completions: Option<mpsc::UnboundedReceiver<PlaybackId>>,
    scheduler: PlaybackScheduler,
}

async fn next_completion(completions: &mut Option<mpsc::UnboundedReceiver<PlaybackId>>) -> Option<PlaybackId> {
    match completions {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

impl Dispatcher {
    async fn run(mut self, mut inbound: mpsc::Receiver<Inbound>) {
        loop {
            let next = tokio::select! {
                next = inbound.recv() => next,
                Some(id) = next_completion(&mut self.completions) => {
                    self.scheduler.complete(id);
                    continue;
                }
            };
            match next {
                Some(Inbound::Message(message)) => self.handle_message(message),
                Some(Inbound::Closed(reason)) => return self.fail(SessionError::Closed(reason)),
                Some(Inbound::Failed(e)) => return self.fail(SessionError::Connection(e)),
                None => return self.fail(SessionError::Closed(None)),
            }
        }
    }

    fn handle_message(&mut self, message: ServerMessage) {
        if let Some(tool_call) = message.tool_call() {
            for call in tool_call.function_calls() {
                self.handle_function_call(call);
            }
        }
        if let Some(cancellation) = message.tool_call_cancellation() {
            tracing::debug!(ids = ?cancellation.ids(), "tool calls cancelled after being applied");
        }
        for blob in message.audio_payloads() {
            self.play(blob);
        }
        if message.server_content().is_some_and(|c| c.interrupted()) {
            tracing::debug!("model turn interrupted");
        }
        if let Some(go_away) = message.go_away() {
            tracing::warn!(time_left = ?go_away.time_left(), "server will close the session soon");
        }
    }

    fn handle_function_call(&self, call: &FunctionCall) {
        if call.name() != TOOL_NAME {
            tracing::debug!(name = call.name(), "ignoring unknown function call");
            return;
        }

        match call.arg_str(TOOL_ACTION_PARAM).map(str::parse::<ControlAction>) {
            Some(Ok(action)) => {
                tracing::info!(%action, "voice command");
                emit(&self.events, SessionEvent::Control(action));
            }
            Some(Err(e)) => tracing::debug!("{}", e),
            None => tracing::debug!("{} call without an action", TOOL_NAME),
        }

        // The action is already applied; the acknowledgement is not awaited.
        let ack = ClientMessage::ToolResponse(ToolResponse::new(vec![FunctionResponse::result(
            call, TOOL_ACK,
        )]));
        let outbound = self.outbound.clone();
        let ack_task = tokio::spawn(async move {
            if let Err(e) = outbound.send(ack).await {
                tracing::debug!("tool response not sent: {}", e);
            }
        });
        self.track(ack_task);
    }

    /// Hands `task` to the session so teardown aborts it.
    fn track(&self, task: JoinHandle<()>) {
        let mut state = lock(&self.state);
        match state.as_mut().filter(|s| s.generation == self.generation) {
            Some(session) => {
                session.tasks.retain(|t| !t.is_finished());
                session.tasks.push(task);
            }
            None => task.abort(),
        }
    }

    fn play(&mut self, blob: &Blob) {
        let sample_rate = blob.sample_rate().unwrap_or(OUTPUT_SAMPLE_RATE);
        let buffer = match audio::decode(blob.data(), sample_rate, PLAYBACK_CHANNELS) {
            Ok(buffer) => buffer,
            Err(e) => {
                tracing::warn!("dropping malformed audio payload: {:#}", e);
                return;
            }
        };

        let slot = self.scheduler.schedule(buffer.duration(), self.playback.clock());
        if let Err(e) = self.playback.play_at(&buffer, slot.start, slot.id) {
            tracing::warn!("failed to queue audio for playback: {:#}", e);
            self.scheduler.complete(slot.id);
        }
    }

    /// Remote close or transport failure: report it and tear the session
    /// down exactly like `stop()` would.
    fn fail(&mut self, error: SessionError) {
        tracing::error!(generation = self.generation, "voice session ended: {}", error);
        emit(&self.events, SessionEvent::Error(error.to_string()));

        let session = {
            let mut state = lock(&self.state);
            if state.as_ref().is_some_and(|s| s.generation == self.generation) {
                state.take()
            } else {
                None
            }
        };
        if let Some(session) = session {
            // Joining the capture thread blocks; this task is aborted by it.
            tokio::task::spawn_blocking(move || drop(session));
            emit(&self.events, SessionEvent::Status(false));
        }
    }
}
