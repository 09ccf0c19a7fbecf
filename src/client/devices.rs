use crate::error::SessionError;
use tokio::sync::mpsc;
use voice_snake_utils::audio::AudioBuffer;
use voice_snake_utils::device::{CaptureEndpoint, PlaybackEndpoint};
use voice_snake_utils::playback::PlaybackId;

/// An open microphone. Dropping it stops the device.
pub trait CaptureStream: Send {
    /// Fixed-size mono chunks at the requested rate. `None` once taken.
    fn take_chunks(&mut self) -> Option<mpsc::Receiver<Vec<f32>>>;
}

/// An open speaker. Dropping it stops the device.
pub trait PlaybackSink: Send {
    /// Output clock in seconds.
    fn clock(&self) -> f64;

    /// Queues `buffer` to start at `start` seconds on the output clock.
    fn play_at(&mut self, buffer: &AudioBuffer, start: f64, id: PlaybackId) -> anyhow::Result<()>;

    /// Ids of buffers that finished playing. `None` once taken.
    fn take_completions(&mut self) -> Option<mpsc::UnboundedReceiver<PlaybackId>>;
}

pub trait AudioDevices: Send + Sync {
    fn open_capture(
        &self,
        sample_rate: u32,
        channels: u16,
        chunk_size: usize,
    ) -> Result<Box<dyn CaptureStream>, SessionError>;

    fn open_playback(
        &self,
        sample_rate: u32,
        channels: u16,
    ) -> Result<Box<dyn PlaybackSink>, SessionError>;
}

/// Host audio through cpal.
#[derive(Debug, Clone, Default)]
pub struct NativeAudio {
    input_device: Option<String>,
    output_device: Option<String>,
}

impl NativeAudio {
    pub fn new(input_device: Option<String>, output_device: Option<String>) -> Self {
        Self {
            input_device,
            output_device,
        }
    }
}

impl AudioDevices for NativeAudio {
    fn open_capture(
        &self,
        sample_rate: u32,
        channels: u16,
        chunk_size: usize,
    ) -> Result<Box<dyn CaptureStream>, SessionError> {
        if channels != 1 {
            return Err(SessionError::Device(format!(
                "capture supports mono only, {} channels requested",
                channels
            )));
        }
        let endpoint = CaptureEndpoint::open(self.input_device.clone(), sample_rate, chunk_size)
            .map_err(|e| SessionError::Device(format!("{:#}", e)))?;
        Ok(Box::new(endpoint))
    }

    fn open_playback(
        &self,
        sample_rate: u32,
        channels: u16,
    ) -> Result<Box<dyn PlaybackSink>, SessionError> {
        if channels != 1 {
            return Err(SessionError::Device(format!(
                "playback supports mono only, {} channels requested",
                channels
            )));
        }
        let endpoint = PlaybackEndpoint::open(self.output_device.clone(), sample_rate)
            .map_err(|e| SessionError::Device(format!("{:#}", e)))?;
        Ok(Box::new(endpoint))
    }
}

impl CaptureStream for CaptureEndpoint {
    fn take_chunks(&mut self) -> Option<mpsc::Receiver<Vec<f32>>> {
        CaptureEndpoint::take_chunks(self)
    }
}

impl PlaybackSink for PlaybackEndpoint {
    fn clock(&self) -> f64 {
        PlaybackEndpoint::clock(self)
    }

    fn play_at(&mut self, buffer: &AudioBuffer, start: f64, id: PlaybackId) -> anyhow::Result<()> {
        PlaybackEndpoint::play_at(self, buffer, start, id)
    }

    fn take_completions(&mut self) -> Option<mpsc::UnboundedReceiver<PlaybackId>> {
        PlaybackEndpoint::take_completions(self)
    }
}
