//! cpal-backed capture and playback endpoints.
//!
//! cpal streams are not `Send`, so each endpoint owns its stream on a
//! dedicated thread and tears it down when the endpoint is dropped.

use crate::audio::{create_resampler, shared_buffer, AudioBuffer, StreamResampler};
use crate::playback::PlaybackId;
use anyhow::Context;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, StreamConfig};
use ringbuf::traits::{Consumer, Producer, Split};
use rubato::Resampler;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{mpsc as std_mpsc, Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::mpsc;

/// How often the capture thread drains the device ring buffer.
const CAPTURE_POLL_INTERVAL: Duration = Duration::from_millis(20);
/// Seconds of device audio the capture ring buffer can hold.
const CAPTURE_BUFFER_SECONDS: usize = 2;
/// Input frames fed to the capture resampler per pass.
const RESAMPLER_CHUNK_SIZE: usize = 1024;
/// Input frames fed to the playback resampler per pass. Whatever is left
/// over at the end of a reply (at most one chunk) is never played.
const PLAYBACK_RESAMPLER_CHUNK_SIZE: usize = 240;

fn get_host() -> cpal::Host {
    cpal::default_host()
}

pub fn get_or_default_input(device_name: Option<String>) -> anyhow::Result<Device> {
    let host = get_host();
    tracing::debug!("Host: {:?}", host.id());
    let target = match device_name {
        Some(name) => name,
        None => host
            .default_input_device()
            .context("no default input device")?
            .name()?,
    };

    host.input_devices()?
        .find(|d| d.name().is_ok_and(|name| name == target))
        .ok_or_else(|| anyhow::anyhow!("No target input device found: {}", target))
}

pub fn get_or_default_output(device_name: Option<String>) -> anyhow::Result<Device> {
    let host = get_host();
    let target = match device_name {
        Some(name) => name,
        None => host
            .default_output_device()
            .context("no default output device")?
            .name()?,
    };

    host.output_devices()?
        .find(|d| d.name().is_ok_and(|name| name == target))
        .ok_or_else(|| anyhow::anyhow!("No target output device found: {}", target))
}

pub fn get_available_inputs() -> anyhow::Result<String> {
    let host = get_host();
    let default_device = host.default_input_device().and_then(|d| d.name().ok());

    let mut device_names: Vec<String> = Vec::new();
    for in_device in host.input_devices()? {
        let d_name = in_device.name()?;
        let d_cfg = in_device.default_input_config()?;
        let mut d = format!(" * {}({}ch, {}hz)", d_name, d_cfg.channels(), d_cfg.sample_rate().0);
        if default_device.as_deref() == Some(d_name.as_str()) {
            d.push_str(" [default]");
        }
        device_names.push(d);
    }
    Ok(device_names.join("\n"))
}

pub fn get_available_outputs() -> anyhow::Result<String> {
    let host = get_host();
    let default_device = host.default_output_device().and_then(|d| d.name().ok());

    let mut device_names: Vec<String> = Vec::new();
    for out_device in host.output_devices()? {
        let d_name = out_device.name()?;
        let d_cfg = out_device.default_output_config()?;
        let mut d = format!(" * {}({}ch, {}hz)", d_name, d_cfg.channels(), d_cfg.sample_rate().0);
        if default_device.as_deref() == Some(d_name.as_str()) {
            d.push_str(" [default]");
        }
        device_names.push(d);
    }
    Ok(device_names.join("\n"))
}

/// Microphone capture delivering fixed-size mono chunks at a target rate.
pub struct CaptureEndpoint {
    chunks: Option<mpsc::Receiver<Vec<f32>>>,
    stop_tx: Option<std_mpsc::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl CaptureEndpoint {
    /// Opens the input device and starts streaming. Fails if the device is
    /// missing or refuses to open (ex: permission denied).
    pub fn open(
        device_name: Option<String>,
        target_rate: u32,
        chunk_size: usize,
    ) -> anyhow::Result<Self> {
        let (chunk_tx, chunk_rx) = mpsc::channel::<Vec<f32>>(64);
        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();
        let (ready_tx, ready_rx) = std_mpsc::channel::<anyhow::Result<()>>();

        let thread = std::thread::Builder::new()
            .name("capture".to_string())
            .spawn(move || {
                let running = match start_capture(device_name, target_rate) {
                    Ok(running) => {
                        let _ = ready_tx.send(Ok(()));
                        running
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                capture_loop(running, chunk_size, chunk_tx, stop_rx);
            })
            .context("failed to spawn capture thread")?;

        ready_rx
            .recv()
            .context("capture thread exited before reporting status")??;

        Ok(Self {
            chunks: Some(chunk_rx),
            stop_tx: Some(stop_tx),
            thread: Some(thread),
        })
    }

    /// Hands out the chunk receiver. Returns `None` once taken.
    pub fn take_chunks(&mut self) -> Option<mpsc::Receiver<Vec<f32>>> {
        self.chunks.take()
    }
}

impl Drop for CaptureEndpoint {
    fn drop(&mut self) {
        // Dropping the sender wakes the capture thread.
        self.stop_tx.take();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!("capture thread panicked");
            }
        }
        tracing::debug!("capture endpoint closed");
    }
}

struct RunningCapture {
    _stream: cpal::Stream,
    samples: ringbuf::HeapCons<f32>,
    resampler: Option<rubato::FastFixedIn<f32>>,
}

fn start_capture(device_name: Option<String>, target_rate: u32) -> anyhow::Result<RunningCapture> {
    let input = get_or_default_input(device_name)?;
    tracing::info!("Using input device: {:?}", input.name()?);

    let input_config: StreamConfig = input
        .default_input_config()
        .context("Failed to get default input config")?
        .config();
    let channels = input_config.channels as usize;
    let device_rate = input_config.sample_rate.0;
    tracing::info!("Input stream config: {:?}", &input_config);

    let (mut producer, consumer) = shared_buffer(device_rate as usize * CAPTURE_BUFFER_SECONDS).split();

    let input_data_fn = move |data: &[f32], _: &cpal::InputCallbackInfo| {
        let mut dropped = 0usize;
        for frame in data.chunks(channels.max(1)) {
            let mono = frame.iter().sum::<f32>() / frame.len() as f32;
            if producer.try_push(mono).is_err() {
                dropped += 1;
            }
        }
        if dropped > 0 {
            tracing::warn!("capture buffer full, dropped {} samples", dropped);
        }
    };

    let stream = input
        .build_input_stream(
            &input_config,
            input_data_fn,
            move |err| tracing::error!("An error occurred on input stream: {}", err),
            None,
        )
        .context("Failed to open input stream")?;
    stream.play().context("Failed to start input stream")?;

    let resampler = if device_rate == target_rate {
        None
    } else {
        Some(create_resampler(
            device_rate as f64,
            target_rate as f64,
            RESAMPLER_CHUNK_SIZE,
        )?)
    };

    Ok(RunningCapture {
        _stream: stream,
        samples: consumer,
        resampler,
    })
}

fn capture_loop(
    mut running: RunningCapture,
    chunk_size: usize,
    chunk_tx: mpsc::Sender<Vec<f32>>,
    stop_rx: std_mpsc::Receiver<()>,
) {
    let mut raw: VecDeque<f32> = VecDeque::new();
    let mut pending: Vec<f32> = Vec::with_capacity(chunk_size * 2);

    loop {
        match stop_rx.recv_timeout(CAPTURE_POLL_INTERVAL) {
            Err(std_mpsc::RecvTimeoutError::Timeout) => {}
            _ => break,
        }

        while let Some(sample) = running.samples.try_pop() {
            raw.push_back(sample);
        }

        match running.resampler.as_mut() {
            Some(resampler) => {
                while raw.len() >= resampler.input_frames_next() {
                    let frames: Vec<f32> = raw.drain(..resampler.input_frames_next()).collect();
                    match resampler.process(&[frames.as_slice()], None) {
                        Ok(out) => {
                            if let Some(channel) = out.first() {
                                pending.extend_from_slice(channel);
                            }
                        }
                        Err(e) => tracing::warn!("failed to resample capture audio: {}", e),
                    }
                }
            }
            None => pending.extend(raw.drain(..)),
        }

        while pending.len() >= chunk_size {
            let chunk: Vec<f32> = pending.drain(..chunk_size).collect();
            match chunk_tx.try_send(chunk) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::warn!("capture consumer is behind, dropping chunk");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => return,
            }
        }
    }
}

struct QueuedBuffer {
    id: PlaybackId,
    start_frame: u64,
    samples: Vec<f32>,
    position: usize,
}

#[derive(Default)]
struct PlaybackQueue {
    buffers: VecDeque<QueuedBuffer>,
}

impl PlaybackQueue {
    /// Fills one device callback starting at frame `clock` and returns the
    /// clock after it. Finished buffers are reported on `done_tx`.
    fn render(
        &mut self,
        data: &mut [f32],
        channels: usize,
        mut clock: u64,
        done_tx: &mpsc::UnboundedSender<PlaybackId>,
    ) -> u64 {
        for frame in data.chunks_mut(channels.max(1)) {
            while self
                .buffers
                .front()
                .is_some_and(|front| front.position >= front.samples.len())
            {
                if let Some(done) = self.buffers.pop_front() {
                    let _ = done_tx.send(done.id);
                }
            }
            let mut sample = 0.0;
            if let Some(front) = self.buffers.front_mut() {
                if front.start_frame <= clock {
                    sample = front.samples.get(front.position).copied().unwrap_or(0.0);
                    front.position += 1;
                }
            }
            frame.fill(sample);
            clock += 1;
        }
        clock
    }
}

/// Turns decoded buffers into device-rate queue entries.
///
/// One resampler runs across buffers. A buffer that starts where the
/// previous one ends is chained to it: it carries no start gate and plays
/// straight after its predecessor, so back-to-back speech is rendered as
/// one continuous signal.
struct PlaybackFeed {
    device_rate: u32,
    resampler: Option<StreamResampler>,
    /// Nominal device frame where the last queued buffer ends.
    queued_end: Option<u64>,
}

impl PlaybackFeed {
    fn new(sample_rate: u32, device_rate: u32) -> anyhow::Result<Self> {
        let resampler = if sample_rate == device_rate {
            None
        } else {
            tracing::info!("resampling playback from {}hz to {}hz", sample_rate, device_rate);
            Some(StreamResampler::new(sample_rate, device_rate, PLAYBACK_RESAMPLER_CHUNK_SIZE)?)
        };
        Ok(Self {
            device_rate,
            resampler,
            queued_end: None,
        })
    }

    fn prepare(&mut self, buffer: &AudioBuffer, start: f64, id: PlaybackId) -> anyhow::Result<QueuedBuffer> {
        let start_frame = (start * self.device_rate as f64).round().max(0.0) as u64;
        let length = (buffer.duration() * self.device_rate as f64).round() as u64;
        let chained = self
            .queued_end
            .is_some_and(|end| start_frame.abs_diff(end) <= 1);
        self.queued_end = Some(start_frame + length);

        Ok(QueuedBuffer {
            id,
            start_frame: if chained { 0 } else { start_frame },
            samples: self.convert(buffer, chained)?,
            position: 0,
        })
    }

    fn convert(&mut self, buffer: &AudioBuffer, chained: bool) -> anyhow::Result<Vec<f32>> {
        let mono = buffer.to_mono();
        if buffer.sample_rate == self.device_rate {
            return Ok(mono);
        }
        if self
            .resampler
            .as_ref()
            .map_or(true, |resampler| resampler.from_rate() != buffer.sample_rate)
        {
            tracing::debug!(rate = buffer.sample_rate, "new playback resampler");
            self.resampler = Some(StreamResampler::new(
                buffer.sample_rate,
                self.device_rate,
                PLAYBACK_RESAMPLER_CHUNK_SIZE,
            )?);
        }
        let Some(resampler) = self.resampler.as_mut() else {
            return Ok(mono);
        };
        if !chained {
            // Leftovers belong to a reply that has already finished.
            resampler.reset();
        }
        resampler.push(&mono)
    }
}

/// Speaker output that renders buffers at explicit start times on its own
/// clock and reports each buffer once it has been fully played.
pub struct PlaybackEndpoint {
    queue: Arc<Mutex<PlaybackQueue>>,
    frames_played: Arc<AtomicU64>,
    device_rate: u32,
    feed: PlaybackFeed,
    completions: Option<mpsc::UnboundedReceiver<PlaybackId>>,
    stop_tx: Option<std_mpsc::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl PlaybackEndpoint {
    /// Opens the output device for buffers recorded at `sample_rate`.
    pub fn open(device_name: Option<String>, sample_rate: u32) -> anyhow::Result<Self> {
        let queue = Arc::new(Mutex::new(PlaybackQueue::default()));
        let frames_played = Arc::new(AtomicU64::new(0));
        let (done_tx, done_rx) = mpsc::unbounded_channel::<PlaybackId>();
        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();
        let (ready_tx, ready_rx) = std_mpsc::channel::<anyhow::Result<u32>>();

        let thread_queue = queue.clone();
        let thread_frames = frames_played.clone();
        let thread = std::thread::Builder::new()
            .name("playback".to_string())
            .spawn(move || {
                let stream = match start_playback(device_name, thread_queue, thread_frames, done_tx) {
                    Ok((stream, rate)) => {
                        let _ = ready_tx.send(Ok(rate));
                        stream
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                // Blocks until the endpoint drops its sender.
                let _ = stop_rx.recv();
                drop(stream);
            })
            .context("failed to spawn playback thread")?;

        let device_rate = ready_rx
            .recv()
            .context("playback thread exited before reporting status")??;

        Ok(Self {
            queue,
            frames_played,
            device_rate,
            feed: PlaybackFeed::new(sample_rate, device_rate)?,
            completions: Some(done_rx),
            stop_tx: Some(stop_tx),
            thread: Some(thread),
        })
    }

    /// Output clock in seconds since the stream started.
    pub fn clock(&self) -> f64 {
        self.frames_played.load(Ordering::Acquire) as f64 / self.device_rate as f64
    }

    /// Queues `buffer` to start at `start` seconds on the output clock.
    pub fn play_at(&mut self, buffer: &AudioBuffer, start: f64, id: PlaybackId) -> anyhow::Result<()> {
        let queued = self.feed.prepare(buffer, start, id)?;
        self.queue
            .lock()
            .map_err(|_| anyhow::anyhow!("playback queue poisoned"))?
            .buffers
            .push_back(queued);
        Ok(())
    }

    pub fn take_completions(&mut self) -> Option<mpsc::UnboundedReceiver<PlaybackId>> {
        self.completions.take()
    }
}

impl Drop for PlaybackEndpoint {
    fn drop(&mut self) {
        self.stop_tx.take();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!("playback thread panicked");
            }
        }
        tracing::debug!("playback endpoint closed");
    }
}

fn start_playback(
    device_name: Option<String>,
    queue: Arc<Mutex<PlaybackQueue>>,
    frames_played: Arc<AtomicU64>,
    done_tx: mpsc::UnboundedSender<PlaybackId>,
) -> anyhow::Result<(cpal::Stream, u32)> {
    let output = get_or_default_output(device_name)?;
    tracing::info!("Using output device: {:?}", output.name()?);

    let output_config: StreamConfig = output
        .default_output_config()
        .context("Failed to get default output config")?
        .config();
    let channels = (output_config.channels as usize).max(1);
    let device_rate = output_config.sample_rate.0;
    tracing::info!("Output stream config: {:?}", &output_config);

    let output_data_fn = move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
        let clock = frames_played.load(Ordering::Acquire);
        let Ok(mut queue) = queue.lock() else {
            data.fill(0.0);
            return;
        };
        let clock = queue.render(data, channels, clock, &done_tx);
        frames_played.store(clock, Ordering::Release);
    };

    let stream = output
        .build_output_stream(
            &output_config,
            output_data_fn,
            move |err| tracing::error!("An error occurred on output stream: {}", err),
            None,
        )
        .context("Failed to open output stream")?;
    stream.play().context("Failed to start output stream")?;

    Ok((stream, device_rate))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn speech(frames: usize, sample_rate: u32) -> AudioBuffer {
        AudioBuffer {
            samples: vec![0.5; frames],
            sample_rate,
            channels: 1,
        }
    }

    #[test]
    fn back_to_back_buffers_are_chained() {
        let mut feed = PlaybackFeed::new(24000, 48000).unwrap();

        let first = feed.prepare(&speech(2400, 24000), 1.0, 1).unwrap();
        let second = feed.prepare(&speech(2400, 24000), 1.1, 2).unwrap();

        assert_eq!(first.start_frame, 48000);
        assert_eq!(second.start_frame, 0);
        assert!((second.samples.len() as i64 - 4800).abs() <= 2);
        assert!(second.samples.iter().all(|s| (s - 0.5).abs() < 1e-3));
    }

    #[test]
    fn late_buffer_starts_a_new_signal() {
        let mut feed = PlaybackFeed::new(24000, 48000).unwrap();
        let first = feed.prepare(&speech(2400, 24000), 0.0, 1).unwrap();

        let later = feed.prepare(&speech(2400, 24000), 5.0, 2).unwrap();

        assert_eq!(later.start_frame, 240000);
        // The filter starts from silence again, like the very first buffer.
        assert_eq!(later.samples.len(), first.samples.len());
        assert_eq!(later.samples[0], first.samples[0]);
    }

    #[test]
    fn matching_rates_pass_through() {
        let mut feed = PlaybackFeed::new(48000, 48000).unwrap();
        let queued = feed.prepare(&speech(480, 48000), 0.5, 7).unwrap();
        assert_eq!(queued.start_frame, 24000);
        assert_eq!(queued.samples.len(), 480);
    }

    #[test]
    fn chained_buffers_render_without_a_gap() {
        let mut feed = PlaybackFeed::new(24000, 48000).unwrap();
        let mut queue = PlaybackQueue::default();
        queue.buffers.push_back(feed.prepare(&speech(2400, 24000), 0.0, 1).unwrap());
        queue.buffers.push_back(feed.prepare(&speech(2400, 24000), 0.1, 2).unwrap());
        let queued: usize = queue.buffers.iter().map(|b| b.samples.len()).sum();

        let (done_tx, mut done_rx) = mpsc::unbounded_channel();
        let mut out = vec![0.0; 2 * 12000];
        let clock = queue.render(&mut out, 2, 0, &done_tx);

        assert_eq!(clock, 12000);
        // Once the signal is up, it stays up until both buffers are played.
        let first_loud = out.iter().position(|s| *s > 0.4).unwrap();
        assert!(first_loud < 2 * 16);
        assert!(out[first_loud..2 * queued].iter().all(|s| *s > 0.4));
        assert!(out[2 * queued..].iter().all(|s| *s == 0.0));
        assert_eq!(done_rx.try_recv().unwrap(), 1);
        assert_eq!(done_rx.try_recv().unwrap(), 2);
    }

    #[test]
    fn gated_buffer_waits_for_its_start_frame() {
        let mut queue = PlaybackQueue::default();
        queue.buffers.push_back(QueuedBuffer {
            id: 3,
            start_frame: 4,
            samples: vec![1.0; 2],
            position: 0,
        });
        let (done_tx, mut done_rx) = mpsc::unbounded_channel();

        let mut out = vec![0.0; 8];
        let clock = queue.render(&mut out, 1, 0, &done_tx);

        assert_eq!(clock, 8);
        assert_eq!(out, vec![0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 0.0, 0.0]);
        assert_eq!(done_rx.try_recv().unwrap(), 3);
    }
}
