use anyhow::Context;
use base64::Engine;
use ringbuf::HeapRb;
use rubato::{FastFixedIn, PolynomialDegree, Resampler};
use voice_snake_types::audio::{pcm_mime_type, Base64EncodedAudioBytes, Blob};

/// Samples per captured chunk handed to the encoder.
pub const CAPTURE_CHUNK_SIZE: usize = 4096;

/// Weight of the previous level in the volume moving average.
const VOLUME_DECAY: f32 = 0.8;

/// Decoded audio ready to be scheduled on an output device.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    /// Interleaved samples in [-1, 1].
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioBuffer {
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels.max(1) as usize
    }

    /// Playback length in seconds.
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }

    /// First channel only.
    pub fn to_mono(&self) -> Vec<f32> {
        self.samples
            .iter()
            .step_by(self.channels.max(1) as usize)
            .copied()
            .collect()
    }
}

pub fn create_resampler(in_sampling_rate: f64, out_sampling_rate: f64, chunk_size: usize) -> anyhow::Result<FastFixedIn<f32>> {
    let resampler = FastFixedIn::<f32>::new(
        out_sampling_rate / in_sampling_rate,
        1.0,
        PolynomialDegree::Cubic,
        chunk_size,
        1
    )?;
    Ok(resampler)
}

/// Mono resampler for a continuous signal delivered in pieces. Input that
/// does not fill a whole chunk is held until the next push, so the filter
/// state carries across piece boundaries.
pub struct StreamResampler {
    resampler: FastFixedIn<f32>,
    from_rate: u32,
    pending: Vec<f32>,
}

impl StreamResampler {
    pub fn new(from_rate: u32, to_rate: u32, chunk_size: usize) -> anyhow::Result<Self> {
        Ok(Self {
            resampler: create_resampler(from_rate as f64, to_rate as f64, chunk_size)?,
            from_rate,
            pending: Vec::with_capacity(chunk_size * 2),
        })
    }

    pub fn from_rate(&self) -> u32 {
        self.from_rate
    }

    /// Input frames waiting for a full chunk.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Appends `samples` to the stream and returns every output frame that
    /// is ready.
    pub fn push(&mut self, samples: &[f32]) -> anyhow::Result<Vec<f32>> {
        self.pending.extend_from_slice(samples);
        let mut out = Vec::new();
        while self.pending.len() >= self.resampler.input_frames_next() {
            let needed = self.resampler.input_frames_next();
            let processed = self.resampler.process(&[&self.pending[..needed]], None)?;
            if let Some(channel) = processed.first() {
                out.extend_from_slice(channel);
            }
            self.pending.drain(..needed);
        }
        Ok(out)
    }

    /// Starts a new signal: drops held input and clears the filter history.
    pub fn reset(&mut self) {
        self.pending.clear();
        self.resampler.reset();
    }
}

pub fn shared_buffer(size: usize) -> HeapRb<f32> {
    HeapRb::new(size)
}

/// Quantizes samples to 16-bit little-endian PCM. Out-of-range input is
/// clamped first so it cannot wrap around.
pub fn encode_pcm16(pcm32: &[f32]) -> Vec<u8> {
    pcm32
        .iter()
        .flat_map(|&sample| {
            let sample = if sample.is_nan() { 0.0 } else { sample.clamp(-1.0, 1.0) };
            ((sample * i16::MAX as f32).round() as i16).to_le_bytes()
        })
        .collect()
}

pub fn encode(pcm32: &[f32]) -> Base64EncodedAudioBytes {
    base64::engine::general_purpose::STANDARD.encode(encode_pcm16(pcm32))
}

/// Encodes a captured chunk into the tagged frame sent as realtime input.
pub fn encode_frame(pcm32: &[f32], sample_rate: u32) -> Blob {
    Blob::new(pcm_mime_type(sample_rate), encode(pcm32))
}

pub fn decode_pcm16(pcm16: &[u8]) -> anyhow::Result<Vec<f32>> {
    if pcm16.len() % 2 != 0 {
        anyhow::bail!("PCM16 payload has odd length {}", pcm16.len());
    }
    Ok(pcm16
        .chunks_exact(2)
        .map(|chunk| i16::from_le_bytes([chunk[0], chunk[1]]) as f32 / 32768.0)
        .collect())
}

/// Decodes an inbound base64 PCM16 payload into a playable buffer.
pub fn decode(fragment: &str, sample_rate: u32, channels: u16) -> anyhow::Result<AudioBuffer> {
    let pcm16 = base64::engine::general_purpose::STANDARD
        .decode(fragment)
        .context("invalid base64 audio payload")?;
    let samples = decode_pcm16(&pcm16)?;
    Ok(AudioBuffer {
        samples,
        sample_rate,
        channels,
    })
}

/// Root mean square of the sample magnitudes.
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f32 = samples.iter().map(|s| s * s).sum();
    (sum / samples.len() as f32).sqrt()
}

/// Exponentially smoothed input level for visualization.
#[derive(Debug, Clone, Default)]
pub struct VolumeMeter {
    level: f32,
}

impl VolumeMeter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one chunk and returns the smoothed level in [0, 1].
    pub fn update(&mut self, samples: &[f32]) -> f32 {
        let current = rms(samples);
        self.level = (self.level * VOLUME_DECAY + current * (1.0 - VOLUME_DECAY)).clamp(0.0, 1.0);
        self.level
    }

    pub fn level(&self) -> f32 {
        self.level
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn encode_clamps_instead_of_wrapping() {
        let bytes = encode_pcm16(&[2.0, -2.0, 0.0]);
        let values: Vec<i16> = bytes
            .chunks_exact(2)
            .map(|c| i16::from_le_bytes([c[0], c[1]]))
            .collect();
        assert_eq!(values, vec![i16::MAX, -i16::MAX, 0]);
    }

    #[test]
    fn frame_is_tagged_with_rate() {
        let frame = encode_frame(&[0.0; 4], 16000);
        assert_eq!(frame.mime_type(), "audio/pcm;rate=16000");
        assert_eq!(frame.data(), encode(&[0.0; 4]));
    }

    #[test]
    fn decode_rejects_malformed_payloads() {
        assert!(decode("not base64!!", 24000, 1).is_err());
        // three bytes: valid base64, odd PCM16 length
        assert!(decode("AAAA", 24000, 1).is_err());
    }

    #[test]
    fn decoded_buffer_reports_duration() {
        let payload = encode(&vec![0.25; 2400]);
        let buffer = decode(&payload, 24000, 1).unwrap();
        assert_eq!(buffer.frames(), 2400);
        assert!((buffer.duration() - 0.1).abs() < 1e-9);
    }

    #[test]
    fn rms_of_constant_signal_is_its_magnitude() {
        assert_eq!(rms(&[]), 0.0);
        assert!((rms(&[0.5, -0.5, 0.5, -0.5]) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn volume_meter_smooths_towards_input() {
        let mut meter = VolumeMeter::new();
        let first = meter.update(&[1.0; 16]);
        assert!((first - 0.2).abs() < 1e-6);
        let second = meter.update(&[1.0; 16]);
        assert!((second - 0.36).abs() < 1e-6);
        let quiet = meter.update(&[0.0; 16]);
        assert!(quiet < second);
    }

    #[test]
    fn stream_resampler_joins_pieces_without_loss() {
        let mut resampler = StreamResampler::new(24000, 48000, 240).unwrap();
        let first = resampler.push(&[0.5; 2400]).unwrap();
        let second = resampler.push(&[0.5; 2400]).unwrap();

        assert_eq!(resampler.pending(), 0);
        // Only the very start of the stream pays the filter delay.
        assert!(first.len() >= 4800 - 16 && first.len() <= 4800);
        assert!((second.len() as i64 - 4800).abs() <= 2);
        assert!(second[..16].iter().all(|s| (s - 0.5).abs() < 1e-3));
        assert!(second.iter().all(|s| (s - 0.5).abs() < 1e-3));
    }

    #[test]
    fn stream_resampler_holds_partial_chunks() {
        let mut resampler = StreamResampler::new(24000, 48000, 240).unwrap();
        assert!(resampler.push(&[0.5; 100]).unwrap().is_empty());
        assert_eq!(resampler.pending(), 100);

        let out = resampler.push(&[0.5; 200]).unwrap();
        assert!(!out.is_empty());
        assert_eq!(resampler.pending(), 60);

        resampler.reset();
        assert_eq!(resampler.pending(), 0);
        assert_eq!(resampler.from_rate(), 24000);
    }

    proptest! {
        #[test]
        fn samples_round_trip_within_quantization(samples in prop::collection::vec(-1.0f32..=1.0, 0..512)) {
            let buffer = decode(&encode(&samples), 16000, 1).unwrap();
            prop_assert_eq!(buffer.samples.len(), samples.len());
            for (a, b) in samples.iter().zip(buffer.samples.iter()) {
                prop_assert!((a - b).abs() <= 2.0 / 32768.0);
            }
        }

        #[test]
        fn frames_round_trip_exactly(raw in prop::collection::vec(any::<i16>(), 0..512)) {
            let bytes: Vec<u8> = raw.iter().flat_map(|v| v.to_le_bytes()).collect();
            let payload = base64::engine::general_purpose::STANDARD.encode(&bytes);
            let buffer = decode(&payload, 24000, 1).unwrap();
            let reencoded = encode(&buffer.samples);
            let decoded = base64::engine::general_purpose::STANDARD.decode(reencoded).unwrap();
            let back: Vec<i16> = decoded.chunks_exact(2).map(|c| i16::from_le_bytes([c[0], c[1]])).collect();
            for (a, b) in raw.iter().zip(back.iter()) {
                prop_assert!((*a as i32 - *b as i32).abs() <= 1);
            }
        }
    }
}
