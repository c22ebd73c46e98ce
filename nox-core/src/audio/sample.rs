//! Decoded PCM samples and the store that owns them.
//!
//! Decoding follows the container's magic bytes:
//! - `RIFF....WAVE` goes through `hound` (8..=32-bit integer or 32-bit float).
//! - `qoaf` goes through `qoaudio`.
//!
//! Everything is normalized to interleaved `f32` in `[-1, 1]`.

use std::io::Cursor;
use std::sync::Arc;

use tracing::debug;

use crate::error::{NoxError, ResourceKind, Result};
use crate::resource::{HandleTable, Resource};

pub type SampleId = u32;

/// An immutable PCM buffer.
///
/// Never empty, and `pcm.len()` is always a multiple of `channels`, so any frame-aligned
/// index below `frames()` can be read without bounds surprises.
#[derive(Debug)]
pub struct SampleBuffer {
    pcm: Vec<f32>,
    rate: u32,
    channels: u16,
}

impl SampleBuffer {
    /// Build a buffer from interleaved PCM. A trailing partial frame is dropped.
    pub fn from_pcm(channels: u16, rate: u32, mut pcm: Vec<f32>) -> Result<Self> {
        if !(1..=2).contains(&channels) {
            return Err(NoxError::UnsupportedChannelLayout(channels));
        }
        if rate == 0 {
            return Err(NoxError::Decode("sample rate is zero".into()));
        }
        let whole = pcm.len() - pcm.len() % channels as usize;
        pcm.truncate(whole);
        if pcm.is_empty() {
            return Err(NoxError::Decode("no audio frames".into()));
        }
        Ok(Self {
            pcm,
            rate,
            channels,
        })
    }

    /// Decode a compressed audio payload.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        match detect_container(bytes) {
            Some(Container::Wav) => decode_wav(bytes),
            Some(Container::Qoa) => decode_qoa(bytes),
            None => Err(NoxError::Decode("unrecognized audio container".into())),
        }
    }

    pub fn pcm(&self) -> &[f32] {
        &self.pcm
    }

    pub fn rate(&self) -> u32 {
        self.rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Number of PCM values (a stereo buffer holds two per time step).
    pub fn frames(&self) -> usize {
        self.pcm.len()
    }

    pub fn length_seconds(&self) -> Result<f64> {
        let frames = self.pcm.len() as f64;
        let rate = self.rate as f64;
        match self.channels {
            1 => Ok(frames / rate),
            2 => Ok(frames / 2.0 / rate),
            n => Err(NoxError::UnsupportedChannelLayout(n)),
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum Container {
    Wav,
    Qoa,
}

fn detect_container(bytes: &[u8]) -> Option<Container> {
    if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WAVE" {
        return Some(Container::Wav);
    }
    if bytes.len() >= 4 && &bytes[0..4] == b"qoaf" {
        return Some(Container::Qoa);
    }
    None
}

fn decode_wav(bytes: &[u8]) -> Result<SampleBuffer> {
    let reader =
        hound::WavReader::new(Cursor::new(bytes)).map_err(|e| NoxError::Decode(e.to_string()))?;
    let spec = reader.spec();

    // Reject before decoding the body; a 6-channel file is not worth converting.
    if !(1..=2).contains(&spec.channels) {
        return Err(NoxError::UnsupportedChannelLayout(spec.channels));
    }

    let pcm: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<core::result::Result<_, _>>(),
        hound::SampleFormat::Int => {
            let scale = 1.0 / (1i64 << (spec.bits_per_sample.clamp(1, 32) - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 * scale))
                .collect::<core::result::Result<_, _>>()
        }
    }
    .map_err(|e| NoxError::Decode(e.to_string()))?;

    SampleBuffer::from_pcm(spec.channels, spec.sample_rate, pcm)
}

fn decode_qoa(bytes: &[u8]) -> Result<SampleBuffer> {
    let data = bytes.to_vec();
    let decoder = qoaudio::QoaDecoder::new(&data)
        .map_err(|_| NoxError::Decode("malformed QOA stream".into()))?;

    let channels = decoder.channels() as u16;
    let rate = decoder.sample_rate() as u32;
    let samples: Vec<i16> = match decoder.decoded_samples() {
        Some(s) => s.into_iter().collect(),
        None => return Err(NoxError::Decode("QOA stream has no samples".into())),
    };

    let pcm = samples.into_iter().map(|s| s as f32 / 32768.0).collect();
    SampleBuffer::from_pcm(channels, rate, pcm)
}

/// Owns every decoded sample. Control thread only.
#[derive(Debug)]
pub struct SampleStore {
    table: HandleTable<Arc<SampleBuffer>>,
}

impl Default for SampleStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SampleStore {
    pub fn new() -> Self {
        Self {
            table: HandleTable::new(ResourceKind::Sample),
        }
    }

    pub fn decode(&mut self, bytes: &[u8]) -> Result<SampleId> {
        let buffer = SampleBuffer::decode(bytes)?;
        self.insert(buffer)
    }

    pub fn insert(&mut self, buffer: SampleBuffer) -> Result<SampleId> {
        let (channels, rate, frames) = (buffer.channels(), buffer.rate(), buffer.frames());
        let id = self.table.insert(Arc::new(buffer))?;
        debug!(id, channels, rate, frames, "sample decoded");
        Ok(id)
    }

    pub fn check(&self, id: SampleId) -> Result<&Arc<SampleBuffer>> {
        self.table.check(id)
    }

    pub fn is_valid(&self, id: SampleId) -> bool {
        self.table.is_valid(id)
    }

    pub fn length_seconds(&self, id: SampleId) -> Result<f64> {
        self.table.check(id)?.length_seconds()
    }

    /// Keep-alive references currently held on `id` (one per voice).
    pub fn refs(&self, id: SampleId) -> Option<u32> {
        self.table.refs(id)
    }

    pub fn contains(&self, id: SampleId) -> bool {
        self.table.contains(id)
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub(crate) fn retain(&mut self, id: SampleId) -> Result<()> {
        self.table.retain(id)
    }

    pub(crate) fn release(&mut self, id: SampleId) {
        if let Some(resource) = self.table.release(id) {
            finalize(id, resource);
        }
    }

    pub(crate) fn release_host(&mut self, id: SampleId) {
        if let Some(resource) = self.table.release_host(id) {
            finalize(id, resource);
        }
    }

    /// Free the PCM buffer. Every voice playing it must already be stopped.
    pub(crate) fn destroy(&mut self, id: SampleId) -> Result<()> {
        if let Some(buffer) = self.table.destroy(id)? {
            debug_assert_eq!(Arc::strong_count(&buffer), 1, "a voice still holds the buffer");
            debug!(id, "sample destroyed");
        }
        Ok(())
    }

    pub(crate) fn drain(&mut self) -> usize {
        self.table.drain().len()
    }
}

fn finalize(id: SampleId, mut resource: Resource<Arc<SampleBuffer>>) {
    if resource.destroy().is_some() {
        debug!(id, "sample finalized");
    }
}
