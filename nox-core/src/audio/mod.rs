//! Audio subsystem.
//!
//! Two threads touch audio state:
//! - the control thread (guest calls, frame loop) owns the [`SampleStore`] and the
//!   [`VoicePool`] bookkeeping;
//! - the device callback thread runs [`mixer::mix`].
//!
//! The only state they share is [`MixerState`], behind one `parking_lot::Mutex`.

pub mod device;
pub mod mixer;
pub mod sample;
pub mod voice;


use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};

pub use device::AudioDevice;
pub use mixer::{MAX_VOICES, MixerState};
pub use sample::{SampleBuffer, SampleId, SampleStore};
pub use voice::{PlayParams, VoiceId, VoicePool};

use crate::config::AudioConfig;
use crate::error::Result;

#[derive(Debug)]
pub struct AudioSystem {
    shared: Arc<Mutex<MixerState>>,
    store: SampleStore,
    voices: VoicePool,
    device: Option<AudioDevice>,
}

impl AudioSystem {
    /// Open the output device if `config.enabled`, otherwise run headless.
    pub fn new(config: &AudioConfig) -> Result<Self> {
        let mut audio = Self::headless(config.sample_rate);
        audio.set_global_gain(config.master_volume);
        if config.enabled {
            audio.device = Some(AudioDevice::open(Arc::clone(&audio.shared))?);
        } else {
            info!(sample_rate = config.sample_rate, "audio running headless");
        }
        Ok(audio)
    }

    /// No device; the owner pulls frames through [`AudioSystem::render`].
    pub fn headless(output_rate: u32) -> Self {
        let shared = Arc::new(Mutex::new(MixerState::new(output_rate, 1.0)));
        Self {
            voices: VoicePool::new(Arc::clone(&shared)),
            shared,
            store: SampleStore::new(),
            device: None,
        }
    }

    pub fn has_device(&self) -> bool {
        self.device.is_some()
    }

    pub fn output_rate(&self) -> u32 {
        self.shared.lock().output_rate
    }

    pub fn store(&self) -> &SampleStore {
        &self.store
    }

    pub fn global_gain(&self) -> f32 {
        self.shared.lock().gain
    }

    /// Clamped to `[0, 1]`; NaN leaves the gain unchanged.
    pub fn set_global_gain(&mut self, gain: f32) {
        if gain.is_nan() {
            return;
        }
        self.shared.lock().gain = gain.clamp(0.0, 1.0);
    }

    pub fn is_voice_playing(&self, voice: VoiceId) -> Result<bool> {
        self.voices.is_playing(voice)
    }

    pub fn stop_voice(&mut self, voice: VoiceId) -> Result<()> {
        self.voices.stop(&mut self.store, voice)
    }

    pub fn stop_all_voices(&mut self) {
        self.voices.stop_all(&mut self.store);
    }

    pub fn decode_sample(&mut self, bytes: &[u8]) -> Result<SampleId> {
        self.store.decode(bytes)
    }

    pub fn is_sample_valid(&self, sample: SampleId) -> bool {
        self.store.is_valid(sample)
    }

    /// False for destroyed or unknown samples.
    pub fn is_sample_playing(&self, sample: SampleId) -> bool {
        self.store.is_valid(sample) && self.voices.is_sample_playing(sample)
    }

    pub fn sample_length_seconds(&self, sample: SampleId) -> Result<f64> {
        self.store.length_seconds(sample)
    }

    pub fn stop_sample(&mut self, sample: SampleId) -> Result<()> {
        self.store.check(sample)?;
        let stopped = self.voices.stop_sample(&mut self.store, sample);
        debug!(sample, stopped, "sample stopped");
        Ok(())
    }

    pub fn play_sample(&mut self, sample: SampleId, params: PlayParams) -> Result<VoiceId> {
        self.voices.play(&mut self.store, sample, params)
    }

    /// Stop every voice using `sample`, then free its PCM.
    ///
    /// Idempotent for a guest-held id.
    pub fn destroy_sample(&mut self, sample: SampleId) -> Result<()> {
        if self.store.is_valid(sample) {
            self.voices.stop_sample(&mut self.store, sample);
        }
        self.store.destroy(sample)
    }

    /// The guest dropped its handle. Voices still playing it keep it alive.
    pub fn release_sample(&mut self, sample: SampleId) {
        self.store.release_host(sample);
    }

    /// Hand back references of voices the mixer finished. Once per frame.
    pub fn purge(&mut self) -> usize {
        self.voices.purge(&mut self.store)
    }

    /// Mix on the calling thread. Used when no device is open.
    pub fn render(&self, out: &mut [f32], channels: usize) {
        mixer::mix(&mut self.shared.lock(), out, channels);
    }

    /// Stop everything and finalize every sample still alive.
    pub fn shutdown(&mut self) {
        // Stop the callback before the buffers go away.
        self.device = None;
        self.stop_all_voices();
        let remaining = self.store.drain();
        debug!(remaining, "audio shut down");
    }

    #[cfg(test)]
    pub(crate) fn voices(&self) -> &VoicePool {
        &self.voices
    }

    #[cfg(test)]
    pub(crate) fn mixer(&self) -> parking_lot::MutexGuard<'_, MixerState> {
        self.shared.lock()
    }
}
