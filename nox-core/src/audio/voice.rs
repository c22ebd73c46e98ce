//! Control-thread side of the voice table.
//!
//! The mixer only knows which buffer a slot is playing. The pool additionally remembers
//! which *sample handle* each slot holds a keep-alive reference on, so it can hand that
//! reference back once the slot goes quiet. Reference counts are only ever touched here,
//! outside the mixer lock.
//!
//! A slot is free when it holds no reference. A slot whose mixer voice finished on its
//! own but which still holds a reference is a "zombie" until the next [`VoicePool::purge`].

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use super::mixer::{MAX_VOICES, MixerState, Voice};
use super::sample::{SampleBuffer, SampleId, SampleStore};
use crate::error::{NoxError, Result};

/// 1-based voice index as seen by guests.
pub type VoiceId = u32;

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PlayParams {
    pub gain: f32,
    pub pitch: f32,
    pub pan: f32,
    pub looping: bool,
}

impl Default for PlayParams {
    fn default() -> Self {
        Self {
            gain: 1.0,
            pitch: 1.0,
            pan: 0.0,
            looping: false,
        }
    }
}

impl PlayParams {
    pub const MIN_PITCH: f32 = 0.5;
    pub const MAX_PITCH: f32 = 2.0;

    /// Clamp into playable ranges. NaN falls back to the default.
    pub fn clamped(self) -> Self {
        let defaults = Self::default();
        Self {
            gain: clamp_or(self.gain, 0.0, 1.0, defaults.gain),
            pitch: clamp_or(self.pitch, Self::MIN_PITCH, Self::MAX_PITCH, defaults.pitch),
            pan: clamp_or(self.pan, -1.0, 1.0, defaults.pan),
            looping: self.looping,
        }
    }
}

pub(crate) fn clamp_or(value: f32, lo: f32, hi: f32, fallback: f32) -> f32 {
    if value.is_nan() {
        fallback
    } else {
        value.clamp(lo, hi)
    }
}

#[derive(Debug)]
pub struct VoicePool {
    shared: Arc<Mutex<MixerState>>,
    held: [Option<SampleId>; MAX_VOICES],
}

impl VoicePool {
    pub fn new(shared: Arc<Mutex<MixerState>>) -> Self {
        Self {
            shared,
            held: [None; MAX_VOICES],
        }
    }

    fn slot(voice: VoiceId) -> Result<usize> {
        if (1..=MAX_VOICES as VoiceId).contains(&voice) {
            Ok(voice as usize - 1)
        } else {
            Err(NoxError::InvalidArgument(format!(
                "voice {voice} out of range 1..={MAX_VOICES}"
            )))
        }
    }

    /// Start `sample` on the first free slot.
    pub fn play(
        &mut self,
        store: &mut SampleStore,
        sample: SampleId,
        params: PlayParams,
    ) -> Result<VoiceId> {
        let buffer = Arc::clone(store.check(sample)?);
        let Some(slot) = self.held.iter().position(Option::is_none) else {
            warn!(sample, "no free audio voice");
            return Err(NoxError::NoFreeVoice);
        };

        store.retain(sample)?;
        self.held[slot] = Some(sample);

        let params = params.clamped();
        self.shared.lock().voices[slot] = Voice {
            sample: Some(buffer),
            position: 0.0,
            gain: params.gain,
            pitch: params.pitch,
            pan: params.pan,
            looping: params.looping,
        };

        let voice = slot as VoiceId + 1;
        debug!(voice, sample, ?params, "voice started");
        Ok(voice)
    }

    /// Silence `voice` and drop its reference. Stopping an idle voice is a no-op.
    pub fn stop(&mut self, store: &mut SampleStore, voice: VoiceId) -> Result<()> {
        let slot = Self::slot(voice)?;
        // The buffer clone is dropped after the guard, outside the lock.
        let cleared = self.shared.lock().voices[slot].sample.take();
        drop(cleared);
        if let Some(sample) = self.held[slot].take() {
            store.release(sample);
        }
        Ok(())
    }

    pub fn stop_all(&mut self, store: &mut SampleStore) {
        let cleared: [Option<Arc<SampleBuffer>>; MAX_VOICES] = {
            let mut state = self.shared.lock();
            std::array::from_fn(|i| state.voices[i].sample.take())
        };
        drop(cleared);
        for held in self.held.iter_mut() {
            if let Some(sample) = held.take() {
                store.release(sample);
            }
        }
    }

    pub fn is_playing(&self, voice: VoiceId) -> Result<bool> {
        let slot = Self::slot(voice)?;
        Ok(self.shared.lock().voices[slot].is_active())
    }

    /// Stop every voice holding `sample`, in one locked pass. Returns how many stopped.
    pub fn stop_sample(&mut self, store: &mut SampleStore, sample: SampleId) -> usize {
        let targets: [bool; MAX_VOICES] = std::array::from_fn(|i| self.held[i] == Some(sample));
        let count = targets.iter().filter(|&&t| t).count();
        if count == 0 {
            return 0;
        }

        let cleared: [Option<Arc<SampleBuffer>>; MAX_VOICES] = {
            let mut state = self.shared.lock();
            std::array::from_fn(|i| {
                if targets[i] {
                    state.voices[i].sample.take()
                } else {
                    None
                }
            })
        };
        drop(cleared);

        for (held, _) in self.held.iter_mut().zip(targets).filter(|(_, t)| *t) {
            if let Some(sample) = held.take() {
                store.release(sample);
            }
        }
        count
    }

    /// Whether any voice is still audibly playing `sample`.
    pub fn is_sample_playing(&self, sample: SampleId) -> bool {
        let state = self.shared.lock();
        self.held
            .iter()
            .zip(state.voices.iter())
            .any(|(held, voice)| *held == Some(sample) && voice.is_active())
    }

    /// Return references held by voices that finished on their own.
    ///
    /// Each finished voice is released exactly once; the slot becomes free again.
    pub fn purge(&mut self, store: &mut SampleStore) -> usize {
        let zombies: [bool; MAX_VOICES] = {
            let state = self.shared.lock();
            std::array::from_fn(|i| self.held[i].is_some() && !state.voices[i].is_active())
        };

        let mut released = 0;
        for (held, _) in self.held.iter_mut().zip(zombies).filter(|(_, z)| *z) {
            if let Some(sample) = held.take() {
                store.release(sample);
                released += 1;
            }
        }
        if released > 0 {
            debug!(released, "purged finished voices");
        }
        released
    }

    /// The sample handle a slot holds a reference on, if any.
    pub fn held(&self, voice: VoiceId) -> Option<SampleId> {
        Self::slot(voice).ok().and_then(|slot| self.held[slot])
    }
}
