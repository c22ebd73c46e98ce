//! Voice state shared with the audio callback, and the mixing loop that consumes it.
//!
//! Everything in here runs with the mixer lock held. `mix` must stay allocation-free and
//! must not log: it is called from the device callback thread.

use std::sync::Arc;

use super::sample::SampleBuffer;

pub const MAX_VOICES: usize = 32;

/// One playback slot as the audio thread sees it.
///
/// `sample == None` means the slot is silent. The audio thread clears it when a
/// non-looping voice runs off the end; the control thread notices later during purge.
#[derive(Debug, Clone)]
pub struct Voice {
    pub(crate) sample: Option<Arc<SampleBuffer>>,
    pub(crate) position: f64,
    pub(crate) gain: f32,
    pub(crate) pitch: f32,
    pub(crate) pan: f32,
    pub(crate) looping: bool,
}

impl Default for Voice {
    fn default() -> Self {
        Self {
            sample: None,
            position: 0.0,
            gain: 1.0,
            pitch: 1.0,
            pan: 0.0,
            looping: false,
        }
    }
}

impl Voice {
    pub fn is_active(&self) -> bool {
        self.sample.is_some()
    }

    pub fn position(&self) -> f64 {
        self.position
    }
}

#[derive(Debug)]
pub struct MixerState {
    pub(crate) voices: [Voice; MAX_VOICES],
    pub(crate) gain: f32,
    pub(crate) output_rate: u32,
}

impl MixerState {
    pub fn new(output_rate: u32, gain: f32) -> Self {
        Self {
            voices: std::array::from_fn(|_| Voice::default()),
            gain,
            output_rate,
        }
    }

    pub fn voice(&self, index: usize) -> Option<&Voice> {
        self.voices.get(index)
    }
}

/// Fill `out` (interleaved, `channels` per frame) with the sum of all active voices.
///
/// Per voice and output frame:
/// 1. read the frame at `floor(position)` aligned down to the sample's frame boundary,
/// 2. advance by `sample_rate / output_rate * pitch * sample_channels`,
/// 3. past the end, loop to 0 or go silent.
///
/// The summed frame is scaled by the global gain and clamped to `[-1, 1]`. A mono device
/// receives the average of both sides; channels past the second are zeroed.
pub fn mix(state: &mut MixerState, out: &mut [f32], channels: usize) {
    if channels == 0 {
        return;
    }
    let output_rate = state.output_rate.max(1) as f64;

    for frame in out.chunks_exact_mut(channels) {
        let (mut left, mut right) = (0.0f32, 0.0f32);

        for voice in state.voices.iter_mut() {
            let Some(sample) = voice.sample.as_deref() else {
                continue;
            };
            let stride = sample.channels() as usize;
            let pcm = sample.pcm();
            let len = pcm.len();

            let index = voice.position as usize / stride * stride;
            if stride == 2 {
                left += pcm[index] * voice.gain;
                right += pcm[index + 1] * voice.gain;
            } else {
                let v = pcm[index] * voice.gain;
                left += v;
                right += v;
            }

            voice.position +=
                sample.rate() as f64 / output_rate * voice.pitch as f64 * stride as f64;

            if voice.position as usize >= len {
                if voice.looping {
                    voice.position = 0.0;
                } else {
                    voice.sample = None;
                }
            }
        }

        let left = (left * state.gain).clamp(-1.0, 1.0);
        let right = (right * state.gain).clamp(-1.0, 1.0);
        match frame {
            [mono] => *mono = (left + right) * 0.5,
            [l, r, rest @ ..] => {
                *l = left;
                *r = right;
                rest.fill(0.0);
            }
            [] => {}
        }
    }
}
