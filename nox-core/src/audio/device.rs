//! CPAL output stream driving the mixer from the device callback thread.

use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use parking_lot::Mutex;
use tracing::{error, info};

use super::mixer::{self, MixerState};
use crate::error::{NoxError, Result};

/// Upper bound of one mixing pass; larger device buffers are mixed in several passes.
const SCRATCH_SAMPLES: usize = 4096;

pub struct AudioDevice {
    // Dropping the stream stops the callback.
    _stream: cpal::Stream,
    sample_rate: u32,
    channels: u16,
}

impl std::fmt::Debug for AudioDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioDevice")
            .field("sample_rate", &self.sample_rate)
            .field("channels", &self.channels)
            .finish()
    }
}

impl AudioDevice {
    /// Open the default output device at its default configuration and start mixing.
    ///
    /// The mixer's output rate is updated to whatever the device runs at.
    pub fn open(shared: Arc<Mutex<MixerState>>) -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| NoxError::Backend("no audio output device available".into()))?;

        let supported = device
            .default_output_config()
            .map_err(|e| NoxError::Backend(format!("failed to query output config: {e}")))?;
        let sample_format = supported.sample_format();
        let config: cpal::StreamConfig = supported.into();
        let sample_rate = config.sample_rate.0;
        let channels = config.channels;

        shared.lock().output_rate = sample_rate;

        let stream = match sample_format {
            cpal::SampleFormat::F32 => build_stream::<f32>(&device, &config, shared)?,
            cpal::SampleFormat::I16 => build_stream::<i16>(&device, &config, shared)?,
            cpal::SampleFormat::U16 => build_stream::<u16>(&device, &config, shared)?,
            other => {
                return Err(NoxError::Backend(format!(
                    "unsupported device sample format {other:?}"
                )));
            }
        };
        stream
            .play()
            .map_err(|e| NoxError::Backend(format!("failed to start output stream: {e}")))?;

        info!(
            device = %device.name().unwrap_or_default(),
            sample_rate, channels, "audio output started"
        );
        Ok(Self {
            _stream: stream,
            sample_rate,
            channels,
        })
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    shared: Arc<Mutex<MixerState>>,
) -> Result<cpal::Stream>
where
    T: cpal::SizedSample + cpal::FromSample<f32>,
{
    let channels = (config.channels as usize).max(1);
    // Whole frames only, so every pass starts on a frame boundary.
    let mut scratch = vec![0.0f32; (SCRATCH_SAMPLES / channels).max(1) * channels];

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                let mut state = shared.lock();
                for out in data.chunks_mut(scratch.len()) {
                    let mixed = &mut scratch[..out.len()];
                    mixer::mix(&mut state, mixed, channels);
                    for (dst, &src) in out.iter_mut().zip(mixed.iter()) {
                        *dst = T::from_sample(src);
                    }
                }
            },
            |err| error!("audio stream error: {err}"),
            None,
        )
        .map_err(|e| NoxError::Backend(format!("failed to build output stream: {e}")))
}
