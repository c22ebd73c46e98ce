//! Frame loop driving a guest.
//!
//! With an audio device the loop runs in real time and the device pulls from the
//! mixer. Without one the loop runs as fast as it can and pulls one frame's worth of
//! audio per tick itself, optionally recording it to a WAV file.

use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::Context;
use tracing::{debug, info};

use crate::config::Config;
use crate::runtime::NoxRuntime;
use crate::state::HostState;

const RECORD_CHANNELS: u16 = 2;

#[derive(Debug, Clone, Default)]
pub struct PlayerOptions {
    /// Stop after this many frames even if the guest keeps running.
    pub max_frames: Option<u64>,
    /// Write the headless mix to this WAV file.
    pub record: Option<PathBuf>,
    /// Write the final screen to this PNG file.
    pub screenshot: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub frames: u64,
}

type Recorder = hound::WavWriter<BufWriter<File>>;

fn open_recorder(options: &PlayerOptions, sample_rate: u32) -> anyhow::Result<Option<Recorder>> {
    let Some(path) = &options.record else {
        return Ok(None);
    };
    let spec = hound::WavSpec {
        channels: RECORD_CHANNELS,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let writer = hound::WavWriter::create(path, spec)
        .with_context(|| format!("failed to create {}", path.display()))?;
    Ok(Some(writer))
}

/// Load `rom`, run it until it closes the window (or `max_frames`), then shut down.
pub fn run(config: &Config, rom: &[u8], options: &PlayerOptions) -> anyhow::Result<RunSummary> {
    let state = HostState::new(config).context("failed to initialize host")?;
    let mut runtime = NoxRuntime::new(state)?;
    runtime.load(rom)?;
    runtime.init()?;

    let fps = config.runtime.target_fps.max(1);
    let frame_time = Duration::from_secs_f64(1.0 / fps as f64);
    let realtime = runtime.state().audio.has_device();

    let output_rate = runtime.state().audio.output_rate();
    let mut mix = vec![0.0f32; (output_rate / fps) as usize * RECORD_CHANNELS as usize];
    let mut recorder = if realtime {
        None
    } else {
        open_recorder(options, output_rate)?
    };

    info!(fps, realtime, "starting frame loop");

    let mut frames = 0u64;
    let mut last = Instant::now();
    while options.max_frames.is_none_or(|max| frames < max) {
        let start = Instant::now();
        let dt = if realtime {
            start.duration_since(last).as_secs_f32()
        } else {
            frame_time.as_secs_f32()
        };
        last = start;

        runtime.state_mut().begin_frame();
        runtime.update(dt)?;
        frames += 1;

        if !realtime {
            runtime
                .state()
                .audio
                .render(&mut mix, RECORD_CHANNELS as usize);
            if let Some(writer) = recorder.as_mut() {
                for &s in &mix {
                    writer.write_sample((s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)?;
                }
            }
        }

        if !runtime.state().window.running {
            debug!(frames, "guest closed the window");
            break;
        }

        if realtime {
            if let Some(rest) = frame_time.checked_sub(start.elapsed()) {
                std::thread::sleep(rest);
            }
        }
    }

    runtime.quit()?;

    if let Some(writer) = recorder {
        writer.finalize().context("failed to finish recording")?;
    }

    if let Some(path) = &options.screenshot {
        let file = File::create(path)
            .with_context(|| format!("failed to create {}", path.display()))?;
        runtime
            .state()
            .video
            .canvas()
            .screen()
            .write_png(BufWriter::new(file))?;
        info!(path = %path.display(), "screenshot written");
    }

    runtime.state_mut().shutdown()?;
    info!(frames, "frame loop finished");
    Ok(RunSummary { frames })
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLOSES_ON_THIRD_FRAME: &str = r#"(module
        (import "env" "nox_window_close" (func $close))
        (import "env" "nox_video_set_draw_color" (func $color (param i32 i32 i32 i32)))
        (import "env" "nox_video_clear" (func $clear))
        (memory (export "memory") 1)
        (global $frames (mut i32) (i32.const 0))
        (func (export "nox_update") (param f32)
            (call $color (i32.const 0) (i32.const 0) (i32.const 255) (i32.const 255))
            (call $clear)
            (global.set $frames (i32.add (global.get $frames) (i32.const 1)))
            (if (i32.eq (global.get $frames) (i32.const 3))
                (then (call $close)))))"#;

    #[test]
    fn runs_until_the_guest_closes() {
        let dir = tempfile::tempdir().unwrap();
        let options = PlayerOptions {
            max_frames: Some(100),
            record: Some(dir.path().join("mix.wav")),
            screenshot: Some(dir.path().join("screen.png")),
        };
        let config = Config::headless();

        let summary = run(&config, CLOSES_ON_THIRD_FRAME.as_bytes(), &options).unwrap();
        assert_eq!(summary.frames, 3);

        let reader = hound::WavReader::open(dir.path().join("mix.wav")).unwrap();
        assert_eq!(reader.spec().channels, 2);
        assert_eq!(reader.spec().sample_rate, config.audio.sample_rate);
        assert_eq!(reader.duration(), 3 * config.audio.sample_rate / 60);

        let decoder = png::Decoder::new(File::open(dir.path().join("screen.png")).unwrap());
        let mut reader = decoder.read_info().unwrap();
        let mut buf = vec![0; reader.output_buffer_size()];
        let info = reader.next_frame(&mut buf).unwrap();
        assert_eq!((info.width, info.height), (320, 240));
        assert_eq!(&buf[..4], &[0, 0, 255, 255]);
    }

    #[test]
    fn max_frames_caps_a_guest_that_never_closes() {
        let options = PlayerOptions {
            max_frames: Some(5),
            ..PlayerOptions::default()
        };
        let rom = b"(module (func (export \"nox_update\") (param f32)))";
        let summary = run(&Config::headless(), rom, &options).unwrap();
        assert_eq!(summary.frames, 5);
    }

    #[test]
    fn invalid_rom_fails_to_start() {
        let err = run(&Config::headless(), b"not a module", &PlayerOptions::default());
        assert!(err.is_err());
    }
}
