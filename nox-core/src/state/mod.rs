//! Host-side state reachable from every import.
//!
//! One `HostState` lives in the wasmtime `Store` data, so host functions get at it
//! through `Caller::data_mut`. Nothing here is global; two runtimes in one process
//! (tests do this) never see each other's resources.

use std::time::Instant;

use tracing::{debug, warn};

use crate::audio::AudioSystem;
use crate::config::Config;
use crate::error::{NoxError, Result};
use crate::util;
use crate::video::Video;

/// Window properties the guest can query and change. Presentation is external.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowState {
    pub title: String,
    pub fullscreen: bool,
    /// Cleared by `nox_window_close`; the frame loop exits after the current frame.
    pub running: bool,
}

#[derive(Debug)]
pub struct HostState {
    pub audio: AudioSystem,
    pub video: Video,
    pub window: WindowState,
    last_error: String,
    started: Instant,
}

impl HostState {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            audio: AudioSystem::new(&config.audio)?,
            video: Video::new(config.window.width, config.window.height)?,
            window: WindowState {
                title: config.window.title.clone(),
                fullscreen: config.window.fullscreen,
                running: true,
            },
            last_error: String::new(),
            started: Instant::now(),
        })
    }

    /// Turn a host result into a guest status code.
    ///
    /// Recoverable errors become `-code` and are remembered for `nox_last_error`. Fatal
    /// errors are returned as `Err` so the import traps.
    pub fn report(&mut self, result: Result<i32>) -> anyhow::Result<i32> {
        match result {
            Ok(value) => Ok(value),
            Err(e) if e.is_fatal() => Err(anyhow::Error::new(e)),
            Err(e) => {
                debug!(code = e.code(), "guest call failed: {e}");
                let code = -e.code();
                self.last_error = e.to_string();
                Ok(code)
            }
        }
    }

    /// Like [`HostState::report`] for imports without a return value.
    pub fn report_unit(&mut self, result: Result<()>) -> anyhow::Result<()> {
        self.report(result.map(|()| 0)).map(drop)
    }

    pub fn last_error(&self) -> &str {
        &self.last_error
    }

    pub fn ticks(&self) -> i64 {
        util::millis_since(self.started)
    }

    /// Per-frame housekeeping before the guest's update.
    pub fn begin_frame(&mut self) {
        self.audio.purge();
    }

    /// Finalize every remaining resource.
    pub fn shutdown(&mut self) -> Result<()> {
        self.audio.shutdown();
        self.video.shutdown()
    }

    pub fn fail(&mut self, error: NoxError) -> anyhow::Result<i32> {
        self.report(Err(error))
    }
}

impl Drop for HostState {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            warn!("shutdown failed: {e}");
        }
    }
}
