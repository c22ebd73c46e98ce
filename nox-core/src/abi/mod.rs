//! The contract between the Nox host and a guest WASM module.
//!
//! ## Imports (guest -> host)
//! All imports live under module `"env"` and carry a `nox_` prefix; see [`host_imports`].
//!
//! Status convention for fallible imports:
//! - `>= 0`: success (an id, a boolean, a byte count, ...).
//! - `< 0`: `-code` where `code` is [`crate::error::NoxError::code`]. The message is
//!   available through `nox_last_error` until the next failing call.
//!
//! Backend failures are not reported this way. They trap the guest.
//!
//! ## Exports (host -> guest)
//! - `nox_update(dt: f32)`: required, once per frame.
//! - `nox_init()`, `nox_quit()`: optional.
//! - `memory`: required by every import that takes a pointer.

use wasmtime::{Instance, Store, TypedFunc};

use crate::error::NoxError;
use crate::video::{BlendMode, Color};

/// Import module name used by the guest.
pub const IMPORT_MODULE: &str = "env";

/// Name of the guest's linear memory export.
pub const MEMORY_EXPORT: &str = "memory";

/// Guest export names (entrypoints).
pub mod guest_exports {
    /// Called once after instantiation (optional).
    pub const INIT: &str = "nox_init";
    /// Called once per frame with the elapsed seconds (required).
    pub const UPDATE: &str = "nox_update";
    /// Called once when the frame loop ends (optional).
    pub const QUIT: &str = "nox_quit";
}

/// Host import names provided to the guest under [`IMPORT_MODULE`].
pub mod host_imports {
    // Audio
    pub const AUDIO_GET_GAIN: &str = "nox_audio_get_gain";
    pub const AUDIO_SET_GAIN: &str = "nox_audio_set_gain";
    pub const VOICE_IS_PLAYING: &str = "nox_voice_is_playing";
    pub const VOICE_STOP: &str = "nox_voice_stop";
    pub const VOICE_STOP_ALL: &str = "nox_voice_stop_all";
    pub const SAMPLE_DECODE: &str = "nox_sample_decode";
    pub const SAMPLE_IS_VALID: &str = "nox_sample_is_valid";
    pub const SAMPLE_IS_PLAYING: &str = "nox_sample_is_playing";
    pub const SAMPLE_LENGTH: &str = "nox_sample_length";
    pub const SAMPLE_STOP: &str = "nox_sample_stop";
    pub const SAMPLE_PLAY: &str = "nox_sample_play";
    pub const SAMPLE_DESTROY: &str = "nox_sample_destroy";
    pub const SAMPLE_RELEASE: &str = "nox_sample_release";

    // Video
    pub const VIDEO_GET_BLEND_MODE: &str = "nox_video_get_blend_mode";
    pub const VIDEO_SET_BLEND_MODE: &str = "nox_video_set_blend_mode";
    pub const VIDEO_GET_DRAW_COLOR: &str = "nox_video_get_draw_color";
    pub const VIDEO_SET_DRAW_COLOR: &str = "nox_video_set_draw_color";
    pub const VIDEO_GET_RENDER_TARGET: &str = "nox_video_get_render_target";
    pub const VIDEO_SET_RENDER_TARGET: &str = "nox_video_set_render_target";
    pub const VIDEO_CLEAR: &str = "nox_video_clear";
    pub const IMAGE_LOAD: &str = "nox_image_load";
    pub const IMAGE_CREATE: &str = "nox_image_create";
    pub const IMAGE_CREATE_CHILD: &str = "nox_image_create_child";
    pub const IMAGE_IS_VALID: &str = "nox_image_is_valid";
    pub const IMAGE_IS_CHILD: &str = "nox_image_is_child";
    pub const IMAGE_GET_SIZE: &str = "nox_image_get_size";
    pub const IMAGE_DRAW: &str = "nox_image_draw";
    pub const IMAGE_DESTROY: &str = "nox_image_destroy";
    pub const IMAGE_RELEASE: &str = "nox_image_release";

    // Window
    pub const WINDOW_CLOSE: &str = "nox_window_close";
    pub const WINDOW_GET_TITLE: &str = "nox_window_get_title";
    pub const WINDOW_SET_TITLE: &str = "nox_window_set_title";
    pub const WINDOW_IS_FULLSCREEN: &str = "nox_window_is_fullscreen";
    pub const WINDOW_SET_FULLSCREEN: &str = "nox_window_set_fullscreen";

    // System
    pub const LOG: &str = "nox_log";
    pub const TICKS: &str = "nox_ticks";
    pub const LAST_ERROR: &str = "nox_last_error";
    pub const COMPRESS: &str = "nox_compress";
    pub const DECOMPRESS: &str = "nox_decompress";
    pub const HASH: &str = "nox_hash";
}

/// Blend mode values used by `nox_video_{get,set}_blend_mode`.
pub mod blend {
    pub const NONE: i32 = 0;
    pub const BLEND: i32 = 1;
    pub const ADD: i32 = 2;
    pub const MOD: i32 = 3;
}

pub fn blend_mode_to_abi(mode: BlendMode) -> i32 {
    match mode {
        BlendMode::None => blend::NONE,
        BlendMode::Blend => blend::BLEND,
        BlendMode::Add => blend::ADD,
        BlendMode::Mod => blend::MOD,
    }
}

pub fn blend_mode_from_abi(value: i32) -> Result<BlendMode, NoxError> {
    match value {
        blend::NONE => Ok(BlendMode::None),
        blend::BLEND => Ok(BlendMode::Blend),
        blend::ADD => Ok(BlendMode::Add),
        blend::MOD => Ok(BlendMode::Mod),
        other => Err(NoxError::InvalidArgument(format!(
            "unknown blend mode {other}"
        ))),
    }
}

/// `0xRRGGBBAA`
pub fn pack_color(color: Color) -> u32 {
    color.packed()
}

/// `w << 32 | h`; both halves are non-negative.
pub fn pack_size(width: i32, height: i32) -> i64 {
    ((width.max(0) as i64) << 32) | height.max(0) as i64
}

/// Map a guest handle to an optional id; 0 means "none".
pub fn optional_id(id: i32) -> Option<u32> {
    (id > 0).then_some(id as u32)
}

/// The guest's entrypoints, resolved once after instantiation.
#[derive(Clone)]
pub struct GuestEntrypoints {
    pub init: Option<TypedFunc<(), ()>>,
    pub update: TypedFunc<f32, ()>,
    pub quit: Option<TypedFunc<(), ()>>,
}

impl GuestEntrypoints {
    /// Resolve entrypoint exports from an instance. `nox_update` must exist.
    pub fn resolve<T>(instance: &Instance, store: &mut Store<T>) -> Result<Self, anyhow::Error> {
        let update = instance
            .get_typed_func::<f32, ()>(&mut *store, guest_exports::UPDATE)
            .map_err(|e| {
                anyhow::anyhow!(
                    "guest must export `{}(dt: f32)`: {e}",
                    guest_exports::UPDATE
                )
            })?;
        let init = instance
            .get_typed_func::<(), ()>(&mut *store, guest_exports::INIT)
            .ok();
        let quit = instance
            .get_typed_func::<(), ()>(&mut *store, guest_exports::QUIT)
            .ok();

        Ok(Self { init, update, quit })
    }
}
