#![cfg_attr(not(feature = "std"), no_std)]

//! nox-sdk
//!
//! Used by **guest** WASM apps that run inside the Nox runtime.
//!
//! The host owns every sample and image; the guest holds integer handles. The safe
//! wrappers here tie a handle to a Rust value whose `Drop` releases it, so a value
//! going out of scope lets the host free the resource once nothing else uses it.
//!
//! A guest exports `nox_update(dt: f32)` and optionally `nox_init()` / `nox_quit()`.

extern crate alloc;

use alloc::string::String;
use alloc::vec::Vec;

#[cfg(feature = "wee_alloc")]
#[global_allocator]
static ALLOC: wee_alloc::WeeAlloc = wee_alloc::WeeAlloc::INIT;

/// Low-level raw ABI imports.
pub mod sys {
    unsafe extern "C" {
        // Audio
        #[link_name = "nox_audio_get_gain"]
        pub fn audio_get_gain() -> f32;
        #[link_name = "nox_audio_set_gain"]
        pub fn audio_set_gain(gain: f32);
        #[link_name = "nox_voice_is_playing"]
        pub fn voice_is_playing(voice: u32) -> i32;
        #[link_name = "nox_voice_stop"]
        pub fn voice_stop(voice: u32) -> i32;
        #[link_name = "nox_voice_stop_all"]
        pub fn voice_stop_all();
        #[link_name = "nox_sample_decode"]
        pub fn sample_decode(ptr: u32, len: u32) -> i32;
        #[link_name = "nox_sample_is_valid"]
        pub fn sample_is_valid(sample: u32) -> i32;
        #[link_name = "nox_sample_is_playing"]
        pub fn sample_is_playing(sample: u32) -> i32;
        #[link_name = "nox_sample_length"]
        pub fn sample_length(sample: u32) -> f32;
        #[link_name = "nox_sample_stop"]
        pub fn sample_stop(sample: u32) -> i32;
        #[link_name = "nox_sample_play"]
        pub fn sample_play(sample: u32, gain: f32, pitch: f32, pan: f32, looping: i32) -> i32;
        #[link_name = "nox_sample_destroy"]
        pub fn sample_destroy(sample: u32) -> i32;
        #[link_name = "nox_sample_release"]
        pub fn sample_release(sample: u32);

        // Video
        #[link_name = "nox_video_get_blend_mode"]
        pub fn video_get_blend_mode() -> i32;
        #[link_name = "nox_video_set_blend_mode"]
        pub fn video_set_blend_mode(mode: i32) -> i32;
        #[link_name = "nox_video_get_draw_color"]
        pub fn video_get_draw_color() -> u32;
        #[link_name = "nox_video_set_draw_color"]
        pub fn video_set_draw_color(r: i32, g: i32, b: i32, a: i32);
        #[link_name = "nox_video_get_render_target"]
        pub fn video_get_render_target() -> i32;
        #[link_name = "nox_video_set_render_target"]
        pub fn video_set_render_target(image: i32) -> i32;
        #[link_name = "nox_video_clear"]
        pub fn video_clear();
        #[link_name = "nox_image_load"]
        pub fn image_load(ptr: u32, len: u32) -> i32;
        #[link_name = "nox_image_create"]
        pub fn image_create(w: i32, h: i32) -> i32;
        #[link_name = "nox_image_create_child"]
        pub fn image_create_child(parent: u32, x: i32, y: i32, w: i32, h: i32) -> i32;
        #[link_name = "nox_image_is_valid"]
        pub fn image_is_valid(image: u32) -> i32;
        #[link_name = "nox_image_is_child"]
        pub fn image_is_child(image: u32) -> i32;
        #[link_name = "nox_image_get_size"]
        pub fn image_get_size(image: u32) -> i64;
        #[link_name = "nox_image_draw"]
        pub fn image_draw(image: u32, x: i32, y: i32) -> i32;
        #[link_name = "nox_image_destroy"]
        pub fn image_destroy(image: u32) -> i32;
        #[link_name = "nox_image_release"]
        pub fn image_release(image: u32);

        // Window
        #[link_name = "nox_window_close"]
        pub fn window_close();
        #[link_name = "nox_window_get_title"]
        pub fn window_get_title(ptr: u32, cap: u32) -> i32;
        #[link_name = "nox_window_set_title"]
        pub fn window_set_title(ptr: u32, len: u32);
        #[link_name = "nox_window_is_fullscreen"]
        pub fn window_is_fullscreen() -> i32;
        #[link_name = "nox_window_set_fullscreen"]
        pub fn window_set_fullscreen(fullscreen: i32);

        // System
        #[link_name = "nox_log"]
        pub fn log(ptr: u32, len: u32);
        #[link_name = "nox_ticks"]
        pub fn ticks() -> i64;
        #[link_name = "nox_last_error"]
        pub fn last_error(ptr: u32, cap: u32) -> i32;
        #[link_name = "nox_compress"]
        pub fn compress(src_ptr: u32, src_len: u32, dst_ptr: u32, dst_cap: u32) -> i32;
        #[link_name = "nox_decompress"]
        pub fn decompress(src_ptr: u32, src_len: u32, dst_ptr: u32, dst_cap: u32) -> i32;
        #[link_name = "nox_hash"]
        pub fn hash(ptr: u32, len: u32) -> i64;
    }
}

/// A failed host call, decoded from its negative status.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Error {
    InvalidResource,
    Decode,
    UnsupportedChannelLayout,
    NoFreeVoice,
    UnsupportedPixelFormat,
    NotRootImage,
    InvalidArgument,
    Unknown(i32),
}

impl Error {
    pub fn from_code(code: i32) -> Self {
        match code {
            1 => Error::InvalidResource,
            2 => Error::Decode,
            3 => Error::UnsupportedChannelLayout,
            4 => Error::NoFreeVoice,
            5 => Error::UnsupportedPixelFormat,
            6 => Error::NotRootImage,
            7 => Error::InvalidArgument,
            other => Error::Unknown(other),
        }
    }

    /// The host's message for the most recent failure.
    pub fn message(&self) -> String {
        system::last_error()
    }
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::InvalidResource => f.write_str("invalid resource handle"),
            Error::Decode => f.write_str("decode failed"),
            Error::UnsupportedChannelLayout => f.write_str("unsupported channel layout"),
            Error::NoFreeVoice => f.write_str("no free voice"),
            Error::UnsupportedPixelFormat => f.write_str("unsupported pixel format"),
            Error::NotRootImage => f.write_str("not a root image"),
            Error::InvalidArgument => f.write_str("invalid argument"),
            Error::Unknown(code) => write!(f, "unknown error {code}"),
        }
    }
}

pub type Result<T> = core::result::Result<T, Error>;

/// `>= 0` is a value, `< 0` is `-code`.
fn check(status: i32) -> Result<u32> {
    if status < 0 {
        Err(Error::from_code(-status))
    } else {
        Ok(status as u32)
    }
}

fn check_bool(status: i32) -> Result<bool> {
    check(status).map(|v| v != 0)
}

/// Call `fill(ptr, cap)` with growing buffers until the result fits.
fn read_string(mut fill: impl FnMut(u32, u32) -> i32) -> String {
    let mut cap = 64usize;
    loop {
        let mut buf = alloc::vec![0u8; cap];
        let written = fill(buf.as_mut_ptr() as u32, cap as u32).max(0) as usize;
        if written < cap {
            buf.truncate(written);
            return String::from_utf8_lossy(&buf).into_owned();
        }
        cap *= 2;
    }
}

/// Audio API.
pub mod audio {
    use super::{Result, check, check_bool, sys};

    /// Per-play parameters. Out-of-range values are clamped by the host.
    #[derive(Copy, Clone, Debug, PartialEq)]
    pub struct PlayParams {
        /// 0.0 to 1.0
        pub gain: f32,
        /// 0.5 to 2.0
        pub pitch: f32,
        /// -1.0 (left) to 1.0 (right)
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

    pub fn gain() -> f32 {
        unsafe { sys::audio_get_gain() }
    }

    /// Set the global gain (0.0 to 1.0).
    pub fn set_gain(gain: f32) {
        unsafe { sys::audio_set_gain(gain) }
    }

    pub fn stop_all() {
        unsafe { sys::voice_stop_all() }
    }

    /// One of the 32 mixer voices.
    #[derive(Copy, Clone, Debug, Eq, PartialEq)]
    pub struct Voice(pub u32);

    impl Voice {
        pub fn is_playing(self) -> Result<bool> {
            check_bool(unsafe { sys::voice_is_playing(self.0) })
        }

        pub fn stop(self) -> Result<()> {
            check(unsafe { sys::voice_stop(self.0) }).map(drop)
        }
    }

    /// A decoded sample (WAV or QOA). Dropping it releases the guest's handle; voices
    /// already playing it keep going.
    #[derive(Debug)]
    pub struct Sample {
        id: u32,
    }

    impl Sample {
        pub fn decode(bytes: &[u8]) -> Result<Self> {
            let id = check(unsafe { sys::sample_decode(bytes.as_ptr() as u32, bytes.len() as u32) })?;
            Ok(Self { id })
        }

        pub fn id(&self) -> u32 {
            self.id
        }

        pub fn is_valid(&self) -> bool {
            unsafe { sys::sample_is_valid(self.id) != 0 }
        }

        pub fn is_playing(&self) -> bool {
            unsafe { sys::sample_is_playing(self.id) != 0 }
        }

        /// Length in seconds.
        pub fn length(&self) -> Result<f32> {
            let seconds = unsafe { sys::sample_length(self.id) };
            if seconds < 0.0 {
                Err(super::Error::from_code(-(seconds as i32)))
            } else {
                Ok(seconds)
            }
        }

        pub fn play(&self, params: PlayParams) -> Result<Voice> {
            let voice = check(unsafe {
                sys::sample_play(
                    self.id,
                    params.gain,
                    params.pitch,
                    params.pan,
                    params.looping as i32,
                )
            })?;
            Ok(Voice(voice))
        }

        /// Stop every voice playing this sample.
        pub fn stop(&self) -> Result<()> {
            check(unsafe { sys::sample_stop(self.id) }).map(drop)
        }

        /// Stop every voice playing this sample and free it now.
        pub fn destroy(self) -> Result<()> {
            let this = core::mem::ManuallyDrop::new(self);
            check(unsafe { sys::sample_destroy(this.id) }).map(drop)
        }
    }

    impl Drop for Sample {
        fn drop(&mut self) {
            unsafe { sys::sample_release(self.id) }
        }
    }
}

/// Video API.
pub mod video {
    use super::{Error, Result, check, check_bool, sys};

    #[repr(i32)]
    #[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
    pub enum BlendMode {
        None = 0,
        #[default]
        Blend = 1,
        Add = 2,
        Mod = 3,
    }

    #[derive(Copy, Clone, Debug, Eq, PartialEq)]
    pub struct Color {
        pub r: u8,
        pub g: u8,
        pub b: u8,
        pub a: u8,
    }

    impl Color {
        pub const WHITE: Color = Color::rgba(255, 255, 255, 255);
        pub const BLACK: Color = Color::rgba(0, 0, 0, 255);

        pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
            Self { r, g, b, a }
        }

        /// From `0xRRGGBBAA`.
        pub const fn from_packed(packed: u32) -> Self {
            Self::rgba(
                (packed >> 24) as u8,
                (packed >> 16) as u8,
                (packed >> 8) as u8,
                packed as u8,
            )
        }
    }

    pub fn blend_mode() -> BlendMode {
        match unsafe { sys::video_get_blend_mode() } {
            0 => BlendMode::None,
            2 => BlendMode::Add,
            3 => BlendMode::Mod,
            _ => BlendMode::Blend,
        }
    }

    pub fn set_blend_mode(mode: BlendMode) {
        // Every BlendMode value is accepted by the host.
        let _ = unsafe { sys::video_set_blend_mode(mode as i32) };
    }

    pub fn draw_color() -> Color {
        Color::from_packed(unsafe { sys::video_get_draw_color() })
    }

    pub fn set_draw_color(color: Color) {
        unsafe {
            sys::video_set_draw_color(
                color.r as i32,
                color.g as i32,
                color.b as i32,
                color.a as i32,
            )
        }
    }

    /// Fill the current render target with the draw color.
    pub fn clear() {
        unsafe { sys::video_clear() }
    }

    /// The bound image's id, or `None` for the screen.
    pub fn render_target() -> Option<u32> {
        let id = unsafe { sys::video_get_render_target() };
        (id > 0).then_some(id as u32)
    }

    /// Bind a root image as the render target, or `None` for the screen.
    pub fn set_render_target(image: Option<&Image>) -> Result<()> {
        let id = image.map_or(0, |i| i.id as i32);
        check(unsafe { sys::video_set_render_target(id) }).map(drop)
    }

    /// A host image. Children keep their parent alive on the host side.
    #[derive(Debug)]
    pub struct Image {
        id: u32,
    }

    impl Image {
        /// Decode a PNG.
        pub fn load(png: &[u8]) -> Result<Self> {
            let id = check(unsafe { sys::image_load(png.as_ptr() as u32, png.len() as u32) })?;
            Ok(Self { id })
        }

        /// A blank (transparent) image usable as a render target.
        pub fn create(width: i32, height: i32) -> Result<Self> {
            let id = check(unsafe { sys::image_create(width, height) })?;
            Ok(Self { id })
        }

        /// A view of a region of this image, clipped to its bounds.
        pub fn child(&self, x: i32, y: i32, w: i32, h: i32) -> Result<Self> {
            let id = check(unsafe { sys::image_create_child(self.id, x, y, w, h) })?;
            Ok(Self { id })
        }

        pub fn id(&self) -> u32 {
            self.id
        }

        pub fn is_valid(&self) -> bool {
            unsafe { sys::image_is_valid(self.id) != 0 }
        }

        pub fn is_child(&self) -> Result<bool> {
            check_bool(unsafe { sys::image_is_child(self.id) })
        }

        pub fn size(&self) -> Result<(u32, u32)> {
            let packed = unsafe { sys::image_get_size(self.id) };
            if packed < 0 {
                return Err(Error::from_code(-(packed as i32)));
            }
            Ok(((packed >> 32) as u32, packed as u32))
        }

        /// Draw with the current draw color and blend mode.
        pub fn draw(&self, x: i32, y: i32) -> Result<()> {
            check(unsafe { sys::image_draw(self.id, x, y) }).map(drop)
        }

        /// Free the image now. Children of a destroyed root stop drawing.
        pub fn destroy(self) -> Result<()> {
            let this = core::mem::ManuallyDrop::new(self);
            check(unsafe { sys::image_destroy(this.id) }).map(drop)
        }
    }

    impl Drop for Image {
        fn drop(&mut self) {
            unsafe { sys::image_release(self.id) }
        }
    }
}

/// Window API.
pub mod window {
    use super::{String, read_string, sys};

    /// Stop the frame loop after the current frame.
    pub fn close() {
        unsafe { sys::window_close() }
    }

    pub fn title() -> String {
        read_string(|ptr, cap| unsafe { sys::window_get_title(ptr, cap) })
    }

    pub fn set_title(title: &str) {
        unsafe { sys::window_set_title(title.as_ptr() as u32, title.len() as u32) }
    }

    pub fn is_fullscreen() -> bool {
        unsafe { sys::window_is_fullscreen() != 0 }
    }

    pub fn set_fullscreen(fullscreen: bool) {
        unsafe { sys::window_set_fullscreen(fullscreen as i32) }
    }
}

/// System API.
pub mod system {
    use super::{Error, Result, String, Vec, read_string, sys};

    /// Log a message to the host console.
    pub fn log(message: &str) {
        unsafe { sys::log(message.as_ptr() as u32, message.len() as u32) }
    }

    /// Milliseconds since the runtime started.
    pub fn ticks() -> i64 {
        unsafe { sys::ticks() }
    }

    /// Message for the most recent failed host call.
    pub fn last_error() -> String {
        read_string(|ptr, cap| unsafe { sys::last_error(ptr, cap) })
    }

    /// LZ4 with the uncompressed size prepended.
    pub fn compress(data: &[u8]) -> Vec<u8> {
        let src = (data.as_ptr() as u32, data.len() as u32);
        let needed = unsafe { sys::compress(src.0, src.1, 0, 0) };
        let mut out = alloc::vec![0u8; needed.unsigned_abs() as usize];
        let written = unsafe { sys::compress(src.0, src.1, out.as_mut_ptr() as u32, out.len() as u32) };
        out.truncate(written.max(0) as usize);
        out
    }

    /// Inverse of [`compress`].
    pub fn decompress(data: &[u8]) -> Result<Vec<u8>> {
        let Some(prefix) = data.get(..4) else {
            return Err(Error::Decode);
        };
        let size = u32::from_le_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]);
        let mut out = alloc::vec![0u8; size as usize];
        let status = unsafe {
            sys::decompress(
                data.as_ptr() as u32,
                data.len() as u32,
                out.as_mut_ptr() as u32,
                out.len() as u32,
            )
        };
        if status < 0 {
            return Err(Error::Decode);
        }
        out.truncate(status as usize);
        Ok(out)
    }

    /// xxh3-64.
    pub fn hash(data: &[u8]) -> u64 {
        unsafe { sys::hash(data.as_ptr() as u32, data.len() as u32) as u64 }
    }
}

/// Convenience prelude for guest apps.
pub mod prelude {
    pub use crate::Error;
    pub use crate::audio::{self, PlayParams, Sample, Voice};
    pub use crate::system;
    pub use crate::video::{self, BlendMode, Color, Image};
    pub use crate::window;
}

