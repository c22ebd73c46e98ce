//! Host import definitions for the Wasmtime runtime.
//!
//! Every function here is registered under module `"env"`. Fallible imports go through
//! [`HostState::report`], which turns recoverable errors into negative status codes and
//! lets fatal ones trap the guest.

use anyhow::anyhow;
use tracing::info;
use wasmtime::{Caller, Extern, Linker, Memory};

use crate::abi::{self, IMPORT_MODULE, MEMORY_EXPORT, host_imports};
use crate::audio::PlayParams;
use crate::error::{NoxError, Result};
use crate::state::HostState;
use crate::util;

fn guest_memory(caller: &mut Caller<'_, HostState>) -> anyhow::Result<Memory> {
    caller
        .get_export(MEMORY_EXPORT)
        .and_then(Extern::into_memory)
        .ok_or_else(|| anyhow!("guest does not export `{MEMORY_EXPORT}`"))
}

/// Copy `len` bytes out of guest memory. Out-of-bounds ranges trap.
pub(crate) fn read_guest_bytes(
    caller: &mut Caller<'_, HostState>,
    ptr: u32,
    len: u32,
) -> anyhow::Result<Vec<u8>> {
    let memory = guest_memory(caller)?;
    let end = ptr as u64 + len as u64;
    if end > memory.data_size(&*caller) as u64 {
        return Err(anyhow!("guest range {ptr:#x}+{len} is out of bounds"));
    }
    let mut data = vec![0u8; len as usize];
    memory.read(&*caller, ptr as usize, &mut data)?;
    Ok(data)
}

/// Copy as much of `data` as fits in `cap` bytes at `ptr`. Returns bytes written.
pub(crate) fn write_guest_bytes(
    caller: &mut Caller<'_, HostState>,
    ptr: u32,
    cap: u32,
    data: &[u8],
) -> anyhow::Result<i32> {
    let memory = guest_memory(caller)?;
    let n = data.len().min(cap as usize);
    memory
        .write(&mut *caller, ptr as usize, &data[..n])
        .map_err(|_| anyhow!("guest range {ptr:#x}+{n} is out of bounds"))?;
    Ok(n as i32)
}

/// Write `data` in full, or report `-(needed)` when `cap` is too small.
fn write_all_or_needed(
    caller: &mut Caller<'_, HostState>,
    ptr: u32,
    cap: u32,
    data: &[u8],
) -> anyhow::Result<i32> {
    let needed = i32::try_from(data.len()).map_err(|_| anyhow!("output too large"))?;
    if data.len() > cap as usize {
        return Ok(-needed);
    }
    write_guest_bytes(caller, ptr, cap, data)
}

fn handle(id: u32) -> Result<i32> {
    i32::try_from(id).map_err(|_| NoxError::InvalidArgument(format!("handle {id} overflows")))
}

/// Define all host imports expected by guests under module `"env"`.
///
/// Must be called before instantiating the module.
pub fn define_imports(linker: &mut Linker<HostState>) -> anyhow::Result<()> {
    define_audio(linker)?;
    define_video(linker)?;
    define_window(linker)?;
    define_system(linker)?;
    Ok(())
}

fn define_audio(linker: &mut Linker<HostState>) -> anyhow::Result<()> {
    linker.func_wrap(
        IMPORT_MODULE,
        host_imports::AUDIO_GET_GAIN,
        |caller: Caller<'_, HostState>| -> f32 { caller.data().audio.global_gain() },
    )?;

    linker.func_wrap(
        IMPORT_MODULE,
        host_imports::AUDIO_SET_GAIN,
        |mut caller: Caller<'_, HostState>, gain: f32| {
            caller.data_mut().audio.set_global_gain(gain);
        },
    )?;

    linker.func_wrap(
        IMPORT_MODULE,
        host_imports::VOICE_IS_PLAYING,
        |mut caller: Caller<'_, HostState>, voice: u32| -> anyhow::Result<i32> {
            let state = caller.data_mut();
            let result = state.audio.is_voice_playing(voice).map(i32::from);
            state.report(result)
        },
    )?;

    linker.func_wrap(
        IMPORT_MODULE,
        host_imports::VOICE_STOP,
        |mut caller: Caller<'_, HostState>, voice: u32| -> anyhow::Result<i32> {
            let state = caller.data_mut();
            let result = state.audio.stop_voice(voice).map(|()| 0);
            state.report(result)
        },
    )?;

    linker.func_wrap(
        IMPORT_MODULE,
        host_imports::VOICE_STOP_ALL,
        |mut caller: Caller<'_, HostState>| {
            caller.data_mut().audio.stop_all_voices();
        },
    )?;

    linker.func_wrap(
        IMPORT_MODULE,
        host_imports::SAMPLE_DECODE,
        |mut caller: Caller<'_, HostState>, ptr: u32, len: u32| -> anyhow::Result<i32> {
            let bytes = read_guest_bytes(&mut caller, ptr, len)?;
            let state = caller.data_mut();
            let result = state.audio.decode_sample(&bytes).and_then(handle);
            state.report(result)
        },
    )?;

    linker.func_wrap(
        IMPORT_MODULE,
        host_imports::SAMPLE_IS_VALID,
        |caller: Caller<'_, HostState>, sample: u32| -> i32 {
            caller.data().audio.is_sample_valid(sample).into()
        },
    )?;

    linker.func_wrap(
        IMPORT_MODULE,
        host_imports::SAMPLE_IS_PLAYING,
        |caller: Caller<'_, HostState>, sample: u32| -> i32 {
            caller.data().audio.is_sample_playing(sample).into()
        },
    )?;

    linker.func_wrap(
        IMPORT_MODULE,
        host_imports::SAMPLE_LENGTH,
        |mut caller: Caller<'_, HostState>, sample: u32| -> anyhow::Result<f32> {
            let state = caller.data_mut();
            match state.audio.sample_length_seconds(sample) {
                Ok(seconds) => Ok(seconds as f32),
                Err(e) => Ok(state.report(Err(e))? as f32),
            }
        },
    )?;

    linker.func_wrap(
        IMPORT_MODULE,
        host_imports::SAMPLE_STOP,
        |mut caller: Caller<'_, HostState>, sample: u32| -> anyhow::Result<i32> {
            let state = caller.data_mut();
            let result = state.audio.stop_sample(sample).map(|()| 0);
            state.report(result)
        },
    )?;

    linker.func_wrap(
        IMPORT_MODULE,
        host_imports::SAMPLE_PLAY,
        |mut caller: Caller<'_, HostState>,
         sample: u32,
         gain: f32,
         pitch: f32,
         pan: f32,
         looping: i32|
         -> anyhow::Result<i32> {
            let params = PlayParams {
                gain,
                pitch,
                pan,
                looping: looping != 0,
            };
            let state = caller.data_mut();
            let result = state
                .audio
                .play_sample(sample, params)
                .and_then(handle);
            state.report(result)
        },
    )?;

    linker.func_wrap(
        IMPORT_MODULE,
        host_imports::SAMPLE_DESTROY,
        |mut caller: Caller<'_, HostState>, sample: u32| -> anyhow::Result<i32> {
            let state = caller.data_mut();
            let result = state.audio.destroy_sample(sample).map(|()| 0);
            state.report(result)
        },
    )?;

    linker.func_wrap(
        IMPORT_MODULE,
        host_imports::SAMPLE_RELEASE,
        |mut caller: Caller<'_, HostState>, sample: u32| {
            caller.data_mut().audio.release_sample(sample);
        },
    )?;

    Ok(())
}

fn define_video(linker: &mut Linker<HostState>) -> anyhow::Result<()> {
    linker.func_wrap(
        IMPORT_MODULE,
        host_imports::VIDEO_GET_BLEND_MODE,
        |caller: Caller<'_, HostState>| -> i32 {
            abi::blend_mode_to_abi(caller.data().video.blend_mode())
        },
    )?;

    linker.func_wrap(
        IMPORT_MODULE,
        host_imports::VIDEO_SET_BLEND_MODE,
        |mut caller: Caller<'_, HostState>, mode: i32| -> anyhow::Result<i32> {
            let state = caller.data_mut();
            let result = abi::blend_mode_from_abi(mode).map(|mode| {
                state.video.set_blend_mode(mode);
                0
            });
            state.report(result)
        },
    )?;

    linker.func_wrap(
        IMPORT_MODULE,
        host_imports::VIDEO_GET_DRAW_COLOR,
        |caller: Caller<'_, HostState>| -> u32 { abi::pack_color(caller.data().video.draw_color()) },
    )?;

    linker.func_wrap(
        IMPORT_MODULE,
        host_imports::VIDEO_SET_DRAW_COLOR,
        |mut caller: Caller<'_, HostState>, r: i32, g: i32, b: i32, a: i32| {
            caller.data_mut().video.set_draw_color(r, g, b, a);
        },
    )?;

    linker.func_wrap(
        IMPORT_MODULE,
        host_imports::VIDEO_GET_RENDER_TARGET,
        |caller: Caller<'_, HostState>| -> i32 {
            caller
                .data()
                .video
                .render_target()
                .and_then(|id| handle(id).ok())
                .unwrap_or(0)
        },
    )?;

    linker.func_wrap(
        IMPORT_MODULE,
        host_imports::VIDEO_SET_RENDER_TARGET,
        |mut caller: Caller<'_, HostState>, image: i32| -> anyhow::Result<i32> {
            let state = caller.data_mut();
            let result = state
                .video
                .set_render_target(abi::optional_id(image))
                .map(|()| 0);
            state.report(result)
        },
    )?;

    linker.func_wrap(
        IMPORT_MODULE,
        host_imports::VIDEO_CLEAR,
        |mut caller: Caller<'_, HostState>| -> anyhow::Result<()> {
            let state = caller.data_mut();
            let result = state.video.clear();
            state.report_unit(result)
        },
    )?;

    linker.func_wrap(
        IMPORT_MODULE,
        host_imports::IMAGE_LOAD,
        |mut caller: Caller<'_, HostState>, ptr: u32, len: u32| -> anyhow::Result<i32> {
            let bytes = read_guest_bytes(&mut caller, ptr, len)?;
            let state = caller.data_mut();
            let result = state.video.load_image(&bytes).and_then(handle);
            state.report(result)
        },
    )?;

    linker.func_wrap(
        IMPORT_MODULE,
        host_imports::IMAGE_CREATE,
        |mut caller: Caller<'_, HostState>, w: i32, h: i32| -> anyhow::Result<i32> {
            let state = caller.data_mut();
            let result = state.video.create_image(w, h).and_then(handle);
            state.report(result)
        },
    )?;

    linker.func_wrap(
        IMPORT_MODULE,
        host_imports::IMAGE_CREATE_CHILD,
        |mut caller: Caller<'_, HostState>,
         parent: u32,
         x: i32,
         y: i32,
         w: i32,
         h: i32|
         -> anyhow::Result<i32> {
            let state = caller.data_mut();
            let result = state
                .video
                .create_child_image(parent, x, y, w, h)
                .and_then(handle);
            state.report(result)
        },
    )?;

    linker.func_wrap(
        IMPORT_MODULE,
        host_imports::IMAGE_IS_VALID,
        |caller: Caller<'_, HostState>, image: u32| -> i32 {
            caller.data().video.is_image_valid(image).into()
        },
    )?;

    linker.func_wrap(
        IMPORT_MODULE,
        host_imports::IMAGE_IS_CHILD,
        |mut caller: Caller<'_, HostState>, image: u32| -> anyhow::Result<i32> {
            let state = caller.data_mut();
            let result = state.video.is_image_child(image).map(i32::from);
            state.report(result)
        },
    )?;

    linker.func_wrap(
        IMPORT_MODULE,
        host_imports::IMAGE_GET_SIZE,
        |mut caller: Caller<'_, HostState>, image: u32| -> anyhow::Result<i64> {
            let state = caller.data_mut();
            match state.video.image_size(image) {
                Ok((w, h)) => Ok(abi::pack_size(w, h)),
                Err(e) => Ok(state.report(Err(e))? as i64),
            }
        },
    )?;

    linker.func_wrap(
        IMPORT_MODULE,
        host_imports::IMAGE_DRAW,
        |mut caller: Caller<'_, HostState>, image: u32, x: i32, y: i32| -> anyhow::Result<i32> {
            let state = caller.data_mut();
            let result = state.video.draw_image(image, x, y).map(|()| 0);
            state.report(result)
        },
    )?;

    linker.func_wrap(
        IMPORT_MODULE,
        host_imports::IMAGE_DESTROY,
        |mut caller: Caller<'_, HostState>, image: u32| -> anyhow::Result<i32> {
            let state = caller.data_mut();
            let result = state.video.destroy_image(image).map(|()| 0);
            state.report(result)
        },
    )?;

    linker.func_wrap(
        IMPORT_MODULE,
        host_imports::IMAGE_RELEASE,
        |mut caller: Caller<'_, HostState>, image: u32| -> anyhow::Result<()> {
            let state = caller.data_mut();
            let result = state.video.release_image(image);
            state.report_unit(result)
        },
    )?;

    Ok(())
}

fn define_window(linker: &mut Linker<HostState>) -> anyhow::Result<()> {
    linker.func_wrap(
        IMPORT_MODULE,
        host_imports::WINDOW_CLOSE,
        |mut caller: Caller<'_, HostState>| {
            caller.data_mut().window.running = false;
        },
    )?;

    linker.func_wrap(
        IMPORT_MODULE,
        host_imports::WINDOW_GET_TITLE,
        |mut caller: Caller<'_, HostState>, ptr: u32, cap: u32| -> anyhow::Result<i32> {
            let title = caller.data().window.title.clone();
            write_guest_bytes(&mut caller, ptr, cap, title.as_bytes())
        },
    )?;

    linker.func_wrap(
        IMPORT_MODULE,
        host_imports::WINDOW_SET_TITLE,
        |mut caller: Caller<'_, HostState>, ptr: u32, len: u32| -> anyhow::Result<()> {
            let bytes = read_guest_bytes(&mut caller, ptr, len)?;
            caller.data_mut().window.title = String::from_utf8_lossy(&bytes).into_owned();
            Ok(())
        },
    )?;

    linker.func_wrap(
        IMPORT_MODULE,
        host_imports::WINDOW_IS_FULLSCREEN,
        |caller: Caller<'_, HostState>| -> i32 { caller.data().window.fullscreen.into() },
    )?;

    linker.func_wrap(
        IMPORT_MODULE,
        host_imports::WINDOW_SET_FULLSCREEN,
        |mut caller: Caller<'_, HostState>, fullscreen: i32| {
            caller.data_mut().window.fullscreen = fullscreen != 0;
        },
    )?;

    Ok(())
}

fn define_system(linker: &mut Linker<HostState>) -> anyhow::Result<()> {
    linker.func_wrap(
        IMPORT_MODULE,
        host_imports::LOG,
        |mut caller: Caller<'_, HostState>, ptr: u32, len: u32| -> anyhow::Result<()> {
            let bytes = read_guest_bytes(&mut caller, ptr, len)?;
            info!(target: "guest", "{}", String::from_utf8_lossy(&bytes));
            Ok(())
        },
    )?;

    linker.func_wrap(
        IMPORT_MODULE,
        host_imports::TICKS,
        |caller: Caller<'_, HostState>| -> i64 { caller.data().ticks() },
    )?;

    linker.func_wrap(
        IMPORT_MODULE,
        host_imports::LAST_ERROR,
        |mut caller: Caller<'_, HostState>, ptr: u32, cap: u32| -> anyhow::Result<i32> {
            let message = caller.data().last_error().to_owned();
            write_guest_bytes(&mut caller, ptr, cap, message.as_bytes())
        },
    )?;

    linker.func_wrap(
        IMPORT_MODULE,
        host_imports::COMPRESS,
        |mut caller: Caller<'_, HostState>,
         src_ptr: u32,
         src_len: u32,
         dst_ptr: u32,
         dst_cap: u32|
         -> anyhow::Result<i32> {
            let input = read_guest_bytes(&mut caller, src_ptr, src_len)?;
            let packed = util::compress(&input);
            write_all_or_needed(&mut caller, dst_ptr, dst_cap, &packed)
        },
    )?;

    linker.func_wrap(
        IMPORT_MODULE,
        host_imports::DECOMPRESS,
        |mut caller: Caller<'_, HostState>,
         src_ptr: u32,
         src_len: u32,
         dst_ptr: u32,
         dst_cap: u32|
         -> anyhow::Result<i32> {
            let input = read_guest_bytes(&mut caller, src_ptr, src_len)?;
            match util::decompress(&input) {
                Ok(unpacked) => write_all_or_needed(&mut caller, dst_ptr, dst_cap, &unpacked),
                Err(e) => caller.data_mut().fail(e),
            }
        },
    )?;

    linker.func_wrap(
        IMPORT_MODULE,
        host_imports::HASH,
        |mut caller: Caller<'_, HostState>, ptr: u32, len: u32| -> anyhow::Result<i64> {
            let bytes = read_guest_bytes(&mut caller, ptr, len)?;
            Ok(util::hash(&bytes) as i64)
        },
    )?;

    Ok(())
}
