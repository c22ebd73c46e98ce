use super::NoxRuntime;
use crate::config::Config;
use crate::state::HostState;

fn runtime(wat: &str) -> NoxRuntime {
    let state = HostState::new(&Config::headless()).unwrap();
    let mut rt = NoxRuntime::new(state).unwrap();
    rt.load(wat.as_bytes()).unwrap();
    rt
}

// 16-bit mono PCM at 8000 Hz with two samples: 0x4000 and 0xC000.
const WAV_SEGMENT: &str = r#"(data (i32.const 0) "RIFF\28\00\00\00WAVEfmt \10\00\00\00\01\00\01\00\40\1f\00\00\80\3e\00\00\02\00\10\00data\04\00\00\00\00\40\00\c0")"#;

#[test]
fn images_render_through_the_guest_abi() {
    let mut rt = runtime(
        r#"(module
            (import "env" "nox_image_create" (func $create (param i32 i32) (result i32)))
            (import "env" "nox_image_create_child" (func $child (param i32 i32 i32 i32 i32) (result i32)))
            (import "env" "nox_image_draw" (func $draw (param i32 i32 i32) (result i32)))
            (import "env" "nox_video_set_render_target" (func $bind (param i32) (result i32)))
            (import "env" "nox_video_set_draw_color" (func $color (param i32 i32 i32 i32)))
            (import "env" "nox_video_clear" (func $clear))
            (import "env" "nox_last_error" (func $last_error (param i32 i32) (result i32)))
            (memory (export "memory") 1)
            (global $img (mut i32) (i32.const 0))
            (func (export "nox_update") (param f32))
            (func (export "paint") (result i32)
                (global.set $img (call $create (i32.const 4) (i32.const 4)))
                (drop (call $bind (global.get $img)))
                (call $color (i32.const 255) (i32.const 0) (i32.const 0) (i32.const 255))
                (call $clear)
                (drop (call $bind (i32.const 0)))
                (call $draw (global.get $img) (i32.const 10) (i32.const 10)))
            (func (export "bind_child") (result i32)
                (call $bind
                    (call $child (global.get $img) (i32.const 0) (i32.const 0) (i32.const 2) (i32.const 2))))
            (func (export "error_len") (result i32)
                (call $last_error (i32.const 0) (i32.const 256))))"#,
    );

    assert_eq!(rt.call_export::<(), i32>("paint", ()).unwrap(), 0);
    let screen = rt.state().video.canvas().screen();
    assert_eq!(screen.pixel(10, 10), Some([255, 0, 0, 255]));
    assert_eq!(screen.pixel(13, 13), Some([255, 0, 0, 255]));
    assert_eq!(screen.pixel(14, 14), Some([0, 0, 0, 0]));

    assert_eq!(rt.call_export::<(), i32>("bind_child", ()).unwrap(), -6);
    assert_eq!(rt.state().video.render_target(), None);
    let len = rt.call_export::<(), i32>("error_len", ()).unwrap();
    assert_eq!(len as usize, rt.state().last_error().len());
    assert!(len > 0);
}

#[test]
fn samples_decode_and_exhaust_the_voice_pool() {
    let mut rt = runtime(&format!(
        r#"(module
            (import "env" "nox_sample_decode" (func $decode (param i32 i32) (result i32)))
            (import "env" "nox_sample_play" (func $play (param i32 f32 f32 f32 i32) (result i32)))
            (memory (export "memory") 1)
            {WAV_SEGMENT}
            (data (i32.const 100) "garbage!")
            (func (export "nox_update") (param f32))
            (func (export "garbage") (result i32)
                (call $decode (i32.const 100) (i32.const 8)))
            (func (export "flood") (result i32)
                (local $s i32) (local $r i32)
                (local.set $s (call $decode (i32.const 0) (i32.const 48)))
                (block $done
                    (loop $next
                        (local.set $r
                            (call $play (local.get $s) (f32.const 1) (f32.const 1) (f32.const 0) (i32.const 1)))
                        (br_if $done (i32.lt_s (local.get $r) (i32.const 0)))
                        (br $next)))
                (local.get $r)))"#
    ));

    assert_eq!(rt.call_export::<(), i32>("garbage", ()).unwrap(), -2);
    assert_eq!(rt.call_export::<(), i32>("flood", ()).unwrap(), -4);

    let audio = &rt.state().audio;
    assert!(audio.is_sample_valid(1));
    assert!(audio.is_sample_playing(1));
    assert!((1..=32).all(|v| audio.is_voice_playing(v).unwrap()));
}

#[test]
fn out_of_bounds_pointers_trap() {
    let mut rt = runtime(
        r#"(module
            (import "env" "nox_sample_decode" (func $decode (param i32 i32) (result i32)))
            (memory (export "memory") 1)
            (func (export "nox_update") (param f32))
            (func (export "overrun") (result i32)
                (call $decode (i32.const 65530) (i32.const 100))))"#,
    );

    assert!(rt.call_export::<(), i32>("overrun", ()).is_err());
    assert_eq!(rt.state().audio.store().len(), 0);
}

#[test]
fn missing_update_export_is_rejected() {
    let state = HostState::new(&Config::headless()).unwrap();
    let mut rt = NoxRuntime::new(state).unwrap();
    let err = rt.load(b"(module (func (export \"nox_init\")))").unwrap_err();
    assert!(err.to_string().contains("nox_update"));
    assert!(rt.update(0.016).is_err());
}

#[test]
fn lifecycle_and_window_close() {
    let mut rt = runtime(
        r#"(module
            (import "env" "nox_window_close" (func $close))
            (import "env" "nox_window_set_title" (func $set_title (param i32 i32)))
            (memory (export "memory") 1)
            (data (i32.const 0) "ready")
            (global $frames (mut i32) (i32.const 0))
            (func (export "nox_init")
                (call $set_title (i32.const 0) (i32.const 5)))
            (func (export "nox_update") (param f32)
                (global.set $frames (i32.add (global.get $frames) (i32.const 1)))
                (if (i32.eq (global.get $frames) (i32.const 3))
                    (then (call $close)))))"#,
    );

    rt.init().unwrap();
    assert_eq!(rt.state().window.title, "ready");

    for _ in 0..2 {
        rt.update(1.0 / 60.0).unwrap();
        assert!(rt.state().window.running);
    }
    rt.update(1.0 / 60.0).unwrap();
    assert!(!rt.state().window.running);

    // No `nox_quit` export: nothing to call.
    rt.quit().unwrap();
}

#[test]
fn compression_reports_needed_space() {
    let mut rt = runtime(
        r#"(module
            (import "env" "nox_compress" (func $compress (param i32 i32 i32 i32) (result i32)))
            (import "env" "nox_decompress" (func $decompress (param i32 i32 i32 i32) (result i32)))
            (import "env" "nox_hash" (func $hash (param i32 i32) (result i64)))
            (memory (export "memory") 1)
            (func (export "nox_update") (param f32))
            (func (export "compress") (param $cap i32) (result i32)
                (call $compress (i32.const 0) (i32.const 64) (i32.const 1024) (local.get $cap)))
            (func (export "decompress") (param $len i32) (result i32)
                (call $decompress (i32.const 1024) (local.get $len) (i32.const 2048) (i32.const 64)))
            (func (export "corrupt") (result i32)
                (call $decompress (i32.const 4096) (i32.const 0) (i32.const 2048) (i32.const 64)))
            (func (export "hash") (result i64)
                (call $hash (i32.const 0) (i32.const 64))))"#,
    );

    let needed = rt.call_export::<i32, i32>("compress", 1).unwrap();
    assert!(needed < -1);

    let written = rt.call_export::<i32, i32>("compress", 512).unwrap();
    assert_eq!(written, -needed);
    assert_eq!(rt.call_export::<i32, i32>("decompress", written).unwrap(), 64);
    assert_eq!(rt.call_export::<(), i32>("corrupt", ()).unwrap(), -2);

    let hash = rt.call_export::<(), i64>("hash", ()).unwrap();
    assert_eq!(hash as u64, crate::util::hash(&[0u8; 64]));
}
