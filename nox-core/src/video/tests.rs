use super::canvas::MAX_TEXTURE_SIZE;
use super::*;
use crate::error::{NoxError, ResourceKind};

fn video() -> Video {
    Video::new(16, 16).unwrap()
}

/// Encode an RGBA8 PNG in memory.
fn png_rgba(width: u32, height: u32, rgba: &[u8]) -> Vec<u8> {
    let mut bytes = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut bytes, width, height);
        encoder.set_color(png::ColorType::Rgba);
        encoder.set_depth(png::BitDepth::Eight);
        let mut writer = encoder.write_header().unwrap();
        writer.write_image_data(rgba).unwrap();
    }
    bytes
}

fn png_rgb(width: u32, height: u32, rgb: &[u8]) -> Vec<u8> {
    let mut bytes = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut bytes, width, height);
        encoder.set_color(png::ColorType::Rgb);
        encoder.set_depth(png::BitDepth::Eight);
        let mut writer = encoder.write_header().unwrap();
        writer.write_image_data(rgb).unwrap();
    }
    bytes
}

fn screen_px(v: &Video, x: u32, y: u32) -> [u8; 4] {
    v.canvas().screen().pixel(x, y).unwrap()
}

#[test]
fn defaults_are_blend_and_opaque_white() {
    let v = video();
    assert_eq!(v.blend_mode(), BlendMode::Blend);
    assert_eq!(v.draw_color(), Color::rgba(255, 255, 255, 255));
    assert_eq!(v.render_target(), None);
}

#[test]
fn draw_color_components_are_clamped() {
    let mut v = video();
    v.set_draw_color(300, -5, 128, 999);
    assert_eq!(v.draw_color(), Color::rgba(255, 0, 128, 255));
    assert_eq!(v.draw_color().packed(), 0xFF00_80FF);
}

#[test]
fn loads_png_and_draws_at_native_size() {
    let mut v = video();
    let rgb = png_rgb(2, 1, &[255, 0, 0, 0, 0, 255]);
    let img = v.load_image(&rgb).unwrap();
    assert_eq!(v.image_size(img).unwrap(), (2, 1));
    assert!(!v.is_image_child(img).unwrap());

    v.draw_image(img, 5, 5).unwrap();
    assert_eq!(screen_px(&v, 5, 5), [255, 0, 0, 255]);
    assert_eq!(screen_px(&v, 6, 5), [0, 0, 255, 255]);
    assert_eq!(screen_px(&v, 7, 5), [0, 0, 0, 0]);
}

#[test]
fn malformed_png_is_a_decode_error() {
    let mut v = video();
    assert!(matches!(
        v.load_image(b"\x89PNG\r\n\x1a\nnope"),
        Err(NoxError::Decode(_))
    ));
    assert!(matches!(v.load_image(&[]), Err(NoxError::Decode(_))));
    assert_eq!(v.canvas().texture_count(), 0);
}

#[test]
fn create_rejects_bad_sizes_and_unknown_formats() {
    let mut v = video();
    assert!(matches!(
        v.create_image(0, 4),
        Err(NoxError::InvalidArgument(_))
    ));
    assert!(matches!(
        v.create_image(100_000, 100_000),
        Err(NoxError::InvalidArgument(_))
    ));
    assert!(matches!(
        v.create_image(1, MAX_TEXTURE_SIZE as i32 + 1),
        Err(NoxError::InvalidArgument(_))
    ));
    v.canvas_mut().set_pixel_format(None);
    assert!(matches!(
        v.create_image(4, 4),
        Err(NoxError::UnsupportedPixelFormat)
    ));
    assert_eq!(v.canvas().texture_count(), 0);
}

#[test]
fn child_rects_are_clipped_into_their_parent() {
    let mut v = video();
    let root = v.create_image(10, 10).unwrap();

    let inside = v.create_child_image(root, 2, 3, 4, 5).unwrap();
    assert_eq!(v.images().node(inside).unwrap().rect(), Rect::new(2, 3, 4, 5));

    let overhang = v.create_child_image(root, 8, 8, 10, 10).unwrap();
    assert_eq!(
        v.images().node(overhang).unwrap().rect(),
        Rect::new(8, 8, 2, 2)
    );

    // Offsets are relative to the parent's own rectangle.
    let nested = v.create_child_image(inside, 1, 1, 100, 100).unwrap();
    let nested_rect = v.images().node(nested).unwrap().rect();
    assert_eq!(nested_rect, Rect::new(3, 4, 3, 4));
    assert!(v.images().node(inside).unwrap().rect().contains(&nested_rect));
    assert_eq!(v.images().node(nested).unwrap().parent(), Some(inside));

    let outside = v.create_child_image(root, 50, 50, 4, 4).unwrap();
    assert_eq!(v.image_size(outside).unwrap(), (0, 0));
    let root_rect = v.images().node(root).unwrap().rect();
    assert!(root_rect.contains(&v.images().node(outside).unwrap().rect()));
    let before = v.create_child_image(root, -40, -40, 4, 4).unwrap();
    assert!(root_rect.contains(&v.images().node(before).unwrap().rect()));
    let negative = v.create_child_image(root, 2, 2, -4, 3).unwrap();
    assert_eq!(v.image_size(negative).unwrap(), (0, 3));
}

#[test]
fn child_draws_its_region_of_the_root() {
    let mut v = video();
    #[rustfmt::skip]
    let pixels = [
        255, 0, 0, 255,   0, 255, 0, 255,
        0, 0, 255, 255,   255, 255, 255, 255,
    ];
    let root = v.load_image(&png_rgba(2, 2, &pixels)).unwrap();
    let corner = v.create_child_image(root, 1, 1, 1, 1).unwrap();
    assert!(v.is_image_child(corner).unwrap());

    v.set_blend_mode(BlendMode::None);
    v.draw_image(corner, 0, 0).unwrap();
    assert_eq!(screen_px(&v, 0, 0), [255, 255, 255, 255]);
    assert_eq!(screen_px(&v, 1, 0), [0, 0, 0, 0]);
}

#[test]
fn render_target_rebinding_releases_the_previous_target() {
    let mut v = video();
    let a = v.create_image(4, 4).unwrap();
    let b = v.create_image(4, 4).unwrap();

    v.set_render_target(Some(a)).unwrap();
    assert_eq!(v.render_target(), Some(a));
    v.set_render_target(Some(b)).unwrap();
    assert_eq!(v.render_target(), Some(b));

    // The guest lets go of A; nothing else holds it, so it dies right away.
    v.release_image(a).unwrap();
    assert_eq!(v.canvas().texture_count(), 1);

    // B is kept alive by the binding until it is unbound.
    v.release_image(b).unwrap();
    assert_eq!(v.canvas().texture_count(), 1);
    v.set_render_target(None).unwrap();
    assert_eq!(v.render_target(), None);
    assert_eq!(v.canvas().target(), None);
    assert_eq!(v.canvas().texture_count(), 0);
    assert!(v.images().is_empty());
}

#[test]
fn oversized_png_is_rejected_before_decoding() {
    let mut v = video();
    let wide = MAX_TEXTURE_SIZE + 1;
    let png = png_rgba(wide, 1, &vec![0; wide as usize * 4]);
    assert!(matches!(v.load_image(&png), Err(NoxError::Decode(_))));
    assert_eq!(v.canvas().texture_count(), 0);
}

#[test]
fn rebinding_and_unbinding_keeps_held_targets_usable() {
    let mut v = video();
    let a = v.create_image(2, 2).unwrap();
    let b = v.create_image(2, 2).unwrap();

    v.set_render_target(Some(a)).unwrap();
    let texture_a = v.canvas().target().unwrap();
    v.set_draw_color(255, 0, 0, 255);
    v.clear().unwrap();

    v.set_render_target(Some(b)).unwrap();
    let texture_b = v.canvas().target().unwrap();
    assert_ne!(texture_a, texture_b);
    v.set_draw_color(0, 0, 255, 255);
    v.clear().unwrap();

    v.set_render_target(None).unwrap();
    assert_eq!(v.render_target(), None);
    assert_eq!(v.canvas().target(), None);

    // Both are still held by the guest, so neither was freed by the rebinding.
    assert!(v.is_image_valid(a));
    assert!(v.is_image_valid(b));
    assert_eq!(v.canvas().texture_count(), 2);
    assert_eq!(v.canvas().texture(texture_a).unwrap().pixel(1, 1), Some([255, 0, 0, 255]));
    assert_eq!(v.canvas().texture(texture_b).unwrap().pixel(1, 1), Some([0, 0, 255, 255]));

    v.set_draw_color(255, 255, 255, 255);
    v.set_blend_mode(BlendMode::None);
    v.draw_image(a, 0, 0).unwrap();
    v.draw_image(b, 4, 0).unwrap();
    assert_eq!(screen_px(&v, 1, 1), [255, 0, 0, 255]);
    assert_eq!(screen_px(&v, 5, 1), [0, 0, 255, 255]);
}

#[test]
fn destroying_the_bound_target_unbinds_first() {
    let mut v = video();
    let a = v.create_image(4, 4).unwrap();
    v.set_render_target(Some(a)).unwrap();

    v.destroy_image(a).unwrap();
    assert_eq!(v.render_target(), None);
    assert_eq!(v.canvas().target(), None);
    assert_eq!(v.canvas().texture_count(), 0);
    assert!(!v.is_image_valid(a));

    v.destroy_image(a).unwrap();
    assert!(matches!(
        v.set_render_target(Some(a)),
        Err(NoxError::InvalidResource {
            kind: ResourceKind::Image,
            ..
        })
    ));
}

#[test]
fn only_roots_can_be_render_targets() {
    let mut v = video();
    let root = v.create_image(4, 4).unwrap();
    let child = v.create_child_image(root, 0, 0, 2, 2).unwrap();
    v.set_render_target(Some(root)).unwrap();

    assert!(matches!(
        v.set_render_target(Some(child)),
        Err(NoxError::NotRootImage(id)) if id == child
    ));
    // Failed validation leaves the binding untouched.
    assert_eq!(v.render_target(), Some(root));
    assert!(v.canvas().target().is_some());
}

#[test]
fn clear_fills_the_bound_target_not_the_screen() {
    let mut v = video();
    let target = v.create_image(2, 2).unwrap();
    v.set_render_target(Some(target)).unwrap();
    v.set_draw_color(10, 20, 30, 40);
    v.clear().unwrap();
    assert_eq!(screen_px(&v, 0, 0), [0, 0, 0, 0]);

    // Drawing the target back onto the screen shows the cleared color.
    v.set_render_target(None).unwrap();
    v.set_draw_color(255, 255, 255, 255);
    v.set_blend_mode(BlendMode::None);
    v.draw_image(target, 0, 0).unwrap();
    assert_eq!(screen_px(&v, 1, 1), [10, 20, 30, 40]);
}

#[test]
fn drawing_respects_blend_mode_and_alpha() {
    let mut v = video();
    let img = v
        .load_image(&png_rgba(1, 1, &[200, 100, 0, 255]))
        .unwrap();
    v.set_draw_color(0, 0, 0, 255);
    v.clear().unwrap();

    v.set_draw_color(255, 255, 255, 128);
    v.draw_image(img, 0, 0).unwrap();
    assert_eq!(screen_px(&v, 0, 0), [100, 50, 0, 255]);

    v.set_blend_mode(BlendMode::Add);
    v.set_draw_color(255, 255, 255, 255);
    v.draw_image(img, 1, 0).unwrap();
    v.draw_image(img, 1, 0).unwrap();
    assert_eq!(screen_px(&v, 1, 0), [255, 200, 0, 255]);
}

#[test]
fn child_of_destroyed_root_cannot_be_drawn() {
    let mut v = video();
    let root = v.create_image(4, 4).unwrap();
    let child = v.create_child_image(root, 0, 0, 2, 2).unwrap();

    v.destroy_image(root).unwrap();
    assert_eq!(v.canvas().texture_count(), 0);
    assert!(v.is_image_valid(child));
    assert!(matches!(
        v.draw_image(child, 0, 0),
        Err(NoxError::InvalidResource { id, .. }) if id == root
    ));
}

#[test]
fn released_root_survives_while_children_exist() {
    let mut v = video();
    let root = v.create_image(4, 4).unwrap();
    let child = v.create_child_image(root, 1, 1, 2, 2).unwrap();
    let grandchild = v.create_child_image(child, 0, 0, 1, 1).unwrap();

    v.release_image(root).unwrap();
    v.release_image(child).unwrap();
    assert!(!v.is_image_valid(root));
    assert_eq!(v.canvas().texture_count(), 1);
    v.draw_image(grandchild, 0, 0).unwrap();

    v.release_image(grandchild).unwrap();
    assert_eq!(v.canvas().texture_count(), 0);
    assert!(v.images().is_empty());

    // Releasing again is harmless.
    v.release_image(grandchild).unwrap();
}

#[test]
fn unknown_or_released_handles_are_rejected() {
    let mut v = video();
    assert!(v.destroy_image(99).is_err());
    assert!(v.image_size(99).is_err());
    assert!(!v.is_image_valid(0));

    let img = v.create_image(2, 2).unwrap();
    v.release_image(img).unwrap();
    assert!(v.destroy_image(img).is_err());
    assert!(v.draw_image(img, 0, 0).is_err());
}

#[test]
fn shutdown_frees_every_texture() {
    let mut v = video();
    let a = v.create_image(2, 2).unwrap();
    v.create_child_image(a, 0, 0, 1, 1).unwrap();
    v.create_image(3, 3).unwrap();
    v.set_render_target(Some(a)).unwrap();

    v.shutdown().unwrap();
    assert_eq!(v.canvas().texture_count(), 0);
    assert_eq!(v.canvas().target(), None);
    assert!(v.images().is_empty());
}
