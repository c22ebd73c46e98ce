//! Software texture backend.
//!
//! Stands in for a GPU renderer: RGBA8 surfaces, a screen surface, one current render
//! target, and textured copies with color modulation and blending. Failures here are
//! backend failures ([`NoxError::Backend`]).

use std::collections::HashMap;
use std::io::Write;

use crate::error::{NoxError, Result};

pub type TextureId = u32;

/// Largest width or height a surface may have.
pub const MAX_TEXTURE_SIZE: u32 = 16384;

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

impl Rect {
    pub const fn new(x: i32, y: i32, w: i32, h: i32) -> Self {
        Self { x, y, w, h }
    }

    pub fn is_empty(&self) -> bool {
        self.w <= 0 || self.h <= 0
    }

    /// Overlap of two rects. Always contained in `other`; zero-sized when disjoint, with
    /// the origin clamped onto `other`'s edge.
    pub fn intersect(&self, other: &Rect) -> Rect {
        let (ox0, oy0) = (other.x as i64, other.y as i64);
        let (ox1, oy1) = (ox0 + other.w.max(0) as i64, oy0 + other.h.max(0) as i64);
        let x0 = (self.x as i64).clamp(ox0, ox1);
        let y0 = (self.y as i64).clamp(oy0, oy1);
        let x1 = (self.x as i64 + self.w as i64).min(ox1);
        let y1 = (self.y as i64 + self.h as i64).min(oy1);
        Rect {
            x: x0 as i32,
            y: y0 as i32,
            w: (x1 - x0).max(0) as i32,
            h: (y1 - y0).max(0) as i32,
        }
    }

    pub fn contains(&self, other: &Rect) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.x as i64 + other.w as i64 <= self.x as i64 + self.w as i64
            && other.y as i64 + other.h as i64 <= self.y as i64 + self.h as i64
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PixelFormat {
    Rgba8888,
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum BlendMode {
    None,
    #[default]
    Blend,
    Add,
    Mod,
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
    pub const TRANSPARENT: Color = Color::rgba(0, 0, 0, 0);

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub const fn to_array(self) -> [u8; 4] {
        [self.r, self.g, self.b, self.a]
    }

    /// `0xRRGGBBAA`
    pub const fn packed(self) -> u32 {
        u32::from_be_bytes(self.to_array())
    }
}

impl Default for Color {
    fn default() -> Self {
        Color::WHITE
    }
}

/// `a * b / 255`, rounded.
#[inline]
fn mul8(a: u8, b: u8) -> u8 {
    ((a as u16 * b as u16 + 127) / 255) as u8
}

fn blend_pixel(src: [u8; 4], dst: [u8; 4], mode: BlendMode) -> [u8; 4] {
    let sa = src[3];
    match mode {
        BlendMode::None => src,
        BlendMode::Blend => {
            let inv = 255 - sa;
            let c = |i: usize| mul8(src[i], sa).saturating_add(mul8(dst[i], inv));
            [c(0), c(1), c(2), sa.saturating_add(mul8(dst[3], inv))]
        }
        BlendMode::Add => {
            let c = |i: usize| mul8(src[i], sa).saturating_add(dst[i]);
            [c(0), c(1), c(2), dst[3]]
        }
        BlendMode::Mod => [
            mul8(src[0], dst[0]),
            mul8(src[1], dst[1]),
            mul8(src[2], dst[2]),
            dst[3],
        ],
    }
}

/// An RGBA8 pixel buffer, row-major, 4 bytes per pixel.
#[derive(Debug, Clone, PartialEq)]
pub struct Surface {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl Surface {
    /// Fully transparent surface.
    pub fn new(width: u32, height: u32) -> Result<Self> {
        if width > MAX_TEXTURE_SIZE || height > MAX_TEXTURE_SIZE {
            return Err(NoxError::Backend(format!(
                "surface size {width}x{height} exceeds {MAX_TEXTURE_SIZE}"
            )));
        }
        let len = (width as usize)
            .checked_mul(height as usize)
            .and_then(|n| n.checked_mul(4))
            .filter(|&n| n > 0)
            .ok_or_else(|| NoxError::Backend(format!("invalid surface size {width}x{height}")))?;
        Ok(Self {
            width,
            height,
            pixels: vec![0; len],
        })
    }

    pub fn from_rgba(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self> {
        let mut surface = Self::new(width, height)?;
        if pixels.len() != surface.pixels.len() {
            return Err(NoxError::Backend(format!(
                "expected {} bytes of RGBA for {width}x{height}, got {}",
                surface.pixels.len(),
                pixels.len()
            )));
        }
        surface.pixels = pixels;
        Ok(surface)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn bounds(&self) -> Rect {
        Rect::new(0, 0, self.width as i32, self.height as i32)
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = (y as usize * self.width as usize + x as usize) * 4;
        Some([
            self.pixels[i],
            self.pixels[i + 1],
            self.pixels[i + 2],
            self.pixels[i + 3],
        ])
    }

    pub fn fill(&mut self, color: Color) {
        let px = color.to_array();
        for chunk in self.pixels.chunks_exact_mut(4) {
            chunk.copy_from_slice(&px);
        }
    }

    pub fn write_png<W: Write>(&self, writer: W) -> core::result::Result<(), png::EncodingError> {
        let mut encoder = png::Encoder::new(writer, self.width, self.height);
        encoder.set_color(png::ColorType::Rgba);
        encoder.set_depth(png::BitDepth::Eight);
        let mut writer = encoder.write_header()?;
        writer.write_image_data(&self.pixels)?;
        writer.finish()
    }
}

#[derive(Debug)]
pub struct Canvas {
    screen: Surface,
    textures: HashMap<TextureId, Surface>,
    next_texture: TextureId,
    target: Option<TextureId>,
    format: Option<PixelFormat>,
}

impl Canvas {
    pub fn new(width: u32, height: u32) -> Result<Self> {
        Ok(Self {
            screen: Surface::new(width, height)?,
            textures: HashMap::new(),
            next_texture: 1,
            target: None,
            format: Some(PixelFormat::Rgba8888),
        })
    }

    /// Pixel format of the display, if it could be determined.
    pub fn pixel_format(&self) -> Option<PixelFormat> {
        self.format
    }

    #[cfg(test)]
    pub(crate) fn set_pixel_format(&mut self, format: Option<PixelFormat>) {
        self.format = format;
    }

    pub fn screen(&self) -> &Surface {
        &self.screen
    }

    pub fn texture(&self, id: TextureId) -> Option<&Surface> {
        self.textures.get(&id)
    }

    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }

    /// Blank (transparent) texture usable as a render target.
    pub fn create_texture(&mut self, width: u32, height: u32) -> Result<TextureId> {
        let surface = Surface::new(width, height)?;
        Ok(self.add(surface))
    }

    pub fn create_texture_from_rgba(
        &mut self,
        width: u32,
        height: u32,
        rgba: Vec<u8>,
    ) -> Result<TextureId> {
        let surface = Surface::from_rgba(width, height, rgba)?;
        Ok(self.add(surface))
    }

    fn add(&mut self, surface: Surface) -> TextureId {
        let id = self.next_texture;
        self.next_texture = self.next_texture.wrapping_add(1).max(1);
        self.textures.insert(id, surface);
        id
    }

    /// Free a texture. The bound target cannot be freed.
    pub fn destroy_texture(&mut self, id: TextureId) -> Result<()> {
        if self.target == Some(id) {
            return Err(NoxError::Backend(format!(
                "texture {id} is the current render target"
            )));
        }
        self.textures
            .remove(&id)
            .map(drop)
            .ok_or_else(|| NoxError::Backend(format!("unknown texture {id}")))
    }

    pub fn target(&self) -> Option<TextureId> {
        self.target
    }

    /// Redirect drawing to `target`, or back to the screen with `None`.
    pub fn set_target(&mut self, target: Option<TextureId>) -> Result<()> {
        if let Some(id) = target {
            if !self.textures.contains_key(&id) {
                return Err(NoxError::Backend(format!(
                    "cannot target unknown texture {id}"
                )));
            }
        }
        self.target = target;
        Ok(())
    }

    fn target_surface_mut(&mut self) -> Result<&mut Surface> {
        match self.target {
            None => Ok(&mut self.screen),
            Some(id) => self
                .textures
                .get_mut(&id)
                .ok_or_else(|| NoxError::Backend(format!("render target {id} vanished"))),
        }
    }

    /// Fill the current target, ignoring blending.
    pub fn clear(&mut self, color: Color) -> Result<()> {
        self.target_surface_mut()?.fill(color);
        Ok(())
    }

    /// Copy `src` out of `texture` to `(x, y)` on the current target at native size.
    ///
    /// Source pixels are modulated by `color` (RGB and alpha) before blending.
    pub fn copy(
        &mut self,
        texture: TextureId,
        src: Rect,
        x: i32,
        y: i32,
        color: Color,
        blend: BlendMode,
    ) -> Result<()> {
        let source = self
            .textures
            .get(&texture)
            .ok_or_else(|| NoxError::Backend(format!("cannot draw unknown texture {texture}")))?;
        let src = src.intersect(&source.bounds());
        if src.is_empty() {
            return Ok(());
        }

        // Modulated source rows; a texture may be drawn onto itself.
        let stride = source.width as usize * 4;
        let mut rows = Vec::with_capacity(src.w as usize * src.h as usize * 4);
        for row in src.y..src.y + src.h {
            let start = row as usize * stride + src.x as usize * 4;
            for px in source.pixels[start..start + src.w as usize * 4].chunks_exact(4) {
                rows.extend_from_slice(&[
                    mul8(px[0], color.r),
                    mul8(px[1], color.g),
                    mul8(px[2], color.b),
                    mul8(px[3], color.a),
                ]);
            }
        }

        let dst = self.target_surface_mut()?;
        let dst_w = dst.width as i64;
        let dst_h = dst.height as i64;

        let x_start = (x as i64).max(0);
        let y_start = (y as i64).max(0);
        let x_end = (x as i64 + src.w as i64).min(dst_w);
        let y_end = (y as i64 + src.h as i64).min(dst_h);
        if x_start >= x_end || y_start >= y_end {
            return Ok(());
        }

        for curr_y in y_start..y_end {
            let src_row = (curr_y - y as i64) as usize * src.w as usize * 4;
            let dst_row = curr_y as usize * dst_w as usize * 4;
            for curr_x in x_start..x_end {
                let s = src_row + (curr_x - x as i64) as usize * 4;
                let d = dst_row + curr_x as usize * 4;
                let src_px = [rows[s], rows[s + 1], rows[s + 2], rows[s + 3]];
                let dst_px = [
                    dst.pixels[d],
                    dst.pixels[d + 1],
                    dst.pixels[d + 2],
                    dst.pixels[d + 3],
                ];
                dst.pixels[d..d + 4].copy_from_slice(&blend_pixel(src_px, dst_px, blend));
            }
        }
        Ok(())
    }
}
