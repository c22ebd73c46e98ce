//! 2D drawing: the draw state (color, blend mode), the software canvas and images.

pub mod canvas;
pub mod image;

#[cfg(test)]
mod tests;

pub use canvas::{BlendMode, Canvas, Color, PixelFormat, Rect, Surface, TextureId};
pub use image::{ImageGraph, ImageId, ImageNode};

use crate::error::Result;

#[derive(Debug)]
pub struct Video {
    canvas: Canvas,
    images: ImageGraph,
    blend_mode: BlendMode,
    draw_color: Color,
}

impl Video {
    pub fn new(width: u32, height: u32) -> Result<Self> {
        Ok(Self {
            canvas: Canvas::new(width, height)?,
            images: ImageGraph::new(),
            blend_mode: BlendMode::default(),
            draw_color: Color::default(),
        })
    }

    pub fn canvas(&self) -> &Canvas {
        &self.canvas
    }

    pub fn images(&self) -> &ImageGraph {
        &self.images
    }

    pub fn blend_mode(&self) -> BlendMode {
        self.blend_mode
    }

    pub fn set_blend_mode(&mut self, mode: BlendMode) {
        self.blend_mode = mode;
    }

    pub fn draw_color(&self) -> Color {
        self.draw_color
    }

    /// Each component is clamped to `0..=255`.
    pub fn set_draw_color(&mut self, r: i32, g: i32, b: i32, a: i32) {
        let c = |v: i32| v.clamp(0, 255) as u8;
        self.draw_color = Color::rgba(c(r), c(g), c(b), c(a));
    }

    /// Fill the current render target with the draw color.
    pub fn clear(&mut self) -> Result<()> {
        self.canvas.clear(self.draw_color)
    }

    pub fn render_target(&self) -> Option<ImageId> {
        self.images.render_target()
    }

    pub fn set_render_target(&mut self, image: Option<ImageId>) -> Result<()> {
        self.images.set_render_target(&mut self.canvas, image)
    }

    pub fn load_image(&mut self, bytes: &[u8]) -> Result<ImageId> {
        self.images.load(&mut self.canvas, bytes)
    }

    pub fn create_image(&mut self, width: i32, height: i32) -> Result<ImageId> {
        self.images.create(&mut self.canvas, width, height)
    }

    pub fn create_child_image(
        &mut self,
        parent: ImageId,
        x: i32,
        y: i32,
        w: i32,
        h: i32,
    ) -> Result<ImageId> {
        self.images.create_child(parent, x, y, w, h)
    }

    pub fn is_image_valid(&self, image: ImageId) -> bool {
        self.images.is_valid(image)
    }

    pub fn is_image_child(&self, image: ImageId) -> Result<bool> {
        self.images.is_child(image)
    }

    pub fn image_size(&self, image: ImageId) -> Result<(i32, i32)> {
        self.images.size(image)
    }

    /// Draw with the current color, alpha and blend mode.
    pub fn draw_image(&mut self, image: ImageId, x: i32, y: i32) -> Result<()> {
        self.images.draw(
            &mut self.canvas,
            image,
            x,
            y,
            self.draw_color,
            self.blend_mode,
        )
    }

    pub fn destroy_image(&mut self, image: ImageId) -> Result<()> {
        self.images.destroy(&mut self.canvas, image)
    }

    pub fn release_image(&mut self, image: ImageId) -> Result<()> {
        self.images.release(&mut self.canvas, image)
    }

    pub fn shutdown(&mut self) -> Result<()> {
        self.images.shutdown(&mut self.canvas)
    }

    #[cfg(test)]
    pub(crate) fn canvas_mut(&mut self) -> &mut Canvas {
        &mut self.canvas
    }
}
