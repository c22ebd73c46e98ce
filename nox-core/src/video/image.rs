//! Images: canvas textures plus sub-rectangle views into them.
//!
//! A *root* image owns one canvas texture. A *child* image is a rectangle inside its
//! parent (clipped once, at creation) and shares the root's texture. Children hold a
//! keep-alive reference on their parent, and the render-target binding holds one on
//! the bound image, so a root's texture outlives every view into it unless the guest
//! destroys it explicitly.

use std::io::Cursor;

use tracing::debug;

use super::canvas::{BlendMode, Canvas, Color, Rect, TextureId, MAX_TEXTURE_SIZE};
use crate::error::{NoxError, ResourceKind, Result};
use crate::resource::{HandleTable, Resource};

pub type ImageId = u32;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum Backing {
    Root { texture: TextureId },
    Child { parent: ImageId, root: ImageId },
}

#[derive(Clone, Debug)]
pub struct ImageNode {
    rect: Rect,
    backing: Backing,
}

impl ImageNode {
    /// Rectangle inside the root texture.
    pub fn rect(&self) -> Rect {
        self.rect
    }

    pub fn is_child(&self) -> bool {
        matches!(self.backing, Backing::Child { .. })
    }

    pub fn parent(&self) -> Option<ImageId> {
        match self.backing {
            Backing::Root { .. } => None,
            Backing::Child { parent, .. } => Some(parent),
        }
    }
}

#[derive(Debug)]
pub struct ImageGraph {
    table: HandleTable<ImageNode>,
    target: Option<ImageId>,
}

impl Default for ImageGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageGraph {
    pub fn new() -> Self {
        Self {
            table: HandleTable::new(ResourceKind::Image),
            target: None,
        }
    }

    /// Decode a PNG into a new root image.
    pub fn load(&mut self, canvas: &mut Canvas, bytes: &[u8]) -> Result<ImageId> {
        let (width, height, rgba) = decode_png(bytes)?;
        let texture = canvas.create_texture_from_rgba(width, height, rgba)?;
        self.insert_root(canvas, texture, width, height)
    }

    /// A blank root image that can be bound as a render target.
    pub fn create(&mut self, canvas: &mut Canvas, width: i32, height: i32) -> Result<ImageId> {
        if width <= 0 || height <= 0 {
            return Err(NoxError::InvalidArgument(format!(
                "image size {width}x{height} must be positive"
            )));
        }
        if width as u32 > MAX_TEXTURE_SIZE || height as u32 > MAX_TEXTURE_SIZE {
            return Err(NoxError::InvalidArgument(format!(
                "image size {width}x{height} exceeds {MAX_TEXTURE_SIZE}"
            )));
        }
        canvas
            .pixel_format()
            .ok_or(NoxError::UnsupportedPixelFormat)?;
        let texture = canvas.create_texture(width as u32, height as u32)?;
        self.insert_root(canvas, texture, width as u32, height as u32)
    }

    fn insert_root(
        &mut self,
        canvas: &mut Canvas,
        texture: TextureId,
        width: u32,
        height: u32,
    ) -> Result<ImageId> {
        let node = ImageNode {
            rect: Rect::new(0, 0, width as i32, height as i32),
            backing: Backing::Root { texture },
        };
        match self.table.insert(node) {
            Ok(id) => {
                debug!(id, width, height, "image created");
                Ok(id)
            }
            Err(e) => {
                canvas.destroy_texture(texture)?;
                Err(e)
            }
        }
    }

    /// A view of `(x, y, w, h)` relative to `parent`, clipped to the parent's rectangle.
    pub fn create_child(
        &mut self,
        parent: ImageId,
        x: i32,
        y: i32,
        w: i32,
        h: i32,
    ) -> Result<ImageId> {
        let node = self.table.check(parent)?;
        let requested = Rect::new(
            node.rect.x.saturating_add(x),
            node.rect.y.saturating_add(y),
            w.max(0),
            h.max(0),
        );
        let rect = requested.intersect(&node.rect);
        let root = match node.backing {
            Backing::Root { .. } => parent,
            Backing::Child { root, .. } => root,
        };

        let id = self.table.insert(ImageNode {
            rect,
            backing: Backing::Child { parent, root },
        })?;
        self.table.retain(parent)?;
        debug!(id, parent, ?rect, "child image created");
        Ok(id)
    }

    pub fn is_valid(&self, image: ImageId) -> bool {
        self.table.is_valid(image)
    }

    pub fn is_child(&self, image: ImageId) -> Result<bool> {
        Ok(self.table.check(image)?.is_child())
    }

    pub fn size(&self, image: ImageId) -> Result<(i32, i32)> {
        let rect = self.table.check(image)?.rect;
        Ok((rect.w, rect.h))
    }

    pub fn node(&self, image: ImageId) -> Result<&ImageNode> {
        self.table.check(image)
    }

    pub fn render_target(&self) -> Option<ImageId> {
        self.target
    }

    /// Number of images the graph still tracks, including ones kept alive internally.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Texture backing `image`, reached through its root.
    fn texture_of(&self, node: &ImageNode) -> Result<TextureId> {
        match node.backing {
            Backing::Root { texture } => Ok(texture),
            Backing::Child { root, .. } => match self.table.get(root) {
                Some(ImageNode {
                    backing: Backing::Root { texture },
                    ..
                }) => Ok(*texture),
                _ => Err(NoxError::invalid(ResourceKind::Image, root)),
            },
        }
    }

    /// Blit the image's rectangle at `(x, y)` on the current target, at native size.
    pub fn draw(
        &self,
        canvas: &mut Canvas,
        image: ImageId,
        x: i32,
        y: i32,
        color: Color,
        blend: BlendMode,
    ) -> Result<()> {
        let node = self.table.check(image)?;
        let texture = self.texture_of(node)?;
        canvas.copy(texture, node.rect, x, y, color, blend)
    }

    /// Bind a root image as the render target, or go back to the screen with `None`.
    ///
    /// Validation happens before anything changes.
    pub fn set_render_target(&mut self, canvas: &mut Canvas, image: Option<ImageId>) -> Result<()> {
        let Some(id) = image else {
            return self.unbind(canvas);
        };

        let node = self.table.check(id)?;
        let Backing::Root { texture } = node.backing else {
            return Err(NoxError::NotRootImage(id));
        };
        if self.target == Some(id) {
            return Ok(());
        }

        self.unbind(canvas)?;
        self.table.retain(id)?;
        self.target = Some(id);
        canvas.set_target(Some(texture))?;
        debug!(image = id, "render target bound");
        Ok(())
    }

    fn unbind(&mut self, canvas: &mut Canvas) -> Result<()> {
        let Some(previous) = self.target.take() else {
            return Ok(());
        };
        // The canvas must stop targeting the texture before it can be freed.
        canvas.set_target(None)?;
        debug!(image = previous, "render target unbound");
        self.release_ref(canvas, previous)
    }

    /// Free the image's native resource. Repeated calls are no-ops.
    pub fn destroy(&mut self, canvas: &mut Canvas, image: ImageId) -> Result<()> {
        if self.target == Some(image) && self.table.is_valid(image) {
            self.unbind(canvas)?;
        }
        if let Some(node) = self.table.destroy(image)? {
            debug!(image, "image destroyed");
            self.free_backing(canvas, node)?;
        }
        Ok(())
    }

    /// The guest dropped its handle. Finalizes once nothing else references the image.
    pub fn release(&mut self, canvas: &mut Canvas, image: ImageId) -> Result<()> {
        if let Some(resource) = self.table.release_host(image) {
            self.finalize(canvas, image, resource)?;
        }
        Ok(())
    }

    fn finalize(
        &mut self,
        canvas: &mut Canvas,
        image: ImageId,
        mut resource: Resource<ImageNode>,
    ) -> Result<()> {
        if let Some(node) = resource.destroy() {
            debug!(image, "image finalized");
            self.free_backing(canvas, node)?;
        }
        Ok(())
    }

    fn free_backing(&mut self, canvas: &mut Canvas, node: ImageNode) -> Result<()> {
        match node.backing {
            Backing::Root { texture } => canvas.destroy_texture(texture),
            Backing::Child { parent, .. } => self.release_ref(canvas, parent),
        }
    }

    /// Drop a keep-alive reference, finalizing up the parent chain as entries die.
    fn release_ref(&mut self, canvas: &mut Canvas, mut image: ImageId) -> Result<()> {
        while let Some(mut resource) = self.table.release(image) {
            let Some(node) = resource.destroy() else {
                break;
            };
            debug!(image, "image finalized");
            match node.backing {
                Backing::Root { texture } => {
                    canvas.destroy_texture(texture)?;
                    break;
                }
                Backing::Child { parent, .. } => image = parent,
            }
        }
        Ok(())
    }

    /// Unbind and free everything (runtime shutdown).
    pub fn shutdown(&mut self, canvas: &mut Canvas) -> Result<()> {
        self.unbind(canvas)?;
        let mut freed = 0;
        for (_, mut resource) in self.table.drain() {
            if let Some(ImageNode {
                backing: Backing::Root { texture },
                ..
            }) = resource.destroy()
            {
                canvas.destroy_texture(texture)?;
                freed += 1;
            }
        }
        debug!(freed, "image graph shut down");
        Ok(())
    }
}

/// Decode PNG bytes into `(width, height, rgba8)`.
fn decode_png(bytes: &[u8]) -> Result<(u32, u32, Vec<u8>)> {
    let mut decoder = png::Decoder::new(Cursor::new(bytes));
    decoder.set_transformations(png::Transformations::normalize_to_color8());
    let mut reader = decoder
        .read_info()
        .map_err(|e| NoxError::Decode(e.to_string()))?;
    let (w, h) = (reader.info().width, reader.info().height);
    if w > MAX_TEXTURE_SIZE || h > MAX_TEXTURE_SIZE {
        return Err(NoxError::Decode(format!(
            "image size {w}x{h} exceeds {MAX_TEXTURE_SIZE}"
        )));
    }

    let mut buf = vec![0u8; reader.output_buffer_size()];
    let info = reader
        .next_frame(&mut buf)
        .map_err(|e| NoxError::Decode(e.to_string()))?;

    let (w, h) = (info.width, info.height);
    if w == 0 || h == 0 {
        return Err(NoxError::Decode("image has no pixels".into()));
    }

    let bytes = &buf[..info.buffer_size()];
    let rgba: Vec<u8> = match info.color_type {
        png::ColorType::Rgba => bytes.to_vec(),
        png::ColorType::Rgb => bytes
            .chunks_exact(3)
            .flat_map(|p| [p[0], p[1], p[2], 255])
            .collect(),
        png::ColorType::Grayscale => bytes.iter().flat_map(|&g| [g, g, g, 255]).collect(),
        png::ColorType::GrayscaleAlpha => bytes
            .chunks_exact(2)
            .flat_map(|p| [p[0], p[0], p[0], p[1]])
            .collect(),
        png::ColorType::Indexed => {
            return Err(NoxError::Decode("indexed color was not expanded".into()));
        }
    };
    Ok((w, h, rgba))
}
