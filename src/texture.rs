use std::rc::Rc;

use glam::Vec2;

use crate::gpu::GpuContext;

/// A GPU texture that batch shaders can sample.
///
/// Textures are shared between render objects via `Rc`; the quad batcher
/// uses pointer identity to decide whether a submission can reuse an
/// already-bound texture slot or has to claim a new one.
#[derive(Debug)]
pub struct Texture {
    #[allow(dead_code)]
    pub(crate) texture: wgpu::Texture,
    pub(crate) view: wgpu::TextureView,
    pub(crate) sampler: wgpu::Sampler,
    pub width: u32,
    pub height: u32,
}

impl Texture {
    /// Create a texture from raw RGBA data.
    pub fn from_rgba(gpu: &GpuContext, data: &[u8], width: u32, height: u32, label: &str) -> Self {
        use wgpu::util::DeviceExt;

        let texture = gpu.device.create_texture_with_data(
            &gpu.queue,
            &wgpu::TextureDescriptor {
                label: Some(label),
                size: wgpu::Extent3d {
                    width,
                    height,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: wgpu::TextureFormat::Rgba8UnormSrgb,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            },
            wgpu::util::TextureDataOrder::LayerMajor,
            data,
        );

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        let sampler = gpu.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some(&format!("{} Sampler", label)),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        Self {
            texture,
            view,
            sampler,
            width,
            height,
        }
    }

    /// Load a texture from an image file.
    pub fn from_file(gpu: &GpuContext, path: &str) -> Result<Self, image::ImageError> {
        log::info!("Loading texture: {}", path);
        let img = image::open(path)?.to_rgba8();
        let (width, height) = img.dimensions();
        Ok(Self::from_rgba(gpu, &img, width, height, path))
    }

    /// Load a texture from embedded bytes.
    pub fn from_bytes(
        gpu: &GpuContext,
        bytes: &[u8],
        label: &str,
    ) -> Result<Self, image::ImageError> {
        let img = image::load_from_memory(bytes)?.to_rgba8();
        let (width, height) = img.dimensions();
        Ok(Self::from_rgba(gpu, &img, width, height, label))
    }

    /// A shared 1x1 opaque white texture.
    ///
    /// Untextured fills (camera backgrounds, shape submitters) sample this
    /// so they can flow through the same quad batch as sprites, and the
    /// quad batcher binds it to texture slots no submission has claimed.
    pub fn white(gpu: &GpuContext) -> Rc<Self> {
        Rc::new(Self::from_rgba(
            gpu,
            &[255, 255, 255, 255],
            1,
            1,
            "White Texture",
        ))
    }

    /// Stable identity key for texture-slot tracking.
    pub(crate) fn key(this: &Rc<Self>) -> usize {
        Rc::as_ptr(this) as usize
    }
}

/// A rectangular region of a texture, in pixels.
///
/// Frames describe which part of a texture a sprite samples: the whole
/// texture for plain images, a cell for atlas/spritesheet entries, one tile
/// for tilemap rendering.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Frame {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl Frame {
    pub const fn new(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self { x, y, w, h }
    }

    /// The frame covering an entire texture.
    pub fn full(texture: &Texture) -> Self {
        Self::new(0.0, 0.0, texture.width as f32, texture.height as f32)
    }

    /// Normalized `[x, y, w, h]` within a texture of the given size.
    pub fn normalized(&self, tex_width: f32, tex_height: f32) -> [f32; 4] {
        [
            self.x / tex_width,
            self.y / tex_height,
            self.w / tex_width,
            self.h / tex_height,
        ]
    }

    /// Corner UVs in top-left, bottom-left, top-right, bottom-right order.
    ///
    /// The corner order here is a contract shared with every submitter and
    /// batch handler; see `QuadSubmission`.
    pub fn corner_uvs(&self, tex_width: f32, tex_height: f32) -> [Vec2; 4] {
        let [u0, v0, uw, vh] = self.normalized(tex_width, tex_height);
        let (u1, v1) = (u0 + uw, v0 + vh);
        [
            Vec2::new(u0, v0),
            Vec2::new(u0, v1),
            Vec2::new(u1, v0),
            Vec2::new(u1, v1),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_normalizes_against_texture_size() {
        let frame = Frame::new(32.0, 16.0, 64.0, 32.0);
        assert_eq!(frame.normalized(128.0, 64.0), [0.25, 0.25, 0.5, 0.5]);
    }

    #[test]
    fn corner_uvs_follow_the_corner_order_contract() {
        let frame = Frame::new(0.0, 0.0, 64.0, 64.0);
        let uvs = frame.corner_uvs(128.0, 128.0);
        assert_eq!(uvs[0], Vec2::new(0.0, 0.0)); // top-left
        assert_eq!(uvs[1], Vec2::new(0.0, 0.5)); // bottom-left
        assert_eq!(uvs[2], Vec2::new(0.5, 0.0)); // top-right
        assert_eq!(uvs[3], Vec2::new(0.5, 0.5)); // bottom-right
    }
}
