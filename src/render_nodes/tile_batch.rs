//! Batch handler for quads whose texture repeats.
//!
//! Tile sprites sample a sub-rectangle of a texture and wrap it across the
//! quad, so their UVs run past `[0, 1]` and the shader remaps them into the
//! source frame with a `fract`. That remap needs the frame rect per vertex,
//! which is why these quads cannot ride in the standard quad batch. One
//! texture is bound per batch; a texture change flushes.

use std::collections::HashMap;
use std::rc::Rc;

use bytemuck::{Pod, Zeroable};
use glam::Vec2;

use crate::gpu::GpuContext;
use crate::texture::{Frame, Texture};

use super::batch::{InstanceBuffer, strip_quad_indices};
use super::manager::PipelineConfig;
use super::object::{BlendMode, RenderOptions};

/// One vertex of a tile-sprite quad. Field order matches
/// `shaders/tile_sprite.wgsl`.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct TileVertex {
    pub position: [f32; 2],
    /// Wrapping UV; whole-number steps are full repeats of the frame.
    pub uv: [f32; 2],
    /// Normalized source frame `[x, y, w, h]` the UV wraps within.
    pub frame: [f32; 4],
    pub tint_fill: u32,
    pub tint: u32,
}

impl TileVertex {
    pub const ATTRS: [wgpu::VertexAttribute; 5] = wgpu::vertex_attr_array![
        0 => Float32x2,
        1 => Float32x2,
        2 => Float32x4,
        3 => Uint32,
        4 => Unorm8x4
    ];

    pub const LAYOUT: wgpu::VertexBufferLayout<'static> = wgpu::VertexBufferLayout {
        array_stride: std::mem::size_of::<TileVertex>() as u64,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &Self::ATTRS,
    };
}

/// Batch input for one repeating-texture quad. Same corner-order and unit
/// conventions as `QuadSubmission`; `uv_source` here is consumed, not just
/// carried.
pub struct TileSpriteSubmission<'a> {
    pub texture: &'a Rc<Texture>,
    pub quad: [Vec2; 4],
    /// Source rectangle in the texture, in pixels.
    pub uv_source: Frame,
    /// Wrapping corner UVs in repeat units.
    pub uvs: [Vec2; 4],
    pub tint_fill: bool,
    pub tints: [u32; 4],
    pub options: RenderOptions,
}

pub struct TileSpriteBatcher {
    fill: InstanceBuffer<TileVertex>,
    texture: Option<Rc<Texture>>,
    pending_blend: BlendMode,
    pipelines: [wgpu::RenderPipeline; BlendMode::COUNT],
    texture_layout: wgpu::BindGroupLayout,
    bind_cache: HashMap<usize, wgpu::BindGroup>,
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    buffer_instances: u32,
    cursor: u32,
}

impl TileSpriteBatcher {
    pub fn new(
        gpu: &GpuContext,
        view_layout: &wgpu::BindGroupLayout,
        config: &PipelineConfig,
    ) -> Self {
        use wgpu::util::DeviceExt;

        let shader = gpu
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some("Tile Sprite Batch Shader"),
                source: wgpu::ShaderSource::Wgsl(
                    include_str!("../shaders/tile_sprite.wgsl").into(),
                ),
            });

        let texture_layout = single_texture_layout(gpu, "Tile Sprite Texture Layout");

        let pipeline_layout = gpu
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("Tile Sprite Pipeline Layout"),
                bind_group_layouts: &[view_layout, &texture_layout],
                push_constant_ranges: &[],
            });

        let pipelines = [BlendMode::Normal, BlendMode::Additive].map(|blend| {
            super::quad_batch::batch_pipeline(
                gpu,
                "Tile Sprite Pipeline",
                &pipeline_layout,
                &shader,
                TileVertex::LAYOUT,
                blend,
            )
        });

        let instances = config.instances_per_batch;
        let buffer_instances = instances * config.frame_buffer_batches;
        let vertex_buffer = gpu.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Tile Sprite Vertices"),
            size: buffer_instances as u64 * 4 * std::mem::size_of::<TileVertex>() as u64,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let index_buffer = gpu
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Tile Sprite Indices"),
                contents: bytemuck::cast_slice(&strip_quad_indices(instances)),
                usage: wgpu::BufferUsages::INDEX,
            });

        Self {
            fill: InstanceBuffer::new(instances, 4),
            texture: None,
            pending_blend: BlendMode::Normal,
            pipelines,
            texture_layout,
            bind_cache: HashMap::new(),
            vertex_buffer,
            index_buffer,
            buffer_instances,
            cursor: 0,
        }
    }

    pub fn begin_frame(&mut self) {
        self.cursor = 0;
    }

    pub fn batch(
        &mut self,
        gpu: &GpuContext,
        pass: &mut wgpu::RenderPass<'static>,
        view: &wgpu::BindGroup,
        submission: &TileSpriteSubmission<'_>,
    ) {
        if submission.options.blend != self.pending_blend {
            self.flush(gpu, pass, view);
            self.pending_blend = submission.options.blend;
        }

        let switching = self
            .texture
            .as_ref()
            .is_none_or(|t| !Rc::ptr_eq(t, submission.texture));
        if switching {
            self.flush(gpu, pass, view);
            self.texture = Some(submission.texture.clone());
        }

        let texture = submission.texture;
        let frame = submission
            .uv_source
            .normalized(texture.width as f32, texture.height as f32);
        let tint_fill = submission.tint_fill as u32;
        let vertices: [TileVertex; 4] = std::array::from_fn(|i| TileVertex {
            position: submission.quad[i].to_array(),
            uv: submission.uvs[i].to_array(),
            frame,
            tint_fill,
            tint: submission.tints[i],
        });

        if self.fill.push(&vertices) {
            self.flush(gpu, pass, view);
        }
    }

    pub fn flush(
        &mut self,
        gpu: &GpuContext,
        pass: &mut wgpu::RenderPass<'static>,
        view: &wgpu::BindGroup,
    ) {
        let count = self.fill.instance_count();
        if count == 0 {
            return;
        }
        let Some(texture) = self.texture.clone() else {
            return;
        };

        if self.cursor + count > self.buffer_instances {
            log::warn!(
                "tile sprite vertex buffer wrapped after {} instances this frame",
                self.cursor
            );
            self.cursor = 0;
        }

        let byte_offset = self.cursor as u64 * 4 * std::mem::size_of::<TileVertex>() as u64;
        gpu.queue
            .write_buffer(&self.vertex_buffer, byte_offset, self.fill.bytes());

        let key = Texture::key(&texture);
        let bind_group = self.bind_cache.entry(key).or_insert_with(|| {
            single_texture_bind_group(gpu, &self.texture_layout, &texture)
        });

        pass.set_pipeline(&self.pipelines[self.pending_blend.index()]);
        pass.set_bind_group(0, view, &[]);
        pass.set_bind_group(1, &*bind_group, &[]);
        pass.set_vertex_buffer(0, self.vertex_buffer.slice(..));
        pass.set_index_buffer(self.index_buffer.slice(..), wgpu::IndexFormat::Uint16);
        pass.draw_indexed(0..count * 6, (self.cursor * 4) as i32, 0..1);

        self.cursor += count;
        self.fill.clear();
    }
}

/// Layout binding one texture and its sampler.
pub(crate) fn single_texture_layout(gpu: &GpuContext, label: &str) -> wgpu::BindGroupLayout {
    gpu.device
        .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some(label),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        })
}

pub(crate) fn single_texture_bind_group(
    gpu: &GpuContext,
    layout: &wgpu::BindGroupLayout,
    texture: &Texture,
) -> wgpu::BindGroup {
    gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("Single Texture Bind Group"),
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(&texture.view),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::Sampler(&texture.sampler),
            },
        ],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex_stride_matches_struct_size() {
        assert_eq!(
            TileVertex::LAYOUT.array_stride,
            std::mem::size_of::<TileVertex>() as u64
        );
    }
}
