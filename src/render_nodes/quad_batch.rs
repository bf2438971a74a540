//! The standard quad batch handler.
//!
//! Accumulates textured quad instances (sprites, images, camera background
//! fills, rect shapes) and draws them as one indexed triangle strip with
//! degenerate joins. Up to [`MAX_TEXTURE_SLOTS`] textures are bound per
//! batch; each vertex carries the slot its quad samples, so consecutive
//! sprites with different textures still share a draw call until the slots
//! run out.

use std::collections::HashMap;
use std::rc::Rc;

use bytemuck::{Pod, Zeroable};
use glam::Vec2;

use crate::gpu::GpuContext;
use crate::texture::{Frame, Texture};

use super::batch::{InstanceBuffer, strip_quad_indices};
use super::manager::PipelineConfig;
use super::object::{BlendMode, RenderOptions};

/// Fixed texture arity of the quad and tile-sprite shaders.
///
/// The runtime parallel-texture-unit setting clamps between 1 and the
/// smaller of this and the device limit; unused slots are bound to the
/// white texture.
pub const MAX_TEXTURE_SLOTS: usize = 8;

/// One vertex of a quad instance.
///
/// Field order matches the attribute order in `shaders/quad.wgsl`.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct QuadVertex {
    pub position: [f32; 2],
    pub uv: [f32; 2],
    pub texture_slot: u32,
    pub tint_fill: u32,
    /// Packed ABGR tint, read as `Unorm8x4`.
    pub tint: u32,
}

impl QuadVertex {
    pub const ATTRS: [wgpu::VertexAttribute; 5] = wgpu::vertex_attr_array![
        0 => Float32x2,
        1 => Float32x2,
        2 => Uint32,
        3 => Uint32,
        4 => Unorm8x4
    ];

    pub const LAYOUT: wgpu::VertexBufferLayout<'static> = wgpu::VertexBufferLayout {
        array_stride: std::mem::size_of::<QuadVertex>() as u64,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &Self::ATTRS,
    };
}

/// One quad's worth of batch input.
///
/// This is the fixed submission contract between submitters and the quad
/// batcher. Corner arrays are in top-left, bottom-left, top-right,
/// bottom-right order; positions are pixel-space, UVs normalized, tints
/// packed ABGR with alpha folded in. `uv_source` describes the normalized
/// source rectangle the UVs were derived from. The plain quad batcher does
/// not consume it, but wrap-capable handlers (tile sprites) do, and both
/// sides of the contract carry it so submitters need not care which handler
/// a submission resolves to.
pub struct QuadSubmission<'a> {
    pub texture: &'a Rc<Texture>,
    pub quad: [Vec2; 4],
    pub uv_source: Frame,
    pub uvs: [Vec2; 4],
    pub tint_fill: bool,
    pub tints: [u32; 4],
    pub options: RenderOptions,
}

/// Outcome of asking the slot tracker for a texture's slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum SlotAssign {
    /// The texture already occupies this slot.
    Existing(u32),
    /// The texture was bound to this new slot.
    Added(u32),
    /// No slot is free; the batch must flush and reset before binding.
    Full,
}

/// Tracks which textures occupy the batch's parallel texture slots.
///
/// Identity is tracked by opaque keys (texture pointer addresses) so the
/// logic stays independent of GPU types.
pub(crate) struct TextureSlots {
    keys: Vec<usize>,
    max: usize,
}

impl TextureSlots {
    pub fn new(max: usize) -> Self {
        Self {
            keys: Vec::with_capacity(max),
            max,
        }
    }

    pub fn assign(&mut self, key: usize) -> SlotAssign {
        if let Some(slot) = self.keys.iter().position(|&k| k == key) {
            return SlotAssign::Existing(slot as u32);
        }
        if self.keys.len() < self.max {
            self.keys.push(key);
            return SlotAssign::Added((self.keys.len() - 1) as u32);
        }
        SlotAssign::Full
    }

    pub fn reset(&mut self) {
        self.keys.clear();
    }

    pub fn keys(&self) -> &[usize] {
        &self.keys
    }

    /// Adjusts the parallel-slot limit. Textures already bound past the new
    /// limit stay until the next slot exhaustion resets the batch.
    pub fn set_max(&mut self, max: usize) {
        self.max = max;
    }
}

pub struct QuadBatcher {
    fill: InstanceBuffer<QuadVertex>,
    slots: TextureSlots,
    /// Bound textures, parallel to the slot tracker's keys.
    bound: Vec<Rc<Texture>>,
    white: Rc<Texture>,
    pending_blend: BlendMode,
    pipelines: [wgpu::RenderPipeline; BlendMode::COUNT],
    texture_layout: wgpu::BindGroupLayout,
    bind_cache: HashMap<Vec<usize>, wgpu::BindGroup>,
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    /// GPU vertex-buffer capacity, in instances.
    buffer_instances: u32,
    /// Per-frame upload cursor, in instances.
    cursor: u32,
}

impl QuadBatcher {
    pub fn new(
        gpu: &GpuContext,
        view_layout: &wgpu::BindGroupLayout,
        config: &PipelineConfig,
        white: Rc<Texture>,
    ) -> Self {
        use wgpu::util::DeviceExt;

        let shader = gpu
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some("Quad Batch Shader"),
                source: wgpu::ShaderSource::Wgsl(include_str!("../shaders/quad.wgsl").into()),
            });

        let texture_layout = texture_slot_layout(gpu, "Quad Batch Texture Layout");

        let pipeline_layout = gpu
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("Quad Batch Pipeline Layout"),
                bind_group_layouts: &[view_layout, &texture_layout],
                push_constant_ranges: &[],
            });

        let pipelines = [BlendMode::Normal, BlendMode::Additive].map(|blend| {
            batch_pipeline(
                gpu,
                "Quad Batch Pipeline",
                &pipeline_layout,
                &shader,
                QuadVertex::LAYOUT,
                blend,
            )
        });

        let instances = config.instances_per_batch;
        let buffer_instances = instances * config.frame_buffer_batches;
        let vertex_buffer = gpu.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Quad Batch Vertices"),
            size: buffer_instances as u64 * 4 * std::mem::size_of::<QuadVertex>() as u64,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let index_buffer = gpu
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Quad Batch Indices"),
                contents: bytemuck::cast_slice(&strip_quad_indices(instances)),
                usage: wgpu::BufferUsages::INDEX,
            });

        Self {
            fill: InstanceBuffer::new(instances, 4),
            slots: TextureSlots::new(config.max_parallel_texture_units as usize),
            bound: Vec::new(),
            white,
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

    /// Applies the clamped parallel-texture-unit setting.
    pub fn set_max_texture_units(&mut self, units: u32) {
        self.slots.set_max(units as usize);
    }

    /// Accumulates one quad. Flushes first if the submission's blend mode
    /// differs from the pending batch or its texture needs a slot none is
    /// free for; flushes after if the buffer just reached capacity.
    pub fn batch(
        &mut self,
        gpu: &GpuContext,
        pass: &mut wgpu::RenderPass<'static>,
        view: &wgpu::BindGroup,
        submission: &QuadSubmission<'_>,
    ) {
        if submission.options.blend != self.pending_blend {
            self.flush(gpu, pass, view);
            self.pending_blend = submission.options.blend;
        }

        let key = Texture::key(submission.texture);
        let slot = match self.slots.assign(key) {
            SlotAssign::Existing(slot) => slot,
            SlotAssign::Added(slot) => {
                self.bound.push(submission.texture.clone());
                slot
            }
            SlotAssign::Full => {
                self.flush(gpu, pass, view);
                self.slots.reset();
                self.bound.clear();
                let SlotAssign::Added(slot) = self.slots.assign(key) else {
                    unreachable!("slot tracker full immediately after reset");
                };
                self.bound.push(submission.texture.clone());
                slot
            }
        };

        let tint_fill = submission.tint_fill as u32;
        let vertices: [QuadVertex; 4] = std::array::from_fn(|i| QuadVertex {
            position: submission.quad[i].to_array(),
            uv: submission.uvs[i].to_array(),
            texture_slot: slot,
            tint_fill,
            tint: submission.tints[i],
        });

        if self.fill.push(&vertices) {
            self.flush(gpu, pass, view);
        }
    }

    /// Uploads the staged instances and issues one strip draw covering
    /// `instance_count * 6` indices. No-op with nothing pending.
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

        if self.cursor + count > self.buffer_instances {
            log::warn!(
                "quad batch vertex buffer wrapped after {} instances this frame; \
                 raise PipelineConfig::frame_buffer_batches to avoid overdraw artifacts",
                self.cursor
            );
            self.cursor = 0;
        }

        let byte_offset = self.cursor as u64 * 4 * std::mem::size_of::<QuadVertex>() as u64;
        gpu.queue
            .write_buffer(&self.vertex_buffer, byte_offset, self.fill.bytes());

        self.ensure_bind_group(gpu);
        let bind_group = self
            .bind_cache
            .get(self.slots.keys())
            .expect("texture bind group just ensured");

        pass.set_pipeline(&self.pipelines[self.pending_blend.index()]);
        pass.set_bind_group(0, view, &[]);
        pass.set_bind_group(1, bind_group, &[]);
        pass.set_vertex_buffer(0, self.vertex_buffer.slice(..));
        pass.set_index_buffer(self.index_buffer.slice(..), wgpu::IndexFormat::Uint16);
        pass.draw_indexed(0..count * 6, (self.cursor * 4) as i32, 0..1);

        self.cursor += count;
        self.fill.clear();
    }

    fn ensure_bind_group(&mut self, gpu: &GpuContext) {
        if self.bind_cache.contains_key(self.slots.keys()) {
            return;
        }
        let bind_group =
            texture_slot_bind_group(gpu, &self.texture_layout, &self.bound, &self.white);
        self.bind_cache
            .insert(self.slots.keys().to_vec(), bind_group);
    }
}

/// Bind group layout with [`MAX_TEXTURE_SLOTS`] texture/sampler pairs:
/// texture `i` at binding `2i`, its sampler at `2i + 1`.
pub(crate) fn texture_slot_layout(gpu: &GpuContext, label: &str) -> wgpu::BindGroupLayout {
    let mut entries = Vec::with_capacity(MAX_TEXTURE_SLOTS * 2);
    for slot in 0..MAX_TEXTURE_SLOTS as u32 {
        entries.push(wgpu::BindGroupLayoutEntry {
            binding: slot * 2,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        });
        entries.push(wgpu::BindGroupLayoutEntry {
            binding: slot * 2 + 1,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
            count: None,
        });
    }
    gpu.device
        .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some(label),
            entries: &entries,
        })
}

/// Bind group filling every slot: bound textures first, the white texture
/// in any slot no submission has claimed.
pub(crate) fn texture_slot_bind_group(
    gpu: &GpuContext,
    layout: &wgpu::BindGroupLayout,
    bound: &[Rc<Texture>],
    white: &Rc<Texture>,
) -> wgpu::BindGroup {
    let mut entries = Vec::with_capacity(MAX_TEXTURE_SLOTS * 2);
    for slot in 0..MAX_TEXTURE_SLOTS {
        let texture = bound.get(slot).unwrap_or(white);
        entries.push(wgpu::BindGroupEntry {
            binding: (slot * 2) as u32,
            resource: wgpu::BindingResource::TextureView(&texture.view),
        });
        entries.push(wgpu::BindGroupEntry {
            binding: (slot * 2 + 1) as u32,
            resource: wgpu::BindingResource::Sampler(&texture.sampler),
        });
    }
    gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("Texture Slot Bind Group"),
        layout,
        entries: &entries,
    })
}

/// Builds one strip-topology batch pipeline. Shared by the quad-shaped
/// batchers, which differ only in shader, vertex layout, and blend.
pub(crate) fn batch_pipeline(
    gpu: &GpuContext,
    label: &str,
    layout: &wgpu::PipelineLayout,
    shader: &wgpu::ShaderModule,
    vertex_layout: wgpu::VertexBufferLayout<'static>,
    blend: BlendMode,
) -> wgpu::RenderPipeline {
    gpu.device
        .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(label),
            layout: Some(layout),
            vertex: wgpu::VertexState {
                module: shader,
                entry_point: Some("vs"),
                buffers: &[vertex_layout],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: shader,
                entry_point: Some("fs"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: gpu.config.format,
                    blend: Some(blend.state()),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleStrip,
                strip_index_format: Some(wgpu::IndexFormat::Uint16),
                ..Default::default()
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex_stride_matches_struct_size() {
        assert_eq!(
            QuadVertex::LAYOUT.array_stride,
            std::mem::size_of::<QuadVertex>() as u64
        );
    }

    #[test]
    fn same_texture_reuses_its_slot() {
        let mut slots = TextureSlots::new(4);
        assert_eq!(slots.assign(0xA), SlotAssign::Added(0));
        assert_eq!(slots.assign(0xB), SlotAssign::Added(1));
        assert_eq!(slots.assign(0xA), SlotAssign::Existing(0));
        assert_eq!(slots.keys().len(), 2);
    }

    #[test]
    fn exhausted_slots_report_full_until_reset() {
        let mut slots = TextureSlots::new(2);
        slots.assign(0xA);
        slots.assign(0xB);
        assert_eq!(slots.assign(0xC), SlotAssign::Full);

        // A texture already bound is still fine.
        assert_eq!(slots.assign(0xB), SlotAssign::Existing(1));

        slots.reset();
        assert_eq!(slots.assign(0xC), SlotAssign::Added(0));
    }

    #[test]
    fn single_slot_limit_still_admits_one_texture() {
        let mut slots = TextureSlots::new(1);
        assert_eq!(slots.assign(0xA), SlotAssign::Added(0));
        assert_eq!(slots.assign(0xB), SlotAssign::Full);
    }
}
