//! Batch handler for colored triangle-strip runs.
//!
//! Shape fills that are not quads (triangles, polygon outlines, ropes and
//! trails) submit arbitrary-length vertex runs. Runs accumulate into one
//! buffer and are stitched together with degenerate joins: the last vertex
//! of the previous run and the first of the next are each doubled, so the
//! whole accumulation still draws as a single non-indexed strip.

use bytemuck::{Pod, Zeroable};

use crate::gpu::GpuContext;

use super::batch::InstanceBuffer;
use super::manager::PipelineConfig;
use super::object::BlendMode;

/// One strip vertex: position and packed color, no texture.
///
/// Field order matches `shaders/strip.wgsl`.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct StripVertex {
    pub position: [f32; 2],
    /// Packed ABGR tint, read as `Unorm8x4`.
    pub tint: u32,
}

impl StripVertex {
    pub const ATTRS: [wgpu::VertexAttribute; 2] = wgpu::vertex_attr_array![
        0 => Float32x2,
        1 => Unorm8x4
    ];

    pub const LAYOUT: wgpu::VertexBufferLayout<'static> = wgpu::VertexBufferLayout {
        array_stride: std::mem::size_of::<StripVertex>() as u64,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &Self::ATTRS,
    };
}

pub struct StripBatcher {
    /// Vertex-granular accumulation: one "instance" is one vertex.
    fill: InstanceBuffer<StripVertex>,
    pipeline: wgpu::RenderPipeline,
    vertex_buffer: wgpu::Buffer,
    buffer_vertices: u32,
    cursor: u32,
}

impl StripBatcher {
    pub fn new(
        gpu: &GpuContext,
        view_layout: &wgpu::BindGroupLayout,
        config: &PipelineConfig,
    ) -> Self {
        let shader = gpu
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some("Strip Batch Shader"),
                source: wgpu::ShaderSource::Wgsl(include_str!("../shaders/strip.wgsl").into()),
            });

        let pipeline_layout = gpu
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("Strip Batch Pipeline Layout"),
                bind_group_layouts: &[view_layout],
                push_constant_ranges: &[],
            });

        let pipeline = gpu
            .device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("Strip Batch Pipeline"),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &shader,
                    entry_point: Some("vs"),
                    buffers: &[StripVertex::LAYOUT],
                    compilation_options: Default::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: &shader,
                    entry_point: Some("fs"),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: gpu.config.format,
                        blend: Some(BlendMode::Normal.state()),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: Default::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleStrip,
                    strip_index_format: None,
                    ..Default::default()
                },
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
                cache: None,
            });

        let vertices = config.strip_vertices_per_batch;
        let buffer_vertices = vertices * config.frame_buffer_batches;
        let vertex_buffer = gpu.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Strip Batch Vertices"),
            size: buffer_vertices as u64 * std::mem::size_of::<StripVertex>() as u64,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        Self {
            fill: InstanceBuffer::new(vertices, 1),
            pipeline,
            vertex_buffer,
            buffer_vertices,
            cursor: 0,
        }
    }

    pub fn begin_frame(&mut self) {
        self.cursor = 0;
    }

    /// Appends one strip run, joining it to any pending run with degenerate
    /// vertices. Flushes first when the run would not fit; a run longer than
    /// the whole buffer is dropped with a warning.
    pub fn batch_run(
        &mut self,
        gpu: &GpuContext,
        pass: &mut wgpu::RenderPass<'static>,
        view: &wgpu::BindGroup,
        vertices: &[StripVertex],
    ) {
        if vertices.len() < 3 {
            return;
        }
        if vertices.len() as u32 > self.fill.instances_per_batch() {
            log::warn!(
                "strip run of {} vertices exceeds batch capacity {}; dropped",
                vertices.len(),
                self.fill.instances_per_batch()
            );
            return;
        }

        let needed = vertices.len() as u32 + if self.fill.is_empty() { 0 } else { 2 };
        if self.fill.remaining() < needed {
            self.flush(gpu, pass, view);
        }

        if let Some(&last) = self.fill.vertices().last() {
            // Degenerate join: repeat the previous run's tail and this
            // run's head so the stitch triangles have zero area.
            self.fill.push(&[last]);
            self.fill.push(&[vertices[0]]);
        }

        let mut full = false;
        for vertex in vertices {
            full = self.fill.push(&[*vertex]);
        }
        if full {
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

        if self.cursor + count > self.buffer_vertices {
            log::warn!(
                "strip batch vertex buffer wrapped after {} vertices this frame",
                self.cursor
            );
            self.cursor = 0;
        }

        let byte_offset = self.cursor as u64 * std::mem::size_of::<StripVertex>() as u64;
        gpu.queue
            .write_buffer(&self.vertex_buffer, byte_offset, self.fill.bytes());

        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, view, &[]);
        pass.set_vertex_buffer(0, self.vertex_buffer.slice(..));
        pass.draw(self.cursor..self.cursor + count, 0..1);

        self.cursor += count;
        self.fill.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex_stride_matches_struct_size() {
        assert_eq!(
            StripVertex::LAYOUT.array_stride,
            std::mem::size_of::<StripVertex>() as u64
        );
    }
}
