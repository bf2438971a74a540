//! Batch handler for 2D point lights.
//!
//! Each light is one quad covering its radius, drawn additively with a
//! radial falloff computed in the fragment shader from the vertex's local
//! coordinate. No textures are bound, so lights never break a batch over
//! texture slots; only capacity and the usual batch-switch rules flush.

use bytemuck::{Pod, Zeroable};
use glam::Vec2;

use crate::color::Color;
use crate::gpu::GpuContext;

use super::batch::{InstanceBuffer, strip_quad_indices};
use super::manager::PipelineConfig;
use super::object::BlendMode;

/// One vertex of a light quad. Field order matches `shaders/light.wgsl`.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct LightVertex {
    pub position: [f32; 2],
    /// Corner coordinate in the light's local space, `[-1, 1]` per axis.
    pub local: [f32; 2],
    pub color: [f32; 4],
    pub radius: f32,
    pub intensity: f32,
}

impl LightVertex {
    pub const ATTRS: [wgpu::VertexAttribute; 5] = wgpu::vertex_attr_array![
        0 => Float32x2,
        1 => Float32x2,
        2 => Float32x4,
        3 => Float32,
        4 => Float32
    ];

    pub const LAYOUT: wgpu::VertexBufferLayout<'static> = wgpu::VertexBufferLayout {
        array_stride: std::mem::size_of::<LightVertex>() as u64,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &Self::ATTRS,
    };
}

/// Batch input for one light.
pub struct LightSubmission {
    pub center: Vec2,
    pub radius: f32,
    pub color: Color,
    pub intensity: f32,
}

pub struct LightBatcher {
    fill: InstanceBuffer<LightVertex>,
    pipeline: wgpu::RenderPipeline,
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    buffer_instances: u32,
    cursor: u32,
}

impl LightBatcher {
    pub fn new(
        gpu: &GpuContext,
        view_layout: &wgpu::BindGroupLayout,
        config: &PipelineConfig,
    ) -> Self {
        use wgpu::util::DeviceExt;

        let shader = gpu
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some("Light Batch Shader"),
                source: wgpu::ShaderSource::Wgsl(include_str!("../shaders/light.wgsl").into()),
            });

        let pipeline_layout = gpu
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("Light Batch Pipeline Layout"),
                bind_group_layouts: &[view_layout],
                push_constant_ranges: &[],
            });

        // Lights always blend additively.
        let pipeline = super::quad_batch::batch_pipeline(
            gpu,
            "Light Batch Pipeline",
            &pipeline_layout,
            &shader,
            LightVertex::LAYOUT,
            BlendMode::Additive,
        );

        let instances = config.instances_per_batch;
        let buffer_instances = instances * config.frame_buffer_batches;
        let vertex_buffer = gpu.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Light Batch Vertices"),
            size: buffer_instances as u64 * 4 * std::mem::size_of::<LightVertex>() as u64,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let index_buffer = gpu
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Light Batch Indices"),
                contents: bytemuck::cast_slice(&strip_quad_indices(instances)),
                usage: wgpu::BufferUsages::INDEX,
            });

        Self {
            fill: InstanceBuffer::new(instances, 4),
            pipeline,
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
        submission: &LightSubmission,
    ) {
        let &LightSubmission {
            center,
            radius,
            color,
            intensity,
        } = submission;
        let color = [color.r, color.g, color.b, color.a];

        // Corner order: top-left, bottom-left, top-right, bottom-right.
        let locals = [
            Vec2::new(-1.0, -1.0),
            Vec2::new(-1.0, 1.0),
            Vec2::new(1.0, -1.0),
            Vec2::new(1.0, 1.0),
        ];
        let vertices: [LightVertex; 4] = std::array::from_fn(|i| LightVertex {
            position: (center + locals[i] * radius).to_array(),
            local: locals[i].to_array(),
            color,
            radius,
            intensity,
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

        if self.cursor + count > self.buffer_instances {
            log::warn!(
                "light batch vertex buffer wrapped after {} instances this frame",
                self.cursor
            );
            self.cursor = 0;
        }

        let byte_offset = self.cursor as u64 * 4 * std::mem::size_of::<LightVertex>() as u64;
        gpu.queue
            .write_buffer(&self.vertex_buffer, byte_offset, self.fill.bytes());

        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, view, &[]);
        pass.set_vertex_buffer(0, self.vertex_buffer.slice(..));
        pass.set_index_buffer(self.index_buffer.slice(..), wgpu::IndexFormat::Uint16);
        pass.draw_indexed(0..count * 6, (self.cursor * 4) as i32, 0..1);

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
            LightVertex::LAYOUT.array_stride,
            std::mem::size_of::<LightVertex>() as u64
        );
    }
}
