//! Drawing contexts and the per-frame render context.
//!
//! A [`DrawingContext`] is the render-target state a draw operates under:
//! viewport, scissor, projection, and camera alpha. Exactly one is bound to
//! the GPU pass at a time; camera nodes clone the active context for custom
//! viewports and restore the parent when done.
//!
//! [`RenderContext`] bundles everything a node needs during one frame: the
//! GPU handles, the open render pass, the batch handlers, the current-batch
//! state machine, the view-uniform pool, the debug recorder, and the bound
//! context stack. It is created by the manager's frame driver and passed by
//! mutable reference through the entire node tree.

use bytemuck::{Pod, Zeroable};
use glam::Mat4;

use crate::camera::{Camera2d, Rect};
use crate::gpu::GpuContext;

use super::batch::{BatchState, BatcherId, BatcherSet, CurrentBatch};
use super::debug::CallGraph;
use super::light_batch::LightSubmission;
use super::manager::RenderEvents;
use super::quad_batch::QuadSubmission;
use super::strip_batch::StripVertex;
use super::tile_batch::TileSpriteSubmission;

/// Active render-target state: viewport, scissor box, projection matrix,
/// and the alpha of the camera that established it.
///
/// Contexts are cheap plain data. Clones taken for nested or custom
/// viewports get fresh ids from the frame's allocator; the id is what the
/// batch state machine compares to detect a context switch.
#[derive(Clone, Debug)]
pub struct DrawingContext {
    id: u32,
    pub viewport: Rect,
    pub scissor: Option<[u32; 4]>,
    pub projection: Mat4,
    pub camera_alpha: f32,
}

impl DrawingContext {
    /// The default full-surface context a frame starts with. Always id 0.
    pub fn screen(width: f32, height: f32) -> Self {
        Self {
            id: 0,
            viewport: Rect::new(0.0, 0.0, width, height),
            scissor: None,
            projection: Mat4::orthographic_rh(0.0, width, height, 0.0, -1.0, 1.0),
            camera_alpha: 1.0,
        }
    }

    /// Clones this context for a camera pass.
    ///
    /// The clone takes the camera's projection and alpha. A camera with a
    /// custom viewport also narrows the viewport and applies a scissor box
    /// matching its bounds; otherwise the parent viewport is inherited.
    pub fn for_camera(&self, id: u32, camera: &Camera2d) -> Self {
        let (viewport, scissor) = if camera.custom_viewport {
            let vp = camera.viewport;
            let scissor = [
                vp.x.max(0.0) as u32,
                vp.y.max(0.0) as u32,
                vp.w.max(0.0) as u32,
                vp.h.max(0.0) as u32,
            ];
            (vp, Some(scissor))
        } else {
            (self.viewport, self.scissor)
        };

        Self {
            id,
            viewport,
            scissor,
            projection: camera.projection(),
            camera_alpha: self.camera_alpha * camera.alpha,
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    #[cfg(test)]
    pub(crate) fn for_test(id: u32, projection: Mat4) -> Self {
        Self {
            id,
            viewport: Rect::new(0.0, 0.0, 1.0, 1.0),
            scissor: None,
            projection,
            camera_alpha: 1.0,
        }
    }
}

/// Per-view uniform data matching the `ViewUniforms` struct in the WGSL
/// shaders.
#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
struct ViewUniformData {
    projection: [[f32; 4]; 4],
    resolution: [f32; 2],
    camera_alpha: f32,
    _padding: f32,
}

struct ViewEntry {
    context_id: u32,
    #[allow(dead_code)]
    buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
}

/// Pool of per-drawing-context uniform bind groups for one frame.
///
/// Context ids restart every frame, so entries are recycled through a free
/// pool at frame start rather than reallocated. A frame typically touches a
/// handful of contexts (screen plus one per camera).
pub struct ViewUniforms {
    pub(crate) layout: wgpu::BindGroupLayout,
    entries: Vec<ViewEntry>,
    pool: Vec<(wgpu::Buffer, wgpu::BindGroup)>,
}

impl ViewUniforms {
    pub fn new(gpu: &GpuContext) -> Self {
        let layout = gpu
            .device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("View Uniform Layout"),
                entries: &[wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                }],
            });

        Self {
            layout,
            entries: Vec::new(),
            pool: Vec::new(),
        }
    }

    pub fn begin_frame(&mut self) {
        for entry in self.entries.drain(..) {
            self.pool.push((entry.buffer, entry.bind_group));
        }
    }

    /// Returns the bind-group index for the given context, creating and
    /// writing its uniforms on first use this frame.
    pub fn ensure(&mut self, gpu: &GpuContext, context: &DrawingContext) -> usize {
        if let Some(index) = self
            .entries
            .iter()
            .position(|e| e.context_id == context.id())
        {
            return index;
        }

        let (buffer, bind_group) = self.pool.pop().unwrap_or_else(|| {
            let buffer = gpu.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("View Uniforms"),
                size: std::mem::size_of::<ViewUniformData>() as u64,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            });
            let bind_group = gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("View Uniform Bind Group"),
                layout: &self.layout,
                entries: &[wgpu::BindGroupEntry {
                    binding: 0,
                    resource: buffer.as_entire_binding(),
                }],
            });
            (buffer, bind_group)
        });

        let data = ViewUniformData {
            projection: context.projection.to_cols_array_2d(),
            resolution: [context.viewport.w, context.viewport.h],
            camera_alpha: context.camera_alpha,
            _padding: 0.0,
        };
        gpu.queue
            .write_buffer(&buffer, 0, bytemuck::cast_slice(&[data]));

        self.entries.push(ViewEntry {
            context_id: context.id(),
            buffer,
            bind_group,
        });
        self.entries.len() - 1
    }

    pub fn bind_group(&self, index: usize) -> &wgpu::BindGroup {
        &self.entries[index].bind_group
    }
}

/// Everything a render node needs during one frame.
///
/// Created by `RenderNodeManager::render_frame` and threaded by mutable
/// reference through the node tree; nodes never hold onto it beyond the
/// frame.
pub struct RenderContext<'a> {
    pub gpu: &'a GpuContext,
    pub pass: &'a mut wgpu::RenderPass<'static>,
    pub batchers: &'a mut BatcherSet,
    pub state: &'a mut BatchState,
    pub views: &'a mut ViewUniforms,
    pub debug: &'a mut CallGraph,
    pub events: &'a RenderEvents,
    context_stack: Vec<DrawingContext>,
    next_context_id: u32,
}

impl<'a> RenderContext<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        gpu: &'a GpuContext,
        pass: &'a mut wgpu::RenderPass<'static>,
        batchers: &'a mut BatcherSet,
        state: &'a mut BatchState,
        views: &'a mut ViewUniforms,
        debug: &'a mut CallGraph,
        events: &'a RenderEvents,
        screen: DrawingContext,
    ) -> Self {
        Self {
            gpu,
            pass,
            batchers,
            state,
            views,
            debug,
            events,
            context_stack: vec![screen],
            next_context_id: 1,
        }
    }

    /// Allocates a fresh drawing-context id for this frame.
    pub fn alloc_context_id(&mut self) -> u32 {
        let id = self.next_context_id;
        self.next_context_id += 1;
        id
    }

    /// The drawing context currently bound to the pass.
    pub fn current_context(&self) -> &DrawingContext {
        self.context_stack.last().expect("context stack underflow")
    }

    /// Records entry/exit around `f` in the debug call graph.
    ///
    /// Push and pop are structurally paired: there is no way to leave the
    /// scope without the pop running, so the recorded tree always nests
    /// correctly.
    pub fn scoped<R>(&mut self, name: &str, f: impl FnOnce(&mut Self) -> R) -> R {
        self.debug.push(name);
        let result = f(self);
        self.debug.pop();
        result
    }

    /// Binds `context` as the active drawing context.
    ///
    /// Flushes any pending batch first (its instances were submitted under
    /// the previous context's GPU state), then applies the new viewport and
    /// scissor and pushes the context onto the stack.
    pub fn bind_context(&mut self, context: DrawingContext) {
        self.interrupt_batch();
        self.apply_context(&context);
        self.context_stack.push(context);
    }

    /// Releases the innermost bound context and restores its parent's
    /// viewport and scissor. Flushes pending work first.
    pub fn unbind_context(&mut self) {
        self.interrupt_batch();
        if self.context_stack.len() > 1 {
            self.context_stack.pop();
        }
        let parent = self.current_context().clone();
        self.apply_context(&parent);
    }

    fn apply_context(&mut self, context: &DrawingContext) {
        let vp = context.viewport;
        self.pass.set_viewport(vp.x, vp.y, vp.w, vp.h, 0.0, 1.0);
        match context.scissor {
            Some([x, y, w, h]) => self.pass.set_scissor_rect(x, y, w, h),
            None => self
                .pass
                .set_scissor_rect(0, 0, self.gpu.width(), self.gpu.height()),
        }
    }

    /// Makes `id` the current batch under the bound drawing context,
    /// flushing whichever batch was previously current if it differs.
    pub fn begin_batch(&mut self, id: BatcherId) {
        let context = self.current_context().clone();
        let next = CurrentBatch {
            batcher: id,
            context,
        };
        if let Some(prev) = self.state.switch(Some(next)) {
            self.flush_entry(prev);
        }
    }

    /// Flushes whatever batch is pending and clears the current-batch slot.
    ///
    /// This is the hook non-batched draws use before issuing GPU work that
    /// is incompatible with batching; it is also the end-of-camera and
    /// end-of-frame flush trigger.
    pub fn start_stand_alone_render(&mut self) {
        self.interrupt_batch();
    }

    /// Same as [`start_stand_alone_render`](Self::start_stand_alone_render);
    /// internal name used by the pipeline's own flush points.
    pub fn interrupt_batch(&mut self) {
        if let Some(prev) = self.state.switch(None) {
            self.flush_entry(prev);
        }
    }

    fn flush_entry(&mut self, entry: CurrentBatch) {
        let index = self.views.ensure(self.gpu, &entry.context);
        self.batchers
            .flush(entry.batcher, self.gpu, self.pass, self.views.bind_group(index));
    }

    /// Submits one quad instance to the quad batcher.
    pub fn batch_quad(&mut self, submission: &QuadSubmission<'_>) {
        self.begin_batch(BatcherId::Quad);
        let context = self.current_context().clone();
        let index = self.views.ensure(self.gpu, &context);
        self.batchers
            .quad
            .batch(self.gpu, self.pass, self.views.bind_group(index), submission);
    }

    /// Submits one repeating-texture quad to the tile-sprite batcher.
    pub fn batch_tile_sprite(&mut self, submission: &TileSpriteSubmission<'_>) {
        self.begin_batch(BatcherId::TileSprite);
        let context = self.current_context().clone();
        let index = self.views.ensure(self.gpu, &context);
        self.batchers.tile_sprite.batch(
            self.gpu,
            self.pass,
            self.views.bind_group(index),
            submission,
        );
    }

    /// Submits one light quad to the light batcher.
    pub fn batch_light(&mut self, submission: &LightSubmission) {
        self.begin_batch(BatcherId::Light);
        let context = self.current_context().clone();
        let index = self.views.ensure(self.gpu, &context);
        self.batchers
            .light
            .batch(self.gpu, self.pass, self.views.bind_group(index), submission);
    }

    /// Submits a run of triangle-strip vertices to the strip batcher.
    pub fn batch_strip_run(&mut self, vertices: &[StripVertex]) {
        self.begin_batch(BatcherId::Strip);
        let context = self.current_context().clone();
        let index = self.views.ensure(self.gpu, &context);
        self.batchers
            .strip
            .batch_run(self.gpu, self.pass, self.views.bind_group(index), vertices);
    }
}
