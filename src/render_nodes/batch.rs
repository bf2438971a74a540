//! The generic instance-batching engine.
//!
//! Three pieces cooperate here:
//!
//! - [`InstanceBuffer`]: fixed-capacity CPU staging for one batcher's
//!   instances, tracking the fill level that decides when a flush is forced.
//! - [`BatchState`]: the single current-batch state machine. At most one
//!   batcher is mid-accumulation at any time; switching batcher or drawing
//!   context evicts the previous one, and the eviction is what triggers its
//!   flush.
//! - [`BatcherSet`]: owns the concrete batch handlers and routes flush
//!   requests to them by [`BatcherId`].
//!
//! Draw order is preserved by construction: submissions only merge while
//! they land in the same batcher under the same drawing context, and every
//! interruption (different batcher, different context, capacity, explicit
//! stand-alone render, end of camera pass) flushes before anything else is
//! drawn.

use bytemuck::Pod;

use crate::gpu::GpuContext;

use super::context::DrawingContext;
use super::light_batch::LightBatcher;
use super::quad_batch::QuadBatcher;
use super::strip_batch::StripBatcher;
use super::tile_batch::TileSpriteBatcher;

/// Identifies one of the pipeline's batch handlers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BatcherId {
    Quad,
    TileSprite,
    Light,
    Strip,
}

impl BatcherId {
    pub fn name(self) -> &'static str {
        match self {
            BatcherId::Quad => "QuadBatcher",
            BatcherId::TileSprite => "TileSpriteBatcher",
            BatcherId::Light => "LightBatcher",
            BatcherId::Strip => "StripBatcher",
        }
    }
}

/// The batcher currently accumulating, plus the drawing context its pending
/// instances were submitted under. The context rides along so the eventual
/// flush binds the right view uniforms even if the active context has moved
/// on since.
#[derive(Clone, Debug)]
pub struct CurrentBatch {
    pub batcher: BatcherId,
    pub context: DrawingContext,
}

/// The single current-batch state machine.
///
/// Owned by the manager and threaded by reference through the render call
/// tree. `switch` only *decides*; the caller performs the flush on whatever
/// entry is returned, exactly once.
#[derive(Default)]
pub struct BatchState {
    current: Option<CurrentBatch>,
}

impl BatchState {
    pub fn new() -> Self {
        Self { current: None }
    }

    /// Requests that `next` become the current batch.
    ///
    /// Returns the previously current entry if (and only if) it must be
    /// flushed first. Re-requesting the batcher/context pair that is already
    /// current returns `None` and changes nothing; back-to-back submissions
    /// into the same batch must not flush. Passing `None` clears the slot,
    /// returning whatever was pending.
    pub fn switch(&mut self, next: Option<CurrentBatch>) -> Option<CurrentBatch> {
        if let (Some(cur), Some(next)) = (&self.current, &next)
            && cur.batcher == next.batcher
            && cur.context.id() == next.context.id()
        {
            return None;
        }
        std::mem::replace(&mut self.current, next)
    }

    pub fn current(&self) -> Option<&CurrentBatch> {
        self.current.as_ref()
    }
}

/// Fixed-capacity CPU staging for one batcher's vertex data.
///
/// Capacity is expressed in instances; each instance contributes a fixed
/// number of vertices (4 for quad batchers, 1 for strip batchers, which
/// count raw vertices). The buffer never overfills: `push` reports when the
/// capacity is reached so the batcher can flush synchronously before
/// accepting more work.
pub struct InstanceBuffer<V: Pod> {
    staging: Vec<V>,
    vertices_per_instance: usize,
    instances_per_batch: u32,
    instance_count: u32,
}

impl<V: Pod> InstanceBuffer<V> {
    pub fn new(instances_per_batch: u32, vertices_per_instance: usize) -> Self {
        Self {
            staging: Vec::with_capacity(instances_per_batch as usize * vertices_per_instance),
            vertices_per_instance,
            instances_per_batch,
            instance_count: 0,
        }
    }

    /// Appends one instance's vertices. Returns true when the buffer has
    /// reached capacity and must be flushed before the next push.
    pub fn push(&mut self, vertices: &[V]) -> bool {
        debug_assert_eq!(vertices.len(), self.vertices_per_instance);
        debug_assert!(self.instance_count < self.instances_per_batch);
        self.staging.extend_from_slice(vertices);
        self.instance_count += 1;
        self.instance_count == self.instances_per_batch
    }

    pub fn instance_count(&self) -> u32 {
        self.instance_count
    }

    pub fn instances_per_batch(&self) -> u32 {
        self.instances_per_batch
    }

    pub fn is_empty(&self) -> bool {
        self.instance_count == 0
    }

    pub fn is_full(&self) -> bool {
        self.instance_count == self.instances_per_batch
    }

    /// Room left, in instances.
    pub fn remaining(&self) -> u32 {
        self.instances_per_batch - self.instance_count
    }

    /// The staged vertex data, ready for upload.
    pub fn bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.staging)
    }

    pub fn vertices(&self) -> &[V] {
        &self.staging
    }

    /// Resets the fill level after a flush. The backing allocation is kept.
    pub fn clear(&mut self) {
        self.staging.clear();
        self.instance_count = 0;
    }
}

/// Builds the element index buffer for `instances` quads drawn as one
/// triangle strip.
///
/// Quad `i` occupies vertices `4i..4i+4` and contributes the six indices
/// `[4i, 4i, 4i+1, 4i+2, 4i+3, 4i+3]`. The doubled first and last index per
/// quad produce zero-area triangles that stitch unrelated quads into a
/// single strip draw without visible artifacts.
///
/// Indices are u16, so `instances * 4` must stay within u16 range; quad
/// batchers draw with a base-vertex offset, keeping indices relative to the
/// start of the flushed range.
pub fn strip_quad_indices(instances: u32) -> Vec<u16> {
    debug_assert!(instances * 4 <= u16::MAX as u32 + 1);
    let mut indices = Vec::with_capacity(instances as usize * 6);
    for i in 0..instances {
        let base = (i * 4) as u16;
        indices.extend_from_slice(&[base, base, base + 1, base + 2, base + 3, base + 3]);
    }
    indices
}

/// Owns the concrete batch handlers and dispatches flushes by id.
pub struct BatcherSet {
    pub quad: QuadBatcher,
    pub tile_sprite: TileSpriteBatcher,
    pub light: LightBatcher,
    pub strip: StripBatcher,
}

impl BatcherSet {
    /// Resets per-frame upload cursors. Called once at the top of each frame.
    pub fn begin_frame(&mut self) {
        self.quad.begin_frame();
        self.tile_sprite.begin_frame();
        self.light.begin_frame();
        self.strip.begin_frame();
    }

    /// Flushes the identified batcher: uploads its staged instances and
    /// issues the draw call into `pass` under `view`'s uniforms. No-op if
    /// the batcher has nothing pending.
    pub fn flush(
        &mut self,
        id: BatcherId,
        gpu: &GpuContext,
        pass: &mut wgpu::RenderPass<'static>,
        view: &wgpu::BindGroup,
    ) {
        match id {
            BatcherId::Quad => self.quad.flush(gpu, pass, view),
            BatcherId::TileSprite => self.tile_sprite.flush(gpu, pass, view),
            BatcherId::Light => self.light.flush(gpu, pass, view),
            BatcherId::Strip => self.strip.flush(gpu, pass, view),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Mat4;

    fn context(id: u32) -> DrawingContext {
        DrawingContext::for_test(id, Mat4::IDENTITY)
    }

    fn entry(batcher: BatcherId, ctx_id: u32) -> CurrentBatch {
        CurrentBatch {
            batcher,
            context: context(ctx_id),
        }
    }

    #[test]
    fn instance_count_tracks_pushes_exactly() {
        let mut buffer: InstanceBuffer<u32> = InstanceBuffer::new(8, 4);
        for n in 1..=5 {
            let full = buffer.push(&[0, 1, 2, 3]);
            assert!(!full);
            assert_eq!(buffer.instance_count(), n);
        }
        assert_eq!(buffer.vertices().len(), 20);
    }

    #[test]
    fn push_reports_full_exactly_at_capacity() {
        let mut buffer: InstanceBuffer<u32> = InstanceBuffer::new(3, 4);
        assert!(!buffer.push(&[0; 4]));
        assert!(!buffer.push(&[0; 4]));
        assert!(buffer.push(&[0; 4]));
        assert!(buffer.is_full());

        buffer.clear();
        assert_eq!(buffer.instance_count(), 0);
        assert!(buffer.is_empty());
        assert!(!buffer.push(&[0; 4]));
    }

    #[test]
    fn switch_to_same_batch_does_not_evict() {
        let mut state = BatchState::new();
        assert!(state.switch(Some(entry(BatcherId::Quad, 1))).is_none());
        assert!(state.switch(Some(entry(BatcherId::Quad, 1))).is_none());
        assert_eq!(state.current().unwrap().batcher, BatcherId::Quad);
    }

    #[test]
    fn switch_to_different_batcher_evicts_previous_once() {
        let mut state = BatchState::new();
        state.switch(Some(entry(BatcherId::Quad, 1)));

        let evicted = state.switch(Some(entry(BatcherId::Light, 1)));
        assert_eq!(evicted.unwrap().batcher, BatcherId::Quad);

        // The quad batcher is no longer pending anywhere.
        let evicted = state.switch(Some(entry(BatcherId::Light, 1)));
        assert!(evicted.is_none());
    }

    #[test]
    fn switch_on_context_change_evicts_same_batcher() {
        let mut state = BatchState::new();
        state.switch(Some(entry(BatcherId::Quad, 1)));

        let evicted = state.switch(Some(entry(BatcherId::Quad, 2)));
        assert_eq!(evicted.unwrap().context.id(), 1);
    }

    #[test]
    fn clearing_the_slot_returns_pending_batch() {
        let mut state = BatchState::new();
        assert!(state.switch(None).is_none());

        state.switch(Some(entry(BatcherId::Strip, 1)));
        let evicted = state.switch(None);
        assert_eq!(evicted.unwrap().batcher, BatcherId::Strip);
        assert!(state.current().is_none());
    }

    #[test]
    fn compatible_submissions_merge_into_one_flush() {
        // Three same-type, same-context sprites: nothing evicts until the
        // external flush trigger, which sees all three instances pending.
        let mut state = BatchState::new();
        let mut quad: InstanceBuffer<u32> = InstanceBuffer::new(16, 4);

        for _ in 0..3 {
            assert!(state.switch(Some(entry(BatcherId::Quad, 1))).is_none());
            quad.push(&[0; 4]);
        }

        let evicted = state.switch(None).unwrap();
        assert_eq!(evicted.batcher, BatcherId::Quad);
        assert_eq!(quad.instance_count(), 3);
    }

    #[test]
    fn interleaved_submissions_split_into_ordered_flushes() {
        // Three compatible sprites, then an incompatible object between
        // them, mirror the painter's-algorithm walk: A A B A yields a flush
        // of 2, then a flush of 1, in original order.
        let mut state = BatchState::new();
        let mut quad: InstanceBuffer<u32> = InstanceBuffer::new(16, 4);
        let mut flushes: Vec<(BatcherId, u32)> = Vec::new();

        let submit = |state: &mut BatchState,
                          quad_fill: &mut InstanceBuffer<u32>,
                          flushes: &mut Vec<(BatcherId, u32)>,
                          id: BatcherId| {
            if let Some(prev) = state.switch(Some(entry(id, 1))) {
                if prev.batcher == BatcherId::Quad {
                    flushes.push((prev.batcher, quad_fill.instance_count()));
                    quad_fill.clear();
                } else {
                    flushes.push((prev.batcher, 1));
                }
            }
            if id == BatcherId::Quad {
                quad_fill.push(&[0; 4]);
            }
        };

        submit(&mut state, &mut quad, &mut flushes, BatcherId::Quad);
        submit(&mut state, &mut quad, &mut flushes, BatcherId::Quad);
        submit(&mut state, &mut quad, &mut flushes, BatcherId::Light);
        submit(&mut state, &mut quad, &mut flushes, BatcherId::Quad);

        if let Some(prev) = state.switch(None) {
            flushes.push((prev.batcher, quad.instance_count()));
            quad.clear();
        }

        assert_eq!(
            flushes,
            vec![
                (BatcherId::Quad, 2),
                (BatcherId::Light, 1),
                (BatcherId::Quad, 1),
            ]
        );
    }

    #[test]
    fn strip_quad_indices_follow_degenerate_pattern() {
        let indices = strip_quad_indices(3);
        assert_eq!(indices.len(), 18);
        for i in 0u16..3 {
            let base = i * 4;
            assert_eq!(
                &indices[i as usize * 6..i as usize * 6 + 6],
                &[base, base, base + 1, base + 2, base + 3, base + 3]
            );
        }
    }

    #[test]
    fn strip_quad_indices_empty_for_zero_instances() {
        assert!(strip_quad_indices(0).is_empty());
    }
}
