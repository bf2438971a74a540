//! Object-list compositing.

use super::context::RenderContext;
use super::object::RenderObject;

/// A node that walks an ordered list of renderables for one camera,
/// dispatching each to its node chain.
pub trait Compositor {
    fn name(&self) -> &str;
    fn run(&self, ctx: &mut RenderContext<'_>, objects: &[RenderObject]);
}

/// The standard compositor: painter's algorithm over the given slice.
///
/// Order is significant and preserved exactly as given; later entries draw
/// on top, and the compositor never reorders for batching efficiency.
/// Consecutive objects that resolve to the same batch handler merge into
/// one draw call on their own, because nothing in between interrupts the
/// current batch.
pub struct ListCompositor;

impl Compositor for ListCompositor {
    fn name(&self) -> &str {
        "ListCompositor"
    }

    fn run(&self, ctx: &mut RenderContext<'_>, objects: &[RenderObject]) {
        ctx.scoped(self.name(), |ctx| {
            for object in objects {
                if object.alpha <= 0.0 {
                    continue;
                }
                object.nodes.submitter.submit(ctx, object);
            }
        })
    }
}
