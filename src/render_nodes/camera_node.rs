//! The camera render node.
//!
//! One invocation renders one camera: bind a drawing context (cloning it
//! with a scissor box when the camera has a custom viewport), draw the
//! background fill, composite the camera's object list, flush, run the
//! post-effect hook, restore the parent context, and notify post-render
//! listeners.

use std::rc::Rc;

use glam::{Affine2, Vec2};

use crate::camera::Camera2d;
use crate::texture::{Frame, Texture};

use super::compositor::Compositor;
use super::context::RenderContext;
use super::object::{RenderObject, RenderOptions};
use super::quad_batch::QuadSubmission;

/// A node that establishes per-camera drawing state and delegates
/// compositing.
pub trait CameraRenderer {
    fn name(&self) -> &str;
    fn run(&self, ctx: &mut RenderContext<'_>, camera: &Camera2d, objects: &[RenderObject]);
}

pub struct CameraNode {
    compositor: Rc<dyn Compositor>,
    white: Rc<Texture>,
}

impl CameraNode {
    pub fn new(compositor: Rc<dyn Compositor>, white: Rc<Texture>) -> Self {
        Self { compositor, white }
    }

    /// Draws the camera background as one quad through the quad batcher.
    /// Skipped entirely when the effective alpha is zero.
    fn fill_background(&self, ctx: &mut RenderContext<'_>, camera: &Camera2d) {
        let camera_alpha = ctx.current_context().camera_alpha;
        let alpha = camera.background.a * camera_alpha;
        if alpha <= 0.0 {
            return;
        }

        // The background covers the viewport in screen space; map its
        // corners back through the camera view so the projection lands
        // them exactly on the viewport bounds.
        let (w, h) = (camera.viewport.w, camera.viewport.h);
        let center = Vec2::new(w * 0.5, h * 0.5);
        let view = Affine2::from_translation(center)
            * Affine2::from_scale(Vec2::splat(camera.zoom))
            * Affine2::from_translation(-center - camera.scroll);
        let inverse = view.inverse();
        let quad = [
            inverse.transform_point2(Vec2::new(0.0, 0.0)),
            inverse.transform_point2(Vec2::new(0.0, h)),
            inverse.transform_point2(Vec2::new(w, 0.0)),
            inverse.transform_point2(Vec2::new(w, h)),
        ];

        let tint = camera.background.to_abgr_with_alpha(camera_alpha);
        ctx.batch_quad(&QuadSubmission {
            texture: &self.white,
            quad,
            uv_source: Frame::new(0.0, 0.0, 1.0, 1.0),
            uvs: [
                Vec2::new(0.0, 0.0),
                Vec2::new(0.0, 1.0),
                Vec2::new(1.0, 0.0),
                Vec2::new(1.0, 1.0),
            ],
            tint_fill: true,
            tints: [tint; 4],
            options: RenderOptions::default(),
        });
    }

    /// Post-effect hook. Flash/fade camera effects attach here.
    fn post_effects(&self, _ctx: &mut RenderContext<'_>, _camera: &Camera2d) {}
}

impl CameraRenderer for CameraNode {
    fn name(&self) -> &str {
        "Camera"
    }

    fn run(&self, ctx: &mut RenderContext<'_>, camera: &Camera2d, objects: &[RenderObject]) {
        ctx.scoped(self.name(), |ctx| {
            let id = ctx.alloc_context_id();
            let context = ctx.current_context().for_camera(id, camera);
            ctx.bind_context(context);

            self.fill_background(ctx, camera);
            self.compositor.run(ctx, objects);

            // End of the camera pass is a hard flush boundary: nothing
            // submitted under this context may merge with what follows.
            ctx.interrupt_batch();
            self.post_effects(ctx, camera);

            ctx.unbind_context();
        });
        ctx.events.emit_camera_rendered(camera);
    }
}
