//! # Phalanx
//!
//! **A batched 2D rendering pipeline for wgpu game backends.**
//!
//! Phalanx turns scene draw requests (sprites, tilemaps, lights, shapes)
//! into as few GPU draw calls as the frame allows, without ever breaking
//! visual correctness: draw order, blend modes, texture binding limits and
//! shader differences all force a flush exactly when they must, and never
//! sooner.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use phalanx::*;
//!
//! # fn demo(window: Arc<winit::window::Window>) {
//! let gpu = GpuContext::new(window);
//! let mut manager = RenderNodeManager::new(&gpu, PipelineConfig::default());
//!
//! // Load a texture and build a draw request for it.
//! let hero = std::rc::Rc::new(Texture::from_file(&gpu, "hero.png").unwrap());
//! let nodes = manager
//!     .resolve_node_set(ObjectKind::Sprite, None)
//!     .expect("standard sprite nodes");
//! let frame = Frame::full(&hero);
//! let sprite = RenderObject::sprite(hero, frame, nodes);
//!
//! let camera = Camera2d::new(gpu.width() as f32, gpu.height() as f32)
//!     .with_background(Color::rgb(0.1, 0.1, 0.15));
//!
//! // Each frame:
//! let objects = [sprite];
//! manager.render_frame(
//!     &gpu,
//!     &[CameraRequest {
//!         camera: &camera,
//!         objects: &objects,
//!         camera_node: None,
//!     }],
//! );
//! # }
//! ```
//!
//! ## How batching works
//!
//! Every object's submitter forwards vertex data to a batch handler, which
//! accumulates instances in a shared vertex buffer. At most one handler is
//! mid-accumulation at any time; the manager's batch state machine flushes
//! it the moment anything incompatible comes along. Three same-texture
//! sprites in a row cost one draw call; interleave something incompatible
//! and you get exactly the flushes the draw order requires, in order.
//!
//! ## Diagnostics
//!
//! Call [`RenderNodeManager::capture_next_frame`] to record one frame's
//! node call graph, then [`RenderNodeManager::debug_dump`] for an indented
//! tree of what actually ran.

mod camera;
mod color;
mod gpu;
mod render_nodes;
mod texture;

pub use camera::{Camera2d, Rect};
pub use color::Color;
pub use gpu::GpuContext;
pub use render_nodes::{
    BatchState, BatcherId, BatcherSet, BlendMode, CallGraph, CameraNode, CameraRenderer,
    CameraRequest, Compositor, CurrentBatch, DefaultNodes, DrawingContext, FrameTexturer,
    InstanceBuffer, LightBatcher, LightSubmission, LightSubmitter, LightVertex, ListCompositor,
    MAX_TEXTURE_SLOTS, Node, NodeCtor, NodeError, NodeOverrides, NodeRegistry, NodeSet,
    ObjectKind, ObjectTinter, Payload, PipelineConfig, QuadBatcher, QuadCorners, QuadSubmission,
    QuadSubmitter, QuadVertex, RenderContext, RenderEvents, RenderNodeManager, RenderObject,
    RenderOptions, ShapeSubmitter, Stage, StripBatcher, StripVertex, Submitter, TextureLookup,
    TileQuad, TileSpriteBatcher, TileSpriteSubmission, TileSpriteSubmitter, TileSpriteTexturer,
    TileVertex, TilemapSubmitter, TilesetTexturer, TintSet, Tinter, Transformer, Texturer,
    ViewUniforms, WorldTransformer, line_quad, strip_quad_indices,
};
pub use texture::{Frame, Texture};

// Re-export glam math types for convenience
pub use glam::{Affine2, Mat4, Vec2};
