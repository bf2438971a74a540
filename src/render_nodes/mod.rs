//! The batched rendering pipeline: cooperating render nodes that turn draw
//! requests into minimal GPU draw calls.
//!
//! # Architecture
//!
//! One frame flows through a strict call tree:
//!
//! ```text
//! ┌────────────────┐   ┌────────────┐   ┌──────────────┐   ┌─────────────┐
//! │ RenderNode     │──▶│ CameraNode │──▶│ ListComposi- │──▶│ Submitter   │
//! │ Manager        │   │ (context,  │   │ tor (ordered │   │ (stages →   │
//! │ (frame driver) │   │ background)│   │ object walk) │   │ batch call) │
//! └────────────────┘   └────────────┘   └──────────────┘   └──────┬──────┘
//!                                                                 ▼
//!                                       ┌─────────────────────────────────┐
//!                                       │ BatchHandler (accumulate until  │
//!                                       │ full / interrupted, then flush  │
//!                                       │ as ONE instanced draw call)     │
//!                                       └─────────────────────────────────┘
//! ```
//!
//! Consecutive submissions that land in the same batch handler under the
//! same drawing context merge into one draw call. Everything else (a
//! different handler, a different context, a blend-mode change, texture
//! slots running out, buffer capacity, an explicit stand-alone render, the
//! end of a camera pass) flushes the pending batch first, so GPU draw
//! order always matches compositing order.
//!
//! # Node roles
//!
//! - [`Submitter`] nodes compose final vertex data for one object type.
//! - [`Texturer`] / [`Transformer`] / [`Tinter`] stages decompose "compute
//!   what to draw" into independently swappable pieces.
//! - [`Compositor`] nodes walk draw-ordered object lists.
//! - [`CameraRenderer`] nodes establish per-camera drawing contexts.
//! - Batch handlers ([`QuadBatcher`], [`TileSpriteBatcher`],
//!   [`LightBatcher`], [`StripBatcher`]) own vertex buffers and issue the
//!   actual draw calls.
//!
//! All of them register by name in the manager's [`NodeRegistry`]; objects
//! resolve their role set once at construction via
//! [`RenderNodeManager::resolve_node_set`].

mod batch;
mod camera_node;
mod compositor;
mod context;
mod debug;
mod light_batch;
mod manager;
mod object;
mod quad_batch;
mod registry;
mod stages;
mod strip_batch;
mod submitter;
mod tile_batch;

pub use batch::{BatchState, BatcherId, BatcherSet, CurrentBatch, InstanceBuffer, strip_quad_indices};
pub use camera_node::{CameraNode, CameraRenderer};
pub use compositor::{Compositor, ListCompositor};
pub use context::{DrawingContext, RenderContext, ViewUniforms};
pub use debug::CallGraph;
pub use light_batch::{LightBatcher, LightSubmission, LightVertex};
pub use manager::{
    CameraRequest, DefaultNodes, PipelineConfig, RenderEvents, RenderNodeManager,
};
pub use object::{
    BlendMode, NodeOverrides, NodeSet, ObjectKind, Payload, RenderObject, RenderOptions, TileQuad,
};
pub use quad_batch::{MAX_TEXTURE_SLOTS, QuadBatcher, QuadSubmission, QuadVertex};
pub use registry::{Node, NodeCtor, NodeError, NodeRegistry};
pub use stages::{
    FrameTexturer, ObjectTinter, QuadCorners, Stage, TextureLookup, TileSpriteTexturer,
    TilesetTexturer, TintSet, Tinter, Transformer, Texturer, WorldTransformer,
};
pub use strip_batch::{StripBatcher, StripVertex};
pub use submitter::{
    LightSubmitter, QuadSubmitter, ShapeSubmitter, Submitter, TileSpriteSubmitter,
    TilemapSubmitter, line_quad,
};
pub use tile_batch::{TileSpriteBatcher, TileSpriteSubmission, TileVertex};
