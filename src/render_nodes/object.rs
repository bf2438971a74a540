//! Draw-request data consumed by the pipeline.
//!
//! A [`RenderObject`] is not a scene-graph node; it is the flattened draw
//! request the compositor walks, carrying everything the pipeline stages
//! need: texture/frame, transform, tints, blend options, a kind-specific
//! payload, and the object's resolved [`NodeSet`].

use std::rc::Rc;

use glam::{Affine2, Vec2};

use crate::color::Color;
use crate::texture::{Frame, Texture};

use super::stages::{Texturer, Tinter, Transformer};
use super::submitter::Submitter;

/// How a batch's pixels combine with the target.
///
/// Blend mode participates in batch-break decisions: a submission whose
/// blend differs from the pending batch forces a flush, because the two
/// cannot share one draw call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BlendMode {
    #[default]
    Normal,
    Additive,
}

impl BlendMode {
    pub const COUNT: usize = 2;

    /// Index into per-blend pipeline arrays.
    pub fn index(self) -> usize {
        match self {
            BlendMode::Normal => 0,
            BlendMode::Additive => 1,
        }
    }

    /// The wgpu blend state for this mode, premultiplied-alpha style.
    pub fn state(self) -> wgpu::BlendState {
        match self {
            BlendMode::Normal => wgpu::BlendState {
                color: wgpu::BlendComponent {
                    src_factor: wgpu::BlendFactor::SrcAlpha,
                    dst_factor: wgpu::BlendFactor::OneMinusSrcAlpha,
                    operation: wgpu::BlendOperation::Add,
                },
                alpha: wgpu::BlendComponent {
                    src_factor: wgpu::BlendFactor::One,
                    dst_factor: wgpu::BlendFactor::OneMinusSrcAlpha,
                    operation: wgpu::BlendOperation::Add,
                },
            },
            BlendMode::Additive => wgpu::BlendState {
                color: wgpu::BlendComponent {
                    src_factor: wgpu::BlendFactor::SrcAlpha,
                    dst_factor: wgpu::BlendFactor::One,
                    operation: wgpu::BlendOperation::Add,
                },
                alpha: wgpu::BlendComponent {
                    src_factor: wgpu::BlendFactor::One,
                    dst_factor: wgpu::BlendFactor::One,
                    operation: wgpu::BlendOperation::Add,
                },
            },
        }
    }
}

/// Per-submission rendering options.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RenderOptions {
    pub blend: BlendMode,
    /// Snap transformed corners to whole pixels. Useful for crisp pixel art.
    pub round_pixels: bool,
}

/// Object-type granularity at which the manager stores default node sets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Sprite,
    TileSprite,
    Tilemap,
    Light,
    Shape,
}

/// One tile's placement within a tilemap layer: a destination offset in the
/// layer's local space and a source frame in the tileset texture.
#[derive(Clone, Copy, Debug)]
pub struct TileQuad {
    pub dst: Vec2,
    pub src: Frame,
}

/// Kind-specific draw data.
#[derive(Clone, Debug)]
pub enum Payload {
    Sprite,
    /// A quad whose texture repeats; `scroll` offsets and `tile_scale`
    /// scales the repetition, both in texture-frame units.
    TileSprite { scroll: Vec2, tile_scale: Vec2 },
    /// A tilemap layer: many tiles sharing one texture lookup.
    Tiles(Vec<TileQuad>),
    Light { radius: f32, intensity: f32 },
    /// A solid rectangle covering the object's size.
    FillRect,
    /// A line segment drawn as an oriented quad, in local space.
    Line { from: Vec2, to: Vec2, width: f32 },
    /// A solid triangle, in local space.
    Triangle { points: [Vec2; 3] },
}

impl Payload {
    pub fn kind(&self) -> ObjectKind {
        match self {
            Payload::Sprite => ObjectKind::Sprite,
            Payload::TileSprite { .. } => ObjectKind::TileSprite,
            Payload::Tiles(_) => ObjectKind::Tilemap,
            Payload::Light { .. } => ObjectKind::Light,
            Payload::FillRect | Payload::Line { .. } | Payload::Triangle { .. } => {
                ObjectKind::Shape
            }
        }
    }
}

/// An object's pipeline stages, resolved once at object construction.
///
/// Role lookup by name happens when the object is built (via
/// `RenderNodeManager::resolve_node_set`), never per frame. Roles an object
/// kind does not use are `None`.
#[derive(Clone)]
pub struct NodeSet {
    pub submitter: Rc<dyn Submitter>,
    pub texturer: Option<Rc<dyn Texturer>>,
    pub transformer: Option<Rc<dyn Transformer>>,
    pub tinter: Option<Rc<dyn Tinter>>,
}

/// Per-object role overrides, by node name.
///
/// Any renderable may carry one of these; roles left `None` fall back to
/// the manager's default node set for the object's kind.
#[derive(Clone, Debug, Default)]
pub struct NodeOverrides {
    pub submitter: Option<String>,
    pub texturer: Option<String>,
    pub transformer: Option<String>,
    pub tinter: Option<String>,
}

/// One renderable draw request.
pub struct RenderObject {
    pub texture: Option<Rc<Texture>>,
    pub frame: Frame,
    /// Untransformed size in pixels.
    pub size: Vec2,
    /// Normalized pivot within the size rect; `(0.5, 0.5)` is centered.
    pub origin: Vec2,
    pub transform: Affine2,
    /// Corner tints in top-left, bottom-left, top-right, bottom-right order.
    pub tints: [Color; 4],
    /// Replace texture color with the tint instead of multiplying.
    pub tint_fill: bool,
    pub alpha: f32,
    pub options: RenderOptions,
    pub payload: Payload,
    pub nodes: NodeSet,
}

impl RenderObject {
    /// A sprite covering `frame` at its natural size.
    pub fn sprite(texture: Rc<Texture>, frame: Frame, nodes: NodeSet) -> Self {
        let size = Vec2::new(frame.w, frame.h);
        Self {
            texture: Some(texture),
            frame,
            size,
            origin: Vec2::new(0.5, 0.5),
            transform: Affine2::IDENTITY,
            tints: [Color::WHITE; 4],
            tint_fill: false,
            alpha: 1.0,
            options: RenderOptions::default(),
            payload: Payload::Sprite,
            nodes,
        }
    }

    pub fn with_transform(mut self, transform: Affine2) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_tint(mut self, tint: Color) -> Self {
        self.tints = [tint; 4];
        self
    }

    pub fn with_payload(mut self, payload: Payload) -> Self {
        self.payload = payload;
        self
    }

    pub fn kind(&self) -> ObjectKind {
        self.payload.kind()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_kinds_cover_shape_variants() {
        assert_eq!(Payload::FillRect.kind(), ObjectKind::Shape);
        assert_eq!(
            Payload::Line {
                from: Vec2::ZERO,
                to: Vec2::ONE,
                width: 1.0
            }
            .kind(),
            ObjectKind::Shape
        );
        assert_eq!(
            Payload::Triangle {
                points: [Vec2::ZERO, Vec2::X, Vec2::Y]
            }
            .kind(),
            ObjectKind::Shape
        );
    }

    #[test]
    fn blend_indices_are_dense() {
        assert_eq!(BlendMode::Normal.index(), 0);
        assert_eq!(BlendMode::Additive.index(), 1);
        assert!(BlendMode::Additive.index() < BlendMode::COUNT);
    }
}
