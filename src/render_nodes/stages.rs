//! Texture-lookup, geometry-transform, and color-tint stages.
//!
//! These are the single-responsibility pieces of "compute what to draw",
//! each independently replaceable per object: a [`Texturer`] resolves which
//! texture region a draw samples, a [`Transformer`] produces the four
//! transformed corner positions, a [`Tinter`] produces per-corner colors.
//! Submitters consume stage results through the [`Stage`] sum type, which
//! lets a result computed once (a tilemap layer's texture lookup, a shared
//! tint) be reused across many submissions in the same frame without
//! re-running the node.

use std::rc::Rc;

use glam::{Affine2, Vec2};

use crate::texture::{Frame, Texture};

use super::object::RenderObject;

/// A resolved texture lookup: which texture to sample and where.
#[derive(Clone)]
pub struct TextureLookup {
    pub texture: Rc<Texture>,
    /// The region the draw samples, in pixels.
    pub frame: Frame,
    /// The region UVs are derived from. Usually equal to `frame`;
    /// wrap-capable handlers treat it as the repeat cell.
    pub uv_source: Frame,
}

impl TextureLookup {
    /// Corner UVs for `frame`, in top-left, bottom-left, top-right,
    /// bottom-right order.
    pub fn corner_uvs(&self) -> [Vec2; 4] {
        self.frame
            .corner_uvs(self.texture.width as f32, self.texture.height as f32)
    }
}

/// Four transformed corner positions in top-left, bottom-left, top-right,
/// bottom-right order. The order is a contract shared with every submitter
/// and batch handler.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct QuadCorners(pub [Vec2; 4]);

/// Per-corner packed tints plus the fill-vs-multiply flag.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TintSet {
    pub fill: bool,
    pub top_left: u32,
    pub bottom_left: u32,
    pub top_right: u32,
    pub bottom_right: u32,
}

impl TintSet {
    /// The default tint when an object supplies no tinter: full white,
    /// attenuated only by camera alpha.
    pub fn white(camera_alpha: f32) -> Self {
        let tint = crate::color::Color::WHITE.to_abgr_with_alpha(camera_alpha);
        Self {
            fill: false,
            top_left: tint,
            bottom_left: tint,
            top_right: tint,
            bottom_right: tint,
        }
    }

    /// Corner array in the shared top-left, bottom-left, top-right,
    /// bottom-right order.
    pub fn corners(&self) -> [u32; 4] {
        [
            self.top_left,
            self.bottom_left,
            self.top_right,
            self.bottom_right,
        ]
    }
}

/// A stage input: either a result computed earlier this frame, or a node to
/// run now.
///
/// Callers pattern-match instead of probing for capabilities, so "reuse one
/// texture lookup for many tiles" and "run the object's texturer" go through
/// the same submission path.
pub enum Stage<'a, T, N: ?Sized> {
    Computed(&'a T),
    Node(&'a N),
}

/// Resolves which texture and UV rectangle a draw samples.
pub trait Texturer {
    fn name(&self) -> &str;
    /// `None` when the object has nothing to sample (no texture assigned).
    fn lookup(&self, object: &RenderObject) -> Option<TextureLookup>;
}

/// Produces the four transformed corner positions for a draw.
pub trait Transformer {
    fn name(&self) -> &str;
    fn corners(&self, object: &RenderObject, parent: Option<&Affine2>) -> QuadCorners;
}

/// Produces per-corner tint colors and the fill-vs-multiply mode.
pub trait Tinter {
    fn name(&self) -> &str;
    fn tint(&self, object: &RenderObject, camera_alpha: f32) -> TintSet;
}

/// Standard texturer: samples the object's assigned frame.
pub struct FrameTexturer;

impl Texturer for FrameTexturer {
    fn name(&self) -> &str {
        "FrameTexturer"
    }

    fn lookup(&self, object: &RenderObject) -> Option<TextureLookup> {
        let texture = object.texture.clone()?;
        Some(TextureLookup {
            texture,
            frame: object.frame,
            uv_source: object.frame,
        })
    }
}

/// Tile-sprite texturer: the object's frame is the repeat cell the quad
/// wraps, not the sampled region.
pub struct TileSpriteTexturer;

impl Texturer for TileSpriteTexturer {
    fn name(&self) -> &str {
        "TileSpriteTexturer"
    }

    fn lookup(&self, object: &RenderObject) -> Option<TextureLookup> {
        let texture = object.texture.clone()?;
        let full = Frame::full(&texture);
        Some(TextureLookup {
            texture,
            frame: full,
            uv_source: object.frame,
        })
    }
}

/// Tilemap texturer: one lookup of the whole tileset, shared by every tile
/// in the layer. Per-tile source frames come from the layer's tile data.
pub struct TilesetTexturer;

impl Texturer for TilesetTexturer {
    fn name(&self) -> &str {
        "TilesetTexturer"
    }

    fn lookup(&self, object: &RenderObject) -> Option<TextureLookup> {
        let texture = object.texture.clone()?;
        let full = Frame::full(&texture);
        Some(TextureLookup {
            texture,
            frame: full,
            uv_source: full,
        })
    }
}

/// Standard transformer: applies the object's world transform (and optional
/// parent transform) to its origin-anchored size rect.
pub struct WorldTransformer;

impl WorldTransformer {
    /// Transforms an arbitrary local-space rect, used for sub-element
    /// geometry such as individual tiles.
    pub fn rect_corners(
        object: &RenderObject,
        parent: Option<&Affine2>,
        top_left: Vec2,
        size: Vec2,
    ) -> QuadCorners {
        let transform = match parent {
            Some(parent) => *parent * object.transform,
            None => object.transform,
        };
        let (tl, br) = (top_left, top_left + size);
        let mut corners = [
            transform.transform_point2(tl),
            transform.transform_point2(Vec2::new(tl.x, br.y)),
            transform.transform_point2(Vec2::new(br.x, tl.y)),
            transform.transform_point2(br),
        ];
        if object.options.round_pixels {
            for corner in &mut corners {
                *corner = corner.round();
            }
        }
        QuadCorners(corners)
    }
}

impl Transformer for WorldTransformer {
    fn name(&self) -> &str {
        "WorldTransformer"
    }

    fn corners(&self, object: &RenderObject, parent: Option<&Affine2>) -> QuadCorners {
        let top_left = -object.origin * object.size;
        Self::rect_corners(object, parent, top_left, object.size)
    }
}

/// Standard tinter: packs the object's corner tints with object and camera
/// alpha folded into the alpha channel.
pub struct ObjectTinter;

impl Tinter for ObjectTinter {
    fn name(&self) -> &str {
        "ObjectTinter"
    }

    fn tint(&self, object: &RenderObject, camera_alpha: f32) -> TintSet {
        let alpha = object.alpha * camera_alpha;
        let [tl, bl, tr, br] = object.tints;
        TintSet {
            fill: object.tint_fill,
            top_left: tl.to_abgr_with_alpha(alpha),
            bottom_left: bl.to_abgr_with_alpha(alpha),
            top_right: tr.to_abgr_with_alpha(alpha),
            bottom_right: br.to_abgr_with_alpha(alpha),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::Color;
    use crate::render_nodes::object::{NodeSet, Payload, RenderOptions};
    use crate::render_nodes::submitter::QuadSubmitter;

    fn test_object() -> RenderObject {
        RenderObject {
            texture: None,
            frame: Frame::new(0.0, 0.0, 4.0, 4.0),
            size: Vec2::new(4.0, 2.0),
            origin: Vec2::ZERO,
            transform: Affine2::IDENTITY,
            tints: [Color::WHITE; 4],
            tint_fill: false,
            alpha: 1.0,
            options: RenderOptions::default(),
            payload: Payload::Sprite,
            nodes: NodeSet {
                submitter: Rc::new(QuadSubmitter::new()),
                texturer: None,
                transformer: None,
                tinter: None,
            },
        }
    }

    #[test]
    fn world_transformer_emits_corners_in_contract_order() {
        let object = test_object();
        let QuadCorners(corners) = WorldTransformer.corners(&object, None);
        assert_eq!(corners[0], Vec2::new(0.0, 0.0)); // top-left
        assert_eq!(corners[1], Vec2::new(0.0, 2.0)); // bottom-left
        assert_eq!(corners[2], Vec2::new(4.0, 0.0)); // top-right
        assert_eq!(corners[3], Vec2::new(4.0, 2.0)); // bottom-right
    }

    #[test]
    fn origin_anchors_the_quad() {
        let mut object = test_object();
        object.origin = Vec2::new(0.5, 0.5);
        let QuadCorners(corners) = WorldTransformer.corners(&object, None);
        assert_eq!(corners[0], Vec2::new(-2.0, -1.0));
        assert_eq!(corners[3], Vec2::new(2.0, 1.0));
    }

    #[test]
    fn parent_transform_composes_before_object_transform() {
        let mut object = test_object();
        object.transform = Affine2::from_translation(Vec2::new(1.0, 0.0));
        let parent = Affine2::from_scale(Vec2::splat(2.0));
        let QuadCorners(corners) = WorldTransformer.corners(&object, Some(&parent));
        // Object translation happens in parent space, so it scales too.
        assert_eq!(corners[0], Vec2::new(2.0, 0.0));
        assert_eq!(corners[3], Vec2::new(10.0, 4.0));
    }

    #[test]
    fn round_pixels_snaps_corners() {
        let mut object = test_object();
        object.transform = Affine2::from_translation(Vec2::new(0.4, 0.6));
        object.options.round_pixels = true;
        let QuadCorners(corners) = WorldTransformer.corners(&object, None);
        assert_eq!(corners[0], Vec2::new(0.0, 1.0));
    }

    #[test]
    fn default_tint_is_white_attenuated_by_camera_alpha() {
        let tint = TintSet::white(0.5);
        assert!(!tint.fill);
        assert_eq!(tint.top_left & 0x00FF_FFFF, 0x00FF_FFFF);
        assert_eq!(tint.top_left >> 24, 127);
        assert_eq!(tint.corners(), [tint.top_left; 4]);
    }

    #[test]
    fn object_tinter_folds_object_and_camera_alpha() {
        let mut object = test_object();
        object.alpha = 0.5;
        let tint = ObjectTinter.tint(&object, 0.5);
        assert_eq!(tint.top_left >> 24, 63);
    }
}
