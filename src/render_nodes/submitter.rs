//! Submitter nodes: per-object-type vertex composers.
//!
//! A submitter takes one render object (or a sub-element of it, such as a
//! single tile), gathers its stage results, computes final corner
//! positions, UVs and tints, and forwards one submission to the right batch
//! handler. Stage inputs arrive through [`Stage`], so results computed once
//! can be shared across many submissions: the tilemap submitter resolves
//! its texture lookup and tint a single time and reuses them for every
//! tile.

use std::rc::Rc;

use glam::Vec2;

use crate::texture::{Frame, Texture};

use super::context::RenderContext;
use super::light_batch::LightSubmission;
use super::object::{Payload, RenderObject};
use super::quad_batch::QuadSubmission;
use super::stages::{
    QuadCorners, Stage, TextureLookup, TintSet, Tinter, Transformer, Texturer, WorldTransformer,
};
use super::strip_batch::StripVertex;
use super::tile_batch::TileSpriteSubmission;

/// A node that converts one render object into batch submissions.
pub trait Submitter {
    fn name(&self) -> &str;
    fn submit(&self, ctx: &mut RenderContext<'_>, object: &RenderObject);
}

/// The standard quad submitter: one textured quad per object.
pub struct QuadSubmitter;

impl QuadSubmitter {
    pub fn new() -> Self {
        Self
    }

    /// Submits one quad from explicit stage inputs.
    ///
    /// Callers that have already computed a stage result this frame pass
    /// `Stage::Computed`; otherwise `Stage::Node` runs the stage here. With
    /// no tinter at all, the quad gets the default full-white tint
    /// attenuated only by camera alpha.
    pub fn submit_with(
        &self,
        ctx: &mut RenderContext<'_>,
        object: &RenderObject,
        texturer: Stage<'_, TextureLookup, dyn Texturer>,
        transformer: Stage<'_, QuadCorners, dyn Transformer>,
        tinter: Option<Stage<'_, TintSet, dyn Tinter>>,
    ) {
        ctx.scoped(self.name(), |ctx| {
            let lookup = match texturer {
                Stage::Computed(lookup) => lookup.clone(),
                Stage::Node(node) => match node.lookup(object) {
                    Some(lookup) => lookup,
                    None => return,
                },
            };
            let corners = match transformer {
                Stage::Computed(corners) => *corners,
                Stage::Node(node) => node.corners(object, None),
            };
            let camera_alpha = ctx.current_context().camera_alpha;
            let tint = match tinter {
                Some(Stage::Computed(tint)) => *tint,
                Some(Stage::Node(node)) => node.tint(object, camera_alpha),
                None => TintSet::white(camera_alpha),
            };

            ctx.batch_quad(&QuadSubmission {
                texture: &lookup.texture,
                quad: corners.0,
                uv_source: lookup.uv_source,
                uvs: lookup.corner_uvs(),
                tint_fill: tint.fill,
                tints: tint.corners(),
                options: object.options,
            });
        })
    }
}

impl Default for QuadSubmitter {
    fn default() -> Self {
        Self::new()
    }
}

impl Submitter for QuadSubmitter {
    fn name(&self) -> &str {
        "QuadSubmitter"
    }

    fn submit(&self, ctx: &mut RenderContext<'_>, object: &RenderObject) {
        let (Some(texturer), Some(transformer)) =
            (&object.nodes.texturer, &object.nodes.transformer)
        else {
            return;
        };
        self.submit_with(
            ctx,
            object,
            Stage::Node(texturer.as_ref()),
            Stage::Node(transformer.as_ref()),
            object.nodes.tinter.as_deref().map(Stage::Node),
        );
    }
}

/// Submitter for repeating-texture quads.
pub struct TileSpriteSubmitter;

impl Submitter for TileSpriteSubmitter {
    fn name(&self) -> &str {
        "TileSpriteSubmitter"
    }

    fn submit(&self, ctx: &mut RenderContext<'_>, object: &RenderObject) {
        let Payload::TileSprite { scroll, tile_scale } = &object.payload else {
            return;
        };
        let (scroll, tile_scale) = (*scroll, *tile_scale);
        let (Some(texturer), Some(transformer)) =
            (&object.nodes.texturer, &object.nodes.transformer)
        else {
            return;
        };

        ctx.scoped(self.name(), |ctx| {
            let Some(lookup) = texturer.lookup(object) else {
                return;
            };
            let corners = transformer.corners(object, None);
            let camera_alpha = ctx.current_context().camera_alpha;
            let tint = match &object.nodes.tinter {
                Some(node) => node.tint(object, camera_alpha),
                None => TintSet::white(camera_alpha),
            };

            // How many repeat cells the quad spans, offset by the scroll.
            let cell = Vec2::new(lookup.uv_source.w, lookup.uv_source.h) * tile_scale;
            let repeats = object.size / cell;
            let (s, r) = (scroll, repeats);
            let uvs = [
                Vec2::new(s.x, s.y),
                Vec2::new(s.x, s.y + r.y),
                Vec2::new(s.x + r.x, s.y),
                Vec2::new(s.x + r.x, s.y + r.y),
            ];

            ctx.batch_tile_sprite(&TileSpriteSubmission {
                texture: &lookup.texture,
                quad: corners.0,
                uv_source: lookup.uv_source,
                uvs,
                tint_fill: tint.fill,
                tints: tint.corners(),
                options: object.options,
            });
        })
    }
}

/// Submitter for tilemap layers: many tiles, one texture lookup.
///
/// Reuses the quad submitter's composition logic per tile, feeding it
/// computed stage results so the texture lookup and tint resolve once per
/// layer rather than once per tile.
pub struct TilemapSubmitter {
    quad: Rc<QuadSubmitter>,
}

impl TilemapSubmitter {
    pub fn new(quad: Rc<QuadSubmitter>) -> Self {
        Self { quad }
    }
}

impl Submitter for TilemapSubmitter {
    fn name(&self) -> &str {
        "TilemapSubmitter"
    }

    fn submit(&self, ctx: &mut RenderContext<'_>, object: &RenderObject) {
        let Payload::Tiles(tiles) = &object.payload else {
            return;
        };
        let Some(texturer) = &object.nodes.texturer else {
            return;
        };

        ctx.scoped(self.name(), |ctx| {
            let Some(base) = texturer.lookup(object) else {
                return;
            };
            let camera_alpha = ctx.current_context().camera_alpha;
            let tint = match &object.nodes.tinter {
                Some(node) => node.tint(object, camera_alpha),
                None => TintSet::white(camera_alpha),
            };

            for tile in tiles {
                let lookup = TextureLookup {
                    texture: base.texture.clone(),
                    frame: tile.src,
                    uv_source: tile.src,
                };
                let corners = WorldTransformer::rect_corners(
                    object,
                    None,
                    tile.dst,
                    Vec2::new(tile.src.w, tile.src.h),
                );
                self.quad.submit_with(
                    ctx,
                    object,
                    Stage::Computed(&lookup),
                    Stage::Computed(&corners),
                    Some(Stage::Computed(&tint)),
                );
            }
        })
    }
}

/// Submitter for 2D point lights.
pub struct LightSubmitter;

impl Submitter for LightSubmitter {
    fn name(&self) -> &str {
        "LightSubmitter"
    }

    fn submit(&self, ctx: &mut RenderContext<'_>, object: &RenderObject) {
        let Payload::Light { radius, intensity } = &object.payload else {
            return;
        };
        let (radius, intensity) = (*radius, *intensity);

        ctx.scoped(self.name(), |ctx| {
            let center = object.transform.transform_point2(Vec2::ZERO);
            let camera_alpha = ctx.current_context().camera_alpha;
            let base = object.tints[0];
            let color = base.with_alpha(base.a * object.alpha * camera_alpha);
            ctx.batch_light(&LightSubmission {
                center,
                radius,
                color,
                intensity,
            });
        })
    }
}

/// Corner positions for a line segment drawn as an oriented quad, in
/// top-left, bottom-left, top-right, bottom-right order relative to the
/// segment direction. Zero-length segments yield `None`.
pub fn line_quad(from: Vec2, to: Vec2, width: f32) -> Option<[Vec2; 4]> {
    let dir = to - from;
    if dir.length_squared() == 0.0 {
        return None;
    }
    let normal = Vec2::new(-dir.y, dir.x).normalize() * (width * 0.5);
    Some([from + normal, from - normal, to + normal, to - normal])
}

/// Stateless utility submitter for fill shapes: rectangles and lines batch
/// as white-textured quads, triangles as colored strip runs.
pub struct ShapeSubmitter {
    white: Rc<Texture>,
}

impl ShapeSubmitter {
    pub fn new(white: Rc<Texture>) -> Self {
        Self { white }
    }

    fn resolve_tint(&self, ctx: &RenderContext<'_>, object: &RenderObject) -> TintSet {
        let camera_alpha = ctx.current_context().camera_alpha;
        match &object.nodes.tinter {
            Some(node) => node.tint(object, camera_alpha),
            None => TintSet::white(camera_alpha),
        }
    }

    fn submit_fill_quad(
        &self,
        ctx: &mut RenderContext<'_>,
        object: &RenderObject,
        quad: [Vec2; 4],
        tint: TintSet,
    ) {
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
            tint_fill: tint.fill,
            tints: tint.corners(),
            options: object.options,
        });
    }
}

impl Submitter for ShapeSubmitter {
    fn name(&self) -> &str {
        "ShapeSubmitter"
    }

    fn submit(&self, ctx: &mut RenderContext<'_>, object: &RenderObject) {
        ctx.scoped(self.name(), |ctx| match &object.payload {
            Payload::FillRect => {
                let corners = match &object.nodes.transformer {
                    Some(node) => node.corners(object, None),
                    None => WorldTransformer.corners(object, None),
                };
                let tint = self.resolve_tint(ctx, object);
                self.submit_fill_quad(ctx, object, corners.0, tint);
            }
            Payload::Line { from, to, width } => {
                let Some(local) = line_quad(*from, *to, *width) else {
                    return;
                };
                let quad = local.map(|p| object.transform.transform_point2(p));
                let tint = self.resolve_tint(ctx, object);
                self.submit_fill_quad(ctx, object, quad, tint);
            }
            Payload::Triangle { points } => {
                let tint = self.resolve_tint(ctx, object);
                let tints = tint.corners();
                let vertices: [StripVertex; 3] = std::array::from_fn(|i| StripVertex {
                    position: object.transform.transform_point2(points[i]).to_array(),
                    tint: tints[i],
                });
                ctx.batch_strip_run(&vertices);
            }
            _ => {}
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_quad_is_perpendicular_to_the_segment() {
        let quad = line_quad(Vec2::ZERO, Vec2::new(10.0, 0.0), 2.0).unwrap();
        assert_eq!(quad[0], Vec2::new(0.0, 1.0));
        assert_eq!(quad[1], Vec2::new(0.0, -1.0));
        assert_eq!(quad[2], Vec2::new(10.0, 1.0));
        assert_eq!(quad[3], Vec2::new(10.0, -1.0));
    }

    #[test]
    fn zero_length_line_yields_no_quad() {
        assert!(line_quad(Vec2::ONE, Vec2::ONE, 4.0).is_none());
    }
}
