use glam::{Mat4, Vec2};

use crate::color::Color;

/// An axis-aligned rectangle in pixels.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl Rect {
    pub const fn new(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self { x, y, w, h }
    }
}

/// A 2D camera: viewport, scroll, zoom, and background fill.
///
/// This is plain data consumed by the camera render node. A camera whose
/// viewport covers only part of the surface sets `custom_viewport`, which
/// makes the camera node clone the active drawing context and scissor to
/// the camera bounds for the duration of its pass.
#[derive(Clone, Debug)]
pub struct Camera2d {
    pub viewport: Rect,
    pub scroll: Vec2,
    pub zoom: f32,
    pub background: Color,
    pub alpha: f32,
    pub custom_viewport: bool,
}

impl Camera2d {
    pub fn new(width: f32, height: f32) -> Self {
        Self {
            viewport: Rect::new(0.0, 0.0, width, height),
            scroll: Vec2::ZERO,
            zoom: 1.0,
            background: Color::TRANSPARENT,
            alpha: 1.0,
            custom_viewport: false,
        }
    }

    /// Restricts the camera to a sub-rectangle of the surface.
    pub fn with_viewport(mut self, viewport: Rect) -> Self {
        self.viewport = viewport;
        self.custom_viewport = true;
        self
    }

    pub fn with_scroll(mut self, x: f32, y: f32) -> Self {
        self.scroll = Vec2::new(x, y);
        self
    }

    pub fn with_zoom(mut self, zoom: f32) -> Self {
        self.zoom = zoom;
        self
    }

    pub fn with_background(mut self, background: Color) -> Self {
        self.background = background;
        self
    }

    pub fn with_alpha(mut self, alpha: f32) -> Self {
        self.alpha = alpha;
        self
    }

    /// World-to-clip projection for this camera.
    ///
    /// Top-left origin, y-down pixel space mapped to clip space, zoom
    /// applied around the viewport center, then scroll.
    pub fn projection(&self) -> Mat4 {
        let (w, h) = (self.viewport.w, self.viewport.h);
        let ortho = Mat4::orthographic_rh(0.0, w, h, 0.0, -1.0, 1.0);
        let center = Vec2::new(w * 0.5, h * 0.5);
        let view = Mat4::from_translation(center.extend(0.0))
            * Mat4::from_scale(glam::Vec3::new(self.zoom, self.zoom, 1.0))
            * Mat4::from_translation((-center - self.scroll).extend(0.0));
        ortho * view
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec4;

    #[test]
    fn projection_maps_viewport_corners_to_clip() {
        let camera = Camera2d::new(800.0, 600.0);
        let proj = camera.projection();

        let top_left = proj * Vec4::new(0.0, 0.0, 0.0, 1.0);
        let bottom_right = proj * Vec4::new(800.0, 600.0, 0.0, 1.0);

        assert!((top_left.x - -1.0).abs() < 1e-6);
        assert!((top_left.y - 1.0).abs() < 1e-6);
        assert!((bottom_right.x - 1.0).abs() < 1e-6);
        assert!((bottom_right.y - -1.0).abs() < 1e-6);
    }

    #[test]
    fn scroll_shifts_world_space() {
        let camera = Camera2d::new(800.0, 600.0).with_scroll(100.0, 0.0);
        let proj = camera.projection();

        // The point at world x=100 now sits where x=0 used to.
        let p = proj * Vec4::new(100.0, 0.0, 0.0, 1.0);
        assert!((p.x - -1.0).abs() < 1e-6);
    }

    #[test]
    fn zoom_is_centered_on_the_viewport() {
        let camera = Camera2d::new(800.0, 600.0).with_zoom(2.0);
        let proj = camera.projection();

        // The viewport center must be invariant under zoom.
        let center = proj * Vec4::new(400.0, 300.0, 0.0, 1.0);
        assert!(center.x.abs() < 1e-6);
        assert!(center.y.abs() < 1e-6);
    }
}
