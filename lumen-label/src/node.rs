//! Scene-node surface of a label: local transform, visibility, draw flags.
//!
//! The scene graph itself lives outside this crate; the owner passes the
//! parent transform and flags into `Label::visit`.

use bitflags::bitflags;
use glam::{Mat4, Vec2, Vec3, Vec4};

bitflags! {
    /// Per-frame flags propagated from parent to child.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct DrawFlags: u32 {
        const TRANSFORM_DIRTY = 1 << 0;
        const CONTENT_SIZE_DIRTY = 1 << 1;
        const CAMERA_UPDATED = 1 << 2;
    }
}

/// Axis-aligned rectangle, y-up.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Rect {
    pub origin: Vec2,
    pub size: Vec2,
}

impl Rect {
    pub const ZERO: Self = Self { origin: Vec2::ZERO, size: Vec2::ZERO };

    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { origin: Vec2::new(x, y), size: Vec2::new(width, height) }
    }

    pub fn max(&self) -> Vec2 {
        self.origin + self.size
    }

    /// Bounding box of this rect after `transform`.
    pub fn apply_transform(&self, transform: &Mat4) -> Rect {
        let corners = [
            self.origin,
            Vec2::new(self.origin.x + self.size.x, self.origin.y),
            Vec2::new(self.origin.x, self.origin.y + self.size.y),
            self.max(),
        ];
        let mut min = Vec2::splat(f32::INFINITY);
        let mut max = Vec2::splat(f32::NEG_INFINITY);
        for corner in corners {
            let p = transform.transform_point3(corner.extend(0.0)).truncate();
            min = min.min(p);
            max = max.max(p);
        }
        Rect { origin: min, size: max - min }
    }
}

/// Local transform state of a label.
#[derive(Clone, Debug)]
pub struct NodeState {
    pub position: Vec2,
    /// Normalized anchor inside the content box.
    pub anchor_point: Vec2,
    pub scale: Vec2,
    /// Clockwise rotation in degrees.
    pub rotation: f32,
    pub skew_x: f32,
    pub skew_y: f32,
    pub visible: bool,
    pub global_z: f32,
    pub content_size: Vec2,
    pub transform_dirty: bool,
}

impl Default for NodeState {
    fn default() -> Self {
        Self {
            position: Vec2::ZERO,
            anchor_point: Vec2::new(0.5, 0.5),
            scale: Vec2::ONE,
            rotation: 0.0,
            skew_x: 0.0,
            skew_y: 0.0,
            visible: true,
            global_z: 0.0,
            content_size: Vec2::ZERO,
            transform_dirty: true,
        }
    }
}

impl NodeState {
    /// Local → parent transform, with the position shifted by `offset`.
    pub fn node_to_parent_with_offset(&self, offset: Vec2) -> Mat4 {
        let anchor = self.anchor_point * self.content_size;
        let skew = Mat4::from_cols(
            Vec4::new(1.0, self.skew_y.to_radians().tan(), 0.0, 0.0),
            Vec4::new(self.skew_x.to_radians().tan(), 1.0, 0.0, 0.0),
            Vec4::Z,
            Vec4::W,
        );
        Mat4::from_translation((self.position + offset).extend(0.0))
            * Mat4::from_rotation_z(-self.rotation.to_radians())
            * skew
            * Mat4::from_scale(Vec3::new(self.scale.x, self.scale.y, 1.0))
            * Mat4::from_translation((-anchor).extend(0.0))
    }

    pub fn node_to_parent(&self) -> Mat4 {
        self.node_to_parent_with_offset(Vec2::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: Vec2, b: Vec2) -> bool {
        (a - b).abs().max_element() < 1e-4
    }

    #[test]
    fn test_anchor_centers_content() {
        let node = NodeState {
            position: Vec2::new(100.0, 50.0),
            content_size: Vec2::new(40.0, 20.0),
            ..Default::default()
        };
        let m = node.node_to_parent();
        let origin = m.transform_point3(Vec3::ZERO).truncate();
        assert!(approx(origin, Vec2::new(80.0, 40.0)));
    }

    #[test]
    fn test_skew_x_shifts_top_edge() {
        let node = NodeState {
            anchor_point: Vec2::ZERO,
            skew_x: 45.0,
            ..Default::default()
        };
        let top = node.node_to_parent().transform_point3(Vec3::new(0.0, 10.0, 0.0)).truncate();
        assert!(approx(top, Vec2::new(10.0, 10.0)));
    }

    #[test]
    fn test_rotation_is_clockwise() {
        let node = NodeState {
            anchor_point: Vec2::ZERO,
            rotation: 90.0,
            ..Default::default()
        };
        let p = node.node_to_parent().transform_point3(Vec3::new(1.0, 0.0, 0.0)).truncate();
        assert!(approx(p, Vec2::new(0.0, -1.0)));
    }

    #[test]
    fn test_rect_apply_transform() {
        let rect = Rect::new(0.0, 0.0, 10.0, 4.0);
        let moved = rect.apply_transform(&Mat4::from_translation(Vec3::new(5.0, -2.0, 0.0)));
        assert_eq!(moved, Rect::new(5.0, -2.0, 10.0, 4.0));
    }

    #[test]
    fn test_draw_flags() {
        let flags = DrawFlags::TRANSFORM_DIRTY | DrawFlags::CAMERA_UPDATED;
        assert!(flags.intersects(DrawFlags::CAMERA_UPDATED));
        assert!(!flags.contains(DrawFlags::CONTENT_SIZE_DIRTY));
        assert!(DrawFlags::default().is_empty());
    }
}
