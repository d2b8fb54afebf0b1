//! Quad geometry for text batches.
//!
//! Vertex and quad types derive `bytemuck::Pod` + `Zeroable` so a quad
//! array uploads to a GPU buffer without conversion. Each atlas page gets
//! one [`BatchNode`] whose [`QuadAtlas`] is the single dense store of that
//! page's glyph quads.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec2, Vec3};
use log::warn;
use lumen_text::{Color4B, TextureInfo};

use crate::node::Rect;

// ───────────────────────────────────────────────────────────────────
// Vertex / quad
// ───────────────────────────────────────────────────────────────────

/// Position + color + texture coordinate. 24 bytes.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub color: [u8; 4],
    pub tex_coords: [f32; 2],
}

/// Four corners of a glyph quad. 96 bytes.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Quad {
    pub tl: Vertex,
    pub bl: Vertex,
    pub tr: Vertex,
    pub br: Vertex,
}

impl Quad {
    /// Index pattern for one quad: two triangles.
    pub const INDICES: [u16; 6] = [0, 1, 2, 3, 2, 1];

    pub fn vertices(&self) -> [&Vertex; 4] {
        [&self.tl, &self.bl, &self.tr, &self.br]
    }

    pub fn vertices_mut(&mut self) -> [&mut Vertex; 4] {
        [&mut self.tl, &mut self.bl, &mut self.tr, &mut self.br]
    }

    pub fn set_color(&mut self, color: Color4B) {
        for v in self.vertices_mut() {
            v.color = color.to_array();
        }
    }

    pub fn set_alpha(&mut self, alpha: u8) {
        for v in self.vertices_mut() {
            v.color[3] = alpha;
        }
    }

    pub fn alpha(&self) -> u8 {
        self.tl.color[3]
    }

    pub fn transformed(&self, transform: &Mat4) -> Quad {
        let mut out = *self;
        for v in out.vertices_mut() {
            let p = transform.transform_point3(Vec3::from(v.position));
            v.position = p.to_array();
        }
        out
    }
}

/// Texture-space description of one glyph.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GlyphSprite {
    /// Texel rectangle in the page.
    pub rect: Rect,
    pub rotated: bool,
    /// Page size in texels.
    pub texture_size: Vec2,
}

impl GlyphSprite {
    /// Build the quad for this sprite.
    ///
    /// `center` is the glyph center, `scale` multiplies the texel size and
    /// `rotation` is clockwise degrees around the center.
    pub fn quad(&self, center: Vec2, scale: f32, rotation: f32, color: Color4B) -> Quad {
        let half = self.rect.size * scale * 0.5;
        let corners = [
            Vec2::new(-half.x, half.y),  // tl
            Vec2::new(-half.x, -half.y), // bl
            Vec2::new(half.x, half.y),   // tr
            Vec2::new(half.x, -half.y),  // br
        ];
        let (sin, cos) = (-rotation.to_radians()).sin_cos();
        let place = |c: Vec2| {
            let r = Vec2::new(c.x * cos - c.y * sin, c.x * sin + c.y * cos);
            let p = center + r;
            [p.x, p.y, 0.0]
        };

        let uv = self.tex_coords();
        let col = color.to_array();
        Quad {
            tl: Vertex { position: place(corners[0]), color: col, tex_coords: uv[0] },
            bl: Vertex { position: place(corners[1]), color: col, tex_coords: uv[1] },
            tr: Vertex { position: place(corners[2]), color: col, tex_coords: uv[2] },
            br: Vertex { position: place(corners[3]), color: col, tex_coords: uv[3] },
        }
    }

    /// UVs for tl, bl, tr, br.
    fn tex_coords(&self) -> [[f32; 2]; 4] {
        let tex = self.texture_size.max(Vec2::ONE);
        let r = self.rect;
        if self.rotated {
            let left = r.origin.x / tex.x;
            let right = (r.origin.x + r.size.y) / tex.x;
            let top = r.origin.y / tex.y;
            let bottom = (r.origin.y + r.size.x) / tex.y;
            [[right, top], [left, top], [right, bottom], [left, bottom]]
        } else {
            let left = r.origin.x / tex.x;
            let right = (r.origin.x + r.size.x) / tex.x;
            let top = r.origin.y / tex.y;
            let bottom = (r.origin.y + r.size.y) / tex.y;
            [[left, top], [left, bottom], [right, top], [right, bottom]]
        }
    }
}

// ───────────────────────────────────────────────────────────────────
// Quad atlas
// ───────────────────────────────────────────────────────────────────

/// Largest quad count addressable with u16 indices.
pub const MAX_QUADS: usize = (u16::MAX as usize + 1) / 4;

/// Dense quad array plus its index buffer.
#[derive(Clone, Debug, Default)]
pub struct QuadAtlas {
    quads: Vec<Quad>,
    indices: Vec<u16>,
}

impl QuadAtlas {
    pub fn with_capacity(capacity: usize) -> Self {
        let mut atlas = Self::default();
        atlas.reserve(capacity);
        atlas
    }

    pub fn total_quads(&self) -> usize {
        self.quads.len()
    }

    pub fn capacity(&self) -> usize {
        self.quads.capacity()
    }

    pub fn quads(&self) -> &[Quad] {
        &self.quads
    }

    pub fn indices(&self) -> &[u16] {
        &self.indices
    }

    pub fn quad(&self, index: usize) -> Option<&Quad> {
        self.quads.get(index)
    }

    pub fn quad_mut(&mut self, index: usize) -> Option<&mut Quad> {
        self.quads.get_mut(index)
    }

    pub fn quads_mut(&mut self) -> &mut [Quad] {
        &mut self.quads
    }

    pub fn reserve(&mut self, additional: usize) {
        self.quads.reserve(additional);
        self.indices.reserve(additional * 6);
    }

    /// Append a quad; returns its index or `None` past the u16 limit.
    pub fn push(&mut self, quad: Quad) -> Option<usize> {
        let index = self.quads.len();
        if index >= MAX_QUADS {
            warn!("quad atlas full ({MAX_QUADS} quads); dropping glyph");
            return None;
        }
        self.quads.push(quad);
        let base = (index * 4) as u16;
        self.indices.extend(Quad::INDICES.iter().map(|i| base + i));
        Some(index)
    }

    pub fn update(&mut self, index: usize, quad: Quad) -> bool {
        match self.quads.get_mut(index) {
            Some(slot) => {
                *slot = quad;
                true
            }
            None => false,
        }
    }

    /// Drop all quads but keep the allocation.
    pub fn remove_all(&mut self) {
        self.quads.clear();
        self.indices.clear();
    }

    pub fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.quads)
    }
}

/// Batch of glyph quads sharing one atlas page texture.
#[derive(Clone, Debug)]
pub struct BatchNode {
    texture: TextureInfo,
    atlas: QuadAtlas,
}

impl BatchNode {
    pub fn new(texture: TextureInfo) -> Self {
        Self { texture, atlas: QuadAtlas::default() }
    }

    pub fn texture(&self) -> &TextureInfo {
        &self.texture
    }

    pub fn atlas(&self) -> &QuadAtlas {
        &self.atlas
    }

    pub fn atlas_mut(&mut self) -> &mut QuadAtlas {
        &mut self.atlas
    }
}

// ===================================================================
// Tests
// ===================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn sprite(x: f32, y: f32, w: f32, h: f32, rotated: bool) -> GlyphSprite {
        GlyphSprite {
            rect: Rect::new(x, y, w, h),
            rotated,
            texture_size: Vec2::new(100.0, 100.0),
        }
    }

    #[test]
    fn test_vertex_size() {
        assert_eq!(std::mem::size_of::<Vertex>(), 24);
        assert_eq!(std::mem::size_of::<Quad>(), 96);
    }

    #[test]
    fn test_quad_geometry() {
        let q = sprite(10.0, 20.0, 10.0, 20.0, false).quad(Vec2::new(5.0, 10.0), 1.0, 0.0, Color4B::WHITE);
        assert_eq!(q.tl.position, [0.0, 20.0, 0.0]);
        assert_eq!(q.br.position, [10.0, 0.0, 0.0]);
        assert_eq!(q.tl.tex_coords, [0.1, 0.2]);
        assert_eq!(q.br.tex_coords, [0.2, 0.4]);
    }

    #[test]
    fn test_quad_scale() {
        let q = sprite(0.0, 0.0, 10.0, 10.0, false).quad(Vec2::ZERO, 2.0, 0.0, Color4B::WHITE);
        assert_eq!(q.tr.position, [10.0, 10.0, 0.0]);
        assert_eq!(q.bl.position, [-10.0, -10.0, 0.0]);
    }

    #[test]
    fn test_rotated_sprite_uvs() {
        let q = sprite(0.0, 0.0, 10.0, 20.0, true).quad(Vec2::ZERO, 1.0, 0.0, Color4B::WHITE);
        assert_eq!(q.tl.tex_coords, [0.2, 0.0]);
        assert_eq!(q.br.tex_coords, [0.0, 0.1]);
    }

    #[test]
    fn test_quad_atlas_indices() {
        let mut atlas = QuadAtlas::with_capacity(4);
        assert_eq!(atlas.push(Quad::default()), Some(0));
        assert_eq!(atlas.push(Quad::default()), Some(1));
        assert_eq!(atlas.total_quads(), 2);
        assert_eq!(&atlas.indices()[6..], &[4, 5, 6, 7, 6, 5]);
        assert_eq!(atlas.vertex_bytes().len(), 2 * 96);

        atlas.remove_all();
        assert_eq!(atlas.total_quads(), 0);
        assert!(atlas.indices().is_empty());
        assert!(atlas.capacity() >= 4);
    }

    #[test]
    fn test_update_out_of_range() {
        let mut atlas = QuadAtlas::default();
        assert!(!atlas.update(0, Quad::default()));
        atlas.push(Quad::default());
        let mut q = Quad::default();
        q.set_alpha(7);
        assert!(atlas.update(0, q));
        assert_eq!(atlas.quad(0).unwrap().alpha(), 7);
    }

    #[test]
    fn test_set_color() {
        let mut q = Quad::default();
        q.set_color(Color4B::new(1, 2, 3, 4));
        assert!(q.vertices().iter().all(|v| v.color == [1, 2, 3, 4]));
    }
}
