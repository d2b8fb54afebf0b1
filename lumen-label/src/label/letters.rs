//! Quad/letter sync.
//!
//! [`Label::update_quads`] writes every visible glyph into its page batch and
//! records the slot in `LetterInfo::atlas_index`. A [`LetterMut`] returned by
//! [`Label::letter`] is a view over one of those slots: its setters rebuild
//! the quad in place, so the batch stays the only copy of the geometry.

use glam::Vec2;
use log::debug;
use lumen_text::{Color3B, Color4B, Overflow};

use super::Label;
use crate::layout::is_horizontal_clamped;
use crate::node::Rect;
use crate::quad::GlyphSprite;
use crate::shader::LabelType;

/// Cached per-letter transform and color.
#[derive(Clone, Debug, PartialEq)]
pub struct LetterState {
    position: Vec2,
    scale: f32,
    rotation: f32,
    color: Color3B,
    opacity: u8,
    visible: bool,
    sprite: Option<GlyphSprite>,
    page: usize,
    atlas_index: Option<usize>,
}

impl LetterState {
    /// Stop writing to the batch until the next relayout re-points us.
    pub(super) fn detach(&mut self) {
        self.sprite = None;
        self.atlas_index = None;
    }
}

/// Where a letter sits after layout.
struct Placement {
    sprite: GlyphSprite,
    page: usize,
    center: Vec2,
}

/// Mutable view of one laid-out letter.
pub struct LetterMut<'a> {
    label: &'a mut Label,
    index: usize,
}

impl LetterMut<'_> {
    fn state(&self) -> Option<&LetterState> {
        self.label.letters.get(&self.index)
    }

    fn edit(&mut self, f: impl FnOnce(&mut LetterState)) {
        if let Some(state) = self.label.letters.get_mut(&self.index) {
            f(state);
        }
        self.label.write_letter_quad(self.index);
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Slot of this letter's quad in its page batch.
    pub fn atlas_index(&self) -> Option<usize> {
        self.state().and_then(|s| s.atlas_index)
    }

    pub fn page(&self) -> usize {
        self.state().map_or(0, |s| s.page)
    }

    /// Glyph center in label space.
    pub fn position(&self) -> Vec2 {
        self.state().map_or(Vec2::ZERO, |s| s.position)
    }

    pub fn set_position(&mut self, position: Vec2) {
        self.edit(|s| s.position = position);
    }

    pub fn scale(&self) -> f32 {
        self.state().map_or(1.0, |s| s.scale)
    }

    pub fn set_scale(&mut self, scale: f32) {
        self.edit(|s| s.scale = scale);
    }

    pub fn rotation(&self) -> f32 {
        self.state().map_or(0.0, |s| s.rotation)
    }

    /// Clockwise degrees around the glyph center.
    pub fn set_rotation(&mut self, degrees: f32) {
        self.edit(|s| s.rotation = degrees);
    }

    pub fn color(&self) -> Color3B {
        self.state().map_or(Color3B::WHITE, |s| s.color)
    }

    pub fn set_color(&mut self, color: Color3B) {
        self.edit(|s| s.color = color);
    }

    pub fn opacity(&self) -> u8 {
        self.state().map_or(255, |s| s.opacity)
    }

    pub fn set_opacity(&mut self, opacity: u8) {
        self.edit(|s| s.opacity = opacity);
    }

    pub fn is_visible(&self) -> bool {
        self.state().is_some_and(|s| s.visible)
    }

    /// A hidden letter keeps its slot; its quad alpha drops to 0.
    pub fn set_visible(&mut self, visible: bool) {
        self.edit(|s| s.visible = visible);
    }
}

pub(super) fn mul_u8(a: u8, b: u8) -> u8 {
    ((u16::from(a) * u16::from(b)) / 255) as u8
}

impl Label {
    /// Per-letter view, created on first access and cached.
    ///
    /// `None` for system-font labels, out-of-range indices, and letters
    /// without a quad (newlines, missing glyphs, clamped glyphs).
    pub fn letter(&mut self, index: usize) -> Option<LetterMut<'_>> {
        if self.system_font_dirty || self.label_type == LabelType::StringTexture {
            return None;
        }
        self.ensure_layout();
        if self.text_sprite.is_some() {
            return None;
        }

        let info = *self.layout.letters.get(index)?;
        if !info.valid {
            return None;
        }
        let atlas_index = info.atlas_index?;

        if !self.letters.contains_key(&index) {
            let placement = self.place_letter(index)?;
            debug!("materializing letter proxy {index}");
            let state = LetterState {
                position: placement.center,
                scale: self.letter_sprite_scale(),
                rotation: 0.0,
                color: Color3B::WHITE,
                opacity: 255,
                visible: true,
                sprite: Some(placement.sprite),
                page: placement.page,
                atlas_index: Some(atlas_index),
            };
            self.letters.insert(index, state);
        }
        Some(LetterMut { label: self, index })
    }

    fn place_letter(&self, index: usize) -> Option<Placement> {
        let info = self.layout.letters.get(index)?;
        let atlas = self.atlas.as_ref()?.borrow();
        let def = atlas.letter_definition(info.code)?;
        let texture = atlas.texture(def.page)?;
        let scale = self.letter_sprite_scale();
        let offset_x = self.layout.lines_offset_x.get(info.line_index).copied().unwrap_or(0.0);
        Some(Placement {
            sprite: GlyphSprite {
                rect: Rect::new(def.u, def.v, def.width, def.height),
                rotated: def.rotated,
                texture_size: texture.size(),
            },
            page: def.page,
            center: Vec2::new(
                info.position.x + def.width * scale / 2.0 + offset_x,
                info.position.y + self.layout.letter_offset_y - def.height * scale / 2.0,
            ),
        })
    }

    /// Rebuild every page batch from the current layout.
    ///
    /// Returns false when a glyph overflows a fixed width under
    /// [`Overflow::Shrink`] and the label has to shrink.
    pub(super) fn update_quads(&mut self) -> bool {
        for node in &mut self.batch_nodes {
            node.atlas_mut().remove_all();
        }
        for info in &mut self.layout.letters {
            info.atlas_index = None;
        }
        let Some(handle) = self.atlas.clone() else {
            return true;
        };
        let atlas = handle.borrow();

        let scale = self.letter_sprite_scale();
        let bmfont_scale = self.bmfont_scale();
        let color = self.displayed_color4b();

        for index in 0..self.layout.letters.len() {
            let info = self.layout.letters[index];
            if !info.valid {
                continue;
            }
            let Some(def) = atlas.letter_definition(info.code) else {
                continue;
            };

            let mut rect = Rect::new(def.u, def.v, def.width, def.height);
            let mut py = info.position.y + self.layout.letter_offset_y;
            if self.label_height > 0.0 {
                let (top, bottom) = (self.layout.tailored_top_y, self.layout.tailored_bottom_y);
                if py > top {
                    let clip = py - top;
                    rect.origin.y += clip;
                    rect.size.y -= clip;
                    py -= clip;
                }
                if py - def.height * bmfont_scale < bottom {
                    rect.size.y = if py < bottom { 0.0 } else { py - bottom };
                }
            }

            let line_offset = self.layout.lines_offset_x.get(info.line_index).copied().unwrap_or(0.0);
            let px = info.position.x + def.width / 2.0 * bmfont_scale + line_offset;
            if self.label_width > 0.0
                && is_horizontal_clamped(&self.layout, self.enable_wrap, px, info.line_index)
            {
                match self.overflow {
                    Overflow::Clamp => rect.size.x = 0.0,
                    Overflow::Shrink if self.layout.content_size.x > def.width => return false,
                    Overflow::Shrink => rect.size.x = 0.0,
                    Overflow::None | Overflow::ResizeHeight => {}
                }
            }

            if rect.size.x <= 0.0 || rect.size.y <= 0.0 {
                continue;
            }
            let Some(texture) = atlas.texture(def.page) else {
                continue;
            };
            let sprite = GlyphSprite { rect, rotated: def.rotated, texture_size: texture.size() };
            let center = Vec2::new(
                info.position.x + line_offset + rect.size.x * scale / 2.0,
                py - rect.size.y * scale / 2.0,
            );
            if let Some(node) = self.batch_nodes.get_mut(def.page) {
                self.layout.letters[index].atlas_index =
                    node.atlas_mut().push(sprite.quad(center, scale, 0.0, color));
            }
        }
        true
    }

    /// Drop proxies past the end of the string and re-point the rest.
    pub(super) fn update_label_letters(&mut self) {
        if self.letters.is_empty() {
            return;
        }
        let len = self.text.len();
        let dropped = self.letters.split_off(&len);
        if !dropped.is_empty() {
            debug!("dropping {} letter proxies past index {len}", dropped.len());
        }

        let scale = self.letter_sprite_scale();
        let indices: Vec<usize> = self.letters.keys().copied().collect();
        for index in indices {
            let info = self.layout.letters.get(index).copied();
            let placement = info.filter(|i| i.valid).and_then(|_| self.place_letter(index));
            let Some(letter) = self.letters.get_mut(&index) else {
                continue;
            };
            letter.scale = scale;
            match placement {
                Some(placement) => {
                    letter.sprite = Some(placement.sprite);
                    letter.page = placement.page;
                    letter.position = placement.center;
                    letter.atlas_index = info.and_then(|i| i.atlas_index);
                }
                None => letter.detach(),
            }
        }
    }

    fn write_letter_quad(&mut self, index: usize) {
        let Some(letter) = self.letters.get(&index) else {
            return;
        };
        let (Some(sprite), Some(slot)) = (letter.sprite, letter.atlas_index) else {
            return;
        };
        let quad = sprite.quad(letter.position, letter.scale, letter.rotation, self.letter_color(letter));
        if let Some(node) = self.batch_nodes.get_mut(letter.page) {
            node.atlas_mut().update(slot, quad);
        }
    }

    fn letter_color(&self, letter: &LetterState) -> Color4B {
        let opacity = if letter.visible { mul_u8(letter.opacity, self.displayed_opacity) } else { 0 };
        let rgb = Color3B::new(
            mul_u8(letter.color.r, self.displayed_color.r),
            mul_u8(letter.color.g, self.displayed_color.g),
            mul_u8(letter.color.b, self.displayed_color.b),
        );
        self.vertex_color(rgb, opacity)
    }

    pub(super) fn vertex_color(&self, rgb: Color3B, opacity: u8) -> Color4B {
        if self.opacity_modify_rgb {
            Color4B::new(mul_u8(rgb.r, opacity), mul_u8(rgb.g, opacity), mul_u8(rgb.b, opacity), opacity)
        } else {
            Color4B::new(rgb.r, rgb.g, rgb.b, opacity)
        }
    }

    pub(super) fn displayed_color4b(&self) -> Color4B {
        self.vertex_color(self.displayed_color, self.displayed_opacity)
    }

    // ── Color cascade ───────────────────────────────────────────────

    /// Recolor every quad, then re-apply per-letter overrides.
    pub(super) fn update_color(&mut self) {
        if self.batch_nodes.is_empty() {
            return;
        }
        let color = self.displayed_color4b();
        for node in &mut self.batch_nodes {
            for quad in node.atlas_mut().quads_mut() {
                quad.set_color(color);
            }
        }
        let indices: Vec<usize> = self.letters.keys().copied().collect();
        for index in indices {
            self.write_letter_quad(index);
        }
    }

    pub fn set_color(&mut self, color: Color3B) {
        self.real_color = color;
        self.update_displayed_color(self.parent_color);
    }

    pub fn color(&self) -> Color3B {
        self.real_color
    }

    pub fn displayed_color(&self) -> Color3B {
        self.displayed_color
    }

    /// Cascade a parent color into this label.
    pub fn update_displayed_color(&mut self, parent: Color3B) {
        self.parent_color = parent;
        self.displayed_color = Color3B::new(
            mul_u8(self.real_color.r, parent.r),
            mul_u8(self.real_color.g, parent.g),
            mul_u8(self.real_color.b, parent.b),
        );
        self.update_color();
    }

    pub fn set_opacity(&mut self, opacity: u8) {
        self.real_opacity = opacity;
        self.update_displayed_opacity(self.parent_opacity);
    }

    pub fn opacity(&self) -> u8 {
        self.real_opacity
    }

    pub fn displayed_opacity(&self) -> u8 {
        self.displayed_opacity
    }

    /// Cascade a parent opacity into this label.
    pub fn update_displayed_opacity(&mut self, parent: u8) {
        self.parent_opacity = parent;
        self.displayed_opacity = mul_u8(self.real_opacity, parent);
        self.update_color();
    }

    pub fn set_opacity_modify_rgb(&mut self, enabled: bool) {
        if self.opacity_modify_rgb != enabled {
            self.opacity_modify_rgb = enabled;
            self.update_color();
        }
    }

    pub fn is_opacity_modify_rgb(&self) -> bool {
        self.opacity_modify_rgb
    }

    /// Fill color for TTF and system-font glyphs.
    pub fn set_text_color(&mut self, color: Color4B) {
        if !matches!(self.label_type, LabelType::Ttf | LabelType::StringTexture) {
            log::warn!("set_text_color only applies to TTF and system-font labels");
            return;
        }
        if self.label_type == LabelType::StringTexture && self.text_color != color {
            self.content_dirty = true;
        }
        self.text_color = color;
    }

    pub fn text_color(&self) -> Color4B {
        self.text_color
    }

    pub fn set_blend_func(&mut self, blend: crate::command::BlendFunc) {
        self.blend_func = blend;
        self.blend_func_dirty = true;
    }

    pub fn blend_func(&self) -> crate::command::BlendFunc {
        self.blend_func
    }

    // ── Underline / strikethrough geometry ──────────────────────────

    pub(super) fn update_underline(&mut self) {
        self.underline.clear();
        if !self.underline_enabled && !self.strikethrough_enabled {
            return;
        }

        let lines = self.layout.number_of_lines;
        if lines > 0 {
            let char_height = self.layout.text_desired_height / lines as f32;
            self.underline.width = char_height / 6.0;
            let offset_y = if self.strikethrough_enabled { char_height / 2.0 } else { 0.0 };
            for line in 0..lines {
                let y = (lines - line - 1) as f32 * char_height + offset_y;
                let x = self.layout.lines_offset_x.get(line).copied().unwrap_or(0.0);
                let width = self.layout.lines_width.get(line).copied().unwrap_or(0.0);
                self.underline.draw_line(Vec2::new(x, y), Vec2::new(x + width, y));
            }
        } else if let Some(sprite) = &self.text_sprite {
            let size = sprite.size;
            self.underline.width = size.y / 6.0;
            let y = if self.strikethrough_enabled { size.y / 2.0 } else { 0.0 };
            self.underline.draw_line(Vec2::new(0.0, y), Vec2::new(size.x, y));
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use lumen_text::TtfConfig;

    use super::*;
    use crate::testing::FixedGlyphProvider;

    fn label(text: &str) -> Label {
        let provider = Rc::new(RefCell::new(FixedGlyphProvider::new()));
        let mut label = Label::new(provider);
        label.set_ttf_config(&TtfConfig::new("mono", 20.0)).unwrap();
        label.set_string(text);
        label.ensure_layout();
        label
    }

    fn quad_alpha(label: &Label, index: usize) -> u8 {
        let info = label.letters_info()[index];
        let slot = info.atlas_index.unwrap();
        label.batch_nodes()[0].atlas().quad(slot).unwrap().alpha()
    }

    #[test]
    fn test_every_visible_glyph_gets_a_slot() {
        let label = label("ab\ncd");
        let slots: Vec<Option<usize>> = label.letters_info().iter().map(|i| i.atlas_index).collect();
        assert_eq!(slots, vec![Some(0), Some(1), None, Some(2), Some(3)]);
        assert_eq!(label.batch_nodes()[0].atlas().total_quads(), 4);
    }

    #[test]
    fn test_letter_is_cached() {
        let mut label = label("abc");
        label.letter(1).unwrap().set_rotation(30.0);
        assert_eq!(label.letter(1).unwrap().rotation(), 30.0);
    }

    #[test]
    fn test_letter_rejects_newline_and_out_of_range() {
        let mut label = label("a\nb");
        assert!(label.letter(1).is_none());
        assert!(label.letter(3).is_none());
        assert!(label.letter(2).is_some());
    }

    #[test]
    fn test_hidden_letter_keeps_slot_with_zero_alpha() {
        let mut label = label("abc");
        let total = label.batch_nodes()[0].atlas().total_quads();
        label.letter(1).unwrap().set_visible(false);
        assert_eq!(quad_alpha(&label, 1), 0);
        assert_eq!(quad_alpha(&label, 0), 255);
        assert_eq!(quad_alpha(&label, 2), 255);
        assert_eq!(label.batch_nodes()[0].atlas().total_quads(), total);

        label.set_opacity(128);
        assert_eq!(quad_alpha(&label, 1), 0);
        assert_eq!(quad_alpha(&label, 0), 128);
    }

    #[test]
    fn test_letter_move_writes_through() {
        let mut label = label("abc");
        let before = label.batch_nodes()[0].atlas().quad(2).copied().unwrap();
        {
            let mut letter = label.letter(2).unwrap();
            let p = letter.position();
            letter.set_position(p + Vec2::new(0.0, 5.0));
        }
        let after = label.batch_nodes()[0].atlas().quad(2).copied().unwrap();
        assert_eq!(after.tl.position[1], before.tl.position[1] + 5.0);
        assert_eq!(after.tl.position[0], before.tl.position[0]);
    }

    #[test]
    fn test_proxies_past_end_are_dropped() {
        let mut label = label("abcd");
        label.letter(3).unwrap().set_visible(false);
        label.letter(0).unwrap().set_visible(false);
        label.set_string("ab");
        label.ensure_layout();
        assert_eq!(label.letters.len(), 1);
        assert_eq!(quad_alpha(&label, 0), 0);
    }

    #[test]
    fn test_color_cascade_multiplies() {
        let mut label = label("a");
        label.set_color(Color3B::new(255, 128, 0));
        label.update_displayed_color(Color3B::new(128, 255, 255));
        assert_eq!(label.displayed_color(), Color3B::new(128, 128, 0));
        let quad = label.batch_nodes()[0].atlas().quad(0).copied().unwrap();
        assert_eq!(quad.tl.color, [128, 128, 0, 255]);
    }

    #[test]
    fn test_opacity_modify_rgb_premultiplies() {
        let mut label = label("a");
        label.set_opacity_modify_rgb(true);
        label.set_opacity(51);
        let quad = label.batch_nodes()[0].atlas().quad(0).copied().unwrap();
        assert_eq!(quad.tl.color, [51, 51, 51, 51]);
    }

    #[test]
    fn test_underline_per_line() {
        let mut label = label("ab\nc");
        label.enable_underline();
        label.ensure_layout();
        assert_eq!(label.underline.segments.len(), 2);
        let (from, to) = label.underline.segments[1];
        assert_eq!(from.y, 0.0);
        assert_eq!(to.x - from.x, label.lines_width()[1]);
    }
}
