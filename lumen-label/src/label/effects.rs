//! Label effects and program selection.
//!
//! Outline and glow change the label's program (and for TTF, the atlas).
//! Shadow, bold, italics, underline and strikethrough are toggles layered
//! on top. Bold is emulated with extra kerning and a white shadow; it
//! remembers any shadow it replaced and restores it when disabled.

use glam::Vec2;
use log::{debug, warn};
use lumen_text::{Color3B, Color4B, Color4F, TtfConfig};

use super::Label;
use crate::shader::{select_program, LabelEffect, LabelType, ProgramState, UniformLocations};

impl Label {
    /// Distance-field glow. TTF only; switches the atlas to distance fields.
    pub fn enable_glow(&mut self, color: Color4B) {
        if self.label_type != LabelType::Ttf {
            warn!("glow is only supported by TTF labels");
            return;
        }
        if !self.font_config.distance_field_enabled {
            let config = TtfConfig {
                outline_size: 0.0,
                distance_field_enabled: true,
                ..self.font_config.clone()
            };
            if let Err(err) = self.set_ttf_config(&config) {
                warn!("could not switch to a distance-field atlas: {err}");
                return;
            }
            self.content_dirty = true;
        }
        self.current_effect = LabelEffect::Glow;
        self.effect_color = Color4F::from(color);
        self.update_shader_program();
    }

    /// Outline for TTF and system-font labels. A non-positive size keeps
    /// the current outline and only recolors it.
    pub fn enable_outline(&mut self, color: Color4B, size: f32) {
        if !matches!(self.label_type, LabelType::Ttf | LabelType::StringTexture) {
            warn!("outline is only supported by TTF and system-font labels");
            return;
        }
        if size <= 0.0 && self.current_effect != LabelEffect::Outline {
            return;
        }

        let color = Color4F::from(color);
        if self.label_type == LabelType::Ttf {
            self.effect_color = color;
            if !self.use_distance_field {
                if size > 0.0 && self.font_config.outline_size != size {
                    let config = TtfConfig { outline_size: size, ..self.font_config.clone() };
                    if let Err(err) = self.set_ttf_config(&config) {
                        warn!("could not load outlined atlas: {err}");
                        return;
                    }
                }
            } else {
                self.update_shader_program();
            }
        } else if self.effect_color != color || self.outline_size != size {
            self.effect_color = color;
            self.current_effect = LabelEffect::Outline;
            self.content_dirty = true;
        }
        self.outline_size = size;
    }

    /// Drop shadow drawn under the text at `offset`.
    pub fn enable_shadow(&mut self, color: Color4B, offset: Vec2) {
        self.bold.owns_shadow = false;
        self.apply_shadow(color, offset);
    }

    /// Black shadow at the configured default offset.
    pub fn enable_default_shadow(&mut self) {
        self.enable_shadow(Color4B::BLACK, self.settings.default_shadow_offset);
    }

    fn apply_shadow(&mut self, color: Color4B, offset: Vec2) {
        let recolored = self.shadow_color4b() != color;
        self.shadow.enabled = true;
        self.shadow.dirty = true;
        self.shadow.offset = offset;
        self.shadow.color = color.rgb();
        self.shadow.opacity = color.a;
        self.shadow.color_f = Color4F::from(color);

        if !self.system_font_dirty && !self.content_dirty && self.text_sprite.is_some() {
            if self.shadow_sprite.is_none() || recolored {
                self.shadow_sprite = None;
                let definition = self.font_definition();
                self.create_shadow_sprite_for_system_font(&definition);
            }
        }

        if matches!(self.label_type, LabelType::BmFont | LabelType::CharMap) {
            self.update_shader_program();
        }
    }

    fn shadow_color4b(&self) -> Color4B {
        let rgb = self.shadow.color;
        Color4B::new(rgb.r, rgb.g, rgb.b, self.shadow.opacity)
    }

    pub fn is_shadow_enabled(&self) -> bool {
        self.shadow.enabled
    }

    pub fn shadow_offset(&self) -> Vec2 {
        self.shadow.offset
    }

    pub fn shadow_color(&self) -> Color4F {
        self.shadow.color_f
    }

    pub fn shadow_color3b(&self) -> Color3B {
        self.shadow.color
    }

    pub fn enable_italics(&mut self) {
        self.set_rotation_skew_x(self.settings.italic_skew_degrees);
    }

    /// Fake bold: extra kerning plus a thin white shadow.
    pub fn enable_bold(&mut self) {
        if self.bold.enabled {
            return;
        }
        self.bold.previous_shadow = self.shadow.enabled.then(|| (self.shadow_color4b(), self.shadow.offset));
        self.apply_shadow(Color4B::WHITE, self.settings.bold_shadow_offset);
        self.bold.owns_shadow = true;

        let before = self.additional_kerning;
        self.set_additional_kerning(before + self.settings.bold_kerning);
        self.bold.kerning = self.additional_kerning - before;
        self.bold.enabled = true;
    }

    pub fn is_bold_enabled(&self) -> bool {
        self.bold.enabled
    }

    pub fn enable_underline(&mut self) {
        if !self.underline_enabled {
            self.underline_enabled = true;
            self.content_dirty = true;
        }
    }

    pub fn is_underline_enabled(&self) -> bool {
        self.underline_enabled
    }

    pub fn enable_strikethrough(&mut self) {
        if !self.strikethrough_enabled {
            self.enable_underline();
            self.strikethrough_enabled = true;
            self.content_dirty = true;
        }
    }

    pub fn is_strikethrough_enabled(&self) -> bool {
        self.strikethrough_enabled
    }

    /// Turn one effect off. [`LabelEffect::All`] turns all of them off.
    pub fn disable_effect(&mut self, effect: LabelEffect) {
        match effect {
            LabelEffect::Normal => {}
            LabelEffect::Outline => {
                if self.current_effect != LabelEffect::Outline {
                    return;
                }
                if self.label_type == LabelType::Ttf {
                    let config = TtfConfig { outline_size: 0.0, ..self.font_config.clone() };
                    if let Err(err) = self.set_ttf_config(&config) {
                        warn!("could not drop the outline: {err}");
                        return;
                    }
                }
                self.current_effect = LabelEffect::Normal;
                self.content_dirty = true;
            }
            LabelEffect::Shadow => {
                self.bold.owns_shadow = false;
                self.bold.previous_shadow = None;
                self.remove_shadow();
            }
            LabelEffect::Glow => {
                if self.current_effect == LabelEffect::Glow {
                    self.current_effect = LabelEffect::Normal;
                    self.update_shader_program();
                }
            }
            LabelEffect::Italics => self.set_rotation_skew_x(0.0),
            LabelEffect::Bold => self.disable_bold(),
            LabelEffect::Underline => {
                self.underline_enabled = false;
                self.underline.clear();
            }
            LabelEffect::Strikethrough => {
                self.strikethrough_enabled = false;
                self.disable_effect(LabelEffect::Underline);
            }
            LabelEffect::All => {
                for effect in [
                    LabelEffect::Shadow,
                    LabelEffect::Glow,
                    LabelEffect::Outline,
                    LabelEffect::Italics,
                    LabelEffect::Bold,
                    LabelEffect::Underline,
                    LabelEffect::Strikethrough,
                ] {
                    self.disable_effect(effect);
                }
            }
        }
    }

    pub fn disable_all_effects(&mut self) {
        self.disable_effect(LabelEffect::All);
    }

    fn remove_shadow(&mut self) {
        if self.shadow.enabled {
            self.shadow.enabled = false;
            self.shadow_sprite = None;
            self.update_shader_program();
        }
    }

    fn disable_bold(&mut self) {
        if !self.bold.enabled {
            return;
        }
        self.bold.enabled = false;
        self.additional_kerning -= self.bold.kerning;
        if self.bold.kerning != 0.0 {
            self.content_dirty = true;
        }
        self.bold.kerning = 0.0;

        if self.bold.owns_shadow {
            self.bold.owns_shadow = false;
            match self.bold.previous_shadow.take() {
                Some((color, offset)) => {
                    debug!("restoring shadow replaced by bold");
                    self.apply_shadow(color, offset);
                }
                None => self.remove_shadow(),
            }
        }
        self.bold.previous_shadow = None;
    }

    /// Select the program for the current type/effect and push a fresh
    /// state into every command.
    pub(super) fn update_shader_program(&mut self) {
        let Some(program) = select_program(
            self.label_type,
            self.current_effect,
            self.use_distance_field,
            self.use_a8_shader,
        ) else {
            return;
        };
        debug!("label program -> {program:?}");
        let state = ProgramState::new(program);
        self.uniforms = UniformLocations::of(program);
        for batch in &mut self.batch_commands {
            batch.set_program_state(&state);
        }
        for command in &mut self.quad_commands {
            command.program_state = Some(state.clone());
        }
        self.program_state = Some(state);
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::shader::ProgramType;
    use crate::testing::FixedGlyphProvider;

    fn ttf(size: f32) -> Label {
        let provider = Rc::new(RefCell::new(FixedGlyphProvider::new()));
        let mut label = Label::new(provider);
        label.set_ttf_config(&TtfConfig::new("mono", size)).unwrap();
        label.set_string("abc");
        label
    }

    fn program(label: &Label) -> Option<ProgramType> {
        label.program_state().map(ProgramState::program)
    }

    #[test]
    fn test_plain_ttf_uses_a8_program() {
        assert_eq!(program(&ttf(20.0)), Some(ProgramType::LabelNormal));
    }

    #[test]
    fn test_outline_reloads_atlas() {
        let mut label = ttf(20.0);
        label.enable_outline(Color4B::new(255, 0, 0, 255), 2.0);
        assert_eq!(label.ttf_config().outline_size, 2.0);
        assert_eq!(label.current_effect(), LabelEffect::Outline);
        assert_eq!(program(&label), Some(ProgramType::LabelOutline));

        label.disable_effect(LabelEffect::Outline);
        assert_eq!(label.ttf_config().outline_size, 0.0);
        assert_eq!(label.current_effect(), LabelEffect::Normal);
        assert_eq!(program(&label), Some(ProgramType::LabelNormal));
    }

    #[test]
    fn test_glow_switches_to_distance_field() {
        let mut label = ttf(20.0);
        label.enable_glow(Color4B::new(0, 255, 0, 255));
        assert!(label.ttf_config().distance_field_enabled);
        assert_eq!(program(&label), Some(ProgramType::LabelDistanceFieldGlow));
        label.disable_effect(LabelEffect::Glow);
        assert_eq!(program(&label), Some(ProgramType::LabelDistanceFieldNormal));
    }

    #[test]
    fn test_bold_adds_and_removes_exactly() {
        let mut label = ttf(20.0);
        label.set_additional_kerning(3.0);
        label.enable_bold();
        label.enable_bold();
        assert_eq!(label.additional_kerning(), 4.0);
        assert!(label.is_shadow_enabled());
        assert_eq!(label.shadow_offset(), Vec2::new(0.9, 0.0));

        label.disable_effect(LabelEffect::Bold);
        assert_eq!(label.additional_kerning(), 3.0);
        assert!(!label.is_shadow_enabled());
    }

    #[test]
    fn test_bold_restores_user_shadow() {
        let mut label = ttf(20.0);
        let red = Color4B::new(255, 0, 0, 200);
        label.enable_shadow(red, Vec2::new(3.0, -3.0));
        label.enable_bold();
        assert_eq!(label.shadow_color3b(), Color3B::WHITE);

        label.disable_effect(LabelEffect::Bold);
        assert!(label.is_shadow_enabled());
        assert_eq!(label.shadow_offset(), Vec2::new(3.0, -3.0));
        assert_eq!(label.shadow_color(), Color4F::from(red));
    }

    #[test]
    fn test_shadow_set_while_bold_survives_bold_off() {
        let mut label = ttf(20.0);
        label.enable_bold();
        label.enable_shadow(Color4B::BLACK, Vec2::new(2.0, -2.0));
        label.disable_effect(LabelEffect::Bold);
        assert!(label.is_shadow_enabled());
        assert_eq!(label.shadow_offset(), Vec2::new(2.0, -2.0));
    }

    #[test]
    fn test_italics_skews() {
        let mut label = ttf(20.0);
        label.enable_italics();
        assert_eq!(label.node().skew_x, 12.0);
        label.disable_effect(LabelEffect::Italics);
        assert_eq!(label.node().skew_x, 0.0);
    }

    #[test]
    fn test_strikethrough_implies_underline() {
        let mut label = ttf(20.0);
        label.enable_strikethrough();
        assert!(label.is_underline_enabled());
        label.disable_effect(LabelEffect::Strikethrough);
        assert!(!label.is_underline_enabled());
        assert!(!label.is_strikethrough_enabled());
    }

    #[test]
    fn test_disable_all() {
        let mut label = ttf(20.0);
        label.enable_outline(Color4B::WHITE, 1.0);
        label.enable_bold();
        label.enable_italics();
        label.enable_underline();
        label.disable_all_effects();
        assert_eq!(label.current_effect(), LabelEffect::Normal);
        assert!(!label.is_bold_enabled());
        assert!(!label.is_shadow_enabled());
        assert!(!label.is_underline_enabled());
        assert_eq!(label.node().skew_x, 0.0);
        assert_eq!(label.additional_kerning(), 0.0);
    }

    #[test]
    fn test_outline_ignored_for_bmfont() {
        let provider = Rc::new(RefCell::new(FixedGlyphProvider::new()));
        provider.borrow_mut().add_bmfont("fonts/test.fnt");
        let mut label = Label::new(provider);
        label.set_bmfont_file_path("fonts/test.fnt", Vec2::ZERO, 0.0).unwrap();
        label.enable_outline(Color4B::WHITE, 2.0);
        assert_eq!(label.current_effect(), LabelEffect::Normal);
        assert_eq!(program(&label), Some(ProgramType::PositionTextureColor));
    }
}
