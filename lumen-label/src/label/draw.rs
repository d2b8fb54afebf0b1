//! Frame emission.
//!
//! `visit` flushes pending layout, refreshes the cached transforms and hands
//! draw commands to the renderer: shadow, then outline, then text for each
//! non-empty page, followed by underline segments. Nothing here changes the
//! layout.

use glam::{Mat4, Vec2, Vec4};
use log::trace;
use lumen_text::{Color4B, Color4F, Overflow, StringTexture};

use super::Label;
use crate::command::{
    color4b_vec4, color_vec4, BatchCommand, BlendFunc, QuadCommand, RenderCommand, Renderer,
    SpriteCommand,
};
use crate::node::DrawFlags;
use crate::quad::{Quad, QuadAtlas, Vertex};
use crate::shader::{LabelEffect, LabelType, UniformLocations, UniformValue};

/// Per-frame values the effect passes read.
struct Passes {
    label_type: LabelType,
    effect: LabelEffect,
    uniforms: UniformLocations,
    global_z: f32,
    distance_field: bool,
    effect_color: Vec4,
    outline_width: f32,
    shadow: Option<ShadowPass>,
}

struct ShadowPass {
    mvp: Mat4,
    color: Vec4,
    /// Vertex color for recolored (non-TTF) shadow quads.
    quad_color: Color4B,
}

impl Label {
    /// Visit the label as a scene-graph node.
    pub fn visit(&mut self, renderer: &mut dyn Renderer, parent: &Mat4, parent_flags: DrawFlags) {
        self.process_atlas_events();
        if !self.node.visible || self.utf8_text.is_empty() {
            return;
        }

        if self.system_font_dirty || self.content_dirty {
            if self.overflow == Overflow::Shrink && self.rendering_font_size() < self.original_font_size {
                self.rescale_with_original_font_size();
            }
            self.update_content();
        }

        let mut flags = parent_flags;
        if self.node.transform_dirty {
            flags |= DrawFlags::TRANSFORM_DIRTY;
        }
        let dirty = flags.intersects(DrawFlags::TRANSFORM_DIRTY | DrawFlags::CONTENT_SIZE_DIRTY);
        if dirty {
            self.model_view = *parent * self.node.node_to_parent();
            self.node.transform_dirty = false;
        }
        if self.shadow.enabled && (self.shadow.dirty || dirty) {
            self.shadow.transform = *parent * self.node.node_to_parent_with_offset(self.shadow.offset);
            self.shadow.dirty = false;
        }

        if self.text_sprite.is_some() {
            if self.is_inside_view(renderer, flags) {
                self.draw_text_sprites(renderer);
            }
        } else {
            let transform = self.model_view;
            self.draw(renderer, &transform, flags);
        }

        if !self.underline.segments.is_empty() {
            self.underline.transform = self.model_view;
            self.underline.global_z = self.node.global_z;
            self.underline.color = Color4F::from(Color4B::new(
                self.displayed_color.r,
                self.displayed_color.g,
                self.displayed_color.b,
                self.displayed_opacity,
            ));
            renderer.add_command(RenderCommand::Line(&self.underline));
        }
    }

    /// Coarse cull; the previous answer is reused unless the transform or
    /// the camera changed.
    fn is_inside_view(&mut self, renderer: &mut dyn Renderer, flags: DrawFlags) -> bool {
        if !self.settings.culling_enabled {
            return true;
        }
        let moved = flags.contains(DrawFlags::TRANSFORM_DIRTY)
            || flags.contains(DrawFlags::CAMERA_UPDATED)
            || renderer.camera_updated();
        if moved {
            self.inside_bounds = renderer.check_visibility(&self.model_view, self.node.content_size);
        }
        self.inside_bounds
    }

    /// Emit the glyph batches under `transform`.
    pub fn draw(&mut self, renderer: &mut dyn Renderer, transform: &Mat4, flags: DrawFlags) {
        if self.batch_nodes.is_empty() || self.text.is_empty() {
            return;
        }
        if !self.is_inside_view(renderer, flags) {
            trace!("label culled");
            return;
        }

        let projection = renderer.projection();
        if !self.shadow.enabled && matches!(self.label_type, LabelType::BmFont | LabelType::CharMap) {
            if self.quad_commands.len() != self.batch_nodes.len() {
                let state = self.program_state.clone();
                self.quad_commands.resize_with(self.batch_nodes.len(), || QuadCommand {
                    program_state: state.clone(),
                    ..QuadCommand::default()
                });
            }
            self.update_blend_state();
            for (node, command) in self.batch_nodes.iter().zip(&mut self.quad_commands) {
                if node.atlas().total_quads() == 0 {
                    continue;
                }
                let texture = node.texture().id;
                if let Some(state) = command.program_state.as_mut() {
                    state.set_uniform(self.uniforms.mvp_matrix, UniformValue::Mat4(projection));
                    state.set_texture(texture);
                }
                command.init(self.node.global_z, texture, self.blend_func, node.atlas().quads(), *transform);
                renderer.add_command(RenderCommand::Quad(&*command));
            }
            return;
        }

        if self.batch_commands.len() != self.batch_nodes.len() {
            self.batch_commands.resize_with(self.batch_nodes.len(), BatchCommand::default);
            self.update_shader_program();
        }
        self.update_blend_state();

        let mvp = projection * *transform;
        let text_color = color4b_vec4(self.text_color);
        let passes = self.passes(projection);
        let mut slot = 0;
        for node in &self.batch_nodes {
            if node.atlas().total_quads() == 0 {
                continue;
            }
            let batch = &mut self.batch_commands[slot];
            slot += 1;
            for command in batch.commands_mut() {
                if let Some(state) = command.program_state_mut() {
                    state.set_uniform(passes.uniforms.text_color, UniformValue::Vec4(text_color));
                    state.set_texture(node.texture().id);
                }
            }
            for command in [&mut batch.text, &mut batch.outline] {
                if let Some(state) = command.program_state_mut() {
                    state.set_uniform(passes.uniforms.mvp_matrix, UniformValue::Mat4(mvp));
                }
            }
            emit_batch(batch, node.atlas(), &passes, renderer);
        }
    }

    fn passes(&self, projection: Mat4) -> Passes {
        let shadow = self.shadow.enabled.then(|| {
            let rgb = self.shadow.color;
            let displayed = lumen_text::Color3B::new(
                super::letters::mul_u8(rgb.r, self.parent_color.r),
                super::letters::mul_u8(rgb.g, self.parent_color.g),
                super::letters::mul_u8(rgb.b, self.parent_color.b),
            );
            let opacity = (self.shadow.color_f.a * f32::from(self.displayed_opacity)) as u8;
            ShadowPass {
                mvp: projection * self.shadow.transform,
                color: color_vec4(self.shadow.color_f),
                quad_color: self.vertex_color(displayed, opacity),
            }
        });
        Passes {
            label_type: self.label_type,
            effect: self.current_effect,
            uniforms: self.uniforms,
            global_z: self.node.global_z,
            distance_field: self.use_distance_field,
            effect_color: color_vec4(self.effect_color),
            outline_width: if self.outline_size > 0.0 { self.outline_size } else { self.font_config.outline_size },
            shadow,
        }
    }

    fn update_blend_state(&mut self) {
        self.set_opacity_modify_rgb(self.blend_func != BlendFunc::ALPHA_NON_PREMULTIPLIED);
        let blend = self.blend_func;
        for batch in &mut self.batch_commands {
            for command in batch.commands_mut() {
                command.set_blend(blend);
            }
        }
        for command in &mut self.quad_commands {
            command.blend = blend;
        }
    }

    fn draw_text_sprites(&self, renderer: &mut dyn Renderer) {
        let color = self.displayed_color4b();
        if self.shadow.enabled {
            if let Some(shadow) = &self.shadow_sprite {
                let offset = Mat4::from_translation(self.shadow.offset.extend(0.0));
                let command = self.sprite_command(shadow, self.model_view * offset, color);
                renderer.add_command(RenderCommand::Sprite(&command));
            }
        }
        if let Some(text) = &self.text_sprite {
            let command = self.sprite_command(text, self.model_view, color);
            renderer.add_command(RenderCommand::Sprite(&command));
        }
    }

    fn sprite_command(&self, sprite: &StringTexture, transform: Mat4, color: Color4B) -> SpriteCommand {
        let blend = if self.blend_func_dirty {
            self.blend_func
        } else if sprite.texture.premultiplied_alpha {
            BlendFunc::ALPHA_PREMULTIPLIED
        } else {
            BlendFunc::ALPHA_NON_PREMULTIPLIED
        };
        SpriteCommand {
            texture: sprite.texture.id,
            quad: sprite_quad(sprite.size, color),
            transform,
            blend,
            global_z: self.node.global_z,
        }
    }
}

/// Bottom-left anchored quad covering the whole texture.
fn sprite_quad(size: Vec2, color: Color4B) -> Quad {
    let color = color.to_array();
    let vertex = |x: f32, y: f32, u: f32, v: f32| Vertex { position: [x, y, 0.0], color, tex_coords: [u, v] };
    Quad {
        tl: vertex(0.0, size.y, 0.0, 0.0),
        bl: vertex(0.0, 0.0, 0.0, 1.0),
        tr: vertex(size.x, size.y, 1.0, 0.0),
        br: vertex(size.x, 0.0, 1.0, 1.0),
    }
}

/// Shadow → outline → text for one page.
fn emit_batch(batch: &mut BatchCommand, atlas: &QuadAtlas, passes: &Passes, renderer: &mut dyn Renderer) {
    let u = passes.uniforms;
    batch.text.update_buffer(atlas);

    if let Some(shadow) = &passes.shadow {
        batch.shadow.update_buffer(atlas);
        if let Some(state) = batch.shadow.program_state_mut() {
            state.set_uniform(u.mvp_matrix, UniformValue::Mat4(shadow.mvp));
        }
    }

    if passes.label_type == LabelType::Ttf {
        match passes.effect {
            LabelEffect::Outline => {
                if let Some(shadow) = &passes.shadow {
                    if let Some(state) = batch.shadow.program_state_mut() {
                        state.set_uniform(u.effect_color, UniformValue::Vec4(shadow.color));
                        state.set_uniform(u.effect_type, UniformValue::Int(2));
                    }
                    batch.shadow.init(passes.global_z);
                    renderer.add_command(RenderCommand::Custom(&batch.shadow));
                }

                let mut effect_color = passes.effect_color;
                if passes.distance_field {
                    effect_color.w = passes.outline_width;
                    if let Some(state) = batch.text.program_state_mut() {
                        state.set_uniform(u.effect_color, UniformValue::Vec4(effect_color));
                    }
                } else {
                    batch.outline.update_buffer(atlas);
                    if let Some(state) = batch.outline.program_state_mut() {
                        state.set_uniform(u.effect_color, UniformValue::Vec4(effect_color));
                        state.set_uniform(u.effect_type, UniformValue::Int(1));
                    }
                    batch.outline.init(passes.global_z);
                    renderer.add_command(RenderCommand::Custom(&batch.outline));

                    if let Some(state) = batch.text.program_state_mut() {
                        state.set_uniform(u.effect_color, UniformValue::Vec4(effect_color));
                        state.set_uniform(u.effect_type, UniformValue::Int(0));
                    }
                }
            }
            LabelEffect::Normal => {
                if let Some(shadow) = &passes.shadow {
                    if let Some(state) = batch.shadow.program_state_mut() {
                        state.set_uniform(u.text_color, UniformValue::Vec4(shadow.color));
                    }
                    batch.shadow.init(passes.global_z);
                    renderer.add_command(RenderCommand::Custom(&batch.shadow));
                }
            }
            LabelEffect::Glow => {
                if let Some(shadow) = &passes.shadow {
                    if let Some(state) = batch.shadow.program_state_mut() {
                        state.set_uniform(u.text_color, UniformValue::Vec4(shadow.color));
                        state.set_uniform(u.effect_color, UniformValue::Vec4(shadow.color));
                    }
                    batch.shadow.init(passes.global_z);
                    renderer.add_command(RenderCommand::Custom(&batch.shadow));
                }
                if let Some(state) = batch.text.program_state_mut() {
                    state.set_uniform(u.effect_color, UniformValue::Vec4(passes.effect_color));
                }
            }
            _ => {}
        }
    } else if let Some(shadow) = &passes.shadow {
        let recolored: Vec<Quad> = atlas
            .quads()
            .iter()
            .map(|quad| {
                let mut quad = *quad;
                let hidden = quad.alpha() == 0;
                quad.set_color(shadow.quad_color);
                if hidden {
                    quad.set_alpha(0);
                }
                quad
            })
            .collect();
        batch.shadow.update_vertices(&recolored);
        batch.shadow.init(passes.global_z);
        renderer.add_command(RenderCommand::Custom(&batch.shadow));
    }

    batch.text.init(passes.global_z);
    renderer.add_command(RenderCommand::Custom(&batch.text));
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use lumen_text::TtfConfig;

    use super::*;
    use crate::testing::{CommandKind, FixedGlyphProvider, RecordingRenderer};

    fn ttf_label(text: &str) -> Label {
        let provider = Rc::new(RefCell::new(FixedGlyphProvider::new()));
        let mut label = Label::new(provider);
        label.set_ttf_config(&TtfConfig::new("mono", 20.0)).unwrap();
        label.set_string(text);
        label
    }

    fn kinds(renderer: &RecordingRenderer) -> Vec<CommandKind> {
        renderer.commands.iter().map(|c| c.kind).collect()
    }

    #[test]
    fn test_plain_text_single_command() {
        let mut label = ttf_label("abc");
        let mut renderer = RecordingRenderer::default();
        label.visit(&mut renderer, &Mat4::IDENTITY, DrawFlags::empty());
        assert_eq!(kinds(&renderer), vec![CommandKind::Custom]);
        assert_eq!(renderer.commands[0].quad_count, 3);
    }

    #[test]
    fn test_shadow_outline_text_order() {
        let mut label = ttf_label("abc");
        label.enable_outline(Color4B::new(255, 0, 0, 255), 2.0);
        label.enable_shadow(Color4B::BLACK, Vec2::new(2.0, -2.0));
        let mut renderer = RecordingRenderer::default();
        label.visit(&mut renderer, &Mat4::IDENTITY, DrawFlags::empty());
        let effect_types: Vec<Option<i32>> = renderer.commands.iter().map(|c| c.effect_type).collect();
        assert_eq!(effect_types, vec![Some(2), Some(1), Some(0)]);
    }

    #[test]
    fn test_invisible_or_empty_emits_nothing() {
        let mut label = ttf_label("");
        let mut renderer = RecordingRenderer::default();
        label.visit(&mut renderer, &Mat4::IDENTITY, DrawFlags::empty());
        assert!(renderer.commands.is_empty());

        label.set_string("a");
        label.set_visible(false);
        label.visit(&mut renderer, &Mat4::IDENTITY, DrawFlags::empty());
        assert!(renderer.commands.is_empty());
    }

    #[test]
    fn test_cull_result_reused_until_moved() {
        let mut label = ttf_label("abc");
        let mut renderer = RecordingRenderer::default();
        renderer.visible = false;
        label.visit(&mut renderer, &Mat4::IDENTITY, DrawFlags::empty());
        assert!(renderer.commands.is_empty());
        assert_eq!(renderer.visibility_checks, 1);

        renderer.visible = true;
        label.visit(&mut renderer, &Mat4::IDENTITY, DrawFlags::empty());
        assert!(renderer.commands.is_empty());
        assert_eq!(renderer.visibility_checks, 1);

        label.set_position(Vec2::new(1.0, 0.0));
        label.visit(&mut renderer, &Mat4::IDENTITY, DrawFlags::empty());
        assert_eq!(renderer.visibility_checks, 2);
        assert_eq!(renderer.commands.len(), 1);
    }

    #[test]
    fn test_underline_follows_text() {
        let mut label = ttf_label("ab");
        label.enable_underline();
        let mut renderer = RecordingRenderer::default();
        label.visit(&mut renderer, &Mat4::IDENTITY, DrawFlags::empty());
        assert_eq!(kinds(&renderer), vec![CommandKind::Custom, CommandKind::Line]);
        assert_eq!(renderer.commands[1].segments.len(), 1);
    }

    #[test]
    fn test_emission_keeps_layout() {
        let mut label = ttf_label("ab\ncd");
        label.ensure_layout();
        let before = label.letters_info().to_vec();
        let mut renderer = RecordingRenderer::default();
        label.visit(&mut renderer, &Mat4::IDENTITY, DrawFlags::empty());
        label.visit(&mut renderer, &Mat4::IDENTITY, DrawFlags::TRANSFORM_DIRTY);
        assert_eq!(label.letters_info(), &before[..]);
    }
}
