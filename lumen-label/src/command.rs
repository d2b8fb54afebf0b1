//! Draw commands handed to the external renderer.
//!
//! Commands are owned by the label and lent to the renderer for the frame
//! through [`RenderCommand`]. Vertex and index storage in a
//! [`CustomCommand`] only grows; a smaller batch reuses the allocation.

use glam::{Mat4, Vec2, Vec4};
use lumen_text::{Color4B, Color4F, TextureId};

use crate::quad::{Quad, QuadAtlas};
use crate::shader::ProgramState;

// ── Blending ────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BlendFactor {
    Zero,
    One,
    SrcAlpha,
    OneMinusSrcAlpha,
    DstColor,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BlendFunc {
    pub src: BlendFactor,
    pub dst: BlendFactor,
}

impl BlendFunc {
    pub const DISABLE: Self = Self { src: BlendFactor::One, dst: BlendFactor::Zero };
    pub const ALPHA_PREMULTIPLIED: Self = Self { src: BlendFactor::One, dst: BlendFactor::OneMinusSrcAlpha };
    pub const ALPHA_NON_PREMULTIPLIED: Self = Self { src: BlendFactor::SrcAlpha, dst: BlendFactor::OneMinusSrcAlpha };
    pub const ADDITIVE: Self = Self { src: BlendFactor::SrcAlpha, dst: BlendFactor::One };

    /// Blend state the pipeline actually uses: anything but straight alpha
    /// is drawn as premultiplied.
    pub fn pipeline_blend(self) -> Self {
        if self == Self::ALPHA_NON_PREMULTIPLIED {
            self
        } else {
            Self::ALPHA_PREMULTIPLIED
        }
    }
}

impl Default for BlendFunc {
    fn default() -> Self {
        Self::ALPHA_PREMULTIPLIED
    }
}

// ── Commands ────────────────────────────────────────────────────────

/// Indexed-triangle draw with its own buffers and program state.
#[derive(Clone, Debug, Default)]
pub struct CustomCommand {
    program_state: Option<ProgramState>,
    blend: BlendFunc,
    global_z: f32,
    vertices: Vec<Quad>,
    indices: Vec<u16>,
    vertex_capacity: usize,
    index_count: usize,
}

impl CustomCommand {
    pub fn init(&mut self, global_z: f32) {
        self.global_z = global_z;
    }

    pub fn global_z(&self) -> f32 {
        self.global_z
    }

    pub fn program_state(&self) -> Option<&ProgramState> {
        self.program_state.as_ref()
    }

    pub fn program_state_mut(&mut self) -> Option<&mut ProgramState> {
        self.program_state.as_mut()
    }

    pub fn set_program_state(&mut self, state: ProgramState) {
        self.program_state = Some(state);
    }

    pub fn blend(&self) -> BlendFunc {
        self.blend
    }

    pub fn set_blend(&mut self, blend: BlendFunc) {
        self.blend = blend;
    }

    /// Quads the current buffers can hold without reallocating.
    pub fn vertex_capacity(&self) -> usize {
        self.vertex_capacity
    }

    pub fn index_count(&self) -> usize {
        self.index_count
    }

    pub fn vertices(&self) -> &[Quad] {
        &self.vertices
    }

    pub fn indices(&self) -> &[u16] {
        &self.indices
    }

    /// Copy the atlas contents into this command, growing the buffers if
    /// the atlas holds more quads than fit.
    pub fn update_buffer(&mut self, atlas: &QuadAtlas) {
        let total = atlas.total_quads();
        if total > self.vertex_capacity {
            self.vertex_capacity = total;
            self.vertices.reserve(total.saturating_sub(self.vertices.len()));
            self.indices.reserve((total * 6).saturating_sub(self.indices.len()));
        }
        self.update_vertices(atlas.quads());
        self.indices.clear();
        self.indices.extend_from_slice(atlas.indices());
        self.index_count = total * 6;
    }

    /// Replace vertex contents only.
    pub fn update_vertices(&mut self, quads: &[Quad]) {
        self.vertices.clear();
        self.vertices.extend_from_slice(quads);
    }
}

/// Per-page trio of draw commands.
#[derive(Clone, Debug, Default)]
pub struct BatchCommand {
    pub text: CustomCommand,
    pub shadow: CustomCommand,
    pub outline: CustomCommand,
}

impl BatchCommand {
    /// Give each command its own copy of `state`.
    pub fn set_program_state(&mut self, state: &ProgramState) {
        self.text.set_program_state(state.clone());
        self.shadow.set_program_state(state.clone());
        self.outline.set_program_state(state.clone());
    }

    pub fn commands_mut(&mut self) -> [&mut CustomCommand; 3] {
        [&mut self.text, &mut self.shadow, &mut self.outline]
    }
}

/// Single-texture quad draw; the renderer applies `transform` on the CPU.
#[derive(Clone, Debug, Default)]
pub struct QuadCommand {
    pub program_state: Option<ProgramState>,
    pub texture: Option<TextureId>,
    pub blend: BlendFunc,
    pub global_z: f32,
    pub quads: Vec<Quad>,
    pub transform: Mat4,
}

impl QuadCommand {
    pub fn init(
        &mut self,
        global_z: f32,
        texture: TextureId,
        blend: BlendFunc,
        quads: &[Quad],
        transform: Mat4,
    ) {
        self.global_z = global_z;
        self.texture = Some(texture);
        self.blend = blend;
        self.quads.clear();
        self.quads.extend_from_slice(quads);
        self.transform = transform;
    }
}

/// A whole-string texture drawn as one sprite (system fonts).
#[derive(Clone, Debug, PartialEq)]
pub struct SpriteCommand {
    pub texture: TextureId,
    pub quad: Quad,
    pub transform: Mat4,
    pub blend: BlendFunc,
    pub global_z: f32,
}

/// Straight line segments of one width (underline / strikethrough).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LineCommand {
    pub segments: Vec<(Vec2, Vec2)>,
    pub width: f32,
    pub color: Color4F,
    pub transform: Mat4,
    pub global_z: f32,
}

impl LineCommand {
    pub fn clear(&mut self) {
        self.segments.clear();
    }

    pub fn draw_line(&mut self, from: Vec2, to: Vec2) {
        self.segments.push((from, to));
    }
}

/// A command lent to the renderer for the current frame.
#[derive(Clone, Copy, Debug)]
pub enum RenderCommand<'a> {
    Custom(&'a CustomCommand),
    Quad(&'a QuadCommand),
    Sprite(&'a SpriteCommand),
    Line(&'a LineCommand),
}

/// The external renderer.
pub trait Renderer {
    /// Current projection matrix.
    fn projection(&self) -> Mat4;

    /// Whether a box of `size` under `transform` intersects the view.
    fn check_visibility(&mut self, transform: &Mat4, size: Vec2) -> bool;

    /// The visiting camera moved since the last frame.
    fn camera_updated(&self) -> bool {
        false
    }

    fn add_command(&mut self, command: RenderCommand<'_>);
}

/// Straight color → uniform vector.
pub(crate) fn color_vec4(color: Color4F) -> Vec4 {
    Vec4::from_array(color.to_array())
}

/// Byte color → normalized uniform vector.
pub(crate) fn color4b_vec4(color: Color4B) -> Vec4 {
    color_vec4(Color4F::from(color))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shader::{ProgramType, Uniform, UniformValue};

    fn atlas_with(n: usize) -> QuadAtlas {
        let mut atlas = QuadAtlas::default();
        for _ in 0..n {
            atlas.push(Quad::default());
        }
        atlas
    }

    #[test]
    fn test_buffers_grow_only() {
        let mut cmd = CustomCommand::default();
        cmd.update_buffer(&atlas_with(4));
        assert_eq!(cmd.vertex_capacity(), 4);
        assert_eq!(cmd.index_count(), 24);

        cmd.update_buffer(&atlas_with(2));
        assert_eq!(cmd.vertex_capacity(), 4);
        assert_eq!(cmd.vertices().len(), 2);
        assert_eq!(cmd.index_count(), 12);

        cmd.update_buffer(&atlas_with(9));
        assert_eq!(cmd.vertex_capacity(), 9);
    }

    #[test]
    fn test_batch_gets_independent_states() {
        let mut batch = BatchCommand::default();
        let state = ProgramState::new(ProgramType::LabelOutline);
        batch.set_program_state(&state);
        let loc = state.location(Uniform::EffectType);
        if let Some(s) = batch.outline.program_state_mut() {
            s.set_uniform(loc, UniformValue::Int(1));
        }
        assert_eq!(batch.text.program_state().and_then(|s| s.uniform(Uniform::EffectType)), None);
        assert_eq!(
            batch.outline.program_state().and_then(|s| s.uniform(Uniform::EffectType)),
            Some(UniformValue::Int(1))
        );
    }

    #[test]
    fn test_pipeline_blend() {
        assert_eq!(BlendFunc::ADDITIVE.pipeline_blend(), BlendFunc::ALPHA_PREMULTIPLIED);
        assert_eq!(
            BlendFunc::ALPHA_NON_PREMULTIPLIED.pipeline_blend(),
            BlendFunc::ALPHA_NON_PREMULTIPLIED
        );
    }
}
