//! Effect → program selection and per-command program state.
//!
//! Programs are identified by [`ProgramType`]; the GPU side compiles them.
//! A [`ProgramState`] holds the uniform values and texture binding for one
//! draw command. Uniform slots are looked up once per program change into
//! [`UniformLocations`]; a program that lacks a uniform reports `None` and
//! writes to that slot are ignored.

use glam::{Mat4, Vec4};
use lumen_text::TextureId;

/// Rendering strategy of a label.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum LabelType {
    /// Whole string rendered to one texture by a system font.
    #[default]
    StringTexture,
    Ttf,
    BmFont,
    CharMap,
}

/// Label effects. Outline and glow are exclusive "current effect" states;
/// the rest are toggles.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum LabelEffect {
    #[default]
    Normal,
    Outline,
    Glow,
    Shadow,
    Italics,
    Bold,
    Underline,
    Strikethrough,
    All,
}

/// Built-in programs used by labels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ProgramType {
    /// Plain textured, vertex-colored quads.
    PositionTextureColor,
    /// Alpha-only glyph texture tinted by the text color.
    LabelNormal,
    /// Coverage-bitmap outline; drawn as a separate outline pass.
    LabelOutline,
    LabelDistanceFieldNormal,
    LabelDistanceFieldOutline,
    LabelDistanceFieldGlow,
}

/// Uniforms a label program may expose.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Uniform {
    MvpMatrix,
    Texture,
    TextColor,
    EffectColor,
    EffectType,
}

impl ProgramType {
    /// Uniforms declared by this program, in slot order.
    pub fn uniforms(self) -> &'static [Uniform] {
        use Uniform::*;
        match self {
            ProgramType::PositionTextureColor => &[MvpMatrix, Texture],
            ProgramType::LabelNormal | ProgramType::LabelDistanceFieldNormal => {
                &[MvpMatrix, Texture, TextColor]
            }
            ProgramType::LabelOutline => &[MvpMatrix, Texture, TextColor, EffectColor, EffectType],
            ProgramType::LabelDistanceFieldOutline | ProgramType::LabelDistanceFieldGlow => {
                &[MvpMatrix, Texture, TextColor, EffectColor]
            }
        }
    }

    pub fn location(self, uniform: Uniform) -> Option<UniformLocation> {
        self.uniforms()
            .iter()
            .position(|&u| u == uniform)
            .map(UniformLocation)
    }
}

/// Slot of a uniform inside its program.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct UniformLocation(pub usize);

/// Cached slots for the uniforms labels write every frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct UniformLocations {
    pub mvp_matrix: Option<UniformLocation>,
    pub texture: Option<UniformLocation>,
    pub text_color: Option<UniformLocation>,
    pub effect_color: Option<UniformLocation>,
    pub effect_type: Option<UniformLocation>,
}

impl UniformLocations {
    pub fn of(program: ProgramType) -> Self {
        Self {
            mvp_matrix: program.location(Uniform::MvpMatrix),
            texture: program.location(Uniform::Texture),
            text_color: program.location(Uniform::TextColor),
            effect_color: program.location(Uniform::EffectColor),
            effect_type: program.location(Uniform::EffectType),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum UniformValue {
    Mat4(Mat4),
    Vec4(Vec4),
    Int(i32),
}

/// Uniform values and texture binding for one draw command.
#[derive(Clone, Debug, PartialEq)]
pub struct ProgramState {
    program: ProgramType,
    values: Vec<Option<UniformValue>>,
    texture: Option<TextureId>,
}

impl ProgramState {
    pub fn new(program: ProgramType) -> Self {
        Self {
            program,
            values: vec![None; program.uniforms().len()],
            texture: None,
        }
    }

    pub fn program(&self) -> ProgramType {
        self.program
    }

    pub fn location(&self, uniform: Uniform) -> Option<UniformLocation> {
        self.program.location(uniform)
    }

    /// Write a uniform; a missing location is ignored.
    pub fn set_uniform(&mut self, location: Option<UniformLocation>, value: UniformValue) {
        if let Some(slot) = location.and_then(|UniformLocation(i)| self.values.get_mut(i)) {
            *slot = Some(value);
        }
    }

    pub fn uniform(&self, uniform: Uniform) -> Option<UniformValue> {
        let UniformLocation(i) = self.location(uniform)?;
        self.values.get(i).copied().flatten()
    }

    pub fn set_texture(&mut self, texture: TextureId) {
        self.texture = Some(texture);
    }

    pub fn texture(&self) -> Option<TextureId> {
        self.texture
    }
}

/// Pick the program for a label configuration.
///
/// `None` means "keep the current program": glow without distance fields
/// and effects that are not program states (shadow, bold, ...).
pub fn select_program(
    label_type: LabelType,
    effect: LabelEffect,
    distance_field: bool,
    a8: bool,
) -> Option<ProgramType> {
    match label_type {
        LabelType::BmFont | LabelType::CharMap => Some(ProgramType::PositionTextureColor),
        LabelType::Ttf | LabelType::StringTexture => match effect {
            LabelEffect::Normal if distance_field => Some(ProgramType::LabelDistanceFieldNormal),
            LabelEffect::Normal if a8 => Some(ProgramType::LabelNormal),
            LabelEffect::Normal => Some(ProgramType::PositionTextureColor),
            LabelEffect::Outline if distance_field => Some(ProgramType::LabelDistanceFieldOutline),
            LabelEffect::Outline => Some(ProgramType::LabelOutline),
            LabelEffect::Glow if distance_field => Some(ProgramType::LabelDistanceFieldGlow),
            LabelEffect::Glow
            | LabelEffect::Shadow
            | LabelEffect::Italics
            | LabelEffect::Bold
            | LabelEffect::Underline
            | LabelEffect::Strikethrough
            | LabelEffect::All => None,
        },
    }
}
