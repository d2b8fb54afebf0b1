//! Text styling vocabulary shared by the font side and the label core:
//! alignment, overflow policy, colors, and the two font request records
//! ([`TtfConfig`] for atlas fonts, [`FontDefinition`] for system fonts).

use glam::Vec2;

// ── Alignment & overflow ────────────────────────────────────────────

/// Horizontal text alignment.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum TextHAlignment {
    #[default]
    Left,
    Center,
    Right,
}

/// Vertical text alignment.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum TextVAlignment {
    #[default]
    Top,
    Center,
    Bottom,
}

/// What happens when text does not fit the label dimensions.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Overflow {
    /// Text may spill outside the label box.
    #[default]
    None,
    /// Glyphs outside the box are dropped from rendering.
    Clamp,
    /// The font size is reduced until the text fits.
    Shrink,
    /// The height follows the wrapped text; width is fixed.
    ResizeHeight,
}

// ── Colors ──────────────────────────────────────────────────────────

/// 8-bit RGB color.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Color3B {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color3B {
    pub const WHITE: Self = Self::new(255, 255, 255);
    pub const BLACK: Self = Self::new(0, 0, 0);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

impl Default for Color3B {
    fn default() -> Self {
        Self::WHITE
    }
}

/// 8-bit RGBA color, the vertex color format.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Color4B {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color4B {
    pub const WHITE: Self = Self::new(255, 255, 255, 255);
    pub const BLACK: Self = Self::new(0, 0, 0, 255);
    pub const TRANSPARENT: Self = Self::new(0, 0, 0, 0);

    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub fn rgb(self) -> Color3B {
        Color3B::new(self.r, self.g, self.b)
    }

    pub fn to_array(self) -> [u8; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

impl Default for Color4B {
    fn default() -> Self {
        Self::WHITE
    }
}

impl From<Color3B> for Color4B {
    fn from(c: Color3B) -> Self {
        Self::new(c.r, c.g, c.b, 255)
    }
}

impl From<Color4F> for Color4B {
    fn from(c: Color4F) -> Self {
        let q = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
        Self::new(q(c.r), q(c.g), q(c.b), q(c.a))
    }
}

/// Floating-point RGBA color, each channel in [0.0, 1.0]. Used for
/// uniforms (text color, effect color).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Color4F {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color4F {
    pub const WHITE: Self = Self::new(1.0, 1.0, 1.0, 1.0);
    pub const BLACK: Self = Self::new(0.0, 0.0, 0.0, 1.0);

    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    pub fn to_array(self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

impl Default for Color4F {
    fn default() -> Self {
        Self::WHITE
    }
}

impl From<Color4B> for Color4F {
    fn from(c: Color4B) -> Self {
        Self::new(
            c.r as f32 / 255.0,
            c.g as f32 / 255.0,
            c.b as f32 / 255.0,
            c.a as f32 / 255.0,
        )
    }
}

impl From<Color3B> for Color4F {
    fn from(c: Color3B) -> Self {
        Color4B::from(c).into()
    }
}

// ── Font requests ───────────────────────────────────────────────────

/// TrueType font configuration. Two configs with equal fields share one
/// atlas in the cache.
#[derive(Clone, Debug, PartialEq)]
pub struct TtfConfig {
    /// Path to a font file, or a family name known to the font database.
    pub font_file: String,
    /// Font size in pixels.
    pub font_size: f32,
    /// Outline thickness in pixels; 0 disables the outline rasterization.
    pub outline_size: f32,
    /// Rasterize signed distance fields instead of coverage bitmaps.
    pub distance_field_enabled: bool,
    pub italics: bool,
    pub bold: bool,
    pub underline: bool,
    pub strikethrough: bool,
}

impl TtfConfig {
    pub fn new(font_file: impl Into<String>, font_size: f32) -> Self {
        Self {
            font_file: font_file.into(),
            font_size,
            ..Default::default()
        }
    }
}

impl Default for TtfConfig {
    fn default() -> Self {
        Self {
            font_file: String::new(),
            font_size: 12.0,
            outline_size: 0.0,
            distance_field_enabled: false,
            italics: false,
            bold: false,
            underline: false,
            strikethrough: false,
        }
    }
}

/// Stroke around system-font text.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StrokeDefinition {
    pub color: Color3B,
    pub alpha: u8,
    pub size: f32,
}

/// Request for rendering a whole string with a platform/system font.
#[derive(Clone, Debug, PartialEq)]
pub struct FontDefinition {
    pub font_name: String,
    pub font_size: f32,
    pub h_alignment: TextHAlignment,
    pub v_alignment: TextVAlignment,
    /// Box size; a zero component means "fit the text".
    pub dimensions: Vec2,
    pub fill_color: Color3B,
    pub font_alpha: u8,
    pub enable_wrap: bool,
    pub overflow: Overflow,
    pub line_spacing: f32,
    pub stroke: Option<StrokeDefinition>,
}

impl Default for FontDefinition {
    fn default() -> Self {
        Self {
            font_name: String::from("sans-serif"),
            font_size: 12.0,
            h_alignment: TextHAlignment::Left,
            v_alignment: TextVAlignment::Top,
            dimensions: Vec2::ZERO,
            fill_color: Color3B::WHITE,
            font_alpha: 255,
            enable_wrap: true,
            overflow: Overflow::None,
            line_spacing: 0.0,
            stroke: None,
        }
    }
}

// ===================================================================
// Tests
// ===================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alignment_defaults() {
        assert_eq!(TextHAlignment::default(), TextHAlignment::Left);
        assert_eq!(TextVAlignment::default(), TextVAlignment::Top);
        assert_eq!(Overflow::default(), Overflow::None);
    }

    #[test]
    fn test_color_conversions() {
        let c = Color4F::from(Color4B::new(255, 0, 51, 255));
        assert!((c.r - 1.0).abs() < 1e-6);
        assert!((c.b - 0.2).abs() < 1e-6);
        assert_eq!(Color4B::from(c), Color4B::new(255, 0, 51, 255));
        assert_eq!(Color4B::from(Color3B::BLACK), Color4B::BLACK);
    }

    #[test]
    fn test_color4f_to_color4b_clamps() {
        let c = Color4B::from(Color4F::new(2.0, -1.0, 0.5, 1.0));
        assert_eq!(c, Color4B::new(255, 0, 128, 255));
    }

    #[test]
    fn test_ttf_config_new() {
        let cfg = TtfConfig::new("fonts/arial.ttf", 24.0);
        assert_eq!(cfg.font_file, "fonts/arial.ttf");
        assert_eq!(cfg.font_size, 24.0);
        assert!(!cfg.distance_field_enabled);
        assert_eq!(cfg.outline_size, 0.0);
    }
}
