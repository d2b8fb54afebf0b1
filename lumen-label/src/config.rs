//! Label defaults.

use glam::Vec2;

/// Bounds for the shrink-to-fit search.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ShrinkPolicy {
    /// Font size decrement per attempt.
    pub step: f32,
    /// Smallest font size the search may settle on.
    pub min_font_size: f32,
    /// Hard cap on attempts per search.
    pub max_iterations: u32,
}

impl Default for ShrinkPolicy {
    fn default() -> Self {
        Self {
            step: 1.0,
            min_font_size: 1.0,
            max_iterations: 256,
        }
    }
}

/// Per-label configuration. Every label copies its settings at creation.
#[derive(Clone, Debug)]
pub struct LabelSettings {
    /// System font used when no atlas font has been set.
    pub default_system_font: String,
    pub default_system_font_size: f32,
    /// Device content scale; divides BMFont design sizes.
    pub content_scale_factor: f32,
    /// Skew applied by the italics effect, in degrees.
    pub italic_skew_degrees: f32,
    /// Extra kerning applied by the bold effect.
    pub bold_kerning: f32,
    /// Offset of the shadow that emulates bold.
    pub bold_shadow_offset: Vec2,
    pub default_shadow_offset: Vec2,
    /// Skip the renderer visibility test entirely when false.
    pub culling_enabled: bool,
    pub shrink: ShrinkPolicy,
}

impl Default for LabelSettings {
    fn default() -> Self {
        Self {
            default_system_font: String::from("Helvetica"),
            default_system_font_size: 12.0,
            content_scale_factor: 1.0,
            italic_skew_degrees: 12.0,
            bold_kerning: 1.0,
            bold_shadow_offset: Vec2::new(0.9, 0.0),
            default_shadow_offset: Vec2::new(2.0, -2.0),
            culling_enabled: true,
            shrink: ShrinkPolicy::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_default() {
        let settings = LabelSettings::default();
        assert_eq!(settings.default_system_font, "Helvetica");
        assert_eq!(settings.italic_skew_degrees, 12.0);
        assert_eq!(settings.bold_shadow_offset, Vec2::new(0.9, 0.0));
        assert!(settings.culling_enabled);
    }

    #[test]
    fn test_shrink_policy_default_is_bounded() {
        let policy = ShrinkPolicy::default();
        assert!(policy.step > 0.0);
        assert!(policy.min_font_size > 0.0);
        assert!(policy.max_iterations > 0);
    }
}
