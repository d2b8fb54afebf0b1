//! The `Label` facade.
//!
//! A label owns at most one font atlas reference, the per-page batches
//! built from it, and the layout of its current string. Mutators only mark
//! state dirty; [`Label::ensure_layout`] (called by every accessor that
//! depends on geometry, and by [`Label::visit`]) runs the pending work.
//!
//! ```text
//! setter ──► content_dirty / system_font_dirty
//!                     │
//!          ensure_layout / visit
//!                     ▼
//!              update_content ──► align_text ──► layout_text
//!                     │                  │
//!                     │                  ├──► shrink (vertical, horizontal)
//!                     │                  └──► update_quads ──► letters, colors
//!                     └──► system-font sprite (no atlas)
//! ```

mod draw;
mod effects;
mod letters;

use std::collections::BTreeMap;
use std::rc::Rc;

use glam::{Mat4, Vec2};
use log::{debug, warn};
use lumen_text::{
    AtlasEvent, AtlasHandle, AtlasId, AtlasMailbox, AtlasObserver, CharMapSource, Color3B,
    Color4B, Color4F, FontDefinition, FontError, Overflow, SharedProvider, StringTexture,
    StrokeDefinition, SubscriptionId, TextHAlignment, TextVAlignment, TtfConfig,
};

use crate::command::{BatchCommand, BlendFunc, LineCommand, QuadCommand};
use crate::config::LabelSettings;
use crate::layout::{
    is_horizontal_clamp, is_vertical_clamp, layout_text, shrink_font_size, LayoutParams,
    LetterInfo, TextLayout,
};
use crate::node::{NodeState, Rect};
use crate::quad::BatchNode;
use crate::shader::{select_program, LabelEffect, LabelType, ProgramState, UniformLocations};

pub use letters::{LetterMut, LetterState};

/// Shadow parameters and the cached shadow transform.
#[derive(Clone, Debug)]
struct Shadow {
    enabled: bool,
    /// `transform` needs recomputing.
    dirty: bool,
    /// Label-space offset of the shadow copy.
    offset: Vec2,
    color: Color3B,
    opacity: u8,
    /// `color` and `opacity` as the shader uniform.
    color_f: Color4F,
    /// Model-view of the shadow pass.
    transform: Mat4,
}

impl Default for Shadow {
    fn default() -> Self {
        Self {
            enabled: false,
            dirty: false,
            offset: Vec2::ZERO,
            color: Color3B::BLACK,
            opacity: 255,
            color_f: Color4F::BLACK,
            transform: Mat4::IDENTITY,
        }
    }
}

/// What the bold effect changed, so it can be undone exactly.
#[derive(Clone, Debug, Default)]
struct Bold {
    enabled: bool,
    /// Kerning bold added on top of the user's.
    kerning: f32,
    /// Bold's white shadow is the one currently applied.
    owns_shadow: bool,
    /// Shadow that was active before bold replaced it.
    previous_shadow: Option<(Color4B, Vec2)>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ClampCheck {
    Vertical,
    Horizontal,
}

/// A text label.
pub struct Label {
    settings: LabelSettings,
    /// Source of atlases and system-font textures.
    provider: SharedProvider,
    /// Purge/reset notifications queued by the provider.
    mailbox: Rc<AtlasMailbox>,
    subscription: SubscriptionId,

    node: NodeState,
    /// Parent transform times node transform, refreshed when dirty.
    model_view: Mat4,

    // Font
    label_type: LabelType,
    /// The one atlas reference this label holds.
    atlas: Option<AtlasHandle>,
    /// Atlas dropped on purge, awaiting its reset event.
    purged_atlas: Option<AtlasId>,
    font_config: TtfConfig,
    /// Size requested by the user; shrinking never changes it.
    original_font_size: f32,
    use_distance_field: bool,
    /// Atlas pages hold alpha-only glyphs.
    use_a8_shader: bool,
    bmfont_path: String,
    /// Offset added to BMFont texture coordinates.
    bmfont_offset: Vec2,
    /// Render size of a BMFont; negative until a font is set.
    bmfont_size: f32,
    system_font: String,
    system_font_size: f32,

    // Text and layout inputs
    utf8_text: String,
    /// `utf8_text` as code points; layout indexes into this.
    text: Vec<char>,
    h_alignment: TextHAlignment,
    v_alignment: TextVAlignment,
    /// Wrap width when no fixed width is set.
    max_line_width: f32,
    /// Fixed box width; 0 fits the text.
    label_width: f32,
    /// Fixed box height; 0 fits the text.
    label_height: f32,
    line_height: f32,
    line_spacing: f32,
    additional_kerning: f32,
    /// Char wrap instead of word wrap.
    line_break_without_spaces: bool,
    enable_wrap: bool,
    overflow: Overflow,

    // Layout output
    /// Kerning before each code point of `text`.
    kernings: Vec<f32>,
    layout: TextLayout,
    /// Layout and quads are stale.
    content_dirty: bool,
    /// System font name or size changed; any atlas must go.
    system_font_dirty: bool,

    // Rendering
    /// One per atlas page.
    batch_nodes: Vec<BatchNode>,
    /// Shadow/outline/text commands, one triple per page.
    batch_commands: Vec<BatchCommand>,
    /// Plain quad commands for BMFont and char maps, one per page.
    quad_commands: Vec<QuadCommand>,
    program_state: Option<ProgramState>,
    uniforms: UniformLocations,
    blend_func: BlendFunc,
    /// Blend function set explicitly; atlas pages no longer pick it.
    blend_func_dirty: bool,
    opacity_modify_rgb: bool,
    /// Last culling answer.
    inside_bounds: bool,
    /// Whole-string texture for system fonts.
    text_sprite: Option<StringTexture>,
    shadow_sprite: Option<StringTexture>,
    /// Underline or strikethrough segments in label space.
    underline: LineCommand,

    // Effects
    /// Program-level effect (normal, outline or glow).
    current_effect: LabelEffect,
    /// Outline or glow color.
    effect_color: Color4F,
    outline_size: f32,
    /// Fill color for TTF and system-font glyphs.
    text_color: Color4B,
    shadow: Shadow,
    bold: Bold,
    underline_enabled: bool,
    strikethrough_enabled: bool,

    // Color
    /// Color set on this label.
    real_color: Color3B,
    /// `real_color` times the parent's color.
    displayed_color: Color3B,
    parent_color: Color3B,
    real_opacity: u8,
    displayed_opacity: u8,
    parent_opacity: u8,

    /// Materialized letter proxies, keyed by string index.
    letters: BTreeMap<usize, LetterState>,
}

impl Label {
    // ── Construction ────────────────────────────────────────────────

    /// An empty label using the default system font.
    pub fn new(provider: SharedProvider) -> Self {
        Self::with_settings(provider, LabelSettings::default())
    }

    pub fn with_settings(provider: SharedProvider, settings: LabelSettings) -> Self {
        let mailbox = AtlasMailbox::new();
        let observer: Rc<dyn AtlasObserver> = mailbox.clone();
        let subscription = provider.borrow_mut().subscribe(Rc::downgrade(&observer));

        let mut label = Self {
            system_font: settings.default_system_font.clone(),
            system_font_size: settings.default_system_font_size,
            settings,
            provider,
            mailbox,
            subscription,
            node: NodeState::default(),
            model_view: Mat4::IDENTITY,
            label_type: LabelType::StringTexture,
            atlas: None,
            purged_atlas: None,
            font_config: TtfConfig::default(),
            original_font_size: 0.0,
            use_distance_field: false,
            use_a8_shader: false,
            bmfont_path: String::new(),
            bmfont_offset: Vec2::ZERO,
            bmfont_size: -1.0,
            utf8_text: String::new(),
            text: Vec::new(),
            h_alignment: TextHAlignment::Left,
            v_alignment: TextVAlignment::Top,
            max_line_width: 0.0,
            label_width: 0.0,
            label_height: 0.0,
            line_height: 0.0,
            line_spacing: 0.0,
            additional_kerning: 0.0,
            line_break_without_spaces: false,
            enable_wrap: true,
            overflow: Overflow::None,
            kernings: Vec::new(),
            layout: TextLayout::default(),
            content_dirty: false,
            system_font_dirty: false,
            batch_nodes: Vec::new(),
            batch_commands: Vec::new(),
            quad_commands: Vec::new(),
            program_state: None,
            uniforms: UniformLocations::default(),
            blend_func: BlendFunc::ALPHA_PREMULTIPLIED,
            blend_func_dirty: false,
            opacity_modify_rgb: false,
            inside_bounds: true,
            text_sprite: None,
            shadow_sprite: None,
            underline: LineCommand::default(),
            current_effect: LabelEffect::Normal,
            effect_color: Color4F::BLACK,
            outline_size: 0.0,
            text_color: Color4B::WHITE,
            shadow: Shadow::default(),
            bold: Bold::default(),
            underline_enabled: false,
            strikethrough_enabled: false,
            real_color: Color3B::WHITE,
            displayed_color: Color3B::WHITE,
            parent_color: Color3B::WHITE,
            real_opacity: 255,
            displayed_opacity: 255,
            parent_opacity: 255,
            letters: BTreeMap::new(),
        };
        label.reset();
        label
    }

    /// A label rendered with a system font.
    pub fn with_system_font(
        provider: SharedProvider,
        text: &str,
        font: &str,
        font_size: f32,
        dimensions: Vec2,
        h_alignment: TextHAlignment,
        v_alignment: TextVAlignment,
    ) -> Self {
        let mut label = Self::new(provider);
        label.set_system_font_name(font);
        label.set_system_font_size(font_size);
        label.set_dimensions(dimensions.x, dimensions.y);
        label.set_string(text);
        label.set_alignment(h_alignment, v_alignment);
        label
    }

    /// A TrueType label from a font file (or family) and size.
    pub fn with_ttf(
        provider: SharedProvider,
        text: &str,
        font_file: &str,
        font_size: f32,
        dimensions: Vec2,
        h_alignment: TextHAlignment,
        v_alignment: TextVAlignment,
    ) -> Result<Self, FontError> {
        let mut label = Self::new(provider);
        label.set_ttf_config(&TtfConfig::new(font_file, font_size))?;
        label.set_dimensions(dimensions.x, dimensions.y);
        label.set_string(text);
        label.set_alignment(h_alignment, v_alignment);
        Ok(label)
    }

    pub fn with_ttf_config(
        provider: SharedProvider,
        config: &TtfConfig,
        text: &str,
        h_alignment: TextHAlignment,
        max_line_width: f32,
    ) -> Result<Self, FontError> {
        let mut label = Self::new(provider);
        label.set_ttf_config(config)?;
        label.set_max_line_width(max_line_width);
        label.set_string(text);
        label.set_alignment(h_alignment, TextVAlignment::Top);
        Ok(label)
    }

    pub fn with_bmfont(
        provider: SharedProvider,
        path: &str,
        text: &str,
        h_alignment: TextHAlignment,
        max_line_width: f32,
        image_offset: Vec2,
    ) -> Result<Self, FontError> {
        let mut label = Self::new(provider);
        label.set_bmfont_file_path(path, image_offset, 0.0)?;
        label.set_max_line_width(max_line_width);
        label.set_string(text);
        label.set_alignment(h_alignment, TextVAlignment::Top);
        Ok(label)
    }

    pub fn with_char_map(provider: SharedProvider, source: &CharMapSource) -> Result<Self, FontError> {
        let mut label = Self::new(provider);
        label.set_char_map(source)?;
        Ok(label)
    }

    /// Back to an empty system-font label: releases the atlas, drops text,
    /// effects, batches and letter proxies.
    pub fn reset(&mut self) {
        self.text_sprite = None;
        self.shadow_sprite = None;
        self.letters.clear();
        self.batch_nodes.clear();
        self.batch_commands.clear();
        self.quad_commands.clear();
        self.layout = TextLayout::default();
        self.release_atlas();
        self.purged_atlas = None;

        self.label_type = LabelType::StringTexture;
        self.current_effect = LabelEffect::Normal;
        self.content_dirty = false;
        self.utf8_text.clear();
        self.text.clear();
        self.kernings.clear();

        self.font_config = TtfConfig::default();
        self.outline_size = 0.0;
        self.bmfont_path.clear();
        self.bmfont_offset = Vec2::ZERO;

        self.system_font_dirty = false;
        self.system_font = self.settings.default_system_font.clone();
        self.system_font_size = self.settings.default_system_font_size;

        self.additional_kerning = 0.0;
        self.line_height = 0.0;
        self.line_spacing = 0.0;
        self.max_line_width = 0.0;
        self.label_width = 0.0;
        self.label_height = 0.0;
        self.line_break_without_spaces = false;
        self.h_alignment = TextHAlignment::Left;
        self.v_alignment = TextVAlignment::Top;

        self.effect_color = Color4F::BLACK;
        self.text_color = Color4B::WHITE;
        self.set_color(Color3B::WHITE);

        self.shadow = Shadow::default();
        self.bold = Bold::default();
        self.underline_enabled = false;
        self.underline.clear();
        self.strikethrough_enabled = false;

        self.use_distance_field = false;
        self.use_a8_shader = false;
        self.blend_func_dirty = false;
        self.blend_func = BlendFunc::ALPHA_PREMULTIPLIED;
        self.opacity_modify_rgb = false;
        self.inside_bounds = true;
        self.enable_wrap = true;
        self.bmfont_size = -1.0;
        self.overflow = Overflow::None;
        self.original_font_size = 0.0;
        self.set_rotation_skew_x(0.0);
    }

    // ── Font selection ──────────────────────────────────────────────

    /// Switch to a TrueType font. On failure the label is reset.
    pub fn set_ttf_config(&mut self, config: &TtfConfig) -> Result<(), FontError> {
        self.original_font_size = config.font_size;
        self.set_ttf_config_internal(config.clone())
    }

    fn set_ttf_config_internal(&mut self, config: TtfConfig) -> Result<(), FontError> {
        let acquired = self.provider.borrow_mut().atlas_ttf(&config);
        let atlas = match acquired {
            Ok(atlas) => atlas,
            Err(err) => {
                warn!("failed to load TTF font {:?}: {err}", config.font_file);
                self.reset();
                return Err(err);
            }
        };

        self.label_type = LabelType::Ttf;
        self.set_font_atlas(atlas, config.distance_field_enabled, true);
        self.font_config = config;

        if self.font_config.outline_size > 0.0 {
            self.use_a8_shader = false;
            self.current_effect = LabelEffect::Outline;
        } else {
            self.current_effect = LabelEffect::Normal;
        }
        self.update_shader_program();

        if self.font_config.italics {
            self.enable_italics();
        }
        if self.font_config.bold {
            self.enable_bold();
        }
        if self.font_config.underline {
            self.enable_underline();
        }
        if self.font_config.strikethrough {
            self.enable_strikethrough();
        }
        Ok(())
    }

    /// Switch to a BMFont. A `font_size` of 0 uses the font's design size.
    pub fn set_bmfont_file_path(
        &mut self,
        path: &str,
        image_offset: Vec2,
        font_size: f32,
    ) -> Result<(), FontError> {
        let acquired = self.provider.borrow_mut().atlas_fnt(path, image_offset);
        let atlas = match acquired {
            Ok(atlas) => atlas,
            Err(err) => {
                warn!("failed to load BMFont {path:?}: {err}");
                self.reset();
                return Err(err);
            }
        };

        if font_size.abs() < f32::EPSILON {
            if let Some(design) = atlas.borrow().original_font_size() {
                self.bmfont_size = design / self.settings.content_scale_factor;
            }
        }
        if font_size > 0.0 {
            self.bmfont_size = font_size;
        }

        self.bmfont_path = path.to_owned();
        self.bmfont_offset = image_offset;
        self.label_type = LabelType::BmFont;
        self.set_font_atlas(atlas, false, false);
        Ok(())
    }

    /// Switch to a fixed-grid character map.
    pub fn set_char_map(&mut self, source: &CharMapSource) -> Result<(), FontError> {
        let acquired = self.provider.borrow_mut().atlas_char_map(source);
        let atlas = match acquired {
            Ok(atlas) => atlas,
            Err(err) => {
                warn!("failed to load char map: {err}");
                self.reset();
                return Err(err);
            }
        };
        self.label_type = LabelType::CharMap;
        self.set_font_atlas(atlas, false, false);
        Ok(())
    }

    fn set_font_atlas(&mut self, atlas: AtlasHandle, distance_field: bool, a8: bool) {
        self.system_font_dirty = false;

        if self.atlas.as_ref().is_some_and(|current| current.id() == atlas.id()) {
            // Already held: give back the reference the lookup just took.
            self.provider.borrow_mut().release(&atlas);
            return;
        }

        if self.atlas.is_some() {
            self.batch_nodes.clear();
            self.quad_commands.clear();
            self.release_atlas();
        }

        self.line_height = atlas.borrow().line_height();
        self.atlas = Some(atlas);
        self.purged_atlas = None;
        self.content_dirty = true;
        self.use_distance_field = distance_field;
        self.use_a8_shader = a8;

        if self.label_type != LabelType::Ttf {
            self.current_effect = LabelEffect::Normal;
            self.update_shader_program();
        }
    }

    fn release_atlas(&mut self) {
        if let Some(atlas) = self.atlas.take() {
            debug!("label releasing atlas {}", atlas.id());
            self.provider.borrow_mut().release(&atlas);
        }
    }

    pub fn set_system_font_name(&mut self, name: &str) {
        if name != self.system_font {
            self.system_font = name.to_owned();
            self.label_type = LabelType::StringTexture;
            self.system_font_dirty = true;
        }
    }

    pub fn set_system_font_size(&mut self, size: f32) {
        if size != self.system_font_size {
            self.system_font_size = size;
            self.original_font_size = size;
            self.label_type = LabelType::StringTexture;
            self.system_font_dirty = true;
        }
    }

    /// Render size of a BMFont label.
    pub fn set_bmfont_size(&mut self, size: f32) {
        self.set_bmfont_size_internal(size);
        self.original_font_size = size;
    }

    fn set_bmfont_size_internal(&mut self, size: f32) {
        if self.label_type != LabelType::BmFont {
            warn!("set_bmfont_size on a {:?} label ignored", self.label_type);
            return;
        }
        let path = self.bmfont_path.clone();
        if let Err(err) = self.set_bmfont_file_path(&path, self.bmfont_offset, size) {
            warn!("could not resize BMFont {path:?}: {err}");
            return;
        }
        self.content_dirty = true;
    }

    // ── Text & layout parameters ────────────────────────────────────

    pub fn set_string(&mut self, text: &str) {
        if text != self.utf8_text {
            self.utf8_text = text.to_owned();
            self.text = text.chars().collect();
            self.content_dirty = true;
        }
    }

    pub fn set_alignment(&mut self, h_alignment: TextHAlignment, v_alignment: TextVAlignment) {
        if h_alignment != self.h_alignment || v_alignment != self.v_alignment {
            self.h_alignment = h_alignment;
            self.v_alignment = v_alignment;
            self.content_dirty = true;
        }
    }

    pub fn set_horizontal_alignment(&mut self, alignment: TextHAlignment) {
        self.set_alignment(alignment, self.v_alignment);
    }

    pub fn set_vertical_alignment(&mut self, alignment: TextVAlignment) {
        self.set_alignment(self.h_alignment, alignment);
    }

    /// Wrap width for labels without a fixed width.
    pub fn set_max_line_width(&mut self, width: f32) {
        if self.label_width == 0.0 && self.max_line_width != width {
            self.max_line_width = width;
            self.content_dirty = true;
        }
    }

    /// Fixed box size; a zero component fits the text on that axis.
    pub fn set_dimensions(&mut self, width: f32, height: f32) {
        let height = if self.overflow == Overflow::ResizeHeight { 0.0 } else { height };
        if height == self.label_height && width == self.label_width {
            return;
        }
        self.label_width = width;
        self.label_height = height;
        self.max_line_width = width;
        self.content_dirty = true;

        if self.overflow == Overflow::Shrink && self.original_font_size > 0.0 {
            self.restore_font_size();
        }
    }

    pub fn set_width(&mut self, width: f32) {
        self.set_dimensions(width, self.label_height);
    }

    pub fn set_height(&mut self, height: f32) {
        self.set_dimensions(self.label_width, height);
    }

    pub fn set_line_break_without_space(&mut self, enabled: bool) {
        if enabled != self.line_break_without_spaces {
            self.line_break_without_spaces = enabled;
            self.content_dirty = true;
        }
    }

    pub fn set_line_height(&mut self, height: f32) {
        if self.label_type == LabelType::StringTexture {
            warn!("set_line_height is not supported by system-font labels");
            return;
        }
        if self.line_height != height {
            self.line_height = height;
            self.content_dirty = true;
        }
    }

    pub fn set_line_spacing(&mut self, spacing: f32) {
        if self.line_spacing != spacing {
            self.line_spacing = spacing;
            self.content_dirty = true;
        }
    }

    /// Extra space after every letter.
    pub fn set_additional_kerning(&mut self, kerning: f32) {
        if self.label_type == LabelType::StringTexture {
            warn!("set_additional_kerning is not supported by system-font labels");
            return;
        }
        if self.additional_kerning != kerning {
            self.additional_kerning = kerning;
            self.content_dirty = true;
        }
    }

    pub fn enable_wrap(&mut self, enabled: bool) {
        if enabled == self.enable_wrap || self.overflow == Overflow::ResizeHeight {
            return;
        }
        self.enable_wrap = enabled;
        self.rescale_with_original_font_size();
        self.content_dirty = true;
    }

    pub fn set_overflow(&mut self, overflow: Overflow) {
        if self.overflow == overflow {
            return;
        }
        if self.label_type == LabelType::CharMap && overflow == Overflow::Shrink {
            warn!("char-map labels cannot shrink");
            return;
        }
        if overflow == Overflow::ResizeHeight {
            self.set_dimensions(self.label_width, 0.0);
            self.enable_wrap(true);
        }
        self.overflow = overflow;
        self.rescale_with_original_font_size();
        self.content_dirty = true;
    }

    // ── Font size bookkeeping ───────────────────────────────────────

    /// Size glyphs are currently rendered at.
    pub fn rendering_font_size(&self) -> f32 {
        match self.label_type {
            LabelType::BmFont => self.bmfont_size,
            LabelType::Ttf => self.font_config.font_size,
            LabelType::StringTexture => self.system_font_size,
            LabelType::CharMap => self.line_height(),
        }
    }

    fn restore_font_size(&mut self) {
        let size = self.original_font_size;
        match self.label_type {
            LabelType::Ttf => {
                let config = TtfConfig { font_size: size, ..self.font_config.clone() };
                if let Err(err) = self.set_ttf_config_internal(config) {
                    warn!("could not restore font size {size}: {err}");
                }
            }
            LabelType::BmFont => self.set_bmfont_size_internal(size),
            LabelType::StringTexture => self.set_system_font_size(size),
            LabelType::CharMap => {}
        }
    }

    fn rescale_with_original_font_size(&mut self) {
        if self.original_font_size - self.rendering_font_size() >= 1.0 {
            self.scale_font_size(self.original_font_size);
        }
    }

    /// Re-acquire the font at `size` and lay out again.
    fn scale_font_size(&mut self, size: f32) {
        let mut update = true;
        match self.label_type {
            LabelType::Ttf => {
                let config = TtfConfig { font_size: size, ..self.font_config.clone() };
                if let Err(err) = self.set_ttf_config_internal(config) {
                    warn!("could not scale font to {size}: {err}");
                    return;
                }
            }
            LabelType::BmFont => {
                let size = if size.abs() < f32::EPSILON {
                    update = false;
                    0.1
                } else {
                    size
                };
                self.set_bmfont_size_internal(size);
            }
            LabelType::StringTexture => self.set_system_font_size(size),
            LabelType::CharMap => return,
        }
        if update {
            self.update_content();
        }
    }

    fn bmfont_scale(&self) -> f32 {
        if self.label_type != LabelType::BmFont {
            return 1.0;
        }
        let design = self
            .atlas
            .as_ref()
            .and_then(|atlas| atlas.borrow().original_font_size())
            .filter(|size| *size > 0.0);
        match design {
            Some(design) => self.bmfont_size * self.settings.content_scale_factor / design,
            None => 1.0,
        }
    }

    /// Scale applied to each glyph quad.
    fn letter_sprite_scale(&self) -> f32 {
        if self.label_type == LabelType::BmFont && self.bmfont_size > 0.0 {
            self.bmfont_scale()
        } else if self.bmfont_size.abs() < f32::EPSILON {
            0.0
        } else {
            1.0
        }
    }

    // ── Dirty protocol ──────────────────────────────────────────────

    /// Run pending atlas events and any pending layout.
    ///
    /// Geometry accessors call this, so they may do layout work.
    pub fn ensure_layout(&mut self) {
        self.process_atlas_events();
        if self.system_font_dirty || self.content_dirty {
            self.update_content();
        }
    }

    fn update_content(&mut self) {
        if self.system_font_dirty {
            if self.atlas.is_some() {
                self.batch_nodes.clear();
                self.batch_commands.clear();
                self.quad_commands.clear();
                self.release_atlas();
            }
            self.system_font_dirty = false;
        }

        self.text_sprite = None;
        self.shadow_sprite = None;
        let mut finished = true;

        if self.atlas.is_some() {
            if let Some(atlas) = &self.atlas {
                self.kernings = atlas.borrow_mut().horizontal_kernings(&self.text);
            }
            finished = self.align_text();
        } else {
            self.layout = TextLayout::default();
            let definition = self.font_definition();
            self.create_sprite_for_system_font(&definition);
            if self.shadow.enabled {
                self.create_shadow_sprite_for_system_font(&definition);
            }
        }

        self.update_underline();

        if finished {
            self.content_dirty = false;
        }
    }

    fn layout_params(&self) -> LayoutParams {
        LayoutParams {
            max_line_width: self.max_line_width,
            label_width: self.label_width,
            label_height: self.label_height,
            line_height: self.line_height,
            line_spacing: self.line_spacing,
            additional_kerning: self.additional_kerning,
            wrap_enabled: self.enable_wrap,
            line_break_without_spaces: self.line_break_without_spaces,
            h_alignment: self.h_alignment,
            v_alignment: self.v_alignment,
            bmfont_scale: self.bmfont_scale(),
            glyph_scale: 1.0,
        }
    }

    /// Lay the string out against the atlas and rebuild the quads.
    /// Returns false when shrinking could not make the text fit.
    fn align_text(&mut self) -> bool {
        let Some(atlas) = self.atlas.clone() else {
            self.set_content_size(Vec2::ZERO);
            return true;
        };
        if self.text.is_empty() {
            self.layout = TextLayout::default();
            for node in &mut self.batch_nodes {
                node.atlas_mut().remove_all();
            }
            self.set_content_size(Vec2::ZERO);
            return true;
        }

        atlas.borrow_mut().prepare_letter_definitions(&self.text);
        {
            let atlas = atlas.borrow();
            for index in self.batch_nodes.len()..atlas.page_count() {
                let Some(texture) = atlas.texture(index) else {
                    continue;
                };
                self.opacity_modify_rgb = texture.premultiplied_alpha;
                if !self.blend_func_dirty {
                    self.blend_func = if texture.premultiplied_alpha {
                        BlendFunc::ALPHA_PREMULTIPLIED
                    } else {
                        BlendFunc::ALPHA_NON_PREMULTIPLIED
                    };
                }
                self.batch_nodes.push(BatchNode::new(texture.clone()));
            }
        }
        if self.batch_nodes.len() == 1 {
            let len = self.text.len();
            self.batch_nodes[0].atlas_mut().reserve(len);
        }

        let params = self.layout_params();
        self.layout = layout_text(&atlas.borrow(), &self.text, &self.kernings, &params);
        self.set_content_size(self.layout.content_size);

        if self.overflow == Overflow::Shrink
            && self.rendering_font_size() > 0.0
            && is_vertical_clamp(&self.layout)
        {
            self.shrink_label_to_content_size(ClampCheck::Vertical);
        }

        if !self.update_quads() {
            if self.overflow == Overflow::Shrink {
                self.shrink_label_to_content_size(ClampCheck::Horizontal);
            }
            // Proxies must follow whatever partial batch is left.
            self.update_label_letters();
            self.update_color();
            return false;
        }

        self.update_label_letters();
        self.update_color();
        true
    }

    /// Find a smaller font size that passes `check`, then re-acquire the
    /// font at that size.
    fn shrink_label_to_content_size(&mut self, check: ClampCheck) {
        let Some(atlas) = self.atlas.clone() else {
            return;
        };
        let font_size = self.rendering_font_size();
        let base = self.layout_params();
        let outcome = {
            let atlas = atlas.borrow();
            let (text, kernings) = (&self.text, &self.kernings);
            shrink_font_size(font_size, &self.settings.shrink, |size| {
                let params = LayoutParams { glyph_scale: size / font_size, ..base };
                let trial = layout_text(&atlas, text, kernings, &params);
                match check {
                    ClampCheck::Vertical => is_vertical_clamp(&trial),
                    ClampCheck::Horizontal => is_horizontal_clamp(&trial, &atlas, &params),
                }
            })
        };
        if outcome.font_size < font_size {
            debug!("shrinking label font {font_size} -> {}", outcome.font_size);
            self.scale_font_size(outcome.font_size);
        }
    }

    fn set_content_size(&mut self, size: Vec2) {
        if self.node.content_size != size {
            self.node.content_size = size;
            self.node.transform_dirty = true;
        }
    }

    // ── System font ─────────────────────────────────────────────────

    fn font_definition(&self) -> FontDefinition {
        let font_name = self
            .atlas
            .as_ref()
            .map(|atlas| atlas.borrow().font_name().to_owned())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| self.system_font.clone());

        let stroke = (self.current_effect == LabelEffect::Outline && self.outline_size > 0.0).then(|| {
            let color = Color4B::from(self.effect_color);
            StrokeDefinition { color: color.rgb(), alpha: color.a, size: self.outline_size }
        });

        FontDefinition {
            font_name,
            font_size: self.system_font_size,
            h_alignment: self.h_alignment,
            v_alignment: self.v_alignment,
            dimensions: Vec2::new(
                if self.label_width == 0.0 { self.max_line_width } else { self.label_width },
                self.label_height,
            ),
            fill_color: self.text_color.rgb(),
            font_alpha: self.text_color.a,
            enable_wrap: self.enable_wrap,
            overflow: self.overflow,
            line_spacing: self.line_spacing,
            stroke,
        }
    }

    fn create_sprite_for_system_font(&mut self, definition: &FontDefinition) {
        self.label_type = LabelType::StringTexture;
        if self.utf8_text.is_empty() {
            self.set_content_size(Vec2::ZERO);
            return;
        }
        let rendered = self.provider.borrow_mut().render_string(&self.utf8_text, definition);
        match rendered {
            Ok(texture) => {
                self.set_content_size(texture.size);
                self.text_sprite = Some(texture);
            }
            Err(err) => {
                warn!("system font {:?} failed to render: {err}", definition.font_name);
                self.set_content_size(Vec2::ZERO);
            }
        }
    }

    fn create_shadow_sprite_for_system_font(&mut self, definition: &FontDefinition) {
        let Some(text_sprite) = &self.text_sprite else {
            return;
        };
        if definition.stroke.is_none()
            && definition.fill_color == self.shadow.color
            && definition.font_alpha == self.shadow.opacity
        {
            self.shadow_sprite = Some(text_sprite.clone());
            return;
        }

        let shadow_definition = FontDefinition {
            fill_color: self.shadow.color,
            font_alpha: self.shadow.opacity,
            stroke: definition.stroke.map(|stroke| StrokeDefinition {
                color: self.shadow.color,
                alpha: self.shadow.opacity,
                ..stroke
            }),
            ..definition.clone()
        };
        let rendered = self.provider.borrow_mut().render_string(&self.utf8_text, &shadow_definition);
        match rendered {
            Ok(texture) => self.shadow_sprite = Some(texture),
            Err(err) => warn!("system font shadow failed to render: {err}"),
        }
    }

    // ── Atlas lifecycle events ──────────────────────────────────────

    /// Apply queued atlas purge/reset notifications.
    pub fn process_atlas_events(&mut self) {
        if self.mailbox.is_empty() {
            return;
        }
        for event in self.mailbox.drain() {
            match event {
                AtlasEvent::Purged(id) => self.on_atlas_purged(id),
                AtlasEvent::Reset(id) => self.on_atlas_reset(id),
            }
        }
    }

    fn on_atlas_purged(&mut self, id: AtlasId) {
        if self.label_type != LabelType::Ttf || self.atlas.as_ref().map(AtlasHandle::id) != Some(id) {
            return;
        }
        debug!("label dropping purged atlas {id}");
        for letter in self.letters.values_mut() {
            letter.detach();
        }
        self.batch_nodes.clear();
        self.batch_commands.clear();
        self.quad_commands.clear();
        self.release_atlas();
        self.purged_atlas = Some(id);
    }

    fn on_atlas_reset(&mut self, id: AtlasId) {
        let ours = self.atlas.as_ref().map(AtlasHandle::id) == Some(id) || self.purged_atlas == Some(id);
        if self.label_type != LabelType::Ttf || !ours {
            return;
        }
        debug!("label rebuilding atlas {id}");
        self.batch_nodes.clear();
        self.batch_commands.clear();
        self.quad_commands.clear();
        self.release_atlas();
        self.purged_atlas = None;

        let line_height = self.line_height;
        let config = self.font_config.clone();
        if let Err(err) = self.set_ttf_config(&config) {
            warn!("atlas {id} could not be rebuilt: {err}");
            return;
        }
        if self.label_type != LabelType::StringTexture {
            self.set_line_height(line_height);
        }
    }

    // ── Queries ─────────────────────────────────────────────────────

    /// Laid-out size; flushes pending layout.
    pub fn content_size(&mut self) -> Vec2 {
        self.ensure_layout();
        self.node.content_size
    }

    /// Parent-space bounds; flushes pending layout.
    pub fn bounding_box(&mut self) -> Rect {
        self.ensure_layout();
        Rect { origin: Vec2::ZERO, size: self.node.content_size }.apply_transform(&self.node.node_to_parent())
    }

    /// Number of laid-out lines; flushes pending layout.
    pub fn string_num_lines(&mut self) -> usize {
        self.ensure_layout();
        if self.label_type == LabelType::StringTexture {
            return match self.text.split_last() {
                None => 0,
                Some((_, head)) => 1 + head.iter().filter(|&&ch| ch == '\n').count(),
            };
        }
        self.layout.number_of_lines
    }

    pub fn string_length(&self) -> usize {
        self.text.len()
    }

    pub fn string(&self) -> &str {
        &self.utf8_text
    }

    pub fn letters_info(&self) -> &[LetterInfo] {
        &self.layout.letters
    }

    pub fn lines_width(&self) -> &[f32] {
        &self.layout.lines_width
    }

    pub fn lines_offset_x(&self) -> &[f32] {
        &self.layout.lines_offset_x
    }

    pub fn text_desired_height(&self) -> f32 {
        self.layout.text_desired_height
    }

    pub fn label_type(&self) -> LabelType {
        self.label_type
    }

    pub fn current_effect(&self) -> LabelEffect {
        self.current_effect
    }

    pub fn overflow(&self) -> Overflow {
        self.overflow
    }

    pub fn is_wrap_enabled(&self) -> bool {
        self.enable_wrap
    }

    pub fn max_line_width(&self) -> f32 {
        self.max_line_width
    }

    pub fn dimensions(&self) -> Vec2 {
        Vec2::new(self.label_width, self.label_height)
    }

    pub fn horizontal_alignment(&self) -> TextHAlignment {
        self.h_alignment
    }

    pub fn vertical_alignment(&self) -> TextVAlignment {
        self.v_alignment
    }

    /// Line height scaled for BMFont; 0 for system-font labels.
    pub fn line_height(&self) -> f32 {
        if self.label_type == LabelType::StringTexture {
            warn!("line_height is not supported by system-font labels");
        }
        if self.text_sprite.is_some() {
            0.0
        } else {
            self.line_height * self.bmfont_scale()
        }
    }

    pub fn line_spacing(&self) -> f32 {
        self.line_spacing
    }

    pub fn additional_kerning(&self) -> f32 {
        self.additional_kerning
    }

    pub fn ttf_config(&self) -> &TtfConfig {
        &self.font_config
    }

    pub fn bmfont_size(&self) -> f32 {
        self.bmfont_size
    }

    pub fn bmfont_file_path(&self) -> &str {
        &self.bmfont_path
    }

    pub fn system_font_name(&self) -> &str {
        &self.system_font
    }

    pub fn system_font_size(&self) -> f32 {
        self.system_font_size
    }

    pub fn atlas(&self) -> Option<&AtlasHandle> {
        self.atlas.as_ref()
    }

    pub fn batch_nodes(&self) -> &[BatchNode] {
        &self.batch_nodes
    }

    pub fn program_state(&self) -> Option<&ProgramState> {
        self.program_state.as_ref()
    }

    pub fn is_content_dirty(&self) -> bool {
        self.content_dirty
    }

    pub fn is_system_font_dirty(&self) -> bool {
        self.system_font_dirty
    }

    pub fn settings(&self) -> &LabelSettings {
        &self.settings
    }

    // ── Node surface ────────────────────────────────────────────────

    pub fn node(&self) -> &NodeState {
        &self.node
    }

    pub fn set_position(&mut self, position: Vec2) {
        self.node.position = position;
        self.node.transform_dirty = true;
    }

    pub fn set_anchor_point(&mut self, anchor: Vec2) {
        self.node.anchor_point = anchor;
        self.node.transform_dirty = true;
    }

    pub fn set_scale(&mut self, scale: Vec2) {
        self.node.scale = scale;
        self.node.transform_dirty = true;
    }

    pub fn set_rotation(&mut self, degrees: f32) {
        self.node.rotation = degrees;
        self.node.transform_dirty = true;
    }

    pub fn set_rotation_skew_x(&mut self, degrees: f32) {
        self.node.skew_x = degrees;
        self.node.transform_dirty = true;
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.node.visible = visible;
    }

    pub fn set_global_z_order(&mut self, z: f32) {
        self.node.global_z = z;
    }
}

impl Drop for Label {
    fn drop(&mut self) {
        let Ok(mut provider) = self.provider.try_borrow_mut() else {
            warn!("font provider busy while dropping a label; atlas reference not returned");
            return;
        };
        if let Some(atlas) = self.atlas.take() {
            provider.release(&atlas);
        }
        provider.unsubscribe(self.subscription);
    }
}

impl std::fmt::Debug for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Label")
            .field("text", &self.utf8_text)
            .field("label_type", &self.label_type)
            .field("atlas", &self.atlas)
            .field("content_dirty", &self.content_dirty)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::testing::FixedGlyphProvider;

    fn provider() -> Rc<RefCell<FixedGlyphProvider>> {
        Rc::new(RefCell::new(FixedGlyphProvider::new()))
    }

    fn ttf_label(p: &Rc<RefCell<FixedGlyphProvider>>, text: &str) -> Label {
        let shared: SharedProvider = p.clone();
        let mut label = Label::new(shared);
        label.set_ttf_config(&TtfConfig::new("mono", 20.0)).unwrap();
        label.set_string(text);
        label
    }

    #[test]
    fn test_new_label_is_clean_system_font() {
        let p = provider();
        let label = Label::new(p.clone());
        assert_eq!(label.label_type(), LabelType::StringTexture);
        assert!(!label.is_content_dirty());
        assert_eq!(label.system_font_name(), "Helvetica");
        assert_eq!(p.borrow().observer_count(), 1);
    }

    #[test]
    fn test_setters_mark_dirty_only_on_change() {
        let p = provider();
        let mut label = ttf_label(&p, "abc");
        label.ensure_layout();
        assert!(!label.is_content_dirty());

        label.set_string("abc");
        label.set_alignment(TextHAlignment::Left, TextVAlignment::Top);
        label.set_line_spacing(0.0);
        assert!(!label.is_content_dirty());

        label.set_line_spacing(2.0);
        assert!(label.is_content_dirty());
    }

    #[test]
    fn test_layout_invariant_letters_match_text() {
        let p = provider();
        let mut label = ttf_label(&p, "héllo\nwörld 中");
        label.ensure_layout();
        assert_eq!(label.letters_info().len(), label.string_length());
        assert_eq!(label.string_num_lines(), 2);
    }

    #[test]
    fn test_max_line_width_ignored_with_fixed_width() {
        let p = provider();
        let mut label = ttf_label(&p, "abc");
        label.set_dimensions(100.0, 0.0);
        label.set_max_line_width(30.0);
        assert_eq!(label.max_line_width(), 100.0);
    }

    #[test]
    fn test_resize_height_forces_zero_height_and_wrap() {
        let p = provider();
        let mut label = ttf_label(&p, "abcdef");
        label.enable_wrap(false);
        label.set_dimensions(30.0, 50.0);
        label.set_overflow(Overflow::ResizeHeight);
        assert_eq!(label.dimensions(), Vec2::new(30.0, 0.0));
        assert!(label.is_wrap_enabled());

        label.enable_wrap(false);
        assert!(label.is_wrap_enabled());
        label.set_dimensions(30.0, 80.0);
        assert_eq!(label.dimensions().y, 0.0);

        let size = label.content_size();
        assert_eq!(size.y, label.text_desired_height());
        assert_eq!(label.string_num_lines(), 2);
    }

    #[test]
    fn test_char_map_refuses_shrink() {
        let p = provider();
        let texture = lumen_text::TextureInfo::memory(160, 20);
        let source = CharMapSource::Texture { texture, item_width: 10, item_height: 20, start_char: '0' as u32 };
        let mut label = Label::with_char_map(p.clone(), &source).unwrap();
        label.set_overflow(Overflow::Shrink);
        assert_eq!(label.overflow(), Overflow::None);
    }

    #[test]
    fn test_system_font_kerning_is_ignored() {
        let p = provider();
        let mut label = Label::new(p.clone());
        label.set_additional_kerning(3.0);
        assert_eq!(label.additional_kerning(), 0.0);
    }

    #[test]
    fn test_same_atlas_does_not_leak_reference() {
        let p = provider();
        let mut label = ttf_label(&p, "a");
        let id = label.atlas().map(AtlasHandle::id).unwrap();
        label.set_ttf_config(&TtfConfig::new("mono", 20.0)).unwrap();
        assert_eq!(p.borrow().ref_count(id), 1);
    }

    #[test]
    fn test_drop_releases_and_unsubscribes() {
        let p = provider();
        let label = ttf_label(&p, "a");
        let id = label.atlas().map(AtlasHandle::id).unwrap();
        drop(label);
        assert_eq!(p.borrow().ref_count(id), 0);
        assert_eq!(p.borrow().observer_count(), 0);
    }
}
