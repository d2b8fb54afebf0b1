//! Text engine: rasterizes glyphs and system-font strings using `cosmic-text`.
//!
//! The engine owns a `FontSystem` (font discovery + shaping) and a
//! `SwashCache` (glyph rasterization). It is shared between every
//! [`CosmicRasterizer`] of a cache, so fonts are discovered once.
//!
//! Two products come out of it:
//!
//! - per-code-point [`GlyphBitmap`]s for dynamic TrueType atlases;
//! - whole-string [`StringTexture`]s for system-font labels.

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::Path;
use std::rc::Rc;

use cosmic_text::{
    Attrs, Buffer, Color as CColor, Family, FontSystem, Metrics, Shaping, Style as CStyle,
    SwashCache, SwashContent, Weight,
};
use log::{debug, warn};

use crate::atlas::{GlyphBitmap, GlyphRasterizer};
use crate::cache::FontBackend;
use crate::error::FontError;
use crate::page::TextureInfo;
use crate::provider::StringTexture;
use crate::style::{FontDefinition, TextHAlignment, TextVAlignment, TtfConfig};

/// Line height used when a font does not define its own.
const LINE_HEIGHT_FACTOR: f32 = 1.2;

/// Map a family string to a cosmic-text family, honoring the generic names.
fn family_of(name: &str) -> Family<'_> {
    let first = name
        .split(',')
        .next()
        .unwrap_or(name)
        .trim()
        .trim_matches('"')
        .trim_matches('\'');
    match first {
        "" | "sans-serif" => Family::SansSerif,
        "serif" => Family::Serif,
        "monospace" => Family::Monospace,
        concrete => Family::Name(concrete),
    }
}

fn looks_like_font_path(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    [".ttf", ".otf", ".ttc", ".otc"].iter().any(|ext| lower.ends_with(ext))
}

/// Core text engine wrapping cosmic-text.
pub struct TextEngine {
    pub font_system: FontSystem,
    pub swash_cache: SwashCache,
    loaded: HashMap<String, String>,
}

impl Default for TextEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl TextEngine {
    /// Create a new text engine with system font discovery.
    pub fn new() -> Self {
        Self {
            font_system: FontSystem::new(),
            swash_cache: SwashCache::new(),
            loaded: HashMap::new(),
        }
    }

    /// Resolve `font_file` to a family name.
    ///
    /// Existing files are loaded into the font database once; anything
    /// else is treated as a family name. A string that names a font file
    /// which does not exist is an error.
    pub fn load_font(&mut self, font_file: &str) -> Result<String, FontError> {
        if let Some(family) = self.loaded.get(font_file) {
            return Ok(family.clone());
        }

        let path = Path::new(font_file);
        if !path.is_file() {
            if looks_like_font_path(font_file) {
                return Err(FontError::FileNotFound(path.to_path_buf()));
            }
            return Ok(font_file.to_owned());
        }

        let data = std::fs::read(path).map_err(|e| FontError::io(path, e))?;
        let db = self.font_system.db_mut();
        let before: Vec<_> = db.faces().map(|face| face.id).collect();
        db.load_font_data(data);
        let family = db
            .faces()
            .find(|face| !before.contains(&face.id))
            .and_then(|face| face.families.first())
            .map(|(name, _)| name.clone())
            .ok_or_else(|| FontError::Unsupported(format!("no usable face in {font_file}")))?;

        debug!("loaded font file {font_file} as family {family:?}");
        self.loaded.insert(font_file.to_owned(), family.clone());
        Ok(family)
    }

    /// Render `text` into one RGBA texture.
    pub fn render_string(
        &mut self,
        text: &str,
        definition: &FontDefinition,
    ) -> Result<StringTexture, FontError> {
        if definition.stroke.is_some() {
            warn!("system font stroke is not supported; rendering without it");
        }

        let line_height = definition.font_size * LINE_HEIGHT_FACTOR + definition.line_spacing;
        let metrics = Metrics::new(definition.font_size, line_height.max(1.0));
        let dims = definition.dimensions;
        let wrap_width = (definition.enable_wrap && dims.x > 0.0).then_some(dims.x);

        let color = definition.fill_color;
        let attrs = Attrs::new()
            .family(family_of(&definition.font_name))
            .color(CColor::rgba(color.r, color.g, color.b, definition.font_alpha));

        let mut buffer = Buffer::new(&mut self.font_system, metrics);
        buffer.set_size(&mut self.font_system, wrap_width, None);
        buffer.set_text(&mut self.font_system, text, attrs, Shaping::Advanced);
        buffer.shape_until_scroll(&mut self.font_system, false);

        let mut text_width: f32 = 0.0;
        let mut text_height: f32 = 0.0;
        for run in buffer.layout_runs() {
            text_width = text_width.max(run.line_w);
            text_height = text_height.max(run.line_top + line_height);
        }

        let box_w = if dims.x > 0.0 { dims.x } else { text_width };
        let box_h = if dims.y > 0.0 { dims.y } else { text_height };
        let (width, height) = (box_w.ceil() as u32, box_h.ceil() as u32);
        if width == 0 || height == 0 {
            return Err(FontError::Unsupported(format!("nothing to render for {text:?}")));
        }

        let offset_y = match definition.v_alignment {
            TextVAlignment::Top => 0.0,
            TextVAlignment::Center => (box_h - text_height) / 2.0,
            TextVAlignment::Bottom => box_h - text_height,
        };

        let mut pixels = vec![0u8; (width * height * 4) as usize];
        for run in buffer.layout_runs() {
            let offset_x = match definition.h_alignment {
                TextHAlignment::Left => 0.0,
                TextHAlignment::Center => (box_w - run.line_w) / 2.0,
                TextHAlignment::Right => box_w - run.line_w,
            };

            for glyph in run.glyphs.iter() {
                let physical = glyph.physical((offset_x, run.line_y + offset_y), 1.0);
                let image = self.swash_cache.get_image(&mut self.font_system, physical.cache_key);
                let image = match image {
                    Some(img) => img,
                    None => continue,
                };

                let left = physical.x + image.placement.left;
                let top = physical.y - image.placement.top;
                let (gw, gh) = (image.placement.width as i32, image.placement.height as i32);
                for row in 0..gh {
                    for col in 0..gw {
                        let (x, y) = (left + col, top + row);
                        if x < 0 || y < 0 || x >= width as i32 || y >= height as i32 {
                            continue;
                        }
                        let dst = ((y as u32 * width + x as u32) * 4) as usize;
                        let src = (row * gw + col) as usize;
                        let rgba = match image.content {
                            SwashContent::Mask => {
                                let a = image.data[src] as u32 * definition.font_alpha as u32 / 255;
                                [color.r, color.g, color.b, a as u8]
                            }
                            SwashContent::Color | SwashContent::SubpixelMask => {
                                let s = src * 4;
                                [image.data[s], image.data[s + 1], image.data[s + 2], image.data[s + 3]]
                            }
                        };
                        pixels[dst..dst + 4].copy_from_slice(&rgba);
                    }
                }
            }
        }

        Ok(StringTexture {
            texture: TextureInfo::memory(width, height),
            pixels,
            size: glam::Vec2::new(box_w, box_h),
        })
    }
}

// ── TrueType rasterizer ─────────────────────────────────────────────

/// [`GlyphRasterizer`] for one TrueType configuration.
pub struct CosmicRasterizer {
    engine: Rc<RefCell<TextEngine>>,
    family: String,
    font_size: f32,
    line_height: f32,
    bold: bool,
    italic: bool,
    kerning_cache: HashMap<(char, char), f32>,
}

impl CosmicRasterizer {
    pub fn new(engine: Rc<RefCell<TextEngine>>, family: String, config: &TtfConfig) -> Self {
        if config.distance_field_enabled || config.outline_size > 0.0 {
            debug!(
                "{family}: rasterizing coverage bitmaps (distance field {}, outline {})",
                config.distance_field_enabled, config.outline_size
            );
        }
        Self {
            engine,
            family,
            font_size: config.font_size,
            line_height: (config.font_size * LINE_HEIGHT_FACTOR).ceil(),
            bold: config.bold,
            italic: config.italics,
            kerning_cache: HashMap::new(),
        }
    }

    fn shape<R>(&self, text: &str, f: impl FnOnce(&mut TextEngine, &Buffer) -> R) -> R {
        let mut engine = self.engine.borrow_mut();
        let metrics = Metrics::new(self.font_size, self.line_height);
        let attrs = Attrs::new()
            .family(family_of(&self.family))
            .weight(if self.bold { Weight::BOLD } else { Weight::NORMAL })
            .style(if self.italic { CStyle::Italic } else { CStyle::Normal });

        let mut buffer = Buffer::new(&mut engine.font_system, metrics);
        buffer.set_size(&mut engine.font_system, None, None);
        buffer.set_text(&mut engine.font_system, text, attrs, Shaping::Advanced);
        buffer.shape_until_scroll(&mut engine.font_system, false);
        f(&mut *engine, &buffer)
    }
}

impl GlyphRasterizer for CosmicRasterizer {
    fn font_name(&self) -> &str {
        &self.family
    }

    fn line_height(&self) -> f32 {
        self.line_height
    }

    fn rasterize(&mut self, ch: char) -> Option<GlyphBitmap> {
        let mut utf8 = [0u8; 4];
        let text: &str = ch.encode_utf8(&mut utf8);
        self.shape(text, |engine, buffer| {
            let run = buffer.layout_runs().next()?;
            let glyph = run.glyphs.first()?;
            let physical = glyph.physical((0.0, 0.0), 1.0);
            let mut bitmap = GlyphBitmap { x_advance: glyph.w, ..Default::default() };

            let TextEngine { font_system, swash_cache, .. } = engine;
            if let Some(image) = swash_cache.get_image(font_system, physical.cache_key) {
                if image.placement.width > 0 && image.placement.height > 0 {
                    bitmap.width = image.placement.width;
                    bitmap.height = image.placement.height;
                    bitmap.data = image.data.clone();
                    bitmap.offset_x = (physical.x + image.placement.left) as f32;
                    bitmap.offset_y = run.line_y + physical.y as f32 - image.placement.top as f32;
                }
            }
            Some(bitmap)
        })
    }

    fn kerning(&mut self, left: char, right: char) -> f32 {
        if let Some(&k) = self.kerning_cache.get(&(left, right)) {
            return k;
        }
        let pair: String = [left, right].iter().collect();
        let k = self.shape(&pair, |_, buffer| {
            buffer
                .layout_runs()
                .next()
                .filter(|run| run.glyphs.len() == 2)
                .map(|run| run.glyphs[1].x - (run.glyphs[0].x + run.glyphs[0].w))
                .unwrap_or(0.0)
        });
        self.kerning_cache.insert((left, right), k);
        k
    }
}

// ── Backend ─────────────────────────────────────────────────────────

/// [`FontBackend`] over a shared [`TextEngine`].
#[derive(Clone, Default)]
pub struct CosmicBackend {
    engine: Rc<RefCell<TextEngine>>,
}

impl CosmicBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn engine(&self) -> Rc<RefCell<TextEngine>> {
        Rc::clone(&self.engine)
    }
}

impl FontBackend for CosmicBackend {
    fn rasterizer(&mut self, config: &TtfConfig) -> Result<Box<dyn GlyphRasterizer>, FontError> {
        if config.font_size <= 0.0 {
            return Err(FontError::Unsupported(format!(
                "font size must be positive, got {}",
                config.font_size
            )));
        }
        let family = self.engine.borrow_mut().load_font(&config.font_file)?;
        Ok(Box::new(CosmicRasterizer::new(Rc::clone(&self.engine), family, config)))
    }

    fn render_string(
        &mut self,
        text: &str,
        definition: &FontDefinition,
    ) -> Result<StringTexture, FontError> {
        self.engine.borrow_mut().render_string(text, definition)
    }
}

// ===================================================================
// Tests
// ===================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn has_fonts(engine: &TextEngine) -> bool {
        engine.font_system.db().faces().count() > 0
    }

    #[test]
    fn test_family_mapping() {
        assert_eq!(family_of("sans-serif"), Family::SansSerif);
        assert_eq!(family_of("monospace"), Family::Monospace);
        assert_eq!(family_of("'Fira Code', monospace"), Family::Name("Fira Code"));
        assert_eq!(family_of(""), Family::SansSerif);
    }

    #[test]
    fn test_missing_font_file_is_an_error() {
        let mut engine = TextEngine::new();
        let err = engine.load_font("fonts/does-not-exist.ttf").unwrap_err();
        assert!(matches!(err, FontError::FileNotFound(_)));
    }

    #[test]
    fn test_family_name_passes_through() {
        let mut engine = TextEngine::new();
        assert_eq!(engine.load_font("Helvetica").unwrap(), "Helvetica");
    }

    #[test]
    fn test_backend_rejects_zero_size() {
        let mut backend = CosmicBackend::new();
        let result = backend.rasterizer(&TtfConfig::new("sans-serif", 0.0));
        assert!(matches!(result, Err(FontError::Unsupported(_))));
    }

    #[test]
    fn test_rasterize_glyph() {
        let mut backend = CosmicBackend::new();
        if !has_fonts(&backend.engine().borrow()) {
            return;
        }
        let mut rasterizer = backend.rasterizer(&TtfConfig::new("sans-serif", 32.0)).unwrap();
        let bitmap = rasterizer.rasterize('A').expect("glyph for 'A'");
        assert!(bitmap.width > 0 && bitmap.height > 0);
        assert!(bitmap.x_advance > 0.0);
        assert!(rasterizer.line_height() >= 32.0);

        let space = rasterizer.rasterize(' ').expect("glyph for space");
        assert_eq!(space.width, 0);
        assert!(space.x_advance > 0.0);
    }

    #[test]
    fn test_render_string_respects_dimensions() {
        let mut engine = TextEngine::new();
        if !has_fonts(&engine) {
            return;
        }
        let definition = FontDefinition {
            font_size: 16.0,
            dimensions: glam::Vec2::new(120.0, 40.0),
            ..Default::default()
        };
        let texture = engine.render_string("Hello", &definition).unwrap();
        assert_eq!((texture.texture.width, texture.texture.height), (120, 40));
        assert_eq!(texture.pixels.len(), 120 * 40 * 4);
        assert!(texture.pixels.chunks(4).any(|px| px[3] > 0));
    }
}
