//! Deterministic doubles for tests, benchmarks and demos.
//!
//! [`FixedGlyphProvider`] hands out atlases with exact, font-independent
//! metrics and counts every reference it gives out. [`RecordingRenderer`]
//! keeps a copy of every command it receives.
//!
//! Metrics of the monospace TTF fonts at size `S`:
//! - printable glyphs are `floor(S/2)` wide and `S` tall, advance `floor(S/2)`
//! - whitespace has no bitmap but advances like a glyph
//! - control characters have no glyph
//! - line height is `S`
//!
//! BMFont fixtures are 32px fonts with 16x32 ASCII cells.

use std::collections::HashMap;
use std::path::PathBuf;
use std::rc::Weak;

use glam::{Mat4, Vec2, Vec4};
use log::warn;
use lumen_text::{
    char_map_atlas_for, AtlasEvent, AtlasHandle, AtlasId, AtlasKind, AtlasObserver, CharMapSource,
    FontAtlas, FontAtlasProvider, FontDefinition, FontError, GlyphBitmap, GlyphRasterizer,
    LetterDefinition, ObserverList, StringTexture, SubscriptionId, TextureId, TextureInfo,
    TtfConfig,
};

use crate::command::{BlendFunc, RenderCommand, Renderer};
use crate::quad::Quad;
use crate::shader::{ProgramState, ProgramType, Uniform, UniformValue};

/// Design size of BMFont fixtures.
pub const BMFONT_SIZE: f32 = 32.0;
/// Cell width of BMFont fixture glyphs.
pub const BMFONT_GLYPH_WIDTH: f32 = 16.0;

/// Monospace rasterizer with exact metrics.
#[derive(Clone, Debug)]
pub struct MonoRasterizer {
    name: String,
    size: f32,
    outline: f32,
}

impl MonoRasterizer {
    pub fn new(name: impl Into<String>, config: &TtfConfig) -> Self {
        Self { name: name.into(), size: config.font_size, outline: config.outline_size.max(0.0) }
    }

    /// Advance of every glyph at `size`.
    pub fn advance(size: f32) -> f32 {
        (size / 2.0).floor()
    }
}

impl GlyphRasterizer for MonoRasterizer {
    fn font_name(&self) -> &str {
        &self.name
    }

    fn line_height(&self) -> f32 {
        self.size
    }

    fn rasterize(&mut self, ch: char) -> Option<GlyphBitmap> {
        if ch.is_control() {
            return None;
        }
        let advance = Self::advance(self.size);
        if ch.is_whitespace() {
            return Some(GlyphBitmap { x_advance: advance, ..Default::default() });
        }
        let pad = (self.outline * 2.0) as u32;
        let width = advance as u32 + pad;
        let height = self.size as u32 + pad;
        Some(GlyphBitmap {
            width,
            height,
            data: vec![255; (width * height) as usize],
            offset_x: -self.outline,
            offset_y: -self.outline,
            x_advance: advance,
        })
    }
}

struct Entry {
    handle: AtlasHandle,
    refs: usize,
}

/// In-memory [`FontAtlasProvider`] with reference-count bookkeeping.
pub struct FixedGlyphProvider {
    fonts: Vec<String>,
    bmfonts: Vec<String>,
    page_size: u32,
    live: HashMap<String, Entry>,
    keys: HashMap<AtlasId, String>,
    next_id: AtlasId,
    observers: ObserverList,
    unknown_releases: usize,
    render_calls: usize,
}

impl Default for FixedGlyphProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl FixedGlyphProvider {
    /// Knows the TTF font `"mono"` and no BMFonts.
    pub fn new() -> Self {
        Self::with_page_size(256)
    }

    pub fn with_page_size(page_size: u32) -> Self {
        Self {
            fonts: vec![String::from("mono")],
            bmfonts: Vec::new(),
            page_size,
            live: HashMap::new(),
            keys: HashMap::new(),
            next_id: 0,
            observers: ObserverList::default(),
            unknown_releases: 0,
            render_calls: 0,
        }
    }

    /// Make another TTF font file loadable.
    pub fn add_font(&mut self, font_file: &str) {
        self.fonts.push(font_file.to_owned());
    }

    /// Make `path` loadable as a BMFont fixture.
    pub fn add_bmfont(&mut self, path: &str) {
        self.bmfonts.push(path.to_owned());
    }

    pub fn ref_count(&self, id: AtlasId) -> usize {
        self.keys
            .get(&id)
            .and_then(|key| self.live.get(key))
            .map_or(0, |entry| entry.refs)
    }

    /// Sum of every outstanding reference.
    pub fn total_refs(&self) -> usize {
        self.live.values().map(|entry| entry.refs).sum()
    }

    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    /// Releases of atlases this provider did not hand out (or already freed).
    pub fn unknown_releases(&self) -> usize {
        self.unknown_releases
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    /// Number of `render_string` calls so far.
    pub fn render_calls(&self) -> usize {
        self.render_calls
    }

    /// Purge every live TTF atlas and announce it, like a texture-memory
    /// flush would.
    pub fn purge_ttf(&mut self) {
        let ttf: Vec<AtlasHandle> = self
            .live
            .values()
            .filter(|entry| entry.handle.borrow().kind() == AtlasKind::Ttf)
            .map(|entry| entry.handle.clone())
            .collect();
        for handle in ttf {
            handle.borrow_mut().purge();
            self.observers.notify(AtlasEvent::Purged(handle.id()));
            self.observers.notify(AtlasEvent::Reset(handle.id()));
        }
    }

    fn acquire(
        &mut self,
        key: String,
        create: impl FnOnce(AtlasId, u32) -> Result<FontAtlas, FontError>,
    ) -> Result<AtlasHandle, FontError> {
        if let Some(entry) = self.live.get_mut(&key) {
            entry.refs += 1;
            return Ok(entry.handle.clone());
        }
        let id = self.next_id + 1;
        let handle = AtlasHandle::new(create(id, self.page_size)?);
        self.next_id = id;
        self.keys.insert(id, key.clone());
        self.live.insert(key, Entry { handle: handle.clone(), refs: 1 });
        Ok(handle)
    }
}

fn bmfont_fixture(id: AtlasId, path: &str, image_offset: Vec2) -> FontAtlas {
    let columns = 32u32;
    let texture = TextureInfo::memory(columns * BMFONT_GLYPH_WIDTH as u32, 3 * BMFONT_SIZE as u32);
    let mut atlas = FontAtlas::fixed(id, AtlasKind::BmFont, path, BMFONT_SIZE, vec![texture]);
    atlas.set_original_font_size(BMFONT_SIZE);
    for (cell, code) in (32u32..128).enumerate() {
        let Some(ch) = char::from_u32(code) else {
            continue;
        };
        let (col, row) = (cell as u32 % columns, cell as u32 / columns);
        atlas.add_letter_definition(
            ch,
            LetterDefinition {
                u: col as f32 * BMFONT_GLYPH_WIDTH + image_offset.x,
                v: row as f32 * BMFONT_SIZE + image_offset.y,
                width: BMFONT_GLYPH_WIDTH,
                height: BMFONT_SIZE,
                x_advance: BMFONT_GLYPH_WIDTH,
                valid: true,
                ..Default::default()
            },
        );
    }
    atlas
}

impl FontAtlasProvider for FixedGlyphProvider {
    fn atlas_ttf(&mut self, config: &TtfConfig) -> Result<AtlasHandle, FontError> {
        if !self.fonts.contains(&config.font_file) {
            return Err(FontError::FileNotFound(PathBuf::from(&config.font_file)));
        }
        let key = format!(
            "ttf:{}:{}:{}:{}:{}:{}",
            config.font_file,
            config.font_size,
            config.outline_size,
            config.distance_field_enabled,
            config.bold,
            config.italics
        );
        self.acquire(key, |id, page_size| {
            let rasterizer = MonoRasterizer::new(config.font_file.clone(), config);
            Ok(FontAtlas::dynamic(id, Box::new(rasterizer), page_size))
        })
    }

    fn atlas_fnt(&mut self, path: &str, image_offset: Vec2) -> Result<AtlasHandle, FontError> {
        if !self.bmfonts.iter().any(|known| known == path) {
            return Err(FontError::FileNotFound(PathBuf::from(path)));
        }
        let key = format!("fnt:{path}:{}:{}", image_offset.x, image_offset.y);
        self.acquire(key, |id, _| Ok(bmfont_fixture(id, path, image_offset)))
    }

    fn atlas_char_map(&mut self, source: &CharMapSource) -> Result<AtlasHandle, FontError> {
        let key = format!("charmap:{source:?}");
        self.acquire(key, |id, _| char_map_atlas_for(id, source))
    }

    fn release(&mut self, atlas: &AtlasHandle) {
        let id = atlas.id();
        let Some(key) = self.keys.get(&id).cloned() else {
            warn!("release of unknown atlas {id}");
            self.unknown_releases += 1;
            return;
        };
        let Some(entry) = self.live.get_mut(&key) else {
            self.unknown_releases += 1;
            return;
        };
        entry.refs -= 1;
        if entry.refs == 0 {
            self.live.remove(&key);
            self.keys.remove(&id);
        }
    }

    fn render_string(
        &mut self,
        text: &str,
        definition: &FontDefinition,
    ) -> Result<StringTexture, FontError> {
        self.render_calls += 1;
        let size = definition.font_size;
        let columns = text.split('\n').map(|line| line.chars().count()).max().unwrap_or(0);
        let lines = text.split('\n').count();
        let mut logical = Vec2::new(
            columns as f32 * MonoRasterizer::advance(size),
            lines as f32 * size,
        );
        if definition.dimensions.x > 0.0 {
            logical.x = definition.dimensions.x;
        }
        if definition.dimensions.y > 0.0 {
            logical.y = definition.dimensions.y;
        }
        let (width, height) = (logical.x.ceil().max(1.0) as u32, logical.y.ceil().max(1.0) as u32);
        Ok(StringTexture {
            texture: TextureInfo::memory(width, height),
            pixels: vec![0; (width * height * 4) as usize],
            size: logical,
        })
    }

    fn subscribe(&mut self, observer: Weak<dyn AtlasObserver>) -> SubscriptionId {
        self.observers.subscribe(observer)
    }

    fn unsubscribe(&mut self, id: SubscriptionId) {
        self.observers.unsubscribe(id);
    }
}

// ───────────────────────────────────────────────────────────────────
// Renderer
// ───────────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommandKind {
    Custom,
    Quad,
    Sprite,
    Line,
}

/// Snapshot of one command as the renderer saw it.
#[derive(Clone, Debug)]
pub struct RecordedCommand {
    pub kind: CommandKind,
    pub global_z: f32,
    pub program: Option<ProgramType>,
    pub effect_type: Option<i32>,
    pub text_color: Option<Vec4>,
    pub effect_color: Option<Vec4>,
    pub mvp: Option<Mat4>,
    pub blend: Option<BlendFunc>,
    pub texture: Option<TextureId>,
    pub quad_count: usize,
    pub vertices: Vec<Quad>,
    pub segments: Vec<(Vec2, Vec2)>,
}

impl RecordedCommand {
    fn new(kind: CommandKind, global_z: f32) -> Self {
        Self {
            kind,
            global_z,
            program: None,
            effect_type: None,
            text_color: None,
            effect_color: None,
            mvp: None,
            blend: None,
            texture: None,
            quad_count: 0,
            vertices: Vec::new(),
            segments: Vec::new(),
        }
    }

    fn with_state(mut self, state: Option<&ProgramState>) -> Self {
        let Some(state) = state else {
            return self;
        };
        let vec4 = |u| match state.uniform(u) {
            Some(UniformValue::Vec4(v)) => Some(v),
            _ => None,
        };
        self.program = Some(state.program());
        self.effect_type = match state.uniform(Uniform::EffectType) {
            Some(UniformValue::Int(i)) => Some(i),
            _ => None,
        };
        self.text_color = vec4(Uniform::TextColor);
        self.effect_color = vec4(Uniform::EffectColor);
        self.mvp = match state.uniform(Uniform::MvpMatrix) {
            Some(UniformValue::Mat4(m)) => Some(m),
            _ => None,
        };
        self.texture = state.texture();
        self
    }
}

/// Renderer that records everything it is given.
#[derive(Clone, Debug)]
pub struct RecordingRenderer {
    pub commands: Vec<RecordedCommand>,
    /// Answer returned by `check_visibility`.
    pub visible: bool,
    pub visibility_checks: usize,
    pub projection: Mat4,
    pub camera_moved: bool,
}

impl Default for RecordingRenderer {
    fn default() -> Self {
        Self {
            commands: Vec::new(),
            visible: true,
            visibility_checks: 0,
            projection: Mat4::IDENTITY,
            camera_moved: false,
        }
    }
}

impl RecordingRenderer {
    pub fn clear(&mut self) {
        self.commands.clear();
    }
}

impl Renderer for RecordingRenderer {
    fn projection(&self) -> Mat4 {
        self.projection
    }

    fn check_visibility(&mut self, _transform: &Mat4, _size: Vec2) -> bool {
        self.visibility_checks += 1;
        self.visible
    }

    fn camera_updated(&self) -> bool {
        self.camera_moved
    }

    fn add_command(&mut self, command: RenderCommand<'_>) {
        let recorded = match command {
            RenderCommand::Custom(cmd) => {
                let mut rec = RecordedCommand::new(CommandKind::Custom, cmd.global_z())
                    .with_state(cmd.program_state());
                rec.blend = Some(cmd.blend());
                rec.quad_count = cmd.vertices().len();
                rec.vertices = cmd.vertices().to_vec();
                rec
            }
            RenderCommand::Quad(cmd) => {
                let mut rec = RecordedCommand::new(CommandKind::Quad, cmd.global_z)
                    .with_state(cmd.program_state.as_ref());
                rec.blend = Some(cmd.blend);
                rec.texture = cmd.texture;
                rec.quad_count = cmd.quads.len();
                rec.vertices = cmd.quads.clone();
                rec
            }
            RenderCommand::Sprite(cmd) => {
                let mut rec = RecordedCommand::new(CommandKind::Sprite, cmd.global_z);
                rec.blend = Some(cmd.blend);
                rec.texture = Some(cmd.texture);
                rec.quad_count = 1;
                rec.vertices = vec![cmd.quad];
                rec
            }
            RenderCommand::Line(cmd) => {
                let mut rec = RecordedCommand::new(CommandKind::Line, cmd.global_z);
                rec.segments = cmd.segments.clone();
                rec
            }
        };
        self.commands.push(recorded);
    }
}
