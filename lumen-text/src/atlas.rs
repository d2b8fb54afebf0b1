//! Font atlas: code point → glyph record mapping over one or more
//! texture pages.
//!
//! Fixed atlases (BMFont, char map) are fully populated at load time.
//! Dynamic atlases (TrueType) own a [`GlyphRasterizer`] and fill in
//! missing code points on demand in [`FontAtlas::prepare_letter_definitions`].
//!
//! Atlases are shared between labels through [`AtlasHandle`], a cheap
//! `Rc<RefCell<_>>` handle. Lifetime is governed by the provider's
//! explicit reference counts, not by the handle count.

use std::cell::{Ref, RefCell, RefMut};
use std::collections::HashMap;
use std::rc::Rc;

use log::{debug, warn};

use crate::page::{AtlasPage, TextureInfo};

/// Identifier assigned by the provider, unique per atlas instance.
pub type AtlasId = u64;

/// Glyph placement record.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct LetterDefinition {
    /// Texel X of the glyph's top-left corner in its page.
    pub u: f32,
    /// Texel Y of the glyph's top-left corner in its page.
    pub v: f32,
    pub width: f32,
    pub height: f32,
    /// Left bearing from the pen position.
    pub offset_x: f32,
    /// Distance from the line top down to the glyph top.
    pub offset_y: f32,
    pub x_advance: f32,
    /// Page index inside the atlas.
    pub page: usize,
    /// Glyph is stored rotated 90° in the page.
    pub rotated: bool,
    pub valid: bool,
}

/// One rasterized glyph before packing.
#[derive(Clone, Debug, Default)]
pub struct GlyphBitmap {
    pub width: u32,
    pub height: u32,
    /// Alpha-only or RGBA pixels, row-major.
    pub data: Vec<u8>,
    pub offset_x: f32,
    pub offset_y: f32,
    pub x_advance: f32,
}

/// Produces glyph bitmaps for a dynamic atlas.
pub trait GlyphRasterizer {
    fn font_name(&self) -> &str;

    fn line_height(&self) -> f32;

    /// Rasterize a code point. `None` means the font has no glyph for it.
    fn rasterize(&mut self, ch: char) -> Option<GlyphBitmap>;

    /// Horizontal adjustment between two adjacent code points.
    fn kerning(&mut self, _left: char, _right: char) -> f32 {
        0.0
    }
}

/// Which loader produced the atlas.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AtlasKind {
    Ttf,
    BmFont,
    CharMap,
}

/// Glyph records and texture pages for one font configuration.
pub struct FontAtlas {
    id: AtlasId,
    kind: AtlasKind,
    font_name: String,
    line_height: f32,
    letters: HashMap<char, LetterDefinition>,
    pages: Vec<AtlasPage>,
    kerning_pairs: HashMap<(char, char), f32>,
    rasterizer: Option<Box<dyn GlyphRasterizer>>,
    original_font_size: Option<f32>,
    page_size: u32,
}

impl FontAtlas {
    /// An atlas that rasterizes glyphs on demand into `page_size` pages.
    pub fn dynamic(id: AtlasId, rasterizer: Box<dyn GlyphRasterizer>, page_size: u32) -> Self {
        Self {
            id,
            kind: AtlasKind::Ttf,
            font_name: rasterizer.font_name().to_owned(),
            line_height: rasterizer.line_height(),
            letters: HashMap::new(),
            pages: Vec::new(),
            kerning_pairs: HashMap::new(),
            rasterizer: Some(rasterizer),
            original_font_size: None,
            page_size,
        }
    }

    /// An atlas over pre-made textures; letters are added by the loader.
    pub fn fixed(
        id: AtlasId,
        kind: AtlasKind,
        font_name: impl Into<String>,
        line_height: f32,
        textures: Vec<TextureInfo>,
    ) -> Self {
        Self {
            id,
            kind,
            font_name: font_name.into(),
            line_height,
            letters: HashMap::new(),
            pages: textures.into_iter().map(AtlasPage::external).collect(),
            kerning_pairs: HashMap::new(),
            rasterizer: None,
            original_font_size: None,
            page_size: 0,
        }
    }

    pub fn id(&self) -> AtlasId {
        self.id
    }

    pub fn kind(&self) -> AtlasKind {
        self.kind
    }

    pub fn font_name(&self) -> &str {
        &self.font_name
    }

    pub fn line_height(&self) -> f32 {
        self.line_height
    }

    pub fn set_line_height(&mut self, line_height: f32) {
        self.line_height = line_height;
    }

    /// Design size of a bitmap font (BMFont `info size`).
    pub fn original_font_size(&self) -> Option<f32> {
        self.original_font_size
    }

    pub fn set_original_font_size(&mut self, size: f32) {
        self.original_font_size = Some(size);
    }

    pub fn is_dynamic(&self) -> bool {
        self.rasterizer.is_some()
    }

    pub fn add_letter_definition(&mut self, ch: char, definition: LetterDefinition) {
        self.letters.insert(ch, definition);
    }

    pub fn set_kerning_pair(&mut self, left: char, right: char, amount: f32) {
        self.kerning_pairs.insert((left, right), amount);
    }

    /// Glyph record for `ch`, if the atlas has one.
    pub fn letter_definition(&self, ch: char) -> Option<&LetterDefinition> {
        self.letters.get(&ch)
    }

    pub fn letter_count(&self) -> usize {
        self.letters.len()
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn page(&self, index: usize) -> Option<&AtlasPage> {
        self.pages.get(index)
    }

    pub fn page_mut(&mut self, index: usize) -> Option<&mut AtlasPage> {
        self.pages.get_mut(index)
    }

    pub fn texture(&self, page: usize) -> Option<&TextureInfo> {
        self.pages.get(page).map(AtlasPage::texture)
    }

    pub fn textures(&self) -> impl Iterator<Item = &TextureInfo> {
        self.pages.iter().map(AtlasPage::texture)
    }

    /// Make sure every code point of `text` has a definition.
    ///
    /// Fixed atlases are left untouched. Code points the rasterizer cannot
    /// produce get an invalid definition so they are not retried.
    pub fn prepare_letter_definitions(&mut self, text: &[char]) {
        let Some(rasterizer) = self.rasterizer.as_mut() else {
            return;
        };

        let mut added = 0usize;
        for &ch in text {
            if self.letters.contains_key(&ch) || ch == '\n' || ch == '\r' {
                continue;
            }
            let Some(bitmap) = rasterizer.rasterize(ch) else {
                self.letters.insert(ch, LetterDefinition::default());
                continue;
            };

            let mut definition = LetterDefinition {
                width: bitmap.width as f32,
                height: bitmap.height as f32,
                offset_x: bitmap.offset_x,
                offset_y: bitmap.offset_y,
                x_advance: bitmap.x_advance,
                valid: true,
                ..Default::default()
            };

            if bitmap.width > 0 && bitmap.height > 0 {
                match Self::pack(&mut self.pages, self.page_size, &bitmap) {
                    Some((page, rect)) => {
                        definition.page = page;
                        definition.u = rect.x as f32;
                        definition.v = rect.y as f32;
                    }
                    None => {
                        warn!(
                            "glyph {:?} ({}x{}) does not fit a {}px atlas page",
                            ch, bitmap.width, bitmap.height, self.page_size
                        );
                        definition.valid = false;
                    }
                }
            }

            self.letters.insert(ch, definition);
            added += 1;
        }

        if added > 0 {
            debug!(
                "atlas {} ({}): added {} glyphs, {} pages",
                self.id,
                self.font_name,
                added,
                self.pages.len()
            );
        }
    }

    fn pack(
        pages: &mut Vec<AtlasPage>,
        page_size: u32,
        bitmap: &GlyphBitmap,
    ) -> Option<(usize, crate::page::PageRect)> {
        if let Some(last) = pages.last_mut() {
            if let Some(rect) = last.insert(bitmap.width, bitmap.height, &bitmap.data) {
                return Some((pages.len() - 1, rect));
            }
        }
        let mut page = AtlasPage::new(page_size);
        let rect = page.insert(bitmap.width, bitmap.height, &bitmap.data)?;
        pages.push(page);
        Some((pages.len() - 1, rect))
    }

    /// Kerning before each character: entry `i` adjusts the gap between
    /// `text[i - 1]` and `text[i]`; entry 0 is always 0.
    pub fn horizontal_kernings(&mut self, text: &[char]) -> Vec<f32> {
        let mut kernings = vec![0.0; text.len()];
        for i in 1..text.len() {
            let pair = (text[i - 1], text[i]);
            let mut amount = self.kerning_pairs.get(&pair).copied().unwrap_or(0.0);
            if let Some(rasterizer) = self.rasterizer.as_mut() {
                amount += rasterizer.kerning(pair.0, pair.1);
            }
            kernings[i] = amount;
        }
        kernings
    }

    /// Drop every rasterized glyph and page of a dynamic atlas. Fixed
    /// atlases keep their data.
    pub fn purge(&mut self) {
        if self.rasterizer.is_none() {
            return;
        }
        self.letters.clear();
        self.pages.clear();
    }
}

/// Shared handle to a [`FontAtlas`].
#[derive(Clone)]
pub struct AtlasHandle {
    id: AtlasId,
    inner: Rc<RefCell<FontAtlas>>,
}

impl AtlasHandle {
    pub fn new(atlas: FontAtlas) -> Self {
        Self {
            id: atlas.id(),
            inner: Rc::new(RefCell::new(atlas)),
        }
    }

    pub fn id(&self) -> AtlasId {
        self.id
    }

    pub fn borrow(&self) -> Ref<'_, FontAtlas> {
        self.inner.borrow()
    }

    pub fn borrow_mut(&self) -> RefMut<'_, FontAtlas> {
        self.inner.borrow_mut()
    }

    pub fn ptr_eq(&self, other: &AtlasHandle) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl std::fmt::Debug for AtlasHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AtlasHandle").field("id", &self.id).finish()
    }
}

// ===================================================================
// Tests
// ===================================================================
