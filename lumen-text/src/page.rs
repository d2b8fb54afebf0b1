//! Atlas pages: one texture each.
//!
//! A page is either packed in memory (dynamic TrueType atlases) or refers
//! to an external image file (BMFont pages, char-map images).
//!
//! In-memory pages use a row-based "shelf" packer: each shelf is as tall
//! as the tallest glyph placed on it, and a glyph that does not fit the
//! existing shelves opens a new one below. When no shelf has room the
//! caller opens a new page.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};

use glam::Vec2;

static NEXT_TEXTURE_ID: AtomicU32 = AtomicU32::new(1);

/// Process-unique texture identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub u32);

impl TextureId {
    pub fn next() -> Self {
        Self(NEXT_TEXTURE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Where a texture's pixels live.
#[derive(Clone, Debug, PartialEq)]
pub enum TextureSource {
    /// Pixels are owned by the [`AtlasPage`] (RGBA8).
    Memory,
    /// Pixels are in an image file the renderer loads itself.
    File(PathBuf),
}

/// Texture description handed to the renderer.
#[derive(Clone, Debug, PartialEq)]
pub struct TextureInfo {
    pub id: TextureId,
    pub width: u32,
    pub height: u32,
    pub premultiplied_alpha: bool,
    pub source: TextureSource,
}

impl TextureInfo {
    pub fn memory(width: u32, height: u32) -> Self {
        Self {
            id: TextureId::next(),
            width,
            height,
            premultiplied_alpha: false,
            source: TextureSource::Memory,
        }
    }

    pub fn file(path: impl Into<PathBuf>, width: u32, height: u32) -> Self {
        Self {
            id: TextureId::next(),
            width,
            height,
            premultiplied_alpha: false,
            source: TextureSource::File(path.into()),
        }
    }

    pub fn size(&self) -> Vec2 {
        Vec2::new(self.width as f32, self.height as f32)
    }
}

/// Pixel-space rectangle within a page.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

struct Shelf {
    y: u32,
    height: u32,
    cursor_x: u32,
}

/// One texture page of a font atlas.
pub struct AtlasPage {
    texture: TextureInfo,
    /// RGBA pixel data for memory pages, empty for file pages.
    pixels: Vec<u8>,
    /// Whether pixels changed since the last upload.
    dirty: bool,
    shelves: Vec<Shelf>,
    padding: u32,
    placed: usize,
}

impl AtlasPage {
    /// A square in-memory page of `size × size` pixels.
    pub fn new(size: u32) -> Self {
        let pixel_count = (size as usize) * (size as usize) * 4;
        Self {
            texture: TextureInfo::memory(size, size),
            pixels: vec![0u8; pixel_count],
            dirty: false,
            shelves: Vec::new(),
            padding: 1,
            placed: 0,
        }
    }

    /// A page backed by an external texture. Nothing can be packed into it.
    pub fn external(texture: TextureInfo) -> Self {
        Self {
            texture,
            pixels: Vec::new(),
            dirty: false,
            shelves: Vec::new(),
            padding: 0,
            placed: 0,
        }
    }

    pub fn texture(&self) -> &TextureInfo {
        &self.texture
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_clean(&mut self) {
        self.dirty = false;
    }

    /// Number of bitmaps packed so far.
    pub fn glyph_count(&self) -> usize {
        self.placed
    }

    /// Pack a bitmap into the page.
    ///
    /// `bitmap` is alpha-only (`width * height` bytes, expanded to white
    /// RGBA) or RGBA (`width * height * 4` bytes). Returns `None` when the
    /// page is external or full.
    pub fn insert(&mut self, width: u32, height: u32, bitmap: &[u8]) -> Option<PageRect> {
        if self.texture.source != TextureSource::Memory {
            return None;
        }
        let rect = self.allocate(width, height)?;
        self.blit(&rect, bitmap);
        self.placed += 1;
        self.dirty = true;
        Some(rect)
    }

    /// Drop all packed bitmaps.
    pub fn clear(&mut self) {
        self.pixels.fill(0);
        self.shelves.clear();
        self.placed = 0;
        self.dirty = true;
    }

    // ---------------------------------------------------------------
    // Internal helpers
    // ---------------------------------------------------------------

    fn allocate(&mut self, width: u32, height: u32) -> Option<PageRect> {
        let size = self.texture.width;
        let padded_w = width + self.padding;
        let padded_h = height + self.padding;

        for shelf in &mut self.shelves {
            if shelf.height >= padded_h && shelf.cursor_x + padded_w <= size {
                let rect = PageRect { x: shelf.cursor_x, y: shelf.y, width, height };
                shelf.cursor_x += padded_w;
                return Some(rect);
            }
        }

        let shelf_y = self.shelves.last().map(|s| s.y + s.height).unwrap_or(0);
        if shelf_y + padded_h > self.texture.height || padded_w > size {
            return None;
        }

        self.shelves.push(Shelf { y: shelf_y, height: padded_h, cursor_x: padded_w });
        Some(PageRect { x: 0, y: shelf_y, width, height })
    }

    fn blit(&mut self, rect: &PageRect, bitmap: &[u8]) {
        let (width, height) = (rect.width, rect.height);
        let is_rgba = bitmap.len() >= (width * height * 4) as usize;
        let is_alpha = !is_rgba && bitmap.len() >= (width * height) as usize;
        let stride = self.texture.width;

        for row in 0..height {
            for col in 0..width {
                let dst = (((rect.y + row) * stride + rect.x + col) * 4) as usize;
                if dst + 3 >= self.pixels.len() {
                    continue;
                }
                if is_rgba {
                    let src = ((row * width + col) * 4) as usize;
                    self.pixels[dst..dst + 4].copy_from_slice(&bitmap[src..src + 4]);
                } else if is_alpha {
                    let alpha = bitmap[(row * width + col) as usize];
                    self.pixels[dst..dst + 4].copy_from_slice(&[255, 255, 255, alpha]);
                }
            }
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
    fn test_page_creation() {
        let page = AtlasPage::new(256);
        assert_eq!(page.texture().width, 256);
        assert_eq!(page.pixels().len(), 256 * 256 * 4);
        assert_eq!(page.glyph_count(), 0);
        assert!(!page.is_dirty());
    }

    #[test]
    fn test_texture_ids_are_unique() {
        let a = AtlasPage::new(16);
        let b = AtlasPage::new(16);
        assert_ne!(a.texture().id, b.texture().id);
    }

    #[test]
    fn test_insert_marks_dirty() {
        let mut page = AtlasPage::new(256);
        let rect = page.insert(8, 8, &[255u8; 64]).unwrap();
        assert_eq!(rect, PageRect { x: 0, y: 0, width: 8, height: 8 });
        assert!(page.is_dirty());
        page.mark_clean();
        assert!(!page.is_dirty());
    }

    #[test]
    fn test_page_full_returns_none() {
        // 30x30 + 1px padding = 31px: two per row, two shelves.
        let mut page = AtlasPage::new(64);
        let bitmap = vec![255u8; 30 * 30];
        for _ in 0..4 {
            assert!(page.insert(30, 30, &bitmap).is_some());
        }
        assert!(page.insert(30, 30, &bitmap).is_none(), "page should be full");
    }

    #[test]
    fn test_external_page_rejects_inserts() {
        let mut page = AtlasPage::external(TextureInfo::file("font.png", 128, 128));
        assert!(page.insert(4, 4, &[0u8; 16]).is_none());
        assert!(page.pixels().is_empty());
    }

    #[test]
    fn test_alpha_bitmap_expands_to_white() {
        let mut page = AtlasPage::new(16);
        page.insert(1, 1, &[77]).unwrap();
        assert_eq!(&page.pixels()[0..4], &[255, 255, 255, 77]);
    }

    #[test]
    fn test_rgba_bitmap_blit() {
        let mut page = AtlasPage::new(16);
        let bitmap = [
            255, 0, 0, 255, 0, 255, 0, 255, //
            0, 0, 255, 255, 255, 255, 0, 255,
        ];
        page.insert(2, 2, &bitmap).unwrap();
        assert_eq!(&page.pixels()[0..4], &[255, 0, 0, 255]);
        let second_row = (16 * 4) as usize;
        assert_eq!(&page.pixels()[second_row..second_row + 4], &[0, 0, 255, 255]);
    }

    #[test]
    fn test_shelf_packing_fills_rows() {
        let mut page = AtlasPage::new(128);
        let bitmap = vec![128u8; 10 * 10];
        for _ in 0..11 {
            page.insert(10, 10, &bitmap).unwrap();
        }
        // 11 * 11 = 121 <= 128: one shelf.
        assert_eq!(page.shelves.len(), 1);
        page.insert(10, 10, &bitmap).unwrap();
        assert_eq!(page.shelves.len(), 2);
    }

    #[test]
    fn test_clear_resets_packing() {
        let mut page = AtlasPage::new(32);
        page.insert(8, 8, &[255u8; 64]).unwrap();
        page.clear();
        assert_eq!(page.glyph_count(), 0);
        assert!(page.pixels().iter().all(|&b| b == 0));
        let rect = page.insert(8, 8, &[255u8; 64]).unwrap();
        assert_eq!((rect.x, rect.y), (0, 0));
    }
}
