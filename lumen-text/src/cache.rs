//! Atlas cache: the default [`FontAtlasProvider`].
//!
//! Every atlas is keyed by its font configuration and carries an explicit
//! reference count. Atlases whose count drops to zero are not freed
//! immediately: they move to an LRU pool of bounded size and are revived
//! if the same configuration is requested again. LRU eviction frees them.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::rc::Weak;

use glam::Vec2;
use log::{info, warn};
use lru::LruCache;

use crate::atlas::{AtlasHandle, AtlasId, AtlasKind, FontAtlas, GlyphRasterizer};
use crate::bmfont::BmFont;
use crate::charmap::char_map_atlas_for;
use crate::error::FontError;
use crate::page::TextureId;
use crate::provider::{
    AtlasEvent, AtlasObserver, CharMapSource, FontAtlasProvider, ObserverList, StringTexture,
    SubscriptionId,
};
use crate::style::{FontDefinition, TtfConfig};

/// Glyph rasterization and system-font rendering used by the cache.
pub trait FontBackend {
    fn rasterizer(&mut self, config: &TtfConfig) -> Result<Box<dyn GlyphRasterizer>, FontError>;

    fn render_string(
        &mut self,
        text: &str,
        definition: &FontDefinition,
    ) -> Result<StringTexture, FontError>;
}

/// Cache tuning.
#[derive(Clone, Debug)]
pub struct CacheSettings {
    /// Side length of dynamic atlas pages in pixels.
    pub page_size: u32,
    /// How many unreferenced atlases are kept for reuse.
    pub retained_atlases: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            page_size: 512,
            retained_atlases: 8,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
enum AtlasKey {
    Ttf {
        font_file: String,
        size: u32,
        outline: u32,
        distance_field: bool,
        bold: bool,
        italics: bool,
    },
    Fnt {
        path: String,
        offset: (u32, u32),
    },
    CharMapTexture {
        texture: TextureId,
        item: (u32, u32),
        start: u32,
    },
    CharMapFile {
        path: PathBuf,
        item: (u32, u32),
        start: u32,
    },
}

impl AtlasKey {
    fn ttf(config: &TtfConfig) -> Self {
        Self::Ttf {
            font_file: config.font_file.clone(),
            size: config.font_size.to_bits(),
            outline: config.outline_size.to_bits(),
            distance_field: config.distance_field_enabled,
            bold: config.bold,
            italics: config.italics,
        }
    }

    fn char_map(source: &CharMapSource) -> Self {
        match source {
            CharMapSource::Texture { texture, item_width, item_height, start_char } => {
                Self::CharMapTexture {
                    texture: texture.id,
                    item: (*item_width, *item_height),
                    start: *start_char,
                }
            }
            CharMapSource::File { path, item_width, item_height, start_char } => {
                Self::CharMapFile {
                    path: path.clone(),
                    item: (*item_width, *item_height),
                    start: *start_char,
                }
            }
        }
    }
}

struct Entry {
    handle: AtlasHandle,
    refs: usize,
}

/// Reference-counted atlas cache.
pub struct AtlasCache {
    backend: Box<dyn FontBackend>,
    settings: CacheSettings,
    live: HashMap<AtlasKey, Entry>,
    retired: LruCache<AtlasKey, AtlasHandle>,
    keys: HashMap<AtlasId, AtlasKey>,
    next_id: AtlasId,
    observers: ObserverList,
}

impl AtlasCache {
    pub fn new(backend: Box<dyn FontBackend>) -> Self {
        Self::with_settings(backend, CacheSettings::default())
    }

    pub fn with_settings(backend: Box<dyn FontBackend>, settings: CacheSettings) -> Self {
        let capacity = NonZeroUsize::new(settings.retained_atlases).unwrap_or(NonZeroUsize::MIN);
        Self {
            backend,
            settings,
            live: HashMap::new(),
            retired: LruCache::new(capacity),
            keys: HashMap::new(),
            next_id: 0,
            observers: ObserverList::default(),
        }
    }

    /// Outstanding references to an atlas; 0 for retired or unknown ids.
    pub fn ref_count(&self, id: AtlasId) -> usize {
        self.keys
            .get(&id)
            .and_then(|key| self.live.get(key))
            .map_or(0, |entry| entry.refs)
    }

    /// Number of atlases with at least one reference.
    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    /// Whether an unreferenced atlas is still kept for reuse.
    pub fn is_retained(&self, id: AtlasId) -> bool {
        self.keys.get(&id).is_some_and(|key| self.retired.contains(key))
    }

    /// Drop the textures of every live TrueType atlas and tell observers
    /// to rebuild. Retained atlases are freed.
    pub fn purge_cached_data(&mut self) {
        for (_, handle) in self.retired.iter() {
            self.keys.remove(&handle.id());
        }
        self.retired.clear();

        let ttf: Vec<AtlasHandle> = self
            .live
            .values()
            .filter(|entry| entry.handle.borrow().kind() == AtlasKind::Ttf)
            .map(|entry| entry.handle.clone())
            .collect();

        for handle in ttf {
            handle.borrow_mut().purge();
            info!("purged atlas {}", handle.id());
            self.observers.notify(AtlasEvent::Purged(handle.id()));
            self.observers.notify(AtlasEvent::Reset(handle.id()));
        }
    }

    fn acquire(
        &mut self,
        key: AtlasKey,
        create: impl FnOnce(AtlasId, &mut dyn FontBackend, u32) -> Result<FontAtlas, FontError>,
    ) -> Result<AtlasHandle, FontError> {
        if let Some(entry) = self.live.get_mut(&key) {
            entry.refs += 1;
            return Ok(entry.handle.clone());
        }

        if let Some(handle) = self.retired.pop(&key) {
            info!("reviving atlas {} ({})", handle.id(), handle.borrow().font_name());
            self.live.insert(key, Entry { handle: handle.clone(), refs: 1 });
            return Ok(handle);
        }

        let id = self.next_id + 1;
        let atlas = create(id, self.backend.as_mut(), self.settings.page_size)?;
        self.next_id = id;
        let handle = AtlasHandle::new(atlas);
        info!("created atlas {} ({})", id, handle.borrow().font_name());
        self.keys.insert(id, key.clone());
        self.live.insert(key, Entry { handle: handle.clone(), refs: 1 });
        Ok(handle)
    }
}

fn read_fnt(id: AtlasId, path: &str, image_offset: Vec2) -> Result<FontAtlas, FontError> {
    let source = std::fs::read_to_string(path).map_err(|e| FontError::io(path, e))?;
    let font = BmFont::parse(&source)?;
    let base_dir = Path::new(path).parent().unwrap_or_else(|| Path::new(""));
    Ok(font.into_atlas(id, base_dir, image_offset))
}

impl FontAtlasProvider for AtlasCache {
    fn atlas_ttf(&mut self, config: &TtfConfig) -> Result<AtlasHandle, FontError> {
        self.acquire(AtlasKey::ttf(config), |id, backend, page_size| {
            Ok(FontAtlas::dynamic(id, backend.rasterizer(config)?, page_size))
        })
    }

    fn atlas_fnt(&mut self, path: &str, image_offset: Vec2) -> Result<AtlasHandle, FontError> {
        let key = AtlasKey::Fnt {
            path: path.to_owned(),
            offset: (image_offset.x.to_bits(), image_offset.y.to_bits()),
        };
        self.acquire(key, |id, _, _| read_fnt(id, path, image_offset))
    }

    fn atlas_char_map(&mut self, source: &CharMapSource) -> Result<AtlasHandle, FontError> {
        self.acquire(AtlasKey::char_map(source), |id, _, _| char_map_atlas_for(id, source))
    }

    fn release(&mut self, atlas: &AtlasHandle) {
        let id = atlas.id();
        let Some(key) = self.keys.get(&id).cloned() else {
            warn!("release of unknown atlas {id}");
            return;
        };
        let Some(entry) = self.live.get_mut(&key) else {
            warn!("release of unreferenced atlas {id}");
            return;
        };

        entry.refs -= 1;
        if entry.refs > 0 {
            return;
        }

        if let Some(entry) = self.live.remove(&key) {
            if let Some((_, evicted)) = self.retired.push(key, entry.handle) {
                info!("evicted atlas {}", evicted.id());
                self.keys.remove(&evicted.id());
            }
        }
    }

    fn render_string(
        &mut self,
        text: &str,
        definition: &FontDefinition,
    ) -> Result<StringTexture, FontError> {
        self.backend.render_string(text, definition)
    }

    fn subscribe(&mut self, observer: Weak<dyn AtlasObserver>) -> SubscriptionId {
        self.observers.subscribe(observer)
    }

    fn unsubscribe(&mut self, id: SubscriptionId) {
        self.observers.unsubscribe(id);
    }
}

// ===================================================================
// Tests
// ===================================================================

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::rc::Rc;

    use super::*;
    use crate::atlas::GlyphBitmap;
    use crate::page::TextureInfo;
    use crate::provider::AtlasMailbox;

    struct SquareRasterizer(f32);

    impl GlyphRasterizer for SquareRasterizer {
        fn font_name(&self) -> &str {
            "square"
        }

        fn line_height(&self) -> f32 {
            self.0
        }

        fn rasterize(&mut self, _ch: char) -> Option<GlyphBitmap> {
            let side = self.0 as u32;
            Some(GlyphBitmap {
                width: side,
                height: side,
                data: vec![255; (side * side) as usize],
                x_advance: self.0,
                ..Default::default()
            })
        }
    }

    struct SquareBackend;

    impl FontBackend for SquareBackend {
        fn rasterizer(&mut self, config: &TtfConfig) -> Result<Box<dyn GlyphRasterizer>, FontError> {
            if config.font_file.is_empty() {
                return Err(FontError::FileNotFound(PathBuf::new()));
            }
            Ok(Box::new(SquareRasterizer(config.font_size)))
        }

        fn render_string(
            &mut self,
            _text: &str,
            _definition: &FontDefinition,
        ) -> Result<StringTexture, FontError> {
            Err(FontError::Unsupported("no system fonts".into()))
        }
    }

    fn cache(retained: usize) -> AtlasCache {
        AtlasCache::with_settings(
            Box::new(SquareBackend),
            CacheSettings { page_size: 64, retained_atlases: retained },
        )
    }

    #[test]
    fn test_same_config_shares_atlas() {
        let mut cache = cache(4);
        let a = cache.atlas_ttf(&TtfConfig::new("a.ttf", 8.0)).unwrap();
        let b = cache.atlas_ttf(&TtfConfig::new("a.ttf", 8.0)).unwrap();
        assert!(a.ptr_eq(&b));
        assert_eq!(cache.ref_count(a.id()), 2);

        let c = cache.atlas_ttf(&TtfConfig::new("a.ttf", 9.0)).unwrap();
        assert_ne!(a.id(), c.id());
        assert_eq!(cache.live_count(), 2);
    }

    #[test]
    fn test_release_retains_then_revives() {
        let mut cache = cache(4);
        let config = TtfConfig::new("a.ttf", 8.0);
        let a = cache.atlas_ttf(&config).unwrap();
        cache.release(&a);
        assert_eq!(cache.ref_count(a.id()), 0);
        assert!(cache.is_retained(a.id()));
        assert_eq!(cache.live_count(), 0);

        let again = cache.atlas_ttf(&config).unwrap();
        assert!(again.ptr_eq(&a));
        assert_eq!(cache.ref_count(a.id()), 1);
        assert!(!cache.is_retained(a.id()));
    }

    #[test]
    fn test_lru_evicts_oldest_released() {
        let mut cache = cache(1);
        let a = cache.atlas_ttf(&TtfConfig::new("a.ttf", 8.0)).unwrap();
        let b = cache.atlas_ttf(&TtfConfig::new("b.ttf", 8.0)).unwrap();
        cache.release(&a);
        cache.release(&b);
        assert!(!cache.is_retained(a.id()));
        assert!(cache.is_retained(b.id()));

        let fresh = cache.atlas_ttf(&TtfConfig::new("a.ttf", 8.0)).unwrap();
        assert_ne!(fresh.id(), a.id());
    }

    #[test]
    fn test_over_release_is_ignored() {
        let mut cache = cache(4);
        let a = cache.atlas_ttf(&TtfConfig::new("a.ttf", 8.0)).unwrap();
        cache.release(&a);
        cache.release(&a);
        assert_eq!(cache.ref_count(a.id()), 0);
        assert!(cache.is_retained(a.id()));
    }

    #[test]
    fn test_failed_creation_does_not_register() {
        let mut cache = cache(4);
        assert!(cache.atlas_ttf(&TtfConfig::new("", 8.0)).is_err());
        assert_eq!(cache.live_count(), 0);
        let ok = cache.atlas_ttf(&TtfConfig::new("a.ttf", 8.0)).unwrap();
        assert_eq!(ok.id(), 1);
    }

    #[test]
    fn test_purge_notifies_observers() {
        let mut cache = cache(4);
        let mailbox = AtlasMailbox::new();
        let weak: Weak<dyn AtlasObserver> = Rc::downgrade(&mailbox) as Weak<dyn AtlasObserver>;
        cache.subscribe(weak);

        let atlas = cache.atlas_ttf(&TtfConfig::new("a.ttf", 8.0)).unwrap();
        atlas.borrow_mut().prepare_letter_definitions(&['x', 'y']);
        assert_eq!(atlas.borrow().letter_count(), 2);

        cache.purge_cached_data();
        assert_eq!(atlas.borrow().letter_count(), 0);
        assert_eq!(
            mailbox.drain(),
            vec![AtlasEvent::Purged(atlas.id()), AtlasEvent::Reset(atlas.id())]
        );
    }

    #[test]
    fn test_fnt_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("digits.fnt");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "info face=\"Digits\" size=16").unwrap();
        writeln!(file, "common lineHeight=18 base=14 scaleW=64 scaleH=64 pages=1").unwrap();
        writeln!(file, "page id=0 file=\"digits.png\"").unwrap();
        writeln!(file, "char id=49 x=0 y=0 width=8 height=14 xoffset=0 yoffset=2 xadvance=9 page=0").unwrap();
        drop(file);

        let mut cache = cache(4);
        let path_str = path.to_str().unwrap();
        let atlas = cache.atlas_fnt(path_str, Vec2::ZERO).unwrap();
        assert_eq!(atlas.borrow().kind(), AtlasKind::BmFont);
        assert_eq!(atlas.borrow().letter_definition('1').unwrap().x_advance, 9.0);

        let same = cache.atlas_fnt(path_str, Vec2::ZERO).unwrap();
        assert!(same.ptr_eq(&atlas));
        let shifted = cache.atlas_fnt(path_str, Vec2::new(4.0, 0.0)).unwrap();
        assert!(!shifted.ptr_eq(&atlas));
    }

    #[test]
    fn test_missing_fnt_is_file_not_found() {
        let mut cache = cache(4);
        let err = cache.atlas_fnt("nowhere/missing.fnt", Vec2::ZERO).unwrap_err();
        assert!(matches!(err, FontError::FileNotFound(_)));
    }

    #[test]
    fn test_char_map_from_texture() {
        let mut cache = cache(4);
        let source = CharMapSource::Texture {
            texture: TextureInfo::memory(32, 32),
            item_width: 16,
            item_height: 16,
            start_char: 'a' as u32,
        };
        let atlas = cache.atlas_char_map(&source).unwrap();
        assert_eq!(atlas.borrow().letter_count(), 4);
        assert!(cache.atlas_char_map(&source).unwrap().ptr_eq(&atlas));
        assert_eq!(cache.ref_count(atlas.id()), 2);
    }

    #[test]
    fn test_missing_char_map_file() {
        let mut cache = cache(4);
        let source = CharMapSource::File {
            path: PathBuf::from("nowhere/chars.png"),
            item_width: 8,
            item_height: 8,
            start_char: 32,
        };
        assert!(matches!(cache.atlas_char_map(&source), Err(FontError::FileNotFound(_))));
    }
}
