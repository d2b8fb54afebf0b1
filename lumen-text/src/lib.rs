//! # lumen-text
//!
//! Font side of the Lumen label engine: glyph atlases, the reference-counted
//! atlas cache, BMFont and char-map loaders, and a `cosmic-text` backend
//! for TrueType glyphs and system-font strings.
//!
//! ## Architecture
//!
//! ```text
//! Label ──acquire/release──► FontAtlasProvider (AtlasCache)
//!                                 │
//!          ┌──────────────────────┼───────────────────────┐
//!          ▼                      ▼                       ▼
//!    TTF: CosmicBackend     FNT: bmfont parser     CharMap: grid
//!          │                      │                       │
//!          └──────────► FontAtlas (letters + pages) ◄─────┘
//!                                 │
//!                                 ▼
//!                   AtlasPage (shelf-packed / file texture)
//! ```
//!
//! - **`style`**: alignment, overflow, colors, font requests.
//! - **`page`**: texture pages and the shelf packer.
//! - **`atlas`**: letter definitions, kerning, on-demand rasterization.
//! - **`provider`**: the provider trait and atlas lifecycle events.
//! - **`cache`**: reference-counted provider with an LRU retirement pool.
//! - **`bmfont`** / **`charmap`**: fixed atlas loaders.
//! - **`engine`**: cosmic-text rasterizer and string renderer.

pub mod atlas;
pub mod bmfont;
pub mod cache;
pub mod charmap;
pub mod engine;
pub mod error;
pub mod page;
pub mod provider;
pub mod style;

// Re-exports for ergonomic use.
pub use atlas::{AtlasHandle, AtlasId, AtlasKind, FontAtlas, GlyphBitmap, GlyphRasterizer, LetterDefinition};
pub use cache::{AtlasCache, CacheSettings, FontBackend};
pub use charmap::{char_map_atlas, char_map_atlas_for};
pub use engine::{CosmicBackend, CosmicRasterizer, TextEngine};
pub use error::FontError;
pub use page::{AtlasPage, PageRect, TextureId, TextureInfo, TextureSource};
pub use provider::{
    AtlasEvent, AtlasMailbox, AtlasObserver, CharMapSource, FontAtlasProvider, ObserverList,
    SharedProvider, StringTexture, SubscriptionId,
};
pub use style::{
    Color3B, Color4B, Color4F, FontDefinition, Overflow, StrokeDefinition, TextHAlignment,
    TextVAlignment, TtfConfig,
};
