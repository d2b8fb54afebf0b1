//! # lumen-label
//!
//! Text labels for Lumen: layout, glyph batching, effects and draw-command
//! emission on top of the font atlases from `lumen-text`.
//!
//! ## Architecture
//!
//! ```text
//!  Label setters ──► dirty flags
//!       │
//!       ▼  ensure_layout() / visit()
//!  layout::layout_text()          ◀─── wrap, align, clamp, shrink
//!       │
//!       ▼
//!  QuadAtlas per page            ◀─── letter proxies write through
//!       │
//!       ▼
//!  Renderer.add_command()         ◀─── shadow → outline → text → lines
//! ```
//!
//! ## Crate modules
//!
//! - [`label`]: the `Label` facade, letters, effects and emission
//! - [`layout`]: word/char wrapping, alignment, clamp predicates, shrink search
//! - [`quad`]: `Pod` vertices, quads and per-page quad batches
//! - [`shader`]: program selection and uniform state
//! - [`command`]: draw commands and the `Renderer` trait
//! - [`node`]: node transform state and draw flags
//! - [`config`]: label settings
//! - `testing`: deterministic provider and recording renderer (feature `testing`)

pub mod command;
pub mod config;
pub mod label;
pub mod layout;
pub mod node;
pub mod quad;
pub mod shader;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-exports for convenience
pub use command::{BlendFunc, RenderCommand, Renderer};
pub use config::{LabelSettings, ShrinkPolicy};
pub use label::{Label, LetterMut};
pub use layout::{LetterInfo, TextLayout};
pub use node::{DrawFlags, NodeState, Rect};
pub use shader::{LabelEffect, LabelType, ProgramType};
