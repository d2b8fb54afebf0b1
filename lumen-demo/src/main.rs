//! Lumen demo: lays out a handful of labels and prints the draw commands
//! they emit for a few frames.
//!
//! ```text
//! RUST_LOG=info cargo run -p lumen-demo [font-file-or-family]
//! ```
//!
//! Glyphs come from cosmic-text through `AtlasCache`. Pass `--fixed` to use
//! the deterministic monospace provider instead.

mod frame;

use std::cell::RefCell;
use std::rc::Rc;

use glam::{Mat4, Vec2};
use log::{info, warn};
use lumen_label::testing::FixedGlyphProvider;
use lumen_label::{DrawFlags, Label, LabelEffect};
use lumen_text::{
    AtlasCache, CharMapSource, Color3B, Color4B, CosmicBackend, Overflow, SharedProvider,
    TextHAlignment, TextVAlignment, TextureInfo, TtfConfig,
};

use frame::LogRenderer;

const VIEWPORT: Vec2 = Vec2::new(800.0, 600.0);

fn build_scene(provider: &SharedProvider, font: &str) -> Vec<Label> {
    let mut labels = Vec::new();

    let mut title = Label::new(Rc::clone(provider));
    match title.set_ttf_config(&TtfConfig::new(font, 32.0)) {
        Ok(()) => {
            title.set_string("Lumen labels");
            title.enable_outline(Color4B::new(40, 40, 160, 255), 2.0);
            title.enable_shadow(Color4B::BLACK, Vec2::new(2.0, -2.0));
        }
        Err(err) => {
            warn!("font {font:?} unavailable ({err}); title falls back to the system font");
            title.set_string("Lumen labels (system font)");
            title.set_system_font_size(32.0);
        }
    }
    title.set_position(Vec2::new(40.0, 540.0));
    labels.push(title);

    let mut body = Label::new(Rc::clone(provider));
    if body.set_ttf_config(&TtfConfig::new(font, 16.0)).is_ok() {
        body.set_string(
            "Text wraps inside a fixed width box and shrinks when it would overflow the height.",
        );
        body.set_dimensions(300.0, 60.0);
        body.set_alignment(TextHAlignment::Center, TextVAlignment::Center);
        body.set_overflow(Overflow::Shrink);
        body.enable_underline();
        body.set_position(Vec2::new(40.0, 400.0));
        labels.push(body);
    }

    let digits = CharMapSource::Texture {
        texture: TextureInfo::memory(160, 24),
        item_width: 16,
        item_height: 24,
        start_char: '0' as u32,
    };
    match Label::with_char_map(Rc::clone(provider), &digits) {
        Ok(mut score) => {
            score.set_string("0042");
            score.set_color(Color3B::new(255, 220, 0));
            score.set_position(Vec2::new(700.0, 560.0));
            labels.push(score);
        }
        Err(err) => warn!("char map unavailable: {err}"),
    }

    let mut offscreen = Label::new(Rc::clone(provider));
    offscreen.set_string("never drawn");
    offscreen.set_position(Vec2::new(-500.0, -500.0));
    labels.push(offscreen);

    labels
}

fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let fixed = args.iter().any(|arg| arg == "--fixed");
    let font = args
        .iter()
        .find(|arg| !arg.starts_with("--"))
        .cloned()
        .unwrap_or_else(|| if fixed { "mono".into() } else { "sans-serif".into() });

    info!("Starting Lumen demo with font {font:?}");
    let provider: SharedProvider = if fixed {
        Rc::new(RefCell::new(FixedGlyphProvider::new()))
    } else {
        Rc::new(RefCell::new(AtlasCache::new(Box::new(CosmicBackend::new()))))
    };

    let mut labels = build_scene(&provider, &font);
    let mut renderer = LogRenderer::new(VIEWPORT);

    for frame in 0..3 {
        renderer.begin_frame();
        for label in &mut labels {
            label.visit(&mut renderer, &Mat4::IDENTITY, DrawFlags::empty());
        }
        renderer.end_frame();

        if frame == 0 {
            if let Some(title) = labels.first_mut() {
                title.enable_bold();
                if let Some(mut letter) = title.letter(0) {
                    letter.set_scale(1.5);
                }
            }
        }
        if frame == 1 {
            for label in &mut labels {
                label.disable_effect(LabelEffect::All);
            }
        }
    }

    for label in &mut labels {
        let size = label.content_size();
        let lines = label.string_num_lines();
        info!(
            "{:?}: {lines} line(s), {:.0}x{:.0}, font size {}",
            label.string(),
            size.x,
            size.y,
            label.rendering_font_size()
        );
    }
}
