use std::cell::RefCell;
use std::rc::Rc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use glam::Mat4;
use lumen_label::layout::{layout_text, LayoutParams};
use lumen_label::testing::{FixedGlyphProvider, MonoRasterizer, RecordingRenderer};
use lumen_label::{DrawFlags, Label};
use lumen_text::{FontAtlas, Overflow, TtfConfig};

const PARAGRAPH: &str = "The quick brown fox jumps over the lazy dog.\n\
    Pack my box with five dozen liquor jugs. How vexingly quick daft zebras jump!";

fn bench_layout(c: &mut Criterion) {
    let config = TtfConfig::new("mono", 18.0);
    let mut atlas = FontAtlas::dynamic(1, Box::new(MonoRasterizer::new("mono", &config)), 512);
    let text: Vec<char> = PARAGRAPH.chars().collect();
    atlas.prepare_letter_definitions(&text);
    let kernings = atlas.horizontal_kernings(&text);
    let params = LayoutParams { max_line_width: 180.0, line_height: 18.0, ..Default::default() };

    c.bench_function("layout_wrapped_paragraph", |b| {
        b.iter(|| layout_text(&atlas, black_box(&text), &kernings, black_box(&params)));
    });
}

fn bench_relayout(c: &mut Criterion) {
    let provider = Rc::new(RefCell::new(FixedGlyphProvider::new()));
    let mut label = Label::new(provider);
    if label.set_ttf_config(&TtfConfig::new("mono", 18.0)).is_err() {
        return;
    }
    label.set_dimensions(180.0, 0.0);

    let mut flip = false;
    c.bench_function("label_set_string_and_layout", |b| {
        b.iter(|| {
            flip = !flip;
            label.set_string(if flip { PARAGRAPH } else { "short" });
            label.ensure_layout();
            black_box(label.string_num_lines())
        });
    });
}

fn bench_shrink(c: &mut Criterion) {
    let provider = Rc::new(RefCell::new(FixedGlyphProvider::new()));
    let mut label = Label::new(provider);
    if label.set_ttf_config(&TtfConfig::new("mono", 40.0)).is_err() {
        return;
    }
    label.set_dimensions(200.0, 60.0);
    label.set_string(PARAGRAPH);

    c.bench_function("label_shrink_to_fit", |b| {
        b.iter(|| {
            label.set_overflow(Overflow::None);
            label.set_overflow(Overflow::Shrink);
            label.ensure_layout();
            black_box(label.rendering_font_size())
        });
    });
}

fn bench_visit(c: &mut Criterion) {
    let provider = Rc::new(RefCell::new(FixedGlyphProvider::new()));
    let mut label = Label::new(provider);
    if label.set_ttf_config(&TtfConfig::new("mono", 18.0)).is_err() {
        return;
    }
    label.set_string(PARAGRAPH);
    label.enable_shadow(lumen_text::Color4B::BLACK, glam::Vec2::new(2.0, -2.0));
    let mut renderer = RecordingRenderer::default();

    c.bench_function("label_visit_with_shadow", |b| {
        b.iter(|| {
            renderer.clear();
            label.visit(&mut renderer, black_box(&Mat4::IDENTITY), DrawFlags::TRANSFORM_DIRTY);
            black_box(renderer.commands.len())
        });
    });
}

criterion_group!(benches, bench_layout, bench_relayout, bench_shrink, bench_visit);
criterion_main!(benches);
