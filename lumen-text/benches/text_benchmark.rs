use criterion::{black_box, criterion_group, criterion_main, Criterion};
use lumen_text::bmfont::BmFont;
use lumen_text::{AtlasPage, CosmicBackend, FontAtlas, FontBackend, TtfConfig};

fn bench_page_insert(c: &mut Criterion) {
    let bitmap = vec![200u8; 16 * 16]; // alpha-only 16x16 glyph

    c.bench_function("page_insert_16x16", |b| {
        let mut page = AtlasPage::new(1024);
        b.iter(|| {
            if page.insert(16, 16, black_box(&bitmap)).is_none() {
                page.clear();
            }
        });
    });
}

fn bench_prepare_letters(c: &mut Criterion) {
    let mut backend = CosmicBackend::new();
    let text: Vec<char> = "The quick brown fox jumps over the lazy dog 0123456789"
        .chars()
        .collect();

    c.bench_function("prepare_letter_definitions", |b| {
        b.iter(|| {
            let Ok(rasterizer) = backend.rasterizer(&TtfConfig::new("sans-serif", 18.0)) else {
                return;
            };
            let mut atlas = FontAtlas::dynamic(1, rasterizer, 512);
            atlas.prepare_letter_definitions(black_box(&text));
            black_box(atlas.letter_count())
        });
    });
}

fn bench_bmfont_parse(c: &mut Criterion) {
    let mut source = String::from(
        "info face=\"Bench\" size=32\ncommon lineHeight=36 base=29 scaleW=512 scaleH=512 pages=1\n\
         page id=0 file=\"bench.png\"\n",
    );
    for id in 32..127u32 {
        source.push_str(&format!(
            "char id={id} x={} y={} width=20 height=24 xoffset=0 yoffset=5 xadvance=21 page=0\n",
            (id % 16) * 24,
            (id / 16) * 28
        ));
    }

    c.bench_function("bmfont_parse_95_chars", |b| {
        b.iter(|| BmFont::parse(black_box(&source)));
    });
}

criterion_group!(benches, bench_page_insert, bench_prepare_letters, bench_bmfont_parse);
criterion_main!(benches);
