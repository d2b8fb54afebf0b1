//! AngelCode BMFont loader (text `.fnt` format).
//!
//! ```text
//! info face="Arial" size=32 bold=0 italic=0
//! common lineHeight=36 base=29 scaleW=256 scaleH=256 pages=1
//! page id=0 file="arial_0.png"
//! chars count=95
//! char id=65 x=0 y=0 width=20 height=24 xoffset=0 yoffset=5 xadvance=21 page=0 chnl=15
//! kernings count=1
//! kerning first=65 second=86 amount=-2
//! ```

use std::path::Path;

use glam::Vec2;
use log::warn;

use crate::atlas::{AtlasId, AtlasKind, FontAtlas, LetterDefinition};
use crate::error::FontError;
use crate::page::TextureInfo;

/// Upper bound on page ids when `common` does not declare a page count.
const MAX_PAGES: usize = 256;

/// One `char` line.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BmChar {
    pub id: u32,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub x_offset: f32,
    pub y_offset: f32,
    pub x_advance: f32,
    pub page: usize,
}

/// Parsed contents of a `.fnt` file.
#[derive(Clone, Debug, Default)]
pub struct BmFont {
    pub face: String,
    pub size: f32,
    pub line_height: f32,
    pub base: f32,
    pub scale_w: u32,
    pub scale_h: u32,
    /// Page image file names, indexed by page id.
    pub pages: Vec<String>,
    pub chars: Vec<BmChar>,
    pub kernings: Vec<(u32, u32, f32)>,
}

impl BmFont {
    pub fn parse(source: &str) -> Result<Self, FontError> {
        let mut font = BmFont::default();
        let mut saw_common = false;
        let mut declared_pages = None;

        for (index, raw) in source.lines().enumerate() {
            let line_no = index + 1;
            let line = raw.trim();
            if line.is_empty() {
                continue;
            }
            let (tag, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
            let attrs = Attributes::parse(rest, line_no)?;

            match tag {
                "info" => {
                    font.face = attrs.get("face").unwrap_or_default().to_owned();
                    font.size = attrs.number::<f32>("size")?.unwrap_or(0.0).abs();
                }
                "common" => {
                    saw_common = true;
                    font.line_height = attrs.required::<f32>("lineHeight")?;
                    font.base = attrs.number::<f32>("base")?.unwrap_or(0.0);
                    font.scale_w = attrs.required::<u32>("scaleW")?;
                    font.scale_h = attrs.required::<u32>("scaleH")?;
                    declared_pages = attrs.number::<usize>("pages")?;
                }
                "page" => {
                    let id = attrs.required::<usize>("id")?;
                    let limit = declared_pages.map_or(MAX_PAGES, |pages: usize| pages.min(MAX_PAGES));
                    if id >= limit {
                        return Err(attrs.error(format!("page id {id} out of range (pages={limit})")));
                    }
                    let file = attrs.get("file").ok_or_else(|| attrs.error("missing `file`"))?;
                    if font.pages.len() <= id {
                        font.pages.resize(id + 1, String::new());
                    }
                    font.pages[id] = file.to_owned();
                }
                "char" => font.chars.push(BmChar {
                    id: attrs.required("id")?,
                    x: attrs.required("x")?,
                    y: attrs.required("y")?,
                    width: attrs.required("width")?,
                    height: attrs.required("height")?,
                    x_offset: attrs.number("xoffset")?.unwrap_or(0.0),
                    y_offset: attrs.number("yoffset")?.unwrap_or(0.0),
                    x_advance: attrs.number("xadvance")?.unwrap_or(0.0),
                    page: attrs.number("page")?.unwrap_or(0),
                }),
                "kerning" => font.kernings.push((
                    attrs.required("first")?,
                    attrs.required("second")?,
                    attrs.required("amount")?,
                )),
                "chars" | "kernings" => {}
                other => warn!("bmfont: ignoring unknown block `{other}` at line {line_no}"),
            }
        }

        if !saw_common {
            return Err(FontError::MissingBlock("common"));
        }
        if font.pages.is_empty() {
            return Err(FontError::MissingBlock("page"));
        }
        Ok(font)
    }

    /// Build a fixed atlas. Page images are resolved relative to `base_dir`.
    pub fn into_atlas(self, id: AtlasId, base_dir: &Path, image_offset: Vec2) -> FontAtlas {
        let textures = self
            .pages
            .iter()
            .map(|file| TextureInfo::file(base_dir.join(file), self.scale_w, self.scale_h))
            .collect();
        let mut atlas = FontAtlas::fixed(id, AtlasKind::BmFont, self.face, self.line_height, textures);
        atlas.set_original_font_size(self.size);

        for c in &self.chars {
            let Some(ch) = char::from_u32(c.id) else {
                warn!("bmfont: skipping invalid code point {}", c.id);
                continue;
            };
            if c.page >= atlas.page_count() {
                warn!("bmfont: char {} refers to missing page {}", c.id, c.page);
                continue;
            }
            atlas.add_letter_definition(
                ch,
                LetterDefinition {
                    u: c.x + image_offset.x,
                    v: c.y + image_offset.y,
                    width: c.width,
                    height: c.height,
                    offset_x: c.x_offset,
                    offset_y: c.y_offset,
                    x_advance: c.x_advance,
                    page: c.page,
                    rotated: false,
                    valid: true,
                },
            );
        }

        for &(first, second, amount) in &self.kernings {
            if let (Some(l), Some(r)) = (char::from_u32(first), char::from_u32(second)) {
                atlas.set_kerning_pair(l, r, amount);
            }
        }
        atlas
    }
}

/// `key=value` pairs of one line; values may be double-quoted.
struct Attributes<'a> {
    line: usize,
    pairs: Vec<(&'a str, &'a str)>,
}

impl<'a> Attributes<'a> {
    fn parse(rest: &'a str, line: usize) -> Result<Self, FontError> {
        let mut pairs = Vec::new();
        let mut s = rest.trim_start();
        while !s.is_empty() {
            let eq = s.find('=').ok_or_else(|| FontError::Parse {
                line,
                message: format!("expected key=value near `{s}`"),
            })?;
            let key = s[..eq].trim();
            let after = &s[eq + 1..];
            let (value, remainder) = if let Some(quoted) = after.strip_prefix('"') {
                let end = quoted.find('"').ok_or_else(|| FontError::Parse {
                    line,
                    message: format!("unterminated quote for `{key}`"),
                })?;
                (&quoted[..end], &quoted[end + 1..])
            } else {
                let end = after.find(char::is_whitespace).unwrap_or(after.len());
                (&after[..end], &after[end..])
            };
            pairs.push((key, value));
            s = remainder.trim_start();
        }
        Ok(Self { line, pairs })
    }

    fn get(&self, key: &str) -> Option<&'a str> {
        self.pairs.iter().find(|(k, _)| *k == key).map(|(_, v)| *v)
    }

    fn error(&self, message: impl Into<String>) -> FontError {
        FontError::Parse { line: self.line, message: message.into() }
    }

    fn number<T: std::str::FromStr>(&self, key: &str) -> Result<Option<T>, FontError> {
        match self.get(key) {
            None => Ok(None),
            Some(v) => v
                .parse::<T>()
                .map(Some)
                .map_err(|_| self.error(format!("invalid value `{v}` for `{key}`"))),
        }
    }

    fn required<T: std::str::FromStr>(&self, key: &str) -> Result<T, FontError> {
        self.number(key)?.ok_or_else(|| self.error(format!("missing `{key}`")))
    }
}

// ===================================================================
// Tests
// ===================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"info face="Test Sans" size=-32 bold=0 italic=0 padding=0,0,0,0
common lineHeight=36 base=29 scaleW=256 scaleH=128 pages=2 packed=0
page id=0 file="test_0.png"
page id=1 file="test_1.png"
chars count=3
char id=32   x=0   y=0   width=0  height=0  xoffset=0 yoffset=29 xadvance=8  page=0 chnl=15
char id=65   x=10  y=20  width=20 height=24 xoffset=1 yoffset=5  xadvance=21 page=0 chnl=15
char id=86   x=4   y=4   width=19 height=24 xoffset=0 yoffset=5  xadvance=19 page=1 chnl=15
kernings count=1
kerning first=65 second=86 amount=-2
"#;

    #[test]
    fn test_parse_sample() {
        let font = BmFont::parse(SAMPLE).unwrap();
        assert_eq!(font.face, "Test Sans");
        assert_eq!(font.size, 32.0);
        assert_eq!(font.line_height, 36.0);
        assert_eq!((font.scale_w, font.scale_h), (256, 128));
        assert_eq!(font.pages, vec!["test_0.png", "test_1.png"]);
        assert_eq!(font.chars.len(), 3);
        assert_eq!(font.chars[1].x_advance, 21.0);
        assert_eq!(font.kernings, vec![(65, 86, -2.0)]);
    }

    #[test]
    fn test_into_atlas() {
        let font = BmFont::parse(SAMPLE).unwrap();
        let mut atlas = font.into_atlas(7, Path::new("fonts"), Vec2::new(100.0, 50.0));
        assert_eq!(atlas.id(), 7);
        assert_eq!(atlas.kind(), AtlasKind::BmFont);
        assert_eq!(atlas.page_count(), 2);
        assert_eq!(atlas.original_font_size(), Some(32.0));
        assert_eq!(atlas.line_height(), 36.0);

        let a = *atlas.letter_definition('A').unwrap();
        assert_eq!((a.u, a.v), (110.0, 70.0));
        assert_eq!(a.offset_y, 5.0);
        assert!(a.valid);
        assert_eq!(atlas.letter_definition('V').unwrap().page, 1);

        let text: Vec<char> = "AV".chars().collect();
        assert_eq!(atlas.horizontal_kernings(&text), vec![0.0, -2.0]);
        assert_eq!(
            atlas.texture(1).unwrap().source,
            crate::page::TextureSource::File(Path::new("fonts").join("test_1.png"))
        );
    }

    #[test]
    fn test_missing_common_block() {
        let err = BmFont::parse("info face=\"x\" size=10\npage id=0 file=\"a.png\"\n").unwrap_err();
        assert!(matches!(err, FontError::MissingBlock("common")));
    }

    #[test]
    fn test_bad_number_reports_line() {
        let src = "common lineHeight=abc base=1 scaleW=1 scaleH=1\n";
        match BmFont::parse(src).unwrap_err() {
            FontError::Parse { line, message } => {
                assert_eq!(line, 1);
                assert!(message.contains("lineHeight"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_page_id_beyond_declared_count() {
        let src = "common lineHeight=10 base=8 scaleW=64 scaleH=64 pages=1\n\
                   page id=4000000000 file=\"a.png\"\n";
        match BmFont::parse(src).unwrap_err() {
            FontError::Parse { line, message } => {
                assert_eq!(line, 2);
                assert!(message.contains("4000000000"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_page_id_bounded_without_declared_count() {
        let src = "common lineHeight=10 base=8 scaleW=64 scaleH=64\npage id=300 file=\"a.png\"\n";
        assert!(matches!(BmFont::parse(src), Err(FontError::Parse { line: 2, .. })));
    }

    #[test]
    fn test_unterminated_quote() {
        let err = BmFont::parse("info face=\"broken size=1\n").unwrap_err();
        assert!(matches!(err, FontError::Parse { line: 1, .. }));
    }

    #[test]
    fn test_quoted_value_with_spaces() {
        let attrs = Attributes::parse(r#"face="Noto Sans CJK" size=12"#, 1).unwrap();
        assert_eq!(attrs.get("face"), Some("Noto Sans CJK"));
        assert_eq!(attrs.number::<f32>("size").unwrap(), Some(12.0));
    }
}
