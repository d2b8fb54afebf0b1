//! Layout engine: turns a UTF-32 string into positioned letters.
//!
//! Pen positions are y-up: the first line starts at y = 0 and each line
//! break moves down by `line_height * bmfont_scale + line_spacing`. A
//! letter's recorded position is the top-left of its glyph box relative
//! to the line top; vertical alignment later adds `letter_offset_y`.
//!
//! Wrapping works on tokens. Word wrap takes the longest run of letters
//! that fits one line (a CJK character, a space, or a newline is always
//! its own token); char wrap uses single letters. A token that does not
//! fit the rest of a non-empty line moves to the next line, letter by
//! letter. A line always accepts at least its first token.

use glam::Vec2;
use log::debug;
use lumen_text::{FontAtlas, LetterDefinition, TextHAlignment, TextVAlignment};

use crate::config::ShrinkPolicy;

/// Control character: the following letter is drawn without advancing
/// the pen.
pub const NEXT_CHAR_KEEPS_X: char = '\u{8}';

/// Per-character layout record.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LetterInfo {
    pub code: char,
    /// False for newlines, carriage returns and code points without a glyph.
    pub valid: bool,
    /// Top-left of the glyph box, before alignment offsets.
    pub position: Vec2,
    pub line_index: usize,
    /// Quad slot in the page batch; `None` when no quad was emitted.
    pub atlas_index: Option<usize>,
}

impl LetterInfo {
    fn placeholder(code: char, line_index: usize) -> Self {
        Self { code, valid: false, position: Vec2::ZERO, line_index, atlas_index: None }
    }
}

/// Inputs of one layout pass.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LayoutParams {
    /// Wrap width; 0 disables width-based wrapping.
    pub max_line_width: f32,
    /// Fixed box width; 0 means "fit the text".
    pub label_width: f32,
    /// Fixed box height; 0 means "fit the text".
    pub label_height: f32,
    /// Distance between baselines before BMFont scaling.
    pub line_height: f32,
    /// Extra gap added between lines.
    pub line_spacing: f32,
    /// Extra advance after every letter.
    pub additional_kerning: f32,
    /// Break lines at `max_line_width`.
    pub wrap_enabled: bool,
    /// Wrap by character instead of by word.
    pub line_break_without_spaces: bool,
    pub h_alignment: TextHAlignment,
    pub v_alignment: TextVAlignment,
    /// BMFont size / design size.
    pub bmfont_scale: f32,
    /// Trial scale used while searching a shrink size.
    pub glyph_scale: f32,
}

impl Default for LayoutParams {
    fn default() -> Self {
        Self {
            max_line_width: 0.0,
            label_width: 0.0,
            label_height: 0.0,
            line_height: 0.0,
            line_spacing: 0.0,
            additional_kerning: 0.0,
            wrap_enabled: true,
            line_break_without_spaces: false,
            h_alignment: TextHAlignment::Left,
            v_alignment: TextVAlignment::Top,
            bmfont_scale: 1.0,
            glyph_scale: 1.0,
        }
    }
}

/// Result of one layout pass.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TextLayout {
    /// One entry per input character.
    pub letters: Vec<LetterInfo>,
    /// Pen x at the end of each line.
    pub lines_width: Vec<f32>,
    /// Horizontal alignment shift of each line.
    pub lines_offset_x: Vec<f32>,
    /// Vertical alignment shift applied to every letter.
    pub letter_offset_y: f32,
    pub number_of_lines: usize,
    /// Height the text needs, regardless of the box.
    pub text_desired_height: f32,
    /// Box size when fixed, otherwise the text extent.
    pub content_size: Vec2,
    /// Clip line above which glyphs are hidden when the height is fixed.
    pub tailored_top_y: f32,
    /// Clip line below which glyphs are hidden when the height is fixed.
    pub tailored_bottom_y: f32,
}

pub fn is_unicode_space(ch: char) -> bool {
    ch.is_whitespace()
}

pub fn is_cjk(ch: char) -> bool {
    matches!(ch as u32,
        0x1100..=0x11FF     // Hangul Jamo
        | 0x2E80..=0x2FDF   // CJK radicals, Kangxi
        | 0x2FF0..=0x30FF   // ideographic description, punctuation, kana
        | 0x3100..=0x31BF   // Bopomofo, Hangul compatibility
        | 0x31C0..=0x9FFF   // strokes .. unified ideographs
        | 0xAC00..=0xD7AF   // Hangul syllables
        | 0xF900..=0xFAFF   // compatibility ideographs
        | 0xFE30..=0xFE4F   // compatibility forms
        | 0xFF00..=0xFFEF   // half/full width forms
        | 0x20000..=0x2FA1F // supplementary ideographs
    )
}

/// Scaled glyph metrics for one pass.
struct Glyphs<'a> {
    atlas: &'a FontAtlas,
    glyph_scale: f32,
}

impl Glyphs<'_> {
    fn get(&self, ch: char) -> Option<LetterDefinition> {
        let def = self.atlas.letter_definition(ch).filter(|d| d.valid)?;
        let s = self.glyph_scale;
        Some(LetterDefinition {
            width: def.width * s,
            height: def.height * s,
            offset_x: def.offset_x * s,
            offset_y: def.offset_y * s,
            x_advance: def.x_advance * s,
            ..*def
        })
    }
}

struct Wrapper<'a> {
    glyphs: Glyphs<'a>,
    text: &'a [char],
    kernings: &'a [f32],
    params: &'a LayoutParams,
}

impl Wrapper<'_> {
    fn kerning_after(&self, index: usize) -> f32 {
        self.kernings.get(index + 1).copied().unwrap_or(0.0)
    }

    /// Length of the token starting at `start` for word wrapping.
    fn first_word_len(&self, start: usize) -> usize {
        let ch = self.text[start];
        if is_cjk(ch) || is_unicode_space(ch) || ch == '\n' {
            return 1;
        }
        let scale = self.params.bmfont_scale;
        let max_width = self.params.max_line_width;
        let Some(def) = self.glyphs.get(ch) else {
            return 1;
        };

        let mut len = 1;
        let mut next_letter_x = def.x_advance * scale + self.params.additional_kerning;
        for &ch in &self.text[start + 1..] {
            let Some(def) = self.glyphs.get(ch) else {
                break;
            };
            let letter_x = next_letter_x + def.offset_x * scale;
            if max_width > 0.0 && letter_x + def.width * scale > max_width && !is_unicode_space(ch) {
                return len;
            }
            next_letter_x += def.x_advance * scale + self.params.additional_kerning;
            if ch == '\n' || is_unicode_space(ch) || is_cjk(ch) {
                break;
            }
            len += 1;
        }
        len
    }

    fn run(&self, by_word: bool) -> TextLayout {
        let params = self.params;
        let scale = params.bmfont_scale;
        let line_height = params.line_height * params.glyph_scale;
        let line_step = line_height * scale + params.line_spacing;
        let text_len = self.text.len();

        let mut out = TextLayout {
            letters: Vec::with_capacity(text_len),
            ..Default::default()
        };
        let mut line_index = 0usize;
        let mut next_token_x = 0.0f32;
        let mut next_token_y = 0.0f32;
        let mut longest_line = 0.0f32;
        let mut letter_right = 0.0f32;
        let mut highest_y = 0.0f32;
        let mut lowest_y = 0.0f32;

        let record = |out: &mut TextLayout, index: usize, info: LetterInfo| {
            if index < out.letters.len() {
                out.letters[index] = info;
            } else {
                out.letters.resize(index, LetterInfo::placeholder('\0', info.line_index));
                out.letters.push(info);
            }
        };

        let mut index = 0usize;
        while index < text_len {
            let ch = self.text[index];
            if ch == '\n' {
                out.lines_width.push(letter_right);
                letter_right = 0.0;
                line_index += 1;
                next_token_x = 0.0;
                next_token_y -= line_step;
                record(&mut out, index, LetterInfo::placeholder(ch, line_index));
                index += 1;
                continue;
            }

            let token_len = if by_word { self.first_word_len(index) } else { 1 };
            let mut token_highest_y = highest_y;
            let mut token_lowest_y = lowest_y;
            let mut token_right = letter_right;
            let mut next_letter_x = next_token_x;
            let mut new_line = false;
            let mut hold_x = false;

            for letter_index in index..(index + token_len).min(text_len) {
                let ch = self.text[letter_index];
                if ch == '\r' || ch == NEXT_CHAR_KEEPS_X {
                    hold_x |= ch == NEXT_CHAR_KEEPS_X;
                    record(&mut out, letter_index, LetterInfo::placeholder(ch, line_index));
                    continue;
                }
                let Some(def) = self.glyphs.get(ch) else {
                    debug!("no glyph for {ch:?}; recording placeholder");
                    record(&mut out, letter_index, LetterInfo::placeholder(ch, line_index));
                    continue;
                };

                let letter_x = next_letter_x + def.offset_x * scale;
                if params.wrap_enabled
                    && params.max_line_width > 0.0
                    && next_token_x > 0.0
                    && letter_x + def.width * scale > params.max_line_width
                    && !is_unicode_space(ch)
                {
                    out.lines_width.push(letter_right);
                    letter_right = 0.0;
                    line_index += 1;
                    next_token_x = 0.0;
                    next_token_y -= line_step;
                    new_line = true;
                    break;
                }

                let position = Vec2::new(letter_x, next_token_y - def.offset_y * scale);
                record(
                    &mut out,
                    letter_index,
                    LetterInfo { code: ch, valid: true, position, line_index, atlas_index: None },
                );

                if hold_x {
                    hold_x = false;
                } else {
                    next_letter_x += self.kerning_after(letter_index);
                    next_letter_x += def.x_advance * scale + params.additional_kerning;
                }
                token_right = next_letter_x;
                token_highest_y = token_highest_y.max(position.y);
                token_lowest_y = token_lowest_y.min(position.y - def.height * scale);
            }

            if new_line {
                continue;
            }

            next_token_x = next_letter_x;
            letter_right = token_right;
            highest_y = highest_y.max(token_highest_y);
            lowest_y = lowest_y.min(token_lowest_y);
            longest_line = longest_line.max(letter_right);
            index += token_len;
        }

        out.lines_width.push(letter_right);
        out.letters.truncate(text_len);

        let lines = line_index + 1;
        out.number_of_lines = lines;
        out.text_desired_height =
            lines as f32 * line_height * scale + params.line_spacing * (lines - 1) as f32;
        out.content_size = Vec2::new(
            if params.label_width > 0.0 { params.label_width } else { longest_line },
            if params.label_height > 0.0 { params.label_height } else { out.text_desired_height },
        );

        out.tailored_top_y = out.content_size.y;
        out.tailored_bottom_y = 0.0;
        if highest_y > 0.0 {
            out.tailored_top_y = out.content_size.y + highest_y;
        }
        if lowest_y < -out.text_desired_height {
            out.tailored_bottom_y = out.text_desired_height + lowest_y;
        }
        out
    }
}

/// Lay out `text` against `atlas`.
///
/// `kernings[i]` is the adjustment between `text[i - 1]` and `text[i]`.
pub fn layout_text(
    atlas: &FontAtlas,
    text: &[char],
    kernings: &[f32],
    params: &LayoutParams,
) -> TextLayout {
    let wrapper = Wrapper {
        glyphs: Glyphs { atlas, glyph_scale: params.glyph_scale },
        text,
        kernings,
        params,
    };
    let by_word = params.max_line_width > 0.0 && !params.line_break_without_spaces;
    let mut layout = wrapper.run(by_word);
    compute_alignment_offset(&mut layout, params);
    layout
}

/// Per-line horizontal offsets and the vertical letter offset.
pub fn compute_alignment_offset(layout: &mut TextLayout, params: &LayoutParams) {
    let width = layout.content_size.x;
    layout.lines_offset_x = layout
        .lines_width
        .iter()
        .map(|&line| match params.h_alignment {
            TextHAlignment::Left => 0.0,
            TextHAlignment::Center => (width - line) / 2.0,
            TextHAlignment::Right => width - line,
        })
        .collect();

    let height = layout.content_size.y;
    layout.letter_offset_y = match params.v_alignment {
        TextVAlignment::Top => height,
        TextVAlignment::Center => (height + layout.text_desired_height) / 2.0,
        TextVAlignment::Bottom => layout.text_desired_height,
    };
}

/// Wrapped text is taller than the box.
pub fn is_vertical_clamp(layout: &TextLayout) -> bool {
    layout.text_desired_height > layout.content_size.y
}

/// Some glyph center falls outside a fixed-width box.
pub fn is_horizontal_clamp(layout: &TextLayout, atlas: &FontAtlas, params: &LayoutParams) -> bool {
    if params.label_width <= 0.0 {
        return false;
    }
    let width = layout.content_size.x;
    layout.letters.iter().filter(|info| info.valid).any(|info| {
        let Some(def) = atlas.letter_definition(info.code) else {
            return false;
        };
        let px = info.position.x + def.width * params.glyph_scale / 2.0 * params.bmfont_scale;
        if !params.wrap_enabled {
            px > width
        } else {
            let line_width = layout.lines_width.get(info.line_index).copied().unwrap_or(0.0);
            line_width > width && (px > width || px < 0.0)
        }
    })
}

/// Whether the glyph centered at `px` on `line` falls outside the box.
pub fn is_horizontal_clamped(layout: &TextLayout, wrap_enabled: bool, px: f32, line: usize) -> bool {
    let width = layout.content_size.x;
    let over = px > width || px < 0.0;
    if !wrap_enabled {
        return over;
    }
    let line_width = layout.lines_width.get(line).copied().unwrap_or(0.0);
    line_width > width && over
}

/// Outcome of [`shrink_font_size`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ShrinkOutcome {
    /// Size to render with; equal to the start size when nothing changed.
    pub font_size: f32,
    pub iterations: u32,
    /// The text fits at `font_size`.
    pub fits: bool,
}

/// Search for the largest font size that stops `overflows` from firing.
///
/// Candidates decrease strictly by `policy.step`. The search ends at the
/// first fitting size, at `policy.min_font_size`, or after
/// `policy.max_iterations` attempts; the last candidate tried is returned
/// either way.
pub fn shrink_font_size(
    font_size: f32,
    policy: &ShrinkPolicy,
    mut overflows: impl FnMut(f32) -> bool,
) -> ShrinkOutcome {
    if !overflows(font_size) {
        return ShrinkOutcome { font_size, iterations: 0, fits: true };
    }

    let step = policy.step.max(f32::EPSILON);
    let mut outcome = ShrinkOutcome { font_size, iterations: 0, fits: false };
    while outcome.iterations < policy.max_iterations {
        let candidate = font_size - step * (outcome.iterations + 1) as f32;
        if candidate < policy.min_font_size || candidate <= 0.0 {
            break;
        }
        outcome.iterations += 1;
        outcome.font_size = candidate;
        if !overflows(candidate) {
            outcome.fits = true;
            break;
        }
    }
    debug!(
        "shrink {font_size} -> {} after {} attempts (fits: {})",
        outcome.font_size, outcome.iterations, outcome.fits
    );
    outcome
}

// ===================================================================
// Tests
// ===================================================================
