//! Fixed-grid character maps: one texture cut into equal cells, filled
//! row-major starting at `start_char`.

use crate::atlas::{AtlasId, AtlasKind, FontAtlas, LetterDefinition};
use crate::error::FontError;
use crate::page::TextureInfo;
use crate::provider::CharMapSource;

/// Build a char-map atlas from either source kind. File sources are sized
/// from the image header.
pub fn char_map_atlas_for(id: AtlasId, source: &CharMapSource) -> Result<FontAtlas, FontError> {
    match source {
        CharMapSource::Texture { texture, item_width, item_height, start_char } => {
            char_map_atlas(id, texture.clone(), *item_width, *item_height, *start_char)
        }
        CharMapSource::File { path, item_width, item_height, start_char } => {
            if !path.is_file() {
                return Err(FontError::FileNotFound(path.clone()));
            }
            let (w, h) = image::image_dimensions(path)?;
            let texture = TextureInfo::file(path.clone(), w, h);
            char_map_atlas(id, texture, *item_width, *item_height, *start_char)
        }
    }
}

pub fn char_map_atlas(
    id: AtlasId,
    texture: TextureInfo,
    item_width: u32,
    item_height: u32,
    start_char: u32,
) -> Result<FontAtlas, FontError> {
    if item_width == 0 || item_height == 0 {
        return Err(FontError::InvalidCharMap(format!(
            "item size must be positive, got {item_width}x{item_height}"
        )));
    }
    let columns = texture.width / item_width;
    let rows = texture.height / item_height;
    if columns == 0 || rows == 0 {
        return Err(FontError::InvalidCharMap(format!(
            "{}x{} texture is smaller than one {item_width}x{item_height} cell",
            texture.width, texture.height
        )));
    }

    let name = format!("charmap-{}", texture.id.0);
    let mut atlas = FontAtlas::fixed(id, AtlasKind::CharMap, name, item_height as f32, vec![texture]);

    let mut code = start_char;
    for row in 0..rows {
        for col in 0..columns {
            if let Some(ch) = char::from_u32(code) {
                atlas.add_letter_definition(
                    ch,
                    LetterDefinition {
                        u: (col * item_width) as f32,
                        v: (row * item_height) as f32,
                        width: item_width as f32,
                        height: item_height as f32,
                        x_advance: item_width as f32,
                        valid: true,
                        ..Default::default()
                    },
                );
            }
            code += 1;
        }
    }
    Ok(atlas)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_layout() {
        let atlas = char_map_atlas(1, TextureInfo::memory(40, 20), 10, 10, '0' as u32).unwrap();
        assert_eq!(atlas.letter_count(), 8);
        assert_eq!(atlas.line_height(), 10.0);
        let five = atlas.letter_definition('5').unwrap();
        assert_eq!((five.u, five.v), (10.0, 10.0));
        assert_eq!(five.x_advance, 10.0);
        assert!(atlas.letter_definition('8').is_none());
    }

    #[test]
    fn test_zero_item_size_is_rejected() {
        let err = char_map_atlas(1, TextureInfo::memory(40, 20), 0, 10, 48).err().expect("zero item size must be rejected");
        assert!(matches!(err, FontError::InvalidCharMap(_)));
    }

    #[test]
    fn test_cell_larger_than_texture_is_rejected() {
        assert!(char_map_atlas(1, TextureInfo::memory(8, 8), 16, 16, 48).is_err());
    }
}
