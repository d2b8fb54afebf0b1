//! Error type for font loading and atlas creation.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum FontError {
    #[error("Font file not found: {}", .0.display())]
    FileNotFound(PathBuf),
    #[error("I/O error reading {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("BMFont parse error at line {line}: {message}")]
    Parse { line: usize, message: String },
    #[error("BMFont is missing the `{0}` block")]
    MissingBlock(&'static str),
    #[error("Invalid char map: {0}")]
    InvalidCharMap(String),
    #[error("Unsupported font configuration: {0}")]
    Unsupported(String),
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

impl FontError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            Self::FileNotFound(path)
        } else {
            Self::Io { path, source }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_maps_to_file_not_found() {
        let err = FontError::io("missing.fnt", std::io::Error::from(std::io::ErrorKind::NotFound));
        assert!(matches!(err, FontError::FileNotFound(_)));
        assert_eq!(err.to_string(), "Font file not found: missing.fnt");
    }

    #[test]
    fn test_parse_error_message() {
        let err = FontError::Parse { line: 3, message: "bad value".into() };
        assert_eq!(err.to_string(), "BMFont parse error at line 3: bad value");
    }
}
