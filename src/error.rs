use std::path::PathBuf;
use std::{error, fmt, io};

/// Error type for loading, decoding and querying maps.
#[derive(Debug)]
pub enum MapError {
    /// File I/O error while opening or reading a document.
    Io {
        /// File being read.
        path: PathBuf,
        /// Underlying error.
        source: io::Error,
    },
    /// The markup itself is not well formed.
    Xml {
        /// Byte offset reported by the reader.
        position: u64,
        /// Underlying reader error.
        source: quick_xml::Error,
    },
    /// JSON map or tileset could not be parsed.
    Json {
        /// File being parsed.
        path: PathBuf,
        /// Underlying error.
        source: serde_json::Error,
    },
    /// Missing or invalid required attribute, or a structural violation.
    MalformedDocument {
        /// Element the problem was found in.
        element: String,
        /// What is wrong with it.
        reason: String,
    },
    /// Unsupported encoding, compression or orientation, or a payload of the wrong size.
    Format(String),
    /// A compressed layer payload has invalid framing.
    CorruptData(io::Error),
    /// Two tilesets, layers or object groups share a name.
    DuplicateKey {
        /// `"tileset"`, `"layer"` or `"objectgroup"`.
        kind: &'static str,
        /// The repeated name.
        name: String,
    },
    /// A tile index resolves to no tileset or lies outside its atlas.
    OutOfRange {
        /// Offending index.
        index: u32,
        /// What it was checked against.
        reason: String,
    },
    /// A tileset was queried for a rect before its atlas size was known.
    ImageUnresolved {
        /// Tileset name.
        tileset: String,
    },
    /// The host image loader could not find an image.
    AssetNotFound {
        /// Resolved image path.
        path: PathBuf,
    },
    /// File extension not handled by any loader.
    UnsupportedFormat(String),
}

impl MapError {
    pub(crate) fn malformed(element: impl Into<String>, reason: impl Into<String>) -> Self {
        MapError::MalformedDocument {
            element: element.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for MapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MapError::Io { path, source } => {
                write!(f, "I/O error reading {}: {}", path.display(), source)
            }
            MapError::Xml { position, source } => {
                write!(f, "XML error at byte {}: {}", position, source)
            }
            MapError::Json { path, source } => {
                write!(f, "Failed to parse JSON {}: {}", path.display(), source)
            }
            MapError::MalformedDocument { element, reason } => {
                write!(f, "Malformed <{}> element: {}", element, reason)
            }
            MapError::Format(msg) => write!(f, "Unsupported layer data: {}", msg),
            MapError::CorruptData(err) => write!(f, "Corrupt compressed layer data: {}", err),
            MapError::DuplicateKey { kind, name } => {
                write!(f, "Duplicate {} name '{}'", kind, name)
            }
            MapError::OutOfRange { index, reason } => {
                write!(f, "Tile index {} out of range: {}", index, reason)
            }
            MapError::ImageUnresolved { tileset } => {
                write!(f, "Tileset '{}' has no resolved atlas image", tileset)
            }
            MapError::AssetNotFound { path } => write!(f, "Image not found: {}", path.display()),
            MapError::UnsupportedFormat(ext) => write!(f, "Unsupported file format: {}", ext),
        }
    }
}

impl error::Error for MapError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            MapError::Io { source, .. } => Some(source),
            MapError::Xml { source, .. } => Some(source),
            MapError::Json { source, .. } => Some(source),
            MapError::CorruptData(err) => Some(err),
            _ => None,
        }
    }
}
