//! Tile layer payload codec.
//!
//! A layer payload is a run of little-endian `u32` cells, optionally
//! compressed and then base64 encoded. The three high bits of a cell carry the
//! flip flags, the low 29 bits the global tile index.

use std::io::{Read, Write};

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use flate2::read::{GzDecoder, ZlibDecoder};
use flate2::write::{GzEncoder, ZlibEncoder};

use crate::error::MapError;

pub const FLIP_H: u32 = 0x8000_0000; // bit 31
pub const FLIP_V: u32 = 0x4000_0000; // bit 30
pub const FLIP_D: u32 = 0x2000_0000; // bit 29
pub const GID_MASK: u32 = 0x1FFF_FFFF; // keep lower 29 bits

/// Flip/rotation bits of one cell, denormalized out of the raw value.
///
/// Diagonal combined with horizontal/vertical gives the 90 degree rotations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct FlipFlags(u8);

impl FlipFlags {
    pub const NONE: FlipFlags = FlipFlags(0);
    pub const HORIZONTAL: FlipFlags = FlipFlags(0b001);
    pub const VERTICAL: FlipFlags = FlipFlags(0b010);
    pub const DIAGONAL: FlipFlags = FlipFlags(0b100);

    /// Keeps only the three significant bits.
    #[inline]
    pub fn from_bits(bits: u8) -> Self {
        FlipFlags(bits & 0b111)
    }
    #[inline] pub fn bits(self) -> u8 { self.0 }
    #[inline] pub fn horizontal(self) -> bool { self.0 & Self::HORIZONTAL.0 != 0 }
    #[inline] pub fn vertical(self) -> bool { self.0 & Self::VERTICAL.0 != 0 }
    #[inline] pub fn diagonal(self) -> bool { self.0 & Self::DIAGONAL.0 != 0 }
    #[inline] pub fn is_empty(self) -> bool { self.0 == 0 }
}

impl std::ops::BitOr for FlipFlags {
    type Output = FlipFlags;

    fn bitor(self, rhs: FlipFlags) -> FlipFlags {
        FlipFlags(self.0 | rhs.0)
    }
}

/// One raw cell as stored in the payload, flags included.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileId(pub u32);

impl TileId {
    #[inline] pub fn raw(self) -> u32 { self.0 }
    #[inline] pub fn clean(self) -> u32 { self.0 & GID_MASK }
    #[inline] pub fn flip_h(self) -> bool { (self.0 & FLIP_H) != 0 }
    #[inline] pub fn flip_v(self) -> bool { (self.0 & FLIP_V) != 0 }
    #[inline] pub fn flip_d(self) -> bool { (self.0 & FLIP_D) != 0 }

    #[inline]
    pub fn flags(self) -> FlipFlags {
        let mut bits = 0;
        if self.flip_h() { bits |= FlipFlags::HORIZONTAL.0; }
        if self.flip_v() { bits |= FlipFlags::VERTICAL.0; }
        if self.flip_d() { bits |= FlipFlags::DIAGONAL.0; }
        FlipFlags(bits)
    }

    pub fn from_parts(gid: u32, flags: FlipFlags) -> Self {
        let mut raw = gid & GID_MASK;
        if flags.horizontal() { raw |= FLIP_H; }
        if flags.vertical() { raw |= FLIP_V; }
        if flags.diagonal() { raw |= FLIP_D; }
        TileId(raw)
    }
}

/// Text encoding of a `<data>` payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Base64,
    Csv,
}

impl Encoding {
    /// Maps the `encoding` attribute. Tiled's XML `<tile>` form is not supported.
    pub fn from_attr(attr: Option<&str>) -> Result<Self, MapError> {
        match attr {
            Some("base64") => Ok(Encoding::Base64),
            Some("csv") => Ok(Encoding::Csv),
            Some(other) => Err(MapError::Format(format!("encoding '{other}'"))),
            None => Err(MapError::Format("missing data encoding".into())),
        }
    }
}

/// Stream compression applied before base64.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Compression {
    #[default]
    None,
    Gzip,
    Zlib,
}

impl Compression {
    pub fn from_attr(attr: Option<&str>) -> Result<Self, MapError> {
        match attr {
            None | Some("") => Ok(Compression::None),
            Some("gzip") => Ok(Compression::Gzip),
            Some("zlib") => Ok(Compression::Zlib),
            Some(other) => Err(MapError::Format(format!("compression '{other}'"))),
        }
    }

    pub fn as_attr(self) -> Option<&'static str> {
        match self {
            Compression::None => None,
            Compression::Gzip => Some("gzip"),
            Compression::Zlib => Some("zlib"),
        }
    }
}

/// Decodes `cell_count` cells into parallel index and flag vectors.
pub fn decode(
    raw: &str,
    encoding: Encoding,
    compression: Compression,
    cell_count: usize,
) -> Result<(Vec<u32>, Vec<FlipFlags>), MapError> {
    let cells = match encoding {
        Encoding::Csv => {
            if compression != Compression::None {
                return Err(MapError::Format("csv data cannot be compressed".into()));
            }
            parse_csv(raw)?
        }
        Encoding::Base64 => {
            let bytes = STANDARD
                .decode(strip_whitespace(raw))
                .map_err(|e| MapError::Format(format!("invalid base64: {e}")))?;
            let bytes = decompress(bytes, compression)?;
            cells_from_bytes(&bytes)?
        }
    };

    if cells.len() != cell_count {
        return Err(MapError::Format(format!(
            "expected {cell_count} cells, found {}",
            cells.len()
        )));
    }

    Ok(split_cells(&cells))
}

/// Inverse of [`decode`] for the base64 path.
pub fn encode(
    tiles: &[u32],
    flags: &[FlipFlags],
    compression: Compression,
) -> Result<String, MapError> {
    if tiles.len() != flags.len() {
        return Err(MapError::Format(format!(
            "{} tiles but {} flag entries",
            tiles.len(),
            flags.len()
        )));
    }

    let mut bytes = Vec::with_capacity(tiles.len() * 4);
    for (&gid, &f) in tiles.iter().zip(flags) {
        bytes.extend_from_slice(&TileId::from_parts(gid, f).raw().to_le_bytes());
    }

    let bytes = compress(bytes, compression)?;
    Ok(STANDARD.encode(bytes))
}

fn strip_whitespace(raw: &str) -> String {
    raw.chars().filter(|c| !c.is_ascii_whitespace()).collect()
}

fn parse_csv(raw: &str) -> Result<Vec<u32>, MapError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<u32>()
                .map_err(|_| MapError::Format(format!("invalid csv cell '{s}'")))
        })
        .collect()
}

fn decompress(bytes: Vec<u8>, compression: Compression) -> Result<Vec<u8>, MapError> {
    let mut out = Vec::new();
    match compression {
        Compression::None => return Ok(bytes),
        Compression::Gzip => GzDecoder::new(&bytes[..]).read_to_end(&mut out),
        Compression::Zlib => ZlibDecoder::new(&bytes[..]).read_to_end(&mut out),
    }
    .map_err(MapError::CorruptData)?;
    Ok(out)
}

fn compress(bytes: Vec<u8>, compression: Compression) -> Result<Vec<u8>, MapError> {
    let level = flate2::Compression::default();
    let out = match compression {
        Compression::None => return Ok(bytes),
        Compression::Gzip => {
            let mut enc = GzEncoder::new(Vec::new(), level);
            enc.write_all(&bytes).map_err(MapError::CorruptData)?;
            enc.finish()
        }
        Compression::Zlib => {
            let mut enc = ZlibEncoder::new(Vec::new(), level);
            enc.write_all(&bytes).map_err(MapError::CorruptData)?;
            enc.finish()
        }
    };
    out.map_err(MapError::CorruptData)
}

fn cells_from_bytes(bytes: &[u8]) -> Result<Vec<u32>, MapError> {
    if bytes.len() % 4 != 0 {
        return Err(MapError::Format(format!(
            "payload of {} bytes is not a whole number of cells",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

fn split_cells(cells: &[u32]) -> (Vec<u32>, Vec<FlipFlags>) {
    cells
        .iter()
        .map(|&raw| {
            let id = TileId(raw);
            (id.clean(), id.flags())
        })
        .unzip()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn b64_cells(cells: &[u32]) -> String {
        let bytes: Vec<u8> = cells.iter().flat_map(|c| c.to_le_bytes()).collect();
        STANDARD.encode(bytes)
    }

    #[test]
    fn extracts_flag_bits() {
        let raw = b64_cells(&[0x8000_0000, 0xE000_0005, 0x4000_0002, 7]);
        let (tiles, flags) = decode(&raw, Encoding::Base64, Compression::None, 4).unwrap();

        assert_eq!(tiles, vec![0, 5, 2, 7]);
        assert_eq!(flags[0], FlipFlags::HORIZONTAL);
        assert_eq!(
            flags[1],
            FlipFlags::HORIZONTAL | FlipFlags::VERTICAL | FlipFlags::DIAGONAL
        );
        assert!(flags[2].vertical() && !flags[2].horizontal());
        assert!(flags[3].is_empty());
    }

    #[test]
    fn round_trips_every_compression() {
        let tiles: Vec<u32> = vec![0, 1, 2, 300, GID_MASK, 0, 42, 9];
        let flags: Vec<FlipFlags> = (0..tiles.len() as u8).map(FlipFlags::from_bits).collect();

        for compression in [Compression::None, Compression::Gzip, Compression::Zlib] {
            let text = encode(&tiles, &flags, compression).unwrap();
            let (t, f) = decode(&text, Encoding::Base64, compression, tiles.len()).unwrap();
            assert_eq!(t, tiles, "{compression:?}");
            assert_eq!(f, flags, "{compression:?}");
        }
    }

    #[test]
    fn tolerates_whitespace_around_payload() {
        let raw = format!("\n   {}\n  ", b64_cells(&[3, 4]));
        let (tiles, _) = decode(&raw, Encoding::Base64, Compression::None, 2).unwrap();
        assert_eq!(tiles, vec![3, 4]);
    }

    #[test]
    fn decodes_csv_cells() {
        let (tiles, flags) =
            decode("1,2,\n2147483651,0", Encoding::Csv, Compression::None, 4).unwrap();
        assert_eq!(tiles, vec![1, 2, 3, 0]);
        assert!(flags[2].horizontal());
    }

    #[test]
    fn rejects_partial_cells() {
        let raw = STANDARD.encode([1u8, 0, 0, 0, 2, 0]);
        let err = decode(&raw, Encoding::Base64, Compression::None, 1).unwrap_err();
        assert!(matches!(err, MapError::Format(_)));
    }

    #[test]
    fn rejects_wrong_cell_count() {
        let raw = b64_cells(&[1, 2, 3]);
        let err = decode(&raw, Encoding::Base64, Compression::None, 4).unwrap_err();
        assert!(matches!(err, MapError::Format(_)));
    }

    #[test]
    fn reports_bad_compressed_framing_as_corrupt() {
        let raw = b64_cells(&[1, 2, 3, 4]);
        let err = decode(&raw, Encoding::Base64, Compression::Gzip, 4).unwrap_err();
        assert!(matches!(err, MapError::CorruptData(_)));
    }

    #[test]
    fn zlib_and_gzip_framing_are_not_interchangeable() {
        let tiles = vec![1, 2, 3, 4];
        let flags = vec![FlipFlags::NONE; 4];
        let zlib = encode(&tiles, &flags, Compression::Zlib).unwrap();
        assert!(decode(&zlib, Encoding::Base64, Compression::Gzip, 4).is_err());
    }

    #[test]
    fn unknown_encoding_or_compression_is_a_format_error() {
        assert!(matches!(Encoding::from_attr(Some("xml")), Err(MapError::Format(_))));
        assert!(matches!(Encoding::from_attr(None), Err(MapError::Format(_))));
        assert!(matches!(Compression::from_attr(Some("zstd")), Err(MapError::Format(_))));
        assert!(matches!(
            decode("1", Encoding::Csv, Compression::Gzip, 1),
            Err(MapError::Format(_))
        ));
    }
}
