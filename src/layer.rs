use macroquad::math::Rect;

use crate::codec::{self, Compression, FlipFlags};
use crate::config::MAX_LAYER_CELLS;
use crate::error::MapError;
use crate::properties::Properties;

/// One tile of a layer as yielded by [`Layer::tiles_in_region`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayerTile {
    pub row: usize,
    pub col: usize,
    pub gid: u32,
    pub flags: FlipFlags,
    /// Where the tile lands in map pixel space.
    pub dest: Rect,
}

/// A grid-aligned plane of tiles.
#[derive(Debug, Clone)]
pub struct Layer {
    pub name: String,
    pub width: usize,
    pub height: usize,
    pub tile_width: u32,
    pub tile_height: u32,
    pub opacity: f32,
    pub visible: bool,
    pub properties: Properties,
    tiles: Vec<u32>,
    flags: Vec<FlipFlags>,
}

impl Layer {
    /// An all-empty layer. Fails when `width * height` overflows or exceeds
    /// [`MAX_LAYER_CELLS`].
    pub fn new(
        name: impl Into<String>,
        width: usize,
        height: usize,
        tile_width: u32,
        tile_height: u32,
    ) -> Result<Self, MapError> {
        let name = name.into();
        let cells = cell_count("layer", &name, width, height)?;
        Ok(Layer {
            name,
            width,
            height,
            tile_width,
            tile_height,
            opacity: 1.0,
            visible: true,
            properties: Properties::new(),
            tiles: vec![0; cells],
            flags: vec![FlipFlags::NONE; cells],
        })
    }

    /// Replaces the cell contents; both vectors must hold `width * height` entries.
    pub fn set_cells(&mut self, tiles: Vec<u32>, flags: Vec<FlipFlags>) -> Result<(), MapError> {
        let expected = self.tiles.len();
        if tiles.len() != expected || flags.len() != expected {
            return Err(MapError::malformed(
                "layer",
                format!(
                    "'{}' needs {} cells, got {} tiles and {} flags",
                    self.name,
                    expected,
                    tiles.len(),
                    flags.len()
                ),
            ));
        }
        self.tiles = tiles;
        self.flags = flags;
        Ok(())
    }

    pub fn tiles(&self) -> &[u32] {
        &self.tiles
    }

    pub fn flags(&self) -> &[FlipFlags] {
        &self.flags
    }

    pub fn tile_at(&self, col: usize, row: usize) -> Option<u32> {
        self.index(col, row).map(|i| self.tiles[i])
    }

    pub fn flags_at(&self, col: usize, row: usize) -> Option<FlipFlags> {
        self.index(col, row).map(|i| self.flags[i])
    }

    fn index(&self, col: usize, row: usize) -> Option<usize> {
        (col < self.width && row < self.height).then(|| row * self.width + col)
    }

    /// Non-empty tiles whose cells intersect `region` (map pixels).
    ///
    /// The region is clamped to the grid, so oversized or off-map viewports
    /// are fine. Calling it again restarts the walk.
    pub fn tiles_in_region(&self, region: Rect) -> impl Iterator<Item = LayerTile> + '_ {
        let (cols, rows) = self.cell_range(region);
        rows.flat_map(move |row| cols.clone().map(move |col| (col, row)))
            .filter_map(move |(col, row)| {
                let i = row * self.width + col;
                let gid = self.tiles[i];
                (gid != 0).then(|| LayerTile {
                    row,
                    col,
                    gid,
                    flags: self.flags[i],
                    dest: Rect::new(
                        col as f32 * self.tile_width as f32,
                        row as f32 * self.tile_height as f32,
                        self.tile_width as f32,
                        self.tile_height as f32,
                    ),
                })
            })
    }

    fn cell_range(&self, region: Rect) -> (std::ops::Range<usize>, std::ops::Range<usize>) {
        (
            clamp_span(region.x, region.x + region.w, self.tile_width, self.width),
            clamp_span(region.y, region.y + region.h, self.tile_height, self.height),
        )
    }

    /// Base64 payload for writing this layer back into a `<data>` element.
    pub fn encode(&self, compression: Compression) -> Result<String, MapError> {
        codec::encode(&self.tiles, &self.flags, compression)
    }
}

/// Number of cells in a `width` x `height` grid, bounded by [`MAX_LAYER_CELLS`].
pub(crate) fn cell_count(
    element: &str,
    name: &str,
    width: usize,
    height: usize,
) -> Result<usize, MapError> {
    width
        .checked_mul(height)
        .filter(|&n| n <= MAX_LAYER_CELLS)
        .ok_or_else(|| {
            MapError::malformed(
                element,
                format!("'{name}' is {width}x{height}, more than {MAX_LAYER_CELLS} cells"),
            )
        })
}

/// Opacity attribute checked against `[0, 1]`; NaN and infinities are rejected.
pub(crate) fn checked_opacity(name: &str, opacity: f32) -> Result<f32, MapError> {
    if !opacity.is_finite() {
        return Err(MapError::malformed(
            "layer",
            format!("'{name}' has opacity {opacity}"),
        ));
    }
    Ok(opacity.clamp(0.0, 1.0))
}

/// Inclusive pixel span to a half-open cell range within `[0, len)`.
fn clamp_span(mut lo: f32, mut hi: f32, cell: u32, len: usize) -> std::ops::Range<usize> {
    if cell == 0 || len == 0 || !(lo.is_finite() && hi.is_finite()) {
        return 0..0;
    }
    if lo > hi {
        std::mem::swap(&mut lo, &mut hi);
    }
    let first = (lo / cell as f32).floor();
    let last = (hi / cell as f32).floor();
    if last < 0.0 || first >= len as f32 {
        return 0..0;
    }
    let first = first.max(0.0) as usize;
    let last = (last as usize).min(len - 1);
    first..last + 1
}
