//! Ground analysis over a finished map.
//!
//! Analyzers read the document and build their own lookup structure; they
//! never touch the map itself.

use crate::layer::cell_count;
use crate::map::MapDocument;

/// Collaborator run once after loading to derive gameplay lookups from tile properties.
pub trait GroundAnalyzer {
    type Output;

    fn analyze(&self, map: &MapDocument) -> Self::Output;
}

impl<F, T> GroundAnalyzer for F
where
    F: Fn(&MapDocument) -> T,
{
    type Output = T;

    fn analyze(&self, map: &MapDocument) -> T {
        self(map)
    }
}

/// How a cell behaves for things standing on it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum GroundKind {
    #[default]
    Empty,
    Solid,
    /// One-way: solid from above only.
    Platform,
    /// Rises towards the right.
    SlopeUp,
    /// Falls towards the right.
    SlopeDown,
}

impl GroundKind {
    fn from_property(value: &str) -> Option<Self> {
        match value.trim() {
            "solid" => Some(GroundKind::Solid),
            "platform" => Some(GroundKind::Platform),
            "slope_up" => Some(GroundKind::SlopeUp),
            "slope_down" => Some(GroundKind::SlopeDown),
            "none" | "empty" => Some(GroundKind::Empty),
            _ => None,
        }
    }

    pub fn is_ground(self) -> bool {
        self != GroundKind::Empty
    }
}

/// Per-cell ground kinds merged across layers.
#[derive(Debug, Clone, PartialEq)]
pub struct GroundMap {
    pub width: usize,
    pub height: usize,
    pub tile_width: u32,
    pub tile_height: u32,
    cells: Vec<GroundKind>,
}

impl GroundMap {
    pub fn kind_at(&self, col: usize, row: usize) -> GroundKind {
        if col < self.width && row < self.height {
            self.cells[row * self.width + col]
        } else {
            GroundKind::Empty
        }
    }

    /// Ground kind under a point in map pixels.
    pub fn kind_at_pixel(&self, x: f32, y: f32) -> GroundKind {
        if x < 0.0 || y < 0.0 || self.tile_width == 0 || self.tile_height == 0 {
            return GroundKind::Empty;
        }
        self.kind_at(
            (x / self.tile_width as f32) as usize,
            (y / self.tile_height as f32) as usize,
        )
    }

    /// Topmost ground row in a column.
    pub fn surface_row(&self, col: usize) -> Option<usize> {
        (0..self.height).find(|&row| self.kind_at(col, row).is_ground())
    }

    pub fn ground_cells(&self) -> usize {
        self.cells.iter().filter(|k| k.is_ground()).count()
    }
}

/// Reads the ground kind from tile properties.
///
/// A tile's `ground` property (`solid`, `platform`, `slope_up`, `slope_down`)
/// wins; otherwise `collidable=true` means solid. Layers with
/// `collision=false` are ignored and later layers override earlier ones.
#[derive(Debug, Clone)]
pub struct PropertyGroundAnalyzer {
    pub kind_property: String,
    pub collidable_property: String,
}

impl Default for PropertyGroundAnalyzer {
    fn default() -> Self {
        PropertyGroundAnalyzer {
            kind_property: "ground".into(),
            collidable_property: "collidable".into(),
        }
    }
}

impl PropertyGroundAnalyzer {
    fn kind_of(&self, map: &MapDocument, gid: u32) -> GroundKind {
        let Some(props) = map.tilesets.tile_properties(gid) else {
            return GroundKind::Empty;
        };
        if let Some(kind) = props.get(&self.kind_property).and_then(GroundKind::from_property) {
            return kind;
        }
        if props.get_bool(&self.collidable_property) == Some(true) {
            GroundKind::Solid
        } else {
            GroundKind::Empty
        }
    }
}

impl GroundAnalyzer for PropertyGroundAnalyzer {
    type Output = GroundMap;

    fn analyze(&self, map: &MapDocument) -> GroundMap {
        let (width, height) = match cell_count("map", "ground", map.width, map.height) {
            Ok(_) => (map.width, map.height),
            Err(err) => {
                log::warn!("Skipping ground analysis: {}", err);
                (0, 0)
            }
        };
        let mut cells = vec![GroundKind::Empty; width * height];

        for layer in map.layers.iter() {
            if layer.properties.get_bool("collision") == Some(false) {
                continue;
            }
            let w = layer.width.min(width);
            let h = layer.height.min(height);
            for row in 0..h {
                for col in 0..w {
                    let gid = layer.tiles()[row * layer.width + col];
                    if gid == 0 {
                        continue;
                    }
                    let kind = self.kind_of(map, gid);
                    if kind.is_ground() {
                        cells[row * width + col] = kind;
                    }
                }
            }
        }

        log::debug!(
            "Ground analysis found {} ground cells",
            cells.iter().filter(|k| k.is_ground()).count()
        );

        GroundMap {
            width,
            height,
            tile_width: map.tile_width,
            tile_height: map.tile_height,
            cells,
        }
    }
}
