use std::path::Path;

use macroquad::math::{vec2, Rect, Vec2};

use crate::config::CULL_MARGIN_TILES;
use crate::error::MapError;
use crate::keyed::Keyed;
use crate::layer::Layer;
use crate::loader::{json, tmx};
use crate::object::{MapObject, ObjectGroup};
use crate::properties::Properties;
use crate::render::{cull, DrawCommand};
use crate::tileset::TilesetTable;

/// A parsed map: grid metrics, tilesets, layers and object groups.
///
/// Built once by a loader and read-only afterwards.
#[derive(Debug, Clone)]
pub struct MapDocument {
    /// Width in tiles.
    pub width: usize,
    /// Height in tiles.
    pub height: usize,
    pub tile_width: u32,
    pub tile_height: u32,
    pub properties: Properties,
    pub tilesets: TilesetTable,
    pub layers: Keyed<Layer>,
    pub object_groups: Keyed<ObjectGroup>,
}

impl MapDocument {
    pub fn new(width: usize, height: usize, tile_width: u32, tile_height: u32) -> Self {
        MapDocument {
            width,
            height,
            tile_width,
            tile_height,
            properties: Properties::new(),
            tilesets: TilesetTable::new(),
            layers: Keyed::new("layer"),
            object_groups: Keyed::new("objectgroup"),
        }
    }

    /// Parses a `.tmx`, `.tmj` or `.json` map without loading any images.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, MapError> {
        let path = path.as_ref();
        match path.extension().and_then(|e| e.to_str()) {
            Some("tmx") => tmx::parse_file(path, true),
            Some("json") | Some("tmj") => json::parse_file(path, true),
            _ => Err(MapError::UnsupportedFormat(path.display().to_string())),
        }
    }

    /// Parses TMX markup held in memory. External tilesets resolve against the working directory.
    pub fn from_tmx_str(text: &str) -> Result<Self, MapError> {
        tmx::parse_reader(text.as_bytes(), Path::new("."), true)
    }

    pub fn insert_layer(&mut self, layer: Layer) -> Result<(), MapError> {
        let name = layer.name.clone();
        self.layers.insert(&name, layer).map(|_| ())
    }

    pub fn insert_object_group(&mut self, group: ObjectGroup) -> Result<(), MapError> {
        let name = group.name.clone();
        self.object_groups.insert(&name, group).map(|_| ())
    }

    pub fn layer(&self, name: &str) -> Option<&Layer> {
        self.layers.get(name)
    }

    pub fn object_group(&self, name: &str) -> Option<&ObjectGroup> {
        self.object_groups.get(name)
    }

    /// Map size in pixels.
    pub fn pixel_size(&self) -> Vec2 {
        vec2(
            self.width as f32 * self.tile_width as f32,
            self.height as f32 * self.tile_height as f32,
        )
    }

    /// Non-empty cells whose index no tileset covers.
    pub fn unresolved_cells(&self) -> usize {
        self.layers
            .iter()
            .flat_map(|l| l.tiles().iter())
            .filter(|&&gid| gid != 0 && self.tilesets.resolve(gid).is_none())
            .count()
    }

    /// Draw commands for every visible layer inside the view, in layer order.
    ///
    /// The corners may come in any order; the view is padded by
    /// [`CULL_MARGIN_TILES`]. Cells whose index or atlas rect cannot be
    /// resolved are skipped.
    pub fn draw_commands(&self, view_min: Vec2, view_max: Vec2) -> impl Iterator<Item = DrawCommand<'_>> + '_ {
        let pad = vec2(
            CULL_MARGIN_TILES as f32 * self.tile_width as f32,
            CULL_MARGIN_TILES as f32 * self.tile_height as f32,
        );
        let region = cull::view_rect(view_min, view_max, pad);

        self.layers
            .iter()
            .enumerate()
            .filter(|(_, layer)| layer.visible && layer.opacity > 0.0)
            .flat_map(move |(layer_index, layer)| {
                layer.tiles_in_region(region).filter_map(move |t| {
                    let (tileset, src) = match self.tilesets.source_rect(t.gid) {
                        Ok(found) => found,
                        Err(err) => {
                            log::trace!("Skipping cell ({}, {}) of '{}': {}", t.col, t.row, layer.name, err);
                            return None;
                        }
                    };
                    Some(DrawCommand {
                        layer_index,
                        tileset,
                        gid: t.gid,
                        src,
                        dest: t.dest,
                        flags: t.flags,
                        opacity: layer.opacity,
                    })
                })
            })
    }

    /// Objects of every group that intersect `region`, with their group.
    pub fn objects_in_region<'a>(
        &'a self,
        region: &'a Rect,
    ) -> impl Iterator<Item = (&'a ObjectGroup, &'a MapObject)> + 'a {
        self.object_groups
            .iter()
            .flat_map(move |g| g.objects_in_region(region).map(move |o| (g, o)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::ImageRef;
    use crate::codec::FlipFlags;
    use crate::tileset::Tileset;

    fn sample() -> MapDocument {
        let mut map = MapDocument::new(4, 4, 16, 16);
        map.tilesets
            .insert(
                Tileset::new("terrain", 1, 16, 16).with_image(ImageRef {
                    source: "terrain.png".into(),
                    width: Some(32),
                    height: Some(32),
                }),
            )
            .unwrap();

        let mut ground = Layer::new("ground", 4, 4, 16, 16).unwrap();
        let mut tiles = vec![0; 16];
        tiles[0] = 1;
        tiles[5] = 4;
        tiles[15] = 9; // beyond the 2x2 atlas
        ground.set_cells(tiles, vec![FlipFlags::NONE; 16]).unwrap();
        map.insert_layer(ground).unwrap();

        let mut hidden = Layer::new("hidden", 4, 4, 16, 16).unwrap();
        hidden.visible = false;
        hidden.set_cells(vec![1; 16], vec![FlipFlags::NONE; 16]).unwrap();
        map.insert_layer(hidden).unwrap();
        map
    }

    #[test]
    fn draw_commands_skip_hidden_layers_and_bad_cells() {
        let map = sample();
        let cmds: Vec<_> = map.draw_commands(vec2(0.0, 0.0), vec2(64.0, 64.0)).collect();

        assert_eq!(cmds.len(), 2);
        assert!(cmds.iter().all(|c| c.layer_index == 0));
        assert_eq!(cmds[1].src, Rect::new(16.0, 16.0, 16.0, 16.0));
        assert_eq!(cmds[1].dest, Rect::new(16.0, 16.0, 16.0, 16.0));
    }

    #[test]
    fn draw_commands_cull_to_padded_view() {
        let map = sample();
        // only cell (0,0) lies within one tile of this view
        let n = map.draw_commands(vec2(-40.0, -40.0), vec2(-10.0, -10.0)).count();
        assert_eq!(n, 1);
    }

    #[test]
    fn duplicate_layer_name_is_rejected() {
        let mut map = sample();
        let err = map.insert_layer(Layer::new("ground", 1, 1, 16, 16).unwrap()).unwrap_err();
        assert!(matches!(err, MapError::DuplicateKey { kind: "layer", .. }));
    }

    #[test]
    fn counts_unresolved_cells() {
        let mut map = sample();
        assert_eq!(map.unresolved_cells(), 0);

        let mut stray = Layer::new("stray", 1, 1, 16, 16).unwrap();
        stray.set_cells(vec![0], vec![FlipFlags::NONE]).unwrap();
        map.insert_layer(stray).unwrap();
        map.tilesets = TilesetTable::new();
        assert_eq!(map.unresolved_cells(), 19);
    }

    #[test]
    fn unsupported_extension() {
        let err = MapDocument::load("level.txt").unwrap_err();
        assert!(matches!(err, MapError::UnsupportedFormat(ref p) if p == "level.txt"));
    }
}
