/// Extra tiles of padding around a viewport in map-wide draw queries, so
/// tiles straddling the edge are never culled.
pub const CULL_MARGIN_TILES: u32 = 1;

/// Upper bound on `width * height` for any map or layer grid read from a document.
pub const MAX_LAYER_CELLS: usize = 1 << 26;

/// Knobs for [`crate::load_map_with`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadOptions {
    /// Load `<image>` references of objects as well as tileset atlases.
    pub resolve_object_images: bool,
    /// Follow external tileset references (`<tileset source="...">` in TMX,
    /// `"source"` entries in JSON maps) into their own files.
    pub external_tilesets: bool,
    /// Run the ground analyzer after images are resolved.
    pub analyze_ground: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        LoadOptions {
            resolve_object_images: true,
            external_tilesets: true,
            analyze_ground: true,
        }
    }
}
