use macroquad::math::Rect;

use crate::assets::ImageRef;
use crate::codec::GID_MASK;
use crate::error::MapError;
use crate::keyed::Keyed;
use crate::properties::Properties;
use std::collections::HashMap;

/// One atlas image cut into a regular grid of cells.
#[derive(Debug, Clone)]
pub struct Tileset {
    pub name: String,
    /// Global index of local tile 0. Always >= 1.
    pub first_gid: u32,
    pub tile_width: u32,
    pub tile_height: u32,
    pub margin: u32,
    pub spacing: u32,
    pub tile_count: Option<u32>,
    pub columns: Option<u32>,
    pub image: Option<ImageRef>,
    pub properties: Properties,
    pub tile_properties: HashMap<u32, Properties>,
    atlas_size: Option<(u32, u32)>,
}

impl Tileset {
    pub fn new(name: impl Into<String>, first_gid: u32, tile_width: u32, tile_height: u32) -> Self {
        Tileset {
            name: name.into(),
            first_gid,
            tile_width,
            tile_height,
            margin: 0,
            spacing: 0,
            tile_count: None,
            columns: None,
            image: None,
            properties: Properties::new(),
            tile_properties: HashMap::new(),
            atlas_size: None,
        }
    }

    /// Attaches the atlas reference; a size declared in the document is cached right away.
    pub fn with_image(mut self, image: ImageRef) -> Self {
        if let (Some(w), Some(h)) = (image.width, image.height) {
            self.atlas_size = Some((w, h));
        }
        self.image = Some(image);
        self
    }

    pub fn with_spacing(mut self, margin: u32, spacing: u32) -> Self {
        self.margin = margin;
        self.spacing = spacing;
        self
    }

    /// Pixel size of the atlas, once known.
    pub fn atlas_size(&self) -> Option<(u32, u32)> {
        self.atlas_size
    }

    /// Records the dimensions of the loaded atlas. Called once by the resolution pass.
    pub(crate) fn set_atlas_size(&mut self, width: u32, height: u32) {
        self.atlas_size = Some((width, height));
    }

    /// Global index minus `first_gid`, if the index belongs at or above this tileset.
    pub fn local_index(&self, gid: u32) -> Option<u32> {
        (gid & GID_MASK).checked_sub(self.first_gid)
    }

    /// Source rectangle of `local` inside the atlas.
    pub fn tile_rect(&self, local: u32) -> Result<Rect, MapError> {
        let (tex_w, tex_h) = self.atlas_size.ok_or_else(|| MapError::ImageUnresolved {
            tileset: self.name.clone(),
        })?;

        // u64 keeps huge tile sizes or spacings from wrapping
        let step_w = u64::from(self.tile_width) + u64::from(self.spacing);
        let step_h = u64::from(self.tile_height) + u64::from(self.spacing);
        let cols = if step_w == 0 { 0 } else { u64::from(tex_w) / step_w };
        let rows = if step_h == 0 { 0 } else { u64::from(tex_h) / step_h };
        if cols == 0 {
            return Err(MapError::OutOfRange {
                index: local,
                reason: format!("tileset '{}' atlas holds no full column", self.name),
            });
        }

        let local_wide = u64::from(local);
        let row = local_wide / cols;
        if row >= rows {
            return Err(MapError::OutOfRange {
                index: local,
                reason: format!("tileset '{}' atlas has {} rows", self.name, rows),
            });
        }
        let col = local_wide % cols;

        Ok(Rect::new(
            (col * step_w + u64::from(self.margin)) as f32,
            (row * step_h + u64::from(self.margin)) as f32,
            self.tile_width as f32,
            self.tile_height as f32,
        ))
    }
}

/// All tilesets of a map, keyed by name, resolvable by global index.
#[derive(Debug, Clone)]
pub struct TilesetTable {
    sets: Keyed<Tileset>,
    // positions into `sets`, sorted by first_gid
    by_gid: Vec<usize>,
}

impl Default for TilesetTable {
    fn default() -> Self {
        TilesetTable {
            sets: Keyed::new("tileset"),
            by_gid: Vec::new(),
        }
    }
}

impl TilesetTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, tileset: Tileset) -> Result<(), MapError> {
        if tileset.first_gid == 0 {
            return Err(MapError::malformed(
                "tileset",
                format!("'{}' has firstgid 0, which is reserved", tileset.name),
            ));
        }
        let first_gid = tileset.first_gid;
        let name = tileset.name.clone();
        let idx = self.sets.insert(&name, tileset)?;

        let pos = self
            .by_gid
            .partition_point(|&i| self.sets[i].first_gid <= first_gid);
        self.by_gid.insert(pos, idx);
        Ok(())
    }

    /// Tileset owning `gid` and the local index inside it; `None` for empty cells.
    #[inline]
    pub fn resolve(&self, gid: u32) -> Option<(&Tileset, u32)> {
        let clean = gid & GID_MASK;
        if clean == 0 {
            return None;
        }
        let pos = self
            .by_gid
            .partition_point(|&i| self.sets[i].first_gid <= clean);
        let ts = &self.sets[*self.by_gid.get(pos.checked_sub(1)?)?];
        Some((ts, clean - ts.first_gid))
    }

    /// Source rect for a global index, failing when it resolves nowhere.
    pub fn source_rect(&self, gid: u32) -> Result<(&Tileset, Rect), MapError> {
        let (ts, local) = self.resolve(gid).ok_or_else(|| MapError::OutOfRange {
            index: gid,
            reason: "no tileset covers this index".into(),
        })?;
        Ok((ts, ts.tile_rect(local)?))
    }

    pub fn tile_properties(&self, gid: u32) -> Option<&Properties> {
        let (ts, local) = self.resolve(gid)?;
        ts.tile_properties.get(&local)
    }

    pub fn get(&self, name: &str) -> Option<&Tileset> {
        self.sets.get(name)
    }

    /// Tilesets in document order.
    pub fn iter(&self) -> std::slice::Iter<'_, Tileset> {
        self.sets.iter()
    }

    pub(crate) fn iter_mut(&mut self) -> std::slice::IterMut<'_, Tileset> {
        self.sets.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }
}
