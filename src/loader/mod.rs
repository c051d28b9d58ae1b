pub mod json;
pub mod tmx;

use std::path::{Path, PathBuf};

use crate::assets::{resolve_images, ImageLoader, ImageTable};
use crate::config::LoadOptions;
use crate::error::MapError;
use crate::ground::{GroundAnalyzer, GroundMap, PropertyGroundAnalyzer};
use crate::map::MapDocument;

/// A parsed map together with its loaded images and ground lookup.
#[derive(Debug)]
pub struct LoadedMap<I, G = GroundMap> {
    pub map: MapDocument,
    pub images: ImageTable<I>,
    /// `None` when ground analysis was switched off.
    pub ground: Option<G>,
}

impl<I, G> LoadedMap<I, G> {
    /// Atlas image of the named tileset.
    pub fn tileset_image(&self, tileset: &str) -> Option<&I> {
        let ts = self.map.tilesets.get(tileset)?;
        self.images.get(&ts.image.as_ref()?.source)
    }
}

/// Parses the map at `path`, loads its images and runs the default ground analysis.
pub fn load_map<L: ImageLoader>(path: impl AsRef<Path>, loader: &mut L) -> Result<LoadedMap<L::Image>, MapError> {
    load_map_with(path, loader, &PropertyGroundAnalyzer::default(), LoadOptions::default())
}

/// [`load_map`] with a custom ground analyzer and options.
pub fn load_map_with<L, A>(
    path: impl AsRef<Path>,
    loader: &mut L,
    analyzer: &A,
    options: LoadOptions,
) -> Result<LoadedMap<L::Image, A::Output>, MapError>
where
    L: ImageLoader,
    A: GroundAnalyzer,
{
    let path = path.as_ref();
    let mut map = match path.extension().and_then(|e| e.to_str()) {
        Some("tmx") => tmx::parse_file(path, options.external_tilesets)?,
        Some("json") | Some("tmj") => json::parse_file(path, options.external_tilesets)?,
        _ => MapDocument::load(path)?,
    };

    let base_dir = path
        .parent()
        .map(|d| d.to_path_buf())
        .unwrap_or_else(|| PathBuf::from("./"));
    let images = resolve_images(&mut map, loader, &base_dir, options.resolve_object_images)?;

    let ground = options.analyze_ground.then(|| analyzer.analyze(&map));

    log::info!("Loaded map {} ({} images)", path.display(), images.len());
    Ok(LoadedMap { map, images, ground })
}
