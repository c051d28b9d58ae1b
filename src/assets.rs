use std::collections::HashMap;
use std::path::{Path, PathBuf};

use macroquad::texture::Image;
use serde::{Deserialize, Serialize};

use crate::error::MapError;
use crate::map::MapDocument;

/// An image referenced by the document, path relative to the map file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    pub source: String,
    /// Size declared in the document, if any.
    pub width: Option<u32>,
    pub height: Option<u32>,
}

impl ImageRef {
    pub fn new(source: impl Into<String>) -> Self {
        ImageRef {
            source: source.into(),
            width: None,
            height: None,
        }
    }
}

/// Host collaborator that turns an image path into a usable handle.
pub trait ImageLoader {
    type Image;

    /// Fails with [`MapError::AssetNotFound`] when the image does not exist.
    fn load_image(&mut self, path: &Path) -> Result<Self::Image, MapError>;

    /// Pixel dimensions of a loaded image.
    fn image_size(&self, image: &Self::Image) -> (u32, u32);
}

/// Decodes images on the CPU with macroquad; upload with `Texture2D::from_image`.
#[derive(Debug, Default, Clone, Copy)]
pub struct MacroquadImageLoader;

impl ImageLoader for MacroquadImageLoader {
    type Image = Image;

    fn load_image(&mut self, path: &Path) -> Result<Image, MapError> {
        let bytes = std::fs::read(path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                MapError::AssetNotFound {
                    path: path.to_path_buf(),
                }
            } else {
                MapError::Io {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })?;
        Image::from_file_with_format(&bytes, None).map_err(|e| {
            MapError::Format(format!("cannot decode image {}: {e}", path.display()))
        })
    }

    fn image_size(&self, image: &Image) -> (u32, u32) {
        (image.width() as u32, image.height() as u32)
    }
}

/// Loaded images keyed by their `source` string as written in the document.
#[derive(Debug)]
pub struct ImageTable<I> {
    images: HashMap<String, I>,
}

impl<I> Default for ImageTable<I> {
    fn default() -> Self {
        ImageTable {
            images: HashMap::new(),
        }
    }
}

impl<I> ImageTable<I> {
    pub fn get(&self, source: &str) -> Option<&I> {
        self.images.get(source)
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    fn load_once<L>(&mut self, loader: &mut L, base_dir: &Path, source: &str) -> Result<&I, MapError>
    where
        L: ImageLoader<Image = I>,
    {
        if !self.images.contains_key(source) {
            let path = resolve_path(base_dir, source);
            log::debug!("Loading image {}", path.display());
            let img = loader.load_image(&path)?;
            self.images.insert(source.to_owned(), img);
        }
        Ok(&self.images[source])
    }
}

pub(crate) fn resolve_path(base_dir: &Path, source: &str) -> PathBuf {
    base_dir.join(source)
}

/// Loads every tileset image (and object image if asked), caching atlas sizes
/// on the tilesets. Each distinct source is loaded once.
pub fn resolve_images<L: ImageLoader>(
    map: &mut MapDocument,
    loader: &mut L,
    base_dir: &Path,
    object_images: bool,
) -> Result<ImageTable<L::Image>, MapError> {
    let mut table = ImageTable::default();

    for ts in map.tilesets.iter_mut() {
        let Some(image) = &ts.image else { continue };
        let loaded = table.load_once(loader, base_dir, &image.source)?;
        let (w, h) = loader.image_size(loaded);
        if let (Some(dw), Some(dh)) = (image.width, image.height) {
            if (dw, dh) != (w, h) {
                log::warn!(
                    "Tileset '{}' declares a {}x{} atlas but {} is {}x{}",
                    ts.name, dw, dh, image.source, w, h
                );
            }
        }
        ts.set_atlas_size(w, h);
    }

    if object_images {
        for group in map.object_groups.iter() {
            for obj in &group.objects {
                if let Some(image) = &obj.image {
                    table.load_once(loader, base_dir, &image.source)?;
                }
            }
        }
    }

    Ok(table)
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Pretends every listed path exists with the given size.
    #[derive(Default)]
    pub struct StubLoader {
        pub sizes: HashMap<PathBuf, (u32, u32)>,
        pub loads: Vec<PathBuf>,
    }

    impl StubLoader {
        pub fn with(mut self, path: impl Into<PathBuf>, w: u32, h: u32) -> Self {
            self.sizes.insert(path.into(), (w, h));
            self
        }
    }

    impl ImageLoader for StubLoader {
        type Image = (u32, u32);

        fn load_image(&mut self, path: &Path) -> Result<(u32, u32), MapError> {
            self.loads.push(path.to_path_buf());
            self.sizes
                .get(path)
                .copied()
                .ok_or_else(|| MapError::AssetNotFound {
                    path: path.to_path_buf(),
                })
        }

        fn image_size(&self, image: &(u32, u32)) -> (u32, u32) {
            *image
        }
    }
}
