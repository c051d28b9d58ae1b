//! Streaming Tiled TMX loader and viewport query engine for Macroquad.
//!
//! [`load_map`] parses a `.tmx` (or Tiled JSON) file, decodes its tile
//! layers, loads every referenced image through an [`ImageLoader`] and runs a
//! ground analysis pass. The resulting [`MapDocument`] answers region queries
//! such as [`Layer::tiles_in_region`] and [`MapDocument::draw_commands`].

pub mod assets;
pub mod codec;
pub mod config;
mod error;
pub mod ground;
mod keyed;
pub mod layer;
pub mod loader;
mod map;
pub mod object;
mod properties;
pub mod render;
pub mod tileset;

pub use assets::{ImageLoader, ImageRef, ImageTable, MacroquadImageLoader};
pub use codec::{Compression, Encoding, FlipFlags, TileId};
pub use config::LoadOptions;
pub use error::MapError;
pub use ground::{GroundAnalyzer, GroundKind, GroundMap, PropertyGroundAnalyzer};
pub use keyed::Keyed;
pub use layer::{Layer, LayerTile};
pub use loader::{load_map, load_map_with, LoadedMap};
pub use map::MapDocument;
pub use object::{MapObject, ObjectGroup};
pub use properties::Properties;
pub use render::DrawCommand;
pub use tileset::{Tileset, TilesetTable};
