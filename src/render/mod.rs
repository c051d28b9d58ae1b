pub mod cull;

use macroquad::math::Rect;

use crate::codec::FlipFlags;
use crate::tileset::Tileset;

/// Everything a sprite batch needs to draw one tile.
#[derive(Debug, Clone, Copy)]
pub struct DrawCommand<'m> {
    pub layer_index: usize,
    pub tileset: &'m Tileset,
    pub gid: u32,
    pub src: Rect,
    pub dest: Rect,
    pub flags: FlipFlags,
    pub opacity: f32,
}
