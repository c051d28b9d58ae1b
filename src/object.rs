use macroquad::math::{vec2, Rect};

use crate::assets::ImageRef;
use crate::properties::Properties;

/// A freely positioned map entity: trigger, spawn point, decoration.
#[derive(Debug, Clone, PartialEq)]
pub struct MapObject {
    pub id: u32,
    pub name: String,
    /// `type` (or `class` in newer documents).
    pub kind: String,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    /// Set for tile objects.
    pub gid: Option<u32>,
    pub image: Option<ImageRef>,
    pub properties: Properties,
}

impl MapObject {
    pub fn new(name: impl Into<String>, x: f32, y: f32) -> Self {
        MapObject {
            id: 0,
            name: name.into(),
            kind: String::new(),
            x,
            y,
            width: 0.0,
            height: 0.0,
            gid: None,
            image: None,
            properties: Properties::new(),
        }
    }

    pub fn bounds(&self) -> Rect {
        Rect::new(self.x, self.y, self.width, self.height)
    }

    /// Zero-sized objects are treated as points.
    pub fn intersects(&self, region: &Rect) -> bool {
        if self.width == 0.0 && self.height == 0.0 {
            region.contains(vec2(self.x, self.y))
        } else {
            self.bounds().overlaps(region)
        }
    }
}

/// Named collection of objects, kept in document order.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectGroup {
    pub name: String,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub properties: Properties,
    pub objects: Vec<MapObject>,
}

impl ObjectGroup {
    pub fn new(name: impl Into<String>) -> Self {
        ObjectGroup {
            name: name.into(),
            x: 0.0,
            y: 0.0,
            width: 0.0,
            height: 0.0,
            properties: Properties::new(),
            objects: Vec::new(),
        }
    }

    /// First object with this name. Names are not unique in Tiled.
    pub fn object(&self, name: &str) -> Option<&MapObject> {
        self.objects.iter().find(|o| o.name == name)
    }

    pub fn objects_in_region<'a>(&'a self, region: &'a Rect) -> impl Iterator<Item = &'a MapObject> {
        self.objects.iter().filter(move |o| o.intersects(region))
    }
}
