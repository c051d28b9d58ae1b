//! Streaming TMX reader.
//!
//! One forward pass over the markup. Each element handler owns the cursor
//! until the element's end tag and hands back an owned value, so the parent
//! only ever sees finished tilesets, layers and object groups.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::assets::ImageRef;
use crate::codec::{self, Compression, Encoding};
use crate::error::MapError;
use crate::layer::{cell_count, checked_opacity, Layer};
use crate::map::MapDocument;
use crate::object::{MapObject, ObjectGroup};
use crate::properties::Properties;
use crate::tileset::Tileset;

/// Parses a `.tmx` file. The file handle is dropped on every exit path.
pub fn parse_file(path: &Path, external_tilesets: bool) -> Result<MapDocument, MapError> {
    log::info!("Parsing TMX map {}", path.display());
    let file = File::open(path).map_err(|source| MapError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let base_dir = path
        .parent()
        .map(|d| d.to_path_buf())
        .unwrap_or_else(|| PathBuf::from("./"));
    parse_reader(BufReader::new(file), &base_dir, external_tilesets)
}

/// Parses TMX from any buffered source; `base_dir` locates external tilesets.
pub fn parse_reader<R: BufRead>(
    src: R,
    base_dir: &Path,
    external_tilesets: bool,
) -> Result<MapDocument, MapError> {
    let mut parser = MapParser::new(src, base_dir, external_tilesets);
    let map = parser.parse_document()?;

    let unresolved = map.unresolved_cells();
    if unresolved > 0 {
        log::warn!("{unresolved} cells reference no tileset and will not be drawn");
    }
    log::info!(
        "Parsed {}x{} map: {} tilesets, {} layers, {} object groups",
        map.width,
        map.height,
        map.tilesets.len(),
        map.layers.len(),
        map.object_groups.len()
    );
    Ok(map)
}

/// A start tag and whether a matching end tag follows.
struct Child {
    start: BytesStart<'static>,
    has_body: bool,
}

impl Child {
    fn is(&self, name: &[u8]) -> bool {
        self.start.name().as_ref() == name
    }

    fn tag(&self) -> String {
        String::from_utf8_lossy(self.start.name().as_ref()).into_owned()
    }
}

/// Attributes of one element, unescaped.
struct Attrs {
    element: &'static str,
    values: Vec<(String, String)>,
}

impl Attrs {
    fn read(start: &BytesStart, element: &'static str) -> Result<Self, MapError> {
        let mut values = Vec::new();
        for attr in start.attributes() {
            let attr = attr
                .map_err(|e| MapError::malformed(element, format!("invalid attribute: {e}")))?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr
                .unescape_value()
                .map_err(|e| MapError::malformed(element, format!("attribute '{key}': {e}")))?
                .into_owned();
            values.push((key, value));
        }
        Ok(Attrs { element, values })
    }

    fn get(&self, key: &str) -> Option<&str> {
        self.values
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    fn string(&self, key: &str) -> String {
        self.get(key).unwrap_or_default().to_owned()
    }

    fn required<T: FromStr>(&self, key: &str) -> Result<T, MapError> {
        match self.optional(key)? {
            Some(v) => Ok(v),
            None => Err(MapError::malformed(
                self.element,
                format!("missing required attribute '{key}'"),
            )),
        }
    }

    fn optional<T: FromStr>(&self, key: &str) -> Result<Option<T>, MapError> {
        match self.get(key) {
            None => Ok(None),
            Some(raw) => raw.trim().parse().map(Some).map_err(|_| {
                MapError::malformed(self.element, format!("attribute '{key}' has invalid value '{raw}'"))
            }),
        }
    }

    fn or<T: FromStr>(&self, key: &str, default: T) -> Result<T, MapError> {
        Ok(self.optional(key)?.unwrap_or(default))
    }
}

struct MapParser<R> {
    reader: Reader<R>,
    buf: Vec<u8>,
    base_dir: PathBuf,
    external_tilesets: bool,
}

impl<R: BufRead> MapParser<R> {
    fn new(src: R, base_dir: &Path, external_tilesets: bool) -> Self {
        let mut reader = Reader::from_reader(src);
        reader.config_mut().trim_text(true);
        MapParser {
            reader,
            buf: Vec::new(),
            base_dir: base_dir.to_path_buf(),
            external_tilesets,
        }
    }

    fn next_event(&mut self) -> Result<Event<'static>, MapError> {
        self.buf.clear();
        match self.reader.read_event_into(&mut self.buf) {
            Ok(event) => Ok(event.into_owned()),
            Err(source) => Err(MapError::Xml {
                position: self.reader.buffer_position() as u64,
                source,
            }),
        }
    }

    /// Next child element of the current scope, `None` once the scope's end tag is consumed.
    fn next_child(&mut self, element: &str) -> Result<Option<Child>, MapError> {
        loop {
            match self.next_event()? {
                Event::Start(start) => return Ok(Some(Child { start, has_body: true })),
                Event::Empty(start) => return Ok(Some(Child { start, has_body: false })),
                Event::End(_) => return Ok(None),
                Event::Eof => {
                    return Err(MapError::malformed(element, "unexpected end of document"))
                }
                _ => {}
            }
        }
    }

    /// Consumes an element we do not care about, including its descendants.
    fn skip(&mut self, child: &Child) -> Result<(), MapError> {
        if !child.has_body {
            return Ok(());
        }
        let end = child.start.to_end().into_owned();
        self.buf.clear();
        self.reader
            .read_to_end_into(end.name(), &mut self.buf)
            .map_err(|source| MapError::Xml {
                position: self.reader.buffer_position() as u64,
                source,
            })?;
        Ok(())
    }

    /// Text content up to the end tag. Child elements are not allowed.
    fn read_text(&mut self, element: &'static str) -> Result<String, MapError> {
        let mut text = String::new();
        loop {
            match self.next_event()? {
                Event::Text(t) => {
                    let s = t.unescape().map_err(|source| MapError::Xml {
                        position: self.reader.buffer_position() as u64,
                        source,
                    })?;
                    text.push_str(&s);
                }
                Event::CData(c) => text.push_str(&String::from_utf8_lossy(&c)),
                Event::End(_) => return Ok(text),
                Event::Start(e) | Event::Empty(e) => {
                    return Err(MapError::Format(format!(
                        "<{}> inside <{element}> is not supported",
                        String::from_utf8_lossy(e.name().as_ref())
                    )))
                }
                Event::Eof => {
                    return Err(MapError::malformed(element, "unexpected end of document"))
                }
                _ => {}
            }
        }
    }

    fn parse_document(&mut self) -> Result<MapDocument, MapError> {
        loop {
            match self.next_event()? {
                Event::Start(start) => return self.parse_map(Child { start, has_body: true }),
                Event::Empty(start) => return self.parse_map(Child { start, has_body: false }),
                Event::Eof => return Err(MapError::malformed("map", "document has no root element")),
                _ => {}
            }
        }
    }

    fn parse_map(&mut self, root: Child) -> Result<MapDocument, MapError> {
        if !root.is(b"map") {
            return Err(MapError::malformed(
                "map",
                format!("root element is <{}>", root.tag()),
            ));
        }
        let a = Attrs::read(&root.start, "map")?;
        if let Some(orientation) = a.get("orientation") {
            if orientation != "orthogonal" {
                return Err(MapError::Format(format!("{orientation} maps are not supported")));
            }
        }
        if a.or("infinite", 0u8)? != 0 {
            return Err(MapError::Format("infinite maps are not supported".into()));
        }

        let (width, height) = (a.required("width")?, a.required("height")?);
        cell_count("map", "map", width, height)?;
        let mut map = MapDocument::new(width, height, a.required("tilewidth")?, a.required("tileheight")?);
        if !root.has_body {
            return Ok(map);
        }

        while let Some(child) = self.next_child("map")? {
            match child.start.name().as_ref() {
                b"tileset" => {
                    let ts = self.parse_tileset(&child)?;
                    log::debug!("Tileset '{}' starts at gid {}", ts.name, ts.first_gid);
                    map.tilesets.insert(ts)?;
                }
                b"layer" => {
                    let layer = self.parse_layer(&child, map.tile_width, map.tile_height)?;
                    log::debug!("Layer '{}' {}x{}", layer.name, layer.width, layer.height);
                    map.insert_layer(layer)?;
                }
                b"objectgroup" => {
                    let group = self.parse_object_group(&child)?;
                    log::debug!("Object group '{}' with {} objects", group.name, group.objects.len());
                    map.insert_object_group(group)?;
                }
                b"properties" => {
                    let props = self.parse_properties(&child)?;
                    for (k, v) in props.iter() {
                        map.properties.insert(k, v);
                    }
                }
                b"property" => return Err(orphan_property("map")),
                _ => self.skip(&child)?,
            }
        }
        Ok(map)
    }

    fn parse_tileset(&mut self, child: &Child) -> Result<Tileset, MapError> {
        let a = Attrs::read(&child.start, "tileset")?;
        let first_gid: u32 = a.required("firstgid")?;

        if let Some(source) = a.get("source") {
            if !self.external_tilesets {
                return Err(MapError::Format(format!("external tileset '{source}' not allowed")));
            }
            let source = source.to_owned();
            self.skip(child)?;
            return self.load_external_tileset(&source, first_gid);
        }

        self.parse_tileset_body(child, &a, first_gid)
    }

    fn load_external_tileset(&self, source: &str, first_gid: u32) -> Result<Tileset, MapError> {
        let path = self.base_dir.join(source);
        log::debug!("Reading external tileset {}", path.display());
        let file = File::open(&path).map_err(|source| MapError::Io {
            path: path.clone(),
            source,
        })?;
        let dir = path
            .parent()
            .map(|d| d.to_path_buf())
            .unwrap_or_else(|| self.base_dir.clone());
        let mut ext = MapParser::new(BufReader::new(file), &dir, false);

        let root = loop {
            match ext.next_event()? {
                Event::Start(start) => break Child { start, has_body: true },
                Event::Empty(start) => break Child { start, has_body: false },
                Event::Eof => {
                    return Err(MapError::malformed("tileset", format!("{source} is empty")))
                }
                _ => {}
            }
        };
        if !root.is(b"tileset") {
            return Err(MapError::malformed(
                "tileset",
                format!("{source} has root <{}>", root.tag()),
            ));
        }
        let a = Attrs::read(&root.start, "tileset")?;
        let mut ts = ext.parse_tileset_body(&root, &a, first_gid)?;

        // images are resolved against the map directory later on
        if let (Some(image), Some(rel_dir)) = (ts.image.as_mut(), Path::new(source).parent()) {
            image.source = rel_dir.join(&image.source).to_string_lossy().into_owned();
        }
        Ok(ts)
    }

    fn parse_tileset_body(
        &mut self,
        child: &Child,
        a: &Attrs,
        first_gid: u32,
    ) -> Result<Tileset, MapError> {
        let mut ts = Tileset::new(
            a.required::<String>("name")?,
            first_gid,
            a.required("tilewidth")?,
            a.required("tileheight")?,
        )
        .with_spacing(a.or("margin", 0)?, a.or("spacing", 0)?);
        ts.tile_count = a.optional("tilecount")?;
        ts.columns = a.optional("columns")?;

        if !child.has_body {
            return Ok(ts);
        }

        // loose <properties> blocks belong to the most recent <tile>
        let mut current_tile: Option<u32> = None;
        while let Some(el) = self.next_child("tileset")? {
            match el.start.name().as_ref() {
                b"image" => {
                    let image = self.parse_image(&el)?;
                    ts = ts.with_image(image);
                }
                b"properties" => {
                    let id = current_tile.ok_or_else(|| {
                        MapError::malformed(
                            "tileset",
                            format!("'{}' has a <properties> block before any <tile>", ts.name),
                        )
                    })?;
                    let props = self.parse_properties(&el)?;
                    let bag = ts.tile_properties.entry(id).or_default();
                    for (k, v) in props.iter() {
                        bag.insert(k, v);
                    }
                }
                b"tile" => {
                    let (id, props) = self.parse_tile(&el)?;
                    current_tile = Some(id);
                    let bag = ts.tile_properties.entry(id).or_default();
                    for (k, v) in props.iter() {
                        bag.insert(k, v);
                    }
                }
                b"property" => return Err(orphan_property("tileset")),
                _ => self.skip(&el)?,
            }
        }
        Ok(ts)
    }

    fn parse_tile(&mut self, child: &Child) -> Result<(u32, Properties), MapError> {
        let a = Attrs::read(&child.start, "tile")?;
        let id: u32 = a.required("id")?;
        let mut props = Properties::new();
        if child.has_body {
            while let Some(el) = self.next_child("tile")? {
                match el.start.name().as_ref() {
                    b"properties" => {
                        for (k, v) in self.parse_properties(&el)?.iter() {
                            props.insert(k, v);
                        }
                    }
                    b"property" => return Err(orphan_property("tile")),
                    _ => self.skip(&el)?,
                }
            }
        }
        Ok((id, props))
    }

    fn parse_image(&mut self, child: &Child) -> Result<ImageRef, MapError> {
        let a = Attrs::read(&child.start, "image")?;
        let image = ImageRef {
            source: a.required("source")?,
            width: a.optional("width")?,
            height: a.optional("height")?,
        };
        self.skip(child)?;
        Ok(image)
    }

    fn parse_layer(&mut self, child: &Child, tile_w: u32, tile_h: u32) -> Result<Layer, MapError> {
        let a = Attrs::read(&child.start, "layer")?;
        let mut layer = Layer::new(
            a.required::<String>("name")?,
            a.required("width")?,
            a.required("height")?,
            tile_w,
            tile_h,
        )?;
        layer.opacity = checked_opacity(&layer.name, a.or("opacity", 1.0f32)?)?;
        layer.visible = a.or("visible", 1u8)? != 0;

        if !child.has_body {
            return Ok(layer);
        }

        while let Some(el) = self.next_child("layer")? {
            match el.start.name().as_ref() {
                b"data" => {
                    let d = Attrs::read(&el.start, "data")?;
                    let encoding = Encoding::from_attr(d.get("encoding"))?;
                    let compression = Compression::from_attr(d.get("compression"))?;
                    let text = if el.has_body {
                        self.read_text("data")?
                    } else {
                        String::new()
                    };
                    let (tiles, flags) =
                        codec::decode(&text, encoding, compression, layer.tiles().len())?;
                    layer.set_cells(tiles, flags)?;
                }
                b"properties" => layer.properties = self.parse_properties(&el)?,
                b"property" => return Err(orphan_property("layer")),
                _ => self.skip(&el)?,
            }
        }
        Ok(layer)
    }

    fn parse_object_group(&mut self, child: &Child) -> Result<ObjectGroup, MapError> {
        let a = Attrs::read(&child.start, "objectgroup")?;
        let mut group = ObjectGroup::new(a.required::<String>("name")?);
        group.x = a.or("x", 0.0)?;
        group.y = a.or("y", 0.0)?;
        group.width = a.or("width", 0.0)?;
        group.height = a.or("height", 0.0)?;

        if !child.has_body {
            return Ok(group);
        }

        while let Some(el) = self.next_child("objectgroup")? {
            match el.start.name().as_ref() {
                b"object" => {
                    let obj = self.parse_object(&el)?;
                    group.objects.push(obj);
                }
                b"properties" => group.properties = self.parse_properties(&el)?,
                b"property" => return Err(orphan_property("objectgroup")),
                _ => self.skip(&el)?,
            }
        }
        Ok(group)
    }

    fn parse_object(&mut self, child: &Child) -> Result<MapObject, MapError> {
        let a = Attrs::read(&child.start, "object")?;
        let mut obj = MapObject::new(a.string("name"), a.or("x", 0.0)?, a.or("y", 0.0)?);
        obj.id = a.or("id", 0)?;
        obj.kind = a.get("class").or_else(|| a.get("type")).unwrap_or_default().to_owned();
        obj.width = a.or("width", 0.0)?;
        obj.height = a.or("height", 0.0)?;
        obj.gid = a.optional("gid")?;

        if !child.has_body {
            return Ok(obj);
        }

        while let Some(el) = self.next_child("object")? {
            match el.start.name().as_ref() {
                b"properties" => obj.properties = self.parse_properties(&el)?,
                b"image" => obj.image = Some(self.parse_image(&el)?),
                b"property" => return Err(orphan_property("object")),
                _ => self.skip(&el)?,
            }
        }
        Ok(obj)
    }

    /// Shared by every element that carries a `<properties>` block.
    fn parse_properties(&mut self, child: &Child) -> Result<Properties, MapError> {
        let mut props = Properties::new();
        if !child.has_body {
            return Ok(props);
        }
        while let Some(el) = self.next_child("properties")? {
            if el.is(b"property") {
                let (name, value) = self.parse_property(&el)?;
                props.insert(name, value);
            } else {
                self.skip(&el)?;
            }
        }
        Ok(props)
    }

    fn parse_property(&mut self, child: &Child) -> Result<(String, String), MapError> {
        let a = Attrs::read(&child.start, "property")?;
        let name: String = a.required("name")?;
        let value = match a.get("value") {
            Some(v) => {
                let v = v.to_owned();
                self.skip(child)?;
                v
            }
            // multi-line values are written as element text
            None if child.has_body => self.read_text("property")?,
            None => String::new(),
        };
        Ok((name, value))
    }
}

fn orphan_property(scope: &str) -> MapError {
    MapError::malformed(scope, "<property> outside of a <properties> block")
}
