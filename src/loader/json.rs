// Tiled JSON (.tmj/.json) maps, loaded into the same model as TMX.
use crate::assets::ImageRef;
use crate::codec::{self, Compression, Encoding, TileId};
use crate::error::MapError;
use crate::layer::{cell_count, checked_opacity, Layer};
use crate::map::MapDocument;
use crate::object::{MapObject, ObjectGroup};
use crate::properties::Properties;
use crate::tileset::Tileset;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::path::{Path, PathBuf};

#[derive(Deserialize)]
#[serde(untagged)]
enum JsonData {
    Cells(Vec<u32>),
    Encoded(String),
}

#[derive(Deserialize)]
struct JsonLayer {
    #[serde(default)]
    data: Option<JsonData>,
    #[serde(default)]
    encoding: Option<String>,
    #[serde(default)]
    compression: Option<String>,
    #[serde(default)]
    width: usize,
    #[serde(default)]
    height: usize,
    #[serde(default = "default_true")]
    visible: bool,
    #[serde(default = "one")]
    opacity: f32,
    #[serde(default)]
    x: f32,
    #[serde(default)]
    y: f32,
    #[serde(default)]
    name: String,
    #[serde(rename = "type")]
    kind: Option<String>, // "tilelayer" expected here
    #[serde(default)]
    properties: Vec<JsonProperty>,
    #[serde(default)]
    objects: Vec<JsonObject>,
}

fn default_true() -> bool {
    true
}
fn one() -> f32 {
    1.0
}

#[derive(Deserialize)]
struct JsonMap {
    width: usize,
    height: usize,
    tilewidth: u32,
    tileheight: u32,
    #[serde(default)]
    orientation: Option<String>,
    #[serde(default)]
    infinite: bool,
    #[serde(default)]
    layers: Vec<JsonLayer>,
    #[serde(default)]
    tilesets: Vec<JsonTileset>,
    #[serde(default)]
    properties: Vec<JsonProperty>,
}

/// Embedded tileset, or a `source` reference with only `firstgid` filled in.
#[derive(Deserialize)]
struct JsonTileset {
    firstgid: u32,
    #[serde(default)]
    source: Option<String>,
    #[serde(flatten)]
    body: Option<JsonTilesetBody>,
}

#[derive(Deserialize)]
struct JsonTilesetBody {
    name: String,
    tilewidth: u32,
    tileheight: u32,
    #[serde(default)]
    tilecount: Option<u32>,
    #[serde(default)]
    columns: Option<u32>,
    #[serde(default)]
    image: Option<String>,
    #[serde(default)]
    imagewidth: Option<u32>,
    #[serde(default)]
    imageheight: Option<u32>,
    #[serde(default)]
    spacing: u32,
    #[serde(default)]
    margin: u32,
    #[serde(default)]
    properties: Vec<JsonProperty>,
    #[serde(default)]
    tiles: Vec<JsonTile>,
}

#[derive(Deserialize)]
struct JsonProperty {
    name: String,
    value: JsonValue,
}

#[derive(Deserialize)]
struct JsonObject {
    #[serde(default)]
    id: u32,
    #[serde(default)]
    name: String,
    #[serde(default, rename = "type")]
    kind: String,
    #[serde(default)]
    class: String,
    #[serde(default)]
    x: f32,
    #[serde(default)]
    y: f32,
    #[serde(default)]
    width: f32,
    #[serde(default)]
    height: f32,
    #[serde(default)]
    gid: Option<u32>,
    #[serde(default)]
    properties: Vec<JsonProperty>,
}

#[derive(Deserialize)]
struct JsonTile {
    id: u32,
    #[serde(default)]
    properties: Vec<JsonProperty>,
}

fn properties_from_json(props: Vec<JsonProperty>) -> Properties {
    props
        .into_iter()
        .map(|p| {
            let value = match p.value {
                JsonValue::String(s) => s,
                JsonValue::Null => String::new(),
                other => other.to_string(),
            };
            (p.name, value)
        })
        .collect()
}

fn object_from_json(obj: JsonObject) -> MapObject {
    let mut out = MapObject::new(obj.name, obj.x, obj.y);
    out.id = obj.id;
    out.kind = if !obj.class.is_empty() { obj.class } else { obj.kind };
    out.width = obj.width;
    out.height = obj.height;
    out.gid = obj.gid;
    out.properties = properties_from_json(obj.properties);
    out
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, MapError> {
    let txt = std::fs::read_to_string(path).map_err(|source| MapError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&txt).map_err(|source| MapError::Json {
        path: path.to_path_buf(),
        source,
    })
}

fn tileset_from_json(first_gid: u32, body: JsonTilesetBody, image_dir: &Path) -> Tileset {
    let mut ts = Tileset::new(body.name, first_gid, body.tilewidth, body.tileheight)
        .with_spacing(body.margin, body.spacing);
    ts.tile_count = body.tilecount;
    ts.columns = body.columns;
    ts.properties = properties_from_json(body.properties);
    if let Some(image) = body.image {
        // keep the path relative to the map directory
        let source = if image_dir.as_os_str().is_empty() {
            image
        } else {
            image_dir.join(image).to_string_lossy().into_owned()
        };
        ts = ts.with_image(ImageRef {
            source,
            width: body.imagewidth,
            height: body.imageheight,
        });
    }
    for tile in body.tiles {
        let props = properties_from_json(tile.properties);
        if !props.is_empty() {
            ts.tile_properties.insert(tile.id, props);
        }
    }
    ts
}

fn layer_cells(
    l: &JsonLayer,
    cell_count: usize,
) -> Result<(Vec<u32>, Vec<codec::FlipFlags>), MapError> {
    match &l.data {
        None => Ok((vec![0; cell_count], vec![codec::FlipFlags::NONE; cell_count])),
        Some(JsonData::Cells(raw)) => {
            if raw.len() != cell_count {
                return Err(MapError::Format(format!(
                    "layer '{}' has {} cells, expected {}",
                    l.name,
                    raw.len(),
                    cell_count
                )));
            }
            Ok(raw
                .iter()
                .map(|&c| (TileId(c).clean(), TileId(c).flags()))
                .unzip())
        }
        Some(JsonData::Encoded(text)) => codec::decode(
            text,
            Encoding::from_attr(l.encoding.as_deref())?,
            Compression::from_attr(l.compression.as_deref())?,
            cell_count,
        ),
    }
}

/// Loads a Tiled JSON map. External tilesets must be JSON as well, and are
/// refused with `Format` unless `external_tilesets` is set.
pub fn parse_file(path: &Path, external_tilesets: bool) -> Result<MapDocument, MapError> {
    log::info!("Parsing JSON map {}", path.display());
    let j: JsonMap = read_json(path)?;

    let map_dir = path
        .parent()
        .map(|d| d.to_path_buf())
        .unwrap_or_else(|| PathBuf::from("./"));

    if let Some(o) = j.orientation.as_deref().filter(|o| *o != "orthogonal") {
        return Err(MapError::Format(format!("{o} maps are not supported")));
    }
    if j.infinite {
        return Err(MapError::Format("infinite maps are not supported".into()));
    }

    cell_count("map", "map", j.width, j.height)?;
    let mut map = MapDocument::new(j.width, j.height, j.tilewidth, j.tileheight);
    map.properties = properties_from_json(j.properties);

    for ts in j.tilesets {
        let tileset = match (ts.source, ts.body) {
            (Some(source), _) => {
                if !external_tilesets {
                    return Err(MapError::Format(format!("external tileset '{source}' not allowed")));
                }
                if !source.ends_with(".json") && !source.ends_with(".tsj") {
                    return Err(MapError::UnsupportedFormat(source));
                }
                let ts_path = map_dir.join(&source);
                let body: JsonTilesetBody = read_json(&ts_path)?;
                let rel_dir = Path::new(&source).parent().unwrap_or(Path::new(""));
                tileset_from_json(ts.firstgid, body, rel_dir)
            }
            (None, Some(body)) => tileset_from_json(ts.firstgid, body, Path::new("")),
            (None, None) => {
                return Err(MapError::malformed(
                    "tileset",
                    format!("tileset at gid {} has neither source nor body", ts.firstgid),
                ))
            }
        };
        log::debug!("Tileset '{}' starts at gid {}", tileset.name, tileset.first_gid);
        map.tilesets.insert(tileset)?;
    }

    for l in j.layers {
        match l.kind.as_deref().unwrap_or("tilelayer") {
            "tilelayer" => {
                let cells = cell_count("layer", &l.name, l.width, l.height)?;
                let (tiles, flags) = layer_cells(&l, cells)?;
                let opacity = checked_opacity(&l.name, l.opacity)?;
                let mut layer = Layer::new(l.name, l.width, l.height, j.tilewidth, j.tileheight)?;
                layer.opacity = opacity;
                layer.visible = l.visible;
                layer.properties = properties_from_json(l.properties);
                layer.set_cells(tiles, flags)?;
                map.insert_layer(layer)?;
            }
            "objectgroup" => {
                let mut group = ObjectGroup::new(l.name);
                group.x = l.x;
                group.y = l.y;
                group.properties = properties_from_json(l.properties);
                group.objects = l.objects.into_iter().map(object_from_json).collect();
                map.insert_object_group(group)?;
            }
            other => log::debug!("Ignoring '{}' layer '{}'", other, l.name),
        }
    }

    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_dir() -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock went backwards")
            .as_nanos();
        let dir = std::env::temp_dir().join(format!("mq_tmx_json_{nanos}"));
        fs::create_dir_all(&dir).expect("failed to create temp dir");
        dir
    }

    #[test]
    fn parses_embedded_and_external_tilesets_with_properties() {
        let dir = temp_dir();
        let map_path = dir.join("map.json");
        fs::create_dir_all(dir.join("sets")).unwrap();

        let map_json = r#"{
          "width": 2, "height": 1, "tilewidth": 16, "tileheight": 16,
          "orientation": "orthogonal",
          "properties": [
            {"name":"is_night","type":"bool","value":true},
            {"name":"gravity","type":"float","value":9.8},
            {"name":"theme","type":"string","value":"forest"}
          ],
          "layers": [
            {"type":"tilelayer","name":"ground","width":2,"height":1,"data":[1, 2147483653],
             "properties":[{"name":"difficulty","type":"int","value":3}]},
            {"type":"objectgroup","name":"spawns",
             "objects":[{"id":7,"name":"spawn_1","type":"spawn","x":4,"y":8,
                         "properties":[{"name":"kind","type":"string","value":"player"}]}]},
            {"type":"imagelayer","name":"sky"}
          ],
          "tilesets":[
            {"firstgid":1,"name":"inline","tilewidth":16,"tileheight":16,"image":"tiles.png",
             "imagewidth":64,"imageheight":64,
             "tiles":[{"id":0,"properties":[{"name":"damage","type":"int","value":10}]}]},
            {"firstgid":5,"source":"sets/ext.json"}
          ]
        }"#;
        let ext_json = r#"{"name":"ext","tilewidth":16,"tileheight":16,"image":"ext.png","spacing":1}"#;

        fs::write(&map_path, map_json).unwrap();
        fs::write(dir.join("sets/ext.json"), ext_json).unwrap();

        let map = parse_file(&map_path, true).expect("decode");
        assert_eq!(map.properties.get_bool("is_night"), Some(true));
        assert_eq!(map.properties.get_f32("gravity"), Some(9.8));
        assert_eq!(map.properties.get("theme"), Some("forest"));

        let ground = map.layer("ground").unwrap();
        assert_eq!(ground.tiles(), &[1, 5]);
        assert!(ground.flags()[1].horizontal());
        assert_eq!(ground.properties.get_i32("difficulty"), Some(3));

        let spawn = map.object_group("spawns").unwrap().object("spawn_1").unwrap();
        assert_eq!(spawn.kind, "spawn");
        assert_eq!(spawn.properties.get("kind"), Some("player"));

        assert_eq!(map.tilesets.tile_properties(1).and_then(|p| p.get_i32("damage")), Some(10));
        let ext = map.tilesets.get("ext").unwrap();
        assert_eq!(ext.spacing, 1);
        let source = ext.image.as_ref().unwrap().source.replace('\\', "/");
        assert_eq!(source, "sets/ext.png");
        assert_eq!(map.layers.len(), 1);
    }

    #[test]
    fn decodes_base64_layer_strings() {
        let dir = temp_dir();
        let map_path = dir.join("map.json");
        let tiles = vec![1, 0, 3, 0];
        let flags = vec![codec::FlipFlags::NONE; 4];
        let data = codec::encode(&tiles, &flags, Compression::Zlib).unwrap();
        let map_json = format!(
            r#"{{"width":2,"height":2,"tilewidth":8,"tileheight":8,
                "layers":[{{"type":"tilelayer","name":"l","width":2,"height":2,
                           "encoding":"base64","compression":"zlib","data":"{data}"}}]}}"#
        );
        fs::write(&map_path, map_json).unwrap();

        let map = parse_file(&map_path, true).unwrap();
        assert_eq!(map.layer("l").unwrap().tiles(), &tiles[..]);
    }

    #[test]
    fn returns_typed_error_for_malformed_json() {
        let dir = temp_dir();
        let map_path = dir.join("map.json");
        fs::write(&map_path, "{ not json").unwrap();

        let err = parse_file(&map_path, true).unwrap_err();
        assert!(matches!(err, MapError::Json { .. }));
    }

    #[test]
    fn returns_typed_error_for_missing_tileset_file() {
        let dir = temp_dir();
        let map_path = dir.join("map.json");
        let map_json = r#"{
          "width": 1, "height": 1, "tilewidth": 16, "tileheight": 16,
          "tilesets":[{"firstgid":1,"source":"missing_tileset.json"}]
        }"#;
        fs::write(&map_path, map_json).unwrap();

        let err = parse_file(&map_path, true).unwrap_err();
        assert!(matches!(err, MapError::Io { .. }));
    }

    #[test]
    fn layer_size_mismatch_is_rejected() {
        let dir = temp_dir();
        let map_path = dir.join("map.json");
        let map_json = r#"{"width":2,"height":2,"tilewidth":8,"tileheight":8,
            "layers":[{"type":"tilelayer","name":"oops","width":2,"height":2,"data":[1,2,3]}]}"#;
        fs::write(&map_path, map_json).unwrap();

        assert!(matches!(parse_file(&map_path, true), Err(MapError::Format(_))));
    }

    #[test]
    fn external_tilesets_can_be_refused() {
        let dir = temp_dir();
        let map_path = dir.join("map.json");
        let map_json = r#"{"width":1,"height":1,"tilewidth":8,"tileheight":8,
            "tilesets":[{"firstgid":1,"source":"ext.json"}]}"#;
        fs::write(&map_path, map_json).unwrap();

        assert!(matches!(parse_file(&map_path, false), Err(MapError::Format(_))));
    }

    #[test]
    fn oversized_layer_is_malformed() {
        let dir = temp_dir();
        let map_path = dir.join("map.json");
        let map_json = r#"{"width":1,"height":1,"tilewidth":8,"tileheight":8,
            "layers":[{"type":"tilelayer","name":"huge","width":4294967296,"height":4294967296}]}"#;
        fs::write(&map_path, map_json).unwrap();

        assert!(matches!(
            parse_file(&map_path, true),
            Err(MapError::MalformedDocument { .. })
        ));
    }
}
