// tests/map_tests.rs

use macroquad::math::{vec2, Rect};
use macroquad_tmx::codec::{decode, encode};
use macroquad_tmx::{Compression, Encoding, FlipFlags, MapDocument, MapError, Tileset, TilesetTable};

#[test]
fn flag_bits_decode_to_index_and_flags() {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;

    let bytes: Vec<u8> = [0x8000_0000u32, 0xE000_0005]
        .iter()
        .flat_map(|c| c.to_le_bytes())
        .collect();
    let (tiles, flags) = decode(&STANDARD.encode(bytes), Encoding::Base64, Compression::None, 2).unwrap();

    assert_eq!(tiles, vec![0, 5]);
    assert_eq!(flags[0], FlipFlags::HORIZONTAL);
    assert!(flags[1].horizontal() && flags[1].vertical() && flags[1].diagonal());
}

#[test]
fn encode_decode_round_trip() {
    let tiles: Vec<u32> = (0..64).map(|i| (i * 7919) % 1000).collect();
    let flags: Vec<FlipFlags> = (0..64).map(|i| FlipFlags::from_bits(i as u8 % 8)).collect();

    for compression in [Compression::None, Compression::Gzip] {
        let text = encode(&tiles, &flags, compression).unwrap();
        assert_eq!(decode(&text, Encoding::Base64, compression, 64).unwrap(), (tiles.clone(), flags.clone()));
    }
}

#[test]
fn resolves_across_three_tilesets() {
    let mut table = TilesetTable::new();
    for (name, gid) in [("a", 1), ("b", 50), ("c", 120)] {
        table.insert(Tileset::new(name, gid, 64, 64)).unwrap();
    }
    let (ts, local) = table.resolve(75).unwrap();
    assert_eq!((ts.name.as_str(), local), ("b", 25));
    assert!(table.resolve(0).is_none());
}

const SMALL_MAP: &str = r#"<map width="10" height="10" tilewidth="16" tileheight="16">
  <layer name="ground" width="10" height="10"/>
</map>"#;

#[test]
fn far_away_region_is_empty_not_error() {
    let map = MapDocument::from_tmx_str(SMALL_MAP).unwrap();
    let layer = map.layer("ground").unwrap();
    assert_eq!(layer.tiles_in_region(Rect::new(1.0e6, 1.0e6, 320.0, 240.0)).count(), 0);
    assert_eq!(map.draw_commands(vec2(-1.0e6, -1.0e6), vec2(-9.0e5, -9.0e5)).count(), 0);
}

#[test]
fn duplicate_ground_layers_fail() {
    let xml = r#"<map width="1" height="1" tilewidth="8" tileheight="8">
  <layer name="ground" width="1" height="1"/>
  <layer name="ground" width="1" height="1"/>
</map>"#;
    let err = MapDocument::from_tmx_str(xml).unwrap_err();
    assert!(matches!(err, MapError::DuplicateKey { .. }));
}

#[test]
fn map_without_tilewidth_is_malformed() {
    let err = MapDocument::from_tmx_str(r#"<map width="1" height="1" tileheight="8"></map>"#).unwrap_err();
    assert!(matches!(err, MapError::MalformedDocument { .. }));
}

#[test]
fn unknown_elements_and_attributes_are_ignored() {
    let xml = r##"<map width="1" height="1" tilewidth="8" tileheight="8" renderorder="right-down" nextobjectid="3">
  <editorsettings><export target="x.json" format="json"/></editorsettings>
  <imagelayer name="bg"><image source="bg.png"/></imagelayer>
  <layer name="l" width="1" height="1" tintcolor="#ff0000"/>
</map>"##;
    let map = MapDocument::from_tmx_str(xml).unwrap();
    assert_eq!(map.layers.len(), 1);
    assert!(map.layer("bg").is_none());
}

#[test]
fn layer_too_large_to_allocate_is_malformed() {
    let xml = r#"<map width="1" height="1" tilewidth="8" tileheight="8">
  <layer name="l" width="4294967296" height="4294967296"/>
</map>"#;
    let err = MapDocument::from_tmx_str(xml).unwrap_err();
    assert!(matches!(err, MapError::MalformedDocument { .. }));
}
