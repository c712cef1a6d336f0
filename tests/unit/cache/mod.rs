use std::collections::{BTreeMap, BTreeSet};

use super::*;
use crate::request::{
    canonical::canonicalize,
    model::{BodyPart, Light, Material, Request},
};

fn temp_dir(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!(
        "mosculp_{name}_{}_{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos()
    ))
}

fn key() -> CanonicalKey {
    canonicalize(&Request {
        clip: "ballet11-2".to_string(),
        density: 0.0,
        lights: BTreeSet::from([Light::Middle]),
        transparency: 0.2,
        specularity: false,
        parts: BTreeSet::from([BodyPart::Body]),
        material: BTreeMap::from([(BodyPart::Body, Material::Original)]),
        artistic_background: false,
    })
}

fn image() -> RgbImage {
    RgbImage::from_fn(5, 3, |x, y| image::Rgb([x as u8 * 40, y as u8 * 80, 7]))
}

#[test]
fn path_layout_nests_key_below_clip() {
    let cache = CompositeCache::new("/tmp/mosculp_gui");
    let path = cache.path_for(&key(), BackgroundMode::Artistic);
    assert_eq!(
        path,
        PathBuf::from(
            "/tmp/mosculp_gui/ballet11-2/composite_enum/clip.ballet11-2/density.0.00/lights.Middle/transp.0.20/spec.Off/part.Body/mat.Orig/comp_2x.png"
        )
    );
}

#[test]
fn lookup_misses_until_stored() {
    let root = temp_dir("cache_lookup");
    let cache = CompositeCache::new(&root);
    assert!(cache.lookup(&key(), BackgroundMode::Video).is_none());

    let stored = cache.store(&key(), BackgroundMode::Video, &image()).unwrap();
    assert_eq!(cache.lookup(&key(), BackgroundMode::Video), Some(stored));
    assert!(cache.lookup(&key(), BackgroundMode::Artistic).is_none());

    std::fs::remove_dir_all(&root).ok();
}

#[test]
fn stored_bytes_round_trip_exactly() {
    let root = temp_dir("cache_round_trip");
    let cache = CompositeCache::new(&root);
    let img = image();

    let path = cache.store(&key(), BackgroundMode::Video, &img).unwrap();
    let bytes = std::fs::read(&path).unwrap();
    assert_eq!(bytes, encode_png(&img).unwrap());
    let decoded = image::load_from_memory(&bytes).unwrap().to_rgb8();
    assert_eq!(decoded, img);

    let dir_entries = std::fs::read_dir(path.parent().unwrap()).unwrap().count();
    assert_eq!(dir_entries, 1, "temp files must not be left behind");

    std::fs::remove_dir_all(&root).ok();
}

#[test]
fn last_writer_wins() {
    let root = temp_dir("cache_overwrite");
    let cache = CompositeCache::new(&root);
    cache.store(&key(), BackgroundMode::Video, &image()).unwrap();
    let other = RgbImage::from_pixel(2, 2, image::Rgb([1, 2, 3]));
    let path = cache.store(&key(), BackgroundMode::Video, &other).unwrap();
    let decoded = image::load_from_memory(&std::fs::read(path).unwrap())
        .unwrap()
        .to_rgb8();
    assert_eq!(decoded, other);

    std::fs::remove_dir_all(&root).ok();
}
