use std::{collections::BTreeSet, io::Cursor, sync::Arc};

use ndarray::{Array3, array};

use super::*;
use crate::{
    assets::fetch::DirTransport,
    foundation::config::FetchSettings,
    request::model::{BodyPart, Light, Material},
};

fn request() -> Request {
    Request {
        clip: "clipA".to_string(),
        density: 0.0,
        lights: BTreeSet::from([Light::Left]),
        transparency: 0.0,
        specularity: true,
        parts: BTreeSet::from([BodyPart::Body]),
        material: [(BodyPart::Body, Material::Wood)].into_iter().collect(),
        artistic_background: false,
    }
}

fn map() -> IndexMap {
    IndexMap::new(
        array![[0, 0]],
        array![[1, 0]],
        vec!["000004".to_string(), "sculp_Body".to_string()],
        array![[true, false]],
    )
    .unwrap()
}

fn temp_dir(name: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!(
        "mosculp_{name}_{}_{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos()
    ))
}

fn write_png(path: &std::path::Path, value: u8) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    let img = image::RgbImage::from_pixel(2, 1, image::Rgb([value, value, value]));
    let mut buf = Vec::new();
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .unwrap();
    std::fs::write(path, buf).unwrap();
}

#[test]
fn paths_cover_renders_shadows_and_frames() {
    let paths = ingredient_paths(&request(), &map()).unwrap();
    let dir = "clipA/render_enum_for-ui-resp/part.Body_mat.Wood_spec.On_transp.0.00/lights.Left_density.0.00.blend";
    assert_eq!(
        paths,
        vec![
            (
                "000004".to_string(),
                "clipA/frames_for-ui-resp/000004.jpg".to_string()
            ),
            ("sculp_Body".to_string(), format!("{dir}/sculp_rgb.jpg")),
            ("bg_Body".to_string(), format!("{dir}/shadowbg.jpg")),
        ]
    );
}

#[test]
fn missing_material_is_invalid_request() {
    let mut r = request();
    r.material.clear();
    assert!(matches!(
        ingredient_paths(&r, &map()),
        Err(MosculpError::InvalidRequest(_))
    ));
}

#[test]
fn load_fetches_and_decodes_every_layer() {
    let remote = temp_dir("ingredients_remote");
    let local = temp_dir("ingredients_local");
    for (i, (_, rel)) in ingredient_paths(&request(), &map())
        .unwrap()
        .into_iter()
        .enumerate()
    {
        write_png(&remote.join(rel), 10 * (i as u8 + 1));
    }
    let fetcher = AssetFetcher::new(
        Arc::new(DirTransport::new(&remote)),
        &local,
        FetchSettings::default(),
    );

    let ingredients = load_ingredients(&request(), &map(), &fetcher).unwrap();
    assert_eq!(
        ingredients.names().collect::<Vec<_>>(),
        vec!["000004", "bg_Body", "sculp_Body"]
    );
    assert_eq!(ingredients.get("000004").unwrap()[[0, 1, 2]], 10.0);
    assert_eq!(ingredients.get("sculp_Body").unwrap()[[0, 0, 0]], 20.0);
    assert_eq!(fetcher.downloads(), 3);

    std::fs::remove_dir_all(&remote).ok();
    std::fs::remove_dir_all(&local).ok();
}

#[test]
fn merge_averages_shadow_samples() {
    let mut ingredients = Ingredients::new();
    ingredients.insert("bg_Body", Array3::from_elem((1, 2, 3), 10.0));
    ingredients.insert("bg_LeftUpperArm", Array3::from_elem((1, 2, 3), 30.0));
    ingredients.insert("000001", Array3::from_elem((1, 2, 3), 5.0));

    let merged = merge_background_samples(ingredients).unwrap();
    assert_eq!(merged.names().collect::<Vec<_>>(), vec!["000001", "bg"]);
    assert!(merged.get("bg").unwrap().iter().all(|&v| v == 20.0));
    assert!(merged.get("000001").unwrap().iter().all(|&v| v == 5.0));
}

#[test]
fn merge_without_samples_is_identity() {
    let mut ingredients = Ingredients::new();
    ingredients.insert("000001", Array3::from_elem((1, 1, 3), 1.0));
    let merged = merge_background_samples(ingredients.clone()).unwrap();
    assert_eq!(merged, ingredients);
}

#[test]
fn merge_rejects_mismatched_samples() {
    let mut ingredients = Ingredients::new();
    ingredients.insert("bg_Body", Array3::zeros((1, 2, 3)));
    ingredients.insert("bg_LeftUpperArm", Array3::zeros((2, 2, 3)));
    assert!(matches!(
        merge_background_samples(ingredients),
        Err(MosculpError::InvalidIndexMap(_))
    ));
}
