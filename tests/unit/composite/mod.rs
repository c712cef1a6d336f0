use ndarray::{Array2, Array3};

use super::*;

fn scene() -> (Ingredients, IndexMap) {
    let map = IndexMap::new(
        Array2::zeros((4, 4)),
        Array2::from_shape_fn((4, 4), |(_, x)| u32::from(x >= 2)),
        vec!["000001".to_string(), "sculp_Body".to_string()],
        Array2::from_elem((4, 4), true),
    )
    .unwrap();
    let mut ing = Ingredients::new();
    ing.insert("000001", Array3::from_elem((4, 4, 3), 40.0));
    ing.insert("sculp_Body", Array3::from_elem((4, 4, 3), 240.0));
    ing.insert("bg", Array3::from_elem((6, 8, 3), 0.0));
    (ing, map)
}

#[test]
fn default_sigma_matches_settings() {
    assert_eq!(CompositeOpts::default().sigma, 1.5);
}

#[test]
fn plain_composite_keeps_subject_size() {
    let (ing, map) = scene();
    let out = composite(&ing, &map, 0.0, false, &CompositeOpts { sigma: 0.1 }).unwrap();
    assert_eq!(out.dimensions(), (4, 4));
    assert_eq!(out.get_pixel(3, 0).0, [240, 240, 240]);
}

#[test]
fn artistic_composite_takes_background_size() {
    let (ing, map) = scene();
    let out = composite(&ing, &map, 0.0, true, &CompositeOpts { sigma: 0.1 }).unwrap();
    assert_eq!(out.dimensions(), (8, 6));
    assert_eq!(out.get_pixel(0, 0).0, [0, 0, 0]);
    assert_eq!(out.get_pixel(5, 1).0, [240, 240, 240]);
}

#[test]
fn transparency_out_of_range_is_rejected() {
    let (ing, map) = scene();
    assert!(matches!(
        composite(&ing, &map, 1.5, false, &CompositeOpts::default()),
        Err(MosculpError::InvalidRequest(_))
    ));
}
