use std::collections::{BTreeMap, BTreeSet};

use super::*;
use crate::request::model::{BodyPart, Light, Material, uniform_material};

fn request() -> Request {
    Request {
        clip: "ballet11-2".to_string(),
        density: 0.0,
        lights: BTreeSet::from([Light::Left, Light::Middle, Light::Right]),
        transparency: 0.0,
        specularity: true,
        parts: BTreeSet::from([BodyPart::Body, BodyPart::LeftUpperArm]),
        material: BTreeMap::from([
            (BodyPart::Body, Material::Leather),
            (BodyPart::LeftUpperArm, Material::Tarp),
        ]),
        artistic_background: false,
    }
}

#[test]
fn key_string_has_fixed_field_order() {
    assert_eq!(
        canonicalize(&request()).as_string(),
        "clip.ballet11-2_density.0.00_lights.Left-Middle-Right_transp.0.00_spec.On_part.Body-LeftUpperArm_mat.Leather-Tarp"
    );
}

#[test]
fn rel_dir_nests_one_level_per_field() {
    let mut r = request();
    r.clip = "olympicRunning_cut".to_string();
    let dir = canonicalize(&r).rel_dir();
    let components: Vec<_> = dir
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    assert_eq!(components.len(), 7);
    assert_eq!(components[0], "clip.olympicRunning_cut");
    assert_eq!(components[6], "mat.Leather-Tarp");
}

#[test]
fn key_is_order_invariant() {
    let a = request();
    let mut b = request();
    b.lights = [Light::Right, Light::Left, Light::Middle].into_iter().collect();
    b.parts = [BodyPart::LeftUpperArm, BodyPart::Body].into_iter().collect();
    assert_eq!(canonicalize(&a), canonicalize(&b));
}

#[test]
fn parts_sort_by_name_not_menu_order() {
    let mut r = request();
    r.parts = BTreeSet::from([BodyPart::RightUpperArm, BodyPart::LeftLowerLeg]);
    r.material = uniform_material(Material::Leather);
    r.material.insert(BodyPart::RightUpperArm, Material::Wood);
    let key = canonicalize(&r).as_string();
    assert!(key.contains("part.LeftLowerLeg-RightUpperArm_mat.Leather-Wood"));
}

#[test]
fn two_decimal_precision() {
    let mut a = request();
    let mut b = request();
    a.transparency = 0.10;
    b.transparency = 0.20;
    assert_ne!(canonicalize(&a), canonicalize(&b));

    a.transparency = 0.101;
    b.transparency = 0.104;
    assert_eq!(canonicalize(&a), canonicalize(&b));
}

#[test]
fn every_relevant_field_changes_the_key() {
    let base = canonicalize(&request());

    let mut r = request();
    r.clip = "ballet11-1".to_string();
    assert_ne!(canonicalize(&r), base);

    let mut r = request();
    r.density = 0.5;
    assert_ne!(canonicalize(&r), base);

    let mut r = request();
    r.lights.remove(&Light::Middle);
    assert_ne!(canonicalize(&r), base);

    let mut r = request();
    r.specularity = false;
    assert_ne!(canonicalize(&r), base);

    let mut r = request();
    r.parts.remove(&BodyPart::LeftUpperArm);
    assert_ne!(canonicalize(&r), base);

    let mut r = request();
    r.material.insert(BodyPart::Body, Material::Wood);
    assert_ne!(canonicalize(&r), base);
}

#[test]
fn unselected_material_does_not_change_the_key() {
    let base = canonicalize(&request());
    let mut r = request();
    r.material.insert(BodyPart::RightLowerLeg, Material::Wood);
    assert_eq!(canonicalize(&r), base);
}

#[test]
fn background_mode_selects_file_name_only() {
    let mut r = request();
    let plain = canonicalize(&r);
    assert_eq!(BackgroundMode::of(&r).file_name(), "comp.png");
    r.artistic_background = true;
    assert_eq!(canonicalize(&r), plain);
    assert_eq!(BackgroundMode::of(&r).file_name(), "comp_2x.png");
}
