use super::*;

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
fn valid_request_passes() {
    request().validate().unwrap();
}

#[test]
fn parse_accepts_labels_and_keys() {
    assert_eq!(
        "Left Upper Arm".parse::<BodyPart>().unwrap(),
        BodyPart::LeftUpperArm
    );
    assert_eq!("rightlowerleg".parse::<BodyPart>().unwrap(), BodyPart::RightLowerLeg);
    assert_eq!("Original".parse::<Material>().unwrap(), Material::Original);
    assert_eq!("Orig".parse::<Material>().unwrap(), Material::Original);
    assert_eq!("middle".parse::<Light>().unwrap(), Light::Middle);
    assert!(matches!(
        "Elbow".parse::<BodyPart>(),
        Err(MosculpError::InvalidRequest(_))
    ));
}

#[test]
fn labels_have_spaces() {
    assert_eq!(BodyPart::LeftUpperArm.label(), "Left Upper Arm");
    assert_eq!(BodyPart::Body.label(), "Body");
}

#[test]
fn keys_are_sorted_lexicographically() {
    let mut r = request();
    r.parts = BTreeSet::from([BodyPart::RightLowerArm, BodyPart::Body, BodyPart::LeftLowerLeg]);
    r.lights = BTreeSet::from([Light::Right, Light::Left]);
    assert_eq!(r.parts_key(), "Body-LeftLowerLeg-RightLowerArm");
    assert_eq!(r.lights_key(), "Left-Right");
    assert_eq!(r.specularity_key(), "On");
}

#[test]
fn empty_sets_are_rejected() {
    let mut r = request();
    r.parts.clear();
    assert!(matches!(r.validate(), Err(MosculpError::InvalidRequest(_))));

    let mut r = request();
    r.lights.clear();
    assert!(matches!(r.validate(), Err(MosculpError::InvalidRequest(_))));
}

#[test]
fn out_of_range_numbers_are_rejected() {
    let mut r = request();
    r.transparency = 1.5;
    assert!(r.validate().is_err());

    let mut r = request();
    r.density = -1.0;
    assert!(r.validate().is_err());

    let mut r = request();
    r.density = f64::NAN;
    assert!(r.validate().is_err());
}

#[test]
fn missing_material_for_selected_part_is_rejected() {
    let mut r = request();
    r.material.remove(&BodyPart::LeftUpperArm);
    let err = r.validate().unwrap_err();
    assert!(err.to_string().contains("LeftUpperArm"));
}

#[test]
fn clip_must_be_a_single_path_segment() {
    for clip in ["", "a/b", "..", "."] {
        let mut r = request();
        r.clip = clip.to_string();
        assert!(
            matches!(r.validate(), Err(MosculpError::InvalidRequest(_))),
            "clip {clip:?}"
        );
    }
}

#[test]
fn json_uses_asset_spellings() {
    let mut r = request();
    r.material.insert(BodyPart::Body, Material::Original);
    let json = serde_json::to_string(&r).unwrap();
    assert!(json.contains("\"Orig\""));
    assert!(json.contains("\"LeftUpperArm\""));

    let back: Request = serde_json::from_str(&json).unwrap();
    assert_eq!(back, r);

    let minimal: Request = serde_json::from_str(
        r#"{ "clip": "c", "lights": ["Left"], "parts": ["Body"], "material": { "Body": "Original" } }"#,
    )
    .unwrap();
    assert!(minimal.specularity);
    assert_eq!(minimal.material[&BodyPart::Body], Material::Original);
}

#[test]
fn uniform_material_is_total() {
    let m = uniform_material(Material::Wood);
    assert_eq!(m.len(), BodyPart::ALL.len());
    assert!(m.values().all(|&v| v == Material::Wood));
}
