use std::collections::{BTreeMap, BTreeSet};

use crate::{
    assets::layout::validate_segment,
    foundation::error::{MosculpError, MosculpResult},
};

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
/// Studio light used when the sculpture was rendered.
pub enum Light {
    /// Key light from the left.
    Left,
    /// Frontal light.
    Middle,
    /// Key light from the right.
    Right,
}

impl Light {
    /// Every light, in key order.
    pub const ALL: [Light; 3] = [Light::Left, Light::Middle, Light::Right];

    /// Spelling used in asset paths and cache keys.
    pub fn as_str(self) -> &'static str {
        match self {
            Light::Left => "Left",
            Light::Middle => "Middle",
            Light::Right => "Right",
        }
    }
}

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
/// Body part that can be turned into a sculpture layer.
pub enum BodyPart {
    /// Torso and head.
    Body,
    /// Left upper arm.
    LeftUpperArm,
    /// Left lower arm.
    LeftLowerArm,
    /// Right upper arm.
    RightUpperArm,
    /// Right lower arm.
    RightLowerArm,
    /// Left upper leg.
    LeftUpperLeg,
    /// Left lower leg.
    LeftLowerLeg,
    /// Right upper leg.
    RightUpperLeg,
    /// Right lower leg.
    RightLowerLeg,
}

impl BodyPart {
    /// Every part, in menu order.
    pub const ALL: [BodyPart; 9] = [
        BodyPart::Body,
        BodyPart::LeftUpperArm,
        BodyPart::LeftLowerArm,
        BodyPart::RightUpperArm,
        BodyPart::RightLowerArm,
        BodyPart::LeftUpperLeg,
        BodyPart::LeftLowerLeg,
        BodyPart::RightUpperLeg,
        BodyPart::RightLowerLeg,
    ];

    /// Spelling used in asset paths, layer names and cache keys (no spaces).
    pub fn as_str(self) -> &'static str {
        match self {
            BodyPart::Body => "Body",
            BodyPart::LeftUpperArm => "LeftUpperArm",
            BodyPart::LeftLowerArm => "LeftLowerArm",
            BodyPart::RightUpperArm => "RightUpperArm",
            BodyPart::RightLowerArm => "RightLowerArm",
            BodyPart::LeftUpperLeg => "LeftUpperLeg",
            BodyPart::LeftLowerLeg => "LeftLowerLeg",
            BodyPart::RightUpperLeg => "RightUpperLeg",
            BodyPart::RightLowerLeg => "RightLowerLeg",
        }
    }

    /// Human-readable label, e.g. `Left Upper Arm`.
    pub fn label(self) -> String {
        let mut out = String::new();
        for (i, ch) in self.as_str().char_indices() {
            if i > 0 && ch.is_ascii_uppercase() {
                out.push(' ');
            }
            out.push(ch);
        }
        out
    }
}

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
/// Sculpture surface material.
pub enum Material {
    /// Leather.
    Leather,
    /// Tarp.
    Tarp,
    /// Wood.
    Wood,
    /// The subject's original appearance.
    #[serde(rename = "Orig", alias = "Original")]
    Original,
}

impl Material {
    /// Every material, in menu order.
    pub const ALL: [Material; 4] = [
        Material::Leather,
        Material::Tarp,
        Material::Wood,
        Material::Original,
    ];

    /// Spelling used in asset paths and cache keys.
    pub fn as_str(self) -> &'static str {
        match self {
            Material::Leather => "Leather",
            Material::Tarp => "Tarp",
            Material::Wood => "Wood",
            Material::Original => "Orig",
        }
    }
}

macro_rules! impl_key_traits {
    ($ty:ty, $what:literal, [$(($alias:literal, $val:expr)),* $(,)?]) => {
        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $ty {
            type Err = MosculpError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let compact: String = s.chars().filter(|c| !c.is_whitespace()).collect();
                for v in <$ty>::ALL {
                    if v.as_str().eq_ignore_ascii_case(&compact) {
                        return Ok(v);
                    }
                }
                $(
                    if compact.eq_ignore_ascii_case($alias) {
                        return Ok($val);
                    }
                )*
                Err(MosculpError::invalid_request(format!(
                    concat!("unknown ", $what, " '{}'"),
                    s
                )))
            }
        }
    };
}

impl_key_traits!(Light, "light", []);
impl_key_traits!(BodyPart, "body part", []);
impl_key_traits!(Material, "material", [("Original", Material::Original)]);

/// Material assignment covering every body part with `material`.
pub fn uniform_material(material: Material) -> BTreeMap<BodyPart, Material> {
    BodyPart::ALL.into_iter().map(|p| (p, material)).collect()
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
/// Everything that determines the pixels of one composite.
pub struct Request {
    /// Clip identifier, e.g. `ballet11-2`.
    pub clip: String,
    /// Keyframe spacing of the stick-figure overlay.
    #[serde(default)]
    pub density: f64,
    /// Lights the sculpture was rendered with. Must be non-empty.
    pub lights: BTreeSet<Light>,
    /// Sculpture translucency in `[0, 1]`.
    #[serde(default)]
    pub transparency: f64,
    /// Whether sculpture renders include specular highlights.
    #[serde(default = "default_specularity")]
    pub specularity: bool,
    /// Parts rendered as sculpture. Must be non-empty.
    pub parts: BTreeSet<BodyPart>,
    /// Material per body part; must cover every selected part.
    pub material: BTreeMap<BodyPart, Material>,
    /// Replace the video background by the synthetic shadow background.
    #[serde(default)]
    pub artistic_background: bool,
}

fn default_specularity() -> bool {
    true
}

impl Request {
    /// Reject requests that cannot produce a composite, before any IO happens.
    pub fn validate(&self) -> MosculpResult<()> {
        validate_segment(&self.clip)
            .map_err(|e| MosculpError::invalid_request(format!("clip: {e}")))?;
        if self.parts.is_empty() {
            return Err(MosculpError::invalid_request(
                "at least one body part must be selected",
            ));
        }
        if self.lights.is_empty() {
            return Err(MosculpError::invalid_request(
                "at least one light must be selected",
            ));
        }
        if !self.density.is_finite() || self.density < 0.0 {
            return Err(MosculpError::invalid_request(
                "density must be finite and >= 0",
            ));
        }
        if !self.transparency.is_finite() || !(0.0..=1.0).contains(&self.transparency) {
            return Err(MosculpError::invalid_request(
                "transparency must be within [0, 1]",
            ));
        }
        for part in &self.parts {
            self.material_for(*part)?;
        }
        Ok(())
    }

    /// Material assigned to `part`.
    pub fn material_for(&self, part: BodyPart) -> MosculpResult<Material> {
        self.material.get(&part).copied().ok_or_else(|| {
            MosculpError::invalid_request(format!("no material assigned to part '{part}'"))
        })
    }

    /// Sorted selected part keys joined by `-`.
    pub fn parts_key(&self) -> String {
        sorted_join(self.parts.iter().map(|p| p.as_str()))
    }

    /// Sorted light keys joined by `-`.
    pub fn lights_key(&self) -> String {
        sorted_join(self.lights.iter().map(|l| l.as_str()))
    }

    /// `On` / `Off` spelling of the specularity flag.
    pub fn specularity_key(&self) -> &'static str {
        if self.specularity { "On" } else { "Off" }
    }
}

pub(crate) fn sorted_join<'a>(items: impl Iterator<Item = &'a str>) -> String {
    let mut items: Vec<&str> = items.collect();
    items.sort_unstable();
    items.join("-")
}

#[cfg(test)]
#[path = "../../tests/unit/request/model.rs"]
mod tests;
