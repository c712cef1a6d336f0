use std::collections::{BTreeMap, BTreeSet};

use crate::{
    assets::layout::MeshMode,
    foundation::core::round2,
    request::model::{BodyPart, Light, Material, Request, uniform_material},
};

/// Clip shown when a session starts.
pub const DEFAULT_CLIP: &str = "ballet11-2";
/// Largest translucency the transparency slider allows.
pub const MAX_TRANSPARENCY: f64 = 0.8;

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
/// Everything the viewer shows, as one immutable value.
pub struct ViewState {
    /// Clip id.
    pub clip: String,
    /// Mesh shown by the 3D view.
    pub mode_3d: MeshMode,
    /// Selected parts, in selection order. Never empty.
    pub parts: Vec<BodyPart>,
    /// Material of every part, selected or not.
    pub material: BTreeMap<BodyPart, Material>,
    /// Part whose material [`Action::SetMaterial`] changes.
    pub focused_part: BodyPart,
    /// Active lights. Never empty.
    pub lights: BTreeSet<Light>,
    /// Specular highlights on the sculpture.
    pub specularity: bool,
    /// Replace the video background with the synthetic one.
    pub artistic_background: bool,
    /// Stick-figure keyframe density.
    pub density: f64,
    /// Sculpture translucency.
    pub transparency: f64,
}

impl Default for ViewState {
    fn default() -> Self {
        Self {
            clip: DEFAULT_CLIP.to_string(),
            mode_3d: MeshMode::Sculpture,
            parts: vec![BodyPart::RightLowerArm],
            material: uniform_material(Material::Leather),
            focused_part: BodyPart::RightLowerArm,
            lights: Light::ALL.into_iter().collect(),
            specularity: true,
            artistic_background: false,
            density: 0.0,
            transparency: 0.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
/// User input that changes the view.
pub enum Action {
    /// Switch to another clip.
    SelectClip(String),
    /// Switch the 3D view's mesh.
    SetMeshMode(MeshMode),
    /// Select or deselect a part, focusing it.
    TogglePart(BodyPart),
    /// Set the focused part's material.
    SetMaterial(Material),
    /// Turn a light on or off.
    ToggleLight(Light),
    /// Turn specular highlights on or off.
    SetSpecularity(bool),
    /// Turn the synthetic background on or off.
    SetArtisticBackground(bool),
    /// Move the density slider.
    SetDensity(f64),
    /// Move the transparency slider.
    SetTransparency(f64),
}

impl ViewState {
    /// State after `action`. Refused actions return an unchanged copy.
    pub fn apply(&self, action: Action) -> ViewState {
        apply(self, action)
    }

    /// Composite request for this state.
    pub fn request(&self) -> Request {
        Request {
            clip: self.clip.clone(),
            density: self.density,
            lights: self.lights.clone(),
            transparency: self.transparency,
            specularity: self.specularity,
            parts: self.parts.iter().copied().collect(),
            material: self.material.clone(),
            artistic_background: self.artistic_background,
        }
    }
}

/// Pure transition function of the viewer.
///
/// The last selected part or light cannot be deselected. Slider values are clamped and rounded
/// to two decimals; non-finite values are ignored.
pub fn apply(state: &ViewState, action: Action) -> ViewState {
    let mut next = state.clone();
    match action {
        Action::SelectClip(clip) => next.clip = clip,
        Action::SetMeshMode(mode) => next.mode_3d = mode,
        Action::TogglePart(part) => {
            if let Some(pos) = next.parts.iter().position(|p| *p == part) {
                if next.parts.len() == 1 {
                    return next;
                }
                next.parts.remove(pos);
            } else {
                next.parts.push(part);
            }
            next.focused_part = part;
        }
        Action::SetMaterial(material) => {
            next.material.insert(next.focused_part, material);
        }
        Action::ToggleLight(light) => {
            if next.lights.contains(&light) {
                if next.lights.len() > 1 {
                    next.lights.remove(&light);
                }
            } else {
                next.lights.insert(light);
            }
        }
        Action::SetSpecularity(on) => next.specularity = on,
        Action::SetArtisticBackground(on) => next.artistic_background = on,
        Action::SetDensity(v) if v.is_finite() => next.density = round2(v.max(0.0)),
        Action::SetTransparency(v) if v.is_finite() => {
            next.transparency = round2(v.clamp(0.0, MAX_TRANSPARENCY));
        }
        Action::SetDensity(_) | Action::SetTransparency(_) => {}
    }
    next
}

#[cfg(test)]
#[path = "../../tests/unit/session/state.rs"]
mod tests;
