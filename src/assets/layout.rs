//! Relative paths of every asset on the remote store.
//!
//! The same relative path is used below the remote root and below the local mirror, so a
//! downloaded file lands at `local_root/<rel>`.

use crate::{
    foundation::core::fixed2,
    foundation::error::{MosculpError, MosculpResult},
    request::model::{BodyPart, Material, Request},
};

const INDEX_MAP_DIR: &str = "composite_enum_idxmap_for-ui-resp";
const RENDER_DIR: &str = "render_enum_for-ui-resp";
const FRAMES_DIR: &str = "frames_for-ui-resp";
const MESH_DIR: &str = "obj";
/// Directory below each clip holding cached composites.
pub const COMPOSITE_DIR: &str = "composite_enum";

/// File name of a part's sculpture render inside its render directory.
pub const SCULPTURE_RGB: &str = "sculp_rgb.jpg";
/// File name of a part's shadow background sample inside its render directory.
pub const SHADOW_BACKGROUND: &str = "shadowbg.jpg";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
/// Which mesh the 3D view shows.
pub enum MeshMode {
    /// The motion sculpture.
    Sculpture,
    /// Every body mesh of the clip at once.
    AllMesh,
}

impl MeshMode {
    /// Spelling used in asset paths.
    pub fn as_str(self) -> &'static str {
        match self {
            MeshMode::Sculpture => "sculpture",
            MeshMode::AllMesh => "all-mesh",
        }
    }
}

/// Index map of the request's clip, density and part selection.
pub fn index_map_path(request: &Request) -> String {
    format!(
        "{}/{INDEX_MAP_DIR}/density.{}_part.{}.npz",
        request.clip,
        fixed2(request.density),
        request.parts_key()
    )
}

/// Directory holding the render of one part with the request's lights and density.
pub fn part_render_dir(request: &Request, part: BodyPart, material: Material) -> String {
    format!(
        "{}/{RENDER_DIR}/part.{}_mat.{}_spec.{}_transp.0.00/lights.{}_density.{}.blend",
        request.clip,
        part.as_str(),
        material.as_str(),
        request.specularity_key(),
        request.lights_key(),
        fixed2(request.density)
    )
}

/// One video frame of `clip`.
pub fn frame_path(clip: &str, frame_id: &str) -> String {
    format!("{clip}/{FRAMES_DIR}/{frame_id}.jpg")
}

/// Mesh file shown by the 3D view.
pub fn mesh_path(clip: &str, mode: MeshMode) -> String {
    format!("{clip}/{MESH_DIR}/{}.obj", mode.as_str())
}

/// Validate a single path segment (clip id, frame id): non-empty, no separators, not `.`/`..`.
pub fn validate_segment(s: &str) -> MosculpResult<()> {
    if s.is_empty() {
        return Err(MosculpError::invalid_request("must be non-empty"));
    }
    if s.contains('/') || s.contains('\\') {
        return Err(MosculpError::invalid_request(format!(
            "'{s}' must not contain path separators"
        )));
    }
    if s == "." || s == ".." {
        return Err(MosculpError::invalid_request(format!(
            "'{s}' is not a valid name"
        )));
    }
    Ok(())
}

/// Normalize and validate a store-relative asset path.
///
/// The normalized result uses `/` separators, removes `.` segments, and rejects absolute paths or
/// parent traversals (`..`).
pub fn normalize_rel_path(source: &str) -> MosculpResult<String> {
    let s = source.replace('\\', "/");
    if s.starts_with('/') {
        return Err(MosculpError::invalid_request("asset paths must be relative"));
    }
    if s.is_empty() {
        return Err(MosculpError::invalid_request("asset path must be non-empty"));
    }

    let mut out = Vec::<&str>::new();
    for part in s.split('/') {
        if part.is_empty() || part == "." {
            continue;
        }
        if part == ".." {
            return Err(MosculpError::invalid_request(
                "asset paths must not contain '..'",
            ));
        }
        out.push(part);
    }

    if out.is_empty() {
        return Err(MosculpError::invalid_request(
            "asset path must contain a file name",
        ));
    }

    Ok(out.join("/"))
}

#[cfg(test)]
#[path = "../../tests/unit/assets/layout.rs"]
mod tests;
