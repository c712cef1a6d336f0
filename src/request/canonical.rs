use std::path::PathBuf;

use crate::{
    foundation::core::fixed2,
    request::model::Request,
};

/// Separator between `field.value` segments in the flat key string.
pub const SEGMENT_SEPARATOR: char = '_';

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
/// How the composite treats the video background; selects the cached file name.
pub enum BackgroundMode {
    /// Sculpture composited over the original video.
    Video,
    /// Video background replaced by the synthetic shadow background.
    Artistic,
}

impl BackgroundMode {
    /// Mode requested by `request`.
    pub fn of(request: &Request) -> Self {
        if request.artistic_background {
            Self::Artistic
        } else {
            Self::Video
        }
    }

    /// Output file name inside a cache directory.
    pub fn file_name(self) -> &'static str {
        match self {
            Self::Video => "comp.png",
            Self::Artistic => "comp_2x.png",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
/// Deterministic, order-invariant encoding of every parameter that affects a composite.
///
/// The background mode is not part of the key: it only selects the file name inside the key's
/// directory (see [`BackgroundMode::file_name`]).
pub struct CanonicalKey {
    clip: String,
    segments: Vec<String>,
}

impl CanonicalKey {
    /// Clip the key belongs to.
    pub fn clip(&self) -> &str {
        &self.clip
    }

    /// `field.value` segments in fixed field order.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Flat key string, segments joined by [`SEGMENT_SEPARATOR`].
    pub fn as_string(&self) -> String {
        let mut out = String::new();
        for (i, s) in self.segments.iter().enumerate() {
            if i > 0 {
                out.push(SEGMENT_SEPARATOR);
            }
            out.push_str(s);
        }
        out
    }

    /// Nested relative directory, one level per segment.
    pub fn rel_dir(&self) -> PathBuf {
        self.segments.iter().collect()
    }
}

impl std::fmt::Display for CanonicalKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.as_string())
    }
}

/// Canonicalize `request` into its cache key.
///
/// Set-valued fields are sorted, numbers use two decimals, and the material mapping contributes
/// only the selected parts, in sorted part order. Requests differing only in iteration order or
/// beyond the second decimal map to the same key.
pub fn canonicalize(request: &Request) -> CanonicalKey {
    let mut parts: Vec<_> = request.parts.iter().copied().collect();
    parts.sort_unstable_by_key(|p| p.as_str());
    let materials = parts
        .iter()
        .map(|p| {
            request
                .material
                .get(p)
                .map(|m| m.as_str())
                .unwrap_or("?")
        })
        .collect::<Vec<_>>()
        .join("-");

    let segments = vec![
        format!("clip.{}", request.clip),
        format!("density.{}", fixed2(request.density)),
        format!("lights.{}", request.lights_key()),
        format!("transp.{}", fixed2(request.transparency)),
        format!("spec.{}", request.specularity_key()),
        format!("part.{}", request.parts_key()),
        format!("mat.{materials}"),
    ];

    CanonicalKey {
        clip: request.clip.clone(),
        segments,
    }
}

#[cfg(test)]
#[path = "../../tests/unit/request/canonical.rs"]
mod tests;
