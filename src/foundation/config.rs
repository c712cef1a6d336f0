use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::Context;

use crate::{
    composite::crop::CropRect,
    foundation::error::{MosculpError, MosculpResult},
};

/// Public asset server of the MoSculp demo data.
pub const DEFAULT_WEB_ROOT: &str = "http://mosculp.csail.mit.edu/demo-ui-data";
/// Default local mirror of downloaded assets and composites.
pub const DEFAULT_LOCAL_ROOT: &str = "/tmp/mosculp_gui";
/// Default Gaussian sigma of the matting step, in pixels.
pub const DEFAULT_MATTING_SIGMA: f32 = 1.5;

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
/// Engine settings, loadable from JSON. Every field has a default.
pub struct Settings {
    /// Remote asset root: `http(s)://` URL or a local directory mirroring the server layout.
    pub web_root: String,
    /// Local directory for downloaded assets and cached composites.
    pub local_root: PathBuf,
    /// Network fetch policy.
    pub fetch: FetchSettings,
    /// Gaussian sigma used to soften index-map boundaries.
    pub matting_sigma: f32,
    /// Worker threads for fetching and compositing; `None` uses one per core.
    pub threads: Option<usize>,
    /// Per-clip crop applied to composites before they are cached.
    pub crops: BTreeMap<String, CropRect>,
    /// Display name to clip id catalog.
    pub clips: BTreeMap<String, String>,
}

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
/// Timeout and retry policy of remote fetches.
pub struct FetchSettings {
    /// Global per-request timeout.
    pub timeout_secs: u64,
    /// Extra attempts after a failed transfer. Missing resources are never retried.
    pub retries: u32,
    /// Backoff before retry `n` is `n * retry_backoff_ms`.
    pub retry_backoff_ms: u64,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            retries: 2,
            retry_backoff_ms: 250,
        }
    }
}

impl FetchSettings {
    /// Timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Backoff before the given retry (1-based).
    pub fn backoff(&self, retry: u32) -> Duration {
        Duration::from_millis(self.retry_backoff_ms.saturating_mul(u64::from(retry)))
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            web_root: DEFAULT_WEB_ROOT.to_string(),
            local_root: PathBuf::from(DEFAULT_LOCAL_ROOT),
            fetch: FetchSettings::default(),
            matting_sigma: DEFAULT_MATTING_SIGMA,
            threads: None,
            crops: default_crops(),
            clips: default_clips(),
        }
    }
}

impl Settings {
    /// Parse settings from a JSON document and validate them.
    pub fn from_json_str(s: &str) -> MosculpResult<Self> {
        let settings: Self =
            serde_json::from_str(s).map_err(|e| MosculpError::serde(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Read settings from a JSON file and validate them.
    pub fn from_path(path: impl AsRef<Path>) -> MosculpResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read settings '{}'", path.display()))?;
        Self::from_json_str(&text)
    }

    /// Check value ranges that serde cannot express.
    pub fn validate(&self) -> MosculpResult<()> {
        if self.web_root.trim().is_empty() {
            return Err(MosculpError::config("web_root must be non-empty"));
        }
        if self.local_root.as_os_str().is_empty() {
            return Err(MosculpError::config("local_root must be non-empty"));
        }
        if !self.matting_sigma.is_finite() || self.matting_sigma <= 0.0 {
            return Err(MosculpError::config("matting_sigma must be finite and > 0"));
        }
        if self.threads == Some(0) {
            return Err(MosculpError::config("threads must be >= 1 when set"));
        }
        if self.fetch.timeout_secs == 0 {
            return Err(MosculpError::config("fetch.timeout_secs must be >= 1"));
        }
        for (clip, crop) in &self.crops {
            crop.validate()
                .map_err(|e| MosculpError::config(format!("crop for clip '{clip}': {e}")))?;
        }
        Ok(())
    }

    /// Resolve a display name (e.g. `Ballet-1`) or a raw clip id to a clip id.
    pub fn resolve_clip<'a>(&'a self, name: &'a str) -> &'a str {
        self.clips.get(name).map(String::as_str).unwrap_or(name)
    }

    /// Crop configured for `clip`, if any.
    pub fn crop_for(&self, clip: &str) -> Option<CropRect> {
        self.crops.get(clip).copied()
    }
}

fn default_crops() -> BTreeMap<String, CropRect> {
    BTreeMap::from([
        (
            "ballet11-2".to_string(),
            CropRect {
                top: Some(50),
                bottom: None,
                left: Some(350),
                right: Some(1160),
            },
        ),
        (
            "olympicRunning_cut".to_string(),
            CropRect {
                top: None,
                bottom: None,
                left: Some(300),
                right: Some(1600),
            },
        ),
    ])
}

fn default_clips() -> BTreeMap<String, String> {
    [
        ("Ballet-1", "ballet11-2"),
        ("Ballet-2", "ballet11-1"),
        ("Olympic", "olympicRunning_cut"),
        ("Cartwheel", "as-somersault"),
        ("Federer", "federer_cut"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/config.rs"]
mod tests;
