//! On-disk composite cache keyed by canonical request.
//!
//! An entry is a PNG file at a deterministic path; its existence is the cache entry. Entries are
//! never evicted.

use std::{
    io::{Cursor, Write},
    path::{Path, PathBuf},
};

use anyhow::Context;
use image::RgbImage;

use crate::{
    assets::layout::COMPOSITE_DIR,
    foundation::error::MosculpResult,
    request::canonical::{BackgroundMode, CanonicalKey},
};

#[derive(Clone, Debug)]
/// Composite cache rooted at the local asset mirror.
pub struct CompositeCache {
    root: PathBuf,
}

impl CompositeCache {
    /// Cache storing composites below `root/<clip>/composite_enum/`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Where the composite of `key` in `mode` lives (whether or not it exists yet).
    pub fn path_for(&self, key: &CanonicalKey, mode: BackgroundMode) -> PathBuf {
        self.root
            .join(key.clip())
            .join(COMPOSITE_DIR)
            .join(key.rel_dir())
            .join(mode.file_name())
    }

    /// Path of the cached composite, if present.
    pub fn lookup(&self, key: &CanonicalKey, mode: BackgroundMode) -> Option<PathBuf> {
        let path = self.path_for(key, mode);
        path.is_file().then_some(path)
    }

    /// Encode `image` as PNG and move it into place atomically; the last writer wins.
    pub fn store(
        &self,
        key: &CanonicalKey,
        mode: BackgroundMode,
        image: &RgbImage,
    ) -> MosculpResult<PathBuf> {
        let path = self.path_for(key, mode);
        let dir = path
            .parent()
            .context("composite path has no parent directory")?;
        std::fs::create_dir_all(dir)
            .with_context(|| format!("create cache dir '{}'", dir.display()))?;

        let png = encode_png(image)?;
        let mut tmp = tempfile::Builder::new()
            .prefix(".comp-")
            .suffix(".png")
            .tempfile_in(dir)
            .with_context(|| format!("create temp file in '{}'", dir.display()))?;
        tmp.write_all(&png)
            .with_context(|| format!("write temp file for '{}'", path.display()))?;
        tmp.as_file()
            .sync_all()
            .with_context(|| format!("sync temp file for '{}'", path.display()))?;
        tmp.persist(&path)
            .map_err(|e| e.error)
            .with_context(|| format!("rename composite into '{}'", path.display()))?;

        tracing::debug!(path = %path.display(), bytes = png.len(), "composite stored");
        Ok(path)
    }
}

/// PNG encoding of a composite.
pub fn encode_png(image: &RgbImage) -> MosculpResult<Vec<u8>> {
    let mut buf = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .context("encode composite as png")?;
    Ok(buf)
}

#[cfg(test)]
#[path = "../../tests/unit/cache/mod.rs"]
mod tests;
