//! Per-pixel layer assignment maps and their `.npz` codec.

use std::{
    collections::HashSet,
    io::{Cursor, Read, Seek, Write},
};

use anyhow::Context;
use ndarray::Array2;
use ndarray_npy::{NpzReader, ReadableElement, WriteNpyExt};

use crate::{
    assets::{fetch::AssetFetcher, layout::index_map_path, npy},
    foundation::core::Dims,
    foundation::error::{MosculpError, MosculpResult},
    request::model::{BodyPart, Request},
};

/// Prefix of sculpture-part layer names (`sculp_<Part>`).
pub const SCULPTURE_PREFIX: &str = "sculp_";
/// Name of the synthetic background layer.
pub const BACKGROUND_LAYER: &str = "bg";
/// Prefix of shadow-background samples (`bg_<Part>`) before they are merged.
pub const SHADOW_PREFIX: &str = "bg_";

const PREV_ARRAY: &str = "prev_idx_map";
const CURR_ARRAY: &str = "curr_idx_map";
const NAMES_ARRAY: &str = "idx_names";
const FOREGROUND_ARRAY: &str = "is_fg";

#[derive(Clone, Debug, PartialEq, Eq)]
/// What a layer name refers to.
pub enum LayerKind {
    /// Render of one sculpture part.
    Sculpture(BodyPart),
    /// A video frame, named by its frame id.
    Frame(String),
    /// A synthetic background layer (`bg`, `bg_*`).
    Background,
}

impl LayerKind {
    /// Classify a layer name.
    pub fn classify(name: &str) -> MosculpResult<Self> {
        if name.is_empty() {
            return Err(MosculpError::invalid_index_map("empty layer name"));
        }
        if let Some(part) = name.strip_prefix(SCULPTURE_PREFIX) {
            let part = part.parse::<BodyPart>().map_err(|_| {
                MosculpError::invalid_index_map(format!(
                    "layer '{name}' names an unknown body part"
                ))
            })?;
            return Ok(Self::Sculpture(part));
        }
        if name.starts_with(BACKGROUND_LAYER) {
            return Ok(Self::Background);
        }
        Ok(Self::Frame(name.to_string()))
    }

    /// Whether this is a sculpture layer.
    pub fn is_sculpture(&self) -> bool {
        matches!(self, Self::Sculpture(_))
    }
}

#[derive(Clone, Debug, PartialEq)]
/// Validated, immutable assignment of every pixel to a current and a previous layer.
///
/// `curr` is the layer visible at the pixel, `prev` the layer showing through translucent
/// sculpture, and `foreground` marks pixels covered by the subject.
pub struct IndexMap {
    prev: Array2<u32>,
    curr: Array2<u32>,
    names: Vec<String>,
    kinds: Vec<LayerKind>,
    foreground: Array2<bool>,
}

impl IndexMap {
    /// Build an index map, checking shapes, names and index ranges.
    pub fn new(
        prev: Array2<u32>,
        curr: Array2<u32>,
        names: Vec<String>,
        foreground: Array2<bool>,
    ) -> MosculpResult<Self> {
        let dims = Dims::of_plane(&curr);
        if dims.area() == 0 {
            return Err(MosculpError::invalid_index_map("index map is empty"));
        }
        if Dims::of_plane(&prev) != dims || Dims::of_plane(&foreground) != dims {
            return Err(MosculpError::invalid_index_map(format!(
                "shape mismatch: curr {dims}, prev {}, foreground {}",
                Dims::of_plane(&prev),
                Dims::of_plane(&foreground)
            )));
        }
        if names.is_empty() {
            return Err(MosculpError::invalid_index_map("no layer names"));
        }

        let mut seen = HashSet::with_capacity(names.len());
        let mut kinds = Vec::with_capacity(names.len());
        for name in &names {
            if !seen.insert(name.as_str()) {
                return Err(MosculpError::invalid_index_map(format!(
                    "duplicate layer name '{name}'"
                )));
            }
            kinds.push(LayerKind::classify(name)?);
        }

        let n = names.len() as u32;
        for (label, map) in [(CURR_ARRAY, &curr), (PREV_ARRAY, &prev)] {
            if let Some(bad) = map.iter().find(|&&v| v >= n) {
                return Err(MosculpError::invalid_index_map(format!(
                    "{label} contains index {bad}, but only {n} layers are named"
                )));
            }
        }

        Ok(Self {
            prev,
            curr,
            names,
            kinds,
            foreground,
        })
    }

    /// Build from signed indices (as stored on disk), rejecting negative or oversized values.
    pub fn from_signed(
        prev: Array2<i64>,
        curr: Array2<i64>,
        names: Vec<String>,
        foreground: Array2<bool>,
    ) -> MosculpResult<Self> {
        let n = names.len() as i64;
        let narrow = |label: &str, map: Array2<i64>| -> MosculpResult<Array2<u32>> {
            if let Some(bad) = map.iter().find(|&&v| v < 0 || v >= n) {
                return Err(MosculpError::invalid_index_map(format!(
                    "{label} contains index {bad}, outside [0, {n})"
                )));
            }
            Ok(map.mapv(|v| v as u32))
        };
        let prev = narrow(PREV_ARRAY, prev)?;
        let curr = narrow(CURR_ARRAY, curr)?;
        Self::new(prev, curr, names, foreground)
    }

    /// Pixel dimensions.
    pub fn dims(&self) -> Dims {
        Dims::of_plane(&self.curr)
    }

    /// Layer visible at each pixel.
    pub fn curr(&self) -> &Array2<u32> {
        &self.curr
    }

    /// Layer behind translucent sculpture at each pixel.
    pub fn prev(&self) -> &Array2<u32> {
        &self.prev
    }

    /// Subject mask.
    pub fn foreground(&self) -> &Array2<bool> {
        &self.foreground
    }

    /// Layer names, indexed by the values of `curr`/`prev`.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Kind of each layer, parallel to [`IndexMap::names`].
    pub fn kinds(&self) -> &[LayerKind] {
        &self.kinds
    }

    /// Number of layers.
    pub fn layer_count(&self) -> usize {
        self.names.len()
    }

    /// Index of the layer called `name`.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    /// A copy of this map with one more layer name; returns the new layer's index.
    pub fn extend_layers(&self, name: &str) -> MosculpResult<(IndexMap, u32)> {
        let mut names = self.names.clone();
        names.push(name.to_string());
        let index = (names.len() - 1) as u32;
        let map = Self::new(
            self.prev.clone(),
            self.curr.clone(),
            names,
            self.foreground.clone(),
        )?;
        Ok((map, index))
    }

    /// A map with the same layer names but new pixel data.
    pub fn with_pixels(
        &self,
        prev: Array2<u32>,
        curr: Array2<u32>,
        foreground: Array2<bool>,
    ) -> MosculpResult<IndexMap> {
        Self::new(prev, curr, self.names.clone(), foreground)
    }

    /// Decode an `.npz` archive with `prev_idx_map`, `curr_idx_map`, `idx_names` and `is_fg`.
    ///
    /// Layer names starting with `bg` are reserved for synthetic layers and rejected here.
    pub fn from_npz_bytes(bytes: &[u8]) -> MosculpResult<Self> {
        let mut npz = NpzReader::new(Cursor::new(bytes))
            .map_err(|e| MosculpError::invalid_index_map(format!("not an npz archive: {e}")))?;
        let prev = read_index_plane(&mut npz, PREV_ARRAY)?;
        let curr = read_index_plane(&mut npz, CURR_ARRAY)?;
        let foreground = read_mask(&mut npz, FOREGROUND_ARRAY)?;
        let names = read_names(bytes)?;

        if let Some(reserved) = names.iter().find(|n| n.starts_with(BACKGROUND_LAYER)) {
            return Err(MosculpError::invalid_index_map(format!(
                "layer name '{reserved}' is reserved for synthetic backgrounds"
            )));
        }
        Self::from_signed(prev, curr, names, foreground)
    }

    /// Encode as an `.npz` archive readable by [`IndexMap::from_npz_bytes`] and by NumPy.
    pub fn to_npz_bytes(&self) -> MosculpResult<Vec<u8>> {
        let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let mut entry = |name: &str, data: &[u8]| -> anyhow::Result<()> {
            let options = zip::write::SimpleFileOptions::default()
                .compression_method(zip::CompressionMethod::Deflated);
            zip.start_file(format!("{name}.npy"), options)
                .with_context(|| format!("start npz entry '{name}'"))?;
            zip.write_all(data)
                .with_context(|| format!("write npz entry '{name}'"))?;
            Ok(())
        };

        entry(PREV_ARRAY, &npy_bytes(&self.prev.mapv(i64::from))?)?;
        entry(CURR_ARRAY, &npy_bytes(&self.curr.mapv(i64::from))?)?;
        entry(NAMES_ARRAY, &npy::write_unicode_array(&self.names))?;
        entry(FOREGROUND_ARRAY, &npy_bytes(&self.foreground)?)?;

        let cursor = zip.finish().context("finish npz archive")?;
        Ok(cursor.into_inner())
    }
}

/// Fetch and decode the index map of `request`'s clip, density and part selection.
#[tracing::instrument(skip_all, fields(clip = %request.clip))]
pub fn load_index_map(request: &Request, fetcher: &AssetFetcher) -> MosculpResult<IndexMap> {
    let rel = index_map_path(request);
    let bytes = fetcher.read(&rel)?;
    let map = IndexMap::from_npz_bytes(&bytes)
        .map_err(|e| MosculpError::invalid_index_map(format!("{rel}: {}", strip_prefix(&e))))?;
    tracing::debug!(dims = %map.dims(), layers = map.layer_count(), "index map loaded");
    Ok(map)
}

fn strip_prefix(e: &MosculpError) -> String {
    match e {
        MosculpError::InvalidIndexMap(msg) => msg.clone(),
        other => other.to_string(),
    }
}

fn npy_bytes<A: WriteNpyExt>(array: &A) -> anyhow::Result<Vec<u8>> {
    let mut buf = Vec::new();
    array.write_npy(&mut buf).context("encode npy array")?;
    Ok(buf)
}

fn try_plane<R: Read + Seek, T: ReadableElement>(
    npz: &mut NpzReader<R>,
    name: &str,
) -> Option<Array2<T>> {
    npz.by_name(name).ok()
}

fn read_index_plane<R: Read + Seek>(
    npz: &mut NpzReader<R>,
    name: &str,
) -> MosculpResult<Array2<i64>> {
    if let Some(a) = try_plane::<R, i64>(npz, name) {
        return Ok(a);
    }
    if let Some(a) = try_plane::<R, i32>(npz, name) {
        return Ok(a.mapv(i64::from));
    }
    if let Some(a) = try_plane::<R, u32>(npz, name) {
        return Ok(a.mapv(i64::from));
    }
    if let Some(a) = try_plane::<R, u16>(npz, name) {
        return Ok(a.mapv(i64::from));
    }
    if let Some(a) = try_plane::<R, u8>(npz, name) {
        return Ok(a.mapv(i64::from));
    }
    if let Some(a) = try_plane::<R, f64>(npz, name) {
        if a.iter().any(|v| !v.is_finite() || v.fract() != 0.0) {
            return Err(MosculpError::invalid_index_map(format!(
                "{name} holds non-integral values"
            )));
        }
        return Ok(a.mapv(|v| v as i64));
    }
    Err(MosculpError::invalid_index_map(format!(
        "{name} is missing or not a 2D integer array"
    )))
}

fn read_mask<R: Read + Seek>(npz: &mut NpzReader<R>, name: &str) -> MosculpResult<Array2<bool>> {
    if let Some(a) = try_plane::<R, bool>(npz, name) {
        return Ok(a);
    }
    if let Some(a) = try_plane::<R, u8>(npz, name) {
        return Ok(a.mapv(|v| v != 0));
    }
    Err(MosculpError::invalid_index_map(format!(
        "{name} is missing or not a 2D boolean array"
    )))
}

fn read_names(bytes: &[u8]) -> MosculpResult<Vec<String>> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| MosculpError::invalid_index_map(format!("not an npz archive: {e}")))?;
    let entry_name = [format!("{NAMES_ARRAY}.npy"), NAMES_ARRAY.to_string()]
        .into_iter()
        .find(|n| archive.index_for_name(n).is_some())
        .ok_or_else(|| MosculpError::invalid_index_map(format!("{NAMES_ARRAY} is missing")))?;

    let mut data = Vec::new();
    archive
        .by_name(&entry_name)
        .map_err(|e| MosculpError::invalid_index_map(format!("{NAMES_ARRAY}: {e}")))?
        .read_to_end(&mut data)
        .map_err(|e| MosculpError::invalid_index_map(format!("{NAMES_ARRAY}: {e}")))?;
    npy::read_string_array(&data)
}

#[cfg(test)]
#[path = "../../tests/unit/assets/index_map.rs"]
mod tests;
