use std::collections::BTreeMap;

use rayon::prelude::*;

use crate::{
    assets::{
        decode::decode_layer_image,
        fetch::AssetFetcher,
        index_map::{BACKGROUND_LAYER, IndexMap, LayerKind, SHADOW_PREFIX},
        layout::{SCULPTURE_RGB, SHADOW_BACKGROUND, frame_path, part_render_dir},
    },
    foundation::core::{Dims, LayerImage},
    foundation::error::{MosculpError, MosculpResult},
    request::model::Request,
};

#[derive(Clone, Debug, Default, PartialEq)]
/// Decoded layer images keyed by layer name.
pub struct Ingredients {
    layers: BTreeMap<String, LayerImage>,
}

impl Ingredients {
    /// Empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the image of `name`.
    pub fn insert(&mut self, name: impl Into<String>, image: LayerImage) {
        self.layers.insert(name.into(), image);
    }

    /// Image of `name`.
    pub fn get(&self, name: &str) -> Option<&LayerImage> {
        self.layers.get(name)
    }

    /// Whether `name` has an image.
    pub fn contains(&self, name: &str) -> bool {
        self.layers.contains_key(name)
    }

    /// Number of images.
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Layer names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.layers.keys().map(String::as_str)
    }

    /// Image of `name`, or `InvalidIndexMap` when the index map names a layer without one.
    pub fn require(&self, name: &str) -> MosculpResult<&LayerImage> {
        self.get(name).ok_or_else(|| {
            MosculpError::invalid_index_map(format!("layer '{name}' has no image"))
        })
    }
}

impl FromIterator<(String, LayerImage)> for Ingredients {
    fn from_iter<I: IntoIterator<Item = (String, LayerImage)>>(iter: I) -> Self {
        Self {
            layers: iter.into_iter().collect(),
        }
    }
}

/// Every asset a composite needs: `(ingredient key, store-relative path)`.
///
/// Sculpture layers contribute their render and a shadow-background sample (`bg_<Part>`); frame
/// layers contribute the video frame.
pub fn ingredient_paths(
    request: &Request,
    index_map: &IndexMap,
) -> MosculpResult<Vec<(String, String)>> {
    let mut out = Vec::with_capacity(index_map.layer_count() * 2);
    for (name, kind) in index_map.names().iter().zip(index_map.kinds()) {
        match kind {
            LayerKind::Sculpture(part) => {
                let material = request.material_for(*part)?;
                let dir = part_render_dir(request, *part, material);
                out.push((name.clone(), format!("{dir}/{SCULPTURE_RGB}")));
                out.push((
                    format!("{SHADOW_PREFIX}{}", part.as_str()),
                    format!("{dir}/{SHADOW_BACKGROUND}"),
                ));
            }
            LayerKind::Frame(frame_id) => {
                out.push((name.clone(), frame_path(&request.clip, frame_id)));
            }
            LayerKind::Background => {
                return Err(MosculpError::invalid_index_map(format!(
                    "layer '{name}' is synthetic and cannot be fetched"
                )));
            }
        }
    }
    Ok(out)
}

/// Fetch and decode every image named by `index_map`, in parallel.
#[tracing::instrument(skip_all, fields(clip = %request.clip, layers = index_map.layer_count()))]
pub fn load_ingredients(
    request: &Request,
    index_map: &IndexMap,
    fetcher: &AssetFetcher,
) -> MosculpResult<Ingredients> {
    let paths = ingredient_paths(request, index_map)?;
    let loaded = paths
        .into_par_iter()
        .map(|(key, rel)| {
            let bytes = fetcher.read(&rel)?;
            let image = decode_layer_image(&bytes).map_err(|e| {
                // An undecodable file must not stay in the mirror.
                if let Err(evict) = fetcher.evict(&rel) {
                    tracing::warn!(asset = %rel, error = %evict, "could not evict undecodable asset");
                }
                match e {
                    MosculpError::Other(err) => {
                        MosculpError::Other(err.context(format!("decode layer '{rel}'")))
                    }
                    other => other,
                }
            })?;
            Ok((key, image))
        })
        .collect::<MosculpResult<Vec<_>>>()?;
    Ok(loaded.into_iter().collect())
}

/// Replace every `bg_*` sample with their pixel-wise mean under the key `bg`.
///
/// Other entries are untouched; a set without samples is returned unchanged.
pub fn merge_background_samples(ingredients: Ingredients) -> MosculpResult<Ingredients> {
    let (samples, mut rest): (BTreeMap<_, _>, BTreeMap<_, _>) = ingredients
        .layers
        .into_iter()
        .partition(|(name, _)| name.starts_with(SHADOW_PREFIX));
    let mut iter = samples.iter();
    let Some((first_name, first)) = iter.next() else {
        return Ok(Ingredients { layers: rest });
    };
    let dims = Dims::of_image(first);
    let mut sum = first.clone();
    for (name, sample) in iter {
        if sample.dim() != first.dim() {
            return Err(MosculpError::invalid_index_map(format!(
                "background sample '{name}' is {}, but '{first_name}' is {dims}",
                Dims::of_image(sample)
            )));
        }
        sum += sample;
    }
    sum /= samples.len() as f32;
    rest.insert(BACKGROUND_LAYER.to_string(), sum);
    Ok(Ingredients { layers: rest })
}

#[cfg(test)]
#[path = "../../tests/unit/assets/ingredients.rs"]
mod tests;
