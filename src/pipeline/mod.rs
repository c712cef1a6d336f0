//! Request → cached composite.
//!
//! [`Engine::render`] validates the request, consults the composite cache, and on a miss runs
//! index map → ingredients → composite → crop → store.

use std::{
    path::PathBuf,
    sync::atomic::{AtomicU64, Ordering},
    time::{Duration, Instant},
};

use image::RgbImage;

use crate::{
    assets::{
        fetch::AssetFetcher,
        index_map::load_index_map,
        ingredients::{load_ingredients, merge_background_samples},
        layout::{MeshMode, mesh_path, validate_segment},
    },
    cache::CompositeCache,
    composite::{CompositeOpts, composite, crop::apply_crop},
    foundation::config::Settings,
    foundation::error::{MosculpError, MosculpResult},
    request::{
        canonical::{BackgroundMode, CanonicalKey, canonicalize},
        model::Request,
    },
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
/// Wall time of each stage of one pipeline run.
pub struct StageTimings {
    /// Fetching and decoding the index map.
    pub index_map: Duration,
    /// Fetching and decoding layer images.
    pub ingredients: Duration,
    /// Matting, background substitution and crop.
    pub composite: Duration,
    /// Encoding and storing the PNG.
    pub store: Duration,
}

#[derive(Clone, Debug)]
/// Result of [`Engine::render`].
pub struct RenderOutcome {
    /// Cached composite on disk.
    pub path: PathBuf,
    /// Key the composite is cached under.
    pub key: CanonicalKey,
    /// Whether the composite was already cached.
    pub cache_hit: bool,
    /// Stage timings; `None` on a cache hit.
    pub timings: Option<StageTimings>,
}

/// Compositing engine: settings, asset fetcher, composite cache and worker pool.
pub struct Engine {
    settings: Settings,
    fetcher: AssetFetcher,
    cache: CompositeCache,
    pool: rayon::ThreadPool,
    runs: AtomicU64,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("settings", &self.settings)
            .field("fetcher", &self.fetcher)
            .field("cache", &self.cache)
            .field("threads", &self.pool.current_num_threads())
            .finish()
    }
}

impl Engine {
    /// Engine fetching from `settings.web_root`.
    pub fn new(settings: Settings) -> MosculpResult<Self> {
        let fetcher = AssetFetcher::from_settings(&settings);
        Self::with_fetcher(settings, fetcher)
    }

    /// Engine using a caller-supplied fetcher (custom transport, progress reporting).
    ///
    /// Composites are cached below the fetcher's local root.
    pub fn with_fetcher(settings: Settings, fetcher: AssetFetcher) -> MosculpResult<Self> {
        settings.validate()?;
        let pool = build_thread_pool(settings.threads)?;
        let cache = CompositeCache::new(fetcher.local_root());
        Ok(Self {
            settings,
            fetcher,
            cache,
            pool,
            runs: AtomicU64::new(0),
        })
    }

    /// Active settings.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Asset fetcher.
    pub fn fetcher(&self) -> &AssetFetcher {
        &self.fetcher
    }

    /// Composite cache.
    pub fn cache(&self) -> &CompositeCache {
        &self.cache
    }

    /// Number of pipeline runs (cache misses and forced renders) since construction.
    pub fn pipeline_runs(&self) -> u64 {
        self.runs.load(Ordering::Relaxed)
    }

    /// Cached composite path of `request`, computing and storing it on a miss.
    #[tracing::instrument(skip_all, fields(clip = %request.clip))]
    pub fn render(&self, request: &Request) -> MosculpResult<RenderOutcome> {
        request.validate()?;
        let key = canonicalize(request);
        let mode = BackgroundMode::of(request);
        if let Some(path) = self.cache.lookup(&key, mode) {
            tracing::info!(key = %key, path = %path.display(), "cache hit");
            return Ok(RenderOutcome {
                path,
                key,
                cache_hit: true,
                timings: None,
            });
        }
        tracing::info!(key = %key, "cache miss");
        self.run_and_store(request, key, mode)
    }

    /// Recompute the composite even when cached, replacing the cache entry.
    #[tracing::instrument(skip_all, fields(clip = %request.clip))]
    pub fn render_uncached(&self, request: &Request) -> MosculpResult<RenderOutcome> {
        request.validate()?;
        let key = canonicalize(request);
        let mode = BackgroundMode::of(request);
        self.run_and_store(request, key, mode)
    }

    /// Run the pipeline for `request` without touching the composite cache.
    pub fn compose(&self, request: &Request) -> MosculpResult<RgbImage> {
        request.validate()?;
        self.compose_timed(request).map(|(image, _)| image)
    }

    /// Fetch the mesh shown by the 3D view; the file is never parsed.
    #[tracing::instrument(skip(self))]
    pub fn fetch_mesh(&self, clip: &str, mode: MeshMode) -> MosculpResult<PathBuf> {
        validate_segment(clip)
            .map_err(|e| MosculpError::invalid_request(format!("clip: {e}")))?;
        self.fetcher.fetch(&mesh_path(clip, mode))
    }

    fn run_and_store(
        &self,
        request: &Request,
        key: CanonicalKey,
        mode: BackgroundMode,
    ) -> MosculpResult<RenderOutcome> {
        let (image, mut timings) = self.compose_timed(request)?;

        let t0 = Instant::now();
        let path = self.cache.store(&key, mode, &image)?;
        timings.store = t0.elapsed();

        tracing::info!(
            path = %path.display(),
            index_map_ms = timings.index_map.as_millis() as u64,
            ingredients_ms = timings.ingredients.as_millis() as u64,
            composite_ms = timings.composite.as_millis() as u64,
            store_ms = timings.store.as_millis() as u64,
            "composite rendered"
        );
        Ok(RenderOutcome {
            path,
            key,
            cache_hit: false,
            timings: Some(timings),
        })
    }

    fn compose_timed(&self, request: &Request) -> MosculpResult<(RgbImage, StageTimings)> {
        self.runs.fetch_add(1, Ordering::Relaxed);
        let mut timings = StageTimings::default();
        let opts = CompositeOpts {
            sigma: self.settings.matting_sigma,
        };

        self.pool.install(|| {
            let t0 = Instant::now();
            let index_map = load_index_map(request, &self.fetcher)?;
            timings.index_map = t0.elapsed();

            let t0 = Instant::now();
            let ingredients = load_ingredients(request, &index_map, &self.fetcher)?;
            let ingredients = merge_background_samples(ingredients)?;
            timings.ingredients = t0.elapsed();

            let t0 = Instant::now();
            let mut image = composite(
                &ingredients,
                &index_map,
                request.transparency,
                request.artistic_background,
                &opts,
            )?;
            if let Some(rect) = self.settings.crop_for(&request.clip) {
                image = apply_crop(image, &rect);
            }
            timings.composite = t0.elapsed();
            Ok((image, timings))
        })
    }
}

fn build_thread_pool(threads: Option<usize>) -> MosculpResult<rayon::ThreadPool> {
    if threads == Some(0) {
        return Err(MosculpError::config("threads must be >= 1 when set"));
    }
    let mut builder = rayon::ThreadPoolBuilder::new();
    if let Some(n) = threads {
        builder = builder.num_threads(n);
    }
    builder
        .build()
        .map_err(|e| MosculpError::config(format!("failed to build rayon thread pool: {e}")))
}

#[cfg(test)]
#[path = "../../tests/unit/pipeline/mod.rs"]
mod tests;
