//! MoSculp composites motion-sculpture renders with the video they were made from.
//!
//! A viewer request (clip, body parts, materials, lights, specularity, translucency, background
//! mode) is answered from pre-rendered per-part images and a per-pixel index map, both fetched
//! from a remote asset store and mirrored locally. Composites are cached on disk under a
//! canonical key, so every distinct request is computed once.
//!
//! # Pipeline overview
//!
//! 1. **Validate**: [`Request::validate`] rejects malformed requests before any IO
//! 2. **Lookup**: [`canonicalize`] the request and consult the [`CompositeCache`]
//! 3. **Fetch**: [`load_index_map`] and [`load_ingredients`] through the [`AssetFetcher`]
//! 4. **Composite**: soft-edge matting, optional synthetic background, per-clip crop
//! 5. **Store**: PNG written to a temporary file and renamed into place
//!
//! [`Engine`] runs the whole pipeline; [`ViewState`] and [`DisplayGate`] model the interactive
//! viewer on top of it.
#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod assets;
mod cache;
mod composite;
mod foundation;
mod pipeline;
mod request;
mod session;

pub use assets::decode::{decode_layer_image, layer_from_rgb};
pub use assets::fetch::{
    AssetFetcher, DirTransport, FetchProgress, HttpTransport, ProgressFn, Transport,
    TransportError, transport_for_root,
};
pub use assets::index_map::{
    BACKGROUND_LAYER, IndexMap, LayerKind, SCULPTURE_PREFIX, SHADOW_PREFIX, load_index_map,
};
pub use assets::ingredients::{
    Ingredients, ingredient_paths, load_ingredients, merge_background_samples,
};
pub use assets::layout::{
    COMPOSITE_DIR, MeshMode, SCULPTURE_RGB, SHADOW_BACKGROUND, frame_path, index_map_path,
    mesh_path, normalize_rel_path, part_render_dir, validate_segment,
};
pub use cache::{CompositeCache, encode_png};
pub use composite::background::{Padding, with_synthetic_background};
pub use composite::blur::{gaussian_blur, gaussian_kernel};
pub use composite::crop::{CropRect, apply_crop};
pub use composite::matting::{
    blend, normalize_weights, sculpture_occupancy, simple_matting, soften, weight_planes,
};
pub use composite::{CompositeOpts, composite};
pub use foundation::config::{
    DEFAULT_LOCAL_ROOT, DEFAULT_MATTING_SIGMA, DEFAULT_WEB_ROOT, FetchSettings, Settings,
};
pub use foundation::core::{Dims, LayerImage, Plane, fixed2, round2};
pub use foundation::error::{MosculpError, MosculpResult};
pub use pipeline::{Engine, RenderOutcome, StageTimings};
pub use request::canonical::{BackgroundMode, CanonicalKey, SEGMENT_SEPARATOR, canonicalize};
pub use request::model::{BodyPart, Light, Material, Request, uniform_material};
pub use session::gate::{DisplayGate, Ticket};
pub use session::state::{Action, DEFAULT_CLIP, MAX_TRANSPARENCY, ViewState, apply};
