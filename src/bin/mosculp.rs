use std::{path::PathBuf, sync::Arc};

use anyhow::Context as _;
use clap::{Args, Parser, Subcommand};
use mosculp::{
    AssetFetcher, BackgroundMode, BodyPart, CompositeCache, Engine, FetchProgress, IndexMap,
    LayerKind, Light, Material, MeshMode, Request, Settings, canonicalize, uniform_material,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "mosculp", version, about = "Composite and cache MoSculp sculpture views")]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Composite a view (or reuse the cached one) and print its path.
    Composite(CompositeArgs),
    /// Print the canonical cache key and cache path of a view without fetching anything.
    Key(KeyArgs),
    /// Print the shape and layers of a local index-map `.npz` file.
    InspectIndexMap(InspectArgs),
    /// Fetch the mesh shown by the 3D view and print its path.
    Mesh(MeshArgs),
}

#[derive(Args, Debug)]
struct SettingsArgs {
    /// JSON settings file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Remote asset root (URL or directory); overrides the settings file.
    #[arg(long)]
    web_root: Option<String>,

    /// Local asset mirror and cache root; overrides the settings file.
    #[arg(long)]
    local_root: Option<PathBuf>,

    /// Override rayon worker threads.
    #[arg(long)]
    threads: Option<usize>,
}

#[derive(Args, Debug)]
struct RequestArgs {
    /// Clip id or display name (e.g. `Ballet-1`).
    #[arg(long, default_value = "ballet11-2")]
    clip: String,

    /// Body part to sculpt; repeat for several.
    #[arg(long = "part", default_values_t = [BodyPart::RightLowerArm])]
    parts: Vec<BodyPart>,

    /// Light to render with; repeat for several. Defaults to all lights.
    #[arg(long = "light")]
    lights: Vec<Light>,

    /// Material of one part as `Part=Material`; repeat for several.
    #[arg(long = "material", value_parser = parse_assignment)]
    materials: Vec<(BodyPart, Material)>,

    /// Material of every part not set with `--material`.
    #[arg(long, default_value_t = Material::Leather)]
    default_material: Material,

    /// Stick-figure keyframe density.
    #[arg(long, default_value_t = 0.0)]
    density: f64,

    /// Sculpture translucency in [0, 1].
    #[arg(long, default_value_t = 0.0)]
    transparency: f64,

    /// Render without specular highlights.
    #[arg(long, default_value_t = false)]
    no_specularity: bool,

    /// Replace the video background with the synthetic shadow background.
    #[arg(long, default_value_t = false)]
    artistic_background: bool,
}

#[derive(Args, Debug)]
struct CompositeArgs {
    #[command(flatten)]
    request: RequestArgs,

    #[command(flatten)]
    settings: SettingsArgs,

    /// Recompute even if the composite is cached.
    #[arg(long, default_value_t = false)]
    no_cache: bool,
}

#[derive(Args, Debug)]
struct KeyArgs {
    #[command(flatten)]
    request: RequestArgs,

    #[command(flatten)]
    settings: SettingsArgs,
}

#[derive(Args, Debug)]
struct InspectArgs {
    /// Index-map archive.
    path: PathBuf,
}

#[derive(Args, Debug)]
struct MeshArgs {
    /// Clip id or display name.
    #[arg(long, default_value = "ballet11-2")]
    clip: String,

    /// `sculpture` or `all-mesh`.
    #[arg(long, default_value = "sculpture", value_parser = parse_mesh_mode)]
    mode: MeshMode,

    #[command(flatten)]
    settings: SettingsArgs,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Composite(args) => cmd_composite(args),
        Command::Key(args) => cmd_key(args),
        Command::InspectIndexMap(args) => cmd_inspect(args),
        Command::Mesh(args) => cmd_mesh(args),
    }
}

fn cmd_composite(args: CompositeArgs) -> anyhow::Result<()> {
    let settings = load_settings(&args.settings)?;
    let request = build_request(&args.request, &settings);
    let engine = engine(settings)?;

    let outcome = if args.no_cache {
        engine.render_uncached(&request)?
    } else {
        engine.render(&request)?
    };
    if outcome.cache_hit {
        eprintln!("cached {}", outcome.key);
    }
    println!("{}", outcome.path.display());
    Ok(())
}

fn cmd_key(args: KeyArgs) -> anyhow::Result<()> {
    let settings = load_settings(&args.settings)?;
    let request = build_request(&args.request, &settings);
    request.validate()?;

    let key = canonicalize(&request);
    let cache = CompositeCache::new(&settings.local_root);
    println!("{key}");
    println!(
        "{}",
        cache.path_for(&key, BackgroundMode::of(&request)).display()
    );
    Ok(())
}

fn cmd_inspect(args: InspectArgs) -> anyhow::Result<()> {
    let bytes = std::fs::read(&args.path)
        .with_context(|| format!("read index map '{}'", args.path.display()))?;
    let map = IndexMap::from_npz_bytes(&bytes)?;
    let fg = map.foreground().iter().filter(|v| **v).count();

    println!("size: {}", map.dims());
    println!("foreground pixels: {fg} of {}", map.dims().area());
    println!("layers: {}", map.layer_count());
    for (i, (name, kind)) in map.names().iter().zip(map.kinds()).enumerate() {
        let kind = match kind {
            LayerKind::Sculpture(part) => format!("sculpture ({})", part.label()),
            LayerKind::Frame(_) => "frame".to_string(),
            LayerKind::Background => "background".to_string(),
        };
        println!("  {i:>3}  {name:<24} {kind}");
    }
    Ok(())
}

fn cmd_mesh(args: MeshArgs) -> anyhow::Result<()> {
    let settings = load_settings(&args.settings)?;
    let clip = settings.resolve_clip(&args.clip).to_string();
    let engine = engine(settings)?;
    let path = engine.fetch_mesh(&clip, args.mode)?;
    println!("{}", path.display());
    Ok(())
}

fn load_settings(args: &SettingsArgs) -> anyhow::Result<Settings> {
    let mut settings = match &args.config {
        Some(path) => Settings::from_path(path)?,
        None => Settings::default(),
    };
    if let Some(web_root) = &args.web_root {
        settings.web_root = web_root.clone();
    }
    if let Some(local_root) = &args.local_root {
        settings.local_root = local_root.clone();
    }
    if args.threads.is_some() {
        settings.threads = args.threads;
    }
    settings.validate()?;
    Ok(settings)
}

fn engine(settings: Settings) -> anyhow::Result<Engine> {
    let progress = |rel: &str, p: &FetchProgress| {
        tracing::debug!(
            asset = rel,
            bytes = p.bytes,
            percent = p.percent(),
            kib_per_sec = p.kib_per_sec(),
            "downloading"
        );
    };
    let fetcher = AssetFetcher::from_settings(&settings).with_progress(Arc::new(progress));
    Ok(Engine::with_fetcher(settings, fetcher)?)
}

fn build_request(args: &RequestArgs, settings: &Settings) -> Request {
    let mut material = uniform_material(args.default_material);
    material.extend(args.materials.iter().copied());
    let lights = if args.lights.is_empty() {
        Light::ALL.into_iter().collect()
    } else {
        args.lights.iter().copied().collect()
    };
    Request {
        clip: settings.resolve_clip(&args.clip).to_string(),
        density: args.density,
        lights,
        transparency: args.transparency,
        specularity: !args.no_specularity,
        parts: args.parts.iter().copied().collect(),
        material,
        artistic_background: args.artistic_background,
    }
}

fn parse_assignment(s: &str) -> Result<(BodyPart, Material), String> {
    let (part, mat) = s
        .split_once('=')
        .ok_or_else(|| format!("expected Part=Material, got '{s}'"))?;
    let part = part.parse::<BodyPart>().map_err(|e| e.to_string())?;
    let mat = mat.parse::<Material>().map_err(|e| e.to_string())?;
    Ok((part, mat))
}

fn parse_mesh_mode(s: &str) -> Result<MeshMode, String> {
    match s {
        "sculpture" => Ok(MeshMode::Sculpture),
        "all-mesh" | "allmesh" => Ok(MeshMode::AllMesh),
        other => Err(format!("unknown mesh mode '{other}' (sculpture | all-mesh)")),
    }
}
