//! vrm-viewer - VRM avatar viewer
//!
//! Main entry point for the CLI application.

use clap::Parser;
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vrm_viewer::{
    config::Config,
    viewer::{HeadlessBackend, LoadStatus, Viewer, ViewportSize},
};

/// vrm-viewer - load, normalize and display a VRM avatar
#[derive(Parser, Debug)]
#[command(name = "vrm-viewer", version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Model file (overrides config)
    #[arg(short, long)]
    model: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Load and normalize the model, print a summary, and exit
    #[arg(long)]
    inspect: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(log_level.into())
                .from_env_lossy(),
        )
        .init();

    info!("Starting {} v{}", vrm_viewer::NAME, vrm_viewer::VERSION);

    let mut config = if let Some(ref path) = args.config {
        Config::from_file(path)?
    } else {
        Config::load()?
    };
    if let Some(model) = args.model {
        config.model.path = model;
    }
    config.validate()?;

    info!("Model: {}", config.model.path.display());
    info!("Recentering: {:?}", config.model.recenter);

    // Build tokio runtime manually so the main thread stays free for the UI event loop
    let runtime = tokio::runtime::Runtime::new()?;

    #[cfg(feature = "native-ui")]
    if !args.inspect {
        // Enter the runtime so loader tasks can be spawned from eframe callbacks
        let guard = runtime.enter();

        // eframe::run_native blocks the main thread (winit requirement)
        if let Err(e) = vrm_viewer::ui::ViewerApp::run(config, runtime.handle().clone()) {
            tracing::error!("UI error: {}", e);
        }

        info!("Window closed, shutting down");
        drop(guard);
        runtime.shutdown_timeout(std::time::Duration::from_secs(1));
        return Ok(());
    }

    #[cfg(not(feature = "native-ui"))]
    if !args.inspect {
        info!("Built without native-ui; running inspect");
    }

    inspect(&config, &runtime)
}

/// Headless path: load and normalize, render one frame, print a summary.
fn inspect(config: &Config, runtime: &tokio::runtime::Runtime) -> anyhow::Result<()> {
    let size = ViewportSize::new(config.window.width, config.window.height);
    let mut viewer = Viewer::mount(config, HeadlessBackend::new(), size, runtime.handle().clone());

    runtime.block_on(viewer.finish_loading());
    viewer.frame(0.0)?;

    let result = match viewer.status() {
        LoadStatus::Ready => {
            print_summary(&viewer);
            Ok(())
        }
        LoadStatus::Failed(e) => Err(anyhow::anyhow!("{}", e)),
        other => Err(anyhow::anyhow!("Model did not finish loading: {:?}", other)),
    };

    viewer.teardown();
    result
}

fn print_summary(viewer: &Viewer<HeadlessBackend>) {
    let Some(scene_model) = viewer.scene().model() else {
        return;
    };
    let model = &scene_model.model;
    let bounds = scene_model.world_bounds();
    let camera = viewer.camera();

    println!("title:       {}", model.meta.title.as_deref().unwrap_or("(untitled)"));
    println!("vrm:         {:?}", model.meta.version);
    println!("meshes:      {}", model.meshes.len());
    println!("primitives:  {}", model.primitive_count());
    println!("vertices:    {}", model.vertex_count());
    println!("nodes:       {}", model.node_count);
    println!("bones:       {}", model.meta.bone_to_node.len());
    println!("clips:       {}", model.animations.len());
    if let Some(clip) = viewer.mixer().active_clip().and_then(|i| model.animations.get(i)) {
        println!("playing:     {} ({:.2}s)", clip.name, clip.duration);
    }
    println!("root scale:  {:?}", scene_model.root.scale.to_array());
    println!("root offset: {:?}", scene_model.root.translation.to_array());
    println!("bounds:      {:?} .. {:?}", bounds.min.to_array(), bounds.max.to_array());
    println!("camera:      {:?} -> {:?}", camera.position().to_array(), camera.target().to_array());
}
