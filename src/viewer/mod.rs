//! The viewer: scene, camera, controls, and the loading / render / teardown
//! lifecycle around them.
//!
//! Everything here is owned by one thread. The loader runs on the tokio
//! runtime and is drained once per frame through its `LoadHandle`.

pub mod context;
pub mod render_loop;

use std::path::PathBuf;

use glam::Vec2;
use tokio::runtime::Handle;
use tracing::{debug, error, info};

use crate::config::Config;
use crate::error::RenderError;
use crate::model::{AnimationMixer, LoadEvent, LoadHandle, LoadedModel, ModelLoader};
use crate::scene::{OrbitControls, PerspectiveCamera, Scene};

pub use context::{HostEvent, ViewportContext, ViewportSize};
pub use render_loop::{HeadlessBackend, LoopState, RenderBackend, RenderLoop, TickOutcome};

/// Where the single model load stands.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadStatus {
    /// No load started
    Idle,
    /// In flight; fraction read when the file size is known
    Loading { progress: Option<f32> },
    Ready,
    Failed(String),
}

pub struct Viewer<B: RenderBackend> {
    backend: B,
    scene: Scene,
    camera: PerspectiveCamera,
    controls: OrbitControls,
    mixer: AnimationMixer,
    render_loop: RenderLoop,
    context: Option<ViewportContext>,
    loader: ModelLoader,
    load: Option<LoadHandle>,
    status: LoadStatus,
    autoplay: bool,
}

impl<B: RenderBackend> Viewer<B> {
    /// Set up the scene, camera and controls without loading anything.
    pub fn new(config: &Config, mut backend: B, size: ViewportSize, runtime: Handle) -> Self {
        let aspect = size.aspect().unwrap_or(1.0);
        let camera = PerspectiveCamera::from_config(&config.camera, aspect);
        let mut controls = OrbitControls::new(&config.controls);
        controls.sync_from_camera(&camera);

        backend.set_size(size);

        Self {
            backend,
            scene: Scene::new(&config.lights),
            camera,
            controls,
            mixer: AnimationMixer::new(),
            render_loop: RenderLoop::new(),
            context: Some(ViewportContext::new(size, runtime)),
            loader: ModelLoader::new(config.model.recenter),
            load: None,
            status: LoadStatus::Idle,
            autoplay: config.model.autoplay,
        }
    }

    /// `new`, then start loading the configured model.
    pub fn mount(config: &Config, backend: B, size: ViewportSize, runtime: Handle) -> Self {
        let mut viewer = Self::new(config, backend, size, runtime);
        viewer.load(config.model.path.clone());
        viewer
    }

    /// Start the one model load. Ignored after teardown or if a load was
    /// already started.
    pub fn load(&mut self, path: impl Into<PathBuf>) {
        let path = path.into();
        let ctx = match &self.context {
            Some(ctx) if self.render_loop.is_running() => ctx,
            _ => {
                debug!("Ignoring load of {} after teardown", path.display());
                return;
            }
        };
        if self.status != LoadStatus::Idle {
            debug!("Ignoring second load of {}", path.display());
            return;
        }

        info!("Loading model from {}", path.display());
        self.load = Some(self.loader.spawn(ctx.runtime(), path));
        self.status = LoadStatus::Loading { progress: None };
    }

    /// Dispatch a host event. Only frames produce a tick outcome.
    pub fn handle_event(&mut self, event: HostEvent) -> Result<Option<TickOutcome>, RenderError> {
        match event {
            HostEvent::Resized(size) => {
                self.resize(size);
                Ok(None)
            }
            HostEvent::Frame { dt } => self.frame(dt).map(Some),
        }
    }

    /// Track a new viewport size. Zero-area sizes are ignored.
    pub fn resize(&mut self, size: ViewportSize) {
        let ctx = match self.context.as_mut() {
            Some(ctx) if ctx.is_resize_subscribed() => ctx,
            _ => return,
        };
        let aspect = match size.aspect() {
            Some(a) => a,
            None => {
                debug!("Ignoring zero-area resize {}x{}", size.width, size.height);
                return;
            }
        };

        ctx.set_size(size);
        self.backend.set_size(size);
        self.camera.set_aspect(aspect);
        self.camera.update_projection_matrix();
    }

    /// One display frame: drain loader events, advance the animation, update
    /// the controls, render.
    ///
    /// After teardown this returns `Ok(TickOutcome::Stopped)` and draws nothing.
    /// Backend errors are returned unchanged.
    pub fn frame(&mut self, dt: f32) -> Result<TickOutcome, RenderError> {
        if !self.render_loop.is_running() {
            return Ok(TickOutcome::Stopped);
        }

        self.poll_loader();

        if let Some(scene_model) = self.scene.model_mut() {
            self.mixer
                .update(dt, &scene_model.model, &mut scene_model.pose);
        }
        self.controls.update(&mut self.camera);

        self.backend.render(&self.scene, &self.camera)?;

        if let Some(ctx) = self.context.as_mut() {
            ctx.record_frame();
        }
        Ok(TickOutcome::Rendered)
    }

    /// Apply every loader event that is ready. Never blocks.
    pub fn poll_loader(&mut self) {
        let Some(mut handle) = self.load.take() else {
            return;
        };
        while let Some(event) = handle.try_next() {
            self.apply_load_event(event);
        }
        if !handle.is_finished() {
            self.load = Some(handle);
        }
    }

    /// Wait for the pending load to finish and apply its events.
    pub async fn finish_loading(&mut self) {
        let Some(mut handle) = self.load.take() else {
            return;
        };
        while let Some(event) = handle.next_event().await {
            self.apply_load_event(event);
        }
    }

    fn apply_load_event(&mut self, event: LoadEvent) {
        if !self.render_loop.is_running() {
            return;
        }
        match event {
            LoadEvent::Progress(p) => {
                let ratio = p.ratio();
                match ratio {
                    Some(r) => info!("{:.0}% loaded", r * 100.0),
                    None => info!("{} bytes loaded", p.loaded),
                }
                self.status = LoadStatus::Loading { progress: ratio };
            }
            LoadEvent::Loaded(loaded) => self.attach(*loaded),
            LoadEvent::Failed(e) => {
                error!("Failed to load model: {}", e);
                self.status = LoadStatus::Failed(e.to_string());
            }
        }
    }

    /// Move a normalized model into the scene and frame it.
    fn attach(&mut self, loaded: LoadedModel) {
        let LoadedModel {
            model, normalized, ..
        } = loaded;

        info!(
            "Model loaded: {} meshes, {} vertices, {} clips, scale {:.4}",
            model.meshes.len(),
            model.vertex_count(),
            model.animations.len(),
            normalized.scale_factor
        );

        match model.animations.first() {
            None => info!("Model has no animations"),
            Some(clip) if self.autoplay => {
                info!("Playing animation: {}", clip.name);
                self.mixer.play(0);
            }
            Some(clip) => debug!("Autoplay disabled; not playing {}", clip.name),
        }

        self.scene.add_model(model, normalized.model);
        self.camera.set_pose(normalized.camera);
        self.camera.update_projection_matrix();
        self.controls.sync_from_camera(&self.camera);
        self.status = LoadStatus::Ready;
    }

    /// Stop the loop, drop the resize subscription, cancel any pending load,
    /// and release the renderer. Safe to call more than once.
    pub fn teardown(&mut self) {
        if !self.render_loop.stop() {
            return;
        }

        if let Some(mut ctx) = self.context.take() {
            ctx.unsubscribe_resize();
            debug!("Viewport released after {} frames", ctx.frame_count());
        }
        if let Some(mut handle) = self.load.take() {
            handle.cancel();
        }
        self.mixer.stop();
        self.backend.dispose();
        info!("Viewer torn down");
    }

    pub fn orbit_rotate(&mut self, delta: Vec2) {
        self.controls.rotate(delta);
    }

    pub fn orbit_pan(&mut self, delta: Vec2) {
        self.controls.pan(delta, &self.camera);
    }

    pub fn orbit_zoom(&mut self, steps: f32) {
        self.controls.zoom(steps);
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn camera(&self) -> &PerspectiveCamera {
        &self.camera
    }

    pub fn controls(&self) -> &OrbitControls {
        &self.controls
    }

    pub fn mixer(&self) -> &AnimationMixer {
        &self.mixer
    }

    pub fn status(&self) -> &LoadStatus {
        &self.status
    }

    pub fn loop_state(&self) -> LoopState {
        self.render_loop.state()
    }

    /// `None` after teardown.
    pub fn context(&self) -> Option<&ViewportContext> {
        self.context.as_ref()
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }
}
