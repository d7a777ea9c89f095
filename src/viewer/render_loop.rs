//! Render backend seam and the per-frame loop state.


use crate::error::RenderError;
use crate::scene::{PerspectiveCamera, Scene};

use super::context::ViewportSize;

/// Something that can draw a scene from a camera.
///
/// `dispose` releases GPU resources and is called exactly once, at teardown.
pub trait RenderBackend {
    fn set_size(&mut self, size: ViewportSize);
    fn render(&mut self, scene: &Scene, camera: &PerspectiveCamera) -> Result<(), RenderError>;
    fn dispose(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Running,
    Stopped,
}

/// Result of one frame tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Rendered,
    /// The loop was already stopped; nothing was drawn
    Stopped,
}

/// Running until stopped. No pause.
#[derive(Debug)]
pub struct RenderLoop {
    state: LoopState,
}

impl Default for RenderLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderLoop {
    pub fn new() -> Self {
        Self {
            state: LoopState::Running,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == LoopState::Running
    }

    /// Returns true on the first call only.
    pub fn stop(&mut self) -> bool {
        let was_running = self.is_running();
        self.state = LoopState::Stopped;
        was_running
    }
}

/// Backend without a GPU. Records what it was asked to draw.
#[derive(Debug, Default)]
pub struct HeadlessBackend {
    size: ViewportSize,
    frames: u64,
    disposed: bool,
    last_vertex_count: usize,
}

impl HeadlessBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn size(&self) -> ViewportSize {
        self.size
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Vertices of the model drawn in the last frame (zero without a model).
    pub fn last_vertex_count(&self) -> usize {
        self.last_vertex_count
    }
}

impl RenderBackend for HeadlessBackend {
    fn set_size(&mut self, size: ViewportSize) {
        self.size = size;
    }

    fn render(&mut self, scene: &Scene, _camera: &PerspectiveCamera) -> Result<(), RenderError> {
        if self.disposed {
            return Err(RenderError::Submit("backend already disposed".to_string()));
        }
        self.frames += 1;
        self.last_vertex_count = scene.model().map_or(0, |m| m.model.vertex_count());
        Ok(())
    }

    fn dispose(&mut self) {
        self.disposed = true;
    }
}
