//! Native window for the viewer (eframe + wgpu).
//!
//! Enabled via the `native-ui` feature.

mod app;
mod backend;
mod renderer;
mod viewport;

pub use app::ViewerApp;
pub use backend::EguiBackend;
pub use renderer::VrmRenderer;
