//! eframe application hosting the viewer in a full-window viewport.

use std::sync::Arc;
use std::time::Instant;

use eframe::egui;
use glam::Vec2;
use tokio::runtime::Handle;

use crate::config::Config;
use crate::error::{RenderError, ViewerError};
use crate::viewer::{HostEvent, LoadStatus, Viewer, ViewportSize};

use super::backend::EguiBackend;
use super::renderer::VrmRenderer;
use super::viewport::ViewportCallback;

/// Scroll points per zoom step
const SCROLL_PER_STEP: f32 = 50.0;

pub struct ViewerApp {
    viewer: Viewer<EguiBackend>,
    renderer: Arc<VrmRenderer>,
    transparent: bool,
    last_frame: Instant,
    viewport: ViewportSize,
    /// Last error returned by the render loop
    render_error: Option<String>,
}

impl ViewerApp {
    pub fn new(
        cc: &eframe::CreationContext<'_>,
        config: &Config,
        runtime: Handle,
    ) -> Result<Self, ViewerError> {
        let render_state = cc.wgpu_render_state.as_ref().ok_or_else(|| {
            RenderError::BackendUnavailable("wgpu render state not available".to_string())
        })?;

        let size = ViewportSize::new(config.window.width, config.window.height);
        let renderer = Arc::new(VrmRenderer::new(
            &render_state.device,
            render_state.target_format,
            size.width,
            size.height,
            config.window.transparent,
        ));

        let backend = EguiBackend::new(Arc::clone(&renderer));
        let viewer = Viewer::mount(config, backend, size, runtime);

        Ok(Self {
            viewer,
            renderer,
            transparent: config.window.transparent,
            last_frame: Instant::now(),
            viewport: size,
            render_error: None,
        })
    }

    /// Launch the native window. Blocks until the window is closed.
    pub fn run(config: Config, runtime: Handle) -> eframe::Result {
        let options = eframe::NativeOptions {
            viewport: egui::ViewportBuilder::default()
                .with_title(config.window.title.clone())
                .with_inner_size([config.window.width as f32, config.window.height as f32])
                .with_transparent(config.window.transparent),
            renderer: eframe::Renderer::Wgpu,
            ..Default::default()
        };

        let title = config.window.title.clone();
        eframe::run_native(
            &title,
            options,
            Box::new(move |cc| Ok(Box::new(Self::new(cc, &config, runtime)?))),
        )
    }

    /// Forward pointer input on the viewport to the orbit controls.
    fn handle_input(&mut self, ui: &egui::Ui, response: &egui::Response) {
        let drag = response.drag_delta();
        let drag = Vec2::new(drag.x, drag.y);

        if response.dragged_by(egui::PointerButton::Primary) {
            self.viewer.orbit_rotate(drag);
        }
        if response.dragged_by(egui::PointerButton::Secondary)
            || response.dragged_by(egui::PointerButton::Middle)
        {
            self.viewer.orbit_pan(drag);
        }
        if response.hovered() {
            let scroll = ui.input(|i| i.smooth_scroll_delta.y);
            if scroll != 0.0 {
                self.viewer.orbit_zoom(scroll / SCROLL_PER_STEP);
            }
        }
    }

    fn status_text(&self) -> Option<(String, egui::Color32)> {
        if let Some(err) = &self.render_error {
            return Some((err.clone(), egui::Color32::RED));
        }
        match self.viewer.status() {
            LoadStatus::Loading { progress: Some(p) } => Some((
                format!("Loading model... {:.0}%", p * 100.0),
                egui::Color32::GRAY,
            )),
            LoadStatus::Loading { progress: None } => {
                Some(("Loading model...".to_string(), egui::Color32::GRAY))
            }
            LoadStatus::Failed(err) => Some((err.clone(), egui::Color32::RED)),
            LoadStatus::Idle | LoadStatus::Ready => None,
        }
    }
}

impl eframe::App for ViewerApp {
    fn clear_color(&self, _visuals: &egui::Visuals) -> [f32; 4] {
        if self.transparent {
            [0.0; 4]
        } else {
            [0.12, 0.12, 0.16, 1.0]
        }
    }

    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        let now = Instant::now();
        let dt = now.duration_since(self.last_frame).as_secs_f32();
        self.last_frame = now;

        egui::CentralPanel::default()
            .frame(egui::Frame::default())
            .show(ctx, |ui| {
                let available = ui.available_size();
                let (rect, response) =
                    ui.allocate_exact_size(available, egui::Sense::click_and_drag());

                let ppp = ctx.pixels_per_point();
                let size = ViewportSize::new(
                    (available.x * ppp).round() as u32,
                    (available.y * ppp).round() as u32,
                );
                if size != self.viewport {
                    self.viewport = size;
                    if let Err(e) = self.viewer.handle_event(HostEvent::Resized(size)) {
                        tracing::error!("Resize failed: {}", e);
                    }
                }

                self.handle_input(ui, &response);

                if let Err(e) = self.viewer.handle_event(HostEvent::Frame { dt }) {
                    tracing::error!("Render error: {}", e);
                    self.render_error = Some(e.to_string());
                }

                if !size.is_empty() {
                    ui.painter()
                        .add(eframe::egui_wgpu::Callback::new_paint_callback(
                            rect,
                            ViewportCallback {
                                renderer: Arc::clone(&self.renderer),
                                width: size.width,
                                height: size.height,
                            },
                        ));
                }

                if let Some((text, color)) = self.status_text() {
                    ui.painter().text(
                        rect.left_top() + egui::vec2(8.0, 8.0),
                        egui::Align2::LEFT_TOP,
                        text,
                        egui::FontId::proportional(14.0),
                        color,
                    );
                }
            });

        // Render continuously, one tick per display frame
        ctx.request_repaint();
    }
}

impl Drop for ViewerApp {
    fn drop(&mut self) {
        self.viewer.teardown();
    }
}
