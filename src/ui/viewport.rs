//! egui-wgpu paint callback for the viewer viewport.
//!
//! `prepare()` uploads the staged frame and renders it offscreen, `paint()`
//! blits the result into the egui render pass.

use eframe::egui_wgpu;
use eframe::wgpu;
use std::sync::Arc;

use super::renderer::VrmRenderer;

pub struct ViewportCallback {
    pub renderer: Arc<VrmRenderer>,
    /// Viewport size in physical pixels
    pub width: u32,
    pub height: u32,
}

impl egui_wgpu::CallbackTrait for ViewportCallback {
    fn prepare(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        _screen_descriptor: &egui_wgpu::ScreenDescriptor,
        _egui_encoder: &mut wgpu::CommandEncoder,
        _callback_resources: &mut egui_wgpu::CallbackResources,
    ) -> Vec<wgpu::CommandBuffer> {
        self.renderer.resize(device, self.width, self.height);
        self.renderer.render_offscreen(device, queue);
        Vec::new()
    }

    fn paint(
        &self,
        _info: eframe::egui::PaintCallbackInfo,
        render_pass: &mut wgpu::RenderPass<'static>,
        _callback_resources: &egui_wgpu::CallbackResources,
    ) {
        self.renderer.blit(render_pass);
    }
}
