//! `RenderBackend` that feeds the wgpu renderer from the egui frame update.

use std::sync::Arc;

use crate::error::RenderError;
use crate::model::pose::{compute_world_transforms, pose_instance};
use crate::scene::{PerspectiveCamera, Scene};
use crate::viewer::{RenderBackend, ViewportSize};

use super::renderer::{DrawData, FrameData, Vertex, VrmRenderer};

/// Poses the scene model on the CPU and stages the result for the paint
/// callback. The GPU work itself happens in `ViewportCallback::prepare`.
pub struct EguiBackend {
    renderer: Arc<VrmRenderer>,
    /// Index buffers for the current model have been staged
    geometry_staged: bool,
    disposed: bool,
}

impl EguiBackend {
    pub fn new(renderer: Arc<VrmRenderer>) -> Self {
        Self {
            renderer,
            geometry_staged: false,
            disposed: false,
        }
    }
}

impl RenderBackend for EguiBackend {
    /// The paint callback resizes the offscreen target itself.
    fn set_size(&mut self, _size: ViewportSize) {}

    fn render(&mut self, scene: &Scene, camera: &PerspectiveCamera) -> Result<(), RenderError> {
        if self.disposed {
            return Err(RenderError::Submit("renderer already released".to_string()));
        }

        let mut draws = Vec::new();
        let mut indices = Vec::new();
        let mut model_matrix = glam::Mat4::IDENTITY;

        if let Some(scene_model) = scene.model() {
            let model = &scene_model.model;
            model_matrix = scene_model.root.to_matrix();
            let world = compute_world_transforms(model, &scene_model.pose);

            for instance in &model.instances {
                let posed = pose_instance(model, instance, &world);
                let Some(mesh) = model.meshes.get(instance.mesh) else {
                    continue;
                };
                for (prim, posed) in mesh.primitives.iter().zip(posed) {
                    if posed.positions.is_empty() || prim.indices.is_empty() {
                        continue;
                    }
                    let vertices = posed
                        .positions
                        .iter()
                        .zip(posed.normals.iter())
                        .map(|(p, n)| Vertex {
                            position: p.to_array(),
                            normal: n.to_array(),
                        })
                        .collect();
                    draws.push(DrawData {
                        vertices,
                        base_color: prim.base_color,
                    });
                    if !self.geometry_staged {
                        indices.push(prim.indices.clone());
                    }
                }
            }
        }

        let rebuild = scene.has_model() && !self.geometry_staged;
        self.geometry_staged |= rebuild;

        self.renderer.stage(FrameData {
            draws,
            indices: rebuild.then_some(indices),
            view_proj: camera.view_projection(),
            model: model_matrix,
            light_dir: scene.directional.direction,
            light_color: scene.directional.color * scene.directional.intensity,
            ambient: scene.ambient.color * scene.ambient.intensity,
        });
        Ok(())
    }

    fn dispose(&mut self) {
        if !self.disposed {
            self.renderer.release();
            self.disposed = true;
        }
    }
}
