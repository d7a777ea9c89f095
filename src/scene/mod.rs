//! Scene graph primitives: transforms, lights, camera, and the scene container.

pub mod bounds;
pub mod camera;
pub mod orbit;

use glam::{Mat4, Quat, Vec3};

use crate::config::LightsConfig;
use crate::model::{Pose, VrmModel};

pub use bounds::Aabb;
pub use camera::{CameraPose, PerspectiveCamera};
pub use orbit::OrbitControls;

/// Translation / rotation / scale of a scene object.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Transform {
    pub const IDENTITY: Self = Self {
        translation: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        scale: Vec3::ONE,
    };

    pub fn to_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
    }
}

/// Uniform light applied to every surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AmbientLight {
    pub color: Vec3,
    pub intensity: f32,
}

/// Infinitely distant light shining from `direction` toward the origin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DirectionalLight {
    pub color: Vec3,
    pub intensity: f32,
    /// Unit vector from the origin toward the light
    pub direction: Vec3,
}

/// A model placed in the scene under a root transform.
pub struct SceneModel {
    pub model: VrmModel,
    pub root: Transform,
    /// Current node pose, starting at rest
    pub pose: Pose,
}

impl SceneModel {
    /// Scene-space bounds of the model in its current pose.
    pub fn world_bounds(&self) -> Aabb {
        crate::model::posed_bounds(&self.model, &self.pose).transformed(&self.root.to_matrix())
    }
}

/// Everything the renderer draws: one optional model and two lights.
pub struct Scene {
    pub ambient: AmbientLight,
    pub directional: DirectionalLight,
    model: Option<SceneModel>,
}

impl Scene {
    pub fn new(lights: &LightsConfig) -> Self {
        let direction = Vec3::from(lights.directional_position).normalize_or(Vec3::Y);
        Self {
            ambient: AmbientLight {
                color: Vec3::from(lights.ambient_color),
                intensity: lights.ambient_intensity,
            },
            directional: DirectionalLight {
                color: Vec3::from(lights.directional_color),
                intensity: lights.directional_intensity,
                direction,
            },
            model: None,
        }
    }

    /// Attach a model. A previous model, if any, is dropped.
    pub fn add_model(&mut self, model: VrmModel, root: Transform) {
        let pose = Pose::rest(&model);
        self.model = Some(SceneModel { model, root, pose });
    }

    pub fn model(&self) -> Option<&SceneModel> {
        self.model.as_ref()
    }

    pub fn model_mut(&mut self) -> Option<&mut SceneModel> {
        self.model.as_mut()
    }

    pub fn has_model(&self) -> bool {
        self.model.is_some()
    }
}
