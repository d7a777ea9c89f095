//! Perspective camera with a cached projection matrix.

use glam::{Mat4, Vec3};

use crate::config::CameraConfig;

/// Camera placement: where it sits and what it looks at.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraPose {
    pub position: Vec3,
    pub target: Vec3,
}

impl Default for CameraPose {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            target: Vec3::NEG_Z,
        }
    }
}

/// Right-handed, Y-up perspective camera.
#[derive(Debug, Clone)]
pub struct PerspectiveCamera {
    /// Vertical field of view in radians
    pub fov_y: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
    pub pose: CameraPose,
    pub up: Vec3,
    projection: Mat4,
}

impl PerspectiveCamera {
    pub fn new(fov_y: f32, aspect: f32, near: f32, far: f32) -> Self {
        let mut camera = Self {
            fov_y,
            aspect,
            near,
            far,
            pose: CameraPose::default(),
            up: Vec3::Y,
            projection: Mat4::IDENTITY,
        };
        camera.update_projection_matrix();
        camera
    }

    pub fn from_config(config: &CameraConfig, aspect: f32) -> Self {
        Self::new(config.fov_deg.to_radians(), aspect, config.near, config.far)
    }

    pub fn position(&self) -> Vec3 {
        self.pose.position
    }

    pub fn target(&self) -> Vec3 {
        self.pose.target
    }

    pub fn look_at(&mut self, target: Vec3) {
        self.pose.target = target;
    }

    pub fn set_pose(&mut self, pose: CameraPose) {
        self.pose = pose;
    }

    /// Change the aspect ratio. Callers must follow with `update_projection_matrix`.
    pub fn set_aspect(&mut self, aspect: f32) {
        self.aspect = aspect;
    }

    pub fn update_projection_matrix(&mut self) {
        self.projection = Mat4::perspective_rh(self.fov_y, self.aspect, self.near, self.far);
    }

    pub fn projection_matrix(&self) -> Mat4 {
        self.projection
    }

    pub fn view_matrix(&self) -> Mat4 {
        // look_at_rh is undefined when eye == target; keep looking down -Z
        let target = if self.pose.position.distance_squared(self.pose.target) < f32::EPSILON {
            self.pose.position + Vec3::NEG_Z
        } else {
            self.pose.target
        };
        Mat4::look_at_rh(self.pose.position, target, self.up)
    }

    pub fn view_projection(&self) -> Mat4 {
        self.projection * self.view_matrix()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_projection_tracks_aspect() {
        let mut camera = PerspectiveCamera::new(75f32.to_radians(), 1.0, 0.1, 1000.0);
        let before = camera.projection_matrix();

        camera.set_aspect(2.0);
        // Not yet recomputed
        assert_eq!(camera.projection_matrix(), before);

        camera.update_projection_matrix();
        let after = camera.projection_matrix();
        assert!((after.x_axis.x * 2.0 - before.x_axis.x).abs() < 1e-5);
        assert_eq!(after.y_axis.y, before.y_axis.y);
    }

    #[test]
    fn test_view_matrix_maps_target_in_front() {
        let mut camera = PerspectiveCamera::new(1.0, 1.0, 0.1, 100.0);
        camera.set_pose(CameraPose {
            position: Vec3::new(0.0, 0.0, 5.0),
            target: Vec3::ZERO,
        });
        let p = camera.view_matrix().transform_point3(Vec3::ZERO);
        assert!((p.z + 5.0).abs() < 1e-5);
    }

    #[test]
    fn test_view_matrix_finite_when_target_equals_position() {
        let mut camera = PerspectiveCamera::new(1.0, 1.0, 0.1, 100.0);
        camera.set_pose(CameraPose {
            position: Vec3::ONE,
            target: Vec3::ONE,
        });
        assert!(camera.view_matrix().is_finite());
    }
}
