//! Orbit camera controls: rotate around a target, dolly, and pan.
//!
//! Input handlers only accumulate deltas; `update` applies them to the camera
//! and must run once per frame (every frame when damping is enabled, so the
//! remaining motion keeps decaying).

use glam::{Vec2, Vec3};
use std::f32::consts::PI;

use crate::config::ControlsConfig;

use super::camera::PerspectiveCamera;

/// Keeps the polar angle off the poles where the up vector degenerates.
const POLAR_EPS: f32 = 1e-4;

/// Orbit controller. Y is up.
#[derive(Debug, Clone)]
pub struct OrbitControls {
    pub target: Vec3,
    pub rotate_speed: f32,
    pub zoom_speed: f32,
    pub pan_speed: f32,
    pub enable_damping: bool,
    pub damping_factor: f32,
    pub min_distance: f32,
    pub max_distance: f32,
    // Pending motion
    delta_theta: f32,
    delta_phi: f32,
    pan_offset: Vec3,
    scale: f32,
}

impl OrbitControls {
    pub fn new(config: &ControlsConfig) -> Self {
        Self {
            target: Vec3::ZERO,
            rotate_speed: config.rotate_speed,
            zoom_speed: config.zoom_speed,
            pan_speed: config.pan_speed,
            enable_damping: config.enable_damping,
            damping_factor: config.damping_factor,
            min_distance: config.min_distance,
            max_distance: config.max_distance,
            delta_theta: 0.0,
            delta_phi: 0.0,
            pan_offset: Vec3::ZERO,
            scale: 1.0,
        }
    }

    /// Adopt the camera's current target and drop any pending motion.
    pub fn sync_from_camera(&mut self, camera: &PerspectiveCamera) {
        self.target = camera.target();
        self.delta_theta = 0.0;
        self.delta_phi = 0.0;
        self.pan_offset = Vec3::ZERO;
        self.scale = 1.0;
    }

    /// Rotate by a pointer drag in pixels.
    pub fn rotate(&mut self, delta: Vec2) {
        self.delta_theta -= delta.x * self.rotate_speed;
        self.delta_phi -= delta.y * self.rotate_speed;
    }

    /// Dolly by scroll steps. Positive steps move toward the target.
    pub fn zoom(&mut self, steps: f32) {
        self.scale *= self.zoom_speed.powf(steps);
    }

    /// Pan the target in the camera plane by a pointer drag in pixels.
    pub fn pan(&mut self, delta: Vec2, camera: &PerspectiveCamera) {
        let offset = camera.position() - self.target;
        let distance = offset.length();
        let forward = (-offset).normalize_or_zero();
        let right = forward.cross(camera.up).normalize_or_zero();
        let up = right.cross(forward);
        let step = self.pan_speed * distance;
        self.pan_offset += (-right * delta.x + up * delta.y) * step;
    }

    /// Apply pending motion to the camera. Returns true if the camera moved.
    pub fn update(&mut self, camera: &mut PerspectiveCamera) -> bool {
        let before = camera.position();
        let offset = before - self.target;

        let mut radius = offset.length();
        let (mut theta, mut phi) = if radius > f32::EPSILON {
            (
                offset.x.atan2(offset.z),
                (offset.y / radius).clamp(-1.0, 1.0).acos(),
            )
        } else {
            (0.0, PI / 2.0)
        };

        let blend = if self.enable_damping {
            self.damping_factor
        } else {
            1.0
        };

        theta += self.delta_theta * blend;
        phi = (phi + self.delta_phi * blend).clamp(POLAR_EPS, PI - POLAR_EPS);
        radius = (radius * self.scale).clamp(self.min_distance, self.max_distance);
        self.target += self.pan_offset * blend;

        let sin_phi = phi.sin();
        let new_offset = Vec3::new(
            radius * sin_phi * theta.sin(),
            radius * phi.cos(),
            radius * sin_phi * theta.cos(),
        );

        camera.pose.position = self.target + new_offset;
        camera.look_at(self.target);

        if self.enable_damping {
            self.delta_theta *= 1.0 - self.damping_factor;
            self.delta_phi *= 1.0 - self.damping_factor;
            self.pan_offset *= 1.0 - self.damping_factor;
        } else {
            self.delta_theta = 0.0;
            self.delta_phi = 0.0;
            self.pan_offset = Vec3::ZERO;
        }
        self.scale = 1.0;

        before.distance_squared(camera.position()) > 1e-12
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::camera::CameraPose;

    fn camera_at(position: Vec3) -> PerspectiveCamera {
        let mut camera = PerspectiveCamera::new(1.0, 1.0, 0.1, 100.0);
        camera.set_pose(CameraPose {
            position,
            target: Vec3::ZERO,
        });
        camera
    }

    #[test]
    fn test_idle_update_keeps_camera() {
        let mut camera = camera_at(Vec3::new(1.0, 2.0, 3.0));
        let mut controls = OrbitControls::new(&ControlsConfig::default());
        controls.sync_from_camera(&camera);

        let moved = controls.update(&mut camera);
        assert!(!moved);
        assert!((camera.position() - Vec3::new(1.0, 2.0, 3.0)).length() < 1e-4);
    }

    #[test]
    fn test_rotate_preserves_distance() {
        let mut camera = camera_at(Vec3::new(0.0, 0.0, 5.0));
        let mut controls = OrbitControls::new(&ControlsConfig::default());
        controls.rotate(Vec2::new(120.0, 40.0));
        assert!(controls.update(&mut camera));
        assert!((camera.position().length() - 5.0).abs() < 1e-4);
        assert_eq!(camera.target(), Vec3::ZERO);
    }

    #[test]
    fn test_zoom_in_and_clamp() {
        let mut camera = camera_at(Vec3::new(0.0, 0.0, 5.0));
        let config = ControlsConfig {
            min_distance: 2.0,
            ..Default::default()
        };
        let mut controls = OrbitControls::new(&config);

        controls.zoom(1.0);
        controls.update(&mut camera);
        assert!((camera.position().length() - 5.0 * 0.95).abs() < 1e-4);

        controls.zoom(100.0);
        controls.update(&mut camera);
        assert!((camera.position().length() - 2.0).abs() < 1e-4);
    }

    #[test]
    fn test_pan_moves_target_and_camera_together() {
        let mut camera = camera_at(Vec3::new(0.0, 0.0, 5.0));
        let mut controls = OrbitControls::new(&ControlsConfig::default());
        controls.pan(Vec2::new(10.0, 0.0), &camera);
        controls.update(&mut camera);

        // Dragging right shifts the target to the camera's left (-X here)
        assert!(controls.target.x < 0.0);
        let offset = camera.position() - controls.target;
        assert!((offset - Vec3::new(0.0, 0.0, 5.0)).length() < 1e-4);
    }

    #[test]
    fn test_polar_angle_clamped_at_pole() {
        let mut camera = camera_at(Vec3::new(0.0, 0.0, 5.0));
        let mut controls = OrbitControls::new(&ControlsConfig::default());
        controls.rotate(Vec2::new(0.0, 10_000.0));
        controls.update(&mut camera);
        assert!(camera.view_matrix().is_finite());
        assert!(camera.position().y > 4.99);
    }

    #[test]
    fn test_damping_decays_motion() {
        let mut camera = camera_at(Vec3::new(0.0, 0.0, 5.0));
        let config = ControlsConfig {
            enable_damping: true,
            damping_factor: 0.5,
            ..Default::default()
        };
        let mut controls = OrbitControls::new(&config);
        controls.rotate(Vec2::new(100.0, 0.0));

        let mut last = camera.position();
        let mut steps = Vec::new();
        for _ in 0..4 {
            controls.update(&mut camera);
            steps.push(last.distance(camera.position()));
            last = camera.position();
        }
        assert!(steps.windows(2).all(|w| w[1] < w[0]));
    }
}
