//! Model normalization: fit a freshly loaded model into a unit box and frame
//! it with the camera.
//!
//! The computation is a pure function over the model's world-space bounds,
//! its root transform, and the camera pose; the viewer applies the result.

use glam::Vec3;

use crate::config::RecenterMode;
use crate::error::DegenerateModelError;
use crate::scene::{Aabb, CameraPose, Transform};

/// New model root transform and camera pose after normalization.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Normalized {
    pub model: Transform,
    pub camera: CameraPose,
    /// Uniform scale factor that maps the longest box side to 1.0
    pub scale_factor: f32,
    /// Box center before normalization
    pub center: Vec3,
    /// Box size before normalization
    pub size: Vec3,
}

/// Normalize a model whose current world-space bounds are `bounds`.
///
/// * `Origin` recentering maps the box center onto the world origin for any
///   initial root transform: `t' = f * (t - c)`, `s' = f * s`.
/// * `Legacy` recentering reproduces `t' = t + (t - c)` with an absolute scale
///   of `f`. It only centers the model when `t` is zero and `f` is 1.
///
/// The camera lands at `c + (sx/2, sy/2, sz*2)` looking at `c`, in both modes.
pub fn normalize(
    bounds: &Aabb,
    model: &Transform,
    mode: RecenterMode,
) -> Result<Normalized, DegenerateModelError> {
    let size = bounds.size();
    let max_dim = size.max_element();
    let scale_factor = 1.0 / max_dim;

    // Any positive extent is usable as long as its reciprocal stays finite
    if bounds.is_empty()
        || !max_dim.is_finite()
        || max_dim <= 0.0
        || !scale_factor.is_finite()
    {
        return Err(DegenerateModelError {
            size: size.to_array(),
        });
    }

    let center = bounds.center();

    let (translation, scale) = match mode {
        RecenterMode::Origin => (
            (model.translation - center) * scale_factor,
            model.scale * scale_factor,
        ),
        RecenterMode::Legacy => {
            if model.translation != Vec3::ZERO {
                tracing::warn!(
                    "Legacy recentering with non-zero root translation {:?}; model will be off-center",
                    model.translation
                );
            }
            (
                model.translation + (model.translation - center),
                Vec3::splat(scale_factor),
            )
        }
    };

    let camera = CameraPose {
        position: center + Vec3::new(size.x / 2.0, size.y / 2.0, size.z * 2.0),
        target: center,
    };

    Ok(Normalized {
        model: Transform {
            translation,
            rotation: model.rotation,
            scale,
        },
        camera,
        scale_factor,
        center,
        size,
    })
}
