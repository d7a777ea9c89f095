//! Node poses, forward kinematics, and CPU linear blend skinning.

use glam::{Mat4, Quat, Vec3, Vec4};

use crate::scene::Aabb;

use super::vrm::{MeshInstance, VrmModel};

/// Weights below this are ignored during skinning.
const MIN_WEIGHT: f32 = 1e-4;

/// Local translation / rotation / scale of every node.
#[derive(Debug, Clone, PartialEq)]
pub struct Pose {
    pub translations: Vec<Vec3>,
    pub rotations: Vec<Quat>,
    pub scales: Vec<Vec3>,
}

impl Pose {
    /// The model's rest pose.
    pub fn rest(model: &VrmModel) -> Self {
        Self {
            translations: model.rest_translations.clone(),
            rotations: model.rest_rotations.clone(),
            scales: model.rest_scales.clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.translations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.translations.is_empty()
    }

    /// Overwrite every node with its rest transform.
    pub fn reset_to_rest(&mut self, model: &VrmModel) {
        self.translations.clone_from(&model.rest_translations);
        self.rotations.clone_from(&model.rest_rotations);
        self.scales.clone_from(&model.rest_scales);
    }

    fn local(&self, idx: usize) -> Mat4 {
        Mat4::from_scale_rotation_translation(
            self.scales[idx],
            self.rotations[idx],
            self.translations[idx],
        )
    }
}

/// Compute model-space transforms for all nodes using forward kinematics.
pub fn compute_world_transforms(model: &VrmModel, pose: &Pose) -> Vec<Mat4> {
    let count = model.node_count.min(pose.len());
    let mut world = vec![Mat4::IDENTITY; count];
    let mut computed = vec![false; count];

    for i in 0..count {
        compute_node(model, pose, &mut world, &mut computed, i);
    }

    world
}

fn compute_node(
    model: &VrmModel,
    pose: &Pose,
    world: &mut [Mat4],
    computed: &mut [bool],
    idx: usize,
) {
    if computed[idx] {
        return;
    }

    let local = pose.local(idx);
    match model.parents[idx] {
        Some(parent) if parent < world.len() => {
            compute_node(model, pose, world, computed, parent);
            world[idx] = world[parent] * local;
        }
        _ => world[idx] = local,
    }
    computed[idx] = true;
}

/// Posed geometry of one primitive, in model space.
#[derive(Debug, Clone, Default)]
pub struct PosedPrimitive {
    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
}

/// Pose every primitive of `instance`.
///
/// Skinned instances are deformed with their joint matrices
/// (`world[joint] * inverse_bind`); rigid instances follow their node.
pub fn pose_instance(
    model: &VrmModel,
    instance: &MeshInstance,
    world: &[Mat4],
) -> Vec<PosedPrimitive> {
    let mesh = match model.meshes.get(instance.mesh) {
        Some(m) => m,
        None => return Vec::new(),
    };

    let joint_matrices: Option<Vec<Mat4>> = instance
        .skin
        .and_then(|s| model.skins.get(s))
        .map(|skin| {
            skin.joints
                .iter()
                .zip(skin.inverse_bind_matrices.iter())
                .map(|(&node, ibm)| world.get(node).copied().unwrap_or(Mat4::IDENTITY) * *ibm)
                .collect()
        });

    let node_matrix = world.get(instance.node).copied().unwrap_or(Mat4::IDENTITY);

    mesh.primitives
        .iter()
        .map(|prim| match &joint_matrices {
            Some(joints) => {
                let mut posed = PosedPrimitive {
                    positions: Vec::with_capacity(prim.positions.len()),
                    normals: Vec::with_capacity(prim.normals.len()),
                };
                for (v_idx, pos) in prim.positions.iter().enumerate() {
                    let m = blend_matrix(
                        joints,
                        prim.joints.get(v_idx).copied().unwrap_or([0; 4]),
                        prim.weights.get(v_idx).copied().unwrap_or([1.0, 0.0, 0.0, 0.0]),
                    );
                    posed.positions.push(m.transform_point3(*pos));
                    let n = prim.normals.get(v_idx).copied().unwrap_or(Vec3::Y);
                    posed.normals.push(m.transform_vector3(n).normalize_or(Vec3::Y));
                }
                posed
            }
            None => {
                let normal_matrix = node_matrix.inverse().transpose();
                PosedPrimitive {
                    positions: prim
                        .positions
                        .iter()
                        .map(|p| node_matrix.transform_point3(*p))
                        .collect(),
                    normals: prim
                        .normals
                        .iter()
                        .map(|n| normal_matrix.transform_vector3(*n).normalize_or(Vec3::Y))
                        .collect(),
                }
            }
        })
        .collect()
}

/// Weighted sum of joint matrices for one vertex.
///
/// Out-of-range joint indices and near-zero weights are skipped. A vertex with
/// no usable influence keeps the identity.
fn blend_matrix(joints: &[Mat4], j: [u16; 4], w: [f32; 4]) -> Mat4 {
    let mut cols = [Vec4::ZERO; 4];
    let mut total = 0.0;
    for k in 0..4 {
        if w[k] < MIN_WEIGHT {
            continue;
        }
        let jm = match joints.get(j[k] as usize) {
            Some(m) => m,
            None => continue,
        };
        cols[0] += jm.x_axis * w[k];
        cols[1] += jm.y_axis * w[k];
        cols[2] += jm.z_axis * w[k];
        cols[3] += jm.w_axis * w[k];
        total += w[k];
    }
    if total <= MIN_WEIGHT {
        return Mat4::IDENTITY;
    }
    Mat4::from_cols(cols[0], cols[1], cols[2], cols[3])
}

/// Model-space bounding box of every mesh in the given pose.
pub fn posed_bounds(model: &VrmModel, pose: &Pose) -> Aabb {
    let world = compute_world_transforms(model, pose);
    let mut bounds = Aabb::EMPTY;
    for instance in &model.instances {
        for prim in pose_instance(model, instance, &world) {
            for p in prim.positions {
                bounds.expand_by_point(p);
            }
        }
    }
    bounds
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::test_glb::GlbBuilder;

    #[test]
    fn test_rest_pose_matches_model() {
        let data = GlbBuilder::new().cube(Vec3::ZERO, Vec3::ONE).build();
        let model = VrmModel::from_slice(&data).unwrap();
        let pose = Pose::rest(&model);
        assert_eq!(pose.len(), model.node_count);
        assert_eq!(pose.translations, model.rest_translations);
    }

    #[test]
    fn test_world_transforms_chain_through_parent() {
        let data = GlbBuilder::new()
            .cube(Vec3::ZERO, Vec3::ONE)
            .node_translation(Vec3::new(0.0, 2.0, 0.0))
            .build();
        let model = VrmModel::from_slice(&data).unwrap();
        let mut pose = Pose::rest(&model);
        // Parent node 0 holds the mesh node 1
        pose.translations[0] = Vec3::new(1.0, 0.0, 0.0);

        let world = compute_world_transforms(&model, &pose);
        let origin = world[1].transform_point3(Vec3::ZERO);
        assert!((origin - Vec3::new(1.0, 2.0, 0.0)).length() < 1e-6);
    }

    #[test]
    fn test_posed_bounds_follow_node_transform() {
        let data = GlbBuilder::new()
            .cube(Vec3::new(-1.0, 0.0, -1.0), Vec3::new(1.0, 2.0, 1.0))
            .node_translation(Vec3::new(0.0, 5.0, 0.0))
            .build();
        let model = VrmModel::from_slice(&data).unwrap();
        let bounds = posed_bounds(&model, &Pose::rest(&model));
        assert!((bounds.min - Vec3::new(-1.0, 5.0, -1.0)).length() < 1e-6);
        assert!((bounds.max - Vec3::new(1.0, 7.0, 1.0)).length() < 1e-6);
    }

    #[test]
    fn test_model_without_meshes_has_empty_bounds() {
        let data = GlbBuilder::new().empty_node().build();
        let model = VrmModel::from_slice(&data).unwrap();
        assert!(posed_bounds(&model, &Pose::rest(&model)).is_empty());
    }

    #[test]
    fn test_blend_matrix_ignores_bad_influences() {
        let joints = [Mat4::from_translation(Vec3::X)];
        // Joint 7 does not exist; joint 0 carries the only usable weight
        let m = blend_matrix(&joints, [7, 0, 0, 0], [0.5, 0.5, 0.0, 0.0]);
        let p = m.transform_point3(Vec3::ZERO);
        assert!((p - Vec3::new(0.5, 0.0, 0.0)).length() < 1e-6);

        let m = blend_matrix(&joints, [0; 4], [0.0; 4]);
        assert_eq!(m, Mat4::IDENTITY);
    }
}
