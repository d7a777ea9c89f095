//! GLB/VRM model parsing using the `gltf` crate.
//!
//! Extracts meshes, the node hierarchy, skins, animation clips, and the VRM
//! metadata (spec version, title, humanoid bone map) from a glTF binary.

use glam::{Mat4, Quat, Vec3};
use std::collections::HashMap;

use crate::error::LoadError;

use super::animation::{read_animation_clips, AnimationClip};

/// First four bytes of every GLB file ("glTF", little endian)
const GLB_MAGIC: [u8; 4] = *b"glTF";

/// Which VRM extension the file carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VrmVersion {
    /// `VRMC_vrm` (VRM 1.0)
    V1,
    /// `VRM` (VRM 0.x)
    V0,
    /// Plain glTF binary without an avatar extension
    None,
}

/// Avatar metadata read from the VRM extension.
#[derive(Debug, Clone)]
pub struct VrmMeta {
    pub version: VrmVersion,
    /// `meta.name` (1.0) or `meta.title` (0.x)
    pub title: Option<String>,
    /// VRM humanoid bone name → node index
    pub bone_to_node: HashMap<String, usize>,
}

/// A loaded VRM model ready for posing and GPU upload.
pub struct VrmModel {
    pub meshes: Vec<MeshData>,
    /// Skeleton: node index → rest-pose local transform
    pub rest_translations: Vec<Vec3>,
    pub rest_rotations: Vec<Quat>,
    pub rest_scales: Vec<Vec3>,
    /// Parent map: child node → parent node (None if root)
    pub parents: Vec<Option<usize>>,
    pub node_count: usize,
    pub skins: Vec<SkinData>,
    /// Every node that draws a mesh
    pub instances: Vec<MeshInstance>,
    /// Animation clips in file order
    pub animations: Vec<AnimationClip>,
    pub meta: VrmMeta,
}

pub struct SkinData {
    pub joints: Vec<usize>,
    pub inverse_bind_matrices: Vec<Mat4>,
}

/// A mesh placed at a node, optionally deformed by a skin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeshInstance {
    pub node: usize,
    pub mesh: usize,
    pub skin: Option<usize>,
}

pub struct MeshData {
    pub name: Option<String>,
    pub primitives: Vec<PrimitiveData>,
}

/// Geometry for a single triangle-list primitive.
pub struct PrimitiveData {
    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub indices: Vec<u32>,
    /// Per-vertex joint indices (4 per vertex)
    pub joints: Vec<[u16; 4]>,
    /// Per-vertex joint weights (4 per vertex)
    pub weights: Vec<[f32; 4]>,
    /// Base color factor from material (RGBA)
    pub base_color: [f32; 4],
}

impl VrmModel {
    /// Parse a GLB/VRM file already read into memory.
    pub fn from_slice(data: &[u8]) -> Result<Self, LoadError> {
        if data.len() < 12 || data[0..4] != GLB_MAGIC {
            return Err(LoadError::UnsupportedFormat(
                "expected a binary glTF container (.vrm/.glb)".to_string(),
            ));
        }

        let gltf::Gltf { document, blob } =
            gltf::Gltf::from_slice(data).map_err(|e| LoadError::Parse(e.to_string()))?;
        let buffers = gltf::import_buffers(&document, None, blob)
            .map_err(|e| LoadError::Parse(format!("Failed to resolve buffers: {}", e)))?;
        let buf = &buffers;

        // Build parent map
        let node_count = document.nodes().count();
        let mut parents = vec![None; node_count];
        for node in document.nodes() {
            for child in node.children() {
                if let Some(other) = parents[child.index()].replace(node.index()) {
                    return Err(LoadError::Parse(format!(
                        "node {} has two parents ({} and {})",
                        child.index(),
                        other,
                        node.index()
                    )));
                }
            }
        }
        check_acyclic(&parents)?;

        // Parse rest-pose transforms
        let mut rest_translations = Vec::with_capacity(node_count);
        let mut rest_rotations = Vec::with_capacity(node_count);
        let mut rest_scales = Vec::with_capacity(node_count);
        for node in document.nodes() {
            let (t, r, s) = node.transform().decomposed();
            rest_translations.push(Vec3::from(t));
            rest_rotations.push(Quat::from_array(r));
            rest_scales.push(Vec3::from(s));
        }

        // Parse skins
        let mut skins = Vec::new();
        for skin in document.skins() {
            let joints: Vec<usize> = skin.joints().map(|j| j.index()).collect();
            let reader = skin.reader(|buffer| Some(&buf[buffer.index()]));
            let ibms: Vec<Mat4> = reader
                .read_inverse_bind_matrices()
                .map(|iter| iter.map(|m| Mat4::from_cols_array_2d(&m)).collect())
                .unwrap_or_else(|| vec![Mat4::IDENTITY; joints.len()]);

            skins.push(SkinData {
                joints,
                inverse_bind_matrices: ibms,
            });
        }

        // Mesh placements
        let instances: Vec<MeshInstance> = document
            .nodes()
            .filter_map(|node| {
                node.mesh().map(|mesh| MeshInstance {
                    node: node.index(),
                    mesh: mesh.index(),
                    skin: node.skin().map(|s| s.index()),
                })
            })
            .collect();

        // Parse meshes
        let mut meshes = Vec::new();
        for mesh in document.meshes() {
            let mut primitives = Vec::new();

            for prim in mesh.primitives() {
                if prim.mode() != gltf::mesh::Mode::Triangles {
                    tracing::debug!(
                        "Skipping non-triangle primitive {} of mesh {}",
                        prim.index(),
                        mesh.index()
                    );
                    continue;
                }

                let reader = prim.reader(|buffer| Some(&buf[buffer.index()]));

                // Positions
                let positions: Vec<Vec3> = reader
                    .read_positions()
                    .map(|iter| iter.map(Vec3::from).collect())
                    .unwrap_or_default();

                // Normals
                let normals: Vec<Vec3> = reader
                    .read_normals()
                    .map(|iter| iter.map(Vec3::from).collect())
                    .unwrap_or_else(|| vec![Vec3::Y; positions.len()]);

                // Indices; non-indexed primitives draw vertices in order
                let indices: Vec<u32> = reader
                    .read_indices()
                    .map(|iter| iter.into_u32().collect())
                    .unwrap_or_else(|| (0..positions.len() as u32).collect());

                // Joints
                let joints: Vec<[u16; 4]> = reader
                    .read_joints(0)
                    .map(|iter| iter.into_u16().collect())
                    .unwrap_or_else(|| vec![[0; 4]; positions.len()]);

                // Weights
                let weights: Vec<[f32; 4]> = reader
                    .read_weights(0)
                    .map(|iter| iter.into_f32().collect())
                    .unwrap_or_else(|| vec![[1.0, 0.0, 0.0, 0.0]; positions.len()]);

                let base_color = prim.material().pbr_metallic_roughness().base_color_factor();

                primitives.push(PrimitiveData {
                    positions,
                    normals,
                    indices,
                    joints,
                    weights,
                    base_color,
                });
            }

            meshes.push(MeshData {
                name: mesh.name().map(String::from),
                primitives,
            });
        }

        let animations = read_animation_clips(&document, buf);
        let meta = parse_vrm_meta(data)?;

        Ok(VrmModel {
            meshes,
            rest_translations,
            rest_rotations,
            rest_scales,
            parents,
            node_count,
            skins,
            instances,
            animations,
            meta,
        })
    }

    pub fn vertex_count(&self) -> usize {
        self.meshes
            .iter()
            .flat_map(|m| m.primitives.iter())
            .map(|p| p.positions.len())
            .sum()
    }

    pub fn primitive_count(&self) -> usize {
        self.meshes.iter().map(|m| m.primitives.len()).sum()
    }
}

/// Fail if following parent links from any node leads back to itself.
///
/// With at most one parent per node, a walk longer than the node count must
/// be looping.
fn check_acyclic(parents: &[Option<usize>]) -> Result<(), LoadError> {
    for start in 0..parents.len() {
        let mut current = start;
        let mut steps = 0;
        while let Some(parent) = parents[current] {
            steps += 1;
            if parent == start || steps > parents.len() {
                return Err(LoadError::Parse(format!(
                    "node hierarchy contains a cycle through node {}",
                    start
                )));
            }
            current = parent;
        }
    }
    Ok(())
}

/// Read the JSON chunk of a GLB file.
///
/// GLB format: 12-byte header (magic, version, length) followed by chunks of
/// (length, type, data). The first chunk is always JSON.
fn read_glb_json(data: &[u8]) -> Result<Option<serde_json::Value>, LoadError> {
    if data.len() < 20 {
        return Ok(None);
    }

    let json_length = u32::from_le_bytes([data[12], data[13], data[14], data[15]]) as usize;
    if data.len() < 20 + json_length {
        return Ok(None);
    }

    let json_data = &data[20..20 + json_length];
    serde_json::from_slice(json_data)
        .map(Some)
        .map_err(|e| LoadError::Parse(format!("JSON parse error: {}", e)))
}

/// Parse VRM metadata and the humanoid bone map from the raw GLB JSON.
fn parse_vrm_meta(data: &[u8]) -> Result<VrmMeta, LoadError> {
    let mut meta = VrmMeta {
        version: VrmVersion::None,
        title: None,
        bone_to_node: HashMap::new(),
    };

    let root = match read_glb_json(data)? {
        Some(root) => root,
        None => return Ok(meta),
    };
    let extensions = root.get("extensions");

    // VRMC_vrm (VRM 1.0)
    if let Some(vrmc) = extensions.and_then(|e| e.get("VRMC_vrm")) {
        meta.version = VrmVersion::V1;
        meta.title = vrmc
            .get("meta")
            .and_then(|m| m.get("name"))
            .and_then(|n| n.as_str())
            .map(String::from);

        if let Some(bones) = vrmc
            .get("humanoid")
            .and_then(|h| h.get("humanBones"))
            .and_then(|b| b.as_object())
        {
            for (bone_name, data) in bones {
                if let Some(node_idx) = data.get("node").and_then(|n| n.as_u64()) {
                    meta.bone_to_node.insert(bone_name.clone(), node_idx as usize);
                }
            }
        }
        return Ok(meta);
    }

    // VRM 0.x
    if let Some(vrm_ext) = extensions.and_then(|e| e.get("VRM")) {
        meta.version = VrmVersion::V0;
        meta.title = vrm_ext
            .get("meta")
            .and_then(|m| m.get("title"))
            .and_then(|n| n.as_str())
            .map(String::from);

        if let Some(bones) = vrm_ext
            .get("humanoid")
            .and_then(|h| h.get("humanBones"))
            .and_then(|b| b.as_array())
        {
            for bone in bones {
                if let (Some(name), Some(node)) = (
                    bone.get("bone").and_then(|b| b.as_str()),
                    bone.get("node").and_then(|n| n.as_u64()),
                ) {
                    meta.bone_to_node.insert(camel_to_lower(name), node as usize);
                }
            }
        }
    }

    Ok(meta)
}

/// Convert VRM 0.x bone names to VRM 1.0 form ("LeftUpperArm" → "leftUpperArm").
fn camel_to_lower(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::test_glb::GlbBuilder;

    #[test]
    fn test_rejects_non_glb() {
        let err = VrmModel::from_slice(b"{\"asset\":{\"version\":\"2.0\"}}")
            .err()
            .unwrap();
        assert!(matches!(err, LoadError::UnsupportedFormat(_)));
    }

    #[test]
    fn test_rejects_truncated_glb() {
        let mut data = GlbBuilder::new().cube(Vec3::ZERO, Vec3::ONE).build();
        data.truncate(30);
        assert!(VrmModel::from_slice(&data).is_err());
    }

    #[test]
    fn test_load_cube() {
        let data = GlbBuilder::new()
            .cube(Vec3::new(-1.0, 0.0, -1.0), Vec3::new(1.0, 2.0, 1.0))
            .build();
        let model = VrmModel::from_slice(&data).unwrap();

        assert_eq!(model.meshes.len(), 1);
        assert_eq!(model.instances.len(), 1);
        assert_eq!(model.vertex_count(), 8);
        assert_eq!(model.meshes[0].primitives[0].indices.len(), 36);
        assert_eq!(model.meta.version, VrmVersion::None);
        assert!(model.animations.is_empty());
    }

    #[test]
    fn test_vrm1_meta() {
        let data = GlbBuilder::new()
            .cube(Vec3::ZERO, Vec3::ONE)
            .vrm1("Aili", &[("hips", 0)])
            .build();
        let model = VrmModel::from_slice(&data).unwrap();
        assert_eq!(model.meta.version, VrmVersion::V1);
        assert_eq!(model.meta.title.as_deref(), Some("Aili"));
        assert_eq!(model.meta.bone_to_node.get("hips"), Some(&0));
    }

    #[test]
    fn test_vrm0_bone_names_lowercased() {
        let data = GlbBuilder::new()
            .cube(Vec3::ZERO, Vec3::ONE)
            .vrm0("Alicia", &[("LeftUpperArm", 0)])
            .build();
        let model = VrmModel::from_slice(&data).unwrap();
        assert_eq!(model.meta.version, VrmVersion::V0);
        assert_eq!(model.meta.title.as_deref(), Some("Alicia"));
        assert!(model.meta.bone_to_node.contains_key("leftUpperArm"));
    }

    #[test]
    fn test_rejects_cyclic_hierarchy() {
        // Root 0 owns mesh node 1, which lists the root back as its child
        let data = GlbBuilder::new()
            .cube(Vec3::ZERO, Vec3::ONE)
            .with_child(0)
            .build();
        let err = VrmModel::from_slice(&data).err().unwrap();
        assert!(matches!(err, LoadError::Parse(_)));
    }

    #[test]
    fn test_rejects_shared_child() {
        // Mesh node 1 is listed by both the root and node 2
        let data = GlbBuilder::new()
            .cube(Vec3::ZERO, Vec3::ONE)
            .empty_node()
            .with_child(1)
            .build();
        let err = VrmModel::from_slice(&data).err().unwrap();
        assert!(matches!(err, LoadError::Parse(_)));
    }

    #[test]
    fn test_check_acyclic() {
        assert!(check_acyclic(&[None, Some(0), Some(1)]).is_ok());
        assert!(check_acyclic(&[Some(2), Some(0), Some(1)]).is_err());
        assert!(check_acyclic(&[Some(0)]).is_err());
    }

    #[test]
    fn test_camel_to_lower() {
        assert_eq!(camel_to_lower("Head"), "head");
        assert_eq!(camel_to_lower("LeftUpperArm"), "leftUpperArm");
        assert_eq!(camel_to_lower(""), "");
    }
}
