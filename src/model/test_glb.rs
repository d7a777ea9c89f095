//! In-memory GLB fixtures for tests.
//!
//! Every fixture has a root node 0; each added node becomes its child.

use glam::Vec3;
use serde_json::{json, Value};

const COMPONENT_FLOAT: u32 = 5126;
const COMPONENT_U32: u32 = 5125;

pub struct GlbBuilder {
    bin: Vec<u8>,
    buffer_views: Vec<Value>,
    accessors: Vec<Value>,
    meshes: Vec<Value>,
    nodes: Vec<Value>,
    animations: Vec<Value>,
    extensions: Option<(&'static str, Value)>,
}

impl GlbBuilder {
    pub fn new() -> Self {
        Self {
            bin: Vec::new(),
            buffer_views: Vec::new(),
            accessors: Vec::new(),
            meshes: Vec::new(),
            nodes: vec![json!({ "name": "root" })],
            animations: Vec::new(),
            extensions: None,
        }
    }

    fn push_view(&mut self, bytes: &[u8]) -> usize {
        while self.bin.len() % 4 != 0 {
            self.bin.push(0);
        }
        let offset = self.bin.len();
        self.bin.extend_from_slice(bytes);
        self.buffer_views.push(json!({
            "buffer": 0,
            "byteOffset": offset,
            "byteLength": bytes.len(),
        }));
        self.buffer_views.len() - 1
    }

    fn push_vec3s(&mut self, values: &[Vec3]) -> usize {
        let bytes: Vec<u8> = values
            .iter()
            .flat_map(|v| v.to_array())
            .flat_map(f32::to_le_bytes)
            .collect();
        let view = self.push_view(&bytes);
        let (min, max) = values.iter().fold(
            (Vec3::splat(f32::INFINITY), Vec3::splat(f32::NEG_INFINITY)),
            |(lo, hi), v| (lo.min(*v), hi.max(*v)),
        );
        self.accessors.push(json!({
            "bufferView": view,
            "componentType": COMPONENT_FLOAT,
            "count": values.len(),
            "type": "VEC3",
            "min": min.to_array(),
            "max": max.to_array(),
        }));
        self.accessors.len() - 1
    }

    fn push_scalars(&mut self, values: &[f32]) -> usize {
        let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        let view = self.push_view(&bytes);
        let min = values.iter().copied().fold(f32::INFINITY, f32::min);
        let max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        self.accessors.push(json!({
            "bufferView": view,
            "componentType": COMPONENT_FLOAT,
            "count": values.len(),
            "type": "SCALAR",
            "min": [min],
            "max": [max],
        }));
        self.accessors.len() - 1
    }

    fn push_indices(&mut self, values: &[u32]) -> usize {
        let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        let view = self.push_view(&bytes);
        self.accessors.push(json!({
            "bufferView": view,
            "componentType": COMPONENT_U32,
            "count": values.len(),
            "type": "SCALAR",
        }));
        self.accessors.len() - 1
    }

    fn push_mesh_node(&mut self, positions: &[Vec3], indices: Option<&[u32]>) -> usize {
        let position = self.push_vec3s(positions);
        let mut primitive = json!({ "attributes": { "POSITION": position } });
        if let Some(indices) = indices {
            primitive["indices"] = json!(self.push_indices(indices));
        }
        self.meshes.push(json!({ "primitives": [primitive] }));
        self.nodes.push(json!({ "mesh": self.meshes.len() - 1 }));
        self.nodes.len() - 1
    }

    /// Axis-aligned box mesh spanning `min..max`: 8 vertices, 12 triangles.
    pub fn cube(mut self, min: Vec3, max: Vec3) -> Self {
        let positions: Vec<Vec3> = (0..8)
            .map(|i| {
                Vec3::new(
                    if i & 1 == 0 { min.x } else { max.x },
                    if i & 2 == 0 { min.y } else { max.y },
                    if i & 4 == 0 { min.z } else { max.z },
                )
            })
            .collect();
        let indices: [u32; 36] = [
            0, 2, 1, 1, 2, 3, // -z
            4, 5, 6, 5, 7, 6, // +z
            0, 1, 4, 1, 5, 4, // -y
            2, 6, 3, 3, 6, 7, // +y
            0, 4, 2, 2, 4, 6, // -x
            1, 3, 5, 3, 7, 5, // +x
        ];
        self.push_mesh_node(&positions, Some(&indices));
        self
    }

    /// Non-indexed triangle whose three vertices all sit at `p`.
    pub fn collapsed_triangle(mut self, p: Vec3) -> Self {
        self.push_mesh_node(&[p, p, p], None);
        self
    }

    /// A node without a mesh.
    pub fn empty_node(mut self) -> Self {
        self.nodes.push(json!({ "name": "empty" }));
        self
    }

    /// Set the translation of the most recently added node.
    pub fn node_translation(mut self, t: Vec3) -> Self {
        if let Some(node) = self.nodes.last_mut() {
            node["translation"] = json!(t.to_array());
        }
        self
    }

    /// List `child` among the children of the most recently added node.
    pub fn with_child(mut self, child: usize) -> Self {
        if let Some(node) = self.nodes.last_mut() {
            node["children"] = json!([child]);
        }
        self
    }

    /// Linear translation clip on a single node.
    pub fn clip(mut self, name: &str, node: usize, times: &[f32], translations: &[Vec3]) -> Self {
        let input = self.push_scalars(times);
        let output = self.push_vec3s(translations);
        self.animations.push(json!({
            "name": name,
            "channels": [{ "sampler": 0, "target": { "node": node, "path": "translation" } }],
            "samplers": [{ "input": input, "output": output, "interpolation": "LINEAR" }],
        }));
        self
    }

    pub fn vrm1(mut self, name: &str, bones: &[(&str, usize)]) -> Self {
        let human_bones: serde_json::Map<String, Value> = bones
            .iter()
            .map(|(bone, node)| (bone.to_string(), json!({ "node": node })))
            .collect();
        self.extensions = Some((
            "VRMC_vrm",
            json!({
                "specVersion": "1.0",
                "meta": { "name": name },
                "humanoid": { "humanBones": human_bones },
            }),
        ));
        self
    }

    pub fn vrm0(mut self, title: &str, bones: &[(&str, usize)]) -> Self {
        let human_bones: Vec<Value> = bones
            .iter()
            .map(|(bone, node)| json!({ "bone": bone, "node": node }))
            .collect();
        self.extensions = Some((
            "VRM",
            json!({
                "meta": { "title": title },
                "humanoid": { "humanBones": human_bones },
            }),
        ));
        self
    }

    pub fn build(mut self) -> Vec<u8> {
        let children: Vec<usize> = (1..self.nodes.len()).collect();
        if !children.is_empty() {
            self.nodes[0]["children"] = json!(children);
        }

        let mut root = json!({
            "asset": { "version": "2.0" },
            "scene": 0,
            "scenes": [{ "nodes": [0] }],
            "nodes": self.nodes,
        });
        if !self.bin.is_empty() {
            root["buffers"] = json!([{ "byteLength": self.bin.len() }]);
            root["bufferViews"] = json!(self.buffer_views);
            root["accessors"] = json!(self.accessors);
        }
        if !self.meshes.is_empty() {
            root["meshes"] = json!(self.meshes);
        }
        if !self.animations.is_empty() {
            root["animations"] = json!(self.animations);
        }
        if let Some((name, ext)) = self.extensions {
            root["extensionsUsed"] = json!([name]);
            let mut extensions = serde_json::Map::new();
            extensions.insert(name.to_string(), ext);
            root["extensions"] = Value::Object(extensions);
        }

        let mut json_bytes = serde_json::to_vec(&root).unwrap_or_default();
        while json_bytes.len() % 4 != 0 {
            json_bytes.push(b' ');
        }
        let mut bin = self.bin;
        while bin.len() % 4 != 0 {
            bin.push(0);
        }

        let mut total = 12 + 8 + json_bytes.len();
        if !bin.is_empty() {
            total += 8 + bin.len();
        }

        let mut out = Vec::with_capacity(total);
        out.extend_from_slice(b"glTF");
        out.extend_from_slice(&2u32.to_le_bytes());
        out.extend_from_slice(&(total as u32).to_le_bytes());
        out.extend_from_slice(&(json_bytes.len() as u32).to_le_bytes());
        out.extend_from_slice(b"JSON");
        out.extend_from_slice(&json_bytes);
        if !bin.is_empty() {
            out.extend_from_slice(&(bin.len() as u32).to_le_bytes());
            out.extend_from_slice(b"BIN\0");
            out.extend_from_slice(&bin);
        }
        out
    }
}
