//! wgpu rendering pipeline for the viewer.
//!
//! Renders the staged frame into an offscreen color + depth target, which the
//! egui paint callback then blits into the window. Geometry arrives already
//! posed on the CPU; only the root transform, camera and lights go through
//! uniforms.

use std::sync::{Mutex, MutexGuard};

use bytemuck::{Pod, Zeroable};
use eframe::wgpu;
use glam::{Mat4, Vec3};

const OFFSCREEN_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;
const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

/// Vertex layout matching the shader.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
}

impl Vertex {
    const ATTRIBS: [wgpu::VertexAttribute; 2] =
        wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x3];

    pub fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Self>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBS,
        }
    }
}

/// Uniform buffer layout matching the shader.
#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct Uniforms {
    pub view_proj: [[f32; 4]; 4],
    pub model: [[f32; 4]; 4],
    /// xyz: unit vector toward the light
    pub light_dir: [f32; 4],
    /// rgb: color * intensity
    pub light_color: [f32; 4],
    /// rgb: color * intensity
    pub ambient: [f32; 4],
    pub base_color: [f32; 4],
}

/// One primitive's posed vertices for this frame.
pub struct DrawData {
    pub vertices: Vec<Vertex>,
    pub base_color: [f32; 4],
}

/// Everything one frame needs, produced on the UI thread by the backend.
pub struct FrameData {
    pub draws: Vec<DrawData>,
    /// Index lists, one per draw. Present only when the geometry changed
    /// and GPU buffers must be rebuilt.
    pub indices: Option<Vec<Vec<u32>>>,
    pub view_proj: Mat4,
    pub model: Mat4,
    pub light_dir: Vec3,
    pub light_color: Vec3,
    pub ambient: Vec3,
}

struct DrawCall {
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    uniform_buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    num_indices: u32,
    base_color: [f32; 4],
}

struct OffscreenState {
    _color_texture: wgpu::Texture,
    color_view: wgpu::TextureView,
    _depth_texture: wgpu::Texture,
    depth_view: wgpu::TextureView,
    blit_bind_group: wgpu::BindGroup,
    size: [u32; 2],
}

/// Mutable GPU state, shared between the frame update and the paint callback.
struct GpuState {
    offscreen: OffscreenState,
    draw_calls: Vec<DrawCall>,
    pending: Option<FrameData>,
    released: bool,
}

pub struct VrmRenderer {
    scene_pipeline: wgpu::RenderPipeline,
    blit_pipeline: wgpu::RenderPipeline,
    scene_bind_group_layout: wgpu::BindGroupLayout,
    blit_bind_group_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    clear_color: wgpu::Color,
    state: Mutex<GpuState>,
}

impl VrmRenderer {
    /// Create pipelines and an offscreen target of `width` x `height`.
    ///
    /// With `transparent` set, the viewport clears to fully transparent black.
    pub fn new(
        device: &wgpu::Device,
        target_format: wgpu::TextureFormat,
        width: u32,
        height: u32,
        transparent: bool,
    ) -> Self {
        let scene_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("viewer_scene_shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shader.wgsl").into()),
        });
        let blit_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("viewer_blit_shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("blit.wgsl").into()),
        });

        let scene_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("viewer_scene_bgl"),
                entries: &[wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                }],
            });

        let scene_pipeline_layout =
            device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("viewer_scene_pl"),
                bind_group_layouts: &[&scene_bind_group_layout],
                push_constant_ranges: &[],
            });

        let scene_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("viewer_scene_pipeline"),
            layout: Some(&scene_pipeline_layout),
            vertex: wgpu::VertexState {
                module: &scene_shader,
                entry_point: Some("vs_main"),
                buffers: &[Vertex::layout()],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &scene_shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: OFFSCREEN_FORMAT,
                    blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None, // VRM materials are frequently double-sided
                ..Default::default()
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: Default::default(),
                bias: Default::default(),
            }),
            multisample: Default::default(),
            multiview: None,
            cache: None,
        });

        let blit_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("viewer_blit_bgl"),
                entries: &[
                    wgpu::BindGroupLayoutEntry {
                        binding: 0,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Texture {
                            sample_type: wgpu::TextureSampleType::Float { filterable: true },
                            view_dimension: wgpu::TextureViewDimension::D2,
                            multisampled: false,
                        },
                        count: None,
                    },
                    wgpu::BindGroupLayoutEntry {
                        binding: 1,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                        count: None,
                    },
                ],
            });

        let blit_pipeline_layout =
            device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("viewer_blit_pl"),
                bind_group_layouts: &[&blit_bind_group_layout],
                push_constant_ranges: &[],
            });

        let blit_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("viewer_blit_pipeline"),
            layout: Some(&blit_pipeline_layout),
            vertex: wgpu::VertexState {
                module: &blit_shader,
                entry_point: Some("vs_blit"),
                buffers: &[],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &blit_shader,
                entry_point: Some("fs_blit"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: target_format,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: Default::default(),
            multiview: None,
            cache: None,
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("viewer_sampler"),
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let offscreen = create_offscreen(
            device,
            &blit_bind_group_layout,
            &sampler,
            width.max(1),
            height.max(1),
        );

        let clear_color = if transparent {
            wgpu::Color::TRANSPARENT
        } else {
            wgpu::Color {
                r: 0.12,
                g: 0.12,
                b: 0.16,
                a: 1.0,
            }
        };

        Self {
            scene_pipeline,
            blit_pipeline,
            scene_bind_group_layout,
            blit_bind_group_layout,
            sampler,
            clear_color,
            state: Mutex::new(GpuState {
                offscreen,
                draw_calls: Vec::new(),
                pending: None,
                released: false,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, GpuState> {
        // A panic mid-frame leaves buffers in a usable state
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Queue a frame for the next `render_offscreen`. Replaces any frame that
    /// was staged but not yet drawn.
    pub fn stage(&self, frame: FrameData) {
        let mut state = self.lock();
        if state.released {
            return;
        }
        if frame.indices.is_none() {
            // Keep an unconsumed geometry rebuild
            if let Some(prev) = state.pending.take() {
                if let Some(indices) = prev.indices {
                    state.pending = Some(FrameData {
                        indices: Some(indices),
                        ..frame
                    });
                    return;
                }
            }
        }
        state.pending = Some(frame);
    }

    /// Drop all GPU buffers. Later frames are ignored.
    pub fn release(&self) {
        let mut state = self.lock();
        state.released = true;
        state.pending = None;
        state.draw_calls.clear();
        tracing::debug!("GPU resources released");
    }

    /// Resize the offscreen render target if the viewport size changed.
    pub fn resize(&self, device: &wgpu::Device, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }

        let mut state = self.lock();
        if state.offscreen.size == [width, height] {
            return;
        }
        state.offscreen = create_offscreen(
            device,
            &self.blit_bind_group_layout,
            &self.sampler,
            width,
            height,
        );
    }

    /// Upload the staged frame and render it offscreen. Call this in `prepare()`.
    pub fn render_offscreen(&self, device: &wgpu::Device, queue: &wgpu::Queue) {
        let mut state = self.lock();
        if state.released {
            return;
        }

        if let Some(frame) = state.pending.take() {
            self.upload(&mut state, device, queue, frame);
        }

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("viewer_offscreen_encoder"),
        });

        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("viewer_offscreen_pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &state.offscreen.color_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(self.clear_color),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &state.offscreen.depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                ..Default::default()
            });

            pass.set_pipeline(&self.scene_pipeline);

            for dc in &state.draw_calls {
                pass.set_bind_group(0, &dc.bind_group, &[]);
                pass.set_vertex_buffer(0, dc.vertex_buffer.slice(..));
                pass.set_index_buffer(dc.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
                pass.draw_indexed(0..dc.num_indices, 0, 0..1);
            }
        }

        // Drop lock before submit
        drop(state);
        queue.submit(std::iter::once(encoder.finish()));
    }

    fn upload(
        &self,
        state: &mut GpuState,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        frame: FrameData,
    ) {
        match &frame.indices {
            Some(indices) => {
                state.draw_calls = frame
                    .draws
                    .iter()
                    .zip(indices.iter())
                    .enumerate()
                    .map(|(i, (draw, idx))| self.create_draw_call(device, queue, i, draw, idx))
                    .collect();
                tracing::debug!("Uploaded {} draw calls", state.draw_calls.len());
            }
            None if frame.draws.len() == state.draw_calls.len() => {
                for (dc, draw) in state.draw_calls.iter().zip(frame.draws.iter()) {
                    queue.write_buffer(&dc.vertex_buffer, 0, bytemuck::cast_slice(&draw.vertices));
                }
            }
            None => {
                tracing::debug!(
                    "Skipping vertex update: {} draws staged, {} on GPU",
                    frame.draws.len(),
                    state.draw_calls.len()
                );
            }
        }

        for dc in &state.draw_calls {
            let uniforms = Uniforms {
                view_proj: frame.view_proj.to_cols_array_2d(),
                model: frame.model.to_cols_array_2d(),
                light_dir: frame.light_dir.extend(0.0).to_array(),
                light_color: frame.light_color.extend(1.0).to_array(),
                ambient: frame.ambient.extend(1.0).to_array(),
                base_color: dc.base_color,
            };
            queue.write_buffer(&dc.uniform_buffer, 0, bytemuck::bytes_of(&uniforms));
        }
    }

    fn create_draw_call(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        i: usize,
        draw: &DrawData,
        indices: &[u32],
    ) -> DrawCall {
        let vertex_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(&format!("viewer_vb_{}", i)),
            size: std::mem::size_of_val(draw.vertices.as_slice()) as u64,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        queue.write_buffer(&vertex_buffer, 0, bytemuck::cast_slice(&draw.vertices));

        let index_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(&format!("viewer_ib_{}", i)),
            size: std::mem::size_of_val(indices) as u64,
            usage: wgpu::BufferUsages::INDEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        queue.write_buffer(&index_buffer, 0, bytemuck::cast_slice(indices));

        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(&format!("viewer_ub_{}", i)),
            size: std::mem::size_of::<Uniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&format!("viewer_bg_{}", i)),
            layout: &self.scene_bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
        });

        DrawCall {
            vertex_buffer,
            index_buffer,
            uniform_buffer,
            bind_group,
            num_indices: indices.len() as u32,
            base_color: draw.base_color,
        }
    }

    /// Blit the offscreen texture to the current render pass. Call this in `paint()`.
    pub fn blit(&self, render_pass: &mut wgpu::RenderPass<'_>) {
        let state = self.lock();
        render_pass.set_pipeline(&self.blit_pipeline);
        render_pass.set_bind_group(0, Some(&state.offscreen.blit_bind_group), &[]);
        drop(state);
        render_pass.draw(0..3, 0..1); // fullscreen triangle
    }
}

fn create_offscreen(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    sampler: &wgpu::Sampler,
    width: u32,
    height: u32,
) -> OffscreenState {
    let extent = wgpu::Extent3d {
        width,
        height,
        depth_or_array_layers: 1,
    };

    let color_texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("viewer_offscreen_color"),
        size: extent,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: OFFSCREEN_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
        view_formats: &[],
    });
    let color_view = color_texture.create_view(&Default::default());

    let depth_texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("viewer_offscreen_depth"),
        size: extent,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: DEPTH_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    let depth_view = depth_texture.create_view(&Default::default());

    let blit_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("viewer_blit_bg"),
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(&color_view),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::Sampler(sampler),
            },
        ],
    });

    OffscreenState {
        _color_texture: color_texture,
        color_view,
        _depth_texture: depth_texture,
        depth_view,
        blit_bind_group,
        size: [width, height],
    }
}
