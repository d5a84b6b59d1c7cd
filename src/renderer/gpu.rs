use std::sync::Arc;

use anyhow::Context;

use crate::math::color::Rgb;
use crate::math::engine::MeshUpload;
use crate::math::surface::{MAX_SURFACE_INDICES, MAX_SURFACE_VERTICES};
use crate::renderer::camera::{Camera, CameraUniform};

const MAX_LINE_VERTICES: usize = 2000;

pub const BACKGROUND: u32 = 0x0f172a;

pub const GRID_SIZE: f32 = 20.0;
pub const GRID_DIVISIONS: u32 = 20;
pub const GRID_HEIGHT: f32 = -5.0;
const GRID_CENTER_COLOR: u32 = 0x6366f1;
const GRID_COLOR: u32 = 0x334155;

pub const AXIS_LENGTH: f32 = 8.0;
const AXIS_COLORS: [u32; 3] = [0xef4444, 0x22c55e, 0x3b82f6];

const FLOAT3: u64 = 3 * std::mem::size_of::<f32>() as u64;

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct LineVertex {
    pub position: [f32; 3],
    pub color: [f32; 3],
}

/// GPU copies of the live surface. Sized once for the largest grid the
/// pipeline accepts; only the buffers named by an upload are rewritten.
pub struct SurfaceBuffers {
    pub position_buffer: wgpu::Buffer,
    pub normal_buffer: wgpu::Buffer,
    pub color_buffer: wgpu::Buffer,
    pub index_buffer: wgpu::Buffer,
    pub vertex_count: u32,
    pub index_count: u32,

    pub z_min: f32,
    pub z_max: f32,
}

fn vertex_buffer(device: &wgpu::Device, label: &str, size: u64) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(label),
        size,
        usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}

impl SurfaceBuffers {
    pub fn new(device: &wgpu::Device) -> Self {
        let float3_size = MAX_SURFACE_VERTICES as u64 * FLOAT3;

        let index_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Surface Index Buffer"),
            size: (MAX_SURFACE_INDICES * 4) as u64,
            usage: wgpu::BufferUsages::INDEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        Self {
            position_buffer: vertex_buffer(device, "Surface Position Buffer", float3_size),
            normal_buffer: vertex_buffer(device, "Surface Normal Buffer", float3_size),
            color_buffer: vertex_buffer(device, "Surface Color Buffer", float3_size),
            index_buffer,
            vertex_count: 0,
            index_count: 0,
            z_min: 0.0,
            z_max: 0.0,
        }
    }

    pub fn upload(&mut self, queue: &wgpu::Queue, upload: &MeshUpload) {
        if upload.vertex_count > MAX_SURFACE_VERTICES || upload.index_count > MAX_SURFACE_INDICES {
            log::error!(
                "surface of {} vertices / {} indices exceeds the GPU buffers, skipped",
                upload.vertex_count,
                upload.index_count
            );
            return;
        }

        let write = |buffer: &wgpu::Buffer, data: &Option<Vec<f32>>| {
            if let Some(data) = data {
                queue.write_buffer(buffer, 0, bytemuck::cast_slice(data.as_slice()));
            }
        };
        write(&self.position_buffer, &upload.vertices);
        write(&self.normal_buffer, &upload.normals);
        write(&self.color_buffer, &upload.colors);
        if let Some(indices) = &upload.indices {
            queue.write_buffer(&self.index_buffer, 0, bytemuck::cast_slice(indices.as_slice()));
        }

        self.vertex_count = upload.vertex_count as u32;
        self.index_count = upload.index_count as u32;
        self.z_min = upload.z_min;
        self.z_max = upload.z_max;
    }

    /// Forget the current surface. The buffers stay allocated for the next one.
    pub fn clear(&mut self) {
        self.vertex_count = 0;
        self.index_count = 0;
    }
}

pub struct LineBuffers {
    pub vertex_buffer: wgpu::Buffer,
    pub vertex_count: u32,
}

impl LineBuffers {
    pub fn new(device: &wgpu::Device) -> Self {
        Self {
            vertex_buffer: vertex_buffer(
                device,
                "Line Vertex Buffer",
                (MAX_LINE_VERTICES * std::mem::size_of::<LineVertex>()) as u64,
            ),
            vertex_count: 0,
        }
    }

    pub fn upload(&mut self, queue: &wgpu::Queue, vertices: &[LineVertex]) {
        let count = vertices.len().min(MAX_LINE_VERTICES);
        queue.write_buffer(
            &self.vertex_buffer,
            0,
            bytemuck::cast_slice(&vertices[..count]),
        );
        self.vertex_count = count as u32;
    }
}

pub struct GpuState {
    pub surface: wgpu::Surface<'static>,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub config: wgpu::SurfaceConfiguration,
    pub size: winit::dpi::PhysicalSize<u32>,

    pub pipeline_surface: wgpu::RenderPipeline,
    pub pipeline_lines: wgpu::RenderPipeline,

    pub camera_buffer: wgpu::Buffer,
    pub camera_bind_group: wgpu::BindGroup,

    pub surface_buffers: SurfaceBuffers,
    pub line_buffers: LineBuffers,

    pub depth_texture: wgpu::TextureView,
}

const POSITION_ATTRIBUTES: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![0 => Float32x3];
const NORMAL_ATTRIBUTES: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![1 => Float32x3];
const COLOR_ATTRIBUTES: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![2 => Float32x3];

/// One tightly packed `vec3<f32>` stream per buffer.
fn float3_layout(attributes: &'static [wgpu::VertexAttribute]) -> wgpu::VertexBufferLayout<'static> {
    wgpu::VertexBufferLayout {
        array_stride: FLOAT3,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes,
    }
}

fn line_vertex_layout() -> wgpu::VertexBufferLayout<'static> {
    const ATTRIBUTES: [wgpu::VertexAttribute; 2] =
        wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x3];
    wgpu::VertexBufferLayout {
        array_stride: std::mem::size_of::<LineVertex>() as u64,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &ATTRIBUTES,
    }
}

fn depth_state() -> wgpu::DepthStencilState {
    wgpu::DepthStencilState {
        format: wgpu::TextureFormat::Depth32Float,
        depth_write_enabled: true,
        depth_compare: wgpu::CompareFunction::Less,
        stencil: wgpu::StencilState::default(),
        bias: wgpu::DepthBiasState::default(),
    }
}

impl GpuState {
    pub async fn new(window: Arc<winit::window::Window>, vsync: bool) -> anyhow::Result<Self> {
        let size = window.inner_size();

        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let surface = instance
            .create_surface(window)
            .context("Failed to create window surface")?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .context("No GPU adapter can present to this window")?;

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: None,
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                    memory_hints: wgpu::MemoryHints::Performance,
                },
                None,
            )
            .await
            .context("Failed to open GPU device")?;

        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .or(surface_caps.formats.first())
            .copied()
            .context("Window surface reports no texture formats")?;

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: present_mode(vsync),
            alpha_mode: surface_caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        log::info!(
            "GPU: {} ({:?}), surface format {:?}",
            adapter.get_info().name,
            adapter.get_info().backend,
            surface_format
        );

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders.wgsl").into()),
        });

        let camera_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Camera Buffer"),
            size: std::mem::size_of::<CameraUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let camera_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Camera Bind Group Layout"),
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

        let camera_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Camera Bind Group"),
            layout: &camera_bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: camera_buffer.as_entire_binding(),
            }],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Scene Pipeline Layout"),
            bind_group_layouts: &[&camera_bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline_surface = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Surface Render Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_surface"),
                buffers: &[
                    float3_layout(&POSITION_ATTRIBUTES),
                    float3_layout(&NORMAL_ATTRIBUTES),
                    float3_layout(&COLOR_ATTRIBUTES),
                ],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_surface"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: config.format,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                // both faces are lit
                cull_mode: None,
                ..Default::default()
            },
            depth_stencil: Some(depth_state()),
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        let pipeline_lines = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Line Render Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_line"),
                buffers: &[line_vertex_layout()],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_line"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: config.format,
                    blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::LineList,
                ..Default::default()
            },
            depth_stencil: Some(depth_state()),
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        let surface_buffers = SurfaceBuffers::new(&device);
        let mut line_buffers = LineBuffers::new(&device);
        line_buffers.upload(&queue, &generate_scene_lines());

        let depth_texture = Self::create_depth_texture(&device, &config);

        Ok(Self {
            surface,
            device,
            queue,
            config,
            size,
            pipeline_surface,
            pipeline_lines,
            camera_buffer,
            camera_bind_group,
            surface_buffers,
            line_buffers,
            depth_texture,
        })
    }

    fn create_depth_texture(
        device: &wgpu::Device,
        config: &wgpu::SurfaceConfiguration,
    ) -> wgpu::TextureView {
        let size = wgpu::Extent3d {
            width: config.width.max(1),
            height: config.height.max(1),
            depth_or_array_layers: 1,
        };

        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Depth Texture"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Depth32Float,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });

        texture.create_view(&wgpu::TextureViewDescriptor::default())
    }

    pub fn resize(&mut self, new_size: winit::dpi::PhysicalSize<u32>) {
        if new_size.width > 0 && new_size.height > 0 {
            self.size = new_size;
            self.config.width = new_size.width;
            self.config.height = new_size.height;
            self.surface.configure(&self.device, &self.config);
            self.depth_texture = Self::create_depth_texture(&self.device, &self.config);
        }
    }

    pub fn set_vsync(&mut self, enabled: bool) {
        self.config.present_mode = present_mode(enabled);
        self.surface.configure(&self.device, &self.config);
    }

    pub fn update_camera(&self, camera: &Camera) {
        let uniform = CameraUniform::from_camera(camera);
        self.queue
            .write_buffer(&self.camera_buffer, 0, bytemuck::cast_slice(&[uniform]));
    }

    pub fn upload_surface(&mut self, upload: &MeshUpload) {
        self.surface_buffers.upload(&self.queue, upload);
    }

    pub fn clear_surface(&mut self) {
        self.surface_buffers.clear();
    }

    /// Clears to the background, then draws the grid, the axes and the
    /// surface in one depth-tested pass.
    pub fn render_scene(&self, view: &wgpu::TextureView, encoder: &mut wgpu::CommandEncoder) {
        let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Scene Render Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(background_color()),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &self.depth_texture,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        render_pass.set_bind_group(0, &self.camera_bind_group, &[]);

        render_pass.set_pipeline(&self.pipeline_lines);
        render_pass.set_vertex_buffer(0, self.line_buffers.vertex_buffer.slice(..));
        render_pass.draw(0..self.line_buffers.vertex_count, 0..1);

        let buffers = &self.surface_buffers;
        if buffers.index_count > 0 {
            render_pass.set_pipeline(&self.pipeline_surface);
            render_pass.set_vertex_buffer(0, buffers.position_buffer.slice(..));
            render_pass.set_vertex_buffer(1, buffers.normal_buffer.slice(..));
            render_pass.set_vertex_buffer(2, buffers.color_buffer.slice(..));
            render_pass.set_index_buffer(buffers.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
            render_pass.draw_indexed(0..buffers.index_count, 0, 0..1);
        }
    }
}

fn present_mode(vsync: bool) -> wgpu::PresentMode {
    if vsync {
        wgpu::PresentMode::AutoVsync
    } else {
        wgpu::PresentMode::AutoNoVsync
    }
}

fn srgb_to_linear(c: f32) -> f64 {
    let c = c as f64;
    if c <= 0.04045 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

/// Clear colors are given in linear space.
fn background_color() -> wgpu::Color {
    let bg = Rgb::from_hex(BACKGROUND);
    wgpu::Color {
        r: srgb_to_linear(bg.r),
        g: srgb_to_linear(bg.g),
        b: srgb_to_linear(bg.b),
        a: 1.0,
    }
}

/// Ground grid of `GRID_DIVISIONS`² cells spanning `GRID_SIZE` at
/// `GRID_HEIGHT`, followed by the positive X, Y and Z axes. Colors are sRGB.
pub fn generate_scene_lines() -> Vec<LineVertex> {
    let line = |from: [f32; 3], to: [f32; 3], color: [f32; 3]| {
        [
            LineVertex { position: from, color },
            LineVertex { position: to, color },
        ]
    };

    let mut vertices = Vec::new();
    let half = GRID_SIZE / 2.0;
    let step = GRID_SIZE / GRID_DIVISIONS as f32;

    for i in 0..=GRID_DIVISIONS {
        let pos = -half + i as f32 * step;
        let color = if i * 2 == GRID_DIVISIONS {
            Rgb::from_hex(GRID_CENTER_COLOR)
        } else {
            Rgb::from_hex(GRID_COLOR)
        }
        .to_array();
        vertices.extend(line([-half, GRID_HEIGHT, pos], [half, GRID_HEIGHT, pos], color));
        vertices.extend(line([pos, GRID_HEIGHT, -half], [pos, GRID_HEIGHT, half], color));
    }

    for (axis, hex) in AXIS_COLORS.into_iter().enumerate() {
        let mut tip = [0.0; 3];
        tip[axis] = AXIS_LENGTH;
        vertices.extend(line([0.0; 3], tip, Rgb::from_hex(hex).to_array()));
    }

    vertices
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn scene_lines_fit_the_line_buffer() {
        let lines = generate_scene_lines();
        let grid = (GRID_DIVISIONS as usize + 1) * 2 * 2;
        assert_eq!(lines.len(), grid + 6);
        assert!(lines.len() <= MAX_LINE_VERTICES);
        assert_eq!(lines.len() % 2, 0);
    }

    #[test]
    fn grid_lies_on_its_plane_and_axes_start_at_the_origin() {
        let lines = generate_scene_lines();
        let (grid, axes) = lines.split_at(lines.len() - 6);
        assert!(grid.iter().all(|v| v.position[1] == GRID_HEIGHT));
        assert!(grid.iter().all(|v| v.position[0].abs() <= GRID_SIZE / 2.0));

        assert_eq!(axes[0].position, [0.0; 3]);
        assert_eq!(axes[1].position, [AXIS_LENGTH, 0.0, 0.0]);
        assert_eq!(axes[3].position, [0.0, AXIS_LENGTH, 0.0]);
        assert_eq!(axes[5].position, [0.0, 0.0, AXIS_LENGTH]);
    }

    #[test]
    fn center_lines_are_highlighted() {
        let lines = generate_scene_lines();
        let center = Rgb::from_hex(GRID_CENTER_COLOR).to_array();
        let highlighted = lines.iter().filter(|v| v.color == center).count();
        // one line along each axis through the middle of the grid
        assert_eq!(highlighted, 4);
    }

    #[test]
    fn background_is_linearized() {
        let bg = background_color();
        assert!(bg.r < Rgb::from_hex(BACKGROUND).r as f64);
        assert_eq!(srgb_to_linear(0.0), 0.0);
        assert!((srgb_to_linear(1.0) - 1.0).abs() < 1e-9);
    }
}
