//! wgpu-backed overlay surfaces.
//!
//! One device, queue and pipeline per process, created lazily by the first
//! probe and shared by every cell. Each cell owns its own offscreen
//! texture, destroyed as soon as the surface is dropped.

use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use image::RgbaImage;
use once_cell::sync::OnceCell;
use tracing::{debug, info, warn};
use wgpu::util::DeviceExt;

use crate::error::OverlayError;
use crate::overlay::lod::{OverlayFrame, PixelRect};
use crate::overlay::surface::{Capability, OverlaySurface, SurfaceFactory};

const SURFACE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

const OVERLAY_SHADER: &str = r#"
struct VertexOut {
    @builtin(position) position: vec4<f32>,
    @location(0) color: vec4<f32>,
};

@vertex
fn vs_main(@location(0) position: vec2<f32>, @location(1) color: vec4<f32>) -> VertexOut {
    var out: VertexOut;
    out.position = vec4<f32>(position, 0.0, 1.0);
    out.color = color;
    return out;
}

@fragment
fn fs_main(in: VertexOut) -> @location(0) vec4<f32> {
    return in.color;
}
"#;

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct OverlayVertex {
    pub position: [f32; 2],
    pub color: [f32; 4],
}

impl OverlayVertex {
    const ATTRIBUTES: [wgpu::VertexAttribute; 2] =
        wgpu::vertex_attr_array![0 => Float32x2, 1 => Float32x4];

    fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<OverlayVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBUTES,
        }
    }
}

/// Triangle-list vertices in clip space for every outline rectangle.
pub fn outline_vertices(frame: &OverlayFrame) -> Vec<OverlayVertex> {
    if frame.width <= 0.0 || frame.height <= 0.0 {
        return Vec::new();
    }
    let to_x = |px: f32| px / frame.width * 2.0 - 1.0;
    let to_y = |px: f32| 1.0 - px / frame.height * 2.0;

    let rects = frame.outline_rects();
    let mut vertices = Vec::with_capacity(rects.len() * 6);
    for PixelRect {
        x0,
        y0,
        x1,
        y1,
        color,
    } in rects
    {
        let color = color.to_f32();
        let (l, r, t, b) = (to_x(x0), to_x(x1), to_y(y0), to_y(y1));
        for position in [[l, t], [l, b], [r, t], [r, t], [l, b], [r, b]] {
            vertices.push(OverlayVertex { position, color });
        }
    }
    vertices
}

/// Device, queue and pipeline shared by all overlay surfaces.
pub struct GpuContext {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pipeline: wgpu::RenderPipeline,
    pub adapter_name: String,
    pub max_texture_dim: u32,
}

static SHARED: OnceCell<Option<Arc<GpuContext>>> = OnceCell::new();

impl GpuContext {
    /// The process-wide context. The probe runs on first call only; a
    /// failed probe is remembered too.
    pub fn shared() -> Option<Arc<GpuContext>> {
        SHARED
            .get_or_init(|| {
                let ctx = pollster::block_on(Self::new_async(false))
                    .or_else(|| {
                        debug!("Hardware adapter unavailable, trying software fallback");
                        pollster::block_on(Self::new_async(true))
                    })
                    .map(Arc::new);
                match &ctx {
                    Some(ctx) => info!(adapter = %ctx.adapter_name, "GPU overlay enabled"),
                    None => warn!("No GPU adapter, overlays disabled"),
                }
                ctx
            })
            .clone()
    }

    async fn new_async(force_fallback: bool) -> Option<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::LowPower,
                compatible_surface: None,
                force_fallback_adapter: force_fallback,
            })
            .await?;

        let adapter_name = adapter.get_info().name.clone();
        let limits = adapter.limits();

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("overlay device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits {
                        max_texture_dimension_2d: limits.max_texture_dimension_2d,
                        ..wgpu::Limits::downlevel_defaults()
                    },
                },
                None,
            )
            .await
            .ok()?;

        let pipeline = Self::create_pipeline(&device);

        Some(Self {
            device,
            queue,
            pipeline,
            adapter_name,
            max_texture_dim: limits.max_texture_dimension_2d,
        })
    }

    fn create_pipeline(device: &wgpu::Device) -> wgpu::RenderPipeline {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("overlay_shader"),
            source: wgpu::ShaderSource::Wgsl(OVERLAY_SHADER.into()),
        });
        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("overlay_layout"),
            bind_group_layouts: &[],
            push_constant_ranges: &[],
        });

        device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("overlay_pipeline"),
            layout: Some(&layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: "vs_main",
                buffers: &[OverlayVertex::layout()],
                compilation_options: Default::default(),
            },
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: "fs_main",
                targets: &[Some(wgpu::ColorTargetState {
                    format: SURFACE_FORMAT,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            multiview: None,
        })
    }

    pub fn supports_size(&self, width: u32, height: u32) -> bool {
        width <= self.max_texture_dim && height <= self.max_texture_dim
    }
}

fn aligned_bytes_per_row(width: u32) -> u32 {
    let unaligned = width * 4;
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    (unaligned + align - 1) / align * align
}

/// An offscreen RGBA texture owned by one cell.
pub struct GpuSurface {
    ctx: Arc<GpuContext>,
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    width: u32,
    height: u32,
}

impl GpuSurface {
    pub fn new(ctx: Arc<GpuContext>, width: u32, height: u32) -> Result<Self, OverlayError> {
        if width == 0 || height == 0 {
            return Err(OverlayError::EmptySurface);
        }
        if !ctx.supports_size(width, height) {
            return Err(OverlayError::SurfaceTooLarge {
                width,
                height,
                max: ctx.max_texture_dim,
            });
        }

        let texture = ctx.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("overlay_texture"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: SURFACE_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        Ok(Self {
            ctx,
            texture,
            view,
            width,
            height,
        })
    }

    pub fn texture(&self) -> &wgpu::Texture {
        &self.texture
    }
}

impl OverlaySurface for GpuSurface {
    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn draw(&mut self, frame: &OverlayFrame) -> Result<(), OverlayError> {
        let device = &self.ctx.device;
        let vertices = outline_vertices(frame);
        let vertex_buffer = (!vertices.is_empty()).then(|| {
            device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("overlay_vertices"),
                contents: bytemuck::cast_slice(&vertices),
                usage: wgpu::BufferUsages::VERTEX,
            })
        });

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("overlay_encoder"),
        });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("overlay_pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &self.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            if let Some(buffer) = &vertex_buffer {
                pass.set_pipeline(&self.ctx.pipeline);
                pass.set_vertex_buffer(0, buffer.slice(..));
                pass.draw(0..vertices.len() as u32, 0..1);
            }
        }
        self.ctx.queue.submit(std::iter::once(encoder.finish()));
        Ok(())
    }

    fn read_pixels(&self) -> Result<RgbaImage, OverlayError> {
        let device = &self.ctx.device;
        let bytes_per_row = aligned_bytes_per_row(self.width);
        let staging = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("overlay_readback"),
            size: bytes_per_row as u64 * self.height as u64,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("overlay_readback_encoder"),
        });
        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: &staging,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(bytes_per_row),
                    rows_per_image: Some(self.height),
                },
            },
            wgpu::Extent3d {
                width: self.width,
                height: self.height,
                depth_or_array_layers: 1,
            },
        );
        self.ctx.queue.submit(std::iter::once(encoder.finish()));

        let slice = staging.slice(..);
        let (tx, rx) = flume::bounded(1);
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        device.poll(wgpu::Maintain::Wait);
        match rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(OverlayError::Readback(e.to_string())),
            Err(e) => return Err(OverlayError::Readback(e.to_string())),
        }

        let row = (self.width * 4) as usize;
        let mut pixels = Vec::with_capacity(row * self.height as usize);
        {
            let mapped = slice.get_mapped_range();
            for y in 0..self.height as usize {
                let start = y * bytes_per_row as usize;
                pixels.extend_from_slice(&mapped[start..start + row]);
            }
        }
        staging.unmap();

        RgbaImage::from_raw(self.width, self.height, pixels)
            .ok_or_else(|| OverlayError::Readback("short pixel buffer".into()))
    }
}

impl Drop for GpuSurface {
    fn drop(&mut self) {
        self.texture.destroy();
    }
}

/// Hands out [`GpuSurface`]s on the shared context.
pub struct GpuSurfaceFactory {
    ctx: Option<Arc<GpuContext>>,
}

impl GpuSurfaceFactory {
    /// Probes the GPU (once per process).
    pub fn new() -> Self {
        Self {
            ctx: GpuContext::shared(),
        }
    }
}

impl Default for GpuSurfaceFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl SurfaceFactory for GpuSurfaceFactory {
    fn capability(&self) -> Capability {
        if self.ctx.is_some() {
            Capability::Gpu
        } else {
            Capability::Unavailable
        }
    }

    fn create(&self, width: u32, height: u32) -> Result<Box<dyn OverlaySurface>, OverlayError> {
        let ctx = self.ctx.clone().ok_or(OverlayError::GpuUnavailable)?;
        Ok(Box::new(GpuSurface::new(ctx, width, height)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LodSettings;
    use crate::models::{BoundingBox, BoxColor};

    #[test]
    fn test_vertices_in_clip_space() {
        let boxes = vec![BoundingBox::new(0.0, 0.0, 1.0, 1.0, BoxColor::DEFAULT)];
        let frame = OverlayFrame::build(&boxes, 100.0, 50.0, LodSettings::default());
        let vertices = outline_vertices(&frame);
        assert_eq!(vertices.len(), 4 * 6);

        // Top edge starts at the top-left corner of the surface.
        assert_eq!(vertices[0].position, [-1.0, 1.0]);
        assert!(vertices
            .iter()
            .all(|v| v.position.iter().all(|c| (-1.0..=1.0).contains(c))));
        assert_eq!(vertices[0].color, BoxColor::DEFAULT.to_f32());
    }

    #[test]
    fn test_empty_frame_has_no_vertices() {
        let frame = OverlayFrame::build(&[], 100.0, 50.0, LodSettings::default());
        assert!(outline_vertices(&frame).is_empty());
    }

    #[test]
    fn test_row_alignment() {
        assert_eq!(aligned_bytes_per_row(1), 256);
        assert_eq!(aligned_bytes_per_row(64), 256);
        assert_eq!(aligned_bytes_per_row(65), 512);
    }

    #[test]
    fn test_gpu_surface_when_available() {
        let factory = GpuSurfaceFactory::new();
        if !factory.capability().can_draw() {
            assert!(matches!(
                factory.create(10, 10),
                Err(OverlayError::GpuUnavailable)
            ));
            return;
        }

        let red = BoxColor::from_hex("#ff0000").unwrap();
        let boxes = vec![BoundingBox::new(0.0, 0.0, 1.0, 1.0, red)];
        let frame = OverlayFrame::build(&boxes, 64.0, 32.0, LodSettings::default());
        let mut surface = factory.create(64, 32).unwrap();
        surface.draw(&frame).unwrap();
        let img = surface.read_pixels().unwrap();
        assert_eq!(img.dimensions(), (64, 32));
        assert_eq!(img.get_pixel(0, 16).0, [255, 0, 0, 255]);
        assert_eq!(img.get_pixel(32, 16).0, [0, 0, 0, 0]);
    }
}
