//! Presents RGBA frames in a window with `wgpu`.

use std::rc::Rc;

use anyhow::{anyhow, Context};
use wgpu::*;
use winit::{dpi::PhysicalSize, event_loop::EventLoopWindowTarget, window::WindowBuilder};

use crate::image::Resolution;

const BACKGROUND: Color = Color::BLACK;
const TEXTURE_FORMAT: TextureFormat = TextureFormat::Rgba8UnormSrgb;

/// The graphics device shared by all windows.
pub struct Gpu {
    instance: Instance,
    adapter: Adapter,
    device: Device,
    queue: Queue,
}

impl Gpu {
    pub async fn open() -> anyhow::Result<Self> {
        // The OpenGL backend is unreliable, so stick to the primary ones.
        let backends = Backends::PRIMARY;
        let instance = Instance::new(InstanceDescriptor {
            backends,
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&Default::default())
            .await
            .ok_or_else(|| anyhow!("no graphics adapter found"))?;
        let info = adapter.get_info();
        log::info!("using {:?} adapter '{}'", info.backend, info.name);

        let (device, queue) = adapter
            .request_device(
                &DeviceDescriptor {
                    label: None,
                    features: Features::empty(),
                    // Webcam frames can exceed the downlevel texture size limit.
                    limits: Limits::downlevel_defaults().using_resolution(adapter.limits()),
                },
                None,
            )
            .await?;

        Ok(Self {
            instance,
            adapter,
            device,
            queue,
        })
    }
}

pub struct Window {
    pub(crate) win: Rc<winit::window::Window>,
    resolution: Resolution,
}

impl Window {
    pub fn open<T>(
        event_loop: &EventLoopWindowTarget<T>,
        title: &str,
        resolution: Resolution,
    ) -> anyhow::Result<Self> {
        let win = WindowBuilder::new()
            .with_resizable(false)
            .with_inner_size(PhysicalSize::new(resolution.width(), resolution.height()))
            .with_title(title)
            .build(event_loop)?;
        Ok(Self {
            win: Rc::new(win),
            resolution,
        })
    }
}

struct FrameTexture {
    inner: Texture,
    size: Extent3d,
}

impl FrameTexture {
    fn new(gpu: &Gpu, size: Extent3d) -> Self {
        let inner = gpu.device.create_texture(&TextureDescriptor {
            label: Some("frame"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: TextureDimension::D2,
            format: TEXTURE_FORMAT,
            usage: TextureUsages::TEXTURE_BINDING | TextureUsages::COPY_DST,
            view_formats: &[],
        });
        Self { inner, size }
    }

    fn write(&self, gpu: &Gpu, data: &[u8]) {
        gpu.queue.write_texture(
            ImageCopyTexture {
                texture: &self.inner,
                mip_level: 0,
                origin: Origin3d::default(),
                aspect: TextureAspect::All,
            },
            data,
            ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(self.size.width * 4),
                rows_per_image: None,
            },
            self.size,
        );
    }
}

pub struct Renderer {
    gpu: Rc<Gpu>,
    surface: Surface,
    surface_format: TextureFormat,
    pipeline: RenderPipeline,
    bind_group_layout: BindGroupLayout,
    sampler: Sampler,
    texture: FrameTexture,
    bind_group: BindGroup,

    /// Surface must be destroyed before `Window`.
    window: Window,
}

impl Renderer {
    pub fn new(window: Window, gpu: Rc<Gpu>) -> anyhow::Result<Self> {
        // Safety: the surface is dropped before the window it was created for.
        let surface = unsafe { gpu.instance.create_surface(&*window.win)? };
        let surface_format = *surface
            .get_capabilities(&gpu.adapter)
            .formats
            .first()
            .context("adapter cannot render to window surface")?;

        let shader = gpu.device.create_shader_module(ShaderModuleDescriptor {
            label: Some("frame shader"),
            source: ShaderSource::Wgsl(include_str!("shader.wgsl").into()),
        });
        let bind_group_layout = gpu
            .device
            .create_bind_group_layout(&BindGroupLayoutDescriptor {
                label: Some("frame"),
                entries: &[
                    BindGroupLayoutEntry {
                        binding: 0,
                        visibility: ShaderStages::FRAGMENT,
                        ty: BindingType::Texture {
                            sample_type: TextureSampleType::Float { filterable: false },
                            view_dimension: TextureViewDimension::D2,
                            multisampled: false,
                        },
                        count: None,
                    },
                    BindGroupLayoutEntry {
                        binding: 1,
                        visibility: ShaderStages::FRAGMENT,
                        ty: BindingType::Sampler(SamplerBindingType::NonFiltering),
                        count: None,
                    },
                ],
            });
        let layout = gpu
            .device
            .create_pipeline_layout(&PipelineLayoutDescriptor {
                label: None,
                bind_group_layouts: &[&bind_group_layout],
                push_constant_ranges: &[],
            });
        let pipeline = gpu
            .device
            .create_render_pipeline(&RenderPipelineDescriptor {
                label: Some("frame"),
                layout: Some(&layout),
                vertex: VertexState {
                    module: &shader,
                    entry_point: "vert",
                    buffers: &[],
                },
                fragment: Some(FragmentState {
                    module: &shader,
                    entry_point: "frag",
                    targets: &[Some(ColorTargetState {
                        format: surface_format,
                        write_mask: ColorWrites::ALL,
                        blend: None,
                    })],
                }),
                primitive: PrimitiveState::default(),
                depth_stencil: None,
                multisample: MultisampleState::default(),
                multiview: None,
            });

        let sampler = gpu.device.create_sampler(&SamplerDescriptor::default());
        let texture = FrameTexture::new(
            &gpu,
            Extent3d {
                width: window.resolution.width(),
                height: window.resolution.height(),
                depth_or_array_layers: 1,
            },
        );
        let bind_group = create_bind_group(&gpu, &bind_group_layout, &texture, &sampler);

        let this = Self {
            gpu,
            surface,
            surface_format,
            pipeline,
            bind_group_layout,
            sampler,
            texture,
            bind_group,
            window,
        };
        this.configure_surface();
        Ok(this)
    }

    pub fn window(&self) -> &winit::window::Window {
        &self.window.win
    }

    /// Uploads a new frame of RGBA8 pixels.
    pub fn update_texture(&mut self, res: Resolution, data: &[u8]) {
        let size = Extent3d {
            width: res.width(),
            height: res.height(),
            depth_or_array_layers: 1,
        };
        if size != self.texture.size {
            log::debug!(
                "frame resolution changed from {}x{} to {res}",
                self.texture.size.width,
                self.texture.size.height,
            );
            self.texture = FrameTexture::new(&self.gpu, size);
            self.bind_group = create_bind_group(
                &self.gpu,
                &self.bind_group_layout,
                &self.texture,
                &self.sampler,
            );
        }
        self.texture.write(&self.gpu, data);
    }

    pub fn redraw(&mut self) -> anyhow::Result<()> {
        let frame = match self.surface.get_current_texture() {
            Ok(frame) => frame,
            Err(err @ (SurfaceError::Outdated | SurfaceError::Lost)) => {
                log::debug!("surface error: {err}");
                self.configure_surface();
                self.surface.get_current_texture()?
            }
            Err(err) => return Err(err.into()),
        };
        let view = frame.texture.create_view(&TextureViewDescriptor::default());
        let mut encoder = self
            .gpu
            .device
            .create_command_encoder(&CommandEncoderDescriptor { label: None });
        {
            let mut pass = encoder.begin_render_pass(&RenderPassDescriptor {
                label: None,
                color_attachments: &[Some(RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: Operations {
                        load: LoadOp::Clear(BACKGROUND),
                        store: true,
                    },
                })],
                depth_stencil_attachment: None,
            });
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, &self.bind_group, &[]);
            pass.draw(0..3, 0..1);
        }

        self.gpu.queue.submit([encoder.finish()]);
        frame.present();
        Ok(())
    }

    fn configure_surface(&self) {
        let size = self.window.win.inner_size();
        if size.width != self.window.resolution.width()
            || size.height != self.window.resolution.height()
        {
            // Some window managers ignore the requested size.
            log::warn!(
                "window size {}x{} does not match requested resolution {}",
                size.width,
                size.height,
                self.window.resolution,
            );
        }
        self.surface.configure(
            &self.gpu.device,
            &SurfaceConfiguration {
                usage: TextureUsages::RENDER_ATTACHMENT,
                format: self.surface_format,
                width: self.window.resolution.width(),
                height: self.window.resolution.height(),
                present_mode: PresentMode::Fifo,
                alpha_mode: CompositeAlphaMode::Auto,
                view_formats: Vec::new(),
            },
        );
    }
}

fn create_bind_group(
    gpu: &Gpu,
    layout: &BindGroupLayout,
    texture: &FrameTexture,
    sampler: &Sampler,
) -> BindGroup {
    gpu.device.create_bind_group(&BindGroupDescriptor {
        label: Some("frame"),
        layout,
        entries: &[
            BindGroupEntry {
                binding: 0,
                resource: BindingResource::TextureView(
                    &texture.inner.create_view(&Default::default()),
                ),
            },
            BindGroupEntry {
                binding: 1,
                resource: BindingResource::Sampler(sampler),
            },
        ],
    })
}
