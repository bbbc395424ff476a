//! Bundled window host.
//!
//! The engine itself never touches a window. This module is a small host that
//! opens one with winit, creates the wgpu surface and device, runs the async
//! scene setup to completion and then calls the returned [`RenderFn`] on every
//! redraw.
//!
//! # Lifecycle
//!
//! 1. `resumed`: create window, surface, device and [`Engine`], then await setup
//! 2. window/device events are forwarded into [`Engine::input`]
//! 3. `Resized` reconfigures the surface and calls [`Engine::resize`]
//! 4. `RedrawRequested` measures the frame delta and calls the render closure

use std::{fmt::Debug, pin::Pin, sync::Arc};

use instant::Instant;
use winit::{
    application::ApplicationHandler,
    dpi::LogicalSize,
    event::{DeviceEvent, DeviceId, WindowEvent},
    event_loop::{ActiveEventLoop, EventLoop},
    window::Window,
};

use crate::{
    context::{Engine, EngineConfig},
    error::{EngineError, EngineResult},
    render::FrameStats,
};

#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;

/// Per-frame closure built by scene setup: update, render and present the
/// scene for a frame delta in seconds.
pub type RenderFn = Box<dyn FnMut(&mut Engine, &wgpu::TextureView, f32) -> EngineResult<FrameStats>>;

/// Async scene setup. Takes the engine and hands it back together with the
/// render closure once every asset is resident.
pub type SetupFn =
    Box<dyn FnOnce(Engine) -> Pin<Box<dyn Future<Output = EngineResult<(Engine, RenderFn)>>>>>;

/// Window, surface and engine, ready to draw.
pub struct Host {
    window: Arc<Window>,
    surface: wgpu::Surface<'static>,
    config: wgpu::SurfaceConfiguration,
    engine: Engine,
    render: RenderFn,
    is_surface_configured: bool,
}

impl Debug for Host {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Host")
            .field("config", &self.config)
            .field("is_surface_configured", &self.is_surface_configured)
            .finish()
    }
}

impl Host {
    async fn new(window: Arc<Window>, config: EngineConfig, setup: SetupFn) -> EngineResult<Self> {
        let size = window.inner_size();

        log::info!("wgpu setup");
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            #[cfg(not(target_arch = "wasm32"))]
            backends: wgpu::Backends::PRIMARY,
            #[cfg(target_arch = "wasm32")]
            backends: wgpu::Backends::GL,
            ..wgpu::InstanceDescriptor::new_without_display_handle()
        });

        let surface = instance
            .create_surface(window.clone())
            .map_err(|e| EngineError::AdapterUnavailable(e.to_string()))?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| EngineError::AdapterUnavailable(e.to_string()))?;
        log::info!("adapter: {:?}", adapter.get_info());

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("grove device"),
                required_features: wgpu::Features::empty(),
                // WebGL doesn't support all of wgpu's features
                required_limits: if cfg!(target_arch = "wasm32") {
                    wgpu::Limits::downlevel_webgl2_defaults()
                } else {
                    wgpu::Limits::default()
                },
                ..Default::default()
            })
            .await
            .map_err(|e| EngineError::DeviceUnavailable(e.to_string()))?;

        let surface_caps = surface.get_capabilities(&adapter);
        // The post-process pass writes linear colour and relies on an sRGB surface.
        let surface_format = surface_caps
            .formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .or_else(|| surface_caps.formats.first().copied())
            .ok_or_else(|| EngineError::AdapterUnavailable("surface has no formats".to_string()))?;
        let surface_config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: surface_caps
                .present_modes
                .first()
                .copied()
                .unwrap_or(wgpu::PresentMode::Fifo),
            alpha_mode: surface_caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };

        let scale = window.scale_factor();
        let logical: LogicalSize<u32> = size.to_logical(scale);
        let engine = Engine::create(
            device,
            queue,
            surface_format,
            [logical.width.max(1), logical.height.max(1)],
            scale,
            config,
        )
        .await?;
        let (engine, render) = setup(engine).await?;

        Ok(Self {
            window,
            surface,
            config: surface_config,
            engine,
            render,
            is_surface_configured: false,
        })
    }

    fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.config.width = width;
        self.config.height = height;
        self.surface.configure(&self.engine.device, &self.config);
        self.is_surface_configured = true;

        let scale = self.window.scale_factor();
        let logical: LogicalSize<u32> = winit::dpi::PhysicalSize::new(width, height).to_logical(scale);
        if let Err(e) = self
            .engine
            .resize(logical.width.max(1), logical.height.max(1), scale)
        {
            log::error!("resize failed: {e}");
        }
    }

    fn render(&mut self, dt: f32) -> Result<(), wgpu::CurrentSurfaceTexture> {
        self.window.request_redraw();
        if !self.is_surface_configured {
            return Ok(());
        }
        let output = match self.surface.get_current_texture() {
            wgpu::CurrentSurfaceTexture::Success(output)
            | wgpu::CurrentSurfaceTexture::Suboptimal(output) => output,
            other => return Err(other),
        };
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        match (self.render)(&mut self.engine, &view, dt) {
            Ok(stats) => log::trace!("{} draws, {} instances", stats.draw_calls, stats.instances),
            Err(e) => log::error!("frame failed: {e}"),
        }
        output.present();
        Ok(())
    }
}

pub(crate) enum HostEvent {
    #[allow(dead_code)]
    Initialized(Box<Host>),
    #[allow(dead_code)]
    Failed(EngineError),
}

impl Debug for HostEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Initialized(host) => f.debug_tuple("Initialized").field(host).finish(),
            Self::Failed(e) => f.debug_tuple("Failed").field(e).finish(),
        }
    }
}

struct App {
    #[cfg(not(target_arch = "wasm32"))]
    async_runtime: tokio::runtime::Runtime,
    #[allow(dead_code)]
    proxy: winit::event_loop::EventLoopProxy<HostEvent>,
    host: Option<Host>,
    // taken once the window exists
    setup: Option<(EngineConfig, SetupFn)>,
    title: String,
    last_time: Instant,
}

impl App {
    fn new(
        event_loop: &EventLoop<HostEvent>,
        title: &str,
        config: EngineConfig,
        setup: SetupFn,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            #[cfg(not(target_arch = "wasm32"))]
            async_runtime: tokio::runtime::Runtime::new()?,
            proxy: event_loop.create_proxy(),
            host: None,
            setup: Some((config, setup)),
            title: title.to_string(),
            last_time: Instant::now(),
        })
    }

    fn initialized(&mut self, event_loop: &ActiveEventLoop, host: EngineResult<Host>) {
        match host {
            Ok(mut host) => {
                let size = host.window.inner_size();
                host.resize(size.width, size.height);
                host.window.request_redraw();
                self.last_time = Instant::now();
                self.host = Some(host);
            }
            Err(e) => {
                log::error!("scene setup failed: {e}");
                event_loop.exit();
            }
        }
    }
}

impl ApplicationHandler<HostEvent> for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        let Some((config, setup)) = self.setup.take() else {
            return;
        };

        #[allow(unused_mut)]
        let mut window_attributes = Window::default_attributes().with_title(self.title.clone());

        #[cfg(target_arch = "wasm32")]
        {
            use wasm_bindgen::JsCast;
            use winit::platform::web::WindowAttributesExtWebSys;

            const CANVAS_ID: &str = "canvas";

            let canvas = wgpu::web_sys::window()
                .and_then(|window| window.document())
                .and_then(|document| document.get_element_by_id(CANVAS_ID));
            if let Some(canvas) = canvas {
                window_attributes = window_attributes.with_canvas(Some(canvas.unchecked_into()));
            }
        }

        let window = match event_loop.create_window(window_attributes) {
            Ok(window) => Arc::new(window),
            Err(e) => {
                log::error!("could not create a window: {e}");
                event_loop.exit();
                return;
            }
        };

        #[cfg(not(target_arch = "wasm32"))]
        {
            let host = self.async_runtime.block_on(Host::new(window, config, setup));
            self.initialized(event_loop, host);
        }

        #[cfg(target_arch = "wasm32")]
        {
            let proxy = self.proxy.clone();
            wasm_bindgen_futures::spawn_local(async move {
                let event = match Host::new(window, config, setup).await {
                    Ok(host) => HostEvent::Initialized(Box::new(host)),
                    Err(e) => HostEvent::Failed(e),
                };
                if proxy.send_event(event).is_err() {
                    log::error!("event loop closed before setup finished");
                }
            });
        }
    }

    fn user_event(&mut self, event_loop: &ActiveEventLoop, event: HostEvent) {
        // This is the message from the wasm `spawn_local`
        match event {
            HostEvent::Initialized(host) => self.initialized(event_loop, Ok(*host)),
            HostEvent::Failed(e) => self.initialized(event_loop, Err(e)),
        }
    }

    fn device_event(
        &mut self,
        _event_loop: &ActiveEventLoop,
        _device_id: DeviceId,
        event: DeviceEvent,
    ) {
        if let Some(host) = &mut self.host {
            host.engine.input.handle_device_event(&event);
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        let Some(host) = &mut self.host else {
            return;
        };
        host.engine.input.handle_window_event(&event);

        match event {
            WindowEvent::CloseRequested => {
                host.engine.destroy();
                event_loop.exit();
            }
            WindowEvent::Resized(size) => host.resize(size.width, size.height),
            WindowEvent::RedrawRequested => {
                let dt = self.last_time.elapsed().as_secs_f32();
                self.last_time = Instant::now();
                match host.render(dt) {
                    Ok(()) => {}
                    // Reconfigure the surface if it's lost or outdated
                    Err(wgpu::CurrentSurfaceTexture::Lost | wgpu::CurrentSurfaceTexture::Outdated) => {
                        let size = host.window.inner_size();
                        host.resize(size.width, size.height);
                    }
                    Err(e) => log::error!("unable to render: {e:?}"),
                }
            }
            _ => {}
        }
    }
}

/// Opens a window and runs `setup`'s scene until the window closes.
pub fn run(title: &str, config: EngineConfig, setup: SetupFn) -> anyhow::Result<()> {
    #[cfg(not(target_arch = "wasm32"))]
    {
        if let Err(e) = env_logger::try_init() {
            eprintln!("Warning: could not initialize logger: {e}");
        }
    }

    #[cfg(target_arch = "wasm32")]
    {
        console_log::init_with_level(log::Level::Info).unwrap_throw();
    }

    let event_loop: EventLoop<HostEvent> = EventLoop::with_user_event().build()?;
    let mut app = App::new(&event_loop, title, config, setup)?;
    event_loop.run_app(&mut app)?;

    Ok(())
}
