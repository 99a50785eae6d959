//! Application event loop.
//!
//! The loop follows this pattern:
//! 1. `resumed` creates the window and the GPU [`Context`], builds the
//!    [`Viewer`] and starts loading the model in the background
//! 2. window events go to the orbit controls first, then resize/close handling
//! 3. every redraw advances the animation, renders, then updates the camera
//!    and requests the next frame
//! 4. the model arrives as a [`FlowEvent`] whenever loading finishes; rendering
//!    does not wait for it

use std::{fmt::Debug, iter, sync::Arc};

use instant::Instant;
use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop, EventLoopProxy},
    window::Window,
};

use crate::{
    config::ViewerConfig,
    context::Context,
    resources::{
        asset::{ModelAsset, load_model},
        log_progress,
    },
    viewer::Viewer,
};

/// Window, GPU context and scene, once they exist.
#[derive(Debug)]
pub(crate) struct AppState {
    pub(crate) ctx: Context,
    pub(crate) viewer: Viewer,
    is_surface_configured: bool,
}

impl AppState {
    async fn new(window: Arc<Window>, config: ViewerConfig) -> anyhow::Result<Self> {
        let ctx = Context::new(window, &config).await?;
        let viewer = Viewer::new(&ctx.device, &ctx.queue, &ctx.pipelines, config)?;
        Ok(Self {
            ctx,
            viewer,
            is_surface_configured: false,
        })
    }

    fn resize(&mut self, width: u32, height: u32) {
        if self.ctx.resize(width, height) {
            self.is_surface_configured = true;
        }
    }

    fn render(&mut self) -> Result<(), wgpu::SurfaceError> {
        // keep the loop going
        self.ctx.window.request_redraw();

        // Rendering requires the surface to be configured
        if !self.is_surface_configured {
            return Ok(());
        }

        let output = self.ctx.surface.get_current_texture()?;
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = self
            .ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Render Encoder"),
            });
        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Render Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(self.ctx.clear_colour),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.ctx.depth_texture.view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                occlusion_query_set: None,
                timestamp_writes: None,
            });

            self.viewer.draw(
                &mut render_pass,
                &self.ctx.pipelines,
                &self.ctx.camera.bind_group,
                &self.ctx.light.bind_group,
            );
        }

        self.ctx.queue.submit(iter::once(encoder.finish()));
        output.present();
        Ok(())
    }
}

pub(crate) enum FlowEvent {
    /// The context finished initialising asynchronously.
    #[cfg(target_arch = "wasm32")]
    Initialized(anyhow::Result<AppState>),
    ModelLoaded(Box<ModelAsset>),
    ModelFailed(anyhow::Error),
}

impl Debug for FlowEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            #[cfg(target_arch = "wasm32")]
            Self::Initialized(Ok(_)) => f.write_str("Initialized(Ok)"),
            #[cfg(target_arch = "wasm32")]
            Self::Initialized(Err(e)) => f.debug_tuple("Initialized").field(e).finish(),
            Self::ModelLoaded(asset) => f.debug_tuple("ModelLoaded").field(asset).finish(),
            Self::ModelFailed(e) => f.debug_tuple("ModelFailed").field(e).finish(),
        }
    }
}

pub struct App {
    #[cfg(not(target_arch = "wasm32"))]
    async_runtime: tokio::runtime::Runtime,
    proxy: EventLoopProxy<FlowEvent>,
    // Taken once the window exists.
    config: Option<ViewerConfig>,
    state: Option<AppState>,
    last_time: Instant,
}

impl App {
    fn new(event_loop: &EventLoop<FlowEvent>, config: ViewerConfig) -> anyhow::Result<Self> {
        let proxy = event_loop.create_proxy();
        #[cfg(not(target_arch = "wasm32"))]
        let async_runtime = tokio::runtime::Runtime::new()?;
        Ok(Self {
            #[cfg(not(target_arch = "wasm32"))]
            async_runtime,
            proxy,
            config: Some(config),
            state: None,
            last_time: Instant::now(),
        })
    }

    /// Starts fetching the model; the result comes back as a [`FlowEvent`].
    fn spawn_model_load(&self, path: String) {
        let proxy = self.proxy.clone();

        #[cfg(not(target_arch = "wasm32"))]
        {
            let handle = self.async_runtime.handle().clone();
            std::thread::spawn(move || handle.block_on(load_and_report(path, proxy)));
        }

        #[cfg(target_arch = "wasm32")]
        wasm_bindgen_futures::spawn_local(load_and_report(path, proxy));
    }

    fn on_initialized(&mut self, event_loop: &ActiveEventLoop, state: anyhow::Result<AppState>) {
        let mut state = match state {
            Ok(state) => state,
            Err(e) => {
                log::error!("App initialization failed. Cannot create the main context: {e:?}");
                event_loop.exit();
                return;
            }
        };
        let size = state.ctx.window.inner_size();
        state.resize(size.width, size.height);
        state.ctx.window.request_redraw();
        self.spawn_model_load(state.viewer.config().model.path.clone());
        self.state = Some(state);
    }
}

async fn load_and_report(path: String, proxy: EventLoopProxy<FlowEvent>) {
    let event = match load_model(&path, log_progress).await {
        Ok(asset) => FlowEvent::ModelLoaded(Box::new(asset)),
        Err(e) => FlowEvent::ModelFailed(e),
    };
    if proxy.send_event(event).is_err() {
        log::warn!("Event loop closed before {path} finished loading.");
    }
}

impl ApplicationHandler<FlowEvent> for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        let Some(config) = self.config.take() else {
            return;
        };

        #[allow(unused_mut)]
        let mut window_attributes = Window::default_attributes().with_title(config.title.clone());

        #[cfg(target_arch = "wasm32")]
        {
            use wasm_bindgen::JsCast;
            use winit::platform::web::WindowAttributesExtWebSys;

            const CANVAS_ID: &str = "canvas";

            let canvas = web_sys::window()
                .and_then(|window| window.document())
                .and_then(|document| document.get_element_by_id(CANVAS_ID));
            window_attributes = match canvas {
                Some(canvas) => window_attributes.with_canvas(Some(canvas.unchecked_into())),
                // no canvas on the page: let winit create one and append it to the body
                None => window_attributes.with_append(true),
            };
        }

        let window = match event_loop.create_window(window_attributes) {
            Ok(window) => Arc::new(window),
            Err(e) => {
                log::error!("Could not create a window: {e}");
                event_loop.exit();
                return;
            }
        };

        let init_future = AppState::new(window, config);

        #[cfg(not(target_arch = "wasm32"))]
        {
            let state = self.async_runtime.block_on(init_future);
            self.on_initialized(event_loop, state);
        }

        #[cfg(target_arch = "wasm32")]
        {
            let proxy = self.proxy.clone();
            wasm_bindgen_futures::spawn_local(async move {
                let state = init_future.await;
                if proxy.send_event(FlowEvent::Initialized(state)).is_err() {
                    log::error!("Event loop closed during initialization.");
                }
            });
        }
    }

    #[allow(unused_variables)]
    fn user_event(&mut self, event_loop: &ActiveEventLoop, event: FlowEvent) {
        match event {
            #[cfg(target_arch = "wasm32")]
            FlowEvent::Initialized(state) => self.on_initialized(event_loop, state),
            FlowEvent::ModelLoaded(asset) => {
                if let Some(state) = &mut self.state {
                    let ctx = &state.ctx;
                    if let Err(e) =
                        state
                            .viewer
                            .on_model_loaded(&ctx.device, &ctx.queue, &ctx.pipelines, *asset)
                    {
                        state.viewer.on_model_failed(&e);
                    }
                }
            }
            FlowEvent::ModelFailed(e) => {
                if let Some(state) = &self.state {
                    state.viewer.on_model_failed(&e);
                }
            }
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        let state = match &mut self.state {
            Some(state) => state,
            None => return,
        };

        state.ctx.camera.controls.process_event(&event);

        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::Resized(size) => state.resize(size.width, size.height),
            WindowEvent::RedrawRequested => {
                let dt = self.last_time.elapsed();
                self.last_time = Instant::now();

                state.viewer.on_frame(&state.ctx.queue, dt);
                match state.render() {
                    Ok(()) => {
                        let ctx = &mut state.ctx;
                        ctx.camera
                            .controls
                            .update(&mut ctx.camera.camera, &ctx.projection);
                        ctx.camera.write(&ctx.queue, &ctx.projection);
                    }
                    // Reconfigure the surface if it's lost or outdated
                    Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                        let size = state.ctx.window.inner_size();
                        state.resize(size.width, size.height);
                    }
                    Err(e) => {
                        log::error!("Unable to render {e}");
                    }
                }
            }
            _ => {}
        }
    }
}

/// Opens the viewer window and blocks until it is closed (natively) or
/// hands control to the browser (on the web).
pub fn run(config: ViewerConfig) -> anyhow::Result<()> {
    #[cfg(not(target_arch = "wasm32"))]
    {
        if let Err(e) = env_logger::Builder::from_env(
            env_logger::Env::default().default_filter_or("info"),
        )
        .try_init()
        {
            println!("Warning: Could not initialize logger: {e}");
        };
    }

    #[cfg(target_arch = "wasm32")]
    {
        if let Err(e) = console_log::init_with_level(log::Level::Info) {
            web_sys::console::warn_1(&format!("Could not initialize logger: {e}").into());
        }
    }

    config.validate()?;

    let event_loop: EventLoop<FlowEvent> = EventLoop::with_user_event().build()?;
    let mut app = App::new(&event_loop, config)?;
    event_loop.run_app(&mut app)?;

    Ok(())
}
