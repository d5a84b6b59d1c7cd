use std::sync::Arc;
use std::time::Instant;

use anyhow::Context as _;
use clap::Parser;
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::{DeviceEvent, ElementState, MouseButton, WindowEvent},
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{Window, WindowId},
};

use glam::Vec2;

mod config;
mod math;
mod renderer;
mod ui;

use config::{Cli, Config};
use math::engine::EngineError;
use math::{MathEngine, MathResult};
use renderer::{Camera, GpuState};
use ui::{
    SurfaceInfo, UiActions, UiState, apply_theme, draw_help_overlay, draw_side_panel,
    draw_working_overlay,
};

#[derive(Default)]
struct InputState {
    mouse_captured: bool,
    mouse_delta: Vec2,
}

struct App {
    window: Option<Arc<Window>>,
    gpu: Option<GpuState>,
    egui_state: Option<egui_winit::State>,
    egui_renderer: Option<egui_wgpu::Renderer>,
    egui_ctx: egui::Context,

    config: Config,
    camera: Camera,
    math_engine: MathEngine,
    ui_state: UiState,
    input: InputState,

    frame_count: u32,
    fps_timer: Instant,
    last_vsync_state: bool,
    engine_stopped: bool,

    /// Set when startup fails inside the event loop; reported once it exits.
    fatal: Option<anyhow::Error>,
}

impl App {
    fn new(config: Config) -> Self {
        Self {
            window: None,
            gpu: None,
            egui_state: None,
            egui_renderer: None,
            egui_ctx: egui::Context::default(),

            camera: Camera::default(),
            math_engine: MathEngine::new(),
            ui_state: UiState::from_config(&config),
            input: InputState::default(),

            frame_count: 0,
            fps_timer: Instant::now(),
            last_vsync_state: config.window.vsync,
            engine_stopped: false,

            config,
            fatal: None,
        }
    }

    fn init_gpu(&mut self, window: Arc<Window>) -> anyhow::Result<()> {
        let gpu = pollster::block_on(GpuState::new(window.clone(), self.config.window.vsync))?;

        let egui_state = egui_winit::State::new(
            self.egui_ctx.clone(),
            self.egui_ctx.viewport_id(),
            &window,
            Some(window.scale_factor() as f32),
            None,
            Some(2048),
        );

        let egui_renderer =
            egui_wgpu::Renderer::new(&gpu.device, gpu.config.format, None, 1, false);

        apply_theme(&self.egui_ctx);

        let size = window.inner_size();
        self.camera.set_aspect(size.width as f32, size.height as f32);

        self.window = Some(window);
        self.gpu = Some(gpu);
        self.egui_state = Some(egui_state);
        self.egui_renderer = Some(egui_renderer);

        self.apply_parameters();
        Ok(())
    }

    fn update(&mut self) {
        self.frame_count += 1;
        let elapsed = self.fps_timer.elapsed().as_secs_f32();
        if elapsed >= 1.0 {
            self.ui_state.fps = self.frame_count as f32 / elapsed;
            self.frame_count = 0;
            self.fps_timer = Instant::now();
        }

        if self.input.mouse_captured {
            self.camera.process_mouse_movement(self.input.mouse_delta);
        }
        self.input.mouse_delta = Vec2::ZERO;

        self.poll_math_results();
    }

    fn apply_parameters(&mut self) {
        if let Err(err) = self
            .math_engine
            .apply(self.ui_state.parameters(), self.ui_state.animating)
        {
            self.engine_lost(err);
        }
    }

    fn engine_lost(&mut self, err: EngineError) {
        if !self.engine_stopped {
            log::error!("{}", err);
            self.engine_stopped = true;
        }
        self.ui_state.working = false;
        self.ui_state.error = Some(format!("{}; restart to plot again", err));
    }

    fn poll_math_results(&mut self) {
        if self.engine_stopped {
            return;
        }
        loop {
            let result = match self.math_engine.try_recv_result() {
                Ok(Some(result)) => result,
                Ok(None) => break,
                Err(err) => {
                    self.engine_lost(err);
                    break;
                }
            };
            match result {
                MathResult::Attached(upload) => {
                    self.ui_state.error = None;
                    self.ui_state.surface = Some(SurfaceInfo::from_upload(&upload));
                    if let Some(gpu) = &mut self.gpu {
                        gpu.upload_surface(&upload);
                    }
                }
                MathResult::Changed(upload) => {
                    self.ui_state.surface = Some(SurfaceInfo::from_upload(&upload));
                    if let Some(gpu) = &mut self.gpu {
                        gpu.upload_surface(&upload);
                    }
                }
                MathResult::Disposed { resolution } => {
                    log::trace!("released the {resolution}x{resolution} surface");
                    self.ui_state.surface = None;
                    if let Some(gpu) = &mut self.gpu {
                        gpu.clear_surface();
                    }
                }
                MathResult::Working(working) => {
                    self.ui_state.working = working;
                }
                MathResult::Failed(message) => {
                    self.ui_state.error = Some(message);
                }
            }
        }
    }

    fn render(&mut self) {
        let (Some(window), Some(egui_state)) = (&self.window, &mut self.egui_state) else {
            return;
        };
        let raw_input = egui_state.take_egui_input(window);

        let ui_state = &mut self.ui_state;
        let distance = self.camera.distance;
        let mut ui_actions = UiActions::default();

        let full_output = self.egui_ctx.run(raw_input, |ctx| {
            ui_actions = draw_side_panel(ctx, ui_state);
            if ui_state.working {
                draw_working_overlay(ctx);
            }
            if ui_state.show_help {
                draw_help_overlay(ctx, distance);
            }
        });

        self.handle_ui_actions(ui_actions);

        let Some(gpu) = &mut self.gpu else { return };
        let Some(window) = &self.window else { return };
        let Some(egui_state) = &mut self.egui_state else {
            return;
        };
        let Some(egui_renderer) = &mut self.egui_renderer else {
            return;
        };

        egui_state.handle_platform_output(window, full_output.platform_output);

        if self.ui_state.vsync_enabled != self.last_vsync_state {
            gpu.set_vsync(self.ui_state.vsync_enabled);
            self.last_vsync_state = self.ui_state.vsync_enabled;
        }

        let output = match gpu.surface.get_current_texture() {
            Ok(t) => t,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                gpu.resize(gpu.size);
                return;
            }
            Err(wgpu::SurfaceError::OutOfMemory) => {
                log::error!("out of GPU memory, skipping frame");
                return;
            }
            Err(wgpu::SurfaceError::Timeout) => {
                log::warn!("timed out acquiring the next frame");
                return;
            }
        };

        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        gpu.update_camera(&self.camera);

        let paint_jobs = self
            .egui_ctx
            .tessellate(full_output.shapes, full_output.pixels_per_point);

        let screen_descriptor = egui_wgpu::ScreenDescriptor {
            size_in_pixels: [gpu.config.width, gpu.config.height],
            pixels_per_point: full_output.pixels_per_point,
        };

        for (id, delta) in full_output.textures_delta.set {
            egui_renderer.update_texture(&gpu.device, &gpu.queue, id, &delta);
        }

        let mut encoder = gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Main Encoder"),
            });

        egui_renderer.update_buffers(
            &gpu.device,
            &gpu.queue,
            &mut encoder,
            &paint_jobs,
            &screen_descriptor,
        );

        gpu.render_scene(&view, &mut encoder);

        {
            let render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("egui Render Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            let mut render_pass = render_pass.forget_lifetime();
            egui_renderer.render(&mut render_pass, &paint_jobs, &screen_descriptor);
        }

        for id in full_output.textures_delta.free {
            egui_renderer.free_texture(&id);
        }

        gpu.queue.submit(std::iter::once(encoder.finish()));
        output.present();

        window.request_redraw();
    }

    fn handle_ui_actions(&mut self, actions: UiActions) {
        if actions.apply {
            self.apply_parameters();
        }

        if actions.reset_camera {
            self.camera.reset();
        }
    }

    fn set_mouse_captured(&mut self, captured: bool) {
        self.input.mouse_captured = captured;

        if let Some(window) = &self.window {
            let grab = if captured {
                winit::window::CursorGrabMode::Confined
            } else {
                winit::window::CursorGrabMode::None
            };
            if let Err(err) = window.set_cursor_grab(grab) {
                log::debug!("cursor grab {:?} unavailable: {}", grab, err);
            }
            window.set_cursor_visible(!captured);
        }
    }

    fn handle_key(&mut self, key: KeyCode) {
        match key {
            KeyCode::KeyR => self.camera.reset(),
            KeyCode::Escape => self.set_mouse_captured(false),
            _ => {}
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let window_attrs = Window::default_attributes()
            .with_title("Surface 3D")
            .with_inner_size(PhysicalSize::new(
                self.config.window.width,
                self.config.window.height,
            ));

        let started = event_loop
            .create_window(window_attrs)
            .context("Failed to create window")
            .and_then(|window| self.init_gpu(Arc::new(window)));

        if let Err(err) = started {
            log::error!("startup failed: {:#}", err);
            self.fatal = Some(err);
            event_loop.exit();
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        if let (Some(egui_state), Some(window)) = (&mut self.egui_state, &self.window) {
            let response = egui_state.on_window_event(window, &event);
            if response.consumed {
                return;
            }
        }

        match event {
            WindowEvent::CloseRequested => {
                if let Some(err) = self.math_engine.last_error() {
                    log::info!("closing with an unresolved surface error: {}", err);
                }
                self.engine_stopped = true;
                self.math_engine.stop();
                event_loop.exit();
            }

            WindowEvent::Resized(size) => {
                if let Some(gpu) = &mut self.gpu {
                    gpu.resize(size);
                    self.camera
                        .set_aspect(size.width as f32, size.height as f32);
                }
            }

            WindowEvent::KeyboardInput { event, .. } => {
                if event.state == ElementState::Pressed {
                    if let PhysicalKey::Code(key) = event.physical_key {
                        self.handle_key(key);
                    }
                }
            }

            WindowEvent::MouseInput {
                button: MouseButton::Right,
                state,
                ..
            } => {
                self.set_mouse_captured(state == ElementState::Pressed);
            }

            WindowEvent::MouseWheel { delta, .. } => {
                let scroll = match delta {
                    winit::event::MouseScrollDelta::LineDelta(_, y) => y,
                    winit::event::MouseScrollDelta::PixelDelta(pos) => pos.y as f32 / 50.0,
                };
                self.camera.process_scroll(scroll);
            }

            WindowEvent::RedrawRequested => {
                self.update();
                self.render();
            }

            _ => {}
        }
    }

    fn device_event(&mut self, _: &ActiveEventLoop, _: winit::event::DeviceId, event: DeviceEvent) {
        if let DeviceEvent::MouseMotion { delta } = event {
            if self.input.mouse_captured {
                self.input.mouse_delta.x += delta.0 as f32;
                self.input.mouse_delta.y += delta.1 as f32;
            }
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_micros()
        .init();

    let cli = Cli::parse();
    let config = cli.resolve()?;
    log::info!(
        "starting with `{}` (range {}, resolution {}, {})",
        config.surface.expression,
        config.surface.range,
        config.surface.resolution,
        config.surface.scheme
    );

    let event_loop = EventLoop::new().context("Failed to create event loop")?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(config);
    event_loop
        .run_app(&mut app)
        .context("Event loop exited with an error")?;

    match app.fatal.take() {
        Some(err) => Err(err),
        None => Ok(()),
    }
}
