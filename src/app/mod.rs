mod config;

pub use config::AppConfig;

use color_eyre::Result;
use std::sync::Arc;
use winit::application::ApplicationHandler;
use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{Key, NamedKey};
use winit::window::{Window, WindowId};
use crate::renderer::config::RenderConfig;
use crate::renderer::Renderer;

pub struct App {
    config: AppConfig,
    renderer: Option<Renderer>,
    window: Option<Arc<Window>>,

    // State
    close_requested: bool,
    error: Option<color_eyre::Report>,
}

impl App {
    pub fn new() -> Result<Self> {
        Ok(Self::with_config(AppConfig::default()))
    }

    pub fn with_config(config: AppConfig) -> Self {
        Self {
            config,
            renderer: None,
            window: None,

            close_requested: false,
            error: None,
        }
    }

    /// Runs the event loop until the window closes or a fatal error occurs
    pub fn run(&mut self) -> Result<()> {
        let event_loop = EventLoop::new()?;
        event_loop.set_control_flow(ControlFlow::Poll);
        event_loop.run_app(self)?;

        match self.error.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        if self.window.is_none() {
            let attributes = Window::default_attributes()
                .with_title(self.config.title.clone())
                .with_inner_size(self.config.inner_size);
            self.window = Some(Arc::new(event_loop.create_window(attributes)?));
        }

        if self.renderer.is_none() {
            if let Some(window) = &self.window {
                let scene = self.config.scene_desc();
                self.renderer = Some(Renderer::new(window.clone(), RenderConfig::default(), &scene)?);
            }
        }
        Ok(())
    }

    /// Keeps the first fatal error and stops the event loop
    fn fail(&mut self, event_loop: &ActiveEventLoop, err: color_eyre::Report) {
        log::error!("{:?}", err);
        if self.error.is_none() {
            self.error = Some(err);
        }
        event_loop.exit();
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if let Err(err) = self.init(event_loop) {
            self.fail(event_loop, err);
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent
    ) {
        if self.window.as_ref().map(|w| w.id()) != Some(window_id) {
            return;
        }

        match event {
            WindowEvent::CloseRequested => {
                self.close_requested = true;
            }
            WindowEvent::Resized(_) | WindowEvent::ScaleFactorChanged { .. } => {
                if let Some(renderer) = &mut self.renderer {
                    renderer.request_resize();
                }
            }
            WindowEvent::RedrawRequested => {
                let drawn = match &mut self.renderer {
                    Some(renderer) => renderer.draw(),
                    None => Ok(()),
                };
                if let Err(err) = drawn {
                    self.fail(event_loop, err);
                }
            }
            WindowEvent::KeyboardInput {
                event:
                KeyEvent {
                    logical_key: Key::Named(NamedKey::Escape),
                    state: ElementState::Pressed,
                    ..
                },
                ..
            } => {
                self.close_requested = true;
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.close_requested {
            event_loop.exit();
            return;
        }

        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        // Tear down the renderer while the window is still alive
        self.renderer = None;
    }
}
