// =============================================================================
// RT-TRIANGLE - Hardware ray-traced scene in a window
// =============================================================================
//
// Renders the demo scene (ground plane plus cube) with the NV ray
// tracing pipeline and copies the traced image to the swapchain.
//
// FRAME FLOW:
// 1. about_to_wait requests a redraw once the previous frame is done
// 2. RedrawRequested acquires an image and submits the prerecorded
//    trace commands
// 3. Any frame error is fatal: it is logged and the loop exits
//
// =============================================================================

use anyhow::Result;
use rtx_demos::config::Config;
use rtx_demos::rt::Renderer;
use std::sync::Arc;
use std::time::Instant;
use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    window::{Window, WindowAttributes},
};

fn main() -> Result<()> {
    let config = Config::load();
    rtx_demos::init_logging(&config);

    log::info!("Starting ray tracing demo");
    log::info!("Window: {}x{}", config.window.width, config.window.height);
    log::info!("Present mode: {}", config.graphics.present_mode);

    let event_loop = EventLoop::new()?;
    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;
    Ok(())
}

struct App {
    config: Config,
    // declared before the window: the surface inside the renderer must
    // be destroyed while the native window still exists
    renderer: Option<Renderer>,
    window: Option<Arc<Window>>,
    /// Set while the window has zero size; rendering is skipped
    is_minimized: bool,

    // FPS tracking
    frame_count: u32,
    last_fps_update: Instant,
    last_frame_time: Instant,
}

impl App {
    fn new(config: Config) -> Self {
        let now = Instant::now();
        Self {
            config,
            renderer: None,
            window: None,
            is_minimized: false,
            frame_count: 0,
            last_fps_update: now,
            last_frame_time: now,
        }
    }

    /// Tear down the renderer while the window is still alive, so the
    /// surface never outlives the native window it was created for.
    fn shutdown(&mut self) {
        if let Some(renderer) = self.renderer.take() {
            let _ = renderer.wait_idle();
        }
    }

    fn render_frame(&mut self) -> Result<bool> {
        if self.is_minimized {
            return Ok(false);
        }
        let renderer = match self.renderer.as_mut() {
            Some(r) => r,
            None => return Ok(false),
        };
        renderer.draw_frame()?;
        Ok(true)
    }

    fn update_fps(&mut self) {
        if !self.config.debug.show_fps {
            return;
        }

        let now = Instant::now();
        let frame_time = now.duration_since(self.last_frame_time).as_secs_f32();
        self.last_frame_time = now;
        self.frame_count += 1;

        // Update title every second
        if now.duration_since(self.last_fps_update).as_secs_f32() >= 1.0 {
            let elapsed = now.duration_since(self.last_fps_update).as_secs_f32();
            let fps = self.frame_count as f32 / elapsed;

            if let Some(ref window) = self.window {
                window.set_title(&format!(
                    "{} - {:.0} FPS ({:.2}ms)",
                    self.config.window.title,
                    fps,
                    frame_time * 1000.0,
                ));
            }

            self.frame_count = 0;
            self.last_fps_update = now;
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        // Fixed-size window; the pipeline resources are sized once
        let window_attributes = WindowAttributes::default()
            .with_title(&self.config.window.title)
            .with_inner_size(winit::dpi::PhysicalSize::new(
                self.config.window.width,
                self.config.window.height,
            ))
            .with_resizable(false);

        let window = match event_loop.create_window(window_attributes) {
            Ok(w) => Arc::new(w),
            Err(e) => {
                log::error!("Failed to create window: {:?}", e);
                event_loop.exit();
                return;
            }
        };

        match Renderer::new(&window, &self.config) {
            Ok(renderer) => self.renderer = Some(renderer),
            Err(e) => {
                log::error!("Failed to initialize renderer: {:?}", e);
                event_loop.exit();
                return;
            }
        }

        self.window = Some(window);
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested, shutting down...");
                event_loop.exit();
            }

            WindowEvent::Resized(size) => {
                self.is_minimized = size.width == 0 || size.height == 0;
            }

            WindowEvent::RedrawRequested => match self.render_frame() {
                Ok(rendered) => {
                    if rendered {
                        self.update_fps();
                    }
                }
                Err(e) => {
                    // a stuck acquire or a failed submit does not recover
                    log::error!("Render error: {:?}", e);
                    event_loop.exit();
                }
            },

            WindowEvent::KeyboardInput { event, .. } => {
                use winit::keyboard::{KeyCode, PhysicalKey};

                if event.state.is_pressed() {
                    if let PhysicalKey::Code(KeyCode::Escape) = event.physical_key {
                        log::info!("ESC pressed, exiting...");
                        event_loop.exit();
                    }
                }
            }

            _ => {}
        }
    }

    /// Request the next frame only after the current one was handled,
    /// so frames never pile up behind a slow presentation engine.
    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(ref window) = self.window {
            window.request_redraw();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shutdown_releases_the_renderer_first() {
        let mut app = App::new(Config::default());
        app.shutdown();
        assert!(app.renderer.is_none());
        // the window handle stays valid until the app itself drops
        assert!(app.window.is_none());
    }
}
