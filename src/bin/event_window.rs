// EVENT-WINDOW - Window and input event demo
//
// Opens a small window and logs every interesting event: focus, resize,
// mouse buttons and movement, wheel, keyboard, dropped files. No
// rendering, just the event plumbing. Escape closes the window.

use anyhow::Result;
use rtx_demos::config::Config;
use std::sync::Arc;
use winit::{
    application::ApplicationHandler,
    event::{ElementState, MouseScrollDelta, WindowEvent},
    event_loop::{ActiveEventLoop, EventLoop},
    window::{Window, WindowAttributes},
};

fn main() -> Result<()> {
    let config = Config::load();
    rtx_demos::init_logging(&config);

    let event_loop = EventLoop::new()?;
    let mut app = App { window: None };
    event_loop.run_app(&mut app)?;
    Ok(())
}

struct App {
    window: Option<Arc<Window>>,
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let attributes = WindowAttributes::default()
            .with_title("Event Window")
            .with_inner_size(winit::dpi::PhysicalSize::new(480, 320));

        match event_loop.create_window(attributes) {
            Ok(window) => {
                log::info!("Window open, waiting for events");
                self.window = Some(Arc::new(window));
            }
            Err(e) => {
                log::error!("Failed to create window: {:?}", e);
                event_loop.exit();
            }
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => {
                log::info!("Closing window..");
                event_loop.exit();
            }
            WindowEvent::Focused(focused) => {
                log::info!("Focus state: {}", focused);
            }
            WindowEvent::Resized(size) => {
                log::info!("Window resized! Width: {} Height: {}", size.width, size.height);
            }
            WindowEvent::MouseInput { state, button, .. } => match state {
                ElementState::Pressed => log::info!("Mouse Down! button: {:?}", button),
                ElementState::Released => log::info!("Mouse Up! button: {:?}", button),
            },
            WindowEvent::CursorMoved { position, .. } => {
                log::info!("Mouse Move! x: {:.0} y: {:.0}", position.x, position.y);
            }
            WindowEvent::MouseWheel { delta, .. } => match delta {
                MouseScrollDelta::LineDelta(x, y) => {
                    log::info!("Mouse Wheel! deltaX: {} deltaY: {}", x, y);
                }
                MouseScrollDelta::PixelDelta(p) => {
                    log::info!("Mouse Wheel! deltaX: {:.0} deltaY: {:.0}", p.x, p.y);
                }
            },
            WindowEvent::KeyboardInput { event, .. } => {
                use winit::keyboard::{KeyCode, PhysicalKey};

                match event.state {
                    ElementState::Pressed => {
                        log::info!("Key Down! key: {:?}", event.physical_key);
                    }
                    ElementState::Released => {
                        log::info!("Key Up! key: {:?}", event.physical_key);
                    }
                }

                if event.state.is_pressed() {
                    if let PhysicalKey::Code(KeyCode::Escape) = event.physical_key {
                        event_loop.exit();
                    }
                }
            }
            WindowEvent::DroppedFile(path) => {
                log::info!("File dropped: {:?}", path);
            }
            _ => {}
        }
    }
}
