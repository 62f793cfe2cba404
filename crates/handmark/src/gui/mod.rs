//! A minimal GUI for showing images.
//!
//! [`show_image`] can be called from any thread once the event loop is running. Every distinct
//! `key` gets its own window. The event loop is started by `#[handmark::main]`.

mod renderer;

use std::{
    collections::HashMap,
    panic::{catch_unwind, AssertUnwindSafe},
    process,
    rc::Rc,
    sync::Mutex,
};

use anyhow::anyhow;
use once_cell::sync::OnceCell;
use winit::{
    event::{Event, WindowEvent},
    event_loop::{ControlFlow, EventLoop, EventLoopBuilder, EventLoopProxy},
    window::WindowId,
};

use crate::{
    image::{Image, PixelFormat, Resolution},
    termination::Termination,
};

use self::renderer::{Gpu, Renderer, Window};

#[derive(Debug)]
enum Msg {
    Image {
        key: String,
        res: Resolution,
        data: Vec<u8>,
    },
}

static PROXY: OnceCell<Mutex<EventLoopProxy<Msg>>> = OnceCell::new();

struct Gui {
    gpu: Rc<Gpu>,
    windows: HashMap<String, Renderer>,
    win_id_to_key: HashMap<WindowId, String>,
}

impl Gui {
    fn new(gpu: Gpu) -> Self {
        Self {
            gpu: Rc::new(gpu),
            windows: HashMap::new(),
            win_id_to_key: HashMap::new(),
        }
    }

    fn run(mut self, event_loop: EventLoop<Msg>) -> ! {
        event_loop.run(move |event, target, flow| {
            *flow = ControlFlow::Wait;
            let result = match event {
                Event::UserEvent(Msg::Image { key, res, data }) => {
                    self.show(target, key, res, &data)
                }
                Event::RedrawRequested(win) => match self.renderer_mut(win) {
                    Some(renderer) => renderer.redraw(),
                    None => Ok(()),
                },
                Event::WindowEvent {
                    event: WindowEvent::CloseRequested,
                    window_id,
                } => {
                    log::debug!("window {window_id:?} closed, exiting");
                    *flow = ControlFlow::Exit;
                    Ok(())
                }
                _ => Ok(()),
            };

            if let Err(e) = result {
                eprintln!("GUI error: {e:#}");
                process::exit(1);
            }
        })
    }

    fn show<T>(
        &mut self,
        target: &winit::event_loop::EventLoopWindowTarget<T>,
        key: String,
        res: Resolution,
        data: &[u8],
    ) -> anyhow::Result<()> {
        if !self.windows.contains_key(&key) {
            log::debug!("creating window for image '{key}' at {res}");
            let win = Window::open(target, &key, res)?;
            self.win_id_to_key.insert(win.win.id(), key.clone());
            let renderer = Renderer::new(win, self.gpu.clone())?;
            self.windows.insert(key.clone(), renderer);
        }

        let renderer = self
            .windows
            .get_mut(&key)
            .ok_or_else(|| anyhow!("no window for '{key}'"))?;
        renderer.update_texture(res, data);
        renderer.window().request_redraw();
        Ok(())
    }

    fn renderer_mut(&mut self, win: WindowId) -> Option<&mut Renderer> {
        let key = self.win_id_to_key.get(&win)?;
        self.windows.get_mut(key)
    }
}

/// Runs the GUI event loop on the current thread and `cb` on a new one.
///
/// The process exits when `cb` returns, with a status reflecting its result.
pub(crate) fn run<F, R>(cb: F) -> !
where
    F: FnOnce() -> R + Send + 'static,
    R: Termination + Send,
{
    let event_loop = EventLoopBuilder::with_user_event().build();
    if PROXY.set(Mutex::new(event_loop.create_proxy())).is_err() {
        eprintln!("GUI event loop started twice");
        process::exit(1);
    }

    let gpu = match pollster::block_on(Gpu::open()) {
        Ok(gpu) => gpu,
        Err(e) => {
            eprintln!("failed to open GPU: {e:#}");
            process::exit(1);
        }
    };

    std::thread::spawn(move || match catch_unwind(AssertUnwindSafe(cb)) {
        Ok(r) if r.is_success() => process::exit(0),
        Ok(r) => {
            // Prints the error, if any.
            r.report();
            process::exit(1);
        }
        // The panic hook has printed the message already; 101 matches what libstd does.
        Err(_) => process::exit(101),
    });

    Gui::new(gpu).run(event_loop)
}

/// Displays `image` in the window named `key`, creating the window if necessary.
///
/// Fails if the GUI is not running (the application was not started with `#[handmark::main]`) or
/// has shut down.
pub fn show_image(key: impl Into<String>, image: &Image) -> anyhow::Result<()> {
    let proxy = PROXY
        .get()
        .ok_or_else(|| anyhow!("GUI is not running; use `#[handmark::main]`"))?;
    // Windows upload RGBA8 directly.
    let rgba = image.as_format(PixelFormat::Rgba);
    let msg = Msg::Image {
        key: key.into(),
        res: image.resolution(),
        data: rgba.data().to_vec(),
    };
    proxy
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .send_event(msg)
        .map_err(|_| anyhow!("GUI event loop has shut down"))
}
