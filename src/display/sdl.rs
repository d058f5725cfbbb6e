//! SDL2 window renderer
//! Streams decoded RGB24 frames into a texture and presents with vsync.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use sdl2::event::Event;
use sdl2::pixels::PixelFormatEnum;
use sdl2::render::{Canvas, TextureCreator};
use sdl2::video::{Window, WindowContext};
use sdl2::EventPump;
use tracing::info;

use crate::capture::{decoder, Frame};
use crate::error::{Error, Result};
use crate::pipeline::Renderer;

pub struct Sdl2Renderer {
    _context: sdl2::Sdl,
    canvas: Canvas<Window>,
    texture_creator: TextureCreator<WindowContext>,
    event_pump: EventPump,
    quit: Arc<AtomicBool>,
}

impl Sdl2Renderer {
    /// Open a window; `quit` is raised when the user closes it.
    pub fn new(width: u32, height: u32, quit: Arc<AtomicBool>) -> Result<Self> {
        let sdl_context = sdl2::init().map_err(Error::Display)?;
        let video_subsystem = sdl_context.video().map_err(Error::Display)?;

        let window = video_subsystem
            .window("framelatch", width, height)
            .position_centered()
            .build()
            .map_err(|e| Error::Display(e.to_string()))?;

        let canvas = window
            .into_canvas()
            .present_vsync()
            .build()
            .map_err(|e| Error::Display(e.to_string()))?;
        let texture_creator = canvas.texture_creator();
        let event_pump = sdl_context.event_pump().map_err(Error::Display)?;

        Ok(Self {
            _context: sdl_context,
            canvas,
            texture_creator,
            event_pump,
            quit,
        })
    }

    fn pump_events(&mut self) {
        for event in self.event_pump.poll_iter() {
            if let Event::Quit { .. } = event {
                info!("Quit event received");
                self.quit.store(true, Ordering::Release);
            }
        }
    }
}

impl Renderer for Sdl2Renderer {
    fn render(&mut self, frame: &Frame) -> Result<()> {
        let image = decoder::decode_frame(frame)?;

        let mut texture = self
            .texture_creator
            .create_texture_streaming(PixelFormatEnum::RGB24, image.width, image.height)
            .map_err(|e| Error::Render(e.to_string()))?;

        texture
            .update(None, &image.pixels, (image.width * 3) as usize)
            .map_err(|e| Error::Render(e.to_string()))?;

        self.canvas.clear();
        self.canvas
            .copy(&texture, None, None)
            .map_err(Error::Render)?;
        Ok(())
    }

    fn present(&mut self) -> Result<()> {
        self.canvas.present();
        self.pump_events();
        Ok(())
    }

    fn poll(&mut self) {
        self.pump_events();
    }
}
