pub mod headless;
#[cfg(feature = "sdl-display")]
pub mod sdl;

pub use headless::HeadlessRenderer;
#[cfg(feature = "sdl-display")]
pub use sdl::Sdl2Renderer;
