pub mod render;

pub use render::{FrameStats, RenderStyle, Scene, SkiaRenderer, render_text_pixmap};
