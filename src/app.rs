use std::path::{Path, PathBuf};
use std::sync::Arc;

use ab_glyph::FontVec;
use anyhow::{Context, Result, anyhow};
use ior_core::{Phase, SessionPhase};
use ior_experiment::{ExperimentConfig, ResponseKey};
use ior_render::{RenderStyle, SkiaRenderer};
use ior_timing::{HighPrecisionTimer, Timer};
use pixels::{Pixels, SurfaceTexture};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{debug, error, info, trace, warn};
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{Fullscreen, Window, WindowId},
};

use crate::live::{KeyBuffer, LiveEnv, MouseGaze, SETTLE};
use crate::session::Session;
use crate::sink::{JsonlErrorLog, write_results};

const FALLBACK_FONTS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/Library/Fonts/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

pub struct App {
    config: ExperimentConfig,
    windowed: bool,
    /// Shared clock; every clone measures from the same instant.
    timer: HighPrecisionTimer,
    render_timer: HighPrecisionTimer,
    last_frame: Option<u64>,

    window: Option<Arc<Window>>,
    pixels: Option<Pixels<'static>>,
    renderer: Option<SkiaRenderer>,
    gaze: Option<MouseGaze<HighPrecisionTimer>>,
    keys: KeyBuffer<HighPrecisionTimer>,
    session: Session<HighPrecisionTimer, StdRng, JsonlErrorLog>,
    results_saved: bool,

    refresh_rate: Option<f64>,
    should_exit: bool,
}

impl App {
    pub fn new(config: ExperimentConfig, windowed: bool) -> Result<Self> {
        let timer = HighPrecisionTimer::new();
        let rng = match config.session.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let sink = JsonlErrorLog::open(&config.session.error_log_path)?;
        let session = Session::new(&config, timer.clone(), rng, sink)?;

        Ok(Self {
            windowed,
            render_timer: timer.clone(),
            keys: KeyBuffer::new(timer.clone()),
            timer,
            last_frame: None,
            window: None,
            pixels: None,
            renderer: None,
            gaze: None,
            session,
            results_saved: false,
            refresh_rate: None,
            should_exit: false,
            config,
        })
    }

    pub fn run(mut self) -> Result<()> {
        let event_loop = EventLoop::new()?;
        info!(
            participant = %self.config.session.participant_id,
            os = std::env::consts::OS,
            arch = std::env::consts::ARCH,
            "starting session; ESC aborts"
        );
        event_loop.run_app(&mut self)?;
        Ok(())
    }

    fn create_window_and_surface(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let primary_monitor = event_loop
            .primary_monitor()
            .or_else(|| event_loop.available_monitors().next())
            .ok_or_else(|| anyhow!("no monitor available"))?;

        self.refresh_rate = primary_monitor
            .refresh_rate_millihertz()
            .map(|rate| rate as f64 / 1000.0);

        let mut window_attributes = Window::default_attributes().with_title("Retinotopic IOR");
        window_attributes = if self.windowed {
            window_attributes.with_inner_size(PhysicalSize::new(1280, 1024))
        } else {
            window_attributes
                .with_fullscreen(Some(Fullscreen::Borderless(Some(primary_monitor))))
                .with_resizable(false)
        };

        let window = Arc::new(event_loop.create_window(window_attributes)?);
        let size = window.inner_size();
        info!(
            width = size.width,
            height = size.height,
            scale_factor = window.scale_factor(),
            refresh_hz = ?self.refresh_rate,
            "display configured"
        );

        let surface_texture = SurfaceTexture::new(size.width, size.height, window.clone());
        self.pixels = Some(Pixels::new(size.width, size.height, surface_texture)?);

        let layout = self.config.layout(size.width, size.height);
        let d = &self.config.display;
        let style = RenderStyle::from_degrees(
            &layout,
            d.placeholder_deg,
            d.fixation_deg,
            d.target_deg,
            d.uncued_stroke_deg,
            d.cued_stroke_deg,
            d.text_px,
        );
        let font = load_font(d.font_path.as_deref());
        let mut renderer = SkiaRenderer::new(layout.clone(), style, font)?;
        let mut gaze = MouseGaze::new(self.timer.clone(), layout, SETTLE);

        self.session.start(&mut LiveEnv {
            gaze: &mut gaze,
            keys: &mut self.keys,
            presenter: &mut renderer,
        });
        self.renderer = Some(renderer);
        self.gaze = Some(gaze);

        window.request_redraw();
        self.window = Some(window);
        Ok(())
    }

    fn frame(&mut self) -> Result<()> {
        let (Some(pixels), Some(renderer), Some(gaze)) = (
            self.pixels.as_mut(),
            self.renderer.as_mut(),
            self.gaze.as_mut(),
        ) else {
            return Ok(());
        };

        let now = self.timer.now();
        if let Some(last) = self.last_frame.replace(now) {
            let interval = self.timer.elapsed(last);
            self.timer.record_frame(interval);
        }

        let phase = self.session.frame(&mut LiveEnv {
            gaze,
            keys: &mut self.keys,
            presenter: &mut *renderer,
        })?;

        let stats = renderer.render_frame(pixels.frame_mut(), &mut self.render_timer)?;
        let t = self.timer.now();
        pixels.render()?;
        trace!(
            trial_phase = ?self.session.trial_phase(),
            present_ms = self.timer.elapsed(t).as_secs_f64() * 1e3,
            clear_ms = stats.clear.as_secs_f64() * 1e3,
            draw_ms = stats.draw.as_secs_f64() * 1e3,
            copy_ms = stats.copy.as_secs_f64() * 1e3,
            drawn = stats.drawn,
            "frame"
        );

        if phase.is_finished() && !self.results_saved {
            self.save_results()?;
        }
        if let Some(window) = &self.window {
            window.request_redraw();
        }
        Ok(())
    }

    fn save_results(&mut self) -> Result<()> {
        let path = &self.config.session.results_path;
        write_results(
            path,
            &self.config.session.participant_id,
            self.session.results(),
        )
        .with_context(|| format!("saving results to {}", path.display()))?;
        self.results_saved = true;
        Ok(())
    }

    fn handle_input(&mut self, key: PhysicalKey, event_loop: &ActiveEventLoop) {
        let PhysicalKey::Code(code) = key else {
            return;
        };
        match code {
            KeyCode::Escape => self.cleanup_and_exit(event_loop),
            KeyCode::Space => self.keys.push(ResponseKey::Space),
            KeyCode::Enter | KeyCode::NumpadEnter => self.keys.push(ResponseKey::Enter),
            _ => {}
        }
    }

    fn handle_resize(&mut self, new_size: PhysicalSize<u32>) {
        let (w, h) = (new_size.width, new_size.height);
        if w == 0 || h == 0 {
            return;
        }
        if let Some(pixels) = &mut self.pixels {
            if let Err(e) = pixels.resize_surface(w, h) {
                warn!(error = %e, "failed to resize surface");
            }
            if let Err(e) = pixels.resize_buffer(w, h) {
                warn!(error = %e, "failed to resize buffer");
            }
        }
        if let Some(renderer) = &mut self.renderer {
            if let Err(e) = renderer.resize(w, h) {
                warn!(error = %e, "failed to resize renderer");
            }
        }
        if let Some(gaze) = &mut self.gaze {
            gaze.resize(w, h);
        }
        debug!(width = w, height = h, "display resized");
    }

    fn cleanup_and_exit(&mut self, event_loop: &ActiveEventLoop) {
        if self.should_exit {
            return;
        }
        if self.session.phase() != SessionPhase::Debrief {
            warn!(
                completed = self.session.results().len(),
                "session ended early"
            );
        }
        if !self.results_saved && !self.session.results().is_empty() {
            if let Err(e) = self.save_results() {
                error!(error = %format!("{e:#}"), "results not saved");
            }
        }

        let frames = self.timer.calibration_stats();
        info!(
            fps = frames.effective_fps,
            jitter_ms = frames.jitter_ns / 1e6,
            max_frame_ms = frames.max_frame_time_ns / 1e6,
            "frame timing"
        );
        if let Some(renderer) = &self.renderer {
            for (stage, s) in renderer.component_stats() {
                debug!(
                    stage,
                    avg_ms = s.average_frame_time_ns / 1e6,
                    jitter_ms = s.jitter_ns / 1e6,
                    "render stage timing"
                );
            }
        }

        self.should_exit = true;
        event_loop.exit();
    }
}

/// Reads the configured font, or the first system font found when none is
/// configured.
fn load_font(configured: Option<&Path>) -> Option<FontVec> {
    let candidates: Vec<PathBuf> = match configured {
        Some(p) => vec![p.to_path_buf()],
        None => FALLBACK_FONTS.iter().map(PathBuf::from).collect(),
    };
    for path in candidates {
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) => {
                if configured.is_some() {
                    warn!(path = %path.display(), error = %e, "cannot read font");
                }
                continue;
            }
        };
        match FontVec::try_from_vec(bytes) {
            Ok(font) => {
                info!(path = %path.display(), "font loaded");
                return Some(font);
            }
            Err(e) => warn!(path = %path.display(), error = %e, "not a usable font"),
        }
    }
    warn!("no font available, messages will only be logged");
    None
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none() {
            if let Err(e) = self.create_window_and_surface(event_loop) {
                error!(error = %format!("{e:#}"), "failed to create window and surface");
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => self.cleanup_and_exit(event_loop),
            WindowEvent::RedrawRequested => {
                if let Err(e) = self.frame() {
                    error!(error = %format!("{e:#}"), "frame failed");
                    self.cleanup_and_exit(event_loop);
                }
            }
            WindowEvent::KeyboardInput { event, .. } if event.state.is_pressed() && !event.repeat => {
                self.handle_input(event.physical_key, event_loop);
            }
            WindowEvent::CursorMoved { position, .. } => {
                if let Some(gaze) = &mut self.gaze {
                    gaze.moved((position.x as f32, position.y as f32));
                }
            }
            WindowEvent::CursorLeft { .. } => {
                if let Some(gaze) = &mut self.gaze {
                    gaze.lost();
                }
            }
            WindowEvent::Resized(size) => self.handle_resize(size),
            WindowEvent::ScaleFactorChanged { .. } => {
                if let Some(window) = &self.window {
                    let size = window.inner_size();
                    self.handle_resize(size);
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.should_exit {
            event_loop.exit();
        }
    }
}
