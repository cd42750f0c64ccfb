use ab_glyph::{Font, FontVec, Glyph, PxScale, ScaleFont, point};
use anyhow::{Result, bail};
use bytemuck::cast_slice;
use ior_cache::{Atom, get_text, intern_text};
use ior_core::{Anchor, DisplayState, Layout, Presenter, Stimulus, StimulusType};
use ior_timing::{CalibrationStats, HighPrecisionTimer, Timer};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tiny_skia::{Color, Paint, PathBuilder, Pixmap, PremultipliedColorU8, Rect, Stroke, Transform};
use tracing::{debug, info};

/// Stimulus sizes in pixels plus the two colours of the display.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderStyle {
    pub placeholder_px: f32,
    pub fixation_px: f32,
    pub target_px: f32,
    pub thin_stroke_px: f32,
    pub thick_stroke_px: f32,
    pub text_px: f32,
    pub foreground: [u8; 4],
    pub background: [u8; 4],
}

impl RenderStyle {
    /// Converts visual-angle sizes through `layout`'s pixels per degree.
    pub fn from_degrees(
        layout: &Layout,
        placeholder_deg: f32,
        fixation_deg: f32,
        target_deg: f32,
        thin_stroke_deg: f32,
        thick_stroke_deg: f32,
        text_px: f32,
    ) -> Self {
        Self {
            placeholder_px: layout.deg_to_px(placeholder_deg),
            fixation_px: layout.deg_to_px(fixation_deg),
            target_px: layout.deg_to_px(target_deg),
            thin_stroke_px: layout.deg_to_px(thin_stroke_deg).max(1.0),
            thick_stroke_px: layout.deg_to_px(thick_stroke_deg).max(1.0),
            text_px,
            foreground: [255, 255, 255, 255],
            background: [0, 0, 0, 255],
        }
    }

    fn foreground(&self) -> Color {
        let [r, g, b, a] = self.foreground;
        Color::from_rgba8(r, g, b, a)
    }
}

/// What the next frame shows.
#[derive(Debug, Clone, PartialEq)]
pub enum Scene {
    Blank,
    Display(DisplayState),
    /// Interned message id, see `ior_cache::intern_text`.
    Message(usize),
}

struct TextCache {
    font: FontVec,
    size_px: f32,
    color: Color,
    map: HashMap<Atom, Arc<Pixmap>>,
}

impl TextCache {
    fn new(font: FontVec, size_px: f32, color: Color) -> Self {
        Self {
            font,
            size_px,
            color,
            map: HashMap::new(),
        }
    }

    fn get_or_render(&mut self, atom: Atom) -> Option<Arc<Pixmap>> {
        if let Some(p) = self.map.get(&atom) {
            return Some(Arc::clone(p));
        }
        let pm = Arc::new(render_text_pixmap(
            atom.as_ref(),
            self.size_px,
            &self.font,
            self.color,
        )?);
        self.map.insert(atom, Arc::clone(&pm));
        Some(pm)
    }
}

/// Rasterises `text` into a tight, transparent pixmap. Lines break on `\n`
/// and are centred on the widest one. Returns `None` when nothing in the
/// text has an outline.
pub fn render_text_pixmap<F: Font>(
    text: &str,
    font_size: f32,
    font: &F,
    color: Color,
) -> Option<Pixmap> {
    let scale = PxScale::from(font_size);
    let sf = font.as_scaled(scale);
    let line_height = sf.height() + sf.line_gap();

    let mut glyphs = Vec::<Glyph>::new();
    let mut lines: Vec<(usize, f32)> = Vec::new();
    for (row, line) in text.lines().enumerate() {
        let start = glyphs.len();
        let baseline = sf.ascent() + row as f32 * line_height;
        let mut pen_x = 0.0f32;
        for ch in line.chars() {
            let id = font.glyph_id(ch);
            if glyphs.len() > start {
                pen_x += sf.kern(glyphs[glyphs.len() - 1].id, id);
            }
            glyphs.push(Glyph {
                id,
                scale,
                position: point(pen_x, baseline),
            });
            pen_x += sf.h_advance(id);
        }
        lines.push((start, pen_x));
    }
    let widest = lines.iter().map(|(_, w)| *w).fold(0.0f32, f32::max);
    for (i, (start, width)) in lines.iter().enumerate() {
        let end = lines.get(i + 1).map_or(glyphs.len(), |(s, _)| *s);
        let shift = (widest - width) * 0.5;
        for g in &mut glyphs[*start..end] {
            g.position.x += shift;
        }
    }

    let mut min_x = f32::INFINITY;
    let mut min_y = f32::INFINITY;
    let mut max_x = f32::NEG_INFINITY;
    let mut max_y = f32::NEG_INFINITY;
    for g in &glyphs {
        if let Some(out) = font.outline_glyph(g.clone()) {
            let b = out.px_bounds();
            min_x = min_x.min(b.min.x);
            min_y = min_y.min(b.min.y);
            max_x = max_x.max(b.max.x);
            max_y = max_y.max(b.max.y);
        }
    }
    if min_x == f32::INFINITY {
        return None;
    }

    let w = (max_x.ceil() - min_x.floor()).max(1.0) as u32;
    let h = (max_y.ceil() - min_y.floor()).max(1.0) as u32;
    let mut pm = Pixmap::new(w, h)?;
    let stride = w as usize;
    let dst = pm.pixels_mut();

    let cu = [
        (color.red() * 255.0) as u8,
        (color.green() * 255.0) as u8,
        (color.blue() * 255.0) as u8,
        (color.alpha() * 255.0) as u8,
    ];

    for g in &glyphs {
        let Some(out) = font.outline_glyph(g.clone()) else {
            continue;
        };
        let b = out.px_bounds();
        out.draw(|x, y, cov| {
            if cov <= f32::EPSILON {
                return;
            }
            let ix = (x as f32 + b.min.x - min_x).floor() as i32;
            let iy = (y as f32 + b.min.y - min_y).floor() as i32;
            if ix < 0 || iy < 0 || ix >= w as i32 || iy >= h as i32 {
                return;
            }
            let i = iy as usize * stride + ix as usize;

            // premultiplied source over the existing pixel
            let a_lin = (cov * cu[3] as f32 / 255.0).clamp(0.0, 1.0);
            let sa = (a_lin * 255.0) as u8;
            let inv = 1.0 - a_lin;
            let bg = dst[i];
            let mix =
                |s: u8, d: u8| ((s as f32 * a_lin) as u8).saturating_add((d as f32 * inv) as u8);
            let r = mix(cu[0], bg.red());
            let gr = mix(cu[1], bg.green());
            let bl = mix(cu[2], bg.blue());
            let a = sa.saturating_add((bg.alpha() as f32 * inv) as u8);
            if let Some(px) =
                PremultipliedColorU8::from_rgba(r.min(a), gr.min(a), bl.min(a), a)
            {
                dst[i] = px;
            }
        });
    }

    Some(pm)
}

/// Per-stage timings of one rendered frame.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FrameStats {
    pub clear: Duration,
    pub draw: Duration,
    pub copy: Duration,
    pub total: Duration,
    pub drawn: usize,
}

/// Software renderer for the task display. Every frame clears the offscreen
/// canvas, blits cached stimulus pixmaps for the current scene and copies the
/// result into the window's RGBA frame buffer.
pub struct SkiaRenderer {
    layout: Layout,
    style: RenderStyle,

    shapes: Vec<Pixmap>,
    text_cache: Option<TextCache>,
    scene: Scene,

    canvas: Pixmap,
    clear_buffer: Vec<[u8; 4]>,

    component_timers: HashMap<&'static str, HighPrecisionTimer>,
}

impl SkiaRenderer {
    /// Builds the renderer for a `layout.width` x `layout.height` surface.
    /// Without a font, messages are logged instead of drawn.
    pub fn new(layout: Layout, style: RenderStyle, font: Option<FontVec>) -> Result<Self> {
        let (width, height) = (layout.width, layout.height);
        let Some(canvas) = Pixmap::new(width, height) else {
            bail!("cannot allocate a {width}x{height} canvas");
        };
        let text_cache = font.map(|f| TextCache::new(f, style.text_px, style.foreground()));

        let mut renderer = Self {
            layout,
            shapes: Vec::with_capacity(StimulusType::SHAPE_COUNT),
            text_cache,
            scene: Scene::Blank,
            canvas,
            clear_buffer: vec![style.background; (width * height) as usize],
            style,
            component_timers: ["clear", "draw", "copy"]
                .into_iter()
                .map(|k| (k, HighPrecisionTimer::new()))
                .collect(),
        };
        renderer.cache_shapes()?;
        Ok(renderer)
    }

    pub fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        let Some(canvas) = Pixmap::new(width, height) else {
            bail!("cannot allocate a {width}x{height} canvas");
        };
        self.layout.resize(width, height);
        self.canvas = canvas;
        self.clear_buffer = vec![self.style.background; (width * height) as usize];
        debug!(width, height, "renderer resized");
        Ok(())
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn has_font(&self) -> bool {
        self.text_cache.is_some()
    }

    pub fn canvas(&self) -> &Pixmap {
        &self.canvas
    }

    /// Jitter and average of each stage over the recent frames.
    pub fn component_stats(&self) -> Vec<(&'static str, CalibrationStats)> {
        let mut stats: Vec<_> = self
            .component_timers
            .iter()
            .map(|(k, t)| (*k, t.calibration_stats()))
            .collect();
        stats.sort_by_key(|(k, _)| *k);
        stats
    }

    fn cache_shapes(&mut self) -> Result<()> {
        let shapes = [
            StimulusType::Placeholder { cued: false },
            StimulusType::Placeholder { cued: true },
            StimulusType::FixationCross { cued: false },
            StimulusType::FixationCross { cued: true },
            StimulusType::Target,
        ];
        let mut cache = Vec::with_capacity(shapes.len());
        for s in &shapes {
            debug_assert_eq!(s.cache_id(), cache.len());
            cache.push(self.render_stimulus_to_pixmap(s)?);
        }
        self.shapes = cache;
        Ok(())
    }

    fn render_stimulus_to_pixmap(&self, stimulus: &StimulusType) -> Result<Pixmap> {
        let style = &self.style;
        let stroke_for = |cued: bool| Stroke {
            width: if cued {
                style.thick_stroke_px
            } else {
                style.thin_stroke_px
            },
            ..Stroke::default()
        };
        let (extent, stroke) = match stimulus {
            StimulusType::Placeholder { cued } => (style.placeholder_px, stroke_for(*cued)),
            StimulusType::FixationCross { cued } => (style.fixation_px, stroke_for(*cued)),
            StimulusType::Target => (style.target_px, stroke_for(false)),
            StimulusType::Text { .. } => bail!("text is rendered through the text cache"),
        };

        // room for half the stroke on every side
        let size = (extent + stroke.width).ceil().max(1.0) as u32;
        let Some(mut pixmap) = Pixmap::new(size, size) else {
            bail!("cannot allocate a {size}px stimulus");
        };
        let c = size as f32 * 0.5;
        let half = extent * 0.5;

        let path = match stimulus {
            StimulusType::Placeholder { .. } => {
                Rect::from_xywh(c - half, c - half, extent, extent).map(PathBuilder::from_rect)
            }
            StimulusType::FixationCross { .. } => {
                let mut pb = PathBuilder::new();
                pb.move_to(c - half, c);
                pb.line_to(c + half, c);
                pb.move_to(c, c - half);
                pb.line_to(c, c + half);
                pb.finish()
            }
            _ => PathBuilder::from_circle(c, c, (half - stroke.width * 0.5).max(0.5)),
        };
        let Some(path) = path else {
            bail!("degenerate path for {stimulus:?}");
        };

        let mut paint = Paint::default();
        paint.anti_alias = true;
        paint.set_color(style.foreground());
        pixmap.stroke_path(&path, &paint, &stroke, Transform::identity(), None);
        Ok(pixmap)
    }

    fn position(&self, anchor: Anchor) -> (f32, f32) {
        match anchor {
            Anchor::Placeholder(id) => self.layout.placeholder(id),
            Anchor::Fixation(point) => self.layout.fixation(point),
        }
    }

    /// Draws the current scene and copies it to `frame_buffer`, which must be
    /// a `width * height * 4` RGBA buffer.
    pub fn render_frame<T: Timer<Timestamp = u64>>(
        &mut self,
        frame_buffer: &mut [u8],
        timer: &mut T,
    ) -> Result<FrameStats> {
        let expected = self.canvas.data().len();
        if frame_buffer.len() != expected {
            bail!(
                "frame buffer holds {} bytes, canvas needs {expected}",
                frame_buffer.len()
            );
        }

        let t = timer.now();
        self.canvas
            .data_mut()
            .copy_from_slice(cast_slice(&self.clear_buffer));
        let clear = timer.elapsed(t);

        let t = timer.now();
        let drawn = self.draw_scene();
        let draw = timer.elapsed(t);

        let t = timer.now();
        frame_buffer.copy_from_slice(self.canvas.data());
        let copy = timer.elapsed(t);

        let total = clear + draw + copy;
        for (k, d) in [("clear", clear), ("draw", draw), ("copy", copy)] {
            if let Some(stage) = self.component_timers.get_mut(k) {
                stage.record_frame(d);
            }
        }
        timer.record_frame(total);

        Ok(FrameStats {
            clear,
            draw,
            copy,
            total,
            drawn,
        })
    }

    fn draw_scene(&mut self) -> usize {
        match &self.scene {
            Scene::Blank => 0,
            Scene::Display(display) => {
                let stimuli: Vec<_> = display
                    .stimuli()
                    .map(|(s, anchor)| (s.cache_id(), self.position(anchor)))
                    .collect();
                for (id, pos) in &stimuli {
                    if let Some(src) = self.shapes.get(*id) {
                        blit(&mut self.canvas, src, *pos);
                    }
                }
                stimuli.len()
            }
            Scene::Message(id) => {
                let Some(atom) = get_text(*id) else {
                    return 0;
                };
                let center = self.layout.center();
                match self.text_cache.as_mut().and_then(|c| c.get_or_render(atom)) {
                    Some(pm) => {
                        blit(&mut self.canvas, &pm, center);
                        1
                    }
                    None => 0,
                }
            }
        }
    }
}

impl Presenter for SkiaRenderer {
    fn present(&mut self, display: &DisplayState) {
        self.scene = Scene::Display(display.clone());
    }

    fn show_message(&mut self, text: &str) {
        if self.text_cache.is_none() {
            info!(message = text, "no font loaded, message not drawn");
        }
        self.scene = Scene::Message(intern_text(text));
    }
}

/// Composites premultiplied `src` centred on `pos`, clipped to `dst`.
fn blit(dst: &mut Pixmap, src: &Pixmap, pos: (f32, f32)) {
    let (w, h) = (src.width() as i32, src.height() as i32);
    let (cw, ch) = (dst.width() as i32, dst.height() as i32);
    let x0 = (pos.0 - w as f32 * 0.5).floor() as i32;
    let y0 = (pos.1 - h as f32 * 0.5).floor() as i32;

    let dst_x = x0.max(0);
    let dst_y = y0.max(0);
    let copy_w = (x0 + w).min(cw) - dst_x;
    let copy_h = (y0 + h).min(ch) - dst_y;
    if copy_w <= 0 || copy_h <= 0 {
        return;
    }
    let src_x = (dst_x - x0) as usize;
    let src_y = (dst_y - y0) as usize;
    let (dst_x, dst_y) = (dst_x as usize, dst_y as usize);
    let (copy_w, copy_h) = (copy_w as usize, copy_h as usize);

    let src_stride = src.width() as usize;
    let dst_stride = dst.width() as usize;
    let src_px = src.pixels();
    let dst_px = dst.pixels_mut();

    for row in 0..copy_h {
        let s_row = (src_y + row) * src_stride + src_x;
        let d_row = (dst_y + row) * dst_stride + dst_x;
        for i in 0..copy_w {
            let s = src_px[s_row + i];
            let sa = s.alpha() as u32;
            if sa == 0 {
                continue;
            }
            if sa == 255 {
                dst_px[d_row + i] = s;
                continue;
            }
            let d = dst_px[d_row + i];
            let inv = 255 - sa;
            let over = |sc: u8, dc: u8| (sc as u32 + (dc as u32 * inv + 127) / 255).min(255) as u8;
            let a = over(s.alpha(), d.alpha());
            let px = PremultipliedColorU8::from_rgba(
                over(s.red(), d.red()).min(a),
                over(s.green(), d.green()).min(a),
                over(s.blue(), d.blue()).min(a),
                a,
            );
            if let Some(px) = px {
                dst_px[d_row + i] = px;
            }
        }
    }
}
