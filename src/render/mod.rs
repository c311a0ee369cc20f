pub mod canvas;

use unicode_width::UnicodeWidthStr;

use crate::{
    config,
    format::{self, Emphasis, Segment},
    types::{BodyState, Rgba, Thought, Vec2},
};

pub use canvas::{Cell, CellCanvas, Raster};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FontWeight {
    #[default]
    Normal,
    Bold,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Font {
    pub family: &'static str,
    pub size_px: f32,
    pub weight: FontWeight,
}

impl Default for Font {
    fn default() -> Self {
        Self {
            family: config::FONT_FAMILY,
            size_px: config::FONT_MEDIUM,
            weight: FontWeight::Normal,
        }
    }
}

impl Font {
    pub fn for_emphasis(base_px: f32, emphasis: Emphasis) -> Self {
        let (size_px, weight) = match emphasis {
            Emphasis::Plain => (base_px, FontWeight::Normal),
            Emphasis::Bold => (base_px * config::BOLD_SCALE, FontWeight::Bold),
            Emphasis::Whisper => (base_px * config::WHISPER_SCALE, FontWeight::Normal),
        };
        Self {
            family: config::FONT_FAMILY,
            size_px,
            weight,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Shadow {
    pub color: Rgba,
    pub blur: f32,
    pub offset: Vec2,
}

impl Shadow {
    pub const NONE: Shadow = Shadow {
        color: Rgba::TRANSPARENT,
        blur: 0.0,
        offset: Vec2::ZERO,
    };

    pub const SOFT: Shadow = Shadow {
        color: Rgba::new(0, 0, 0, 0.1),
        blur: 4.0,
        offset: Vec2 { x: 1.0, y: 1.0 },
    };
}

/// Immediate-mode 2D drawing context.
///
/// Coordinates are device-independent pixels, transformed by the current
/// translate/rotate stack. `fill_text` anchors at the left edge of the run and
/// its vertical middle.
pub trait DrawSurface {
    fn size(&self) -> (f32, f32);
    fn resize(&mut self, width: f32, height: f32);
    fn device_pixel_ratio(&self) -> f32;

    fn clear_rect(&mut self, x: f32, y: f32, w: f32, h: f32);
    fn set_fill_style(&mut self, color: Rgba);
    fn fill_rect(&mut self, x: f32, y: f32, w: f32, h: f32);

    fn save(&mut self);
    fn restore(&mut self);
    fn translate(&mut self, x: f32, y: f32);
    fn rotate(&mut self, angle: f32);

    fn set_font(&mut self, font: &Font);
    /// Width of `text` in the current font, or `None` when metrics are unavailable.
    fn measure_text(&self, text: &str) -> Option<f32>;
    fn fill_text(&mut self, text: &str, x: f32, y: f32);
    fn set_shadow(&mut self, shadow: Shadow);
}

/// Surfaces that can hand their current frame to an export writer.
pub trait Rasterize {
    fn rasterize(&self) -> Raster;
}

#[derive(Clone, Debug, PartialEq)]
pub struct PlacedSegment<'a> {
    pub segment: &'a Segment,
    pub font: Font,
    pub fill: Rgba,
    pub x: f32,
    pub width: f32,
}

/// Width of the whole run, or `None` if any segment could not be measured.
pub fn measure_run<S>(surface: &mut S, segments: &[Segment], base_px: f32) -> Option<f32>
where
    S: DrawSurface + ?Sized,
{
    surface.save();
    let mut total = 0.0;
    let mut ok = true;
    for segment in segments {
        surface.set_font(&Font::for_emphasis(base_px, segment.emphasis));
        match surface.measure_text(&segment.text) {
            Some(w) if w.is_finite() && w >= 0.0 => total += w,
            _ => {
                ok = false;
                break;
            }
        }
    }
    surface.restore();
    ok.then_some(total)
}

/// Lays segments left to right so the run is centred on x = 0.
pub fn layout_segments<'a, S>(
    surface: &mut S,
    segments: &'a [Segment],
    base_px: f32,
    color: Rgba,
) -> Vec<PlacedSegment<'a>>
where
    S: DrawSurface + ?Sized,
{
    surface.save();
    let mut placed: Vec<PlacedSegment<'a>> = segments
        .iter()
        .map(|segment| {
            let font = Font::for_emphasis(base_px, segment.emphasis);
            surface.set_font(&font);
            let width = surface
                .measure_text(&segment.text)
                .filter(|w| w.is_finite() && *w >= 0.0)
                .unwrap_or_else(|| estimate_width(&segment.text, font.size_px));
            let fill = if segment.is_whisper() {
                color.with_alpha(color.a * config::WHISPER_ALPHA)
            } else {
                color
            };
            PlacedSegment {
                segment,
                font,
                fill,
                x: 0.0,
                width,
            }
        })
        .collect();
    surface.restore();

    let total: f32 = placed.iter().map(|p| p.width).sum();
    let mut cursor = -total / 2.0;
    for p in &mut placed {
        p.x = cursor;
        cursor += p.width;
    }
    placed
}

fn estimate_width(text: &str, size_px: f32) -> f32 {
    text.width() as f32 * size_px * 0.6
}

/// One thought ready to draw, paired with its body's latest transform.
#[derive(Clone, Copy, Debug)]
pub struct FrameItem<'a> {
    pub thought: &'a Thought,
    pub state: BodyState,
    pub highlighted: bool,
}

pub const HIGHLIGHT: Rgba = Rgba::rgb(0x0d, 0x6e, 0xfd);

pub fn ink_for(thought: &Thought, highlighted: bool) -> Rgba {
    if highlighted {
        HIGHLIGHT
    } else if thought.color == Rgba::BLACK {
        Rgba::INK
    } else {
        thought.color
    }
}

/// Clears the surface and draws every item at its body transform.
pub fn draw_frame<'a, S, I>(surface: &mut S, items: I)
where
    S: DrawSurface + ?Sized,
    I: IntoIterator<Item = FrameItem<'a>>,
{
    let (width, height) = surface.size();
    surface.clear_rect(0.0, 0.0, width, height);
    surface.set_fill_style(Rgba::WHITE);
    surface.fill_rect(0.0, 0.0, width, height);

    for item in items {
        let segments = format::parse(&item.thought.text);
        if segments.is_empty() {
            continue;
        }
        let color = ink_for(item.thought, item.highlighted);

        surface.save();
        surface.translate(item.state.position.x, item.state.position.y);
        surface.rotate(item.state.angle);
        surface.set_shadow(Shadow::SOFT);

        let placed = layout_segments(surface, &segments, item.thought.size.font_px(), color);
        for p in &placed {
            surface.set_font(&p.font);
            surface.set_fill_style(p.fill);
            surface.fill_text(&p.segment.text, p.x, 0.0);
        }
        surface.restore();
    }
}
