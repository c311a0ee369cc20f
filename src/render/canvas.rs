//! Character-cell rasterizer for terminal hosts.
//!
//! Logical pixels map onto a grid of `CELL_PX_WIDTH` x `CELL_PX_HEIGHT`
//! cells. Glyphs are fixed pitch, so font size only affects weight styling.

use serde::Serialize;
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use super::{DrawSurface, Font, FontWeight, Rasterize, Shadow};
use crate::{
    config,
    types::{Rgba, Vec2},
};

/// Placeholder for the right half of a double-width glyph.
pub const WIDE_TAIL: char = '\0';

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Cell {
    pub ch: char,
    pub fg: Rgba,
    pub bg: Rgba,
    pub bold: bool,
    pub dim: bool,
}

impl Cell {
    const BLANK: Cell = Cell {
        ch: ' ',
        fg: Rgba::INK,
        bg: Rgba::WHITE,
        bold: false,
        dim: false,
    };
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct Affine {
    a: f32,
    b: f32,
    c: f32,
    d: f32,
    e: f32,
    f: f32,
}

impl Affine {
    const IDENTITY: Affine = Affine {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 1.0,
        e: 0.0,
        f: 0.0,
    };

    fn apply(&self, p: Vec2) -> Vec2 {
        Vec2::new(
            self.a * p.x + self.c * p.y + self.e,
            self.b * p.x + self.d * p.y + self.f,
        )
    }

    fn translate(&mut self, x: f32, y: f32) {
        self.e += self.a * x + self.c * y;
        self.f += self.b * x + self.d * y;
    }

    fn rotate(&mut self, angle: f32) {
        let (sin, cos) = angle.sin_cos();
        let Affine { a, b, c, d, .. } = *self;
        self.a = a * cos + c * sin;
        self.b = b * cos + d * sin;
        self.c = c * cos - a * sin;
        self.d = d * cos - b * sin;
    }
}

#[derive(Clone, Debug)]
struct DrawState {
    transform: Affine,
    fill: Rgba,
    font: Font,
    shadow: Shadow,
}

impl Default for DrawState {
    fn default() -> Self {
        Self {
            transform: Affine::IDENTITY,
            fill: Rgba::BLACK,
            font: Font::default(),
            shadow: Shadow::NONE,
        }
    }
}

/// Snapshot of the canvas handed to the export writer.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Raster {
    pub width_px: u32,
    pub height_px: u32,
    pub cols: u16,
    pub rows: u16,
    pub lines: Vec<String>,
}

#[derive(Debug)]
pub struct CellCanvas {
    width: f32,
    height: f32,
    cols: u16,
    rows: u16,
    pixel_ratio: f32,
    cells: Vec<Cell>,
    state: DrawState,
    stack: Vec<DrawState>,
}

impl CellCanvas {
    pub fn new(width: f32, height: f32) -> Self {
        let mut canvas = Self {
            width: 0.0,
            height: 0.0,
            cols: 0,
            rows: 0,
            pixel_ratio: 1.0,
            cells: Vec::new(),
            state: DrawState::default(),
            stack: Vec::new(),
        };
        canvas.resize(width, height);
        canvas
    }

    /// Canvas covering exactly `cols` x `rows` terminal cells.
    pub fn for_cells(cols: u16, rows: u16) -> Self {
        Self::new(
            cols as f32 * config::CELL_PX_WIDTH,
            rows as f32 * config::CELL_PX_HEIGHT,
        )
    }

    pub fn with_pixel_ratio(mut self, ratio: f32) -> Self {
        if ratio.is_finite() && ratio > 0.0 {
            self.pixel_ratio = ratio;
        }
        self
    }

    pub fn cols(&self) -> u16 {
        self.cols
    }

    pub fn rows(&self) -> u16 {
        self.rows
    }

    pub fn cell(&self, col: u16, row: u16) -> Option<&Cell> {
        if col >= self.cols || row >= self.rows {
            return None;
        }
        self.cells.get(row as usize * self.cols as usize + col as usize)
    }

    pub fn row_text(&self, row: u16) -> String {
        (0..self.cols)
            .filter_map(|col| self.cell(col, row))
            .map(|cell| cell.ch)
            .filter(|&ch| ch != WIDE_TAIL)
            .collect()
    }

    fn cell_at(&self, p: Vec2) -> Option<(u16, u16)> {
        if !(p.x.is_finite() && p.y.is_finite()) || p.x < 0.0 || p.y < 0.0 {
            return None;
        }
        let col = (p.x / config::CELL_PX_WIDTH).floor();
        let row = (p.y / config::CELL_PX_HEIGHT).floor();
        if col >= self.cols as f32 || row >= self.rows as f32 {
            return None;
        }
        Some((col as u16, row as u16))
    }

    fn cell_mut(&mut self, col: u16, row: u16) -> Option<&mut Cell> {
        if col >= self.cols || row >= self.rows {
            return None;
        }
        let idx = row as usize * self.cols as usize + col as usize;
        self.cells.get_mut(idx)
    }

    /// Cells whose centres fall inside the transformed rectangle's bounds.
    fn covered(&self, x: f32, y: f32, w: f32, h: f32) -> Vec<(u16, u16)> {
        let t = &self.state.transform;
        let corners = [
            t.apply(Vec2::new(x, y)),
            t.apply(Vec2::new(x + w, y)),
            t.apply(Vec2::new(x, y + h)),
            t.apply(Vec2::new(x + w, y + h)),
        ];
        let min_x = corners.iter().map(|p| p.x).fold(f32::INFINITY, f32::min);
        let max_x = corners.iter().map(|p| p.x).fold(f32::NEG_INFINITY, f32::max);
        let min_y = corners.iter().map(|p| p.y).fold(f32::INFINITY, f32::min);
        let max_y = corners.iter().map(|p| p.y).fold(f32::NEG_INFINITY, f32::max);

        let mut out = Vec::new();
        for row in 0..self.rows {
            let cy = (row as f32 + 0.5) * config::CELL_PX_HEIGHT;
            if cy < min_y || cy > max_y {
                continue;
            }
            for col in 0..self.cols {
                let cx = (col as f32 + 0.5) * config::CELL_PX_WIDTH;
                if cx >= min_x && cx <= max_x {
                    out.push((col, row));
                }
            }
        }
        out
    }

    fn plot_glyphs(&mut self, text: &str, x: f32, y: f32, offset: Vec2, fg: Rgba, shadow: bool) {
        let bold = self.state.font.weight == FontWeight::Bold;
        let dim = fg.a < 1.0;
        let mut advance = 0.0;
        for ch in text.chars() {
            let cw = ch.width().unwrap_or(0) as f32 * config::CELL_PX_WIDTH;
            if cw == 0.0 {
                continue;
            }
            let local = Vec2::new(x + advance + config::CELL_PX_WIDTH / 2.0, y);
            advance += cw;
            let Some((col, row)) = self.cell_at(self.state.transform.apply(local) + offset) else {
                continue;
            };
            let wide = cw > config::CELL_PX_WIDTH;
            let Some(cell) = self.cell_mut(col, row) else {
                continue;
            };
            if shadow && cell.ch != ' ' {
                continue;
            }
            cell.ch = ch;
            cell.fg = blend(fg, cell.bg);
            cell.bold = bold && !shadow;
            cell.dim = dim || shadow;
            if wide {
                if let Some(tail) = self.cell_mut(col + 1, row) {
                    tail.ch = WIDE_TAIL;
                }
            }
        }
    }
}

/// Composites `top` over an opaque `bottom`.
fn blend(top: Rgba, bottom: Rgba) -> Rgba {
    let a = top.a.clamp(0.0, 1.0);
    let mix = |t: u8, b: u8| (t as f32 * a + b as f32 * (1.0 - a)).round() as u8;
    Rgba::rgb(mix(top.r, bottom.r), mix(top.g, bottom.g), mix(top.b, bottom.b))
}

impl Rasterize for CellCanvas {
    fn rasterize(&self) -> Raster {
        Raster {
            width_px: (self.width * self.pixel_ratio).round() as u32,
            height_px: (self.height * self.pixel_ratio).round() as u32,
            cols: self.cols,
            rows: self.rows,
            lines: (0..self.rows).map(|row| self.row_text(row)).collect(),
        }
    }
}

impl DrawSurface for CellCanvas {
    fn size(&self) -> (f32, f32) {
        (self.width, self.height)
    }

    fn resize(&mut self, width: f32, height: f32) {
        self.width = width.max(0.0);
        self.height = height.max(0.0);
        self.cols = (self.width / config::CELL_PX_WIDTH).floor().min(u16::MAX as f32) as u16;
        self.rows = (self.height / config::CELL_PX_HEIGHT).floor().min(u16::MAX as f32) as u16;
        let len = self.cols as usize * self.rows as usize;
        self.cells.clear();
        self.cells.resize(len, Cell::BLANK);
        self.state = DrawState::default();
        self.stack.clear();
    }

    fn device_pixel_ratio(&self) -> f32 {
        self.pixel_ratio
    }

    fn clear_rect(&mut self, x: f32, y: f32, w: f32, h: f32) {
        for (col, row) in self.covered(x, y, w, h) {
            if let Some(cell) = self.cell_mut(col, row) {
                *cell = Cell {
                    bg: Rgba::TRANSPARENT,
                    ..Cell::BLANK
                };
            }
        }
    }

    fn set_fill_style(&mut self, color: Rgba) {
        self.state.fill = color;
    }

    fn fill_rect(&mut self, x: f32, y: f32, w: f32, h: f32) {
        let fill = self.state.fill;
        for (col, row) in self.covered(x, y, w, h) {
            if let Some(cell) = self.cell_mut(col, row) {
                let under = if cell.bg.a > 0.0 { cell.bg } else { Rgba::WHITE };
                *cell = Cell {
                    bg: blend(fill, under),
                    ..Cell::BLANK
                };
            }
        }
    }

    fn save(&mut self) {
        self.stack.push(self.state.clone());
    }

    fn restore(&mut self) {
        if let Some(state) = self.stack.pop() {
            self.state = state;
        }
    }

    fn translate(&mut self, x: f32, y: f32) {
        self.state.transform.translate(x, y);
    }

    fn rotate(&mut self, angle: f32) {
        self.state.transform.rotate(angle);
    }

    fn set_font(&mut self, font: &Font) {
        self.state.font = font.clone();
    }

    fn measure_text(&self, text: &str) -> Option<f32> {
        Some(text.width() as f32 * config::CELL_PX_WIDTH)
    }

    fn fill_text(&mut self, text: &str, x: f32, y: f32) {
        let shadow = self.state.shadow;
        let offset = Vec2::new(
            (shadow.offset.x / config::CELL_PX_WIDTH).round() * config::CELL_PX_WIDTH,
            (shadow.offset.y / config::CELL_PX_HEIGHT).round() * config::CELL_PX_HEIGHT,
        );
        if shadow.color.a > 0.0 && offset != Vec2::ZERO {
            self.plot_glyphs(text, x, y, offset, shadow.color, true);
        }
        let fill = self.state.fill;
        self.plot_glyphs(text, x, y, Vec2::ZERO, fill, false);
    }

    fn set_shadow(&mut self, shadow: Shadow) {
        self.state.shadow = shadow;
    }
}
