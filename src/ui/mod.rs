use std::{
    io::{self, Stdout},
    path::PathBuf,
    time::{Duration, Instant},
};

use anyhow::Result;
use crossterm::{
    event::{
        self, DisableMouseCapture, EnableMouseCapture, Event as CrosstermEvent, KeyCode,
        KeyEventKind, KeyModifiers, MouseButton, MouseEvent, MouseEventKind,
    },
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    Frame, Terminal,
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
};

use crate::{
    commands::{BoardPort, CommandRouter, Outcome, ThoughtList, command_help_summary},
    config::{self, Settings},
    error::WhiteboardError,
    render::{Cell, CellCanvas, canvas::WIDE_TAIL},
    types::{PositionMap, Rgba, Vec2},
    whiteboard::{PointerCursor, Whiteboard},
};

struct TerminalSession {
    terminal: Terminal<CrosstermBackend<Stdout>>,
}

impl TerminalSession {
    fn new() -> Result<Self> {
        enable_raw_mode()?;

        let mut out = io::stdout();
        if let Err(err) = execute!(out, EnterAlternateScreen, EnableMouseCapture) {
            let _ = disable_raw_mode();
            return Err(err.into());
        }

        let terminal = match Terminal::new(CrosstermBackend::new(out)) {
            Ok(t) => t,
            Err(err) => {
                let _ = disable_raw_mode();
                let _ = execute!(io::stdout(), LeaveAlternateScreen, DisableMouseCapture);
                return Err(err.into());
            }
        };

        Ok(Self { terminal })
    }
}

impl Drop for TerminalSession {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = execute!(
            self.terminal.backend_mut(),
            LeaveAlternateScreen,
            DisableMouseCapture
        );
        let _ = self.terminal.show_cursor();
    }
}

/// Stand-in board while no canvas is mounted. Thoughts still land in the
/// list and get bodies once a mount succeeds.
struct Unmounted;

impl BoardPort for Unmounted {
    fn sync(&mut self, _thoughts: &ThoughtList) {}

    fn snapshot_positions(&self) -> PositionMap {
        PositionMap::new()
    }

    fn restore_positions(&mut self, _positions: &PositionMap) -> usize {
        0
    }

    fn shake(&mut self) {}

    fn export(&mut self) -> Result<PathBuf, WhiteboardError> {
        Err(WhiteboardError::SurfaceUnavailable {
            width: 0.0,
            height: 0.0,
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Areas {
    header: Rect,
    frame: Rect,
    canvas: Rect,
    input: Rect,
}

impl Areas {
    fn split(area: Rect) -> Self {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3),
                Constraint::Min(3),
                Constraint::Length(3),
            ])
            .split(area);
        Self {
            header: chunks[0],
            frame: chunks[1],
            canvas: Block::default().borders(Borders::ALL).inner(chunks[1]),
            input: chunks[2],
        }
    }
}

fn canvas_px(area: Rect) -> (f32, f32) {
    (
        area.width as f32 * config::CELL_PX_WIDTH,
        area.height as f32 * config::CELL_PX_HEIGHT,
    )
}

/// Centre of a terminal cell in canvas pixels. Cells outside the canvas map
/// to points outside it.
fn cell_to_px(area: Rect, column: u16, row: u16) -> Vec2 {
    Vec2::new(
        (column as f32 - area.x as f32 + 0.5) * config::CELL_PX_WIDTH,
        (row as f32 - area.y as f32 + 0.5) * config::CELL_PX_HEIGHT,
    )
}

struct App {
    settings: Settings,
    router: CommandRouter,
    board: Option<Whiteboard<CellCanvas>>,
    areas: Areas,
    input: String,
    status: Option<String>,
    sim_steps: u32,
    frames: u32,
    sim_fps: f32,
    render_fps: f32,
    last_fps_sample: Instant,
}

impl App {
    fn new(settings: Settings, area: Rect, now: Instant) -> Self {
        let mut app = Self {
            router: CommandRouter::from_settings(&settings),
            settings,
            board: None,
            areas: Areas::split(area),
            input: String::new(),
            status: None,
            sim_steps: 0,
            frames: 0,
            sim_fps: 0.0,
            render_fps: 0.0,
            last_fps_sample: now,
        };
        app.mount(now);
        app
    }

    fn mount(&mut self, now: Instant) {
        let (width, height) = canvas_px(self.areas.canvas);
        let surface = (width > 0.0 && height > 0.0).then(|| CellCanvas::new(width, height));
        match Whiteboard::mount(width, height, surface, &self.settings, now) {
            Ok(mut board) => {
                board.observe(self.router.thoughts());
                self.board = Some(board);
                self.status = None;
            }
            Err(err) => {
                self.board = None;
                self.status = Some(err.to_string());
            }
        }
    }

    fn resize(&mut self, area: Rect, now: Instant) {
        self.areas = Areas::split(area);
        let (width, height) = canvas_px(self.areas.canvas);
        match self.board.as_mut() {
            Some(board) => board.resize(width, height),
            None => self.mount(now),
        }
    }

    /// Returns true when a new canvas frame was drawn.
    fn tick(&mut self, now: Instant) -> bool {
        let Some(board) = self.board.as_mut() else {
            return false;
        };
        board.observe(self.router.thoughts());
        let report = board.pump(now);
        self.sim_steps += report.steps;
        if report.rendered {
            self.frames += 1;
        }

        let elapsed = now.saturating_duration_since(self.last_fps_sample);
        if elapsed >= Duration::from_secs(1) {
            let secs = elapsed.as_secs_f32();
            self.sim_fps = self.sim_steps as f32 / secs;
            self.render_fps = self.frames as f32 / secs;
            self.sim_steps = 0;
            self.frames = 0;
            self.last_fps_sample = now;
        }
        report.rendered
    }

    fn submit(&mut self) {
        let input = std::mem::take(&mut self.input);
        let outcome = match self.board.as_mut() {
            Some(board) => self.router.submit(&input, board),
            None => self.router.submit(&input, &mut Unmounted),
        };
        if let Outcome::ExportFailed(err) = &outcome {
            self.status = Some(format!("Export failed: {err}"));
        } else if let Some(status) = outcome.status() {
            self.status = Some(status);
        }
    }

    fn mouse(&mut self, mouse: MouseEvent) {
        let Some(board) = self.board.as_mut() else {
            return;
        };
        let point = cell_to_px(self.areas.canvas, mouse.column, mouse.row);
        match mouse.kind {
            MouseEventKind::Down(MouseButton::Left) => board.pointer_down(point),
            MouseEventKind::Drag(MouseButton::Left) | MouseEventKind::Moved => {
                board.pointer_move(point)
            }
            MouseEventKind::Up(MouseButton::Left) => board.pointer_up(),
            _ => {}
        }
    }

    fn cursor(&self) -> PointerCursor {
        self.board
            .as_ref()
            .map(Whiteboard::cursor)
            .unwrap_or_default()
    }
}

pub fn run(settings: Settings) -> Result<()> {
    let mut session = TerminalSession::new()?;
    let terminal = &mut session.terminal;

    let mut app = App::new(settings, terminal.size()?, Instant::now());
    let mut dirty = true;

    loop {
        let now = Instant::now();
        if app.tick(now) {
            dirty = true;
        }

        if dirty {
            terminal.draw(|frame| draw(frame, &app))?;
            dirty = false;
        }

        if !event::poll(Duration::from_millis(1))? {
            continue;
        }
        while event::poll(Duration::from_millis(0))? {
            dirty = true;
            match event::read()? {
                CrosstermEvent::Key(key) if key.kind == KeyEventKind::Press => match key.code {
                    KeyCode::Esc => return Ok(()),
                    KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                        return Ok(());
                    }
                    KeyCode::Backspace => {
                        app.input.pop();
                    }
                    KeyCode::Enter => app.submit(),
                    KeyCode::Char(ch) if !ch.is_control() => app.input.push(ch),
                    _ => {}
                },
                CrosstermEvent::Mouse(mouse) => app.mouse(mouse),
                CrosstermEvent::Resize(width, height) => {
                    app.resize(Rect::new(0, 0, width, height), Instant::now());
                }
                _ => {}
            }
        }
    }
}

fn draw(frame: &mut Frame, app: &App) {
    let status = app.status.as_deref().unwrap_or("");
    let header = Paragraph::new(format!(
        "thoughts: {} | undo: {} | cursor: {} | sim fps: {:.1} | render fps: {:.1} | {}",
        app.router.thoughts().len(),
        app.router.history().len(),
        app.cursor().label(),
        app.sim_fps,
        app.render_fps,
        status,
    ))
    .block(Block::default().borders(Borders::ALL).title("thoughtboard"));
    frame.render_widget(header, app.areas.header);

    let lines = app
        .board
        .as_ref()
        .and_then(Whiteboard::surface)
        .map(canvas_lines)
        .unwrap_or_default();
    let canvas = Paragraph::new(lines).block(Block::default().borders(Borders::ALL));
    frame.render_widget(canvas, app.areas.frame);

    let hint = if app.input.starts_with('/') {
        format!(" | {}", command_help_summary())
    } else {
        String::new()
    };
    let input = Paragraph::new(app.input.as_str()).block(
        Block::default()
            .borders(Borders::ALL)
            .title(format!("{} chars{hint}", app.input.chars().count())),
    );
    frame.render_widget(input, app.areas.input);
}

fn canvas_lines(canvas: &CellCanvas) -> Vec<Line<'static>> {
    (0..canvas.rows())
        .map(|row| {
            let mut spans: Vec<Span<'static>> = Vec::new();
            let mut run = String::new();
            let mut run_style: Option<Style> = None;
            for col in 0..canvas.cols() {
                let Some(cell) = canvas.cell(col, row) else {
                    continue;
                };
                if cell.ch == WIDE_TAIL {
                    continue;
                }
                let style = cell_style(cell);
                if run_style.is_some_and(|s| s != style) {
                    let text = std::mem::take(&mut run);
                    spans.push(Span::styled(text, run_style.unwrap_or_default()));
                }
                run_style = Some(style);
                run.push(cell.ch);
            }
            if let Some(style) = run_style {
                spans.push(Span::styled(run, style));
            }
            Line::from(spans)
        })
        .collect()
}

fn cell_style(cell: &Cell) -> Style {
    let bg = if cell.bg.a > 0.0 { cell.bg } else { Rgba::WHITE };
    let mut style = Style::default().fg(to_color(cell.fg)).bg(to_color(bg));
    if cell.bold {
        style = style.add_modifier(Modifier::BOLD);
    }
    if cell.dim {
        style = style.add_modifier(Modifier::DIM);
    }
    style
}

fn to_color(c: Rgba) -> Color {
    Color::Rgb(c.r, c.g, c.b)
}
