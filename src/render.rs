use crossterm::{
    event::{DisableMouseCapture, EnableMouseCapture},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    Frame, Terminal,
    backend::{Backend, CrosstermBackend},
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Bar, BarChart, BarGroup, Block, Borders, Paragraph},
};
use std::io::{self, Stdout};

use crate::error::{Result, VisualizerError};
use crate::scheduler::DrawSurface;
use crate::types::{Band, BarDraw, PipelineConfig};

/// Bar heights are expressed in percent of the chart area.
pub const FULL_SCALE: f32 = 100.0;

pub type TerminalType = Terminal<CrosstermBackend<Stdout>>;

pub fn init_terminal() -> Result<TerminalType> {
    let setup = || -> io::Result<TerminalType> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
        Terminal::new(CrosstermBackend::new(stdout))
    };
    setup().map_err(surface_error)
}

pub fn restore_terminal() -> Result<()> {
    let teardown = || -> io::Result<()> {
        disable_raw_mode()?;
        execute!(io::stdout(), LeaveAlternateScreen, DisableMouseCapture)
    };
    teardown().map_err(surface_error)
}

fn surface_error(err: io::Error) -> VisualizerError {
    VisualizerError::Surface(err.to_string())
}

/// Everything one frame needs to paint, collected between `begin_frame`
/// and `end_frame`.
#[derive(Clone, Debug, Default)]
pub struct FrameState {
    pub config: PipelineConfig,
    pub bands: Vec<Band>,
    pub heights: Vec<f32>,
    pub source_name: String,
}

/// Draws bars into any ratatui backend.
pub struct TerminalSurface<B: Backend> {
    terminal: Terminal<B>,
    frame: FrameState,
}

impl<B: Backend> TerminalSurface<B> {
    pub fn new(terminal: Terminal<B>) -> Self {
        Self {
            terminal,
            frame: FrameState::default(),
        }
    }

    pub fn set_source_name(&mut self, name: impl Into<String>) {
        self.frame.source_name = name.into();
    }
}

impl<B: Backend> DrawSurface for TerminalSurface<B> {
    fn begin_frame(&mut self, config: &PipelineConfig, bands: &[Band]) -> Result<()> {
        self.frame.config = config.clone();
        if self.frame.bands.as_slice() != bands {
            self.frame.bands = bands.to_vec();
        }
        self.frame.heights.clear();
        self.frame.heights.resize(bands.len(), 0.0);
        Ok(())
    }

    fn issue_draw(&mut self, bar: BarDraw) -> Result<()> {
        if bar.total_bars != self.frame.heights.len() {
            self.frame.heights.resize(bar.total_bars, 0.0);
        }
        let slot = self.frame.heights.get_mut(bar.index).ok_or_else(|| {
            VisualizerError::Surface(format!(
                "bar {} out of range for {} bars",
                bar.index, bar.total_bars
            ))
        })?;
        *slot = bar.height;
        Ok(())
    }

    fn end_frame(&mut self) -> Result<()> {
        let frame = &self.frame;
        self.terminal
            .draw(|f| draw_ui(f, frame))
            .map(|_| ())
            .map_err(|e| VisualizerError::Surface(e.to_string()))
    }

    fn resize_viewport(&mut self, width: u16, height: u16) -> Result<()> {
        self.terminal
            .resize(Rect::new(0, 0, width, height))
            .map_err(|e| VisualizerError::Surface(e.to_string()))
    }
}

const GRADIENT: [(f32, [f32; 3]); 4] = [
    (0.0, [64.0, 224.0, 208.0]),
    (0.33, [128.0, 160.0, 128.0]),
    (0.66, [64.0, 224.0, 224.0]),
    (1.0, [128.0, 96.0, 160.0]),
];

/// Bar colour for a level in `[0, 1]`, interpolated between gradient stops.
fn level_color(level: f32) -> Color {
    let level = if level.is_finite() { level.clamp(0.0, 1.0) } else { 0.0 };
    let upper = GRADIENT
        .iter()
        .position(|&(stop, _)| level <= stop)
        .unwrap_or(GRADIENT.len() - 1)
        .max(1);
    let (lo_stop, lo) = GRADIENT[upper - 1];
    let (hi_stop, hi) = GRADIENT[upper];
    let t = (level - lo_stop) / (hi_stop - lo_stop);
    let channel = |i: usize| (lo[i] + (hi[i] - lo[i]) * t).round() as u8;
    Color::Rgb(channel(0), channel(1), channel(2))
}

pub fn draw_ui(f: &mut Frame, frame: &FrameState) {
    let size = f.area();

    if size.width < 30 || size.height < 12 {
        let error_msg = Paragraph::new("Terminal too small!\nMinimum: 30x12")
            .style(Style::default().fg(Color::Red))
            .alignment(Alignment::Center)
            .block(Block::default().borders(Borders::ALL));
        f.render_widget(error_msg, size);
        return;
    }

    let main_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(6),    // bars
            Constraint::Length(3), // frequency labels
            Constraint::Length(4), // status
        ])
        .split(size);

    draw_bars(f, main_layout[0], frame);
    draw_frequency_labels(f, main_layout[1], frame);
    draw_status_bar(f, main_layout[2], frame);
}

/// Number of chart columns used for `bars` bands in `width` cells. Never
/// more than one column per cell.
pub fn column_count(width: u16, bars: usize) -> usize {
    bars.min(width as usize).max(1)
}

/// Column that shows band `index` out of `bars` when they are folded onto
/// `columns` columns. Every column gets at least one band.
pub fn column_of(index: usize, bars: usize, columns: usize) -> usize {
    if bars <= columns {
        index
    } else {
        index * columns / bars
    }
}

/// Folds band heights onto at most `columns` columns, keeping the loudest
/// band of each column.
pub fn fold_columns(heights: &[f32], columns: usize) -> Vec<f32> {
    if heights.len() <= columns {
        return heights.to_vec();
    }
    let mut folded = vec![0.0f32; columns];
    for (i, &h) in heights.iter().enumerate() {
        let slot = &mut folded[column_of(i, heights.len(), columns)];
        *slot = slot.max(h);
    }
    folded
}

/// Column width and gap that fit `bars` bars into `width` cells.
pub fn bar_geometry(width: u16, bars: usize) -> (u16, u16) {
    if bars == 0 {
        return (1, 0);
    }
    let per_bar = (width as usize / bars).max(1);
    if per_bar >= 3 {
        ((per_bar - 1) as u16, 1)
    } else {
        (per_bar as u16, 0)
    }
}

fn draw_bars(f: &mut Frame, area: Rect, frame: &FrameState) {
    let block = Block::default().borders(Borders::ALL);
    let inner = block.inner(area);
    let columns = column_count(inner.width, frame.heights.len());

    let mut title = format!(" {} bands", frame.heights.len());
    if columns < frame.heights.len() {
        title.push_str(&format!(" in {columns} columns"));
    }
    title.push_str(&format!(
        " · {} · {} ",
        frame.config.strategy.label(),
        frame.config.normalize_mode.label()
    ));
    let block = block
        .title(title)
        .border_style(Style::default().fg(Color::Rgb(96, 160, 192)));
    f.render_widget(block, area);

    if frame.heights.is_empty() {
        let waiting = Paragraph::new("Waiting for audio data...")
            .style(Style::default().fg(Color::Rgb(128, 128, 128)))
            .alignment(Alignment::Center);
        f.render_widget(waiting, inner);
        return;
    }

    let bars: Vec<Bar> = fold_columns(&frame.heights, columns)
        .into_iter()
        .map(|h| {
            let level = h.clamp(0.0, FULL_SCALE);
            Bar::default()
                .value(level.round() as u64)
                .text_value(String::new())
                .style(Style::default().fg(level_color(level / FULL_SCALE)))
        })
        .collect();

    let (bar_width, bar_gap) = bar_geometry(inner.width, bars.len());
    let chart = BarChart::default()
        .data(BarGroup::default().bars(&bars))
        .bar_width(bar_width)
        .bar_gap(bar_gap)
        .max(FULL_SCALE as u64);
    f.render_widget(chart, inner);
}

fn format_hz(freq: f32) -> String {
    if freq >= 1000.0 {
        format!("{:.1}k", freq / 1000.0)
    } else {
        format!("{:.0}", freq)
    }
}

fn draw_frequency_labels(f: &mut Frame, area: Rect, frame: &FrameState) {
    let label_block = Block::default()
        .borders(Borders::LEFT | Borders::RIGHT | Borders::BOTTOM)
        .border_style(Style::default().fg(Color::Rgb(96, 160, 192)));
    let inner = label_block.inner(area);
    f.render_widget(label_block, area);

    let freq_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1), Constraint::Length(1)])
        .split(inner);

    let bands = &frame.bands;
    let label_spacing = 10;
    let num_labels = (inner.width as usize / label_spacing).min(6).min(bands.len());
    if num_labels > 1 {
        let columns = column_count(freq_layout[0].width, bands.len());
        let (bar_width, bar_gap) = bar_geometry(freq_layout[0].width, columns);
        let column = (bar_width + bar_gap) as usize;
        for i in 0..num_labels {
            let idx = i * (bands.len() - 1) / (num_labels - 1);
            let text = format_hz(bands[idx].start);
            let pos = (column_of(idx, bands.len(), columns) * column) as u16;
            let width = text.len() as u16;
            let x = pos.min(freq_layout[0].width.saturating_sub(width));
            let label_area = Rect {
                x: freq_layout[0].x + x,
                y: freq_layout[0].y,
                width: width.min(freq_layout[0].width),
                height: 1,
            };
            let label = Paragraph::new(text).style(Style::default().fg(Color::Rgb(160, 160, 160)));
            f.render_widget(label, label_area);
        }
    }

    let subtitle = Paragraph::new("Band start (Hz)")
        .style(Style::default().fg(Color::Rgb(128, 128, 128)))
        .alignment(Alignment::Center);
    f.render_widget(subtitle, freq_layout[1]);
}

fn draw_status_bar(f: &mut Frame, area: Rect, frame: &FrameState) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Rgb(96, 160, 192)));
    let inner = block.inner(area);
    f.render_widget(block, area);

    let key = |k: &'static str| {
        Span::styled(
            k,
            Style::default()
                .fg(Color::Rgb(255, 255, 0))
                .add_modifier(Modifier::BOLD),
        )
    };
    let dim = |t: String| Span::styled(t, Style::default().fg(Color::Rgb(128, 160, 192)));
    let plain = |t: String| Span::styled(t, Style::default().fg(Color::White));

    let config = &frame.config;
    let status = vec![
        Line::from(vec![
            dim("Device: ".into()),
            plain(frame.source_name.clone()),
            dim(" | Rate: ".into()),
            plain(format!("{} Hz", config.sample_rate)),
            dim(" | FFT: ".into()),
            plain(config.fft_size.to_string()),
            dim(" | Scale: ".into()),
            plain(config.energy_scale.label().into()),
            dim(" | Amp: ".into()),
            plain(format!("{:.0}", config.target_amplitude)),
        ]),
        Line::from(vec![
            key("Q"),
            plain(" quit  ".into()),
            key("+/-"),
            plain(" bars  ".into()),
            key("S"),
            plain(" strategy  ".into()),
            key("N"),
            plain(" normalize  ".into()),
            key("P"),
            plain(" scale  ".into()),
            key("↑/↓"),
            plain(" amplitude".into()),
        ]),
    ];

    f.render_widget(Paragraph::new(status).alignment(Alignment::Center), inner);
}
