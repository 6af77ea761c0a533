use std::{
    io::{self, IsTerminal, Stdout},
    time::Duration,
};

use anyhow::bail;
use crossterm::{
    event::{self, Event, KeyEvent},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use image::{imageops, RgbImage};
use ratatui::{
    backend::CrosstermBackend,
    buffer::Buffer,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    symbols,
    text::Line,
    widgets::{Axis, Block, Borders, Chart, Dataset, GraphType, Paragraph, Widget},
    Frame, Terminal,
};

use super::{compose::ComposedFrame, surface::Surface};

struct Theme;

impl Theme {
    const FG: Color = Color::Rgb(57, 255, 20);
    const DIM: Color = Color::Rgb(0, 190, 0);
    const SERIES: [Color; 4] = [
        Color::Rgb(255, 255, 0),
        Color::Rgb(0, 255, 255),
        Color::Rgb(255, 0, 255),
        Color::Rgb(255, 70, 70),
    ];

    fn border() -> Style {
        Style::default().fg(Self::FG)
    }

    fn title() -> Style {
        Style::default().fg(Self::FG).add_modifier(Modifier::BOLD)
    }

    fn dim() -> Style {
        Style::default().fg(Self::DIM)
    }

    fn series(i: usize) -> Style {
        Style::default().fg(Self::SERIES[i % Self::SERIES.len()])
    }
}

/// Draws previews in the terminal using ratatui on the alternate screen.
///
/// Images are rendered with half-block characters, two pixels per cell.
#[derive(Default)]
pub struct TerminalSurface {
    terminal: Option<Terminal<CrosstermBackend<Stdout>>>,
    raw: bool,
    last: Option<ComposedFrame>,
}

impl TerminalSurface {
    pub fn new() -> Self {
        Self::default()
    }

    fn redraw(&mut self) -> anyhow::Result<()> {
        let (Some(terminal), Some(frame)) = (self.terminal.as_mut(), self.last.as_ref()) else {
            return Ok(());
        };
        terminal.draw(|f| draw(f, frame))?;
        Ok(())
    }

    fn enter(&mut self) -> anyhow::Result<()> {
        if !io::stdout().is_terminal() {
            bail!("stdout is not a terminal");
        }

        enable_raw_mode()?;
        self.raw = true;
        execute!(io::stdout(), EnterAlternateScreen)?;

        let mut terminal = Terminal::new(CrosstermBackend::new(io::stdout()))?;
        terminal.hide_cursor()?;
        terminal.clear()?;
        self.terminal = Some(terminal);
        Ok(())
    }
}

impl Surface for TerminalSurface {
    fn create_window(&mut self) -> anyhow::Result<()> {
        let res = self.enter();
        if res.is_err() {
            self.destroy_window();
        }
        res
    }

    fn destroy_window(&mut self) {
        if let Some(mut terminal) = self.terminal.take() {
            let _ = terminal.show_cursor();
        }
        if std::mem::take(&mut self.raw) {
            let _ = disable_raw_mode();
            let _ = execute!(io::stdout(), LeaveAlternateScreen);
        }
    }

    fn poll_input(&mut self, timeout: Duration) -> anyhow::Result<Vec<KeyEvent>> {
        let mut keys = Vec::new();
        let mut resized = false;

        if event::poll(timeout)? {
            loop {
                match event::read()? {
                    Event::Key(k) => keys.push(k),
                    Event::Resize(..) => resized = true,
                    _ => {}
                }
                if !event::poll(Duration::ZERO)? {
                    break;
                }
            }
        }

        if resized {
            self.redraw()?;
        }
        Ok(keys)
    }

    fn present_frame(&mut self, frame: &ComposedFrame) -> anyhow::Result<()> {
        self.last = Some(frame.clone());
        self.redraw()
    }
}

impl Drop for TerminalSurface {
    fn drop(&mut self) {
        self.destroy_window();
    }
}

fn draw(f: &mut Frame, frame: &ComposedFrame) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(frame.header.len() as u16 + 2),
            Constraint::Percentage(35),
            Constraint::Min(4),
        ])
        .split(f.size());

    f.render_widget(header(frame), rows[0]);
    draw_losses(f, frame, rows[1]);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Theme::border())
        .title(Line::styled(" Preview ", Theme::title()));
    let inner = block.inner(rows[2]);
    f.render_widget(block, rows[2]);
    if let Some(image) = &frame.image {
        f.render_widget(HalfBlockImage { image }, inner);
    }
}

fn header(frame: &ComposedFrame) -> Paragraph<'_> {
    let lines: Vec<Line> = frame
        .header
        .iter()
        .map(|l| Line::styled(l.as_str(), Theme::dim()))
        .collect();

    Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Theme::border())
            .title(Line::styled(
                format!(" Training  |  iter {} ", frame.iteration),
                Theme::title(),
            )),
    )
}

fn draw_losses(f: &mut Frame, frame: &ComposedFrame, area: Rect) {
    let range = match frame.history_window {
        0 => "all".to_string(),
        n => format!("last {n}"),
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Theme::border())
        .title(Line::styled(format!(" Loss history ({range}) "), Theme::title()));

    let components = frame.loss_history.iter().map(Vec::len).max().unwrap_or(0);
    if components == 0 {
        f.render_widget(block, area);
        return;
    }

    let series: Vec<Vec<(f64, f64)>> = (0..components)
        .map(|c| {
            frame
                .loss_history
                .iter()
                .enumerate()
                .filter_map(|(i, losses)| losses.get(c).map(|&v| (i as f64, v as f64)))
                .collect()
        })
        .collect();

    let (lo, hi) = series
        .iter()
        .flatten()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &(_, y)| {
            (lo.min(y), hi.max(y))
        });
    let pad = if hi > lo { (hi - lo) * 0.05 } else { 0.5 };
    let x_max = (frame.loss_history.len().saturating_sub(1)).max(1) as f64;

    let datasets = series
        .iter()
        .enumerate()
        .map(|(c, points)| {
            Dataset::default()
                .name(format!("loss {c}"))
                .marker(symbols::Marker::Braille)
                .graph_type(GraphType::Line)
                .style(Theme::series(c))
                .data(points)
        })
        .collect();

    let chart = Chart::new(datasets)
        .block(block)
        .x_axis(Axis::default().style(Theme::dim()).bounds([0.0, x_max]))
        .y_axis(
            Axis::default()
                .style(Theme::dim())
                .bounds([lo - pad, hi + pad])
                .labels(vec![
                    format!("{:.4}", lo).into(),
                    format!("{:.4}", hi).into(),
                ]),
        );

    f.render_widget(chart, area);
}

/// Renders an RGB image using `▀` cells: foreground is the upper pixel, background the lower.
struct HalfBlockImage<'a> {
    image: &'a RgbImage,
}

impl Widget for HalfBlockImage<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let (w, h) = self.image.dimensions();
        if area.width == 0 || area.height == 0 || w == 0 || h == 0 {
            return;
        }

        let max_w = area.width as f64;
        let max_h = area.height as f64 * 2.0;
        let scale = (max_w / w as f64).min(max_h / h as f64);
        let tw = ((w as f64 * scale) as u32).max(1);
        let th = ((h as f64 * scale) as u32).max(1);
        let scaled = imageops::resize(self.image, tw, th, imageops::FilterType::Nearest);

        for row in 0..th.div_ceil(2) {
            for col in 0..tw {
                let top = scaled.get_pixel(col, row * 2).0;
                let bottom = if row * 2 + 1 < th {
                    scaled.get_pixel(col, row * 2 + 1).0
                } else {
                    [0, 0, 0]
                };

                buf.get_mut(area.x + col as u16, area.y + row as u16)
                    .set_char('▀')
                    .set_fg(Color::Rgb(top[0], top[1], top[2]))
                    .set_bg(Color::Rgb(bottom[0], bottom[1], bottom[2]));
            }
        }
    }
}
