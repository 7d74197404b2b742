mod graphs;
mod stats;

use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::Style,
    text::{Line, Span},
    widgets::Paragraph,
    Frame,
};

use crate::presenter::ChartState;

const STATS_HEIGHT: u16 = 7;

pub fn render(frame: &mut Frame, state: &ChartState) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(STATS_HEIGHT),
            Constraint::Min(6),
            Constraint::Length(1),
        ])
        .split(frame.area());

    stats::render(frame, chunks[0], state);
    graphs::render(frame, chunks[1], state);
    render_footer(frame, chunks[2], state);
}

fn render_footer(frame: &mut Frame, area: Rect, state: &ChartState) {
    let theme = &state.theme;
    let footer = Line::from(vec![
        Span::styled(" q", Style::default().fg(theme.accent)),
        Span::styled(" quit  ", Style::default().fg(theme.muted)),
        Span::styled(
            format!(
                "every {}  {}/{} samples",
                humantime::format_duration(state.interval),
                state.history.len(),
                state.history.capacity()
            ),
            Style::default().fg(theme.muted),
        ),
    ]);
    frame.render_widget(Paragraph::new(footer), area);
}
