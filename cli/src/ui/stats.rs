use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
    Frame,
};

use crate::presenter::{ChartState, PowerLevel};
use crate::theme::ThemeColors;

pub fn render(frame: &mut Frame, area: Rect, state: &ChartState) {
    let theme = &state.theme;
    let block = Block::default()
        .title(Line::from(vec![
            Span::styled(
                " wattwise ",
                Style::default()
                    .fg(theme.accent)
                    .add_modifier(Modifier::BOLD),
            ),
            Span::styled(format!("{} ", state.source), Style::default().fg(theme.fg)),
        ]))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(theme.border));

    let inner = block.inner(area);
    frame.render_widget(block, area);

    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage(30),
            Constraint::Percentage(35),
            Constraint::Percentage(35),
        ])
        .split(inner);

    frame.render_widget(Paragraph::new(current_lines(state)), columns[0]);
    frame.render_widget(Paragraph::new(trend_lines(state)), columns[1]);
    frame.render_widget(Paragraph::new(session_lines(state)), columns[2]);
}

fn label(text: &str, theme: &ThemeColors) -> Span<'static> {
    Span::styled(format!("{text:<9}"), Style::default().fg(theme.muted))
}

fn current_lines(state: &ChartState) -> Vec<Line<'static>> {
    let theme = &state.theme;
    let Some(reading) = state.latest() else {
        return vec![Line::from(Span::styled(
            "Waiting for first reading…",
            Style::default().fg(theme.muted),
        ))];
    };

    let level = PowerLevel::classify(reading.watts, &state.thresholds);
    let level_name = match level {
        PowerLevel::Normal => "normal",
        PowerLevel::Warning => "elevated",
        PowerLevel::Critical => "high",
    };

    let mut lines = vec![
        Line::from(vec![
            label("Power", theme),
            Span::styled(
                format!("{:.1} W", reading.watts),
                Style::default()
                    .fg(theme.level(level))
                    .add_modifier(Modifier::BOLD),
            ),
        ]),
        Line::from(vec![
            label("Level", theme),
            Span::styled(level_name, Style::default().fg(theme.level(level))),
        ]),
    ];

    if state.show_current {
        let amps = reading
            .amperes
            .map(|a| format!("{a:.2} A"))
            .unwrap_or_else(|| "—".to_string());
        lines.push(Line::from(vec![
            label("Current", theme),
            Span::styled(amps, Style::default().fg(theme.fg)),
        ]));
    }
    lines
}

fn trend_lines(state: &ChartState) -> Vec<Line<'static>> {
    let theme = &state.theme;
    let window = humantime::format_duration(state.trend_window).to_string();
    let trend = state
        .last_update
        .and_then(|now| state.history.trend(state.trend_window, now));

    let value = |v: Option<f64>, unit: &str| match v {
        Some(v) => format!("{v:.1} {unit}"),
        None => "—".to_string(),
    };

    vec![
        Line::from(Span::styled(
            format!("Last {window}"),
            Style::default().fg(theme.accent),
        )),
        Line::from(vec![
            label("Min", theme),
            Span::raw(value(trend.map(|t| t.min), "W")),
        ]),
        Line::from(vec![
            label("Max", theme),
            Span::raw(value(trend.map(|t| t.max), "W")),
        ]),
        Line::from(vec![
            label("Avg", theme),
            Span::raw(value(trend.map(|t| t.avg), "W")),
        ]),
        Line::from(vec![
            label("Est.", theme),
            Span::raw(match trend {
                Some(t) => format!("{:.3} kWh/h  {:.2} kWh/day", t.kwh_per_hour(), t.kwh_per_day()),
                None => "—".to_string(),
            }),
        ]),
    ]
}

fn session_lines(state: &ChartState) -> Vec<Line<'static>> {
    let theme = &state.theme;
    let updated = state
        .last_update
        .map(|t| t.format("%H:%M:%S").to_string())
        .unwrap_or_else(|| "—".to_string());

    let mut lines = vec![
        Line::from(vec![
            label("Updated", theme),
            Span::raw(updated),
        ]),
        Line::from(vec![
            label("Elapsed", theme),
            Span::raw(humantime::format_duration(state.elapsed()).to_string()),
        ]),
    ];

    if let Some(error) = &state.last_error {
        lines.push(Line::from(vec![
            label("Error", theme),
            Span::styled(error.clone(), Style::default().fg(theme.critical)),
        ]));
    }
    lines
}
