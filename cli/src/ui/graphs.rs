use ratatui::{
    layout::Rect,
    style::{Modifier, Style},
    symbols::Marker,
    text::{Line, Span},
    widgets::{Axis, Block, Borders, Chart, Dataset, GraphType},
    Frame,
};

use crate::presenter::ChartState;

pub fn render(frame: &mut Frame, area: Rect, state: &ChartState) {
    let theme = &state.theme;
    let history = &state.history;

    let title_line = Line::from(vec![
        Span::styled(
            " Power (W) ",
            Style::default()
                .fg(theme.accent)
                .add_modifier(Modifier::BOLD),
        ),
        Span::styled(
            history
                .latest()
                .map(|r| format!("{:.1}W ", r.watts))
                .unwrap_or_default(),
            Style::default().fg(theme.fg),
        ),
    ]);

    let block = Block::default()
        .title(title_line)
        .borders(Borders::ALL)
        .border_style(Style::default().fg(theme.border));

    let data = history.chart_points();
    if data.len() < 2 {
        frame.render_widget(block, area);
        return;
    }

    let (min_y, mut max_y) = history.value_range();
    let max_x = history.span_secs().max(state.interval.as_secs_f64());

    let warning_line = [(0.0, state.thresholds.warning), (max_x, state.thresholds.warning)];
    let critical_line = [(0.0, state.thresholds.critical), (max_x, state.thresholds.critical)];

    let mut datasets = vec![Dataset::default()
        .marker(Marker::Braille)
        .graph_type(GraphType::Line)
        .style(Style::default().fg(theme.graph_line))
        .data(&data)];

    // Threshold guides only when the trace comes near them.
    if state.thresholds.warning <= max_y {
        datasets.push(
            Dataset::default()
                .marker(Marker::Dot)
                .graph_type(GraphType::Line)
                .style(Style::default().fg(theme.warning))
                .data(&warning_line),
        );
    }
    if state.thresholds.critical <= max_y {
        datasets.push(
            Dataset::default()
                .marker(Marker::Dot)
                .graph_type(GraphType::Line)
                .style(Style::default().fg(theme.critical))
                .data(&critical_line),
        );
    }
    if max_y <= min_y {
        max_y = min_y + 1.0;
    }

    let x_labels = vec![
        Span::styled(
            format!("-{}s", max_x.round() as u64),
            Style::default().fg(theme.muted),
        ),
        Span::styled("now", Style::default().fg(theme.muted)),
    ];

    let quarter = (max_y - min_y) / 4.0;
    let y_labels: Vec<Span> = (0..=4)
        .map(|i| {
            Span::styled(
                format!("{:.0}", min_y + quarter * i as f64),
                Style::default().fg(theme.muted),
            )
        })
        .collect();

    let x_axis = Axis::default()
        .style(Style::default().fg(theme.muted))
        .bounds([0.0, max_x])
        .labels(x_labels);

    let y_axis = Axis::default()
        .style(Style::default().fg(theme.muted))
        .bounds([min_y, max_y])
        .labels(y_labels);

    let chart = Chart::new(datasets)
        .block(block)
        .x_axis(x_axis)
        .y_axis(y_axis);

    frame.render_widget(chart, area);
}
