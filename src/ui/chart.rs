use crate::api::{BacktestRun, EquityPoint};
use ratatui::{
    layout::Rect,
    style::{Color, Style},
    symbols,
    text::Span,
    widgets::{Axis, Block, Borders, Chart, Dataset, GraphType, Paragraph},
    Frame,
};

/// 横轴用序号，纵轴为权益；返回数据点与纵轴范围
pub fn chart_data(points: &[EquityPoint]) -> (Vec<(f64, f64)>, [f64; 2]) {
    let data: Vec<(f64, f64)> = points
        .iter()
        .enumerate()
        .map(|(i, p)| (i as f64, p.equity))
        .collect();

    let (mut lo, mut hi) = data
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), (_, y)| {
            (lo.min(*y), hi.max(*y))
        });
    if !lo.is_finite() || !hi.is_finite() {
        return (data, [0.0, 1.0]);
    }
    // 留 5% 边距，水平线时撑开一点
    let pad = ((hi - lo) * 0.05).max(hi.abs() * 0.001).max(1e-6);
    lo -= pad;
    hi += pad;
    (data, [lo, hi])
}

fn short_date(ts: Option<&str>) -> String {
    ts.map(|s| s.chars().take(10).collect())
        .unwrap_or_default()
}

pub fn render_equity_chart(f: &mut Frame, area: Rect, run: &BacktestRun) {
    let points = run.equity_points();
    let block = Block::default()
        .borders(Borders::ALL)
        .title(format!("权益曲线 ({} 个点)", points.len()));

    if points.len() < 2 {
        f.render_widget(Paragraph::new("没有足够的权益数据").block(block), area);
        return;
    }

    let (data, y_bounds) = chart_data(&points);
    let x_max = (data.len() - 1) as f64;
    let first = short_date(points.first().and_then(|p| p.timestamp.as_deref()));
    let mid = short_date(points.get(points.len() / 2).and_then(|p| p.timestamp.as_deref()));
    let last = short_date(points.last().and_then(|p| p.timestamp.as_deref()));

    let color = if points[points.len() - 1].equity >= run.initial_capital {
        Color::Green
    } else {
        Color::Red
    };

    let datasets = vec![Dataset::default()
        .name(run.symbol.clone())
        .marker(symbols::Marker::Braille)
        .graph_type(GraphType::Line)
        .style(Style::default().fg(color))
        .data(&data)];

    let chart = Chart::new(datasets)
        .block(block)
        .x_axis(
            Axis::default()
                .style(Style::default().fg(Color::Gray))
                .bounds([0.0, x_max])
                .labels(vec![Span::raw(first), Span::raw(mid), Span::raw(last)]),
        )
        .y_axis(
            Axis::default()
                .style(Style::default().fg(Color::Gray))
                .bounds(y_bounds)
                .labels(vec![
                    Span::raw(format!("{:.0}", y_bounds[0])),
                    Span::raw(format!("{:.0}", (y_bounds[0] + y_bounds[1]) / 2.0)),
                    Span::raw(format!("{:.0}", y_bounds[1])),
                ]),
        );
    f.render_widget(chart, area);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pts(values: &[f64]) -> Vec<EquityPoint> {
        values
            .iter()
            .map(|v| EquityPoint {
                timestamp: None,
                equity: *v,
            })
            .collect()
    }

    #[test]
    fn bounds_cover_all_points() {
        let (data, [lo, hi]) = chart_data(&pts(&[100.0, 120.0, 90.0]));
        assert_eq!(data, vec![(0.0, 100.0), (1.0, 120.0), (2.0, 90.0)]);
        assert!(lo < 90.0 && hi > 120.0);
    }

    #[test]
    fn flat_curve_gets_nonzero_range() {
        let (_, [lo, hi]) = chart_data(&pts(&[500.0, 500.0]));
        assert!(hi > lo);
    }

    #[test]
    fn empty_curve_has_unit_range() {
        let (data, bounds) = chart_data(&[]);
        assert!(data.is_empty());
        assert_eq!(bounds, [0.0, 1.0]);
    }
}
