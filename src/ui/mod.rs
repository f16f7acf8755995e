pub mod chart;

use crate::api::{Job, JobStatus};
use crate::app_state::{App, FocusArea, InputMode, ViewMode, MENU_ITEMS};
use ratatui::{
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, List, ListItem, Paragraph, Row, Table, Wrap},
    Frame,
};

pub fn draw(f: &mut Frame, app: &mut App) {
    let chunks = Layout::default()
        .direction(ratatui::layout::Direction::Vertical)
        .constraints([
            Constraint::Length(3), // 顶部标题栏
            Constraint::Min(0),    // 中间内容区域
            Constraint::Min(8),    // 底部命令/日志区域
        ])
        .split(f.size());

    render_top_bar(f, chunks[0], app);

    let middle_chunks = Layout::default()
        .direction(ratatui::layout::Direction::Horizontal)
        .constraints([Constraint::Length(20), Constraint::Min(0)])
        .split(chunks[1]);

    render_left_menu(f, middle_chunks[0], app);
    render_main_view(f, middle_chunks[1], app);
    render_bottom_bar(f, chunks[2], app);
}

fn render_top_bar(f: &mut Frame, area: Rect, app: &App) {
    let title = Block::default()
        .borders(Borders::ALL)
        .style(Style::default().fg(Color::Cyan));

    let tracking = if app.tracked_count > 0 {
        Span::styled(
            format!("  ▶ 轮询中 {} 个任务", app.tracked_count),
            Style::default().fg(Color::Yellow),
        )
    } else {
        Span::styled("  空闲", Style::default().fg(Color::Gray))
    };

    let title_text = Line::from(vec![
        Span::styled(
            " 回测看板 ",
            Style::default()
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw(" - Terminal TUI"),
        tracking,
    ]);

    let paragraph = Paragraph::new(title_text)
        .block(title)
        .alignment(ratatui::layout::Alignment::Center);

    f.render_widget(paragraph, area);
}

fn render_left_menu(f: &mut Frame, area: Rect, app: &App) {
    let menu_items: Vec<ListItem> = MENU_ITEMS
        .iter()
        .enumerate()
        .map(|(i, text)| {
            let is_selected = i == app.menu_selected_index;
            let is_active = matches!(
                (i, &app.view_mode),
                (0, ViewMode::Jobs)
                    | (1, ViewMode::Runs)
                    | (2, ViewMode::RunDetail)
                    | (3, ViewMode::Strategies)
            );

            let style = if is_selected {
                if app.focus_area == FocusArea::Menu {
                    Style::default()
                        .fg(Color::Black)
                        .bg(Color::Magenta)
                        .add_modifier(Modifier::BOLD)
                } else {
                    Style::default()
                        .fg(Color::Magenta)
                        .add_modifier(Modifier::BOLD)
                }
            } else if is_active {
                Style::default().fg(Color::Yellow)
            } else {
                Style::default().fg(Color::White)
            };

            let prefix = if is_active { "● " } else { "○ " };
            ListItem::new(format!("{}{}", prefix, text)).style(style)
        })
        .collect();

    let title = if app.focus_area == FocusArea::Menu {
        "菜单 (Enter/c 确认)"
    } else {
        "菜单 (← 切换)"
    };

    let menu = List::new(menu_items).block(
        Block::default()
            .borders(Borders::ALL)
            .title(title)
            .style(focus_style(app.focus_area == FocusArea::Menu)),
    );

    f.render_widget(menu, area);
}

fn focus_style(focused: bool) -> Style {
    if focused {
        Style::default().fg(Color::Cyan)
    } else {
        Style::default().fg(Color::White)
    }
}

fn status_style(status: JobStatus) -> (&'static str, Color) {
    match status {
        JobStatus::Completed => ("✓", Color::Green),
        JobStatus::Failed => ("✗", Color::Red),
        JobStatus::Running => ("▶", Color::Cyan),
        JobStatus::Pending => ("○", Color::Yellow),
    }
}

fn fmt_opt(v: Option<f64>, pct: bool) -> String {
    match v {
        Some(x) if pct => format!("{:.2}%", x * 100.0),
        Some(x) => format!("{:.2}", x),
        None => "N/A".to_string(),
    }
}

fn job_outcome(job: &Job) -> String {
    if let Some(err) = &job.error_message {
        return err.clone();
    }
    match job.backtest_run_id {
        Some(run_id) => format!("结果 #{}", run_id),
        None => String::new(),
    }
}

fn render_main_view(f: &mut Frame, area: Rect, app: &mut App) {
    let focused = app.focus_area == FocusArea::MainView;
    match app.view_mode {
        ViewMode::Jobs => render_jobs(f, area, app, focused),
        ViewMode::Runs => render_runs(f, area, app, focused),
        ViewMode::RunDetail => render_run_detail(f, area, app, focused),
        ViewMode::Strategies => render_strategies(f, area, app, focused),
    }
}

fn render_jobs(f: &mut Frame, area: Rect, app: &mut App, focused: bool) {
    let (banner_area, table_area) = if app.banner.is_some() {
        let parts = Layout::default()
            .direction(ratatui::layout::Direction::Vertical)
            .constraints([Constraint::Length(3), Constraint::Min(0)])
            .split(area);
        (Some(parts[0]), parts[1])
    } else {
        (None, area)
    };

    if let (Some(banner_area), Some(msg)) = (banner_area, app.banner.as_ref()) {
        let banner = Paragraph::new(Line::from(vec![
            Span::styled("✗ 刷新失败，显示的是上一次的数据: ", Style::default().add_modifier(Modifier::BOLD)),
            Span::raw(msg.as_str()),
        ]))
        .style(Style::default().fg(Color::Red))
        .block(Block::default().borders(Borders::ALL))
        .wrap(Wrap { trim: true });
        f.render_widget(banner, banner_area);
    }

    let rows: Vec<Row> = app
        .job_list
        .iter()
        .map(|job| {
            let (symbol, color) = status_style(job.status);
            Row::new(vec![
                Cell::from(format!("#{}", job.id)),
                Cell::from(format!("{} {}", symbol, job.status)).style(Style::default().fg(color)),
                Cell::from(job.config.strategy_name.clone()),
                Cell::from(job.config.symbol.clone()),
                Cell::from(job.config.interval.clone()),
                Cell::from(format!("{:.0}", job.config.initial_capital)),
                Cell::from(job.created_at.format("%m-%d %H:%M").to_string()),
                Cell::from(job_outcome(job)),
            ])
        })
        .collect();

    let stats = &app.job_stats;
    let title = format!(
        "回测任务 [Filter: {}] 共 {} | 待处理 {} | 运行中 {} | 完成 {} | 失败 {}{}",
        app.job_filter.label(),
        stats.total,
        stats.pending,
        stats.running,
        stats.completed,
        stats.failed,
        if focused { " (f 切换, r 刷新, Enter 结果)" } else { "" }
    );

    let header = Row::new(vec!["ID", "状态", "策略", "交易对", "周期", "资金", "创建时间", "结果"])
        .style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD));

    let table = Table::new(
        rows,
        [
            Constraint::Length(6),
            Constraint::Length(13),
            Constraint::Length(22),
            Constraint::Length(10),
            Constraint::Length(5),
            Constraint::Length(9),
            Constraint::Length(12),
            Constraint::Min(10),
        ],
    )
    .header(header)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .title(title)
            .style(focus_style(focused)),
    )
    .highlight_style(
        Style::default()
            .fg(Color::Black)
            .bg(Color::White)
            .add_modifier(Modifier::BOLD),
    )
    .highlight_symbol(">> ");

    app.job_table_state.select(Some(app.selected_index));
    f.render_stateful_widget(table, table_area, &mut app.job_table_state);
}

fn render_runs(f: &mut Frame, area: Rect, app: &mut App, focused: bool) {
    let rows: Vec<Row> = app
        .runs
        .iter()
        .map(|run| {
            let ret_color = match run.total_return {
                Some(r) if r >= 0.0 => Color::Green,
                Some(_) => Color::Red,
                None => Color::Gray,
            };
            Row::new(vec![
                Cell::from(format!("#{}", run.id)),
                Cell::from(run.strategy_name.clone()),
                Cell::from(run.symbol.clone()),
                Cell::from(run.timeframe.clone()),
                Cell::from(fmt_opt(run.total_return, true)).style(Style::default().fg(ret_color)),
                Cell::from(fmt_opt(run.sharpe_ratio, false)),
                Cell::from(fmt_opt(run.max_drawdown, true)),
                Cell::from(run.num_trades.map(|n| n.to_string()).unwrap_or_else(|| "N/A".to_string())),
                Cell::from(fmt_opt(run.final_equity, false)),
                Cell::from(run.created_at.format("%Y-%m-%d %H:%M").to_string()),
            ])
        })
        .collect();

    let header = Row::new(vec![
        "ID", "策略", "交易对", "周期", "收益", "Sharpe", "回撤", "交易数", "最终权益", "时间",
    ])
    .style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD));

    let title = if focused {
        format!("历史回测 ({} 条) (Enter 详情, ← 菜单)", app.runs.len())
    } else {
        format!("历史回测 ({} 条)", app.runs.len())
    };

    let table = Table::new(
        rows,
        [
            Constraint::Length(6),
            Constraint::Length(22),
            Constraint::Length(10),
            Constraint::Length(5),
            Constraint::Length(9),
            Constraint::Length(7),
            Constraint::Length(9),
            Constraint::Length(6),
            Constraint::Length(12),
            Constraint::Min(16),
        ],
    )
    .header(header)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .title(title)
            .style(focus_style(focused)),
    )
    .highlight_style(
        Style::default()
            .fg(Color::Black)
            .bg(Color::White)
            .add_modifier(Modifier::BOLD),
    )
    .highlight_symbol(">> ");

    app.run_table_state.select(Some(app.run_index));
    f.render_stateful_widget(table, area, &mut app.run_table_state);
}

fn render_run_detail(f: &mut Frame, area: Rect, app: &App, focused: bool) {
    let title = if focused {
        "回测详情 (↑↓ 滚动, x 返回, ← 切换菜单)"
    } else {
        "回测详情"
    };

    let Some(run) = app.selected_run.as_ref() else {
        let paragraph = Paragraph::new("正在加载详情... (在历史回测中按 Enter 或输入 run <id>)").block(
            Block::default()
                .borders(Borders::ALL)
                .title(title)
                .style(focus_style(focused)),
        );
        f.render_widget(paragraph, area);
        return;
    };

    let parts = Layout::default()
        .direction(ratatui::layout::Direction::Vertical)
        .constraints([Constraint::Length(10), Constraint::Min(6)])
        .split(area);

    let params = serde_json::Value::Object(run.strategy_params.clone()).to_string();
    let mut lines = vec![
        Line::from(vec![
            Span::styled("回测 #", Style::default().add_modifier(Modifier::BOLD)),
            Span::styled(run.id.to_string(), Style::default().fg(Color::Cyan)),
            Span::raw("  "),
            Span::styled("策略: ", Style::default().add_modifier(Modifier::BOLD)),
            Span::styled(&run.strategy_name, Style::default().fg(Color::Cyan)),
            Span::raw(format!("  {}", params)),
        ]),
        Line::from(vec![
            Span::styled("交易对: ", Style::default().add_modifier(Modifier::BOLD)),
            Span::raw(&run.symbol),
            Span::raw("  "),
            Span::styled("周期: ", Style::default().add_modifier(Modifier::BOLD)),
            Span::raw(&run.timeframe),
            Span::raw("  "),
            Span::styled("初始资金: ", Style::default().add_modifier(Modifier::BOLD)),
            Span::raw(format!("{:.2}", run.initial_capital)),
        ]),
        Line::from(""),
        Line::from(vec![Span::styled(
            "--- 核心指标 ---",
            Style::default().fg(Color::Yellow),
        )]),
        Line::from(format!(
            "收益:  {:<10} Sharpe: {:<10} 最大回撤: {:<10}",
            fmt_opt(run.total_return, true),
            fmt_opt(run.sharpe_ratio, false),
            fmt_opt(run.max_drawdown, true)
        )),
        Line::from(format!(
            "交易数: {:<9} 最终权益: {:<10}",
            run.num_trades
                .map(|n| n.to_string())
                .unwrap_or_else(|| "N/A".to_string()),
            fmt_opt(run.final_equity, false)
        )),
    ];

    // 其余指标原样列出
    if let serde_json::Value::Object(ref metrics) = run.metrics {
        for (name, value) in metrics.iter() {
            let shown = match value.as_f64() {
                Some(v) => format!("{:.4}", v),
                None => value.to_string(),
            };
            lines.push(Line::from(format!("  • {:<22}: {}", name, shown)));
        }
    }

    let paragraph = Paragraph::new(lines)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(title)
                .style(focus_style(focused)),
        )
        .scroll((app.detail_scroll, 0));
    f.render_widget(paragraph, parts[0]);

    chart::render_equity_chart(f, parts[1], run);
}

fn render_strategies(f: &mut Frame, area: Rect, app: &App, focused: bool) {
    let mut lines = Vec::new();
    for strategy in &app.strategies {
        lines.push(Line::from(vec![Span::styled(
            strategy.name.clone(),
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        )]));
        if let Some(desc) = strategy.description.as_deref() {
            let desc = desc.trim();
            if !desc.is_empty() {
                lines.push(Line::from(Span::styled(
                    format!("  {}", desc.lines().next().unwrap_or(desc)),
                    Style::default().fg(Color::Gray),
                )));
            }
        }
        for p in &strategy.parameters {
            let default = p
                .default
                .as_ref()
                .map(|v| v.to_string())
                .unwrap_or_else(|| "-".to_string());
            lines.push(Line::from(format!("    {}={}  ({})", p.name, default, p.kind)));
        }
        lines.push(Line::from(""));
    }
    if app.strategies.is_empty() {
        lines.push(Line::from("暂无数据，按菜单确认或输入 `strategies` 加载"));
    } else {
        lines.push(Line::from(Span::styled(
            "提交: /submit <strategy> <capital> [参数=值 ...]",
            Style::default()
                .fg(Color::Gray)
                .add_modifier(Modifier::ITALIC),
        )));
    }

    let title = if focused {
        "策略列表 (↑↓ 滚动, ← 切换菜单)"
    } else {
        "策略列表"
    };
    let paragraph = Paragraph::new(lines)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(title)
                .style(focus_style(focused)),
        )
        .scroll((app.detail_scroll, 0));
    f.render_widget(paragraph, area);
}

fn render_bottom_bar(f: &mut Frame, area: Rect, app: &App) {
    let bottom_chunks = Layout::default()
        .direction(ratatui::layout::Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(0)])
        .split(area);

    let command_prompt = if app.input_mode == InputMode::Command {
        let mut spans = vec![Span::styled(
            "命令: ",
            Style::default()
                .fg(Color::Green)
                .add_modifier(Modifier::BOLD),
        )];
        let cur = app.command_cursor.min(app.command_input.len());
        let (left, right) = app.command_input.split_at(cur);
        spans.push(Span::raw(left));
        spans.push(Span::styled("_", Style::default().fg(Color::Yellow)));
        spans.push(Span::raw(right));

        if let Some(hint) = app.get_completion_hint() {
            spans.push(Span::styled(hint, Style::default().fg(Color::DarkGray)));
        }

        vec![
            Line::from(spans),
            Line::from("Enter执行 Esc取消 Tab补全 ←→光标 Home/End ↑历史 ↓下一条"),
        ]
    } else {
        vec![
            Line::from(vec![
                Span::styled("命令: ", Style::default().fg(Color::Yellow)),
                Span::raw("(按 / 进入命令模式)"),
            ]),
            Line::from("/命令 f筛选 r刷新 ←→切换 ↑↓导航 Enter/c确认 x返回 q退出"),
        ]
    };
    let command_paragraph = Paragraph::new(command_prompt).block(
        Block::default()
            .borders(Borders::ALL)
            .title(if app.input_mode == InputMode::Command {
                "命令输入模式"
            } else {
                "命令输入"
            })
            .style(if app.input_mode == InputMode::Command {
                Style::default().fg(Color::Green)
            } else {
                Style::default().fg(Color::White)
            }),
    );
    f.render_widget(command_paragraph, bottom_chunks[0]);

    // 最新的在顶部，最多 20 条
    let log_items: Vec<ListItem> = app
        .log_messages
        .iter()
        .rev()
        .take(20)
        .map(|msg| {
            let style = if msg.starts_with('✓') {
                Style::default().fg(Color::Green)
            } else if msg.starts_with('✗') {
                Style::default().fg(Color::Red)
            } else if msg.starts_with('⚠') {
                Style::default().fg(Color::Yellow)
            } else {
                Style::default().fg(Color::White)
            };
            ListItem::new(msg.as_str()).style(style)
        })
        .collect();

    let log = List::new(log_items).block(
        Block::default()
            .borders(Borders::ALL)
            .title(format!("日志 (共 {} 条)", app.log_messages.len()))
            .style(Style::default().fg(Color::White)),
    );
    f.render_widget(log, bottom_chunks[1]);
}
