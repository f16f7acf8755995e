use crate::api::{BacktestRun, Job, Strategy};
use crate::commands::AppCommand;
use crate::tracker::{JobStats, ViewFilter};
use crossterm::event::KeyCode;
use ratatui::widgets::TableState;
use std::str::FromStr;
use tokio::sync::mpsc;

#[derive(PartialEq, Debug, Clone)]
pub enum ViewMode {
    Jobs,
    Runs,
    RunDetail,
    Strategies,
}

#[derive(PartialEq, Debug, Clone)]
pub enum InputMode {
    Normal,
    Command,
}

#[derive(PartialEq, Debug, Clone)]
pub enum FocusArea {
    Menu,     // 焦点在左侧菜单
    MainView, // 焦点在主视图
}

#[derive(Debug)]
pub enum AppEvent {
    Log(String),
    Message(String),
    Error(String),
    Jobs { jobs: Vec<Job>, tracked: usize },
    /// 全量刷新成功（轮询更新不算）
    Refreshed,
    RefreshFailed(String),
    Runs(Vec<BacktestRun>),
    RunDetail(BacktestRun),
    Strategies(Vec<Strategy>),
}

pub const MENU_ITEMS: [&str; 4] = ["回测任务", "历史回测", "回测详情", "策略列表"];

pub struct App {
    pub view_mode: ViewMode,
    pub input_mode: InputMode,
    pub focus_area: FocusArea,
    pub menu_selected_index: usize,
    pub jobs_all: Vec<Job>,
    pub job_list: Vec<Job>,
    pub job_filter: ViewFilter,
    pub job_stats: JobStats,
    pub tracked_count: usize,
    pub selected_index: usize,
    pub job_table_state: TableState,
    pub runs: Vec<BacktestRun>,
    pub run_index: usize,
    pub run_table_state: TableState,
    pub selected_run: Option<BacktestRun>,
    pub strategies: Vec<Strategy>,
    pub detail_scroll: u16,
    pub banner: Option<String>,
    pub command_input: String,
    pub command_cursor: usize,
    pub command_history: Vec<String>,
    pub command_history_index: Option<usize>,
    pub log_messages: Vec<String>,
    pub cmd_tx: mpsc::UnboundedSender<AppCommand>,
    pub evt_rx: Option<mpsc::UnboundedReceiver<AppEvent>>,
}

impl App {
    pub fn new(
        session_info: Vec<String>,
        cmd_tx: mpsc::UnboundedSender<AppCommand>,
        evt_rx: mpsc::UnboundedReceiver<AppEvent>,
    ) -> App {
        let mut log_messages = vec!["应用已启动".to_string()];
        log_messages.extend(session_info);

        App {
            view_mode: ViewMode::Jobs,
            input_mode: InputMode::Normal,
            focus_area: FocusArea::Menu,
            menu_selected_index: 0,
            jobs_all: Vec::new(),
            job_list: Vec::new(),
            job_filter: ViewFilter::All,
            job_stats: JobStats::default(),
            tracked_count: 0,
            selected_index: 0,
            job_table_state: TableState::default().with_selected(Some(0)),
            runs: Vec::new(),
            run_index: 0,
            run_table_state: TableState::default().with_selected(Some(0)),
            selected_run: None,
            strategies: Vec::new(),
            detail_scroll: 0,
            banner: None,
            command_input: String::new(),
            command_cursor: 0,
            command_history: Vec::new(),
            command_history_index: None,
            log_messages,
            cmd_tx,
            evt_rx: Some(evt_rx),
        }
    }

    pub fn add_log(&mut self, msg: String) {
        self.log_messages.push(msg);
    }

    pub fn handle_event(&mut self, event: AppEvent) {
        match event {
            AppEvent::Log(msg) | AppEvent::Message(msg) | AppEvent::Error(msg) => {
                self.add_log(msg)
            }
            AppEvent::Jobs { jobs, tracked } => {
                self.jobs_all = jobs;
                self.tracked_count = tracked;
                self.apply_filters();
            }
            AppEvent::Refreshed => {
                self.banner = None;
            }
            AppEvent::RefreshFailed(msg) => {
                self.add_log(format!("✗ 刷新任务列表失败: {}", msg));
                self.banner = Some(msg);
            }
            AppEvent::Runs(runs) => {
                self.runs = runs;
                if self.run_index >= self.runs.len() {
                    self.run_index = self.runs.len().saturating_sub(1);
                }
                self.run_table_state.select(Some(self.run_index));
            }
            AppEvent::RunDetail(run) => {
                self.detail_scroll = 0;
                self.selected_run = Some(run);
            }
            AppEvent::Strategies(list) => {
                self.strategies = list;
            }
        }
    }

    /// 获取当前的预测建议
    pub fn get_completion_hint(&self) -> Option<String> {
        let commands = [
            "submit", "refresh", "runs", "run", "result", "strategies", "filter", "help", "quit",
        ];
        let input = self.command_input.trim();

        if input.is_empty() {
            return None;
        }

        let parts: Vec<&str> = input.split_whitespace().collect();
        if parts.len() == 1 {
            if parts[0] == "filter" {
                return Some(" active".to_string());
            }
            for cmd in commands {
                if cmd.starts_with(parts[0]) && cmd != parts[0] {
                    return Some(cmd[parts[0].len()..].to_string());
                }
            }
            return None;
        }

        if parts[0] == "filter" && parts.len() == 2 {
            let cur = parts[1];
            for s in ["active", "all"] {
                if s.starts_with(cur) && s != cur {
                    return Some(s[cur.len()..].to_string());
                }
            }
        }
        None
    }

    pub fn clamp_selection(&mut self) {
        if self.selected_index >= self.job_list.len() {
            self.selected_index = self.job_list.len().saturating_sub(1);
        }
        self.job_table_state.select(Some(self.selected_index));
    }

    /// 过滤只影响展示，不影响跟踪集合
    pub fn apply_filters(&mut self) {
        self.job_stats = JobStats::collect(&self.jobs_all);
        self.job_list = self
            .jobs_all
            .iter()
            .filter(|j| self.job_filter.matches(j))
            .cloned()
            .collect();
        self.clamp_selection();
    }

    pub fn selected_job(&self) -> Option<&Job> {
        self.job_list.get(self.selected_index)
    }

    pub fn request_run_detail(&mut self) {
        if let Some(run) = self.runs.get(self.run_index) {
            let _ = self.cmd_tx.send(AppCommand::RunDetail { run_id: run.id });
        }
    }

    /// 已完成的任务直接跳到结果详情
    fn open_selected_job(&mut self) {
        let Some((job_id, status, run_id, error)) = self
            .selected_job()
            .map(|j| (j.id, j.status, j.backtest_run_id, j.error_message.clone()))
        else {
            return;
        };
        if run_id.is_some() {
            let _ = self.cmd_tx.send(AppCommand::JobResult { job_id });
            self.view_mode = ViewMode::RunDetail;
            self.menu_selected_index = 2;
        } else if let Some(err) = error {
            self.add_log(format!("✗ 任务 #{} 失败: {}", job_id, err));
        } else {
            self.add_log(format!("任务 #{} 尚未完成 ({})", job_id, status));
        }
    }

    fn set_filter_from_args(&mut self, args: &str) {
        self.job_filter = match args.trim() {
            "active" | "running" => ViewFilter::Active,
            "all" | "" | "clear" => ViewFilter::All,
            other => {
                self.add_log(format!("⚠ 未知的过滤条件: {} (可选 active | all)", other));
                return;
            }
        };
        self.apply_filters();
    }

    fn finish_command(&mut self, cmd_owned: Option<String>) {
        if let Some(cmd) = cmd_owned {
            self.command_history.push(cmd);
        }
        self.command_history_index = None;
        self.command_input.clear();
        self.command_cursor = 0;
        self.input_mode = InputMode::Normal;
    }

    /// 返回 true 表示退出应用
    pub fn handle_key_event(&mut self, key: KeyCode) -> bool {
        if self.input_mode == InputMode::Command {
            return self.handle_command_key(key);
        }

        // 正常模式下的按键处理
        match key {
            KeyCode::Char('/') => {
                self.input_mode = InputMode::Command;
                self.command_input.clear();
                self.command_cursor = 0;
                false
            }
            KeyCode::Char('q') => true,
            KeyCode::Left => {
                self.focus_area = FocusArea::Menu;
                false
            }
            KeyCode::Right => {
                self.focus_area = FocusArea::MainView;
                false
            }
            KeyCode::Up => {
                if self.focus_area == FocusArea::Menu {
                    if self.menu_selected_index > 0 {
                        self.menu_selected_index -= 1;
                    }
                } else {
                    match self.view_mode {
                        ViewMode::RunDetail | ViewMode::Strategies => {
                            self.detail_scroll = self.detail_scroll.saturating_sub(1);
                        }
                        ViewMode::Jobs => {
                            if self.selected_index > 0 {
                                self.selected_index -= 1;
                            }
                        }
                        ViewMode::Runs => {
                            if self.run_index > 0 {
                                self.run_index -= 1;
                            }
                        }
                    }
                }
                false
            }
            KeyCode::Down => {
                if self.focus_area == FocusArea::Menu {
                    if self.menu_selected_index < MENU_ITEMS.len() - 1 {
                        self.menu_selected_index += 1;
                    }
                } else {
                    match self.view_mode {
                        ViewMode::RunDetail | ViewMode::Strategies => {
                            self.detail_scroll = self.detail_scroll.saturating_add(1);
                        }
                        ViewMode::Jobs => {
                            if self.selected_index < self.job_list.len().saturating_sub(1) {
                                self.selected_index += 1;
                            }
                        }
                        ViewMode::Runs => {
                            if self.run_index < self.runs.len().saturating_sub(1) {
                                self.run_index += 1;
                            }
                        }
                    }
                }
                false
            }
            KeyCode::Enter | KeyCode::Char('c') => {
                if self.focus_area == FocusArea::Menu {
                    match self.menu_selected_index {
                        0 => self.view_mode = ViewMode::Jobs,
                        1 => {
                            self.view_mode = ViewMode::Runs;
                            let _ = self.cmd_tx.send(AppCommand::Runs);
                        }
                        2 => {
                            self.view_mode = ViewMode::RunDetail;
                            if self.selected_run.is_none() {
                                self.request_run_detail();
                            }
                        }
                        3 => {
                            self.view_mode = ViewMode::Strategies;
                            self.detail_scroll = 0;
                            if self.strategies.is_empty() {
                                let _ = self.cmd_tx.send(AppCommand::Strategies);
                            }
                        }
                        _ => {}
                    }
                    self.focus_area = FocusArea::MainView;
                } else {
                    match self.view_mode {
                        ViewMode::Jobs => self.open_selected_job(),
                        ViewMode::Runs if !self.runs.is_empty() => {
                            self.view_mode = ViewMode::RunDetail;
                            self.menu_selected_index = 2;
                            self.request_run_detail();
                        }
                        _ => {}
                    }
                }
                false
            }
            KeyCode::Char('x') => {
                if self.focus_area == FocusArea::MainView && self.view_mode == ViewMode::RunDetail {
                    self.view_mode = ViewMode::Runs;
                    self.menu_selected_index = 1;
                }
                false
            }
            KeyCode::Char('f') => {
                if self.view_mode == ViewMode::Jobs {
                    self.job_filter = self.job_filter.toggle();
                    self.apply_filters();
                }
                false
            }
            KeyCode::Char('r') => {
                let _ = self.cmd_tx.send(AppCommand::Refresh);
                false
            }
            _ => false,
        }
    }

    fn handle_command_key(&mut self, key: KeyCode) -> bool {
        match key {
            KeyCode::Enter => {
                let cmd_owned = self.command_input.trim().to_string();
                if cmd_owned.is_empty() || cmd_owned == "q" {
                    self.finish_command(None);
                    return false;
                }

                let mut words = cmd_owned.splitn(2, char::is_whitespace);
                if words.next() == Some("filter") {
                    let args = words.next().unwrap_or("").to_string();
                    self.set_filter_from_args(&args);
                    self.finish_command(Some(cmd_owned));
                    return false;
                }

                let app_cmd = AppCommand::from_str(&cmd_owned)
                    .unwrap_or_else(|_| AppCommand::Unknown(cmd_owned.clone()));
                let quit = matches!(app_cmd, AppCommand::Quit);
                match app_cmd {
                    AppCommand::Runs => {
                        self.view_mode = ViewMode::Runs;
                        self.menu_selected_index = 1;
                        let _ = self.cmd_tx.send(app_cmd);
                    }
                    AppCommand::RunDetail { .. } | AppCommand::JobResult { .. } => {
                        self.view_mode = ViewMode::RunDetail;
                        self.menu_selected_index = 2;
                        let _ = self.cmd_tx.send(app_cmd);
                    }
                    AppCommand::Strategies => {
                        self.view_mode = ViewMode::Strategies;
                        self.menu_selected_index = 3;
                        let _ = self.cmd_tx.send(app_cmd);
                    }
                    other => {
                        let _ = self.cmd_tx.send(other);
                    }
                }
                self.finish_command(Some(cmd_owned));
                quit
            }
            KeyCode::Esc => {
                self.finish_command(None);
                false
            }
            KeyCode::Tab => {
                if let Some(hint) = self.get_completion_hint() {
                    let insert = format!("{} ", hint);
                    self.command_input.insert_str(self.command_cursor, &insert);
                    self.command_cursor += insert.len();
                }
                false
            }
            KeyCode::Up => {
                if self.command_history.is_empty() {
                    return false;
                }
                let next = match self.command_history_index {
                    None => self.command_history.len().saturating_sub(1),
                    Some(i) => i.saturating_sub(1),
                };
                self.command_history_index = Some(next);
                if let Some(cmd) = self.command_history.get(next) {
                    self.command_input = cmd.clone();
                    self.command_cursor = self.command_input.len();
                }
                false
            }
            KeyCode::Down => {
                let Some(i) = self.command_history_index else {
                    return false;
                };
                let next = i + 1;
                if next >= self.command_history.len() {
                    self.command_history_index = None;
                    self.command_input.clear();
                    self.command_cursor = 0;
                    return false;
                }
                self.command_history_index = Some(next);
                if let Some(cmd) = self.command_history.get(next) {
                    self.command_input = cmd.clone();
                    self.command_cursor = self.command_input.len();
                }
                false
            }
            KeyCode::Backspace => {
                if self.command_cursor > 0 {
                    let prev = self.command_input[..self.command_cursor]
                        .char_indices()
                        .last()
                        .map(|(i, _)| i)
                        .unwrap_or(0);
                    self.command_input.remove(prev);
                    self.command_cursor = prev;
                }
                false
            }
            KeyCode::Delete => {
                if self.command_cursor < self.command_input.len() {
                    self.command_input.remove(self.command_cursor);
                }
                false
            }
            KeyCode::Left => {
                if let Some((i, _)) = self.command_input[..self.command_cursor].char_indices().last() {
                    self.command_cursor = i;
                }
                false
            }
            KeyCode::Right => {
                if let Some(c) = self.command_input[self.command_cursor..].chars().next() {
                    self.command_cursor += c.len_utf8();
                }
                false
            }
            KeyCode::Home => {
                self.command_cursor = 0;
                false
            }
            KeyCode::End => {
                self.command_cursor = self.command_input.len();
                false
            }
            KeyCode::Char(c) => {
                self.command_input.insert(self.command_cursor, c);
                self.command_cursor += c.len_utf8();
                false
            }
            _ => false,
        }
    }
}
