mod api;
mod app_service;
mod app_state;
mod commands;
mod config;
mod tracker;
mod ui;

use anyhow::Context;
use chrono::Local;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use log::info;
use ratatui::{backend::CrosstermBackend, Terminal};
use std::io;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::api::{BacktestClient, JobApi};
use crate::app_state::{App, AppEvent};
use crate::commands::{AppCommand, HELP_TEXT};
use crate::config::AppConfig;
use crate::tracker::JobTracker;
use crate::ui::draw;

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    let ts = Local::now().format("%Y%m%d-%H%M%S").to_string();
    let log_dir = std::path::PathBuf::from("logs");
    std::fs::create_dir_all(&log_dir).context("无法创建日志目录")?;
    let log_path = log_dir.join(format!("app-{}.log", ts));
    let log_file = std::fs::File::create(&log_path)
        .with_context(|| format!("无法创建日志文件 {}", log_path.display()))?;
    // TUI 占用终端，日志只写文件
    env_logger::Builder::new()
        .target(env_logger::Target::Pipe(Box::new(log_file)))
        .filter_level(log::LevelFilter::Warn)
        .filter_module("btdash", log::LevelFilter::Info)
        .filter_module("reqwest", log::LevelFilter::Warn)
        .filter_module("hyper", log::LevelFilter::Warn)
        .parse_default_env()
        .init();

    let (config, mut session_info) = AppConfig::from_env();
    info!("配置: {:?}", config);
    session_info.push(format!("后端地址: {}", config.api_url));
    session_info.push(format!(
        "轮询间隔 {}ms，列表刷新 {}ms",
        config.poll.interval.as_millis(),
        config.refresh_interval.as_millis()
    ));

    let client = Arc::new(
        BacktestClient::new(&config.api_url, config.proxy.as_deref(), config.list_limit)
            .context("创建 HTTP 客户端失败")?,
    );
    session_info.push(app_service::health_note(&client.health().await));

    // 创建核心 Channel (使用 AppCommand)
    let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel::<AppCommand>();
    let (evt_tx, evt_rx) = mpsc::unbounded_channel::<AppEvent>();

    let api: Arc<dyn JobApi> = client.clone();
    let tracker = JobTracker::new(api, config.poll.clone(), evt_tx.clone());

    // 启动单后台任务模型 (Actor)
    let client_bg = client.clone();
    let evt_tx_bg = evt_tx.clone();
    let refresh_every = config.refresh_interval;

    tokio::spawn(async move {
        // 1. 首次加载列表并为未结束的任务启动轮询
        let _ = tracker.reload().await;

        // 2. 周期性刷新，仅在有跟踪中的任务时访问后端
        let _refresh_loop = tracker.periodic_refresh(refresh_every);

        app_service::load_runs(&client_bg, &evt_tx_bg).await;
        app_service::load_strategies(&client_bg, &evt_tx_bg).await;

        while let Some(cmd) = cmd_rx.recv().await {
            match cmd {
                AppCommand::Submit(new_job) => {
                    let _ = evt_tx_bg.send(AppEvent::Message(format!(
                        "提交回测: {} {} 资金 {}",
                        new_job.strategy_name, new_job.symbol, new_job.initial_capital
                    )));
                    let tracker = tracker.clone();
                    let tx = evt_tx_bg.clone();
                    tokio::spawn(async move {
                        match tracker.submit(&new_job).await {
                            Ok(job) => {
                                let _ = tx.send(AppEvent::Message(format!(
                                    "✓ 已创建回测任务 #{} ({})",
                                    job.id, job.status
                                )));
                            }
                            Err(e) => {
                                let _ = tx.send(AppEvent::Error(format!("✗ 提交失败: {}", e)));
                            }
                        }
                    });
                }
                AppCommand::Refresh => {
                    let tracker = tracker.clone();
                    let tx = evt_tx_bg.clone();
                    tokio::spawn(async move {
                        if tracker.reload().await.is_ok() {
                            let stats = tracker.stats();
                            let _ = tx.send(AppEvent::Log(format!(
                                "已刷新 {} 个任务 (运行中 {}, 待处理 {})，跟踪中 {} 个",
                                stats.total,
                                stats.running,
                                stats.pending,
                                tracker.tracked_ids().len()
                            )));
                        }
                    });
                }
                AppCommand::Runs => {
                    let client = client_bg.clone();
                    let tx = evt_tx_bg.clone();
                    tokio::spawn(async move {
                        app_service::load_runs(&client, &tx).await;
                    });
                }
                AppCommand::RunDetail { run_id } => {
                    let client = client_bg.clone();
                    let tx = evt_tx_bg.clone();
                    tokio::spawn(async move {
                        app_service::load_run(&client, run_id, &tx).await;
                    });
                }
                AppCommand::JobResult { job_id } => {
                    let client = client_bg.clone();
                    let tracker = tracker.clone();
                    let tx = evt_tx_bg.clone();
                    tokio::spawn(async move {
                        app_service::load_job_result(&client, &tracker, job_id, &tx).await;
                    });
                }
                AppCommand::Strategies => {
                    let client = client_bg.clone();
                    let tx = evt_tx_bg.clone();
                    tokio::spawn(async move {
                        app_service::load_strategies(&client, &tx).await;
                    });
                }
                AppCommand::Help => {
                    let _ = evt_tx_bg.send(AppEvent::Message(HELP_TEXT.to_string()));
                }
                AppCommand::Quit => {
                    let _ = evt_tx_bg.send(AppEvent::Message("收到退出命令".to_string()));
                }
                AppCommand::Unknown(msg) => {
                    let _ = evt_tx_bg.send(AppEvent::Error(format!("✗ {}", msg)));
                }
            }
        }
    });

    // TUI 初始化
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = App::new(session_info, cmd_tx, evt_rx);

    let res = match app.evt_rx.take() {
        Some(rx) => run_app_loop(&mut terminal, &mut app, rx).await,
        None => Ok(()),
    };

    // 恢复终端
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    res.context("界面循环异常退出")
}

async fn run_app_loop<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
    mut evt_rx: mpsc::UnboundedReceiver<AppEvent>,
) -> io::Result<()> {
    loop {
        terminal.draw(|f| draw(f, app))?;

        while let Ok(event) = evt_rx.try_recv() {
            app.handle_event(event);
        }

        if event::poll(std::time::Duration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press && app.handle_key_event(key.code) {
                    return Ok(());
                }
            }
        }
    }
}
