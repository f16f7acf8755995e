use crate::api::{ApiError, BacktestClient, JobId, JobStatus};
use crate::app_state::AppEvent;
use crate::tracker::JobTracker;
use log::warn;
use std::sync::Arc;
use tokio::sync::mpsc;

/// 启动时的后端状态提示；首次加载失败后不会自动重试，需要手动刷新
pub fn health_note(result: &Result<(), ApiError>) -> String {
    match result {
        Ok(()) => "✓ 后端连接正常".to_string(),
        Err(e) => format!("⚠ 后端健康检查失败: {} (恢复后按 r 或输入 refresh 重新加载)", e),
    }
}

pub async fn load_runs(client: &Arc<BacktestClient>, tx: &mpsc::UnboundedSender<AppEvent>) {
    match client.list_runs().await {
        Ok(runs) => {
            let _ = tx.send(AppEvent::Runs(runs));
        }
        Err(e) => {
            warn!("加载历史回测失败: {}", e);
            let _ = tx.send(AppEvent::Error(format!("✗ 加载历史回测失败: {}", e)));
        }
    }
}

pub async fn load_run(client: &Arc<BacktestClient>, run_id: i64, tx: &mpsc::UnboundedSender<AppEvent>) {
    match client.get_run(run_id).await {
        Ok(run) => {
            let _ = tx.send(AppEvent::RunDetail(run));
        }
        Err(e) => {
            warn!("加载回测结果 #{} 失败: {}", run_id, e);
            let _ = tx.send(AppEvent::Error(format!("✗ 加载回测结果 #{} 失败: {}", run_id, e)));
        }
    }
}

pub async fn load_strategies(client: &Arc<BacktestClient>, tx: &mpsc::UnboundedSender<AppEvent>) {
    match client.list_strategies().await {
        Ok(list) => {
            let _ = tx.send(AppEvent::Strategies(list));
        }
        Err(e) => {
            let _ = tx.send(AppEvent::Error(format!("✗ 加载策略列表失败: {}", e)));
        }
    }
}

/// 根据任务找到它的回测结果；只有 completed 且带 backtest_run_id 的任务才有结果
pub async fn load_job_result(
    client: &Arc<BacktestClient>,
    tracker: &Arc<JobTracker>,
    job_id: JobId,
    tx: &mpsc::UnboundedSender<AppEvent>,
) {
    let Some(job) = tracker.get(job_id) else {
        let _ = tx.send(AppEvent::Error(format!("✗ 列表中没有任务 #{}", job_id)));
        return;
    };

    match (job.status, job.backtest_run_id) {
        (JobStatus::Completed, Some(run_id)) => load_run(client, run_id, tx).await,
        (JobStatus::Completed, None) => {
            let _ = tx.send(AppEvent::Error(format!(
                "⚠ 任务 #{} 已完成但没有关联的回测结果",
                job_id
            )));
        }
        (JobStatus::Failed, _) => {
            let msg = job.error_message.unwrap_or_else(|| "未知错误".to_string());
            let _ = tx.send(AppEvent::Error(format!("✗ 任务 #{} 失败: {}", job_id, msg)));
        }
        (status, _) => {
            let _ = tx.send(AppEvent::Message(format!(
                "任务 #{} 尚未完成 ({})",
                job_id, status
            )));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_health_check_points_to_manual_refresh() {
        let note = health_note(&Err(ApiError::Network("refused".into())));
        assert!(note.starts_with('⚠'));
        assert!(note.contains("refused"));
        assert!(note.contains("refresh"));
        assert!(!note.contains("重试"));
        assert_eq!(health_note(&Ok(())), "✓ 后端连接正常");
    }
}
