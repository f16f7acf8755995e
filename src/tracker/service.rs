use crate::api::{ApiError, Job, JobApi, JobId, NewJob};
use crate::app_state::AppEvent;
use crate::tracker::model::{JobStats, PollPolicy, PollState, TrackerError};
use crate::tracker::state::{PollStep, TrackerState};
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::sleep;

/// 任务跟踪器：维护展示列表与跟踪集合，为每个未结束的任务跑一个轮询循环
pub struct JobTracker {
    api: Arc<dyn JobApi>,
    policy: PollPolicy,
    state: Mutex<TrackerState>,
    evt_tx: mpsc::UnboundedSender<AppEvent>,
}

impl JobTracker {
    pub fn new(
        api: Arc<dyn JobApi>,
        policy: PollPolicy,
        evt_tx: mpsc::UnboundedSender<AppEvent>,
    ) -> Arc<Self> {
        Arc::new(Self {
            api,
            policy,
            state: Mutex::new(TrackerState::default()),
            evt_tx,
        })
    }

    #[cfg(test)]
    pub fn jobs(&self) -> Vec<Job> {
        self.state.lock().jobs.as_slice().to_vec()
    }

    pub fn get(&self, id: JobId) -> Option<Job> {
        self.state.lock().jobs.get(id).cloned()
    }

    pub fn tracked_ids(&self) -> Vec<JobId> {
        self.state.lock().tracked_ids()
    }

    pub fn is_tracked(&self, id: JobId) -> bool {
        self.state.lock().is_tracked(id)
    }

    pub fn poll_state(&self, id: JobId) -> PollState {
        self.state.lock().poll_state(id)
    }

    pub fn stats(&self) -> JobStats {
        self.state.lock().jobs.stats()
    }

    /// 把当前列表推给 UI（锁外发送）
    fn publish(&self, jobs: Vec<Job>, tracked: usize) {
        let _ = self.evt_tx.send(AppEvent::Jobs { jobs, tracked });
    }

    fn publish_current(&self) {
        let (jobs, tracked) = {
            let st = self.state.lock();
            (st.jobs.as_slice().to_vec(), st.tracked_ids().len())
        };
        self.publish(jobs, tracked);
    }

    /// 全量拉取任务列表并替换展示列表；失败时保留原列表
    pub async fn refresh_all(&self) -> Result<usize, ApiError> {
        let fetched = match self.api.list_jobs().await {
            Ok(jobs) => jobs,
            Err(e) => {
                warn!("⚠ 刷新任务列表失败: {}", e);
                let _ = self.evt_tx.send(AppEvent::RefreshFailed(e.to_string()));
                return Err(e);
            }
        };

        let count = fetched.len();
        let finished = self.state.lock().apply_refresh(fetched);
        if !finished.is_empty() {
            debug!("刷新发现已结束的任务，停止轮询: {:?}", finished);
        }
        self.publish_current();
        let _ = self.evt_tx.send(AppEvent::Refreshed);
        Ok(count)
    }

    /// 为尚未跟踪的未结束任务各启动一个轮询循环，返回新启动的数量
    pub fn ensure_polling(self: &Arc<Self>) -> usize {
        let started = self.state.lock().start_polling(&self.policy);
        for &id in &started {
            let tracker = Arc::clone(self);
            tokio::spawn(async move {
                tracker.run_poll(id).await;
            });
        }
        if !started.is_empty() {
            info!("▶ 开始轮询任务: {:?}", started);
            self.publish_current();
        }
        started.len()
    }

    /// 轮询单个任务直到终态；同一 id 的请求严格串行
    pub async fn poll_one(&self, id: JobId) -> Result<Job, TrackerError> {
        loop {
            let delay = match self.poll_state(id) {
                PollState::Polling { next_delay, .. } => next_delay,
                _ => return Err(TrackerError::Untracked(id)),
            };
            sleep(delay).await;

            // 等待期间可能已被全量刷新移出跟踪集合
            if !self.is_tracked(id) {
                return Err(TrackerError::Untracked(id));
            }

            let result = self.api.get_job(id).await;
            let step = self.state.lock().apply_poll(id, result, &self.policy);
            self.publish_current();
            if let PollStep::Finished(outcome) = step {
                return outcome;
            }
        }
    }

    async fn run_poll(&self, id: JobId) {
        match self.poll_one(id).await {
            Ok(job) => {
                let msg = match &job.error_message {
                    Some(err) => format!("✗ 回测任务 #{} {}: {}", id, job.status, err),
                    None => match job.backtest_run_id {
                        Some(run_id) => {
                            format!("✓ 回测任务 #{} {} [结果 #{}]", id, job.status, run_id)
                        }
                        None => format!("✓ 回测任务 #{} {}", id, job.status),
                    },
                };
                info!("{}", msg);
                let _ = self.evt_tx.send(AppEvent::Log(msg));
            }
            Err(TrackerError::Untracked(_)) => {
                debug!("任务 #{} 已由全量刷新结束跟踪", id);
            }
            Err(e) => {
                error!("{}", e);
                let _ = self.evt_tx.send(AppEvent::Error(format!("⚠ {}", e)));
            }
        }
    }

    /// 定时刷新的一拍：跟踪集合为空时不发任何请求，返回是否发起了刷新
    pub async fn refresh_tick(self: &Arc<Self>) -> bool {
        if self.tracked_ids().is_empty() {
            return false;
        }
        if self.refresh_all().await.is_ok() {
            self.ensure_polling();
        }
        true
    }

    pub fn periodic_refresh(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let tracker = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                sleep(every).await;
                tracker.refresh_tick().await;
            }
        })
    }

    /// 无条件全量刷新并补齐轮询（启动时与手动 refresh 命令）
    pub async fn reload(self: &Arc<Self>) -> Result<usize, ApiError> {
        let count = self.refresh_all().await?;
        self.ensure_polling();
        Ok(count)
    }

    /// 提交新任务：插入列表顶部并立即开始轮询
    pub async fn submit(self: &Arc<Self>, new_job: &NewJob) -> Result<Job, ApiError> {
        let created = self.api.create_job(new_job).await?;
        self.state.lock().jobs.insert_front(created.clone());
        self.publish_current();
        self.ensure_polling();
        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::JobStatus;
    use crate::tracker::testing::{job, ScriptedApi};

    fn tracker_with(api: Arc<ScriptedApi>) -> (Arc<JobTracker>, mpsc::UnboundedReceiver<AppEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let tracker = JobTracker::new(api, PollPolicy::default(), tx);
        (tracker, rx)
    }

    #[tokio::test(start_paused = true)]
    async fn created_job_is_polled_until_completed() {
        let api = Arc::new(ScriptedApi::default());
        api.push_create(Ok(job(42, JobStatus::Pending, None)));
        api.push_detail(42, Ok(job(42, JobStatus::Running, Some(1))));
        let mut done = job(42, JobStatus::Completed, Some(2));
        done.backtest_run_id = Some(7);
        api.push_detail(42, Ok(done));
        let (tracker, _rx) = tracker_with(api.clone());

        let created = tracker.submit(&NewJob::new("SmaCrossover", 10_000.0)).await.unwrap();
        assert_eq!(created.id, 42);
        assert_eq!(tracker.tracked_ids(), vec![42]);

        sleep(Duration::from_millis(2100)).await;
        assert!(tracker.is_tracked(42));
        assert_eq!(tracker.get(42).unwrap().status, JobStatus::Running);

        sleep(Duration::from_millis(2000)).await;
        assert!(!tracker.is_tracked(42));
        let last = tracker.get(42).unwrap();
        assert_eq!(last.status, JobStatus::Completed);
        assert_eq!(last.backtest_run_id, Some(7));
        assert_eq!(api.detail_polls(), 2);

        // 终态之后不再发请求
        sleep(Duration::from_millis(10_000)).await;
        assert_eq!(api.detail_polls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_refresh_does_not_overwrite_fresher_poll_result() {
        let api = Arc::new(ScriptedApi::default());
        api.push_list(Ok(vec![job(2, JobStatus::Pending, Some(10))]));
        let mut failed = job(2, JobStatus::Failed, Some(20));
        failed.error_message = Some("x".to_string());
        api.push_detail(2, Ok(failed));
        api.push_list(Ok(vec![
            job(1, JobStatus::Completed, Some(5)),
            job(2, JobStatus::Pending, Some(10)),
        ]));
        let (tracker, _rx) = tracker_with(api.clone());

        tracker.reload().await.unwrap();
        assert_eq!(tracker.tracked_ids(), vec![2]);

        sleep(Duration::from_millis(2100)).await;
        tracker.refresh_all().await.unwrap();
        assert_eq!(tracker.ensure_polling(), 0);

        let two = tracker.get(2).unwrap();
        assert_eq!(two.status, JobStatus::Failed);
        assert_eq!(two.error_message.as_deref(), Some("x"));
        assert!(tracker.tracked_ids().is_empty());
        assert_eq!(tracker.get(1).unwrap().status, JobStatus::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_refresh_keeps_previous_list() {
        let api = Arc::new(ScriptedApi::default());
        api.push_list(Ok(vec![
            job(1, JobStatus::Completed, Some(1)),
            job(2, JobStatus::Failed, Some(1)),
        ]));
        api.push_list(Err(ApiError::Network("connection refused".into())));
        let (tracker, mut rx) = tracker_with(api.clone());

        tracker.refresh_all().await.unwrap();
        let before = tracker.jobs();

        let err = tracker.refresh_all().await.unwrap_err();
        assert_eq!(err, ApiError::Network("connection refused".into()));
        assert_eq!(tracker.jobs(), before);

        let mut saw_banner = false;
        while let Ok(evt) = rx.try_recv() {
            if let AppEvent::RefreshFailed(msg) = evt {
                saw_banner = msg.contains("connection refused");
            }
        }
        assert!(saw_banner);
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_banner_outlives_poll_updates() {
        use crate::app_state::App;

        let api = Arc::new(ScriptedApi::default());
        api.push_list(Ok(vec![job(4, JobStatus::Running, Some(1))]));
        api.push_list(Err(ApiError::Network("refused".into())));
        api.push_detail(4, Ok(job(4, JobStatus::Running, Some(2))));
        let (tracker, mut rx) = tracker_with(api.clone());
        let (cmd_tx, _cmd_rx) = mpsc::unbounded_channel();
        let (_evt_tx, evt_rx) = mpsc::unbounded_channel();
        let mut app = App::new(Vec::new(), cmd_tx, evt_rx);
        let mut drain = |app: &mut App| {
            while let Ok(evt) = rx.try_recv() {
                app.handle_event(evt);
            }
        };

        tracker.reload().await.unwrap();
        assert!(tracker.refresh_all().await.is_err());
        drain(&mut app);
        assert_eq!(app.banner.as_deref(), Some("network failure: refused"));

        // 一次轮询更新列表，但横幅仍在
        sleep(Duration::from_millis(2100)).await;
        assert_eq!(api.detail_polls(), 1);
        drain(&mut app);
        assert_eq!(app.jobs_all[0].updated_at, job(4, JobStatus::Running, Some(2)).updated_at);
        assert!(app.banner.is_some());

        api.push_list(Ok(vec![job(4, JobStatus::Running, Some(2))]));
        tracker.refresh_all().await.unwrap();
        drain(&mut app);
        assert!(app.banner.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_removes_terminal_jobs_and_stops_their_loops() {
        let api = Arc::new(ScriptedApi::default());
        api.push_list(Ok(vec![
            job(1, JobStatus::Pending, None),
            job(2, JobStatus::Running, Some(1)),
        ]));
        api.push_list(Ok(vec![
            job(1, JobStatus::Completed, Some(3)),
            job(2, JobStatus::Running, Some(1)),
        ]));
        let (tracker, _rx) = tracker_with(api.clone());

        tracker.reload().await.unwrap();
        assert_eq!(tracker.tracked_ids(), vec![1, 2]);

        tracker.refresh_all().await.unwrap();
        assert_eq!(tracker.tracked_ids(), vec![2]);
        assert_eq!(tracker.poll_state(1), PollState::Terminal);
        assert_eq!(tracker.stats().completed, 1);

        // 只剩任务 2 在轮询（没有脚本响应，按网络错误继续）
        sleep(Duration::from_millis(2100)).await;
        assert_eq!(api.detail_polls(), 1);
        assert!(tracker.is_tracked(2));
    }

    #[tokio::test(start_paused = true)]
    async fn ensure_polling_never_starts_a_second_loop() {
        let api = Arc::new(ScriptedApi::default());
        api.push_list(Ok(vec![job(9, JobStatus::Pending, None)]));
        let (tracker, _rx) = tracker_with(api.clone());

        tracker.refresh_all().await.unwrap();
        assert!(tracker.tracked_ids().is_empty());
        assert_eq!(tracker.ensure_polling(), 1);
        assert_eq!(tracker.ensure_polling(), 0);
        assert_eq!(tracker.ensure_polling(), 0);

        sleep(Duration::from_millis(2100)).await;
        assert_eq!(api.detail_polls(), 1);
        sleep(Duration::from_millis(2000)).await;
        assert_eq!(api.detail_polls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn periodic_refresh_is_idle_without_tracked_jobs() {
        let api = Arc::new(ScriptedApi::default());
        let (tracker, _rx) = tracker_with(api.clone());

        assert!(!tracker.refresh_tick().await);
        let handle = tracker.periodic_refresh(Duration::from_millis(500));
        sleep(Duration::from_secs(5)).await;
        handle.abort();

        assert_eq!(api.lists(), 0);
        assert_eq!(api.detail_polls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn periodic_refresh_runs_while_jobs_are_tracked() {
        let api = Arc::new(ScriptedApi::default());
        api.push_list(Ok(vec![job(3, JobStatus::Running, Some(1))]));
        api.push_list(Ok(vec![job(3, JobStatus::Completed, Some(2))]));
        let (tracker, _rx) = tracker_with(api.clone());

        tracker.reload().await.unwrap();
        let handle = tracker.periodic_refresh(Duration::from_millis(1000));

        sleep(Duration::from_millis(1100)).await;
        assert_eq!(api.lists(), 2);
        assert!(tracker.tracked_ids().is_empty());

        // 跟踪集合已空，之后的定时器不再请求
        sleep(Duration::from_secs(5)).await;
        assert_eq!(api.lists(), 2);
        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn poll_errors_do_not_stop_the_loop() {
        let api = Arc::new(ScriptedApi::default());
        api.push_list(Ok(vec![job(4, JobStatus::Running, Some(1))]));
        api.push_detail(4, Err(ApiError::Network("reset".into())));
        api.push_detail(4, Err(ApiError::Status(502)));
        api.push_detail(4, Ok(job(4, JobStatus::Completed, Some(9))));
        let (tracker, _rx) = tracker_with(api.clone());

        tracker.reload().await.unwrap();
        sleep(Duration::from_millis(6100)).await;

        assert_eq!(api.detail_polls(), 3);
        assert_eq!(tracker.get(4).unwrap().status, JobStatus::Completed);
        assert!(tracker.tracked_ids().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn vanished_job_retires_and_is_not_restarted() {
        let api = Arc::new(ScriptedApi::default());
        api.push_list(Ok(vec![job(6, JobStatus::Pending, None)]));
        api.push_detail(6, Err(ApiError::NotFound));
        let (tracker, _rx) = tracker_with(api.clone());

        tracker.reload().await.unwrap();
        sleep(Duration::from_millis(2100)).await;

        assert_eq!(tracker.poll_state(6), PollState::Retired);
        assert_eq!(tracker.ensure_polling(), 0);
        sleep(Duration::from_secs(10)).await;
        assert_eq!(api.detail_polls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn attempt_ceiling_bounds_the_loop() {
        let api = Arc::new(ScriptedApi::default());
        api.push_list(Ok(vec![job(5, JobStatus::Running, Some(1))]));
        let (tx, _rx) = mpsc::unbounded_channel();
        let policy = PollPolicy {
            max_attempts: Some(3),
            ..PollPolicy::default()
        };
        let tracker = JobTracker::new(api.clone(), policy, tx);

        tracker.reload().await.unwrap();
        sleep(Duration::from_secs(30)).await;

        assert_eq!(api.detail_polls(), 3);
        assert_eq!(tracker.poll_state(5), PollState::Retired);
        assert!(tracker.tracked_ids().is_empty());
    }

    #[tokio::test]
    async fn rejected_submission_leaves_list_untouched() {
        let api = Arc::new(ScriptedApi::default());
        api.push_create(Err(ApiError::Rejected("Unknown strategy: Foo".into())));
        let (tracker, _rx) = tracker_with(api.clone());

        let err = tracker.submit(&NewJob::new("Foo", 1.0)).await.unwrap_err();
        assert_eq!(err, ApiError::Rejected("Unknown strategy: Foo".into()));
        assert!(tracker.jobs().is_empty());
        assert!(tracker.tracked_ids().is_empty());
    }
}
